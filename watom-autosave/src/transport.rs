//! HTTP plumbing for quick saves and full form submissions

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{redirect, Client};
use tracing::debug;
use url::Url;
use watom_core::{Result, WatomError};

use crate::dom::FormSubmitter;
use crate::protocol::{
    FormSubmission, SaveRequest, SubmitOutcome, TransportResponse, EDIT_VIEW_SUFFIX,
    FORM_CONTENT_TYPE, SAVE_CONTENT_TYPE,
};
use crate::AutosaveError;

/// Delivers quick-save requests to the page endpoint
#[async_trait]
pub trait SaveTransport: Send + Sync {
    /// Send one request and wait for its completion
    async fn put(&self, request: &SaveRequest) -> Result<TransportResponse>;
}

/// Parse and check a page URL
pub fn parse_page_url(page_url: &str) -> Result<Url> {
    let url = Url::parse(page_url)
        .map_err(|e| WatomError::config(format!("Invalid page URL '{}': {}", page_url, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(WatomError::config(format!(
            "Unsupported URL scheme '{}' for page URL",
            other
        ))),
    }
}

/// The URL saves are sent to: the page's edit view, `<page>.__edit__`
///
/// Accepts either the view URL or the edit URL. The server drops the last path
/// segment of a save target before resolving the page file, so the view URL
/// itself does not name a page there. A directory URL edits its `index` page.
pub fn edit_endpoint(page_url: &str) -> Result<Url> {
    let mut url = parse_page_url(page_url)?;

    if !url.path().ends_with(EDIT_VIEW_SUFFIX) {
        let page = if url.path().ends_with('/') {
            format!("{}index", url.path())
        } else {
            url.path().to_string()
        };
        url.set_path(&format!("{}{}", page, EDIT_VIEW_SUFFIX));
    }

    Ok(url)
}

/// Quick-save transport over HTTP, PUTting to the page's edit URL
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    page_url: Url,
}

impl HttpTransport {
    pub fn new(page_url: &str) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| WatomError::transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            page_url: edit_endpoint(page_url)?,
        })
    }

    pub fn page_url(&self) -> &Url {
        &self.page_url
    }
}

#[async_trait]
impl SaveTransport for HttpTransport {
    async fn put(&self, request: &SaveRequest) -> Result<TransportResponse> {
        let body = request.to_body()?;
        debug!("PUT {} ({} bytes)", self.page_url, body.len());

        let response = self
            .client
            .put(self.page_url.clone())
            .header(CONTENT_TYPE, SAVE_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| WatomError::transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| WatomError::transport(format!("Failed to read response body: {}", e)))?;

        Ok(TransportResponse { status, body })
    }
}

/// Full form submission over HTTP: a POST of the form fields to the page's edit URL
///
/// Redirects are not followed. The server answers a submission with a redirect to
/// the page view, or to the edit view when its merge conflicted, and that target
/// is the only result the submission carries.
#[derive(Debug, Clone)]
pub struct HttpFormSubmitter {
    client: Client,
    page_url: Url,
}

impl HttpFormSubmitter {
    pub fn new(page_url: &str) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| WatomError::transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            page_url: edit_endpoint(page_url)?,
        })
    }
}

#[async_trait]
impl FormSubmitter for HttpFormSubmitter {
    async fn submit(&self, submission: FormSubmission) -> Result<SubmitOutcome> {
        debug!("POST {} (form submission)", self.page_url);

        let response = self
            .client
            .post(self.page_url.clone())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(submission.to_form_body())
            .send()
            .await
            .map_err(|e| WatomError::transport(e.to_string()))?;

        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            Ok(SubmitOutcome::from_location(location))
        } else if status.is_success() {
            Ok(SubmitOutcome::Saved { location: None })
        } else {
            Err(AutosaveError::UnexpectedStatus(status.as_u16()).into())
        }
    }
}
