//! Wire format of the quick-save endpoint

use serde::{Deserialize, Serialize};
use watom_core::{Result, WatomError};

/// Content type of the PUT body; the JSON payload is deliberately sent as plain text
pub const SAVE_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

/// Content type of a full form submission
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Suffix the server appends to the redirect target when a submission conflicted
pub const EDIT_VIEW_SUFFIX: &str = ".__edit__";

/// Body of a quick-save request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRequest {
    pub new_content: String,
    pub old_content: String,
}

impl SaveRequest {
    pub fn new(new_content: impl Into<String>, old_content: impl Into<String>) -> Self {
        Self {
            new_content: new_content.into(),
            old_content: old_content.into(),
        }
    }

    /// Serialize to the JSON body sent over the wire
    pub fn to_body(&self) -> Result<String> {
        serde_json::to_string(self).map_err(WatomError::Json)
    }
}

/// Merge verdict returned by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SaveResult {
    /// The merge was clean
    Ok,
    /// The baseline no longer matched and the server's version won
    Conflicted,
}

/// Body of a successful quick-save response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResponse {
    pub result: SaveResult,
    pub updated_content: String,
}

impl SaveResponse {
    /// Parse a response body, classifying any malformation as [`WatomError::InvalidResponse`]
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| WatomError::invalid_response(e.to_string()))
    }
}

/// Raw completion of a quick-save request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Convenience for a 200 response carrying a serialized [`SaveResponse`]
    pub fn ok(response: &SaveResponse) -> Self {
        // Serializing a struct of two strings cannot fail
        let body = serde_json::to_string(response).unwrap_or_default();
        Self::new(200, body)
    }

    /// Only a plain 200 counts as a completed save
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// What one invocation of the save operation ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Buffers matched the baseline, no request was sent
    Unchanged,
    /// Another request was in flight; the save will be replayed after it
    Deferred,
    /// The server answered and its content was applied
    Applied(SaveResult),
    /// The server answered with a non-200 status
    Rejected { status: u16 },
    /// The server answered 200 with a body that is not a save response
    Invalid,
    /// The request failed or timed out
    Failed,
}

/// Field values posted by a full form submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSubmission {
    pub new_content: String,
    pub old_content: String,
}

impl FormSubmission {
    /// Encode as an `application/x-www-form-urlencoded` body
    pub fn to_form_body(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("new_content", &self.new_content)
            .append_pair("old_content", &self.old_content)
            .finish()
    }
}

/// Result of a full form submission, read from where the server redirects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Redirected to the page view
    Saved { location: Option<String> },
    /// Redirected back to the edit view because the merge conflicted
    Conflicted { location: String },
}

impl SubmitOutcome {
    /// Classify a redirect target
    pub fn from_location(location: Option<String>) -> Self {
        match location {
            Some(location) if location.ends_with(EDIT_VIEW_SUFFIX) => Self::Conflicted { location },
            location => Self::Saved { location },
        }
    }

    pub fn is_conflicted(&self) -> bool {
        matches!(self, Self::Conflicted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = SaveRequest::new("AB", "A").to_body().unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json, serde_json::json!({"new_content": "AB", "old_content": "A"}));
    }

    #[test]
    fn test_parse_ok_and_conflicted() {
        let ok = SaveResponse::parse(r#"{"result":"OK","updated_content":"AB"}"#).unwrap();
        assert_eq!(ok.result, SaveResult::Ok);
        assert_eq!(ok.updated_content, "AB");

        let conflicted =
            SaveResponse::parse(r#"{"result":"CONFLICTED","updated_content":"AC"}"#).unwrap();
        assert_eq!(conflicted.result, SaveResult::Conflicted);
    }

    #[test]
    fn test_malformed_responses_are_invalid() {
        for body in [
            "",
            "<html>Internal error</html>",
            r#"{"result":"OK"}"#,
            r#"{"result":"MERGED","updated_content":"x"}"#,
            r#"{"result":"OK","updated_content":42}"#,
        ] {
            let err = SaveResponse::parse(body).unwrap_err();
            assert!(matches!(err, WatomError::InvalidResponse(_)), "body: {body}");
        }
    }

    #[test]
    fn test_only_200_is_success() {
        assert!(TransportResponse::new(200, "").is_success());
        assert!(!TransportResponse::new(201, "").is_success());
        assert!(!TransportResponse::new(500, "").is_success());
    }

    #[test]
    fn test_form_body_is_urlencoded() {
        let submission = FormSubmission {
            new_content: "a & b\nline two".to_string(),
            old_content: "=".to_string(),
        };
        assert_eq!(
            submission.to_form_body(),
            "new_content=a+%26+b%0Aline+two&old_content=%3D"
        );
    }

    #[test]
    fn test_submit_outcome_from_redirect() {
        assert!(SubmitOutcome::from_location(Some("/notes.__edit__".to_string())).is_conflicted());
        assert_eq!(
            SubmitOutcome::from_location(Some("/notes".to_string())),
            SubmitOutcome::Saved {
                location: Some("/notes".to_string())
            }
        );
        assert!(!SubmitOutcome::from_location(None).is_conflicted());
    }
}
