//! In-memory host page and transport
//!
//! Headless implementations of every collaborator trait. They back the test
//! suites and any embedding that has no real document to drive.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use watom_core::{PageSelectors, Result, WatomError};

use crate::dom::{
    fire_listeners as fire, Anchor, ClickEvent, ClickListener, EditForm, FormSubmitter, HostPage,
    Listener, PageCollaborators, PageForm, PreviewSurface, SaveButton, TextField,
};
use crate::protocol::{
    FormSubmission, SaveRequest, SaveResponse, SaveResult, SubmitOutcome, TransportResponse,
};
use crate::transport::SaveTransport;

/// Text field holding its value in memory
#[derive(Default)]
pub struct MemoryField {
    value: Mutex<String>,
    input_listeners: Mutex<Vec<Listener>>,
}

impl MemoryField {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(value.into()),
            input_listeners: Mutex::new(Vec::new()),
        }
    }

    /// Replace the value the way a user edit does, firing input listeners
    pub fn type_text(&self, value: impl Into<String>) {
        *self.value.lock() = value.into();
        fire(&self.input_listeners);
    }
}

impl TextField for MemoryField {
    fn value(&self) -> String {
        self.value.lock().clone()
    }

    fn set_value(&self, value: &str) {
        *self.value.lock() = value.to_string();
    }

    fn on_input(&self, listener: Listener) {
        self.input_listeners.lock().push(listener);
    }
}

/// Button with a class set
#[derive(Default)]
pub struct MemoryButton {
    classes: Mutex<BTreeSet<String>>,
    click_listeners: Mutex<Vec<Listener>>,
}

impl MemoryButton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn click(&self) {
        fire(&self.click_listeners);
    }

    /// Space separated class attribute
    pub fn class_name(&self) -> String {
        self.classes
            .lock()
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl SaveButton for MemoryButton {
    fn add_class(&self, class: &str) {
        self.classes.lock().insert(class.to_string());
    }

    fn remove_class(&self, class: &str) {
        self.classes.lock().remove(class);
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.lock().contains(class)
    }

    fn on_click(&self, listener: Listener) {
        self.click_listeners.lock().push(listener);
    }
}

/// Anchor of an in-memory preview document
pub struct MemoryAnchor {
    href: String,
    click_listeners: Mutex<Vec<ClickListener>>,
}

impl MemoryAnchor {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            click_listeners: Mutex::new(Vec::new()),
        }
    }

    /// Dispatch a click; returns whether the browser would navigate
    pub fn click(&self) -> bool {
        let listeners: Vec<ClickListener> = self.click_listeners.lock().clone();
        let mut event = ClickEvent::new();
        for listener in listeners {
            listener(&mut event);
        }
        !event.is_default_prevented()
    }

    pub fn listener_count(&self) -> usize {
        self.click_listeners.lock().len()
    }
}

impl Anchor for MemoryAnchor {
    fn href(&self) -> String {
        self.href.clone()
    }

    fn add_click_listener(&self, listener: ClickListener) {
        self.click_listeners.lock().push(listener);
    }
}

/// Preview whose document is a list of links, rebuilt on every reload
pub struct MemoryPreview {
    source: Mutex<Vec<String>>,
    document: Mutex<Vec<Arc<MemoryAnchor>>>,
    load_listeners: Mutex<Vec<Listener>>,
    reloads: AtomicUsize,
}

impl MemoryPreview {
    /// Create a preview with its initial document already loaded
    pub fn new<I, S>(hrefs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let source: Vec<String> = hrefs.into_iter().map(Into::into).collect();
        let document = Self::render(&source);
        Self {
            source: Mutex::new(source),
            document: Mutex::new(document),
            load_listeners: Mutex::new(Vec::new()),
            reloads: AtomicUsize::new(0),
        }
    }

    fn render(source: &[String]) -> Vec<Arc<MemoryAnchor>> {
        source
            .iter()
            .map(|href| Arc::new(MemoryAnchor::new(href.clone())))
            .collect()
    }

    /// Change the links the next load will render
    pub fn set_links<I, S>(&self, hrefs: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.source.lock() = hrefs.into_iter().map(Into::into).collect();
    }

    pub fn current_anchors(&self) -> Vec<Arc<MemoryAnchor>> {
        self.document.lock().clone()
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl PreviewSurface for MemoryPreview {
    fn reload(&self) {
        let document = Self::render(&self.source.lock());
        *self.document.lock() = document;
        self.reloads.fetch_add(1, Ordering::SeqCst);
        fire(&self.load_listeners);
    }

    fn anchors(&self) -> Vec<Arc<dyn Anchor>> {
        self.document
            .lock()
            .iter()
            .map(|anchor| Arc::clone(anchor) as Arc<dyn Anchor>)
            .collect()
    }

    fn on_load(&self, listener: Listener) {
        self.load_listeners.lock().push(listener);
    }
}

/// Form submitter that records what it was given
pub struct RecordingSubmitter {
    submissions: Mutex<Vec<FormSubmission>>,
    outcome: Mutex<SubmitOutcome>,
}

impl RecordingSubmitter {
    pub fn new() -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            outcome: Mutex::new(SubmitOutcome::Saved { location: None }),
        }
    }

    /// Outcome returned by subsequent submissions
    pub fn respond_with(&self, outcome: SubmitOutcome) {
        *self.outcome.lock() = outcome;
    }

    pub fn submissions(&self) -> Vec<FormSubmission> {
        self.submissions.lock().clone()
    }
}

impl Default for RecordingSubmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FormSubmitter for RecordingSubmitter {
    async fn submit(&self, submission: FormSubmission) -> Result<SubmitOutcome> {
        self.submissions.lock().push(submission);
        Ok(self.outcome.lock().clone())
    }
}

struct MemoryForm {
    fields: HashMap<String, Arc<dyn TextField>>,
    submitter: Arc<dyn FormSubmitter>,
}

impl PageForm for MemoryForm {
    fn field(&self, name: &str) -> Option<Arc<dyn TextField>> {
        self.fields.get(name).cloned()
    }

    fn submitter(&self) -> Arc<dyn FormSubmitter> {
        Arc::clone(&self.submitter)
    }
}

/// A complete edit page: form, save button and preview
pub struct MemoryEditPage {
    selectors: PageSelectors,
    pub new_content: Arc<MemoryField>,
    pub old_content: Arc<MemoryField>,
    pub save_button: Arc<MemoryButton>,
    pub preview: Arc<MemoryPreview>,
    pub submitter: Arc<RecordingSubmitter>,
    has_form: bool,
    has_save_button: bool,
    has_preview: bool,
}

impl MemoryEditPage {
    /// Page freshly loaded with `content` as both the live text and the baseline
    pub fn new(content: &str) -> Self {
        Self {
            selectors: PageSelectors::default(),
            new_content: Arc::new(MemoryField::new(content)),
            old_content: Arc::new(MemoryField::new(content)),
            save_button: Arc::new(MemoryButton::new()),
            preview: Arc::new(MemoryPreview::new(Vec::<String>::new())),
            submitter: Arc::new(RecordingSubmitter::new()),
            has_form: true,
            has_save_button: true,
            has_preview: true,
        }
    }

    pub fn with_selectors(mut self, selectors: PageSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_preview_links<I, S>(mut self, hrefs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preview = Arc::new(MemoryPreview::new(hrefs));
        self
    }

    /// A page that is not an edit page
    pub fn without_form(mut self) -> Self {
        self.has_form = false;
        self
    }

    pub fn without_save_button(mut self) -> Self {
        self.has_save_button = false;
        self
    }

    pub fn without_preview(mut self) -> Self {
        self.has_preview = false;
        self
    }

    /// Collaborators for direct construction, bypassing lookups
    pub fn collaborators(&self) -> PageCollaborators {
        PageCollaborators {
            form: EditForm {
                new_content: self.new_content.clone(),
                old_content: self.old_content.clone(),
                submitter: self.submitter.clone(),
            },
            save_button: self.save_button.clone(),
            preview: self.preview.clone(),
        }
    }
}

impl HostPage for MemoryEditPage {
    fn form(&self, name: &str) -> Option<Arc<dyn PageForm>> {
        if !self.has_form || name != self.selectors.form_name {
            return None;
        }

        let mut fields: HashMap<String, Arc<dyn TextField>> = HashMap::new();
        fields.insert(
            self.selectors.new_content_field.clone(),
            self.new_content.clone(),
        );
        fields.insert(
            self.selectors.old_content_field.clone(),
            self.old_content.clone(),
        );

        Some(Arc::new(MemoryForm {
            fields,
            submitter: self.submitter.clone(),
        }))
    }

    fn button_by_id(&self, id: &str) -> Option<Arc<dyn SaveButton>> {
        (self.has_save_button && id == self.selectors.save_button_id)
            .then(|| self.save_button.clone() as Arc<dyn SaveButton>)
    }

    fn preview_by_selector(&self, selector: &str) -> Option<Arc<dyn PreviewSurface>> {
        (self.has_preview && selector == self.selectors.preview_selector)
            .then(|| self.preview.clone() as Arc<dyn PreviewSurface>)
    }
}

/// Transport answering from a script of canned responses
///
/// Requests are recorded as soon as they are issued. A gated transport holds
/// every request until [`ScriptedTransport::release`] lets it complete, which
/// keeps requests visibly in flight. When the script runs dry the server is
/// assumed to accept the content unchanged.
pub struct ScriptedTransport {
    requests: Mutex<Vec<SaveRequest>>,
    responses: Mutex<VecDeque<std::result::Result<TransportResponse, String>>>,
    gate: Option<Semaphore>,
}

impl ScriptedTransport {
    /// Transport that completes every request immediately
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            gate: None,
        }
    }

    /// Transport that holds requests until released
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn push_response(&self, response: TransportResponse) {
        self.responses.lock().push_back(Ok(response));
    }

    pub fn push_save_response(&self, result: SaveResult, updated_content: &str) {
        self.push_response(TransportResponse::ok(&SaveResponse {
            result,
            updated_content: updated_content.to_string(),
        }));
    }

    pub fn push_failure(&self, message: &str) {
        self.responses.lock().push_back(Err(message.to_string()));
    }

    /// Let `count` held requests complete
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    pub fn requests(&self) -> Vec<SaveRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SaveTransport for ScriptedTransport {
    async fn put(&self, request: &SaveRequest) -> Result<TransportResponse> {
        self.requests.lock().push(request.clone());

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| WatomError::transport(e.to_string()))?
                .forget();
        }

        let scripted = self.responses.lock().pop_front();
        match scripted {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(WatomError::transport(message)),
            None => Ok(TransportResponse::ok(&SaveResponse {
                result: SaveResult::Ok,
                updated_content: request.new_content.clone(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_text_fires_listeners_but_set_value_does_not() {
        let field = MemoryField::new("A");
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        field.on_input(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        field.type_text("AB");
        field.set_value("AC");

        assert_eq!(field.value(), "AC");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_button_classes() {
        let button = MemoryButton::new();
        button.add_class("btn");
        button.add_class("saving");
        button.add_class("saving");
        assert_eq!(button.class_name(), "btn saving");

        button.remove_class("saving");
        assert!(!button.has_class("saving"));
        assert!(button.has_class("btn"));
    }

    #[test]
    fn test_preview_reload_renders_new_document_and_fires_load() {
        let preview = Arc::new(MemoryPreview::new(["/a"]));
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        preview.on_load(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let before = preview.current_anchors();
        preview.set_links(["/a", "/b"]);
        preview.reload();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(preview.reload_count(), 1);
        assert_eq!(preview.anchors().len(), 2);
        assert!(!Arc::ptr_eq(&before[0], &preview.current_anchors()[0]));
    }

    #[test]
    fn test_page_lookups_follow_selectors() {
        let page = MemoryEditPage::new("text");
        let selectors = PageSelectors::default();

        let form = page.form(&selectors.form_name).unwrap();
        assert_eq!(form.field("new_content").unwrap().value(), "text");
        assert!(form.field("body").is_none());
        assert!(page.form("other_form").is_none());
        assert!(page.button_by_id("btn_save").is_some());
        assert!(page.preview_by_selector(".j-preview-frame").is_some());

        let bare = MemoryEditPage::new("text").without_form().without_preview();
        assert!(bare.form("page_edit").is_none());
        assert!(bare.preview_by_selector(".j-preview-frame").is_none());
    }

    #[tokio::test]
    async fn test_scripted_transport_defaults_to_echo() {
        let transport = ScriptedTransport::new();
        transport.push_failure("connection reset");

        let request = SaveRequest::new("AB", "A");
        assert!(transport.put(&request).await.is_err());

        let response = transport.put(&request).await.unwrap();
        let parsed = SaveResponse::parse(&response.body).unwrap();
        assert_eq!(parsed.result, SaveResult::Ok);
        assert_eq!(parsed.updated_content, "AB");
        assert_eq!(transport.request_count(), 2);
    }
}
