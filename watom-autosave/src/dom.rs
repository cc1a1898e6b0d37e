//! Host page collaborators the autosave controller depends on
//!
//! The controller never reaches for a global document. Every element it reads or
//! mutates is handed to it through these traits, so a browser binding, a terminal
//! client and the in-memory doubles in [`crate::memory`] are interchangeable.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use watom_core::Result;

use crate::protocol::{FormSubmission, SubmitOutcome};

/// Callback fired by an element event (input, click, load)
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Callback fired when an anchor is clicked
pub type ClickListener = Arc<dyn Fn(&mut ClickEvent) + Send + Sync>;

/// Call every registered listener
///
/// Listeners may call back into the element that fired them, so they run outside
/// the lock.
pub fn fire_listeners(listeners: &Mutex<Vec<Listener>>) {
    let listeners: Vec<Listener> = listeners.lock().clone();
    for listener in listeners {
        listener();
    }
}

/// A text value held by the host form
pub trait TextField: Send + Sync {
    /// Current value
    fn value(&self) -> String;

    /// Replace the value; this does not fire input listeners
    fn set_value(&self, value: &str);

    /// Register a listener for user edits
    fn on_input(&self, listener: Listener);
}

/// The save button, whose class set carries the saving state
pub trait SaveButton: Send + Sync {
    fn add_class(&self, class: &str);

    fn remove_class(&self, class: &str);

    fn has_class(&self, class: &str) -> bool;

    /// Register a listener for clicks
    fn on_click(&self, listener: Listener);
}

/// Click dispatched to an anchor inside the preview document
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    default_prevented: bool,
}

impl ClickEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the default action (navigation)
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// A hyperlink inside the preview document
pub trait Anchor: Send + Sync {
    fn href(&self) -> String;

    fn add_click_listener(&self, listener: ClickListener);
}

/// Embedded document viewer showing the saved page
pub trait PreviewSurface: Send + Sync {
    /// Reload the document; the load listeners fire once the new document is in place
    fn reload(&self);

    /// Anchors of the currently loaded document
    fn anchors(&self) -> Vec<Arc<dyn Anchor>>;

    /// Register a listener for document loads
    fn on_load(&self, listener: Listener);
}

/// Navigational (full page) submission of the edit form
#[async_trait]
pub trait FormSubmitter: Send + Sync {
    async fn submit(&self, submission: FormSubmission) -> Result<SubmitOutcome>;
}

/// A form found on the host page
pub trait PageForm: Send + Sync {
    /// Look up a named field
    fn field(&self, name: &str) -> Option<Arc<dyn TextField>>;

    /// The form's submission target
    fn submitter(&self) -> Arc<dyn FormSubmitter>;
}

/// Lookup surface of the host page, used only while bootstrapping
pub trait HostPage: Send + Sync {
    /// `document.forms[name]`
    fn form(&self, name: &str) -> Option<Arc<dyn PageForm>>;

    /// `document.getElementById(id)` for the save button
    fn button_by_id(&self, id: &str) -> Option<Arc<dyn SaveButton>>;

    /// First element matching `selector` that behaves as a preview surface
    fn preview_by_selector(&self, selector: &str) -> Option<Arc<dyn PreviewSurface>>;
}

/// The edit buffer: live content, its server baseline and the form that owns them
#[derive(Clone)]
pub struct EditForm {
    pub new_content: Arc<dyn TextField>,
    pub old_content: Arc<dyn TextField>,
    pub submitter: Arc<dyn FormSubmitter>,
}

impl EditForm {
    /// Snapshot both field values for a submission
    pub fn submission(&self) -> FormSubmission {
        FormSubmission {
            new_content: self.new_content.value(),
            old_content: self.old_content.value(),
        }
    }

    /// Whether the live content differs from the baseline
    pub fn is_dirty(&self) -> bool {
        self.new_content.value() != self.old_content.value()
    }
}

impl std::fmt::Debug for EditForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditForm")
            .field("new_content_len", &self.new_content.value().len())
            .field("old_content_len", &self.old_content.value().len())
            .finish()
    }
}

/// Everything the controller is wired to
#[derive(Clone)]
pub struct PageCollaborators {
    pub form: EditForm,
    pub save_button: Arc<dyn SaveButton>,
    pub preview: Arc<dyn PreviewSurface>,
}
