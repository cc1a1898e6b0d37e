//! Watom Autosave - debounced quick saves for the wiki page editor
//!
//! The controller watches the edit form, collapses bursts of edits into one
//! PUT of `{new_content, old_content}` to the page URL, and applies the server's
//! merge verdict back to the form. It also keeps the preview's links inert and
//! leaves the save button's full form submission untouched.
//!
//! Host elements are reached only through the traits in [`dom`]; [`memory`] has
//! headless implementations of all of them.

pub mod controller;
pub mod dom;
pub mod links;
pub mod memory;
pub mod protocol;
pub mod scheduler;
pub mod transport;

use std::time::Duration;
use thiserror::Error;
use watom_core::WatomError;

pub use controller::AutosaveController;
pub use dom::{
    Anchor, ClickEvent, ClickListener, EditForm, FormSubmitter, HostPage, Listener,
    PageCollaborators, PageForm, PreviewSurface, SaveButton, TextField,
};
pub use protocol::{
    FormSubmission, SaveOutcome, SaveRequest, SaveResponse, SaveResult, SubmitOutcome,
    TransportResponse,
};
pub use scheduler::DebounceScheduler;
pub use transport::{edit_endpoint, HttpFormSubmitter, HttpTransport, SaveTransport};

/// Failures specific to the autosave layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutosaveError {
    #[error("Server answered with status {0}")]
    UnexpectedStatus(u16),

    #[error("Save request timed out after {0:?}")]
    RequestTimedOut(Duration),

    #[error("Missing page element: {0}")]
    MissingElement(String),
}

impl From<AutosaveError> for WatomError {
    fn from(err: AutosaveError) -> Self {
        match err {
            AutosaveError::UnexpectedStatus(_) | AutosaveError::RequestTimedOut(_) => {
                WatomError::transport(err.to_string())
            }
            AutosaveError::MissingElement(_) => WatomError::dom(err.to_string()),
        }
    }
}
