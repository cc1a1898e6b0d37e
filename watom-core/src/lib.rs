//! Watom Core - shared foundations for the Watom wiki editor client
//!
//! This crate provides the error type, configuration and event bus used by the
//! autosave controller and the command line client.

pub mod config;
pub mod error;
pub mod event;


// Re-export commonly used types
pub use config::{
    AutosaveConfig, Config, PageSelectors, ValidationError, ValidationErrorType,
    ValidationResult, ValidationWarning,
};
pub use error::{ErrorSeverity, Result, WatomError};
pub use event::{AutosaveEvent, AutosaveEventHandler, EventBus, InMemoryEventBus, SubscriptionId};
