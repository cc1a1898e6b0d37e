//! Error handling for the Watom client

use thiserror::Error;

/// Result type alias for Watom operations
pub type Result<T> = std::result::Result<T, WatomError>;

/// Main error type for the Watom client
#[derive(Error, Debug)]
pub enum WatomError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The save request could not be delivered or did not complete
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered, but the body is not a valid save response
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Host page collaborators are missing or misbehaving
    #[error("DOM error: {0}")]
    Dom(String),

    /// File system errors
    #[error("File system error: {0}")]
    FileSystem(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("Error: {0}")]
    Generic(String),
}

impl WatomError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a new invalid response error
    pub fn invalid_response<S: Into<String>>(msg: S) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create a new DOM error
    pub fn dom<S: Into<String>>(msg: S) -> Self {
        Self::Dom(msg.into())
    }

    /// Create a new file system error
    pub fn file_system<S: Into<String>>(msg: S) -> Self {
        Self::FileSystem(msg.into())
    }

    /// Create a generic error
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Self::Generic(msg.into())
    }

    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        match self {
            WatomError::Config(_) => false,
            WatomError::Transport(_) => true,
            WatomError::InvalidResponse(_) => true,
            WatomError::Dom(_) => false,
            WatomError::FileSystem(_) => true,
            WatomError::Io(_) => true,
            WatomError::Json(_) => false,
            WatomError::Generic(_) => true,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WatomError::Config(_) => ErrorSeverity::High,
            WatomError::Transport(_) => ErrorSeverity::Medium,
            WatomError::InvalidResponse(_) => ErrorSeverity::Medium,
            WatomError::Dom(_) => ErrorSeverity::Critical,
            WatomError::FileSystem(_) => ErrorSeverity::Medium,
            WatomError::Io(_) => ErrorSeverity::Medium,
            WatomError::Json(_) => ErrorSeverity::Low,
            WatomError::Generic(_) => ErrorSeverity::Low,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
