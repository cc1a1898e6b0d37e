//! Configuration management for the Watom client

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, WatomError};

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// URL of the page being edited; saves are sent here
    pub page_url: Option<String>,
    pub autosave: AutosaveConfig,
    pub selectors: PageSelectors,
    pub log_level: String,
}

impl Config {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            page_url: None,
            autosave: AutosaveConfig::default(),
            selectors: PageSelectors::default(),
            log_level: "info".to_string(),
        }
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WatomError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| WatomError::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| WatomError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| WatomError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Default location of the user configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("watom").join("config.json"))
    }

    /// Validate the configuration, failing on the first error
    pub fn validate(&self) -> Result<()> {
        let result = self.validate_comprehensive();
        match result.errors.first() {
            Some(error) => Err(WatomError::Config(format!(
                "{}: {}",
                error.field_path, error.message
            ))),
            None => Ok(()),
        }
    }

    /// Validate the configuration and collect every error and warning
    pub fn validate_comprehensive(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if let Some(page_url) = &self.page_url {
            match url::Url::parse(page_url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(parsed) => result.errors.push(ValidationError {
                    field_path: "page_url".to_string(),
                    error_type: ValidationErrorType::InvalidValue,
                    message: format!("Unsupported URL scheme '{}'", parsed.scheme()),
                    suggested_fix: Some("Use an http:// or https:// page URL".to_string()),
                }),
                Err(e) => result.errors.push(ValidationError {
                    field_path: "page_url".to_string(),
                    error_type: ValidationErrorType::InvalidFormat,
                    message: format!("Invalid page URL: {}", e),
                    suggested_fix: None,
                }),
            }
        }

        self.autosave.validate_into(&mut result);
        self.selectors.validate_into(&mut result);

        if !matches!(
            self.log_level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            result.warnings.push(ValidationWarning {
                field_path: "log_level".to_string(),
                message: format!("Unknown log level '{}', falling back to info", self.log_level),
            });
        }

        result.is_valid = result.errors.is_empty();
        result
    }

    /// Apply environment variable overrides
    pub fn apply_environment_overrides(
        &mut self,
        env_overrides: &HashMap<String, String>,
    ) -> Result<()> {
        for (key, value) in env_overrides {
            match key.as_str() {
                "WATOM_PAGE_URL" => self.page_url = Some(value.clone()),
                "WATOM_QUIET_PERIOD_MS" => {
                    self.autosave.quiet_period_ms = value.parse().map_err(|_| {
                        WatomError::Config(format!(
                            "Invalid quiet period in environment variable: {}",
                            value
                        ))
                    })?;
                }
                "WATOM_SERIALIZE_SAVES" => {
                    self.autosave.serialize_saves = value.parse().map_err(|_| {
                        WatomError::Config(format!(
                            "Invalid boolean in environment variable: {}",
                            value
                        ))
                    })?;
                }
                "WATOM_LOG_LEVEL" => self.log_level = value.to_lowercase(),
                _ => {}
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Timing and policy knobs for the autosave controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Quiet window after the last edit before a save fires
    pub quiet_period_ms: u64,
    /// How long the saving marker stays visible after a successful save
    pub saving_linger_ms: u64,
    /// Hold back a new save while another one is in flight
    pub serialize_saves: bool,
    /// Upper bound for a single save request; `None` waits forever
    pub request_timeout_ms: Option<u64>,
    /// Class toggled on the save button while saving
    pub saving_class: String,
}

impl AutosaveConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn saving_linger(&self) -> Duration {
        Duration::from_millis(self.saving_linger_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    fn validate_into(&self, result: &mut ValidationResult) {
        if self.quiet_period_ms == 0 {
            result.errors.push(ValidationError {
                field_path: "autosave.quiet_period_ms".to_string(),
                error_type: ValidationErrorType::InvalidValue,
                message: "Quiet period must be greater than zero".to_string(),
                suggested_fix: Some("Use the default of 2000".to_string()),
            });
        }

        if self.request_timeout_ms == Some(0) {
            result.errors.push(ValidationError {
                field_path: "autosave.request_timeout_ms".to_string(),
                error_type: ValidationErrorType::InvalidValue,
                message: "Request timeout must be greater than zero".to_string(),
                suggested_fix: Some("Remove the field to wait indefinitely".to_string()),
            });
        }

        if self.saving_class.trim().is_empty() || self.saving_class.contains(char::is_whitespace)
        {
            result.errors.push(ValidationError {
                field_path: "autosave.saving_class".to_string(),
                error_type: ValidationErrorType::InvalidFormat,
                message: "Saving class must be a single non-empty class name".to_string(),
                suggested_fix: Some("Use \"saving\"".to_string()),
            });
        }

        if !self.serialize_saves {
            result.warnings.push(ValidationWarning {
                field_path: "autosave.serialize_saves".to_string(),
                message: "Overlapping saves may apply responses out of order".to_string(),
            });
        }
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: 2000,
            saving_linger_ms: 500,
            serialize_saves: true,
            request_timeout_ms: None,
            saving_class: "saving".to_string(),
        }
    }
}

/// Names the controller uses to find its collaborators on the host page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSelectors {
    pub form_name: String,
    pub new_content_field: String,
    pub old_content_field: String,
    pub save_button_id: String,
    pub preview_selector: String,
}

impl PageSelectors {
    fn validate_into(&self, result: &mut ValidationResult) {
        let fields = [
            ("selectors.form_name", &self.form_name),
            ("selectors.new_content_field", &self.new_content_field),
            ("selectors.old_content_field", &self.old_content_field),
            ("selectors.save_button_id", &self.save_button_id),
            ("selectors.preview_selector", &self.preview_selector),
        ];

        for (path, value) in fields {
            if value.trim().is_empty() {
                result.errors.push(ValidationError {
                    field_path: path.to_string(),
                    error_type: ValidationErrorType::MissingRequired,
                    message: "Selector must not be empty".to_string(),
                    suggested_fix: None,
                });
            }
        }

        if self.new_content_field == self.old_content_field {
            result.errors.push(ValidationError {
                field_path: "selectors.old_content_field".to_string(),
                error_type: ValidationErrorType::InvalidValue,
                message: "Content and baseline fields must differ".to_string(),
                suggested_fix: None,
            });
        }
    }
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            form_name: "page_edit".to_string(),
            new_content_field: "new_content".to_string(),
            old_content_field: "old_content".to_string(),
            save_button_id: "btn_save".to_string(),
            preview_selector: ".j-preview-frame".to_string(),
        }
    }
}

/// Outcome of a comprehensive validation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub field_path: String,
    pub error_type: ValidationErrorType,
    pub message: String,
    pub suggested_fix: Option<String>,
}

/// Configuration validation warning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub field_path: String,
    pub message: String,
}

/// Types of validation errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationErrorType {
    MissingRequired,
    InvalidValue,
    InvalidFormat,
}
