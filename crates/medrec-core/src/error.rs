use thiserror::Error;

/// Core error types for medrec operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid setting {name}: {message}")]
    InvalidSetting { name: String, message: String },
}

impl CoreError {
    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a new InvalidSetting error
    pub fn invalid_setting(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSetting {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::JsonError(_) => ErrorCategory::Serialization,
            Self::Configuration(_) | Self::InvalidSetting { .. } => ErrorCategory::Configuration,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Serialization,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization => write!(f, "serialization"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error() {
        let err = CoreError::configuration("missing base_url");
        assert_eq!(err.to_string(), "Configuration error: missing base_url");
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_invalid_setting_error() {
        let err = CoreError::invalid_setting("http.max_retries", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid setting http.max_retries: must be at least 1"
        );
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err: serde_json::Error =
            serde_json::from_str::<serde_json::Value>("{ invalid }").unwrap_err();
        let core_err: CoreError = json_err.into();

        assert!(matches!(core_err, CoreError::JsonError(_)));
        assert_eq!(core_err.category(), ErrorCategory::Serialization);
    }

    #[test]
    fn test_error_categories_display() {
        assert_eq!(ErrorCategory::Serialization.to_string(), "serialization");
        assert_eq!(ErrorCategory::Configuration.to_string(), "configuration");
    }
}
