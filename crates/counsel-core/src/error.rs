//! Error types for Counsel Core
//!
//! This module defines all error types used throughout the counsel engine.
//! Precondition violations (`InvalidWeight`, `InvalidScore`, `InvalidTarget`)
//! are caller bugs and are never retried. `GenerationError` is transient and is
//! retried once by whichever stateful component owns the call site.

use thiserror::Error;

/// Result type alias for Counsel operations
pub type Result<T> = std::result::Result<T, CounselError>;

/// Main error type for Counsel operations
#[derive(Error, Debug)]
pub enum CounselError {
    /// School weights do not sum to 1.0 or fall outside [0, 1]
    #[error("Invalid weights for {school}: {reason}")]
    InvalidWeight { school: String, reason: String },

    /// A dimension score is missing or outside [1, 5]
    #[error("Invalid score for {school}: {reason}")]
    InvalidScore { school: String, reason: String },

    /// Page target or section list rejected by the length controller
    #[error("Invalid length target: {0}")]
    InvalidTarget(String),

    /// External generation failed after the allowed retry
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Text still carries an unresolved placeholder
    #[error("Placeholder violation: {0:?}")]
    PlaceholderViolation(Vec<String>),

    /// A report section produced no usable draft
    #[error("Section '{section}' could not be generated: {source}")]
    SectionFailed {
        section: String,
        #[source]
        source: GenerationError,
    },

    /// The run was cancelled before the document was complete
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation not permitted in the current conversation status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parse errors
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<CounselError>,
    },
}

/// Errors raised by the external text generator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Generation timed out after {0}ms")]
    Timeout(u64),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Malformed output: {0}")]
    Malformed(String),
}

impl CounselError {
    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True for caller bugs that must surface immediately
    pub fn is_precondition(&self) -> bool {
        match self {
            CounselError::InvalidWeight { .. }
            | CounselError::InvalidScore { .. }
            | CounselError::InvalidTarget(_) => true,
            CounselError::WithContext { source, .. } => source.is_precondition(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context() {
        let err = CounselError::InvalidTarget("target_pages must be positive".to_string());
        let err = err.context("Failed to allocate sections");

        assert!(err.to_string().contains("Failed to allocate sections"));
        assert!(err.is_precondition());
    }

    #[test]
    fn test_result_ext() {
        let result: Result<()> = Err(GenerationError::Timeout(500).into());
        let result = result.with_context(|| "Advisor turn".to_string());

        let err = result.unwrap_err();
        assert!(err.to_string().contains("Advisor turn"));
        assert!(!err.is_precondition());
    }

    #[test]
    fn test_generation_error_display() {
        let err = GenerationError::Provider("HTTP 503".to_string());
        assert_eq!(err.to_string(), "Provider error: HTTP 503");
    }
}
