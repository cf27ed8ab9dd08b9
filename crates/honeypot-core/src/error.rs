//! Error types for the honeypot

use thiserror::Error;

/// Main error type for the honeypot
#[derive(Error, Debug)]
pub enum HoneypotError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Response corpus could not be read or parsed
    #[error("Load error: {0}")]
    Load(String),

    /// Registry snapshot could not be read or written
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Upstream manifest fetch failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Request body could not be understood
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for honeypot operations
pub type HoneypotResult<T> = Result<T, HoneypotError>;

impl From<serde_json::Error> for HoneypotError {
    fn from(err: serde_json::Error) -> Self {
        HoneypotError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for HoneypotError {
    fn from(err: toml::de::Error) -> Self {
        HoneypotError::Config(err.to_string())
    }
}

impl HoneypotError {
    /// Whether the error should be reported to the peer as a missing model
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            HoneypotError::ModelNotFound(_) | HoneypotError::Upstream(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HoneypotError::ModelNotFound("llama3:latest".to_string());
        assert_eq!(err.to_string(), "Model not found: llama3:latest");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HoneypotError = io_err.into();
        assert!(matches!(err, HoneypotError::Io(_)));
    }

    #[test]
    fn test_not_found_classification() {
        assert!(HoneypotError::Upstream("status 404".to_string()).is_not_found());
        assert!(!HoneypotError::InvalidRequest("bad".to_string()).is_not_found());
    }
}
