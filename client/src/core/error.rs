//! Velp Error Definitions
//!
//! Defines error types used throughout the client.

use thiserror::Error;

use super::TaskId;

/// Core client error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Input Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("A submission is already in progress")]
    SubmissionInProgress,

    // =========================================================================
    // Transport Errors
    // =========================================================================
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Backend error ({status}): {message}")]
    BackendError { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    DecodeError(String),

    // =========================================================================
    // Task Errors
    // =========================================================================
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Task is not ready for playback: {0}")]
    TaskNotReady(TaskId),

    // =========================================================================
    // Data Errors
    // =========================================================================
    #[error("Data error: {0}")]
    DataError(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Settings error: {0}")]
    SettingsError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core client result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Returns true for failures that a later retry may clear on its own
    /// (transport failures, throttling and server-side 5xx responses).
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::NetworkError(_) => true,
            CoreError::BackendError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Formats a one-shot, user-facing notice for a failed action.
    pub fn to_notice(&self, action: &str) -> String {
        format!("{} failed: {}", action, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CoreError::NetworkError("connection reset".to_string()).is_transient());
        assert!(CoreError::BackendError {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_transient());
        assert!(CoreError::BackendError {
            status: 429,
            message: "slow down".to_string()
        }
        .is_transient());
        assert!(!CoreError::BackendError {
            status: 400,
            message: "URL is required".to_string()
        }
        .is_transient());
        assert!(!CoreError::ValidationError("empty".to_string()).is_transient());
    }

    #[test]
    fn test_notice_includes_detail() {
        let err = CoreError::NetworkError("connection refused".to_string());
        assert_eq!(
            err.to_notice("Delete"),
            "Delete failed: Network error: connection refused"
        );
    }
}
