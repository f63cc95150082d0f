//! Error types for FaceLens

use std::time::Duration;
use thiserror::Error;

/// Main error type for FaceLens operations
#[derive(Error, Debug)]
pub enum FaceLensError {
    /// Initialization error
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },

    /// Missing configuration error
    #[error("Missing required configuration: {field}")]
    MissingConfiguration {
        /// Missing configuration field
        field: String,
    },

    /// Configuration could not be parsed or failed validation
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Reason the configuration was rejected
        reason: String,
    },

    /// Media processing error
    #[error("Media processing error: {reason}")]
    MediaProcessing {
        /// Reason for media error
        reason: String,
    },

    /// Camera error
    #[error("Camera error: {reason}")]
    Camera {
        /// Reason for camera error
        reason: String,
        /// Whether the hosting screen should be torn down
        fatal: bool,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Session limit exceeded
    #[error("Session limit exceeded: {limit}")]
    SessionLimitExceeded {
        /// Maximum number of concurrent sessions
        limit: usize,
    },

    /// Session not found
    #[error("Session not found: {session_id}")]
    SessionNotFound {
        /// Session identifier
        session_id: String,
    },

    /// Operation timed out error
    #[error("Operation timed out: {operation} after {duration:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Duration after which timeout occurred
        duration: Duration,
    },

    /// Worker thread is gone
    #[error("Worker {name} is not running")]
    WorkerStopped {
        /// Worker thread name
        name: String,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        /// Underlying error
        #[from]
        source: std::io::Error,
    },

    /// JSON error
    #[error("JSON error: {source}")]
    Json {
        /// Underlying error
        #[from]
        source: serde_json::Error,
    },
}

impl FaceLensError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            FaceLensError::Initialization { .. } => "INITIALIZATION_FAILED".to_string(),
            FaceLensError::MissingConfiguration { .. } => "MISSING_CONFIGURATION".to_string(),
            FaceLensError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION".to_string(),
            FaceLensError::MediaProcessing { .. } => "MEDIA_PROCESSING_ERROR".to_string(),
            FaceLensError::Camera { .. } => "CAMERA_ERROR".to_string(),
            FaceLensError::InvalidState { .. } => "INVALID_STATE".to_string(),
            FaceLensError::SessionLimitExceeded { .. } => "SESSION_LIMIT_EXCEEDED".to_string(),
            FaceLensError::SessionNotFound { .. } => "SESSION_NOT_FOUND".to_string(),
            FaceLensError::Timeout { .. } => "TIMEOUT".to_string(),
            FaceLensError::WorkerStopped { .. } => "WORKER_STOPPED".to_string(),
            FaceLensError::Io { .. } => "IO_ERROR".to_string(),
            FaceLensError::Json { .. } => "JSON_ERROR".to_string(),
        }
    }

    /// Whether the caller can keep the current screen alive after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            FaceLensError::Camera { fatal, .. } => !fatal,
            FaceLensError::Timeout { .. } => false,
            FaceLensError::WorkerStopped { .. } => false,
            FaceLensError::Initialization { .. } => false,
            FaceLensError::MediaProcessing { .. } => true,
            FaceLensError::SessionLimitExceeded { .. } => true,
            FaceLensError::SessionNotFound { .. } => true,
            FaceLensError::Io { .. } => true,
            _ => false,
        }
    }
}
