//! Media processing error types and handling
//!
//! This module defines the error types used by the playback pipeline, the
//! detection processor and the camera controller, with enough context to
//! decide whether the hosting screen can stay alive.

use facelens_core::FaceLensError;
use std::time::Duration;
use thiserror::Error;

/// Main error type for media processing operations
#[derive(Error, Debug)]
pub enum MediaError {
    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        /// Underlying error
        #[from]
        source: std::io::Error,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Decoding operation failed
    #[error("Decoding failed: {codec} - {reason}")]
    DecodingFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Codec initialization failed
    #[error("Codec initialization failed: {codec} - {reason}")]
    CodecInitializationFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Unsupported format error
    #[error("Unsupported format: {format}")]
    UnsupportedFormat {
        /// Format description
        format: String,
    },

    /// Invalid frame data error
    #[error("Invalid frame data: expected {expected} bytes, got {actual}")]
    InvalidFrameData {
        /// Expected data size
        expected: usize,
        /// Actual data size
        actual: usize,
    },

    /// No track of the source could be decoded
    #[error("No decodable video track in {source_uri}")]
    NoVideoTrack {
        /// Source URI
        source_uri: String,
    },

    /// Source could not be parsed or opened
    #[error("Invalid source {source_uri}: {reason}")]
    InvalidSource {
        /// Source as given by the caller
        source_uri: String,
        /// Failure reason
        reason: String,
    },

    /// Invalid state for operation
    #[error("Invalid state: {message}")]
    InvalidState {
        /// State error message
        message: String,
    },

    /// Resource not available
    #[error("Resource not available: {resource}")]
    ResourceNotAvailable {
        /// Resource name
        resource: String,
    },

    /// Face detector failed on a frame
    #[error("Detection failed: {reason}")]
    DetectionFailed {
        /// Failure reason
        reason: String,
    },

    /// Camera error
    #[error("Camera error: {source}")]
    Camera {
        /// Underlying camera error
        #[from]
        source: CameraError,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::Io { .. } => true,
            MediaError::ResourceNotAvailable { .. } => true,
            MediaError::DetectionFailed { .. } => true,
            MediaError::DecodingFailed { .. } => true,
            MediaError::NoVideoTrack { .. } => true,
            MediaError::UnsupportedFormat { .. } => false,
            MediaError::CodecInitializationFailed { .. } => false,
            MediaError::InvalidSource { .. } => false,
            MediaError::Camera { source } => source.is_recoverable(),
            _ => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::Io { .. } => ErrorCategory::System,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            MediaError::DecodingFailed { .. } => ErrorCategory::Codec,
            MediaError::CodecInitializationFailed { .. } => ErrorCategory::Codec,
            MediaError::UnsupportedFormat { .. } => ErrorCategory::Format,
            MediaError::InvalidFrameData { .. } => ErrorCategory::Data,
            MediaError::NoVideoTrack { .. } => ErrorCategory::Format,
            MediaError::InvalidSource { .. } => ErrorCategory::Source,
            MediaError::InvalidState { .. } => ErrorCategory::State,
            MediaError::ResourceNotAvailable { .. } => ErrorCategory::System,
            MediaError::DetectionFailed { .. } => ErrorCategory::Detection,
            MediaError::Camera { .. } => ErrorCategory::Device,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// System-level errors (I/O, timeouts, etc.)
    System,
    /// Configuration and parameter errors
    Configuration,
    /// Codec-related errors
    Codec,
    /// Format and data structure errors
    Format,
    /// Data validation errors
    Data,
    /// Source descriptor errors
    Source,
    /// Device and hardware errors
    Device,
    /// State management errors
    State,
    /// Face detection errors
    Detection,
}

/// Errors raised while opening or closing a camera
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// Device could not be accessed (disconnected, in use, disabled)
    #[error("Cannot access the camera {camera_id}: {reason}")]
    Access {
        /// Camera identifier
        camera_id: String,
        /// Failure reason
        reason: String,
    },

    /// Characteristics carry no stream configuration map
    #[error("Cannot get available preview/video sizes for camera {camera_id}")]
    MissingStreamConfiguration {
        /// Camera identifier
        camera_id: String,
    },

    /// The open/close gate could not be taken in time
    #[error("Time out waiting to lock camera opening after {timeout:?}")]
    LockTimeout {
        /// How long the open waited
        timeout: Duration,
    },

    /// No camera at the requested position
    #[error("No camera at index {index} ({available} available)")]
    DeviceNotFound {
        /// Requested index into the camera id list
        index: usize,
        /// Number of cameras reported by the manager
        available: usize,
    },

    /// Capture session could not be configured
    #[error("Capture session configuration failed: {reason}")]
    SessionConfigurationFailed {
        /// Failure reason
        reason: String,
    },
}

impl CameraError {
    /// Whether the open sequence can be retried without tearing down the screen
    pub fn is_recoverable(&self) -> bool {
        match self {
            CameraError::SessionConfigurationFailed { .. } => true,
            CameraError::Access { .. } => false,
            CameraError::MissingStreamConfiguration { .. } => false,
            CameraError::LockTimeout { .. } => false,
            CameraError::DeviceNotFound { .. } => false,
        }
    }

    /// Message suitable for showing to the user
    pub fn user_message(&self) -> &'static str {
        match self {
            CameraError::Access { .. } => "Cannot access the camera.",
            CameraError::MissingStreamConfiguration { .. } => {
                "Cannot get available preview/video sizes"
            }
            CameraError::LockTimeout { .. } => "Time out waiting to lock camera opening.",
            CameraError::DeviceNotFound { .. } => "This device doesn't support Camera2 API.",
            CameraError::SessionConfigurationFailed { .. } => "Failed to start camera preview.",
        }
    }
}

impl From<MediaError> for FaceLensError {
    fn from(error: MediaError) -> Self {
        match error {
            MediaError::Camera { source } => FaceLensError::Camera {
                fatal: !source.is_recoverable(),
                reason: source.to_string(),
            },
            MediaError::Io { source } => FaceLensError::Io { source },
            MediaError::InvalidConfiguration { message } => {
                FaceLensError::InvalidConfiguration { reason: message }
            }
            other => FaceLensError::MediaProcessing {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let io_error = MediaError::Io {
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        };
        assert_eq!(io_error.category(), ErrorCategory::System);
        assert!(io_error.is_recoverable());

        let codec_error = MediaError::CodecInitializationFailed {
            codec: "H.264".to_string(),
            reason: "Decoder not available".to_string(),
        };
        assert_eq!(codec_error.category(), ErrorCategory::Codec);
        assert!(!codec_error.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = MediaError::InvalidFrameData {
            expected: 1024,
            actual: 512,
        };
        assert_eq!(
            error.to_string(),
            "Invalid frame data: expected 1024 bytes, got 512"
        );

        let error = MediaError::NoVideoTrack {
            source_uri: "file:///sdcard/clip.mp4".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "No decodable video track in file:///sdcard/clip.mp4"
        );
    }

    #[test]
    fn test_camera_error_taxonomy() {
        let timeout = CameraError::LockTimeout {
            timeout: Duration::from_millis(2500),
        };
        assert!(!timeout.is_recoverable());

        let missing = CameraError::MissingStreamConfiguration {
            camera_id: "1".to_string(),
        };
        assert_eq!(
            missing.user_message(),
            "Cannot get available preview/video sizes"
        );

        let media: MediaError = missing.into();
        assert_eq!(media.category(), ErrorCategory::Device);
        assert!(!media.is_recoverable());
    }

    #[test]
    fn test_error_into_facelens_error() {
        let err: FaceLensError = MediaError::from(CameraError::Access {
            camera_id: "1".to_string(),
            reason: "disconnected".to_string(),
        })
        .into();

        match err {
            FaceLensError::Camera { fatal, reason } => {
                assert!(fatal);
                assert!(reason.contains("Cannot access the camera"));
            }
            other => panic!("Expected camera error, got {:?}", other),
        }

        let err: FaceLensError = MediaError::NoVideoTrack {
            source_uri: "memory://empty".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), "MEDIA_PROCESSING_ERROR");
    }
}
