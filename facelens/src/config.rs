//! Configuration types and defaults

use crate::FaceLensError;
use facelens_media::{CameraFacing, Size};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming a JSON configuration file
pub const CONFIG_ENV_VAR: &str = "FACELENS_CONFIG";

/// Page the web screen opens by default
pub const DEFAULT_WEB_URL: &str =
    "https://www.videvo.net/videvo_files/converted/2018_04/preview/171215_C_19.mp473209.webm";

/// Global FaceLens configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Enable debug logging
    pub debug_logging: bool,
    /// Maximum number of concurrent sessions
    pub max_sessions: usize,
    /// Display refresh rate driving playback
    pub tick_rate_hz: u32,
    /// Decode session settings
    pub decoder: DecoderConfig,
    /// Face detection settings
    pub detection: DetectionConfig,
    /// Camera settings
    pub camera: CameraConfig,
    /// Web screen settings
    pub web: WebConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            debug_logging: false,
            max_sessions: 4,
            tick_rate_hz: 60,
            decoder: DecoderConfig::default(),
            detection: DetectionConfig::default(),
            camera: CameraConfig::default(),
            web: WebConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, FaceLensError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FaceLensError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Load from the file named by `FACELENS_CONFIG`, or defaults when unset
    pub fn from_env() -> Result<Self, FaceLensError> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.is_empty() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), FaceLensError> {
        if self.max_sessions == 0 {
            return Err(invalid("max_sessions must be at least 1"));
        }
        if self.tick_rate_hz == 0 || self.tick_rate_hz > 1000 {
            return Err(invalid("tick_rate_hz must be between 1 and 1000"));
        }
        if self.decoder.max_pending_outputs == 0 {
            return Err(invalid("decoder.max_pending_outputs must be at least 1"));
        }
        if self.decoder.frame_rate.is_nan() || self.decoder.frame_rate <= 0.0 {
            return Err(invalid("decoder.frame_rate must be positive"));
        }
        if self.detection.camera_image_max == 0 {
            return Err(invalid("detection.camera_image_max must be at least 1"));
        }
        if self.detection.player_frame.is_empty() {
            return Err(invalid("detection.player_frame must not be empty"));
        }
        if self.camera.lock_timeout_ms == 0 {
            return Err(invalid("camera.lock_timeout_ms must be at least 1"));
        }
        if self.web.frame_rate == 0 {
            return Err(invalid("web.frame_rate must be at least 1"));
        }
        url::Url::parse(&self.web.url)
            .map_err(|e| invalid(&format!("web.url is not a URL: {}", e)))?;
        Ok(())
    }
}

fn invalid(reason: &str) -> FaceLensError {
    FaceLensError::InvalidConfiguration {
        reason: reason.to_string(),
    }
}

/// Decode session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Decoded outputs a session holds before refusing input
    pub max_pending_outputs: usize,
    /// Frame rate stamped on elementary stream files
    pub frame_rate: f32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_pending_outputs: facelens_media::DEFAULT_MAX_PENDING_OUTPUTS,
            frame_rate: 30.0,
        }
    }
}

/// Face detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Longer side of camera images handed to the detector
    pub camera_image_max: u32,
    /// Size player frames are scaled to before detection
    pub player_frame: Size,
    /// Draw face outlines only
    pub show_only_contour: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            camera_image_max: 400,
            player_frame: Size::new(320, 180),
            show_only_contour: false,
        }
    }
}

/// Camera settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Position in the camera id list
    pub camera_index: usize,
    /// How long opening waits for the camera gate
    pub lock_timeout_ms: u64,
    /// Which way the configured camera faces
    pub facing: CameraFacing,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            camera_index: facelens_media::camera::DEFAULT_CAMERA_INDEX,
            lock_timeout_ms: 2500,
            facing: CameraFacing::Front,
        }
    }
}

impl CameraConfig {
    /// Lock timeout as a duration
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Web screen settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Page to open
    pub url: String,
    /// Snapshot rate for detection
    pub frame_rate: u32,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WEB_URL.to_string(),
            frame_rate: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GlobalConfig::default();
        config.validate().unwrap();
        assert_eq!(config.tick_rate_hz, 60);
        assert_eq!(config.decoder.max_pending_outputs, 4);
        assert_eq!(config.detection.player_frame, Size::new(320, 180));
        assert_eq!(config.camera.lock_timeout(), Duration::from_millis(2500));
        assert_eq!(config.camera.camera_index, 1);
    }

    #[test]
    fn test_partial_json() {
        let config = GlobalConfig::from_json_str(
            r#"{ "debug_logging": true, "camera": { "facing": "back" } }"#,
        )
        .unwrap();
        assert!(config.debug_logging);
        assert_eq!(config.camera.facing, CameraFacing::Back);
        assert_eq!(config.camera.lock_timeout_ms, 2500);
        assert_eq!(config.web.url, DEFAULT_WEB_URL);
    }

    #[test]
    fn test_web_section() {
        let config = GlobalConfig::from_json_str(
            r#"{ "web": { "url": "https://example.com/page", "frame_rate": 5 } }"#,
        )
        .unwrap();
        let WebConfig { url, frame_rate } = config.web;
        assert_eq!(url, "https://example.com/page");
        assert_eq!(frame_rate, 5);
    }

    #[test]
    fn test_invalid_values() {
        let err = GlobalConfig::from_json_str(r#"{ "tick_rate_hz": 0 }"#).unwrap_err();
        assert!(matches!(err, FaceLensError::InvalidConfiguration { .. }));

        let err = GlobalConfig::from_json_str(r#"{ "web": { "url": "not a url" } }"#).unwrap_err();
        assert!(matches!(err, FaceLensError::InvalidConfiguration { .. }));

        let err = GlobalConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, FaceLensError::Json { .. }));
    }
}
