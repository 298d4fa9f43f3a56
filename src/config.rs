//! Monitor configuration
//!
//! Defaults, then an optional JSON file, then `YAWN_*` environment
//! variables. The binary layers its command-line flags on top.

use crate::detector::{DetectorConfig, DetectorError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Message spoken when a yawn alert fires
pub const DEFAULT_ALERT_MESSAGE: &str = "Yawning detected. Please take a break.";

/// Sound asset played after the spoken message
pub const DEFAULT_SOUND_PATH: &str = "assets/buzzer.wav";

/// Speech rate in words per minute
pub const DEFAULT_SPEECH_RATE: u32 = 150;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Detector(#[from] DetectorError),
}

/// Alert collaborators configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Text spoken on every alert
    pub message: String,

    /// WAV asset played after the message
    pub sound_path: PathBuf,

    /// Speech rate (words per minute)
    pub speech_rate: u32,

    /// Speak the message
    pub enable_speech: bool,

    /// Play the sound asset
    pub enable_sound: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            message: DEFAULT_ALERT_MESSAGE.to_string(),
            sound_path: PathBuf::from(DEFAULT_SOUND_PATH),
            speech_rate: DEFAULT_SPEECH_RATE,
            enable_speech: true,
            enable_sound: true,
        }
    }
}

/// Camera, window and landmark model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Capture device index
    pub index: i32,

    /// Preview window title
    pub window_title: String,

    /// Draw the FPS counter on the preview
    pub show_fps: bool,

    /// Haar cascade used to find the face
    pub cascade_path: PathBuf,

    /// LBF facemark model (68 points)
    pub facemark_model_path: PathBuf,

    /// Smallest face, in pixels, the face finder considers
    pub min_face_size: i32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            window_title: "Yawning Alert".to_string(),
            show_fps: true,
            cascade_path: PathBuf::from("models/haarcascade_frontalface_alt2.xml"),
            facemark_model_path: PathBuf::from("models/lbfmodel.yaml"),
            min_face_size: 80,
        }
    }
}

/// Complete monitor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub detector: DetectorConfig,
    pub alert: AlertConfig,
    pub camera: CameraConfig,
}

impl MonitorConfig {
    /// Load configuration from a JSON file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply `YAWN_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `YAWN_*` overrides from an arbitrary lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("YAWN_THRESHOLD") {
            self.detector.mouth_open_threshold = parse_value("YAWN_THRESHOLD", &value)?;
        }

        if let Some(value) = lookup("YAWN_CONSEC_FRAMES") {
            self.detector.consec_frames = parse_value("YAWN_CONSEC_FRAMES", &value)?;
        }

        if let Some(value) = lookup("YAWN_COOLDOWN_SECS") {
            let secs: f64 = parse_value("YAWN_COOLDOWN_SECS", &value)?;
            self.detector.alert_cooldown =
                Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidValue {
                    key: "YAWN_COOLDOWN_SECS".to_string(),
                    value,
                })?;
        }

        if let Some(value) = lookup("YAWN_MESSAGE") {
            self.alert.message = value;
        }

        if let Some(value) = lookup("YAWN_SOUND_PATH") {
            self.alert.sound_path = PathBuf::from(value);
        }

        if let Some(value) = lookup("YAWN_CAMERA_INDEX") {
            self.camera.index = parse_value("YAWN_CAMERA_INDEX", &value)?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector.validate()?;

        if self.alert.enable_speech && self.alert.message.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "alert message must not be empty when speech is enabled".to_string(),
            ));
        }

        if self.alert.speech_rate == 0 {
            return Err(ConfigError::Invalid(
                "speech_rate must be greater than 0".to_string(),
            ));
        }

        if self.camera.index < 0 {
            return Err(ConfigError::Invalid(format!(
                "camera index must be non-negative (got {})",
                self.camera.index
            )));
        }

        if self.alert.enable_sound && !self.alert.sound_path.exists() {
            // Not fatal: the alert still speaks and the player reports the failure
            warn!("Sound asset not found: {}", self.alert.sound_path.display());
        }

        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
