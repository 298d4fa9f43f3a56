//! Yawn monitor library
//!
//! Watches a webcam feed for sustained mouth opening and raises a spoken
//! and audible alert, with a cooldown between alerts:
//! - Mouth-opening ratio from four lip landmarks
//! - Debounce-with-cooldown detector state machine
//! - Synchronous frame loop over pluggable camera, landmark and display collaborators
//! - Speech through the platform TTS command, WAV playback through cpal
//! - OpenCV webcam, preview window and LBF facemarks (`opencv` feature)

pub mod alert;
#[cfg(feature = "opencv")]
pub mod camera;
pub mod config;
pub mod detector;
pub mod frame;
pub mod geometry;
pub mod landmarks;
pub mod monitor;
pub mod sound;
pub mod speech;

// Re-export main types
pub use alert::{AlertError, AlertOutcome, Alerter, SoundPlayer, SpeechSynthesizer};
pub use config::{AlertConfig, CameraConfig, ConfigError, MonitorConfig};
pub use detector::{
    AlertDecision, DetectorConfig, DetectorError, DetectorPhase, DetectorState, DetectorStats,
    MissingFacePolicy, YawnDetector,
};
pub use frame::{Display, FpsCounter, FrameError, FrameSource, LandmarkExtractor, Overlay};
pub use geometry::{mouth_ratio, LandmarkPoint, MouthPoints};
pub use landmarks::{landmark_point, MouthLandmarkIndices};
pub use monitor::{Clock, FrameReport, Monitor, MonitorError, MonitorSummary, MonotonicClock, StopReason};
pub use sound::{WavClip, WavPlayer};
pub use speech::{CommandSpeech, SpeechBackend};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yawn_monitor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
