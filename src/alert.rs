//! Alert collaborators
//!
//! A fired alert speaks a fixed message and then plays a fixed sound
//! asset, both synchronously. Failures are logged and never stop the
//! monitor.

use crate::config::AlertConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("No speech synthesizer available: {0}")]
    SpeechUnavailable(String),

    #[error("Speech synthesis failed: {0}")]
    SpeechFailed(String),

    #[error("Failed to load sound asset {path}: {reason}")]
    SoundAsset { path: PathBuf, reason: String },

    #[error("Sound playback failed: {0}")]
    PlaybackFailed(String),

    #[error("Resampling failed: {0}")]
    Resampling(String),
}

/// Speaks a text message, returning once speech has finished
#[cfg_attr(test, mockall::automock)]
pub trait SpeechSynthesizer {
    fn speak(&mut self, text: &str) -> Result<(), AlertError>;
}

/// Plays a local audio asset, returning once playback has finished
#[cfg_attr(test, mockall::automock)]
pub trait SoundPlayer {
    fn play(&mut self, path: &Path) -> Result<(), AlertError>;
}

/// What happened when an alert was raised
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertOutcome {
    pub spoke: bool,
    pub played: bool,
}

/// Drives the alert collaborators for one `FireAlert` decision
pub struct Alerter {
    message: String,
    sound_path: PathBuf,
    speech: Option<Box<dyn SpeechSynthesizer>>,
    sound: Option<Box<dyn SoundPlayer>>,
}

impl Alerter {
    pub fn new(message: impl Into<String>, sound_path: impl Into<PathBuf>) -> Self {
        Self {
            message: message.into(),
            sound_path: sound_path.into(),
            speech: None,
            sound: None,
        }
    }

    pub fn from_config(config: &AlertConfig) -> Self {
        Self::new(config.message.clone(), config.sound_path.clone())
    }

    pub fn with_speech(mut self, speech: Box<dyn SpeechSynthesizer>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn with_sound(mut self, sound: Box<dyn SoundPlayer>) -> Self {
        self.sound = Some(sound);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Speak the message, then play the sound. Blocks until both finish.
    pub fn alert(&mut self) -> AlertOutcome {
        let mut outcome = AlertOutcome::default();

        if let Some(speech) = self.speech.as_mut() {
            match speech.speak(&self.message) {
                Ok(()) => outcome.spoke = true,
                Err(e) => error!("Voice alert failed: {}", e),
            }
        }

        if let Some(sound) = self.sound.as_mut() {
            match sound.play(&self.sound_path) {
                Ok(()) => outcome.played = true,
                Err(e) => error!("Sound alert failed: {}", e),
            }
        }

        info!(
            "Alert raised (spoke={}, played={})",
            outcome.spoke, outcome.played
        );

        outcome
    }
}
