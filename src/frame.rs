//! Frame pipeline collaborators
//!
//! The monitor reads frames from a [`FrameSource`], asks a
//! [`LandmarkExtractor`] for the mouth points, and hands the frame plus an
//! [`Overlay`] to a [`Display`]. The frame type is whatever the source
//! produces; the monitor never looks inside it.

use crate::geometry::MouthPoints;
use std::time::Instant;
use thiserror::Error;

/// Banner drawn on the frame where an alert fired
pub const ALERT_BANNER: &str = "YAWN ALERT!";

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Frame source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Failed to read frame: {0}")]
    Read(String),

    #[error("Landmark extraction failed: {0}")]
    Extraction(String),

    #[error("Display error: {0}")]
    Display(String),
}

/// Produces frames until the stream ends
pub trait FrameSource {
    type Frame;

    /// Next frame, or `None` at end of stream
    fn next_frame(&mut self) -> Result<Option<Self::Frame>, FrameError>;
}

/// Finds the mouth landmarks of the (single) face in a frame
pub trait LandmarkExtractor<F> {
    /// Mouth points in pixel space, or `None` when no face was found
    fn extract(&mut self, frame: &F) -> Result<Option<MouthPoints>, FrameError>;
}

/// Renders frames with their overlay and reports the stop key
pub trait Display<F> {
    fn show(&mut self, frame: &mut F, overlay: &Overlay) -> Result<(), FrameError>;

    /// True once the user asked to stop (Esc or `q`)
    fn poll_stop(&mut self) -> Result<bool, FrameError>;
}

/// Per-frame drawing instructions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    /// Mouth points, when a face was found
    pub mouth: Option<MouthPoints>,

    /// Mouth ratio, when a face was found
    pub ratio: Option<f32>,

    /// An alert fired on this frame
    pub alert: bool,

    /// Frames per second, when enabled
    pub fps: Option<f32>,
}

impl Overlay {
    pub fn ratio_text(&self) -> Option<String> {
        self.ratio.map(|r| format!("Ratio: {:.3}", r))
    }

    pub fn fps_text(&self) -> Option<String> {
        self.fps.map(|fps| format!("FPS: {}", fps as u32))
    }

    pub fn banner_text(&self) -> Option<&'static str> {
        self.alert.then_some(ALERT_BANNER)
    }
}

/// Instantaneous frame rate from consecutive frame timestamps
#[derive(Debug, Clone)]
pub struct FpsCounter {
    previous: Instant,
}

impl FpsCounter {
    pub fn new(start: Instant) -> Self {
        Self { previous: start }
    }

    /// Record a frame at `now` and return the rate since the previous one
    pub fn tick(&mut self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.previous).as_secs_f32();
        self.previous = now;

        if elapsed > 0.0 {
            1.0 / elapsed
        } else {
            0.0
        }
    }
}
