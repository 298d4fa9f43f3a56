//! Yawn detector state machine
//!
//! Debounce-with-cooldown over one scalar per frame: the mouth-opening
//! ratio has to stay above threshold for `consec_frames` consecutive
//! frames before an alert fires, and two alerts are at least
//! `alert_cooldown` apart.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, trace};

/// Default mouth-opening ratio above which a frame counts as "open"
pub const DEFAULT_MOUTH_OPEN_THRESHOLD: f32 = 0.035;

/// Default number of consecutive open frames before an alert
pub const DEFAULT_CONSEC_FRAMES: u32 = 12;

/// Default minimum time between two alerts
pub const DEFAULT_ALERT_COOLDOWN: Duration = Duration::from_secs(6);

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Invalid detector configuration: {0}")]
    InvalidConfig(String),
}

/// What to do with the debounce counter on a frame with no face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFacePolicy {
    /// Leave the counter untouched; the frame contributes nothing
    #[default]
    Hold,

    /// Treat the frame like a closed mouth and reset the counter
    Reset,
}

/// Configuration for the yawn detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Ratio strictly above this counts as an open mouth
    pub mouth_open_threshold: f32,

    /// Consecutive open frames required to fire
    pub consec_frames: u32,

    /// Minimum time between alerts
    #[serde(with = "duration_secs")]
    pub alert_cooldown: Duration,

    /// Counter handling on frames with no detected face
    pub missing_face: MissingFacePolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            mouth_open_threshold: DEFAULT_MOUTH_OPEN_THRESHOLD,
            consec_frames: DEFAULT_CONSEC_FRAMES,
            alert_cooldown: DEFAULT_ALERT_COOLDOWN,
            missing_face: MissingFacePolicy::default(),
        }
    }
}

impl DetectorConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), DetectorError> {
        if !self.mouth_open_threshold.is_finite() || self.mouth_open_threshold < 0.0 {
            return Err(DetectorError::InvalidConfig(format!(
                "mouth_open_threshold must be a finite, non-negative number (got {})",
                self.mouth_open_threshold
            )));
        }

        if self.consec_frames == 0 {
            return Err(DetectorError::InvalidConfig(
                "consec_frames must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Per-frame detector output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    NoAlert,
    FireAlert,
}

impl AlertDecision {
    pub fn is_alert(&self) -> bool {
        matches!(self, AlertDecision::FireAlert)
    }
}

/// Coarse detector phase, derived from the counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorPhase {
    /// Counter is zero
    Idle,

    /// At least one open frame in the current run
    Accumulating,
}

/// State carried from frame to frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorState {
    /// Length of the current run of open frames
    pub consecutive_above_threshold: u32,

    /// When the last alert fired, `None` if never
    pub last_alert: Option<Instant>,
}

impl DetectorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> DetectorPhase {
        if self.consecutive_above_threshold == 0 {
            DetectorPhase::Idle
        } else {
            DetectorPhase::Accumulating
        }
    }

    /// Advance the state by one measured frame.
    ///
    /// The counter is not reset when an alert fires; only a frame at or
    /// below threshold resets it. A yawn held past the cooldown therefore
    /// alerts again.
    pub fn update(&mut self, config: &DetectorConfig, ratio: f32, now: Instant) -> AlertDecision {
        if ratio > config.mouth_open_threshold {
            self.consecutive_above_threshold = self.consecutive_above_threshold.saturating_add(1);
        } else {
            if self.consecutive_above_threshold > 0 {
                debug!(
                    "Mouth closed after {} open frames, counter reset",
                    self.consecutive_above_threshold
                );
            }
            self.consecutive_above_threshold = 0;
        }

        if self.consecutive_above_threshold < config.consec_frames {
            return AlertDecision::NoAlert;
        }

        let cooled_down = match self.last_alert {
            None => true,
            Some(last) => now.saturating_duration_since(last) > config.alert_cooldown,
        };

        if !cooled_down {
            return AlertDecision::NoAlert;
        }

        self.last_alert = Some(now);
        AlertDecision::FireAlert
    }

    /// Account for a frame where no face was detected
    pub fn observe_missing_face(&mut self, policy: MissingFacePolicy) {
        match policy {
            MissingFacePolicy::Hold => {}
            MissingFacePolicy::Reset => self.consecutive_above_threshold = 0,
        }
    }
}

/// Yawn detector: configuration, state and running statistics
pub struct YawnDetector {
    config: DetectorConfig,
    state: DetectorState,
    stats: DetectorStats,
}

impl YawnDetector {
    /// Create a new yawn detector
    pub fn new(config: DetectorConfig) -> Result<Self, DetectorError> {
        config.validate()?;

        info!(
            "Yawn detector: threshold={}, consec_frames={}, cooldown={:?}, missing_face={:?}",
            config.mouth_open_threshold,
            config.consec_frames,
            config.alert_cooldown,
            config.missing_face
        );

        Ok(Self {
            config,
            state: DetectorState::new(),
            stats: DetectorStats::default(),
        })
    }

    /// Feed one frame's mouth ratio
    pub fn update(&mut self, ratio: f32, now: Instant) -> AlertDecision {
        self.stats.frames_observed += 1;
        if ratio > self.config.mouth_open_threshold {
            self.stats.frames_above_threshold += 1;
        }

        let decision = self.state.update(&self.config, ratio, now);

        trace!(
            "ratio={:.3} counter={} decision={:?}",
            ratio,
            self.state.consecutive_above_threshold,
            decision
        );

        if decision.is_alert() {
            self.stats.alerts_fired += 1;
            info!(
                "Yawn detected after {} consecutive open frames",
                self.state.consecutive_above_threshold
            );
        }

        decision
    }

    /// Feed a frame with no detected face
    pub fn observe_missing_face(&mut self) {
        self.stats.frames_without_face += 1;
        self.state.observe_missing_face(self.config.missing_face);
    }

    pub fn phase(&self) -> DetectorPhase {
        self.state.phase()
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn stats(&self) -> DetectorStats {
        self.stats.clone()
    }

    /// Return to the startup state
    pub fn reset(&mut self) {
        self.state = DetectorState::new();
        self.stats = DetectorStats::default();
        info!("Detector reset");
    }
}

/// Detector statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorStats {
    pub frames_observed: u64,
    pub frames_above_threshold: u64,
    pub frames_without_face: u64,
    pub alerts_fired: u64,
}

/// Serialize a `Duration` as fractional seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DetectorConfig {
        DetectorConfig {
            mouth_open_threshold: 0.035,
            consec_frames: 12,
            alert_cooldown: Duration::from_secs(6),
            missing_face: MissingFacePolicy::Hold,
        }
    }

    fn at(t0: Instant, secs: u64) -> Instant {
        t0 + Duration::from_secs(secs)
    }

    #[test]
    fn test_config_validation() {
        let mut config = test_config();
        assert!(config.validate().is_ok());

        config.consec_frames = 0;
        assert!(config.validate().is_err());

        config.consec_frames = 12;
        config.mouth_open_threshold = -0.1;
        assert!(config.validate().is_err());

        config.mouth_open_threshold = f32::NAN;
        assert!(config.validate().is_err());

        assert!(YawnDetector::new(config).is_err());
    }

    #[test]
    fn test_default_config() {
        let config = DetectorConfig::default();
        assert_eq!(config, test_config());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_never_fires_at_or_below_threshold() {
        let config = test_config();
        let mut state = DetectorState::new();
        let t0 = Instant::now();

        for i in 0..100 {
            let ratio = if i % 2 == 0 { 0.035 } else { 0.0 };
            assert_eq!(state.update(&config, ratio, at(t0, i)), AlertDecision::NoAlert);
            assert_eq!(state.consecutive_above_threshold, 0);
            assert_eq!(state.phase(), DetectorPhase::Idle);
        }
        assert!(state.last_alert.is_none());
    }

    #[test]
    fn test_fires_on_twelfth_frame() {
        let config = test_config();
        let mut state = DetectorState::new();
        let t0 = Instant::now();

        for i in 0..11 {
            assert_eq!(state.update(&config, 0.04, at(t0, i)), AlertDecision::NoAlert);
            assert_eq!(state.phase(), DetectorPhase::Accumulating);
        }
        assert_eq!(state.update(&config, 0.04, at(t0, 11)), AlertDecision::FireAlert);
        assert_eq!(state.last_alert, Some(at(t0, 11)));
        assert_eq!(state.consecutive_above_threshold, 12);

        // One closed frame resets the run
        assert_eq!(state.update(&config, 0.01, at(t0, 12)), AlertDecision::NoAlert);
        assert_eq!(state.consecutive_above_threshold, 0);
        assert_eq!(state.phase(), DetectorPhase::Idle);
    }

    #[test]
    fn test_cooldown_blocks_then_allows_repeat_alert() {
        let config = test_config();
        let mut state = DetectorState::new();
        let t0 = Instant::now();

        for i in 0..11 {
            state.update(&config, 0.5, t0 + Duration::from_millis(i * 10));
        }
        let fired_at = t0 + Duration::from_millis(110);
        assert_eq!(state.update(&config, 0.5, fired_at), AlertDecision::FireAlert);

        // Counter stays armed, but the cooldown holds
        for millis in [1, 1_000, 5_999, 6_000] {
            let now = fired_at + Duration::from_millis(millis);
            assert_eq!(state.update(&config, 0.5, now), AlertDecision::NoAlert);
        }

        let after = fired_at + Duration::from_millis(6_001);
        assert_eq!(state.update(&config, 0.5, after), AlertDecision::FireAlert);
        assert_eq!(state.last_alert, Some(after));
    }

    #[test]
    fn test_short_run_requires_fresh_full_run() {
        let config = test_config();
        let mut state = DetectorState::new();
        let t0 = Instant::now();

        for i in 0..11 {
            state.update(&config, 0.1, at(t0, i));
        }
        state.update(&config, 0.0, at(t0, 11));

        for i in 12..23 {
            assert_eq!(state.update(&config, 0.1, at(t0, i)), AlertDecision::NoAlert);
        }
        assert_eq!(state.update(&config, 0.1, at(t0, 23)), AlertDecision::FireAlert);
    }

    #[test]
    fn test_missing_face_policies() {
        let config = test_config();
        let t0 = Instant::now();

        let mut held = DetectorState::new();
        for i in 0..5 {
            held.update(&config, 0.1, at(t0, i));
        }
        held.observe_missing_face(MissingFacePolicy::Hold);
        assert_eq!(held.consecutive_above_threshold, 5);

        let mut reset = held.clone();
        reset.observe_missing_face(MissingFacePolicy::Reset);
        assert_eq!(reset.consecutive_above_threshold, 0);
        assert_eq!(reset.phase(), DetectorPhase::Idle);
    }

    #[test]
    fn test_detector_stats_and_reset() {
        let mut detector = YawnDetector::new(DetectorConfig {
            consec_frames: 2,
            ..test_config()
        })
        .unwrap();
        let t0 = Instant::now();

        detector.update(0.2, at(t0, 0));
        assert!(detector.update(0.2, at(t0, 1)).is_alert());
        detector.update(0.0, at(t0, 2));
        detector.observe_missing_face();

        let stats = detector.stats();
        assert_eq!(stats.frames_observed, 3);
        assert_eq!(stats.frames_above_threshold, 2);
        assert_eq!(stats.frames_without_face, 1);
        assert_eq!(stats.alerts_fired, 1);

        detector.reset();
        assert_eq!(detector.stats(), DetectorStats::default());
        assert_eq!(detector.state(), &DetectorState::new());
    }

    #[test]
    fn test_config_serde_uses_seconds() {
        let json = r#"{"mouth_open_threshold":0.05,"alert_cooldown":2.5,"missing_face":"reset"}"#;
        let config: DetectorConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.mouth_open_threshold, 0.05);
        assert_eq!(config.consec_frames, DEFAULT_CONSEC_FRAMES);
        assert_eq!(config.alert_cooldown, Duration::from_millis(2_500));
        assert_eq!(config.missing_face, MissingFacePolicy::Reset);

        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["alert_cooldown"], serde_json::json!(2.5));
    }
}
