//! Frame-processing loop
//!
//! One frame at a time: read, extract landmarks, compute the mouth ratio,
//! update the detector, raise the alert if it fired, render. Nothing runs
//! concurrently with the loop; alert playback stalls it for its duration.
//!
//! The monitor owns every collaborator, so camera, windows and extractor
//! are released by `Drop` on whichever path the loop exits.

use crate::alert::Alerter;
use crate::detector::{AlertDecision, DetectorStats, YawnDetector};
use crate::frame::{Display, FpsCounter, FrameError, FrameSource, LandmarkExtractor, Overlay};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Source of monotonic timestamps for the detector and FPS counter
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall-independent system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The frame source ran out of frames
    EndOfStream,

    /// A frame read failed mid-stream
    ReadFailed,

    /// Stop key pressed in the display
    StopKey,

    /// External stop signal (Ctrl-C)
    StopSignal,
}

/// Outcome of one processed frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Mouth ratio, `None` when no face was found
    pub ratio: Option<f32>,

    pub decision: AlertDecision,

    pub overlay: Overlay,
}

/// Totals for a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSummary {
    pub frames_processed: u64,
    pub stop_reason: StopReason,
    pub detector: DetectorStats,
}

/// The yawn monitor loop
pub struct Monitor<S, E, D> {
    source: S,
    extractor: E,
    display: D,
    detector: YawnDetector,
    alerter: Alerter,
    clock: Box<dyn Clock>,
    fps: Option<FpsCounter>,
    frames_processed: u64,
}

impl<S, E, D> Monitor<S, E, D>
where
    S: FrameSource,
    E: LandmarkExtractor<S::Frame>,
    D: Display<S::Frame>,
{
    pub fn new(source: S, extractor: E, display: D, detector: YawnDetector, alerter: Alerter) -> Self {
        Self {
            source,
            extractor,
            display,
            detector,
            alerter,
            clock: Box::new(MonotonicClock),
            fps: None,
            frames_processed: 0,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Draw the frame rate on every frame
    pub fn show_fps(mut self, enabled: bool) -> Self {
        self.fps = enabled.then(|| FpsCounter::new(self.clock.now()));
        self
    }

    pub fn detector(&self) -> &YawnDetector {
        &self.detector
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Run one frame through extraction, detection, alerting and display
    pub fn process_frame(&mut self, frame: &mut S::Frame) -> Result<FrameReport, MonitorError> {
        self.frames_processed += 1;

        let mouth = match self.extractor.extract(frame) {
            Ok(mouth) => mouth,
            Err(e) => {
                warn!("Landmark extraction failed, treating frame as faceless: {}", e);
                None
            }
        };

        let mut overlay = Overlay::default();
        let mut decision = AlertDecision::NoAlert;

        match mouth {
            Some(points) => {
                let ratio = points.ratio();
                decision = self.detector.update(ratio, self.clock.now());

                if decision.is_alert() {
                    self.alerter.alert();
                }

                overlay.mouth = Some(points);
                overlay.ratio = Some(ratio);
                overlay.alert = decision.is_alert();
            }
            None => self.detector.observe_missing_face(),
        }

        if let Some(fps) = self.fps.as_mut() {
            overlay.fps = Some(fps.tick(self.clock.now()));
        }

        self.display.show(frame, &overlay)?;

        Ok(FrameReport {
            ratio: overlay.ratio,
            decision,
            overlay,
        })
    }

    /// Process frames until the stream ends, the stop key is pressed, or
    /// `stop` is raised. Display errors abort the run.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<MonitorSummary, MonitorError> {
        info!("Monitoring started");

        let stop_reason = loop {
            if stop.load(Ordering::Relaxed) {
                break StopReason::StopSignal;
            }

            let mut frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break StopReason::EndOfStream,
                Err(e) => {
                    warn!("Frame read failed, stopping: {}", e);
                    break StopReason::ReadFailed;
                }
            };

            self.process_frame(&mut frame)?;

            if self.display.poll_stop()? {
                break StopReason::StopKey;
            }

            if self.frames_processed % 1000 == 0 {
                let stats = self.detector.stats();
                debug!(
                    "Processed {} frames, {} alerts, {} without face",
                    self.frames_processed, stats.alerts_fired, stats.frames_without_face
                );
            }
        };

        let summary = MonitorSummary {
            frames_processed: self.frames_processed,
            stop_reason,
            detector: self.detector.stats(),
        };

        info!(
            "Monitoring stopped ({:?}) after {} frames, {} alerts",
            summary.stop_reason, summary.frames_processed, summary.detector.alerts_fired
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::MockSpeechSynthesizer;
    use crate::detector::{DetectorConfig, MissingFacePolicy};
    use crate::geometry::{LandmarkPoint, MouthPoints};
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Each frame carries the mouth opening the extractor should report
    struct ScriptSource(VecDeque<Option<f32>>);

    impl FrameSource for ScriptSource {
        type Frame = Option<f32>;

        fn next_frame(&mut self) -> Result<Option<Self::Frame>, FrameError> {
            Ok(self.0.pop_front())
        }
    }

    struct ScriptExtractor;

    impl LandmarkExtractor<Option<f32>> for ScriptExtractor {
        fn extract(&mut self, frame: &Option<f32>) -> Result<Option<MouthPoints>, FrameError> {
            Ok(frame.map(|ratio| {
                MouthPoints::new(
                    LandmarkPoint::new(0.0, 0.0),
                    LandmarkPoint::new(0.0, ratio * 100.0),
                    LandmarkPoint::new(-50.0, 0.0),
                    LandmarkPoint::new(50.0, 0.0),
                )
            }))
        }
    }

    /// Fails the landmark fit on one call, otherwise behaves like `ScriptExtractor`
    struct FailOnceExtractor {
        calls: usize,
        fail_on: usize,
    }

    impl LandmarkExtractor<Option<f32>> for FailOnceExtractor {
        fn extract(&mut self, frame: &Option<f32>) -> Result<Option<MouthPoints>, FrameError> {
            let call = self.calls;
            self.calls += 1;
            if call == self.fail_on {
                return Err(FrameError::Extraction("fit diverged".to_string()));
            }
            ScriptExtractor.extract(frame)
        }
    }

    #[derive(Default)]
    struct NullDisplay {
        shown: usize,
    }

    impl Display<Option<f32>> for NullDisplay {
        fn show(&mut self, _frame: &mut Option<f32>, _overlay: &Overlay) -> Result<(), FrameError> {
            self.shown += 1;
            Ok(())
        }

        fn poll_stop(&mut self) -> Result<bool, FrameError> {
            Ok(false)
        }
    }

    /// Advances one second per call
    struct StepClock {
        start: Instant,
        ticks: Cell<u64>,
    }

    impl Clock for StepClock {
        fn now(&self) -> Instant {
            let t = self.ticks.get();
            self.ticks.set(t + 1);
            self.start + Duration::from_secs(t)
        }
    }

    fn monitor(
        frames: Vec<Option<f32>>,
        config: DetectorConfig,
        alerter: Alerter,
    ) -> Monitor<ScriptSource, ScriptExtractor, NullDisplay> {
        Monitor::new(
            ScriptSource(frames.into()),
            ScriptExtractor,
            NullDisplay::default(),
            YawnDetector::new(config).unwrap(),
            alerter,
        )
        .with_clock(StepClock {
            start: Instant::now(),
            ticks: Cell::new(0),
        })
    }

    #[test]
    fn test_alert_fires_once_per_decision() {
        let mut speech = MockSpeechSynthesizer::new();
        speech.expect_speak().times(1).returning(|_| Ok(()));
        let alerter = Alerter::new("yawn", "buzzer.wav").with_speech(Box::new(speech));

        let mut monitor = monitor(vec![Some(0.2); 12], DetectorConfig::default(), alerter);
        let summary = monitor.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(summary.stop_reason, StopReason::EndOfStream);
        assert_eq!(summary.frames_processed, 12);
        assert_eq!(summary.detector.alerts_fired, 1);
        assert_eq!(monitor.display.shown, 12);
    }

    #[test]
    fn test_faceless_frames_hold_counter_by_default() {
        let mut frames = vec![Some(0.2); 6];
        frames.push(None);
        frames.extend(vec![Some(0.2); 6]);

        let mut monitor = monitor(frames, DetectorConfig::default(), Alerter::new("", ""));
        let summary = monitor.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(summary.detector.frames_without_face, 1);
        assert_eq!(summary.detector.alerts_fired, 1);
    }

    #[test]
    fn test_faceless_frames_reset_counter_when_configured() {
        let mut frames = vec![Some(0.2); 6];
        frames.push(None);
        frames.extend(vec![Some(0.2); 6]);

        let config = DetectorConfig {
            missing_face: MissingFacePolicy::Reset,
            ..Default::default()
        };
        let mut monitor = monitor(frames, config, Alerter::new("", ""));
        let summary = monitor.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(summary.detector.alerts_fired, 0);
        assert_eq!(monitor.detector().state().consecutive_above_threshold, 6);
    }

    #[test]
    fn test_extraction_error_treated_as_missing_face() {
        let mut monitor = Monitor::new(
            ScriptSource(vec![Some(0.2); 13].into()),
            FailOnceExtractor { calls: 0, fail_on: 6 },
            NullDisplay::default(),
            YawnDetector::new(DetectorConfig::default()).unwrap(),
            Alerter::new("", ""),
        )
        .with_clock(StepClock {
            start: Instant::now(),
            ticks: Cell::new(0),
        });

        let summary = monitor.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(summary.stop_reason, StopReason::EndOfStream);
        assert_eq!(summary.frames_processed, 13);
        assert_eq!(summary.detector.frames_without_face, 1);
        assert_eq!(summary.detector.alerts_fired, 1);
        assert_eq!(monitor.display.shown, 13);
    }

    #[test]
    fn test_stop_signal_checked_before_reading() {
        let mut monitor = monitor(vec![Some(0.0); 5], DetectorConfig::default(), Alerter::new("", ""));
        let summary = monitor.run(&AtomicBool::new(true)).unwrap();

        assert_eq!(summary.stop_reason, StopReason::StopSignal);
        assert_eq!(summary.frames_processed, 0);
    }

    #[test]
    fn test_process_frame_report() {
        let mut monitor = monitor(vec![], DetectorConfig::default(), Alerter::new("", ""))
            .show_fps(true);

        let report = monitor.process_frame(&mut Some(0.3)).unwrap();
        assert!((report.ratio.unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(report.decision, AlertDecision::NoAlert);
        assert!(report.overlay.mouth.is_some());
        assert!(report.overlay.fps.is_some());

        let report = monitor.process_frame(&mut None).unwrap();
        assert!(report.ratio.is_none());
        assert!(report.overlay.ratio_text().is_none());
        assert!(report.overlay.fps.is_some());
    }
}
