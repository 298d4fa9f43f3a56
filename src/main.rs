//! Yawn monitor binary
//!
//! Watches the webcam and speaks a break reminder when the driver or user
//! keeps yawning. Stops on Esc, `q`, Ctrl-C, or when the camera stream ends.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use yawn_monitor::{init_logging, MissingFacePolicy, MonitorConfig, MonitorSummary, VERSION};

#[derive(Parser)]
#[command(name = "yawn-monitor")]
#[command(about = "Webcam yawn detector with spoken break reminders", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera device index
    #[arg(long)]
    camera: Option<i32>,

    /// Mouth ratio above which a frame counts as open
    #[arg(long)]
    threshold: Option<f32>,

    /// Consecutive open frames before an alert
    #[arg(long)]
    consec_frames: Option<u32>,

    /// Minimum seconds between alerts
    #[arg(long)]
    cooldown_secs: Option<f64>,

    /// Spoken alert message
    #[arg(long)]
    message: Option<String>,

    /// WAV asset played after the message
    #[arg(long)]
    sound: Option<PathBuf>,

    /// Counter handling on frames with no face
    #[arg(long, value_enum)]
    missing_face: Option<MissingFaceArg>,

    /// Do not speak the alert message
    #[arg(long)]
    no_speech: bool,

    /// Do not play the alert sound
    #[arg(long)]
    no_sound: bool,

    /// Hide the FPS counter
    #[arg(long)]
    no_fps: bool,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum MissingFaceArg {
    Hold,
    Reset,
}

impl From<MissingFaceArg> for MissingFacePolicy {
    fn from(arg: MissingFaceArg) -> Self {
        match arg {
            MissingFaceArg::Hold => MissingFacePolicy::Hold,
            MissingFaceArg::Reset => MissingFacePolicy::Reset,
        }
    }
}

impl Cli {
    /// Command-line flags win over file and environment
    fn apply(&self, config: &mut MonitorConfig) -> Result<()> {
        if let Some(index) = self.camera {
            config.camera.index = index;
        }
        if let Some(threshold) = self.threshold {
            config.detector.mouth_open_threshold = threshold;
        }
        if let Some(frames) = self.consec_frames {
            config.detector.consec_frames = frames;
        }
        if let Some(secs) = self.cooldown_secs {
            config.detector.alert_cooldown = Duration::try_from_secs_f64(secs)
                .with_context(|| format!("Invalid --cooldown-secs {}", secs))?;
        }
        if let Some(message) = &self.message {
            config.alert.message = message.clone();
        }
        if let Some(sound) = &self.sound {
            config.alert.sound_path = sound.clone();
        }
        if let Some(policy) = self.missing_face {
            config.detector.missing_face = policy.into();
        }
        if self.no_speech {
            config.alert.enable_speech = false;
        }
        if self.no_sound {
            config.alert.enable_sound = false;
        }
        if self.no_fps {
            config.camera.show_fps = false;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    info!("Starting yawn monitor v{}", VERSION);
    info!(
        "threshold={}, consec_frames={}, cooldown={:.1}s, missing_face={:?}",
        config.detector.mouth_open_threshold,
        config.detector.consec_frames,
        config.detector.alert_cooldown.as_secs_f64(),
        config.detector.missing_face
    );

    let stop = Arc::new(AtomicBool::new(false));
    let signal_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping");
            signal_stop.store(true, Ordering::Relaxed);
        }
    });

    // Camera, window and audio handles stay on the blocking thread
    let summary = tokio::task::spawn_blocking(move || run_monitor(config, &stop))
        .await
        .context("Monitor task panicked")??;

    info!(
        "Yawn monitor stopped ({:?}): {} frames, {} alerts, {} frames without a face",
        summary.stop_reason,
        summary.frames_processed,
        summary.detector.alerts_fired,
        summary.detector.frames_without_face
    );

    Ok(())
}

/// Defaults, then the config file, then `YAWN_*` variables, then flags
fn load_config(cli: &Cli) -> Result<MonitorConfig> {
    let mut config = match &cli.config {
        Some(path) => MonitorConfig::from_file(path)?,
        None => MonitorConfig::default(),
    };

    config
        .apply_env()
        .context("Invalid environment override")?;
    cli.apply(&mut config)?;
    config.validate().context("Invalid configuration")?;

    Ok(config)
}

#[cfg(feature = "opencv")]
fn build_alerter(config: &yawn_monitor::AlertConfig) -> yawn_monitor::Alerter {
    use tracing::warn;
    use yawn_monitor::{Alerter, CommandSpeech, WavPlayer};

    let mut alerter = Alerter::from_config(config);

    if config.enable_speech {
        match CommandSpeech::detect(config.speech_rate) {
            Ok(speech) => alerter = alerter.with_speech(Box::new(speech)),
            Err(e) => warn!("Voice alerts disabled: {}", e),
        }
    }

    if config.enable_sound {
        let mut player = WavPlayer::new();
        if let Err(e) = player.preload(&config.sound_path) {
            warn!("{}", e);
        }
        alerter = alerter.with_sound(Box::new(player));
    }

    alerter
}

#[cfg(feature = "opencv")]
fn run_monitor(config: MonitorConfig, stop: &AtomicBool) -> Result<MonitorSummary> {
    use yawn_monitor::camera::{LbfLandmarkExtractor, OpenCvCamera, OpenCvDisplay};
    use yawn_monitor::{Monitor, YawnDetector};

    let camera = OpenCvCamera::open(config.camera.index)
        .with_context(|| format!("Failed to open camera {}", config.camera.index))?;
    let extractor = LbfLandmarkExtractor::from_config(&config.camera)
        .context("Failed to load face landmark models")?;
    let display = OpenCvDisplay::new(config.camera.window_title.clone())
        .context("Failed to open preview window")?;

    let detector = YawnDetector::new(config.detector.clone())?;
    let alerter = build_alerter(&config.alert);

    let mut monitor = Monitor::new(camera, extractor, display, detector, alerter)
        .show_fps(config.camera.show_fps);

    Ok(monitor.run(stop)?)
}

#[cfg(not(feature = "opencv"))]
fn run_monitor(config: MonitorConfig, _stop: &AtomicBool) -> Result<MonitorSummary> {
    anyhow::bail!(
        "yawn-monitor was built without camera support (camera {}); rebuild with `--features opencv`",
        config.camera.index
    )
}
