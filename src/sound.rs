//! Sound asset playback
//!
//! Decodes the alert asset (WAV) with hound, adapts it to the output
//! device's channel layout and sample rate, and plays it through cpal,
//! blocking until the clip has been rendered.

use crate::alert::{AlertError, SoundPlayer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Extra time allowed past the clip duration before playback is abandoned
pub const PLAYBACK_GRACE: Duration = Duration::from_millis(500);

/// Decoded audio clip, interleaved f32 samples in [-1.0, 1.0]
#[derive(Debug, Clone, PartialEq)]
pub struct WavClip {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl WavClip {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate: sample_rate.max(1),
        }
    }

    /// Decode a WAV file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AlertError> {
        let path = path.as_ref();
        let asset_error = |reason: String| AlertError::SoundAsset {
            path: path.to_path_buf(),
            reason,
        };

        let reader = hound::WavReader::open(path).map_err(|e| asset_error(e.to_string()))?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| asset_error(e.to_string()))?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| asset_error(e.to_string()))?
            }
        };

        if samples.is_empty() {
            return Err(asset_error("no audio samples".to_string()));
        }

        debug!(
            "Decoded {}: {} Hz, {} ch, {} samples",
            path.display(),
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self::new(samples, spec.channels, spec.sample_rate))
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Convert to another channel count and sample rate.
    ///
    /// Mono is duplicated across outputs, multichannel to mono is averaged,
    /// anything else maps output channel `c` to input channel `c % n`.
    pub fn convert(&self, channels: u16, sample_rate: u32) -> Result<WavClip, AlertError> {
        let channels = channels.max(1);
        let sample_rate = sample_rate.max(1);

        if self.frames() == 0 {
            return Ok(WavClip::new(Vec::new(), channels, sample_rate));
        }

        let mut waves = self.deinterleave();
        if sample_rate != self.sample_rate {
            waves = resample(&waves, self.sample_rate, sample_rate)?;
        }

        Ok(WavClip::new(
            interleave_mapped(&waves, channels),
            channels,
            sample_rate,
        ))
    }

    /// One sample vector per channel
    fn deinterleave(&self) -> Vec<Vec<f32>> {
        let n = self.channels as usize;
        let frames = self.frames();

        (0..n)
            .map(|c| {
                self.samples
                    .iter()
                    .skip(c)
                    .step_by(n)
                    .take(frames)
                    .copied()
                    .collect()
            })
            .collect()
    }
}

fn interleave_mapped(waves: &[Vec<f32>], channels: u16) -> Vec<f32> {
    let in_channels = waves.len();
    let out_channels = channels as usize;
    let frames = waves.iter().map(Vec::len).min().unwrap_or(0);

    let mut samples = Vec::with_capacity(frames * out_channels);
    for i in 0..frames {
        for c in 0..out_channels {
            let value = if in_channels == out_channels {
                waves[c][i]
            } else if in_channels == 1 {
                waves[0][i]
            } else if out_channels == 1 {
                waves.iter().map(|w| w[i]).sum::<f32>() / in_channels as f32
            } else {
                waves[c % in_channels][i]
            };
            samples.push(value);
        }
    }

    samples
}

/// Band-limited sample-rate conversion of every channel in one pass
fn resample(waves: &[Vec<f32>], from: u32, to: u32) -> Result<Vec<Vec<f32>>, AlertError> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
        WindowFunction,
    };

    debug!("Resampling alert sound: {} Hz -> {} Hz", from, to);

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let frames = waves.first().map_or(0, Vec::len);
    let mut resampler = SincFixedIn::<f32>::new(
        to as f64 / from as f64,
        2.0,
        params,
        frames,
        waves.len(),
    )
    .map_err(|e| AlertError::Resampling(e.to_string()))?;

    resampler
        .process(waves, None)
        .map_err(|e| AlertError::Resampling(e.to_string()))
}

/// Sound player for WAV assets; decoded clips are cached by path
#[derive(Debug, Default)]
pub struct WavPlayer {
    cache: HashMap<PathBuf, WavClip>,
}

impl WavPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `path` now so the first alert does not pay for it
    pub fn preload(&mut self, path: &Path) -> Result<&WavClip, AlertError> {
        if !self.cache.contains_key(path) {
            let clip = WavClip::load(path)?;
            info!(
                "Loaded alert sound {} ({:.2}s)",
                path.display(),
                clip.duration().as_secs_f32()
            );
            self.cache.insert(path.to_path_buf(), clip);
        }

        self.cache.get(path).ok_or_else(|| AlertError::SoundAsset {
            path: path.to_path_buf(),
            reason: "not cached".to_string(),
        })
    }
}

impl SoundPlayer for WavPlayer {
    fn play(&mut self, path: &Path) -> Result<(), AlertError> {
        let clip = self.preload(path)?.clone();
        output::play_blocking(clip)
    }
}

#[cfg(feature = "playback")]
mod output {
    use super::{WavClip, PLAYBACK_GRACE};
    use crate::alert::AlertError;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{FromSample, Sample, SizedSample};
    use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
    use tracing::{debug, error, warn};

    fn playback_error(e: impl std::fmt::Display) -> AlertError {
        AlertError::PlaybackFailed(e.to_string())
    }

    /// Play `clip` on the default output device and wait for it to finish
    pub fn play_blocking(clip: WavClip) -> Result<(), AlertError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| playback_error("no default output device"))?;
        let supported = device.default_output_config().map_err(playback_error)?;
        let config: cpal::StreamConfig = supported.config();

        let clip = clip.convert(config.channels, config.sample_rate.0)?;
        let timeout = clip.duration() + PLAYBACK_GRACE;
        let (done_tx, done_rx) = mpsc::sync_channel(1);

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, clip, done_tx)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, clip, done_tx)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, clip, done_tx)?,
            other => {
                return Err(playback_error(format!(
                    "unsupported output sample format {:?}",
                    other
                )))
            }
        };

        stream.play().map_err(playback_error)?;
        debug!("Playing alert sound ({:?})", timeout);

        match done_rx.recv_timeout(timeout) {
            Ok(()) => Ok(()),
            Err(RecvTimeoutError::Timeout) => {
                warn!("Alert sound did not finish within {:?}, stopping", timeout);
                Ok(())
            }
            Err(RecvTimeoutError::Disconnected) => Err(playback_error("output stream closed")),
        }
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        clip: WavClip,
        done: SyncSender<()>,
    ) -> Result<cpal::Stream, AlertError>
    where
        T: SizedSample + FromSample<f32>,
    {
        let samples = clip.into_samples();
        let mut position = 0usize;

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    for out in data.iter_mut() {
                        let value = samples.get(position).copied().unwrap_or(0.0);
                        *out = T::from_sample(value);
                        position = position.saturating_add(1);
                    }
                    if position >= samples.len() {
                        let _ = done.try_send(());
                    }
                },
                |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(playback_error)
    }
}

#[cfg(not(feature = "playback"))]
mod output {
    use super::WavClip;
    use crate::alert::AlertError;

    pub fn play_blocking(_clip: WavClip) -> Result<(), AlertError> {
        Err(AlertError::PlaybackFailed(
            "built without the `playback` feature".to_string(),
        ))
    }
}
