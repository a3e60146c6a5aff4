use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::convert;
use super::source::{AudioCapture, AudioChunk, AudioSource};
use crate::error::CaptureError;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    /// Read a 16-bit integer PCM WAV file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
            bail!(
                "Expected 16-bit integer PCM, got {}-bit {:?}",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Samples converted to the given rate and channel layout
    pub fn to_pcm(&self, target_rate: u32, target_channels: u16) -> Vec<i16> {
        convert::to_target_format(
            &self.samples,
            self.channels,
            self.sample_rate,
            target_rate,
            target_channels,
        )
    }
}

/// Configuration for [`FileSource`]
#[derive(Debug, Clone)]
pub struct FileSourceConfig {
    pub path: PathBuf,
    /// Duration of each emitted chunk (default 200ms)
    pub chunk_duration: Duration,
    pub target_sample_rate: u32,
    pub target_channels: u16,
    /// Start over at the end of the file instead of going quiet
    pub loop_playback: bool,
}

impl FileSourceConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_duration: Duration::from_millis(200),
            target_sample_rate: 16000,
            target_channels: 1,
            loop_playback: false,
        }
    }
}

/// Audio source that plays a WAV file back at real-time cadence
///
/// Stands in for a microphone: each `acquire` starts from the beginning of
/// the file and emits one chunk per `chunk_duration`.
pub struct FileSource {
    config: FileSourceConfig,
    name: String,
}

impl FileSource {
    pub fn new(config: FileSourceConfig) -> Self {
        let name = format!("wav:{}", config.path.display());
        Self { config, name }
    }

    fn samples_per_chunk(&self) -> usize {
        let per_sec =
            self.config.target_sample_rate as u64 * self.config.target_channels.max(1) as u64;
        let n = per_sec * self.config.chunk_duration.as_millis() as u64 / 1000;
        (n as usize).max(1)
    }
}

#[async_trait::async_trait]
impl AudioSource for FileSource {
    async fn acquire(&self) -> Result<AudioCapture, CaptureError> {
        let path = self.config.path.clone();
        if !path.exists() {
            return Err(CaptureError::Unavailable(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let audio = tokio::task::spawn_blocking(move || AudioFile::open(&path))
            .await
            .map_err(|e| CaptureError::Unavailable(format!("decoder task failed: {}", e)))?
            .map_err(|e| CaptureError::Format(format!("{:#}", e)))?;

        let pcm = audio.to_pcm(self.config.target_sample_rate, self.config.target_channels);
        let chunk_len = self.samples_per_chunk();
        let chunk_duration = self.config.chunk_duration;
        let loop_playback = self.config.loop_playback;
        let name = self.name.clone();

        let (tx, rx) = mpsc::channel(32);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(chunk_duration);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut timestamp_ms = 0u64;

            'playback: loop {
                for slice in pcm.chunks(chunk_len) {
                    ticker.tick().await;
                    let chunk = AudioChunk::from_samples(slice, timestamp_ms);
                    if tx.send(chunk).await.is_err() {
                        break 'playback;
                    }
                    timestamp_ms += chunk_duration.as_millis() as u64;
                }

                if !loop_playback || pcm.is_empty() {
                    break;
                }
            }

            debug!("{} playback finished", name);
        });

        info!("Acquired {} ({} samples/chunk)", self.name, chunk_len);

        Ok(AudioCapture::new(rx, move || task.abort()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
