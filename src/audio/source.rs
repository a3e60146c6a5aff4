use crate::error::CaptureError;
use tokio::sync::mpsc;

/// One captured slice of audio, opaque to the session core
///
/// Ordering is carried by the channel the chunk travels on; no sequence
/// number is stored here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Encoded audio bytes (16-bit little-endian PCM for the bundled sources)
    pub data: Vec<u8>,
    /// Capture timestamp in milliseconds since the capture started
    pub timestamp_ms: u64,
}

impl AudioChunk {
    pub fn new(data: Vec<u8>, timestamp_ms: u64) -> Self {
        Self { data, timestamp_ms }
    }

    /// Encode i16 PCM samples as little-endian bytes
    pub fn from_samples(samples: &[i16], timestamp_ms: u64) -> Self {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self { data, timestamp_ms }
    }
}

/// An acquired capture: a chunk stream plus the means to release the device
///
/// Dropping the capture releases the device.
pub struct AudioCapture {
    chunks: mpsc::Receiver<AudioChunk>,
    release: CaptureRelease,
}

impl AudioCapture {
    pub fn new(chunks: mpsc::Receiver<AudioChunk>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            chunks,
            release: CaptureRelease(Some(Box::new(release))),
        }
    }

    /// A capture whose release has nothing to free beyond the channel itself
    pub fn from_receiver(chunks: mpsc::Receiver<AudioChunk>) -> Self {
        Self::new(chunks, || {})
    }

    /// Split into the chunk stream and the release guard
    pub fn into_parts(self) -> (mpsc::Receiver<AudioChunk>, CaptureRelease) {
        (self.chunks, self.release)
    }

    /// Stop emission and free the device
    pub fn release(self) {
        drop(self);
    }
}

/// Runs the source's release hook exactly once, on drop
pub struct CaptureRelease(Option<Box<dyn FnOnce() + Send>>);

impl Drop for CaptureRelease {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

/// Audio capture collaborator
///
/// Implementations:
/// - `FileSource`: streams a WAV file at real-time cadence
/// - test fakes under `tests/common`
#[async_trait::async_trait]
pub trait AudioSource: Send + Sync {
    /// Acquire the input and start emitting chunks (~200ms cadence)
    async fn acquire(&self) -> Result<AudioCapture, CaptureError>;

    /// Source name for logging
    fn name(&self) -> &str;
}
