pub mod convert;
pub mod file;
pub mod source;

pub use file::{AudioFile, FileSource, FileSourceConfig};
pub use source::{AudioCapture, AudioChunk, AudioSource, CaptureRelease};
