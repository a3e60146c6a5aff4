pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod nats;
pub mod session;

pub use audio::{AudioCapture, AudioChunk, AudioFile, AudioSource, FileSource, FileSourceConfig};
pub use config::Config;
pub use error::{CaptureError, ConnectionError, SessionError};
pub use http::{create_router, AppState};
pub use nats::{NatsTransport, NatsTransportConfig};
pub use session::{
    CaptureId, ConnectionEvent, ConnectionParams, SessionConfig, SessionEvent, SessionManager,
    SessionStats, SessionStatus, StatusSnapshot, StreamingChannel, StreamingTransport,
    TranscriptEvent, TranscriptSnapshot,
};
