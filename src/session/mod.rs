//! Dictation session management
//!
//! This module provides the `SessionManager` that owns:
//! - The streaming connection state machine (Idle/Connecting/Online/Error)
//! - Buffering of audio captured before the connection is ready
//! - Keepalive heartbeats while online
//! - The grace period between "stop talking" and closing the connection
//! - Transcript assembly from interim/final results

mod buffer;
mod config;
mod connection;
mod manager;
mod stats;
pub mod timer;
mod transcript;

pub use buffer::ChunkBuffer;
pub use config::SessionConfig;
pub use connection::{
    ConnectionEvent, ConnectionEventSender, ConnectionParams, SessionConnection,
    StreamingChannel, StreamingTransport,
};
pub use manager::{CaptureId, SessionManager};
pub use stats::{SessionEvent, SessionStats, SessionStatus, StatusSnapshot};
pub use transcript::{TranscriptAssembler, TranscriptEvent, TranscriptKind, TranscriptSnapshot};
