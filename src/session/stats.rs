use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transcript::TranscriptSnapshot;

/// Connection state of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// No connection
    #[default]
    Idle,
    /// Channel opening; audio is buffered
    Connecting,
    /// Channel ready; audio flows
    Online,
    /// Last connection failed; next `start_talking` retries
    Error,
}

/// State pushed to the renderer on every transition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: SessionStatus,
    pub is_capturing: bool,
    pub last_error: Option<String>,
}

/// Notification delivered to subscribers, in transition order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StatusChanged(StatusSnapshot),
    TranscriptChanged(TranscriptSnapshot),
}

/// Statistics about the current session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Present once the first `start_talking` created the session
    pub session_id: Option<Uuid>,

    pub status: SessionStatus,

    /// Whether audio capture is currently active
    pub is_capturing: bool,

    pub last_error: Option<String>,

    /// When the session was created
    pub started_at: Option<DateTime<Utc>>,

    /// Chunks received from the audio source
    pub chunks_captured: u64,

    /// Chunks handed to a ready connection
    pub chunks_sent: u64,

    /// Chunks currently waiting for a connection
    pub chunks_buffered: usize,

    /// Chunks evicted because the buffer was full
    pub chunks_dropped: u64,

    /// Streaming channels opened
    pub connections_opened: u64,

    /// Keepalive pulses sent
    pub keepalives_sent: u64,
}
