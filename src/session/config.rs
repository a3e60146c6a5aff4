use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::connection::ConnectionParams;

/// Configuration for a dictation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Options passed to the transcription service on every open
    pub connection: ConnectionParams,

    /// How long a connection stays up after capture stops
    /// Default: 60 seconds
    pub grace_period: Duration,

    /// Keepalive cadence while online
    /// Default: 5 seconds
    pub keepalive_interval: Duration,

    /// Buffer limit while no connection is ready (oldest dropped first);
    /// `None` buffers without bound
    /// Default: 1500 chunks (5 minutes of 200ms chunks)
    pub max_buffered_chunks: Option<usize>,

    /// Capacity of the notification channel per subscriber
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionParams::default(),
            grace_period: Duration::from_secs(60),
            keepalive_interval: Duration::from_secs(5),
            max_buffered_chunks: Some(1500),
            event_capacity: 256,
        }
    }
}
