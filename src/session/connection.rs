use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::timer::ScopedTask;
use super::transcript::TranscriptEvent;
use crate::audio::AudioChunk;
use crate::error::{ConnectionError, SessionError};

/// Options passed through to the transcription service when a stream opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub model: String,
    pub language: String,
    pub smart_format: bool,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
            smart_format: true,
        }
    }
}

/// Inbound lifecycle and data events from one streaming channel
///
/// Transports must normalize protocol-specific event names into these
/// variants. `Opened` precedes any `Transcript`; after `Error` or `Closed`
/// the channel is dead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    Transcript(TranscriptEvent),
    Error(ConnectionError),
    Closed(String),
}

pub type ConnectionEventSender = mpsc::UnboundedSender<ConnectionEvent>;

/// Remote transcription service that can open streaming channels
pub trait StreamingTransport: Send + Sync {
    /// Start opening a channel
    ///
    /// Returns immediately; readiness is signalled by `ConnectionEvent::Opened`
    /// on `events`. An `Err` means the attempt could not even start.
    fn open(
        &self,
        params: &ConnectionParams,
        events: ConnectionEventSender,
    ) -> Result<Box<dyn StreamingChannel>, ConnectionError>;

    fn name(&self) -> &str;
}

/// Outbound half of one open streaming channel
pub trait StreamingChannel: Send + Sync {
    /// Whether the channel is open and accepting audio
    fn is_ready(&self) -> bool;

    fn send_audio(&self, chunk: AudioChunk) -> Result<(), ConnectionError>;

    /// Zero-payload liveness pulse
    fn send_keep_alive(&self) -> Result<(), ConnectionError>;

    /// Request graceful shutdown; must be idempotent
    fn close(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// One streaming channel as seen by the session manager
///
/// Owns the channel and the task pumping its events. Dropping the
/// connection closes the channel and stops the pump.
pub struct SessionConnection {
    id: u64,
    channel: Box<dyn StreamingChannel>,
    state: ConnectionState,
    event_pump: Option<ScopedTask>,
}

impl SessionConnection {
    pub fn new(id: u64, channel: Box<dyn StreamingChannel>) -> Self {
        Self {
            id,
            channel,
            state: ConnectionState::Connecting,
            event_pump: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn attach_event_pump(&mut self, pump: ScopedTask) {
        self.event_pump = Some(pump);
    }

    pub fn mark_open(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Open;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Open && self.channel.is_ready()
    }

    /// Send a chunk, or hand it back untouched if the channel is not ready
    ///
    /// A chunk accepted here but rejected by the channel itself is lost.
    pub fn send(&self, chunk: AudioChunk) -> Result<(), AudioChunk> {
        if !self.is_ready() {
            return Err(chunk);
        }
        if let Err(e) = self.channel.send_audio(chunk) {
            warn!("Connection {}: audio chunk lost: {}", self.id, e);
        }
        Ok(())
    }

    pub fn send_keep_alive(&self) -> Result<(), SessionError> {
        self.channel
            .send_keep_alive()
            .map_err(|e| SessionError::Keepalive(e.to_string()))
    }

    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        info!("Closing connection {}", self.id);
        self.state = ConnectionState::Closed;
        self.channel.close();
    }
}

impl Drop for SessionConnection {
    fn drop(&mut self) {
        if self.state != ConnectionState::Closed {
            debug!("Connection {} dropped while {:?}", self.id, self.state);
            self.close();
        }
    }
}
