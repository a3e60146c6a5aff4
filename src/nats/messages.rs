use serde::{Deserialize, Serialize};

use crate::session::TranscriptEvent;

/// Sent once per stream, before any audio
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionOpenMessage {
    pub session_id: String,
    pub model: String,
    pub language: String,
    pub smart_format: bool,
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String, // RFC3339 timestamp
}

/// Audio frame message published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub session_id: String,
    pub sequence: u32,
    pub pcm: String, // Base64-encoded PCM bytes
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String, // RFC3339 timestamp
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Liveness pulse for an idle stream
#[derive(Debug, Serialize, Deserialize)]
pub struct KeepAliveMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub session_id: String,
    pub timestamp: String,
}

impl KeepAliveMessage {
    pub fn new(session_id: String) -> Self {
        Self {
            kind: "KeepAlive".to_string(),
            session_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Transcript message received from STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    pub text: String,
    pub partial: bool,
    pub timestamp: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl TranscriptMessage {
    pub fn into_event(self) -> TranscriptEvent {
        if self.partial {
            TranscriptEvent::interim(self.text)
        } else {
            TranscriptEvent::final_text(self.text)
        }
    }
}
