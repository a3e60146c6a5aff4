pub mod client;
pub mod messages;

pub use client::{NatsTransport, NatsTransportConfig};
pub use messages::{AudioFrameMessage, KeepAliveMessage, SessionOpenMessage, TranscriptMessage};
