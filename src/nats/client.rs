use async_nats::Client;
use base64::Engine;
use futures::stream::StreamExt;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::messages::{AudioFrameMessage, KeepAliveMessage, SessionOpenMessage, TranscriptMessage};
use crate::audio::AudioChunk;
use crate::error::ConnectionError;
use crate::session::{
    ConnectionEvent, ConnectionEventSender, ConnectionParams, StreamingChannel, StreamingTransport,
};

const SESSION_OPEN_SUBJECT: &str = "stt.session.open";
const TRANSCRIPT_SUBJECT: &str = "stt.text.>";

/// Configuration for [`NatsTransport`]
#[derive(Debug, Clone)]
pub struct NatsTransportConfig {
    pub url: String,
    pub connect_timeout: Duration,
    /// Format of the PCM carried in each chunk
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for NatsTransportConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            connect_timeout: Duration::from_secs(10),
            sample_rate: 16000, // Whisper expects 16kHz
            channels: 1,        // Mono
        }
    }
}

/// Streams audio to the STT service over NATS
///
/// Each `open` makes its own NATS connection and stream id. Audio goes to
/// `audio.frame.<stream>`; transcripts come back on `stt.text.>` and are
/// filtered by stream id.
pub struct NatsTransport {
    config: NatsTransportConfig,
}

impl NatsTransport {
    pub fn new(config: NatsTransportConfig) -> Self {
        Self { config }
    }
}

impl StreamingTransport for NatsTransport {
    fn open(
        &self,
        params: &ConnectionParams,
        events: ConnectionEventSender,
    ) -> Result<Box<dyn StreamingChannel>, ConnectionError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ConnectionError::Open(format!("no async runtime: {}", e)))?;

        let stream_id = Uuid::new_v4().to_string();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let ready = Arc::new(AtomicBool::new(false));

        let task = StreamTask {
            config: self.config.clone(),
            params: params.clone(),
            stream_id: stream_id.clone(),
            ready: Arc::clone(&ready),
        };
        runtime.spawn(task.run(outbound_rx, events));

        debug!("NATS stream {} opening", stream_id);

        Ok(Box::new(NatsChannel {
            stream_id,
            outbound: outbound_tx,
            ready,
            closed: AtomicBool::new(false),
        }))
    }

    fn name(&self) -> &str {
        "nats"
    }
}

enum Outbound {
    Audio(AudioChunk),
    KeepAlive,
    Close,
}

struct NatsChannel {
    stream_id: String,
    outbound: mpsc::UnboundedSender<Outbound>,
    ready: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl NatsChannel {
    fn enqueue(&self, message: Outbound) -> Result<(), ConnectionError> {
        self.outbound
            .send(message)
            .map_err(|_| ConnectionError::Send(format!("stream {} has exited", self.stream_id)))
    }
}

impl StreamingChannel for NatsChannel {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    fn send_audio(&self, chunk: AudioChunk) -> Result<(), ConnectionError> {
        self.enqueue(Outbound::Audio(chunk))
    }

    fn send_keep_alive(&self) -> Result<(), ConnectionError> {
        self.enqueue(Outbound::KeepAlive)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.ready.store(false, Ordering::SeqCst);
        // Task may already be gone; nothing left to close then
        let _ = self.outbound.send(Outbound::Close);
    }
}

struct StreamTask {
    config: NatsTransportConfig,
    params: ConnectionParams,
    stream_id: String,
    ready: Arc<AtomicBool>,
}

impl StreamTask {
    async fn run(
        self,
        outbound: mpsc::UnboundedReceiver<Outbound>,
        events: ConnectionEventSender,
    ) {
        let result = self.stream(outbound, &events).await;
        self.ready.store(false, Ordering::SeqCst);

        // Receiver is gone once the session dropped this connection
        let _ = match result {
            Ok(reason) => events.send(ConnectionEvent::Closed(reason)),
            Err(e) => events.send(ConnectionEvent::Error(e)),
        };
    }

    async fn stream(
        &self,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
        events: &ConnectionEventSender,
    ) -> Result<String, ConnectionError> {
        info!("Connecting to NATS at {}", self.config.url);

        let client = tokio::time::timeout(
            self.config.connect_timeout,
            async_nats::connect(self.config.url.as_str()),
        )
        .await
        .map_err(|_| ConnectionError::Open(format!("timed out connecting to {}", self.config.url)))?
        .map_err(|e| ConnectionError::Open(e.to_string()))?;

        let open = SessionOpenMessage {
            session_id: self.stream_id.clone(),
            model: self.params.model.clone(),
            language: self.params.language.clone(),
            smart_format: self.params.smart_format,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        publish_json(&client, SESSION_OPEN_SUBJECT.to_string(), &open)
            .await
            .map_err(ConnectionError::Open)?;

        let mut transcripts = client
            .subscribe(TRANSCRIPT_SUBJECT.to_string())
            .await
            .map_err(|e| ConnectionError::Open(format!("failed to subscribe to transcripts: {}", e)))?;

        info!("NATS stream {} open", self.stream_id);
        self.ready.store(true, Ordering::SeqCst);
        if events.send(ConnectionEvent::Opened).is_err() {
            return Ok("session gone before open".to_string());
        }

        let audio_subject = format!("audio.frame.{}", self.stream_id);
        let keepalive_subject = format!("stt.session.keepalive.{}", self.stream_id);
        let mut sequence: u32 = 0;

        loop {
            tokio::select! {
                command = outbound.recv() => match command {
                    Some(Outbound::Audio(chunk)) => {
                        let frame = self.frame(&chunk.data, sequence, false);
                        publish_json(&client, audio_subject.clone(), &frame)
                            .await
                            .map_err(ConnectionError::Stream)?;
                        sequence = sequence.wrapping_add(1);
                    }
                    Some(Outbound::KeepAlive) => {
                        let pulse = KeepAliveMessage::new(self.stream_id.clone());
                        publish_json(&client, keepalive_subject.clone(), &pulse)
                            .await
                            .map_err(ConnectionError::Stream)?;
                    }
                    Some(Outbound::Close) | None => {
                        let marker = self.frame(&[], sequence, true);
                        if let Err(e) = publish_json(&client, audio_subject.clone(), &marker).await {
                            warn!("Failed to publish final frame marker: {}", e);
                        }
                        if let Err(e) = client.flush().await {
                            warn!("Failed to flush NATS connection: {}", e);
                        }
                        info!("NATS stream {} closed after {} frames", self.stream_id, sequence);
                        return Ok("closed by client".to_string());
                    }
                },
                message = transcripts.next() => match message {
                    Some(msg) => match serde_json::from_slice::<TranscriptMessage>(&msg.payload) {
                        Ok(transcript) if transcript.session_id == self.stream_id => {
                            debug!(
                                "Transcript (partial={}): {}",
                                transcript.partial, transcript.text
                            );
                            let event = ConnectionEvent::Transcript(transcript.into_event());
                            if events.send(event).is_err() {
                                return Ok("session gone".to_string());
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Failed to parse transcript message: {}", e),
                    },
                    None => return Ok("transcript subscription ended".to_string()),
                },
            }
        }
    }

    fn frame(&self, pcm: &[u8], sequence: u32, final_frame: bool) -> AudioFrameMessage {
        AudioFrameMessage {
            session_id: self.stream_id.clone(),
            sequence,
            pcm: base64::engine::general_purpose::STANDARD.encode(pcm),
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame,
        }
    }
}

async fn publish_json<T: Serialize>(
    client: &Client,
    subject: String,
    message: &T,
) -> Result<(), String> {
    let payload = serde_json::to_vec(message).map_err(|e| e.to_string())?;
    client
        .publish(subject, payload.into())
        .await
        .map_err(|e| e.to_string())
}
