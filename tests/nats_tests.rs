use base64::Engine;
use loqa_dictation::nats::messages::{
    AudioFrameMessage, KeepAliveMessage, SessionOpenMessage, TranscriptMessage,
};
use loqa_dictation::nats::{NatsTransport, NatsTransportConfig};
use loqa_dictation::session::{
    ConnectionEvent, ConnectionParams, StreamingTransport, TranscriptKind,
};
use loqa_dictation::ConnectionError;
use std::time::Duration;
use tokio::sync::mpsc;

#[test]
fn test_audio_frame_serialization() {
    let msg = AudioFrameMessage {
        session_id: "stream-1".to_string(),
        sequence: 0,
        pcm: base64::engine::general_purpose::STANDARD.encode([0u8; 100]),
        sample_rate: 16000,
        channels: 1,
        timestamp: "2025-10-27T14:30:00Z".to_string(),
        final_frame: false,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("stream-1"));
    assert!(json.contains("\"final\":false"));
    assert!(json.contains("\"sequence\":0"));

    let deserialized: AudioFrameMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.sample_rate, 16000);
    assert_eq!(deserialized.channels, 1);
    assert!(!deserialized.final_frame);

    let pcm = base64::engine::general_purpose::STANDARD
        .decode(&deserialized.pcm)
        .unwrap();
    assert_eq!(pcm.len(), 100);
}

#[test]
fn test_audio_frame_final_marker() {
    let msg = AudioFrameMessage {
        session_id: "stream-1".to_string(),
        sequence: 10,
        pcm: String::new(),
        sample_rate: 16000,
        channels: 1,
        timestamp: "2025-10-27T14:30:00Z".to_string(),
        final_frame: true,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"final\":true"));

    let deserialized: AudioFrameMessage = serde_json::from_str(&json).unwrap();
    assert!(deserialized.final_frame);
    assert!(deserialized.pcm.is_empty());
    assert_eq!(deserialized.sequence, 10);
}

#[test]
fn test_session_open_carries_connection_params() {
    let msg = SessionOpenMessage {
        session_id: "stream-2".to_string(),
        model: "nova-2".to_string(),
        language: "en-US".to_string(),
        smart_format: true,
        sample_rate: 16000,
        channels: 1,
        timestamp: "2025-10-27T14:30:00Z".to_string(),
    };

    let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["model"], "nova-2");
    assert_eq!(value["language"], "en-US");
    assert_eq!(value["smart_format"], true);
}

#[test]
fn test_keepalive_message_type_field() {
    let msg = KeepAliveMessage::new("stream-3".to_string());

    let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["type"], "KeepAlive");
    assert_eq!(value["session_id"], "stream-3");
    assert!(value.get("kind").is_none());
}

#[test]
fn test_transcript_deserialization() {
    let json = r#"{
        "session_id": "stream-1",
        "text": "Hello world",
        "partial": false,
        "timestamp": "2025-10-27T14:30:05Z",
        "confidence": 0.95
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.session_id, "stream-1");
    assert_eq!(msg.confidence, Some(0.95));

    let event = msg.into_event();
    assert_eq!(event.kind, TranscriptKind::Final);
    assert_eq!(event.text, "Hello world");
}

#[test]
fn test_partial_transcript_is_interim() {
    let json = r#"{
        "session_id": "stream-1",
        "text": "Hello wor",
        "partial": true,
        "timestamp": "2025-10-27T14:30:05Z"
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.confidence, None);

    let event = msg.into_event();
    assert_eq!(event.kind, TranscriptKind::Interim);
    assert_eq!(event.text, "Hello wor");
}

#[tokio::test]
async fn test_open_against_unreachable_server_reports_error() {
    let transport = NatsTransport::new(NatsTransportConfig {
        url: "nats://127.0.0.1:1".to_string(),
        connect_timeout: Duration::from_millis(500),
        ..NatsTransportConfig::default()
    });
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let channel = transport
        .open(&ConnectionParams::default(), events_tx)
        .expect("open returns a channel immediately");
    assert!(!channel.is_ready());

    let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
        .await
        .expect("transport reports within timeout")
        .expect("event channel open");

    assert!(matches!(
        event,
        ConnectionEvent::Error(ConnectionError::Open(_))
    ));
    assert!(!channel.is_ready());

    // Closing after the task has exited is harmless
    channel.close();
    channel.close();
}

#[test]
fn test_open_without_runtime_fails() {
    let transport = NatsTransport::new(NatsTransportConfig::default());
    let (events_tx, _events_rx) = mpsc::unbounded_channel();

    let result = transport.open(&ConnectionParams::default(), events_tx);
    assert!(matches!(result, Err(ConnectionError::Open(_))));
}
