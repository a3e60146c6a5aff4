// Test doubles for the session's external collaborators
//
// MockTransport records every open/send/keepalive/close and lets a test
// inject connection events. ScriptedSource hands out captures whose chunks
// the test pushes by hand.

#![allow(dead_code)]

use loqa_dictation::audio::{AudioCapture, AudioChunk, AudioSource};
use loqa_dictation::session::{
    ConnectionEvent, ConnectionEventSender, ConnectionParams, SessionConfig, SessionEvent,
    SessionManager, StreamingChannel, StreamingTransport,
};
use loqa_dictation::{CaptureError, ConnectionError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

// ============================================================================
// Transport
// ============================================================================

struct MockConnection {
    events: ConnectionEventSender,
    ready: bool,
    closed: bool,
}

#[derive(Default)]
struct TransportInner {
    opens: Vec<ConnectionParams>,
    connections: Vec<MockConnection>,
    sent: Vec<(usize, Vec<u8>)>,
    keepalives: usize,
    closes: usize,
    fail_next_open: Option<ConnectionError>,
    fail_keepalives: bool,
}

#[derive(Default)]
pub struct MockTransport {
    inner: Arc<Mutex<TransportInner>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open_count(&self) -> usize {
        self.inner.lock().unwrap().opens.len()
    }

    pub fn last_params(&self) -> Option<ConnectionParams> {
        self.inner.lock().unwrap().opens.last().cloned()
    }

    /// Payloads sent across all connections, in send order
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// First byte of each payload, which the tests use as a chunk label
    pub fn sent_labels(&self) -> Vec<u8> {
        self.sent().iter().map(|data| data[0]).collect()
    }

    pub fn sent_on(&self, connection: usize) -> Vec<u8> {
        self.inner
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(index, _)| *index == connection)
            .map(|(_, data)| data[0])
            .collect()
    }

    pub fn keepalive_count(&self) -> usize {
        self.inner.lock().unwrap().keepalives
    }

    pub fn close_count(&self) -> usize {
        self.inner.lock().unwrap().closes
    }

    pub fn is_closed(&self, connection: usize) -> bool {
        self.inner.lock().unwrap().connections[connection].closed
    }

    pub fn set_ready(&self, connection: usize, ready: bool) {
        self.inner.lock().unwrap().connections[connection].ready = ready;
    }

    pub fn fail_next_open(&self, error: ConnectionError) {
        self.inner.lock().unwrap().fail_next_open = Some(error);
    }

    pub fn fail_keepalives(&self, fail: bool) {
        self.inner.lock().unwrap().fail_keepalives = fail;
    }

    /// Deliver an event as if the remote side produced it
    pub fn emit(&self, connection: usize, event: ConnectionEvent) {
        let mut inner = self.inner.lock().unwrap();
        let conn = &mut inner.connections[connection];
        match &event {
            ConnectionEvent::Opened => conn.ready = true,
            ConnectionEvent::Error(_) | ConnectionEvent::Closed(_) => conn.ready = false,
            ConnectionEvent::Transcript(_) => {}
        }
        let _ = conn.events.send(event);
    }
}

impl StreamingTransport for MockTransport {
    fn open(
        &self,
        params: &ConnectionParams,
        events: ConnectionEventSender,
    ) -> Result<Box<dyn StreamingChannel>, ConnectionError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_open.take() {
            return Err(error);
        }
        inner.opens.push(params.clone());
        inner.connections.push(MockConnection {
            events,
            ready: false,
            closed: false,
        });
        Ok(Box::new(MockChannel {
            index: inner.connections.len() - 1,
            inner: Arc::clone(&self.inner),
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockChannel {
    index: usize,
    inner: Arc<Mutex<TransportInner>>,
}

impl StreamingChannel for MockChannel {
    fn is_ready(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        let conn = &inner.connections[self.index];
        conn.ready && !conn.closed
    }

    fn send_audio(&self, chunk: AudioChunk) -> Result<(), ConnectionError> {
        self.inner.lock().unwrap().sent.push((self.index, chunk.data));
        Ok(())
    }

    fn send_keep_alive(&self) -> Result<(), ConnectionError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_keepalives {
            return Err(ConnectionError::Send("socket buffer full".to_string()));
        }
        inner.keepalives += 1;
        Ok(())
    }

    fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.connections[self.index].closed {
            inner.connections[self.index].closed = true;
            inner.closes += 1;
        }
    }
}

// ============================================================================
// Audio source
// ============================================================================

#[derive(Default)]
struct SourceInner {
    senders: Vec<mpsc::Sender<AudioChunk>>,
    fail_next: Option<CaptureError>,
    delay: Option<Duration>,
}

#[derive(Default)]
pub struct ScriptedSource {
    inner: Mutex<SourceInner>,
    releases: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn acquisitions(&self) -> usize {
        self.inner.lock().unwrap().senders.len()
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, error: CaptureError) {
        self.inner.lock().unwrap().fail_next = Some(error);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().delay = Some(delay);
    }

    /// Emit a one-byte chunk labelled `label` on the latest capture
    ///
    /// Returns false if that capture has been released.
    pub async fn push(&self, label: u8) -> bool {
        let sender = self.inner.lock().unwrap().senders.last().cloned();
        match sender {
            Some(tx) => tx
                .send(AudioChunk::new(vec![label], label as u64 * 200))
                .await
                .is_ok(),
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl AudioSource for ScriptedSource {
    async fn acquire(&self) -> Result<AudioCapture, CaptureError> {
        let (delay, failure) = {
            let mut inner = self.inner.lock().unwrap();
            (inner.delay, inner.fail_next.take())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = failure {
            return Err(error);
        }

        let (tx, rx) = mpsc::channel(64);
        self.inner.lock().unwrap().senders.push(tx);

        let releases = Arc::clone(&self.releases);
        Ok(AudioCapture::new(rx, move || {
            releases.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn manager(source: &Arc<ScriptedSource>, transport: &Arc<MockTransport>) -> SessionManager {
    manager_with_config(SessionConfig::default(), source, transport)
}

pub fn manager_with_config(
    config: SessionConfig,
    source: &Arc<ScriptedSource>,
    transport: &Arc<MockTransport>,
) -> SessionManager {
    SessionManager::new(config, source.clone(), transport.clone())
}

/// Let spawned pumps and handlers run to idle
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub fn drain_events(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
