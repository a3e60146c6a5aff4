use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use futures::future::poll_fn;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::buffer::ChunkBuffer;
use super::config::SessionConfig;
use super::connection::{ConnectionEvent, SessionConnection, StreamingTransport};
use super::stats::{SessionEvent, SessionStats, SessionStatus, StatusSnapshot};
use super::timer::{self, ScopedTask};
use super::transcript::{TranscriptAssembler, TranscriptSnapshot};
use crate::audio::{AudioChunk, AudioSource, CaptureRelease};
use crate::error::{ConnectionError, SessionError};

/// Identifies one capture started by `start_talking`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureId(pub u64);

enum Capture {
    Off,
    /// `start_talking` is waiting on the audio source
    Acquiring { id: u64 },
    Active {
        id: u64,
        // Field order matters: stop the pump before releasing the device
        pump: ScopedTask,
        /// Only read under the state lock, so chunks leave in capture order
        chunks: mpsc::Receiver<AudioChunk>,
        release: CaptureRelease,
    },
}

#[derive(Debug, Default)]
struct Counters {
    captured: u64,
    sent: u64,
    connections_opened: u64,
    keepalives_sent: u64,
}

struct SessionState {
    session_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    status: SessionStatus,
    last_error: Option<String>,
    connection: Option<SessionConnection>,
    capture: Capture,
    buffer: ChunkBuffer,
    assembler: TranscriptAssembler,
    heartbeat: Option<ScopedTask>,
    grace: Option<ScopedTask>,
    counters: Counters,
    last_id: u64,
}

impl SessionState {
    fn new(config: &SessionConfig) -> Self {
        Self {
            session_id: None,
            started_at: None,
            status: SessionStatus::Idle,
            last_error: None,
            connection: None,
            capture: Capture::Off,
            buffer: ChunkBuffer::with_capacity_limit(config.max_buffered_chunks),
            assembler: TranscriptAssembler::new(),
            heartbeat: None,
            grace: None,
            counters: Counters::default(),
            last_id: 0,
        }
    }

    /// Ids for connections, captures and timers come from one sequence
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn is_capturing(&self) -> bool {
        matches!(self.capture, Capture::Active { .. })
    }

    fn connection_id(&self) -> Option<u64> {
        self.connection.as_ref().map(SessionConnection::id)
    }

    fn status_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: self.status,
            is_capturing: self.is_capturing(),
            last_error: self.last_error.clone(),
        }
    }
}

struct Shared {
    config: SessionConfig,
    source: Arc<dyn AudioSource>,
    transport: Arc<dyn StreamingTransport>,
    events: broadcast::Sender<SessionEvent>,
    state: Mutex<SessionState>,
}

/// Owns the streaming session lifecycle for a push-to-talk client
///
/// All mutation happens under one lock; nothing awaits while holding it.
/// Background tasks (chunk pump, connection event pump, heartbeat, grace
/// timer) hold weak references and re-enter through the same lock.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        source: Arc<dyn AudioSource>,
        transport: Arc<dyn StreamingTransport>,
    ) -> Self {
        info!(
            "Creating session manager (source: {}, transport: {}, grace: {:?}, keepalive: {:?})",
            source.name(),
            transport.name(),
            config.grace_period,
            config.keepalive_interval
        );

        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let state = Mutex::new(SessionState::new(&config));

        Self {
            shared: Arc::new(Shared {
                config,
                source,
                transport,
                events,
                state,
            }),
        }
    }

    /// Begin capturing and streaming audio
    ///
    /// Cancels a pending grace period and opens a connection if none is
    /// usable. Returns the existing capture if one is active or pending.
    /// A capture failure leaves any connection attempt running.
    pub async fn start_talking(&self) -> Result<CaptureId, SessionError> {
        let capture_id = {
            let mut state = self.shared.lock();

            if state.grace.take().is_some() {
                debug!("Grace period cancelled");
            }

            if state.session_id.is_none() {
                let id = Uuid::new_v4();
                info!("Starting session {}", id);
                state.session_id = Some(id);
                state.started_at = Some(Utc::now());
            }

            if state.connection.is_none() {
                self.shared.open_connection(&mut state);
            }

            match state.capture {
                Capture::Active { id, .. } | Capture::Acquiring { id } => {
                    debug!("Capture {} already running", id);
                    return Ok(CaptureId(id));
                }
                Capture::Off => {}
            }

            let id = state.next_id();
            state.capture = Capture::Acquiring { id };
            id
        };

        let acquired = self.shared.source.acquire().await;

        let mut state = self.shared.lock();
        let still_wanted =
            matches!(state.capture, Capture::Acquiring { id } if id == capture_id);

        match acquired {
            Ok(capture) if still_wanted => {
                let (chunks, release) = capture.into_parts();
                let pump = self.shared.spawn_chunk_pump(capture_id);
                state.capture = Capture::Active {
                    id: capture_id,
                    pump,
                    chunks,
                    release,
                };
                info!(
                    "Capture {} started from {}",
                    capture_id,
                    self.shared.source.name()
                );
                self.shared.publish_status(&state);
                Ok(CaptureId(capture_id))
            }
            Ok(capture) => {
                self.shared.ensure_grace(&mut state);
                drop(state);
                info!("Capture {} no longer wanted, releasing", capture_id);
                capture.release();
                Err(SessionError::Cancelled)
            }
            Err(e) if still_wanted => {
                warn!("Audio capture failed: {}", e);
                state.capture = Capture::Off;
                state.last_error = Some(e.to_string());
                self.shared.ensure_grace(&mut state);
                self.shared.publish_status(&state);
                Err(SessionError::Capture(e))
            }
            Err(e) => {
                debug!("Capture {} failed after cancellation: {}", capture_id, e);
                self.shared.ensure_grace(&mut state);
                Err(SessionError::Cancelled)
            }
        }
    }

    /// Stop capturing; keep the connection for the grace period
    pub fn stop_talking(&self) {
        let mut state = self.shared.lock();

        let capture_changed = match std::mem::replace(&mut state.capture, Capture::Off) {
            Capture::Active {
                id,
                pump,
                mut chunks,
                release,
            } => {
                drop(pump);
                // Audio already captured but not yet handled still goes out
                let mut trailing = 0;
                while let Ok(chunk) = chunks.try_recv() {
                    self.shared.on_chunk(&mut state, chunk);
                    trailing += 1;
                }
                drop(release);
                info!("Capture {} stopped ({} trailing chunks)", id, trailing);
                true
            }
            Capture::Acquiring { id } => {
                info!("Capture {} cancelled before acquisition finished", id);
                true
            }
            Capture::Off => false,
        };

        if state.assembler.clear_interim() {
            let snapshot = state.assembler.snapshot();
            self.shared.publish_transcript(snapshot);
        }

        if state.connection.is_some() {
            self.shared.arm_grace(&mut state);
        }

        if capture_changed {
            self.shared.publish_status(&state);
        }
    }

    /// Tear everything down; never fails
    ///
    /// Ends the session: timers are cancelled, the connection is closed,
    /// capture is released and buffered audio is discarded. The transcript
    /// is kept until `clear_transcript`.
    pub fn shutdown(&self) {
        let mut state = self.shared.lock();

        state.grace = None;
        state.heartbeat = None;
        state.capture = Capture::Off;
        if let Some(mut connection) = state.connection.take() {
            connection.close();
        }

        if let Some(id) = state.session_id.take() {
            info!("Session {} shut down", id);
        }
        state.started_at = None;
        state.last_error = None;
        state.counters = Counters::default();
        state.buffer = ChunkBuffer::with_capacity_limit(self.shared.config.max_buffered_chunks);

        self.shared.transition(&mut state, SessionStatus::Idle);
        self.shared.publish_status(&state);
    }

    pub fn clear_transcript(&self) -> TranscriptSnapshot {
        let mut state = self.shared.lock();
        let snapshot = state.assembler.reset();
        self.shared.publish_transcript(snapshot.clone());
        snapshot
    }

    /// Subscribe to status and transcript notifications
    ///
    /// Each receiver holds up to `event_capacity` undelivered events. A
    /// receiver that falls further behind gets `RecvError::Lagged` and the
    /// skipped events are gone; re-read `status()` and `transcript()` to
    /// catch up.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.shared.lock().status_snapshot()
    }

    pub fn transcript(&self) -> TranscriptSnapshot {
        self.shared.lock().assembler.snapshot()
    }

    pub fn is_capturing(&self) -> bool {
        self.shared.lock().is_capturing()
    }

    pub fn stats(&self) -> SessionStats {
        let state = self.shared.lock();
        SessionStats {
            session_id: state.session_id,
            status: state.status,
            is_capturing: state.is_capturing(),
            last_error: state.last_error.clone(),
            started_at: state.started_at,
            chunks_captured: state.counters.captured,
            chunks_sent: state.counters.sent,
            chunks_buffered: state.buffer.len(),
            chunks_dropped: state.buffer.dropped(),
            connections_opened: state.counters.connections_opened,
            keepalives_sent: state.counters.keepalives_sent,
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_status(&self, state: &SessionState) {
        // No subscribers is fine
        let _ = self
            .events
            .send(SessionEvent::StatusChanged(state.status_snapshot()));
    }

    fn publish_transcript(&self, snapshot: TranscriptSnapshot) {
        let _ = self.events.send(SessionEvent::TranscriptChanged(snapshot));
    }

    fn transition(&self, state: &mut SessionState, status: SessionStatus) {
        if state.status != status {
            info!("Session status: {:?} -> {:?}", state.status, status);
            state.status = status;
        }
    }

    fn open_connection(self: &Arc<Self>, state: &mut SessionState) {
        let id = state.next_id();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        info!(
            "Opening connection {} via {} (model={}, language={})",
            id,
            self.transport.name(),
            self.config.connection.model,
            self.config.connection.language
        );

        match self.transport.open(&self.config.connection, events_tx) {
            Ok(channel) => {
                let mut connection = SessionConnection::new(id, channel);
                connection.attach_event_pump(self.spawn_event_pump(id, events_rx));
                state.connection = Some(connection);
                state.counters.connections_opened += 1;
                state.last_error = None;
                self.transition(state, SessionStatus::Connecting);
                self.publish_status(state);
            }
            Err(e) => self.fail(state, e),
        }
    }

    /// Connecting/Online -> Error; buffered audio stays queued
    fn fail(&self, state: &mut SessionState, cause: ConnectionError) {
        error!("Connection failed: {}", cause);
        state.heartbeat = None;
        state.grace = None;
        state.connection = None;
        state.last_error = Some(cause.to_string());
        self.transition(state, SessionStatus::Error);
        self.publish_status(state);
    }

    fn go_idle(&self, state: &mut SessionState) {
        state.heartbeat = None;
        state.grace = None;
        if let Some(mut connection) = state.connection.take() {
            connection.close();
        }
        self.transition(state, SessionStatus::Idle);
        self.publish_status(state);
    }

    fn spawn_chunk_pump(self: &Arc<Self>, capture_id: u64) -> ScopedTask {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            poll_fn(|cx| match weak.upgrade() {
                Some(shared) => shared.poll_capture(capture_id, cx),
                None => Poll::Ready(()),
            })
            .await;
            debug!("Capture {} chunk stream ended", capture_id);
        });
        ScopedTask::new(capture_id, handle)
    }

    /// Handle every chunk the capture has ready; `Ready` once it is gone
    fn poll_capture(&self, capture_id: u64, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.lock();
        loop {
            let polled = match &mut state.capture {
                Capture::Active { id, chunks, .. } if *id == capture_id => chunks.poll_recv(cx),
                _ => return Poll::Ready(()),
            };
            match polled {
                Poll::Ready(Some(chunk)) => self.on_chunk(&mut state, chunk),
                Poll::Ready(None) => return Poll::Ready(()),
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    fn spawn_event_pump(
        self: &Arc<Self>,
        connection_id: u64,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) -> ScopedTask {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                shared.on_connection_event(connection_id, event);
            }
            // Transport went away without saying goodbye
            if let Some(shared) = weak.upgrade() {
                shared.on_connection_event(
                    connection_id,
                    ConnectionEvent::Closed("event stream ended".to_string()),
                );
            }
        });
        ScopedTask::new(connection_id, handle)
    }

    fn on_chunk(&self, state: &mut SessionState, chunk: AudioChunk) {
        state.counters.captured += 1;

        let SessionState {
            status,
            connection,
            buffer,
            counters,
            ..
        } = state;

        match connection {
            Some(connection) if *status == SessionStatus::Online && connection.is_ready() => {
                counters.sent += buffer.drain_into(|c| connection.send(c)) as u64;
                if !buffer.is_empty() {
                    buffer.push(chunk);
                    return;
                }
                match connection.send(chunk) {
                    Ok(()) => counters.sent += 1,
                    Err(chunk) => buffer.push(chunk),
                }
            }
            _ => {
                buffer.push(chunk);
                debug!("Buffered chunk ({} waiting)", buffer.len());
            }
        }
    }

    /// Send everything buffered while the connection is ready
    fn flush_buffer(&self, state: &mut SessionState) {
        let SessionState {
            connection,
            buffer,
            counters,
            ..
        } = state;

        if let Some(connection) = connection {
            if buffer.is_empty() {
                return;
            }
            let sent = buffer.drain_into(|c| connection.send(c));
            counters.sent += sent as u64;
            info!("Flushed {} buffered chunks ({} still waiting)", sent, buffer.len());
        }
    }

    fn on_connection_event(self: &Arc<Self>, connection_id: u64, event: ConnectionEvent) {
        let mut state = self.lock();

        if state.connection_id() != Some(connection_id) {
            debug!(
                "Ignoring {:?} from superseded connection {}",
                event, connection_id
            );
            return;
        }

        match event {
            ConnectionEvent::Opened => {
                if let Some(connection) = state.connection.as_mut() {
                    connection.mark_open();
                }
                self.transition(&mut state, SessionStatus::Online);
                self.start_heartbeat(&mut state);
                self.flush_buffer(&mut state);
                self.publish_status(&state);
            }
            ConnectionEvent::Transcript(event) => {
                if state.status != SessionStatus::Online {
                    warn!("Transcript received while {:?}", state.status);
                }
                let snapshot = state.assembler.apply(&event);
                self.publish_transcript(snapshot);
            }
            ConnectionEvent::Error(cause) => self.fail(&mut state, cause),
            ConnectionEvent::Closed(reason) => {
                if state.status == SessionStatus::Connecting {
                    self.fail(
                        &mut state,
                        ConnectionError::Closed(format!("closed before ready: {}", reason)),
                    );
                } else {
                    info!("Connection {} closed by remote: {}", connection_id, reason);
                    self.go_idle(&mut state);
                }
            }
        }
    }

    fn start_heartbeat(self: &Arc<Self>, state: &mut SessionState) {
        let id = state.next_id();
        let weak = Arc::downgrade(self);
        state.heartbeat = Some(timer::every(id, self.config.keepalive_interval, move || {
            match weak.upgrade() {
                Some(shared) => {
                    shared.on_heartbeat(id);
                    ControlFlow::Continue(())
                }
                None => ControlFlow::Break(()),
            }
        }));
    }

    fn on_heartbeat(&self, timer_id: u64) {
        let mut state = self.lock();

        if state.heartbeat.as_ref().map(ScopedTask::id) != Some(timer_id)
            || state.status != SessionStatus::Online
        {
            return;
        }

        let Some(connection) = state.connection.as_ref() else {
            return;
        };
        if !connection.is_ready() {
            debug!("Skipping keepalive, connection not ready");
            return;
        }

        match connection.send_keep_alive() {
            Ok(()) => {
                state.counters.keepalives_sent += 1;
                debug!("Keepalive sent");
            }
            Err(e) => warn!("{}", e),
        }
    }

    /// Re-arm the grace timer for an open connection nobody is talking into
    fn ensure_grace(self: &Arc<Self>, state: &mut SessionState) {
        if state.capture.is_off() && state.connection.is_some() && state.grace.is_none() {
            self.arm_grace(state);
        }
    }

    fn arm_grace(self: &Arc<Self>, state: &mut SessionState) {
        let id = state.next_id();
        let weak = Arc::downgrade(self);
        state.grace = Some(timer::after(id, self.config.grace_period, move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_grace_expired(id);
            }
        }));
        debug!("Grace period of {:?} armed", self.config.grace_period);
    }

    fn on_grace_expired(&self, timer_id: u64) {
        let mut state = self.lock();

        if state.grace.as_ref().map(ScopedTask::id) != Some(timer_id) {
            return;
        }
        state.grace = None;

        if state.capture.is_off() && state.connection.is_some() {
            info!("Grace period elapsed, closing connection");
            self.go_idle(&mut state);
        }
    }
}

impl Capture {
    fn is_off(&self) -> bool {
        matches!(self, Capture::Off)
    }
}
