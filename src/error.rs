use thiserror::Error;

/// Audio capture could not be acquired
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// Device missing, busy, or the backing file could not be read
    #[error("audio source unavailable: {0}")]
    Unavailable(String),

    /// The OS refused access to the input device
    #[error("audio capture permission denied: {0}")]
    PermissionDenied(String),

    /// Audio exists but is in a layout we cannot stream
    #[error("unsupported audio format: {0}")]
    Format(String),
}

/// Failure of the remote streaming channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("failed to open transcription stream: {0}")]
    Open(String),

    #[error("transcription stream failed: {0}")]
    Stream(String),

    #[error("failed to send on transcription stream: {0}")]
    Send(String),

    #[error("transcription stream closed: {0}")]
    Closed(String),
}

/// Errors surfaced by [`SessionManager`](crate::session::SessionManager) operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Non-fatal; logged and otherwise ignored
    #[error("keepalive failed: {0}")]
    Keepalive(String),

    /// Capture was stopped before acquisition finished
    #[error("capture cancelled before it started")]
    Cancelled,
}
