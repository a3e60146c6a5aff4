use crate::session::SessionManager;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The dictation session this service controls
    pub manager: SessionManager,
}

impl AppState {
    pub fn new(manager: SessionManager) -> Self {
        Self { manager }
    }
}
