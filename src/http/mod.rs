//! HTTP API for external push-to-talk control
//!
//! - POST /talk/start - Start capturing and streaming
//! - POST /talk/stop - Stop capturing (connection kept for the grace period)
//! - GET /transcript - Current committed + interim text
//! - POST /transcript/clear - Clear the transcript
//! - GET /status - Session statistics
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{ErrorResponse, StartTalkingResponse};
pub use routes::create_router;
pub use state::AppState;
