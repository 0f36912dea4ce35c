//! HTTP API for driving the live session from a front-end
//!
//! - POST /live/start - Start the live conversation
//! - POST /live/stop - Stop it
//! - GET /live/status - Query session state and counters
//! - GET /live/transcript - Get finalized turns and the turn in progress
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
