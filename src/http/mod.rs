//! HTTP API for the meet backend
//!
//! Every endpoint answers with the same envelope,
//! `{"error": bool, "message": string, "data": value|null}`:
//! - POST /meets - Create a meet
//! - POST /meets/:code/start - Open the meet window
//! - POST /meets/:code/end - Record an end reason
//! - POST /meets/:code/conversation/open - First system utterance
//! - POST /meets/:code/conversation/turns - Submit one user audio turn
//! - POST /meets/:code/conversation/advance - Next system utterance
//! - GET /health - Health check

mod auth;
mod handlers;
mod routes;
mod state;

pub use auth::CurrentUser;
pub use routes::create_router;
pub use state::AppState;
