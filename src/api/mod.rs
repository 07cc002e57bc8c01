//! HTTP API for running agent turns and inspecting sessions.
//!
//! ## Endpoints
//!
//! - `POST /api/agent/run` - Answer a question within a session
//! - `GET /api/sessions/:id` - Committed history of a session
//! - `DELETE /api/sessions/:id` - Clear a session
//! - `GET /api/tools?category=` - Registered tools, optionally one category
//! - `GET /api/health` - Health check

mod routes;
pub mod types;

pub use routes::{router, serve, AppState};
