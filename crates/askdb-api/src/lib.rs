//! askdb API crate - axum HTTP server, route handlers, SSE turn streaming.
//!
//! Exposes conversation management, database introspection and the chat
//! endpoint that streams a turn's events as server-sent events.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
