//! askdb storage crate - SQLite persistence for conversations and messages.
//!
//! Provides a WAL-mode SQLite database with migrations and repositories for
//! sessions and their messages, including the partial update used to
//! finalize an assistant message at the end of a turn.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{ConversationRepository, MessageRepository};
