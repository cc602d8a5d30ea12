//! askdb chat crate - the conversational turn pipeline.
//!
//! A turn turns one natural-language question into an ordered stream of
//! [`askdb_core::TurnEvent`]s: generated SQL, the sandboxed result, a
//! line-chunked explanation, an optional chart, and a terminal `done`.
//! The assistant half of the turn is persisted exactly once at the end.

pub mod chunker;
pub mod collaborator;
pub mod error;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod persistence;
pub mod prompts;
pub mod sanitize;

pub use chunker::LineChunker;
pub use collaborator::{AnswerStream, AnswerStreamer, ChartGenerator, Collaborators, SqlGenerator};
pub use error::ChatError;
pub use llm::OpenAiCompatClient;
pub use memory::{MemoryEntry, MemoryStore};
pub use orchestrator::{TurnHandle, TurnOrchestrator, TurnRequest};
pub use persistence::TurnStore;
pub use sanitize::sanitize_sql;
