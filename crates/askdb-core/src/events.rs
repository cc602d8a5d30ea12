//! Events emitted by a conversational turn.
//!
//! A turn emits, in order: `sql`, `query_result`, zero or more `answer`,
//! at most one `chart`, then `done`. A failing turn emits `error` (possibly
//! after `sql`) followed by `done`. `done` is always last and appears
//! exactly once.

use serde::{Deserialize, Serialize};

use crate::types::{ChartSpec, QueryRows};

/// A single stage outcome of a turn, in emission order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TurnEvent {
    /// Sanitized SQL produced by the generation collaborator.
    SqlGenerated { sql: String },
    /// Rows returned by the execution sandbox.
    QueryExecuted { rows: QueryRows },
    /// One line-terminated fragment of the explanation (the last one may lack a newline).
    AnswerChunk { text: String },
    /// Chart specification for the result.
    ChartReady { chart: ChartSpec },
    /// Terminal failure with a human-readable diagnostic.
    Failed { message: String },
    /// End of the turn. Always the final event.
    Completed,
}

impl TurnEvent {
    /// Event name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            TurnEvent::SqlGenerated { .. } => "sql",
            TurnEvent::QueryExecuted { .. } => "query_result",
            TurnEvent::AnswerChunk { .. } => "answer",
            TurnEvent::ChartReady { .. } => "chart",
            TurnEvent::Failed { .. } => "error",
            TurnEvent::Completed => "done",
        }
    }

    /// Event payload on the wire.
    pub fn payload(&self) -> String {
        match self {
            TurnEvent::SqlGenerated { sql } => sql.clone(),
            TurnEvent::QueryExecuted { rows } => rows.to_json(),
            TurnEvent::AnswerChunk { text } => text.clone(),
            TurnEvent::ChartReady { chart } => {
                serde_json::to_string(chart).unwrap_or_else(|_| "{}".to_string())
            }
            TurnEvent::Failed { message } => message.clone(),
            TurnEvent::Completed => String::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnEvent::Completed)
    }
}
