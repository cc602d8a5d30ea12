//! Domain types shared across askdb crates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AskError;

// =============================================================================
// Conversations and messages
// =============================================================================

/// A conversation ("session") grouping an ordered list of messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(AskError::Serialization(format!("unknown role: {}", other))),
        }
    }
}

/// One half of a turn as persisted in the application database.
///
/// The assistant half is inserted empty when the turn starts and filled in
/// by a single finalize write when the turn ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: Role,
    pub content: String,
    pub sql_query: Option<String>,
    /// JSON array of row objects.
    pub query_result: Option<String>,
    /// JSON chart specification.
    pub chart_config: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Partial update applied to an existing message. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub sql_query: Option<String>,
    pub query_result: Option<String>,
    pub chart_config: Option<String>,
}

impl MessagePatch {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.sql_query.is_none()
            && self.query_result.is_none()
            && self.chart_config.is_none()
    }
}

// =============================================================================
// Query results
// =============================================================================

/// One result row: column name to JSON value, in result-set column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Bounded result of a sandboxed query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// True when the statement produced more rows than the cap.
    pub truncated: bool,
}

impl QueryRows {
    /// Serialize the rows as a JSON array of objects (the wire and storage format).
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.rows).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// =============================================================================
// Charts
// =============================================================================

/// Closed set of chart kinds the front-end knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Scatter,
    #[default]
    Table,
}

impl ChartType {
    /// Parse a chart kind, coercing anything unrecognized to `Table`.
    pub fn coerce(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bar" => ChartType::Bar,
            "line" => ChartType::Line,
            "pie" => ChartType::Pie,
            "scatter" => ChartType::Scatter,
            _ => ChartType::Table,
        }
    }
}

/// Chart specification streamed to the client and persisted with the turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    pub chart_type: ChartType,
    pub title: String,
    pub option: serde_json::Value,
}

impl ChartSpec {
    /// Build a chart spec from an untyped collaborator payload.
    ///
    /// Accepts both `chart_type` and `chartType` keys. Missing title
    /// defaults to empty, missing option to `{}`. Returns `None` when the
    /// payload is not a JSON object.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        let chart_type = obj
            .get("chart_type")
            .or_else(|| obj.get("chartType"))
            .and_then(|v| v.as_str())
            .map(ChartType::coerce)
            .unwrap_or_default();
        let title = obj
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let option = obj
            .get("option")
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        Some(Self {
            chart_type,
            title,
            option,
        })
    }
}
