//! Model-backed collaborators consumed by the turn orchestrator.
//!
//! The orchestrator only sees these traits; [`crate::llm::OpenAiCompatClient`]
//! implements all three, and tests substitute scripted fakes.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use futures::stream::BoxStream;
use regex::Regex;
use serde_json::Value;

use askdb_core::types::ChartSpec;

use crate::error::ChatError;

/// Incremental answer text, in provider-defined fragments.
pub type AnswerStream = BoxStream<'static, Result<String, ChatError>>;

/// Produces a candidate SQL statement for a question.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate_sql(
        &self,
        schema: &str,
        transcript: &str,
        question: &str,
    ) -> Result<String, ChatError>;
}

/// Streams a natural-language explanation of a query result.
#[async_trait]
pub trait AnswerStreamer: Send + Sync {
    async fn stream_answer(
        &self,
        question: &str,
        sql: &str,
        result_json: &str,
    ) -> Result<AnswerStream, ChatError>;
}

/// Suggests a chart for a query result. `Ok(None)` means no chart.
#[async_trait]
pub trait ChartGenerator: Send + Sync {
    async fn generate_chart(&self, sql: &str, result_json: &str)
        -> Result<Option<ChartSpec>, ChatError>;
}

/// The three collaborators a turn needs.
#[derive(Clone)]
pub struct Collaborators {
    pub sql: Arc<dyn SqlGenerator>,
    pub answer: Arc<dyn AnswerStreamer>,
    pub chart: Arc<dyn ChartGenerator>,
}

impl Collaborators {
    /// Use one client for every role.
    pub fn shared<C>(client: Arc<C>) -> Self
    where
        C: SqlGenerator + AnswerStreamer + ChartGenerator + 'static,
    {
        Self {
            sql: client.clone(),
            answer: client.clone(),
            chart: client,
        }
    }
}

// =============================================================================
// Chart payload extraction
// =============================================================================

static FENCED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").unwrap());

static BRACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").unwrap());

/// Pull a JSON value out of model output that may be fenced or wrapped in prose.
pub fn extract_json(text: &str) -> Option<Value> {
    let mut cleaned = text.trim();
    if let Some(inner) = FENCED_RE.captures(cleaned).and_then(|c| c.get(1)) {
        cleaned = inner.as_str().trim();
    }

    if let Ok(value) = serde_json::from_str(cleaned) {
        return Some(value);
    }
    BRACES_RE
        .find(cleaned)
        .and_then(|m| serde_json::from_str(m.as_str()).ok())
}

/// Parse a chart suggestion, coercing unknown chart kinds to a table.
pub fn parse_chart(text: &str) -> Option<ChartSpec> {
    extract_json(text).and_then(|value| ChartSpec::from_value(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdb_core::types::ChartType;
    use serde_json::json;

    #[test]
    fn test_extract_plain_json() {
        assert_eq!(extract_json(r#"{"a": 1}"#), Some(json!({"a": 1})));
    }

    #[test]
    fn test_extract_fenced_json() {
        let text = "Here you go:\n```json\n{\"chart_type\": \"bar\"}\n```\nEnjoy";
        assert_eq!(extract_json(text), Some(json!({"chart_type": "bar"})));
    }

    #[test]
    fn test_extract_braces_from_prose() {
        let text = "The chart is {\"title\": \"Sales\"} as requested.";
        assert_eq!(extract_json(text), Some(json!({"title": "Sales"})));
    }

    #[test]
    fn test_extract_garbage() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("{not: valid"), None);
    }

    #[test]
    fn test_parse_chart_coerces_type() {
        let chart = parse_chart(r#"{"chart_type": "sunburst", "title": "Mix", "option": {}}"#)
            .unwrap();
        assert_eq!(chart.chart_type, ChartType::Table);
        assert_eq!(chart.title, "Mix");

        let chart = parse_chart(
            "```json\n{\"chart_type\": \"pie\", \"title\": \"Share\", \"option\": {\"series\": []}}\n```",
        )
        .unwrap();
        assert_eq!(chart.chart_type, ChartType::Pie);
        assert_eq!(chart.option, json!({"series": []}));
    }

    #[test]
    fn test_parse_chart_rejects_non_object() {
        assert!(parse_chart("[1, 2, 3]").is_none());
    }
}
