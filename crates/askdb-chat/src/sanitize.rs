//! Cleanup of raw model output into a single SQL statement.

const LABEL_MARKER: &str = "SQLQuery:";
const FENCE: &str = "```";

/// Normalize generated SQL.
///
/// Keeps only the text after the last `SQLQuery:` label, removes markdown
/// fence lines when the text is fenced, and ends the statement with exactly
/// one `;`.
pub fn sanitize_sql(raw: &str) -> String {
    let mut sql = raw.trim();

    if let Some(idx) = sql.rfind(LABEL_MARKER) {
        sql = sql[idx + LABEL_MARKER.len()..].trim();
    }

    let unfenced;
    if sql.starts_with(FENCE) {
        unfenced = sql
            .lines()
            .filter(|line| !line.trim().starts_with(FENCE))
            .collect::<Vec<_>>()
            .join("\n");
        sql = unfenced.trim();
    }

    let body = sql.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    format!("{};", body.trim_start())
}
