//! Prompt templates for the model collaborators.
//!
//! Placeholders are `{name}` and are filled in a single pass, so text
//! substituted for one placeholder is never re-scanned for another.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(schema|history|question|sql|result)\}").unwrap());

pub const SQL_GENERATION_TEMPLATE: &str = "You are a SQLite expert. Given the database schema and \
the conversation so far, write one syntactically correct SQLite query that answers the question.

## Database schema
{schema}

## Conversation history
{history}

## Rules
1. Only write SELECT queries. Never modify data or schema.
2. Only use tables and columns that appear in the schema.
3. Unless the question asks for a specific number of rows, add LIMIT 100.
4. Use the conversation history to resolve follow-up questions such as \"what about last month\".
5. Output only the SQL statement, without explanation or markdown.

## Question
{question}

SQLQuery:";

pub const ANSWER_TEMPLATE: &str = "You are a data analyst. Explain the query result to the user \
in plain language.

## Question
{question}

## SQL
{sql}

## Result (JSON rows)
{result}

## Rules
1. Answer the question directly, citing the key numbers.
2. Point out notable trends, maxima or outliers when present.
3. If the result is empty, say that no matching data was found.
4. Keep it short and use line breaks between points.";

pub const CHART_TEMPLATE: &str = "You are a data visualization expert. Decide whether the query \
result suits a chart and produce an ECharts configuration.

## SQL
```sql
{sql}
```

## Result (JSON rows)
{result}

## Rules
1. Pick the chart type that fits the data:
   - bar: comparing categories
   - line: time series or trends
   - pie: shares of a whole (at most 8 categories)
   - scatter: relation between two numeric variables
   - table: when the data does not suit a chart
2. If the result has a single row or is not chartable, use \"table\".
3. The option must be valid JSON.

## Output strict JSON (no markdown fences):
{\"chart_type\": \"bar|line|pie|scatter|table\", \"title\": \"...\", \"option\": { ... }}";

fn fill(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

pub fn sql_prompt(schema: &str, history: &str, question: &str) -> String {
    fill(
        SQL_GENERATION_TEMPLATE,
        &[("schema", schema), ("history", history), ("question", question)],
    )
}

pub fn answer_prompt(question: &str, sql: &str, result: &str) -> String {
    fill(
        ANSWER_TEMPLATE,
        &[("question", question), ("sql", sql), ("result", result)],
    )
}

pub fn chart_prompt(sql: &str, result: &str) -> String {
    fill(CHART_TEMPLATE, &[("sql", sql), ("result", result)])
}
