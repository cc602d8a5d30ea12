//! Schema introspection of the analytical database.
//!
//! Produces the DDL-plus-samples text injected into the SQL generation
//! prompt, and the structured table listing served to the front-end.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use askdb_core::types::{QueryRows, Row};

use crate::error::ExecutionError;
use crate::executor::{open_read_only, read_rows};

/// Supplies the schema description used when generating SQL.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn schema_text(&self) -> Result<String, ExecutionError>;
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// Structured description of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub row_count: i64,
    pub sample_rows: Vec<Row>,
}

/// Reads table definitions and sample rows from the analytical database.
#[derive(Debug, Clone)]
pub struct SchemaInspector {
    path: PathBuf,
    sample_rows: usize,
    timeout: Duration,
}

impl SchemaInspector {
    pub fn new(path: impl Into<PathBuf>, sample_rows: usize, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            sample_rows,
            timeout,
        }
    }

    fn connect(&self) -> Result<Connection, ExecutionError> {
        open_read_only(&self.path, self.timeout)
    }

    /// User tables, ordered by name.
    pub fn table_names_blocking(&self) -> Result<Vec<String>, ExecutionError> {
        let conn = self.connect()?;
        list_tables(&conn)
    }

    /// `CREATE TABLE` statements, each followed by a comment block with sample rows.
    pub fn schema_text_blocking(&self) -> Result<String, ExecutionError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT name, sql FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )
            .map_err(sql_err)?;
        let tables: Vec<(String, String)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get::<_, Option<String>>(1)?.unwrap_or_default()))
            })
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;

        let mut sections = Vec::with_capacity(tables.len());
        for (name, ddl) in tables {
            let mut section = ddl.trim().to_string();
            if self.sample_rows > 0 {
                let sample = sample_rows(&conn, &name, self.sample_rows)?;
                section.push_str("\n\n/*\n");
                section.push_str(&format!(
                    "{} rows from {} table:\n",
                    self.sample_rows, name
                ));
                section.push_str(&sample.columns.join("\t"));
                for row in &sample.rows {
                    section.push('\n');
                    let cells: Vec<String> = row.values().map(render_cell).collect();
                    section.push_str(&cells.join("\t"));
                }
                section.push_str("\n*/");
            }
            sections.push(section);
        }

        debug!(tables = sections.len(), "Schema text rebuilt");
        Ok(sections.join("\n\n"))
    }

    /// Columns, row count and a few sample rows for every user table.
    pub fn table_details_blocking(&self) -> Result<Vec<TableInfo>, ExecutionError> {
        let conn = self.connect()?;
        let mut details = Vec::new();

        for name in list_tables(&conn)? {
            let mut stmt = conn
                .prepare(&format!("PRAGMA table_info({})", quote_ident(&name)))
                .map_err(sql_err)?;
            let columns = stmt
                .query_map([], |row| {
                    Ok(ColumnInfo {
                        name: row.get(1)?,
                        data_type: row.get(2)?,
                    })
                })
                .map_err(sql_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(sql_err)?;

            let row_count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(&name)), [], |r| {
                    r.get(0)
                })
                .map_err(sql_err)?;

            let sample = sample_rows(&conn, &name, self.sample_rows)?;

            details.push(TableInfo {
                name,
                columns,
                row_count,
                sample_rows: sample.rows,
            });
        }

        Ok(details)
    }

    pub async fn table_details(&self) -> Result<Vec<TableInfo>, ExecutionError> {
        let inspector = self.clone();
        tokio::task::spawn_blocking(move || inspector.table_details_blocking())
            .await
            .map_err(|e| ExecutionError::Join(e.to_string()))?
    }
}

#[async_trait]
impl SchemaProvider for SchemaInspector {
    async fn schema_text(&self) -> Result<String, ExecutionError> {
        let inspector = self.clone();
        tokio::task::spawn_blocking(move || inspector.schema_text_blocking())
            .await
            .map_err(|e| ExecutionError::Join(e.to_string()))?
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn list_tables(conn: &Connection) -> Result<Vec<String>, ExecutionError> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .map_err(sql_err)?;
    let names = stmt
        .query_map([], |row| row.get(0))
        .map_err(sql_err)?
        .collect::<Result<Vec<String>, _>>()
        .map_err(sql_err)?;
    Ok(names)
}

fn sample_rows(
    conn: &Connection,
    table: &str,
    limit: usize,
) -> Result<QueryRows, ExecutionError> {
    let sql = format!("SELECT * FROM {} LIMIT {}", quote_ident(table), limit);
    read_rows(conn, &sql, limit).map_err(sql_err)
}

fn render_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "None".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_err(e: rusqlite::Error) -> ExecutionError {
    ExecutionError::Sql(e.to_string())
}
