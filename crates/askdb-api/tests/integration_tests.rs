//! Integration tests for the askdb API.
//!
//! Each test builds its own router over an in-memory application database,
//! a freshly seeded sample warehouse and scripted model collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tower::ServiceExt;

use askdb_api::create_router;
use askdb_api::handlers::{HealthResponse, SessionDetailResponse};
use askdb_api::state::AppState;
use askdb_chat::{AnswerStream, AnswerStreamer, ChartGenerator, ChatError, Collaborators, SqlGenerator};
use askdb_core::config::AskConfig;
use askdb_core::types::{ChartSpec, ChartType, Conversation, Role};
use askdb_sandbox::seed_sample_database;
use askdb_storage::Database;

// =============================================================================
// Helpers
// =============================================================================

/// Scripted model: fixed SQL, a fixed answer split into fragments, a bar chart.
struct ScriptedModel {
    sql: String,
}

#[async_trait]
impl SqlGenerator for ScriptedModel {
    async fn generate_sql(
        &self,
        _schema: &str,
        _transcript: &str,
        _question: &str,
    ) -> Result<String, ChatError> {
        Ok(format!("SQLQuery: {}", self.sql))
    }
}

#[async_trait]
impl AnswerStreamer for ScriptedModel {
    async fn stream_answer(
        &self,
        _question: &str,
        _sql: &str,
        _result_json: &str,
    ) -> Result<AnswerStream, ChatError> {
        let fragments = vec!["Seven re", "gions in total.\nEast", " has the most."];
        Ok(stream::iter(fragments.into_iter().map(|f| Ok(f.to_string()))).boxed())
    }
}

#[async_trait]
impl ChartGenerator for ScriptedModel {
    async fn generate_chart(
        &self,
        _sql: &str,
        _result_json: &str,
    ) -> Result<Option<ChartSpec>, ChatError> {
        Ok(Some(ChartSpec {
            chart_type: ChartType::Bar,
            title: "Customers by region".to_string(),
            option: serde_json::json!({"series": [{"type": "bar"}]}),
        }))
    }
}

struct TestApp {
    router: axum::Router,
    _dir: tempfile::TempDir,
}

fn make_app(sql: &str) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let warehouse = dir.path().join("sample.db");
    seed_sample_database(&warehouse).unwrap();

    let model = Arc::new(ScriptedModel {
        sql: sql.to_string(),
    });
    let state = AppState::new(
        AskConfig::default(),
        Database::in_memory().unwrap(),
        warehouse,
        Collaborators::shared(model),
    );

    TestApp {
        router: create_router(state),
        _dir: dir,
    }
}

const REGION_SQL: &str = "SELECT region, COUNT(*) AS customers FROM customers GROUP BY region";

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), 10 * 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(resp: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

async fn create_session(app: &TestApp) -> Conversation {
    let resp = app
        .router
        .clone()
        .oneshot(post_json("/api/sessions", "{}"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

/// Parse an SSE body into `(event, data)` pairs.
fn parse_sse(body: &str) -> Vec<(String, String)> {
    let mut events = Vec::new();
    for block in body.split("\n\n") {
        let mut name = None;
        let mut data: Vec<&str> = Vec::new();
        for line in block.lines() {
            if let Some(rest) = line.strip_prefix("event:") {
                name = Some(rest.trim_start().to_string());
            } else if let Some(rest) = line.strip_prefix("data:") {
                data.push(rest.strip_prefix(' ').unwrap_or(rest));
            }
        }
        if let Some(name) = name {
            events.push((name, data.join("\n")));
        }
    }
    events
}

async fn run_chat(app: &TestApp, session_id: &str, message: &str) -> Vec<(String, String)> {
    let body = serde_json::json!({ "message": message }).to_string();
    let resp = app
        .router
        .clone()
        .oneshot(post_json(&format!("/api/chat/{}", session_id), &body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    let text = String::from_utf8(body_bytes(resp).await).unwrap();
    parse_sse(&text)
}

async fn session_detail(app: &TestApp, id: &str) -> SessionDetailResponse {
    let resp = app
        .router
        .clone()
        .oneshot(get(&format!("/api/sessions/{}", id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

// =============================================================================
// Health and sessions
// =============================================================================

#[tokio::test]
async fn test_health() {
    let app = make_app(REGION_SQL);
    let resp = app.router.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let health: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.app, "askdb");
}

#[tokio::test]
async fn test_create_session_defaults_title() {
    let app = make_app(REGION_SQL);
    let session = create_session(&app).await;
    assert_eq!(session.title, "New conversation");

    let resp = app
        .router
        .clone()
        .oneshot(Request::post("/api/sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_create_session_with_title() {
    let app = make_app(REGION_SQL);
    let resp = app
        .router
        .clone()
        .oneshot(post_json("/api/sessions", r#"{"title": "Quarterly review"}"#))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["title"], "Quarterly review");
}

#[tokio::test]
async fn test_create_session_rejects_bad_json() {
    let app = make_app(REGION_SQL);
    let resp = app
        .router
        .clone()
        .oneshot(post_json("/api/sessions", "{not json"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "bad_request");
}

#[tokio::test]
async fn test_list_sessions() {
    let app = make_app(REGION_SQL);
    let first = create_session(&app).await;
    let second = create_session(&app).await;

    let resp = app.router.clone().oneshot(get("/api/sessions")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let sessions: Vec<Conversation> = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].id, second.id);
    assert_eq!(sessions[1].id, first.id);
}

#[tokio::test]
async fn test_get_session_not_found() {
    let app = make_app(REGION_SQL);
    let resp = app
        .router
        .clone()
        .oneshot(get(&format!("/api/sessions/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"], "not_found");
}

#[tokio::test]
async fn test_get_session_invalid_id() {
    let app = make_app(REGION_SQL);
    let resp = app
        .router
        .clone()
        .oneshot(get("/api/sessions/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_session() {
    let app = make_app(REGION_SQL);
    let session = create_session(&app).await;
    let uri = format!("/api/sessions/{}", session.id);

    let resp = app
        .router
        .clone()
        .oneshot(Request::delete(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .router
        .clone()
        .oneshot(Request::delete(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Database introspection
// =============================================================================

#[tokio::test]
async fn test_database_tables() {
    let app = make_app(REGION_SQL);
    let resp = app
        .router
        .clone()
        .oneshot(get("/api/database/tables"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["dialect"], "sqlite");
    let tables = body["tables"].as_array().unwrap();
    assert_eq!(tables.len(), 3);
    let products = tables.iter().find(|t| t["name"] == "products").unwrap();
    assert_eq!(products["row_count"], 20);
    assert_eq!(products["sample_rows"].as_array().unwrap().len(), 3);
    assert!(body["raw_schema"]
        .as_str()
        .unwrap()
        .contains("CREATE TABLE orders"));
}

// =============================================================================
// Chat
// =============================================================================

#[tokio::test]
async fn test_chat_streams_full_turn_and_persists() {
    let app = make_app(REGION_SQL);
    let session = create_session(&app).await;
    let question = "how many customers are there in each region of the country?";

    let events = run_chat(&app, &session.id.to_string(), question).await;
    let names: Vec<&str> = events.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec!["sql", "query_result", "answer", "answer", "chart", "done"]
    );

    assert_eq!(events[0].1, format!("{};", REGION_SQL));
    let rows: Value = serde_json::from_str(&events[1].1).unwrap();
    let rows = rows.as_array().unwrap();
    assert!(!rows.is_empty());
    assert!(rows[0].get("region").is_some());
    assert_eq!(events[2].1, "Seven regions in total.\n");
    assert_eq!(events[3].1, "East has the most.");
    let chart: Value = serde_json::from_str(&events[4].1).unwrap();
    assert_eq!(chart["chartType"], "bar");
    assert_eq!(events[5].1, "");

    let detail = session_detail(&app, &session.id.to_string()).await;
    assert_eq!(detail.session.title, "how many customers are there i...");
    assert_eq!(detail.messages.len(), 2);
    assert_eq!(detail.messages[0].role, Role::User);
    assert_eq!(detail.messages[0].content, question);

    let assistant = &detail.messages[1];
    assert_eq!(assistant.role, Role::Assistant);
    assert_eq!(assistant.content, "Seven regions in total.\nEast has the most.");
    assert_eq!(assistant.sql_query.as_deref(), Some(format!("{};", REGION_SQL).as_str()));
    assert!(assistant.query_result.is_some());
    assert_eq!(assistant.chart_config.as_ref().unwrap()["chartType"], "bar");
}

#[tokio::test]
async fn test_chat_denied_sql() {
    let app = make_app("DROP TABLE orders;");
    let session = create_session(&app).await;

    let events = run_chat(&app, &session.id.to_string(), "remove the orders").await;
    let names: Vec<&str> = events.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["sql", "error", "done"]);
    assert!(events[1].1.contains("only SELECT queries are allowed"));

    let detail = session_detail(&app, &session.id.to_string()).await;
    let assistant = &detail.messages[1];
    assert_eq!(assistant.sql_query.as_deref(), Some("DROP TABLE orders;"));
    assert!(assistant.query_result.is_none());
    assert_eq!(assistant.content, "");

    // The warehouse is untouched.
    let resp = app
        .router
        .clone()
        .oneshot(get("/api/database/tables"))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["tables"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_chat_keeps_custom_title() {
    let app = make_app(REGION_SQL);
    let resp = app
        .router
        .clone()
        .oneshot(post_json("/api/sessions", r#"{"title": "Mine"}"#))
        .await
        .unwrap();
    let session: Conversation = serde_json::from_slice(&body_bytes(resp).await).unwrap();

    run_chat(&app, &session.id.to_string(), "regions?").await;
    let detail = session_detail(&app, &session.id.to_string()).await;
    assert_eq!(detail.session.title, "Mine");
}

#[tokio::test]
async fn test_chat_second_turn_appends_pair() {
    let app = make_app(REGION_SQL);
    let session = create_session(&app).await;
    let id = session.id.to_string();

    run_chat(&app, &id, "first question").await;
    run_chat(&app, &id, "second question").await;

    let detail = session_detail(&app, &id).await;
    let roles: Vec<Role> = detail.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
    assert_eq!(detail.session.title, "first question");
}

#[tokio::test]
async fn test_chat_unknown_session() {
    let app = make_app(REGION_SQL);
    let resp = app
        .router
        .clone()
        .oneshot(post_json(
            &format!("/api/chat/{}", uuid::Uuid::new_v4()),
            r#"{"message": "hello"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chat_rejects_empty_and_oversized_messages() {
    let app = make_app(REGION_SQL);
    let session = create_session(&app).await;
    let uri = format!("/api/chat/{}", session.id);

    let resp = app
        .router
        .clone()
        .oneshot(post_json(&uri, r#"{"message": ""}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let long = serde_json::json!({ "message": "a".repeat(2001) }).to_string();
    let resp = app.router.clone().oneshot(post_json(&uri, &long)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Nothing was stored for rejected messages.
    let detail = session_detail(&app, &session.id.to_string()).await;
    assert!(detail.messages.is_empty());
}
