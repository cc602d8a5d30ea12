//! Turn orchestrator: drives one question through generation, the safety
//! gate, sandboxed execution, explanation and charting.
//!
//! Each turn runs as its own task and publishes [`TurnEvent`]s into a
//! bounded channel in strict stage order. Whatever happens along the way,
//! the turn ends with exactly one memory record, exactly one finalize write
//! and then exactly one `Completed` event. A receiver that goes away does
//! not stop the task.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use askdb_core::events::TurnEvent;
use askdb_core::safety::{SafetyDecision, SqlSafetyGate};
use askdb_core::types::{ChartSpec, Message, MessagePatch};
use askdb_sandbox::{QueryExecutor, SchemaProvider};

use crate::chunker::LineChunker;
use crate::collaborator::Collaborators;
use crate::error::{ChatError, INTERNAL_FAILURE_MESSAGE};
use crate::memory::MemoryStore;
use crate::persistence::TurnStore;
use crate::sanitize::sanitize_sql;

/// Default capacity of a turn's event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 32;

/// Everything needed to run one turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub conversation_id: Uuid,
    /// Pre-created, empty assistant half that receives the finalize write.
    pub assistant_message_id: Uuid,
    pub question: String,
    /// Persisted halves from before this turn, oldest first. Used to rebuild
    /// the memory window when it is not resident.
    pub history: Vec<Message>,
}

/// A running turn.
pub struct TurnHandle {
    pub events: mpsc::Receiver<TurnEvent>,
    pub task: JoinHandle<()>,
}

/// Wires the turn pipeline together. Cheap to clone.
#[derive(Clone)]
pub struct TurnOrchestrator {
    schema: Arc<dyn SchemaProvider>,
    executor: Arc<dyn QueryExecutor>,
    collaborators: Collaborators,
    store: Arc<dyn TurnStore>,
    memory: Arc<MemoryStore>,
    gate: SqlSafetyGate,
    event_buffer: usize,
}

impl TurnOrchestrator {
    pub fn new(
        schema: Arc<dyn SchemaProvider>,
        executor: Arc<dyn QueryExecutor>,
        collaborators: Collaborators,
        store: Arc<dyn TurnStore>,
        memory: Arc<MemoryStore>,
    ) -> Self {
        Self {
            schema,
            executor,
            collaborators,
            store,
            memory,
            gate: SqlSafetyGate::new(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// Override the event channel capacity (minimum 1).
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    /// Spawn a turn and return its event receiver.
    pub fn start_turn(&self, request: TurnRequest) -> TurnHandle {
        let (tx, events) = mpsc::channel(self.event_buffer);
        let orchestrator = self.clone();
        let task = tokio::spawn(async move { orchestrator.run_turn(request, tx).await });
        TurnHandle { events, task }
    }

    async fn run_turn(self, request: TurnRequest, tx: mpsc::Sender<TurnEvent>) {
        let mut sink = EventSink::new(tx, request.conversation_id);
        let mut progress = TurnProgress::default();

        info!(
            conversation_id = %request.conversation_id,
            message_id = %request.assistant_message_id,
            "Turn started"
        );

        let outcome = AssertUnwindSafe(self.run_stages(&request, &mut progress, &mut sink))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                info!(conversation_id = %request.conversation_id, "Turn completed");
            }
            Ok(Err(err)) => {
                warn!(
                    conversation_id = %request.conversation_id,
                    error = %err,
                    "Turn failed"
                );
                sink.emit(TurnEvent::Failed {
                    message: err.client_message(),
                })
                .await;
            }
            Err(_) => {
                error!(conversation_id = %request.conversation_id, "Turn panicked");
                sink.emit(TurnEvent::Failed {
                    message: INTERNAL_FAILURE_MESSAGE.to_string(),
                })
                .await;
            }
        }

        // Same triple that rehydrating the persisted halves would yield.
        self.memory.record(
            request.conversation_id,
            &request.question,
            progress.sql.as_deref().unwrap_or(""),
            &progress.answer,
        );

        self.finalize(request.assistant_message_id, progress).await;
        sink.emit(TurnEvent::Completed).await;
    }

    async fn run_stages(
        &self,
        request: &TurnRequest,
        progress: &mut TurnProgress,
        sink: &mut EventSink,
    ) -> Result<(), ChatError> {
        let conversation_id = request.conversation_id;

        // Start
        if !self.memory.is_resident(conversation_id) {
            self.memory.rehydrate(conversation_id, &request.history);
        }

        // SqlGenerated
        let schema = self
            .schema
            .schema_text()
            .await
            .map_err(|e| ChatError::Generation(format!("schema unavailable: {}", e)))?;
        let transcript = self.memory.render_transcript(conversation_id);
        let raw = self
            .collaborators
            .sql
            .generate_sql(&schema, &transcript, &request.question)
            .await?;
        let sql = sanitize_sql(&raw);
        debug!(conversation_id = %conversation_id, sql = %sql, "SQL generated");
        progress.sql = Some(sql.clone());
        sink.emit(TurnEvent::SqlGenerated { sql: sql.clone() }).await;

        // Gate
        if let SafetyDecision::Deny { reason } = self.gate.classify(&sql) {
            return Err(ChatError::SafetyDenied(reason));
        }

        // QueryExecuted
        let rows = self.executor.execute(&sql).await?;
        let result_json = rows.to_json();
        debug!(
            conversation_id = %conversation_id,
            rows = rows.len(),
            truncated = rows.truncated,
            "Query executed"
        );
        progress.result = Some(result_json.clone());
        sink.emit(TurnEvent::QueryExecuted { rows }).await;

        // Answering
        let mut stream = self
            .collaborators
            .answer
            .stream_answer(&request.question, &sql, &result_json)
            .await?;
        let mut chunker = LineChunker::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            progress.answer.push_str(&fragment);
            for line in chunker.push(&fragment) {
                sink.emit(TurnEvent::AnswerChunk { text: line }).await;
            }
        }
        if let Some(rest) = chunker.finish() {
            sink.emit(TurnEvent::AnswerChunk { text: rest }).await;
        }

        // ChartAttempted
        if let Some(chart) = self.attempt_chart(&sql, &result_json, conversation_id).await {
            match serde_json::to_string(&chart) {
                Ok(encoded) => progress.chart = Some(encoded),
                Err(e) => warn!(error = %e, "Failed to encode chart for storage"),
            }
            sink.emit(TurnEvent::ChartReady { chart }).await;
        }

        Ok(())
    }

    /// Run the chart collaborator on its own task. Any failure means no chart.
    async fn attempt_chart(
        &self,
        sql: &str,
        result_json: &str,
        conversation_id: Uuid,
    ) -> Option<ChartSpec> {
        let charter = Arc::clone(&self.collaborators.chart);
        let sql = sql.to_string();
        let result_json = result_json.to_string();
        let task = tokio::spawn(async move { charter.generate_chart(&sql, &result_json).await });

        match task.await {
            Ok(Ok(Some(chart))) => Some(chart),
            Ok(Ok(None)) => {
                debug!(conversation_id = %conversation_id, "No chart suggested");
                None
            }
            Ok(Err(e)) => {
                warn!(conversation_id = %conversation_id, error = %e, "Chart generation failed");
                None
            }
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Chart task aborted");
                None
            }
        }
    }

    async fn finalize(&self, message_id: Uuid, progress: TurnProgress) {
        let patch = progress.into_patch();
        if let Err(e) = self.store.finalize(message_id, patch).await {
            error!(message_id = %message_id, error = %e, "Failed to persist turn");
        }
    }
}

// =============================================================================
// Turn state
// =============================================================================

/// What a turn has produced so far. `answer` holds every fragment
/// received, including a trailing partial line that was never emitted.
#[derive(Debug, Default)]
struct TurnProgress {
    sql: Option<String>,
    result: Option<String>,
    answer: String,
    chart: Option<String>,
}

impl TurnProgress {
    fn into_patch(self) -> MessagePatch {
        MessagePatch {
            content: (!self.answer.is_empty()).then_some(self.answer),
            sql_query: self.sql.filter(|s| !s.is_empty()),
            query_result: self.result.filter(|s| !s.is_empty()),
            chart_config: self.chart.filter(|s| !s.is_empty()),
        }
    }
}

/// Event sender that tolerates a departed receiver.
struct EventSink {
    tx: mpsc::Sender<TurnEvent>,
    conversation_id: Uuid,
    receiver_gone: bool,
}

impl EventSink {
    fn new(tx: mpsc::Sender<TurnEvent>, conversation_id: Uuid) -> Self {
        Self {
            tx,
            conversation_id,
            receiver_gone: false,
        }
    }

    async fn emit(&mut self, event: TurnEvent) {
        if self.receiver_gone {
            return;
        }
        if self.tx.send(event).await.is_err() {
            self.receiver_gone = true;
            debug!(
                conversation_id = %self.conversation_id,
                "Event receiver dropped; turn continues without a listener"
            );
        }
    }
}
