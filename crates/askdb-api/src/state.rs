//! Application state shared across all route handlers.
//!
//! AppState holds the configuration, repositories, the schema inspector and
//! the turn orchestrator. It is passed to handlers via axum's State extractor.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use askdb_chat::{Collaborators, MemoryStore, TurnOrchestrator};
use askdb_core::config::AskConfig;
use askdb_sandbox::{SchemaInspector, SqlSandbox};
use askdb_storage::{ConversationRepository, Database, MessageRepository};

/// Shared application state.
///
/// All fields are cheap to clone; shared resources sit behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (read-only at runtime).
    pub config: Arc<AskConfig>,
    /// Conversation repository over the application database.
    pub conversations: ConversationRepository,
    /// Message repository; also the turn store used by finalize.
    pub messages: MessageRepository,
    /// Introspection of the analytical database.
    pub schema: SchemaInspector,
    /// Turn pipeline.
    pub orchestrator: TurnOrchestrator,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Wire the application from its parts.
    ///
    /// `warehouse` is the resolved path of the analytical database.
    pub fn new(
        config: AskConfig,
        database: Database,
        warehouse: PathBuf,
        collaborators: Collaborators,
    ) -> Self {
        let database = Arc::new(database);
        let conversations = ConversationRepository::new(Arc::clone(&database));
        let messages = MessageRepository::new(database);

        let timeout = Duration::from_secs(config.sandbox.timeout_secs);
        let sandbox = SqlSandbox::from_config(warehouse.clone(), &config.sandbox);
        let schema = SchemaInspector::new(warehouse, config.sandbox.sample_rows, timeout);
        let memory = Arc::new(MemoryStore::from_config(&config.memory));

        let orchestrator = TurnOrchestrator::new(
            Arc::new(schema.clone()),
            Arc::new(sandbox),
            collaborators,
            Arc::new(messages.clone()),
            memory,
        )
        .with_event_buffer(config.chat.event_buffer);

        Self {
            config: Arc::new(config),
            conversations,
            messages,
            schema,
            orchestrator,
            start_time: Instant::now(),
        }
    }
}
