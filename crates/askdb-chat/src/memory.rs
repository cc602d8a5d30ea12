//! Per-conversation memory window.
//!
//! Keeps the most recent question/SQL/answer triples of each conversation in
//! process so the SQL generator can resolve follow-up questions. The window
//! is a cache: it can always be rebuilt from the persisted message halves.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use uuid::Uuid;

use askdb_core::config::MemoryConfig;
use askdb_core::types::{Message, Role};

/// Transcript used when a conversation has no remembered turns.
pub const EMPTY_TRANSCRIPT: &str = "(no previous conversation)";

/// One remembered turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    pub question: String,
    /// Generated SQL, empty when the turn produced none.
    pub sql: String,
    pub answer: String,
}

/// Bounded, keyed store of recent turns.
#[derive(Debug)]
pub struct MemoryStore {
    window: usize,
    answer_preview_chars: usize,
    entries: Mutex<HashMap<Uuid, VecDeque<MemoryEntry>>>,
}

impl MemoryStore {
    pub fn new(window: usize, answer_preview_chars: usize) -> Self {
        Self {
            window,
            answer_preview_chars,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(config.window, config.answer_preview_chars)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, VecDeque<MemoryEntry>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether the conversation has been loaded (or recorded into) since startup.
    pub fn is_resident(&self, conversation_id: Uuid) -> bool {
        self.lock().contains_key(&conversation_id)
    }

    /// The most recent `window` entries, oldest first.
    pub fn observe(&self, conversation_id: Uuid) -> Vec<MemoryEntry> {
        let entries = self.lock();
        match entries.get(&conversation_id) {
            Some(window) => {
                let skip = window.len().saturating_sub(self.window);
                window.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Append a completed turn.
    ///
    /// Growth is capped at twice the window; past that, only the last
    /// `window` entries are kept.
    pub fn record(&self, conversation_id: Uuid, question: &str, sql: &str, answer: &str) {
        let mut entries = self.lock();
        let window = entries.entry(conversation_id).or_default();
        window.push_back(MemoryEntry {
            question: question.to_string(),
            sql: sql.to_string(),
            answer: answer.to_string(),
        });
        if window.len() > self.window * 2 {
            let excess = window.len() - self.window;
            window.drain(..excess);
        }
    }

    /// Rebuild the window from persisted halves in chronological order.
    ///
    /// A user half becomes the pending question; the next assistant half
    /// closes the pair. Assistant halves with no pending question are
    /// skipped, as is a trailing unanswered user half.
    pub fn rehydrate(&self, conversation_id: Uuid, messages: &[Message]) {
        let mut pairs: VecDeque<MemoryEntry> = VecDeque::new();
        let mut pending: Option<&str> = None;

        for message in messages {
            match message.role {
                Role::User => pending = Some(message.content.as_str()),
                Role::Assistant => {
                    if let Some(question) = pending.take() {
                        pairs.push_back(MemoryEntry {
                            question: question.to_string(),
                            sql: message.sql_query.clone().unwrap_or_default(),
                            answer: message.content.clone(),
                        });
                    }
                }
            }
        }

        let excess = pairs.len().saturating_sub(self.window);
        pairs.drain(..excess);

        tracing::debug!(
            conversation_id = %conversation_id,
            entries = pairs.len(),
            "Memory window rehydrated"
        );
        self.lock().insert(conversation_id, pairs);
    }

    /// Drop a conversation's window.
    pub fn forget(&self, conversation_id: Uuid) {
        self.lock().remove(&conversation_id);
    }

    /// Render the window as the compact transcript fed to the SQL generator.
    pub fn render_transcript(&self, conversation_id: Uuid) -> String {
        let entries = self.observe(conversation_id);
        if entries.is_empty() {
            return EMPTY_TRANSCRIPT.to_string();
        }

        let mut lines = Vec::with_capacity(entries.len() * 3);
        for entry in &entries {
            lines.push(format!("User: {}", entry.question));
            if !entry.sql.is_empty() {
                lines.push(format!("SQL: {}", entry.sql));
            }
            let preview: String = entry.answer.chars().take(self.answer_preview_chars).collect();
            lines.push(format!("Answer: {}", preview));
        }
        lines.join("\n")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::from_config(&MemoryConfig::default())
    }
}
