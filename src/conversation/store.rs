//! Append-only per-session conversation log.
//!
//! On-disk format: physically newline-delimited JSON, one event object per
//! line, file name `conversation_<session_id>.json`. The session's logical
//! event stream is what [`ConversationStore::list_events`] reconstructs by
//! reading every line back; NDJSON is chosen because it supports persisting
//! each event immediately without rewriting the whole file per append.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use super::event::{AssistantMessage, Event, ToolUse, UserMessage};
use crate::clock::Clock;
use crate::embedable::Embedable;
use crate::embedding::EmbeddingIndex;
use crate::error::ConversationError;
use crate::metadata::{EntryKind, Metadata};

/// Aggregate counters across every session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversationStats {
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub tool_uses: usize,
    pub total_tokens: u64,
}

/// Per-session append-only event log with incremental persistence.
pub struct ConversationStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    /// In-memory cache, keyed by session id, populated lazily from disk.
    cache: HashMap<String, Vec<Event>>,
}

impl ConversationStore {
    /// `root` is the `.state/conversations` directory; created on demand.
    pub fn new(root: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self {
            root,
            clock,
            cache: HashMap::new(),
        }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("conversation_{session_id}.json"))
    }

    fn session_events(&mut self, session_id: &str) -> Result<&mut Vec<Event>, ConversationError> {
        if !self.cache.contains_key(session_id) {
            let events = load_session(&self.path_for(session_id))?;
            self.cache.insert(session_id.to_string(), events);
        }
        Ok(self.cache.get_mut(session_id).expect("just inserted"))
    }

    fn append_and_cache(&mut self, event: Event) -> Result<(), ConversationError> {
        std::fs::create_dir_all(&self.root)?;
        append_line(&self.path_for(event.session_id()), &event)?;
        self.cache
            .entry(event.session_id().to_string())
            .or_default()
            .push(event);
        Ok(())
    }

    fn index_event(&self, index: &mut EmbeddingIndex, event: &Event) {
        let metadata = Metadata {
            kind: match event {
                Event::User(_) => EntryKind::UserMessage,
                Event::Assistant(_) => EntryKind::AssistantMessage,
                Event::Tool(_) => EntryKind::ToolUse,
            },
            text: event.embed_text(),
            session_id: Some(event.session_id().to_string()),
            topics: event.topics().to_vec(),
            confidence: None,
            created_at: event.created_at(),
            extra: Default::default(),
        };
        if let Err(e) = index.add(&event.index_id(), &event.embed_text(), metadata) {
            // The log write already succeeded; an index failure is logged
            // and self-healed on the next `load()`.
            tracing::warn!(
                "failed to index event {}: {e}; will rebuild on next load",
                event.index_id()
            );
        }
    }

    /// Record a user turn.
    pub fn add_user_message(
        &mut self,
        index: &mut EmbeddingIndex,
        content: &str,
        turn: u32,
        session_id: &str,
        topics: Vec<String>,
    ) -> Result<UserMessage, ConversationError> {
        validate_common(content, session_id, turn)?;
        let msg = UserMessage {
            event_id: format!("user-{}", uuid::Uuid::new_v4()),
            session_id: session_id.to_string(),
            turn,
            content: content.to_string(),
            topics,
            created_at: self.clock.now(),
        };
        let event = Event::User(msg.clone());
        self.append_and_cache(event.clone())?;
        self.index_event(index, &event);
        Ok(msg)
    }

    /// Record an assistant turn.
    #[allow(clippy::too_many_arguments)]
    pub fn add_assistant_message(
        &mut self,
        index: &mut EmbeddingIndex,
        content: &str,
        turn: u32,
        session_id: &str,
        tokens_in: Option<u64>,
        tokens_out: Option<u64>,
        model: Option<String>,
    ) -> Result<AssistantMessage, ConversationError> {
        validate_common(content, session_id, turn)?;
        let msg = AssistantMessage {
            event_id: format!("assistant-{}", uuid::Uuid::new_v4()),
            session_id: session_id.to_string(),
            turn,
            content: content.to_string(),
            tokens_in,
            tokens_out,
            model,
            topics: vec![],
            created_at: self.clock.now(),
        };
        let event = Event::Assistant(msg.clone());
        self.append_and_cache(event.clone())?;
        self.index_event(index, &event);
        Ok(msg)
    }

    /// Record a tool invocation.
    #[allow(clippy::too_many_arguments)]
    pub fn add_tool_use(
        &mut self,
        index: &mut EmbeddingIndex,
        tool_name: &str,
        tool_input: Value,
        tool_response: Option<String>,
        turn: u32,
        session_id: &str,
        latency_ms: Option<u64>,
        success: bool,
    ) -> Result<ToolUse, ConversationError> {
        if tool_name.is_empty() {
            return Err(ConversationError::Validation(
                "tool_name must not be empty".into(),
            ));
        }
        if session_id.is_empty() {
            return Err(ConversationError::Validation(
                "session_id must not be empty".into(),
            ));
        }
        if turn < 1 {
            return Err(ConversationError::Validation("turn must be >= 1".into()));
        }
        let tool_use = ToolUse {
            event_id: format!("tool-{}", uuid::Uuid::new_v4()),
            session_id: session_id.to_string(),
            turn,
            tool_name: tool_name.to_string(),
            tool_input,
            tool_response,
            latency_ms,
            success,
            topics: vec![],
            created_at: self.clock.now(),
        };
        let event = Event::Tool(tool_use.clone());
        self.append_and_cache(event.clone())?;
        self.index_event(index, &event);
        Ok(tool_use)
    }

    /// All events, optionally filtered by session and/or kind, ordered by
    /// insertion.
    pub fn list_events(
        &mut self,
        session_id: Option<&str>,
        kind: Option<EntryKind>,
    ) -> Result<Vec<Event>, ConversationError> {
        let sessions: Vec<String> = match session_id {
            Some(id) => vec![id.to_string()],
            None => self.known_sessions()?,
        };
        let mut out = Vec::new();
        for id in sessions {
            for event in self.session_events(&id)?.iter() {
                let matches_kind = kind.is_none_or(|k| event.type_tag() == k.as_str());
                if matches_kind {
                    out.push(event.clone());
                }
            }
        }
        Ok(out)
    }

    fn known_sessions(&self) -> Result<Vec<String>, ConversationError> {
        if !self.root.exists() {
            return Ok(vec![]);
        }
        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(rest) = name
                .strip_prefix("conversation_")
                .and_then(|s| s.strip_suffix(".json"))
            {
                sessions.push(rest.to_string());
            }
        }
        Ok(sessions)
    }

    /// Aggregate counters across every session.
    pub fn stats(&mut self) -> Result<ConversationStats, ConversationError> {
        let mut stats = ConversationStats::default();
        for event in self.list_events(None, None)? {
            match event {
                Event::User(_) => stats.user_messages += 1,
                Event::Assistant(a) => {
                    stats.assistant_messages += 1;
                    stats.total_tokens += a.tokens_in.unwrap_or(0) + a.tokens_out.unwrap_or(0);
                }
                Event::Tool(_) => stats.tool_uses += 1,
            }
        }
        Ok(stats)
    }

    /// Self-heal the shared index: re-embed every on-disk event not
    /// already present. Silent and non-fatal, since the log itself is
    /// always the source of truth. Returns the number of events
    /// re-indexed.
    pub fn rebuild_index(&mut self, index: &mut EmbeddingIndex) -> Result<usize, ConversationError> {
        let mut rebuilt = 0;
        for event in self.list_events(None, None)? {
            if !index.contains(&event.index_id()) {
                tracing::info!("rebuilding index entry for {}", event.index_id());
                self.index_event(index, &event);
                rebuilt += 1;
            }
        }
        Ok(rebuilt)
    }
}

fn validate_common(content: &str, session_id: &str, turn: u32) -> Result<(), ConversationError> {
    if content.is_empty() {
        return Err(ConversationError::Validation(
            "content must not be empty".into(),
        ));
    }
    if session_id.is_empty() {
        return Err(ConversationError::Validation(
            "session_id must not be empty".into(),
        ));
    }
    if turn < 1 {
        return Err(ConversationError::Validation("turn must be >= 1".into()));
    }
    Ok(())
}

fn append_line(path: &Path, event: &Event) -> Result<(), ConversationError> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.sync_data()?;
    Ok(())
}

/// Load every event from an NDJSON session log. Tolerates a truncated
/// final line (the one write that may have been in flight at crash time).
fn load_session(path: &Path) -> Result<Vec<Event>, ConversationError> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let raw = std::fs::read_to_string(path)?;
    let mut events = Vec::new();
    let lines: Vec<&str> = raw.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(line) {
            Ok(event) => events.push(event),
            Err(e) => {
                if i == lines.len() - 1 {
                    tracing::warn!("truncated trailing event in {:?}, dropping: {e}", path);
                } else {
                    return Err(ConversationError::Serde(e));
                }
            }
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn store() -> (tempfile::TempDir, ConversationStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path().join("conversations"), Arc::new(SystemClock));
        (dir, store)
    }

    fn index() -> EmbeddingIndex {
        EmbeddingIndex::new(4)
    }

    #[test]
    fn empty_content_is_rejected_without_writing() {
        let (_dir, mut store) = store();
        let mut idx = index();
        let result = store.add_user_message(&mut idx, "", 1, "s1", vec![]);
        assert!(matches!(result, Err(ConversationError::Validation(_))));
        assert_eq!(store.list_events(Some("s1"), None).unwrap().len(), 0);
    }

    #[test]
    fn turn_below_one_is_rejected() {
        let (_dir, mut store) = store();
        let mut idx = index();
        let result = store.add_user_message(&mut idx, "hi", 0, "s1", vec![]);
        assert!(matches!(result, Err(ConversationError::Validation(_))));
    }

    #[test]
    fn events_persist_and_list_in_insertion_order() {
        let (_dir, mut store) = store();
        let mut idx = index();
        store
            .add_user_message(&mut idx, "hello", 1, "s1", vec![])
            .unwrap();
        store
            .add_assistant_message(&mut idx, "hi there", 1, "s1", Some(5), Some(10), None)
            .unwrap();
        store
            .add_tool_use(
                &mut idx,
                "Edit",
                serde_json::json!({"path": "a.py"}),
                None,
                2,
                "s1",
                Some(120),
                true,
            )
            .unwrap();

        let events = store.list_events(Some("s1"), None).unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], Event::User(_)));
        assert!(matches!(events[1], Event::Assistant(_)));
        assert!(matches!(events[2], Event::Tool(_)));
    }

    #[test]
    fn reopening_store_rereads_persisted_events() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("conversations");
        let mut idx = index();
        {
            let mut store = ConversationStore::new(root.clone(), Arc::new(SystemClock));
            store
                .add_user_message(&mut idx, "hello", 1, "s1", vec![])
                .unwrap();
        }
        let mut reopened = ConversationStore::new(root, Arc::new(SystemClock));
        let events = reopened.list_events(Some("s1"), None).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn stats_counts_by_kind_and_sums_tokens() {
        let (_dir, mut store) = store();
        let mut idx = index();
        store
            .add_user_message(&mut idx, "hello", 1, "s1", vec![])
            .unwrap();
        store
            .add_assistant_message(&mut idx, "hi", 1, "s1", Some(3), Some(7), None)
            .unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.user_messages, 1);
        assert_eq!(stats.assistant_messages, 1);
        assert_eq!(stats.total_tokens, 10);
    }

    #[test]
    fn filters_by_kind() {
        let (_dir, mut store) = store();
        let mut idx = index();
        store
            .add_user_message(&mut idx, "hello", 1, "s1", vec![])
            .unwrap();
        store
            .add_assistant_message(&mut idx, "hi", 1, "s1", None, None, None)
            .unwrap();
        let only_user = store
            .list_events(Some("s1"), Some(EntryKind::UserMessage))
            .unwrap();
        assert_eq!(only_user.len(), 1);
        assert!(matches!(only_user[0], Event::User(_)));
    }
}
