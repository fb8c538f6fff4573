//! The single entry point into the engine.
//!
//! One struct owning a project root and its sub-resources, holding no
//! logic beyond parameter validation and delegation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::context::{CompressedContextBuilder, ContextFilter};
use crate::conversation::{AssistantMessage, ConversationStats, ConversationStore, ToolUse, UserMessage};
use crate::embedding::{EmbeddingIndex, IndexStats, EMBEDDING_DIMENSIONS};
use crate::error::Error;
use crate::knowledge::{
    Artifact, Convention, Decision, KnowledgeStats, KnowledgeStore, KnowledgeTable, Learning,
};
use crate::lock::ProjectLock;
use crate::metadata::EntryKind;
use crate::search::{self, SearchFilter, SearchResult};

/// Point-in-time snapshot across all three stores.
#[derive(Debug, Clone, Copy)]
pub struct Stats {
    pub conversations: ConversationStats,
    pub knowledge: KnowledgeStats,
    pub embeddings: IndexStats,
}

/// Owns a project root, the four subsystems, and the exclusive lock on
/// that root. The only public surface of the engine.
pub struct Core {
    root: PathBuf,
    config: Config,
    clock: Arc<dyn Clock>,
    _lock: ProjectLock,
    index: EmbeddingIndex,
    conversations: ConversationStore,
    knowledge: KnowledgeStore,
    context_builder: CompressedContextBuilder,
}

impl Core {
    /// Open (or initialize) the engine rooted at `project_root`, using the
    /// system wall clock and default tuning.
    pub fn new(project_root: impl Into<PathBuf>) -> Result<Self, Error> {
        Self::with_clock(project_root, Arc::new(SystemClock))
    }

    /// Same as [`Core::new`] with an injectable clock (tests).
    pub fn with_clock(project_root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self, Error> {
        Self::with_config(project_root, clock, Config::default())
    }

    /// Full control over tuning and clock.
    pub fn with_config(
        project_root: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Result<Self, Error> {
        let root = project_root.into();
        let state_dir = root.join(".state");
        let lock = ProjectLock::acquire(&state_dir)?;

        let mut index = EmbeddingIndex::load(&state_dir.join("embeddings"), EMBEDDING_DIMENSIONS)?;
        let mut conversations = ConversationStore::new(state_dir.join("conversations"), clock.clone());
        let knowledge = KnowledgeStore::with_config(state_dir.join("knowledge"), clock.clone(), &config)?;

        // Any index entries missing relative to the backing files (e.g.
        // from a crash between a log write and its index update) are
        // rebuilt silently here; no error surfaces to the caller.
        let rebuilt_from_log = conversations.rebuild_index(&mut index)?;
        let rebuilt_from_knowledge = knowledge.rebuild_index(&mut index);
        if rebuilt_from_log + rebuilt_from_knowledge > 0 {
            tracing::info!(
                "rebuilt {} index entries on open ({} from conversations, {} from knowledge)",
                rebuilt_from_log + rebuilt_from_knowledge,
                rebuilt_from_log,
                rebuilt_from_knowledge,
            );
        }

        Ok(Self {
            root,
            config,
            clock,
            _lock: lock,
            index,
            conversations,
            knowledge,
            context_builder: CompressedContextBuilder::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Block until the embedding model is ready, surfacing a load failure
    /// up front instead of on the first `add_*`/`search` call.
    pub fn warm_up(&self) -> Result<(), Error> {
        Ok(self.index.warm_up()?)
    }

    // -- Conversation -----------------------------------------------------

    pub fn add_user_message(
        &mut self,
        content: &str,
        turn: u32,
        session_id: &str,
        topics: Vec<String>,
    ) -> Result<UserMessage, Error> {
        Ok(self
            .conversations
            .add_user_message(&mut self.index, content, turn, session_id, topics)?)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_assistant_message(
        &mut self,
        content: &str,
        turn: u32,
        session_id: &str,
        tokens_in: Option<u64>,
        tokens_out: Option<u64>,
        model: Option<String>,
    ) -> Result<AssistantMessage, Error> {
        Ok(self.conversations.add_assistant_message(
            &mut self.index,
            content,
            turn,
            session_id,
            tokens_in,
            tokens_out,
            model,
        )?)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_tool_use(
        &mut self,
        tool_name: &str,
        tool_input: Value,
        tool_response: Option<String>,
        turn: u32,
        session_id: &str,
        latency_ms: Option<u64>,
        success: bool,
    ) -> Result<ToolUse, Error> {
        Ok(self.conversations.add_tool_use(
            &mut self.index,
            tool_name,
            tool_input,
            tool_response,
            turn,
            session_id,
            latency_ms,
            success,
        )?)
    }

    // -- Knowledge ----------------------------------------------------------

    pub fn add_convention(
        &mut self,
        content: &str,
        topics: Vec<String>,
        source_session: Option<String>,
        confidence: f32,
    ) -> Result<Convention, Error> {
        Ok(self
            .knowledge
            .add_convention(&mut self.index, content, topics, source_session, confidence)?)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_decision(
        &mut self,
        question: &str,
        decision: &str,
        rationale: &str,
        decided_by: &str,
        session_id: &str,
        alternatives: Vec<String>,
        topics: Vec<String>,
    ) -> Result<Decision, Error> {
        Ok(self.knowledge.add_decision(
            &mut self.index,
            question,
            decision,
            rationale,
            decided_by,
            session_id,
            alternatives,
            topics,
        )?)
    }

    pub fn add_learning(
        &mut self,
        pattern: &str,
        confidence: f32,
        learned_from: Vec<String>,
        category: Option<String>,
    ) -> Result<Learning, Error> {
        Ok(self
            .knowledge
            .add_learning(&mut self.index, pattern, confidence, learned_from, category)?)
    }

    pub fn add_artifact(
        &mut self,
        kind: &str,
        path: &str,
        description: &str,
        created_in_session: &str,
        topics: Vec<String>,
    ) -> Result<Artifact, Error> {
        Ok(self.knowledge.add_artifact(
            &mut self.index,
            kind,
            path,
            description,
            created_in_session,
            topics,
        )?)
    }

    pub fn decay_confidence(&mut self, max_age_days: i64) -> Result<usize, Error> {
        Ok(self.knowledge.decay_confidence(&mut self.index, max_age_days)?)
    }

    pub fn deduplicate(&mut self) -> Result<usize, Error> {
        Ok(self.knowledge.deduplicate(&mut self.index)?)
    }

    /// Maintenance escape hatch: entries are never deleted automatically,
    /// only on explicit request to clear a table. Not part of the
    /// steady-state `search`/`add_*` surface.
    pub fn clear_knowledge_table(&mut self, table: KnowledgeTable) -> Result<usize, Error> {
        Ok(self.knowledge.clear(&mut self.index, table)?)
    }

    // -- Search & context -----------------------------------------------------

    pub fn search(
        &self,
        query: &str,
        types: Option<&[EntryKind]>,
        session_id: Option<&str>,
        min_confidence: Option<f32>,
        limit: Option<usize>,
    ) -> Result<Vec<SearchResult>, Error> {
        Ok(search::search(
            &self.index,
            query,
            SearchFilter {
                types,
                session_id,
                min_confidence: min_confidence.or(Some(self.config.default_min_confidence)),
                limit: limit.or(Some(self.config.default_search_limit)),
            },
        )?)
    }

    pub fn build_compressed_context(
        &mut self,
        query: &str,
        max_tokens: usize,
        topics: Option<&[String]>,
        agent: Option<&str>,
        include_knowledge: bool,
    ) -> Result<String, Error> {
        let events = self.conversations.list_events(None, None)?;
        let knowledge_entries = self.knowledge.all_entries();
        Ok(self.context_builder.build(
            &self.index,
            self.clock.now(),
            &events,
            &knowledge_entries,
            query,
            max_tokens,
            ContextFilter {
                topics,
                agent,
                include_knowledge,
            },
        )?)
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.context_builder.count_tokens(text)
    }

    // -- Introspection -----------------------------------------------------

    pub fn stats(&mut self) -> Result<Stats, Error> {
        Ok(Stats {
            conversations: self.conversations.stats()?,
            knowledge: self.knowledge.stats(),
            embeddings: self.index.stats(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::Utc;

    fn core(dir: &std::path::Path) -> Core {
        Core::with_clock(dir, Arc::new(FixedClock::new(Utc::now()))).unwrap()
    }

    #[test]
    fn new_creates_state_directory_and_acquires_lock() {
        let dir = tempfile::tempdir().unwrap();
        let c = core(dir.path());
        assert!(dir.path().join(".state").join(".lock").exists());
        drop(c);
        assert!(!dir.path().join(".state").join(".lock").exists());
    }

    #[test]
    fn second_core_on_same_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let _first = core(dir.path());
        let second = Core::new(dir.path());
        assert!(matches!(second, Err(Error::Locked(_))));
    }

    #[test]
    fn stats_reflect_added_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = core(dir.path());
        c.add_user_message("hello", 1, "s1", vec![]).unwrap();
        c.add_decision("q", "a", "r", "claude", "s1", vec![], vec![])
            .unwrap();
        let stats = c.stats().unwrap();
        assert_eq!(stats.conversations.user_messages, 1);
        assert_eq!(stats.knowledge.decisions, 1);
    }

    #[test]
    fn reopening_after_drop_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut c = core(dir.path());
            c.add_user_message("hello", 1, "s1", vec![]).unwrap();
        }
        let mut reopened = core(dir.path());
        let stats = reopened.stats().unwrap();
        assert_eq!(stats.conversations.user_messages, 1);
    }
}
