//! Knowledge tables with semantic dedup and confidence lifecycle.
//!
//! Each of the four tables is kept fully in memory and rewritten
//! atomically (write-temp-then-rename) on every mutation.

use std::path::PathBuf;
use std::sync::Arc;

use super::entry::{Artifact, Convention, Decision, KnowledgeEntry, Learning};
use crate::clock::Clock;
use crate::config::Config;
use crate::embedable::Embedable;
use crate::embedding::{cosine_similarity, EmbeddingIndex};
use crate::error::KnowledgeError;
use crate::metadata::{EntryKind, Metadata};

/// Which table a maintenance operation should target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnowledgeTable {
    Convention,
    Decision,
    Learning,
    Artifact,
}

/// Per-table entry counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KnowledgeStats {
    pub conventions: usize,
    pub decisions: usize,
    pub learnings: usize,
    pub artifacts: usize,
}

/// The four knowledge tables, each rewritten atomically on every mutation.
pub struct KnowledgeStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    dedup_threshold: f32,
    decay_rate: f64,
    conventions: Vec<Convention>,
    decisions: Vec<Decision>,
    learnings: Vec<Learning>,
    artifacts: Vec<Artifact>,
}

impl KnowledgeStore {
    /// `root` is the `.state/knowledge` directory; loaded eagerly, since
    /// the four files are small relative to the per-session conversation
    /// logs and rewriting them whole on every change is fine at the
    /// expected size. Uses the default dedup threshold and decay rate;
    /// see [`KnowledgeStore::with_config`] for callers that need
    /// different tuning.
    pub fn new(root: PathBuf, clock: Arc<dyn Clock>) -> Result<Self, KnowledgeError> {
        Self::with_config(root, clock, &Config::default())
    }

    /// Same as [`KnowledgeStore::new`], with the dedup threshold and decay
    /// rate taken from `config` instead of the built-in defaults.
    pub fn with_config(root: PathBuf, clock: Arc<dyn Clock>, config: &Config) -> Result<Self, KnowledgeError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            conventions: read_table(&root.join("conventions.json"))?,
            decisions: read_table(&root.join("decisions.json"))?,
            learnings: read_table(&root.join("learnings.json"))?,
            artifacts: read_table(&root.join("artifacts.json"))?,
            root,
            clock,
            dedup_threshold: config.dedup_threshold,
            decay_rate: config.decay_rate,
        })
    }

    pub fn add_convention(
        &mut self,
        index: &mut EmbeddingIndex,
        content: &str,
        topics: Vec<String>,
        source_session: Option<String>,
        confidence: f32,
    ) -> Result<Convention, KnowledgeError> {
        if content.is_empty() {
            return Err(KnowledgeError::Validation(
                "content must not be empty".into(),
            ));
        }
        validate_confidence(confidence)?;

        if let Some(existing_id) = self.find_duplicate(index, EntryKind::Convention, content)? {
            let conv = self
                .conventions
                .iter_mut()
                .find(|c| c.id == existing_id)
                .expect("index and store agree on ids");
            conv.confidence = (conv.confidence + 0.1).min(1.0);
            conv.last_verified = self.clock.now();
            union_into(&mut conv.topics, topics);
            let updated = conv.clone();
            self.persist_conventions()?;
            refresh_metadata(index, &KnowledgeEntry::Convention(updated.clone()));
            return Ok(updated);
        }

        let convention = Convention {
            id: format!("convention-{}", uuid::Uuid::new_v4()),
            content: content.to_string(),
            topics,
            source_session,
            confidence,
            last_verified: self.clock.now(),
        };
        self.conventions.push(convention.clone());
        self.persist_conventions()?;
        index_entry(index, &KnowledgeEntry::Convention(convention.clone()));
        Ok(convention)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_decision(
        &mut self,
        index: &mut EmbeddingIndex,
        question: &str,
        decision: &str,
        rationale: &str,
        decided_by: &str,
        session_id: &str,
        alternatives: Vec<String>,
        topics: Vec<String>,
    ) -> Result<Decision, KnowledgeError> {
        for (field, value) in [
            ("question", question),
            ("decision", decision),
            ("rationale", rationale),
            ("decided_by", decided_by),
            ("session_id", session_id),
        ] {
            if value.is_empty() {
                return Err(KnowledgeError::Validation(format!(
                    "{field} must not be empty"
                )));
            }
        }

        let record = Decision {
            id: format!("decision-{}", uuid::Uuid::new_v4()),
            question: question.to_string(),
            decision: decision.to_string(),
            rationale: rationale.to_string(),
            alternatives,
            decided_by: decided_by.to_string(),
            session_id: session_id.to_string(),
            topics,
            created_at: self.clock.now(),
        };
        self.decisions.push(record.clone());
        self.persist_decisions()?;
        index_entry(index, &KnowledgeEntry::Decision(record.clone()));
        Ok(record)
    }

    pub fn add_learning(
        &mut self,
        index: &mut EmbeddingIndex,
        pattern: &str,
        confidence: f32,
        learned_from: Vec<String>,
        category: Option<String>,
    ) -> Result<Learning, KnowledgeError> {
        if pattern.is_empty() {
            return Err(KnowledgeError::Validation(
                "pattern must not be empty".into(),
            ));
        }
        validate_confidence(confidence)?;
        if learned_from.is_empty() {
            return Err(KnowledgeError::Validation(
                "learned_from must not be empty".into(),
            ));
        }

        if let Some(existing_id) = self.find_duplicate(index, EntryKind::Learning, pattern)? {
            let learning = self
                .learnings
                .iter_mut()
                .find(|l| l.id == existing_id)
                .expect("index and store agree on ids");
            union_into(&mut learning.learned_from, learned_from);
            learning.confidence = (learning.confidence + confidence * 0.5).min(1.0);
            let updated = learning.clone();
            self.persist_learnings()?;
            refresh_metadata(index, &KnowledgeEntry::Learning(updated.clone()));
            return Ok(updated);
        }

        let learning = Learning {
            id: format!("learning-{}", uuid::Uuid::new_v4()),
            pattern: pattern.to_string(),
            confidence,
            learned_from,
            category: category.unwrap_or_else(|| "general".to_string()),
            created_at: self.clock.now(),
        };
        self.learnings.push(learning.clone());
        self.persist_learnings()?;
        index_entry(index, &KnowledgeEntry::Learning(learning.clone()));
        Ok(learning)
    }

    pub fn add_artifact(
        &mut self,
        index: &mut EmbeddingIndex,
        kind: &str,
        path: &str,
        description: &str,
        created_in_session: &str,
        topics: Vec<String>,
    ) -> Result<Artifact, KnowledgeError> {
        for (field, value) in [("path", path), ("description", description)] {
            if value.is_empty() {
                return Err(KnowledgeError::Validation(format!(
                    "{field} must not be empty"
                )));
            }
        }

        let artifact = Artifact {
            id: format!("artifact-{}", uuid::Uuid::new_v4()),
            kind: kind.to_string(),
            path: path.to_string(),
            description: description.to_string(),
            created_in_session: created_in_session.to_string(),
            topics,
            created_at: self.clock.now(),
        };
        self.artifacts.push(artifact.clone());
        self.persist_artifacts()?;
        index_entry(index, &KnowledgeEntry::Artifact(artifact.clone()));
        Ok(artifact)
    }

    /// `confidence ← max(0, confidence − age_days × DECAY_RATE)` for every
    /// Convention/Learning older than `max_age_days`; entries at or under
    /// the threshold are left untouched, so `decay_confidence(0)` is a
    /// no-op on freshly-added, zero-age entries. Returns the number of
    /// entries decayed.
    pub fn decay_confidence(
        &mut self,
        index: &mut EmbeddingIndex,
        max_age_days: i64,
    ) -> Result<usize, KnowledgeError> {
        let now = self.clock.now();
        let mut updated = 0;

        for conv in &mut self.conventions {
            let age_days = (now - conv.last_verified).num_seconds() as f64 / 86_400.0;
            if age_days > max_age_days as f64 {
                conv.confidence = (conv.confidence - (age_days * self.decay_rate) as f32).max(0.0);
                updated += 1;
                refresh_metadata(index, &KnowledgeEntry::Convention(conv.clone()));
            }
        }
        for learning in &mut self.learnings {
            let age_days = (now - learning.created_at).num_seconds() as f64 / 86_400.0;
            if age_days > max_age_days as f64 {
                learning.confidence =
                    (learning.confidence - (age_days * self.decay_rate) as f32).max(0.0);
                updated += 1;
                refresh_metadata(index, &KnowledgeEntry::Learning(learning.clone()));
            }
        }

        if updated > 0 {
            self.persist_conventions()?;
            self.persist_learnings()?;
        }
        Ok(updated)
    }

    /// Pairwise dedup pass across all Conventions, then all Learnings.
    /// Returns the total number of merges performed.
    pub fn deduplicate(&mut self, index: &mut EmbeddingIndex) -> Result<usize, KnowledgeError> {
        let conv_merges = self.dedup_conventions(index)?;
        let learning_merges = self.dedup_learnings(index)?;
        Ok(conv_merges + learning_merges)
    }

    fn dedup_conventions(&mut self, index: &mut EmbeddingIndex) -> Result<usize, KnowledgeError> {
        let candidates = std::mem::take(&mut self.conventions);
        let mut kept: Vec<Convention> = Vec::new();
        let mut merges = 0;
        for candidate in candidates {
            let mut match_idx = None;
            for (i, k) in kept.iter().enumerate() {
                if self.similar(index, &k.content, &candidate.content)? {
                    match_idx = Some(i);
                    break;
                }
            }
            match match_idx {
                Some(i) => {
                    let k = &mut kept[i];
                    k.confidence = (k.confidence + 0.1).min(1.0);
                    k.last_verified = self.clock.now();
                    union_into(&mut k.topics, candidate.topics);
                    index.remove(&candidate.index_id());
                    merges += 1;
                }
                None => kept.push(candidate),
            }
        }
        for k in &kept {
            refresh_metadata(index, &KnowledgeEntry::Convention(k.clone()));
        }
        self.conventions = kept;
        self.persist_conventions()?;
        Ok(merges)
    }

    fn dedup_learnings(&mut self, index: &mut EmbeddingIndex) -> Result<usize, KnowledgeError> {
        let candidates = std::mem::take(&mut self.learnings);
        let mut kept: Vec<Learning> = Vec::new();
        let mut merges = 0;
        for candidate in candidates {
            let mut match_idx = None;
            for (i, k) in kept.iter().enumerate() {
                if self.similar(index, &k.pattern, &candidate.pattern)? {
                    match_idx = Some(i);
                    break;
                }
            }
            match match_idx {
                Some(i) => {
                    let k = &mut kept[i];
                    union_into(&mut k.learned_from, candidate.learned_from);
                    k.confidence = (k.confidence + candidate.confidence * 0.5).min(1.0);
                    index.remove(&candidate.index_id());
                    merges += 1;
                }
                None => kept.push(candidate),
            }
        }
        for k in &kept {
            refresh_metadata(index, &KnowledgeEntry::Learning(k.clone()));
        }
        self.learnings = kept;
        self.persist_learnings()?;
        Ok(merges)
    }

    fn similar(&self, index: &EmbeddingIndex, a: &str, b: &str) -> Result<bool, KnowledgeError> {
        let va = index.embed(a)?;
        let vb = index.embed(b)?;
        Ok(cosine_similarity(&va, &vb) >= self.dedup_threshold)
    }

    /// Highest-similarity existing entry of `kind` whose embedable text is
    /// ≥ `DEDUP_THRESHOLD` similar to `text`, scanning the whole index so
    /// truncation by `k` never hides a real duplicate.
    fn find_duplicate(
        &self,
        index: &EmbeddingIndex,
        kind: EntryKind,
        text: &str,
    ) -> Result<Option<String>, KnowledgeError> {
        let scan = index.stats().vectors.max(1);
        let hits = index.search(text, scan, self.dedup_threshold)?;
        Ok(hits
            .into_iter()
            .filter(|h| h.metadata.kind == kind)
            .max_by(|a, b| a.similarity.partial_cmp(&b.similarity).unwrap())
            .map(|h| {
                h.id
                    .split_once(':')
                    .map(|(_, id)| id.to_string())
                    .unwrap_or(h.id)
            }))
    }

    /// Remove every entry of `table`, from both the backing file and the
    /// shared index. A maintenance escape hatch, not part of steady-state
    /// traffic: entries are never deleted automatically, only on explicit
    /// request to clear a table.
    pub fn clear(
        &mut self,
        index: &mut EmbeddingIndex,
        table: KnowledgeTable,
    ) -> Result<usize, KnowledgeError> {
        let removed = match table {
            KnowledgeTable::Convention => {
                let taken = std::mem::take(&mut self.conventions);
                for c in &taken {
                    index.remove(&KnowledgeEntry::Convention(c.clone()).index_id());
                }
                self.persist_conventions()?;
                taken.len()
            }
            KnowledgeTable::Decision => {
                let taken = std::mem::take(&mut self.decisions);
                for d in &taken {
                    index.remove(&KnowledgeEntry::Decision(d.clone()).index_id());
                }
                self.persist_decisions()?;
                taken.len()
            }
            KnowledgeTable::Learning => {
                let taken = std::mem::take(&mut self.learnings);
                for l in &taken {
                    index.remove(&KnowledgeEntry::Learning(l.clone()).index_id());
                }
                self.persist_learnings()?;
                taken.len()
            }
            KnowledgeTable::Artifact => {
                let taken = std::mem::take(&mut self.artifacts);
                for a in &taken {
                    index.remove(&KnowledgeEntry::Artifact(a.clone()).index_id());
                }
                self.persist_artifacts()?;
                taken.len()
            }
        };
        Ok(removed)
    }

    pub fn stats(&self) -> KnowledgeStats {
        KnowledgeStats {
            conventions: self.conventions.len(),
            decisions: self.decisions.len(),
            learnings: self.learnings.len(),
            artifacts: self.artifacts.len(),
        }
    }

    pub fn conventions(&self) -> &[Convention] {
        &self.conventions
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    pub fn learnings(&self) -> &[Learning] {
        &self.learnings
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    /// All entries across the four tables, for index rebuilds.
    pub fn all_entries(&self) -> Vec<KnowledgeEntry> {
        let mut out = Vec::new();
        out.extend(self.conventions.iter().cloned().map(KnowledgeEntry::Convention));
        out.extend(self.decisions.iter().cloned().map(KnowledgeEntry::Decision));
        out.extend(self.learnings.iter().cloned().map(KnowledgeEntry::Learning));
        out.extend(self.artifacts.iter().cloned().map(KnowledgeEntry::Artifact));
        out
    }

    /// Re-embed every stored entry not already present in `index`
    /// (companion to `ConversationStore::rebuild_index`; self-heals the
    /// index after a crash that left it behind the backing files).
    pub fn rebuild_index(&self, index: &mut EmbeddingIndex) -> usize {
        let mut rebuilt = 0;
        for entry in self.all_entries() {
            if !index.contains(&entry.index_id()) {
                index_entry(index, &entry);
                rebuilt += 1;
            }
        }
        rebuilt
    }

    fn persist_conventions(&self) -> Result<(), KnowledgeError> {
        write_table(&self.root.join("conventions.json"), &self.conventions)
    }
    fn persist_decisions(&self) -> Result<(), KnowledgeError> {
        write_table(&self.root.join("decisions.json"), &self.decisions)
    }
    fn persist_learnings(&self) -> Result<(), KnowledgeError> {
        write_table(&self.root.join("learnings.json"), &self.learnings)
    }
    fn persist_artifacts(&self) -> Result<(), KnowledgeError> {
        write_table(&self.root.join("artifacts.json"), &self.artifacts)
    }
}

fn validate_confidence(confidence: f32) -> Result<(), KnowledgeError> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(KnowledgeError::Validation(
            "confidence must be in [0,1]".into(),
        ));
    }
    Ok(())
}

fn union_into(dest: &mut Vec<String>, additions: Vec<String>) {
    for item in additions {
        if !dest.contains(&item) {
            dest.push(item);
        }
    }
}

fn build_metadata(entry: &KnowledgeEntry) -> Metadata {
    Metadata {
        kind: match entry {
            KnowledgeEntry::Convention(_) => EntryKind::Convention,
            KnowledgeEntry::Decision(_) => EntryKind::Decision,
            KnowledgeEntry::Learning(_) => EntryKind::Learning,
            KnowledgeEntry::Artifact(_) => EntryKind::Artifact,
        },
        text: entry.embed_text(),
        session_id: session_id_of(entry),
        topics: entry.topics().to_vec(),
        confidence: entry.confidence(),
        created_at: entry.created_at(),
        extra: Default::default(),
    }
}

fn session_id_of(entry: &KnowledgeEntry) -> Option<String> {
    match entry {
        KnowledgeEntry::Convention(c) => c.source_session.clone(),
        KnowledgeEntry::Decision(d) => Some(d.session_id.clone()),
        KnowledgeEntry::Learning(_) => None,
        KnowledgeEntry::Artifact(a) => Some(a.created_in_session.clone()),
    }
}

fn index_entry(index: &mut EmbeddingIndex, entry: &KnowledgeEntry) {
    let metadata = build_metadata(entry);
    if let Err(e) = index.add(&entry.index_id(), &entry.embed_text(), metadata) {
        tracing::warn!(
            "failed to index knowledge entry {}: {e}; will rebuild on next load",
            entry.index_id()
        );
    }
}

fn refresh_metadata(index: &mut EmbeddingIndex, entry: &KnowledgeEntry) {
    let metadata = build_metadata(entry);
    if !index.update_metadata(&entry.index_id(), metadata) {
        tracing::warn!(
            "no index entry for {} during metadata refresh; will rebuild on next load",
            entry.index_id()
        );
    }
}

fn read_table<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<Vec<T>, KnowledgeError> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let raw = std::fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

fn write_table<T: serde::Serialize>(path: &std::path::Path, rows: &[T]) -> Result<(), KnowledgeError> {
    let json = serde_json::to_vec_pretty(rows)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
