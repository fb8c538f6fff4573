//! The single cross-table search entry point.
//!
//! Single relevance signal: cosine similarity against the query, then
//! type/session/confidence filters, then a final truncate to the
//! requested limit.

use std::cmp::Ordering;

use crate::config::{DEFAULT_MIN_CONFIDENCE, DEFAULT_SEARCH_LIMIT};
use crate::embedding::EmbeddingIndex;
use crate::error::IndexError;
use crate::metadata::{EntryKind, Metadata};

/// One ranked hit, carrying the original embedded text and full metadata.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    pub text: String,
    pub similarity: f32,
    pub metadata: Metadata,
}

/// Optional narrowing applied on top of the raw similarity ranking.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter<'a> {
    pub types: Option<&'a [EntryKind]>,
    pub session_id: Option<&'a str>,
    pub min_confidence: Option<f32>,
    pub limit: Option<usize>,
}

/// Rank `query` against every indexed entry, apply `filter`, and return at
/// most `filter.limit` (default 10) results.
///
/// Over-fetches `limit × 4` raw candidates from the index before filtering,
/// so that type/session/confidence filters don't starve the result set.
pub fn search(
    index: &EmbeddingIndex,
    query: &str,
    filter: SearchFilter<'_>,
) -> Result<Vec<SearchResult>, IndexError> {
    let limit = filter.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let min_confidence = filter.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE);

    if limit == 0 || index.is_empty() {
        return Ok(vec![]);
    }

    let over_fetch = limit.saturating_mul(4);
    let raw = index.search(query, over_fetch, 0.0)?;

    let mut results: Vec<SearchResult> = raw
        .into_iter()
        .filter(|hit| {
            filter
                .types
                .is_none_or(|types| types.contains(&hit.metadata.kind))
        })
        .filter(|hit| {
            filter
                .session_id
                .is_none_or(|sid| hit.metadata.session_id.as_deref() == Some(sid))
        })
        .filter(|hit| hit.metadata.effective_confidence() >= min_confidence)
        .map(|hit| SearchResult {
            id: hit.id,
            text: hit.metadata.text.clone(),
            similarity: hit.similarity,
            metadata: hit.metadata,
        })
        .collect();

    // The index itself breaks similarity ties by insertion order; the
    // façade instead breaks ties by `created_at` descending (newer wins).
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.metadata.created_at.cmp(&a.metadata.created_at))
    });
    results.truncate(limit);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use chrono::{Duration, Utc};

    fn meta(kind: EntryKind, session_id: Option<&str>, confidence: Option<f32>) -> Metadata {
        Metadata {
            kind,
            text: "text".into(),
            session_id: session_id.map(|s| s.to_string()),
            topics: vec![],
            confidence,
            created_at: Utc::now(),
            extra: Default::default(),
        }
    }

    #[test]
    fn search_on_empty_index_returns_empty() {
        let idx = EmbeddingIndex::new(4);
        let results = search(&idx, "anything", SearchFilter::default()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn filters_by_type() {
        let mut idx = EmbeddingIndex::new(4);
        idx_add_raw(&mut idx, "decision:d1", &[1.0, 0.0, 0.0, 0.0], meta(EntryKind::Decision, None, None));
        idx_add_raw(&mut idx, "convention:c1", &[1.0, 0.0, 0.0, 0.0], meta(EntryKind::Convention, None, None));

        let types = [EntryKind::Decision];
        let filter = SearchFilter {
            types: Some(&types),
            ..Default::default()
        };
        let results = search(&idx, "x", filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "decision:d1");
    }

    #[test]
    fn filters_by_min_confidence() {
        let mut idx = EmbeddingIndex::new(4);
        idx_add_raw(&mut idx, "a", &[1.0, 0.0, 0.0, 0.0], meta(EntryKind::Convention, None, Some(0.3)));
        idx_add_raw(&mut idx, "b", &[1.0, 0.0, 0.0, 0.0], meta(EntryKind::Convention, None, Some(0.9)));

        let filter = SearchFilter {
            min_confidence: Some(0.7),
            ..Default::default()
        };
        let results = search(&idx, "x", filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }

    #[test]
    fn ties_break_by_created_at_descending() {
        let mut idx = EmbeddingIndex::new(4);
        let older = Utc::now() - Duration::days(1);
        let newer = Utc::now();
        let mut older_meta = meta(EntryKind::Convention, None, None);
        older_meta.created_at = older;
        let mut newer_meta = meta(EntryKind::Convention, None, None);
        newer_meta.created_at = newer;
        idx_add_raw(&mut idx, "older", &[1.0, 0.0, 0.0, 0.0], older_meta);
        idx_add_raw(&mut idx, "newer", &[1.0, 0.0, 0.0, 0.0], newer_meta);

        let results = search(&idx, "x", SearchFilter::default()).unwrap();
        assert_eq!(results[0].id, "newer");
        assert_eq!(results[1].id, "older");
    }

    fn idx_add_raw(idx: &mut EmbeddingIndex, id: &str, vector: &[f32], metadata: Metadata) {
        // Tests exercise the filter/rank/truncate logic directly, bypassing
        // the `embeddings` feature; they insert pre-computed vectors via
        // the crate-internal constructor used throughout `embedding::index`.
        crate::embedding::test_support::add_raw(idx, id, vector.to_vec(), metadata);
    }
}
