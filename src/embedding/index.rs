//! Shared embedding index over every conversation/knowledge entry.
//!
//! String-keyed add/remove/search/save/load/stats over exact brute-force
//! cosine search across stored unit vectors. Correctness, not approximate-
//! search throughput, is the goal at the expected working set of tens of
//! thousands of entries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::model::{cosine_similarity, EmbeddingService};
use super::npy;
use crate::error::IndexError;
use crate::metadata::Metadata;

/// One similarity search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub similarity: f32,
    pub metadata: Metadata,
}

/// Point-in-time statistics about the index.
#[derive(Debug, Clone, Copy)]
pub struct IndexStats {
    pub vectors: usize,
    pub dimensions: usize,
}

#[derive(Serialize, Deserialize)]
struct SidecarMarker {
    dimensions: usize,
    vectors: usize,
}

#[derive(Serialize, Deserialize)]
struct MetadataFile {
    // id -> (text, metadata, row_index)
    entries: HashMap<String, MetadataRecord>,
}

#[derive(Serialize, Deserialize)]
struct MetadataRecord {
    text: String,
    metadata: Metadata,
    row_index: usize,
}

/// Exact-search dense vector index keyed by opaque string ids.
///
/// Insertion order is preserved so that `search`'s tie-break on equal
/// similarity (earliest insertion wins) is well-defined.
pub struct EmbeddingIndex {
    embedder: EmbeddingService,
    dimensions: usize,
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    metadata: Vec<Metadata>,
    id_to_row: HashMap<String, usize>,
}

impl EmbeddingIndex {
    /// Create an empty index for the given vector dimensionality.
    pub fn new(dimensions: usize) -> Self {
        Self {
            embedder: EmbeddingService::new(),
            dimensions,
            ids: Vec::new(),
            vectors: Vec::new(),
            metadata: Vec::new(),
            id_to_row: HashMap::new(),
        }
    }

    /// Number of vectors currently held.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Block until the embedding model is ready.
    pub fn warm_up(&self) -> Result<(), IndexError> {
        Ok(self.embedder.warm_up()?)
    }

    /// Embed arbitrary text into the index's vector space.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        Ok(self.embedder.embed(text)?)
    }

    /// Add a new entry. Fails with `DuplicateId` if `id` is already present.
    pub fn add(&mut self, id: &str, text: &str, metadata: Metadata) -> Result<(), IndexError> {
        if self.id_to_row.contains_key(id) {
            return Err(IndexError::DuplicateId(id.to_string()));
        }
        let vector = self.embed(text)?;
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        let row = self.ids.len();
        self.ids.push(id.to_string());
        self.vectors.push(vector);
        self.metadata.push(metadata);
        self.id_to_row.insert(id.to_string(), row);
        Ok(())
    }

    /// Add an entry with a precomputed vector (used when re-indexing from a
    /// persisted vectors.npy without re-embedding).
    fn add_raw(&mut self, id: String, vector: Vec<f32>, metadata: Metadata) {
        let row = self.ids.len();
        self.ids.push(id.clone());
        self.vectors.push(vector);
        self.metadata.push(metadata);
        self.id_to_row.insert(id, row);
    }

    /// Remove an entry by id. Implemented by rebuilding the parallel
    /// vectors, preserving the remaining entries' vectors and metadata
    /// exactly.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(&row) = self.id_to_row.get(id) else {
            return false;
        };
        self.ids.remove(row);
        self.vectors.remove(row);
        self.metadata.remove(row);
        self.id_to_row = self
            .ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.id_to_row.contains_key(id)
    }

    /// Replace the stored metadata for an existing id without touching its
    /// vector. Used when a knowledge entry is mutated in place (confidence
    /// boost, `last_verified` refresh) so the index stays consistent with
    /// the backing store. Returns `false` if `id` is not present.
    pub fn update_metadata(&mut self, id: &str, metadata: Metadata) -> bool {
        let Some(&row) = self.id_to_row.get(id) else {
            return false;
        };
        self.metadata[row] = metadata;
        true
    }

    /// Return up to `k` entries with similarity `>= threshold`, sorted by
    /// similarity descending, ties broken by insertion order.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>, IndexError> {
        if self.is_empty() || k == 0 {
            return Ok(vec![]);
        }
        let query_vec = self.embed(query)?;
        Ok(self.search_vector(&query_vec, k, threshold))
    }

    /// Same as `search` but takes an already-computed query vector.
    pub fn search_vector(&self, query_vec: &[f32], k: usize, threshold: f32) -> Vec<SearchHit> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query_vec, v)))
            .filter(|(_, sim)| *sim >= threshold)
            .collect();

        // Stable sort by similarity descending; stability preserves
        // insertion order for ties.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, sim)| SearchHit {
                id: self.ids[i].clone(),
                similarity: sim,
                metadata: self.metadata[i].clone(),
            })
            .collect()
    }

    /// Equivalent to `search(text, 1, threshold)`, returning only the id.
    pub fn find_near_duplicate(
        &self,
        text: &str,
        threshold: f32,
    ) -> Result<Option<String>, IndexError> {
        Ok(self
            .search(text, 1, threshold)?
            .into_iter()
            .next()
            .map(|hit| hit.id))
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            vectors: self.len(),
            dimensions: self.dimensions,
        }
    }

    /// Look up metadata for an id without a similarity search.
    pub fn metadata_for(&self, id: &str) -> Option<&Metadata> {
        self.id_to_row.get(id).map(|&row| &self.metadata[row])
    }

    /// Persist the complete index state under `dir` as
    /// `metadata.json` + `vectors.npy` + `index.flat`.
    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        std::fs::create_dir_all(dir)?;

        let entries = self
            .ids
            .iter()
            .enumerate()
            .map(|(row, id)| {
                (
                    id.clone(),
                    MetadataRecord {
                        text: self.metadata[row].text.clone(),
                        metadata: self.metadata[row].clone(),
                        row_index: row,
                    },
                )
            })
            .collect();
        let metadata_file = MetadataFile { entries };
        let metadata_json = serde_json::to_vec_pretty(&metadata_file)?;
        write_atomic(&dir.join("metadata.json"), &metadata_json)?;

        npy::write(&dir.join("vectors.npy"), &self.vectors, self.dimensions)?;

        let marker = SidecarMarker {
            dimensions: self.dimensions,
            vectors: self.len(),
        };
        write_atomic(&dir.join("index.flat"), &serde_json::to_vec(&marker)?)?;

        Ok(())
    }

    /// Load a previously-saved index. Returns `DimensionMismatch` if the
    /// persisted dimension differs from `expected_dimensions`.
    pub fn load(dir: &Path, expected_dimensions: usize) -> Result<Self, IndexError> {
        let metadata_path = dir.join("metadata.json");
        let vectors_path = dir.join("vectors.npy");

        if !metadata_path.exists() || !vectors_path.exists() {
            return Ok(Self::new(expected_dimensions));
        }

        let metadata_json = std::fs::read(&metadata_path)?;
        let metadata_file: MetadataFile = serde_json::from_slice(&metadata_json)?;

        let (vectors, dim) = npy::read(&vectors_path)?;
        if dim != expected_dimensions && !vectors.is_empty() {
            return Err(IndexError::DimensionMismatch {
                expected: expected_dimensions,
                got: dim,
            });
        }

        let mut by_row: Vec<(String, MetadataRecord)> = metadata_file.entries.into_iter().collect();
        by_row.sort_by_key(|(_, rec)| rec.row_index);

        if by_row.len() != vectors.len() {
            return Err(IndexError::Corrupt(format!(
                "metadata.json has {} entries but vectors.npy has {} rows",
                by_row.len(),
                vectors.len()
            )));
        }

        let mut index = Self::new(expected_dimensions);
        for ((id, rec), vector) in by_row.into_iter().zip(vectors.into_iter()) {
            index.add_raw(id, vector, rec.metadata);
        }
        Ok(index)
    }
}


fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp: PathBuf = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("")
    ));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn meta(text: &str) -> Metadata {
        Metadata {
            kind: crate::metadata::EntryKind::Convention,
            text: text.to_string(),
            session_id: None,
            topics: vec![],
            confidence: None,
            created_at: Utc::now(),
            extra: Default::default(),
        }
    }

    fn unit(seed: f32, dim: usize) -> Vec<f32> {
        let mut v: Vec<f32> = (0..dim).map(|i| ((i as f32) + seed).sin()).collect();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in &mut v {
            *x /= norm;
        }
        v
    }

    #[test]
    fn remove_preserves_other_rows() {
        let mut idx = EmbeddingIndex::new(4);
        idx.add_raw("a".into(), unit(1.0, 4), meta("a"));
        idx.add_raw("b".into(), unit(2.0, 4), meta("b"));
        idx.add_raw("c".into(), unit(3.0, 4), meta("c"));

        assert!(idx.remove("b"));
        assert_eq!(idx.len(), 2);
        assert!(idx.contains("a"));
        assert!(idx.contains("c"));
        assert!(!idx.contains("b"));

        let hit = idx.search_vector(&unit(3.0, 4), 1, 0.0);
        assert_eq!(hit[0].id, "c");
    }

    #[test]
    fn search_vector_orders_by_similarity_and_respects_threshold() {
        let mut idx = EmbeddingIndex::new(4);
        idx.add_raw("near".into(), unit(1.0, 4), meta("near"));
        idx.add_raw("far".into(), unit(50.0, 4), meta("far"));

        let query = unit(1.0, 4);
        let hits = idx.search_vector(&query, 5, 0.99);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "near");
    }

    #[test]
    fn search_on_empty_index_is_empty_not_error() {
        let idx = EmbeddingIndex::new(4);
        let hits = idx.search_vector(&[0.0; 4], 5, 0.0);
        assert!(hits.is_empty());
    }

    #[test]
    fn duplicate_id_rejected_before_embedding() {
        let mut idx = EmbeddingIndex::new(4);
        idx.add_raw("a".into(), unit(1.0, 4), meta("a"));
        // The duplicate check runs before embedding, so this is exercised
        // without requiring the `embeddings` feature / model download.
        let result = idx.add("a", "anything", meta("a"));
        assert!(matches!(result, Err(IndexError::DuplicateId(id)) if id == "a"));
    }

    #[test]
    fn save_and_load_roundtrip_preserves_vectors_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut idx = EmbeddingIndex::new(4);
        idx.add_raw("a".into(), unit(1.0, 4), meta("hello a"));
        idx.add_raw("b".into(), unit(2.0, 4), meta("hello b"));
        idx.save(dir.path()).unwrap();

        let loaded = EmbeddingIndex::load(dir.path(), 4).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains("a"));
        assert!(loaded.contains("b"));
        assert_eq!(loaded.metadata_for("a").unwrap().text, "hello a");

        let hits = loaded.search_vector(&unit(1.0, 4), 1, 0.9);
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn load_missing_dir_returns_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let idx = EmbeddingIndex::load(&dir.path().join("nope"), 4).unwrap();
        assert!(idx.is_empty());
    }

    #[test]
    fn update_metadata_replaces_without_touching_vector() {
        let mut idx = EmbeddingIndex::new(4);
        idx.add_raw("a".into(), unit(1.0, 4), meta("hello a"));
        assert!(idx.update_metadata("a", meta("revised a")));
        assert_eq!(idx.metadata_for("a").unwrap().text, "revised a");
        assert!(!idx.update_metadata("missing", meta("x")));
    }

    #[test]
    fn load_rejects_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut idx = EmbeddingIndex::new(4);
        idx.add_raw("a".into(), unit(1.0, 4), meta("a"));
        idx.save(dir.path()).unwrap();

        let result = EmbeddingIndex::load(dir.path(), 8);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }
}
