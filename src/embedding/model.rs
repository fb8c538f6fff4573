//! Local semantic embeddings.
//!
//! A `OnceLock`-cached model behind a `Mutex`, a platform cache directory
//! resolved via `directories::ProjectDirs` with an environment-variable
//! override, and a deterministic `embed`/`embed_batch` API. Uses
//! `all-MiniLM-L6-v2`, a 384-dimension sentence-embedding model, so no
//! truncation step is needed downstream.

use crate::config::MODEL_CACHE_ENV_VAR;
use crate::error::EmbeddingError;

/// Embedding dimensionality of the reference model.
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// Maximum text length fed to the model; longer input is truncated.
pub const MAX_TEXT_LENGTH: usize = 8192;

/// Batch size used by `embed_batch`.
pub const BATCH_SIZE: usize = 32;

#[cfg(feature = "embeddings")]
mod backend {
    use super::*;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::{Mutex, OnceLock};

    static MODEL: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

    fn cache_dir() -> std::path::PathBuf {
        if let Ok(path) = std::env::var(MODEL_CACHE_ENV_VAR) {
            return std::path::PathBuf::from(path);
        }
        if let Some(dirs) = directories::ProjectDirs::from("dev", "memoria", "core") {
            return dirs.cache_dir().join("fastembed");
        }
        if let Some(base) = directories::BaseDirs::new() {
            return base.home_dir().join(".cache/memoria/fastembed");
        }
        std::path::PathBuf::from(".memoria_fastembed_cache")
    }

    fn get_model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbeddingError> {
        let result = MODEL.get_or_init(|| {
            let dir = cache_dir();
            if let Err(e) = std::fs::create_dir_all(&dir) {
                tracing::warn!("failed to create embedding cache dir {:?}: {}", dir, e);
            }
            let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                .with_show_download_progress(true)
                .with_cache_dir(dir);
            TextEmbedding::try_new(options).map(Mutex::new).map_err(|e| {
                format!(
                    "failed to initialize all-MiniLM-L6-v2 embedding model: {e}. \
                     Ensure ONNX runtime is available and model files can be downloaded."
                )
            })
        });

        match result {
            Ok(model) => model
                .lock()
                .map_err(|e| EmbeddingError::ModelLoad(format!("lock poisoned: {e}"))),
            Err(e) => Err(EmbeddingError::ModelLoad(e.clone())),
        }
    }

    pub(super) fn is_ready() -> bool {
        get_model().is_ok()
    }

    pub(super) fn check_ready() -> Result<(), EmbeddingError> {
        get_model().map(|_| ())
    }

    pub(super) fn embed_one(text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = get_model()?;
        let truncated = truncate(text);
        let mut out = model
            .embed(vec![truncated], None)
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;
        out.pop()
            .ok_or_else(|| EmbeddingError::Inference("no embedding produced".into()))
    }

    pub(super) fn embed_many(texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut model = get_model()?;
        let mut all = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            let truncated: Vec<&str> = chunk.iter().map(|t| truncate(t)).collect();
            let embeddings = model
                .embed(truncated, None)
                .map_err(|e| EmbeddingError::Inference(e.to_string()))?;
            all.extend(embeddings);
        }
        Ok(all)
    }

    fn truncate(text: &str) -> &str {
        if text.len() > MAX_TEXT_LENGTH {
            &text[..MAX_TEXT_LENGTH]
        } else {
            text
        }
    }
}

#[cfg(not(feature = "embeddings"))]
mod backend {
    use super::EmbeddingError;

    pub(super) fn is_ready() -> bool {
        false
    }

    pub(super) fn check_ready() -> Result<(), EmbeddingError> {
        Err(EmbeddingError::ModelUnavailable)
    }

    pub(super) fn embed_one(_text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::ModelUnavailable)
    }

    pub(super) fn embed_many(_texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::ModelUnavailable)
    }
}

/// Generates deterministic unit-norm embeddings for a fixed model version.
///
/// The model is loaded lazily on first use and cached under the index
/// directory (see [`cache_dir`] resolution in the `embeddings` backend).
pub struct EmbeddingService;

impl Default for EmbeddingService {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingService {
    pub fn new() -> Self {
        Self
    }

    /// Whether the model is loaded (or can be loaded without error).
    pub fn is_ready(&self) -> bool {
        backend::is_ready()
    }

    /// Force model initialization, surfacing any load error.
    pub fn check_ready(&self) -> Result<(), EmbeddingError> {
        backend::check_ready()
    }

    /// Block until the model is ready.
    pub fn warm_up(&self) -> Result<(), EmbeddingError> {
        self.check_ready()
    }

    pub fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    /// Embed a single text into a unit-norm vector.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".into()));
        }
        Ok(normalize(backend::embed_one(text)?))
    }

    /// Embed a batch of texts.
    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        Ok(backend::embed_many(texts)?
            .into_iter()
            .map(normalize)
            .collect())
    }
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Cosine similarity between two vectors of equal length.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = (norm_a * norm_b).sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical() {
        let a = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_orthogonal() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-5);
    }

    #[test]
    fn cosine_mismatched_lengths() {
        let a = [1.0, 0.0];
        let b = [1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn normalize_produces_unit_vector() {
        let v = normalize(vec![3.0, 4.0]);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
