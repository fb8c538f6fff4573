//! Tunable constants and the runtime [`Config`] struct they default from.

/// Cosine similarity at or above which two Conventions/Learnings are
/// considered the same for dedup/merge purposes.
pub const DEDUP_THRESHOLD: f32 = 0.85;

/// Daily confidence decay rate applied by `decay_confidence`.
pub const DECAY_RATE: f64 = 0.01;

/// Default `min_confidence` for `SearchFacade::search`.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.7;

/// Default result cap for `SearchFacade::search`.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Environment variable that overrides the embedding model cache directory.
pub const MODEL_CACHE_ENV_VAR: &str = "MEMORIA_MODEL_CACHE";

/// Runtime configuration for a [`crate::facade::Core`] instance.
///
/// Every field has a spec-mandated default; callers needing different
/// tuning (e.g. a stricter dedup threshold) construct a `Config` and pass
/// it to `Core::with_config`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// See [`DEDUP_THRESHOLD`].
    pub dedup_threshold: f32,
    /// See [`DECAY_RATE`].
    pub decay_rate: f64,
    /// See [`DEFAULT_MIN_CONFIDENCE`].
    pub default_min_confidence: f32,
    /// See [`DEFAULT_SEARCH_LIMIT`].
    pub default_search_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dedup_threshold: DEDUP_THRESHOLD,
            decay_rate: DECAY_RATE,
            default_min_confidence: DEFAULT_MIN_CONFIDENCE,
            default_search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}
