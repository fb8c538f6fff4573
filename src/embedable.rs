//! The shared trait conversation events and knowledge entries embed through.
//!
//! The three conversation events and four knowledge records are tagged sum
//! types sharing this trait; the search façade and context builder are
//! polymorphic only over it, never over the concrete record types.

use chrono::{DateTime, Utc};

/// Anything that can be placed in the shared embedding index.
pub trait Embedable {
    /// Stable id, unique within the entry's own table.
    fn id(&self) -> &str;

    /// Short tag naming this entry's kind (e.g. `"decision"`, `"user"`).
    fn type_tag(&self) -> &'static str;

    /// Canonical text fed to the embedder and stored for exact recall.
    fn embed_text(&self) -> String;

    /// Creation timestamp, used for recency scoring and tie-breaking.
    fn created_at(&self) -> DateTime<Utc>;

    /// Topics associated with this entry, if any.
    fn topics(&self) -> &[String];

    /// Index id, namespaced by kind (e.g. `"decision:<uuid>"`).
    fn index_id(&self) -> String {
        format!("{}:{}", self.type_tag(), self.id())
    }
}
