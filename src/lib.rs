//! # Memoria
//!
//! A local, file-backed memory and knowledge store for coding agents.
//!
//! An agent session produces three kinds of durable record:
//!
//! - a **conversation log** of user messages, assistant replies, and tool
//!   uses, kept per session (`conversation`)
//! - four typed **knowledge tables** — conventions, decisions, learnings,
//!   artifacts — that persist across sessions (`knowledge`)
//! - a single **semantic index** over all of the above, used for both
//!   cross-table search and compressed-context assembly (`embedding`,
//!   `search`, `context`)
//!
//! [`Core`] is the only entry point: it owns a project root, the exclusive
//! lock on that root, and the three subsystems above, and exposes their
//! operations as plain methods. Everything else in this crate is reachable
//! through it.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use memoria::Core;
//!
//! let mut core = Core::new("./.memoria")?;
//! core.add_user_message("how do we auth this endpoint", 1, "session-1", vec![])?;
//! core.add_decision(
//!     "which JWT library",
//!     "PyJWT",
//!     "already a transitive dependency, RS256 support is solid",
//!     "claude",
//!     "session-1",
//!     vec!["authlib".to_string()],
//!     vec!["auth".to_string()],
//! )?;
//!
//! let hits = core.search("jwt library choice", None, None, None, None)?;
//! let context = core.build_compressed_context("auth", 2000, None, None, true)?;
//! # Ok::<(), memoria::Error>(())
//! ```
//!
//! ## Feature flags
//!
//! - `embeddings` (default): local embedding generation via `fastembed`
//!   (all-MiniLM-L6-v2, 384 dimensions). Without it, the store still
//!   accepts writes but `search`/`decay`/`deduplicate` return
//!   [`EmbeddingError::ModelUnavailable`].
//! - `metal`: Metal GPU acceleration for embedding inference on Apple
//!   Silicon.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

mod clock;
mod config;
mod context;
mod conversation;
mod embedable;
mod embedding;
mod error;
mod facade;
mod knowledge;
mod lock;
mod metadata;
mod search;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use context::{CompressedContextBuilder, ContextFilter};
pub use conversation::{AssistantMessage, ConversationStats, ConversationStore, Event, ToolUse, UserMessage};
pub use embedable::Embedable;
pub use embedding::{cosine_similarity, EmbeddingIndex, EmbeddingService, IndexStats, SearchHit, EMBEDDING_DIMENSIONS};
pub use error::{ConversationError, EmbeddingError, Error, IndexError, KnowledgeError, Result};
pub use facade::{Core, Stats};
pub use knowledge::{Artifact, Convention, Decision, KnowledgeEntry, KnowledgeStats, KnowledgeStore, KnowledgeTable, Learning};
pub use metadata::{EntryKind, Metadata};
pub use search::{SearchFilter, SearchResult};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        Clock, CompressedContextBuilder, Config, ContextFilter, Core, Embedable, EntryKind,
        Error, Event, KnowledgeEntry, Metadata, Result, SearchFilter, SearchResult, Stats,
    };
}
