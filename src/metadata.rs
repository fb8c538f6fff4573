//! Fixed metadata shape stored alongside every indexed vector.
//!
//! Known fields plus a small string-keyed map for forward-compatible
//! extension, rather than a free-form dict, so serialization stays stable
//! and dedup/filter logic stays well-typed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The seven kinds of entry that can land in the shared index.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    UserMessage,
    AssistantMessage,
    ToolUse,
    Convention,
    Decision,
    Learning,
    Artifact,
}

impl EntryKind {
    /// String tag used as the index id namespace and in metadata filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::UserMessage => "user",
            EntryKind::AssistantMessage => "assistant",
            EntryKind::ToolUse => "tool",
            EntryKind::Convention => "convention",
            EntryKind::Decision => "decision",
            EntryKind::Learning => "learning",
            EntryKind::Artifact => "artifact",
        }
    }

    /// Parse a kind from its string tag.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(EntryKind::UserMessage),
            "assistant" => Some(EntryKind::AssistantMessage),
            "tool" => Some(EntryKind::ToolUse),
            "convention" => Some(EntryKind::Convention),
            "decision" => Some(EntryKind::Decision),
            "learning" => Some(EntryKind::Learning),
            "artifact" => Some(EntryKind::Artifact),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Every persisted record's metadata, tolerant of unknown extra fields so
/// older persisted entries keep loading as the shape grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub kind: EntryKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Metadata {
    /// Confidence, treating entries without one as fully confident.
    pub fn effective_confidence(&self) -> f32 {
        self.confidence.unwrap_or(1.0)
    }
}
