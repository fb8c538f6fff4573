//! Knowledge entry variants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedable::Embedable;

/// A standing project convention, subject to semantic dedup.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Convention {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_session: Option<String>,
    pub confidence: f32,
    pub last_verified: DateTime<Utc>,
}

/// A one-time decision record. Never deduplicated or mutated after creation.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub id: String,
    pub question: String,
    pub decision: String,
    pub rationale: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
    pub decided_by: String,
    pub session_id: String,
    #[serde(default)]
    pub topics: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A learned pattern, subject to semantic dedup.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Learning {
    pub id: String,
    pub pattern: String,
    pub confidence: f32,
    pub learned_from: Vec<String>,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

/// A pointer to a piece of the codebase (file, class, function, ...).
/// Never deduplicated or mutated after creation.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub description: String,
    pub created_in_session: String,
    #[serde(default)]
    pub topics: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Tagged union of the four knowledge-table record kinds.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KnowledgeEntry {
    Convention(Convention),
    Decision(Decision),
    Learning(Learning),
    Artifact(Artifact),
}

impl KnowledgeEntry {
    pub fn confidence(&self) -> Option<f32> {
        match self {
            KnowledgeEntry::Convention(c) => Some(c.confidence),
            KnowledgeEntry::Learning(l) => Some(l.confidence),
            KnowledgeEntry::Decision(_) | KnowledgeEntry::Artifact(_) => None,
        }
    }
}

impl Embedable for KnowledgeEntry {
    fn id(&self) -> &str {
        match self {
            KnowledgeEntry::Convention(e) => &e.id,
            KnowledgeEntry::Decision(e) => &e.id,
            KnowledgeEntry::Learning(e) => &e.id,
            KnowledgeEntry::Artifact(e) => &e.id,
        }
    }

    fn type_tag(&self) -> &'static str {
        match self {
            KnowledgeEntry::Convention(_) => "convention",
            KnowledgeEntry::Decision(_) => "decision",
            KnowledgeEntry::Learning(_) => "learning",
            KnowledgeEntry::Artifact(_) => "artifact",
        }
    }

    fn embed_text(&self) -> String {
        match self {
            KnowledgeEntry::Convention(e) => e.content.clone(),
            KnowledgeEntry::Decision(e) => {
                format!("{} {} {}", e.question, e.decision, e.rationale)
            }
            KnowledgeEntry::Learning(e) => e.pattern.clone(),
            KnowledgeEntry::Artifact(e) => {
                format!("{} {}: {}", e.kind, e.path, e.description)
            }
        }
    }

    fn created_at(&self) -> DateTime<Utc> {
        match self {
            KnowledgeEntry::Convention(e) => e.last_verified,
            KnowledgeEntry::Decision(e) => e.created_at,
            KnowledgeEntry::Learning(e) => e.created_at,
            KnowledgeEntry::Artifact(e) => e.created_at,
        }
    }

    fn topics(&self) -> &[String] {
        match self {
            KnowledgeEntry::Convention(e) => &e.topics,
            KnowledgeEntry::Decision(e) => &e.topics,
            KnowledgeEntry::Learning(e) => &e.topics,
            KnowledgeEntry::Artifact(e) => &e.topics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision() -> Decision {
        Decision {
            id: "d1".into(),
            question: "JWT algorithm?".into(),
            decision: "RS256".into(),
            rationale: "asymmetric".into(),
            alternatives: vec![],
            decided_by: "claude".into(),
            session_id: "s1".into(),
            topics: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn decision_embed_text_concatenates_fields() {
        let entry = KnowledgeEntry::Decision(decision());
        assert_eq!(entry.embed_text(), "JWT algorithm? RS256 asymmetric");
    }

    #[test]
    fn artifact_embed_text_has_type_path_description_shape() {
        let artifact = Artifact {
            id: "a1".into(),
            kind: "function".into(),
            path: "src/lib.rs:foo".into(),
            description: "parses input".into(),
            created_in_session: "s1".into(),
            topics: vec![],
            created_at: Utc::now(),
        };
        let entry = KnowledgeEntry::Artifact(artifact);
        assert_eq!(
            entry.embed_text(),
            "function src/lib.rs:foo: parses input"
        );
    }

    #[test]
    fn decision_and_artifact_report_no_confidence() {
        assert_eq!(KnowledgeEntry::Decision(decision()).confidence(), None);
    }
}
