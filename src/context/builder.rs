//! The compressed-context builder.
//!
//! Scores every candidate event/knowledge entry against a query on
//! relevance, recency, and quality (`0.5·relevance + 0.3·recency +
//! 0.2·quality`, see [`super::quality`] for the quality term), then
//! greedily packs the highest-scoring candidates into a token budget.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::quality::quality;
use super::tokenizer::TokenCounter;
use crate::conversation::Event;
use crate::embedable::Embedable;
use crate::embedding::{cosine_similarity, EmbeddingIndex};
use crate::error::IndexError;
use crate::knowledge::KnowledgeEntry;

struct Candidate {
    tag: String,
    text: String,
    created_at: DateTime<Utc>,
    topic_matches: usize,
}

struct Scored {
    candidate: Candidate,
    score: f32,
}

/// Filters narrowing the candidate set before scoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextFilter<'a> {
    pub topics: Option<&'a [String]>,
    pub agent: Option<&'a str>,
    pub include_knowledge: bool,
}

/// Builds a token-bounded summary of prior context relevant to a query.
#[derive(Debug, Default)]
pub struct CompressedContextBuilder {
    tokens: TokenCounter,
}

impl CompressedContextBuilder {
    pub fn new() -> Self {
        Self {
            tokens: TokenCounter::new(),
        }
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokens.count_tokens(text)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        index: &EmbeddingIndex,
        now: DateTime<Utc>,
        events: &[Event],
        knowledge: &[KnowledgeEntry],
        query: &str,
        max_tokens: usize,
        filter: ContextFilter<'_>,
    ) -> Result<String, IndexError> {
        if max_tokens == 0 {
            return Ok(String::new());
        }

        let mut candidates = self.candidate_set(events, knowledge, filter);
        dedup_by_content(&mut candidates);
        if candidates.is_empty() {
            return Ok(String::new());
        }

        let query_vec = if query.is_empty() {
            None
        } else {
            Some(index.embed(query)?)
        };

        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let relevance = match &query_vec {
                Some(qv) => cosine_similarity(qv, &index.embed(&candidate.text)?),
                None => 0.0,
            };
            let age_hours = (now - candidate.created_at).num_seconds() as f32 / 3600.0;
            let recency = (1.0 - age_hours / 24.0).max(0.0);
            let q = quality(&candidate.text);
            let mut score = 0.5 * relevance + 0.3 * recency + 0.2 * q;
            if candidate.topic_matches > 0 {
                let multiplier = 1.0 + 0.2 * candidate.topic_matches as f32;
                score = (score * multiplier).min(1.0);
            }
            scored.push(Scored { candidate, score });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.candidate.created_at.cmp(&a.candidate.created_at))
        });

        let mut segments: Vec<String> = Vec::new();
        let mut used_tokens = 0usize;
        let separator_tokens = self.count_tokens("\n\n");
        for entry in &scored {
            let segment = format!("{} {}", entry.candidate.tag, entry.candidate.text);
            let segment_tokens = self.count_tokens(&segment);
            let extra = if segments.is_empty() {
                segment_tokens
            } else {
                segment_tokens + separator_tokens
            };
            if used_tokens + extra <= max_tokens {
                used_tokens += extra;
                segments.push(segment);
            }
        }

        Ok(segments.join("\n\n"))
    }

    fn candidate_set(
        &self,
        events: &[Event],
        knowledge: &[KnowledgeEntry],
        filter: ContextFilter<'_>,
    ) -> Vec<Candidate> {
        let mut out = Vec::new();

        for event in events {
            if let Some(agent) = filter.agent {
                let matches = matches!(event, Event::Assistant(m) if m.model.as_deref() == Some(agent));
                if !matches {
                    continue;
                }
            }
            let Some(topic_matches) = topic_overlap(event.topics(), filter.topics) else {
                continue;
            };
            out.push(Candidate {
                tag: event_tag(event),
                text: event.embed_text(),
                created_at: event.created_at(),
                topic_matches,
            });
        }

        if filter.include_knowledge {
            for entry in knowledge {
                if let Some(agent) = filter.agent {
                    let matches =
                        matches!(entry, KnowledgeEntry::Decision(d) if d.decided_by == agent);
                    if !matches {
                        continue;
                    }
                }
                let Some(topic_matches) = topic_overlap(entry.topics(), filter.topics) else {
                    continue;
                };
                out.push(Candidate {
                    tag: knowledge_tag(entry),
                    text: entry.embed_text(),
                    created_at: entry.created_at(),
                    topic_matches,
                });
            }
        }

        out
    }
}

/// `None` means "excluded by the filter"; `Some(n)` is the number of
/// provided topics this candidate matches (0 when no filter is given).
fn topic_overlap(candidate_topics: &[String], filter: Option<&[String]>) -> Option<usize> {
    match filter {
        None => Some(0),
        Some(wanted) => {
            let matches = candidate_topics.iter().filter(|t| wanted.contains(t)).count();
            (matches > 0).then_some(matches)
        }
    }
}

fn event_tag(event: &Event) -> String {
    match event {
        Event::User(_) => "[user]".to_string(),
        Event::Assistant(a) => format!("[assistant t={}]", a.turn),
        Event::Tool(t) => format!("[tool:{}]", t.tool_name),
    }
}

fn knowledge_tag(entry: &KnowledgeEntry) -> String {
    match entry {
        KnowledgeEntry::Convention(_) => "[convention]".to_string(),
        KnowledgeEntry::Decision(_) => "[decision]".to_string(),
        KnowledgeEntry::Learning(_) => "[learning]".to_string(),
        KnowledgeEntry::Artifact(_) => "[artifact]".to_string(),
    }
}

/// Events/entries with byte-identical embedable text keep only the most
/// recent.
fn dedup_by_content(candidates: &mut Vec<Candidate>) {
    candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert(c.text.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::UserMessage;
    use chrono::Duration;

    fn user_msg(content: &str, created_at: DateTime<Utc>) -> Event {
        Event::User(UserMessage {
            event_id: "e".into(),
            session_id: "s2".into(),
            turn: 1,
            content: content.to_string(),
            topics: vec![],
            created_at,
        })
    }

    #[test]
    fn max_tokens_zero_yields_empty_string() {
        let builder = CompressedContextBuilder::new();
        let idx = EmbeddingIndex::new(4);
        let events = vec![user_msg("hello there", Utc::now())];
        let out = builder
            .build(&idx, Utc::now(), &events, &[], "", 0, ContextFilter::default())
            .unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn no_candidates_yields_empty_string() {
        let builder = CompressedContextBuilder::new();
        let idx = EmbeddingIndex::new(4);
        let out = builder
            .build(&idx, Utc::now(), &[], &[], "", 500, ContextFilter::default())
            .unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn budget_smaller_than_any_candidate_yields_empty_string() {
        let builder = CompressedContextBuilder::new();
        let idx = EmbeddingIndex::new(4);
        let events = vec![user_msg(
            "a message long enough to cost more than one token for sure",
            Utc::now(),
        )];
        let out = builder
            .build(&idx, Utc::now(), &events, &[], "", 1, ContextFilter::default())
            .unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn output_never_exceeds_token_budget() {
        let builder = CompressedContextBuilder::new();
        let idx = EmbeddingIndex::new(4);
        let now = Utc::now();
        let events: Vec<Event> = (0..20)
            .map(|i| {
                user_msg(
                    &format!("user message number {i} with some filler words to pad it out"),
                    now - Duration::hours(i),
                )
            })
            .collect();
        let out = builder
            .build(
                &idx,
                now,
                &events,
                &[],
                "",
                500,
                ContextFilter {
                    include_knowledge: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(builder.count_tokens(&out) <= 500);
        assert!(!out.is_empty());
    }

    #[test]
    fn duplicate_content_keeps_only_most_recent() {
        let builder = CompressedContextBuilder::new();
        let idx = EmbeddingIndex::new(4);
        let now = Utc::now();
        let events = vec![
            user_msg("same text", now - Duration::hours(5)),
            user_msg("same text", now),
        ];
        let out = builder
            .build(&idx, now, &events, &[], "", 500, ContextFilter::default())
            .unwrap();
        assert_eq!(out.matches("same text").count(), 1);
    }

    #[test]
    fn topic_filter_excludes_non_matching_candidates() {
        let builder = CompressedContextBuilder::new();
        let idx = EmbeddingIndex::new(4);
        let now = Utc::now();
        let mut matching = user_msg("about security", now);
        if let Event::User(m) = &mut matching {
            m.topics = vec!["security".to_string()];
        }
        let non_matching = user_msg("about something else entirely", now);
        let events = vec![matching, non_matching];
        let topics = vec!["security".to_string()];
        let out = builder
            .build(
                &idx,
                now,
                &events,
                &[],
                "",
                500,
                ContextFilter {
                    topics: Some(&topics),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(out.contains("about security"));
        assert!(!out.contains("something else"));
    }
}
