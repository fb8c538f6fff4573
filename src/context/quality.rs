//! The content-quality heuristic for the compressed-context builder.
//!
//! A fixed set of penalties and bonuses scores how substantive a piece
//! of text is likely to be: generic pleasantries are penalized, very
//! short text is penalized, and code-like or structured text is
//! rewarded. This multiplier set is deliberately fixed, not a default
//! meant to be tuned per call site.

const GENERIC_PLEASANTRIES: &[&str] = &[
    "sounds good",
    "thanks for the update",
    "no problem",
    "great, thanks",
    "got it, thanks",
    "you're welcome",
];

const TECHNICAL_TERMS: &[&str] = &[
    "function", "algorithm", "database", "exception", "async", "regex",
    "api", "endpoint", "schema", "thread", "mutex", "query",
];

/// Score `content` in `[0, 1]` using the fixed multiplier set above.
pub fn quality(content: &str) -> f32 {
    let len = content.chars().count();
    let lower = content.to_lowercase();

    let mut q = 1.0f32;
    if len < 50 {
        q *= 0.5;
    }
    if lower.contains("error") || lower.contains("failed") {
        q *= 0.7;
    }
    if len > 200 {
        q *= 1.2;
    }
    if len > 500 {
        q *= 1.3;
    }
    if content.contains("```") {
        q *= 1.3;
    }
    if content.contains('?') && len > 100 {
        q *= 1.2;
    }
    if GENERIC_PLEASANTRIES.iter().any(|p| lower.contains(p)) {
        q *= 0.6;
    }
    if TECHNICAL_TERMS.iter().any(|t| lower.contains(t)) {
        q *= 1.2;
    }
    q.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_penalized() {
        assert_eq!(quality("hi"), 0.5);
    }

    #[test]
    fn error_mention_is_penalized() {
        let short_error = quality("it failed");
        let short_plain = quality("it works");
        assert!(short_error < short_plain);
    }

    #[test]
    fn long_technical_content_scores_higher_than_short_pleasantry() {
        let technical = "a".repeat(210) + " this function calls the database via an async query";
        let pleasantry = "sounds good, thanks for the update";
        assert!(quality(&technical) > quality(pleasantry));
    }

    #[test]
    fn score_is_always_clamped_to_unit_interval() {
        let long_code = format!("```\n{}\n```", "x".repeat(600));
        assert!(quality(&long_code) <= 1.0);
    }
}
