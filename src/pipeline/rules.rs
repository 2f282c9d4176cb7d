//! Content rules evaluated before a message is relayed.
//!
//! Greeting noise ("bom dia", "good morning") is dropped regardless of
//! dedup state. Matching is a case-insensitive substring test on the
//! original body.

use tracing::debug;

/// A phrase that marks a message as noise.
#[derive(Debug, Clone)]
pub struct NoiseRule {
    /// Lower-case phrase to look for.
    pub phrase: String,
    /// Why this rule triggers.
    pub reason: String,
}

/// Drops greeting/noise posts.
#[derive(Debug, Clone, Default)]
pub struct NoiseFilter {
    rules: Vec<NoiseRule>,
}

impl NoiseFilter {
    /// Build a filter from configured phrases.
    pub fn from_phrases<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .map(|phrase| NoiseRule {
                reason: format!("greeting noise (\"{phrase}\")"),
                phrase,
            })
            .collect();
        Self { rules }
    }

    /// Create an empty filter that lets everything through.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the reason when `body` matches a noise rule.
    pub fn evaluate(&self, body: &str) -> Option<&str> {
        if self.rules.is_empty() || body.is_empty() {
            return None;
        }
        let lower = body.to_lowercase();
        let rule = self.rules.iter().find(|r| lower.contains(&r.phrase))?;
        debug!(phrase = %rule.phrase, "Body matched noise rule");
        Some(&rule.reason)
    }
}
