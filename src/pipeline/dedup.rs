//! Dedup ledger: remembers recently forwarded messages.
//!
//! Entries are only removed by an explicit [`DedupLedger::sweep`]; without
//! it the ledger grows for the life of the session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::pipeline::types::InboundMessage;

/// Dedup key for a message.
///
/// Prefers the network identifier. Without one, the key is synthesized from
/// the body and the media flag, so two different media-less posts with the
/// same text inside one window collapse into one.
pub fn dedup_key(message: &InboundMessage, body: &str) -> String {
    match message.id.as_deref() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!("{}-{}", body, message.media_kind().is_some()),
    }
}

/// Record of when each key was last forwarded.
#[derive(Debug)]
pub struct DedupLedger {
    window: Duration,
    entries: HashMap<String, Instant>,
}

impl DedupLedger {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    /// True when `key` was recorded less than one window before `now`.
    pub fn should_suppress(&self, key: &str, now: Instant) -> bool {
        self.entries
            .get(key)
            .is_some_and(|last| now.saturating_duration_since(*last) < self.window)
    }

    /// Mark `key` as forwarded at `now`.
    pub fn record(&mut self, key: impl Into<String>, now: Instant) {
        self.entries.insert(key.into(), now);
    }

    /// Check and record in one step. Returns `true` when suppressed; a
    /// suppressed key keeps its original timestamp.
    pub fn check_and_record(&mut self, key: &str, now: Instant) -> bool {
        if self.should_suppress(key, now) {
            return true;
        }
        self.record(key, now);
        false
    }

    /// Drop entries that can no longer suppress anything. Returns how many
    /// were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let window = self.window;
        self.entries
            .retain(|_, last| now.saturating_duration_since(*last) < window);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Periodically sweep stale entries out of `ledger`.
pub fn spawn_sweep_task(
    ledger: Arc<Mutex<DedupLedger>>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + every, every);
        loop {
            interval.tick().await;
            let removed = ledger.lock().await.sweep(Instant::now());
            if removed > 0 {
                tracing::debug!(removed, "Swept stale dedup entries");
            }
        }
    })
}
