//! Media/text pairing: holds caption-less media until its text arrives.
//!
//! Senders often post a photo and, moments later, the text describing it as
//! a separate message. Caption-less media is parked here; the next text-only
//! message claims the oldest parked entry that is still inside the pairing
//! window. Unclaimed entries are discarded when their timer fires.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::pipeline::types::InboundMessage;

/// Media waiting for its text.
#[derive(Debug)]
struct PendingMedia {
    key: String,
    message: InboundMessage,
    enqueued_at: Instant,
    generation: u64,
    timer: Option<AbortHandle>,
}

/// Insertion-ordered set of parked media, at most one entry per key.
#[derive(Debug)]
pub struct PendingMediaQueue {
    window: Duration,
    entries: VecDeque<PendingMedia>,
    next_generation: u64,
}

impl PendingMediaQueue {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: VecDeque::new(),
            next_generation: 0,
        }
    }

    /// Park `message` under `key`. Returns the entry's generation, or `None`
    /// when the key is already parked.
    pub fn park(&mut self, key: &str, message: InboundMessage, now: Instant) -> Option<u64> {
        if self.entries.iter().any(|e| e.key == key) {
            return None;
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        self.entries.push_back(PendingMedia {
            key: key.to_string(),
            message,
            enqueued_at: now,
            generation,
            timer: None,
        });
        Some(generation)
    }

    /// Remove and return the oldest entry still inside the window.
    ///
    /// First match wins; at most one entry is consumed per call.
    pub fn claim(&mut self, now: Instant) -> Option<InboundMessage> {
        let window = self.window;
        let index = self
            .entries
            .iter()
            .position(|e| now.saturating_duration_since(e.enqueued_at) < window)?;
        let entry = self.entries.remove(index)?;
        if let Some(timer) = entry.timer {
            timer.abort();
        }
        Some(entry.message)
    }

    /// Drop the entry parked as (`key`, `generation`). Returns whether it
    /// was still parked.
    pub fn expire(&mut self, key: &str, generation: u64) -> bool {
        match self
            .entries
            .iter()
            .position(|e| e.key == key && e.generation == generation)
        {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    fn attach_timer(&mut self, key: &str, generation: u64, timer: AbortHandle) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.key == key && e.generation == generation)
        {
            entry.timer = Some(timer);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared pairing state with one expiry timer per parked entry.
pub struct PairingCoordinator {
    window: Duration,
    queue: Mutex<PendingMediaQueue>,
}

impl PairingCoordinator {
    pub fn new(window: Duration) -> Arc<Self> {
        Arc::new(Self {
            window,
            queue: Mutex::new(PendingMediaQueue::new(window)),
        })
    }

    /// Park caption-less media and arm its expiry timer.
    ///
    /// Returns `false` when the same key is already waiting.
    pub async fn park(self: &Arc<Self>, key: &str, message: InboundMessage) -> bool {
        let mut queue = self.queue.lock().await;
        let Some(generation) = queue.park(key, message, Instant::now()) else {
            debug!(key, "Media already waiting for text");
            return false;
        };

        let timer = tokio::spawn(expire_after(
            Arc::downgrade(self),
            key.to_string(),
            generation,
            self.window,
        ));
        queue.attach_timer(key, generation, timer.abort_handle());

        info!(
            key,
            window_ms = self.window.as_millis() as u64,
            "Media without text parked, waiting for accompanying text"
        );
        true
    }

    /// Claim the oldest media still waiting, if any.
    pub async fn claim(&self) -> Option<InboundMessage> {
        let claimed = self.queue.lock().await.claim(Instant::now());
        if let Some(ref message) = claimed {
            info!(media_id = %message.log_id(), "Pending media paired with text");
        }
        claimed
    }

    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }
}

async fn expire_after(
    coordinator: Weak<PairingCoordinator>,
    key: String,
    generation: u64,
    window: Duration,
) {
    tokio::time::sleep(window).await;
    let Some(coordinator) = coordinator.upgrade() else {
        return;
    };
    if coordinator.queue.lock().await.expire(&key, generation) {
        info!(
            key = %key,
            "No text received within the pairing window, discarding standalone media"
        );
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::pipeline::types::{MediaRef, MessageContent};

    const WINDOW: Duration = Duration::from_millis(20_000);

    fn image(id: &str) -> InboundMessage {
        InboundMessage {
            id: Some(id.into()),
            channel_id: "1@g.us".into(),
            sender_id: "2".into(),
            from_me: false,
            content: MessageContent::Image {
                caption: None,
                media: MediaRef(format!("{id}.jpg")),
            },
            received_at: Utc::now(),
        }
    }

    #[test]
    fn one_entry_per_key() {
        let now = Instant::now();
        let mut queue = PendingMediaQueue::new(WINDOW);
        assert!(queue.park("A", image("A"), now).is_some());
        assert!(queue.park("A", image("A"), now).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn claim_is_first_in_insertion_order() {
        let now = Instant::now();
        let mut queue = PendingMediaQueue::new(WINDOW);
        queue.park("A", image("A"), now);
        queue.park("B", image("B"), now + Duration::from_secs(1));

        let claimed = queue.claim(now + Duration::from_secs(2)).unwrap();
        assert_eq!(claimed.id.as_deref(), Some("A"));
        assert!(!queue.contains("A"));
        assert!(queue.contains("B"));
    }

    #[test]
    fn claim_skips_entries_past_window() {
        let now = Instant::now();
        let mut queue = PendingMediaQueue::new(WINDOW);
        queue.park("old", image("old"), now);
        queue.park("new", image("new"), now + Duration::from_secs(10));

        let claimed = queue.claim(now + Duration::from_secs(25)).unwrap();
        assert_eq!(claimed.id.as_deref(), Some("new"));
        assert!(queue.claim(now + Duration::from_secs(25)).is_none());
    }

    #[test]
    fn claim_consumes_at_most_one() {
        let now = Instant::now();
        let mut queue = PendingMediaQueue::new(WINDOW);
        queue.park("A", image("A"), now);
        queue.park("B", image("B"), now);
        queue.claim(now);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn expire_checks_generation() {
        let now = Instant::now();
        let mut queue = PendingMediaQueue::new(WINDOW);
        let first = queue.park("A", image("A"), now).unwrap();
        queue.claim(now);
        let second = queue.park("A", image("A"), now).unwrap();

        // A stale timer for the first parking must not drop the second.
        assert!(!queue.expire("A", first));
        assert!(queue.contains("A"));
        assert!(queue.expire("A", second));
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn text_inside_window_pairs() {
        let coordinator = PairingCoordinator::new(WINDOW);
        assert!(coordinator.park("A", image("A")).await);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let claimed = coordinator.claim().await;
        assert_eq!(claimed.and_then(|m| m.id), Some("A".to_string()));
        assert_eq!(coordinator.pending().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_discards_unclaimed_media() {
        let coordinator = PairingCoordinator::new(WINDOW);
        coordinator.park("A", image("A")).await;

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(coordinator.pending().await, 0);
        assert!(coordinator.claim().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_park_rejected() {
        let coordinator = PairingCoordinator::new(WINDOW);
        assert!(coordinator.park("A", image("A")).await);
        assert!(!coordinator.park("A", image("A")).await);
        assert_eq!(coordinator.pending().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reparked_key_survives_old_timer() {
        let coordinator = PairingCoordinator::new(WINDOW);
        coordinator.park("A", image("A")).await;
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(coordinator.claim().await.is_some());

        coordinator.park("A", image("A")).await;
        // First timer would have fired at 20s; the new entry lives until 35s.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(coordinator.pending().await, 1);
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(coordinator.pending().await, 0);
    }
}
