//! Relay dispatcher: decides what each inbound message becomes at the
//! destination.
//!
//! Flow per message:
//! 1. Filters: self-authored, outside the group namespace, not a source
//! 2. Noise rules (greetings) → dropped, log only
//! 3. Dedup ledger → duplicates inside the window are dropped
//! 4. Text transformer → price rewriting
//! 5. Branch on media presence:
//!    - media without text → parked until its text arrives
//!    - media with text → media, pause, text
//!    - text → pairs with parked media if any, otherwise text alone after
//!      the inter-send pause
//!
//! Handlers for different messages interleave; every shared read-modify-write
//! (ledger, pending media) happens under one lock acquisition.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::channels::{ResolvedChannels, Transport};
use crate::config::RelayConfig;
use crate::error::TransportError;
use crate::pipeline::dedup::{DedupLedger, dedup_key};
use crate::pipeline::pairing::PairingCoordinator;
use crate::pipeline::rules::NoiseFilter;
use crate::pipeline::transform::TextTransformer;
use crate::pipeline::types::{
    InboundMessage, MediaKind, OutboundContent, RelayOutcome, RelayStatus,
};

/// Collaborators of a dispatcher. Built fresh for every session.
pub struct DispatcherDeps {
    pub transport: Arc<dyn Transport>,
    pub channels: ResolvedChannels,
    pub transformer: TextTransformer,
    pub noise: NoiseFilter,
    pub ledger: Arc<Mutex<DedupLedger>>,
    pub pairing: Arc<PairingCoordinator>,
}

impl DispatcherDeps {
    /// Default collaborators with empty ledger and pending-media state.
    pub fn fresh(
        transport: Arc<dyn Transport>,
        channels: ResolvedChannels,
        config: &RelayConfig,
    ) -> Self {
        Self {
            transport,
            channels,
            transformer: TextTransformer::new(config.price_multiplier),
            noise: NoiseFilter::from_phrases(&config.noise_phrases),
            ledger: Arc::new(Mutex::new(DedupLedger::new(config.dedupe_window))),
            pairing: PairingCoordinator::new(config.pairing_window),
        }
    }
}

/// Per-session relay logic.
pub struct Dispatcher {
    deps: DispatcherDeps,
    send_delay: Duration,
    group_id_suffix: String,
}

impl Dispatcher {
    pub fn new(deps: DispatcherDeps, config: &RelayConfig) -> Self {
        Self {
            deps,
            send_delay: config.send_delay,
            group_id_suffix: config.group_id_suffix.clone(),
        }
    }

    pub fn channels(&self) -> &ResolvedChannels {
        &self.deps.channels
    }

    pub fn ledger(&self) -> &Arc<Mutex<DedupLedger>> {
        &self.deps.ledger
    }

    pub fn pairing(&self) -> &Arc<PairingCoordinator> {
        &self.deps.pairing
    }

    fn destination(&self) -> &str {
        &self.deps.channels.destination.id
    }

    /// Handle one inbound message end to end.
    ///
    /// Never fails: send and download problems end up in the returned
    /// outcome and the log.
    pub async fn handle(&self, message: InboundMessage) -> RelayOutcome {
        if message.from_me {
            return RelayOutcome::skipped("self-authored");
        }
        if !message.channel_id.ends_with(&self.group_id_suffix) {
            return RelayOutcome::skipped("outside the group namespace");
        }
        let Some(source_name) = self.deps.channels.source_name(&message.channel_id) else {
            return RelayOutcome::skipped("not a monitored source channel");
        };

        let body = message.body();
        let media_kind = message.media_kind();
        debug!(
            id = %message.log_id(),
            channel = %message.channel_id,
            media = media_kind.map(MediaKind::label).unwrap_or("none"),
            body_preview = %body.chars().take(50).collect::<String>(),
            "Message received"
        );

        if let Some(reason) = self.deps.noise.evaluate(body) {
            info!(
                id = %message.log_id(),
                body_preview = %body.chars().take(50).collect::<String>(),
                "Message ignored: {reason}"
            );
            return RelayOutcome::skipped(reason);
        }

        let mut report = OutcomeReport::new(
            &message,
            source_name,
            &self.deps.channels.destination.display_name,
        );
        report.emit(
            &RelayOutcome::received(),
            "New message from a monitored channel",
        );

        let key = dedup_key(&message, body);
        let suppressed = self
            .deps
            .ledger
            .lock()
            .await
            .check_and_record(&key, Instant::now());
        if suppressed {
            let outcome = RelayOutcome::skipped("duplicate inside the dedup window");
            report.emit(&outcome, "Skipping duplicate message");
            return outcome;
        }

        let text = self.deps.transformer.transform(body);
        report.modified_text = text.clone();

        let outcome = match (media_kind, text.trim().is_empty()) {
            (Some(_), true) => {
                if self.deps.pairing.park(&key, message.clone()).await {
                    RelayOutcome::media_detected()
                } else {
                    RelayOutcome::skipped("media already waiting for text")
                }
            }
            (Some(_), false) => {
                report.emit(&RelayOutcome::media_detected(), "Media with text detected");
                self.relay_media_with_text(&message, &text, &mut report)
                    .await
            }
            (None, false) => match self.deps.pairing.claim().await {
                Some(media) => {
                    self.relay_media_with_text(&media, &text, &mut report)
                        .await
                }
                None => self.relay_text_only(&text).await,
            },
            (None, true) => RelayOutcome::skipped("nothing left to forward"),
        };

        let summary = match outcome.status {
            RelayStatus::Sent => "Message forwarded",
            RelayStatus::MediaDetected => "Media parked for pairing",
            RelayStatus::Error => "Message forwarding failed",
            _ => "Message not forwarded",
        };
        report.emit(&outcome, summary);
        outcome
    }

    /// Text-only post: pause, then send.
    async fn relay_text_only(&self, text: &str) -> RelayOutcome {
        debug!(delay_ms = self.send_delay.as_millis() as u64, "Sending text-only message after delay");
        tokio::time::sleep(self.send_delay).await;
        match self.send(OutboundContent::Text { text: text.to_string() }).await {
            Ok(()) => RelayOutcome::sent(),
            Err(e) => RelayOutcome::error(format!("Failed to send text message: {e}")),
        }
    }

    /// Media first, then (after the pause) the text as its own message.
    ///
    /// When the media cannot be downloaded the original message is forwarded
    /// as-is instead.
    async fn relay_media_with_text(
        &self,
        media_message: &InboundMessage,
        text: &str,
        report: &mut OutcomeReport,
    ) -> RelayOutcome {
        match self.send_media_then_text(media_message, text, report).await {
            Ok(()) => RelayOutcome::sent(),
            Err(e) => RelayOutcome::error(format!("Failed to relay media: {e}")),
        }
    }

    async fn send_media_then_text(
        &self,
        media_message: &InboundMessage,
        text: &str,
        report: &mut OutcomeReport,
    ) -> Result<(), TransportError> {
        match self.download(media_message).await {
            Some((kind, bytes)) => {
                let file_name = media_file_name(media_message, kind);
                self.send(OutboundContent::Media {
                    kind,
                    bytes,
                    caption: None,
                    file_name: file_name.clone(),
                })
                .await?;
                info!(file_name = %file_name, "Media sent");
                report.media_filenames.push(file_name);
            }
            None => {
                warn!(
                    id = %media_message.log_id(),
                    "Media not downloadable, forwarding original message instead"
                );
                self.send(OutboundContent::Forward {
                    original: Box::new(media_message.clone()),
                })
                .await?;
                info!(id = %media_message.log_id(), "Message forwarded as fallback");
            }
        }

        if !text.trim().is_empty() {
            debug!(
                delay_ms = self.send_delay.as_millis() as u64,
                "Waiting before sending text after media"
            );
            tokio::time::sleep(self.send_delay).await;
            self.send(OutboundContent::Text {
                text: text.to_string(),
            })
            .await?;
            info!("Text sent after media");
        }

        Ok(())
    }

    /// Download re-uploadable media. `None` means take the forward path.
    async fn download(&self, message: &InboundMessage) -> Option<(MediaKind, Vec<u8>)> {
        let kind = message.media_kind()?;
        if !kind.is_downloadable() {
            return None;
        }
        let media = message.media_ref()?;
        match self.deps.transport.download_media(media, kind).await {
            Ok(bytes) => Some((kind, bytes)),
            Err(e) => {
                warn!(id = %message.log_id(), kind = kind.label(), error = %e, "Media download failed");
                None
            }
        }
    }

    async fn send(&self, content: OutboundContent) -> Result<(), TransportError> {
        let label = content.label();
        self.deps
            .transport
            .send_message(self.destination(), content)
            .await
            .inspect_err(|e| error!(kind = label, error = %e, "Send failed"))
    }
}

/// File name for re-uploaded media.
pub fn media_file_name(message: &InboundMessage, kind: MediaKind) -> String {
    if let Some(name) = message.document_file_name().filter(|n| !n.trim().is_empty()) {
        return name.to_string();
    }
    format!(
        "media-{}.{}",
        message.id.as_deref().unwrap_or("unknown"),
        kind.extension()
    )
}

// ── Outcome reporting ───────────────────────────────────────────────

/// Structured record of one relay decision, emitted to the log.
#[derive(Debug, Clone, Serialize)]
struct OutcomeReport {
    source_message_id: String,
    author: String,
    source_channel: String,
    target_channel: String,
    original_text: String,
    modified_text: String,
    media_filenames: Vec<String>,
}

impl OutcomeReport {
    fn new(message: &InboundMessage, source_channel: &str, target_channel: &str) -> Self {
        Self {
            source_message_id: message.log_id().to_string(),
            author: message.sender_id.clone(),
            source_channel: source_channel.to_string(),
            target_channel: target_channel.to_string(),
            original_text: message.body().to_string(),
            modified_text: String::new(),
            media_filenames: Vec::new(),
        }
    }

    fn emit(&self, outcome: &RelayOutcome, summary: &str) {
        let status = outcome.status.label();
        let error_message = outcome.error_detail.as_deref().unwrap_or_default();
        let media_filenames = self.media_filenames.join(",");
        match outcome.status {
            RelayStatus::Error => error!(
                source_message_id = %self.source_message_id,
                author = %self.author,
                source_channel = %self.source_channel,
                target_channel = %self.target_channel,
                original_text = %self.original_text,
                modified_text = %self.modified_text,
                media_filenames = %media_filenames,
                status,
                error_message,
                "{summary}"
            ),
            RelayStatus::Skipped => warn!(
                source_message_id = %self.source_message_id,
                author = %self.author,
                source_channel = %self.source_channel,
                original_text = %self.original_text,
                status,
                error_message,
                "{summary}"
            ),
            _ => info!(
                source_message_id = %self.source_message_id,
                author = %self.author,
                source_channel = %self.source_channel,
                target_channel = %self.target_channel,
                original_text = %self.original_text,
                modified_text = %self.modified_text,
                media_filenames = %media_filenames,
                status,
                "{summary}"
            ),
        }
    }
}
