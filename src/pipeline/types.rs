//! Shared types for the relay pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Inbound message ─────────────────────────────────────────────────

/// Message received from a channel the transport is subscribed to.
///
/// Produced by the transport; the pipeline only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Network-provided message identifier (may be missing).
    #[serde(default)]
    pub id: Option<String>,
    /// Channel the message was posted in.
    pub channel_id: String,
    /// Author identifier.
    pub sender_id: String,
    /// Sent by the relay's own account.
    #[serde(default)]
    pub from_me: bool,
    /// Declared content kind and payload.
    pub content: MessageContent,
    /// When the transport received the message.
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Identifier for logs; `-` when the network gave none.
    pub fn log_id(&self) -> &str {
        self.id.as_deref().unwrap_or("-")
    }

    /// Text carried by the message: plain text, extended text, or the caption
    /// of an image/video/document. Empty when there is none.
    pub fn body(&self) -> &str {
        match &self.content {
            MessageContent::Conversation { text } | MessageContent::ExtendedText { text } => text,
            MessageContent::Image { caption, .. }
            | MessageContent::Video { caption, .. }
            | MessageContent::Document { caption, .. } => caption.as_deref().unwrap_or_default(),
            MessageContent::Audio { .. } | MessageContent::Sticker { .. } => "",
        }
    }

    /// Kind of media attached, if any.
    pub fn media_kind(&self) -> Option<MediaKind> {
        match &self.content {
            MessageContent::Conversation { .. } | MessageContent::ExtendedText { .. } => None,
            MessageContent::Image { .. } => Some(MediaKind::Image),
            MessageContent::Video { .. } => Some(MediaKind::Video),
            MessageContent::Document { .. } => Some(MediaKind::Document),
            MessageContent::Audio { .. } => Some(MediaKind::Audio),
            MessageContent::Sticker { .. } => Some(MediaKind::Sticker),
        }
    }

    /// Reference to the raw media payload, if any.
    pub fn media_ref(&self) -> Option<&MediaRef> {
        match &self.content {
            MessageContent::Image { media, .. }
            | MessageContent::Video { media, .. }
            | MessageContent::Document { media, .. }
            | MessageContent::Audio { media }
            | MessageContent::Sticker { media } => Some(media),
            MessageContent::Conversation { .. } | MessageContent::ExtendedText { .. } => None,
        }
    }

    /// Original file name of a document, when the sender supplied one.
    pub fn document_file_name(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Document { file_name, .. } => file_name.as_deref(),
            _ => None,
        }
    }
}

/// Declared content of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text.
    Conversation { text: String },
    /// Text with link previews, quotes, or formatting.
    ExtendedText { text: String },
    Image {
        #[serde(default)]
        caption: Option<String>,
        media: MediaRef,
    },
    Video {
        #[serde(default)]
        caption: Option<String>,
        media: MediaRef,
    },
    Document {
        #[serde(default)]
        caption: Option<String>,
        #[serde(default)]
        file_name: Option<String>,
        media: MediaRef,
    },
    Audio { media: MediaRef },
    Sticker { media: MediaRef },
}

/// Opaque handle the transport uses to download a media payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(pub String);

/// Kind of media attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Document,
    Audio,
    Sticker,
}

impl MediaKind {
    /// Whether the relay re-uploads this kind. Others are forwarded as-is.
    pub fn is_downloadable(self) -> bool {
        matches!(self, Self::Image | Self::Video | Self::Document)
    }

    /// File extension used when re-uploading.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Image => "jpg",
            Self::Video => "mp4",
            Self::Document => "pdf",
            Self::Audio => "ogg",
            Self::Sticker => "webp",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Sticker => "sticker",
        }
    }
}

// ── Outbound content ────────────────────────────────────────────────

/// Payload of one outbound send.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundContent {
    Text {
        text: String,
    },
    Media {
        kind: MediaKind,
        #[serde(skip)]
        bytes: Vec<u8>,
        caption: Option<String>,
        file_name: String,
    },
    /// Protocol-level forward of the original message.
    Forward {
        original: Box<InboundMessage>,
    },
}

impl OutboundContent {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Media { .. } => "media",
            Self::Forward { .. } => "forward",
        }
    }
}

// ── Relay outcome ───────────────────────────────────────────────────

/// Status of a relay outcome record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayStatus {
    Received,
    Skipped,
    MediaDetected,
    Sent,
    Error,
}

impl RelayStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Skipped => "skipped",
            Self::MediaDetected => "media_detected",
            Self::Sent => "sent",
            Self::Error => "error",
        }
    }
}

/// Result of handling one inbound event.
///
/// Reported to the log; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayOutcome {
    pub status: RelayStatus,
    pub error_detail: Option<String>,
}

impl RelayOutcome {
    pub fn received() -> Self {
        Self {
            status: RelayStatus::Received,
            error_detail: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: RelayStatus::Skipped,
            error_detail: Some(reason.into()),
        }
    }

    pub fn media_detected() -> Self {
        Self {
            status: RelayStatus::MediaDetected,
            error_detail: None,
        }
    }

    pub fn sent() -> Self {
        Self {
            status: RelayStatus::Sent,
            error_detail: None,
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: RelayStatus::Error,
            error_detail: Some(detail.into()),
        }
    }
}
