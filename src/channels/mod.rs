//! Transport abstraction for the messaging network.
//!
//! The relay never speaks the network protocol itself. A [`Transport`]
//! supplies the inbound event stream, the channel list, media downloads and
//! outbound sends; everything session-related (pairing, credentials,
//! reconnects) lives behind it.

pub mod resolver;
pub mod stdio;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::pipeline::types::{InboundMessage, MediaKind, MediaRef, OutboundContent};

pub use resolver::{ChannelResolver, MatchMode, ResolvedChannels};
pub use stdio::StdioTransport;

/// A channel the account participates in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Stable opaque identifier.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Only admins may post (announcement-style channel).
    #[serde(default)]
    pub is_broadcast_enabled: bool,
}

/// Why a connection closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The session was logged out; needs re-authentication.
    LoggedOut,
    /// Anything else; the transport reconnects on its own.
    Transient(String),
}

/// Connection state change reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionUpdate {
    Open,
    Closed { reason: DisconnectReason },
}

/// Event delivered by the transport, in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum TransportEvent {
    Connection(ConnectionUpdate),
    Message(InboundMessage),
}

/// Stream of transport events.
pub type EventStream = Pin<Box<dyn Stream<Item = TransportEvent> + Send>>;

/// Messaging network collaborator.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logs.
    fn name(&self) -> &str;

    /// Start the session and return its event stream.
    async fn connect(&self) -> Result<EventStream, TransportError>;

    /// List every channel the account participates in.
    async fn fetch_channels(&self) -> Result<Vec<Channel>, TransportError>;

    /// Send one message to `destination`.
    async fn send_message(
        &self,
        destination: &str,
        content: OutboundContent,
    ) -> Result<(), TransportError>;

    /// Download the raw payload behind `media`.
    async fn download_media(
        &self,
        media: &MediaRef,
        kind: MediaKind,
    ) -> Result<Vec<u8>, TransportError>;
}
