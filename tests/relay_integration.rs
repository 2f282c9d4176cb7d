//! End-to-end tests for the relay supervisor.
//!
//! Each test drives a scripted transport through an unbounded channel and
//! runs the relay with paused time, so the 20s send delay and pairing window
//! elapse instantly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;

use channel_relay::channels::{
    Channel, ConnectionUpdate, DisconnectReason, EventStream, Transport, TransportEvent,
};
use channel_relay::config::RelayConfig;
use channel_relay::error::{ConfigError, Error, TransportError};
use channel_relay::pipeline::types::{
    InboundMessage, MediaKind, MediaRef, MessageContent, OutboundContent,
};
use channel_relay::relay::Relay;

const SOURCE: &str = "120363@g.us";
const DESTINATION: &str = "999@g.us";

/// Transport fed by the test; records every send.
struct ScriptedTransport {
    events: Mutex<Option<UnboundedReceiver<TransportEvent>>>,
    channels: Vec<Channel>,
    fetch_fails: bool,
    media: HashMap<String, Vec<u8>>,
    sent: Mutex<Vec<(Instant, String, OutboundContent)>>,
}

impl ScriptedTransport {
    fn new(events: UnboundedReceiver<TransportEvent>) -> Self {
        Self {
            events: Mutex::new(Some(events)),
            channels: vec![
                channel(SOURCE, "Sneakers Atacado - Avisos", true),
                channel("777@g.us", "Sneakers Chat", false),
                channel(DESTINATION, "Shop", false),
            ],
            fetch_fails: false,
            media: HashMap::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn sent(&self) -> Vec<(Instant, String, OutboundContent)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(&self) -> Result<EventStream, TransportError> {
        let rx = self
            .events
            .lock()
            .unwrap()
            .take()
            .ok_or(TransportError::StreamClosed)?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn fetch_channels(&self) -> Result<Vec<Channel>, TransportError> {
        if self.fetch_fails {
            return Err(TransportError::FetchFailed("timed out".into()));
        }
        Ok(self.channels.clone())
    }

    async fn send_message(
        &self,
        destination: &str,
        content: OutboundContent,
    ) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((Instant::now(), destination.to_string(), content));
        Ok(())
    }

    async fn download_media(
        &self,
        media: &MediaRef,
        _kind: MediaKind,
    ) -> Result<Vec<u8>, TransportError> {
        self.media
            .get(&media.0)
            .cloned()
            .ok_or_else(|| TransportError::DownloadFailed {
                message_id: media.0.clone(),
                reason: "gone".into(),
            })
    }
}

fn channel(id: &str, name: &str, announce: bool) -> Channel {
    Channel {
        id: id.into(),
        display_name: name.into(),
        is_broadcast_enabled: announce,
    }
}

fn config() -> RelayConfig {
    RelayConfig {
        community_names: vec!["Sneakers Atacado".into()],
        target_name: "Shop".into(),
        ..RelayConfig::default()
    }
}

fn text(id: &str, body: &str) -> InboundMessage {
    InboundMessage {
        id: Some(id.into()),
        channel_id: SOURCE.into(),
        sender_id: "seller@s.whatsapp.net".into(),
        from_me: false,
        content: MessageContent::Conversation { text: body.into() },
        received_at: Utc::now(),
    }
}

fn image(id: &str) -> InboundMessage {
    InboundMessage {
        content: MessageContent::Image {
            caption: None,
            media: MediaRef(format!("{id}.jpg")),
        },
        ..text(id, "")
    }
}

fn open() -> TransportEvent {
    TransportEvent::Connection(ConnectionUpdate::Open)
}

fn message(msg: InboundMessage) -> TransportEvent {
    TransportEvent::Message(msg)
}

fn start(
    transport: Arc<ScriptedTransport>,
    config: RelayConfig,
) -> JoinHandle<Result<(), Error>> {
    let relay = Relay::new(config, transport);
    tokio::spawn(async move { relay.run().await })
}

fn texts(sent: &[(Instant, String, OutboundContent)]) -> Vec<String> {
    sent.iter()
        .filter_map(|(_, _, c)| match c {
            OutboundContent::Text { text } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

async fn settle(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn wholesale_post_relayed_with_new_price() {
    let (tx, rx) = unbounded_channel();
    let transport = Arc::new(ScriptedTransport::new(rx));
    let relay = start(Arc::clone(&transport), config());
    let start = Instant::now();

    tx.send(open()).unwrap();
    tx.send(message(text("M1", "Tênis - Atacado: R$50,00"))).unwrap();
    settle(25).await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, DESTINATION);
    assert!(sent[0].0.duration_since(start) >= Duration::from_secs(20));
    assert_eq!(texts(&sent), vec!["Tênis R$150,00"]);

    drop(tx);
    relay.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn non_source_and_self_messages_ignored() {
    let (tx, rx) = unbounded_channel();
    let transport = Arc::new(ScriptedTransport::new(rx));
    let relay = start(Arc::clone(&transport), config());

    let mut chat = text("C1", "R$10");
    chat.channel_id = "777@g.us".into();
    let mut own = text("C2", "R$10");
    own.from_me = true;

    tx.send(open()).unwrap();
    tx.send(message(chat)).unwrap();
    tx.send(message(own)).unwrap();
    tx.send(message(text("C3", "Bom dia!"))).unwrap();
    settle(30).await;

    assert!(transport.sent().is_empty());
    drop(tx);
    relay.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn message_before_open_dropped() {
    let (tx, rx) = unbounded_channel();
    let transport = Arc::new(ScriptedTransport::new(rx));
    let relay = start(Arc::clone(&transport), config());

    tx.send(message(text("EARLY", "R$10"))).unwrap();
    tx.send(open()).unwrap();
    settle(30).await;

    assert!(transport.sent().is_empty());
    drop(tx);
    relay.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn redelivered_message_sent_once() {
    let (tx, rx) = unbounded_channel();
    let transport = Arc::new(ScriptedTransport::new(rx));
    let relay = start(Arc::clone(&transport), config());

    tx.send(open()).unwrap();
    tx.send(message(text("DUP", "Camiseta 40,00"))).unwrap();
    tx.send(message(text("DUP", "Camiseta 40,00"))).unwrap();
    settle(30).await;

    assert_eq!(texts(&transport.sent()), vec!["Camiseta R$120,00"]);
    drop(tx);
    relay.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn captionless_image_paired_with_following_text() {
    let (tx, rx) = unbounded_channel();
    let mut transport = ScriptedTransport::new(rx);
    transport.media.insert("IMG.jpg".into(), b"jpeg".to_vec());
    let transport = Arc::new(transport);
    let relay = start(Arc::clone(&transport), config());

    tx.send(open()).unwrap();
    tx.send(message(image("IMG"))).unwrap();
    settle(3).await;
    tx.send(message(text("TXT", "Jordan R$200"))).unwrap();
    settle(25).await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    match &sent[0].2 {
        OutboundContent::Media {
            bytes, file_name, ..
        } => {
            assert_eq!(bytes, b"jpeg");
            assert_eq!(file_name, "media-IMG.jpg");
        }
        other => panic!("Expected media first, got {:?}", other),
    }
    assert!(sent[1].0.duration_since(sent[0].0) >= Duration::from_secs(20));
    assert_eq!(texts(&sent), vec!["Jordan R$600,00"]);

    drop(tx);
    relay.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn unpaired_image_discarded_after_window() {
    let (tx, rx) = unbounded_channel();
    let mut transport = ScriptedTransport::new(rx);
    transport.media.insert("IMG.jpg".into(), b"jpeg".to_vec());
    let transport = Arc::new(transport);
    let relay = start(Arc::clone(&transport), config());

    tx.send(open()).unwrap();
    tx.send(message(image("IMG"))).unwrap();
    settle(21).await;
    tx.send(message(text("TXT", "Later"))).unwrap();
    settle(25).await;

    assert_eq!(texts(&transport.sent()), vec!["Later"]);
    assert_eq!(transport.sent().len(), 1);

    drop(tx);
    relay.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn reconnect_starts_with_fresh_state() {
    let (tx, rx) = unbounded_channel();
    let mut transport = ScriptedTransport::new(rx);
    transport.media.insert("IMG.jpg".into(), b"jpeg".to_vec());
    let transport = Arc::new(transport);
    let relay = start(Arc::clone(&transport), config());

    tx.send(open()).unwrap();
    tx.send(message(image("IMG"))).unwrap();
    settle(1).await;
    tx.send(TransportEvent::Connection(ConnectionUpdate::Closed {
        reason: DisconnectReason::Transient("stream errored".into()),
    }))
    .unwrap();
    tx.send(message(text("LOST", "dropped while closed"))).unwrap();
    tx.send(open()).unwrap();
    tx.send(message(text("TXT", "After reconnect"))).unwrap();
    settle(25).await;

    // The parked image belonged to the old session.
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(texts(&sent), vec!["After reconnect"]);

    drop(tx);
    relay.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn logout_stops_relay() {
    let (tx, rx) = unbounded_channel();
    let transport = Arc::new(ScriptedTransport::new(rx));
    let relay = start(Arc::clone(&transport), config());

    tx.send(open()).unwrap();
    tx.send(TransportEvent::Connection(ConnectionUpdate::Closed {
        reason: DisconnectReason::LoggedOut,
    }))
    .unwrap();

    let err = relay.await.unwrap().unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, Error::Transport(TransportError::LoggedOut)));
}

#[tokio::test(start_paused = true)]
async fn missing_destination_is_fatal() {
    let (tx, rx) = unbounded_channel();
    let transport = Arc::new(ScriptedTransport::new(rx));
    let relay = start(
        Arc::clone(&transport),
        RelayConfig {
            target_name: "Nowhere".into(),
            ..config()
        },
    );

    tx.send(open()).unwrap();

    let err = relay.await.unwrap().unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        Error::Config(ConfigError::DestinationNotFound { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn failed_channel_fetch_leaves_relay_not_ready() {
    let (tx, rx) = unbounded_channel();
    let mut transport = ScriptedTransport::new(rx);
    transport.fetch_fails = true;
    let transport = Arc::new(transport);
    let relay = start(Arc::clone(&transport), config());

    tx.send(open()).unwrap();
    tx.send(message(text("M1", "R$10"))).unwrap();
    settle(30).await;

    assert!(transport.sent().is_empty());
    drop(tx);
    relay.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn pending_handlers_drained_on_stream_end() {
    let (tx, rx) = unbounded_channel::<TransportEvent>();
    let transport = Arc::new(ScriptedTransport::new(rx));
    let relay = start(Arc::clone(&transport), config());

    tx.send(open()).unwrap();
    tx.send(message(text("M1", "R$10"))).unwrap();
    drop(tx);

    relay.await.unwrap().unwrap();
    assert_eq!(texts(&transport.sent()), vec!["R$30,00"]);
}
