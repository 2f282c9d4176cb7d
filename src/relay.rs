//! Session supervisor.
//!
//! Owns the transport event loop. Every `open` event resolves the channel
//! set and starts a fresh session (new ledger, no pending media); a
//! transient close drops the session until the transport reopens, and a
//! logout stops the relay. Messages are handled concurrently, one task per
//! message.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::{JoinHandle, JoinSet};

use crate::channels::{
    ChannelResolver, ConnectionUpdate, DisconnectReason, Transport, TransportEvent,
};
use crate::config::RelayConfig;
use crate::error::{Result, TransportError};
use crate::pipeline::dedup::spawn_sweep_task;
use crate::pipeline::dispatcher::{Dispatcher, DispatcherDeps};
use crate::pipeline::types::{InboundMessage, RelayOutcome};

/// State of one connected session.
struct Session {
    dispatcher: Arc<Dispatcher>,
    sweeper: Option<JoinHandle<()>>,
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

/// The relay process.
pub struct Relay {
    config: RelayConfig,
    transport: Arc<dyn Transport>,
    resolver: ChannelResolver,
}

impl Relay {
    pub fn new(config: RelayConfig, transport: Arc<dyn Transport>) -> Self {
        let resolver = ChannelResolver::from_config(&config);
        Self {
            config,
            transport,
            resolver,
        }
    }

    /// Run until the event stream ends, Ctrl+C, or a fatal error.
    ///
    /// Returns an error when channel resolution fails or the session is
    /// logged out. In-flight handlers are drained before returning `Ok`.
    pub async fn run(&self) -> Result<()> {
        let mut events = self.transport.connect().await?;
        let mut session: Option<Session> = None;
        let mut handlers: JoinSet<RelayOutcome> = JoinSet::new();

        tracing::info!(transport = self.transport.name(), "Relay started, waiting for connection");

        loop {
            tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Message handler panicked");
                    }
                }
                event = events.next() => {
                    let Some(event) = event else {
                        tracing::info!("Event stream ended, shutting down...");
                        break;
                    };
                    match event {
                        TransportEvent::Connection(ConnectionUpdate::Open) => {
                            tracing::info!("Connection open");
                            session = self.open_session().await?;
                        }
                        TransportEvent::Connection(ConnectionUpdate::Closed {
                            reason: DisconnectReason::LoggedOut,
                        }) => {
                            tracing::error!("Session logged out, re-authentication required");
                            return Err(TransportError::LoggedOut.into());
                        }
                        TransportEvent::Connection(ConnectionUpdate::Closed {
                            reason: DisconnectReason::Transient(reason),
                        }) => {
                            tracing::warn!(reason = %reason, "Connection closed, waiting for reconnect");
                            session = None;
                        }
                        TransportEvent::Message(message) => {
                            dispatch(session.as_ref(), &mut handlers, message);
                        }
                    }
                }
            }
        }

        while let Some(joined) = handlers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Message handler panicked");
            }
        }
        Ok(())
    }

    /// Resolve channels and build a fresh session.
    ///
    /// A failed channel fetch leaves the relay not ready; a resolution
    /// failure is fatal.
    async fn open_session(&self) -> Result<Option<Session>> {
        let channels = match self.transport.fetch_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch channels, relay not ready");
                return Ok(None);
            }
        };

        let resolved = self.resolver.resolve(&channels)?;
        let deps = DispatcherDeps::fresh(Arc::clone(&self.transport), resolved, &self.config);
        let dispatcher = Arc::new(Dispatcher::new(deps, &self.config));

        let sweeper = self
            .config
            .dedupe_sweep_interval
            .map(|every| spawn_sweep_task(Arc::clone(dispatcher.ledger()), every));

        tracing::info!(
            sources = dispatcher.channels().sources.len(),
            destination = %dispatcher.channels().destination.display_name,
            "Relay ready"
        );
        Ok(Some(Session {
            dispatcher,
            sweeper,
        }))
    }
}

fn dispatch(
    session: Option<&Session>,
    handlers: &mut JoinSet<RelayOutcome>,
    message: InboundMessage,
) {
    let Some(session) = session else {
        tracing::warn!(
            id = %message.log_id(),
            channel = %message.channel_id,
            "Relay not ready, dropping message"
        );
        return;
    };
    let dispatcher = Arc::clone(&session.dispatcher);
    handlers.spawn(async move { dispatcher.handle(message).await });
}
