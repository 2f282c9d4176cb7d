//! Stdio transport: newline-delimited JSON over stdin/stdout for local testing.
//!
//! Each stdin line is a [`TransportEvent`]; an `open` connection event is
//! emitted before the first line. Outbound sends are written to stdout as
//! JSON lines. Media references are local file paths.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::channels::{Channel, ConnectionUpdate, EventStream, Transport, TransportEvent};
use crate::error::TransportError;
use crate::pipeline::types::{MediaKind, MediaRef, OutboundContent};

/// Transport driven by stdin/stdout.
pub struct StdioTransport {
    channels: Vec<Channel>,
    stdout: Mutex<tokio::io::Stdout>,
}

impl StdioTransport {
    pub fn new(channels: Vec<Channel>) -> Self {
        Self {
            channels,
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }

    /// Load the channel list from a JSON array file.
    pub async fn from_channels_file(path: &Path) -> Result<Self, TransportError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let channels: Vec<Channel> = serde_json::from_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            count = channels.len(),
            "Loaded channel list"
        );
        Ok(Self::new(channels))
    }
}

/// Parse one stdin line. Blank lines yield `None`.
pub fn parse_event_line(line: &str) -> Option<Result<TransportEvent, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Render an outbound send as the JSON line written to stdout.
pub fn render_send(destination: &str, content: &OutboundContent) -> Result<String, serde_json::Error> {
    let mut content_value = serde_json::to_value(content)?;
    if let OutboundContent::Media { bytes, .. } = content {
        content_value["size"] = serde_json::Value::from(bytes.len());
    }
    serde_json::to_string(&serde_json::json!({
        "destination": destination,
        "content": content_value,
    }))
}

#[async_trait]
impl Transport for StdioTransport {
    fn name(&self) -> &str {
        "stdio"
    }

    async fn connect(&self) -> Result<EventStream, TransportError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        if tx
            .send(TransportEvent::Connection(ConnectionUpdate::Open))
            .is_err()
        {
            return Err(TransportError::StreamClosed);
        }

        tokio::spawn(async move {
            let reader = BufReader::new(tokio::io::stdin());
            let mut lines = reader.lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match parse_event_line(&line) {
                        None => continue,
                        Some(Ok(event)) => {
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Ignoring malformed event line");
                        }
                    },
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn fetch_channels(&self) -> Result<Vec<Channel>, TransportError> {
        Ok(self.channels.clone())
    }

    async fn send_message(
        &self,
        destination: &str,
        content: OutboundContent,
    ) -> Result<(), TransportError> {
        let mut line = render_send(destination, &content)?;
        line.push('\n');

        let mut stdout = self.stdout.lock().await;
        stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|e| TransportError::SendFailed {
                destination: destination.to_string(),
                reason: e.to_string(),
            })?;
        stdout.flush().await?;
        Ok(())
    }

    async fn download_media(
        &self,
        media: &MediaRef,
        kind: MediaKind,
    ) -> Result<Vec<u8>, TransportError> {
        let path = PathBuf::from(&media.0);
        tokio::fs::read(&path)
            .await
            .map_err(|e| TransportError::DownloadFailed {
                message_id: media.0.clone(),
                reason: format!("{} {}: {e}", kind.label(), path.display()),
            })
    }
}
