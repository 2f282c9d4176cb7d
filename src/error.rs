//! Error types for the relay.

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl Error {
    /// Errors the process must stop on instead of recovering.
    ///
    /// Configuration failures need an operator to fix names; a logout needs
    /// re-authentication out of band.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Config(_) => true,
            Self::Transport(e) => matches!(e, TransportError::LoggedOut),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error(
        "No source channels matched. Announced channels: [{}]; SOURCE_COMMUNITY_NAMES: [{}]; \
         ANNOUNCEMENT_GROUP_NAMES: [{}]. Check the names (including accents) or leave both \
         empty to monitor every announcement channel",
        .announced.join(", "),
        .community_filters.join(", "),
        .announcement_filters.join(", ")
    )]
    NoSourceChannels {
        announced: Vec<String>,
        community_filters: Vec<String>,
        announcement_filters: Vec<String>,
    },

    #[error("Destination channel \"{name}\" not found. Available: [{}]", .available.join(", "))]
    DestinationNotFound { name: String, available: Vec<String> },
}

/// Errors raised by the messaging transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Session logged out; re-authentication required")]
    LoggedOut,

    #[error("Failed to fetch channels: {0}")]
    FetchFailed(String),

    #[error("Failed to send to {destination}: {reason}")]
    SendFailed { destination: String, reason: String },

    #[error("Failed to download media for message {message_id}: {reason}")]
    DownloadFailed { message_id: String, reason: String },

    #[error("Event stream closed")]
    StreamClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_fatal() {
        let err: Error = ConfigError::DestinationNotFound {
            name: "Shop".into(),
            available: vec![],
        }
        .into();
        assert!(err.is_fatal());
    }

    #[test]
    fn only_logout_is_fatal_among_transport_errors() {
        assert!(Error::from(TransportError::LoggedOut).is_fatal());
        assert!(
            !Error::from(TransportError::FetchFailed("socket closed".into())).is_fatal()
        );
        assert!(!Error::from(TransportError::StreamClosed).is_fatal());
    }

    #[test]
    fn no_source_message_lists_filters() {
        let err = ConfigError::NoSourceChannels {
            announced: vec!["Avisos".into()],
            community_filters: vec!["Sneakers".into()],
            announcement_filters: vec!["Anúncios".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Avisos"));
        assert!(msg.contains("Sneakers"));
        assert!(msg.contains("Anúncios"));
    }
}
