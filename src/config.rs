//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::ConfigError;

/// Destination used when `TARGET_GROUP_NAME` is unset.
pub const DEFAULT_TARGET_NAME: &str = "OJ® Streetwear Shop & Sneakers";

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Community names whose announcement channels are monitored.
    pub community_names: Vec<String>,
    /// Announcement channel names supplied by the operator (may be empty).
    pub announcement_names: Vec<String>,
    /// Exact display name of the destination channel.
    pub target_name: String,
    /// Window during which a re-delivered message is suppressed.
    pub dedupe_window: Duration,
    /// Pause between the media part and the text part of one post.
    pub send_delay: Duration,
    /// How long caption-less media waits for its text.
    pub pairing_window: Duration,
    /// Factor applied to every detected price.
    pub price_multiplier: Decimal,
    /// Lower-case phrases that mark a message as greeting noise.
    pub noise_phrases: Vec<String>,
    /// Channel-id suffix of the group namespace.
    pub group_id_suffix: String,
    /// Interval of the dedup ledger sweep. `None` keeps the ledger grow-only.
    pub dedupe_sweep_interval: Option<Duration>,
    /// File receiving the JSON log.
    pub log_path: PathBuf,
    /// Channel list read by the stdio transport.
    pub channels_path: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            community_names: Vec::new(),
            announcement_names: Vec::new(),
            target_name: DEFAULT_TARGET_NAME.to_string(),
            dedupe_window: Duration::from_secs(10),
            send_delay: Duration::from_millis(20_000),
            pairing_window: Duration::from_millis(20_000),
            price_multiplier: Decimal::from(3),
            noise_phrases: vec!["bom dia".to_string(), "good morning".to_string()],
            group_id_suffix: "@g.us".to_string(),
            dedupe_sweep_interval: Some(Duration::from_secs(300)),
            log_path: PathBuf::from("./wh_relay.log"),
            channels_path: PathBuf::from("./channels.json"),
        }
    }
}

impl RelayConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let community_names = split_list(lookup("SOURCE_COMMUNITY_NAMES").as_deref());

        let mut announcement_names = split_list(lookup("ANNOUNCEMENT_GROUP_NAMES").as_deref());
        if announcement_names.is_empty() {
            announcement_names = split_list(lookup("ANNOUNCEMENT_GROUP_NAME").as_deref());
        }

        let target_name = lookup("TARGET_GROUP_NAME")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.target_name);

        let dedupe_window = Duration::from_secs(parse_or(
            &lookup,
            "DEDUPE_WINDOW_SECONDS",
            defaults.dedupe_window.as_secs(),
        ));
        let send_delay = Duration::from_millis(parse_or(
            &lookup,
            "MEDIA_SEND_DELAY_MS",
            defaults.send_delay.as_millis() as u64,
        ));
        let pairing_window = Duration::from_millis(parse_or(
            &lookup,
            "MEDIA_PAIRING_WINDOW_MS",
            defaults.pairing_window.as_millis() as u64,
        ));

        let price_multiplier = parse_or(
            &lookup,
            "GLOBAL_PRICE_MULTIPLIER",
            defaults.price_multiplier,
        );
        if price_multiplier <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                key: "GLOBAL_PRICE_MULTIPLIER".into(),
                message: format!("must be positive, got {price_multiplier}"),
            });
        }

        let noise_phrases = match lookup("NOISE_PHRASES") {
            Some(raw) => split_list(Some(&raw))
                .into_iter()
                .map(|p| p.to_lowercase())
                .collect(),
            None => defaults.noise_phrases,
        };

        let group_id_suffix = lookup("GROUP_ID_SUFFIX")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.group_id_suffix);

        let sweep_secs: u64 = parse_or(&lookup, "DEDUPE_SWEEP_INTERVAL_SECS", 300);
        let dedupe_sweep_interval = (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs));

        let log_path = lookup("LOG_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.log_path);

        let channels_path = lookup("STDIO_CHANNELS_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.channels_path);

        Ok(Self {
            community_names,
            announcement_names,
            target_name,
            dedupe_window,
            send_delay,
            pairing_window,
            price_multiplier,
            noise_phrases,
            group_id_suffix,
            dedupe_sweep_interval,
            log_path,
            channels_path,
        })
    }

    /// Log the effective configuration.
    pub fn log_summary(&self) {
        tracing::info!(
            communities = %self.community_names.join(", "),
            announcements = %self.announcement_names.join(", "),
            target = %self.target_name,
            dedupe_window_secs = self.dedupe_window.as_secs(),
            send_delay_ms = self.send_delay.as_millis() as u64,
            pairing_window_ms = self.pairing_window.as_millis() as u64,
            price_multiplier = %self.price_multiplier,
            noise_phrases = %self.noise_phrases.join(", "),
            log_path = %self.log_path.display(),
            channels_path = %self.channels_path.display(),
            "Relay configuration loaded"
        );
    }
}

/// Split a comma-separated list, trimming entries and dropping empties.
fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `key`, falling back to `default` when unset or unparseable.
fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) if raw.trim().is_empty() => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "Unparseable value, using default");
            default
        }),
    }
}
