//! Channel resolution: decides which channels are sources and which one is
//! the destination.
//!
//! Sources are always announcement-style channels. When the operator names
//! communities or announcement channels, a candidate is accepted if its
//! normalized name equals or contains one of them (announcement names always
//! include the locale synonyms). With no names configured every
//! announcement channel is monitored.

use tracing::{debug, info, warn};

use crate::channels::Channel;
use crate::config::RelayConfig;
use crate::error::ConfigError;
use crate::normalize::normalize;

/// Announcement synonyms always accepted alongside configured names.
const ANNOUNCEMENT_SYNONYMS: &[&str] = &["avisos", "anuncios", "announcements"];

/// How the source set was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Candidates matched configured names.
    Filtered,
    /// No names configured; every announcement channel is a source.
    BroadMonitor,
}

/// Result of a resolution pass. Immutable for the session.
#[derive(Debug, Clone)]
pub struct ResolvedChannels {
    pub sources: Vec<Channel>,
    pub destination: Channel,
    pub mode: MatchMode,
}

impl ResolvedChannels {
    pub fn is_source(&self, channel_id: &str) -> bool {
        self.sources.iter().any(|c| c.id == channel_id)
    }

    /// Display name of a source channel.
    pub fn source_name(&self, channel_id: &str) -> Option<&str> {
        self.sources
            .iter()
            .find(|c| c.id == channel_id)
            .map(|c| c.display_name.as_str())
    }
}

/// Name filters for one resolution.
#[derive(Debug, Clone)]
pub struct ChannelResolver {
    community_names: Vec<String>,
    announcement_names: Vec<String>,
    target_name: String,
}

impl ChannelResolver {
    pub fn new(
        community_names: Vec<String>,
        announcement_names: Vec<String>,
        target_name: impl Into<String>,
    ) -> Self {
        Self {
            community_names,
            announcement_names,
            target_name: target_name.into(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            config.community_names.clone(),
            config.announcement_names.clone(),
            config.target_name.clone(),
        )
    }

    fn has_filters(&self) -> bool {
        !self.community_names.is_empty() || !self.announcement_names.is_empty()
    }

    /// Classify `channels` into sources and destination.
    pub fn resolve(&self, channels: &[Channel]) -> Result<ResolvedChannels, ConfigError> {
        debug!(
            names = %channels.iter().map(|c| c.display_name.as_str()).collect::<Vec<_>>().join(", "),
            "Channels available"
        );

        let announced: Vec<&Channel> = channels.iter().filter(|c| c.is_broadcast_enabled).collect();
        info!(
            announced = %announced.iter().map(|c| c.display_name.as_str()).collect::<Vec<_>>().join(", "),
            "Announcement channels found"
        );

        let (sources, mode): (Vec<Channel>, MatchMode) = if self.has_filters() {
            let community: Vec<String> = self.community_names.iter().map(|n| normalize(n)).collect();
            let mut announcement: Vec<String> =
                self.announcement_names.iter().map(|n| normalize(n)).collect();
            announcement.extend(ANNOUNCEMENT_SYNONYMS.iter().map(|s| s.to_string()));
            announcement.retain(|n| !n.is_empty());

            let accepted = announced
                .iter()
                .filter(|c| {
                    let name = normalize(&c.display_name);
                    let matches_community = community.iter().any(|w| name_matches(&name, w));
                    let matches_announcement = announcement.iter().any(|w| name_matches(&name, w));
                    debug!(
                        name = %c.display_name,
                        matches_community,
                        matches_announcement,
                        "Announcement channel match"
                    );
                    matches_community || matches_announcement
                })
                .map(|c| (*c).clone())
                .collect();
            (accepted, MatchMode::Filtered)
        } else {
            warn!("No channel name filters configured, monitoring every announcement channel");
            (
                announced.iter().map(|c| (*c).clone()).collect(),
                MatchMode::BroadMonitor,
            )
        };

        if sources.is_empty() {
            return Err(ConfigError::NoSourceChannels {
                announced: announced.iter().map(|c| c.display_name.clone()).collect(),
                community_filters: self.community_names.clone(),
                announcement_filters: self.announcement_names.clone(),
            });
        }

        let destination = channels
            .iter()
            .find(|c| c.display_name == self.target_name)
            .cloned()
            .ok_or_else(|| ConfigError::DestinationNotFound {
                name: self.target_name.clone(),
                available: channels.iter().map(|c| c.display_name.clone()).collect(),
            })?;

        info!(
            sources = %sources.iter().map(|c| c.display_name.as_str()).collect::<Vec<_>>().join(", "),
            destination = %destination.display_name,
            destination_id = %destination.id,
            mode = ?mode,
            "Channels resolved"
        );

        Ok(ResolvedChannels {
            sources,
            destination,
            mode,
        })
    }
}

fn name_matches(name: &str, wanted: &str) -> bool {
    !wanted.is_empty() && (name == wanted || name.contains(wanted))
}
