//! Channel Relay: forwards announcement-channel posts to one destination
//! channel, rewriting prices on the way.

pub mod channels;
pub mod config;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod relay;
