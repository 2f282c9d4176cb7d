//! Relay pipeline.
//!
//! Every inbound message from a source channel flows through:
//! 1. `NoiseFilter::evaluate()`: greeting noise
//! 2. `DedupLedger::check_and_record()`: re-deliveries
//! 3. `TextTransformer::transform()`: price rewriting
//! 4. `PairingCoordinator`: caption-less media waits for its text
//! 5. `Dispatcher`: sends to the destination through the transport

pub mod dedup;
pub mod dispatcher;
pub mod pairing;
pub mod rules;
pub mod transform;
pub mod types;
