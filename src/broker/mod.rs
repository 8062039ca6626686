//! Broker client
//!
//! Fire-and-forget MQTT publishing of status messages:
//! - One clean session opened at startup, closed at shutdown
//! - QoS 1 (at least once) on a single fixed topic
//! - No retry, no reconnect, no offline queue

mod client;

pub use client::{BrokerClient, BrokerConfig, PublishOutcome};

#[cfg(test)]
pub(crate) use client::test_support;
