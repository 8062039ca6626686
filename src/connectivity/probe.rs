//! Network path probing and the usable-network decision

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Transport capability exposed by a network path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkTransport {
    Wifi,
    Cellular,
    Ethernet,
    Bluetooth,
    Vpn,
    Loopback,
    Other,
}

impl std::fmt::Display for NetworkTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkTransport::Wifi => write!(f, "Wi-Fi"),
            NetworkTransport::Cellular => write!(f, "Cellular"),
            NetworkTransport::Ethernet => write!(f, "Ethernet"),
            NetworkTransport::Bluetooth => write!(f, "Bluetooth"),
            NetworkTransport::Vpn => write!(f, "VPN"),
            NetworkTransport::Loopback => write!(f, "Loopback"),
            NetworkTransport::Other => write!(f, "Other"),
        }
    }
}

/// Inspects the platform's currently active network path
#[async_trait]
pub trait NetworkPathProbe: Send + Sync {
    /// Transports of the active path, `None` when there is no active path
    async fn active_transports(&self) -> Result<Option<Vec<NetworkTransport>>>;
}

/// Configuration for the connectivity check
#[derive(Debug, Clone, Default)]
pub struct ConnectivityConfig {
    /// Also treat a wired path as usable
    pub allow_ethernet: bool,
}

/// Decides whether the active network is usable for publishing
#[derive(Clone)]
pub struct Connectivity {
    probe: Arc<dyn NetworkPathProbe>,
    usable: Vec<NetworkTransport>,
}

impl Connectivity {
    /// Wi-Fi and cellular paths are usable
    pub fn new(probe: Arc<dyn NetworkPathProbe>) -> Self {
        Self::with_config(probe, &ConnectivityConfig::default())
    }

    pub fn with_config(probe: Arc<dyn NetworkPathProbe>, config: &ConnectivityConfig) -> Self {
        let mut usable = vec![NetworkTransport::Wifi, NetworkTransport::Cellular];
        if config.allow_ethernet {
            usable.push(NetworkTransport::Ethernet);
        }
        Self { probe, usable }
    }

    /// True iff the active path exposes a usable transport.
    ///
    /// Probe errors count as "unavailable".
    pub async fn is_network_available(&self) -> bool {
        match self.probe.active_transports().await {
            Ok(Some(transports)) => transports.iter().any(|t| self.usable.contains(t)),
            Ok(None) => false,
            Err(e) => {
                debug!("[NET] Network probe failed: {:#}", e);
                false
            }
        }
    }
}
