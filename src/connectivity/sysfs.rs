//! Linux network path probe
//!
//! The active path is the interface carrying the default route with the
//! lowest metric in `/proc/net/route`; its transport is read from
//! `/sys/class/net/<iface>`.

use crate::connectivity::probe::{NetworkPathProbe, NetworkTransport};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

const RTF_UP: u16 = 0x0001;
const DEFAULT_DESTINATION: &str = "00000000";

// ARPHRD_* link types from if_arp.h
const ARPHRD_ETHER: u16 = 1;
const ARPHRD_PPP: u16 = 512;
const ARPHRD_RAWIP: u16 = 519;
const ARPHRD_LOOPBACK: u16 = 772;
const ARPHRD_NONE: u16 = 65534;

/// Probe backed by procfs and sysfs
#[derive(Debug, Clone)]
pub struct SysfsNetworkProbe {
    proc_root: PathBuf,
    sys_root: PathBuf,
}

impl Default for SysfsNetworkProbe {
    fn default() -> Self {
        Self::new("/proc", "/sys")
    }
}

impl SysfsNetworkProbe {
    pub fn new(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
        }
    }

    /// Interface of the preferred default route, if any
    async fn default_route_interface(&self) -> Result<Option<String>> {
        let path = self.proc_root.join("net/route");
        let table = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;

        let best = table
            .lines()
            .skip(1)
            .filter_map(|line| {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() < 7 || fields[1] != DEFAULT_DESTINATION {
                    return None;
                }
                let flags = u16::from_str_radix(fields[3], 16).ok()?;
                if flags & RTF_UP == 0 {
                    return None;
                }
                let metric: u32 = fields[6].parse().ok()?;
                Some((metric, fields[0].to_string()))
            })
            .min_by_key(|(metric, _)| *metric)
            .map(|(_, iface)| iface);

        Ok(best)
    }

    async fn classify(&self, iface: &str) -> Option<NetworkTransport> {
        let dir = self.sys_root.join("class/net").join(iface);
        if !exists(&dir).await {
            return None;
        }

        if matches!(
            read_attribute(&dir, "operstate").await.as_str(),
            "down" | "dormant" | "notpresent" | "lowerlayerdown"
        ) {
            return None;
        }

        if exists(&dir.join("wireless")).await || exists(&dir.join("phy80211")).await {
            return Some(NetworkTransport::Wifi);
        }

        let uevent = read_attribute(&dir, "uevent").await;
        let devtype = uevent
            .lines()
            .find_map(|line| line.strip_prefix("DEVTYPE="))
            .unwrap_or_default();
        match devtype {
            "wlan" => return Some(NetworkTransport::Wifi),
            "wwan" => return Some(NetworkTransport::Cellular),
            "bluetooth" => return Some(NetworkTransport::Bluetooth),
            _ => {}
        }

        let transport = match read_attribute(&dir, "type").await.parse::<u16>() {
            Ok(ARPHRD_ETHER) => NetworkTransport::Ethernet,
            Ok(ARPHRD_PPP | ARPHRD_RAWIP) => NetworkTransport::Cellular,
            Ok(ARPHRD_LOOPBACK) => NetworkTransport::Loopback,
            Ok(ARPHRD_NONE) => NetworkTransport::Vpn,
            _ => NetworkTransport::Other,
        };
        Some(transport)
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Trimmed sysfs attribute, empty when unreadable
async fn read_attribute(dir: &Path, name: &str) -> String {
    tokio::fs::read_to_string(dir.join(name))
        .await
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl NetworkPathProbe for SysfsNetworkProbe {
    async fn active_transports(&self) -> Result<Option<Vec<NetworkTransport>>> {
        let Some(iface) = self.default_route_interface().await? else {
            return Ok(None);
        };
        Ok(self.classify(&iface).await.map(|t| vec![t]))
    }
}
