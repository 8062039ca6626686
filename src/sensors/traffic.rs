//! Cumulative network byte counters from the operating system

use crate::sensors::traits::ByteCounters;
use anyhow::Result;
use collect_shared::ByteTotals;
use sysinfo::Networks;

const LOOPBACK_PREFIX: &str = "lo";

/// Byte counters summed over every non-loopback interface
pub struct SystemByteCounters {
    networks: Networks,
}

impl SystemByteCounters {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SystemByteCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteCounters for SystemByteCounters {
    fn totals(&mut self) -> Result<ByteTotals> {
        self.networks.refresh();

        let totals = self
            .networks
            .iter()
            .filter(|(name, _)| !is_loopback(name))
            .fold(ByteTotals::default(), |acc, (_, data)| {
                ByteTotals::new(
                    acc.rx_bytes + data.total_received(),
                    acc.tx_bytes + data.total_transmitted(),
                )
            });

        Ok(totals)
    }
}

fn is_loopback(interface: &str) -> bool {
    interface == LOOPBACK_PREFIX || interface.starts_with("lo0") || interface.starts_with("lo:")
}
