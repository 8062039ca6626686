//! Connectivity check
//!
//! Classifies the active network path and decides whether it is usable
//! (Wi-Fi or cellular) for publishing status messages.

mod probe;
mod sysfs;

pub use probe::{Connectivity, ConnectivityConfig, NetworkTransport};
pub use sysfs::SysfsNetworkProbe;

#[cfg(test)]
pub(crate) use probe::test_support;
