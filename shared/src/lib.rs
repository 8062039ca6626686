//! Collect Shared Types
//!
//! This crate provides the hardware-independent data model, the CSV row
//! codec and the session state machines used by the collection agent, plus
//! the offline ride analysis that runs over recorded session files.

pub mod analysis;
pub mod codec;
pub mod state_machine;

use serde::{Deserialize, Serialize};

/// Sampling parameters for a measurement session
pub mod sampling {
    /// Period of the sampling tick in milliseconds
    pub const TICK_INTERVAL_MS: u64 = 500;

    /// Minimum interval between two location updates
    pub const LOCATION_MIN_INTERVAL_MS: u64 = 1000;

    /// Minimum displacement between two location updates
    pub const LOCATION_MIN_DISTANCE_M: f64 = 0.0;

    /// Interval hinted by the "normal" sensor sampling rate
    pub const SENSOR_DELAY_NORMAL_MS: u64 = 200;

    /// Bytes per megabyte used for the network usage display
    pub const BYTES_PER_MEGABYTE: f64 = 1_048_576.0;
}

/// Accelerometer sample in m/s²
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Acceleration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Acceleration {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Position and ground speed reported by the location provider
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Ground speed in m/s
    pub speed: f64,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64, speed: f64) -> Self {
        Self {
            latitude,
            longitude,
            speed,
        }
    }
}

/// Cumulative byte counters across all non-loopback interfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteTotals {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl ByteTotals {
    pub fn new(rx_bytes: u64, tx_bytes: u64) -> Self {
        Self { rx_bytes, tx_bytes }
    }

    /// Usage accumulated since `baseline`.
    ///
    /// Counters that went backwards (interface removed, counter reset)
    /// report zero rather than wrapping.
    pub fn usage_since(&self, baseline: &ByteTotals) -> NetworkUsage {
        NetworkUsage::from_bytes(
            self.rx_bytes.saturating_sub(baseline.rx_bytes),
            self.tx_bytes.saturating_sub(baseline.tx_bytes),
        )
    }
}

/// Network traffic since the start of a measurement session, in megabytes
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkUsage {
    pub rx_megabytes: f64,
    pub tx_megabytes: f64,
}

impl NetworkUsage {
    pub fn from_bytes(rx_bytes: u64, tx_bytes: u64) -> Self {
        Self {
            rx_megabytes: rx_bytes as f64 / sampling::BYTES_PER_MEGABYTE,
            tx_megabytes: tx_bytes as f64 / sampling::BYTES_PER_MEGABYTE,
        }
    }
}

/// Point-in-time snapshot merged from the latest value of every source
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Reading {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    /// Megabytes received since the session baseline
    pub rx_bytes_delta: f64,
    /// Megabytes transmitted since the session baseline
    pub tx_bytes_delta: f64,
}

impl Reading {
    /// Assemble a reading from the latest value of each source
    pub fn assemble(
        location: LocationFix,
        acceleration: Acceleration,
        temperature: Option<f64>,
        humidity: Option<f64>,
        usage: NetworkUsage,
    ) -> Self {
        Self {
            latitude: location.latitude,
            longitude: location.longitude,
            speed: location.speed,
            accel_x: acceleration.x,
            accel_y: acceleration.y,
            accel_z: acceleration.z,
            temperature,
            humidity,
            rx_bytes_delta: usage.rx_megabytes,
            tx_bytes_delta: usage.tx_megabytes,
        }
    }
}
