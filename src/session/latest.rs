//! Latest value of every feed, merged last-write-wins

use crate::sensors::{ReadingListener, ReadingUpdate};
use async_trait::async_trait;
use collect_shared::{Acceleration, LocationFix, NetworkUsage, Reading};
use tokio::sync::RwLock;

/// Most recent value received from each feed
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorSnapshot {
    pub acceleration: Acceleration,
    pub location: LocationFix,
    /// `None` until the sensor delivers, or forever if absent
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

impl SensorSnapshot {
    /// Combine with the session's network usage into a row-ready reading
    pub fn to_reading(&self, usage: NetworkUsage) -> Reading {
        Reading::assemble(
            self.location,
            self.acceleration,
            self.temperature,
            self.humidity,
            usage,
        )
    }
}

/// Shared merge point written by the feeds and read by the tick
#[derive(Debug, Default)]
pub struct LatestReading {
    snapshot: RwLock<SensorSnapshot>,
}

impl LatestReading {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> SensorSnapshot {
        *self.snapshot.read().await
    }
}

#[async_trait]
impl ReadingListener for LatestReading {
    async fn on_reading(&self, update: ReadingUpdate) {
        let mut snapshot = self.snapshot.write().await;
        match update {
            ReadingUpdate::Acceleration(a) => snapshot.acceleration = a,
            ReadingUpdate::Temperature(t) => snapshot.temperature = Some(t),
            ReadingUpdate::Humidity(h) => snapshot.humidity = Some(h),
            ReadingUpdate::Location(fix) => snapshot.location = fix,
        }
    }
}
