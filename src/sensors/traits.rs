//! Platform adapter traits for sensor, location and byte-counter feeds

use anyhow::Result;
use async_trait::async_trait;
use collect_shared::{sampling, Acceleration, ByteTotals, LocationFix};
use std::sync::Arc;
use std::time::Duration;

/// A value delivered by a sensor or location feed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadingUpdate {
    Acceleration(Acceleration),
    /// Ambient temperature in °C
    Temperature(f64),
    /// Relative humidity in %
    Humidity(f64),
    Location(LocationFix),
}

/// Receives every update produced by a registered feed
#[async_trait]
pub trait ReadingListener: Send + Sync {
    async fn on_reading(&self, update: ReadingUpdate);
}

/// Sensor types the agent listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Accelerometer,
    AmbientTemperature,
    RelativeHumidity,
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorKind::Accelerometer => write!(f, "accelerometer"),
            SensorKind::AmbientTemperature => write!(f, "ambient temperature"),
            SensorKind::RelativeHumidity => write!(f, "relative humidity"),
        }
    }
}

/// Requested sensor delivery rate.
///
/// This is a declared intent passed to the provider, not an interval
/// contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingRate {
    Fastest,
    Game,
    Ui,
    #[default]
    Normal,
}

impl SamplingRate {
    /// Polling interval hint for providers that have to poll
    pub fn interval(&self) -> Duration {
        match self {
            SamplingRate::Fastest => Duration::from_millis(10),
            SamplingRate::Game => Duration::from_millis(20),
            SamplingRate::Ui => Duration::from_micros(66_667),
            SamplingRate::Normal => Duration::from_millis(sampling::SENSOR_DELAY_NORMAL_MS),
        }
    }
}

/// Source of accelerometer, temperature and humidity readings
#[async_trait]
pub trait SensorProvider: Send + Sync {
    /// Human-readable name for this provider
    fn name(&self) -> &'static str;

    /// Whether the device exposes this sensor at all
    async fn has_sensor(&self, kind: SensorKind) -> bool;

    /// Start delivering `kind` readings to `listener`
    async fn register(
        &self,
        kind: SensorKind,
        rate: SamplingRate,
        listener: Arc<dyn ReadingListener>,
    ) -> Result<()>;

    /// Remove every registration made on this provider
    async fn unregister(&self);
}

/// Location update request parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationRequest {
    pub min_interval: Duration,
    pub min_distance_m: f64,
}

impl Default for LocationRequest {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(sampling::LOCATION_MIN_INTERVAL_MS),
            min_distance_m: sampling::LOCATION_MIN_DISTANCE_M,
        }
    }
}

/// Source of position and ground speed
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Human-readable name for this provider
    fn name(&self) -> &'static str;

    /// Start delivering location updates to `listener`
    async fn request_updates(
        &self,
        request: LocationRequest,
        listener: Arc<dyn ReadingListener>,
    ) -> Result<()>;

    /// Stop every update stream started on this provider
    async fn remove_updates(&self);
}

/// Cumulative received/transmitted byte counters
pub trait ByteCounters: Send {
    fn totals(&mut self) -> Result<ByteTotals>;
}
