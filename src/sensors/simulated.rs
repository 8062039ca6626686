//! Simulated sensor and location feeds (for development hosts without hardware)

use crate::sensors::filter::LocationFilter;
use crate::sensors::registry::ListenerRegistry;
use crate::sensors::traits::{
    LocationProvider, LocationRequest, ReadingListener, ReadingUpdate, SamplingRate, SensorKind,
    SensorProvider,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use collect_shared::{Acceleration, LocationFix};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

const GRAVITY: f64 = 9.81;
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Synthetic accelerometer/temperature/humidity feed
pub struct SimulatedSensorProvider {
    available: HashSet<SensorKind>,
    registry: ListenerRegistry,
}

impl SimulatedSensorProvider {
    /// Provider exposing every sensor kind
    pub fn new() -> Self {
        Self::with_sensors([
            SensorKind::Accelerometer,
            SensorKind::AmbientTemperature,
            SensorKind::RelativeHumidity,
        ])
    }

    /// Provider exposing only the given sensor kinds
    pub fn with_sensors(kinds: impl IntoIterator<Item = SensorKind>) -> Self {
        Self {
            available: kinds.into_iter().collect(),
            registry: ListenerRegistry::new(),
        }
    }

    pub fn registered(&self) -> usize {
        self.registry.active()
    }
}

impl Default for SimulatedSensorProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Value of `kind` at `t` seconds into the simulation
fn synthesize(kind: SensorKind, t: f64) -> ReadingUpdate {
    let mut rng = rand::thread_rng();
    match kind {
        SensorKind::Accelerometer => ReadingUpdate::Acceleration(Acceleration::new(
            0.4 * (t * 0.7).sin() + rng.gen_range(-0.05..0.05),
            0.3 * (t * 0.3).cos() + rng.gen_range(-0.05..0.05),
            GRAVITY + rng.gen_range(-0.05..0.05),
        )),
        SensorKind::AmbientTemperature => {
            ReadingUpdate::Temperature(21.5 + 0.5 * (t / 60.0).sin() + rng.gen_range(-0.05..0.05))
        }
        SensorKind::RelativeHumidity => {
            ReadingUpdate::Humidity(45.0 + 2.0 * (t / 90.0).cos() + rng.gen_range(-0.2..0.2))
        }
    }
}

#[async_trait]
impl SensorProvider for SimulatedSensorProvider {
    fn name(&self) -> &'static str {
        "Simulated"
    }

    async fn has_sensor(&self, kind: SensorKind) -> bool {
        self.available.contains(&kind)
    }

    async fn register(
        &self,
        kind: SensorKind,
        rate: SamplingRate,
        listener: Arc<dyn ReadingListener>,
    ) -> Result<()> {
        if !self.has_sensor(kind).await {
            return Err(anyhow!("Simulated {} is disabled", kind));
        }

        let task = tokio::spawn(async move {
            let start = Instant::now();
            let mut ticker = interval(rate.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let update = synthesize(kind, start.elapsed().as_secs_f64());
                listener.on_reading(update).await;
            }
        });
        self.registry.track(task);

        Ok(())
    }

    async fn unregister(&self) {
        let removed = self.registry.abort_all();
        debug!("[SENSORS] Removed {} simulated registrations", removed);
    }
}

/// Synthetic vehicle driving east at a varying speed
pub struct SimulatedLocationProvider {
    origin: LocationFix,
    registry: ListenerRegistry,
}

impl SimulatedLocationProvider {
    pub fn new(origin: LocationFix) -> Self {
        Self {
            origin,
            registry: ListenerRegistry::new(),
        }
    }

    pub fn active_streams(&self) -> usize {
        self.registry.active()
    }
}

impl Default for SimulatedLocationProvider {
    fn default() -> Self {
        Self::new(LocationFix::new(48.856613, 2.352222, 0.0))
    }
}

#[async_trait]
impl LocationProvider for SimulatedLocationProvider {
    fn name(&self) -> &'static str {
        "Simulated"
    }

    async fn request_updates(
        &self,
        request: LocationRequest,
        listener: Arc<dyn ReadingListener>,
    ) -> Result<()> {
        let origin = self.origin;
        let period = request.min_interval.max(SamplingRate::Normal.interval());

        let task = tokio::spawn(async move {
            let mut filter = LocationFilter::new(request);
            let mut ticker = interval(period);
            let mut position = origin;
            let mut last = Instant::now();

            loop {
                ticker.tick().await;
                let now = Instant::now();
                let dt = now.duration_since(last).as_secs_f64();
                last = now;

                let jitter = rand::thread_rng().gen_range(-0.8..1.0);
                position.speed = (position.speed + jitter).clamp(0.0, 25.0);
                position.longitude += position.speed * dt
                    / (METERS_PER_DEGREE * position.latitude.to_radians().cos());

                if filter.accept(now, position) {
                    listener.on_reading(ReadingUpdate::Location(position)).await;
                }
            }
        });
        self.registry.track(task);

        Ok(())
    }

    async fn remove_updates(&self) {
        let removed = self.registry.abort_all();
        debug!("[SENSORS] Removed {} simulated location streams", removed);
    }
}
