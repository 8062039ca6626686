//! Linux Industrial I/O sensor provider
//!
//! Polls IIO channels exposed in sysfs:
//! - accelerometer: `in_accel_{x,y,z}_raw` multiplied by `in_accel_scale` (m/s²)
//! - temperature: `in_temp_input` in milli-degrees Celsius
//! - humidity: `in_humidityrelative_input` in milli-percent

use crate::sensors::registry::ListenerRegistry;
use crate::sensors::traits::{ReadingListener, ReadingUpdate, SamplingRate, SensorKind, SensorProvider};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use collect_shared::Acceleration;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Default sysfs location of IIO devices
pub const DEFAULT_IIO_ROOT: &str = "/sys/bus/iio/devices";

#[derive(Debug, Clone, PartialEq)]
enum IioChannel {
    Accelerometer { device: PathBuf, scale: f64 },
    Temperature { path: PathBuf },
    Humidity { path: PathBuf },
}

/// Sensor provider backed by sysfs IIO devices
pub struct IioSensorProvider {
    root: PathBuf,
    registry: ListenerRegistry,
}

impl IioSensorProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            registry: ListenerRegistry::new(),
        }
    }

    /// Number of channels currently being polled
    pub fn registered(&self) -> usize {
        self.registry.active()
    }

    async fn devices(&self) -> Vec<PathBuf> {
        let Ok(mut entries) = tokio::fs::read_dir(&self.root).await else {
            return Vec::new();
        };

        let mut devices = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with("iio:device") {
                devices.push(entry.path());
            }
        }
        devices.sort();
        devices
    }

    async fn find_channel(&self, kind: SensorKind) -> Option<IioChannel> {
        for device in self.devices().await {
            let channel = match kind {
                SensorKind::Accelerometer => accelerometer_channel(device).await,
                SensorKind::AmbientTemperature => {
                    let path = device.join("in_temp_input");
                    is_file(&path).await.then_some(IioChannel::Temperature { path })
                }
                SensorKind::RelativeHumidity => {
                    let path = device.join("in_humidityrelative_input");
                    is_file(&path).await.then_some(IioChannel::Humidity { path })
                }
            };
            if channel.is_some() {
                return channel;
            }
        }
        None
    }
}

async fn accelerometer_channel(device: PathBuf) -> Option<IioChannel> {
    for axis in ["x", "y", "z"] {
        if !is_file(&device.join(format!("in_accel_{}_raw", axis))).await {
            return None;
        }
    }
    let scale = tokio::fs::read_to_string(device.join("in_accel_scale"))
        .await
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(1.0);
    Some(IioChannel::Accelerometer { device, scale })
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[async_trait]
impl SensorProvider for IioSensorProvider {
    fn name(&self) -> &'static str {
        "IIO"
    }

    async fn has_sensor(&self, kind: SensorKind) -> bool {
        self.find_channel(kind).await.is_some()
    }

    async fn register(
        &self,
        kind: SensorKind,
        rate: SamplingRate,
        listener: Arc<dyn ReadingListener>,
    ) -> Result<()> {
        let channel = self
            .find_channel(kind)
            .await
            .ok_or_else(|| anyhow!("No {} channel under {}", kind, self.root.display()))?;
        info!("[SENSORS] Polling {} every {:?}", kind, rate.interval());

        let task = tokio::spawn(async move {
            let mut ticker = interval(rate.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match read_channel(&channel).await {
                    Ok(update) => listener.on_reading(update).await,
                    Err(e) => debug!("[SENSORS] {} read failed: {:#}", kind, e),
                }
            }
        });
        self.registry.track(task);

        Ok(())
    }

    async fn unregister(&self) {
        let removed = self.registry.abort_all();
        debug!("[SENSORS] Removed {} IIO registrations", removed);
    }
}

async fn read_channel(channel: &IioChannel) -> Result<ReadingUpdate> {
    match channel {
        IioChannel::Accelerometer { device, scale } => {
            let x = read_value(&device.join("in_accel_x_raw")).await?;
            let y = read_value(&device.join("in_accel_y_raw")).await?;
            let z = read_value(&device.join("in_accel_z_raw")).await?;
            Ok(ReadingUpdate::Acceleration(Acceleration::new(
                x * scale,
                y * scale,
                z * scale,
            )))
        }
        IioChannel::Temperature { path } => {
            Ok(ReadingUpdate::Temperature(read_value(path).await? / 1000.0))
        }
        IioChannel::Humidity { path } => {
            Ok(ReadingUpdate::Humidity(read_value(path).await? / 1000.0))
        }
    }
}

async fn read_value(path: &Path) -> Result<f64> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    raw.trim()
        .parse()
        .with_context(|| format!("parsing {:?} from {}", raw.trim(), path.display()))
}
