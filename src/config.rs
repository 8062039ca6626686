//! Agent configuration

use crate::broker::BrokerConfig;
use crate::connectivity::ConnectivityConfig;
use crate::sensors::{
    GpsdLocationProvider, IioSensorProvider, LocationProvider, SensorProvider,
    SimulatedLocationProvider, SimulatedSensorProvider, DEFAULT_GPSD_ADDRESS, DEFAULT_IIO_ROOT,
};
use crate::session::SessionConfig;
use crate::storage::WriterConfig;
use std::path::PathBuf;
use std::sync::Arc;

/// Where accelerometer, temperature and humidity readings come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorBackend {
    Simulated,
    /// Linux Industrial I/O devices under `root`
    Iio { root: PathBuf },
}

impl SensorBackend {
    pub fn provider(&self) -> Arc<dyn SensorProvider> {
        match self {
            SensorBackend::Simulated => Arc::new(SimulatedSensorProvider::new()),
            SensorBackend::Iio { root } => Arc::new(IioSensorProvider::new(root.clone())),
        }
    }
}

impl Default for SensorBackend {
    fn default() -> Self {
        SensorBackend::Iio {
            root: PathBuf::from(DEFAULT_IIO_ROOT),
        }
    }
}

/// Where position and speed come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationBackend {
    Simulated,
    Gpsd { address: String },
}

impl LocationBackend {
    pub fn provider(&self) -> Arc<dyn LocationProvider> {
        match self {
            LocationBackend::Simulated => Arc::new(SimulatedLocationProvider::default()),
            LocationBackend::Gpsd { address } => Arc::new(GpsdLocationProvider::new(address.clone())),
        }
    }
}

impl Default for LocationBackend {
    fn default() -> Self {
        LocationBackend::Gpsd {
            address: DEFAULT_GPSD_ADDRESS.into(),
        }
    }
}

/// Everything the `run` command needs
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    pub broker: BrokerConfig,
    pub writer: WriterConfig,
    pub session: SessionConfig,
    pub connectivity: ConnectivityConfig,
    pub sensors: SensorBackend,
    pub location: LocationBackend,
    /// Start measuring as soon as the agent is up
    pub autostart: bool,
}
