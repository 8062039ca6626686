//! Platform adapters for sensors, location and network counters
//!
//! The sampling loop only sees these traits. Adapters feed values through
//! [`ReadingListener`] and are registered/unregistered per measurement
//! session.

pub mod filter;
pub mod gpsd;
pub mod iio;
pub mod registry;
pub mod simulated;
pub mod traffic;
pub mod traits;

pub use gpsd::{GpsdLocationProvider, DEFAULT_GPSD_ADDRESS};
pub use iio::{IioSensorProvider, DEFAULT_IIO_ROOT};
pub use simulated::{SimulatedLocationProvider, SimulatedSensorProvider};
pub use traffic::SystemByteCounters;
pub use traits::{
    ByteCounters, LocationProvider, LocationRequest, ReadingListener, ReadingUpdate, SamplingRate,
    SensorKind, SensorProvider,
};
