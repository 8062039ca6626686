//! Formatted view of the current readings

use crate::session::latest::SensorSnapshot;
use collect_shared::NetworkUsage;
use std::fmt;

/// What the presentation layer shows, already formatted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    pub measuring: bool,
    pub accelerometer: String,
    pub location: String,
    pub speed: String,
    pub temperature: String,
    pub humidity: String,
    pub network: String,
}

impl DisplayState {
    pub fn new(measuring: bool, snapshot: &SensorSnapshot, usage: NetworkUsage) -> Self {
        let a = snapshot.acceleration;
        let fix = snapshot.location;

        Self {
            measuring,
            accelerometer: format!("{:.2}, {:.2}, {:.2}", a.x, a.y, a.z),
            location: format!("{:.6}, {:.6}", fix.latitude, fix.longitude),
            speed: format!("{:.2}", fix.speed),
            temperature: match snapshot.temperature {
                Some(t) => format!("Temperature: {:.1} °C", t),
                None => "Temperature: N/A °C".into(),
            },
            humidity: match snapshot.humidity {
                Some(h) => format!("Humidity: {:.1} %", h),
                None => "Humidity: N/A %".into(),
            },
            network: format_usage(usage),
        }
    }

    /// Screen shown before anything was measured
    pub fn idle() -> Self {
        Self::new(false, &SensorSnapshot::default(), NetworkUsage::default())
    }

    /// Label of the start/stop control
    pub fn control_label(&self) -> &'static str {
        if self.measuring {
            "Stop measuring"
        } else {
            "Start measuring"
        }
    }
}

impl Default for DisplayState {
    fn default() -> Self {
        Self::idle()
    }
}

impl fmt::Display for DisplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accel [{}] location [{}] speed {} | {} | {} | {} | {}",
            self.accelerometer,
            self.location,
            self.speed,
            self.temperature,
            self.humidity,
            self.network,
            self.control_label()
        )
    }
}

fn format_usage(usage: NetworkUsage) -> String {
    format!(
        "Download: {:.2} MB, Upload: {:.2} MB",
        usage.rx_megabytes, usage.tx_megabytes
    )
}
