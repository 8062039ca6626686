//! gpsd location provider
//!
//! Speaks the gpsd JSON protocol over TCP: enables watch mode and turns
//! `TPV` reports carrying a 2D or 3D fix into location updates.

use crate::sensors::filter::LocationFilter;
use crate::sensors::registry::ListenerRegistry;
use crate::sensors::traits::{LocationProvider, LocationRequest, ReadingListener, ReadingUpdate};
use anyhow::{Context, Result};
use async_trait::async_trait;
use collect_shared::LocationFix;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default gpsd address
pub const DEFAULT_GPSD_ADDRESS: &str = "127.0.0.1:2947";

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct GpsdReport {
    class: String,
    #[serde(default)]
    mode: u8,
    lat: Option<f64>,
    lon: Option<f64>,
    speed: Option<f64>,
}

/// Extract a fix from one gpsd report line, if it carries one
pub fn parse_tpv(line: &str) -> Option<LocationFix> {
    let report: GpsdReport = serde_json::from_str(line).ok()?;
    if report.class != "TPV" || report.mode < 2 {
        return None;
    }
    Some(LocationFix::new(
        report.lat?,
        report.lon?,
        report.speed.unwrap_or(0.0),
    ))
}

/// Location provider reading from a gpsd daemon
pub struct GpsdLocationProvider {
    address: String,
    registry: ListenerRegistry,
}

impl GpsdLocationProvider {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            registry: ListenerRegistry::new(),
        }
    }

    /// Number of active update streams
    pub fn active_streams(&self) -> usize {
        self.registry.active()
    }
}

#[async_trait]
impl LocationProvider for GpsdLocationProvider {
    fn name(&self) -> &'static str {
        "gpsd"
    }

    async fn request_updates(
        &self,
        request: LocationRequest,
        listener: Arc<dyn ReadingListener>,
    ) -> Result<()> {
        info!(
            "[GPSD] Watching {} (min interval {:?}, min distance {} m)",
            self.address, request.min_interval, request.min_distance_m
        );
        let address = self.address.clone();
        self.registry.track(tokio::spawn(async move {
            watch_loop(address, request, listener).await;
        }));
        Ok(())
    }

    async fn remove_updates(&self) {
        let removed = self.registry.abort_all();
        debug!("[GPSD] Removed {} update streams", removed);
    }
}

/// Keep a watch session open, reconnecting while updates are requested
async fn watch_loop(address: String, request: LocationRequest, listener: Arc<dyn ReadingListener>) {
    let mut filter = LocationFilter::new(request);

    loop {
        match stream_reports(&address, &mut filter, &listener).await {
            Ok(()) => warn!("[GPSD] {} closed the connection", address),
            Err(e) => warn!("[GPSD] {:#}", e),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn stream_reports(
    address: &str,
    filter: &mut LocationFilter,
    listener: &Arc<dyn ReadingListener>,
) -> Result<()> {
    let mut stream = TcpStream::connect(address)
        .await
        .with_context(|| format!("connecting to gpsd at {}", address))?;
    stream.write_all(WATCH_COMMAND).await?;

    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(fix) = parse_tpv(&line) {
            if filter.accept(Instant::now(), fix) {
                listener.on_reading(ReadingUpdate::Location(fix)).await;
            }
        }
    }

    Ok(())
}
