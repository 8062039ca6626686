//! Measurement session
//!
//! Owns the feed registrations and the periodic tick while measuring.
//! Each tick computes network usage against the baseline taken at start,
//! refreshes the display and hands the merged reading to the file writer.

use crate::sensors::{
    ByteCounters, LocationProvider, LocationRequest, ReadingListener, SamplingRate, SensorKind,
    SensorProvider,
};
use crate::session::display::DisplayState;
use crate::session::latest::LatestReading;
use crate::session::timer::PeriodicTimer;
use crate::storage::FileWriter;
use anyhow::Result;
use collect_shared::state_machine::{
    MeasurementState, MeasurementStateMachine, SessionEvent, TransitionResult,
};
use collect_shared::{sampling, ByteTotals, NetworkUsage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, trace, warn};

/// Sampling parameters of a measurement session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Period of the sampling tick
    pub tick_interval: Duration,
    /// Rate requested from every sensor registration
    pub sensor_rate: SamplingRate,
    /// Location update request
    pub location_request: LocationRequest,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(sampling::TICK_INTERVAL_MS),
            sensor_rate: SamplingRate::Normal,
            location_request: LocationRequest::default(),
        }
    }
}

/// Network usage relative to the baseline taken when measuring starts
struct UsageMeter {
    counters: Box<dyn ByteCounters>,
    baseline: Option<ByteTotals>,
    last: NetworkUsage,
}

impl UsageMeter {
    fn begin(&mut self) {
        self.last = NetworkUsage::default();
        self.baseline = match self.counters.totals() {
            Ok(totals) => {
                debug!(
                    "[SESSION] Byte baseline rx={} tx={}",
                    totals.rx_bytes, totals.tx_bytes
                );
                Some(totals)
            }
            Err(e) => {
                warn!("[SESSION] Failed to read byte counters: {:#}", e);
                None
            }
        };
    }

    /// Falls back to the previous value when the counters cannot be read
    fn usage(&mut self) -> NetworkUsage {
        let totals = match self.counters.totals() {
            Ok(totals) => totals,
            Err(e) => {
                warn!("[SESSION] Failed to read byte counters: {:#}", e);
                return self.last;
            }
        };

        let baseline = *self.baseline.get_or_insert(totals);
        self.last = totals.usage_since(&baseline);
        self.last
    }
}

/// State shared between the session and its tick task
struct TickContext {
    meter: Mutex<UsageMeter>,
    latest: Arc<LatestReading>,
    writer: Arc<FileWriter>,
    display: watch::Sender<DisplayState>,
    rows_recorded: AtomicU64,
}

impl TickContext {
    async fn tick(&self) {
        let usage = self.meter.lock().await.usage();
        let snapshot = self.latest.snapshot().await;

        self.display
            .send_replace(DisplayState::new(true, &snapshot, usage));

        let record = self.writer.append_reading(&snapshot.to_reading(usage)).await;
        if record.recorded {
            self.rows_recorded.fetch_add(1, Ordering::Relaxed);
        }
        trace!("[SESSION] Tick: {:?}", record);
    }
}

/// A start/stop measuring span and everything it owns while active
pub struct MeasurementSession {
    config: SessionConfig,
    fsm: MeasurementStateMachine,
    sensors: Arc<dyn SensorProvider>,
    location: Arc<dyn LocationProvider>,
    context: Arc<TickContext>,
    timer: Option<PeriodicTimer>,
}

impl MeasurementSession {
    pub fn new(
        config: SessionConfig,
        sensors: Arc<dyn SensorProvider>,
        location: Arc<dyn LocationProvider>,
        counters: Box<dyn ByteCounters>,
        writer: Arc<FileWriter>,
    ) -> Self {
        let (display, _) = watch::channel(DisplayState::idle());
        let context = TickContext {
            meter: Mutex::new(UsageMeter {
                counters,
                baseline: None,
                last: NetworkUsage::default(),
            }),
            latest: Arc::new(LatestReading::new()),
            writer,
            display,
            rows_recorded: AtomicU64::new(0),
        };

        Self {
            config,
            fsm: MeasurementStateMachine::new(),
            sensors,
            location,
            context: Arc::new(context),
            timer: None,
        }
    }

    pub fn state(&self) -> MeasurementState {
        self.fsm.state()
    }

    /// Display updates, starting with the current screen
    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.context.display.subscribe()
    }

    /// Rows appended to the session file since creation
    pub fn rows_recorded(&self) -> u64 {
        self.context.rows_recorded.load(Ordering::Relaxed)
    }

    pub async fn start(&mut self) -> TransitionResult {
        self.handle(SessionEvent::Start).await
    }

    pub async fn stop(&mut self) -> TransitionResult {
        self.handle(SessionEvent::Stop).await
    }

    /// The start/stop control
    pub async fn toggle(&mut self) -> TransitionResult {
        self.handle(SessionEvent::Toggle).await
    }

    async fn handle(&mut self, event: SessionEvent) -> TransitionResult {
        let result = self.fsm.process_event(event);
        match &result {
            TransitionResult::Started => self.begin().await,
            TransitionResult::Stopped => self.end().await,
            TransitionResult::Invalid { from, event } => {
                debug!("[SESSION] Ignoring {:?} while {:?}", event, from);
            }
        }
        result
    }

    async fn begin(&mut self) {
        let listener: Arc<dyn ReadingListener> = self.context.latest.clone();

        if !self.sensors.has_sensor(SensorKind::Accelerometer).await {
            warn!("[SENSORS] No accelerometer on {} provider", self.sensors.name());
        }
        for kind in [
            SensorKind::Accelerometer,
            SensorKind::AmbientTemperature,
            SensorKind::RelativeHumidity,
        ] {
            if let Err(e) = self.register_sensor(kind, listener.clone()).await {
                warn!("[SENSORS] Failed to register {}: {:#}", kind, e);
            }
        }

        if let Err(e) = self
            .location
            .request_updates(self.config.location_request, listener)
            .await
        {
            warn!(
                "[SENSORS] Failed to request {} location updates: {:#}",
                self.location.name(),
                e
            );
        }

        self.context.meter.lock().await.begin();
        let snapshot = self.context.latest.snapshot().await;
        self.context
            .display
            .send_replace(DisplayState::new(true, &snapshot, NetworkUsage::default()));

        let context = self.context.clone();
        self.timer = Some(PeriodicTimer::start(self.config.tick_interval, move || {
            let context = context.clone();
            async move { context.tick().await }
        }));

        info!(
            "[SESSION] Measuring started (session #{}, tick {:?})",
            self.fsm.sessions_started(),
            self.config.tick_interval
        );
    }

    /// Absent optional sensors are skipped silently and show as N/A
    async fn register_sensor(&self, kind: SensorKind, listener: Arc<dyn ReadingListener>) -> Result<()> {
        if !self.sensors.has_sensor(kind).await {
            debug!("[SENSORS] {} not available", kind);
            return Ok(());
        }
        self.sensors
            .register(kind, self.config.sensor_rate, listener)
            .await
    }

    async fn end(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel().await;
        }
        self.sensors.unregister().await;
        self.location.remove_updates().await;

        self.context.display.send_modify(|display| display.measuring = false);
        info!(
            "[SESSION] Measuring stopped ({} rows recorded)",
            self.rows_recorded()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerClient, BrokerConfig};
    use crate::connectivity::test_support::StaticProbe;
    use crate::connectivity::Connectivity;
    use crate::sensors::ReadingUpdate;
    use crate::storage::WriterConfig;
    use async_trait::async_trait;
    use collect_shared::{Acceleration, LocationFix};
    use std::path::Path;
    use std::sync::Mutex as StdMutex;

    /// Byte counters whose totals the test sets directly
    #[derive(Clone, Default)]
    struct ScriptedCounters {
        totals: Arc<StdMutex<ByteTotals>>,
    }

    impl ScriptedCounters {
        fn set(&self, rx_bytes: u64, tx_bytes: u64) {
            *self.totals.lock().unwrap() = ByteTotals::new(rx_bytes, tx_bytes);
        }
    }

    impl ByteCounters for ScriptedCounters {
        fn totals(&mut self) -> Result<ByteTotals> {
            Ok(*self.totals.lock().unwrap())
        }
    }

    /// Sensor and location provider recording what the session asked for
    #[derive(Default)]
    struct RecordingProvider {
        available: Vec<SensorKind>,
        registered: StdMutex<Vec<SensorKind>>,
        listener: StdMutex<Option<Arc<dyn ReadingListener>>>,
        unregister_calls: AtomicU64,
        remove_calls: AtomicU64,
    }

    impl RecordingProvider {
        fn with_sensors(available: Vec<SensorKind>) -> Arc<Self> {
            Arc::new(Self {
                available,
                ..Default::default()
            })
        }

        fn registered(&self) -> Vec<SensorKind> {
            self.registered.lock().unwrap().clone()
        }

        fn listener(&self) -> Arc<dyn ReadingListener> {
            self.listener.lock().unwrap().clone().expect("no listener")
        }
    }

    #[async_trait]
    impl SensorProvider for RecordingProvider {
        fn name(&self) -> &'static str {
            "Recording"
        }

        async fn has_sensor(&self, kind: SensorKind) -> bool {
            self.available.contains(&kind)
        }

        async fn register(
            &self,
            kind: SensorKind,
            _rate: SamplingRate,
            listener: Arc<dyn ReadingListener>,
        ) -> Result<()> {
            self.registered.lock().unwrap().push(kind);
            *self.listener.lock().unwrap() = Some(listener);
            Ok(())
        }

        async fn unregister(&self) {
            self.registered.lock().unwrap().clear();
            self.unregister_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl LocationProvider for RecordingProvider {
        fn name(&self) -> &'static str {
            "Recording"
        }

        async fn request_updates(
            &self,
            _request: LocationRequest,
            listener: Arc<dyn ReadingListener>,
        ) -> Result<()> {
            *self.listener.lock().unwrap() = Some(listener);
            Ok(())
        }

        async fn remove_updates(&self) {
            self.remove_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn create_session(
        data_dir: &Path,
        provider: Arc<RecordingProvider>,
        counters: ScriptedCounters,
    ) -> MeasurementSession {
        let writer = FileWriter::new(
            WriterConfig {
                data_dir: data_dir.to_path_buf(),
                ..Default::default()
            },
            Arc::new(BrokerClient::new(BrokerConfig::default())),
            Connectivity::new(Arc::new(StaticProbe::NoPath)),
        );
        let config = SessionConfig {
            tick_interval: Duration::from_millis(20),
            ..Default::default()
        };
        MeasurementSession::new(
            config,
            provider.clone(),
            provider,
            Box::new(counters),
            Arc::new(writer),
        )
    }

    /// Data rows across every session file in `dir`
    fn count_rows(dir: &Path) -> usize {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return 0;
        };
        entries
            .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
            .map(|contents| contents.lines().count().saturating_sub(1))
            .sum()
    }

    async fn wait_for_network(rx: &mut watch::Receiver<DisplayState>, expected: &str) {
        tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|display| display.network == expected),
        )
        .await
        .expect("display never showed the expected usage")
        .expect("display channel closed");
    }

    #[tokio::test]
    async fn test_start_measure_stop() {
        let dir = tempfile::tempdir().unwrap();
        let provider = RecordingProvider::with_sensors(vec![
            SensorKind::Accelerometer,
            SensorKind::AmbientTemperature,
            SensorKind::RelativeHumidity,
        ]);
        let counters = ScriptedCounters::default();
        counters.set(1_048_576, 0);

        let mut session = create_session(dir.path(), provider.clone(), counters.clone());
        let mut display = session.subscribe();

        assert_eq!(session.start().await, TransitionResult::Started);
        assert_eq!(session.state(), MeasurementState::Measuring);
        assert_eq!(provider.registered().len(), 3);

        provider
            .listener()
            .on_reading(ReadingUpdate::Acceleration(Acceleration::new(0.5, 0.25, 9.81)))
            .await;
        counters.set(2_097_152, 0);
        wait_for_network(&mut display, "Download: 1.00 MB, Upload: 0.00 MB").await;
        assert!(display.borrow().measuring);

        assert_eq!(session.stop().await, TransitionResult::Stopped);
        assert_eq!(session.state(), MeasurementState::Idle);
        assert!(provider.registered().is_empty());
        assert_eq!(provider.unregister_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.remove_calls.load(Ordering::SeqCst), 1);
        assert!(!display.borrow().measuring);

        let rows = count_rows(dir.path());
        assert!(rows >= 1);
        assert_eq!(rows as u64, session.rows_recorded());

        // Nothing is written once stop has returned
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(count_rows(dir.path()), rows);
    }

    #[tokio::test]
    async fn test_usage_relative_to_session_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let provider = RecordingProvider::with_sensors(vec![SensorKind::Accelerometer]);
        let counters = ScriptedCounters::default();
        counters.set(5_242_880, 1_048_576);

        let mut session = create_session(dir.path(), provider, counters.clone());
        let mut display = session.subscribe();

        session.start().await;
        counters.set(6_291_456, 1_572_864);
        wait_for_network(&mut display, "Download: 1.00 MB, Upload: 0.50 MB").await;

        // Usage never goes negative when a counter resets
        counters.set(0, 0);
        wait_for_network(&mut display, "Download: 0.00 MB, Upload: 0.00 MB").await;
        session.stop().await;

        // A new session takes a fresh baseline
        counters.set(10_485_760, 0);
        session.start().await;
        assert_eq!(
            display.borrow().network,
            "Download: 0.00 MB, Upload: 0.00 MB"
        );
        counters.set(12_582_912, 0);
        wait_for_network(&mut display, "Download: 2.00 MB, Upload: 0.00 MB").await;
        session.stop().await;
    }

    #[tokio::test]
    async fn test_toggle_and_invalid_events() {
        let dir = tempfile::tempdir().unwrap();
        let provider = RecordingProvider::with_sensors(vec![SensorKind::Accelerometer]);
        let mut session = create_session(dir.path(), provider, ScriptedCounters::default());

        assert!(matches!(
            session.stop().await,
            TransitionResult::Invalid {
                from: MeasurementState::Idle,
                event: SessionEvent::Stop
            }
        ));

        assert_eq!(session.toggle().await, TransitionResult::Started);
        assert!(matches!(
            session.start().await,
            TransitionResult::Invalid { .. }
        ));
        assert_eq!(session.toggle().await, TransitionResult::Stopped);
        assert_eq!(session.state(), MeasurementState::Idle);
    }

    #[tokio::test]
    async fn test_missing_sensors_still_record() {
        let dir = tempfile::tempdir().unwrap();
        let provider = RecordingProvider::with_sensors(Vec::new());
        let mut session = create_session(dir.path(), provider.clone(), ScriptedCounters::default());
        let mut display = session.subscribe();

        session.start().await;
        assert!(provider.registered().is_empty());

        provider
            .listener()
            .on_reading(ReadingUpdate::Location(LocationFix::new(45.0, 4.0, 3.0)))
            .await;
        tokio::time::timeout(
            Duration::from_secs(2),
            display.wait_for(|d| d.location == "45.000000, 4.000000"),
        )
        .await
        .expect("location never displayed")
        .expect("display channel closed");

        assert_eq!(display.borrow().temperature, "Temperature: N/A °C");
        assert_eq!(display.borrow().humidity, "Humidity: N/A %");

        session.stop().await;
        assert!(count_rows(dir.path()) >= 1);
    }
}
