//! Day-named CSV session files
//!
//! Every tick appends one row to `<prefix>_<YYYYMMDD>.csv`. The file is
//! created with its header by the first write of the day. The path is
//! resolved again on every tick, so a session running past midnight
//! continues in the next day's file.

use crate::broker::{BrokerClient, PublishOutcome};
use crate::connectivity::Connectivity;
use anyhow::{Context, Result};
use bytes::BytesMut;
use chrono::{Local, NaiveDate};
use collect_shared::codec::{self, StatusFormat, CSV_HEADER};
use collect_shared::Reading;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, trace, warn};

/// Default directory holding session files
pub const DEFAULT_DATA_DIR: &str = "documents";

/// Default session file name prefix
pub const DEFAULT_FILE_PREFIX: &str = "sensor_data";

/// Configuration for the file writer
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Directory receiving the session files
    pub data_dir: PathBuf,
    /// File name prefix, followed by `_<YYYYMMDD>.csv`
    pub file_prefix: String,
    /// Payload published after each recorded row
    pub status_format: StatusFormat,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            file_prefix: DEFAULT_FILE_PREFIX.into(),
            status_format: StatusFormat::default(),
        }
    }
}

/// File name of the session file for `date`
pub fn session_file_name(prefix: &str, date: NaiveDate) -> String {
    format!("{}_{}.csv", prefix, date.format("%Y%m%d"))
}

/// What a tick produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRecord {
    /// A row reached the session file
    pub recorded: bool,
    /// Outcome of the status publish, `None` when it was not attempted
    pub publish: Option<PublishOutcome>,
}

impl TickRecord {
    fn dropped() -> Self {
        Self {
            recorded: false,
            publish: None,
        }
    }
}

/// Appends readings to the session file and publishes a status message
pub struct FileWriter {
    config: WriterConfig,
    broker: Arc<BrokerClient>,
    connectivity: Connectivity,
}

impl FileWriter {
    pub fn new(config: WriterConfig, broker: Arc<BrokerClient>, connectivity: Connectivity) -> Self {
        Self {
            config,
            broker,
            connectivity,
        }
    }

    /// Path of the session file for `date`
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.config
            .data_dir
            .join(session_file_name(&self.config.file_prefix, date))
    }

    /// Append `reading` to today's file
    pub async fn append_reading(&self, reading: &Reading) -> TickRecord {
        self.append_reading_on(Local::now().date_naive(), reading).await
    }

    /// Append `reading` to the file of `date`, then publish a status
    /// message if the network is usable. Failures drop the tick.
    pub async fn append_reading_on(&self, date: NaiveDate, reading: &Reading) -> TickRecord {
        match self.write_row(date, reading).await {
            Ok(path) => trace!("[WRITER] Appended row to {}", path.display()),
            Err(e) => {
                warn!("[WRITER] Dropping tick: {:#}", e);
                return TickRecord::dropped();
            }
        }

        if !self.connectivity.is_network_available().await {
            debug!("[WRITER] No usable network, skipping publish");
            return TickRecord {
                recorded: true,
                publish: None,
            };
        }

        let outcome = match codec::encode_status(reading, self.config.status_format) {
            Ok(payload) => self.broker.publish(payload).await,
            Err(e) => {
                warn!("[WRITER] Failed to encode status message: {}", e);
                PublishOutcome::Failed
            }
        };

        TickRecord {
            recorded: true,
            publish: Some(outcome),
        }
    }

    async fn write_row(&self, date: NaiveDate, reading: &Reading) -> Result<PathBuf> {
        let row = codec::encode_row(reading)?;

        tokio::fs::create_dir_all(&self.config.data_dir)
            .await
            .with_context(|| format!("creating {}", self.config.data_dir.display()))?;

        let path = self.path_for(date);
        let created = OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(&path)
            .await;

        let (mut file, needs_header) = match created {
            Ok(file) => {
                info!("[WRITER] Created session file {}", path.display());
                (file, true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let file = OpenOptions::new()
                    .append(true)
                    .open(&path)
                    .await
                    .with_context(|| format!("opening {}", path.display()))?;
                // A file left empty by a failed first write still needs its header
                let empty = file
                    .metadata()
                    .await
                    .with_context(|| format!("inspecting {}", path.display()))?
                    .len()
                    == 0;
                (file, empty)
            }
            Err(e) => {
                return Err(e).with_context(|| format!("creating {}", path.display()));
            }
        };

        let mut chunk = BytesMut::with_capacity(CSV_HEADER.len() + 1 + row.len());
        if needs_header {
            chunk.extend_from_slice(&codec::encode_header());
        }
        chunk.extend_from_slice(&row);

        file.write_all(&chunk)
            .await
            .with_context(|| format!("appending to {}", path.display()))?;
        file.flush().await?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::test_support::{read_packet, split_publish, CONNACK_ACCEPTED};
    use crate::broker::BrokerConfig;
    use crate::connectivity::test_support::StaticProbe;
    use crate::connectivity::NetworkTransport;
    use collect_shared::codec::PLACEHOLDER_STATUS;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn create_writer(data_dir: PathBuf, probe: StaticProbe) -> FileWriter {
        let config = WriterConfig {
            data_dir,
            ..Default::default()
        };
        FileWriter::new(
            config,
            Arc::new(BrokerClient::new(BrokerConfig::default())),
            Connectivity::new(Arc::new(probe)),
        )
    }

    fn create_test_reading(speed: f64) -> Reading {
        Reading {
            latitude: 45.764043,
            longitude: 4.835659,
            speed,
            accel_x: 0.1,
            accel_y: 0.2,
            accel_z: 9.81,
            ..Default::default()
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, day).unwrap()
    }

    #[test]
    fn test_session_file_name() {
        assert_eq!(session_file_name("sensor_data", date(5)), "sensor_data_20241105.csv");
    }

    #[tokio::test]
    async fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let writer = create_writer(dir.path().to_path_buf(), StaticProbe::NoPath);

        for speed in [1.0, 2.0, 3.0] {
            let record = writer.append_reading_on(date(5), &create_test_reading(speed)).await;
            assert!(record.recorded);
        }

        let contents = std::fs::read_to_string(writer.path_for(date(5))).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "45.764043,4.835659,1.00,0.10,0.20,9.81");
        assert_eq!(lines[3], "45.764043,4.835659,3.00,0.10,0.20,9.81");
        assert_eq!(contents.matches(CSV_HEADER).count(), 1);
    }

    #[tokio::test]
    async fn test_new_date_starts_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = create_writer(dir.path().join("nested/documents"), StaticProbe::NoPath);

        writer.append_reading_on(date(5), &create_test_reading(1.0)).await;
        writer.append_reading_on(date(6), &create_test_reading(2.0)).await;

        let first = std::fs::read_to_string(writer.path_for(date(5))).unwrap();
        let second = std::fs::read_to_string(writer.path_for(date(6))).unwrap();
        assert_eq!(first.lines().count(), 2);
        assert_eq!(second.lines().count(), 2);
        assert!(second.starts_with(CSV_HEADER));
    }

    #[tokio::test]
    async fn test_io_error_drops_tick() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-directory");
        std::fs::write(&blocker, "").unwrap();
        let writer = create_writer(blocker, StaticProbe::Path(vec![NetworkTransport::Wifi]));

        let record = writer.append_reading_on(date(5), &create_test_reading(1.0)).await;
        assert_eq!(record, TickRecord::dropped());
    }

    #[tokio::test]
    async fn test_publish_gated_by_connectivity() {
        let dir = tempfile::tempdir().unwrap();

        let offline = create_writer(dir.path().join("a"), StaticProbe::Path(vec![NetworkTransport::Bluetooth]));
        let record = offline.append_reading_on(date(5), &create_test_reading(1.0)).await;
        assert!(record.recorded);
        assert_eq!(record.publish, None);

        // Usable network but the broker never connected: publish is a no-op
        let online = create_writer(dir.path().join("b"), StaticProbe::Path(vec![NetworkTransport::Cellular]));
        let record = online.append_reading_on(date(5), &create_test_reading(1.0)).await;
        assert!(record.recorded);
        assert_eq!(record.publish, Some(PublishOutcome::NotConnected));
    }

    #[tokio::test]
    async fn test_empty_leftover_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let writer = create_writer(dir.path().to_path_buf(), StaticProbe::NoPath);
        std::fs::write(writer.path_for(date(5)), "").unwrap();

        writer.append_reading_on(date(5), &create_test_reading(1.0)).await;
        writer.append_reading_on(date(5), &create_test_reading(2.0)).await;

        let contents = std::fs::read_to_string(writer.path_for(date(5))).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(contents.matches(CSV_HEADER).count(), 1);
    }

    #[tokio::test]
    async fn test_placeholder_published_when_online() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let fake_broker = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let (header, _) = read_packet(&mut socket).await;
            assert_eq!(header, 0x10, "expected CONNECT");
            socket.write_all(&CONNACK_ACCEPTED).await.unwrap();

            let (header, body) = read_packet(&mut socket).await;
            assert_eq!(header, 0x32, "expected PUBLISH with QoS 1");
            let (topic, packet_id, payload) = split_publish(&body);
            socket
                .write_all(&[0x40, 0x02, packet_id[0], packet_id[1]])
                .await
                .unwrap();
            (topic, payload)
        });

        let broker = Arc::new(BrokerClient::new(BrokerConfig {
            host: "127.0.0.1".into(),
            port,
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        }));
        broker.connect().await;

        let dir = tempfile::tempdir().unwrap();
        let writer = FileWriter::new(
            WriterConfig {
                data_dir: dir.path().to_path_buf(),
                status_format: StatusFormat::Placeholder,
                ..Default::default()
            },
            broker.clone(),
            Connectivity::new(Arc::new(StaticProbe::Path(vec![NetworkTransport::Wifi]))),
        );

        let record = writer.append_reading_on(date(5), &create_test_reading(4.0)).await;
        assert_eq!(
            record,
            TickRecord {
                recorded: true,
                publish: Some(PublishOutcome::Published),
            }
        );

        let (topic, payload) = tokio::time::timeout(Duration::from_secs(2), fake_broker)
            .await
            .expect("fake broker timed out")
            .expect("fake broker panicked");
        assert_eq!(topic, "vehicule");
        assert_eq!(payload, PLACEHOLDER_STATUS.as_bytes());

        broker.disconnect().await;
    }
}
