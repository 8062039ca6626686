mod analyze;
mod broker;
mod config;
mod connectivity;
mod sensors;
mod session;
mod storage;

use anyhow::Result;
use broker::{BrokerClient, BrokerConfig};
use clap::{Args, Parser, Subcommand, ValueEnum};
use collect_shared::analysis::DEFAULT_SEGMENT_SECS;
use collect_shared::codec::StatusFormat;
use collect_shared::sampling;
use config::{AgentConfig, LocationBackend, SensorBackend};
use connectivity::{Connectivity, ConnectivityConfig, SysfsNetworkProbe};
use sensors::{SystemByteCounters, DEFAULT_GPSD_ADDRESS, DEFAULT_IIO_ROOT};
use session::{DisplayState, MeasurementSession};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storage::{FileWriter, WriterConfig, DEFAULT_DATA_DIR, DEFAULT_FILE_PREFIX};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::time::Instant;

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DISPLAY_LOG_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "collect-edge")]
#[command(about = "Vehicle telemetry collection agent")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample sensors every tick, append rows to the day's file and publish status messages.
    /// Press Enter to start/stop measuring, `q` or Ctrl-C to quit.
    Run(RunArgs),

    /// Summarise recorded session files segment by segment
    Analyze(AnalyzeArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum SensorSource {
    /// Linux Industrial I/O devices
    Iio,
    Simulated,
}

#[derive(Clone, Copy, ValueEnum)]
enum LocationSource {
    /// gpsd daemon
    Gpsd,
    Simulated,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusFormatArg {
    /// The recorded reading as JSON
    Reading,
    /// The fixed placeholder string
    Placeholder,
}

#[derive(Args)]
struct RunArgs {
    /// Broker host name or address
    #[arg(long, env = "COLLECT_BROKER_HOST", default_value = "localhost")]
    broker_host: String,

    /// Broker TCP port
    #[arg(long, env = "COLLECT_BROKER_PORT", default_value_t = 1883)]
    broker_port: u16,

    /// Topic status messages are published on
    #[arg(long, env = "COLLECT_TOPIC", default_value = "vehicule")]
    topic: String,

    /// Directory receiving the session files
    #[arg(long, env = "COLLECT_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Session file name prefix
    #[arg(long, env = "COLLECT_FILE_PREFIX", default_value = DEFAULT_FILE_PREFIX)]
    file_prefix: String,

    /// Accelerometer, temperature and humidity source
    #[arg(long, env = "COLLECT_SENSORS", value_enum, default_value_t = SensorSource::Iio)]
    sensors: SensorSource,

    /// Root of the IIO device tree
    #[arg(long, env = "COLLECT_IIO_ROOT", default_value = DEFAULT_IIO_ROOT)]
    iio_root: PathBuf,

    /// Position and speed source
    #[arg(long, env = "COLLECT_LOCATION", value_enum, default_value_t = LocationSource::Gpsd)]
    location: LocationSource,

    /// gpsd address
    #[arg(long, env = "COLLECT_GPSD_ADDRESS", default_value = DEFAULT_GPSD_ADDRESS)]
    gpsd_address: String,

    /// Payload published after each recorded row
    #[arg(long, env = "COLLECT_STATUS_FORMAT", value_enum, default_value_t = StatusFormatArg::Reading)]
    status_format: StatusFormatArg,

    /// Also publish over a wired network
    #[arg(long, env = "COLLECT_ALLOW_ETHERNET")]
    allow_ethernet: bool,

    /// Wait for Enter before measuring
    #[arg(long)]
    no_autostart: bool,
}

impl RunArgs {
    fn into_config(self) -> AgentConfig {
        let defaults = AgentConfig::default();

        AgentConfig {
            broker: BrokerConfig {
                host: self.broker_host,
                port: self.broker_port,
                topic: self.topic,
                ..defaults.broker
            },
            writer: WriterConfig {
                data_dir: self.data_dir,
                file_prefix: self.file_prefix,
                status_format: match self.status_format {
                    StatusFormatArg::Reading => StatusFormat::Reading,
                    StatusFormatArg::Placeholder => StatusFormat::Placeholder,
                },
            },
            session: defaults.session,
            connectivity: ConnectivityConfig {
                allow_ethernet: self.allow_ethernet,
            },
            sensors: match self.sensors {
                SensorSource::Iio => SensorBackend::Iio {
                    root: self.iio_root,
                },
                SensorSource::Simulated => SensorBackend::Simulated,
            },
            location: match self.location {
                LocationSource::Gpsd => LocationBackend::Gpsd {
                    address: self.gpsd_address,
                },
                LocationSource::Simulated => LocationBackend::Simulated,
            },
            autostart: !self.no_autostart,
        }
    }
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Session files to analyze
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Segment duration in seconds
    #[arg(long, default_value_t = DEFAULT_SEGMENT_SECS)]
    segment_secs: u64,

    /// Interval between rows of the analyzed files
    #[arg(long, default_value_t = sampling::TICK_INTERVAL_MS)]
    sample_interval_ms: u64,

    /// Write the per-segment summary CSV here
    #[arg(long)]
    summary_out: Option<PathBuf>,

    /// Print summaries as JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => run(args.into_config()).await,
        Commands::Analyze(args) => {
            analyze::run(analyze::AnalyzeOptions {
                files: args.files,
                segment_secs: args.segment_secs,
                sample_interval_ms: args.sample_interval_ms,
                summary_out: args.summary_out,
                json: args.json,
            })
            .await
        }
    };

    let code = match result {
        Ok(()) => 0,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };
    // The stdin reader may still be parked in a blocking read
    std::process::exit(code);
}

async fn run(config: AgentConfig) -> Result<()> {
    info!("[AGENT] Collect edge agent starting");
    info!(
        "  Broker: {}:{} topic {}",
        config.broker.host, config.broker.port, config.broker.topic
    );
    info!("  Data dir: {}", config.writer.data_dir.display());

    let broker = Arc::new(BrokerClient::new(config.broker.clone()));
    broker.connect().await;

    let connectivity = Connectivity::with_config(
        Arc::new(SysfsNetworkProbe::default()),
        &config.connectivity,
    );
    let writer = Arc::new(FileWriter::new(
        config.writer.clone(),
        broker.clone(),
        connectivity,
    ));

    let sensors = config.sensors.provider();
    let location = config.location.provider();
    info!("  Sensors: {}, location: {}", sensors.name(), location.name());

    let mut session = MeasurementSession::new(
        config.session.clone(),
        sensors,
        location,
        Box::new(SystemByteCounters::new()),
        writer,
    );
    let display_task = tokio::spawn(log_display(session.subscribe()));

    if config.autostart {
        session.start().await;
    } else {
        info!("[AGENT] Press Enter to start measuring");
    }

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    warn!("[AGENT] Failed to listen for Ctrl-C: {}", e);
                }
                info!("[AGENT] Shutting down");
                break;
            }
            line = input.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().eq_ignore_ascii_case("q") => {
                    info!("[AGENT] Quit requested");
                    break;
                }
                Ok(Some(_)) => {
                    session.toggle().await;
                }
                Ok(None) => {
                    debug!("[AGENT] stdin closed, Ctrl-C to quit");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("[AGENT] Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    session.stop().await;
    display_task.abort();
    broker.disconnect().await;
    info!("[AGENT] Stopped after {} rows", session.rows_recorded());

    Ok(())
}

/// Log the screen at most once per interval, and on every start/stop
async fn log_display(mut display: watch::Receiver<DisplayState>) {
    let mut last_logged: Option<Instant> = None;
    let mut was_measuring = false;

    while display.changed().await.is_ok() {
        let state = display.borrow_and_update().clone();
        let now = Instant::now();
        let throttled =
            last_logged.is_some_and(|at| now.duration_since(at) < DISPLAY_LOG_INTERVAL);

        if throttled && state.measuring == was_measuring {
            continue;
        }
        last_logged = Some(now);
        was_measuring = state.measuring;
        info!("[DISPLAY] {}", state);
    }
}
