//! CLI entry point for picova
//!
//! Provides commands for:
//! - Listing serial ports
//! - Monitoring a connected meter, optionally exporting the retained window
//! - Running the same pipeline against a simulated meter
//!
//! # Usage
//!
//! ```bash
//! picova ports
//! picova monitor --port /dev/ttyACM0 --filter median:7 --duration 30s --export
//! picova simulate --rate-hz 500 --corrupt 0.01 --window 2s
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use humantime_serde::re::humantime::parse_duration;
use picova::adapters::{list_ports, SimulatedMeter};
use picova::config::{PicovaConfig, DEFAULT_CONFIG_PATH};
use picova::data::storage::export_csv;
use picova::logging::{self, LoggingConfig, OutputFormat};
use picova::{BufferHandle, FilterKind, MeterSession, WindowedBuffer};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "picova")]
#[command(about = "Acquisition for USB power meters", long_about = None)]
struct Cli {
    /// Configuration file (missing file means defaults)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log output format: pretty, compact or json
    #[arg(long, global = true, default_value = "compact")]
    log_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports,

    /// Stream from a meter on a serial port
    Monitor {
        /// Serial port, overrides `serial.port`
        #[arg(long)]
        port: Option<String>,

        /// Baud rate, overrides `serial.baud_rate`
        #[arg(long)]
        baud: Option<u32>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Stream from a simulated meter
    Simulate {
        /// Samples per second
        #[arg(long, default_value_t = 1000.0)]
        rate_hz: f64,

        /// Fraction of corrupted lines (0.0 - 1.0)
        #[arg(long, default_value_t = 0.0)]
        corrupt: f64,

        /// Random seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Retention window, e.g. "5s"
    #[arg(long, value_parser = parse_duration)]
    window: Option<Duration>,

    /// Filter: identity, median or median:N
    #[arg(long)]
    filter: Option<FilterKind>,

    /// Stop after this long (default: until Ctrl-C or end of stream)
    #[arg(long, value_parser = parse_duration)]
    duration: Option<Duration>,

    /// Print the latest values at most this often
    #[arg(long, value_parser = parse_duration, default_value = "500ms")]
    print_every: Duration,

    /// Print the latest record as a JSON line instead of labels
    #[arg(long)]
    json: bool,

    /// Write the retained records to `export.output_dir` on exit
    #[arg(long)]
    export: bool,
}

enum Source {
    Serial,
    Reader(Box<dyn Read + Send>),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = PicovaConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let (source, run) = match &cli.command {
        Commands::Ports => {
            let ports = list_ports()?;
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                println!("{port}");
            }
            return Ok(());
        }
        Commands::Monitor { port, baud, run } => {
            if let Some(port) = port {
                config.serial.port = Some(port.clone());
            }
            if let Some(baud) = baud {
                config.serial.baud_rate = *baud;
            }
            (Source::Serial, run)
        }
        Commands::Simulate {
            rate_hz,
            corrupt,
            seed,
            run,
        } => {
            if !(rate_hz.is_finite() && *rate_hz > 0.0) {
                bail!("--rate-hz must be positive, got {rate_hz}");
            }
            let mut meter = SimulatedMeter::new()
                .with_sample_period(Duration::from_secs_f64(1.0 / rate_hz))
                .with_corrupt_ratio(*corrupt)
                .paced(true);
            if let Some(seed) = seed {
                meter = meter.with_seed(*seed);
            }
            (Source::Reader(Box::new(meter)), run)
        }
    };
    apply_run_args(&mut config, run);

    config.validate()?;
    logging::init(LoggingConfig::from_config(&config)?.with_format(cli.log_format))?;

    acquire(&config, source, run).await
}

fn apply_run_args(config: &mut PicovaConfig, run: &RunArgs) {
    if let Some(window) = run.window {
        config.acquisition.time_window = window;
    }
    if let Some(filter) = run.filter {
        config.acquisition.filter = filter;
    }
}

async fn acquire(config: &PicovaConfig, source: Source, run: &RunArgs) -> Result<()> {
    // The session applies the configured window and filter on connect.
    let (handle, actor) = BufferHandle::spawn(WindowedBuffer::new());
    let mut session = MeterSession::new(handle.clone(), config.acquisition.clone());

    match source {
        Source::Serial => session.connect_serial(&config.serial).await?,
        Source::Reader(reader) => session.connect(reader).await?,
    }
    info!(
        window = ?config.acquisition.time_window,
        filter = %config.acquisition.filter,
        "Acquisition started"
    );

    let mut snapshots = handle.subscribe();
    let mut connected = session.connected();
    let mut printer = tokio::time::interval(run.print_every);

    let deadline = async {
        match run.duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            _ = &mut deadline => {
                info!("Duration elapsed");
                break;
            }
            _ = connected.wait_for(|c| !*c) => {
                info!("Source ended");
                break;
            }
            _ = printer.tick() => {
                if snapshots.has_changed().unwrap_or(false) {
                    let snapshot = snapshots.borrow_and_update().clone();
                    if run.json {
                        if let Some(latest) = snapshot.latest {
                            println!("{}", serde_json::to_string(&latest)?);
                        }
                    } else if let (Some(latest), Some(labels)) = (snapshot.latest, snapshot.labels()) {
                        println!(
                            "{:>12} us  {:>12}  {:>14}  {:>14}  ({} pts)",
                            latest.timestamp,
                            labels[0],
                            labels[1],
                            labels[2],
                            snapshot.len()
                        );
                    }
                }
            }
        }
    }

    session.disconnect().await?;
    if let Some(stats) = session.stats() {
        info!(
            lines = stats.lines(),
            records = stats.records(),
            rejected = stats.rejected(),
            "Acquisition stopped"
        );
    }

    if run.export {
        let records = handle.records().await?;
        let path = export_csv(&records, &config.export.output_dir)?;
        println!("Exported {} records to {}", records.len(), path.display());
    }

    handle.shutdown().await?;
    actor.await?;
    Ok(())
}
