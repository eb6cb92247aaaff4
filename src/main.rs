//! Pulseox Agent CLI
//!
//! Pulse oximeter bridge, stress monitor, and record store.

use clap::{Parser, Subcommand};
use pulseox_agent::{
    config::Config,
    monitor::{self, SessionConfig},
    relay::{server, RelayHub},
    sensor::{reader, SensorSource},
    store::{self, HealthRecord, RecordSink, StoreConfig},
    VERSION,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "pulseox")]
#[command(version = VERSION)]
#[command(about = "Pulse oximeter relay and stress monitor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sensor bridge: acquire readings and relay them to consumers
    Bridge {
        /// Character device to read sensor lines from
        #[arg(long)]
        device: Option<PathBuf>,

        /// TCP endpoint of a networked sensor
        #[arg(long)]
        tcp: Option<String>,

        /// Generate simulated readings instead of opening a sensor
        #[arg(long)]
        simulate: bool,

        /// Address for the relay listener
        #[arg(long)]
        listen: Option<String>,
    },

    /// Run one measurement and report the stress score
    Measure {
        /// Name recorded with the measurement
        #[arg(long)]
        name: String,

        /// Measurement duration in seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Relay address to consume from
        #[arg(long)]
        relay: Option<String>,

        /// Skip saving the record to the store
        #[arg(long)]
        no_save: bool,
    },

    /// Run the health record store service
    Serve {
        /// Port to bind to (0 for random)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Bridge {
            device,
            tcp,
            simulate,
            listen,
        } => cmd_bridge(device, tcp, simulate, listen).await,
        Commands::Measure {
            name,
            duration,
            relay,
            no_save,
        } => cmd_measure(name, duration, relay, no_save).await,
        Commands::Serve { port } => cmd_serve(port).await,
        Commands::Config => {
            cmd_config();
            Ok(())
        }
    }
}

async fn cmd_bridge(
    device: Option<PathBuf>,
    tcp: Option<String>,
    simulate: bool,
    listen: Option<String>,
) -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();

    let source = if simulate {
        SensorSource::Simulated
    } else if let Some(path) = device {
        SensorSource::Device(path)
    } else if let Some(addr) = tcp {
        SensorSource::Tcp(addr)
    } else {
        config.sensor.source()
    };

    let listen_addr: SocketAddr = listen
        .unwrap_or_else(|| config.relay_addr.clone())
        .parse()?;

    println!("Pulseox Agent v{VERSION}");
    println!();
    println!("Starting bridge...");
    println!("  Sensor: {}", source.describe());

    let hub = RelayHub::new();
    let (addr, shutdown_tx) = server::run(listen_addr, hub.clone()).await?;
    println!("  Relay: {addr}");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    tokio::select! {
        () = reader::run(source, hub) => {}
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("Stopping bridge...");
        }
    }

    let _ = shutdown_tx.send(());
    Ok(())
}

async fn cmd_measure(
    name: String,
    duration: Option<u64>,
    relay: Option<String>,
    no_save: bool,
) -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();
    let duration = duration
        .map(Duration::from_secs)
        .unwrap_or(config.window_duration);
    let relay_addr = relay.unwrap_or_else(|| config.relay_addr.clone());

    println!("Pulseox Agent v{VERSION}");
    println!();
    println!(
        "Measuring {name} for {}s - keep your finger still on the sensor.",
        duration.as_secs()
    );
    println!("Press Enter to complete early from the current reading; Ctrl+C cancels.");
    println!();

    let measurement = monitor::run_session(SessionConfig {
        relay_addr,
        duration,
    })
    .await?;

    println!();
    println!("Measurement complete");
    println!(
        "  Final BPM: {} | SpO2: {}% ({} samples)",
        measurement.result.pulse, measurement.result.spo2, measurement.result.sample_count
    );
    println!(
        "  Stress score: {} ({})",
        measurement.score, measurement.level
    );

    if !no_save {
        let sink = RecordSink::new(config.store_url());
        let record = HealthRecord {
            name,
            pulse: measurement.result.pulse,
            spo2: measurement.result.spo2,
            stress_score: measurement.score,
            recorded_at: chrono::Utc::now(),
        };

        // Best effort; the result above stands either way.
        match sink.save(&record).await {
            Ok(()) => println!("  Record saved."),
            Err(e) => tracing::warn!(error = %e, "could not save health record"),
        }
    }

    Ok(())
}

async fn cmd_serve(port: Option<u16>) -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let port = port.unwrap_or(config.store_port);
    let (addr, shutdown_tx) = store::run(StoreConfig::new(port, config.data_path.clone())).await?;

    println!("Pulseox Agent v{VERSION}");
    println!();
    println!("Record store running on http://{addr}");
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    println!();
    println!("Stopping record store...");

    let _ = shutdown_tx.send(());
    Ok(())
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}
