//! `sensorgate` binary
//!
//! ```text
//! sensorgate <port> [--config path/to/sensorgate.toml]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use sensorgate_connectors::storage::JsonLinesStore;
use sensorgate_gateway::{ConfigSource, Gateway, GatewayConfig, GatewayResult, LogSink};

#[derive(Parser, Debug)]
#[command(name = "sensorgate")]
#[command(about = "Sensor telemetry gateway")]
#[command(version)]
struct Cli {
    /// TCP port sensor nodes connect to
    port: u16,

    /// Configuration file (defaults to config/sensorgate.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, source) = match GatewayConfig::resolve(cli.config.as_deref()) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("sensorgate: {e}");
            return ExitCode::FAILURE;
        }
    };

    let sink = match start_logging(&config) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("sensorgate: {e}");
            return ExitCode::FAILURE;
        }
    };

    match source {
        ConfigSource::File(path) => info!("Configuration loaded from {}", path.display()),
        ConfigSource::Defaults => info!("No configuration file found, using defaults"),
        ConfigSource::FallbackAfterError { path, error } => {
            warn!("Ignoring {}: {error}; using defaults", path.display())
        }
    }

    let code = match run(cli.port, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Gateway stopped with an error: {e}");
            eprintln!("sensorgate: {e}");
            ExitCode::FAILURE
        }
    };
    sink.shutdown();
    code
}

fn start_logging(config: &GatewayConfig) -> GatewayResult<LogSink> {
    let level = config.logging.level_filter()?;
    let (sink, logger) = LogSink::start(&config.logging.path, level)?;
    logger.install()?;
    Ok(sink)
}

fn run(port: u16, config: &GatewayConfig) -> GatewayResult<()> {
    let store = JsonLinesStore::new(config.storage.path.clone());
    let gateway: Gateway = Gateway::start(port, config, store)?;
    info!("Gateway running on {}", gateway.local_addr());

    let pipeline = gateway.pipeline().clone();
    let handler = ctrlc::set_handler(move || {
        if pipeline.request_shutdown() {
            info!("Interrupt received, shutting down");
        }
    });
    if let Err(e) = handler {
        if let Err(worker) = gateway.stop() {
            error!("Gateway stopped with an error while aborting: {worker}");
        }
        return Err(e.into());
    }

    let report = gateway.join()?;
    info!(
        "Connections: {} accepted, {} timed out, {} records, {} partial records dropped",
        report.connections.accepted,
        report.connections.timed_out,
        report.connections.records,
        report.connections.partial_dropped
    );
    info!(
        "Aggregation: {} applied, {} unknown sensors, {} alerts",
        report.aggregator.stats.applied,
        report.aggregator.stats.unknown,
        report.aggregator.stats.alerts
    );
    for sensor in report.aggregator.table.iter() {
        info!(
            "Sensor {} in room {}: running average {:.2}, last modified {}",
            sensor.sensor_id,
            sensor.room_id,
            sensor.running_avg(),
            sensor.last_modified
        );
    }
    info!(
        "Storage: {} rows inserted, {} reconnects, {} rows in table",
        report.persistence.inserted,
        report.persistence.reconnects,
        report.persistence.rows_at_shutdown
    );
    Ok(())
}
