use log::{error, info, warn};
use std::io;
use std::sync::Arc;
use tokio::sync::watch;

use uart_mqtt_bridge::config::BridgeConfig;
use uart_mqtt_bridge::ingest::{IngestConfig, IngestionLoop};
use uart_mqtt_bridge::serial::{list_ports, prompt_for_port, SerialConnector};
use uart_mqtt_bridge::sink::{MqttSession, SinkDispatcher, SpreadsheetStore};

/// Ask the operator which port to use when none is configured
fn select_port() -> Result<String, Box<dyn std::error::Error>> {
    let ports = match list_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("Failed to enumerate serial ports: {}", e);
            Vec::new()
        }
    };

    let stdin = io::stdin();
    match prompt_for_port(&ports, stdin.lock(), io::stdout())? {
        Some(port) => Ok(port),
        None => Err("No serial port selected".into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match BridgeConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let port = match config.serial_port.clone() {
        Some(port) => port,
        None => select_port()?,
    };

    // Sinks
    let session = config.mqtt.as_ref().map(MqttSession::start);
    let mut dispatcher = SinkDispatcher::new();
    if let Some(session) = &session {
        dispatcher.add(Arc::new(session.sink()));
    }
    if let Some(path) = &config.spreadsheet_path {
        info!("Archiving records to {}", path.display());
        dispatcher.add(Arc::new(SpreadsheetStore::new(path)));
    }
    if dispatcher.is_empty() {
        warn!("No sinks configured; decoded records will only be logged");
    } else {
        info!("Sinks: {}", dispatcher.sink_names().join(", "));
    }

    // Handle Ctrl+C gracefully
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested, finishing current frame");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let connector = SerialConnector::new(port, config.baud_rate, config.read_timeout);
    let ingestion = IngestionLoop::new(
        IngestConfig::from(&config),
        connector,
        dispatcher,
        shutdown_rx,
    );
    let result = ingestion.run().await;

    if let Some(session) = session {
        session.stop().await;
    }

    match result {
        Ok(summary) => {
            info!(
                "Bridge stopped after {} records ({} frames dropped)",
                summary.records_dispatched, summary.frames_dropped
            );
            Ok(())
        }
        Err(e) => {
            error!("Fatal stream error: {}", e);
            Err(e.into())
        }
    }
}
