//! AntRide - ANT+ sensor core for a bicycle computer
//!
//! Main entry point: loads the configuration, probes the radio and logs live
//! readings until interrupted.

use antride::sensors::ant::{probe, AntError, AntSensorManager};
use antride::sensors::{RecordingFlag, RecordingStatus, SensorKind, SensorReading};
use antride::storage::config::load_config;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting AntRide v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    tracing::info!("Configuration loaded from {}", config.data_dir.display());

    // No radio driver is linked into this binary
    let backend = probe(config.ant.enabled, || {
        Err(AntError::BackendUnavailable("no ANT+ driver".to_string()))
    });

    // Nothing else drives the recording state, so integrate from launch
    let recording = RecordingFlag::new(RecordingStatus::Start);
    let mut manager = AntSensorManager::new(backend, &config.ant, recording);
    let events = manager.event_receiver();
    manager.start();

    let mut interval = tokio::time::interval(Duration::from_secs_f64(config.ant.sensor_interval()));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                manager.update();
                for event in events.try_iter() {
                    tracing::debug!(?event, "ANT+ event");
                }
                for (kind, reading) in manager.readings() {
                    log_reading(kind, &reading);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    manager.quit();
    Ok(())
}

fn log_reading(kind: SensorKind, reading: &SensorReading) {
    match kind {
        SensorKind::HeartRate => {
            tracing::info!("{}: {:?} bpm", kind, reading.heart_rate);
        }
        SensorKind::Speed => {
            tracing::info!(
                "{}: {:?} km/h, {:.1} m",
                kind,
                reading.speed.map(|s| s * 3.6),
                reading.distance
            );
        }
        SensorKind::Cadence => {
            tracing::info!("{}: {:?} rpm", kind, reading.cadence);
        }
        SensorKind::Power => {
            tracing::info!(
                "{}: {:?} W, {:.0} J",
                kind,
                reading.power(),
                reading.accumulated_power()
            );
        }
        _ => {
            tracing::debug!("{}: {:?}", kind, reading.info);
        }
    }
}
