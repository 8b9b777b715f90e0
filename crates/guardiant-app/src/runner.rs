use std::sync::Arc;

use anyhow::Result;
use guardiant_core::config::AppConfig;
use guardiant_core::security::{AnomalySample, Position};
use guardiant_engine::{Engine, ForegroundChange, Platform};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::adapters::{LastKnownPosition, PlatformEvent, PlatformOutput, StdoutActivator};
use crate::setup::{open_backend, open_store};

const SAMPLE_BUFFER: usize = 64;

/// Run the engine until stdin closes or Ctrl-C.
pub async fn run(config: &AppConfig) -> Result<()> {
    let store = open_store(config).await?;
    let backend = open_backend(config)?;
    let position = Arc::new(LastKnownPosition::default());

    let mut engine = Engine::start(
        config,
        store,
        backend,
        Platform {
            position: position.clone(),
            activator: Arc::new(StdoutActivator),
        },
    )
    .await?;

    let (motion_tx, motion_rx) = mpsc::channel(SAMPLE_BUFFER);
    let (location_tx, location_rx) = mpsc::channel(SAMPLE_BUFFER);
    let (foreground_tx, foreground_rx) = mpsc::channel(SAMPLE_BUFFER);
    engine.attach_motion(motion_rx);
    engine.attach_location(location_rx);
    engine.attach_foreground(foreground_rx);
    let intake = engine.intake();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: PlatformEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Ignoring malformed event: {e}");
                continue;
            }
        };

        match event {
            PlatformEvent::Pin { pin } => {
                let outcome = intake.submit_pin(&pin).await?;
                PlatformOutput::unlock(outcome).emit();
            }
            PlatformEvent::Motion {
                timestamp_ms,
                x,
                y,
                z,
            } => {
                motion_tx
                    .send(AnomalySample::acceleration(timestamp_ms, x, y, z))
                    .await?;
            }
            PlatformEvent::Location {
                timestamp_ms,
                latitude,
                longitude,
            } => {
                let fix = Position::new(latitude, longitude);
                position.update(fix);
                location_tx
                    .send(AnomalySample::position(timestamp_ms, fix))
                    .await?;
            }
            PlatformEvent::Panic { reason } => intake.panic(reason).await?,
            PlatformEvent::Command { signed } => intake.remote_command(signed).await?,
            PlatformEvent::Redrive => intake.redrive_alerts().await?,
            PlatformEvent::Foreground {
                app_id,
                window_class,
            } => {
                foreground_tx
                    .send(ForegroundChange {
                        app_id,
                        window_class,
                    })
                    .await?;
            }
        }
    }

    drop((motion_tx, location_tx, foreground_tx));
    let state = engine.shutdown().await?;
    tracing::info!(
        pending_alerts = state.pending_alerts.len(),
        "Engine stopped"
    );
    Ok(())
}
