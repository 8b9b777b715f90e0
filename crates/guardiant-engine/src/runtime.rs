//! Wires coordinator, detectors and the foreground monitor together.

use std::sync::Arc;

use guardiant_alerts::SecurityBackend;
use guardiant_core::config::{AppConfig, DetectorConfig};
use guardiant_core::interfaces::{IdleSurfaceActivator, PositionProvider};
use guardiant_core::security::AnomalySample;
use guardiant_sensors::{spawn_detector, MotionAnomalyDetector, SpeedAnomalyDetector};
use guardiant_store::{CoercionStateStore, SecurityState};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::coordinator::{CoordinatorDeps, SecurityCoordinator};
use crate::enforcement::EnforcementPolicy;
use crate::error::{EngineError, EngineResult};
use crate::foreground::{spawn_foreground_monitor, ForegroundChange};
use crate::intake::IntakeHandle;

/// Platform capabilities the engine drives.
pub struct Platform {
    pub position: Arc<dyn PositionProvider>,
    pub activator: Arc<dyn IdleSurfaceActivator>,
}

/// A running engine: one coordinator task plus its producers.
pub struct Engine {
    intake: IntakeHandle,
    policy: EnforcementPolicy,
    activator: Arc<dyn IdleSurfaceActivator>,
    detectors: DetectorConfig,
    coordinator: JoinHandle<EngineResult<SecurityState>>,
    shutdown_tx: watch::Sender<bool>,
    producers: Vec<JoinHandle<()>>,
}

impl Engine {
    pub async fn start(
        config: &AppConfig,
        store: CoercionStateStore,
        backend: Arc<dyn SecurityBackend>,
        platform: Platform,
    ) -> EngineResult<Self> {
        let state = store.load().await?.ok_or(EngineError::NotProvisioned)?;
        let (intake, rx) = IntakeHandle::channel(config.coordinator.intake_capacity);

        let (coordinator, snapshots) = SecurityCoordinator::new(
            state,
            CoordinatorDeps {
                store,
                backend,
                position: platform.position,
                activator: platform.activator.clone(),
                config: config.coordinator.clone(),
                delivery: config.alerts.clone(),
            },
        );
        let policy = EnforcementPolicy::new(
            snapshots,
            &config.device.self_app_id,
            &config.enforcement,
        );
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            intake,
            policy,
            activator: platform.activator,
            detectors: config.detectors.clone(),
            coordinator: tokio::spawn(coordinator.run(rx)),
            shutdown_tx,
            producers: Vec::new(),
        })
    }

    pub fn intake(&self) -> IntakeHandle {
        self.intake.clone()
    }

    pub fn policy(&self) -> EnforcementPolicy {
        self.policy.clone()
    }

    pub fn attach_motion(&mut self, samples: mpsc::Receiver<AnomalySample>) {
        let detector = MotionAnomalyDetector::from_config(&self.detectors);
        self.producers.push(spawn_detector(
            detector,
            samples,
            self.intake.sender(),
            self.shutdown_tx.subscribe(),
        ));
    }

    pub fn attach_location(&mut self, samples: mpsc::Receiver<AnomalySample>) {
        let detector = SpeedAnomalyDetector::from_config(&self.detectors);
        self.producers.push(spawn_detector(
            detector,
            samples,
            self.intake.sender(),
            self.shutdown_tx.subscribe(),
        ));
    }

    pub fn attach_foreground(&mut self, changes: mpsc::Receiver<ForegroundChange>) {
        self.producers.push(spawn_foreground_monitor(
            self.policy.clone(),
            self.activator.clone(),
            changes,
            self.intake.clone(),
            self.shutdown_tx.subscribe(),
        ));
    }

    /// Stop producers, then the coordinator, and return the final state.
    pub async fn shutdown(self) -> EngineResult<SecurityState> {
        let _ = self.shutdown_tx.send(true);
        for producer in self.producers {
            if let Err(e) = producer.await {
                tracing::warn!("Producer task ended abnormally: {e}");
            }
        }
        // Already stopped when every producer is gone.
        let _ = self.intake.shutdown().await;
        self.coordinator
            .await
            .map_err(|e| EngineError::Task(e.to_string()))?
    }
}
