//! The security coordinator: sole owner and writer of [`SecurityState`].
//!
//! Every input (PIN submissions, anomalies, tamper reports, remote
//! commands) arrives through one ordered intake queue and is handled to
//! completion before the next, so mode and protected apps change together
//! and readers only ever see a published snapshot.
//!
//! Nothing logged here depends on which PIN matched or on the mode.

use std::sync::Arc;
use std::time::Duration;

use guardiant_alerts::{AlertDispatcher, BackendResult, SecurityBackend};
use guardiant_core::alert::{Alert, AlertPayload};
use guardiant_core::auth::{PinKind, UnlockOutcome};
use guardiant_core::config::{AlertDeliveryConfig, CoordinatorConfig};
use guardiant_core::interfaces::{IdleSurfaceActivator, PositionProvider};
use guardiant_core::security::{
    AnomalyEvent, DeviceMode, Position, ProtectedAppSet, ProtectedApps, RemoteCommand, TamperKind,
};
use guardiant_crypto::command::SignedCommand;
use guardiant_crypto::{PinVerifier, VerifyOutcome};
use guardiant_store::{CoercionStateStore, SecurityState, StoreResult};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::enforcement::SecuritySnapshot;
use crate::error::{EngineError, EngineResult};
use crate::intake::Intake;
use crate::retry::with_backoff;

/// Collaborators handed to the coordinator at construction.
pub struct CoordinatorDeps {
    pub store: CoercionStateStore,
    pub backend: Arc<dyn SecurityBackend>,
    pub position: Arc<dyn PositionProvider>,
    pub activator: Arc<dyn IdleSurfaceActivator>,
    pub config: CoordinatorConfig,
    pub delivery: AlertDeliveryConfig,
}

type FetchResult = (u64, BackendResult<ProtectedAppSet>);

pub struct SecurityCoordinator {
    state: SecurityState,
    verifier: PinVerifier,
    store: CoercionStateStore,
    backend: Arc<dyn SecurityBackend>,
    position: Arc<dyn PositionProvider>,
    activator: Arc<dyn IdleSurfaceActivator>,
    alerts: AlertDispatcher,
    config: CoordinatorConfig,
    delivery: AlertDeliveryConfig,
    snapshot_tx: watch::Sender<SecuritySnapshot>,
    /// Alerts waiting on a best-effort position fix.
    captures: JoinSet<Alert>,
    fetches: JoinSet<FetchResult>,
    /// Bumped on every fetch start and on deactivation; stale results
    /// carry an older value and are ignored.
    fetch_generation: u64,
    /// The last persist failed; the state must be written before any
    /// further PIN is honoured.
    dirty: bool,
}

async fn save_with_retries(
    store: &CoercionStateStore,
    state: &SecurityState,
    attempts: u32,
) -> StoreResult<()> {
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match store.save(state).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < attempts => {
                warn!("Persisting security state failed (attempt {attempt}/{attempts}): {e}");
                tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
            }
            Err(e) => return Err(e),
        }
    }
}

impl SecurityCoordinator {
    /// Build the coordinator around a loaded state. Alerts left over from
    /// the previous run are queued again.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        mut state: SecurityState,
        deps: CoordinatorDeps,
    ) -> (Self, watch::Receiver<SecuritySnapshot>) {
        let alerts = AlertDispatcher::start(deps.backend.clone(), deps.delivery.clone());
        let carried = std::mem::take(&mut state.pending_alerts);
        if !carried.is_empty() {
            info!("Re-queueing {} undelivered alerts", carried.len());
        }
        for alert in carried {
            alerts.enqueue(alert);
        }

        let (snapshot_tx, snapshot_rx) = watch::channel(SecuritySnapshot::of(&state));
        let resume_fetch =
            state.mode == DeviceMode::Coercion && state.protected_apps == ProtectedApps::Unresolved;

        let mut coordinator = Self {
            verifier: PinVerifier::new(state.credentials.clone()),
            state,
            store: deps.store,
            backend: deps.backend,
            position: deps.position,
            activator: deps.activator,
            alerts,
            config: deps.config,
            delivery: deps.delivery,
            snapshot_tx,
            captures: JoinSet::new(),
            fetches: JoinSet::new(),
            fetch_generation: 0,
            dirty: false,
        };
        if resume_fetch {
            coordinator.start_fetch();
        }
        (coordinator, snapshot_rx)
    }

    /// Process intake until `Shutdown` or until every producer is gone.
    /// Returns the final persisted state.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Intake>) -> EngineResult<SecurityState> {
        info!("Security coordinator started");
        loop {
            tokio::select! {
                Some(joined) = self.captures.join_next(), if !self.captures.is_empty() => {
                    match joined {
                        Ok(alert) => self.dispatch(alert).await,
                        Err(e) => warn!("Position capture task failed: {e}"),
                    }
                }
                Some(joined) = self.fetches.join_next(), if !self.fetches.is_empty() => {
                    match joined {
                        Ok((generation, result)) => self.apply_fetch(generation, result).await,
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => warn!("Backend fetch task failed: {e}"),
                    }
                }
                item = rx.recv() => match item {
                    Some(Intake::Shutdown) | None => break,
                    Some(item) => self.handle(item).await,
                },
            }
        }
        self.finish().await
    }

    async fn handle(&mut self, item: Intake) {
        match item {
            Intake::SubmitPin { candidate, reply } => {
                let outcome = self.handle_pin(candidate).await;
                let _ = reply.send(outcome);
            }
            Intake::Anomaly(event) => self.handle_anomaly(event).await,
            Intake::Tamper { app_id, surface } => self.handle_tamper(app_id, surface).await,
            Intake::Panic { reason } => {
                self.raise_with_position(move |position| AlertPayload::Panic { position, reason });
            }
            Intake::Command(signed) => self.handle_command(signed).await,
            Intake::RedriveAlerts => {
                self.alerts.redrive_failed();
            }
            Intake::Shutdown => {}
        }
    }

    /// Every outcome writes the state exactly once, so reply latency does
    /// not single out any path. A write that cannot be made durable denies
    /// the attempt.
    async fn handle_pin(&mut self, candidate: Zeroizing<String>) -> UnlockOutcome {
        if self.dirty && !self.persist().await {
            return UnlockOutcome::Denied;
        }

        let outcome = self.verifier.verify(&candidate);
        drop(candidate);

        let granted = match outcome {
            VerifyOutcome::Accepted(PinKind::Normal) => {
                self.state.failed_attempts = 0;
                self.persist().await
            }
            VerifyOutcome::Accepted(PinKind::Duress) => {
                self.state.failed_attempts = 0;
                self.raise_with_position(|position| AlertPayload::DuressUnlock { position });
                if self.state.mode == DeviceMode::Normal {
                    self.state.mode = DeviceMode::Coercion;
                    self.state.protected_apps = ProtectedApps::Unresolved;
                    let durable = self.persist().await;
                    // Published even when not durable: enforcement must
                    // never lag behind the decision.
                    self.publish();
                    self.start_fetch();
                    durable
                } else {
                    self.persist().await
                }
            }
            VerifyOutcome::Rejected => {
                self.record_failure();
                self.persist().await;
                false
            }
        };

        debug!("Unlock processed");
        if granted {
            UnlockOutcome::Granted
        } else {
            UnlockOutcome::Denied
        }
    }

    fn record_failure(&mut self) {
        self.state.failed_attempts += 1;
        let threshold = self.config.max_failed_attempts;
        if threshold > 0 && self.state.failed_attempts >= threshold {
            let attempts = self.state.failed_attempts;
            self.state.failed_attempts = 0;
            let id = self.state.next_alert_id();
            self.alerts
                .enqueue(Alert::new(id, AlertPayload::RepeatedPinFailures { attempts }));
        }
    }

    async fn handle_anomaly(&mut self, event: AnomalyEvent) {
        if event.position.is_some() {
            let id = self.state.next_alert_id();
            self.dispatch(Alert::new(id, AlertPayload::from_anomaly(&event)))
                .await;
        } else {
            self.raise_with_position(move |position| {
                let mut event = event;
                event.position = position;
                AlertPayload::from_anomaly(&event)
            });
        }
    }

    async fn handle_tamper(&mut self, app_id: String, surface: TamperKind) {
        let id = self.state.next_alert_id();
        self.dispatch(Alert::new(id, AlertPayload::TamperAttempt { app_id, surface }))
            .await;
    }

    async fn handle_command(&mut self, signed: SignedCommand) {
        if let Some(last) = self.state.last_command_at {
            if signed.issued_at <= last {
                warn!("Dropping replayed remote command");
                return;
            }
        }
        let key = match self.state.command_key() {
            Ok(key) => key,
            Err(e) => {
                warn!("Command key unusable: {e}");
                return;
            }
        };
        let issued_at = signed.issued_at;
        let command = match signed.verify(&key) {
            Ok(command) => command,
            Err(_) => {
                warn!("Dropping unauthenticated remote command");
                return;
            }
        };
        self.state.last_command_at = Some(issued_at);

        match command {
            RemoteCommand::Deactivate { alert_id } => {
                self.state.mode = DeviceMode::Normal;
                self.state.protected_apps = ProtectedApps::empty();
                self.fetch_generation += 1;
                self.fetches.abort_all();
                self.persist().await;
                self.publish();
                info!(alert_id, "Remote command applied");
            }
            RemoteCommand::RefreshProtectedApps => {
                if self.state.mode == DeviceMode::Coercion {
                    self.start_fetch();
                }
                self.persist().await;
                info!("Remote command applied");
            }
            RemoteCommand::Lock => {
                self.activator.activate_idle_surface();
                self.persist().await;
                info!("Remote command applied");
            }
        }
    }

    /// Assign an id now and finish the alert once a position fix arrives
    /// or the capture times out.
    fn raise_with_position<F>(&mut self, build: F)
    where
        F: FnOnce(Option<Position>) -> AlertPayload + Send + 'static,
    {
        let id = self.state.next_alert_id();
        let provider = self.position.clone();
        let timeout = Duration::from_millis(self.config.position_timeout_ms);
        self.captures.spawn(async move {
            let position = tokio::time::timeout(timeout, provider.current_position())
                .await
                .ok()
                .flatten()
                .filter(Position::is_finite);
            Alert::new(id, build(position))
        });
    }

    async fn dispatch(&mut self, alert: Alert) {
        self.alerts.enqueue(alert);
        self.persist().await;
    }

    fn start_fetch(&mut self) {
        self.fetch_generation += 1;
        self.fetches.abort_all();

        let generation = self.fetch_generation;
        let backend = self.backend.clone();
        let attempts = self.config.fetch_attempts;
        let delays = self.delivery.clone();
        self.fetches.spawn(async move {
            let result = with_backoff("Backend fetch", attempts, &delays, || {
                let backend = backend.clone();
                async move { backend.fetch_protected_apps().await }
            })
            .await;
            (generation, result)
        });
    }

    async fn apply_fetch(&mut self, generation: u64, result: BackendResult<ProtectedAppSet>) {
        if generation != self.fetch_generation || self.state.mode != DeviceMode::Coercion {
            return;
        }
        match result {
            Ok(set) => {
                self.state.protected_apps = ProtectedApps::Resolved(set);
                self.persist().await;
                self.publish();
                debug!("Backend data applied");
            }
            Err(e) => warn!("Backend fetch failed: {e}"),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(SecuritySnapshot::of(&self.state));
    }

    /// Write the state, alerts still outstanding included. On failure the
    /// coordinator is marked dirty.
    async fn persist(&mut self) -> bool {
        self.state.pending_alerts = self.alerts.outstanding();
        match save_with_retries(&self.store, &self.state, self.config.persist_retries).await {
            Ok(()) => {
                self.dirty = false;
                true
            }
            Err(e) => {
                tracing::error!("Security state not persisted: {e}");
                self.dirty = true;
                false
            }
        }
    }

    async fn finish(mut self) -> EngineResult<SecurityState> {
        self.fetches.abort_all();
        // Captures are bounded by the position timeout.
        while let Some(joined) = self.captures.join_next().await {
            if let Ok(alert) = joined {
                self.alerts.enqueue(alert);
            }
        }

        let undelivered = self.alerts.shutdown().await;
        self.state.pending_alerts = undelivered;
        save_with_retries(&self.store, &self.state, self.config.persist_retries)
            .await
            .map_err(EngineError::from)?;
        info!(
            pending_alerts = self.state.pending_alerts.len(),
            "Security coordinator stopped"
        );
        Ok(self.state)
    }
}
