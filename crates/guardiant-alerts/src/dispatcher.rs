//! Asynchronous alert delivery.
//!
//! One lane per alert kind. Within a lane alerts go out in enqueue order;
//! lanes run concurrently, so a flood of anomaly alerts never holds back a
//! duress alert. Failed deliveries are retried with capped exponential
//! backoff and, once the attempt budget is spent, parked in the ledger
//! until re-driven.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use guardiant_core::alert::{Alert, AlertId, AlertKind, DeliveryState};
use guardiant_core::config::AlertDeliveryConfig;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;

use crate::backend::SecurityBackend;

/// Delay before retry number `attempt` (1-based): base doubling, capped.
pub fn backoff_delay(config: &AlertDeliveryConfig, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(32);
    let ms = config.base_delay_ms.saturating_mul(factor).min(config.max_delay_ms);
    Duration::from_millis(ms)
}

/// How many delivered ids are remembered for duplicate suppression.
const RECENTLY_DELIVERED: usize = 256;

#[derive(Default)]
struct Ledger {
    pending: BTreeMap<AlertId, Alert>,
    failed: BTreeMap<AlertId, Alert>,
    /// Most recent deliveries, oldest first.
    recent: VecDeque<AlertId>,
    delivered: u64,
}

impl Ledger {
    fn knows(&self, id: &AlertId) -> bool {
        self.pending.contains_key(id) || self.failed.contains_key(id) || self.recent.contains(id)
    }

    fn remember_delivered(&mut self, id: AlertId) {
        if self.recent.len() == RECENTLY_DELIVERED {
            self.recent.pop_front();
        }
        self.recent.push_back(id);
        self.delivered += 1;
    }
}

struct Shared {
    ledger: Mutex<Ledger>,
    idle: Notify,
}

impl Shared {
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct AlertDispatcher {
    lanes: HashMap<AlertKind, mpsc::UnboundedSender<Alert>>,
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl AlertDispatcher {
    /// Spawn one delivery worker per alert kind.
    pub fn start(backend: Arc<dyn SecurityBackend>, config: AlertDeliveryConfig) -> Self {
        let shared = Arc::new(Shared {
            ledger: Mutex::new(Ledger::default()),
            idle: Notify::new(),
        });
        let (shutdown, _) = watch::channel(false);

        let mut lanes = HashMap::new();
        let mut workers = Vec::new();
        for kind in AlertKind::ALL {
            let (tx, rx) = mpsc::unbounded_channel();
            lanes.insert(kind, tx);
            let lane = Lane {
                kind,
                backend: backend.clone(),
                config: config.clone(),
                shared: shared.clone(),
                shutdown: shutdown.subscribe(),
            };
            workers.push(tokio::spawn(lane.run(rx)));
        }

        Self {
            lanes,
            shared,
            shutdown,
            workers,
        }
    }

    /// Queue an alert for delivery and return immediately.
    ///
    /// Returns `false` when an alert with the same id is still outstanding
    /// or was among the last few hundred delivered.
    pub fn enqueue(&self, mut alert: Alert) -> bool {
        {
            let mut ledger = self.shared.ledger();
            if ledger.knows(&alert.id) {
                tracing::debug!("Dropping repeated alert {}", alert.id);
                return false;
            }
            alert.delivery = DeliveryState::Pending;
            ledger.pending.insert(alert.id.clone(), alert.clone());
        }
        self.send_to_lane(alert);
        true
    }

    fn send_to_lane(&self, alert: Alert) {
        let Some(lane) = self.lanes.get(&alert.kind()) else {
            return;
        };
        if lane.send(alert).is_err() {
            tracing::warn!("Alert lane closed; alert kept as pending");
        }
    }

    /// Alerts that exhausted their attempts.
    pub fn failed(&self) -> Vec<Alert> {
        self.shared.ledger().failed.values().cloned().collect()
    }

    /// Pending and failed alerts, i.e. everything not yet delivered.
    pub fn outstanding(&self) -> Vec<Alert> {
        let ledger = self.shared.ledger();
        ledger
            .pending
            .values()
            .chain(ledger.failed.values())
            .cloned()
            .collect()
    }

    pub fn delivered_count(&self) -> u64 {
        self.shared.ledger().delivered
    }

    /// Put every failed alert back in its lane with a fresh attempt budget.
    pub fn redrive_failed(&self) -> usize {
        let alerts: Vec<Alert> = {
            let mut ledger = self.shared.ledger();
            let failed = std::mem::take(&mut ledger.failed);
            failed
                .into_values()
                .map(|mut alert| {
                    alert.delivery = DeliveryState::Pending;
                    alert.attempts = 0;
                    ledger.pending.insert(alert.id.clone(), alert.clone());
                    alert
                })
                .collect()
        };
        let count = alerts.len();
        for alert in alerts {
            self.send_to_lane(alert);
        }
        if count > 0 {
            tracing::info!("Re-driving {count} failed alerts");
        }
        count
    }

    /// Wait until nothing is pending. Failed alerts do not count.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.ledger().pending.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Stop all lanes after their in-flight attempt and return what is
    /// still undelivered.
    pub async fn shutdown(self) -> Vec<Alert> {
        let _ = self.shutdown.send(true);
        drop(self.lanes);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::warn!("Alert lane ended abnormally: {e}");
            }
        }
        let ledger = self.shared.ledger();
        ledger
            .pending
            .values()
            .chain(ledger.failed.values())
            .cloned()
            .collect()
    }
}

struct Lane {
    kind: AlertKind,
    backend: Arc<dyn SecurityBackend>,
    config: AlertDeliveryConfig,
    shared: Arc<Shared>,
    shutdown: watch::Receiver<bool>,
}

enum Attempt {
    Delivered,
    Failed,
    Interrupted,
}

impl Lane {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Alert>) {
        loop {
            let alert = tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                alert = rx.recv() => match alert {
                    Some(alert) => alert,
                    None => break,
                },
            };
            if let Attempt::Interrupted = self.deliver(alert).await {
                break;
            }
        }
        tracing::debug!("Alert lane {:?} stopped", self.kind);
    }

    async fn deliver(&mut self, mut alert: Alert) -> Attempt {
        let max_attempts = self.config.max_attempts.max(1);
        loop {
            alert.attempts += 1;
            let result = self.backend.deliver_alert(&alert).await;
            match result {
                Ok(()) => {
                    self.settle(alert, DeliveryState::Delivered);
                    return Attempt::Delivered;
                }
                Err(e) if e.is_transient() && alert.attempts < max_attempts => {
                    let delay = backoff_delay(&self.config, alert.attempts);
                    tracing::debug!(
                        "Alert {} attempt {} failed ({e}); retrying in {delay:?}",
                        alert.id,
                        alert.attempts
                    );
                    self.record_attempt(&alert);
                    tokio::select! {
                        biased;
                        _ = self.shutdown.changed() => return Attempt::Interrupted,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Alert {} failed after {} attempts: {e}",
                        alert.id,
                        alert.attempts
                    );
                    self.settle(alert, DeliveryState::Failed);
                    return Attempt::Failed;
                }
            }
        }
    }

    fn record_attempt(&self, alert: &Alert) {
        if let Some(entry) = self.shared.ledger().pending.get_mut(&alert.id) {
            entry.attempts = alert.attempts;
        }
    }

    fn settle(&self, mut alert: Alert, state: DeliveryState) {
        alert.delivery = state;
        let now_idle = {
            let mut ledger = self.shared.ledger();
            ledger.pending.remove(&alert.id);
            match state {
                DeliveryState::Delivered => {
                    tracing::info!("Alert {} delivered", alert.id);
                    ledger.remember_delivered(alert.id);
                }
                DeliveryState::Failed => {
                    ledger.failed.insert(alert.id.clone(), alert);
                }
                DeliveryState::Pending => {}
            }
            ledger.pending.is_empty()
        };
        if now_idle {
            self.shared.idle.notify_waiters();
        }
    }
}
