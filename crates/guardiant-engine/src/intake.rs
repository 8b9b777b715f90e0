//! The single ordered intake queue feeding the coordinator.

use guardiant_core::auth::UnlockOutcome;
use guardiant_core::security::{AnomalyEvent, TamperKind};
use guardiant_crypto::command::SignedCommand;
use tokio::sync::{mpsc, oneshot};
use zeroize::Zeroizing;

use crate::error::{EngineError, EngineResult};

/// Work items for the coordinator, in arrival order.
pub enum Intake {
    SubmitPin {
        candidate: Zeroizing<String>,
        reply: oneshot::Sender<UnlockOutcome>,
    },
    Anomaly(AnomalyEvent),
    Tamper {
        app_id: String,
        surface: TamperKind,
    },
    Panic {
        reason: String,
    },
    Command(SignedCommand),
    RedriveAlerts,
    Shutdown,
}

impl From<AnomalyEvent> for Intake {
    fn from(event: AnomalyEvent) -> Self {
        Intake::Anomaly(event)
    }
}

/// Cloneable producer side of the intake queue.
#[derive(Clone)]
pub struct IntakeHandle {
    tx: mpsc::Sender<Intake>,
}

impl IntakeHandle {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Intake>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Raw sender, for producers that forward their own items.
    pub fn sender(&self) -> mpsc::Sender<Intake> {
        self.tx.clone()
    }

    async fn send(&self, item: Intake) -> EngineResult<()> {
        self.tx.send(item).await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Submit a PIN and wait for the unlock outcome.
    pub async fn submit_pin(&self, candidate: &str) -> EngineResult<UnlockOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Intake::SubmitPin {
            candidate: Zeroizing::new(candidate.to_string()),
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn report_anomaly(&self, event: AnomalyEvent) -> EngineResult<()> {
        self.send(Intake::Anomaly(event)).await
    }

    pub async fn report_tamper(&self, app_id: String, surface: TamperKind) -> EngineResult<()> {
        self.send(Intake::Tamper { app_id, surface }).await
    }

    pub async fn panic(&self, reason: impl Into<String>) -> EngineResult<()> {
        self.send(Intake::Panic {
            reason: reason.into(),
        })
        .await
    }

    pub async fn remote_command(&self, command: SignedCommand) -> EngineResult<()> {
        self.send(Intake::Command(command)).await
    }

    pub async fn redrive_alerts(&self) -> EngineResult<()> {
        self.send(Intake::RedriveAlerts).await
    }

    pub async fn shutdown(&self) -> EngineResult<()> {
        self.send(Intake::Shutdown).await
    }
}
