//! Detector tasks: one per sensor stream, each feeding the coordinator's
//! intake queue.

use guardiant_core::security::{AnomalyEvent, AnomalySample};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// An evaluator over one sample stream.
pub trait AnomalyDetector: Send + 'static {
    fn name(&self) -> &'static str;

    /// Feed one sample; returns an event when it is anomalous.
    fn observe(&mut self, sample: &AnomalySample) -> Option<AnomalyEvent>;
}

/// Run `detector` over `samples`, forwarding events into `sink`.
///
/// The task ends when the sample stream closes, the sink closes, or
/// `shutdown` flips to `true`. Samples already received are evaluated
/// before a shutdown is honoured.
pub fn spawn_detector<D, T>(
    mut detector: D,
    mut samples: mpsc::Receiver<AnomalySample>,
    sink: mpsc::Sender<T>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    D: AnomalyDetector,
    T: From<AnomalyEvent> + Send + 'static,
{
    tokio::spawn(async move {
        let name = detector.name();
        tracing::debug!("Detector {name} started");
        loop {
            tokio::select! {
                biased;
                sample = samples.recv() => {
                    let Some(sample) = sample else { break };
                    if let Some(event) = detector.observe(&sample) {
                        if sink.send(T::from(event)).await.is_err() {
                            tracing::warn!("Intake closed; detector {name} stopping");
                            break;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Detector {name} stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MotionAnomalyDetector, SpeedAnomalyDetector};
    use guardiant_core::security::{AnomalyKind, Position};

    #[tokio::test]
    async fn forwards_events_in_order() {
        let (sample_tx, sample_rx) = mpsc::channel(8);
        let (event_tx, mut event_rx) = mpsc::channel::<AnomalyEvent>(8);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_detector(
            MotionAnomalyDetector::new(9.8, 25.0),
            sample_rx,
            event_tx,
            stop_rx,
        );

        sample_tx.send(AnomalySample::acceleration(1, 0.0, 0.0, 40.0)).await.unwrap();
        sample_tx.send(AnomalySample::acceleration(2, 0.0, 0.0, 9.8)).await.unwrap();
        sample_tx.send(AnomalySample::acceleration(3, 0.0, 0.0, 60.0)).await.unwrap();
        drop(sample_tx);
        handle.await.unwrap();

        assert_eq!(event_rx.recv().await.unwrap().timestamp_ms, 1);
        assert_eq!(event_rx.recv().await.unwrap().timestamp_ms, 3);
        assert!(event_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stops_on_shutdown_signal() {
        let (_sample_tx, sample_rx) = mpsc::channel(8);
        let (event_tx, _event_rx) = mpsc::channel::<AnomalyEvent>(8);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_detector(SpeedAnomalyDetector::new(100.0, 5.0), sample_rx, event_tx, stop_rx);

        stop_tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn speed_events_carry_position() {
        let (sample_tx, sample_rx) = mpsc::channel(8);
        let (event_tx, mut event_rx) = mpsc::channel::<AnomalyEvent>(8);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_detector(SpeedAnomalyDetector::new(100.0, 5.0), sample_rx, event_tx, stop_rx);

        sample_tx.send(AnomalySample::position(0, Position::new(0.0, 0.0))).await.unwrap();
        sample_tx.send(AnomalySample::position(1_000, Position::new(0.01, 0.0))).await.unwrap();
        drop(sample_tx);
        handle.await.unwrap();

        let event = event_rx.recv().await.unwrap();
        assert_eq!(event.kind, AnomalyKind::SuspiciousSpeed);
        assert_eq!(event.position, Some(Position::new(0.01, 0.0)));
    }
}
