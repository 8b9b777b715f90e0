use guardiant_core::config::DetectorConfig;
use guardiant_core::security::{AnomalyEvent, AnomalyKind, AnomalySample, Position, SampleReading};

use crate::monitor::AnomalyDetector;

/// Flags teleport-like displacement between consecutive position fixes.
#[derive(Debug, Clone)]
pub struct SpeedAnomalyDetector {
    distance_threshold_m: f64,
    window_secs: f64,
    last: Option<(Position, u64)>,
}

impl SpeedAnomalyDetector {
    pub fn new(distance_threshold_m: f64, window_secs: f64) -> Self {
        Self {
            distance_threshold_m,
            window_secs,
            last: None,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.speed_distance_m, config.speed_window_secs)
    }

    /// Judge a displacement directly. Exposed for callers that already
    /// hold distance and elapsed time.
    pub fn is_suspicious(&self, distance_m: f64, elapsed_secs: f64) -> bool {
        distance_m > self.distance_threshold_m && elapsed_secs < self.window_secs
    }
}

impl AnomalyDetector for SpeedAnomalyDetector {
    fn name(&self) -> &'static str {
        "speed"
    }

    fn observe(&mut self, sample: &AnomalySample) -> Option<AnomalyEvent> {
        let SampleReading::Position {
            latitude,
            longitude,
        } = sample.reading
        else {
            return None;
        };
        let current = Position::new(latitude, longitude);
        if !current.is_finite() {
            return None;
        }
        let previous = self.last.replace((current, sample.timestamp_ms));

        let (last_pos, last_ts) = previous?;
        let distance_m = last_pos.distance_m(&current);
        if !distance_m.is_finite() {
            return None;
        }
        let elapsed_secs = sample.timestamp_ms.saturating_sub(last_ts) as f64 / 1000.0;
        if !self.is_suspicious(distance_m, elapsed_secs) {
            return None;
        }

        // Same-instant fixes still count; clamp to keep the speed finite.
        let speed_mps = distance_m / elapsed_secs.max(0.001);
        Some(AnomalyEvent {
            kind: AnomalyKind::SuspiciousSpeed,
            magnitude: speed_mps,
            position: Some(current),
            timestamp_ms: sample.timestamp_ms,
            distance_m: Some(distance_m),
            elapsed_secs: Some(elapsed_secs),
        })
    }
}
