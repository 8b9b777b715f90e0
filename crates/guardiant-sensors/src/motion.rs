use guardiant_core::config::DetectorConfig;
use guardiant_core::security::{AnomalyEvent, AnomalyKind, AnomalySample, SampleReading};

use crate::monitor::AnomalyDetector;

/// Flags impacts and falls from accelerometer samples.
///
/// Stateless across samples: only the baseline and threshold are kept.
#[derive(Debug, Clone)]
pub struct MotionAnomalyDetector {
    gravity_baseline: f64,
    threshold: f64,
}

impl MotionAnomalyDetector {
    pub fn new(gravity_baseline: f64, threshold: f64) -> Self {
        Self {
            gravity_baseline,
            threshold,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.gravity_baseline, config.motion_threshold)
    }
}

impl AnomalyDetector for MotionAnomalyDetector {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn observe(&mut self, sample: &AnomalySample) -> Option<AnomalyEvent> {
        let SampleReading::Acceleration { x, y, z } = sample.reading else {
            return None;
        };
        let magnitude = (x * x + y * y + z * z).sqrt();
        // Overflowing or NaN readings are sensor garbage, not impacts.
        if !magnitude.is_finite() {
            return None;
        }
        let residual = magnitude - self.gravity_baseline;
        if residual <= self.threshold {
            return None;
        }
        Some(AnomalyEvent {
            kind: AnomalyKind::AbnormalMovement,
            magnitude: residual,
            position: None,
            timestamp_ms: sample.timestamp_ms,
            distance_m: None,
            elapsed_secs: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardiant_core::security::Position;

    fn detector() -> MotionAnomalyDetector {
        MotionAnomalyDetector::from_config(&DetectorConfig::default())
    }

    #[test]
    fn hard_impact_fires() {
        let event = detector()
            .observe(&AnomalySample::acceleration(10, 0.0, 0.0, 40.0))
            .unwrap();
        assert_eq!(event.kind, AnomalyKind::AbnormalMovement);
        // Reported net of gravity: 40.0 - 9.8.
        assert!((event.magnitude - 30.2).abs() < 1e-9);
        assert_eq!(event.timestamp_ms, 10);
    }

    #[test]
    fn resting_device_is_quiet() {
        assert!(detector()
            .observe(&AnomalySample::acceleration(10, 0.0, 0.0, 10.0))
            .is_none());
    }

    #[test]
    fn magnitude_uses_all_axes() {
        // sqrt(24^2 + 24^2 + 0) ~= 33.9, residual ~24.1: below threshold.
        assert!(detector()
            .observe(&AnomalySample::acceleration(0, 24.0, 24.0, 0.0))
            .is_none());
        // sqrt(3 * 21^2) ~= 36.4, residual ~26.6.
        assert!(detector()
            .observe(&AnomalySample::acceleration(0, 21.0, 21.0, 21.0))
            .is_some());
    }

    #[test]
    fn non_finite_readings_are_dropped() {
        let mut d = detector();
        assert!(d
            .observe(&AnomalySample::acceleration(0, 1e200, 0.0, 0.0))
            .is_none());
        assert!(d
            .observe(&AnomalySample::acceleration(0, f64::NAN, 0.0, 40.0))
            .is_none());
        assert!(d
            .observe(&AnomalySample::acceleration(0, 0.0, f64::INFINITY, 0.0))
            .is_none());
    }

    #[test]
    fn ignores_position_samples() {
        assert!(detector()
            .observe(&AnomalySample::position(0, Position::new(0.0, 0.0)))
            .is_none());
    }
}
