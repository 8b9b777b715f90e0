use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::security::{AnomalyEvent, AnomalyKind, Position, TamperKind};

/// Deterministic alert identifier: device id plus logical clock.
///
/// The backend uses it as an idempotency key, so re-sending the same alert
/// never produces a second server-side record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(String);

impl AlertId {
    pub fn new(device_id: &str, clock: u64) -> Self {
        Self(format!("{device_id}:{clock}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    DuressUnlock,
    Panic,
    AbnormalMovement,
    SuspiciousSpeed,
    TamperAttempt,
    RepeatedPinFailures,
}

impl AlertKind {
    pub const ALL: [AlertKind; 6] = [
        AlertKind::DuressUnlock,
        AlertKind::Panic,
        AlertKind::AbnormalMovement,
        AlertKind::SuspiciousSpeed,
        AlertKind::TamperAttempt,
        AlertKind::RepeatedPinFailures,
    ];
}

/// Kind-specific alert contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertPayload {
    DuressUnlock {
        position: Option<Position>,
    },
    Panic {
        position: Option<Position>,
        reason: String,
    },
    AbnormalMovement {
        position: Option<Position>,
        acceleration: f64,
    },
    SuspiciousSpeed {
        position: Option<Position>,
        speed_mps: f64,
        distance_m: Option<f64>,
        elapsed_secs: Option<f64>,
    },
    TamperAttempt {
        app_id: String,
        surface: TamperKind,
    },
    RepeatedPinFailures {
        attempts: u32,
    },
}

impl AlertPayload {
    pub fn kind(&self) -> AlertKind {
        match self {
            AlertPayload::DuressUnlock { .. } => AlertKind::DuressUnlock,
            AlertPayload::Panic { .. } => AlertKind::Panic,
            AlertPayload::AbnormalMovement { .. } => AlertKind::AbnormalMovement,
            AlertPayload::SuspiciousSpeed { .. } => AlertKind::SuspiciousSpeed,
            AlertPayload::TamperAttempt { .. } => AlertKind::TamperAttempt,
            AlertPayload::RepeatedPinFailures { .. } => AlertKind::RepeatedPinFailures,
        }
    }

    /// Build the payload describing an anomaly.
    pub fn from_anomaly(event: &AnomalyEvent) -> Self {
        match event.kind {
            AnomalyKind::AbnormalMovement => AlertPayload::AbnormalMovement {
                position: event.position,
                acceleration: event.magnitude,
            },
            AnomalyKind::SuspiciousSpeed => AlertPayload::SuspiciousSpeed {
                position: event.position,
                speed_mps: event.magnitude,
                distance_m: event.distance_m,
                elapsed_secs: event.elapsed_secs,
            },
        }
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            AlertPayload::DuressUnlock { position }
            | AlertPayload::Panic { position, .. }
            | AlertPayload::AbnormalMovement { position, .. }
            | AlertPayload::SuspiciousSpeed { position, .. } => *position,
            AlertPayload::TamperAttempt { .. } | AlertPayload::RepeatedPinFailures { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Delivered,
    Failed,
}

/// An outbound security event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub payload: AlertPayload,
    pub created_at: DateTime<Utc>,
    pub delivery: DeliveryState,
    pub attempts: u32,
}

impl Alert {
    pub fn new(id: AlertId, payload: AlertPayload) -> Self {
        Self {
            id,
            payload,
            created_at: Utc::now(),
            delivery: DeliveryState::Pending,
            attempts: 0,
        }
    }

    pub fn kind(&self) -> AlertKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_id_is_deterministic() {
        assert_eq!(AlertId::new("dev-1", 7), AlertId::new("dev-1", 7));
        assert_ne!(AlertId::new("dev-1", 7), AlertId::new("dev-1", 8));
        assert_eq!(AlertId::new("dev-1", 7).as_str(), "dev-1:7");
    }

    #[test]
    fn new_alert_is_pending() {
        let alert = Alert::new(
            AlertId::new("dev", 1),
            AlertPayload::DuressUnlock { position: None },
        );
        assert_eq!(alert.delivery, DeliveryState::Pending);
        assert_eq!(alert.attempts, 0);
        assert_eq!(alert.kind(), AlertKind::DuressUnlock);
    }

    #[test]
    fn payload_from_speed_anomaly() {
        let event = AnomalyEvent {
            kind: AnomalyKind::SuspiciousSpeed,
            magnitude: 50.0,
            position: Some(Position::new(1.0, 2.0)),
            timestamp_ms: 3_000,
            distance_m: Some(150.0),
            elapsed_secs: Some(3.0),
        };
        let payload = AlertPayload::from_anomaly(&event);
        assert_eq!(payload.kind(), AlertKind::SuspiciousSpeed);
        assert_eq!(payload.position(), Some(Position::new(1.0, 2.0)));
    }

    #[test]
    fn alert_json_roundtrip() {
        let alert = Alert::new(
            AlertId::new("dev", 3),
            AlertPayload::TamperAttempt {
                app_id: "com.android.settings".into(),
                surface: TamperKind::DeviceAdminSettings,
            },
        );
        let json = serde_json::to_string(&alert).unwrap();
        let back: Alert = serde_json::from_str(&json).unwrap();
        assert_eq!(back, alert);
    }
}
