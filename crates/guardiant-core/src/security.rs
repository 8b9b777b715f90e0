//! Security domain types shared by every Guardiant crate.
//!
//! Device mode, the protected-app set, sensor samples and the anomaly
//! events derived from them, plus the remote commands the backend may push.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Mean Earth radius in metres, used for great-circle distances.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Operating mode of the device. Exactly one holds at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    #[default]
    Normal,
    /// Entered on a duress unlock. Only an authenticated remote
    /// deactivation leaves this mode.
    Coercion,
}

/// An application the owner wants hidden while under coercion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedApp {
    pub identifier: String,
    pub display_name: String,
}

impl ProtectedApp {
    pub fn new(identifier: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: display_name.into(),
        }
    }
}

/// Set of protected apps, unique by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ProtectedApp>", into = "Vec<ProtectedApp>")]
pub struct ProtectedAppSet {
    apps: BTreeMap<String, ProtectedApp>,
}

impl ProtectedAppSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from a list. A later duplicate identifier replaces an
    /// earlier one.
    pub fn from_apps(apps: impl IntoIterator<Item = ProtectedApp>) -> Self {
        let apps = apps
            .into_iter()
            .map(|app| (app.identifier.clone(), app))
            .collect();
        Self { apps }
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.apps.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProtectedApp> {
        self.apps.values()
    }
}

impl From<Vec<ProtectedApp>> for ProtectedAppSet {
    fn from(apps: Vec<ProtectedApp>) -> Self {
        Self::from_apps(apps)
    }
}

impl From<ProtectedAppSet> for Vec<ProtectedApp> {
    fn from(set: ProtectedAppSet) -> Self {
        set.apps.into_values().collect()
    }
}

/// Whether the protected-app set is known.
///
/// `Unresolved` is the transient state between entering coercion and the
/// backend answering; enforcement fails closed while it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "apps", rename_all = "snake_case")]
pub enum ProtectedApps {
    Unresolved,
    Resolved(ProtectedAppSet),
}

impl ProtectedApps {
    pub fn empty() -> Self {
        ProtectedApps::Resolved(ProtectedAppSet::new())
    }

    pub fn resolved(&self) -> Option<&ProtectedAppSet> {
        match self {
            ProtectedApps::Resolved(set) => Some(set),
            ProtectedApps::Unresolved => None,
        }
    }
}

impl Default for ProtectedApps {
    fn default() -> Self {
        Self::empty()
    }
}

/// A geographic fix in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Both coordinates are real numbers.
    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Great-circle (haversine) distance to `other`, in metres.
    pub fn distance_m(&self, other: &Position) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = ((dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2))
            .clamp(0.0, 1.0);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SampleReading {
    /// 3-axis accelerometer reading in m/s².
    Acceleration { x: f64, y: f64, z: f64 },
    Position { latitude: f64, longitude: f64 },
}

/// Raw sensor reading with a monotonic timestamp in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalySample {
    pub timestamp_ms: u64,
    pub reading: SampleReading,
}

impl AnomalySample {
    pub fn acceleration(timestamp_ms: u64, x: f64, y: f64, z: f64) -> Self {
        Self {
            timestamp_ms,
            reading: SampleReading::Acceleration { x, y, z },
        }
    }

    pub fn position(timestamp_ms: u64, position: Position) -> Self {
        Self {
            timestamp_ms,
            reading: SampleReading::Position {
                latitude: position.latitude,
                longitude: position.longitude,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    AbnormalMovement,
    SuspiciousSpeed,
}

/// A sensor-derived signal of possible theft or abuse. Never persisted
/// beyond the alert it produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub kind: AnomalyKind,
    /// Acceleration net of gravity (m/s²) or implied speed (m/s).
    pub magnitude: f64,
    pub position: Option<Position>,
    pub timestamp_ms: u64,
    /// Displacement behind a speed anomaly, in metres.
    pub distance_m: Option<f64>,
    /// Elapsed time behind a speed anomaly, in seconds.
    pub elapsed_secs: Option<f64>,
}

/// Sensitive system surface a foreground change landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TamperKind {
    UninstallAttempt,
    DeviceAdminSettings,
}

/// Commands the backend pushes to the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RemoteCommand {
    /// Leave coercion mode and clear the protected-app set.
    Deactivate { alert_id: String },
    /// Re-fetch the protected-app set, replacing it wholesale.
    RefreshProtectedApps,
    /// Bring up the idle surface without changing mode.
    Lock,
}
