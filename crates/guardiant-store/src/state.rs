//! Persisted security state and its schema versions.

use chrono::{DateTime, Utc};
use guardiant_core::alert::{Alert, AlertId};
use guardiant_core::security::{DeviceMode, ProtectedApp, ProtectedAppSet, ProtectedApps};
use guardiant_crypto::command::CommandKey;
use guardiant_crypto::{CryptoResult, PinCredentials};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

pub const SCHEMA_VERSION: u32 = 2;

/// Everything the device must remember across restarts.
///
/// Mode and protected apps are always written together, so a reader never
/// observes one without the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityState {
    pub schema_version: u32,
    pub device_id: String,
    pub mode: DeviceMode,
    pub credentials: PinCredentials,
    /// Base64 HMAC key authenticating pushed commands.
    pub command_key: String,
    #[serde(default)]
    pub protected_apps: ProtectedApps,
    /// Alerts not yet delivered when the engine last stopped.
    #[serde(default)]
    pub pending_alerts: Vec<Alert>,
    /// Logical clock behind alert ids. Only ever grows.
    #[serde(default)]
    pub alert_clock: u64,
    #[serde(default)]
    pub failed_attempts: u32,
    /// Issue time of the last accepted remote command. Older or equal
    /// timestamps are replays.
    #[serde(default)]
    pub last_command_at: Option<DateTime<Utc>>,
}

impl SecurityState {
    /// Fresh state for a newly provisioned device.
    pub fn provisioned(device_id: &str, credentials: PinCredentials, command_key: &CommandKey) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            device_id: device_id.to_string(),
            mode: DeviceMode::Normal,
            credentials,
            command_key: command_key.to_base64(),
            protected_apps: ProtectedApps::empty(),
            pending_alerts: Vec::new(),
            alert_clock: 0,
            failed_attempts: 0,
            last_command_at: None,
        }
    }

    pub fn command_key(&self) -> CryptoResult<CommandKey> {
        CommandKey::from_base64(&self.command_key)
    }

    /// Advance the logical clock and return the id it names.
    pub fn next_alert_id(&mut self) -> AlertId {
        self.alert_clock += 1;
        AlertId::new(&self.device_id, self.alert_clock)
    }
}

#[derive(Deserialize)]
struct VersionProbe {
    #[serde(default = "legacy_version")]
    schema_version: u32,
}

fn legacy_version() -> u32 {
    1
}

/// Version-1 layout: a flat coercion flag and a loosely named app list.
#[derive(Deserialize)]
struct StateV1 {
    device_id: String,
    credentials: PinCredentials,
    command_key: String,
    #[serde(default)]
    is_coercion_mode: bool,
    #[serde(default)]
    protected_apps: Vec<LegacyApp>,
}

#[derive(Deserialize)]
struct LegacyApp {
    app_name: String,
    package_name: String,
}

impl From<StateV1> for SecurityState {
    fn from(v1: StateV1) -> Self {
        let apps: Vec<ProtectedApp> = v1
            .protected_apps
            .into_iter()
            .map(|a| ProtectedApp::new(a.package_name, a.app_name))
            .collect();
        let (mode, protected_apps) = if v1.is_coercion_mode {
            // v1 could not tell "no apps" from "never fetched".
            let apps = if apps.is_empty() {
                ProtectedApps::Unresolved
            } else {
                ProtectedApps::Resolved(ProtectedAppSet::from_apps(apps))
            };
            (DeviceMode::Coercion, apps)
        } else {
            (DeviceMode::Normal, ProtectedApps::empty())
        };
        Self {
            schema_version: SCHEMA_VERSION,
            device_id: v1.device_id,
            mode,
            credentials: v1.credentials,
            command_key: v1.command_key,
            protected_apps,
            pending_alerts: Vec::new(),
            alert_clock: 0,
            failed_attempts: 0,
            last_command_at: None,
        }
    }
}

/// Decode stored bytes, upgrading older schemas.
///
/// Returns the state and whether it was migrated.
pub fn decode(bytes: &[u8]) -> StoreResult<(SecurityState, bool)> {
    let probe: VersionProbe =
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
    match probe.schema_version {
        1 => {
            let v1: StateV1 = serde_json::from_slice(bytes)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            Ok((v1.into(), true))
        }
        SCHEMA_VERSION => {
            let state: SecurityState = serde_json::from_slice(bytes)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            Ok((state, false))
        }
        other => Err(StoreError::UnsupportedSchema(other)),
    }
}

pub fn encode(state: &SecurityState) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(state).map_err(|e| StoreError::Serialization(e.to_string()))
}
