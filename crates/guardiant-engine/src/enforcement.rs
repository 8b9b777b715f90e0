use std::collections::HashSet;

use guardiant_core::config::EnforcementConfig;
use guardiant_core::security::{DeviceMode, ProtectedApps};
use guardiant_store::SecurityState;
use tokio::sync::watch;

/// The part of the security state enforcement reads. Published by the
/// coordinator after every change, mode and app set together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecuritySnapshot {
    pub mode: DeviceMode,
    pub protected_apps: ProtectedApps,
}

impl SecuritySnapshot {
    pub fn of(state: &SecurityState) -> Self {
        Self {
            mode: state.mode,
            protected_apps: state.protected_apps.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Send the device back to its idle surface, silently.
    Redirect,
}

/// Decides whether a foreground application may stay in front.
#[derive(Clone)]
pub struct EnforcementPolicy {
    snapshot: watch::Receiver<SecuritySnapshot>,
    self_app_id: String,
    system_apps: HashSet<String>,
    system_prefixes: Vec<String>,
}

impl EnforcementPolicy {
    pub fn new(
        snapshot: watch::Receiver<SecuritySnapshot>,
        self_app_id: &str,
        config: &EnforcementConfig,
    ) -> Self {
        Self {
            snapshot,
            self_app_id: self_app_id.to_string(),
            system_apps: config.allowed_system_apps.iter().cloned().collect(),
            system_prefixes: config.allowed_system_prefixes.clone(),
        }
    }

    /// Decide against the latest published snapshot.
    pub fn on_foreground_app_changed(&self, app_id: &str) -> Decision {
        let snapshot = self.snapshot.borrow();
        self.decide(&snapshot, app_id)
    }

    pub fn current(&self) -> SecuritySnapshot {
        self.snapshot.borrow().clone()
    }

    fn is_system_app(&self, app_id: &str) -> bool {
        self.system_apps.contains(app_id)
            || self
                .system_prefixes
                .iter()
                .any(|prefix| app_id.starts_with(prefix.as_str()))
    }

    pub fn decide(&self, snapshot: &SecuritySnapshot, app_id: &str) -> Decision {
        if snapshot.mode == DeviceMode::Normal {
            return Decision::Allow;
        }
        if app_id == self.self_app_id {
            return Decision::Redirect;
        }
        match &snapshot.protected_apps {
            ProtectedApps::Resolved(set) if set.contains(app_id) => Decision::Redirect,
            _ if self.is_system_app(app_id) => Decision::Allow,
            ProtectedApps::Resolved(_) => Decision::Allow,
            // Unknown set: every third-party app is hidden.
            ProtectedApps::Unresolved => Decision::Redirect,
        }
    }
}
