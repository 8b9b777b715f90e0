//! Foreground-app notifications: enforcement decisions and tamper checks.

use std::sync::Arc;

use guardiant_core::interfaces::IdleSurfaceActivator;
use guardiant_core::security::TamperKind;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::enforcement::{Decision, EnforcementPolicy};
use crate::intake::IntakeHandle;

const INSTALLER_PACKAGES: [&str; 3] = [
    "com.android.settings",
    "com.google.android.packageinstaller",
    "com.android.packageinstaller",
];
const UNINSTALL_CLASSES: [&str; 2] = ["UninstallAppProgress", "UninstallAlertActivity"];
const SETTINGS_PACKAGE: &str = "com.android.settings";
const DEVICE_ADMIN_CLASSES: [&str; 2] = ["DeviceAdminSettings", "DeviceAdminAdd"];

/// A window coming to the foreground.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundChange {
    pub app_id: String,
    #[serde(default)]
    pub window_class: Option<String>,
}

impl ForegroundChange {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            window_class: None,
        }
    }

    pub fn with_class(app_id: impl Into<String>, window_class: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            window_class: Some(window_class.into()),
        }
    }
}

/// Recognise screens used to remove or disarm the protection.
pub fn detect_tamper(change: &ForegroundChange) -> Option<TamperKind> {
    let class = change.window_class.as_deref()?;
    let app = change.app_id.as_str();

    if INSTALLER_PACKAGES.contains(&app) && UNINSTALL_CLASSES.iter().any(|c| class.contains(c)) {
        return Some(TamperKind::UninstallAttempt);
    }
    if app == SETTINGS_PACKAGE && DEVICE_ADMIN_CLASSES.iter().any(|c| class.contains(c)) {
        return Some(TamperKind::DeviceAdminSettings);
    }
    None
}

/// Consume foreground changes until the stream closes or shutdown flips.
pub fn spawn_foreground_monitor(
    policy: EnforcementPolicy,
    activator: Arc<dyn IdleSurfaceActivator>,
    mut changes: mpsc::Receiver<ForegroundChange>,
    intake: IntakeHandle,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let change = tokio::select! {
                biased;
                change = changes.recv() => match change {
                    Some(change) => change,
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            if policy.on_foreground_app_changed(&change.app_id) == Decision::Redirect {
                activator.activate_idle_surface();
                tracing::debug!("Foreground decision applied");
            }

            if let Some(surface) = detect_tamper(&change) {
                if intake.report_tamper(change.app_id, surface).await.is_err() {
                    break;
                }
            }
        }
        tracing::debug!("Foreground monitor stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninstall_screen_in_installer() {
        let change = ForegroundChange::with_class(
            "com.google.android.packageinstaller",
            "com.android.packageinstaller.UninstallAlertActivity",
        );
        assert_eq!(detect_tamper(&change), Some(TamperKind::UninstallAttempt));
    }

    #[test]
    fn device_admin_screen() {
        let change = ForegroundChange::with_class(
            "com.android.settings",
            "com.android.settings.DeviceAdminAdd",
        );
        assert_eq!(detect_tamper(&change), Some(TamperKind::DeviceAdminSettings));
    }

    #[test]
    fn ordinary_windows_are_not_tamper() {
        assert_eq!(detect_tamper(&ForegroundChange::new("com.android.settings")), None);
        let change = ForegroundChange::with_class("bank.app", "UninstallAlertActivity");
        assert_eq!(detect_tamper(&change), None);
        let change = ForegroundChange::with_class("com.android.settings", "WifiSettings");
        assert_eq!(detect_tamper(&change), None);
    }
}
