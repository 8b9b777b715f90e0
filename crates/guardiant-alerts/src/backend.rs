use async_trait::async_trait;
use guardiant_core::alert::Alert;
use guardiant_core::security::ProtectedAppSet;

use crate::error::BackendResult;

/// Remote security service.
///
/// Uses `async-trait` for object safety (`dyn SecurityBackend`).
#[async_trait]
pub trait SecurityBackend: Send + Sync {
    /// Current protected-app set, replacing any earlier one wholesale.
    async fn fetch_protected_apps(&self) -> BackendResult<ProtectedAppSet>;

    /// Deliver one alert. Implementations must pass `alert.id` along so
    /// the server can drop repeats.
    async fn deliver_alert(&self, alert: &Alert) -> BackendResult<()>;

    async fn save_protected_apps(&self, apps: &ProtectedAppSet) -> BackendResult<()>;

    async fn set_protection_level(&self, level: &str) -> BackendResult<()>;
}
