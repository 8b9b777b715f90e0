//! First-time device setup as an explicit saga.
//!
//! 1. Create credentials and the command key, and write the initial state.
//! 2. Upload the protected-app selection.
//! 3. Set the protection level.
//!
//! Remote steps are retried. If one still fails, the local write from
//! step 1 is erased so no half-provisioned device is left behind.

use guardiant_alerts::SecurityBackend;
use guardiant_core::config::AlertDeliveryConfig;
use guardiant_core::security::ProtectedAppSet;
use guardiant_crypto::command::CommandKey;
use guardiant_crypto::PinCredentials;
use guardiant_store::{CoercionStateStore, SecurityState};

use crate::error::{EngineError, EngineResult};
use crate::retry::with_backoff;

pub const DEFAULT_PROTECTION_LEVEL: &str = "extreme";

pub struct ProvisioningRequest {
    pub device_id: String,
    pub normal_pin: String,
    pub duress_pin: String,
    pub protected_apps: ProtectedAppSet,
    pub protection_level: String,
}

/// Outcome of a completed saga. The command key is shared with the
/// backend so it can authenticate pushed commands.
pub struct Provisioned {
    pub state: SecurityState,
    pub command_key: CommandKey,
}

pub struct Provisioner<'a> {
    store: &'a CoercionStateStore,
    backend: &'a dyn SecurityBackend,
    delays: AlertDeliveryConfig,
    attempts: u32,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        store: &'a CoercionStateStore,
        backend: &'a dyn SecurityBackend,
        delays: AlertDeliveryConfig,
        attempts: u32,
    ) -> Self {
        Self {
            store,
            backend,
            delays,
            attempts,
        }
    }

    pub async fn provision(&self, request: ProvisioningRequest) -> EngineResult<Provisioned> {
        if self.store.load().await?.is_some() {
            return Err(EngineError::AlreadyProvisioned);
        }

        let credentials = PinCredentials::provision(&request.normal_pin, &request.duress_pin)?;
        let command_key = CommandKey::generate();
        let state = SecurityState::provisioned(&request.device_id, credentials, &command_key);
        self.store.save(&state).await?;
        tracing::info!(device_id = %request.device_id, "Local credentials stored");

        if let Err(e) = self.remote_steps(&request).await {
            tracing::error!("Provisioning failed, rolling back local state: {e}");
            if let Err(erase) = self.store.erase().await {
                tracing::error!("Rollback failed: {erase}");
            }
            return Err(EngineError::Provisioning(e.to_string()));
        }

        tracing::info!("Provisioning complete");
        Ok(Provisioned { state, command_key })
    }

    async fn remote_steps(&self, request: &ProvisioningRequest) -> EngineResult<()> {
        let backend = self.backend;
        let apps = &request.protected_apps;
        with_backoff("saveProtectedApps", self.attempts, &self.delays, move || {
            backend.save_protected_apps(apps)
        })
        .await?;
        tracing::info!(apps = apps.len(), "Protected apps uploaded");

        let level = request.protection_level.as_str();
        with_backoff("setProtectionLevel", self.attempts, &self.delays, move || {
            backend.set_protection_level(level)
        })
        .await?;
        Ok(())
    }
}
