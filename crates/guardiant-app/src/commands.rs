use anyhow::{bail, Result};
use guardiant_core::config::AppConfig;
use guardiant_core::security::{ProtectedApp, ProtectedAppSet};
use guardiant_engine::provisioning::{Provisioner, ProvisioningRequest};

use crate::setup::{open_backend, open_store};

/// Parse `package` or `package=Display Name`.
pub fn parse_app(arg: &str) -> Result<ProtectedApp> {
    let (id, name) = match arg.split_once('=') {
        Some((id, name)) => (id.trim(), name.trim()),
        None => (arg.trim(), arg.trim()),
    };
    if id.is_empty() {
        bail!("empty app identifier in {arg:?}");
    }
    Ok(ProtectedApp::new(id, name))
}

pub async fn provision(
    config: &AppConfig,
    normal_pin: String,
    security_pin: String,
    apps: Vec<String>,
    level: String,
) -> Result<()> {
    let protected_apps = ProtectedAppSet::from_apps(
        apps.iter()
            .map(|arg| parse_app(arg))
            .collect::<Result<Vec<_>>>()?,
    );
    let store = open_store(config).await?;
    let backend = open_backend(config)?;
    let provisioner = Provisioner::new(
        &store,
        backend.as_ref(),
        config.alerts.clone(),
        config.coordinator.fetch_attempts,
    );
    let done = provisioner
        .provision(ProvisioningRequest {
            device_id: config.device.device_id.clone(),
            normal_pin,
            duress_pin: security_pin,
            protected_apps,
            protection_level: level,
        })
        .await?;

    println!("provisioned {}", done.state.device_id);
    println!("command_key {}", done.command_key.to_base64());
    Ok(())
}

/// Print provisioning facts. The device mode is never shown here.
pub async fn status(config: &AppConfig) -> Result<()> {
    let store = open_store(config).await?;
    match store.load().await? {
        Some(state) => {
            println!("device: {}", state.device_id);
            println!("provisioned: yes");
            println!("schema: v{}", state.schema_version);
            println!("pending alerts: {}", state.pending_alerts.len());
        }
        None => {
            println!("device: {}", config.device.device_id);
            println!("provisioned: no");
        }
    }
    Ok(())
}
