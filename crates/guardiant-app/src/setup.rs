use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use guardiant_alerts::HttpBackend;
use guardiant_core::config::AppConfig;
use guardiant_crypto::sealing_key::SealingKey;
use guardiant_store::sealed_file::SealedFileStore;
use guardiant_store::CoercionStateStore;

const DEVICE_SECRET_FILE: &str = "device.key";

/// Read the device secret, creating it on first use.
async fn device_secret(state_dir: &Path) -> Result<Vec<u8>> {
    let path = state_dir.join(DEVICE_SECRET_FILE);
    match tokio::fs::read(&path).await {
        Ok(secret) => Ok(secret),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(state_dir)
                .await
                .with_context(|| format!("creating {}", state_dir.display()))?;
            let secret = SealingKey::generate_secret().to_vec();
            tokio::fs::write(&path, &secret)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
            }
            tracing::info!("Generated device secret at {}", path.display());
            Ok(secret)
        }
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

pub async fn open_store(config: &AppConfig) -> Result<CoercionStateStore> {
    let state_dir = Path::new(&config.device.state_dir);
    let secret = device_secret(state_dir).await?;
    let key = SealingKey::derive(&secret, &config.device.device_id)?;
    Ok(CoercionStateStore::new(Arc::new(SealedFileStore::new(
        state_dir, key,
    ))))
}

pub fn open_backend(config: &AppConfig) -> Result<Arc<HttpBackend>> {
    if config.backend.resolve_token().is_none() {
        tracing::warn!("No backend token configured; requests are unauthenticated");
    }
    Ok(Arc::new(HttpBackend::new(&config.backend)?))
}
