use std::sync::Arc;

use crate::error::StoreResult;
use crate::state::{self, SecurityState};
use crate::traits::SecureKeyValueStore;

const STATE_KEY: &str = "security_state";

/// Durable record of device mode, protected apps and credentials.
///
/// `save` returns only once the backing store reports the write durable.
#[derive(Clone)]
pub struct CoercionStateStore {
    kv: Arc<dyn SecureKeyValueStore>,
}

impl CoercionStateStore {
    pub fn new(kv: Arc<dyn SecureKeyValueStore>) -> Self {
        Self { kv }
    }

    /// Load the state, upgrading and rewriting older schemas.
    /// `None` means the device was never provisioned.
    pub async fn load(&self) -> StoreResult<Option<SecurityState>> {
        let Some(bytes) = self.kv.get(STATE_KEY).await? else {
            return Ok(None);
        };
        let (state, migrated) = state::decode(&bytes)?;
        if migrated {
            tracing::info!("Migrated security state to schema v{}", state.schema_version);
            self.save(&state).await?;
        }
        Ok(Some(state))
    }

    pub async fn save(&self, state: &SecurityState) -> StoreResult<()> {
        let bytes = state::encode(state)?;
        self.kv.put(STATE_KEY, bytes).await
    }

    pub async fn erase(&self) -> StoreResult<()> {
        self.kv.delete(STATE_KEY).await
    }
}
