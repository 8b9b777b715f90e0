use async_trait::async_trait;

use crate::error::StoreResult;

/// Secure key/value persistence supplied by the platform.
///
/// Uses `async-trait` for object safety (`dyn SecureKeyValueStore`).
#[async_trait]
pub trait SecureKeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Durably replace the value under `key`.
    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()>;

    async fn delete(&self, key: &str) -> StoreResult<()>;
}
