use std::future::Future;

use guardiant_alerts::dispatcher::backoff_delay;
use guardiant_alerts::BackendResult;
use guardiant_core::config::AlertDeliveryConfig;

/// Run a backend call up to `attempts` times, backing off between
/// transient failures. Permanent failures return at once.
pub async fn with_backoff<T, F, Fut>(
    what: &str,
    attempts: u32,
    delays: &AlertDeliveryConfig,
    mut op: F,
) -> BackendResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BackendResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = backoff_delay(delays, attempt);
                tracing::debug!("{what} failed ({e}); retry {attempt}/{attempts} in {delay:?}");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
