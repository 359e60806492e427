use std::future::Future;
use std::time::Duration;

use crate::error::ClientError;

/// Retry an operation on apiserver server-timeout errors with a short
/// exponential backoff. Other errors propagate immediately.
pub async fn retry_on_server_timeout<T, F, Fut>(
    attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut delay = base_delay;
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_server_timeout() && attempt + 1 < attempts => {
                attempt += 1;
                tracing::warn!(error = %err, attempt, "server timeout, retrying");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(err) => return Err(err),
        }
    }
}
