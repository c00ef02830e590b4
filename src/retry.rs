//! Bounded retry helper

use std::future::Future;

/// Run `f` once, then retry up to `retries` more times while it fails.
///
/// Returns the first success or the error from the final attempt.
pub async fn with_retries<T, E, F, Fut>(retries: u32, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut remaining = retries;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if remaining == 0 => return Err(err),
            Err(_) => {
                remaining -= 1;
                tracing::debug!("attempt failed, {} retries left", remaining);
            }
        }
    }
}
