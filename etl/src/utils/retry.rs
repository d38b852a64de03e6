//! Async retry with exponential backoff

use std::time::Duration;

/// Retry an async operation with exponential backoff.
///
/// The delay before attempt `n + 1` is `base_delay_ms * 2^(n - 1)`.
/// Returns `Ok((value, attempts))` on success, or `Err((error, attempts))`
/// once `max_attempts` have failed.
pub async fn retry_with_backoff_async<F, Fut, T, E>(
    max_attempts: u32,
    base_delay_ms: u64,
    mut operation: F,
) -> Result<(T, u32), (E, u32)>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match operation(attempts).await {
            Ok(value) => return Ok((value, attempts)),
            Err(e) => {
                if attempts >= max_attempts {
                    return Err((e, attempts));
                }
                let delay = Duration::from_millis(
                    base_delay_ms.saturating_mul(2_u64.saturating_pow(attempts - 1)),
                );
                tracing::warn!(
                    error = %e,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    "Retrying after error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[tokio::test]
    async fn test_success_on_first_try() {
        let result = retry_with_backoff_async(3, 10, |_| async { Ok::<_, &str>(7) }).await;
        assert_eq!(result, Ok((7, 1)));
    }

    #[tokio::test]
    async fn test_success_after_retry() {
        let calls = RefCell::new(0);
        let result = retry_with_backoff_async(3, 1, |_| {
            *calls.borrow_mut() += 1;
            let n = *calls.borrow();
            async move {
                if n < 2 {
                    Err("transient error")
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert_eq!(result, Ok(((), 2)));
    }

    #[tokio::test]
    async fn test_failure_after_max_retries() {
        let result =
            retry_with_backoff_async(3, 1, |_| async { Err::<(), _>("persistent error") }).await;
        let (error, attempts) = result.unwrap_err();
        assert_eq!(error, "persistent error");
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let result = retry_with_backoff_async(0, 1, |attempt| async move {
            Err::<(), _>(format!("attempt {}", attempt))
        })
        .await;
        assert_eq!(result, Err(("attempt 1".to_string(), 1)));
    }
}
