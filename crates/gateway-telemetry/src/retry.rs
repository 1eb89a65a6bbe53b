//! Exponential backoff for batch flushes (spec.md §4.6 "retry up to N times
//! with backoff = base · 2^(attempt−1)").

use std::time::Duration;

/// Runs `f` until it succeeds or `max_retries` attempts have failed,
/// sleeping `base * 2^(attempt-1)` between attempts. Returns the last error
/// on exhaustion.
pub async fn retry_with_backoff<F, Fut, T, E>(max_retries: u32, base: Duration, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt > max_retries {
                    return Err(err);
                }
                let backoff = base * 2u32.pow(attempt - 1);
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_sleeping_on_the_first_try() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_with_backoff(3, Duration::from_millis(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_exhausting_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_with_backoff(2, Duration::from_millis(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("still failing")
        })
        .await;
        assert_eq!(result, Err("still failing"));
        // One initial attempt plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
