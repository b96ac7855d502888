//! Fixed-interval request limiter with cancellable waits

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Acquisition was abandoned because shutdown was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Hands out at most one permit per interval, with a burst of one.
///
/// Owned by a single poller, so it needs `&mut self` rather than a lock.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_permit: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_permit: None,
        }
    }

    /// Wait for the next permit, or return `Cancelled` as soon as the token
    /// fires. A cancelled wait does not consume a permit.
    pub async fn acquire(&mut self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let now = Instant::now();
        if let Some(at) = self.next_permit {
            if at > now {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(Cancelled),
                    () = tokio::time::sleep_until(at) => {}
                }
            }
        }

        self.next_permit = Some(Instant::now() + self.interval);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_permit_is_immediate() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let start = Instant::now();
        limiter.acquire(&cancel).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_permit_waits_one_interval() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let start = Instant::now();
        limiter.acquire(&cancel).await.unwrap();
        limiter.acquire(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_passed() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        let start = Instant::now();
        limiter.acquire(&cancel).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_wait() {
        let mut limiter = RateLimiter::new(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        assert_eq!(limiter.acquire(&cancel).await, Err(Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_already_cancelled_returns_immediately() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(limiter.acquire(&cancel).await, Err(Cancelled));
    }
}
