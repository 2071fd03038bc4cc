//! Rate limiter implementation using token bucket algorithm.
//!
//! The bucket starts full with one token per allowed request per minute and
//! a background task adds a single token every `60s / requests_per_minute`,
//! never exceeding the capacity. Callers poll for a token until one is
//! available or their deadline/cancellation fires. No fairness is guaranteed
//! between concurrent waiters.

use crate::error::WaitCanceled;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Delay between availability checks while waiting for a token
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct Bucket {
    capacity: u32,
    available: AtomicU32,
}

impl Bucket {
    fn try_take(&self) -> bool {
        self.available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    fn refill_one(&self) -> bool {
        let capacity = self.capacity;
        self.available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .is_ok()
    }
}

/// Token bucket limiter for outbound catalog requests
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Arc<Bucket>,
    refill_interval: Duration,
    shutdown: CancellationToken,
    refill_task: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// Create a full bucket and start its refill task
    ///
    /// Must be called from within a Tokio runtime. A rate of zero is
    /// treated as one request per minute.
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = if requests_per_minute == 0 {
            warn!("Rate limit of 0 requests per minute is not usable, using 1");
            1
        } else {
            requests_per_minute
        };

        let refill_interval = Duration::from_secs(60) / capacity;
        let bucket = Arc::new(Bucket {
            capacity,
            available: AtomicU32::new(capacity),
        });
        let shutdown = CancellationToken::new();

        let refill_task = tokio::spawn(refill_loop(
            Arc::clone(&bucket),
            refill_interval,
            shutdown.clone(),
        ));

        debug!(
            capacity = capacity,
            refill_ms = refill_interval.as_millis() as u64,
            "Rate limiter started"
        );

        Self {
            bucket,
            refill_interval,
            shutdown,
            refill_task: Mutex::new(Some(refill_task)),
        }
    }

    /// Maximum number of stored tokens
    pub fn capacity(&self) -> u32 {
        self.bucket.capacity
    }

    /// Tokens currently available
    pub fn available(&self) -> u32 {
        self.bucket.available.load(Ordering::Acquire)
    }

    /// Time between two refill ticks
    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Take a token if one is available, without waiting
    pub fn try_acquire(&self) -> bool {
        self.bucket.try_take()
    }

    /// Wait for a token until `cancel` fires
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), WaitCanceled> {
        self.poll_until(cancel.cancelled()).await
    }

    /// Wait for a token for at most `timeout`
    ///
    /// A timeout too large to represent as a deadline waits without one.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<(), WaitCanceled> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.poll_until(sleep_until(deadline)).await,
            None => self.poll_until(std::future::pending::<()>()).await,
        }
    }

    async fn poll_until<F: Future>(&self, stop: F) -> Result<(), WaitCanceled> {
        tokio::pin!(stop);

        loop {
            if self.bucket.try_take() {
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = &mut stop => {
                    // A refill may have landed in the same instant
                    if self.bucket.try_take() {
                        return Ok(());
                    }
                    debug!("Rate limit: wait canceled before a token became available");
                    return Err(WaitCanceled);
                }
                _ = sleep(POLL_INTERVAL) => {}
            }
        }
    }

    /// Whether the refill task has been stopped
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop the refill task and wait for it to finish
    ///
    /// Tokens already in the bucket can still be taken afterwards.
    pub async fn close(&self) {
        self.shutdown.cancel();

        let handle = match self.refill_task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Rate limiter refill task ended abnormally");
            }
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn refill_loop(bucket: Arc<Bucket>, period: Duration, shutdown: CancellationToken) {
    // The bucket starts full, so the first tick is one period away
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Rate limiter refill task stopped");
                break;
            }
            _ = ticker.tick() => {
                bucket.refill_one();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;

    #[tokio::test]
    async fn test_new_limiter_is_full() {
        let limiter = RateLimiter::new(60);
        assert_eq!(limiter.capacity(), 60);
        assert_eq!(limiter.available(), 60);
        assert_eq!(limiter.refill_interval(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_zero_rate_is_clamped() {
        let limiter = RateLimiter::new(0);
        assert_eq!(limiter.capacity(), 1);
        assert_eq!(limiter.refill_interval(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_burst_up_to_capacity_does_not_block() {
        let limiter = RateLimiter::new(5);
        let start = StdInstant::now();

        for _ in 0..5 {
            limiter.wait_timeout(Duration::from_secs(5)).await.unwrap();
        }

        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(limiter.available(), 0);
    }

    #[tokio::test]
    async fn test_wait_times_out_when_depleted() {
        let limiter = RateLimiter::new(5);
        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }

        let start = StdInstant::now();
        let result = limiter.wait_timeout(Duration::from_millis(50)).await;

        assert_eq!(result, Err(WaitCanceled));
        // Returns within one poll interval of the deadline
        assert!(start.elapsed() < Duration::from_millis(50) + POLL_INTERVAL * 3);
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_does_not_panic() {
        let limiter = RateLimiter::new(5);

        limiter
            .wait_timeout(Duration::from_secs(i64::MAX as u64))
            .await
            .unwrap();
        limiter.wait_timeout(Duration::MAX).await.unwrap();

        assert_eq!(limiter.available(), 3);
    }

    #[tokio::test]
    async fn test_single_token_bucket_rejects_second_wait() {
        let limiter = RateLimiter::new(1);
        limiter.wait_timeout(Duration::from_millis(10)).await.unwrap();

        let result = limiter.wait_timeout(Duration::from_millis(200)).await;
        assert_eq!(result, Err(WaitCanceled));
    }

    #[tokio::test]
    async fn test_cancellation_stops_wait() {
        let limiter = Arc::new(RateLimiter::new(1));
        assert!(limiter.try_acquire());

        let cancel = CancellationToken::new();
        let waiter = {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.wait(&cancel).await })
        };

        sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .expect("waiter should return promptly")
            .unwrap();
        assert_eq!(result, Err(WaitCanceled));
    }

    #[tokio::test]
    async fn test_refill_restores_tokens() {
        // 600/min = one token every 100ms
        let limiter = RateLimiter::new(600);
        while limiter.try_acquire() {}
        assert_eq!(limiter.available(), 0);

        limiter.wait_timeout(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_refill_never_exceeds_capacity() {
        let limiter = RateLimiter::new(600);
        sleep(Duration::from_millis(350)).await;
        assert_eq!(limiter.available(), 600);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_capacity() {
        let limiter = Arc::new(RateLimiter::new(10));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.wait_timeout(Duration::from_millis(100)).await.is_ok()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        // 10 initial tokens; the next refill is 6s away
        assert_eq!(granted, 10);
    }

    #[tokio::test]
    async fn test_close_stops_refill() {
        let limiter = RateLimiter::new(600);
        while limiter.try_acquire() {}

        limiter.close().await;
        assert!(limiter.is_closed());

        sleep(Duration::from_millis(250)).await;
        assert_eq!(limiter.available(), 0);
    }
}
