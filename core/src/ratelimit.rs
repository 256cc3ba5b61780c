//! Per-endpoint-category rate limiting (spec §5, §4.10).
//!
//! Generalized from the teacher's single global `RateLimiter` token bucket
//! (`risk::rate_limiter`) to one bucket per [`EndpointCategory`], keyed in
//! a `DashMap` so categories never contend on each other's refill lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EndpointCategory {
    OrderEntry,
    OrderCancel,
    MarketData,
    AccountQuery,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BucketConfig {
    pub burst_capacity: u64,
    pub refill_per_second: f64,
    pub min_interval: Duration,
}

impl BucketConfig {
    pub fn standard() -> Self {
        Self {
            burst_capacity: 20,
            refill_per_second: 10.0,
            min_interval: Duration::from_millis(50),
        }
    }

    /// Per-category tuned defaults used to seed [`EngineConfig`](crate::config::EngineConfig):
    /// order entry/cancel are the brokerage's tightest-limited endpoints, account
    /// and market data polling tend to allow a higher steady rate.
    pub fn for_category(category: EndpointCategory) -> Self {
        match category {
            EndpointCategory::OrderEntry => Self {
                burst_capacity: 10,
                refill_per_second: 5.0,
                min_interval: Duration::from_millis(100),
            },
            EndpointCategory::OrderCancel => Self {
                burst_capacity: 10,
                refill_per_second: 5.0,
                min_interval: Duration::from_millis(100),
            },
            EndpointCategory::AccountQuery => Self::standard(),
            EndpointCategory::MarketData => Self {
                burst_capacity: 50,
                refill_per_second: 20.0,
                min_interval: Duration::from_millis(20),
            },
        }
    }
}

struct Bucket {
    config: BucketConfig,
    tokens_milli: AtomicU64,
    last_refill: Mutex<Instant>,
    last_request: Mutex<Instant>,
}

impl Bucket {
    fn new(config: BucketConfig) -> Self {
        let now = Instant::now();
        Self {
            tokens_milli: AtomicU64::new(config.burst_capacity * 1000),
            last_refill: Mutex::new(now),
            last_request: Mutex::new(now - config.min_interval),
            config,
        }
    }

    fn refill(&self) {
        let mut last = self.last_refill.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(*last);
        let add = (self.config.refill_per_second * elapsed.as_secs_f64() * 1000.0) as u64;
        if add == 0 {
            return;
        }
        let cap = self.config.burst_capacity * 1000;
        let mut current = self.tokens_milli.load(Ordering::Acquire);
        loop {
            let next = (current + add).min(cap);
            match self.tokens_milli.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        *last = now;
    }

    /// Blocks the calling thread until a permit is available, honoring both
    /// the token bucket and the category's minimum inter-request interval.
    fn acquire_blocking(&self) {
        loop {
            {
                let mut last_request = self.last_request.lock();
                let now = Instant::now();
                let since = now.duration_since(*last_request);
                if since < self.config.min_interval {
                    std::thread::sleep(self.config.min_interval - since);
                }
                self.refill();
                let current = self.tokens_milli.load(Ordering::Acquire);
                if current >= 1000
                    && self
                        .tokens_milli
                        .compare_exchange(current, current - 1000, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                {
                    *last_request = Instant::now();
                    return;
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    async fn acquire(&self) {
        loop {
            {
                let mut last_request = self.last_request.lock();
                let now = Instant::now();
                let since = now.duration_since(*last_request);
                if since >= self.config.min_interval {
                    self.refill();
                    let current = self.tokens_milli.load(Ordering::Acquire);
                    if current >= 1000
                        && self
                            .tokens_milli
                            .compare_exchange(current, current - 1000, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                    {
                        *last_request = now;
                        return;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Keyed token-bucket rate limiter, one independent bucket per category.
///
/// Buckets are stored behind `Arc` so a permit wait can clone the handle
/// out of the `DashMap` and drop the map guard before awaiting — holding a
/// `DashMap` shard guard across an `.await` would block unrelated
/// categories from acquiring their own entries for the duration.
pub struct RateLimiter {
    buckets: DashMap<EndpointCategory, Arc<Bucket>>,
    default_config: BucketConfig,
}

impl RateLimiter {
    pub fn new(default_config: BucketConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            default_config,
        }
    }

    pub fn with_category(self, category: EndpointCategory, config: BucketConfig) -> Self {
        self.buckets.insert(category, Arc::new(Bucket::new(config)));
        self
    }

    fn bucket_for(&self, category: EndpointCategory) -> Arc<Bucket> {
        self.buckets
            .entry(category)
            .or_insert_with(|| Arc::new(Bucket::new(self.default_config)))
            .clone()
    }

    /// Parks the calling (synchronous, strategy) thread until a permit for
    /// `category` is available.
    pub fn acquire_blocking(&self, category: EndpointCategory) {
        self.bucket_for(category).acquire_blocking();
    }

    /// Async permit acquisition for the reconciler and worker tasks.
    pub async fn acquire(&self, category: EndpointCategory) {
        let bucket = self.bucket_for(category);
        bucket.acquire().await;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(BucketConfig::standard())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_acquire_consumes_burst_then_waits() {
        let limiter = RateLimiter::new(BucketConfig {
            burst_capacity: 2,
            refill_per_second: 1000.0,
            min_interval: Duration::from_millis(0),
        });
        limiter.acquire_blocking(EndpointCategory::OrderEntry);
        limiter.acquire_blocking(EndpointCategory::OrderEntry);
        // Third call must wait for refill, but should still return.
        limiter.acquire_blocking(EndpointCategory::OrderEntry);
    }

    #[test]
    fn categories_have_independent_buckets() {
        let limiter = RateLimiter::new(BucketConfig {
            burst_capacity: 1,
            refill_per_second: 0.001,
            min_interval: Duration::from_millis(0),
        });
        limiter.acquire_blocking(EndpointCategory::OrderEntry);
        // A different category must not be starved by OrderEntry's bucket.
        limiter.acquire_blocking(EndpointCategory::MarketData);
    }
}
