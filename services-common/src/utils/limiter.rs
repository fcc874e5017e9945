use std::{num::NonZeroU32, time::Duration};

use anyhow::Context;
use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use serde::Deserialize;

pub type InMemoryLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

#[derive(Deserialize, Debug, Clone, serde_derive_default::Default)]
pub struct RateLimitConfig {
    /// Requests allowed per second.
    #[serde(default = "default_burst")]
    pub burst: NonZeroU32,
    #[serde(default)]
    pub jitter: JitterConfig,
}

#[derive(Deserialize, Debug, Clone, serde_derive_default::Default)]
pub struct JitterConfig {
    #[serde(with = "humantime_serde", default = "default_jitter_min")]
    min: Duration,
    #[serde(with = "humantime_serde", default = "default_jitter_interval")]
    interval: Duration,
}

impl JitterConfig {
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            interval: Duration::ZERO,
        }
    }
}

pub fn default_jitter_min() -> Duration {
    Duration::from_millis(10)
}

pub fn default_jitter_interval() -> Duration {
    Duration::from_millis(50)
}

pub fn default_burst() -> NonZeroU32 {
    NonZeroU32::new(25).expect("invariant: non-zero constant")
}

impl RateLimitConfig {
    pub fn unlimited() -> Self {
        Self {
            burst: NonZeroU32::MAX,
            jitter: JitterConfig::none(),
        }
    }

    pub fn limiter(&self) -> Limiter {
        Limiter {
            inner: RateLimiter::direct(Quota::per_second(self.burst)),
            jitter: Jitter::new(self.jitter.min, self.jitter.interval),
        }
    }
}

pub struct Limiter {
    inner: InMemoryLimiter,
    jitter: Jitter,
}

impl Limiter {
    pub async fn until_ready(&self) {
        self.inner.until_ready_with_jitter(self.jitter).await;
    }

    pub async fn until_n_ready(&self, amount: NonZeroU32) -> anyhow::Result<()> {
        self.inner
            .until_n_ready_with_jitter(amount, self.jitter)
            .await
            .context("doesn't fit into limiter")?;
        Ok(())
    }
}

/// Wraps a client so that every access waits for the rate limiter first.
pub struct LimiterGuard<T> {
    inner: T,
    limiter: Limiter,
}

impl<T> LimiterGuard<T> {
    pub fn new(val: T, limiter: Limiter) -> Self {
        Self {
            inner: val,
            limiter,
        }
    }

    pub async fn use_single(&self) -> &T {
        self.limiter.until_ready().await;
        &self.inner
    }

    pub async fn use_multiple(&self, n: NonZeroU32) -> anyhow::Result<&T> {
        self.limiter.until_n_ready(n).await?;
        Ok(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_unlimited_does_not_wait() {
        let guard = LimiterGuard::new(7u8, RateLimitConfig::unlimited().limiter());
        let start = Instant::now();
        for _ in 0..100 {
            assert_eq!(*guard.use_single().await, 7);
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_batch_larger_than_burst_is_rejected() {
        let config = RateLimitConfig {
            burst: NonZeroU32::new(2).unwrap(),
            jitter: JitterConfig::none(),
        };
        let guard = LimiterGuard::new((), config.limiter());
        assert!(guard.use_multiple(NonZeroU32::new(3).unwrap()).await.is_err());
        assert!(guard.use_multiple(NonZeroU32::new(2).unwrap()).await.is_ok());
    }
}
