use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::app::ports::RateLimiterPort;
use crate::config::LimitsConfig;
use crate::constants::{CONTENT_SERVICE, DIRECTORY_SERVICE, PROFILE_SERVICE};
use crate::error::{AggregatorError, Result};

/// Added to every computed wait so the re-check lands past the window boundary.
const BOUNDARY_EPSILON: Duration = Duration::from_millis(1);

/// Upper bound on wait/re-check rounds inside one `acquire` call.
const MAX_RECHECKS: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    pub max_requests: u32,
    pub window: Duration,
}

impl Limits {
    pub fn per_window(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }
}

/// Sliding-window admission gate: at most `max_requests` admissions within any
/// trailing `window`. Clones share the same admission log.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    name: String,
    limits: Limits,
    // admission instants, oldest first
    admissions: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, limits: Limits) -> Result<Self> {
        let name = name.into();
        if limits.max_requests == 0 {
            return Err(AggregatorError::Config(format!(
                "rate limiter '{}' must admit at least one request per window",
                name
            )));
        }
        if limits.window.is_zero() {
            return Err(AggregatorError::Config(format!(
                "rate limiter '{}' needs a non-zero window",
                name
            )));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                name,
                admissions: Mutex::new(VecDeque::with_capacity(limits.max_requests as usize)),
                limits,
            }),
        })
    }

    /// Wait until one more admission fits in the trailing window, then record it.
    ///
    /// The admission log stays locked across the wait, so concurrent callers
    /// are admitted one at a time and can never both take the last slot.
    pub async fn acquire(&self) -> Result<()> {
        let max_requests = self.inner.limits.max_requests as usize;
        let window = self.inner.limits.window;
        let mut admissions = self.inner.admissions.lock().await;

        for _ in 0..MAX_RECHECKS {
            let now = Instant::now();
            while let Some(&oldest) = admissions.front() {
                if now.duration_since(oldest) >= window {
                    admissions.pop_front();
                } else {
                    break;
                }
            }

            match admissions.front() {
                Some(&oldest) if admissions.len() >= max_requests => {
                    let wait = window.saturating_sub(now.duration_since(oldest)) + BOUNDARY_EPSILON;
                    debug!(
                        limiter = %self.inner.name,
                        wait_ms = wait.as_millis() as u64,
                        "Rate limit reached, waiting for a slot"
                    );
                    crate::observability::metrics::rate_limiter::wait(&self.inner.name, wait.as_secs_f64());
                    tokio::time::sleep(wait).await;
                }
                _ => {
                    admissions.push_back(now);
                    return Ok(());
                }
            }
        }

        Err(AggregatorError::RateLimit {
            limiter: self.inner.name.clone(),
        })
    }

    /// Number of admissions still inside the trailing window.
    pub async fn admitted_in_window(&self) -> usize {
        let now = Instant::now();
        let admissions = self.inner.admissions.lock().await;
        admissions
            .iter()
            .filter(|&&t| now.duration_since(t) < self.inner.limits.window)
            .count()
    }
}

#[async_trait]
impl RateLimiterPort for RateLimiter {
    async fn acquire(&self) -> Result<()> {
        RateLimiter::acquire(self).await
    }
}

/// One limiter per external service class, built once and shared by every run.
#[derive(Clone)]
pub struct ServiceLimiters {
    pub directory: Arc<dyn RateLimiterPort>,
    pub content: Arc<dyn RateLimiterPort>,
    pub profile: Arc<dyn RateLimiterPort>,
}

impl ServiceLimiters {
    pub fn from_config(config: &LimitsConfig) -> Result<Self> {
        Ok(Self {
            directory: Arc::new(RateLimiter::new(DIRECTORY_SERVICE, config.directory.to_limits())?),
            content: Arc::new(RateLimiter::new(CONTENT_SERVICE, config.content.to_limits())?),
            profile: Arc::new(RateLimiter::new(PROFILE_SERVICE, config.profile.to_limits())?),
        })
    }
}
