//! Admission control for inbound requests
//!
//! A single process-wide token bucket. Every request takes one permit before
//! any other work happens; when the bucket is empty the request is turned
//! away immediately instead of waiting.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};

/// Ceiling substituted when the configured rate is not positive
pub const DEFAULT_REQUESTS_PER_SECOND: i64 = 100;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Configuration for the admission gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained requests per second
    #[serde(default = "default_rps")]
    pub requests_per_second: i64,

    /// Bucket capacity; defaults to `requests_per_second`
    #[serde(default)]
    pub burst: Option<i64>,
}

fn default_rps() -> i64 {
    DEFAULT_REQUESTS_PER_SECOND
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            burst: None,
        }
    }
}

impl RateLimitConfig {
    /// Rate after substituting the default for non-positive values
    pub fn effective_rps(&self) -> u64 {
        if self.requests_per_second > 0 {
            self.requests_per_second as u64
        } else {
            DEFAULT_REQUESTS_PER_SECOND as u64
        }
    }

    /// Burst after substituting the rate for absent or non-positive values
    pub fn effective_burst(&self) -> u64 {
        match self.burst {
            Some(burst) if burst > 0 => burst as u64,
            _ => self.effective_rps(),
        }
    }
}

/// Bucket state. Permits are stored as nanoseconds of accumulated refill so
/// all arithmetic stays in integers.
#[derive(Debug)]
struct Bucket {
    available_nanos: u64,
    last_refill: DateTime<Utc>,
}

/// Process-wide token-bucket limiter
pub struct AdmissionGate {
    rps: u64,
    burst: u64,
    /// Nanoseconds of refill that make up one permit
    interval_nanos: u64,
    capacity_nanos: u64,
    bucket: Mutex<Bucket>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("rps", &self.rps)
            .field("burst", &self.burst)
            .finish_non_exhaustive()
    }
}

impl AdmissionGate {
    /// Create a gate reading time from `clock`; the bucket starts full
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let rps = config.effective_rps();
        let burst = config.effective_burst();
        let interval_nanos = (NANOS_PER_SECOND / rps).max(1);
        let capacity_nanos = interval_nanos.saturating_mul(burst);

        let bucket = Bucket {
            available_nanos: capacity_nanos,
            last_refill: clock.now(),
        };

        Self {
            rps,
            burst,
            interval_nanos,
            capacity_nanos,
            bucket: Mutex::new(bucket),
            clock,
        }
    }

    /// Create a gate on the system clock
    pub fn with_system_clock(config: RateLimitConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    pub fn requests_per_second(&self) -> u64 {
        self.rps
    }

    pub fn burst(&self) -> u64 {
        self.burst
    }

    /// Take one permit if one is available
    ///
    /// Never blocks. Either a whole permit is taken or nothing changes.
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);

        self.refill(&mut bucket, now);

        if bucket.available_nanos >= self.interval_nanos {
            bucket.available_nanos -= self.interval_nanos;
            true
        } else {
            false
        }
    }

    /// Whole permits currently in the bucket, after refill
    pub fn available(&self) -> u64 {
        let now = self.clock.now();
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut bucket, now);
        bucket.available_nanos / self.interval_nanos
    }

    fn refill(&self, bucket: &mut Bucket, now: DateTime<Utc>) {
        // A clock that went backwards adds nothing and keeps the old mark
        let Some(elapsed) = (now - bucket.last_refill).num_nanoseconds() else {
            // Overflowed i64 nanoseconds; far longer than any bucket needs
            bucket.available_nanos = self.capacity_nanos;
            bucket.last_refill = now;
            return;
        };
        if elapsed <= 0 {
            return;
        }

        bucket.available_nanos = bucket
            .available_nanos
            .saturating_add(elapsed as u64)
            .min(self.capacity_nanos);
        bucket.last_refill = now;
    }
}
