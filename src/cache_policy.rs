//! # Cache policy
//!
//! Classifies a cached bundle as FRESH, SOFT_STALE or HARD_STALE from its fetch
//! time, the current time and the (ttl, stale-while-revalidate) pair registered
//! for its content bucket.
//!
//! ```text
//! fetched_at ---- ttl ----> fresh_until ---- swr ----> hard_expires_at
//!      FRESH (inclusive)  |      SOFT_STALE (inclusive) |   HARD_STALE
//! ```
//!
//! The table is plain data: build it once at startup and share it read-only.
//! Asking for a bucket with no registered policy panics, since it means the
//! table was wired up incorrectly.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};

/// Content category with its own freshness policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBucket {
    Headlines,
    PromptSearch,
    LocalNews,
}

impl CacheBucket {
    pub const ALL: [CacheBucket; 3] = [
        CacheBucket::Headlines,
        CacheBucket::PromptSearch,
        CacheBucket::LocalNews,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheBucket::Headlines => "headlines",
            CacheBucket::PromptSearch => "prompt_search",
            CacheBucket::LocalNews => "local_news",
        }
    }
}

impl fmt::Display for CacheBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheBucket {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        CacheBucket::ALL
            .into_iter()
            .find(|b| b.as_str() == norm)
            .ok_or_else(|| anyhow!("unknown cache bucket `{s}`"))
    }
}

/// Time-to-live plus stale-while-revalidate window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub stale_while_revalidate: Duration,
}

impl CachePolicy {
    pub fn new(ttl: Duration, stale_while_revalidate: Duration) -> Self {
        Self {
            ttl,
            stale_while_revalidate,
        }
    }

    /// Convenience constructor from whole seconds (saturating on overflow).
    pub fn from_secs(ttl_secs: u64, swr_secs: u64) -> Self {
        Self::new(secs(ttl_secs), secs(swr_secs))
    }

    /// Classify a record fetched at `fetched_at`, observed at `now`.
    pub fn decide(
        &self,
        bucket: CacheBucket,
        fetched_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CacheDecision {
        // A fetch stamped in the future (clock skew) counts as just fetched.
        let now = now.max(fetched_at);

        let fresh_until = fetched_at
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let hard_expires_at = fresh_until
            .checked_add_signed(self.stale_while_revalidate)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let staleness = if now <= fresh_until {
            Staleness::Fresh
        } else if now <= hard_expires_at {
            Staleness::SoftStale
        } else {
            Staleness::HardStale
        };

        CacheDecision {
            bucket,
            staleness,
            fresh_until,
            hard_expires_at,
            should_refresh_in_background: staleness == Staleness::SoftStale,
            must_refresh: staleness == Staleness::HardStale,
        }
    }
}

fn secs(s: u64) -> Duration {
    i64::try_from(s)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Staleness {
    Fresh,
    SoftStale,
    HardStale,
}

impl Staleness {
    pub fn as_str(self) -> &'static str {
        match self {
            Staleness::Fresh => "FRESH",
            Staleness::SoftStale => "SOFT_STALE",
            Staleness::HardStale => "HARD_STALE",
        }
    }
}

/// Outcome of a freshness check. Computed on demand, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheDecision {
    pub bucket: CacheBucket,
    pub staleness: Staleness,
    pub fresh_until: DateTime<Utc>,
    pub hard_expires_at: DateTime<Utc>,
    pub should_refresh_in_background: bool,
    pub must_refresh: bool,
}

/// Bucket → policy registry.
#[derive(Debug, Clone, PartialEq)]
pub struct CachePolicyTable {
    policies: HashMap<CacheBucket, CachePolicy>,
}

impl Default for CachePolicyTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CachePolicyTable {
    /// Table with nothing registered.
    pub fn empty() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    /// Built-in policies:
    /// - headlines: 15 min fresh, 45 min stale-while-revalidate
    /// - prompt_search: 10 min / 30 min
    /// - local_news: 30 min / 2 h
    pub fn with_defaults() -> Self {
        Self::empty()
            .with_policy(CacheBucket::Headlines, CachePolicy::from_secs(15 * 60, 45 * 60))
            .with_policy(CacheBucket::PromptSearch, CachePolicy::from_secs(10 * 60, 30 * 60))
            .with_policy(CacheBucket::LocalNews, CachePolicy::from_secs(30 * 60, 2 * 3600))
    }

    pub fn with_policy(mut self, bucket: CacheBucket, policy: CachePolicy) -> Self {
        self.policies.insert(bucket, policy);
        self
    }

    pub fn policy(&self, bucket: CacheBucket) -> Option<CachePolicy> {
        self.policies.get(&bucket).copied()
    }

    /// Freshness decision for `bucket`.
    ///
    /// # Panics
    /// If no policy is registered for `bucket`.
    pub fn decision_for(
        &self,
        bucket: CacheBucket,
        fetched_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CacheDecision {
        match self.policies.get(&bucket) {
            Some(p) => p.decide(bucket, fetched_at, now),
            None => panic!("no cache policy registered for bucket `{bucket}`"),
        }
    }
}
