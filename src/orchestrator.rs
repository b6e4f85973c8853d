//! # Bundle orchestrator
//!
//! Glue between the store, the providers and the two engines:
//!
//! 1. Build the cache key for the request and read the store.
//! 2. FRESH → serve. SOFT_STALE → serve and refresh in the background.
//!    HARD_STALE → refetch now, falling back to the cached copy if every
//!    provider fails. Miss → refetch now.
//! 3. Refetch = all providers in parallel (bounded by a semaphore), each with
//!    its own timeout and one retry after a timeout; failures contribute an
//!    empty list. Then merge, classify, persist.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use crate::cache_key::{self, normalize_prompt};
use crate::cache_policy::{CacheBucket, CacheDecision, CachePolicyTable, Staleness};
use crate::merge::{merge_stories, MergeStats};
use crate::providers::{StoryProvider, StoryQuery};
use crate::rate_limit::TokenBucket;
use crate::store::{StoredBundle, StoryStore};
use crate::story::{MergeableStory, UnifiedStory};

/// Knobs for the provider fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    pub timeout: Duration,
    /// Extra attempts after a timeout (errors are never retried).
    pub timeout_retries: u32,
    pub max_in_flight: usize,
    pub background_refresh: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(8),
            timeout_retries: 1,
            max_in_flight: 4,
            background_refresh: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRequest {
    pub prompt: String,
    pub locale: Option<String>,
    pub geo: Option<String>,
    pub filters: BTreeMap<String, String>,
    pub bucket: CacheBucket,
    pub page: u32,
}

impl BundleRequest {
    pub fn new(prompt: impl Into<String>, bucket: CacheBucket) -> Self {
        Self {
            prompt: prompt.into(),
            locale: None,
            geo: None,
            filters: BTreeMap::new(),
            bucket,
            page: 0,
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_geo(mut self, geo: impl Into<String>) -> Self {
        self.geo = Some(geo.into());
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Pages past the first get a trailing `|page=N` component. Filter text
    /// can never produce an unescaped `|`, so a user filter named `page`
    /// cannot collide with it.
    pub fn cache_key(&self) -> String {
        let key = cache_key::build(
            &self.prompt,
            self.locale.as_deref(),
            self.geo.as_deref(),
            &self.filters,
        );
        match self.page {
            0 => key,
            page => format!("{key}|page={page}"),
        }
    }

    fn query(&self) -> StoryQuery {
        StoryQuery {
            prompt: self.prompt.trim().to_string(),
            locale: self.locale.clone(),
            geo: self.geo.clone(),
            filters: self.filters.clone(),
            page: self.page,
        }
    }
}

/// A resolved bundle, either served from the store or freshly merged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bundle {
    pub cache_key: String,
    pub prompt: String,
    pub stories: Vec<UnifiedStory>,
    pub fetched_at: DateTime<Utc>,
    pub decision: CacheDecision,
    pub from_cache: bool,
    /// Present only when this call ran the merge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<MergeStats>,
}

impl Bundle {
    fn from_stored(stored: StoredBundle, decision: CacheDecision) -> Self {
        Self {
            cache_key: stored.cache_key,
            prompt: stored.prompt,
            stories: stored.stories,
            fetched_at: stored.fetched_at,
            decision,
            from_cache: true,
            stats: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BundleState {
    Loading,
    Ready(Bundle),
    Error { message: String },
}

impl BundleState {
    pub fn bundle(&self) -> Option<&Bundle> {
        match self {
            BundleState::Ready(b) => Some(b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RefreshMode {
    Sync,
    Background,
}

impl RefreshMode {
    fn as_str(self) -> &'static str {
        match self {
            RefreshMode::Sync => "sync",
            RefreshMode::Background => "background",
        }
    }
}

struct Inner {
    store: Arc<dyn StoryStore>,
    /// Highest priority first.
    providers: Vec<Arc<dyn StoryProvider>>,
    policies: CachePolicyTable,
    settings: FetchSettings,
    gate: Semaphore,
    limiter: Option<TokenBucket>,
    refreshing: Mutex<HashSet<String>>,
}

/// Clears the in-flight marker for a background refresh, even if the task
/// unwinds.
struct RefreshGuard {
    orchestrator: BundleOrchestrator,
    key: String,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        let mut busy = match self.orchestrator.inner.refreshing.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        busy.remove(&self.key);
    }
}

/// Cheap to clone; clones share the store, providers and gate.
#[derive(Clone)]
pub struct BundleOrchestrator {
    inner: Arc<Inner>,
}

pub struct BundleOrchestratorBuilder {
    store: Arc<dyn StoryStore>,
    providers: Vec<Arc<dyn StoryProvider>>,
    policies: CachePolicyTable,
    settings: FetchSettings,
    limiter: Option<TokenBucket>,
}

impl BundleOrchestratorBuilder {
    /// Providers are consulted in the order they are added (first = highest priority).
    pub fn provider(mut self, provider: Arc<dyn StoryProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn policies(mut self, policies: CachePolicyTable) -> Self {
        self.policies = policies;
        self
    }

    pub fn settings(mut self, settings: FetchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn rate_limiter(mut self, limiter: TokenBucket) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn build(self) -> BundleOrchestrator {
        let permits = self.settings.max_in_flight.max(1);
        BundleOrchestrator {
            inner: Arc::new(Inner {
                store: self.store,
                providers: self.providers,
                policies: self.policies,
                settings: self.settings,
                gate: Semaphore::new(permits),
                limiter: self.limiter,
                refreshing: Mutex::new(HashSet::new()),
            }),
        }
    }
}

impl BundleOrchestrator {
    pub fn builder(store: Arc<dyn StoryStore>) -> BundleOrchestratorBuilder {
        BundleOrchestratorBuilder {
            store,
            providers: Vec::new(),
            policies: CachePolicyTable::with_defaults(),
            settings: FetchSettings::default(),
            limiter: None,
        }
    }

    pub fn policies(&self) -> &CachePolicyTable {
        &self.inner.policies
    }

    pub async fn resolve(&self, req: &BundleRequest) -> BundleState {
        self.resolve_at(req, Utc::now()).await
    }

    /// Resolve on a background task; the receiver starts at `Loading`.
    pub fn resolve_watch(&self, req: BundleRequest) -> watch::Receiver<BundleState> {
        let (tx, rx) = watch::channel(BundleState::Loading);
        let this = self.clone();
        tokio::spawn(async move {
            let state = this.resolve(&req).await;
            let _ = tx.send(state);
        });
        rx
    }

    pub async fn resolve_at(&self, req: &BundleRequest, now: DateTime<Utc>) -> BundleState {
        crate::metrics::ensure_described();
        counter!("bundle_requests_total").increment(1);

        let key = req.cache_key();
        let cached = match self.inner.store.read(&key).await {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    target: "bundle",
                    error = ?e,
                    cache_key = %key,
                    store = self.inner.store.name(),
                    "store read failed; treating as miss"
                );
                None
            }
        };

        if let Some(stored) = cached {
            let decision = self
                .inner
                .policies
                .decision_for(req.bucket, stored.fetched_at, now);
            counter!("bundle_cache_hits_total", "staleness" => decision.staleness.as_str())
                .increment(1);
            debug!(
                target: "bundle",
                cache_key = %key,
                staleness = decision.staleness.as_str(),
                "cache hit"
            );

            match decision.staleness {
                Staleness::Fresh => return BundleState::Ready(Bundle::from_stored(stored, decision)),
                Staleness::SoftStale => {
                    if self.inner.settings.background_refresh {
                        self.spawn_background_refresh(req.clone());
                    }
                    return BundleState::Ready(Bundle::from_stored(stored, decision));
                }
                Staleness::HardStale => {
                    if let Some(fresh) = self.refresh(req, &key, now, RefreshMode::Sync).await {
                        return BundleState::Ready(fresh);
                    }
                    warn!(
                        target: "bundle",
                        cache_key = %key,
                        "all providers failed; serving hard-stale copy"
                    );
                    return BundleState::Ready(Bundle::from_stored(stored, decision));
                }
            }
        }

        counter!("bundle_cache_misses_total").increment(1);
        match self.refresh(req, &key, now, RefreshMode::Sync).await {
            Some(b) => BundleState::Ready(b),
            None => BundleState::Error {
                message: format!(
                    "no provider returned results for `{}` ({} configured)",
                    req.prompt.trim(),
                    self.inner.providers.len()
                ),
            },
        }
    }

    fn spawn_background_refresh(&self, req: BundleRequest) {
        let key = req.cache_key();
        {
            let mut busy = match self.inner.refreshing.lock() {
                Ok(g) => g,
                Err(poison) => poison.into_inner(),
            };
            if !busy.insert(key.clone()) {
                debug!(target: "bundle", cache_key = %key, "background refresh already running");
                return;
            }
        }

        let guard = RefreshGuard {
            orchestrator: self.clone(),
            key: key.clone(),
        };
        let this = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let _ = this
                .refresh(&req, &key, Utc::now(), RefreshMode::Background)
                .await;
        });
    }

    /// Fetch, merge and persist. `None` when every provider failed.
    async fn refresh(
        &self,
        req: &BundleRequest,
        key: &str,
        now: DateTime<Utc>,
        mode: RefreshMode,
    ) -> Option<Bundle> {
        counter!("bundle_refresh_total", "mode" => mode.as_str()).increment(1);

        let query = req.query();
        let outcomes = join_all(
            self.inner
                .providers
                .iter()
                .map(|p| self.fetch_isolated(p.as_ref(), &query)),
        )
        .await;

        if outcomes.iter().all(Option::is_none) {
            return None;
        }
        let lists: Vec<Vec<MergeableStory>> =
            outcomes.into_iter().map(Option::unwrap_or_default).collect();

        let t0 = std::time::Instant::now();
        let merged = merge_stories(&lists);
        histogram!("merge_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("merge_input_total").increment(merged.stats.total as u64);
        counter!("merge_duplicates_total").increment(merged.stats.duplicates as u64);

        let decision = self.inner.policies.decision_for(req.bucket, now, now);
        let stored = StoredBundle {
            cache_key: key.to_string(),
            prompt: normalize_prompt(&req.prompt),
            stories: merged.stories,
            fetched_at: now,
            hard_expires_at: decision.hard_expires_at,
        };
        if let Err(e) = self.inner.store.write(&stored).await {
            warn!(
                target: "bundle",
                error = ?e,
                cache_key = %key,
                store = self.inner.store.name(),
                "store write failed; serving unsaved bundle"
            );
        }
        gauge!("bundle_last_fetch_ts").set(now.timestamp() as f64);

        info!(
            target: "bundle",
            cache_key = %key,
            mode = mode.as_str(),
            total = merged.stats.total,
            unique = merged.stats.unique,
            duplicates = merged.stats.duplicates,
            "bundle refreshed"
        );

        let mut bundle = Bundle::from_stored(stored, decision);
        bundle.from_cache = false;
        bundle.stats = Some(merged.stats);
        Some(bundle)
    }

    /// `fetch_one`, with a panicking provider mapped to `None`.
    async fn fetch_isolated(
        &self,
        provider: &dyn StoryProvider,
        query: &StoryQuery,
    ) -> Option<Vec<MergeableStory>> {
        match AssertUnwindSafe(self.fetch_one(provider, query))
            .catch_unwind()
            .await
        {
            Ok(out) => out,
            Err(_) => {
                let name = provider.name().to_string();
                counter!("provider_errors_total", "provider" => name.clone()).increment(1);
                warn!(target: "providers", provider = %name, "provider panicked");
                None
            }
        }
    }

    /// One provider's contribution; `None` on error, exhausted timeouts or rate limit.
    async fn fetch_one(
        &self,
        provider: &dyn StoryProvider,
        query: &StoryQuery,
    ) -> Option<Vec<MergeableStory>> {
        let name = provider.name().to_string();

        if let Some(limiter) = &self.inner.limiter {
            if !limiter.try_acquire() {
                counter!("provider_rate_limited_total", "provider" => name.clone()).increment(1);
                warn!(target: "providers", provider = %name, "rate limited; skipping provider");
                return None;
            }
        }

        // The semaphore is never closed.
        let _permit = self.inner.gate.acquire().await.ok()?;

        let settings = &self.inner.settings;
        let mut retries_left = settings.timeout_retries;
        loop {
            match tokio::time::timeout(settings.timeout, provider.fetch(query)).await {
                Ok(Ok(stories)) => {
                    debug!(target: "providers", provider = %name, count = stories.len(), "provider fetched");
                    return Some(stories);
                }
                Ok(Err(e)) => {
                    counter!("provider_errors_total", "provider" => name.clone()).increment(1);
                    warn!(target: "providers", provider = %name, error = ?e, "provider error");
                    return None;
                }
                Err(_) => {
                    counter!("provider_timeouts_total", "provider" => name.clone()).increment(1);
                    if retries_left == 0 {
                        warn!(target: "providers", provider = %name, "provider timed out; giving up");
                        return None;
                    }
                    retries_left -= 1;
                    warn!(target: "providers", provider = %name, "provider timed out; retrying");
                }
            }
        }
    }
}
