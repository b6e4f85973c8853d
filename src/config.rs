// src/config.rs
//! Service configuration: cache policies, fetch knobs, rate limit, store, feeds.
//!
//! ```toml
//! [cache.prompt_search]
//! ttl_secs = 300
//! swr_secs = 300
//!
//! [fetch]
//! timeout_ms = 8000
//! timeout_retries = 1
//! max_in_flight = 4
//!
//! [rate_limit]
//! capacity = 20
//! refill_per_sec = 2.0
//!
//! [store]
//! dir = "state/bundles"
//!
//! [[feeds]]
//! url = "https://example.com/rss.xml"
//! ```

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cache_policy::{CacheBucket, CachePolicy, CachePolicyTable};
use crate::orchestrator::{BundleOrchestrator, FetchSettings};
use crate::providers::{RssProvider, StoryProvider};
use crate::rate_limit::TokenBucket;
use crate::store::{InMemoryStore, JsonFileStore, StoryStore};
use crate::story::Provider;

pub const ENV_CONFIG_PATH: &str = "NEWS_BUNDLE_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/news_bundle.toml";
pub const DEFAULT_JSON_PATH: &str = "config/news_bundle.json";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Bucket name → policy override.
    pub cache: BTreeMap<String, BucketPolicyCfg>,
    pub fetch: FetchCfg,
    pub rate_limit: Option<RateLimitCfg>,
    pub store: StoreCfg,
    /// Highest priority first.
    pub feeds: Vec<FeedCfg>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BucketPolicyCfg {
    pub ttl_secs: u64,
    pub swr_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FetchCfg {
    pub timeout_ms: u64,
    pub timeout_retries: u32,
    pub max_in_flight: usize,
    pub background_refresh: bool,
}

impl Default for FetchCfg {
    fn default() -> Self {
        let d = FetchSettings::default();
        Self {
            timeout_ms: d.timeout.as_millis() as u64,
            timeout_retries: d.timeout_retries,
            max_in_flight: d.max_in_flight,
            background_refresh: d.background_refresh,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RateLimitCfg {
    pub capacity: u32,
    pub refill_per_sec: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StoreCfg {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedCfg {
    pub url: String,
    #[serde(default = "default_feed_provider")]
    pub provider: Provider,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_feed_provider() -> Provider {
    Provider::Rss
}

impl AppConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = match ext.as_str() {
            "json" => serde_json::from_str::<Self>(&content)
                .with_context(|| format!("parsing json config {}", path.display()))?,
            _ => toml::from_str::<Self>(&content)
                .with_context(|| format!("parsing toml config {}", path.display()))?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $NEWS_BUNDLE_CONFIG_PATH
    /// 2) config/news_bundle.toml
    /// 3) config/news_bundle.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for p in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        Ok(Self::default())
    }

    fn validate(&self) -> Result<()> {
        self.policy_table().map(|_| ())
    }

    /// Defaults with the configured per-bucket overrides applied.
    pub fn policy_table(&self) -> Result<CachePolicyTable> {
        let mut table = CachePolicyTable::with_defaults();
        for (name, p) in &self.cache {
            let bucket: CacheBucket = name.parse().context("in [cache] section")?;
            table = table.with_policy(bucket, CachePolicy::from_secs(p.ttl_secs, p.swr_secs));
        }
        Ok(table)
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            timeout: Duration::from_millis(self.fetch.timeout_ms.max(1)),
            timeout_retries: self.fetch.timeout_retries,
            max_in_flight: self.fetch.max_in_flight.max(1),
            background_refresh: self.fetch.background_refresh,
        }
    }

    /// Wire store, feeds, policies and limiter into an orchestrator.
    pub fn build_orchestrator(&self) -> Result<BundleOrchestrator> {
        let store: Arc<dyn StoryStore> = match &self.store.dir {
            Some(dir) => Arc::new(JsonFileStore::new(dir.clone())),
            None => Arc::new(InMemoryStore::new()),
        };

        let mut builder = BundleOrchestrator::builder(store)
            .policies(self.policy_table()?)
            .settings(self.fetch_settings());

        for feed in &self.feeds {
            let mut p = RssProvider::from_url(&feed.url)?.with_provider(feed.provider);
            if let Some(name) = &feed.name {
                p = p.with_name(name.clone());
            }
            let p: Arc<dyn StoryProvider> = Arc::new(p);
            builder = builder.provider(p);
        }

        if let Some(rl) = &self.rate_limit {
            builder = builder.rate_limiter(TokenBucket::new(rl.capacity, rl.refill_per_sec));
        }

        Ok(builder.build())
    }
}
