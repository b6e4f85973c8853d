//! Story data model: per-provider candidates and the merged, cacheable record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

/// Upstream origin of a candidate story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Search API with enrichment (sentiment, entities).
    SearchApi,
    /// Syndication feeds.
    Rss,
    /// Page metadata scraped from publisher sites.
    Scraped,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::SearchApi => "search_api",
            Provider::Rss => "rss",
            Provider::Scraped => "scraped",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publisher {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    /// 0.0..=1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credibility: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    /// -1.0 (negative) ..= 1.0 (positive)
    pub score: f64,
    pub label: String,
    /// 0.0..=1.0
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    /// 0.0..=1.0
    pub relevance: f64,
}

/// A candidate story contributed by exactly one provider.
///
/// `provider_rank` orders stories within that provider's own result list
/// (lower = better) and is only compared inside a merge group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeableStory {
    pub canonical_url: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub provider: Provider,
    pub provider_rank: u32,
    pub publisher: Option<Publisher>,
    pub published_at: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub named_entities: Vec<NamedEntity>,
    #[serde(default)]
    pub related_prompts: Vec<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl MergeableStory {
    /// Candidate with only its identity set; everything else empty.
    pub fn new(provider: Provider, provider_rank: u32, canonical_url: impl Into<String>) -> Self {
        Self {
            canonical_url: canonical_url.into(),
            title: None,
            summary: None,
            provider,
            provider_rank,
            publisher: None,
            published_at: None,
            image_url: None,
            sentiment: None,
            named_entities: Vec::new(),
            related_prompts: Vec::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_published_at(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }
}

/// Canonical, deduplicated story. Persisted by `id` and linked to cache keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedStory {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub url: String,
    /// Provider tag of the candidate the record was built on.
    pub source: String,
    pub publisher: Option<Publisher>,
    pub published_at: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub named_entities: Vec<NamedEntity>,
    #[serde(default)]
    pub related_prompts: Vec<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}
