// src/providers/mod.rs
pub mod rss;
pub mod static_list;

use anyhow::Result;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::BTreeMap;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::story::{MergeableStory, Provider};

pub use rss::RssProvider;
pub use static_list::StaticProvider;

/// What the orchestrator asks every provider for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryQuery {
    pub prompt: String,
    pub locale: Option<String>,
    pub geo: Option<String>,
    pub filters: BTreeMap<String, String>,
    /// 0-based page.
    pub page: u32,
}

/// A source of candidate stories. Errors are mapped to an empty contribution
/// by the orchestrator, so implementations should just propagate them.
#[async_trait::async_trait]
pub trait StoryProvider: Send + Sync {
    async fn fetch(&self, query: &StoryQuery) -> Result<Vec<MergeableStory>>;
    fn provider(&self) -> Provider;
    /// Label used in logs and metrics.
    fn name(&self) -> &str;
}

/// Normalize feed text: decode entities, strip tags, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    let stripped = re_tags.replace_all(&decoded, " ");

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// RFC 2822 timestamp (RSS `pubDate`) to UTC; `None` when unparseable.
pub fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond()))
}
