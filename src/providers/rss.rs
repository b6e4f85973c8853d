// src/providers/rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{clean_text, parse_rfc2822, StoryProvider, StoryQuery};
use crate::canonical::canonicalize;
use crate::story::{MergeableStory, Provider, Publisher};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<String>,
    enclosure: Option<Enclosure>,
}

#[derive(Debug, Deserialize)]
struct Enclosure {
    #[serde(rename = "@url")]
    url: Option<String>,
    #[serde(rename = "@type")]
    kind: Option<String>,
}

enum FeedSource {
    Fixture(String),
    Remote { url: String, http: reqwest::Client },
}

/// RSS 2.0 provider. Item position is the provider rank; the channel becomes
/// the publisher.
pub struct RssProvider {
    source: FeedSource,
    provider: Provider,
    name: String,
}

impl RssProvider {
    /// Serve a pre-loaded XML document.
    pub fn from_fixture(content: &str) -> Self {
        Self {
            source: FeedSource::Fixture(content.to_string()),
            provider: Provider::Rss,
            name: "rss-fixture".to_string(),
        }
    }

    /// Download `url` on every fetch.
    pub fn from_url(url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("news-bundle/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .context("building feed http client")?;
        let name = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());
        Ok(Self {
            source: FeedSource::Remote {
                url: url.to_string(),
                http,
            },
            provider: Provider::Rss,
            name,
        })
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    async fn load(&self) -> Result<String> {
        match &self.source {
            FeedSource::Fixture(xml) => Ok(xml.clone()),
            FeedSource::Remote { url, http } => {
                let resp = http
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("fetching feed {url}"))?
                    .error_for_status()
                    .with_context(|| format!("feed {url} returned an error status"))?;
                resp.text()
                    .await
                    .with_context(|| format!("reading feed body {url}"))
            }
        }
    }
}

/// Parse an RSS document into candidates attributed to `provider`.
pub fn parse_feed(xml: &str, provider: Provider) -> Result<Vec<MergeableStory>> {
    let rss: Rss = from_str(xml).context("parsing rss xml")?;
    let publisher = channel_publisher(&rss.channel);

    let out = rss
        .channel
        .items
        .into_iter()
        .enumerate()
        .map(|(i, it)| {
            let link = it.link.as_deref().map(str::trim).unwrap_or_default();
            let mut story = MergeableStory::new(provider, i as u32, canonicalize(link));
            story.title = it.title.as_deref().map(clean_text).filter(|t| !t.is_empty());
            story.summary = it
                .description
                .as_deref()
                .map(clean_text)
                .filter(|t| !t.is_empty());
            story.published_at = it.pub_date.as_deref().and_then(parse_rfc2822);
            story.image_url = it.enclosure.and_then(|e| match e.kind.as_deref() {
                Some(k) if !k.starts_with("image/") => None,
                _ => e.url,
            });
            story.publisher = publisher.clone();
            story.tags = it
                .categories
                .iter()
                .map(|c| clean_text(c).to_lowercase())
                .filter(|c| !c.is_empty())
                .collect();
            story
        })
        .collect();
    Ok(out)
}

fn channel_publisher(ch: &Channel) -> Option<Publisher> {
    let name = ch.title.as_deref().map(clean_text).filter(|t| !t.is_empty())?;
    let domain = ch
        .link
        .as_deref()
        .and_then(|l| Url::parse(l.trim()).ok())
        .and_then(|u| u.host_str().map(str::to_string));
    Some(Publisher {
        name,
        domain,
        icon_url: None,
        credibility: None,
    })
}

#[async_trait]
impl StoryProvider for RssProvider {
    async fn fetch(&self, query: &StoryQuery) -> Result<Vec<MergeableStory>> {
        // Feeds are a single page.
        if query.page > 0 {
            return Ok(Vec::new());
        }

        let xml = self.load().await?;
        let t0 = std::time::Instant::now();
        let out = parse_feed(&xml, self.provider)
            .with_context(|| format!("feed {}", self.name))?;

        histogram!("provider_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("provider_stories_total", "provider" => self.name.clone())
            .increment(out.len() as u64);

        Ok(out)
    }

    fn provider(&self) -> Provider {
        self.provider
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example &amp; Co News</title>
    <link>https://News.Example.com/</link>
    <item>
      <title>First &lt;b&gt;headline&lt;/b&gt;</title>
      <link>https://news.example.com/a?utm_source=rss</link>
      <pubDate>Tue, 04 Mar 2025 10:30:00 +0000</pubDate>
      <description><![CDATA[<p>Body one</p>]]></description>
      <category>Markets</category>
      <category> Tech </category>
      <enclosure url="https://img.example.com/a.jpg" type="image/jpeg"/>
    </item>
    <item>
      <title>No link here</title>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_items_in_feed_order() {
        let out = parse_feed(FEED, Provider::Rss).unwrap();
        assert_eq!(out.len(), 2);

        let a = &out[0];
        assert_eq!(a.provider_rank, 0);
        assert_eq!(a.canonical_url, "https://news.example.com/a");
        assert_eq!(a.title.as_deref(), Some("First headline"));
        assert_eq!(a.summary.as_deref(), Some("Body one"));
        assert_eq!(a.image_url.as_deref(), Some("https://img.example.com/a.jpg"));
        assert!(a.tags.contains("markets") && a.tags.contains("tech"));
        let p = a.publisher.as_ref().unwrap();
        assert_eq!(p.name, "Example & Co News");
        assert_eq!(p.domain.as_deref(), Some("news.example.com"));

        assert_eq!(out[1].provider_rank, 1);
        assert!(out[1].canonical_url.is_empty());
    }

    #[tokio::test]
    async fn later_pages_are_empty() {
        let p = RssProvider::from_fixture(FEED);
        let q = StoryQuery {
            page: 1,
            ..StoryQuery::default()
        };
        assert!(p.fetch(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_xml_is_an_error() {
        let p = RssProvider::from_fixture("<rss><channel>");
        assert!(p.fetch(&StoryQuery::default()).await.is_err());
    }
}
