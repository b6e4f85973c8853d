//! # Story merge
//!
//! Folds per-provider candidate lists into one deduplicated, ranked list.
//!
//! 1. Lists arrive highest-priority provider first; concatenation order is the
//!    reconciliation priority order.
//! 2. Candidates with a blank canonical URL are counted but never merged.
//! 3. Candidates are grouped by story id (hash of the URL identity key).
//! 4. Each field is taken from the first candidate in priority order that has
//!    a usable value; the first candidate of the group is the fallback base.
//! 5. A group sorts by the best (lowest) rank any member had, then newest first.
//!
//! Grouping keeps first-seen order in a `Vec` and only uses the map for lookup,
//! so output is a pure function of the input.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::canonical::canonicalize;
use crate::hash::story_id;
use crate::story::{MergeableStory, Provider, UnifiedStory};

/// Per-merge counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Input candidates per provider, blank-URL ones included.
    pub per_provider: BTreeMap<Provider, usize>,
    /// All candidates as given.
    pub total: usize,
    /// Stories after deduplication.
    pub unique: usize,
    /// `total - unique`.
    pub duplicates: usize,
}

impl MergeStats {
    pub fn duplicate_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.duplicates as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryMergeResult {
    pub stories: Vec<UnifiedStory>,
    pub stats: MergeStats,
}

struct Group<'a> {
    id: String,
    members: Vec<&'a MergeableStory>,
}

/// Merge candidate lists given in provider-priority order (highest first).
pub fn merge_stories(lists: &[Vec<MergeableStory>]) -> StoryMergeResult {
    let mut per_provider: BTreeMap<Provider, usize> = BTreeMap::new();
    let mut total = 0usize;

    let mut groups: Vec<Group<'_>> = Vec::new();
    let mut by_id: HashMap<String, usize> = HashMap::new();

    for story in lists.iter().flatten() {
        total += 1;
        *per_provider.entry(story.provider).or_insert(0) += 1;

        if story.canonical_url.trim().is_empty() {
            continue;
        }

        let id = story_id(
            &story.canonical_url,
            story.title.as_deref().unwrap_or_default(),
            story.provider.as_str(),
        );
        match by_id.get(&id) {
            Some(&idx) => groups[idx].members.push(story),
            None => {
                by_id.insert(id.clone(), groups.len());
                groups.push(Group {
                    id,
                    members: vec![story],
                });
            }
        }
    }

    let mut ranked: Vec<(u32, UnifiedStory)> = groups.into_iter().map(reconcile).collect();
    // Stable: equal keys keep first-seen order.
    ranked.sort_by(|(ra, a), (rb, b)| {
        ra.cmp(rb)
            .then_with(|| b.published_at.cmp(&a.published_at))
    });

    let unique = ranked.len();
    let stats = MergeStats {
        per_provider,
        total,
        unique,
        duplicates: total - unique,
    };

    debug!(
        target: "merge",
        total = stats.total,
        unique = stats.unique,
        duplicates = stats.duplicates,
        "merged provider lists"
    );

    StoryMergeResult {
        stories: ranked.into_iter().map(|(_, s)| s).collect(),
        stats,
    }
}

/// Build one record from a group whose members are in priority order.
fn reconcile(group: Group<'_>) -> (u32, UnifiedStory) {
    let members = group.members;
    let base = members[0];

    let title = first_text(&members, |s| s.title.as_deref())
        .or_else(|| base.title.clone())
        .unwrap_or_default();
    let summary = first_text(&members, |s| s.summary.as_deref())
        .or_else(|| base.summary.clone())
        .unwrap_or_default();
    let image_url =
        first_text(&members, |s| s.image_url.as_deref()).or_else(|| base.image_url.clone());

    let publisher = members.iter().find_map(|s| s.publisher.clone());
    let published_at = members.iter().find_map(|s| s.published_at);
    let sentiment = members.iter().find_map(|s| s.sentiment.clone());

    let named_entities = members
        .iter()
        .find(|s| !s.named_entities.is_empty())
        .unwrap_or(&base)
        .named_entities
        .clone();
    let related_prompts = members
        .iter()
        .find(|s| !s.related_prompts.is_empty())
        .unwrap_or(&base)
        .related_prompts
        .clone();
    let tags = members
        .iter()
        .find(|s| !s.tags.is_empty())
        .unwrap_or(&base)
        .tags
        .clone();

    let rank = members
        .iter()
        .map(|s| s.provider_rank)
        .min()
        .unwrap_or(base.provider_rank);

    let story = UnifiedStory {
        id: group.id,
        title,
        summary,
        url: canonicalize(base.canonical_url.trim()),
        source: base.provider.as_str().to_string(),
        publisher,
        published_at,
        image_url,
        sentiment,
        named_entities,
        related_prompts,
        tags,
    };
    (rank, story)
}

fn first_text<'a, F>(members: &[&'a MergeableStory], field: F) -> Option<String>
where
    F: Fn(&'a MergeableStory) -> Option<&'a str>,
{
    members
        .iter()
        .filter_map(|s| field(*s))
        .find(|v| !v.trim().is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::Sentiment;
    use chrono::{TimeZone, Utc};

    fn story(provider: Provider, rank: u32, url: &str) -> MergeableStory {
        MergeableStory::new(provider, rank, url)
    }

    #[test]
    fn trailing_slash_and_case_variants_merge() {
        let a = vec![story(Provider::SearchApi, 0, "https://Example.com/Story/")];
        let b = vec![story(Provider::Rss, 3, "https://example.com/story")];
        let out = merge_stories(&[a, b]);
        assert_eq!(out.stories.len(), 1);
        assert_eq!(out.stats.unique, 1);
        assert_eq!(out.stats.duplicates, 1);
    }

    #[test]
    fn higher_priority_fields_win_and_gaps_fill_from_lower() {
        let a = vec![story(Provider::SearchApi, 1, "https://x.test/a").with_title("T1")];
        let b = vec![story(Provider::Rss, 0, "https://x.test/a")
            .with_title("T2")
            .with_summary("S2")];
        let out = merge_stories(&[a, b]);
        let s = &out.stories[0];
        assert_eq!(s.title, "T1");
        assert_eq!(s.summary, "S2");
        assert_eq!(s.source, "search_api");
    }

    #[test]
    fn blank_titles_do_not_win() {
        let a = vec![story(Provider::SearchApi, 0, "https://x.test/a").with_title("   ")];
        let b = vec![story(Provider::Rss, 0, "https://x.test/a").with_title("Real")];
        let out = merge_stories(&[a, b]);
        assert_eq!(out.stories[0].title, "Real");
    }

    #[test]
    fn optional_fields_take_first_present() {
        let mut rich = story(Provider::Rss, 4, "https://x.test/a");
        rich.sentiment = Some(Sentiment {
            score: 0.4,
            label: "positive".into(),
            confidence: 0.9,
        });
        rich.tags.insert("markets".into());
        let a = vec![story(Provider::SearchApi, 2, "https://x.test/a")];
        let out = merge_stories(&[a, vec![rich]]);
        let s = &out.stories[0];
        assert_eq!(s.sentiment.as_ref().map(|x| x.label.as_str()), Some("positive"));
        assert!(s.tags.contains("markets"));
        assert!(s.image_url.is_none());
        assert_eq!(s.summary, "");
    }

    #[test]
    fn merged_rank_is_group_minimum() {
        let a = vec![
            story(Provider::SearchApi, 5, "https://x.test/a"),
            story(Provider::SearchApi, 1, "https://x.test/b"),
        ];
        let b = vec![story(Provider::Rss, 0, "https://x.test/a")];
        let out = merge_stories(&[a, b]);
        assert!(out.stories[0].url.ends_with("/a"));
        assert!(out.stories[1].url.ends_with("/b"));
    }

    #[test]
    fn rank_ties_break_on_newest_then_missing_last() {
        let t = |h| Utc.with_ymd_and_hms(2025, 1, 1, h, 0, 0).unwrap();
        let a = vec![
            story(Provider::SearchApi, 0, "https://x.test/none"),
            story(Provider::SearchApi, 0, "https://x.test/old").with_published_at(t(1)),
            story(Provider::SearchApi, 0, "https://x.test/new").with_published_at(t(9)),
        ];
        let out = merge_stories(&[a]);
        let urls: Vec<_> = out.stories.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://x.test/new", "https://x.test/old", "https://x.test/none"]
        );
    }

    #[test]
    fn blank_urls_count_toward_total_only() {
        let a = vec![
            story(Provider::SearchApi, 0, "  "),
            story(Provider::SearchApi, 1, "https://x.test/a"),
        ];
        let out = merge_stories(&[a, vec![story(Provider::Rss, 0, "")]]);
        assert_eq!(out.stats.total, 3);
        assert_eq!(out.stats.unique, 1);
        assert_eq!(out.stats.duplicates, 2);
        assert_eq!(out.stats.per_provider.get(&Provider::Rss), Some(&1));
        assert_eq!(out.stats.per_provider.get(&Provider::SearchApi), Some(&2));
    }

    #[test]
    fn empty_input_is_empty_output() {
        let out = merge_stories(&[]);
        assert!(out.stories.is_empty());
        assert_eq!(out.stats, MergeStats::default());
        assert_eq!(out.stats.duplicate_ratio(), 0.0);
    }
}
