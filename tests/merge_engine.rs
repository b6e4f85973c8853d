// tests/merge_engine.rs
use chrono::{Duration, TimeZone, Utc};
use news_bundle::merge::merge_stories;
use news_bundle::story::{MergeableStory, NamedEntity, Provider, Publisher, Sentiment};
use rand::seq::SliceRandom;

fn candidate(provider: Provider, rank: u32, url: &str) -> MergeableStory {
    MergeableStory::new(provider, rank, url)
}

#[test]
fn same_story_from_three_providers_reconciles_field_by_field() {
    let t = Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap();

    // Highest priority: title only.
    let search = vec![candidate(Provider::SearchApi, 4, "https://news.test/rates/").with_title("Rates hold")];

    // Middle: summary, publish time, tags.
    let mut rss = candidate(Provider::Rss, 0, "HTTPS://NEWS.TEST/rates")
        .with_title("Rates held steady")
        .with_summary("The bank kept rates unchanged.")
        .with_published_at(t);
    rss.tags.insert("economy".into());

    // Lowest: enrichment only.
    let mut scraped = candidate(Provider::Scraped, 9, "https://news.test/rates?utm_source=x");
    scraped.sentiment = Some(Sentiment {
        score: -0.1,
        label: "neutral".into(),
        confidence: 0.7,
    });
    scraped.named_entities = vec![NamedEntity {
        name: "Central Bank".into(),
        entity_type: "ORG".into(),
        relevance: 0.92,
    }];
    scraped.publisher = Some(Publisher {
        name: "News Test".into(),
        domain: Some("news.test".into()),
        icon_url: None,
        credibility: Some(0.8),
    });
    scraped.image_url = Some("https://img.news.test/r.jpg".into());

    let out = merge_stories(&[search, vec![rss], vec![scraped]]);
    assert_eq!(out.stories.len(), 1);
    assert_eq!(out.stats.total, 3);
    assert_eq!(out.stats.duplicates, 2);

    let s = &out.stories[0];
    assert_eq!(s.title, "Rates hold");
    assert_eq!(s.summary, "The bank kept rates unchanged.");
    assert_eq!(s.published_at, Some(t));
    assert!(s.tags.contains("economy"));
    assert_eq!(s.named_entities.len(), 1);
    assert_eq!(s.sentiment.as_ref().unwrap().label, "neutral");
    assert_eq!(s.publisher.as_ref().unwrap().domain.as_deref(), Some("news.test"));
    assert_eq!(s.image_url.as_deref(), Some("https://img.news.test/r.jpg"));
    assert_eq!(s.source, "search_api");
    assert_eq!(s.url, "https://news.test/rates/");
}

#[test]
fn low_ranks_sort_first_whatever_the_input_order() {
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let mut list: Vec<MergeableStory> = (0..12u32)
        .map(|i| {
            candidate(Provider::Rss, i % 4, &format!("https://news.test/{i}"))
                .with_published_at(base + Duration::minutes(i as i64))
        })
        .collect();

    let expected = merge_stories(&[list.clone()]);
    let mut rng = rand::rng();
    for _ in 0..10 {
        list.shuffle(&mut rng);
        let got = merge_stories(&[list.clone()]);
        assert_eq!(got.stories, expected.stories);
    }

    // ranks 0 and 1 (3 stories each) come before anything ranked 2+
    let head: Vec<_> = expected.stories[..6].iter().map(|s| s.url.clone()).collect();
    for i in 0..12u32 {
        let url = format!("https://news.test/{i}");
        assert_eq!(head.contains(&url), i % 4 < 2, "unexpected placement of {url}");
    }
}

#[test]
fn ids_are_stable_for_equivalent_urls() {
    let a = merge_stories(&[vec![candidate(Provider::Rss, 0, "https://news.test/x/")]]);
    let b = merge_stories(&[vec![candidate(Provider::SearchApi, 3, "https://NEWS.test/x#top")]]);
    assert_eq!(a.stories[0].id, b.stories[0].id);
    assert_eq!(a.stories[0].id.len(), 64);
}

#[test]
fn candidate_without_fields_still_produces_a_story() {
    let out = merge_stories(&[vec![candidate(Provider::Scraped, 0, "https://news.test/bare")]]);
    let s = &out.stories[0];
    assert_eq!(s.title, "");
    assert_eq!(s.summary, "");
    assert!(s.publisher.is_none() && s.published_at.is_none() && s.image_url.is_none());
    assert!(s.named_entities.is_empty() && s.related_prompts.is_empty() && s.tags.is_empty());
}

#[test]
fn blank_url_candidates_only_count_in_totals() {
    let out = merge_stories(&[
        vec![candidate(Provider::SearchApi, 0, ""), candidate(Provider::SearchApi, 1, "https://news.test/a")],
        vec![candidate(Provider::Rss, 0, "https://news.test/a/"), candidate(Provider::Rss, 1, "   ")],
    ]);
    assert_eq!(out.stats.total, 4);
    assert_eq!(out.stats.unique, 1);
    assert_eq!(out.stats.duplicates, 3);
    assert_eq!(out.stories.len(), 1);
    assert_eq!(out.stats.per_provider[&Provider::SearchApi], 2);
    assert_eq!(out.stats.per_provider[&Provider::Rss], 2);
}
