// tests/store_roundtrip.rs
use chrono::{Duration, TimeZone, Utc};
use news_bundle::store::{InMemoryStore, JsonFileStore, StoredBundle, StoryStore};
use news_bundle::story::{NamedEntity, Publisher, Sentiment, UnifiedStory};
use std::collections::BTreeSet;
use std::sync::Arc;

fn full_story(id: &str) -> UnifiedStory {
    UnifiedStory {
        id: id.to_string(),
        title: "Rates hold".into(),
        summary: "The bank kept rates unchanged.".into(),
        url: format!("https://news.test/{id}"),
        source: "search_api".into(),
        publisher: Some(Publisher {
            name: "News Test".into(),
            domain: Some("news.test".into()),
            icon_url: Some("https://news.test/icon.png".into()),
            credibility: Some(0.83),
        }),
        published_at: Some(Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap()),
        image_url: Some("https://img.news.test/r.jpg".into()),
        sentiment: Some(Sentiment {
            score: -0.25,
            label: "negative".into(),
            confidence: 0.61,
        }),
        named_entities: vec![NamedEntity {
            name: "Central Bank".into(),
            entity_type: "ORG".into(),
            relevance: 0.9,
        }],
        related_prompts: vec!["interest rates".into(), "inflation".into()],
        tags: BTreeSet::from(["economy".to_string(), "policy".to_string()]),
    }
}

fn bundle(key: &str, ids: &[&str]) -> StoredBundle {
    let fetched_at = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
    StoredBundle {
        cache_key: key.to_string(),
        prompt: "rates".into(),
        stories: ids.iter().map(|id| full_story(id)).collect(),
        fetched_at,
        hard_expires_at: fetched_at + Duration::minutes(40),
    }
}

async fn assert_round_trip(store: &dyn StoryStore) {
    let key = "version=v1|prompt=rates|locale=en-us|geo=us|filters=";
    let b = bundle(key, &["a", "b"]);
    store.write(&b).await.unwrap();
    let got = store.read(key).await.unwrap().expect("bundle present");
    assert_eq!(got, b);

    // replace-all: the old list is gone, not patched
    let b2 = bundle(key, &["c"]);
    store.write(&b2).await.unwrap();
    assert_eq!(store.read(key).await.unwrap().unwrap(), b2);

    assert!(store.read("version=v1|prompt=other").await.unwrap().is_none());
}

#[tokio::test]
async fn memory_store_round_trips_every_field() {
    assert_round_trip(&InMemoryStore::new()).await;
}

#[tokio::test]
async fn json_store_round_trips_every_field() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("bundles"));
    assert_round_trip(&store).await;

    // no temp files are left behind
    let leftovers: Vec<_> = std::fs::read_dir(store.dir())
        .unwrap()
        .flatten()
        .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn json_store_readers_never_see_partial_lists() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path()));
    let key = "k";
    let small = bundle(key, &["a"]);
    let large = bundle(key, &["b", "c", "d", "e", "f"]);
    store.write(&small).await.unwrap();

    let writer = {
        let store = Arc::clone(&store);
        let (small, large) = (small.clone(), large.clone());
        tokio::spawn(async move {
            for i in 0..40 {
                let b = if i % 2 == 0 { &large } else { &small };
                store.write(b).await.unwrap();
            }
        })
    };

    for _ in 0..40 {
        let got = store.read(key).await.unwrap().unwrap();
        assert!(got == small || got == large, "torn read: {} stories", got.stories.len());
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
}

#[tokio::test]
async fn corrupt_json_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    store.write(&bundle("k", &["a"])).await.unwrap();
    for entry in std::fs::read_dir(dir.path()).unwrap().flatten() {
        std::fs::write(entry.path(), "{ not json").unwrap();
    }
    assert!(store.read("k").await.is_err());
}
