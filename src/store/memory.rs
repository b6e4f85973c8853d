//! In-process store: stories upserted by id, cache keys pointing at id lists.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::{StoredBundle, StoryStore};
use crate::story::UnifiedStory;

#[derive(Debug, Clone)]
struct KeyEntry {
    prompt: String,
    story_ids: Vec<String>,
    fetched_at: DateTime<Utc>,
    hard_expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    stories: HashMap<String, UnifiedStory>,
    keys: HashMap<String, KeyEntry>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop keys whose hard expiry is before `now`, then stories no key
    /// references any more. Returns the number of keys removed.
    pub fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut g = self
            .inner
            .write()
            .map_err(|_| anyhow!("story store lock poisoned"))?;

        let before = g.keys.len();
        g.keys.retain(|_, e| e.hard_expires_at >= now);
        let removed = before - g.keys.len();

        let live: HashSet<String> = g
            .keys
            .values()
            .flat_map(|e| e.story_ids.iter().cloned())
            .collect();
        g.stories.retain(|id, _| live.contains(id));

        tracing::debug!(target: "store", removed, remaining = g.keys.len(), "pruned expired keys");
        Ok(removed)
    }

    pub fn story_count(&self) -> usize {
        self.inner.read().map(|g| g.stories.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl StoryStore for InMemoryStore {
    async fn read(&self, cache_key: &str) -> Result<Option<StoredBundle>> {
        let g = self
            .inner
            .read()
            .map_err(|_| anyhow!("story store lock poisoned"))?;
        let Some(entry) = g.keys.get(cache_key) else {
            return Ok(None);
        };
        let stories = entry
            .story_ids
            .iter()
            .filter_map(|id| g.stories.get(id).cloned())
            .collect();
        Ok(Some(StoredBundle {
            cache_key: cache_key.to_string(),
            prompt: entry.prompt.clone(),
            stories,
            fetched_at: entry.fetched_at,
            hard_expires_at: entry.hard_expires_at,
        }))
    }

    async fn write(&self, bundle: &StoredBundle) -> Result<()> {
        let mut g = self
            .inner
            .write()
            .map_err(|_| anyhow!("story store lock poisoned"))?;
        let story_ids = bundle.stories.iter().map(|s| s.id.clone()).collect();
        for s in &bundle.stories {
            g.stories.insert(s.id.clone(), s.clone());
        }
        g.keys.insert(
            bundle.cache_key.clone(),
            KeyEntry {
                prompt: bundle.prompt.clone(),
                story_ids,
                fetched_at: bundle.fetched_at,
                hard_expires_at: bundle.hard_expires_at,
            },
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
