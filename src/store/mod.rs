// src/store/mod.rs
pub mod file;
pub mod memory;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::story::UnifiedStory;

pub use file::JsonFileStore;
pub use memory::InMemoryStore;

/// Everything persisted for one cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBundle {
    pub cache_key: String,
    /// Normalized prompt text the key was built from.
    pub prompt: String,
    pub stories: Vec<UnifiedStory>,
    pub fetched_at: DateTime<Utc>,
    pub hard_expires_at: DateTime<Utc>,
}

/// Persistence contract for merged bundles.
///
/// `write` replaces the whole story list for the key: a concurrent `read`
/// sees either the previous list or the new one, never a mix.
#[async_trait::async_trait]
pub trait StoryStore: Send + Sync {
    async fn read(&self, cache_key: &str) -> Result<Option<StoredBundle>>;
    async fn write(&self, bundle: &StoredBundle) -> Result<()>;
    fn name(&self) -> &'static str;
}
