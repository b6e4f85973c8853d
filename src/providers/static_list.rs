// src/providers/static_list.rs
use anyhow::Result;
use async_trait::async_trait;

use super::{StoryProvider, StoryQuery};
use crate::story::{MergeableStory, Provider};

/// Serves a fixed candidate list, optionally paged. Used for fixtures and demos.
pub struct StaticProvider {
    provider: Provider,
    name: String,
    stories: Vec<MergeableStory>,
    page_size: Option<usize>,
}

impl StaticProvider {
    pub fn new(provider: Provider, stories: Vec<MergeableStory>) -> Self {
        Self {
            provider,
            name: provider.as_str().to_string(),
            stories,
            page_size: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }
}

#[async_trait]
impl StoryProvider for StaticProvider {
    async fn fetch(&self, query: &StoryQuery) -> Result<Vec<MergeableStory>> {
        let page = query.page as usize;
        let out = match self.page_size {
            Some(n) => self.stories.iter().skip(page * n).take(n).cloned().collect(),
            None if page == 0 => self.stories.clone(),
            None => Vec::new(),
        };
        Ok(out)
    }

    fn provider(&self) -> Provider {
        self.provider
    }

    fn name(&self) -> &str {
        &self.name
    }
}
