//! JSON-file store: one document per cache key, replaced via temp file + rename.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

use super::{StoredBundle, StoryStore};
use crate::hash::sha256_hex;

#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    seq: AtomicU64,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys contain `|`, `/` and arbitrary user text, so files are named by hash.
    fn path_for(&self, cache_key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sha256_hex(cache_key)))
    }
}

#[async_trait::async_trait]
impl StoryStore for JsonFileStore {
    async fn read(&self, cache_key: &str) -> Result<Option<StoredBundle>> {
        let path = self.path_for(cache_key);
        let raw = match fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading bundle {}", path.display()))
            }
        };
        let bundle: StoredBundle = serde_json::from_str(&raw)
            .with_context(|| format!("parsing bundle {}", path.display()))?;
        if bundle.cache_key != cache_key {
            return Ok(None);
        }
        Ok(Some(bundle))
    }

    async fn write(&self, bundle: &StoredBundle) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating store dir {}", self.dir.display()))?;

        let path = self.path_for(&bundle.cache_key);
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{}.{}.tmp", std::process::id(), n));

        let body = serde_json::to_vec_pretty(bundle).context("serializing bundle")?;
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;

        tracing::debug!(
            target: "store",
            cache_key = %bundle.cache_key,
            stories = bundle.stories.len(),
            "bundle written"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "json_file"
    }
}
