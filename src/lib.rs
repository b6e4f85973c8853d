// src/lib.rs
// Public library surface for integration tests (and potential reuse).

// Identity utilities
pub mod cache_key;
pub mod canonical;
pub mod hash;

// Core engines
pub mod cache_policy;
pub mod merge;
pub mod story;

// Collaborators + glue
pub mod config;
pub mod orchestrator;
pub mod providers;
pub mod rate_limit;
pub mod store;

// Outer surface
pub mod api;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::cache_policy::{CacheBucket, CacheDecision, CachePolicy, CachePolicyTable, Staleness};
pub use crate::canonical::canonicalize;
pub use crate::hash::sha256_hex;
pub use crate::merge::{merge_stories, MergeStats, StoryMergeResult};
pub use crate::orchestrator::{Bundle, BundleOrchestrator, BundleRequest, BundleState, FetchSettings};
pub use crate::story::{MergeableStory, Provider, UnifiedStory};
