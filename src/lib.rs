// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod dedup;
pub mod enrich;
pub mod ingest;
pub mod persist;
pub mod pipeline;

// ---- Re-exports for stable public API ----
pub use crate::config::PipelineSettings;
pub use crate::dedup::{DedupError, Deduplicator, Embedder};
pub use crate::ingest::types::{FeedSource, Location, NewsItem};
pub use crate::pipeline::{run, PipelineDeps, PipelineError, RunReport};
