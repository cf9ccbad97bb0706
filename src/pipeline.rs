// src/pipeline.rs
//! One run: collect recent items -> remove near-duplicates -> add locations.
//!
//! Per-feed problems are absorbed inside `ingest`. The only whole-stage failure
//! is the embedding capability, which stops the run unless `dedup.fail_open`
//! is set, in which case undeduplicated items are passed through.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::PipelineSettings;
use crate::dedup::{DedupError, Deduplicator, DynEmbedder};
use crate::enrich::{enrich_locations, LocationExtractor};
use crate::ingest::collect_recent;
use crate::ingest::fetcher::FeedFetcher;
use crate::ingest::parser::RecencyFilter;
use crate::ingest::types::{FeedSource, NewsItem};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("deduplication failed: {0}")]
    Dedup(#[from] DedupError),
}

/// Collaborators for a run.
pub struct PipelineDeps {
    pub fetcher: FeedFetcher,
    pub deduplicator: Deduplicator,
    pub locations: Arc<dyn LocationExtractor>,
}

impl PipelineDeps {
    /// Reqwest fetcher + seeded deduplicator from settings.
    pub fn from_settings(
        settings: &PipelineSettings,
        embedder: DynEmbedder,
        locations: Arc<dyn LocationExtractor>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            fetcher: FeedFetcher::with_reqwest(settings.fetch.clone())?,
            deduplicator: Deduplicator::new(embedder, settings.dedup.clone()),
            locations,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    pub collect: Duration,
    pub dedup: Duration,
    pub enrich: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.collect + self.dedup + self.enrich
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub items: Vec<NewsItem>,
    pub collected: usize,
    pub unique: usize,
    pub with_location: usize,
    /// False when the embedding stage failed and fail-open let items through.
    pub deduplicated: bool,
    pub timings: StageTimings,
}

impl RunReport {
    /// Stage timings, shares and item counts at info level.
    pub fn log_summary(&self) {
        let total = self.timings.total().as_secs_f64();
        let pct = |d: Duration| {
            if total > 0.0 {
                d.as_secs_f64() / total * 100.0
            } else {
                0.0
            }
        };
        info!(
            collect_s = %format!("{:.2}", self.timings.collect.as_secs_f64()),
            collect_pct = %format!("{:.1}", pct(self.timings.collect)),
            dedup_s = %format!("{:.2}", self.timings.dedup.as_secs_f64()),
            dedup_pct = %format!("{:.1}", pct(self.timings.dedup)),
            enrich_s = %format!("{:.2}", self.timings.enrich.as_secs_f64()),
            enrich_pct = %format!("{:.1}", pct(self.timings.enrich)),
            total_s = %format!("{total:.2}"),
            "performance report"
        );
        info!(
            collected = self.collected,
            unique = self.unique,
            with_location = self.with_location,
            deduplicated = self.deduplicated,
            "processing steps"
        );
    }
}

/// Run with `now` captured at call time.
pub async fn run(
    settings: &PipelineSettings,
    sources: &[FeedSource],
    deps: &PipelineDeps,
) -> Result<RunReport, PipelineError> {
    let filter = RecencyFilter::starting_now(settings.window());
    run_with_filter(settings, sources, deps, filter).await
}

/// Run against an explicit recency filter (fixed `now`).
pub async fn run_with_filter(
    settings: &PipelineSettings,
    sources: &[FeedSource],
    deps: &PipelineDeps,
    filter: RecencyFilter,
) -> Result<RunReport, PipelineError> {
    let mut timings = StageTimings::default();

    info!("collecting news from rss sources");
    let t = Instant::now();
    let collected = collect_recent(&deps.fetcher, sources, filter).await;
    timings.collect = t.elapsed();
    let collected_count = collected.len();

    if collected.is_empty() {
        warn!("no news collected");
        return Ok(RunReport {
            started_at: filter.now(),
            items: Vec::new(),
            collected: 0,
            unique: 0,
            with_location: 0,
            deduplicated: true,
            timings,
        });
    }

    info!(items = collected_count, "removing near-duplicates");
    let t = Instant::now();
    let passthrough = settings.dedup.fail_open.then(|| collected.clone());
    let (unique, deduplicated) = match (deps.deduplicator.dedup(collected).await, passthrough) {
        (Ok(unique), _) => (unique, true),
        (Err(e), Some(items)) => {
            warn!(error = %e, "dedup failed, continuing with undeduplicated items");
            (items, false)
        }
        (Err(e), None) => return Err(e.into()),
    };
    timings.dedup = t.elapsed();
    let unique_count = unique.len();

    let t = Instant::now();
    let enriched = enrich_locations(unique, deps.locations.as_ref());
    timings.enrich = t.elapsed();
    let with_location = enriched
        .iter()
        .filter(|i| i.location.as_found().is_some())
        .count();

    Ok(RunReport {
        started_at: filter.now(),
        items: enriched,
        collected: collected_count,
        unique: unique_count,
        with_location,
        deduplicated,
        timings,
    })
}
