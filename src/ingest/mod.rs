// src/ingest/mod.rs
pub mod config;
pub mod fetcher;
pub mod parser;
pub mod types;

use crate::ingest::fetcher::FeedFetcher;
use crate::ingest::parser::{parse_all, RecencyFilter};
use crate::ingest::types::{feed_targets, FeedSource, NewsItem};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up in any installed recorder).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_feeds_total", "Feed URLs scheduled for fetching.");
        describe_counter!("ingest_fetch_attempts_total", "HTTP attempts, retries included.");
        describe_counter!("ingest_fetch_retries_total", "Retries after a transient failure.");
        describe_counter!(
            "ingest_feed_failures_total",
            "Feeds dropped after the retry budget ran out."
        );
        describe_counter!("ingest_entries_total", "Entries parsed from feed documents.");
        describe_counter!(
            "ingest_entries_skipped_total",
            "Entries skipped because they had nothing to embed."
        );
        describe_counter!(
            "ingest_undated_total",
            "Entries without a usable date, stamped with run time."
        );
        describe_counter!("ingest_stale_total", "Entries outside the recency window.");
        describe_counter!("ingest_parse_errors_total", "Feed documents that failed to parse.");
        describe_counter!("ingest_kept_total", "Items kept after the recency filter.");
        describe_histogram!("ingest_fetch_ms", "Single fetch attempt time in milliseconds.");
        describe_histogram!("ingest_parse_ms", "Document parse time in milliseconds.");
        describe_counter!("dedup_input_total", "Items entering deduplication.");
        describe_counter!("dedup_duplicates_total", "Items dropped as near-duplicates.");
        describe_gauge!("dedup_buckets", "LSH buckets in the last dedup pass.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when ingest pipeline last ran."
        );
    });
}

/// Fetch every configured feed, parse, and keep items inside the recency window.
/// Per-feed failures are absorbed; an empty source list yields an empty result.
pub async fn collect_recent(
    fetcher: &FeedFetcher,
    sources: &[FeedSource],
    filter: RecencyFilter,
) -> Vec<NewsItem> {
    ensure_metrics_described();

    let targets = feed_targets(sources);
    if targets.is_empty() {
        tracing::warn!("no feed urls configured");
        return Vec::new();
    }
    counter!("ingest_feeds_total").increment(targets.len() as u64);

    let outcomes = fetcher.fetch_all(&targets).await;
    let fetched = outcomes.iter().filter(|o| o.is_fetched()).count();
    tracing::info!(
        target: "ingest",
        feeds = targets.len(),
        fetched,
        max_attempts = fetcher.settings().max_attempts,
        failed = targets.len() - fetched,
        "fetch stage settled"
    );

    let kept = parse_all(outcomes, filter).await;

    counter!("ingest_kept_total").increment(kept.len() as u64);
    gauge!("ingest_pipeline_last_run_ts").set(filter.now().timestamp() as f64);
    tracing::info!(
        target: "ingest",
        kept = kept.len(),
        window_secs = filter.window().num_seconds(),
        "news collected within window"
    );
    kept
}
