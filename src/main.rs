//! News pipeline — Binary Entrypoint
//! Collects recent items from the configured RSS feeds, removes near-duplicates,
//! adds locations, and writes the result to `results/`.

use std::sync::Arc;

use anyhow::Context;
use news_dedup_pipeline::dedup::embedder::build_embedder_from_env;
use news_dedup_pipeline::enrich::PatternLocationExtractor;
use news_dedup_pipeline::ingest::config::load_sources_default;
use news_dedup_pipeline::persist::save_results;
use news_dedup_pipeline::{pipeline, PipelineDeps, PipelineSettings, RunReport};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Text logs by default; `LOG_FORMAT=json` for structured output.
/// Level comes from `RUST_LOG` (default `info`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

fn log_sample(report: &RunReport) {
    if report.items.is_empty() {
        return;
    }
    info!("sample processed news:");
    for (i, news) in report.items.iter().take(5).enumerate() {
        let title: String = news.title.chars().take(50).collect();
        info!(
            n = i + 1,
            source = %news.source,
            %title,
            link = %news.link,
            location = news.location.as_found().unwrap_or("None"),
            published = %news.published_at.to_rfc3339(),
            "sample"
        );
    }
}

async fn run() -> anyhow::Result<()> {
    let settings = PipelineSettings::load_default()?;
    let sources = load_sources_default()?;
    info!(sources = sources.len(), window_secs = settings.window_secs, "configuration loaded");

    let embedder = build_embedder_from_env(settings.dedup.embed_batch_size, settings.dedup.embedding_dim);
    let locations = Arc::new(PatternLocationExtractor::from_default_path());
    let deps = PipelineDeps::from_settings(&settings, embedder, locations)?;

    let report = pipeline::run(&settings, &sources, &deps)
        .await
        .context("pipeline run failed")?;

    if report.items.is_empty() {
        info!("no news to save");
    } else {
        save_results(&settings.results_dir, &report.items, report.started_at)?;
    }
    report.log_summary();
    log_sample(&report);
    Ok(())
}

#[tokio::main]
async fn main() {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    info!("=== news pipeline starting ===");
    match run().await {
        Ok(()) => info!("=== process completed ==="),
        Err(e) => {
            error!(error = ?e, "run aborted");
            std::process::exit(1);
        }
    }
}
