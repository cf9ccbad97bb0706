// src/persist.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::ingest::types::NewsItem;

/// `processed_news_YYYYMMDD_HHMMSS.json` for the given run time.
pub fn results_file_name(at: DateTime<Utc>) -> String {
    format!("processed_news_{}.json", at.format("%Y%m%d_%H%M%S"))
}

/// Write items as pretty JSON into `dir`, creating it if needed.
/// Written to a temp file first, then renamed into place.
pub fn save_results(dir: &Path, items: &[NewsItem], at: DateTime<Utc>) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating results dir {}", dir.display()))?;
    let path = dir.join(results_file_name(at));
    let tmp = path.with_extension("json.tmp");

    let json = serde_json::to_string_pretty(items).context("serializing results")?;
    let mut f = fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    f.write_all(json.as_bytes())?;
    f.sync_all()?;
    fs::rename(&tmp, &path).with_context(|| format!("moving results into {}", path.display()))?;

    tracing::info!(path = %path.display(), items = items.len(), "processed news saved");
    Ok(path)
}
