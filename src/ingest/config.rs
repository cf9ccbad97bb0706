// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::types::FeedSource;

pub const ENV_SOURCES_PATH: &str = "NEWS_SOURCES_PATH";
const DEFAULT_JSON_PATH: &str = "news/rss.json";
const DEFAULT_TOML_PATH: &str = "config/rss_sources.toml";

/// Load feed sources from an explicit path. Supports TOML or JSON formats.
pub fn load_sources_from(path: &Path) -> Result<Vec<FeedSource>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feed sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
        .with_context(|| format!("parsing feed sources in {}", path.display()))
}

/// Load feed sources using env var + fallbacks:
/// 1) $NEWS_SOURCES_PATH
/// 2) news/rss.json
/// 3) config/rss_sources.toml
///
/// Unlike an empty list, a missing file is an error: the run has nothing to work from.
pub fn load_sources_default() -> Result<Vec<FeedSource>> {
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        } else {
            return Err(anyhow!("{ENV_SOURCES_PATH} points to non-existent path"));
        }
    }
    let json_p = PathBuf::from(DEFAULT_JSON_PATH);
    if json_p.exists() {
        return load_sources_from(&json_p);
    }
    let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    Err(anyhow!(
        "no feed sources configured (set {ENV_SOURCES_PATH} or create {DEFAULT_JSON_PATH})"
    ))
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<FeedSource>> {
    let try_toml = hint_ext == "toml" || s.contains("[[sources]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported feed sources format"))
}

fn parse_toml(s: &str) -> Result<Vec<FeedSource>> {
    #[derive(serde::Deserialize)]
    struct TomlSources {
        #[serde(default)]
        sources: Vec<FeedSource>,
    }
    let v: TomlSources = toml::from_str(s)?;
    Ok(clean_sources(v.sources))
}

fn parse_json(s: &str) -> Result<Vec<FeedSource>> {
    let v: Vec<FeedSource> = serde_json::from_str(s)?;
    Ok(clean_sources(v))
}

/// Trim names/URLs, drop blank entries and URLs that do not parse as http(s).
fn clean_sources(items: Vec<FeedSource>) -> Vec<FeedSource> {
    let mut out = Vec::with_capacity(items.len());
    for mut src in items {
        src.name = src.name.trim().to_string();
        if src.name.is_empty() {
            continue;
        }
        src.feeds = src
            .feeds
            .into_iter()
            .filter_map(|(label, url)| {
                let url = url.trim().to_string();
                match url::Url::parse(&url) {
                    Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Some((label, url)),
                    _ => {
                        tracing::warn!(source = %src.name, %label, %url, "skipping invalid feed url");
                        None
                    }
                }
            })
            .collect();
        out.push(src);
    }
    out
}
