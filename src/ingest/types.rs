// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One configured outlet and its feeds (label -> URL).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedSource {
    #[serde(rename = "source")]
    pub name: String,
    #[serde(rename = "rss_feeds", default)]
    pub feeds: BTreeMap<String, String>,
}

/// A single URL to fetch, tagged with the outlet it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedTarget {
    pub source: String,
    pub label: String,
    pub url: String,
}

/// Flatten sources into fetch targets: source order, then label order.
pub fn feed_targets(sources: &[FeedSource]) -> Vec<FeedTarget> {
    sources
        .iter()
        .flat_map(|s| {
            s.feeds.iter().map(move |(label, url)| FeedTarget {
                source: s.name.clone(),
                label: label.clone(),
                url: url.clone(),
            })
        })
        .collect()
}

/// Fetched feed payload, consumed once by the parser.
#[derive(Debug, Clone)]
pub struct RawFeedDocument {
    pub source: String,
    pub url: String,
    pub body: String,
}

/// Per-target fetch result. A failure is data, not an error.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fetched(RawFeedDocument),
    Failed {
        source: String,
        url: String,
        reason: String,
    },
}

impl FetchOutcome {
    pub fn source(&self) -> &str {
        match self {
            FetchOutcome::Fetched(doc) => &doc.source,
            FetchOutcome::Failed { source, .. } => source,
        }
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self, FetchOutcome::Fetched(_))
    }
}

/// Location enrichment state. `Pending` until the enricher has looked at the item.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Location {
    #[default]
    Pending,
    NotFound,
    Found(String),
}

impl Location {
    pub fn as_found(&self) -> Option<&str> {
        match self {
            Location::Found(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub source: String,
    pub title: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    pub summary: String,
    #[serde(default)]
    pub location: Location,
}

impl NewsItem {
    /// Text handed to the embedding capability: title plus a capped summary.
    pub fn embedding_text(&self, summary_cap: usize) -> String {
        let summary = truncate_chars(&self.summary, summary_cap);
        format!("{} {}", self.title, summary)
    }
}

/// Keep the first `max` characters (not bytes) of `s`.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
