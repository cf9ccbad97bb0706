// src/enrich/location.rs
//! Location extraction for news items.
//!
//! Two passes over the first 500 characters of `"{title}. {summary}"`:
//! 1) a gazetteer of place names (built in, or `{ "places": [...] }` from the
//!    JSON file at `LOCATIONS_PATH` / `config/locations.json`),
//! 2) preposition patterns (`in X`, `from X`, `at X`) for a capitalized word.
//!
//! Notes:
//! - Regexes must be compatible with the `regex` crate (no lookarounds).
//! - Month and weekday names are never returned by the preposition patterns.

use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::types::{truncate_chars, Location, NewsItem};

const SCAN_CHARS: usize = 500;

const BUILTIN_PLACES: &[&str] = &[
    "United States", "United Kingdom", "European Union", "Hong Kong", "New York", "Wall Street",
    "Washington", "London", "Frankfurt", "Paris", "Berlin", "Brussels", "Tokyo", "Beijing",
    "Shanghai", "Singapore", "Zurich", "Moscow", "Kyiv", "Ukraine", "Russia", "China", "Japan",
    "Germany", "France", "Italy", "Spain", "India", "Brazil", "Canada", "Mexico", "Australia",
    "Israel", "Iran", "Gaza", "Taiwan", "Korea", "Europe", "Asia", "Africa", "Middle East",
    "Dubai", "Saudi Arabia", "Turkey", "Switzerland", "Netherlands", "Sweden", "Norway",
    "Chicago", "San Francisco", "Los Angeles", "Toronto", "Sydney", "Mumbai", "Seoul",
];

const STOPWORDS: &[&str] = &[
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday",
    "Saturday", "Sunday", "The", "This", "That", "Least", "Most", "First", "Last",
];

const FALLBACK_PATTERNS: [&str; 3] = [
    r"\bin ([A-Z][a-z]+)",
    r"\bfrom ([A-Z][a-z]+)",
    r"\bat ([A-Z][a-z]+)",
];

/// Text-in, label-out. `None` means nothing was found.
pub trait LocationExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct GazetteerFile {
    #[serde(default)]
    places: Vec<String>,
}

pub struct PatternLocationExtractor {
    gazetteer: Option<Regex>,
    fallbacks: Vec<Regex>,
}

impl PatternLocationExtractor {
    pub fn new<S: AsRef<str>>(places: &[S]) -> Self {
        let mut names: Vec<&str> = places
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .collect();
        // Longest first so "New York" beats "York" at the same position.
        names.sort_by_key(|n| std::cmp::Reverse(n.len()));
        let gazetteer = if names.is_empty() {
            None
        } else {
            let alternation = names
                .iter()
                .map(|n| regex::escape(n))
                .collect::<Vec<_>>()
                .join("|");
            Regex::new(&format!(r"\b(?:{alternation})\b")).ok()
        };
        let fallbacks = FALLBACK_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self { gazetteer, fallbacks }
    }

    pub fn builtin() -> Self {
        Self::new(BUILTIN_PLACES)
    }

    /// Gazetteer from a JSON file; falls back to the built-in list when the
    /// file is missing or unreadable.
    pub fn from_path(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::builtin();
        };
        match serde_json::from_str::<GazetteerFile>(&content) {
            Ok(cfg) if !cfg.places.is_empty() => Self::new(cfg.places.as_slice()),
            Ok(_) => Self::builtin(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid gazetteer, using built-in places");
                Self::builtin()
            }
        }
    }

    /// `$LOCATIONS_PATH`, else `config/locations.json`, else built-in.
    pub fn from_default_path() -> Self {
        Self::from_path(&gazetteer_path())
    }
}

fn gazetteer_path() -> PathBuf {
    if let Ok(p) = std::env::var("LOCATIONS_PATH") {
        return PathBuf::from(p);
    }
    PathBuf::from("config/locations.json")
}

impl LocationExtractor for PatternLocationExtractor {
    fn extract(&self, text: &str) -> Option<String> {
        let text = truncate_chars(text, SCAN_CHARS);
        if text.trim().is_empty() {
            return None;
        }
        if let Some(m) = self.gazetteer.as_ref().and_then(|re| re.find(text)) {
            return Some(m.as_str().to_string());
        }
        for re in &self.fallbacks {
            let hit = re
                .captures_iter(text)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str())
                .find(|w| !STOPWORDS.contains(w));
            if let Some(w) = hit {
                return Some(w.to_string());
            }
        }
        None
    }
}

/// Fill `location` on every item not already resolved. Order is preserved.
pub fn enrich_locations<E: LocationExtractor + ?Sized>(mut items: Vec<NewsItem>, extractor: &E) -> Vec<NewsItem> {
    let t0 = std::time::Instant::now();
    for item in items.iter_mut() {
        if matches!(item.location, Location::Found(_)) {
            continue;
        }
        let text = format!("{}. {}", item.title, item.summary);
        item.location = match extractor.extract(&text) {
            Some(place) => Location::Found(place),
            None => Location::NotFound,
        };
    }
    let found = items.iter().filter(|i| i.location.as_found().is_some()).count();
    tracing::info!(
        target: "enrich",
        found,
        total = items.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "locations added"
    );
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gazetteer_prefers_leftmost_and_longest() {
        let ex = PatternLocationExtractor::builtin();
        assert_eq!(
            ex.extract("Stocks in New York slid while Tokyo rallied").as_deref(),
            Some("New York")
        );
    }

    #[test]
    fn fallback_patterns_skip_months() {
        let ex = PatternLocationExtractor::new::<&str>(&[]);
        assert_eq!(
            ex.extract("Rates were cut in March by officials in Ottawa").as_deref(),
            Some("Ottawa")
        );
        assert_eq!(ex.extract("Analysts from Nomura expect more").as_deref(), Some("Nomura"));
        assert_eq!(ex.extract("nothing capitalized here"), None);
    }

    #[test]
    fn missing_file_falls_back_to_builtin() {
        let ex = PatternLocationExtractor::from_path(Path::new("__no_such_gazetteer__.json"));
        assert_eq!(ex.extract("Talks in Brussels").as_deref(), Some("Brussels"));
    }
}
