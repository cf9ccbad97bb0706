// src/ingest/parser.rs
//! RSS 0.9x/1.0/2.0 and Atom parsing plus the recency window.
//!
//! Entries are read field by field from the XML event stream, so an element
//! the parser does not know about (`media:*`, `content:encoded`, inline XHTML,
//! a repeated tag) affects at most that element, never the rest of the feed.
//! A document that is not a feed yields no items, an entry with nothing to
//! embed is skipped, and an entry without a usable timestamp is kept with the
//! run's `now` (logged and counted as undated).

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::types::{FetchOutcome, Location, NewsItem, RawFeedDocument};

const DEFAULT_TITLE: &str = "No Title";
const DEFAULT_SUMMARY: &str = "No Summary";

const ATOM_NS: &[u8] = b"http://www.w3.org/2005/Atom";
const RSS1_NS: &[u8] = b"http://purl.org/rss/1.0/";
const RSS090_NS: &[u8] = b"http://my.netscape.com/rdf/simple/0.9/";
const DC_NS: &[u8] = b"http://purl.org/dc/elements/1.1/";

/// Format-independent view of one feed entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    /// Candidate timestamps, best first.
    pub timestamps: Vec<String>,
    pub summary: Option<String>,
}

/// Namespace class of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ns {
    /// No namespace, or the RSS 1.0 / 0.90 / Atom namespaces.
    Feed,
    DublinCore,
    Other,
}

fn classify(ns: &ResolveResult<'_>) -> Ns {
    match ns {
        ResolveResult::Unbound => Ns::Feed,
        ResolveResult::Bound(Namespace(uri)) if *uri == ATOM_NS || *uri == RSS1_NS || *uri == RSS090_NS => {
            Ns::Feed
        }
        ResolveResult::Bound(Namespace(uri)) if *uri == DC_NS => Ns::DublinCore,
        // Feeds that use `dc:` without declaring it
        ResolveResult::Unknown(prefix) if prefix.as_slice() == b"dc" => Ns::DublinCore,
        _ => Ns::Other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Published,
    DcDate,
    Updated,
    Summary,
    Content,
}

fn field_for(ns: Ns, name: &[u8]) -> Option<Field> {
    match (ns, name) {
        (Ns::Feed, b"title") => Some(Field::Title),
        (Ns::Feed, b"link") => Some(Field::Link),
        (Ns::Feed, b"pubDate" | b"published" | b"issued") => Some(Field::Published),
        (Ns::Feed, b"updated" | b"modified") => Some(Field::Updated),
        (Ns::Feed, b"description" | b"summary") => Some(Field::Summary),
        (Ns::Feed, b"content") => Some(Field::Content),
        (Ns::DublinCore, b"date") => Some(Field::DcDate),
        _ => None,
    }
}

/// Fields collected for the entry being read. The first non-blank value wins.
#[derive(Debug, Default)]
struct EntryDraft {
    title: Option<String>,
    link: Option<String>,
    alternate_href: Option<String>,
    first_href: Option<String>,
    published: Option<String>,
    dc_date: Option<String>,
    updated: Option<String>,
    summary: Option<String>,
    content: Option<String>,
}

impl EntryDraft {
    fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Published => &mut self.published,
            Field::DcDate => &mut self.dc_date,
            Field::Updated => &mut self.updated,
            Field::Summary => &mut self.summary,
            Field::Content => &mut self.content,
        };
        if slot.is_none() && !value.trim().is_empty() {
            *slot = Some(value);
        }
    }

    /// Atom `<link href rel>`; `rel` defaults to `alternate`.
    fn note_link(&mut self, e: &BytesStart<'_>) {
        let mut href = None;
        let mut rel = None;
        for attr in e.attributes().flatten() {
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            match attr.key.local_name().as_ref() {
                b"href" => href = Some(value),
                b"rel" => rel = Some(value),
                _ => {}
            }
        }
        let Some(href) = href.filter(|h| !h.trim().is_empty()) else {
            return;
        };
        if self.alternate_href.is_none() && rel.as_deref().unwrap_or("alternate") == "alternate" {
            self.alternate_href = Some(href.clone());
        }
        if self.first_href.is_none() {
            self.first_href = Some(href);
        }
    }
}

impl From<EntryDraft> for FeedEntry {
    fn from(d: EntryDraft) -> Self {
        Self {
            title: d.title,
            link: d.link.or(d.alternate_href).or(d.first_href),
            timestamps: [d.published, d.dc_date, d.updated].into_iter().flatten().collect(),
            summary: d.summary.or(d.content),
        }
    }
}

/// Text being collected for one direct child of an entry.
struct Capture {
    field: Field,
    depth: usize,
    text: String,
    /// Inline markup was seen (unescaped XHTML inside the element).
    markup: bool,
}

impl Capture {
    fn new(field: Field, depth: usize) -> Self {
        Self {
            field,
            depth,
            text: String::new(),
            markup: false,
        }
    }

    fn boundary(&mut self) {
        self.markup = true;
        self.text.push(' ');
    }

    fn finish(self) -> String {
        if self.markup {
            self.text.split_whitespace().collect::<Vec<_>>().join(" ")
        } else {
            self.text
        }
    }
}

/// Parse an RSS or Atom document into entries.
///
/// A reader error after at least one complete entry keeps the entries read so
/// far; an error before that fails the document.
pub fn parse_entries(xml: &str) -> Result<Vec<FeedEntry>> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let mut reader = NsReader::from_str(&xml_clean);

    let mut entries = Vec::new();
    let mut is_feed = false;
    let mut draft: Option<EntryDraft> = None;
    let mut capture: Option<Capture> = None;
    // Nesting below the current entry element.
    let mut depth = 0usize;

    loop {
        let (ns, event) = match reader.read_resolved_event() {
            Ok((ns, event)) => (classify(&ns), event),
            Err(e) if !entries.is_empty() => {
                tracing::debug!(error = %e, kept = entries.len(), "feed xml broken, keeping entries read so far");
                break;
            }
            Err(e) => return Err(anyhow!(e)).context("reading feed xml"),
        };

        match event {
            Event::Start(e) => {
                let local = e.local_name();
                let name = local.as_ref();
                if draft.is_none() {
                    if ns == Ns::Feed && (name == b"item" || name == b"entry") {
                        is_feed = true;
                        draft = Some(EntryDraft::default());
                        depth = 0;
                    } else if matches!(name, b"rss" | b"RDF" | b"feed" | b"channel") {
                        is_feed = true;
                    }
                    continue;
                }
                depth += 1;
                if let Some(c) = capture.as_mut() {
                    c.boundary();
                } else if depth == 1 {
                    if ns == Ns::Feed && name == b"link" {
                        if let Some(d) = draft.as_mut() {
                            d.note_link(&e);
                        }
                    }
                    capture = field_for(ns, name).map(|field| Capture::new(field, depth));
                }
            }
            Event::Empty(e) => {
                let Some(d) = draft.as_mut() else {
                    continue;
                };
                if let Some(c) = capture.as_mut() {
                    c.boundary();
                } else if depth == 0 && ns == Ns::Feed && e.local_name().as_ref() == b"link" {
                    d.note_link(&e);
                }
            }
            Event::Text(t) => {
                if let Some(c) = capture.as_mut() {
                    match t.unescape() {
                        Ok(text) => c.text.push_str(&text),
                        Err(_) => c.text.push_str(&String::from_utf8_lossy(&t)),
                    }
                }
            }
            Event::CData(t) => {
                if let Some(c) = capture.as_mut() {
                    c.text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::End(_) if draft.is_some() => {
                if depth == 0 {
                    entries.extend(draft.take().map(FeedEntry::from));
                    continue;
                }
                if capture.as_ref().is_some_and(|c| c.depth == depth) {
                    if let (Some(c), Some(d)) = (capture.take(), draft.as_mut()) {
                        d.set(c.field, c.finish());
                    }
                } else if let Some(c) = capture.as_mut() {
                    c.boundary();
                }
                depth -= 1;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !is_feed {
        return Err(anyhow!("not an rss, rdf or atom document"));
    }
    Ok(entries)
}

/// Entities that are valid HTML but not XML, commonly leaked into feeds.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

/// Parse RFC 2822 (RSS) or RFC 3339 (Atom) timestamps into UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822).or_else(|_| OffsetDateTime::parse(s, &Rfc3339)) {
        return DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond());
    }
    // chrono is more forgiving with legacy zone names and single-digit days
    DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Strip paragraph and line-break tags. Best-effort cleanup, not sanitization.
pub fn clean_summary(s: &str) -> String {
    s.replace("<p>", "")
        .replace("</p>", " ")
        .replace("<br>", " ")
        .replace("<br/>", " ")
        .replace("<br />", " ")
        .trim()
        .to_string()
}

/// Sliding recency window anchored at a `now` captured once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyFilter {
    now: DateTime<Utc>,
    window: chrono::Duration,
}

impl RecencyFilter {
    pub fn new(now: DateTime<Utc>, window: chrono::Duration) -> Self {
        Self { now, window }
    }

    pub fn starting_now(window: chrono::Duration) -> Self {
        Self::new(Utc::now(), window)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn window(&self) -> chrono::Duration {
        self.window
    }

    /// Future-dated items have negative age and are admitted.
    pub fn admits(&self, published_at: DateTime<Utc>) -> bool {
        self.now - published_at <= self.window
    }
}

/// Turn one entry into a `NewsItem`, or `None` if it falls outside the window.
/// Errors only for entries with nothing usable (no title and no summary).
pub fn build_item(source: &str, entry: FeedEntry, filter: &RecencyFilter) -> Result<Option<NewsItem>> {
    let title = entry.title.as_deref().map(str::trim).unwrap_or_default();
    let summary = entry.summary.as_deref().map(clean_summary).unwrap_or_default();
    if title.is_empty() && summary.is_empty() {
        return Err(anyhow!("entry has neither title nor summary"));
    }

    let published_at = match entry.timestamps.iter().find_map(|t| parse_timestamp(t)) {
        Some(ts) => ts,
        None => {
            tracing::warn!(%source, title, "no usable date on entry, using run time");
            counter!("ingest_undated_total").increment(1);
            filter.now()
        }
    };
    if !filter.admits(published_at) {
        return Ok(None);
    }

    Ok(Some(NewsItem {
        source: source.to_string(),
        title: if title.is_empty() { DEFAULT_TITLE.to_string() } else { title.to_string() },
        link: entry.link.map(|l| l.trim().to_string()).unwrap_or_default(),
        published_at,
        summary: if summary.is_empty() { DEFAULT_SUMMARY.to_string() } else { summary },
        location: Location::Pending,
    }))
}

/// Parse one fetched document and keep recent entries, preserving entry order.
pub fn parse_document(doc: &RawFeedDocument, filter: &RecencyFilter) -> Vec<NewsItem> {
    let t0 = std::time::Instant::now();
    let entries = match parse_entries(&doc.body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(source = %doc.source, url = %doc.url, error = ?e, "feed document unparsable");
            counter!("ingest_parse_errors_total").increment(1);
            return Vec::new();
        }
    };
    if entries.is_empty() {
        tracing::warn!(source = %doc.source, url = %doc.url, "no entries in feed");
    }
    counter!("ingest_entries_total").increment(entries.len() as u64);

    let mut out = Vec::with_capacity(entries.len());
    let mut stale = 0u64;
    for entry in entries {
        match build_item(&doc.source, entry, filter) {
            Ok(Some(item)) => out.push(item),
            Ok(None) => stale += 1,
            Err(e) => {
                tracing::debug!(source = %doc.source, error = %e, "entry skipped");
                counter!("ingest_entries_skipped_total").increment(1);
            }
        }
    }

    counter!("ingest_stale_total").increment(stale);
    histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    out
}

/// Parser entry point for a fetch outcome; failures produce an empty list.
pub fn parse_outcome(outcome: &FetchOutcome, filter: &RecencyFilter) -> Vec<NewsItem> {
    match outcome {
        FetchOutcome::Fetched(doc) => parse_document(doc, filter),
        FetchOutcome::Failed { .. } => Vec::new(),
    }
}

/// Parse all outcomes on the blocking pool, merging per-feed lists in input order.
pub async fn parse_all(outcomes: Vec<FetchOutcome>, filter: RecencyFilter) -> Vec<NewsItem> {
    let handles: Vec<_> = outcomes
        .into_iter()
        .map(|o| {
            let source = o.source().to_string();
            let handle = tokio::task::spawn_blocking(move || parse_outcome(&o, &filter));
            (source, handle)
        })
        .collect();

    let mut out = Vec::new();
    for (source, handle) in handles {
        match handle.await {
            Ok(mut items) => out.append(&mut items),
            Err(e) => {
                tracing::error!(%source, error = ?e, "parse task failed");
                counter!("ingest_parse_errors_total").increment(1);
            }
        }
    }
    out
}
