// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use news_dedup_pipeline::dedup::embedder::{truncate_texts, EmbedError, Embedder};
use news_dedup_pipeline::ingest::fetcher::{FeedTransport, FetchError, TransportResponse};
use news_dedup_pipeline::ingest::types::{Location, NewsItem};
use reqwest::header::HeaderMap;

pub const DIM: usize = 768;

/// One scripted reaction of the fake transport.
#[derive(Debug, Clone)]
pub enum Step {
    Body(String),
    Status(u16),
    Hang(Duration),
    Refused,
    Panic,
}

/// Per-URL scripts; the last step repeats once a script runs out.
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<HashMap<String, usize>>,
    headers: Mutex<Vec<HeaderMap>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            headers: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn script(self, url: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), steps.into());
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn seen_headers(&self) -> Vec<HeaderMap> {
        self.headers.lock().unwrap().clone()
    }

    fn next_step(&self, url: &str) -> Step {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(q) if q.len() > 1 => q.pop_front().unwrap(),
            Some(q) => q.front().cloned().unwrap_or(Step::Status(404)),
            None => Step::Status(404),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FeedTransport for ScriptedTransport {
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<TransportResponse, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.headers.lock().unwrap().push(headers);

        let step = self.next_step(url);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match step {
            Step::Body(body) => Ok(TransportResponse { status: 200, body }),
            Step::Status(status) => Ok(TransportResponse {
                status,
                body: String::new(),
            }),
            Step::Hang(d) => {
                tokio::time::sleep(d).await;
                Ok(TransportResponse {
                    status: 200,
                    body: String::new(),
                })
            }
            Step::Refused => Err(FetchError::Transport("connection refused".into())),
            Step::Panic => panic!("transport blew up"),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Looks vectors up by title prefix; unknown texts get a one-hot vector keyed
/// by a hash of the text, so unrelated items are orthogonal.
pub struct StubEmbedder {
    table: Vec<(String, Vec<f32>)>,
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<String>>,
}

impl StubEmbedder {
    pub fn new(table: Vec<(&str, Vec<f32>)>) -> Self {
        Self {
            table: table.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some((_, v)) = self.table.iter().find(|(k, _)| text.starts_with(k.as_str())) {
            return v.clone();
        }
        let slot = text
            .bytes()
            .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
            % DIM;
        sparse(&[(slot, 1.0)])
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, texts: &[String], max_text_len: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let texts = truncate_texts(texts, max_text_len);
        self.seen.lock().unwrap().extend(texts.iter().cloned());
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
    fn name(&self) -> &'static str {
        "stub"
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: &[String], _max_text_len: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Request("model server down".into()))
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

/// A `DIM`-long vector with the given non-zero components.
pub fn sparse(components: &[(usize, f32)]) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    for &(i, x) in components {
        v[i] = x;
    }
    v
}

pub fn news(source: &str, title: &str, summary: &str) -> NewsItem {
    NewsItem {
        source: source.into(),
        title: title.into(),
        link: format!("https://{}.test/{}", source.to_lowercase(), title.len()),
        published_at: Utc::now(),
        summary: summary.into(),
        location: Location::Pending,
    }
}

/// RSS 2.0 document with `(title, description, pubDate)` items.
pub fn rss(items: &[(&str, &str, Option<DateTime<Utc>>)]) -> String {
    let mut body = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Test</title>"#,
    );
    for (i, (title, desc, date)) in items.iter().enumerate() {
        body.push_str("<item>");
        body.push_str(&format!("<title>{title}</title>"));
        body.push_str(&format!("<link>https://news.test/{i}</link>"));
        body.push_str(&format!("<description>{desc}</description>"));
        if let Some(d) = date {
            body.push_str(&format!("<pubDate>{}</pubDate>", d.to_rfc2822()));
        }
        body.push_str("</item>");
    }
    body.push_str("</channel></rss>");
    body
}
