// src/dedup/mod.rs
//! Near-duplicate removal: embed every item, bucket by LSH hash, then confirm
//! duplicates inside each bucket by cosine similarity.

pub mod embedder;
pub mod lsh;
pub mod resolver;

use std::time::Instant;

use metrics::{counter, gauge};

use crate::config::DedupSettings;
use crate::ingest::types::NewsItem;

pub use crate::dedup::embedder::{DynEmbedder, EmbedError, Embedder};
pub use crate::dedup::lsh::LshHasher;
pub use crate::dedup::resolver::{cosine_similarity, group_by_hash, resolve, Bucket, EmbeddedItem};

#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("embedding stage failed: {0}")]
    Embedding(#[from] EmbedError),
    #[error("embedding {index} has dimension {got}, hasher expects {expected}")]
    Dimension {
        index: usize,
        expected: usize,
        got: usize,
    },
}

pub struct Deduplicator {
    embedder: DynEmbedder,
    hasher: LshHasher,
    settings: DedupSettings,
}

impl Deduplicator {
    /// Hyperplanes are derived from `settings.lsh_seed`, so two deduplicators
    /// built from the same settings hash identically.
    pub fn new(embedder: DynEmbedder, settings: DedupSettings) -> Self {
        let hasher = LshHasher::from_seed(settings.lsh_seed, settings.lsh_bits, settings.embedding_dim);
        Self {
            embedder,
            hasher,
            settings,
        }
    }

    pub fn with_hasher(embedder: DynEmbedder, hasher: LshHasher, settings: DedupSettings) -> Self {
        Self {
            embedder,
            hasher,
            settings,
        }
    }

    pub fn hasher(&self) -> &LshHasher {
        &self.hasher
    }

    /// Embed, hash, bucket and resolve. The output never carries embeddings or hashes.
    /// Any embedding failure fails the whole batch.
    pub async fn dedup(&self, items: Vec<NewsItem>) -> Result<Vec<NewsItem>, DedupError> {
        crate::ingest::ensure_metrics_described();
        if items.is_empty() {
            tracing::warn!("empty news list provided to duplicate removal");
            return Ok(Vec::new());
        }

        let t0 = Instant::now();
        let input = items.len();
        counter!("dedup_input_total").increment(input as u64);

        let texts: Vec<String> = items
            .iter()
            .map(|it| it.embedding_text(self.settings.summary_cap))
            .collect();
        let embeddings = self.embedder.embed(&texts, self.settings.max_text_len).await?;
        if embeddings.len() != items.len() {
            return Err(EmbedError::CountMismatch {
                expected: items.len(),
                got: embeddings.len(),
            }
            .into());
        }

        let mut embedded = Vec::with_capacity(items.len());
        for (index, (item, embedding)) in items.into_iter().zip(embeddings).enumerate() {
            if embedding.len() != self.hasher.dimension() {
                return Err(DedupError::Dimension {
                    index,
                    expected: self.hasher.dimension(),
                    got: embedding.len(),
                });
            }
            let hash = self.hasher.hash(&embedding);
            embedded.push(EmbeddedItem::new(item, embedding, hash));
        }

        let buckets = group_by_hash(embedded);
        gauge!("dedup_buckets").set(buckets.len() as f64);
        let bucket_count = buckets.len();

        let unique = resolve(buckets, self.settings.threshold);
        let removed = input - unique.len();
        counter!("dedup_duplicates_total").increment(removed as u64);

        tracing::info!(
            target: "dedup",
            input,
            buckets = bucket_count,
            lsh_bits = self.hasher.bits(),
            removed,
            remaining = unique.len(),
            embedder = self.embedder.name(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "duplicate removal finished"
        );
        Ok(unique)
    }
}
