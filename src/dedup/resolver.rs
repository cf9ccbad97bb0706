// src/dedup/resolver.rs
use std::collections::HashMap;

use crate::dedup::lsh::dot;
use crate::ingest::types::NewsItem;

/// A news item carrying its embedding and LSH hash during one dedup pass.
#[derive(Debug, Clone)]
pub struct EmbeddedItem {
    item: NewsItem,
    embedding: Vec<f32>,
    hash: String,
}

impl EmbeddedItem {
    pub fn new(item: NewsItem, embedding: Vec<f32>, hash: String) -> Self {
        Self { item, embedding, hash }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    /// Drop the embedding and hash, leaving the plain record.
    pub fn into_item(self) -> NewsItem {
        self.item
    }
}

/// Items sharing one hash, in arrival order.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub hash: String,
    pub members: Vec<EmbeddedItem>,
}

/// Group by identical hash. Buckets are ordered by first appearance.
pub fn group_by_hash(items: Vec<EmbeddedItem>) -> Vec<Bucket> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<Bucket> = Vec::new();
    for it in items {
        match index.get(&it.hash) {
            Some(&i) => buckets[i].members.push(it),
            None => {
                index.insert(it.hash.clone(), buckets.len());
                buckets.push(Bucket {
                    hash: it.hash.clone(),
                    members: vec![it],
                });
            }
        }
    }
    buckets
}

/// Cosine of the angle between `a` and `b`; 0 when either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let na = dot(a, a).sqrt();
    let nb = dot(b, b).sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot(a, b) / (na * nb)
}

/// Greedy per-bucket pass: a candidate is dropped when it is at least `threshold`
/// similar to any item already kept in its bucket (first match wins).
/// Returns kept items, bucket by bucket, with embeddings and hashes stripped.
pub fn resolve(buckets: Vec<Bucket>, threshold: f32) -> Vec<NewsItem> {
    let mut unique = Vec::new();
    for bucket in buckets {
        let mut kept: Vec<EmbeddedItem> = Vec::with_capacity(bucket.members.len());
        for candidate in bucket.members {
            let dup_of = kept
                .iter()
                .position(|k| cosine_similarity(&candidate.embedding, &k.embedding) >= threshold);
            match dup_of {
                Some(i) => {
                    tracing::debug!(
                        bucket = %bucket.hash,
                        dropped = %candidate.item.title,
                        kept = %kept[i].item.title,
                        "near-duplicate dropped"
                    );
                }
                None => kept.push(candidate),
            }
        }
        unique.extend(kept.into_iter().map(EmbeddedItem::into_item));
    }
    unique
}
