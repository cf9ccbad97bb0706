// src/enrich/mod.rs
//! Post-dedup enrichment of unique items.

pub mod location;

pub use location::{enrich_locations, LocationExtractor, PatternLocationExtractor};
