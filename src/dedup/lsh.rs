// src/dedup/lsh.rs
//! Random-hyperplane LSH. Planes come from a seeded RNG so hash assignment is
//! reproducible across runs; they are rebuilt per pass instead of cached globally.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct LshHasher {
    planes: Vec<Vec<f32>>,
    dimension: usize,
}

impl LshHasher {
    /// `bits` hyperplanes of `dimension` components, uniform in [-1, 1).
    pub fn from_seed(seed: u64, bits: usize, dimension: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let planes = (0..bits)
            .map(|_| {
                (0..dimension)
                    .map(|_| rng.random_range(-1.0f32..1.0))
                    .collect()
            })
            .collect();
        Self { planes, dimension }
    }

    /// Explicit planes; all must share one dimension.
    pub fn from_planes(planes: Vec<Vec<f32>>) -> Option<Self> {
        let dimension = planes.first().map(Vec::len)?;
        if planes.iter().any(|p| p.len() != dimension) {
            return None;
        }
        Some(Self { planes, dimension })
    }

    pub fn bits(&self) -> usize {
        self.planes.len()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// One `0`/`1` character per plane; `1` when the projection is non-negative.
    pub fn hash(&self, embedding: &[f32]) -> String {
        self.planes
            .iter()
            .map(|p| if dot(p, embedding) >= 0.0 { '1' } else { '0' })
            .collect()
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
