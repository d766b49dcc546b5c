//! Shared fixtures for integration tests.

#![allow(dead_code)]

use artclust::{ClusteringConfig, Embedding, Item};
use chrono::{DateTime, TimeZone, Utc};

/// Small deterministic generator so tests never depend on an RNG crate.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1))
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 33) as u32
    }

    /// Uniform in `[-1, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() as f32 / (1u64 << 31) as f32) * 2.0 - 1.0
    }

    pub fn vector(&mut self, dim: usize) -> Vec<f32> {
        (0..dim).map(|_| self.next_f32()).collect()
    }
}

pub fn emb(values: &[f32]) -> Embedding {
    Embedding::new(values.to_vec()).expect("finite embedding")
}

pub fn item(id: &str, values: &[f32]) -> Item {
    Item::new(id, Some(emb(values))).with_title(format!("title {id}"))
}

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()
}

pub fn config(dimension: usize) -> ClusteringConfig {
    ClusteringConfig {
        dimension,
        ..ClusteringConfig::default()
    }
}

/// `per_topic` noisy items around each of `topics` random directions, plus
/// `stragglers` items pointing anywhere.
pub fn topical_feed(
    seed: u64,
    dim: usize,
    topics: usize,
    per_topic: usize,
    stragglers: usize,
) -> Vec<Item> {
    let mut rng = Lcg::new(seed);
    let centers: Vec<Vec<f32>> = (0..topics).map(|_| rng.vector(dim)).collect();

    let mut items = Vec::new();
    for (t, center) in centers.iter().enumerate() {
        for n in 0..per_topic {
            let values: Vec<f32> = center.iter().map(|c| c + 0.08 * rng.next_f32()).collect();
            let published = at(1 + (rng.next_u32() % 28));
            items.push(
                Item::new(format!("t{t}-{n:03}"), Some(emb(&values)))
                    .with_title(format!("topic {t} story {n}"))
                    .with_keywords(format!("topic{t}, story"))
                    .with_published_at(published),
            );
        }
    }
    for n in 0..stragglers {
        items.push(Item::new(format!("s-{n:03}"), Some(emb(&rng.vector(dim)))));
    }
    items
}
