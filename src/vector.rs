//! Fixed-dimension vector math used by every pass.
//!
//! Distances throughout the engine are cosine distances, `1 - cos(a, b)`, so a
//! similarity bound `τ` corresponds to a neighbourhood radius `ε = 1 - τ`.

use serde::{Deserialize, Serialize};

use crate::error::ClusterError;

/// Owned embedding vector. Components are guaranteed finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Wrap a raw vector, rejecting NaN and infinite components.
    pub fn new(values: Vec<f32>) -> Result<Self, ClusterError> {
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(ClusterError::NonFiniteEmbedding { index });
        }
        Ok(Self(values))
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn norm(&self) -> f32 {
        self.0.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Fail with `DimensionMismatch` unless `dim() == expected`.
    pub fn check_dim(&self, expected: usize) -> Result<(), ClusterError> {
        if self.dim() != expected {
            return Err(ClusterError::DimensionMismatch {
                expected,
                got: self.dim(),
            });
        }
        Ok(())
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = ClusterError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Embedding::new(values)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(value: Embedding) -> Self {
        value.0
    }
}

/// Cosine similarity in `[-1, 1]`.
///
/// Returns `0.0` when either vector has zero norm.
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> Result<f32, ClusterError> {
    if a.dim() != b.dim() {
        return Err(ClusterError::DimensionMismatch {
            expected: a.dim(),
            got: b.dim(),
        });
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

/// `1 - cosine_similarity(a, b)`, in `[0, 2]`.
pub fn cosine_distance(a: &Embedding, b: &Embedding) -> Result<f32, ClusterError> {
    Ok(1.0 - cosine_similarity(a, b)?)
}

/// Neighbourhood radius equivalent to a similarity bound.
pub fn epsilon_for_similarity(similarity: f32) -> f32 {
    1.0 - similarity
}

/// Arithmetic mean of `vectors`.
pub fn centroid(vectors: &[&Embedding]) -> Result<Embedding, ClusterError> {
    let first = vectors.first().ok_or(ClusterError::EmptyInput)?;
    let mut acc = CentroidAccumulator::new(first.dim());
    for v in vectors {
        acc.push(v)?;
    }
    acc.centroid()
}

/// Running f64 sum used to keep a centroid equal to the mean of its inputs
/// without holding on to every input vector.
#[derive(Debug, Clone, PartialEq)]
pub struct CentroidAccumulator {
    sum: Vec<f64>,
    count: usize,
}

impl CentroidAccumulator {
    pub fn new(dimension: usize) -> Self {
        Self {
            sum: vec![0.0; dimension],
            count: 0,
        }
    }

    /// Resume from a known mean over `count` vectors.
    pub fn from_mean(mean: &Embedding, count: usize) -> Self {
        let n = count as f64;
        Self {
            sum: mean.as_slice().iter().map(|&x| f64::from(x) * n).collect(),
            count,
        }
    }

    pub(crate) fn from_parts(sum: Vec<f64>, count: usize) -> Self {
        Self { sum, count }
    }

    pub(crate) fn into_sum(self) -> Vec<f64> {
        self.sum
    }

    pub fn dimension(&self) -> usize {
        self.sum.len()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn push(&mut self, v: &Embedding) -> Result<(), ClusterError> {
        v.check_dim(self.sum.len())?;
        for (s, &x) in self.sum.iter_mut().zip(v.as_slice()) {
            *s += f64::from(x);
        }
        self.count += 1;
        Ok(())
    }

    pub fn centroid(&self) -> Result<Embedding, ClusterError> {
        if self.count == 0 {
            return Err(ClusterError::EmptyInput);
        }
        let n = self.count as f64;
        Ok(Embedding(
            self.sum.iter().map(|&s| (s / n) as f32).collect(),
        ))
    }
}
