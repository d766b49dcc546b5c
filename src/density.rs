//! DBSCAN-style density clustering over cosine distance.
//!
//! Output is a pure function of the input order and parameters: points are
//! visited in input order, neighbourhoods are index-sorted, and no unordered
//! collection is ever iterated.

use std::collections::VecDeque;

use crate::error::ClusterError;
use crate::types::ItemId;
use crate::vector::{Embedding, cosine_distance};

/// Density parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityParams {
    /// Maximum cosine distance for two points to be neighbours (inclusive).
    pub epsilon: f32,
    /// Minimum neighbourhood size, the point itself included, for a core point.
    pub min_pts: usize,
}

impl DensityParams {
    pub fn validate(&self) -> Result<(), ClusterError> {
        if !(0.0..=2.0).contains(&self.epsilon) {
            return Err(ClusterError::InvalidConfig(format!(
                "epsilon must be within [0, 2], got {}",
                self.epsilon
            )));
        }
        if self.min_pts == 0 {
            return Err(ClusterError::InvalidConfig(
                "min_pts must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Result of one density pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DensityOutcome {
    /// Clusters in seed order, members in input order. Each has `>= min_pts` members.
    pub clusters: Vec<Vec<ItemId>>,
    /// Unclustered points in input order.
    pub noise: Vec<ItemId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Unvisited,
    Noise,
    Member(usize),
}

#[derive(Debug, Clone)]
pub struct DensityClusterer {
    params: DensityParams,
}

impl DensityClusterer {
    pub fn new(params: DensityParams) -> Result<Self, ClusterError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> DensityParams {
        self.params
    }

    /// Cluster `points` in the given order.
    pub fn cluster(&self, points: &[(&ItemId, &Embedding)]) -> Result<DensityOutcome, ClusterError> {
        let vectors: Vec<&Embedding> = points.iter().map(|(_, v)| *v).collect();
        let groups = self.cluster_positions(&vectors)?;

        let mut in_cluster = vec![false; points.len()];
        let mut clusters = Vec::with_capacity(groups.len());
        for group in &groups {
            for &idx in group {
                in_cluster[idx] = true;
            }
            clusters.push(group.iter().map(|&idx| points[idx].0.clone()).collect());
        }

        let noise = points
            .iter()
            .zip(&in_cluster)
            .filter(|(_, clustered)| !**clustered)
            .map(|((id, _), _)| (*id).clone())
            .collect();

        Ok(DensityOutcome { clusters, noise })
    }

    /// Same partition as [`cluster`](Self::cluster), as positions into
    /// `vectors`. Groups are in seed order, positions ascending.
    pub fn cluster_positions(&self, vectors: &[&Embedding]) -> Result<Vec<Vec<usize>>, ClusterError> {
        if vectors.is_empty() {
            return Ok(Vec::new());
        }

        let neighbours = self.neighbourhoods(vectors)?;
        let min_pts = self.params.min_pts;
        let mut labels = vec![Label::Unvisited; vectors.len()];
        let mut seeds = 0usize;

        for start in 0..vectors.len() {
            if labels[start] != Label::Unvisited {
                continue;
            }
            if neighbours[start].len() < min_pts {
                labels[start] = Label::Noise;
                continue;
            }

            let cluster = seeds;
            seeds += 1;
            labels[start] = Label::Member(cluster);
            let mut queue: VecDeque<usize> = neighbours[start].iter().copied().collect();

            while let Some(p) = queue.pop_front() {
                match labels[p] {
                    Label::Member(_) => {}
                    Label::Noise => {
                        // Noise was never core; it joins as a border point.
                        labels[p] = Label::Member(cluster);
                    }
                    Label::Unvisited => {
                        labels[p] = Label::Member(cluster);
                        if neighbours[p].len() >= min_pts {
                            queue.extend(neighbours[p].iter().copied());
                        }
                    }
                }
            }
        }

        let mut members: Vec<Vec<usize>> = vec![Vec::new(); seeds];
        for (idx, label) in labels.iter().enumerate() {
            if let Label::Member(c) = label {
                members[*c].push(idx);
            }
        }

        // A seed whose neighbours were all claimed as borders elsewhere can
        // end up undersized; it dissolves back into noise.
        members.retain(|group| group.len() >= min_pts);
        Ok(members)
    }

    /// Index-sorted neighbour lists, self included.
    fn neighbourhoods(&self, vectors: &[&Embedding]) -> Result<Vec<Vec<usize>>, ClusterError> {
        let dim = vectors[0].dim();
        for v in vectors {
            v.check_dim(dim)?;
        }

        let n = vectors.len();
        let mut neighbours: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
        for i in 0..n {
            for j in (i + 1)..n {
                if cosine_distance(vectors[i], vectors[j])? <= self.params.epsilon {
                    neighbours[i].push(j);
                    neighbours[j].push(i);
                }
            }
        }
        for list in &mut neighbours {
            list.sort_unstable();
        }
        Ok(neighbours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(raw: &[(&str, &[f32])]) -> Vec<(ItemId, Embedding)> {
        raw.iter()
            .map(|(id, v)| (ItemId::from(*id), Embedding::new(v.to_vec()).unwrap()))
            .collect()
    }

    fn refs(owned: &[(ItemId, Embedding)]) -> Vec<(&ItemId, &Embedding)> {
        owned.iter().map(|(id, v)| (id, v)).collect()
    }

    fn ids(raw: &[&str]) -> Vec<ItemId> {
        raw.iter().map(|s| ItemId::from(*s)).collect()
    }

    fn clusterer(epsilon: f32, min_pts: usize) -> DensityClusterer {
        DensityClusterer::new(DensityParams { epsilon, min_pts }).unwrap()
    }

    #[test]
    fn two_groups_and_an_outlier() {
        let owned = points(&[
            ("a1", &[1.0, 0.05, 0.0]),
            ("b1", &[0.0, 1.0, 0.05]),
            ("a2", &[1.0, 0.0, 0.05]),
            ("x", &[-1.0, -1.0, 1.0]),
            ("b2", &[0.05, 1.0, 0.0]),
        ]);
        let out = clusterer(0.25, 2).cluster(&refs(&owned)).unwrap();
        assert_eq!(out.clusters, vec![ids(&["a1", "a2"]), ids(&["b1", "b2"])]);
        assert_eq!(out.noise, ids(&["x"]));
    }

    #[test]
    fn chain_expands_through_core_points() {
        // Consecutive points ~0.02 apart in distance, endpoints far apart.
        let owned = points(&[
            ("p0", &[1.0, 0.0]),
            ("p1", &[1.0, 0.2]),
            ("p2", &[1.0, 0.4]),
            ("p3", &[1.0, 0.6]),
        ]);
        let out = clusterer(0.03, 2).cluster(&refs(&owned)).unwrap();
        assert_eq!(out.clusters, vec![ids(&["p0", "p1", "p2", "p3"])]);
        assert!(out.noise.is_empty());
    }

    #[test]
    fn border_point_is_not_expanded() {
        // min_pts 4: only "c" is core; "b" joins as a border point and "d",
        // which touches nothing but "b", stays noise.
        let owned = points(&[
            ("a", &[1.0, 0.0]),
            ("c", &[1.0, 0.07]),
            ("b", &[1.0, 0.21]),
            ("d", &[1.0, 0.40]),
            ("e", &[1.0, -0.07]),
        ]);
        let out = clusterer(0.02, 4).cluster(&refs(&owned)).unwrap();
        assert_eq!(out.clusters, vec![ids(&["a", "c", "b", "e"])]);
        assert_eq!(out.noise, ids(&["d"]));
    }

    #[test]
    fn noise_point_can_become_border_later() {
        // "edge" is visited first and marked noise, then absorbed by the
        // core point that follows it.
        let owned = points(&[
            ("edge", &[1.0, 0.3]),
            ("core", &[1.0, 0.1]),
            ("twin", &[1.0, 0.0]),
        ]);
        let out = clusterer(0.03, 3).cluster(&refs(&owned)).unwrap();
        assert_eq!(out.clusters, vec![ids(&["edge", "core", "twin"])]);
        assert!(out.noise.is_empty());
    }

    #[test]
    fn undersized_seed_dissolves_into_noise() {
        // Points on the unit circle at -20..20 degrees, epsilon ~11 degrees.
        // "p" is core only thanks to "b", which the first cluster already
        // claimed as a border point, leaving {p, q2, q1} below min_pts.
        let owned = points(&[
            ("a1", &[0.9397, -0.3420]),
            ("a2", &[0.9659, -0.2588]),
            ("a4", &[0.9848, -0.1736]),
            ("b", &[1.0, 0.0]),
            ("p", &[0.9848, 0.1736]),
            ("q2", &[0.9659, 0.2588]),
            ("q1", &[0.9397, 0.3420]),
        ]);
        let out = clusterer(0.0184, 4).cluster(&refs(&owned)).unwrap();
        assert_eq!(out.clusters, vec![ids(&["a1", "a2", "a4", "b"])]);
        assert_eq!(out.noise, ids(&["p", "q2", "q1"]));
    }

    #[test]
    fn every_point_is_noise_when_nothing_is_dense() {
        let owned = points(&[("a", &[1.0, 0.0]), ("b", &[0.0, 1.0]), ("c", &[-1.0, 0.0])]);
        let out = clusterer(0.1, 2).cluster(&refs(&owned)).unwrap();
        assert!(out.clusters.is_empty());
        assert_eq!(out.noise, ids(&["a", "b", "c"]));
    }

    #[test]
    fn empty_input_is_empty_output() {
        let out = clusterer(0.1, 2).cluster(&[]).unwrap();
        assert_eq!(out, DensityOutcome::default());
    }

    #[test]
    fn repeated_runs_are_identical() {
        let owned = points(&[
            ("a", &[1.0, 0.1, 0.0]),
            ("b", &[0.9, 0.1, 0.1]),
            ("c", &[0.0, 1.0, 0.0]),
            ("d", &[0.1, 0.9, 0.0]),
            ("e", &[0.0, 0.0, 1.0]),
            ("f", &[0.5, 0.5, 0.0]),
        ]);
        let c = clusterer(0.2, 2);
        let first = c.cluster(&refs(&owned)).unwrap();
        for _ in 0..10 {
            assert_eq!(c.cluster(&refs(&owned)).unwrap(), first);
        }
    }

    #[test]
    fn positions_agree_with_ids() {
        let owned = points(&[
            ("x", &[-1.0, -1.0, 1.0]),
            ("a1", &[1.0, 0.05, 0.0]),
            ("b1", &[0.0, 1.0, 0.05]),
            ("a2", &[1.0, 0.0, 0.05]),
        ]);
        let vectors: Vec<&Embedding> = owned.iter().map(|(_, v)| v).collect();
        let c = clusterer(0.25, 2);
        assert_eq!(c.cluster_positions(&vectors).unwrap(), vec![vec![1, 3]]);
        assert_eq!(c.cluster(&refs(&owned)).unwrap().clusters, vec![ids(&["a1", "a2"])]);
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let owned = points(&[("a", &[1.0, 0.0]), ("b", &[1.0, 0.0, 0.0])]);
        let err = clusterer(0.1, 2).cluster(&refs(&owned)).unwrap_err();
        assert!(matches!(err, ClusterError::DimensionMismatch { .. }));
    }

    #[test]
    fn invalid_params_are_rejected() {
        assert!(DensityClusterer::new(DensityParams { epsilon: -0.1, min_pts: 2 }).is_err());
        assert!(DensityClusterer::new(DensityParams { epsilon: 0.2, min_pts: 0 }).is_err());
    }
}
