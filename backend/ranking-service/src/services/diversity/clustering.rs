//! Embedding clustering used for visual diversification.
//!
//! The selector only needs a group label per vector, so clustering sits
//! behind [`Clusterer`]. The default [`AffinityKMeans`] smooths each vector
//! with its nearest neighbours (cosine affinity) and then runs cosine k-means
//! seeded by farthest-point traversal. Everything is deterministic: the
//! first seed is the first input vector and ties resolve to the lower index.

use crate::utils::{cosine_similarity, l2_normalize};
use tracing::debug;

pub trait Clusterer: Send + Sync {
    /// Assign each vector a cluster label in `0..k`.
    ///
    /// `k` is clamped to the number of vectors; labels may leave some
    /// clusters empty when fewer than `k` distinct points exist.
    fn cluster(&self, vectors: &[Vec<f32>], k: usize) -> Vec<usize>;
}

#[derive(Debug, Clone, Copy)]
pub struct AffinityKMeans {
    /// Nearest neighbours blended into each point before clustering
    neighbors: usize,
    max_iterations: usize,
}

impl Default for AffinityKMeans {
    fn default() -> Self {
        Self {
            neighbors: 3,
            max_iterations: 20,
        }
    }
}

impl AffinityKMeans {
    pub fn new(neighbors: usize, max_iterations: usize) -> Self {
        Self {
            neighbors,
            max_iterations: max_iterations.max(1),
        }
    }

    /// v_i + sum over kNN(i) of max(sim_ij, 0) * v_j, renormalized
    fn smooth(&self, points: &[Vec<f32>]) -> Vec<Vec<f32>> {
        let n = points.len();
        if self.neighbors == 0 || n < 2 {
            return points.to_vec();
        }

        let similarity: Vec<Vec<f32>> = points
            .iter()
            .map(|a| points.iter().map(|b| cosine_similarity(a, b)).collect())
            .collect();

        (0..n)
            .map(|i| {
                let mut order: Vec<usize> = (0..n).filter(|&j| j != i).collect();
                order.sort_by(|&a, &b| {
                    similarity[i][b]
                        .partial_cmp(&similarity[i][a])
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.cmp(&b))
                });

                let mut smoothed = points[i].clone();
                for &j in order.iter().take(self.neighbors) {
                    let weight = similarity[i][j].max(0.0);
                    for (s, x) in smoothed.iter_mut().zip(&points[j]) {
                        *s += weight * x;
                    }
                }
                l2_normalize(&mut smoothed);
                smoothed
            })
            .collect()
    }

    fn farthest_point_seeds(points: &[Vec<f32>], k: usize) -> Vec<Vec<f32>> {
        let mut seeds = vec![0usize];
        // Highest similarity of each point to any chosen seed
        let mut closest: Vec<f32> = points
            .iter()
            .map(|p| cosine_similarity(p, &points[0]))
            .collect();

        while seeds.len() < k {
            let next = (0..points.len())
                .filter(|i| !seeds.contains(i))
                .min_by(|&a, &b| {
                    closest[a]
                        .partial_cmp(&closest[b])
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.cmp(&b))
                });
            let Some(next) = next else { break };

            seeds.push(next);
            for (i, p) in points.iter().enumerate() {
                closest[i] = closest[i].max(cosine_similarity(p, &points[next]));
            }
        }

        seeds.into_iter().map(|i| points[i].clone()).collect()
    }
}

fn nearest_centroid(point: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_sim = f32::NEG_INFINITY;
    for (c, centroid) in centroids.iter().enumerate() {
        let sim = cosine_similarity(point, centroid);
        if sim > best_sim {
            best_sim = sim;
            best = c;
        }
    }
    best
}

impl Clusterer for AffinityKMeans {
    fn cluster(&self, vectors: &[Vec<f32>], k: usize) -> Vec<usize> {
        let n = vectors.len();
        let k = k.min(n);
        if k <= 1 {
            return vec![0; n];
        }

        let points = self.smooth(vectors);
        let mut centroids = Self::farthest_point_seeds(&points, k);
        let mut labels: Vec<usize> = points
            .iter()
            .map(|p| nearest_centroid(p, &centroids))
            .collect();

        for iteration in 0..self.max_iterations {
            for (c, centroid) in centroids.iter_mut().enumerate() {
                let members: Vec<&Vec<f32>> = points
                    .iter()
                    .zip(&labels)
                    .filter(|(_, &label)| label == c)
                    .map(|(p, _)| p)
                    .collect();
                // Empty clusters keep their previous centroid
                if members.is_empty() {
                    continue;
                }

                let mut sum = vec![0.0f32; centroid.len()];
                for member in members {
                    for (s, x) in sum.iter_mut().zip(member) {
                        *s += x;
                    }
                }
                l2_normalize(&mut sum);
                *centroid = sum;
            }

            let next: Vec<usize> = points
                .iter()
                .map(|p| nearest_centroid(p, &centroids))
                .collect();
            if next == labels {
                debug!(iterations = iteration + 1, clusters = k, "k-means converged");
                break;
            }
            labels = next;
        }

        labels
    }
}
