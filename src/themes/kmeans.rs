// src/themes/kmeans.rs
//! Seeded k-means (k-means++ seeding, Lloyd iterations, best of `n_init`).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{validate_points, ClusterBackend, ClusterError, ClusterMethod};

const TOLERANCE: f64 = 1e-8;

#[derive(Debug, Clone)]
pub struct KMeans {
    pub max_k: usize,
    pub seed: u64,
    pub n_init: usize,
    pub max_iter: usize,
}

impl Default for KMeans {
    fn default() -> Self {
        Self {
            max_k: 5,
            seed: 42,
            n_init: 10,
            max_iter: 300,
        }
    }
}

struct Fit {
    labels: Vec<usize>,
    inertia: f64,
}

impl KMeans {
    /// `n / 5` clusters, at least 2 and at most `max_k` (never more than `n`).
    pub fn cluster_count(&self, n: usize) -> usize {
        (n / 5).clamp(2, self.max_k.max(2)).min(n)
    }

    /// Cluster labels in `0..k`, numbered by first appearance in `points`.
    pub fn fit(&self, points: &[Vec<f32>]) -> Result<Vec<usize>, ClusterError> {
        validate_points(points)?;
        if points.len() < 2 {
            return Err(ClusterError::TooFewPoints {
                count: points.len(),
                required: 2,
            });
        }
        let data: Vec<Vec<f64>> = points
            .iter()
            .map(|p| p.iter().map(|&x| x as f64).collect())
            .collect();
        let k = self.cluster_count(data.len());

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<Fit> = None;
        for _ in 0..self.n_init.max(1) {
            let fit = self.run_once(&data, k, &mut rng);
            if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
                best = Some(fit);
            }
        }

        let labels = best.map(|b| b.labels).unwrap_or_default();
        Ok(relabel_by_first_seen(&labels, k))
    }

    fn run_once(&self, data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Fit {
        let mut centers = plus_plus_init(data, k, rng);
        let mut labels = vec![usize::MAX; data.len()];

        for _ in 0..self.max_iter.max(1) {
            let mut changed = false;
            for (i, p) in data.iter().enumerate() {
                let nearest = nearest_center(p, &centers).0;
                if labels[i] != nearest {
                    labels[i] = nearest;
                    changed = true;
                }
            }
            fill_empty_clusters(data, &centers, &mut labels, k);

            let next = compute_centers(data, &labels, k, &centers);
            let shift: f64 = centers
                .iter()
                .zip(&next)
                .map(|(a, b)| sq_dist(a, b))
                .sum();
            centers = next;
            if !changed || shift <= TOLERANCE {
                break;
            }
        }

        // final assignment against the settled centres
        let mut inertia = 0.0;
        for (i, p) in data.iter().enumerate() {
            let (c, d) = nearest_center(p, &centers);
            labels[i] = c;
            inertia += d;
        }
        fill_empty_clusters(data, &centers, &mut labels, k);
        Fit { labels, inertia }
    }
}

impl ClusterBackend for KMeans {
    fn method(&self) -> ClusterMethod {
        ClusterMethod::KMeans
    }

    fn fit_predict(&self, points: &[Vec<f32>]) -> Result<Vec<Option<usize>>, ClusterError> {
        Ok(self.fit(points)?.into_iter().map(Some).collect())
    }
}

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// (index, squared distance) of the closest centre; ties go to the lower index.
fn nearest_center(p: &[f64], centers: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, center) in centers.iter().enumerate() {
        let d = sq_dist(p, center);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

fn plus_plus_init(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centers = Vec::with_capacity(k);
    centers.push(data[rng.random_range(0..data.len())].clone());

    while centers.len() < k {
        let d2: Vec<f64> = data.iter().map(|p| nearest_center(p, &centers).1).collect();
        let total: f64 = d2.iter().sum();
        let idx = if total > 0.0 {
            let mut target = rng.random::<f64>() * total;
            let mut chosen = data.len() - 1;
            for (i, d) in d2.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            rng.random_range(0..data.len())
        };
        centers.push(data[idx].clone());
    }
    centers
}

/// Any cluster left without points takes the point farthest from its own centre.
fn fill_empty_clusters(data: &[Vec<f64>], centers: &[Vec<f64>], labels: &mut [usize], k: usize) {
    for c in 0..k {
        if labels.iter().any(|&l| l == c) {
            continue;
        }
        let mut counts = vec![0usize; k];
        labels.iter().for_each(|&l| counts[l] += 1);

        let donor = data
            .iter()
            .enumerate()
            .filter(|(i, _)| counts[labels[*i]] > 1)
            .map(|(i, p)| (i, sq_dist(p, &centers[labels[i]])))
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)));
        if let Some((i, _)) = donor {
            labels[i] = c;
        }
    }
}

fn compute_centers(data: &[Vec<f64>], labels: &[usize], k: usize, prev: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let dim = data[0].len();
    let mut sums = vec![vec![0.0; dim]; k];
    let mut counts = vec![0usize; k];
    for (p, &l) in data.iter().zip(labels) {
        counts[l] += 1;
        sums[l].iter_mut().zip(p).for_each(|(s, x)| *s += x);
    }
    sums.into_iter()
        .zip(counts)
        .enumerate()
        .map(|(c, (sum, n))| {
            if n == 0 {
                prev[c].clone()
            } else {
                sum.into_iter().map(|s| s / n as f64).collect()
            }
        })
        .collect()
}

fn relabel_by_first_seen(labels: &[usize], k: usize) -> Vec<usize> {
    let mut map = vec![usize::MAX; k];
    let mut next = 0;
    labels
        .iter()
        .map(|&l| {
            if map[l] == usize::MAX {
                map[l] = next;
                next += 1;
            }
            map[l]
        })
        .collect()
}
