// src/themes/hdbscan.rs
//! Density clustering (HDBSCAN) over Euclidean distance.
//!
//! Steps:
//! 1) core distance of each point = distance to its `min_samples`-th nearest
//!    neighbour (the point itself counts as the first)
//! 2) minimum spanning tree over the mutual-reachability graph (Prim, O(n²))
//! 3) single-linkage hierarchy from the sorted MST edges
//! 4) condensed tree: splits where both sides have `min_cluster_size` points
//!    start new clusters, smaller sides fall out as points
//! 5) excess-of-mass selection; the root is never selected
//!
//! Points that never belong to a selected cluster are noise (`None`).

use std::collections::HashMap;

use super::{validate_points, ClusterBackend, ClusterError, ClusterMethod};

/// λ for zero-distance merges.
const MAX_LAMBDA: f64 = 1e12;

#[derive(Debug, Clone)]
pub struct Hdbscan {
    pub min_cluster_size: usize,
    pub min_samples: usize,
}

impl Default for Hdbscan {
    fn default() -> Self {
        Self {
            min_cluster_size: 3,
            min_samples: 2,
        }
    }
}

/// Single-linkage merge: node `n + i` joins `left` and `right` at `distance`.
#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

/// Condensed-tree row. `child < n` is a point, otherwise a cluster label.
#[derive(Debug, Clone, Copy)]
struct CondensedRow {
    parent: usize,
    child: usize,
    lambda: f64,
    size: usize,
}

impl Hdbscan {
    pub fn fit(&self, points: &[Vec<f32>]) -> Result<Vec<Option<usize>>, ClusterError> {
        validate_points(points)?;
        let n = points.len();
        let mcs = self.min_cluster_size.max(2);
        if n < mcs.max(2) {
            return Err(ClusterError::TooFewPoints {
                count: n,
                required: mcs.max(2),
            });
        }

        let dist = pairwise_distances(points);
        let core = core_distances(&dist, self.min_samples.max(1));
        let mst = mutual_reachability_mst(&dist, &core);
        let tree = single_linkage(n, mst);
        let condensed = condense(n, &tree, mcs);
        let selected = select_clusters(n, &condensed);
        Ok(assign_labels(n, &condensed, &selected))
    }
}

impl ClusterBackend for Hdbscan {
    fn method(&self) -> ClusterMethod {
        ClusterMethod::Hdbscan
    }

    fn fit_predict(&self, points: &[Vec<f32>]) -> Result<Vec<Option<usize>>, ClusterError> {
        self.fit(points)
    }
}

fn pairwise_distances(points: &[Vec<f32>]) -> Vec<Vec<f64>> {
    let n = points.len();
    let mut dist = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = points[i]
                .iter()
                .zip(&points[j])
                .map(|(a, b)| {
                    let diff = *a as f64 - *b as f64;
                    diff * diff
                })
                .sum::<f64>()
                .sqrt();
            dist[i][j] = d;
            dist[j][i] = d;
        }
    }
    dist
}

fn core_distances(dist: &[Vec<f64>], min_samples: usize) -> Vec<f64> {
    dist.iter()
        .map(|row| {
            let mut sorted = row.clone();
            sorted.sort_by(f64::total_cmp);
            sorted[(min_samples - 1).min(sorted.len() - 1)]
        })
        .collect()
}

/// Prim over the dense mutual-reachability graph. Returns `n - 1` edges.
fn mutual_reachability_mst(dist: &[Vec<f64>], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = dist.len();
    let reach = |i: usize, j: usize| dist[i][j].max(core[i]).max(core[j]);

    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n.saturating_sub(1));

    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        for j in 0..n {
            if !in_tree[j] {
                let d = reach(current, j);
                if d < best[j] {
                    best[j] = d;
                    from[j] = current;
                }
            }
        }
        let mut next = usize::MAX;
        let mut next_d = f64::INFINITY;
        for j in 0..n {
            if !in_tree[j] && (next == usize::MAX || best[j] < next_d) {
                next = j;
                next_d = best[j];
            }
        }
        in_tree[next] = true;
        edges.push((from[next], next, next_d));
        current = next;
    }
    edges
}

/// Union-find over 2n-1 nodes; merges in ascending edge weight.
fn single_linkage(n: usize, mut edges: Vec<(usize, usize, f64)>) -> Vec<Merge> {
    edges.sort_by(|a, b| a.2.total_cmp(&b.2));

    let total = 2 * n - 1;
    let mut parent: Vec<usize> = (0..total).collect();
    let mut size = vec![1usize; total];
    let mut next_label = n;

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    let mut merges = Vec::with_capacity(n - 1);
    for (a, b, d) in edges {
        let ra = find(&mut parent, a);
        let rb = find(&mut parent, b);
        let merged = size[ra] + size[rb];
        merges.push(Merge {
            left: ra,
            right: rb,
            distance: d,
            size: merged,
        });
        parent[ra] = next_label;
        parent[rb] = next_label;
        size[next_label] = merged;
        next_label += 1;
    }
    merges
}

fn lambda_of(distance: f64) -> f64 {
    if distance > 0.0 {
        (1.0 / distance).min(MAX_LAMBDA)
    } else {
        MAX_LAMBDA
    }
}

/// Points under `node` in the single-linkage tree.
fn leaves(n: usize, tree: &[Merge], node: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(x) = stack.pop() {
        if x < n {
            out.push(x);
        } else {
            let m = tree[x - n];
            stack.push(m.right);
            stack.push(m.left);
        }
    }
    out
}

fn node_size(n: usize, tree: &[Merge], node: usize) -> usize {
    if node < n {
        1
    } else {
        tree[node - n].size
    }
}

fn condense(n: usize, tree: &[Merge], mcs: usize) -> Vec<CondensedRow> {
    let root = 2 * n - 2;
    let mut relabel: HashMap<usize, usize> = HashMap::new();
    relabel.insert(root, n);
    let mut next_label = n + 1;
    let mut rows = Vec::new();

    // Top-down walk; only nodes that still carry a cluster label are expanded.
    let mut queue = std::collections::VecDeque::from([root]);
    while let Some(node) = queue.pop_front() {
        if node < n {
            continue;
        }
        let Some(&label) = relabel.get(&node) else {
            continue;
        };
        let m = tree[node - n];
        let lambda = lambda_of(m.distance);
        let left_size = node_size(n, tree, m.left);
        let right_size = node_size(n, tree, m.right);

        match (left_size >= mcs, right_size >= mcs) {
            (true, true) => {
                for (child, size) in [(m.left, left_size), (m.right, right_size)] {
                    relabel.insert(child, next_label);
                    rows.push(CondensedRow {
                        parent: label,
                        child: next_label,
                        lambda,
                        size,
                    });
                    next_label += 1;
                    queue.push_back(child);
                }
            }
            (false, false) => {
                for side in [m.left, m.right] {
                    for p in leaves(n, tree, side) {
                        rows.push(CondensedRow {
                            parent: label,
                            child: p,
                            lambda,
                            size: 1,
                        });
                    }
                }
            }
            (true, false) | (false, true) => {
                let (big, small) = if left_size >= mcs {
                    (m.left, m.right)
                } else {
                    (m.right, m.left)
                };
                relabel.insert(big, label);
                queue.push_back(big);
                for p in leaves(n, tree, small) {
                    rows.push(CondensedRow {
                        parent: label,
                        child: p,
                        lambda,
                        size: 1,
                    });
                }
            }
        }
    }
    rows
}

/// Excess-of-mass selection. Returns selected cluster labels, ascending.
fn select_clusters(n: usize, rows: &[CondensedRow]) -> Vec<usize> {
    let root = n;
    let mut birth: HashMap<usize, f64> = HashMap::from([(root, 0.0)]);
    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    for r in rows.iter().filter(|r| r.child >= n) {
        birth.insert(r.child, r.lambda);
        children.entry(r.parent).or_default().push(r.child);
    }

    let mut stability: HashMap<usize, f64> = birth.keys().map(|&c| (c, 0.0)).collect();
    for r in rows {
        let b = birth.get(&r.parent).copied().unwrap_or(0.0);
        if let Some(s) = stability.get_mut(&r.parent) {
            *s += (r.lambda - b) * r.size as f64;
        }
    }

    let mut labels: Vec<usize> = stability.keys().copied().filter(|&c| c != root).collect();
    labels.sort_unstable_by(|a, b| b.cmp(a));

    let mut is_selected: HashMap<usize, bool> = labels.iter().map(|&c| (c, true)).collect();
    for &c in &labels {
        let subtree: f64 = children
            .get(&c)
            .map(|kids| kids.iter().map(|k| stability[k]).sum::<f64>())
            .unwrap_or(0.0);
        if subtree > stability[&c] {
            is_selected.insert(c, false);
            stability.insert(c, subtree);
        } else {
            let mut stack: Vec<usize> = children.get(&c).cloned().unwrap_or_default();
            while let Some(d) = stack.pop() {
                is_selected.insert(d, false);
                if let Some(kids) = children.get(&d) {
                    stack.extend(kids);
                }
            }
        }
    }

    let mut selected: Vec<usize> = is_selected
        .into_iter()
        .filter_map(|(c, keep)| keep.then_some(c))
        .collect();
    selected.sort_unstable();
    selected
}

/// Each point takes the selected cluster on its path to the root, if any.
fn assign_labels(n: usize, rows: &[CondensedRow], selected: &[usize]) -> Vec<Option<usize>> {
    let parent_of: HashMap<usize, usize> = rows.iter().map(|r| (r.child, r.parent)).collect();
    let index_of: HashMap<usize, usize> =
        selected.iter().enumerate().map(|(i, &c)| (c, i)).collect();

    (0..n)
        .map(|p| {
            let mut node = parent_of.get(&p).copied();
            while let Some(c) = node {
                if let Some(&idx) = index_of.get(&c) {
                    return Some(idx);
                }
                node = parent_of.get(&c).copied();
            }
            None
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(x0: f32, y: f32, count: usize) -> Vec<Vec<f32>> {
        (0..count).map(|i| vec![x0 + i as f32, y]).collect()
    }

    #[test]
    fn finds_two_dense_groups() {
        let mut pts = line(0.0, 0.0, 10);
        pts.extend(line(100.0, 100.0, 10));
        let labels = Hdbscan::default().fit(&pts).unwrap();

        assert!(labels.iter().all(Option::is_some));
        let a = labels[0];
        let b = labels[10];
        assert_ne!(a, b);
        assert!(labels[..10].iter().all(|l| *l == a));
        assert!(labels[10..].iter().all(|l| *l == b));
    }

    #[test]
    fn isolated_point_is_noise() {
        let mut pts = line(0.0, 0.0, 10);
        pts.extend(line(100.0, 100.0, 10));
        pts.push(vec![5000.0, -5000.0]);
        let labels = Hdbscan::default().fit(&pts).unwrap();

        assert_eq!(labels[20], None);
        assert!(labels[..20].iter().all(Option::is_some));
    }

    #[test]
    fn small_single_group_is_all_noise() {
        // no split leaves two sides of min_cluster_size, and the root is never selected
        let labels = Hdbscan::default().fit(&line(0.0, 0.0, 5)).unwrap();
        assert!(labels.iter().all(Option::is_none));
    }

    #[test]
    fn too_few_points() {
        let err = Hdbscan::default().fit(&[vec![0.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, ClusterError::TooFewPoints { count: 2, required: 3 }));
    }

    #[test]
    fn core_distance_counts_self() {
        let pts = vec![vec![0.0f32], vec![1.0], vec![3.0]];
        let core = core_distances(&pairwise_distances(&pts), 2);
        assert_eq!(core, vec![1.0, 1.0, 2.0]);
    }
}
