//! Exact greedy regression tree growth.
//!
//! Every node scans all candidate thresholds of every feature (sorted
//! values, midpoints between distinct neighbours) and keeps the split with
//! the largest reduction in squared error. Rows are kept in one index
//! buffer that is stably partitioned in place, so each node owns a
//! contiguous range of it.
//!
//! The seed only shuffles the order in which features are examined at each
//! node. A later feature replaces the current best only on strict
//! improvement, so the seed decides ties and nothing else.

use ndarray::{ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::params::TreeParams;
use crate::repr::{MutableTree, NodeId, Tree};

#[derive(Debug, Clone, Copy)]
struct NodeTask {
    node: NodeId,
    start: usize,
    end: usize,
    depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Grows one tree over a fixed training matrix.
pub struct TreeGrower<'a> {
    params: TreeParams,
    /// `[n_samples, n_features]`
    features: ArrayView2<'a, f64>,
    targets: ArrayView1<'a, f64>,
}

impl<'a> TreeGrower<'a> {
    pub fn new(
        params: TreeParams,
        features: ArrayView2<'a, f64>,
        targets: ArrayView1<'a, f64>,
    ) -> Self {
        debug_assert_eq!(features.nrows(), targets.len());
        Self {
            params,
            features,
            targets,
        }
    }

    /// Grow a tree. Identical inputs and seed give an identical tree.
    pub fn grow(&self, seed: u64) -> Tree {
        let n_samples = self.features.nrows();
        let n_features = self.features.ncols();

        let mut rng = StdRng::seed_from_u64(seed);
        let mut feature_order: Vec<usize> = (0..n_features).collect();
        let mut rows: Vec<u32> = (0..n_samples as u32).collect();
        let mut partition_scratch: Vec<u32> = Vec::with_capacity(n_samples);
        let mut sorted: Vec<(f64, f64)> = Vec::with_capacity(n_samples);

        let mut tree = MutableTree::with_capacity(64);
        let root = tree.init_root();
        let mut stack = vec![NodeTask {
            node: root,
            start: 0,
            end: n_samples,
            depth: 0,
        }];

        while let Some(task) = stack.pop() {
            let node_rows = &rows[task.start..task.end];
            let sum: f64 = node_rows.iter().map(|&r| self.targets[r as usize]).sum();
            let mean = if node_rows.is_empty() {
                0.0
            } else {
                sum / node_rows.len() as f64
            };

            if !self.is_splittable(&task, node_rows) {
                tree.make_leaf(task.node, mean);
                continue;
            }

            feature_order.shuffle(&mut rng);
            let Some(split) = self.find_best_split(node_rows, sum, &feature_order, &mut sorted)
            else {
                tree.make_leaf(task.node, mean);
                continue;
            };

            let n_left = partition_rows(
                &mut rows[task.start..task.end],
                &mut partition_scratch,
                |r| self.features[[r as usize, split.feature]] < split.threshold,
            );
            let (left, right) =
                tree.apply_numeric_split(task.node, split.feature as u32, split.threshold);
            let mid = task.start + n_left;

            stack.push(NodeTask {
                node: right,
                start: mid,
                end: task.end,
                depth: task.depth + 1,
            });
            stack.push(NodeTask {
                node: left,
                start: task.start,
                end: mid,
                depth: task.depth + 1,
            });
        }

        tree.freeze()
    }

    fn is_splittable(&self, task: &NodeTask, rows: &[u32]) -> bool {
        if task.depth >= self.params.max_depth || rows.len() < self.params.min_splittable() {
            return false;
        }
        let first = self.targets[rows[0] as usize];
        rows.iter().any(|&r| self.targets[r as usize] != first)
    }

    fn find_best_split(
        &self,
        rows: &[u32],
        total_sum: f64,
        feature_order: &[usize],
        sorted: &mut Vec<(f64, f64)>,
    ) -> Option<SplitCandidate> {
        let n = rows.len();
        let min_leaf = self.params.min_samples_leaf as usize;
        let parent_score = total_sum * total_sum / n as f64;
        let mut best: Option<SplitCandidate> = None;

        for &feature in feature_order {
            sorted.clear();
            sorted.extend(
                rows.iter()
                    .map(|&r| (self.features[[r as usize, feature]], self.targets[r as usize])),
            );
            // Stable: equal values keep row order.
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
            if sorted[0].0 == sorted[n - 1].0 {
                continue;
            }

            let mut left_sum = 0.0f64;
            for n_left in 1..n {
                left_sum += sorted[n_left - 1].1;
                let n_right = n - n_left;
                if n_right < min_leaf {
                    break;
                }
                if n_left < min_leaf {
                    continue;
                }
                let (lo, hi) = (sorted[n_left - 1].0, sorted[n_left].0);
                if lo >= hi {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let score = left_sum * left_sum / n_left as f64
                    + right_sum * right_sum / n_right as f64;
                let gain = score - parent_score;
                if best.is_none_or(|b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: split_threshold(lo, hi),
                        gain,
                    });
                }
            }
        }

        best.filter(|b| b.gain > 0.0)
    }
}

/// Threshold `t` with `lo < t <= hi`, the midpoint when representable.
#[inline]
fn split_threshold(lo: f64, hi: f64) -> f64 {
    let mid = (lo + hi) * 0.5;
    if mid > lo && mid.is_finite() { mid } else { hi }
}

/// Stable partition of `rows`: rows where `goes_left` holds first.
///
/// Returns the number of left rows.
fn partition_rows(rows: &mut [u32], scratch: &mut Vec<u32>, goes_left: impl Fn(u32) -> bool) -> usize {
    scratch.clear();
    let mut n_left = 0;
    for i in 0..rows.len() {
        let row = rows[i];
        if goes_left(row) {
            rows[n_left] = row;
            n_left += 1;
        } else {
            scratch.push(row);
        }
    }
    rows[n_left..].copy_from_slice(scratch);
    n_left
}
