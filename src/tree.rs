// src/tree.rs

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ArchetypeError, Result};
use crate::estimator::{check_fit_input, check_predict_input, Regressor};

/// Growth limits for a CART regression tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum depth; `None` grows until the other limits stop it.
    pub max_depth: Option<usize>,
    /// A node with fewer samples than this becomes a leaf.
    pub min_samples_split: usize,
    /// Each child of a split keeps at least this many samples.
    pub min_samples_leaf: usize,
    /// Features drawn (without replacement) as split candidates at each node;
    /// `None` considers all of them.
    pub max_features: Option<usize>,
    /// Seed for the per-node feature draw.
    pub random_seed: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_seed: 0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Regression tree grown by minimizing squared error.
///
/// Importances are the total weighted impurity decrease contributed by each
/// feature, normalized to sum to one (all zeros for a single-leaf tree).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegressionTree {
    config: TreeConfig,
    nodes: Vec<TreeNode>,
    n_features: Option<usize>,
    importances: Option<Array1<f64>>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    decrease: f64,
}

// Mutable state threaded through the recursive growth.
struct TreeBuilder<'x, 'y, 'r> {
    x: ArrayView2<'x, f64>,
    y: ArrayView1<'y, f64>,
    config: &'r TreeConfig,
    rng: &'r mut ChaCha8Rng,
    nodes: Vec<TreeNode>,
    impurity_decrease: Vec<f64>,
}

// Two-pass mean and squared error; stays exact for constant targets of any magnitude.
fn mean_and_sse(y: ArrayView1<f64>, rows: &[usize]) -> (f64, f64) {
    let mean = rows.iter().map(|&i| y[i]).sum::<f64>() / rows.len() as f64;
    let sse = rows.iter().map(|&i| (y[i] - mean).powi(2)).sum();
    (mean, sse)
}

// Relative gain below which a split is treated as rounding noise.
const MIN_RELATIVE_DECREASE: f64 = 1e-10;

impl<'x, 'y, 'r> TreeBuilder<'x, 'y, 'r> {
    fn candidate_features(&mut self) -> Vec<usize> {
        let n_features = self.x.ncols();
        match self.config.max_features {
            Some(m) if m < n_features => {
                let mut picked = rand::seq::index::sample(&mut *self.rng, n_features, m.max(1)).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..n_features).collect(),
        }
    }

    fn best_split(&mut self, rows: &[usize], node_mean: f64, parent_sse: f64) -> Option<SplitCandidate> {
        let n = rows.len();
        let min_leaf = self.config.min_samples_leaf.max(1);
        let mut best: Option<SplitCandidate> = None;

        for feature in self.candidate_features() {
            // Targets are centered on the node mean before the running sums.
            let mut pairs: Vec<(f64, f64)> = rows
                .iter()
                .map(|&i| (self.x[[i, feature]], self.y[i] - node_mean))
                .collect();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let total_sum: f64 = pairs.iter().map(|p| p.1).sum();
            let total_sq: f64 = pairs.iter().map(|p| p.1 * p.1).sum();
            let mut left_sum = 0.0;
            let mut left_sq = 0.0;

            for split_at in 1..n {
                let (value, target) = pairs[split_at - 1];
                left_sum += target;
                left_sq += target * target;

                if split_at < min_leaf || n - split_at < min_leaf {
                    continue;
                }
                let next_value = pairs[split_at].0;
                if next_value <= value {
                    continue;
                }

                let n_left = split_at as f64;
                let n_right = (n - split_at) as f64;
                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let left_sse = (left_sq - left_sum * left_sum / n_left).max(0.0);
                let right_sse = (right_sq - right_sum * right_sum / n_right).max(0.0);
                let decrease = parent_sse - left_sse - right_sse;

                let improves = best.as_ref().map_or(true, |b| decrease > b.decrease);
                if decrease > MIN_RELATIVE_DECREASE * parent_sse && improves {
                    // Adjacent floats can have a midpoint that rounds up to `next_value`.
                    let mut threshold = 0.5 * (value + next_value);
                    if threshold >= next_value {
                        threshold = value;
                    }
                    best = Some(SplitCandidate { feature, threshold, decrease });
                }
            }
        }
        best
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let (leaf_value, sse) = mean_and_sse(self.y, &rows);
        let node_idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { value: leaf_value });

        let depth_reached = self.config.max_depth.map_or(false, |d| depth >= d);
        let first = self.y[rows[0]];
        let constant = rows.iter().all(|&i| self.y[i] == first);
        if depth_reached || rows.len() < self.config.min_samples_split.max(2) || constant || sse <= 0.0 {
            return node_idx;
        }

        let Some(split) = self.best_split(&rows, leaf_value, sse) else {
            return node_idx;
        };
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .copied()
            .partition(|&i| self.x[[i, split.feature]] <= split.threshold);
        if left_rows.is_empty() || right_rows.is_empty() {
            return node_idx;
        }

        self.impurity_decrease[split.feature] += split.decrease;
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[node_idx] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_idx
    }
}

impl RegressionTree {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            n_features: None,
            importances: None,
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Number of nodes of the fitted tree (0 before fit).
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Grows the tree on the given rows of `x`; repeated rows count repeatedly.
    pub(crate) fn fit_rows(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        rows: Vec<usize>,
        rng: &mut ChaCha8Rng,
    ) -> Result<()> {
        if rows.is_empty() {
            return Err(ArchetypeError::Estimator("RegressionTree: cannot grow a tree on zero rows.".into()));
        }
        let mut builder = TreeBuilder {
            x,
            y,
            config: &self.config,
            rng,
            nodes: Vec::new(),
            impurity_decrease: vec![0.0; x.ncols()],
        };
        builder.grow(rows, 0);

        let total: f64 = builder.impurity_decrease.iter().sum();
        let mut importances = Array1::from(builder.impurity_decrease);
        if total > 0.0 {
            importances /= total;
        }
        self.nodes = builder.nodes;
        self.importances = Some(importances);
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split { feature, threshold, left, right } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

impl Default for RegressionTree {
    fn default() -> Self {
        Self::new(TreeConfig::default())
    }
}

impl Regressor for RegressionTree {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_fit_input(x, y, self.name())?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.random_seed);
        self.fit_rows(x, y, (0..x.nrows()).collect(), &mut rng)
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        check_predict_input(x, self.n_features, self.name())?;
        Ok(x.outer_iter().map(|row| self.predict_row(row)).collect())
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.importances.clone()
    }

    fn name(&self) -> &str {
        "RegressionTree"
    }
}
