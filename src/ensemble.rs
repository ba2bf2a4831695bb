// src/ensemble.rs

use log::debug;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ArchetypeError, Result};
use crate::estimator::{check_fit_input, check_predict_input, Regressor};
use crate::tree::{RegressionTree, TreeConfig};

// Mean importance over trees, renormalized to sum to one.
fn average_importances(trees: &[RegressionTree], n_features: usize) -> Array1<f64> {
    let mut total = Array1::<f64>::zeros(n_features);
    for imp in trees.iter().filter_map(|t| t.feature_importances()) {
        total += &imp;
    }
    let sum = total.sum();
    if sum > 0.0 {
        total /= sum;
    }
    total
}

/// Parameters of [`RandomForestRegressor`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    /// Settings shared by every tree; its seed is replaced per tree.
    pub tree: TreeConfig,
    /// Grow each tree on a with-replacement resample of the rows.
    pub bootstrap: bool,
    pub random_seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        ForestConfig {
            n_trees: 100,
            tree: TreeConfig::default(),
            bootstrap: true,
            random_seed: 0,
        }
    }
}

/// Bagged regression trees; prediction is the mean over trees.
///
/// Trees are grown in parallel. Tree `t` draws from stream `t` of a ChaCha8
/// generator seeded with `random_seed`, so the fitted forest does not depend on
/// thread scheduling.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    config: ForestConfig,
    trees: Vec<RegressionTree>,
    n_features: Option<usize>,
    importances: Option<Array1<f64>>,
}

impl RandomForestRegressor {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_features: None,
            importances: None,
        }
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self::new(ForestConfig::default())
    }
}

impl Regressor for RandomForestRegressor {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_fit_input(x, y, self.name())?;
        if self.config.n_trees == 0 {
            return Err(ArchetypeError::Estimator("RandomForestRegressor: n_trees must be greater than 0.".into()));
        }
        let n_rows = x.nrows();
        let config = &self.config;

        let trees: Result<Vec<RegressionTree>> = (0..config.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(config.random_seed);
                rng.set_stream(t as u64);
                let rows: Vec<usize> = if config.bootstrap {
                    (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect()
                } else {
                    (0..n_rows).collect()
                };
                let mut tree = RegressionTree::new(TreeConfig {
                    random_seed: rng.gen(),
                    ..config.tree.clone()
                });
                tree.fit_rows(x, y, rows, &mut rng)?;
                Ok(tree)
            })
            .collect();
        let trees = trees?;

        debug!("RandomForestRegressor grew {} trees on {} rows.", trees.len(), n_rows);
        self.importances = Some(average_importances(&trees, x.ncols()));
        self.n_features = Some(x.ncols());
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        check_predict_input(x, self.n_features, self.name())?;
        let mut total = Array1::<f64>::zeros(x.nrows());
        for tree in &self.trees {
            total += &tree.predict(x)?;
        }
        Ok(total / self.trees.len() as f64)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.importances.clone()
    }

    fn name(&self) -> &str {
        "RandomForestRegressor"
    }
}

/// Parameters of [`GradientBoostingRegressor`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    /// Shrinkage applied to each stage's contribution.
    pub learning_rate: f64,
    /// Fraction of rows (without replacement) each stage is fitted on.
    pub subsample: f64,
    pub tree: TreeConfig,
    pub random_seed: u64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        BoostingConfig {
            n_estimators: 100,
            learning_rate: 0.1,
            subsample: 1.0,
            tree: TreeConfig { max_depth: Some(3), ..Default::default() },
            random_seed: 0,
        }
    }
}

/// Least-squares gradient boosting: starting from the target mean, each
/// stage fits a shallow tree to the current residuals.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    config: BoostingConfig,
    initial_prediction: f64,
    stages: Vec<RegressionTree>,
    n_features: Option<usize>,
    importances: Option<Array1<f64>>,
}

impl GradientBoostingRegressor {
    pub fn new(config: BoostingConfig) -> Self {
        Self {
            config,
            initial_prediction: 0.0,
            stages: Vec::new(),
            n_features: None,
            importances: None,
        }
    }
}

impl Default for GradientBoostingRegressor {
    fn default() -> Self {
        Self::new(BoostingConfig::default())
    }
}

impl Regressor for GradientBoostingRegressor {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_fit_input(x, y, self.name())?;
        let config = &self.config;
        if !(config.subsample > 0.0 && config.subsample <= 1.0) {
            return Err(ArchetypeError::Estimator(format!(
                "GradientBoostingRegressor: subsample must lie in (0, 1], got {}.",
                config.subsample
            )));
        }
        if !(config.learning_rate > 0.0) {
            return Err(ArchetypeError::Estimator(format!(
                "GradientBoostingRegressor: learning_rate must be positive, got {}.",
                config.learning_rate
            )));
        }

        let n_rows = x.nrows();
        let stage_rows = ((config.subsample * n_rows as f64).round() as usize).clamp(1, n_rows);
        let mut rng = ChaCha8Rng::seed_from_u64(config.random_seed);

        let initial_prediction = y.mean().unwrap_or(0.0);
        let mut current = Array1::from_elem(n_rows, initial_prediction);
        let mut stages = Vec::with_capacity(config.n_estimators);

        for _ in 0..config.n_estimators {
            let residuals = &y - &current;
            let rows: Vec<usize> = if stage_rows < n_rows {
                rand::seq::index::sample(&mut rng, n_rows, stage_rows).into_vec()
            } else {
                (0..n_rows).collect()
            };
            let mut tree = RegressionTree::new(TreeConfig {
                random_seed: rng.gen(),
                ..config.tree.clone()
            });
            tree.fit_rows(x, residuals.view(), rows, &mut rng)?;
            current.scaled_add(config.learning_rate, &tree.predict(x)?);
            stages.push(tree);
        }

        self.importances = Some(average_importances(&stages, x.ncols()));
        self.initial_prediction = initial_prediction;
        self.n_features = Some(x.ncols());
        self.stages = stages;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        check_predict_input(x, self.n_features, self.name())?;
        let mut out = Array1::from_elem(x.nrows(), self.initial_prediction);
        for tree in &self.stages {
            out.scaled_add(self.config.learning_rate, &tree.predict(x)?);
        }
        Ok(out)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.importances.clone()
    }

    fn name(&self) -> &str {
        "GradientBoostingRegressor"
    }
}
