// src/bootstrap.rs

use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{ArchetypeError, Result};
use crate::estimator::Regressor;
use crate::matrix::FeatureMatrix;

/// Parameters of the bootstrap harness.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Number of independent resample/split/cross-validate cycles.
    pub iterations: usize,
    /// Cross-validation folds per iteration, at least 2.
    pub folds: usize,
    /// When set, each iteration draws this many feature columns at random
    /// (without replacement) and fits on those only.
    pub feature_subsample: Option<usize>,
    /// Share of rows held out as the outer test split.
    pub test_fraction: f64,
    /// Master seed. `None` draws one from the thread RNG; the seed actually
    /// used is kept on the returned [`FitSession`].
    pub random_seed: Option<u64>,
    /// Run iterations on the rayon pool.
    pub parallel: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        BootstrapConfig {
            iterations: 10,
            folds: 3,
            feature_subsample: None,
            test_fraction: 0.2,
            random_seed: None,
            parallel: true,
        }
    }
}

/// One cross-validation fold of one iteration.
#[derive(Clone, Debug)]
pub struct FoldRecord<E> {
    /// The estimator as fitted on the other folds.
    pub estimator: E,
    /// Score on the held-out cross-validation fold.
    pub validation_score: f64,
    /// Score on the iteration's outer test split.
    pub test_score: f64,
    /// Predictions for the outer test split.
    pub y_predict: Array1<f64>,
    /// Importances, positionally aligned with the iteration's `feature_indices`.
    pub feature_importances: Option<Array1<f64>>,
}

/// Everything drawn and fitted during one bootstrap iteration.
#[derive(Clone, Debug)]
pub struct IterationRecord<E> {
    /// Columns of the input matrix used in this iteration, ascending.
    pub feature_indices: Vec<usize>,
    pub feature_names: Vec<String>,
    pub train_rows: Vec<usize>,
    pub test_rows: Vec<usize>,
    pub y_test: Array1<f64>,
    pub folds: Vec<FoldRecord<E>>,
}

/// Mean and population standard deviation of the flattened score population.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub mean: f64,
    pub std: f64,
    pub samples: usize,
}

/// Aggregated importance of one feature across every fold it took part in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub name: String,
    pub mean: f64,
    /// Sample standard deviation (n - 1); NaN with fewer than two samples.
    pub std: f64,
    /// `std / mean`.
    pub ratio: f64,
    pub samples: usize,
}

/// Result of [`bootstrap_fit`]. Immutable once returned.
#[derive(Clone, Debug)]
pub struct FitSession<E> {
    config: BootstrapConfig,
    random_seed: u64,
    feature_names: Vec<String>,
    iterations: Vec<IterationRecord<E>>,
    score: ScoreSummary,
    feature_importance: Option<Vec<FeatureImportance>>,
}

impl<E> FitSession<E> {
    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Master seed the session was drawn from; rerunning with it reproduces the session.
    pub fn random_seed(&self) -> u64 {
        self.random_seed
    }

    /// Feature names of the full input matrix.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn iterations(&self) -> &[IterationRecord<E>] {
        &self.iterations
    }

    /// Outer-test-split scores, iterations × folds.
    pub fn scores(&self) -> Array2<f64> {
        self.fold_matrix(|fold| fold.test_score)
    }

    /// Held-out cross-validation fold scores, iterations × folds.
    pub fn validation_scores(&self) -> Array2<f64> {
        self.fold_matrix(|fold| fold.validation_score)
    }

    /// Every outer-test-split score, iteration-major.
    pub fn flat_scores(&self) -> Vec<f64> {
        self.iterations
            .iter()
            .flat_map(|it| it.folds.iter().map(|f| f.test_score))
            .collect()
    }

    pub fn score(&self) -> &ScoreSummary {
        &self.score
    }

    /// Per-feature importance statistics sorted by descending mean, or `None`
    /// when the estimator reports no importances.
    pub fn feature_importance(&self) -> Option<&[FeatureImportance]> {
        self.feature_importance.as_deref()
    }

    pub fn y_test(&self, iteration: usize) -> Option<&Array1<f64>> {
        self.iterations.get(iteration).map(|it| &it.y_test)
    }

    /// Test-split predictions of each fold's estimator for `iteration`.
    pub fn y_predict(&self, iteration: usize) -> Option<Vec<&Array1<f64>>> {
        self.iterations
            .get(iteration)
            .map(|it| it.folds.iter().map(|f| &f.y_predict).collect())
    }

    fn fold_matrix<F: Fn(&FoldRecord<E>) -> f64>(&self, value: F) -> Array2<f64> {
        let folds = self.config.folds;
        Array2::from_shape_fn((self.iterations.len(), folds), |(i, j)| value(&self.iterations[i].folds[j]))
    }
}

fn validate(x: &FeatureMatrix, y: ArrayView1<f64>, config: &BootstrapConfig) -> Result<(usize, usize)> {
    let n_rows = x.nrows();
    if y.len() != n_rows {
        return Err(ArchetypeError::InputShape(format!(
            "Target has {} entries but the feature matrix has {} rows.",
            y.len(),
            n_rows
        )));
    }
    if x.ncols() == 0 {
        return Err(ArchetypeError::InputShape("Feature matrix has no columns.".into()));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(ArchetypeError::InputShape("Target contains non-finite values.".into()));
    }
    if config.iterations == 0 {
        return Err(ArchetypeError::Configuration("Iteration count must be at least 1.".into()));
    }
    if config.folds < 2 {
        return Err(ArchetypeError::Configuration(format!(
            "Cross-validation needs at least 2 folds, got {}.",
            config.folds
        )));
    }
    if let Some(k) = config.feature_subsample {
        if k == 0 || k > x.ncols() {
            return Err(ArchetypeError::Configuration(format!(
                "Feature subsample size {} must lie in 1..={}.",
                k,
                x.ncols()
            )));
        }
    }
    if !(config.test_fraction > 0.0 && config.test_fraction < 1.0) {
        return Err(ArchetypeError::Configuration(format!(
            "Test fraction must lie strictly between 0 and 1, got {}.",
            config.test_fraction
        )));
    }
    let n_test = (config.test_fraction * n_rows as f64).ceil() as usize;
    let n_train = n_rows.saturating_sub(n_test);
    if n_test == 0 || n_train < config.folds {
        return Err(ArchetypeError::Configuration(format!(
            "{} rows split {}/{} cannot supply {} cross-validation folds and a test split.",
            n_rows, n_train, n_test, config.folds
        )));
    }
    Ok((n_train, n_test))
}

/// Contiguous k-fold boundaries; the first `n % k` folds hold one extra row.
fn fold_bounds(n: usize, k: usize) -> Vec<(usize, usize)> {
    let base = n / k;
    let extra = n % k;
    let mut start = 0;
    (0..k)
        .map(|f| {
            let len = base + usize::from(f < extra);
            let bounds = (start, start + len);
            start += len;
            bounds
        })
        .collect()
}

fn fold_error(iteration: usize, fold: usize, stage: &str, err: ArchetypeError) -> ArchetypeError {
    ArchetypeError::Estimator(format!("iteration {}, fold {}: {} failed: {}", iteration, fold, stage, err))
}

fn run_iteration<E: Regressor>(
    x: &FeatureMatrix,
    y: ArrayView1<f64>,
    estimator: &E,
    config: &BootstrapConfig,
    master_seed: u64,
    n_test: usize,
    iteration: usize,
) -> Result<IterationRecord<E>> {
    let mut rng = ChaCha8Rng::seed_from_u64(master_seed);
    rng.set_stream(iteration as u64);

    let feature_indices: Vec<usize> = match config.feature_subsample {
        Some(k) => {
            let mut picked = rand::seq::index::sample(&mut rng, x.ncols(), k).into_vec();
            picked.sort_unstable();
            picked
        }
        None => (0..x.ncols()).collect(),
    };
    let feature_names = feature_indices.iter().map(|&j| x.column_names()[j].clone()).collect();
    let x_sub = x.values().select(Axis(1), &feature_indices);

    let mut permutation: Vec<usize> = (0..x.nrows()).collect();
    permutation.shuffle(&mut rng);
    let test_rows = permutation[..n_test].to_vec();
    let train_rows = permutation[n_test..].to_vec();

    let x_train = x_sub.select(Axis(0), &train_rows);
    let y_train = y.select(Axis(0), &train_rows);
    let x_test = x_sub.select(Axis(0), &test_rows);
    let y_test = y.select(Axis(0), &test_rows);

    let mut folds = Vec::with_capacity(config.folds);
    for (fold, (start, end)) in fold_bounds(train_rows.len(), config.folds).into_iter().enumerate() {
        let held: Vec<usize> = (start..end).collect();
        let fit_on: Vec<usize> = (0..train_rows.len()).filter(|p| *p < start || *p >= end).collect();

        let mut fitted = estimator.clone();
        fitted
            .fit(x_train.select(Axis(0), &fit_on).view(), y_train.select(Axis(0), &fit_on).view())
            .map_err(|e| fold_error(iteration, fold, "fit", e))?;

        let validation_score = fitted
            .score(x_train.select(Axis(0), &held).view(), y_train.select(Axis(0), &held).view())
            .map_err(|e| fold_error(iteration, fold, "validation score", e))?;
        let y_predict = fitted
            .predict(x_test.view())
            .map_err(|e| fold_error(iteration, fold, "predict", e))?;
        let test_score = fitted
            .score(x_test.view(), y_test.view())
            .map_err(|e| fold_error(iteration, fold, "score", e))?;
        if !test_score.is_finite() {
            return Err(ArchetypeError::Estimator(format!(
                "iteration {}, fold {}: {} returned a non-finite score.",
                iteration,
                fold,
                fitted.name()
            )));
        }

        let feature_importances = fitted.feature_importances();
        if let Some(imp) = feature_importances.as_ref() {
            if imp.len() != feature_indices.len() {
                return Err(ArchetypeError::Estimator(format!(
                    "iteration {}, fold {}: {} reported {} importances for {} features.",
                    iteration,
                    fold,
                    fitted.name(),
                    imp.len(),
                    feature_indices.len()
                )));
            }
        }

        folds.push(FoldRecord {
            estimator: fitted,
            validation_score,
            test_score,
            y_predict,
            feature_importances,
        });
    }

    debug!(
        "Bootstrap iteration {}: {} features, {} train / {} test rows, mean test score {:.4}",
        iteration,
        feature_indices.len(),
        train_rows.len(),
        test_rows.len(),
        folds.iter().map(|f| f.test_score).sum::<f64>() / folds.len() as f64
    );

    Ok(IterationRecord {
        feature_indices,
        feature_names,
        train_rows,
        test_rows,
        y_test,
        folds,
    })
}

fn summarize_scores(scores: &[f64]) -> ScoreSummary {
    let population = Array1::from(scores.to_vec());
    ScoreSummary {
        mean: population.mean().unwrap_or(f64::NAN),
        std: population.std(0.0),
        samples: scores.len(),
    }
}

// Descending by mean, NaN means last.
fn by_descending_mean(a: &FeatureImportance, b: &FeatureImportance) -> Ordering {
    match (a.mean.is_nan(), b.mean.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.mean.total_cmp(&a.mean),
    }
}

/// Aggregates importances by feature identity: each fold's vector is mapped
/// back through its iteration's `feature_indices`, so subsampled runs credit
/// the right columns.
fn summarize_importances<E>(
    iterations: &[IterationRecord<E>],
    feature_names: &[String],
) -> Result<Option<Vec<FeatureImportance>>> {
    let total_folds: usize = iterations.iter().map(|it| it.folds.len()).sum();
    let reporting_folds = iterations
        .iter()
        .flat_map(|it| it.folds.iter())
        .filter(|f| f.feature_importances.is_some())
        .count();

    if reporting_folds == 0 {
        info!("Estimator reports no feature importances; importance summary omitted.");
        return Ok(None);
    }
    if reporting_folds != total_folds {
        return Err(ArchetypeError::Estimator(format!(
            "Only {} of {} fitted folds reported feature importances.",
            reporting_folds, total_folds
        )));
    }

    let mut samples: Vec<Vec<f64>> = vec![Vec::new(); feature_names.len()];
    for it in iterations {
        for imp in it.folds.iter().filter_map(|f| f.feature_importances.as_ref()) {
            for (pos, &j) in it.feature_indices.iter().enumerate() {
                samples[j].push(imp[pos]);
            }
        }
    }

    let mut summary: Vec<FeatureImportance> = samples
        .into_iter()
        .zip(feature_names.iter())
        .filter(|(s, _)| !s.is_empty())
        .map(|(s, name)| {
            let population = Array1::from(s);
            let mean = population.mean().unwrap_or(f64::NAN);
            let std = if population.len() > 1 { population.std(1.0) } else { f64::NAN };
            FeatureImportance {
                name: name.clone(),
                mean,
                std,
                ratio: std / mean,
                samples: population.len(),
            }
        })
        .collect();
    if summary.len() < feature_names.len() {
        debug!(
            "{} features were never drawn by the subsampler and have no importance samples.",
            feature_names.len() - summary.len()
        );
    }
    summary.sort_by(by_descending_mean);
    Ok(Some(summary))
}

/// Repeats random split + k-fold cross-validation of `estimator` and
/// aggregates test scores and feature importances.
///
/// Each of `config.iterations` iterations draws, from its own random stream:
/// an optional feature subset, then a shuffled `1 - test_fraction` /
/// `test_fraction` row split. The training rows are cut into `config.folds`
/// contiguous folds; for each fold a fresh clone of `estimator` is fitted on
/// the remaining folds and then scored on the iteration's outer test split.
/// That yields `iterations * folds` scores and, when the estimator reports
/// them, as many importance vectors.
///
/// # Errors
/// * [`ArchetypeError::InputShape`] if `y` does not match the matrix rows or holds non-finite values.
/// * [`ArchetypeError::Configuration`] for zero iterations, fewer than two
///   folds, an out-of-range subsample size or test fraction, or too few rows.
/// * [`ArchetypeError::Estimator`] if any fold fails to fit, predict or score.
///   The whole call aborts; no partial aggregate is returned.
pub fn bootstrap_fit<E: Regressor>(
    x: &FeatureMatrix,
    y: ArrayView1<f64>,
    estimator: &E,
    config: &BootstrapConfig,
) -> Result<FitSession<E>> {
    let (n_train, n_test) = validate(x, y, config)?;
    let master_seed = config.random_seed.unwrap_or_else(|| rand::thread_rng().gen());

    info!(
        "Starting bootstrap fit of {}: {} rows x {} features, {} iterations x {} folds, subsample {:?}, {} train / {} test rows, seed {}",
        estimator.name(),
        x.nrows(),
        x.ncols(),
        config.iterations,
        config.folds,
        config.feature_subsample,
        n_train,
        n_test,
        master_seed
    );
    let start_time = std::time::Instant::now();

    let run = |i: usize| run_iteration(x, y, estimator, config, master_seed, n_test, i);
    let iterations: Vec<IterationRecord<E>> = if config.parallel {
        (0..config.iterations).into_par_iter().map(run).collect::<Result<_>>()?
    } else {
        (0..config.iterations).map(run).collect::<Result<_>>()?
    };

    let score = summarize_scores(&iterations.iter().flat_map(|it| it.folds.iter().map(|f| f.test_score)).collect::<Vec<_>>());
    let feature_importance = summarize_importances(&iterations, x.column_names())?;

    info!(
        "Bootstrap fit finished in {:?}: score {:.4} +/- {:.4} over {} folds.",
        start_time.elapsed(),
        score.mean,
        score.std,
        score.samples
    );

    Ok(FitSession {
        config: config.clone(),
        random_seed: master_seed,
        feature_names: x.column_names().to_vec(),
        iterations,
        score,
        feature_importance,
    })
}
