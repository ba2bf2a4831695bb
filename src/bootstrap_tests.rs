use crate::bootstrap::{bootstrap_fit, BootstrapConfig, ScoreSummary};
use crate::error::{ArchetypeError, Result};
use crate::estimator::Regressor;
use crate::linear::LinearRegression;
use crate::matrix::FeatureMatrix;

use float_cmp::assert_approx_eq;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;

// Predicts the training mean and reports the column means of its training
// matrix as importances, so every importance can be traced to its column.
#[derive(Clone, Debug, Default)]
struct ColumnMeanModel {
    y_mean: Option<f64>,
    importances: Option<Array1<f64>>,
}

impl Regressor for ColumnMeanModel {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        self.y_mean = y.mean();
        self.importances = x.mean_axis(Axis(0));
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let mean = self
            .y_mean
            .ok_or_else(|| ArchetypeError::Estimator("ColumnMeanModel: not fitted.".into()))?;
        Ok(Array1::from_elem(x.nrows(), mean))
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.importances.clone()
    }

    fn name(&self) -> &str {
        "ColumnMeanModel"
    }
}

#[derive(Clone, Debug, Default)]
struct FailingModel;

impl Regressor for FailingModel {
    fn fit(&mut self, _x: ArrayView2<f64>, _y: ArrayView1<f64>) -> Result<()> {
        Err(ArchetypeError::Estimator("singular design".into()))
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(Array1::zeros(x.nrows()))
    }
}

// Reports importances only when trained on an even number of rows.
#[derive(Clone, Debug, Default)]
struct EvenRowsModel {
    importances: Option<Array1<f64>>,
}

impl Regressor for EvenRowsModel {
    fn fit(&mut self, x: ArrayView2<f64>, _y: ArrayView1<f64>) -> Result<()> {
        self.importances = (x.nrows() % 2 == 0).then(|| Array1::from_elem(x.ncols(), 1.0));
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(Array1::zeros(x.nrows()))
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.importances.clone()
    }
}

fn linear_data(n: usize, seed: u64) -> (FeatureMatrix, Array1<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x = Array2::random_using((n, 3), Uniform::new(-1.0, 1.0), &mut rng);
    let y = x.column(0).mapv(|v| 3.0 * v) - x.column(1).mapv(|v| 2.0 * v) + 0.5 * &x.column(2) + 1.0;
    let names = vec!["Writing".into(), "Programming".into(), "Repairing".into()];
    let ids = (0..n).map(|i| format!("occ-{}", i)).collect();
    (FeatureMatrix::new(x, ids, names).unwrap(), y)
}

// Column `j` holds the constant `j + 1`.
fn indexed_columns(n: usize, n_features: usize) -> (FeatureMatrix, Array1<f64>) {
    let x = Array2::from_shape_fn((n, n_features), |(_, j)| (j + 1) as f64);
    let y = Array1::from_shape_fn(n, |i| (i % 7) as f64);
    (FeatureMatrix::from_unlabeled(x).unwrap(), y)
}

fn seeded(iterations: usize, folds: usize, seed: u64) -> BootstrapConfig {
    BootstrapConfig { iterations, folds, random_seed: Some(seed), ..Default::default() }
}

#[test]
fn produces_one_score_per_iteration_and_fold() {
    let (x, y) = indexed_columns(50, 4);
    let session = bootstrap_fit(&x, y.view(), &ColumnMeanModel::default(), &seeded(5, 4, 1)).unwrap();

    assert_eq!(session.scores().dim(), (5, 4));
    assert_eq!(session.validation_scores().dim(), (5, 4));
    assert_eq!(session.flat_scores().len(), 20);
    assert_eq!(session.score().samples, 20);

    let importance = session.feature_importance().unwrap();
    assert_eq!(importance.len(), 4);
    assert!(importance.iter().all(|f| f.samples == 20));
}

#[test]
fn exact_linear_target_scores_near_one() {
    let (x, y) = linear_data(60, 3);
    let session = bootstrap_fit(&x, y.view(), &LinearRegression::new(), &seeded(4, 3, 9)).unwrap();
    assert!(session.score().mean > 0.999);
    assert!(session.score().std < 1e-6);
    assert!(session.feature_importance().is_none());
}

#[test]
fn score_summary_matches_flat_scores() {
    let (x, y) = linear_data(40, 5);
    let session = bootstrap_fit(&x, y.view(), &ColumnMeanModel::default(), &seeded(3, 2, 2)).unwrap();
    let flat = Array1::from(session.flat_scores());
    assert_approx_eq!(f64, session.score().mean, flat.mean().unwrap(), epsilon = 1e-12);
    assert_approx_eq!(f64, session.score().std, flat.std(0.0), epsilon = 1e-12);
}

#[test]
fn splits_partition_the_rows() {
    let (x, y) = linear_data(23, 4);
    let session = bootstrap_fit(&x, y.view(), &LinearRegression::new(), &seeded(3, 3, 4)).unwrap();
    for (i, it) in session.iterations().iter().enumerate() {
        // ceil(0.2 * 23) = 5
        assert_eq!(it.test_rows.len(), 5);
        assert_eq!(it.train_rows.len(), 18);
        let test: HashSet<usize> = it.test_rows.iter().copied().collect();
        let train: HashSet<usize> = it.train_rows.iter().copied().collect();
        assert!(test.is_disjoint(&train));
        assert_eq!(test.len() + train.len(), 23);

        let y_test = session.y_test(i).unwrap();
        assert_eq!(y_test, &y.select(Axis(0), &it.test_rows));
        let predictions = session.y_predict(i).unwrap();
        assert_eq!(predictions.len(), 3);
        assert!(predictions.iter().all(|p| p.len() == 5));
    }
    assert!(session.y_test(3).is_none());
}

#[test]
fn subsampled_importances_are_credited_to_the_drawn_features() {
    let (x, y) = indexed_columns(30, 6);
    let config = BootstrapConfig { feature_subsample: Some(2), ..seeded(30, 2, 17) };
    let session = bootstrap_fit(&x, y.view(), &ColumnMeanModel::default(), &config).unwrap();

    for it in session.iterations() {
        assert_eq!(it.feature_indices.len(), 2);
        assert!(it.feature_indices.windows(2).all(|w| w[0] < w[1]));
    }

    let importance = session.feature_importance().unwrap();
    let total_samples: usize = importance.iter().map(|f| f.samples).sum();
    assert_eq!(total_samples, 30 * 2 * 2);
    for feature in importance {
        let column: usize = feature.name.parse().unwrap();
        assert_approx_eq!(f64, feature.mean, (column + 1) as f64, epsilon = 1e-12);
        if feature.samples > 1 {
            assert_approx_eq!(f64, feature.std, 0.0, epsilon = 1e-12);
        }
    }
    assert!(importance.windows(2).all(|w| w[0].mean >= w[1].mean));
}

#[test]
fn fixed_seed_is_reproducible_serially_and_in_parallel() {
    let (x, y) = linear_data(35, 8);
    let parallel = BootstrapConfig { parallel: true, feature_subsample: Some(2), ..seeded(6, 3, 99) };
    let serial = BootstrapConfig { parallel: false, ..parallel.clone() };

    let a = bootstrap_fit(&x, y.view(), &LinearRegression::new(), &parallel).unwrap();
    let b = bootstrap_fit(&x, y.view(), &LinearRegression::new(), &serial).unwrap();
    assert_eq!(a.flat_scores(), b.flat_scores());
    for (ia, ib) in a.iterations().iter().zip(b.iterations()) {
        assert_eq!(ia.test_rows, ib.test_rows);
        assert_eq!(ia.feature_indices, ib.feature_indices);
    }
}

#[test]
fn drawn_seed_is_recorded_and_replayable() {
    let (x, y) = linear_data(30, 6);
    let config = BootstrapConfig { iterations: 2, folds: 2, random_seed: None, ..Default::default() };
    let first = bootstrap_fit(&x, y.view(), &ColumnMeanModel::default(), &config).unwrap();
    let replay = bootstrap_fit(&x, y.view(), &ColumnMeanModel::default(), &seeded(2, 2, first.random_seed())).unwrap();
    assert_eq!(first.flat_scores(), replay.flat_scores());
}

#[test]
fn target_length_mismatch_is_an_input_error() {
    let (x, y) = linear_data(20, 1);
    let short = y.slice(ndarray::s![..19]);
    let err = bootstrap_fit(&x, short, &LinearRegression::new(), &seeded(2, 2, 0)).unwrap_err();
    assert!(matches!(err, ArchetypeError::InputShape(_)));
}

#[test]
fn invalid_configurations_are_rejected() {
    let (x, y) = linear_data(20, 1);
    let model = LinearRegression::new();
    let bad = [
        seeded(0, 3, 0),
        seeded(2, 1, 0),
        BootstrapConfig { feature_subsample: Some(0), ..seeded(2, 2, 0) },
        BootstrapConfig { feature_subsample: Some(4), ..seeded(2, 2, 0) },
        BootstrapConfig { test_fraction: 1.0, ..seeded(2, 2, 0) },
        // 16 training rows cannot fill 17 folds.
        seeded(2, 17, 0),
    ];
    for config in &bad {
        let result = bootstrap_fit(&x, y.view(), &model, config);
        assert!(matches!(result, Err(ArchetypeError::Configuration(_))), "{:?}", config);
    }
}

#[test]
fn failing_estimator_aborts_the_whole_fit() {
    let (x, y) = linear_data(20, 2);
    let err = bootstrap_fit(&x, y.view(), &FailingModel, &seeded(3, 2, 0)).unwrap_err();
    match err {
        ArchetypeError::Estimator(message) => assert!(message.contains("singular design")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn importances_from_only_some_folds_are_an_error() {
    // 40 training rows in 3 folds leave 26, 27 and 27 rows to fit on.
    let (x, y) = indexed_columns(50, 3);
    let result = bootstrap_fit(&x, y.view(), &EvenRowsModel::default(), &seeded(1, 3, 0));
    assert!(matches!(result, Err(ArchetypeError::Estimator(_))));
}

#[test]
fn summaries_serialize_with_named_fields() {
    let summary = ScoreSummary { mean: 0.5, std: 0.25, samples: 4 };
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["mean"], 0.5);
    assert_eq!(json["samples"], 4);
}
