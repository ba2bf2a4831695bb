// src/estimator.rs

use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::error::{ArchetypeError, Result};

/// The capability set the bootstrap harness needs from a regression model.
///
/// `Clone` is required because every cross-validation fold trains its own
/// copy of an unfitted prototype. `Send + Sync` lets iterations run on the
/// rayon pool.
pub trait Regressor: Clone + Send + Sync {
    /// Fits the model to `x` (samples × features) and `y`.
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()>;

    /// Predicts one value per row of `x`.
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>>;

    /// Coefficient of determination of the predictions on `x` against `y`.
    fn score(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<f64> {
        let predicted = self.predict(x)?;
        r2_score(y, predicted.view())
    }

    /// Per-feature importance, for models that report one. `None` otherwise.
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }

    fn name(&self) -> &str {
        "regressor"
    }
}

/// `1 - SS_res / SS_tot`.
///
/// A constant `y_true` has no variance; the score is then 1.0 for a perfect
/// prediction and 0.0 otherwise.
///
/// # Errors
/// [`ArchetypeError::InputShape`] when the lengths differ or are zero.
pub fn r2_score(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<f64> {
    if y_true.len() != y_pred.len() {
        return Err(ArchetypeError::InputShape(format!(
            "r2_score: {} true values but {} predictions.",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.is_empty() {
        return Err(ArchetypeError::InputShape("r2_score needs at least one sample.".into()));
    }
    let mean = y_true.mean().unwrap_or(0.0);
    let ss_tot: f64 = y_true.iter().map(|&v| (v - mean).powi(2)).sum();
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(&t, &p)| (t - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

/// Checks the shapes handed to `fit`.
pub(crate) fn check_fit_input(x: ArrayView2<f64>, y: ArrayView1<f64>, model: &str) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(ArchetypeError::Estimator(format!(
            "{}: design matrix has {} rows but target has {} entries.",
            model,
            x.nrows(),
            y.len()
        )));
    }
    if x.nrows() == 0 {
        return Err(ArchetypeError::Estimator(format!("{}: cannot fit on zero samples.", model)));
    }
    Ok(())
}

/// Checks the feature count handed to `predict` against the fitted one.
pub(crate) fn check_predict_input(x: ArrayView2<f64>, fitted_features: Option<usize>, model: &str) -> Result<()> {
    match fitted_features {
        None => Err(ArchetypeError::Estimator(format!("{}: predict called before fit.", model))),
        Some(n) if n != x.ncols() => Err(ArchetypeError::Estimator(format!(
            "{}: fitted on {} features but asked to predict with {}.",
            model,
            n,
            x.ncols()
        ))),
        Some(_) => Ok(()),
    }
}
