// src/linear.rs

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{ArchetypeError, Result};
use crate::estimator::{check_fit_input, check_predict_input, Regressor};
use crate::linalg_backends::{BackendLeastSquares, LinAlgBackendProvider};

/// Ordinary least squares with an intercept.
///
/// The design is centered before solving, so the intercept is
/// `mean(y) - mean(x) · coef`. The minimum-norm solution is returned for
/// rank-deficient designs. Linear models report no feature importances.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LinearRegression {
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Regressor for LinearRegression {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_fit_input(x, y, self.name())?;
        let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let y_mean = y.mean().unwrap_or(0.0);
        let x_centered = &x - &x_mean;
        let y_centered = y.mapv(|v| v - y_mean);

        let coef = LinAlgBackendProvider::new().least_squares(x_centered.view(), y_centered.view())?;
        self.intercept = y_mean - x_mean.dot(&coef);
        self.coefficients = Some(coef);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        check_predict_input(x, self.coefficients.as_ref().map(|c| c.len()), self.name())?;
        match self.coefficients.as_ref() {
            Some(coef) => Ok(x.dot(coef) + self.intercept),
            None => Err(ArchetypeError::Estimator(format!("{}: predict called before fit.", self.name()))),
        }
    }

    fn name(&self) -> &str {
        "LinearRegression"
    }
}
