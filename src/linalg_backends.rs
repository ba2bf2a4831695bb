// src/linalg_backends.rs

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use ndarray_linalg::{LeastSquaresSvd, SVDInto as NdLinalgSVDInto};

use crate::error::{ArchetypeError, Result};

/// Output of a Singular Value Decomposition.
#[derive(Debug)]
pub struct SVDOutput {
    pub u: Option<Array2<f64>>,
    pub s: Array1<f64>,
    pub vt: Option<Array2<f64>>,
}

/// Trait for Singular Value Decomposition.
pub trait BackendSVD {
    fn svd_into(&self, matrix: Array2<f64>, compute_u: bool, compute_v: bool) -> Result<SVDOutput>;
}

/// Trait for minimum-norm least squares, `argmin_b ||A b - y||`.
pub trait BackendLeastSquares {
    fn least_squares(&self, a: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Array1<f64>>;
}

// Backend that forwards to ndarray-linalg (LAPACK via the selected cargo feature).
#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

fn to_linalg_error<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> ArchetypeError + '_ {
    move |e| ArchetypeError::Linalg(format!("{}: {}", context, e))
}

impl BackendSVD for NdarrayLinAlgBackend {
    fn svd_into(&self, matrix: Array2<f64>, compute_u: bool, compute_v: bool) -> Result<SVDOutput> {
        let (u, s, vt) = matrix
            .svd_into(compute_u, compute_v)
            .map_err(to_linalg_error("SVD"))?;
        Ok(SVDOutput { u, s, vt })
    }
}

impl BackendLeastSquares for NdarrayLinAlgBackend {
    fn least_squares(&self, a: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Array1<f64>> {
        let a_owned = a.to_owned();
        let y_owned = y.to_owned();
        let result = a_owned
            .least_squares(&y_owned)
            .map_err(to_linalg_error("Least squares solve"))?;
        Ok(result.solution)
    }
}

/// Entry point the rest of the crate uses for dense linear algebra.
#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider {
    backend: NdarrayLinAlgBackend,
}

impl LinAlgBackendProvider {
    pub fn new() -> Self {
        Self { backend: NdarrayLinAlgBackend }
    }
}

impl BackendSVD for LinAlgBackendProvider {
    fn svd_into(&self, matrix: Array2<f64>, compute_u: bool, compute_v: bool) -> Result<SVDOutput> {
        if matrix.is_empty() {
            return Err(ArchetypeError::InputShape("SVD input matrix is empty.".into()));
        }
        self.backend.svd_into(matrix, compute_u, compute_v)
    }
}

impl BackendLeastSquares for LinAlgBackendProvider {
    fn least_squares(&self, a: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Array1<f64>> {
        if a.nrows() != y.len() {
            return Err(ArchetypeError::InputShape(format!(
                "Least squares design has {} rows but the target has {} entries.",
                a.nrows(),
                y.len()
            )));
        }
        if a.ncols() == 0 {
            return Ok(Array1::zeros(0));
        }
        self.backend.least_squares(a, y)
    }
}
