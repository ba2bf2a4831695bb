// src/normalize.rs

//! Stateless vector transforms shared by both engines.

use log::debug;
use ndarray::{Array1, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::matrix::LabeledMatrix;

/// Statistical normalization: `(v - mean(v)) / std(v)`.
///
/// Uses the sample standard deviation (n - 1). A constant vector has zero
/// deviation and a single value has none defined; both come back as all-NaN.
pub fn normalize_stat(vector: ArrayView1<f64>) -> Array1<f64> {
    if vector.is_empty() {
        return Array1::zeros(0);
    }
    if vector.len() == 1 {
        return Array1::from_elem(1, f64::NAN);
    }
    let mean = vector.mean().unwrap_or(0.0);
    let std_dev = vector.std(1.0);
    vector.mapv(|x| (x - mean) / std_dev)
}

/// Cosine normalization: `v / sqrt(v · v)`, so the result has unit self dot-product.
///
/// The zero vector has no direction. It is returned unchanged (all zeros)
/// instead of being divided by zero.
pub fn normalize_dot(vector: ArrayView1<f64>) -> Array1<f64> {
    let norm = vector.dot(&vector).sqrt();
    if norm == 0.0 {
        debug!("normalize_dot received a zero vector of length {}; leaving it as zeros.", vector.len());
        return vector.to_owned();
    }
    vector.mapv(|x| x / norm)
}

/// Which transform [`normalize_matrix`] applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormKind {
    Stat,
    Dot,
}

impl NormKind {
    pub fn apply(self, vector: ArrayView1<f64>) -> Array1<f64> {
        match self {
            NormKind::Stat => normalize_stat(vector),
            NormKind::Dot => normalize_dot(vector),
        }
    }
}

/// Normalizes every lane of `matrix` along `axis`.
///
/// `Axis(1)` treats each row as the vector (one entity's feature profile);
/// `Axis(0)` treats each column as the vector (one feature across entities).
pub fn normalize_matrix(matrix: &LabeledMatrix, kind: NormKind, axis: Axis) -> LabeledMatrix {
    if axis == Axis(1) {
        matrix.map_rows(|row| kind.apply(row))
    } else {
        matrix.map_columns(|col| kind.apply(col))
    }
}
