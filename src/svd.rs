// src/svd.rs

use ndarray::Array1;

use crate::error::{ArchetypeError, Result};
use crate::linalg_backends::{BackendSVD, LinAlgBackendProvider};
use crate::matrix::{FeatureMatrix, LabeledMatrix};

/// Label of the `k`-th singular component.
fn component_label(k: usize) -> String {
    format!("S{}", k)
}

/// Thin singular value decomposition of a feature matrix with labels carried
/// through: `X = U diag(s) Vt`.
#[derive(Clone, Debug)]
pub struct SvdDecomposition {
    /// Entity × component, rows keep the input ids.
    u: LabeledMatrix,
    /// Singular values, descending.
    s: Array1<f64>,
    /// Component × feature, columns keep the input names.
    vt: LabeledMatrix,
}

impl SvdDecomposition {
    /// # Errors
    /// Returns [`ArchetypeError::InputShape`] for an empty matrix and
    /// [`ArchetypeError::Linalg`] if the backend fails.
    pub fn compute(x: &FeatureMatrix) -> Result<Self> {
        if x.is_empty() {
            return Err(ArchetypeError::InputShape("SVD input matrix has zero rows or zero columns.".into()));
        }
        let backend = LinAlgBackendProvider::new();
        let out = backend.svd_into(x.values().clone(), true, true)?;
        let u_full = out.u.ok_or_else(|| ArchetypeError::Linalg("SVD did not return U.".into()))?;
        let vt_full = out.vt.ok_or_else(|| ArchetypeError::Linalg("SVD did not return Vt.".into()))?;

        // Keep only as many components as there are singular values.
        let k = out.s.len();
        let u = u_full.slice(ndarray::s![.., ..k]).to_owned();
        let vt = vt_full.slice(ndarray::s![..k, ..]).to_owned();
        let labels: Vec<String> = (0..k).map(component_label).collect();

        Ok(Self {
            u: LabeledMatrix::from_parts(u, x.row_ids().to_vec(), labels.clone()),
            s: out.s,
            vt: LabeledMatrix::from_parts(vt, labels, x.column_names().to_vec()),
        })
    }

    /// Entity loadings on each component.
    pub fn u(&self) -> &LabeledMatrix {
        &self.u
    }

    pub fn singular_values(&self) -> &Array1<f64> {
        &self.s
    }

    /// Feature loadings of each component.
    pub fn vt(&self) -> &LabeledMatrix {
        &self.vt
    }
}
