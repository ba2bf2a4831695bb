// src/matrix.rs

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ArchetypeError, Result};

/// Maps an entity identifier (e.g. an O*NET-SOC code) to a display name.
///
/// Passed explicitly to the decomposition engine; the crate never consults
/// global lookup tables.
pub trait NameLookup {
    fn display_name(&self, id: &str) -> Option<String>;
}

impl NameLookup for HashMap<String, String> {
    fn display_name(&self, id: &str) -> Option<String> {
        self.get(id).cloned()
    }
}

/// A dense numeric table with labeled rows and columns.
///
/// Rows are entities (occupations), columns are features (skills, abilities).
/// The same type carries every labeled output of the engines, so a factor
/// matrix keeps its entity ids or feature names through normalization and
/// transposition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabeledMatrix {
    values: Array2<f64>,
    row_ids: Vec<String>,
    column_names: Vec<String>,
}

/// Input to both engines: rows indexed by entity id, columns by feature name.
pub type FeatureMatrix = LabeledMatrix;

impl LabeledMatrix {
    /// Builds a labeled matrix, checking that the labels match the shape and
    /// that every entry is finite.
    ///
    /// # Errors
    /// Returns [`ArchetypeError::InputShape`] on a label count mismatch or a
    /// NaN/infinite entry.
    pub fn new(values: Array2<f64>, row_ids: Vec<String>, column_names: Vec<String>) -> Result<Self> {
        if row_ids.len() != values.nrows() {
            return Err(ArchetypeError::InputShape(format!(
                "{} row ids supplied for a matrix with {} rows.",
                row_ids.len(),
                values.nrows()
            )));
        }
        if column_names.len() != values.ncols() {
            return Err(ArchetypeError::InputShape(format!(
                "{} column names supplied for a matrix with {} columns.",
                column_names.len(),
                values.ncols()
            )));
        }
        if let Some(((r, c), v)) = values.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(ArchetypeError::InputShape(format!(
                "Non-finite value {} at row '{}', column '{}'; missing values are not allowed.",
                v, row_ids[r], column_names[c]
            )));
        }
        Ok(Self { values, row_ids, column_names })
    }

    /// Labels rows and columns with their positions ("0", "1", ...).
    pub fn from_unlabeled(values: Array2<f64>) -> Result<Self> {
        let row_ids = (0..values.nrows()).map(|i| i.to_string()).collect();
        let column_names = (0..values.ncols()).map(|j| j.to_string()).collect();
        Self::new(values, row_ids, column_names)
    }

    // Internal constructor for outputs whose shape is known to match.
    pub(crate) fn from_parts(values: Array2<f64>, row_ids: Vec<String>, column_names: Vec<String>) -> Self {
        debug_assert_eq!(values.nrows(), row_ids.len());
        debug_assert_eq!(values.ncols(), column_names.len());
        Self { values, row_ids, column_names }
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn into_values(self) -> Array2<f64> {
        self.values
    }

    pub fn row_ids(&self) -> &[String] {
        &self.row_ids
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The row labeled `id`, if present.
    pub fn row(&self, id: &str) -> Option<ArrayView1<'_, f64>> {
        self.row_ids
            .iter()
            .position(|r| r == id)
            .map(|i| self.values.row(i))
    }

    /// The column labeled `name`, if present.
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.column_names
            .iter()
            .position(|c| c == name)
            .map(|j| self.values.column(j))
    }

    pub fn is_non_negative(&self) -> bool {
        self.values.iter().all(|&v| v >= 0.0)
    }

    /// Swaps rows and columns, labels included.
    pub fn transpose(&self) -> Self {
        Self {
            values: self.values.t().to_owned(),
            row_ids: self.column_names.clone(),
            column_names: self.row_ids.clone(),
        }
    }

    /// Keeps the given columns, in the given order.
    ///
    /// # Errors
    /// Returns [`ArchetypeError::InputShape`] if an index is out of bounds.
    pub fn select_columns(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&j| j >= self.ncols()) {
            return Err(ArchetypeError::InputShape(format!(
                "Column index {} out of bounds for {} columns.",
                bad,
                self.ncols()
            )));
        }
        Ok(Self {
            values: self.values.select(Axis(1), indices),
            row_ids: self.row_ids.clone(),
            column_names: indices.iter().map(|&j| self.column_names[j].clone()).collect(),
        })
    }

    /// Keeps the given rows, in the given order.
    ///
    /// # Errors
    /// Returns [`ArchetypeError::InputShape`] if an index is out of bounds.
    pub fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.nrows()) {
            return Err(ArchetypeError::InputShape(format!(
                "Row index {} out of bounds for {} rows.",
                bad,
                self.nrows()
            )));
        }
        Ok(Self {
            values: self.values.select(Axis(0), indices),
            row_ids: indices.iter().map(|&i| self.row_ids[i].clone()).collect(),
            column_names: self.column_names.clone(),
        })
    }

    /// Replaces each row id by its display name. Ids the lookup does not know
    /// keep their original label.
    pub fn relabel_rows(&self, lookup: &dyn NameLookup) -> Self {
        let row_ids = self
            .row_ids
            .iter()
            .map(|id| lookup.display_name(id).unwrap_or_else(|| id.clone()))
            .collect();
        Self {
            values: self.values.clone(),
            row_ids,
            column_names: self.column_names.clone(),
        }
    }

    /// Applies `f` to every row, keeping labels.
    pub fn map_rows<F>(&self, f: F) -> Self
    where
        F: Fn(ArrayView1<f64>) -> Array1<f64>,
    {
        let mut values = self.values.clone();
        for (mut out, row) in values.axis_iter_mut(Axis(0)).zip(self.values.axis_iter(Axis(0))) {
            out.assign(&f(row));
        }
        Self {
            values,
            row_ids: self.row_ids.clone(),
            column_names: self.column_names.clone(),
        }
    }

    /// Applies `f` to every column, keeping labels.
    pub fn map_columns<F>(&self, f: F) -> Self
    where
        F: Fn(ArrayView1<f64>) -> Array1<f64>,
    {
        let mut values = self.values.clone();
        for (mut out, col) in values.axis_iter_mut(Axis(1)).zip(self.values.axis_iter(Axis(1))) {
            out.assign(&f(col));
        }
        Self {
            values,
            row_ids: self.row_ids.clone(),
            column_names: self.column_names.clone(),
        }
    }

    /// Elementwise square, labels kept.
    pub fn squared(&self) -> Self {
        Self {
            values: self.values.mapv(|v| v * v),
            row_ids: self.row_ids.clone(),
            column_names: self.column_names.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn labels(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn rejects_label_mismatch_and_nan() {
        let err = LabeledMatrix::new(array![[1.0, 2.0]], labels("r", 2), labels("c", 2)).unwrap_err();
        assert!(matches!(err, ArchetypeError::InputShape(_)));

        let err = LabeledMatrix::new(array![[1.0, f64::NAN]], labels("r", 1), labels("c", 2)).unwrap_err();
        assert!(matches!(err, ArchetypeError::InputShape(_)));
    }

    #[test]
    fn transpose_swaps_labels() {
        let m = LabeledMatrix::new(array![[1.0, 2.0, 3.0]], labels("r", 1), labels("c", 3)).unwrap();
        let t = m.transpose();
        assert_eq!(t.dim(), (3, 1));
        assert_eq!(t.row_ids(), &["c0", "c1", "c2"]);
        assert_eq!(t.column_names(), &["r0"]);
        assert_eq!(t.values()[[2, 0]], 3.0);
    }

    #[test]
    fn select_columns_keeps_names_in_order() {
        let m = LabeledMatrix::new(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], labels("r", 2), labels("c", 3)).unwrap();
        let s = m.select_columns(&[2, 0]).unwrap();
        assert_eq!(s.column_names(), &["c2", "c0"]);
        assert_eq!(s.values(), &array![[3.0, 1.0], [6.0, 4.0]]);
        assert!(m.select_columns(&[3]).is_err());
    }

    #[test]
    fn relabel_falls_back_to_id() {
        let m = LabeledMatrix::new(array![[1.0], [2.0]], vec!["11-1011".into(), "99-9999".into()], labels("c", 1)).unwrap();
        let mut names = HashMap::new();
        names.insert("11-1011".to_string(), "Chief Executives".to_string());
        let r = m.relabel_rows(&names);
        assert_eq!(r.row_ids(), &["Chief Executives", "99-9999"]);
        assert_eq!(r.values(), m.values());
    }
}
