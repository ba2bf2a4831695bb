// src/ratings.rs

//! Pivoting long-format descriptor ratings (one record per occupation,
//! element and scale) into the occupations × elements matrix the engines take.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ArchetypeError, Result};
use crate::matrix::FeatureMatrix;

/// Scale kept by default when pivoting O*NET skill/ability tables.
pub const DEFAULT_SCALE: &str = "Level";

/// Number of SOC digits that matches census occupation granularity.
pub const DEFAULT_SOC_DIGITS: usize = 5;

/// One rating of one descriptor element for one occupation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub occupation_code: String,
    pub element_name: String,
    pub scale_name: String,
    pub value: f64,
}

/// Formats an O*NET-SOC code for matching census codes: drops the dashes and
/// keeps the first `digits` characters. `"11-1011.00"` becomes `"11101"` at 5 digits.
pub fn shave_soc_code(code: &str, digits: usize) -> String {
    code.chars().filter(|&c| c != '-').take(digits).collect()
}

/// Builds the occupations × elements matrix for one scale.
///
/// Records on other scales are ignored. Duplicate (occupation, element) pairs
/// are averaged. Rows come out sorted by occupation code and columns by
/// element name.
///
/// # Errors
/// [`ArchetypeError::InputShape`] if no record uses `scale_name`, if a value is
/// not finite, or if some occupation lacks a rating for some element.
pub fn pivot_ratings(records: &[Rating], scale_name: &str) -> Result<FeatureMatrix> {
    let mut sums: BTreeMap<(&str, &str), (f64, usize)> = BTreeMap::new();
    let mut occupations = BTreeSet::new();
    let mut elements = BTreeSet::new();

    for record in records.iter().filter(|r| r.scale_name == scale_name) {
        if !record.value.is_finite() {
            return Err(ArchetypeError::InputShape(format!(
                "Rating for occupation '{}', element '{}' is not finite.",
                record.occupation_code, record.element_name
            )));
        }
        occupations.insert(record.occupation_code.as_str());
        elements.insert(record.element_name.as_str());
        let entry = sums
            .entry((record.occupation_code.as_str(), record.element_name.as_str()))
            .or_insert((0.0, 0));
        entry.0 += record.value;
        entry.1 += 1;
    }

    if occupations.is_empty() {
        return Err(ArchetypeError::InputShape(format!("No ratings found on scale '{}'.", scale_name)));
    }

    let row_ids: Vec<String> = occupations.iter().map(|s| s.to_string()).collect();
    let column_names: Vec<String> = elements.iter().map(|s| s.to_string()).collect();
    let mut values = Array2::<f64>::zeros((row_ids.len(), column_names.len()));

    for (i, occ) in occupations.iter().enumerate() {
        for (j, elem) in elements.iter().enumerate() {
            let (sum, count) = sums.get(&(*occ, *elem)).ok_or_else(|| {
                ArchetypeError::InputShape(format!(
                    "Occupation '{}' has no '{}' rating for element '{}'.",
                    occ, scale_name, elem
                ))
            })?;
            values[[i, j]] = sum / *count as f64;
        }
    }

    FeatureMatrix::new(values, row_ids, column_names)
}
