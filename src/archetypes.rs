// src/archetypes.rs

use log::info;
use ndarray::Axis;

use crate::error::Result;
use crate::matrix::{FeatureMatrix, LabeledMatrix, NameLookup};
use crate::nmf::{nmf, NmfConfig, NmfReport};
use crate::normalize::{normalize_matrix, NormKind};

/// Label of the `k`-th archetype in factor matrices.
pub fn archetype_label(k: usize) -> String {
    format!("A{}", k)
}

/// The NMF of an occupations × features matrix at a fixed rank, together with
/// its cosine-normalized and name-labeled views.
///
/// Built once by [`Archetypes::factorize`] and never mutated. Every matrix is
/// owned; nothing aliases the caller's input.
#[derive(Clone, Debug)]
pub struct Archetypes {
    /// Number of archetypes (rank of the factorization).
    n: usize,
    /// Entity loadings, shape (entities, n). Rows keep the input ids.
    w: LabeledMatrix,
    /// `w` with each entity row scaled to unit self dot-product.
    w_norm: LabeledMatrix,
    /// `w_norm` with rows relabeled by display name when a lookup was given.
    occupations: LabeledMatrix,
    /// Feature loadings, shape (n, features). Columns keep the input names.
    h: LabeledMatrix,
    /// `h` with each archetype row scaled to unit self dot-product over features.
    h_norm: LabeledMatrix,
    report: NmfReport,
}

impl Archetypes {
    /// Factorizes `x` into `n` archetypes with the default solver settings
    /// (seed 0, 1000 sweeps, tolerance 1e-7) and no display-name lookup.
    pub fn new(x: &FeatureMatrix, n: usize) -> Result<Self> {
        Self::factorize(x, n, &NmfConfig::default(), None)
    }

    /// Factorizes `x` into `n` archetypes.
    ///
    /// * `x` - entities × features, entrywise non-negative.
    /// * `n` - number of archetypes, at least 1.
    /// * `config` - solver settings; the seed makes the result reproducible.
    /// * `names` - optional id → display-name mapping used for [`Archetypes::occupations`].
    ///
    /// # Errors
    /// Returns [`crate::ArchetypeError::InputShape`] for a zero rank, an empty
    /// matrix or a negative entry. Nothing is computed in that case.
    pub fn factorize(
        x: &FeatureMatrix,
        n: usize,
        config: &NmfConfig,
        names: Option<&dyn NameLookup>,
    ) -> Result<Self> {
        let output = nmf(x.view(), n, config)?;
        let archetype_names: Vec<String> = (0..n).map(archetype_label).collect();

        let w = LabeledMatrix::from_parts(output.w, x.row_ids().to_vec(), archetype_names.clone());
        let h = LabeledMatrix::from_parts(output.h, archetype_names, x.column_names().to_vec());

        let w_norm = normalize_matrix(&w, NormKind::Dot, Axis(1));
        let h_norm = normalize_matrix(&h, NormKind::Dot, Axis(1));
        let occupations = match names {
            Some(lookup) => w_norm.relabel_rows(lookup),
            None => w_norm.clone(),
        };

        info!(
            "Derived {} archetypes for {} entities over {} features (converged: {}).",
            n,
            x.nrows(),
            x.ncols(),
            output.report.converged
        );

        Ok(Self { n, w, w_norm, occupations, h, h_norm, report: output.report })
    }

    /// Number of archetypes.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Entity × archetype loadings.
    pub fn w(&self) -> &LabeledMatrix {
        &self.w
    }

    /// Entity × archetype loadings, each row cosine-normalized.
    pub fn w_norm(&self) -> &LabeledMatrix {
        &self.w_norm
    }

    /// Cosine-normalized entity loadings indexed by display name.
    pub fn occupations(&self) -> &LabeledMatrix {
        &self.occupations
    }

    /// Archetype × feature loadings.
    pub fn h(&self) -> &LabeledMatrix {
        &self.h
    }

    /// Archetype × feature loadings, each archetype cosine-normalized over features.
    pub fn h_norm(&self) -> &LabeledMatrix {
        &self.h_norm
    }

    /// Feature × archetype orientation of [`Archetypes::h`].
    pub fn feature_loadings(&self) -> LabeledMatrix {
        self.h.transpose()
    }

    /// Feature × archetype orientation of [`Archetypes::h_norm`].
    pub fn feature_loadings_norm(&self) -> LabeledMatrix {
        self.h_norm.transpose()
    }

    pub fn report(&self) -> &NmfReport {
        &self.report
    }

    /// `W H`, labeled like the input matrix.
    pub fn reconstruction(&self) -> LabeledMatrix {
        LabeledMatrix::from_parts(
            self.w.values().dot(self.h.values()),
            self.w.row_ids().to_vec(),
            self.h.column_names().to_vec(),
        )
    }

    /// `||X - W H||_F` of the returned factors.
    pub fn reconstruction_error(&self) -> f64 {
        self.report.reconstruction_err
    }
}
