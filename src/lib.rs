// Occupation archetypes (NMF) and bootstrapped cross-validated fits

#![doc = include_str!("../README.md")]

pub mod archetypes;
pub mod bootstrap;
pub mod ensemble;
pub mod error;
pub mod estimator;
pub mod heatmap;
pub mod linalg_backends;
pub mod linear;
pub mod matrix;
pub mod nmf;
pub mod normalize;
pub mod ratings;
pub mod svd;
pub mod tree;

#[cfg(test)]
mod bootstrap_tests;

pub use archetypes::Archetypes;
pub use bootstrap::{bootstrap_fit, BootstrapConfig, FeatureImportance, FitSession, ScoreSummary};
pub use ensemble::{BoostingConfig, ForestConfig, GradientBoostingRegressor, RandomForestRegressor};
pub use error::{ArchetypeError, Result};
pub use estimator::{r2_score, Regressor};
pub use linear::LinearRegression;
pub use matrix::{FeatureMatrix, LabeledMatrix, NameLookup};
pub use nmf::{NmfConfig, NmfReport};
pub use normalize::{normalize_dot, normalize_stat, NormKind};
pub use tree::{RegressionTree, TreeConfig};
