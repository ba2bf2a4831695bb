// src/nmf.rs

use log::{debug, info, trace, warn};
use ndarray::{Array2, ArrayView2, Zip};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{ArchetypeError, Result};

/// Floor applied to multiplicative-update denominators.
const DENOMINATOR_FLOOR: f64 = 1e-12;

/// Parameters of the multiplicative-update NMF solver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NmfConfig {
    /// Hard cap on update sweeps.
    pub max_iter: usize,
    /// Stop once the relative improvement between two checks,
    /// `(previous_err - err) / initial_err`, falls below this.
    pub tol: f64,
    /// Seed for the random initialization. Fixed by default so that identical
    /// inputs give bit-identical factors.
    pub random_seed: u64,
    /// Number of sweeps between two convergence checks.
    pub check_interval: usize,
}

impl Default for NmfConfig {
    fn default() -> Self {
        NmfConfig {
            max_iter: 1000,
            tol: 1e-7,
            random_seed: 0,
            check_interval: 10,
        }
    }
}

/// How the solver ended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NmfReport {
    /// Update sweeps actually performed.
    pub n_iter: usize,
    /// `false` when `max_iter` was reached before the tolerance was met.
    pub converged: bool,
    /// `||X - W0 H0||_F` for the random initial factors.
    pub initial_err: f64,
    /// `||X - W H||_F` for the returned factors.
    pub reconstruction_err: f64,
}

/// Factors `W` (rows × rank) and `H` (rank × cols) with `W H ≈ X`.
#[derive(Clone, Debug)]
pub struct NmfOutput {
    pub w: Array2<f64>,
    pub h: Array2<f64>,
    pub report: NmfReport,
}

/// Random non-negative starting factors, scaled so that `W0 H0` has the same
/// average magnitude as `X`.
///
/// Entries are `sqrt(mean(X) / rank) * |z|` with `z ~ N(0, 1)`; `H0` is drawn
/// before `W0` from a ChaCha8 stream seeded with `seed`.
pub fn random_initialization(x: ArrayView2<f64>, rank: usize, seed: u64) -> (Array2<f64>, Array2<f64>) {
    let (n_rows, n_cols) = x.dim();
    let mean = x.mean().unwrap_or(0.0);
    let scale = (mean / rank as f64).sqrt();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let h0 = Array2::from_shape_fn((rank, n_cols), |_| {
        let z: f64 = rng.sample(StandardNormal);
        scale * z.abs()
    });
    let w0 = Array2::from_shape_fn((n_rows, rank), |_| {
        let z: f64 = rng.sample(StandardNormal);
        scale * z.abs()
    });
    (w0, h0)
}

/// Frobenius norm of `X - W H`.
pub fn frobenius_residual(x: ArrayView2<f64>, w: &Array2<f64>, h: &Array2<f64>) -> f64 {
    let approx = w.dot(h);
    let mut sum_sq = 0.0;
    Zip::from(&x).and(&approx).for_each(|&a, &b| {
        let d = a - b;
        sum_sq += d * d;
    });
    sum_sq.sqrt()
}

// Elementwise `target *= numerator / max(denominator, floor)`.
fn multiplicative_step(target: &mut Array2<f64>, numerator: &Array2<f64>, denominator: &Array2<f64>) {
    Zip::from(target)
        .and(numerator)
        .and(denominator)
        .for_each(|t, &num, &den| {
            *t *= num / den.max(DENOMINATOR_FLOOR);
        });
}

/// Non-negative matrix factorization under the Frobenius objective.
///
/// Lee-Seung multiplicative updates (`W` then `H` each sweep) starting from
/// [`random_initialization`]. Every `check_interval` sweeps the residual is
/// measured and the loop stops once the relative improvement drops below
/// `tol`. Running out of sweeps is logged as a warning and reported through
/// [`NmfReport::converged`]; the factors are still returned.
///
/// # Errors
/// [`ArchetypeError::InputShape`] for an empty matrix, a zero rank, or a
/// negative or non-finite entry. [`ArchetypeError::Configuration`] for a zero
/// `check_interval`.
pub fn nmf(x: ArrayView2<f64>, rank: usize, config: &NmfConfig) -> Result<NmfOutput> {
    let (n_rows, n_cols) = x.dim();
    if n_rows == 0 || n_cols == 0 {
        return Err(ArchetypeError::InputShape("NMF input matrix has zero rows or zero columns.".into()));
    }
    if rank == 0 {
        return Err(ArchetypeError::InputShape("Number of archetypes must be a positive integer.".into()));
    }
    if let Some(v) = x.iter().find(|v| !v.is_finite() || **v < 0.0) {
        return Err(ArchetypeError::InputShape(format!(
            "NMF requires a finite, non-negative matrix; found entry {}.",
            v
        )));
    }
    if config.check_interval == 0 {
        return Err(ArchetypeError::Configuration("NMF check_interval must be greater than 0.".into()));
    }
    if rank > n_rows.min(n_cols) {
        warn!(
            "Requested rank {} exceeds min(rows, cols) = {}; the factorization is over-parameterized.",
            rank,
            n_rows.min(n_cols)
        );
    }

    info!(
        "Starting NMF: {} rows x {} columns, rank {}, max_iter {}, tol {:e}, seed {}",
        n_rows, n_cols, rank, config.max_iter, config.tol, config.random_seed
    );
    let start_time = std::time::Instant::now();

    let (mut w, mut h) = random_initialization(x, rank, config.random_seed);
    let initial_err = frobenius_residual(x, &w, &h);

    if initial_err == 0.0 {
        debug!("Initial factors already reproduce the input exactly; skipping updates.");
        return Ok(NmfOutput {
            w,
            h,
            report: NmfReport { n_iter: 0, converged: true, initial_err, reconstruction_err: 0.0 },
        });
    }

    let mut previous_err = initial_err;
    let mut converged = false;
    let mut n_iter = 0;

    for iter in 1..=config.max_iter {
        // W <- W * (X H^T) / (W H H^T)
        let hht = h.dot(&h.t());
        let numerator_w = x.dot(&h.t());
        let denominator_w = w.dot(&hht);
        multiplicative_step(&mut w, &numerator_w, &denominator_w);

        // H <- H * (W^T X) / (W^T W H)
        let wtw = w.t().dot(&w);
        let numerator_h = w.t().dot(&x);
        let denominator_h = wtw.dot(&h);
        multiplicative_step(&mut h, &numerator_h, &denominator_h);

        n_iter = iter;

        if config.tol > 0.0 && iter % config.check_interval == 0 {
            let err = frobenius_residual(x, &w, &h);
            let improvement = (previous_err - err) / initial_err;
            trace!("NMF iteration {}: residual {:.6e}, relative improvement {:.3e}", iter, err, improvement);
            if improvement < config.tol {
                converged = true;
                break;
            }
            previous_err = err;
        }
    }

    let reconstruction_err = frobenius_residual(x, &w, &h);
    if !converged {
        warn!(
            "NMF reached max_iter={} without meeting tol={:e}; returning partially converged factors (residual {:.6e}).",
            config.max_iter, config.tol, reconstruction_err
        );
    }
    info!(
        "NMF finished in {:?} after {} iterations: residual {:.6e} (initial {:.6e}).",
        start_time.elapsed(),
        n_iter,
        reconstruction_err,
        initial_err
    );

    Ok(NmfOutput {
        w,
        h,
        report: NmfReport { n_iter, converged, initial_err, reconstruction_err },
    })
}
