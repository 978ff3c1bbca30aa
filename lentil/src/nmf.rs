//! Non-negative matrix factorization by multiplicative updates.
//!
//! Standard: `V ≈ W H`. Nonsmooth: `V ≈ W S H` with the smoothing
//! matrix `S = (1-θ) I + (θ/k) 1 1'`. Both variants minimise the
//! Frobenius norm with Lee–Seung updates, so the objective never
//! increases between iterations.

use crate::common::*;
use clap::ValueEnum;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// keeps denominators away from zero
const NMF_EPS: f64 = 1e-16;

/// smallest value of an initial entry
const INIT_FLOOR: f64 = 1e-8;

/// zeros of the initial factors are filled up to this fraction of the
/// typical entry
const INIT_FILL: f64 = 1e-2;

/// how often progress is logged
const LOG_EVERY: usize = 100;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NmfMethod {
    /// V ≈ W H
    Standard,
    /// V ≈ W S H (sparser, more distinctive topics)
    #[default]
    Nonsmooth,
}

/// How the factors are started
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NmfStart {
    /// one topic per cell type, from the training labels
    #[default]
    Labels,
    /// NNDSVD of the training matrix
    Nndsvd,
}

impl NmfMethod {
    /// `S` for this variant (identity for the standard one)
    pub fn smoothing(&self, rank: usize, theta: f64) -> Mat {
        match self {
            NmfMethod::Standard => Mat::identity(rank, rank),
            NmfMethod::Nonsmooth => smoothing_matrix(rank, theta),
        }
    }
}

/// `S = (1-θ) I + (θ/k) J`
pub fn smoothing_matrix(rank: usize, theta: f64) -> Mat {
    let off = theta / rank.max(1) as f64;
    Mat::from_fn(rank, rank, |i, j| {
        if i == j {
            1.0 - theta + off
        } else {
            off
        }
    })
}

#[derive(Debug, Clone)]
pub struct NmfParams {
    pub method: NmfMethod,
    pub rank: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub theta: f64,
}

impl NmfParams {
    pub fn validate(&self) -> Result<()> {
        if self.rank == 0 {
            return Err(DeconvError::invalid_config("NMF rank must be positive"));
        }
        if self.max_iter == 0 {
            return Err(DeconvError::invalid_config("max_iter must be positive"));
        }
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(DeconvError::invalid_config(format!(
                "tol must be positive, got {}",
                self.tol
            )));
        }
        if self.method == NmfMethod::Nonsmooth && !(self.theta > 0.0 && self.theta < 1.0) {
            return Err(DeconvError::invalid_config(format!(
                "theta must be in (0,1), got {}",
                self.theta
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NmfFit {
    /// genes x k
    pub basis: Mat,
    /// k x cells
    pub coef: Mat,
    /// k x k smoothing matrix (identity for the standard variant)
    pub smoothing: Mat,
    pub converged: bool,
    pub iterations: usize,
    /// `||V - W S H||_F` after every iteration
    pub residual_trace: Vec<f64>,
}

impl NmfFit {
    /// `W S`, the design matrix that maps topic usage back to genes
    pub fn effective_basis(&self) -> Mat {
        &self.basis * &self.smoothing
    }

    pub fn final_residual(&self) -> f64 {
        self.residual_trace.last().copied().unwrap_or(f64::NAN)
    }
}

/// Starting point of the multiplicative updates
#[derive(Debug, Clone, Copy)]
pub enum NmfInit<'a> {
    /// NNDSVD of `V` (Boutsidis & Gallopoulos); entries left at zero
    /// are filled with small random values
    Nndsvd,
    /// One topic per group. `W` starts at the group means of `V`, `H`
    /// at the group indicators. `groups[j]` is the group of column `j`.
    Groups(&'a [usize]),
}

/// Replace (near) zeros by uniform draws in `(0, fill)`, never below
/// `INIT_FLOOR`, so that no entry is locked at zero
fn fill_zeros<R>(x: &mut Mat, fill: f64, rng: &mut R)
where
    R: Rng + ?Sized,
{
    let noise = Mat::runif_with(x.nrows(), x.ncols(), rng);
    x.iter_mut().zip(noise.iter()).for_each(|(x, &u)| {
        if *x <= INIT_FLOOR {
            *x = (u * fill).max(INIT_FLOOR);
        }
    });
}

fn split_signs(x: &DVec) -> (DVec, DVec) {
    (x.map(|v| v.max(0.0)), x.map(|v| (-v).max(0.0)))
}

fn nndsvd_init<R>(vv: &Mat, kk: usize, fill: f64, rng: &mut R) -> Result<(Mat, Mat)>
where
    R: Rng + ?Sized,
{
    let (nrow, ncol) = vv.shape();
    let svd = vv.clone().svd(true, true);
    let (Some(uu), Some(vt)) = (svd.u.as_ref(), svd.v_t.as_ref()) else {
        return Err(DeconvError::Numerical("SVD of the NMF input failed".into()));
    };

    let sv = &svd.singular_values;
    let mut order: Vec<usize> = (0..sv.len()).collect();
    order.sort_by(|&a, &b| sv[b].total_cmp(&sv[a]));

    let mut basis = Mat::zeros(nrow, kk);
    let mut coef = Mat::zeros(kk, ncol);

    for (t, &r) in order.iter().take(kk).enumerate() {
        let sigma = sv[r];
        let x: DVec = uu.column(r).into_owned();
        let y: DVec = vt.row(r).transpose();

        if t == 0 {
            // the leading pair can be taken with one sign
            basis.set_column(t, &(x.abs() * sigma.sqrt()));
            coef.set_row(t, &(y.abs() * sigma.sqrt()).transpose());
            continue;
        }

        let (xp, xn) = split_signs(&x);
        let (yp, yn) = split_signs(&y);
        let mp = xp.norm() * yp.norm();
        let mn = xn.norm() * yn.norm();

        let (xs, ys, m) = if mp >= mn { (xp, yp, mp) } else { (xn, yn, mn) };
        if m <= 0.0 {
            continue;
        }

        let lambda = (sigma * m).sqrt();
        let (xnorm, ynorm) = (xs.norm(), ys.norm());
        basis.set_column(t, &(xs * (lambda / xnorm)));
        coef.set_row(t, &(ys * (lambda / ynorm)).transpose());
    }

    fill_zeros(&mut basis, fill, rng);
    fill_zeros(&mut coef, fill, rng);
    Ok((basis, coef))
}

fn group_init<R>(vv: &Mat, kk: usize, groups: &[usize], fill: f64, rng: &mut R) -> Result<(Mat, Mat)>
where
    R: Rng + ?Sized,
{
    let (nrow, ncol) = vv.shape();
    if groups.len() != ncol {
        return Err(DeconvError::dimension_mismatch(format!(
            "{} group labels for {} columns",
            groups.len(),
            ncol
        )));
    }
    if let Some(&g) = groups.iter().find(|&&g| g >= kk) {
        return Err(DeconvError::invalid_config(format!(
            "group {} is out of range for rank {}",
            g, kk
        )));
    }

    let mut basis = Mat::zeros(nrow, kk);
    let mut coef = Mat::zeros(kk, ncol);
    let mut size = vec![0_usize; kk];

    for (j, &g) in groups.iter().enumerate() {
        let mut w = basis.column_mut(g);
        w += vv.column(j);
        coef[(g, j)] = 1.0;
        size[g] += 1;
    }

    for (g, &n) in size.iter().enumerate() {
        if n > 0 {
            basis.column_mut(g).unscale_mut(n as f64);
        }
    }

    fill_zeros(&mut basis, fill, rng);
    fill_zeros(&mut coef, INIT_FILL, rng);
    Ok((basis, coef))
}

/// `x <- x .* numer ./ (denom + eps)`
fn multiplicative_step(x: &mut Mat, numer: &Mat, denom: &Mat) {
    x.iter_mut()
        .zip(numer.iter().zip(denom.iter()))
        .for_each(|(x, (&n, &d))| {
            *x *= n.max(0.0) / (d + NMF_EPS);
        });
}

/// Factorize a non-negative genes x cells matrix
///
/// # Arguments
/// * `vv` - normalized data, consumed
/// * `params` - variant, rank, stopping rule, θ
/// * `init` - starting point of `W` and `H`
/// * `rng` - random source for the small positive values that replace
///   zeros of the starting point
///
/// Running out of iterations is not an error: the last iterate comes
/// back with `converged == false`.
pub fn fit_nmf<R>(vv: Mat, params: &NmfParams, init: NmfInit, rng: &mut R) -> Result<NmfFit>
where
    R: Rng + ?Sized,
{
    params.validate()?;
    check_non_negative(&vv, "NMF input")?;

    let (nrow, ncol) = vv.shape();
    if nrow == 0 || ncol == 0 {
        return Err(DeconvError::dimension_mismatch(format!(
            "cannot factorize an empty {} x {} matrix",
            nrow, ncol
        )));
    }

    let kk = params.rank;
    let smoothing = params.method.smoothing(kk, params.theta);

    let vmean = vv.mean();
    let fill = if vmean > 0.0 {
        INIT_FILL * (vmean / kk as f64).sqrt()
    } else {
        INIT_FILL
    };

    let (mut basis, mut coef) = match init {
        NmfInit::Nndsvd => nndsvd_init(&vv, kk, fill, rng)?,
        NmfInit::Groups(groups) => group_init(&vv, kk, groups, fill, rng)?,
    };

    let mut residual_trace = Vec::with_capacity(params.max_iter);
    let mut converged = false;
    let mut prev = (&vv - &basis * &smoothing * &coef).norm();

    for iter in 0..params.max_iter {
        // H step: W S fixed
        let w_eff = &basis * &smoothing;
        let numer = w_eff.transpose() * &vv;
        let denom = (w_eff.transpose() * &w_eff) * &coef;
        multiplicative_step(&mut coef, &numer, &denom);

        // W step: S H fixed
        let h_eff = &smoothing * &coef;
        let numer = &vv * h_eff.transpose();
        let denom = &basis * (&h_eff * h_eff.transpose());
        multiplicative_step(&mut basis, &numer, &denom);

        let curr = (&vv - &basis * &h_eff).norm();
        residual_trace.push(curr);

        if (iter + 1) % LOG_EVERY == 0 {
            debug!("NMF [{}] residual {:.6e}", iter + 1, curr);
        }

        let rel = if prev > 0.0 { (prev - curr) / prev } else { 0.0 };
        prev = curr;

        if rel < params.tol {
            converged = true;
            break;
        }
    }

    let iterations = residual_trace.len();

    if converged {
        info!(
            "NMF ({:?}, k={}) converged after {} iterations, residual {:.6e}",
            params.method, kk, iterations, prev
        );
    } else {
        warn!(
            "NMF ({:?}, k={}) did not converge in {} iterations, residual {:.6e}",
            params.method, kk, iterations, prev
        );
    }

    Ok(NmfFit {
        basis,
        coef,
        smoothing,
        converged,
        iterations,
        residual_trace,
    })
}
