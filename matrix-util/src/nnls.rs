//! Non-negative least squares by the Lawson–Hanson active-set method.
//!
//! Solves `min_x ||b - A x||_2` subject to `x >= 0`. The Gram matrix
//! `A'A` and `A'b` are formed once, so every passive-set subproblem is
//! a small `|P| x |P|` solve.

use nalgebra::{DMatrix, DVector};

/// Result of a single NNLS solve
#[derive(Debug, Clone)]
pub struct NnlsOut {
    /// non-negative solution
    pub x: DVector<f64>,
    /// `||b - A x||_2^2`
    pub residual_ss: f64,
    /// number of passive-set solves performed
    pub iterations: usize,
    /// `false` when the iteration budget ran out first
    pub converged: bool,
}

/// Precomputed normal equations of a fixed design matrix. Build it
/// once and reuse it for many right-hand sides.
#[derive(Debug, Clone)]
pub struct NnlsDesign {
    aa: DMatrix<f64>,
    ata: DMatrix<f64>,
    tol: f64,
}

impl NnlsDesign {
    pub fn new(aa: DMatrix<f64>) -> Self {
        let ata = aa.transpose() * &aa;
        let scale = ata.iter().fold(0_f64, |m, x| m.max(x.abs())).max(1.0);
        let tol = 10.0 * f64::EPSILON * scale * (aa.nrows().max(aa.ncols()) as f64);
        Self { aa, ata, tol }
    }

    pub fn nrows(&self) -> usize {
        self.aa.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.aa.ncols()
    }

    /// Solve for one target vector `bb`
    ///
    /// * `bb` - target with `nrows()` elements
    /// * `max_iter` - passive-set solves allowed (`None` = `3 * ncols()`)
    pub fn solve(&self, bb: &DVector<f64>, max_iter: Option<usize>) -> anyhow::Result<NnlsOut> {
        if bb.len() != self.nrows() {
            return Err(anyhow::anyhow!(
                "target length {} != design rows {}",
                bb.len(),
                self.nrows()
            ));
        }

        let nn = self.ncols();
        let max_iter = max_iter.unwrap_or(3 * nn).max(1);
        let atb = self.aa.transpose() * bb;

        let mut xx = DVector::<f64>::zeros(nn);
        let mut passive = vec![false; nn];
        let mut iterations = 0;
        let mut converged = true;

        let mut grad = &atb - &self.ata * &xx;

        'outer: loop {
            let candidate = (0..nn)
                .filter(|&j| !passive[j] && grad[j] > self.tol)
                .max_by(|&a, &b| grad[a].total_cmp(&grad[b]));

            let Some(t) = candidate else {
                break;
            };

            passive[t] = true;

            loop {
                if iterations >= max_iter {
                    converged = false;
                    break 'outer;
                }
                iterations += 1;

                let pset: Vec<usize> = (0..nn).filter(|&j| passive[j]).collect();
                let zz = self.solve_passive(&atb, &pset)?;

                if zz.iter().all(|&z| z > 0.0) {
                    for (&j, &z) in pset.iter().zip(zz.iter()) {
                        xx[j] = z;
                    }
                    break;
                }

                // step back towards the feasible region
                let mut alpha = f64::INFINITY;
                for (&j, &z) in pset.iter().zip(zz.iter()) {
                    if z <= 0.0 {
                        let denom = xx[j] - z;
                        if denom > 0.0 {
                            alpha = alpha.min(xx[j] / denom);
                        }
                    }
                }
                if !alpha.is_finite() {
                    alpha = 0.0;
                }

                for (&j, &z) in pset.iter().zip(zz.iter()) {
                    xx[j] += alpha * (z - xx[j]);
                    if xx[j] <= self.tol {
                        xx[j] = 0.0;
                        passive[j] = false;
                    }
                }

                if !passive.iter().any(|&p| p) {
                    break;
                }
            }

            grad = &atb - &self.ata * &xx;
        }

        xx.iter_mut().for_each(|x| *x = x.max(0.0));
        let resid = bb - &self.aa * &xx;

        Ok(NnlsOut {
            residual_ss: resid.norm_squared(),
            x: xx,
            iterations,
            converged,
        })
    }

    fn solve_passive(&self, atb: &DVector<f64>, pset: &[usize]) -> anyhow::Result<DVector<f64>> {
        let sub = self.ata.select_rows(pset).select_columns(pset);
        let rhs = atb.select_rows(pset);

        if let Some(chol) = sub.clone().cholesky() {
            return Ok(chol.solve(&rhs));
        }

        // rank-deficient passive set
        sub.svd(true, true)
            .solve(&rhs, self.tol)
            .map_err(|e| anyhow::anyhow!("passive-set solve failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn nnls(
        aa: &DMatrix<f64>,
        bb: &DVector<f64>,
        max_iter: Option<usize>,
    ) -> anyhow::Result<NnlsOut> {
        NnlsDesign::new(aa.clone()).solve(bb, max_iter)
    }

    #[test]
    fn recovers_a_feasible_solution() -> anyhow::Result<()> {
        let aa = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0]);
        let truth = DVector::from_vec(vec![0.7, 1.3]);
        let bb = &aa * &truth;

        let out = nnls(&aa, &bb, None)?;
        assert!(out.converged);
        assert_abs_diff_eq!(out.x, truth, epsilon = 1e-10);
        assert_abs_diff_eq!(out.residual_ss, 0.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn clips_negative_directions() -> anyhow::Result<()> {
        // unconstrained solution is (1, -1)
        let aa = DMatrix::<f64>::identity(2, 2);
        let bb = DVector::from_vec(vec![1.0, -1.0]);

        let out = nnls(&aa, &bb, None)?;
        assert_abs_diff_eq!(out.x[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.x[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.residual_ss, 1.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn matches_known_blockpivot_output() -> anyhow::Result<()> {
        let aa = DMatrix::from_row_slice(3, 2, &[3.0, 1.0, 5.0, 3.0, 2.0, 4.0]);
        let bb = DVector::from_vec(vec![1.0, 7.0, 4.0]);

        let out = nnls(&aa, &bb, None)?;
        assert_abs_diff_eq!(out.x[0], 0.666_666_67, epsilon = 1e-6);
        assert_abs_diff_eq!(out.x[1], 0.794_871_79, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn zero_target_gives_zero() -> anyhow::Result<()> {
        let aa = DMatrix::<f64>::from_element(5, 3, 1.0);
        let out = nnls(&aa, &DVector::zeros(5), None)?;
        assert!(out.converged);
        assert!(out.x.iter().all(|&x| x == 0.0));
        Ok(())
    }

    #[test]
    fn reports_budget_exhaustion() -> anyhow::Result<()> {
        let aa = DMatrix::<f64>::identity(4, 4);
        let bb = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        let out = nnls(&aa, &bb, Some(1))?;
        assert!(!out.converged);
        assert!(out.x.iter().all(|&x| x >= 0.0));
        Ok(())
    }
}
