pub use log::{debug, info, warn};

pub use crate::error::{DeconvError, Result};

pub type Mat = nalgebra::DMatrix<f64>;
pub type DVec = nalgebra::DVector<f64>;

pub use matrix_util::traits::{IoOps, MatOps, SampleOps};

/// default annotation field holding cell-type labels
pub const DEFAULT_LABEL_FIELD: &str = "cell_type";

/// smoothing parameter θ of the nonsmooth factorization
pub const DEFAULT_NSNMF_THETA: f64 = 0.5;

pub const DEFAULT_CL_N: usize = 100;
pub const DEFAULT_HVG: usize = 3000;
pub const DEFAULT_MAX_ITER: usize = 1000;
pub const DEFAULT_TOL: f64 = 1e-6;
pub const DEFAULT_BLOCK_SIZE: usize = 100;

/// name of the unexplained-mass column in deconvolution output
pub const RESIDUAL_COLUMN: &str = "residual";

/// Reject negative or non-finite entries
///
/// * `mat` - matrix to check
/// * `what` - name used in the error message
pub fn check_non_negative(mat: &Mat, what: &str) -> Result<()> {
    for (j, col) in mat.column_iter().enumerate() {
        for (i, &x) in col.iter().enumerate() {
            if !(x.is_finite() && x >= 0.0) {
                return Err(DeconvError::NegativeInput {
                    what: what.into(),
                    row: i,
                    col: j,
                    value: x,
                });
            }
        }
    }
    Ok(())
}
