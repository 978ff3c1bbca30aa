use crate::common::*;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Per-column (per cell or per spot) transform applied before the
/// factorization and before every projection. Each column is scaled
/// by its own statistics; nothing is memorized from training.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    /// identity
    None,
    /// divide by the sample standard deviation, keep the mean
    #[default]
    Uv,
}

impl Transform {
    /// Transform every column of a genes x samples matrix
    pub fn apply(&self, mat: &Mat) -> Mat {
        match self {
            Transform::None => mat.clone(),
            Transform::Uv => mat.scale_columns(),
        }
    }

    /// Same as `apply`, consuming the matrix
    pub fn apply_owned(&self, mut mat: Mat) -> Mat {
        if let Transform::Uv = self {
            mat.scale_columns_inplace();
        }
        mat
    }

    /// Transform a single expression vector
    pub fn apply_vec(&self, vec: &DVec) -> DVec {
        match self {
            Transform::None => vec.clone(),
            Transform::Uv => {
                let xx: Vec<f64> = vec.iter().copied().collect();
                let sd = matrix_util::dmatrix_util::sample_sd(&xx);
                if sd > 0.0 {
                    vec.unscale(sd)
                } else {
                    vec.clone()
                }
            }
        }
    }
}
