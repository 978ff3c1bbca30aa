//! Error taxonomy of the deconvolution engine.
//!
//! Iteration caps in the trainer and the least-squares solver are not
//! errors: those return their best estimate with `converged == false`.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DeconvError {
    /// Bad parameters: non-positive `cl_n`, missing label field, empty
    /// gene set, out-of-range thresholds
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A negative (or non-finite) count reached the boundary
    #[error("negative or non-finite value {value} in {what} at ({row}, {col})")]
    NegativeInput {
        what: Box<str>,
        row: usize,
        col: usize,
        value: f64,
    },

    /// A spot has no expressed gene in common with the trained model
    #[error("spot {spot} shares no expressed genes with the trained model")]
    EmptyOverlap { spot: Box<str> },

    /// Shapes or names of the inputs don't line up
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The linear solver could not produce an iterate at all
    #[error("numerical failure: {0}")]
    Numerical(String),
}

pub type Result<T> = std::result::Result<T, DeconvError>;

impl DeconvError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        DeconvError::InvalidConfig(msg.into())
    }

    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        DeconvError::DimensionMismatch(msg.into())
    }
}
