use crate::common::*;
use crate::nmf::{NmfMethod, NmfParams, NmfStart};
use crate::scale::Transform;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Every knob of training and inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeconvConfig {
    /// annotation field with the cell-type labels
    pub label_field: Box<str>,
    /// maximum number of cells per cell type
    pub cl_n: usize,
    /// number of highly variable genes
    pub hvg: usize,
    /// marker genes per cluster (None: all)
    pub ntop: Option<usize>,
    pub transf: Transform,
    pub method: NmfMethod,
    pub init: NmfStart,
    /// minimum proportion kept per cell type, in [0,1)
    pub min_cont: f64,
    /// nonsmooth smoothing, in (0,1)
    pub theta: f64,
    pub max_iter: usize,
    pub tol: f64,
    /// NNLS passive-set budget (None: 3 x columns)
    pub nnls_max_iter: Option<usize>,
    /// spots per parallel job
    pub block_size: usize,
}

impl Default for DeconvConfig {
    fn default() -> Self {
        Self {
            label_field: DEFAULT_LABEL_FIELD.into(),
            cl_n: DEFAULT_CL_N,
            hvg: DEFAULT_HVG,
            ntop: None,
            transf: Transform::default(),
            method: NmfMethod::default(),
            init: NmfStart::default(),
            min_cont: 0.0,
            theta: DEFAULT_NSNMF_THETA,
            max_iter: DEFAULT_MAX_ITER,
            tol: DEFAULT_TOL,
            nnls_max_iter: None,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// The part of the configuration used per spot
#[derive(Debug, Clone, Copy)]
pub struct InferenceParams {
    pub min_cont: f64,
    pub nnls_max_iter: Option<usize>,
    pub block_size: usize,
}

impl DeconvConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cl_n == 0 {
            return Err(DeconvError::invalid_config("cl_n must be positive"));
        }
        if self.ntop == Some(0) {
            return Err(DeconvError::invalid_config("ntop must be positive or unset"));
        }
        if !(self.min_cont >= 0.0 && self.min_cont < 1.0) {
            return Err(DeconvError::invalid_config(format!(
                "min_cont must be in [0,1), got {}",
                self.min_cont
            )));
        }
        if !(self.theta > 0.0 && self.theta < 1.0) {
            return Err(DeconvError::invalid_config(format!(
                "theta must be in (0,1), got {}",
                self.theta
            )));
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
        if self.nnls_max_iter == Some(0) {
            return Err(DeconvError::invalid_config(
                "nnls_max_iter must be positive or unset",
            ));
        }
        if self.block_size == 0 {
            return Err(DeconvError::invalid_config("block_size must be positive"));
        }
        Ok(())
    }

    pub fn nmf_params(&self, rank: usize) -> NmfParams {
        NmfParams {
            method: self.method,
            rank,
            max_iter: self.max_iter,
            tol: self.tol,
            theta: self.theta,
        }
    }

    pub fn inference(&self) -> InferenceParams {
        InferenceParams {
            min_cont: self.min_cont,
            nnls_max_iter: self.nnls_max_iter,
            block_size: self.block_size,
        }
    }

    pub fn from_json_file(file_path: &str) -> anyhow::Result<Self> {
        let reader = matrix_util::common_io::open_buf_reader(file_path)?;
        let ret: Self = serde_json::from_reader(reader)?;
        ret.validate()?;
        Ok(ret)
    }

    pub fn to_json_file(&self, file_path: &str) -> anyhow::Result<()> {
        let mut writer = matrix_util::common_io::open_buf_writer(file_path)?;
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DeconvConfig::default();
        config.validate().unwrap();
        assert_eq!(config.method, NmfMethod::Nonsmooth);
        assert_eq!(config.transf, Transform::Uv);
        assert_eq!(config.theta, DEFAULT_NSNMF_THETA);
        assert_eq!(config.init, NmfStart::Labels);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let bad = [
            DeconvConfig {
                cl_n: 0,
                ..Default::default()
            },
            DeconvConfig {
                min_cont: 1.0,
                ..Default::default()
            },
            DeconvConfig {
                min_cont: -0.1,
                ..Default::default()
            },
            DeconvConfig {
                ntop: Some(0),
                ..Default::default()
            },
            DeconvConfig {
                theta: 0.0,
                ..Default::default()
            },
            DeconvConfig {
                tol: f64::NAN,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(
                config.validate(),
                Err(DeconvError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: DeconvConfig =
            serde_json::from_str(r#"{"cl_n": 20, "method": "standard", "transf": "none", "init": "nndsvd"}"#)
                .unwrap();
        assert_eq!(config.cl_n, 20);
        assert_eq!(config.method, NmfMethod::Standard);
        assert_eq!(config.transf, Transform::None);
        assert_eq!(config.init, NmfStart::Nndsvd);
        assert_eq!(config.hvg, DEFAULT_HVG);
    }
}
