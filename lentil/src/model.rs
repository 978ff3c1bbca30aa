use crate::common::*;
use crate::config::DeconvConfig;
use crate::downsample::{downsample_reference, DownsampleArgs};
use crate::nmf::{fit_nmf, NmfFit, NmfInit, NmfMethod, NmfStart};
use crate::profile::{aggregate_topic_profiles, TopicProfiles};
use crate::reference::{MarkerGenes, ReferenceDataset, SpotMatrix};
use crate::scale::Transform;

use fnv::FnvHashMap as HashMap;
use matrix_util::dmatrix_util::concatenate_horizontal;
use matrix_util::nnls::NnlsDesign;
use rand::Rng;
use rayon::prelude::*;
use serde::Serialize;

/// Everything inference needs, fixed once training is done. Share it
/// by reference across threads.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    genes: Vec<Box<str>>,
    gene_index: HashMap<Box<str>, usize>,
    fit: NmfFit,
    profiles: TopicProfiles,
    transform: Transform,
    method: NmfMethod,
    num_training_cells: usize,
    // spot expression -> topic usage, design W
    projector: NnlsDesign,
    // topic usage -> cell-type weights, design profiles'
    deconvolver: NnlsDesign,
}

/// Spots laid out on the trained genes
#[derive(Debug, Clone)]
pub struct AlignedSpots {
    /// trained genes x spots; genes the spot matrix lacks are zero
    pub mat: Mat,
    /// number of trained genes with positive expression per spot
    pub overlap: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary<'a> {
    pub num_genes: usize,
    pub num_topics: usize,
    pub num_training_cells: usize,
    pub cell_types: &'a [Box<str>],
    pub method: NmfMethod,
    pub transform: Transform,
    pub converged: bool,
    pub iterations: usize,
    pub reconstruction_error: f64,
    pub genes: &'a [Box<str>],
}

impl TrainedModel {
    /// Assemble a model from already-fitted factors
    ///
    /// * `genes` - rows of the basis
    /// * `fit` - factorization of the training matrix
    /// * `profiles` - cell types x topics, in the coordinates of the
    ///   basis `W`
    /// * `transform` - applied to every spot before projection
    pub fn from_parts(
        genes: Vec<Box<str>>,
        fit: NmfFit,
        profiles: TopicProfiles,
        transform: Transform,
        method: NmfMethod,
    ) -> Result<Self> {
        if genes.len() != fit.basis.nrows() {
            return Err(DeconvError::dimension_mismatch(format!(
                "{} genes for a basis with {} rows",
                genes.len(),
                fit.basis.nrows()
            )));
        }
        if profiles.num_topics() != fit.basis.ncols() {
            return Err(DeconvError::dimension_mismatch(format!(
                "profiles over {} topics, basis has {}",
                profiles.num_topics(),
                fit.basis.ncols()
            )));
        }

        let gene_index = genes
            .iter()
            .enumerate()
            .map(|(i, g)| (g.clone(), i))
            .collect::<HashMap<_, _>>();

        let projector = NnlsDesign::new(fit.basis.clone());
        let deconvolver = NnlsDesign::new(profiles.profiles.transpose());
        let num_training_cells = fit.coef.ncols();

        Ok(Self {
            genes,
            gene_index,
            fit,
            profiles,
            transform,
            method,
            num_training_cells,
            projector,
            deconvolver,
        })
    }

    pub fn genes(&self) -> &[Box<str>] {
        &self.genes
    }

    pub fn num_genes(&self) -> usize {
        self.genes.len()
    }

    pub fn cell_types(&self) -> &[Box<str>] {
        &self.profiles.cell_types
    }

    pub fn num_topics(&self) -> usize {
        self.fit.basis.ncols()
    }

    /// W, genes x topics
    pub fn basis(&self) -> &Mat {
        &self.fit.basis
    }

    /// H, topics x training cells
    pub fn coef(&self) -> &Mat {
        &self.fit.coef
    }

    pub fn profiles(&self) -> &TopicProfiles {
        &self.profiles
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn method(&self) -> NmfMethod {
        self.method
    }

    pub fn converged(&self) -> bool {
        self.fit.converged
    }

    pub fn iterations(&self) -> usize {
        self.fit.iterations
    }

    pub fn residual_trace(&self) -> &[f64] {
        &self.fit.residual_trace
    }

    pub fn reconstruction_error(&self) -> f64 {
        self.fit.final_residual()
    }

    pub fn projector(&self) -> &NnlsDesign {
        &self.projector
    }

    pub fn deconvolver(&self) -> &NnlsDesign {
        &self.deconvolver
    }

    /// Put spot counts on the trained gene order. Missing genes are
    /// zero, extra genes are dropped.
    pub fn align_spots(&self, spots: &SpotMatrix) -> AlignedSpots {
        let nspots = spots.num_spots();
        let mut mat = Mat::zeros(self.num_genes(), nspots);

        let matched: Vec<(usize, usize)> = spots
            .genes()
            .iter()
            .enumerate()
            .filter_map(|(src, g)| self.gene_index.get(g).map(|&tgt| (src, tgt)))
            .collect();

        debug!(
            "{} of {} spot genes found among {} trained genes",
            matched.len(),
            spots.genes().len(),
            self.num_genes()
        );

        let counts = spots.counts();
        for &(src, tgt) in matched.iter() {
            for j in 0..nspots {
                mat[(tgt, j)] = counts[(src, j)];
            }
        }

        let overlap = mat
            .column_iter()
            .map(|col| col.iter().filter(|&&x| x > 0.0).count())
            .collect();

        AlignedSpots { mat, overlap }
    }

    pub fn summary(&self) -> ModelSummary<'_> {
        ModelSummary {
            num_genes: self.num_genes(),
            num_topics: self.num_topics(),
            num_training_cells: self.num_training_cells,
            cell_types: self.cell_types(),
            method: self.method,
            transform: self.transform,
            converged: self.converged(),
            iterations: self.iterations(),
            reconstruction_error: self.reconstruction_error(),
            genes: &self.genes,
        }
    }
}

/// Downsample, normalize, factorize and aggregate
///
/// # Arguments
/// * `reference` - single-cell reference with a label field
/// * `markers` - marker genes per cluster
/// * `config` - training parameters
/// * `rng` - the only source of randomness (cell sampling and NMF
///   initialization)
pub fn train_model<R>(
    reference: &ReferenceDataset,
    markers: &MarkerGenes,
    config: &DeconvConfig,
    rng: &mut R,
) -> Result<TrainedModel>
where
    R: Rng + ?Sized,
{
    config.validate()?;

    let sub = downsample_reference(
        reference,
        markers,
        &DownsampleArgs {
            label_field: &config.label_field,
            cl_n: config.cl_n,
            hvg: config.hvg,
            ntop: config.ntop,
        },
        rng,
    )?;

    let cell_types: Vec<&str> = {
        let mut types: Vec<&str> = sub.labels.iter().map(|x| x.as_ref()).collect();
        types.sort_unstable();
        types.dedup();
        types
    };
    let rank = cell_types.len();

    // topic t starts on cell type t
    let groups: Vec<usize> = sub
        .labels
        .iter()
        .map(|x| cell_types.binary_search(&x.as_ref()).unwrap_or(0))
        .collect();

    info!(
        "training {:?} NMF with {} topics on {} genes x {} cells",
        config.method,
        rank,
        sub.num_genes(),
        sub.num_cells()
    );

    let vv = config.transf.apply_owned(sub.counts);
    let init = match config.init {
        NmfStart::Labels => NmfInit::Groups(&groups),
        NmfStart::Nndsvd => NmfInit::Nndsvd,
    };
    let fit = fit_nmf(vv.clone(), &config.nmf_params(rank), init, rng)?;

    let profiles = match config.method {
        NmfMethod::Standard => aggregate_topic_profiles(&fit.coef, &sub.labels)?,
        NmfMethod::Nonsmooth => {
            // spots are projected on W, so the cells are too
            let design = NnlsDesign::new(fit.basis.clone());
            let topics = project_columns(&design, &vv, config.nnls_max_iter)?;
            aggregate_topic_profiles(&topics, &sub.labels)?
        }
    };

    TrainedModel::from_parts(sub.genes, fit, profiles, config.transf, config.method)
}

/// Non-negative topic usage of every column of `vv` on `design`
///
/// * `design` - genes x topics
/// * `vv` - genes x cells, already transformed
/// * `max_iter` - NNLS budget per column
pub fn project_columns(design: &NnlsDesign, vv: &Mat, max_iter: Option<usize>) -> Result<Mat> {
    let topics = (0..vv.ncols())
        .into_par_iter()
        .map(|j| {
            design
                .solve(&vv.column(j).into_owned(), max_iter)
                .map(|out| out.x)
        })
        .collect::<anyhow::Result<Vec<DVec>>>()
        .map_err(|e| DeconvError::Numerical(e.to_string()))?;

    concatenate_horizontal(&topics).map_err(|e| DeconvError::Numerical(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_model() -> TrainedModel {
        let basis = Mat::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let fit = NmfFit {
            basis,
            coef: Mat::identity(2, 2),
            smoothing: Mat::identity(2, 2),
            converged: true,
            iterations: 1,
            residual_trace: vec![0.0],
        };
        let profiles = TopicProfiles {
            cell_types: vec!["a".into(), "b".into()],
            profiles: Mat::identity(2, 2),
        };
        TrainedModel::from_parts(
            vec!["g0".into(), "g1".into(), "g2".into()],
            fit,
            profiles,
            Transform::None,
            NmfMethod::Standard,
        )
        .unwrap()
    }

    #[test]
    fn spots_are_aligned_on_trained_genes() {
        let model = toy_model();
        let spots = SpotMatrix::new(
            Mat::from_row_slice(3, 2, &[5.0, 0.0, 7.0, 0.0, 1.0, 0.0]),
            vec!["g2".into(), "other".into(), "g0".into()],
            vec!["s0".into(), "s1".into()],
        )
        .unwrap();

        let aligned = model.align_spots(&spots);
        assert_eq!(aligned.mat.shape(), (3, 2));
        assert_eq!(aligned.mat[(0, 0)], 1.0);
        assert_eq!(aligned.mat[(1, 0)], 0.0);
        assert_eq!(aligned.mat[(2, 0)], 5.0);
        assert_eq!(aligned.overlap, vec![2, 0]);
    }

    #[test]
    fn parts_must_line_up() {
        let model = toy_model();
        let fit = NmfFit {
            basis: Mat::zeros(3, 2),
            coef: Mat::zeros(2, 1),
            smoothing: Mat::identity(2, 2),
            converged: true,
            iterations: 0,
            residual_trace: vec![],
        };
        assert!(matches!(
            TrainedModel::from_parts(
                vec!["g0".into()],
                fit,
                model.profiles().clone(),
                Transform::None,
                NmfMethod::Standard,
            ),
            Err(DeconvError::DimensionMismatch(_))
        ));
        assert_eq!(model.summary().cell_types.len(), 2);
    }

    #[test]
    fn columns_are_projected_in_order() {
        let basis = Mat::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let coords = Mat::from_row_slice(2, 3, &[1.0, 0.0, 2.0, 0.5, 3.0, 0.0]);
        let vv = &basis * &coords;

        let topics = project_columns(&NnlsDesign::new(basis), &vv, None).unwrap();
        assert_eq!(topics.shape(), (2, 3));
        for (x, y) in topics.iter().zip(coords.iter()) {
            assert!((x - y).abs() < 1e-10);
        }
    }
}
