//! Per-spot inference: project a spot onto the topic space, then
//! decompose the topic vector into cell-type weights.
//!
//! The residual of a row is the share of the topic vector that the
//! cell-type profiles cannot explain, `r = ||h - P'w||² / ||h||²`.
//! Cell-type proportions take the rest, `(1 - r) w / Σw`, so every
//! row sums to one.

use crate::common::*;
use crate::config::InferenceParams;
use crate::model::TrainedModel;
use crate::reference::{SpotMatrix, SpotMixtureVector};

use indicatif::ParallelProgressIterator;
use matrix_util::nnls::{NnlsDesign, NnlsOut};
use matrix_util::utils::create_jobs;
use rayon::prelude::*;

/// Topic usage of one spot
#[derive(Debug, Clone)]
pub struct ProjectedSpot {
    pub topics: DVec,
    pub converged: bool,
}

/// Cell-type proportions of one spot plus the residual share
#[derive(Debug, Clone, PartialEq)]
pub struct DeconvolutionRow {
    /// one per cell type, in the model's order
    pub proportions: Vec<f64>,
    pub residual: f64,
    /// both least-squares problems finished within budget
    pub converged: bool,
}

impl DeconvolutionRow {
    pub fn total(&self) -> f64 {
        self.proportions.iter().sum::<f64>() + self.residual
    }
}

fn solve(design: &NnlsDesign, target: &DVec, max_iter: Option<usize>) -> Result<NnlsOut> {
    design
        .solve(target, max_iter)
        .map_err(|e| DeconvError::Numerical(e.to_string()))
}

/// Non-negative topic usage `h` minimizing `||v - W h||`
///
/// * `model` - trained model
/// * `spot` - expression on the trained genes, untransformed
/// * `nnls_max_iter` - solver budget (None: 3 x topics)
pub fn project_spot(
    model: &TrainedModel,
    spot: &SpotMixtureVector,
    nnls_max_iter: Option<usize>,
) -> Result<ProjectedSpot> {
    if spot.values.len() != model.num_genes() {
        return Err(DeconvError::dimension_mismatch(format!(
            "spot {} has {} values, the model has {} genes",
            spot.name,
            spot.values.len(),
            model.num_genes()
        )));
    }

    for (i, &x) in spot.values.iter().enumerate() {
        if !(x.is_finite() && x >= 0.0) {
            return Err(DeconvError::NegativeInput {
                what: spot.name.clone(),
                row: i,
                col: 0,
                value: x,
            });
        }
    }

    if spot.values.iter().all(|&x| x == 0.0) {
        return Err(DeconvError::EmptyOverlap {
            spot: spot.name.clone(),
        });
    }

    let vv = model.transform().apply_vec(&spot.values);
    let out = solve(model.projector(), &vv, nnls_max_iter)?;

    if !out.converged {
        warn!(
            "spot {}: topic projection stopped after {} iterations",
            spot.name, out.iterations
        );
    }

    Ok(ProjectedSpot {
        topics: out.x,
        converged: out.converged,
    })
}

/// Split a topic vector into cell-type proportions and a residual
///
/// * `profiles` - design whose columns are the cell-type topic profiles
/// * `topics` - projected topic usage
/// * `nnls_max_iter` - solver budget
pub fn deconvolve_topics(
    profiles: &NnlsDesign,
    topics: &DVec,
    nnls_max_iter: Option<usize>,
) -> Result<DeconvolutionRow> {
    let ntypes = profiles.ncols();
    let out = solve(profiles, topics, nnls_max_iter)?;

    let hnorm2 = topics.norm_squared();
    let wsum = out.x.sum();

    if !(hnorm2 > 0.0 && wsum > 0.0) {
        return Ok(DeconvolutionRow {
            proportions: vec![0.0; ntypes],
            residual: 1.0,
            converged: out.converged,
        });
    }

    let residual = (out.residual_ss / hnorm2).clamp(0.0, 1.0);
    let explained = 1.0 - residual;

    Ok(DeconvolutionRow {
        proportions: out.x.iter().map(|&w| explained * w / wsum).collect(),
        residual,
        converged: out.converged,
    })
}

/// Zero every proportion below `min_cont` and rescale what is left
/// (including the residual) to sum to one. `min_cont == 0` leaves the
/// row untouched.
pub fn threshold_and_renormalize(mut row: DeconvolutionRow, min_cont: f64) -> DeconvolutionRow {
    if min_cont <= 0.0 {
        return row;
    }

    row.proportions.iter_mut().for_each(|p| {
        if *p < min_cont {
            *p = 0.0;
        }
    });

    let total = row.total();
    if total > 0.0 {
        row.proportions.iter_mut().for_each(|p| *p /= total);
        row.residual /= total;
    } else {
        row.residual = 1.0;
    }
    row
}

/// Project, decompose and threshold one spot
pub fn deconvolve_spot(
    model: &TrainedModel,
    spot: &SpotMixtureVector,
    params: &InferenceParams,
) -> Result<DeconvolutionRow> {
    let projected = project_spot(model, spot, params.nnls_max_iter)?;
    let mut row = deconvolve_topics(
        model.deconvolver(),
        &projected.topics,
        params.nnls_max_iter,
    )?;

    if !row.converged {
        warn!(
            "spot {}: cell-type decomposition hit its iteration cap",
            spot.name
        );
    }
    row.converged &= projected.converged;

    Ok(threshold_and_renormalize(row, params.min_cont))
}

/// Outcome of a batch of spots
#[derive(Debug, Clone)]
pub struct DeconvResult {
    pub cell_types: Vec<Box<str>>,
    pub spots: Vec<Box<str>>,
    /// one outcome per spot, in input order
    pub rows: Vec<Result<DeconvolutionRow>>,
}

impl DeconvResult {
    /// spots x (cell types + residual); failed spots are `NaN` rows
    pub fn proportions(&self) -> Mat {
        let ntypes = self.cell_types.len();
        let mut ret = Mat::from_element(self.rows.len(), ntypes + 1, f64::NAN);

        for (i, row) in self.rows.iter().enumerate() {
            if let Ok(row) = row {
                for (t, &p) in row.proportions.iter().enumerate() {
                    ret[(i, t)] = p;
                }
                ret[(i, ntypes)] = row.residual;
            }
        }
        ret
    }

    /// cell types followed by the residual column
    pub fn column_names(&self) -> Vec<Box<str>> {
        let mut ret = self.cell_types.clone();
        ret.push(RESIDUAL_COLUMN.into());
        ret
    }

    pub fn valid_mask(&self) -> Vec<bool> {
        self.rows.iter().map(|r| r.is_ok()).collect()
    }

    pub fn num_invalid(&self) -> usize {
        self.rows.iter().filter(|r| r.is_err()).count()
    }

    /// number of valid spots whose solvers hit their iteration cap
    pub fn num_unconverged(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| matches!(r, Ok(row) if !row.converged))
            .count()
    }
}

/// Deconvolve every spot in parallel blocks. A failing spot is kept
/// as an `Err` in its own slot; the batch goes on.
///
/// * `model` - trained model, shared read-only
/// * `spots` - genes x spots counts, any gene order
/// * `params` - `min_cont`, solver budget, block size
pub fn deconvolve_spots(
    model: &TrainedModel,
    spots: &SpotMatrix,
    params: &InferenceParams,
) -> Result<DeconvResult> {
    if !(params.min_cont >= 0.0 && params.min_cont < 1.0) {
        return Err(DeconvError::invalid_config(format!(
            "min_cont must be in [0,1), got {}",
            params.min_cont
        )));
    }

    let aligned = model.align_spots(spots);
    let names = spots.spots();

    let no_overlap = aligned.overlap.iter().filter(|&&n| n == 0).count();
    if no_overlap > 0 {
        warn!("{} spots express none of the trained genes", no_overlap);
    }
    let nspots = names.len();
    let block_size = params.block_size.max(1);

    let mut rows: Vec<Result<DeconvolutionRow>> = (0..nspots)
        .map(|_| Err(DeconvError::Numerical("not processed".into())))
        .collect();

    let jobs = create_jobs(nspots, block_size);
    let njobs = jobs.len() as u64;

    rows.par_chunks_mut(block_size)
        .zip(jobs.par_iter())
        .progress_count(njobs)
        .for_each(|(slots, &(lb, ub))| {
            for (slot, j) in slots.iter_mut().zip(lb..ub) {
                let spot = SpotMixtureVector {
                    name: names[j].clone(),
                    values: aligned.mat.column(j).into_owned(),
                };
                *slot = deconvolve_spot(model, &spot, params);
            }
        });

    for (name, row) in names.iter().zip(rows.iter()) {
        if let Err(e) = row {
            warn!("spot {}: {}", name, e);
        }
    }

    let ret = DeconvResult {
        cell_types: model.cell_types().to_vec(),
        spots: names.to_vec(),
        rows,
    };

    info!(
        "deconvolved {} spots: {} invalid, {} hit the solver cap",
        nspots,
        ret.num_invalid(),
        ret.num_unconverged()
    );

    Ok(ret)
}
