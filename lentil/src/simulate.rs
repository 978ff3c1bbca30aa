use crate::common::*;
use crate::reference::{MarkerGenes, ReferenceDataset, SpotMatrix};

use indicatif::ParallelProgressIterator;
use matrix_util::dmatrix_util::concatenate_horizontal;
use matrix_util::utils::partition_by_membership;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{weighted::WeightedIndex, Distribution, Gamma, Poisson};
use rayon::prelude::*;

#[derive(Debug, Clone)]
pub struct SimReferenceArgs {
    pub n_types: usize,
    pub cells_per_type: usize,
    /// marker genes of each type (disjoint blocks)
    pub markers_per_type: usize,
    /// genes shared by all types
    pub background_genes: usize,
    /// expected count of a marker gene in its own type
    pub marker_rate: f64,
    /// expected count of a background gene
    pub background_rate: f64,
}

impl Default for SimReferenceArgs {
    fn default() -> Self {
        Self {
            n_types: 5,
            cells_per_type: 100,
            markers_per_type: 20,
            background_genes: 100,
            marker_rate: 10.0,
            background_rate: 1.0,
        }
    }
}

pub struct SimulatedReference {
    /// labels under `DEFAULT_LABEL_FIELD`
    pub reference: ReferenceDataset,
    pub markers: MarkerGenes,
    /// genes x types, expected counts
    pub type_means: Mat,
    pub cell_types: Vec<Box<str>>,
}

pub struct SimulatedSpots {
    pub spots: SpotMatrix,
    /// spots x types, fraction of cells drawn from each type
    pub proportions: Mat,
    pub cell_types: Vec<Box<str>>,
}

pub fn type_name(t: usize) -> Box<str> {
    format!("type_{}", t).into_boxed_str()
}

fn poisson<R: Rng + ?Sized>(lambda: f64, rng: &mut R) -> anyhow::Result<f64> {
    if lambda <= 0.0 {
        return Ok(0.0);
    }
    Ok(Poisson::new(lambda)?.sample(rng))
}

/// Reference with one disjoint block of marker genes per cell type
/// followed by background genes, Poisson counts
pub fn simulate_reference<R>(
    args: &SimReferenceArgs,
    rng: &mut R,
) -> anyhow::Result<SimulatedReference>
where
    R: Rng + ?Sized,
{
    if args.n_types == 0 || args.cells_per_type == 0 {
        anyhow::bail!("need at least one cell type and one cell per type");
    }

    let n_marker_genes = args.n_types * args.markers_per_type;
    let ngenes = n_marker_genes + args.background_genes;
    let ncells = args.n_types * args.cells_per_type;

    let type_means = Mat::from_fn(ngenes, args.n_types, |g, t| {
        if g >= n_marker_genes {
            args.background_rate
        } else if g / args.markers_per_type == t {
            args.marker_rate
        } else {
            0.0
        }
    });

    // per-cell sequencing depth around one
    let depth = Gamma::new(10.0, 0.1)?;

    let mut counts = Mat::zeros(ngenes, ncells);
    let mut labels = Vec::with_capacity(ncells);

    for j in 0..ncells {
        let t = j / args.cells_per_type;
        let d = depth.sample(rng);
        for g in 0..ngenes {
            counts[(g, j)] = poisson(type_means[(g, t)] * d, rng)?;
        }
        labels.push(type_name(t));
    }

    let genes: Vec<Box<str>> = (0..ngenes)
        .map(|g| {
            if g < n_marker_genes {
                format!("marker_{}", g).into_boxed_str()
            } else {
                format!("gene_{}", g).into_boxed_str()
            }
        })
        .collect();

    let cells: Vec<Box<str>> = (0..ncells)
        .map(|j| format!("cell_{}", j).into_boxed_str())
        .collect();

    let markers = MarkerGenes::from_pairs(
        (0..n_marker_genes).map(|g| (type_name(g / args.markers_per_type), genes[g].clone())),
    );

    let reference = ReferenceDataset::new(counts, genes, cells)?
        .with_annotation(DEFAULT_LABEL_FIELD, labels)?;

    info!(
        "simulated reference: {} genes x {} cells, {} types",
        ngenes, ncells, args.n_types
    );

    Ok(SimulatedReference {
        reference,
        markers,
        type_means,
        cell_types: (0..args.n_types).map(type_name).collect(),
    })
}

/// Mix reference cells into spots
///
/// # Arguments
/// * `reference` - cells to draw from
/// * `label_field` - annotation with the cell types
/// * `n_spots` - number of spots
/// * `cells_per_spot` - cells summed into each spot
/// * `rseed` - spot `s` uses the seed `rseed + s`
///
/// Each spot draws type weights from normalized Gamma(1,1) variables,
/// then cells by type; the true proportions are the realized type
/// fractions.
pub fn simulate_spots(
    reference: &ReferenceDataset,
    label_field: &str,
    n_spots: usize,
    cells_per_spot: usize,
    rseed: u64,
) -> anyhow::Result<SimulatedSpots> {
    if n_spots == 0 {
        anyhow::bail!("n_spots must be positive");
    }

    let labels = reference.labels(label_field)?;

    let mut rng = StdRng::seed_from_u64(rseed);
    let groups = partition_by_membership(labels, None, &mut rng);
    let cell_types: Vec<Box<str>> = groups.keys().cloned().collect();
    let type_cells: Vec<&Vec<usize>> = groups.values().collect();
    let ntypes = cell_types.len();

    if ntypes == 0 || cells_per_spot == 0 {
        anyhow::bail!("need cell types and at least one cell per spot");
    }

    let counts = reference.counts();

    info!("simulating {} spots of {} cells", n_spots, cells_per_spot);

    let simulated = (0..n_spots)
        .into_par_iter()
        .progress_count(n_spots as u64)
        .map(|s| -> anyhow::Result<(DVec, DVec)> {
            let mut rng = StdRng::seed_from_u64(rseed + s as u64);

            let w = Mat::rgamma_with(ntypes, 1, (1.0, 1.0), &mut rng)?;
            let pick_type = WeightedIndex::new(w.iter())?;

            let mut x = DVec::zeros(counts.nrows());
            let mut ncells = DVec::zeros(ntypes);

            for _ in 0..cells_per_spot {
                let t = pick_type.sample(&mut rng);
                let cells = type_cells[t];
                let j = cells[rng.random_range(0..cells.len())];
                x += counts.column(j);
                ncells[t] += 1.0;
            }

            Ok((x, ncells))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let (columns, ncells): (Vec<DVec>, Vec<DVec>) = simulated.into_iter().unzip();

    let spot_counts = concatenate_horizontal(&columns)?;
    let proportions = concatenate_horizontal(&ncells)?
        .sum_to_one_columns()
        .transpose();

    let spot_names: Vec<Box<str>> = (0..n_spots)
        .map(|s| format!("spot_{}", s).into_boxed_str())
        .collect();

    let spots = SpotMatrix::new(spot_counts, reference.genes().to_vec(), spot_names)?;

    Ok(SimulatedSpots {
        spots,
        proportions,
        cell_types,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn reference_has_disjoint_marker_blocks() -> anyhow::Result<()> {
        let args = SimReferenceArgs {
            n_types: 3,
            cells_per_type: 4,
            markers_per_type: 2,
            background_genes: 1,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let sim = simulate_reference(&args, &mut rng)?;

        assert_eq!(sim.reference.num_genes(), 7);
        assert_eq!(sim.reference.num_cells(), 12);
        assert_eq!(sim.markers.top_union(None).len(), 6);
        assert_eq!(sim.markers.top_union(Some(1)).len(), 3);
        // type 0 cells never express type 1 markers
        for j in 0..4 {
            assert_eq!(sim.reference.counts()[(2, j)], 0.0);
            assert_eq!(sim.reference.counts()[(3, j)], 0.0);
        }
        Ok(())
    }

    #[test]
    fn spot_fractions_sum_to_one() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(1);
        let sim = simulate_reference(&SimReferenceArgs::default(), &mut rng)?;
        let spots = simulate_spots(&sim.reference, DEFAULT_LABEL_FIELD, 6, 10, 42)?;

        assert_eq!(spots.spots.num_spots(), 6);
        assert_eq!(spots.proportions.shape(), (6, 5));
        for row in spots.proportions.row_iter() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }

        let again = simulate_spots(&sim.reference, DEFAULT_LABEL_FIELD, 6, 10, 42)?;
        assert_eq!(spots.spots.counts(), again.spots.counts());
        Ok(())
    }

    #[test]
    fn zero_spots_is_an_error() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(1);
        let sim = simulate_reference(&SimReferenceArgs::default(), &mut rng)?;
        let err = simulate_spots(&sim.reference, DEFAULT_LABEL_FIELD, 0, 10, 42)
            .err()
            .map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("n_spots must be positive"));
        Ok(())
    }
}
