use clap::Args;
use lentil::common::*;
use lentil::simulate::{simulate_reference, simulate_spots, SimReferenceArgs};

use matrix_util::common_io::{mkdir, write_lines};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Args, Debug)]
pub struct SimDeconvArgs {
    /// number of cell types
    #[arg(short = 'k', long, default_value_t = 5)]
    n_types: usize,

    /// number of reference cells per cell type
    #[arg(short = 'c', long, default_value_t = 100)]
    cells_per_type: usize,

    /// marker genes per cell type
    #[arg(long, default_value_t = 20)]
    markers_per_type: usize,

    /// genes expressed by every cell type
    #[arg(long, default_value_t = 100)]
    background_genes: usize,

    /// expected count of a marker gene in its own cell type
    #[arg(long, default_value_t = 10.0)]
    marker_rate: f64,

    /// expected count of a background gene
    #[arg(long, default_value_t = 1.0)]
    background_rate: f64,

    /// number of spots
    #[arg(short = 'n', long, default_value_t = 100)]
    n_spots: usize,

    /// number of cells mixed into each spot
    #[arg(long, default_value_t = 10)]
    cells_per_spot: usize,

    /// random seed
    #[arg(short, long, default_value_t = 42)]
    rseed: u64,

    /// output file header
    #[arg(short, long, required = true)]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

pub fn sim_deconv(args: &SimDeconvArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    mkdir(&args.out)?;

    // 1. reference cells with disjoint marker blocks
    let mut rng = StdRng::seed_from_u64(args.rseed);
    let sim = simulate_reference(
        &SimReferenceArgs {
            n_types: args.n_types,
            cells_per_type: args.cells_per_type,
            markers_per_type: args.markers_per_type,
            background_genes: args.background_genes,
            marker_rate: args.marker_rate,
            background_rate: args.background_rate,
        },
        &mut rng,
    )?;

    // 2. spots mixed from the reference cells
    let spots = simulate_spots(
        &sim.reference,
        DEFAULT_LABEL_FIELD,
        args.n_spots,
        args.cells_per_spot,
        args.rseed,
    )?;

    // 3. write everything in the layout `lentil deconv` reads
    let reference = &sim.reference;
    reference.counts().to_tsv_with_names(
        reference.genes(),
        reference.cells(),
        &format!("{}.reference.tsv.gz", args.out),
    )?;

    let label_lines: Vec<Box<str>> = reference
        .cells()
        .iter()
        .zip(reference.labels(DEFAULT_LABEL_FIELD)?)
        .map(|(c, k)| format!("{}\t{}", c, k).into_boxed_str())
        .collect();
    write_lines(&label_lines, &format!("{}.labels.tsv.gz", args.out))?;

    let marker_lines: Vec<Box<str>> = sim
        .cell_types
        .iter()
        .flat_map(|k| {
            sim.markers
                .get(k)
                .unwrap_or_default()
                .iter()
                .map(move |g| format!("{}\t{}", k, g).into_boxed_str())
        })
        .collect();
    write_lines(&marker_lines, &format!("{}.markers.tsv.gz", args.out))?;

    spots.spots.counts().to_tsv_with_names(
        spots.spots.genes(),
        spots.spots.spots(),
        &format!("{}.spots.tsv.gz", args.out),
    )?;

    spots.proportions.to_tsv_with_names(
        spots.spots.spots(),
        &spots.cell_types,
        &format!("{}.proportions.tsv.gz", args.out),
    )?;

    info!("done");
    Ok(())
}
