use clap::Args;
use lentil::common::*;
use lentil::config::DeconvConfig;
use lentil::deconv::deconvolve_spots;
use lentil::model::train_model;
use lentil::nmf::{NmfMethod, NmfStart};
use lentil::reference::{MarkerGenes, ReferenceDataset, SpotMatrix};
use lentil::scale::Transform;

use matrix_util::common_io::{mkdir, write_types};
use matrix_util::membership::{detect_delimiter, Membership};
use matrix_util::traits::MatWithNames;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::ThreadPoolBuilder;
use std::io::Write;

#[derive(Args, Debug)]
pub struct DeconvArgs {
    /// reference counts, genes x cells (`.tsv`, `.csv`, optionally
    /// `.gz`); the header names the cells, the first column the genes
    #[arg(short = 'r', long, required = true)]
    reference: Box<str>,

    /// two columns: cell name and cell type
    #[arg(short = 'l', long, required = true)]
    labels: Box<str>,

    /// two columns: cluster and marker gene, best markers first
    #[arg(short = 'm', long, required = true)]
    markers: Box<str>,

    /// spot counts, genes x spots, same layout as the reference
    #[arg(short = 's', long, required = true)]
    spots: Box<str>,

    /// output header
    #[arg(short, long, required = true)]
    out: Box<str>,

    /// JSON file with all the parameters below (overrides them)
    #[arg(long)]
    config: Option<Box<str>>,

    /// maximum number of cells per cell type
    #[arg(long, default_value_t = DEFAULT_CL_N)]
    cl_n: usize,

    /// number of highly variable genes added to the markers
    #[arg(long, default_value_t = DEFAULT_HVG)]
    hvg: usize,

    /// marker genes per cluster (all if not given)
    #[arg(long)]
    ntop: Option<usize>,

    /// per-cell/per-spot transformation
    #[arg(long, value_enum, default_value = "uv")]
    transf: Transform,

    /// factorization method
    #[arg(
        long,
        value_enum,
        default_value = "nonsmooth",
        long_help = "Factorization method.\n\
		     standard: V ≈ W H\n\
		     nonsmooth: V ≈ W S H with S = (1-θ) I + θ/k 1 1'"
    )]
    method: NmfMethod,

    /// starting point of the factorization
    #[arg(
        long,
        value_enum,
        default_value = "labels",
        long_help = "Starting point of the factorization.\n\
		     labels: topic t starts at the mean of cell type t\n\
		     nndsvd: non-negative double SVD of the training matrix"
    )]
    init: NmfStart,

    /// minimum proportion kept for a cell type in a spot
    #[arg(long, default_value_t = 0.0)]
    min_cont: f64,

    /// smoothing θ of the nonsmooth factorization
    #[arg(long, default_value_t = DEFAULT_NSNMF_THETA)]
    theta: f64,

    /// maximum number of NMF iterations
    #[arg(long, short = 'i', default_value_t = DEFAULT_MAX_ITER)]
    max_iter: usize,

    /// stop when the relative decrease of the residual falls below
    #[arg(long, default_value_t = DEFAULT_TOL)]
    tol: f64,

    /// NNLS iteration budget (3 x #columns if not given)
    #[arg(long)]
    nnls_max_iter: Option<usize>,

    /// block_size (# spots) for parallel processing
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// random seed
    #[arg(long, default_value_t = 42)]
    rseed: u64,

    /// maximum number of threads
    #[arg(long, default_value_t = 16)]
    max_threads: usize,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

impl DeconvArgs {
    fn to_config(&self) -> anyhow::Result<DeconvConfig> {
        let config = match self.config.as_deref() {
            Some(file) => {
                info!("reading parameters from {}", file);
                DeconvConfig::from_json_file(file)?
            }
            None => DeconvConfig {
                label_field: DEFAULT_LABEL_FIELD.into(),
                cl_n: self.cl_n,
                hvg: self.hvg,
                ntop: self.ntop,
                transf: self.transf,
                method: self.method,
                init: self.init,
                min_cont: self.min_cont,
                theta: self.theta,
                max_iter: self.max_iter,
                tol: self.tol,
                nnls_max_iter: self.nnls_max_iter,
                block_size: self.block_size,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

fn read_named_matrix(file: &str) -> anyhow::Result<MatWithNames<Mat>> {
    let ret = Mat::read_names_delim(file, detect_delimiter(file))?;
    info!(
        "read {} x {} matrix from {}",
        ret.mat.nrows(),
        ret.mat.ncols(),
        file
    );
    Ok(ret)
}

/// Attach cell types to the reference, dropping unlabelled cells
fn read_reference(args: &DeconvArgs, label_field: &str) -> anyhow::Result<ReferenceDataset> {
    let MatWithNames {
        rows: genes,
        cols: cells,
        mat,
    } = read_named_matrix(&args.reference)?;

    let membership = Membership::from_file(&args.labels, 0, 1)?;
    let (matched, stats) = membership.match_keys(&cells);

    info!(
        "cell types found for {} of {} cells",
        stats.matched,
        cells.len()
    );

    if stats.matched == 0 {
        return Err(anyhow::anyhow!(
            "no cell in {} has a label in {}",
            args.reference,
            args.labels
        ));
    }

    let keep: Vec<usize> = matched
        .iter()
        .enumerate()
        .filter_map(|(j, x)| x.as_ref().map(|_| j))
        .collect();

    if stats.unmatched > 0 {
        warn!("dropping {} unlabelled cells", stats.unmatched);
    }

    let labels: Vec<Box<str>> = matched.into_iter().flatten().collect();
    let cells: Vec<Box<str>> = keep.iter().map(|&j| cells[j].clone()).collect();
    let mat = mat.select_columns(&keep);

    Ok(ReferenceDataset::new(mat, genes, cells)?.with_annotation(label_field, labels)?)
}

pub fn fit_deconv(args: &DeconvArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let max_threads = num_cpus::get().min(args.max_threads).max(1);
    ThreadPoolBuilder::new()
        .num_threads(max_threads)
        .build_global()?;
    info!("will use {} threads", rayon::current_num_threads());

    mkdir(&args.out)?;

    let config = args.to_config()?;

    // 1. read inputs
    let reference = read_reference(args, &config.label_field)?;
    let markers = MarkerGenes::from_file(&args.markers)?;
    if markers.is_empty() {
        return Err(anyhow::anyhow!("no marker gene in {}", args.markers));
    }

    let MatWithNames {
        rows: spot_genes,
        cols: spot_names,
        mat: spot_mat,
    } = read_named_matrix(&args.spots)?;
    let spots = SpotMatrix::new(spot_mat, spot_genes, spot_names)?;

    // 2. train
    let mut rng = StdRng::seed_from_u64(args.rseed);
    let model = train_model(&reference, &markers, &config, &mut rng)?;

    // 3. deconvolve
    let result = deconvolve_spots(&model, &spots, &config.inference())?;

    // 4. write
    let prop_file = format!("{}.proportions.tsv.gz", args.out);
    let basis_file = format!("{}.basis.tsv.gz", args.out);
    let profile_file = format!("{}.topic_profiles.tsv.gz", args.out);
    let invalid_file = format!("{}.invalid_spots.gz", args.out);
    let model_file = format!("{}.model.json", args.out);

    result
        .proportions()
        .to_tsv_with_names(&result.spots, &result.column_names(), &prop_file)?;

    let topics: Vec<Box<str>> = (0..model.num_topics())
        .map(|t| format!("topic_{}", t).into_boxed_str())
        .collect();

    model
        .basis()
        .to_tsv_with_names(model.genes(), &topics, &basis_file)?;

    model.profiles().profiles.to_tsv_with_names(
        model.cell_types(),
        &topics,
        &profile_file,
    )?;

    let invalid: Vec<String> = result
        .spots
        .iter()
        .zip(result.rows.iter())
        .filter_map(|(s, r)| r.as_ref().err().map(|e| format!("{}\t{}", s, e)))
        .collect();

    if !invalid.is_empty() {
        write_types(&invalid, &invalid_file)?;
    }

    let mut writer = matrix_util::common_io::open_buf_writer(&model_file)?;
    serde_json::to_writer_pretty(
        &mut writer,
        &serde_json::json!({
            "model": model.summary(),
            "config": config,
            "num_spots": result.spots.len(),
            "num_invalid_spots": result.num_invalid(),
        }),
    )?;
    writer.flush()?;

    info!("done");
    Ok(())
}
