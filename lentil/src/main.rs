mod fit_deconv;
mod sim_deconv;

use clap::{Parser, Subcommand};
use fit_deconv::*;
use sim_deconv::*;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "LENTIL",
    long_about = "Learn cell-type topics from a single-cell reference by NMF\n\
		  and deconvolve spatial spots into cell-type proportions\n\
		  by non-negative least squares."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Deconvolve spatial spots with a single-cell reference",
        long_about = "Deconvolve spatial spots in the four stages: \n\
		      (1) Downsample the reference to at most `cl_n` cells per type\n\
		      (2) Keep marker genes and highly variable genes\n\
		      (3) Factorize the reference into topics (NMF)\n\
		      (4) Project every spot onto the topics and decompose\n\
		      the topic usage into cell-type proportions (NNLS).\n"
    )]
    Deconv(DeconvArgs),

    #[command(
        about = "Simulate a reference and mixed spots",
        long_about = "Simulate a single-cell reference with disjoint marker genes\n\
		      and spots that mix random cells of the reference.\n\
		      The true proportions are written along with the data.\n"
    )]
    Simulate(SimDeconvArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Deconv(args) => {
            fit_deconv(args)?;
        }
        Commands::Simulate(args) => {
            sim_deconv(args)?;
        }
    }

    Ok(())
}
