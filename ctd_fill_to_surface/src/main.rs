
// USAGE cargo run --release -- /path/to/dy1707c001_ctd.nc 5

use anyhow::{Context, Result};
use clap::Parser;
use epic_nc::{edit::surface_fill, init_logging, timeit};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(about = "Copy every CTD field at a chosen depth up to the surface")]
struct Cli {
    /// EPIC CTD file, edited in place
    ctd_file: PathBuf,
    /// Depth (dbar) whose values are carried up to the surface
    depth: f64,
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let filled = timeit("surface_fill", || surface_fill(&cli.ctd_file, cli.depth))
        .with_context(|| format!("filling {} from {}", cli.ctd_file.display(), cli.depth))?;
    debug!(?filled, "rewritten fields");
    info!("Finished OK, filled {} fields from {} to the surface", filled.len(), cli.depth);
    Ok(())
}
