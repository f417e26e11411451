
// USAGE cargo run --release -- /path/to/ctd/ O_65 epickey.yaml

use anyhow::{Context, Result};
use clap::Parser;
use epic_nc::{edit::add_variable, init_logging, load_schema, paths::list_nc_files, timeit, EpicError};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(about = "Add an EPIC variable (all 1e35) to every .nc file in a directory")]
struct Cli {
    /// Directory of EPIC netCDF files, edited in place
    sourcedir: PathBuf,
    /// EPIC key of the variable to add, e.g. O_65
    variable: String,
    /// EPIC variable config holding the key (.json, .pyini, .yaml)
    config: PathBuf,
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let schema = timeit("load_schema", || load_schema(&cli.config))
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let desc = schema
        .get(&cli.variable)
        .with_context(|| format!("{} is not in {}", cli.variable, cli.config.display()))?;
    let files = timeit("list_nc", || list_nc_files(&cli.sourcedir, ".nc"))?;

    let mut added = 0;
    for path in &files {
        match add_variable(path, desc) {
            Ok(()) => {
                added += 1;
                info!(file = %path.display(), variable = %desc.key, "added variable");
            }
            Err(e @ (EpicError::VariableExists(_) | EpicError::MissingDimension(_))) => {
                warn!(file = %path.display(), error = %e, "not added");
            }
            Err(e) => return Err(e).with_context(|| format!("adding {} to {}", desc.key, path.display())),
        }
    }
    info!("Finished OK, added {} to {added} of {} files", desc.key, files.len());
    Ok(())
}
