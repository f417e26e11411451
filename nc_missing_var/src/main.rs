
// USAGE cargo run --release -- /path/to/dy1707c001_ctd.nc O_65

use anyhow::{Context, Result};
use clap::Parser;
use epic_nc::{init_logging, EpicError, EpicWriter, MISSING_VALUE};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(about = "Replace an EPIC variable with 1e35 at all depths")]
struct Cli {
    /// EPIC netCDF file, edited in place
    file: PathBuf,
    /// EPIC key of the variable to blank
    variable: String,
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut nc = EpicWriter::append(&cli.file)
        .with_context(|| format!("opening {}", cli.file.display()))?;

    match nc.replace_variable(&cli.variable, MISSING_VALUE) {
        Ok(()) => {
            nc.append_history(&format!("Removed {} from datastream", cli.variable))?;
            info!(file = %cli.file.display(), variable = %cli.variable, "blanked variable");
        }
        Err(EpicError::MissingVariable(name)) => {
            warn!(file = %cli.file.display(), variable = %name, "variable not in file, nothing to do");
        }
        Err(e) => return Err(e).with_context(|| format!("blanking {}", cli.variable)),
    }
    nc.close()?;
    Ok(())
}
