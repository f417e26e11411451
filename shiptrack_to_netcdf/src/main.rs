
// USAGE cargo run --release -- /path/to/scs/NAV/ shiptrack_config.yaml

use anyhow::{bail, Context, Result};
use clap::Parser;
use epic_nc::{
    gps::{list_gpgga_files, read_track, write_track, TRACK_FILE_NAME},
    init_logging, load_schema, timeit,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Convert SCS GPGGA gps files to a ship-track netCDF file")]
struct Cli {
    /// Directory holding the *GPGGA* logs; shiptrack.nc is written here
    inpath: PathBuf,
    /// EPIC variable config for time/latitude/longitude (.json, .pyini, .yaml)
    config: PathBuf,
    /// Replace an existing shiptrack.nc
    #[arg(long)]
    overwrite: bool,
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let schema = timeit("load_schema", || load_schema(&cli.config))
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let files = timeit("list_gpgga", || list_gpgga_files(&cli.inpath))?;
    if files.is_empty() {
        bail!("no GPGGA files under {}", cli.inpath.display());
    }

    // parse in parallel, write once
    let track = timeit("parse_gpgga", || read_track(&files));
    info!(files = files.len(), fixes = track.len(), "parsed ship track");

    let out = cli.inpath.join(TRACK_FILE_NAME);
    let summary = timeit("write_netcdf", || write_track(&out, &schema, &track, cli.overwrite))
        .with_context(|| format!("writing {}", out.display()))?;
    info!("Finished OK, wrote {} fixes → {} (NaN fields: {:?})", track.len(), out.display(), summary.filled);
    Ok(())
}
