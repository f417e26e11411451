
// USAGE cargo run --release -- DY1707 /path/to/dy1707.report_btl /path/to/out/ btl_config.yaml

use anyhow::{Context, Result};
use clap::Parser;
use epic_nc::{
    init_logging, load_schema,
    paths::profile_path,
    profile::{build_profiles, MergedTable, WriteOptions},
    report::read_bottle_report,
    timeit, GlobalAttributes, TimeConvention,
};
use std::path::{Path, PathBuf};
use tracing::info;

const HISTORY: &str = "File created by archiving bottle report files";

#[derive(Parser, Debug)]
#[command(about = "Archive a concatenated SBE bottle report as EPIC netCDF, one file per cast")]
struct Cli {
    /// Cruise ID, e.g. DY1707
    cruise: String,
    /// Bottle files concatenated without headers (.report_btl)
    btlpath: PathBuf,
    /// Output directory
    output: PathBuf,
    /// EPIC variable config (.json, .pyini, .yaml)
    config: PathBuf,
    /// Write a CF "hours since 1900" time axis instead of EPIC time words
    #[arg(long)]
    cf: bool,
    /// Replace existing output files
    #[arg(long)]
    overwrite: bool,
    #[arg(short, long)]
    verbose: bool,
}

// ─────────────────────────────────────────────────────────────────────
// Plain run options
// ─────────────────────────────────────────────────────────────────────
struct Options {
    cruise:    String,
    btlpath:   PathBuf,
    output:    PathBuf,
    config:    PathBuf,
    write:     WriteOptions,
}

impl From<Cli> for Options {
    fn from(cli: Cli) -> Self {
        let convention = if cli.cf { TimeConvention::Cf } else { TimeConvention::Epic };
        Self {
            cruise:  cli.cruise,
            btlpath: cli.btlpath,
            output:  cli.output,
            config:  cli.config,
            write:   WriteOptions { convention, overwrite: cli.overwrite, history: HISTORY.to_string() },
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn run(opts: &Options) -> Result<usize> {
    let schema = timeit("load_schema", || load_schema(&opts.config))
        .with_context(|| format!("loading {}", opts.config.display()))?;
    let report = timeit("read_report", || read_bottle_report(&opts.btlpath))
        .with_context(|| format!("reading {}", opts.btlpath.display()))?;
    info!(rows = report.rows.len(), columns = report.columns.len(), "bottle report");

    let table    = MergedTable::from_report(&report);
    let profiles = timeit("build_profiles", || build_profiles(&opts.cruise, &table, &schema))?;

    let globals = GlobalAttributes {
        raw_data_file: file_name(&opts.btlpath),
        ..GlobalAttributes::default()
    };

    // netCDF writes stay on this thread
    timeit("write_profiles", || -> Result<()> {
        for p in &profiles {
            let path = profile_path(&opts.output, &opts.cruise, &p.cast_name, "btl");
            let summary = p
                .write(&path, &schema, &globals, &opts.write)
                .with_context(|| format!("writing {}", path.display()))?;
            info!(file = %path.display(), depths = p.depth.len(), filled = ?summary.filled, "wrote cast");
        }
        Ok(())
    })?;

    Ok(profiles.len())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let opts = Options::from(cli);

    let n = run(&opts)?;
    info!("Finished OK, wrote {n} casts → {}", opts.output.display());
    Ok(())
}
