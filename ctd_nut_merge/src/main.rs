
// USAGE cargo run --release -- DY1707 /path/to/ctd/ /path/to/nut/ /path/to/out/ ctdpnut_epickeys.yaml

use anyhow::{Context, Result};
use clap::Parser;
use epic_nc::{
    ctd_merge::{carried_globals, merge_cast, warn_unpaired, FieldSource},
    init_logging, load_schema,
    paths::{list_nc_files, paired_path},
    profile::WriteOptions,
    timeit, EpicDataset, TimeConvention,
};
use std::path::PathBuf;
use tracing::{debug, info};

const HISTORY: &str = "Merged downcast CTD and nutrient data";

#[derive(Parser, Debug)]
#[command(about = "Merge EPIC CTD profiles with their paired nutrient files")]
struct Cli {
    /// Cruise ID, e.g. DY1707
    cruise: String,
    /// Directory of *_ctd.nc files
    ctd_dir: PathBuf,
    /// Directory of *_nut.nc files
    nut_dir: PathBuf,
    /// Output directory
    output: PathBuf,
    /// EPIC variable config (.json, .pyini, .yaml)
    config: PathBuf,
    /// Replace existing output files
    #[arg(long)]
    overwrite: bool,
    #[arg(short, long)]
    verbose: bool,
}

struct Options {
    cruise:  String,
    ctd_dir: PathBuf,
    nut_dir: PathBuf,
    output:  PathBuf,
    config:  PathBuf,
    write:   WriteOptions,
}

impl From<Cli> for Options {
    fn from(cli: Cli) -> Self {
        Self {
            cruise:  cli.cruise,
            ctd_dir: cli.ctd_dir,
            nut_dir: cli.nut_dir,
            output:  cli.output,
            config:  cli.config,
            write:   WriteOptions {
                convention: TimeConvention::Epic,
                overwrite:  cli.overwrite,
                history:    HISTORY.to_string(),
            },
        }
    }
}

fn run(opts: &Options) -> Result<(usize, usize)> {
    let schema = timeit("load_schema", || load_schema(&opts.config))
        .with_context(|| format!("loading {}", opts.config.display()))?;
    let casts = timeit("list_ctd", || list_nc_files(&opts.ctd_dir, "_ctd.nc"))?;
    info!(cruise = %opts.cruise, casts = casts.len(), "merging CTD and nutrient files");

    let mut unpaired = 0;
    for ctd_path in &casts {
        let ctd = EpicDataset::load(ctd_path)
            .with_context(|| format!("reading {}", ctd_path.display()))?;

        let nut_path = paired_path(ctd_path, "ctd", "nut", &opts.nut_dir).filter(|p| p.exists());
        let nut = match &nut_path {
            Some(p) => Some(EpicDataset::load(p).with_context(|| format!("reading {}", p.display()))?),
            None => {
                warn_unpaired(&ctd);
                unpaired += 1;
                None
            }
        };

        let (profile, sources) = merge_cast(&ctd, nut.as_ref(), &schema)
            .with_context(|| format!("merging {}", ctd_path.display()))?;
        let from_nut = sources.values().filter(|s| **s == FieldSource::Nutrient).count();
        debug!(?sources, "field sources");

        let out = paired_path(ctd_path, "ctd", "merged", &opts.output)
            .with_context(|| format!("unexpected file name {}", ctd_path.display()))?;
        profile
            .write(&out, &schema, &carried_globals(&ctd), &opts.write)
            .with_context(|| format!("writing {}", out.display()))?;
        info!(file = %out.display(), nutrient_fields = from_nut, "wrote merged cast");
    }

    Ok((casts.len(), unpaired))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let opts = Options::from(cli);

    let (n, unpaired) = timeit("merge_all", || run(&opts))?;
    info!("Finished OK, merged {n} casts ({unpaired} without nutrients) → {}", opts.output.display());
    Ok(())
}
