
// USAGE cargo run --release -- /path/to/ctd/ [--btl-dir /path/to/nut/] [-o cruise.odv.txt]

use anyhow::{Context, Result};
use clap::Parser;
use epic_nc::{
    init_logging,
    odv::{build_block, OdvOptions, OdvWriter, DEFAULT_BOTTLE_VARS},
    paths::{list_nc_files, paired_path},
    timeit, EpicDataset,
};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(about = "Convert EPIC CTD netCDF files to an ODV friendly spreadsheet")]
struct Cli {
    /// Directory of *_ctd.nc files
    ctd_dir: PathBuf,
    /// Directory of paired *_nut.nc bottle files
    #[arg(long)]
    btl_dir: Option<PathBuf>,
    /// Only these CTD variables (default: all, sorted)
    #[arg(long, value_delimiter = ',')]
    epic: Option<Vec<String>>,
    /// Bottle variables to append
    #[arg(long, value_delimiter = ',')]
    btl_vars: Option<Vec<String>>,
    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
}

struct Options {
    ctd_dir: PathBuf,
    btl_dir: Option<PathBuf>,
    output:  Option<PathBuf>,
    odv:     OdvOptions,
}

impl From<Cli> for Options {
    fn from(cli: Cli) -> Self {
        let bottle_vars = cli
            .btl_vars
            .unwrap_or_else(|| DEFAULT_BOTTLE_VARS.iter().map(|v| v.to_string()).collect());
        Self {
            ctd_dir: cli.ctd_dir,
            btl_dir: cli.btl_dir,
            output:  cli.output,
            odv:     OdvOptions { variables: cli.epic, bottle_vars },
        }
    }
}

fn run<W: Write>(opts: &Options, out: W) -> Result<usize> {
    let casts = timeit("list_ctd", || list_nc_files(&opts.ctd_dir, "_ctd.nc"))?;
    let mut odv = OdvWriter::new(out);

    for ctd_path in &casts {
        let ctd = EpicDataset::load(ctd_path)
            .with_context(|| format!("reading {}", ctd_path.display()))?;

        // bottle file shares the CTD naming with ctd → nut
        let btl = match opts
            .btl_dir
            .as_ref()
            .and_then(|dir| paired_path(ctd_path, "ctd", "nut", dir))
        {
            Some(p) if p.exists() => {
                Some(EpicDataset::load(&p).with_context(|| format!("reading {}", p.display()))?)
            }
            Some(p) => {
                debug!(file = %p.display(), "missing btl file");
                None
            }
            None => None,
        };

        let block = build_block(&ctd, btl.as_ref(), &opts.odv);
        odv.write_block(&block)?;
    }
    odv.finish()?;
    Ok(casts.len())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let opts = Options::from(cli);

    let n = match &opts.output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            run(&opts, BufWriter::new(file))?
        }
        None => run(&opts, io::stdout().lock())?,
    };
    info!("Finished OK, exported {n} casts");
    Ok(())
}
