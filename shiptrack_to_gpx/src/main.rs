
// USAGE cargo run --release -- /path/to/scs/NAV/ [-o track.gpx] [--csv]

use anyhow::{bail, Context, Result};
use clap::Parser;
use epic_nc::{
    gps::{list_gpgga_files, read_track, write_gpx, write_track_csv},
    init_logging, timeit,
};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Convert SCS GPGGA gps files to a GPX track (or CSV)")]
struct Cli {
    /// One GPGGA log, or a directory of *GPGGA* logs
    input: PathBuf,
    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// lat,lon,time rows instead of GPX
    #[arg(long)]
    csv: bool,
    #[arg(short, long)]
    verbose: bool,
}

fn export<W: Write>(cli: &Cli, out: W) -> Result<usize> {
    let files = if cli.input.is_dir() {
        timeit("list_gpgga", || list_gpgga_files(&cli.input))?
    } else {
        vec![cli.input.clone()]
    };
    if files.is_empty() {
        bail!("no GPGGA files under {}", cli.input.display());
    }

    let track = timeit("parse_gpgga", || read_track(&files));
    if cli.csv {
        write_track_csv(out, &track)?;
    } else {
        write_gpx(out, &cli.input.display().to_string(), &track)?;
    }
    Ok(track.len())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let n = match &cli.output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            export(&cli, BufWriter::new(file))?
        }
        None => export(&cli, io::stdout().lock())?,
    };
    info!("Finished OK, exported {n} fixes");
    Ok(())
}
