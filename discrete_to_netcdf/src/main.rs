
// USAGE cargo run --release -- DY1707 dy1707.report_btl nutrients.csv /path/to/out/ nut_config.yaml --kind nut

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use epic_nc::{
    discrete::read_discrete_table,
    init_logging, load_schema,
    paths::profile_path,
    profile::{build_profiles, MergedTable, WriteOptions},
    report::read_bottle_report,
    timeit, GlobalAttributes, TimeConvention,
};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Kind {
    Oxy,
    Nut,
}

impl Kind {
    fn suffix(self) -> &'static str {
        match self {
            Kind::Oxy => "oxy",
            Kind::Nut => "nut",
        }
    }

    fn history(self) -> &'static str {
        match self {
            Kind::Oxy => "File created by merging oxygen analysis and bottle report files",
            Kind::Nut => "File created by merging nutrient analysis and bottle report files",
        }
    }
}

#[derive(Parser, Debug)]
#[command(about = "Merge oxygen or nutrient sample sheets with the bottle report into EPIC netCDF")]
struct Cli {
    /// Cruise ID, e.g. DY1707
    cruise: String,
    /// Bottle files concatenated without headers (.report_btl)
    btlpath: PathBuf,
    /// Discrete sample sheet, comma or tab delimited
    samples: PathBuf,
    /// Output directory
    output: PathBuf,
    /// EPIC variable config (.json, .pyini, .yaml)
    config: PathBuf,
    #[arg(long, value_enum, default_value = "nut")]
    kind: Kind,
    /// Also dump the merged table (bucket samples included) to this CSV
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,
    /// Write a CF "hours since 1900" time axis instead of EPIC time words
    #[arg(long)]
    cf: bool,
    /// Replace existing output files
    #[arg(long)]
    overwrite: bool,
    #[arg(short, long)]
    verbose: bool,
}

struct Options {
    cruise:  String,
    btlpath: PathBuf,
    samples: PathBuf,
    output:  PathBuf,
    config:  PathBuf,
    kind:    Kind,
    csv:     Option<PathBuf>,
    write:   WriteOptions,
}

impl From<Cli> for Options {
    fn from(cli: Cli) -> Self {
        let convention = if cli.cf { TimeConvention::Cf } else { TimeConvention::Epic };
        Self {
            cruise:  cli.cruise,
            btlpath: cli.btlpath,
            samples: cli.samples,
            output:  cli.output,
            config:  cli.config,
            kind:    cli.kind,
            csv:     cli.csv,
            write:   WriteOptions {
                convention,
                overwrite: cli.overwrite,
                history: cli.kind.history().to_string(),
            },
        }
    }
}

fn run(opts: &Options) -> Result<usize> {
    let schema = timeit("load_schema", || load_schema(&opts.config))
        .with_context(|| format!("loading {}", opts.config.display()))?;
    let report = timeit("read_report", || read_bottle_report(&opts.btlpath))
        .with_context(|| format!("reading {}", opts.btlpath.display()))?;
    let samples = timeit("read_samples", || read_discrete_table(&opts.samples))
        .with_context(|| format!("reading {}", opts.samples.display()))?;
    info!(
        bottles = report.rows.len(),
        samples = samples.samples.len(),
        "matching on cast/niskin pair"
    );
    if samples.samples.is_empty() {
        bail!("{} has no sample rows", opts.samples.display());
    }

    let table = timeit("merge", || MergedTable::merge(&report, &samples));
    for orphan in table.orphans() {
        warn!(key = %orphan.key, "sample but no bottle report row, likely a bucket sample");
    }

    if let Some(csv) = &opts.csv {
        table
            .write_csv(csv)
            .with_context(|| format!("writing {}", csv.display()))?;
        info!(file = %csv.display(), rows = table.rows.len(), "wrote merged table");
    }

    let profiles = timeit("build_profiles", || build_profiles(&opts.cruise, &table, &schema))?;
    let globals = GlobalAttributes {
        raw_data_file: opts
            .samples
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        ..GlobalAttributes::default()
    };

    timeit("write_profiles", || -> Result<()> {
        for p in &profiles {
            let path = profile_path(&opts.output, &opts.cruise, &p.cast_name, opts.kind.suffix());
            let summary = p
                .write(&path, &schema, &globals, &opts.write)
                .with_context(|| format!("writing {}", path.display()))?;
            info!(file = %path.display(), written = ?summary.written, "wrote cast");
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
