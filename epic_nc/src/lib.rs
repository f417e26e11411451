//! EPIC-flavored netCDF toolkit for CTD, bottle, nutrient, oxygen and
//! ship-track data.
//!
//! The driver binaries in this workspace are thin wrappers: they parse their
//! arguments, call into the modules below and report what happened.

use std::time::Instant;

use tracing::info;
use tracing_subscriber::EnvFilter;

pub mod ctd_merge;
pub mod discrete;
pub mod edit;
pub mod error;
pub mod gps;
pub mod merge;
pub mod odv;
pub mod paths;
pub mod profile;
pub mod reader;
pub mod report;
pub mod schema;
pub mod time;
pub mod writer;

pub use error::{EpicError, Result};
pub use merge::{build_composite_key, match_nearest_depth, outer_join, parse_cast_name, CastNiskin};
pub use reader::{EpicDataset, EpicReader};
pub use schema::{load_schema, EpicSchema, VariableDescriptor};
pub use time::{to_calendar, to_epic, EpicTime};
pub use writer::{EpicWriter, GlobalAttributes, TimeConvention};

/// EPIC fill value for profile fields.
pub const MISSING_VALUE: f64 = 1e35;

/// True for the EPIC sentinel (and anything that was narrowed from it).
pub fn is_missing(v: f64) -> bool {
    v.abs() >= 1e34
}

// ─────────────────────────────────────────────────────────────────────
// Stage timing
// ─────────────────────────────────────────────────────────────────────
pub fn timeit<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let t0 = Instant::now();
    let out = f();
    info!("{label:<20}{:?}", t0.elapsed());
    out
}

/// stderr logging; `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
