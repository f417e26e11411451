use std::path::PathBuf;

use thiserror::Error;

/// Everything the EPIC library can fail with.
#[derive(Debug, Error)]
pub enum EpicError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("netCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("cannot create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: netcdf::Error,
    },

    #[error("{0} already exists (pass overwrite to replace it)")]
    AlreadyExists(PathBuf),

    #[error("config {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("unsupported config extension for {0} (expected .json, .pyini, .yaml or .yml)")]
    UnsupportedConfig(PathBuf),

    #[error("variable {key}: missing mandatory field `{field}`")]
    MissingDescriptorField { key: String, field: &'static str },

    #[error("empty EPIC variable schema")]
    EmptySchema,

    #[error("variable {0} collides with a coordinate variable")]
    ReservedKey(String),

    #[error("cast name {0:?} is not of the form ctdNNN")]
    CastName(String),

    #[error("cast/niskin pair out of range: cast {cast} (0..=999), niskin {niskin} (0..=99)")]
    KeyRange { cast: i64, niskin: i64 },

    #[error("none of the columns {aliases:?} found in {source_name}")]
    MissingColumn {
        aliases: Vec<String>,
        source_name: String,
    },

    #[error("{source_name} line {line}: {message}")]
    Parse {
        source_name: String,
        line: usize,
        message: String,
    },

    #[error("{0} called out of order: {1}")]
    OutOfOrder(&'static str, &'static str),

    #[error("variable {key}: expected {expected} values, got {got}")]
    Shape {
        key: String,
        expected: usize,
        got: usize,
    },

    #[error("missing variable: {0}")]
    MissingVariable(String),

    #[error("variable {0} already exists")]
    VariableExists(String),

    #[error("missing dimension: {0}")]
    MissingDimension(&'static str),

    #[error("no depth level at or below {0}")]
    NoDepthLevel(f64),

    #[error("time words differ in length: {0} julian days vs {1} millisecond words")]
    TimeLength(usize, usize),

    #[error("milliseconds since midnight out of range: {0}")]
    TimeRange(i64),

    #[error("julian day {0} is outside the calendar range")]
    JulianDay(i32),

    #[error("bad time units {0:?}")]
    TimeUnits(String),
}

pub type Result<T> = std::result::Result<T, EpicError>;
