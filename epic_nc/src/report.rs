//! SBE bottle report: bottle files concatenated without their headers,
//! whitespace delimited, one header line.
//!
//! ```text
//! cast   date     time     nb  PrDM    T090C   Sal00
//! ctd001 20170915 17:42:08 1   50.211  6.5530  31.9421
//! ```

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use chrono::NaiveDateTime;

use crate::{
    error::{EpicError, Result},
    merge::{parse_cast_name, CastNiskin},
};

/// Accepted depth/pressure columns, in preference order.
pub const DEPTH_ALIASES: [&str; 2] = ["PrDM", "PrSM"];
pub const LATITUDE_ALIASES: [&str; 3] = ["Latitude", "latitude", "lat"];
pub const LONGITUDE_ALIASES: [&str; 3] = ["Longitude", "longitude", "lon"];

const DATETIME_FORMATS: [&str; 3] = ["%Y%m%d %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M:%S"];

/// One fired bottle.
#[derive(Debug, Clone, PartialEq)]
pub struct BottleRow {
    pub cast_name: String,
    pub key: CastNiskin,
    pub timestamp: NaiveDateTime,
    pub values: BTreeMap<String, f64>,
}

impl BottleRow {
    pub fn value(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BottleReport {
    pub source_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<BottleRow>,
}

impl BottleReport {
    /// First of `aliases` present in the header, or a [`EpicError::MissingColumn`].
    pub fn resolve_column(&self, aliases: &[&str]) -> Result<String> {
        resolve_alias(&self.columns, aliases).ok_or_else(|| EpicError::MissingColumn {
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            source_name: self.source_name.clone(),
        })
    }

    pub fn optional_column(&self, aliases: &[&str]) -> Option<String> {
        resolve_alias(&self.columns, aliases)
    }
}

pub(crate) fn resolve_alias(columns: &[String], aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .find(|a| columns.iter().any(|c| c == *a))
        .map(|a| a.to_string())
}

pub fn read_bottle_report(path: &Path) -> Result<BottleReport> {
    let rdr = BufReader::new(File::open(path)?);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    parse_bottle_report(rdr, &name)
}

pub fn parse_bottle_report<R: BufRead>(rdr: R, source_name: &str) -> Result<BottleReport> {
    let parse_err = |line: usize, message: String| EpicError::Parse {
        source_name: source_name.to_string(),
        line,
        message,
    };

    let mut lines = rdr.lines().enumerate();
    let mut columns: Vec<String> = Vec::new();
    for (_, line) in lines.by_ref() {
        let line = line?;
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        columns = line.split_whitespace().map(str::to_string).collect();
        break;
    }
    if columns.is_empty() {
        return Err(parse_err(1, "no header line".to_string()));
    }

    let index_of = |name: &str| -> Result<usize> {
        columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| EpicError::MissingColumn {
                aliases: vec![name.to_string()],
                source_name: source_name.to_string(),
            })
    };
    let cast_i = index_of("cast")?;
    let nb_i = index_of("nb")?;
    let date_i = index_of("date")?;
    let time_i = index_of("time")?;

    let mut rows = Vec::new();
    for (n, line) in lines {
        let line = line?;
        let t = line.trim();
        if t.is_empty() || t.starts_with('#') {
            continue;
        }
        let lineno = n + 1;
        let fields: Vec<&str> = t.split_whitespace().collect();
        if fields.len() != columns.len() {
            return Err(parse_err(
                lineno,
                format!("expected {} fields, got {}", columns.len(), fields.len()),
            ));
        }

        let cast_name = fields[cast_i].to_string();
        let cast = parse_cast_name(&cast_name)?;
        // "3" and "3.0" are bottle 3; "3.7", "nan" and "inf" are not bottles
        let niskin = fields[nb_i]
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .ok_or_else(|| parse_err(lineno, format!("bad bottle number {:?}", fields[nb_i])))?;
        let key = CastNiskin::new(i64::from(cast), niskin as i64)?;

        let stamp = format!("{} {}", fields[date_i], fields[time_i]);
        let timestamp = parse_report_datetime(&stamp)
            .ok_or_else(|| parse_err(lineno, format!("bad date/time {stamp:?}")))?;

        // non-numeric cells (bottle flags and the like) are left out
        let values = columns
            .iter()
            .zip(&fields)
            .filter_map(|(c, f)| f.parse::<f64>().ok().map(|v| (c.clone(), v)))
            .collect();

        rows.push(BottleRow {
            cast_name,
            key,
            timestamp,
            values,
        });
    }

    Ok(BottleReport {
        source_name: source_name.to_string(),
        columns,
        rows,
    })
}

pub fn parse_report_datetime(stamp: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(stamp, fmt).ok())
}
