//! Shore-lab discrete sample sheets (nutrients, oxygen): comma or tab
//! delimited, one header row, one row per cast/niskin sample.

use std::{
    collections::BTreeMap,
    fs,
    path::Path,
};

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::{
    error::{EpicError, Result},
    merge::{parse_cast_name, CastNiskin},
    report::resolve_alias,
};

pub const CAST_ALIASES: [&str; 3] = ["Cast", "cast", "CAST"];
pub const NISKIN_ALIASES: [&str; 4] = ["Niskin", "niskin", "NISKIN", "nb"];
pub const CRUISE_ALIASES: [&str; 2] = ["Cruise", "cruise"];

#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteSample {
    pub key: CastNiskin,
    pub cruise: Option<String>,
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteTable {
    pub source_name: String,
    pub columns: Vec<String>,
    pub samples: Vec<DiscreteSample>,
}

impl DiscreteTable {
    /// Samples keyed for [`crate::merge::outer_join`].
    pub fn keyed(&self) -> Vec<(CastNiskin, DiscreteSample)> {
        self.samples.iter().map(|s| (s.key, s.clone())).collect()
    }
}

pub fn read_discrete_table(path: &Path) -> Result<DiscreteTable> {
    let text = fs::read_to_string(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    parse_discrete_table(&text, &name)
}

/// Tab when the header has more tabs than commas, comma otherwise.
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let tabs = header.matches('\t').count();
    let commas = header.matches(',').count();
    if tabs > commas {
        b'\t'
    } else {
        b','
    }
}

pub fn parse_discrete_table(text: &str, source_name: &str) -> Result<DiscreteTable> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(sniff_delimiter(text))
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let missing = |aliases: &[&str]| EpicError::MissingColumn {
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
        source_name: source_name.to_string(),
    };
    let cast_col = resolve_alias(&columns, &CAST_ALIASES).ok_or_else(|| missing(&CAST_ALIASES))?;
    let niskin_col =
        resolve_alias(&columns, &NISKIN_ALIASES).ok_or_else(|| missing(&NISKIN_ALIASES))?;
    let cruise_col = resolve_alias(&columns, &CRUISE_ALIASES);

    let position = |name: &str| columns.iter().position(|c| c == name);
    let cast_i = position(cast_col.as_str());
    let niskin_i = position(niskin_col.as_str());
    let cruise_i = cruise_col.as_deref().and_then(position);

    let mut samples = Vec::new();
    for (n, record) in rdr.records().enumerate() {
        let record = record?;
        // header is line 1
        let lineno = n + 2;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let cell = |i: Option<usize>| i.and_then(|i| record.get(i)).unwrap_or("");
        let cast = parse_cast_cell(cell(cast_i)).ok_or_else(|| EpicError::Parse {
            source_name: source_name.to_string(),
            line: lineno,
            message: format!("bad cast {:?}", cell(cast_i)),
        })?;
        let niskin = parse_number_cell(cell(niskin_i)).ok_or_else(|| EpicError::Parse {
            source_name: source_name.to_string(),
            line: lineno,
            message: format!("bad niskin {:?}", cell(niskin_i)),
        })?;
        let key = CastNiskin::new(cast, niskin)?;

        let cruise = cruise_i
            .and_then(|i| record.get(i))
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        samples.push(DiscreteSample {
            key,
            cruise,
            values: numeric_values(&columns, &record, &[cast_i, niskin_i, cruise_i]),
        });
    }

    Ok(DiscreteTable {
        source_name: source_name.to_string(),
        columns,
        samples,
    })
}

fn numeric_values(
    columns: &[String],
    record: &StringRecord,
    skip: &[Option<usize>],
) -> BTreeMap<String, f64> {
    columns
        .iter()
        .enumerate()
        .filter(|(i, _)| !skip.contains(&Some(*i)))
        .filter_map(|(i, c)| {
            record
                .get(i)
                .and_then(|v| v.parse::<f64>().ok())
                .map(|v| (c.clone(), v))
        })
        .collect()
}

/// `7`, `7.0` and `ctd007` all mean cast 7.
fn parse_cast_cell(cell: &str) -> Option<i64> {
    parse_number_cell(cell).or_else(|| parse_cast_name(cell).ok().map(i64::from))
}

fn parse_number_cell(cell: &str) -> Option<i64> {
    cell.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.trunc() as i64)
}
