//! ODV generic spreadsheet export: one tab-separated row per CTD depth, each
//! row prefixed with the station header.

use std::io::Write;

use csv::{Writer, WriterBuilder};

use crate::{
    error::Result,
    is_missing,
    merge::match_nearest_depth,
    reader::EpicDataset,
};

pub const STANDARD_HEADER: [&str; 10] = [
    "cruise",
    "cast",
    "type",
    "station_number",
    "station_name",
    "ctd_type",
    "yyyy-mm-dd hh:mm",
    "longitude [degrees east]",
    "latitude [degrees north]",
    "Bot. Depth [m]",
];

/// Bottle variables appended when a paired bottle file is given.
pub const DEFAULT_BOTTLE_VARS: [&str; 6] = ["BTL_103", "SI_188", "PO4_186", "NH4_189", "NO2_184", "NO3_182"];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OdvOptions {
    /// Only these CTD variables, in this order. `None` means every data
    /// variable, sorted by name.
    pub variables: Option<Vec<String>>,
    pub bottle_vars: Vec<String>,
}

/// Rows for one cast, all sharing `header`.
#[derive(Debug, Clone, PartialEq)]
pub struct OdvBlock {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Cell text for a stored value. Profile fields are f32 on disk, so they are
/// printed at that precision.
fn cell(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() && !is_missing(v) => (v as f32).to_string(),
        _ => String::new(),
    }
}

pub fn station_header(ds: &EpicDataset) -> Vec<String> {
    let text = |name: &str, default: &str| ds.global_text(name).unwrap_or_else(|| default.to_string());
    let longitude = ds.longitude().map(|lon| -lon);
    vec![
        text("CRUISE", ""),
        text("CAST", ""),
        "1".to_string(),
        text("STATION_NUMBER", "no_number"),
        text("STATION_NAME", "no_name"),
        "std".to_string(),
        ds.time()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default(),
        cell(longitude),
        cell(ds.latitude()),
        text("WATER_DEPTH", ""),
    ]
}

pub fn build_block(ctd: &EpicDataset, btl: Option<&EpicDataset>, opts: &OdvOptions) -> OdvBlock {
    let depth = ctd.depth().unwrap_or_default();
    let station = station_header(ctd);

    let ctd_vars: Vec<String> = match &opts.variables {
        Some(list) => list.clone(),
        None => ctd.data_keys().into_iter().map(str::to_string).collect(),
    };
    let mut btl_vars: Vec<&str> = match btl {
        Some(b) => opts
            .bottle_vars
            .iter()
            .map(String::as_str)
            .filter(|v| b.get(v).is_some())
            .collect(),
        None => Vec::new(),
    };
    btl_vars.sort_unstable();
    let btl_match = btl
        .and_then(|b| b.depth())
        .map(|btl_depth| match_nearest_depth(depth, btl_depth))
        .unwrap_or_else(|| vec![None; depth.len()]);

    let mut header: Vec<String> = STANDARD_HEADER.iter().map(|h| h.to_string()).collect();
    header.push("dep".to_string());
    header.extend(ctd_vars.iter().cloned());
    header.extend(btl_vars.iter().map(|v| v.to_string()));

    let rows = depth
        .iter()
        .enumerate()
        .map(|(i, &d)| {
            let mut row = station.clone();
            row.push(cell(Some(d)));
            for var in &ctd_vars {
                row.push(cell(ctd.get(var).and_then(|v| v.get(i).copied())));
            }
            for var in &btl_vars {
                let value = btl_match[i]
                    .and_then(|j| btl.and_then(|b| b.get(var)).and_then(|v| v.get(j).copied()));
                row.push(cell(value));
            }
            row
        })
        .collect();

    OdvBlock { header, rows }
}

/// Tab-separated writer that prints the header before the first block and
/// again whenever the column set changes.
pub struct OdvWriter<W: Write> {
    wtr: Writer<W>,
    last_header: Option<Vec<String>>,
}

impl<W: Write> OdvWriter<W> {
    pub fn new(out: W) -> Self {
        let wtr = WriterBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_writer(out);
        Self { wtr, last_header: None }
    }

    pub fn write_block(&mut self, block: &OdvBlock) -> Result<()> {
        if self.last_header.as_ref() != Some(&block.header) {
            self.wtr.write_record(&block.header)?;
            self.last_header = Some(block.header.clone());
        }
        for row in &block.rows {
            self.wtr.write_record(row)?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.wtr.flush()?;
        Ok(())
    }
}
