//! Ship track from SCS `GPGGA` logs.
//!
//! Each line: `MM/DD/YYYY,HH:MM:SS.fff,$GPGGA,hhmmss.ss,ddmm.mmmm,N,dddmm.mmmm,W,...`

use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use csv::{ReaderBuilder, WriterBuilder};
use glob::glob;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::{
    error::{EpicError, Result},
    schema::EpicSchema,
    time::{TimeUnits, CF_TIME_UNITS},
    writer::{EpicWriter, GlobalAttributes, WriteSummary},
};

pub const TRACK_FILE_NAME: &str = "shiptrack.nc";
const TRACK_HISTORY: &str = "File Created from SCS GPGGA GPS data.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub time: NaiveDateTime,
    pub latitude: f64,
    pub longitude: f64,
}

/// `ddmm.mmmm` (or `dddmm.mmmm`) plus hemisphere → signed decimal degrees.
pub fn dms_to_decimal(value: &str, hemisphere: &str) -> Option<f64> {
    let value = value.trim();
    // byte offsets below are only char boundaries for ASCII
    if !value.is_ascii() {
        return None;
    }
    let dot = value.find('.').unwrap_or(value.len());
    if dot < 2 {
        return None;
    }
    let (degrees, minutes) = value.split_at(dot - 2);
    let degrees: f64 = if degrees.is_empty() { 0.0 } else { degrees.parse().ok()? };
    let minutes: f64 = minutes.parse().ok()?;
    let decimal = degrees + minutes / 60.0;

    match hemisphere.trim() {
        "W" | "w" | "S" | "s" => Some(-decimal),
        _ => Some(decimal),
    }
}

/// Every `*GPGGA*` file directly under `dir`, sorted.
pub fn list_gpgga_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*GPGGA*", dir.display());
    let paths = glob(&pattern).map_err(|e| EpicError::Parse {
        source_name: pattern.clone(),
        line: 0,
        message: e.to_string(),
    })?;
    let mut v: Vec<_> = paths.filter_map(std::result::Result::ok).collect();
    v.sort();
    Ok(v)
}

pub fn parse_gpgga(text: &str, source_name: &str) -> Result<Vec<TrackPoint>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut points = Vec::new();
    for (n, record) in rdr.records().enumerate() {
        let rec = record?;
        let bad = |message: String| EpicError::Parse {
            source_name: source_name.to_string(),
            line: n + 1,
            message,
        };
        if rec.len() < 8 {
            return Err(bad(format!("expected at least 8 fields, got {}", rec.len())));
        }

        let date = NaiveDate::parse_from_str(rec[0].trim(), "%m/%d/%Y")
            .map_err(|e| bad(format!("date parse error: {e}")))?;
        let time = NaiveTime::parse_from_str(rec[1].trim(), "%H:%M:%S%.f")
            .map_err(|e| bad(format!("time parse error: {e}")))?;
        let latitude = dms_to_decimal(&rec[4], &rec[5])
            .ok_or_else(|| bad(format!("bad latitude {:?}", &rec[4])))?;
        let longitude = dms_to_decimal(&rec[6], &rec[7])
            .ok_or_else(|| bad(format!("bad longitude {:?}", &rec[6])))?;

        points.push(TrackPoint {
            time: NaiveDateTime::new(date, time),
            latitude,
            longitude,
        });
    }
    Ok(points)
}

/// Parse every file in parallel. A file that fails is logged and left out;
/// the returned track is in file order.
pub fn read_track(paths: &[PathBuf]) -> Vec<TrackPoint> {
    let parsed: Vec<Option<Vec<TrackPoint>>> = paths
        .par_iter()
        .map(|path| {
            let name = path.display().to_string();
            let result = std::fs::read_to_string(path)
                .map_err(EpicError::from)
                .and_then(|text| parse_gpgga(&text, &name));
            match result {
                Ok(points) => {
                    info!(file = %name, points = points.len(), "parsed GPGGA file");
                    Some(points)
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "something failed in file, skipping");
                    None
                }
            }
        })
        .collect();

    parsed.into_iter().flatten().flatten().collect()
}

/// Track columns by name: `time` (hours since 1900-01-01), `latitude`, `longitude`.
pub fn track_columns(points: &[TrackPoint]) -> Result<BTreeMap<String, Vec<f64>>> {
    let units = TimeUnits::parse(CF_TIME_UNITS)?;
    let mut cols = BTreeMap::new();
    cols.insert("time".to_string(), points.iter().map(|p| units.encode(&p.time)).collect());
    cols.insert("latitude".to_string(), points.iter().map(|p| p.latitude).collect());
    cols.insert("longitude".to_string(), points.iter().map(|p| p.longitude).collect());
    Ok(cols)
}

/// One record per fix along `recnum`; schema keys not in [`track_columns`] are NaN.
pub fn write_track(
    path: &Path,
    schema: &EpicSchema,
    points: &[TrackPoint],
    overwrite: bool,
) -> Result<WriteSummary> {
    let globals = GlobalAttributes {
        history: TRACK_HISTORY.to_string(),
        ..GlobalAttributes::default()
    };
    let mut nc = EpicWriter::create(path, overwrite)?;
    nc.global_attributes(&globals)?;
    nc.declare_record_dimension(points.len())?;
    nc.declare_fields(schema)?;
    nc.write_record_index()?;
    let summary = nc.write_data(schema, &track_columns(points)?, f64::NAN)?;
    nc.close()?;
    Ok(summary)
}

// ─────────────────────────────────────────────────────────────────────
// Text exports
// ─────────────────────────────────────────────────────────────────────
const GPX_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.0" creator="epic_nc"
xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns="http://www.topografix.com/GPX/1/0"
xsi:schemaLocation="http://www.topografix.com/GPX/1/0 http://www.topografix.com/GPX/1/0/gpx.xsd">"#;
const ISO_MILLIS: &str = "%Y-%m-%dT%H:%M:%S%.3f";

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// GPX 1.0: one track named `name`, one `trkpt` per fix, times in UTC.
pub fn write_gpx<W: Write>(mut out: W, name: &str, points: &[TrackPoint]) -> Result<()> {
    writeln!(out, "{GPX_HEADER}")?;
    writeln!(out, "<trk>\n<name>{}</name>\n<trkseg>", xml_escape(name))?;
    for p in points {
        writeln!(
            out,
            r#"<trkpt lat="{}" lon="{}"><ele>0.0</ele><time>{}Z</time></trkpt>"#,
            p.latitude,
            p.longitude,
            p.time.format(ISO_MILLIS)
        )?;
    }
    writeln!(out, "</trkseg>\n</trk>\n</gpx>")?;
    out.flush()?;
    Ok(())
}

/// Headerless `lat,lon,time` rows.
pub fn write_track_csv<W: Write>(out: W, points: &[TrackPoint]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(out);
    for p in points {
        wtr.write_record([
            p.latitude.to_string(),
            p.longitude.to_string(),
            p.time.format(ISO_MILLIS).to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
