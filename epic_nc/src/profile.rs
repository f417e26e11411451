//! Per-cast profiles built from bottle reports, optionally merged with a
//! discrete-sample sheet, and written out as EPIC containers.

use std::{
    collections::BTreeMap,
    path::Path,
};

use chrono::NaiveDateTime;
use csv::WriterBuilder;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    discrete::{DiscreteSample, DiscreteTable, CAST_ALIASES, CRUISE_ALIASES, NISKIN_ALIASES},
    error::{EpicError, Result},
    merge::{outer_join, CastNiskin},
    report::{resolve_alias, BottleReport, BottleRow, DEPTH_ALIASES, LATITUDE_ALIASES, LONGITUDE_ALIASES},
    schema::EpicSchema,
    time::EpicTime,
    writer::{EpicWriter, GlobalAttributes, TimeConvention, WriteSummary},
    MISSING_VALUE,
};

/// Report columns that never carry a measurement.
const REPORT_KEY_COLUMNS: [&str; 3] = ["cast", "date", "time"];

// ─────────────────────────────────────────────────────────────────────
// Merged table
// ─────────────────────────────────────────────────────────────────────

/// One row of the bottle ⟗ discrete join. `cast_name`/`timestamp` are `None`
/// for a discrete sample with no fired bottle behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub key: CastNiskin,
    pub cast_name: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    pub values: BTreeMap<String, f64>,
}

impl MergedRow {
    pub fn has_bottle(&self) -> bool {
        self.cast_name.is_some()
    }

    fn from_bottle(row: &BottleRow) -> Self {
        Self {
            key: row.key,
            cast_name: Some(row.cast_name.clone()),
            timestamp: Some(row.timestamp),
            values: row.values.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedTable {
    /// Measurement columns: report columns first, then discrete-only ones.
    pub columns: Vec<String>,
    pub rows: Vec<MergedRow>,
}

impl MergedTable {
    /// Bottle report alone, sorted by cast/niskin.
    pub fn from_report(report: &BottleReport) -> Self {
        let mut rows: Vec<MergedRow> = report.rows.iter().map(MergedRow::from_bottle).collect();
        rows.sort_by_key(|r| r.key);
        Self {
            columns: report_columns(report),
            rows,
        }
    }

    /// Full outer join of report and discrete sheet on cast/niskin. Discrete
    /// values are laid over the bottle values of the same name.
    pub fn merge(report: &BottleReport, table: &DiscreteTable) -> Self {
        let mut columns = report_columns(report);
        for c in &table.columns {
            let is_key = CAST_ALIASES.contains(&c.as_str())
                || NISKIN_ALIASES.contains(&c.as_str())
                || CRUISE_ALIASES.contains(&c.as_str());
            if !is_key && !columns.contains(c) {
                columns.push(c.clone());
            }
        }

        let bottles: Vec<(CastNiskin, &BottleRow)> = report.rows.iter().map(|r| (r.key, r)).collect();
        let samples: Vec<(CastNiskin, &DiscreteSample)> =
            table.samples.iter().map(|s| (s.key, s)).collect();

        let rows = outer_join(bottles, samples)
            .into_iter()
            .map(|j| {
                let mut row = match j.left {
                    Some(bottle) => MergedRow::from_bottle(bottle),
                    None => MergedRow {
                        key: j.key,
                        cast_name: None,
                        timestamp: None,
                        values: BTreeMap::new(),
                    },
                };
                if let Some(sample) = j.right {
                    row.values
                        .extend(sample.values.iter().map(|(k, v)| (k.clone(), *v)));
                }
                row
            })
            .collect();

        Self { columns, rows }
    }

    /// Discrete samples with no bottle: kept in CSV output, never in netCDF.
    pub fn orphans(&self) -> impl Iterator<Item = &MergedRow> {
        self.rows.iter().filter(|r| !r.has_bottle())
    }

    /// Dump the whole join, orphans included. Missing cells are empty.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut wtr = WriterBuilder::new().from_path(path)?;

        let mut header = vec!["Cast_Niskin".to_string(), "cast".to_string(), "date_time".to_string()];
        header.extend(self.columns.iter().cloned());
        wtr.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![
                row.key.to_string(),
                row.cast_name.clone().unwrap_or_default(),
                row.timestamp
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
            ];
            record.extend(
                self.columns
                    .iter()
                    .map(|c| row.values.get(c).map(|v| v.to_string()).unwrap_or_default()),
            );
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn report_columns(report: &BottleReport) -> Vec<String> {
    report
        .columns
        .iter()
        .filter(|c| !REPORT_KEY_COLUMNS.contains(&c.as_str()))
        .cloned()
        .collect()
}

// ─────────────────────────────────────────────────────────────────────
// Profiles
// ─────────────────────────────────────────────────────────────────────

/// One cast, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub cruise: String,
    pub cast_name: String,
    pub time: NaiveDateTime,
    pub latitude: f64,
    pub longitude: f64,
    pub depth: Vec<f64>,
    pub data: BTreeMap<String, Vec<f64>>,
}

/// How a profile lands on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOptions {
    pub convention: TimeConvention,
    pub overwrite: bool,
    pub history: String,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            convention: TimeConvention::Epic,
            overwrite: false,
            history: String::new(),
        }
    }
}

impl Profile {
    pub fn epic_time(&self) -> EpicTime {
        EpicTime::from_datetime(&self.time)
    }

    /// `base` with this cast's cruise and cast filled in.
    pub fn global_attributes(&self, base: &GlobalAttributes) -> GlobalAttributes {
        GlobalAttributes {
            cruise: Some(self.cruise.clone()),
            cast: Some(self.cast_name.clone()),
            ..base.clone()
        }
    }

    pub fn write(
        &self,
        path: &Path,
        schema: &EpicSchema,
        globals: &GlobalAttributes,
        opts: &WriteOptions,
    ) -> Result<WriteSummary> {
        let depth: Vec<f32> = self.depth.iter().map(|&d| d as f32).collect();

        let mut nc = EpicWriter::create(path, opts.overwrite)?.with_convention(opts.convention);
        nc.global_attributes(&self.global_attributes(globals))?;
        nc.declare_dimensions(1, depth.len())?;
        nc.declare_fields(schema)?;
        nc.write_coordinates(&depth, self.latitude as f32, self.longitude as f32, self.epic_time())?;
        let summary = nc.write_data(schema, &self.data, MISSING_VALUE)?;
        if !opts.history.is_empty() {
            nc.append_history(&opts.history)?;
        }
        nc.close()?;

        debug!(
            path = %path.display(),
            written = summary.written.len(),
            filled = summary.filled.len(),
            "wrote profile"
        );
        Ok(summary)
    }
}

/// Group bottle rows into casts and pull every schema field that maps onto a
/// column. Discrete-only rows are skipped with a warning.
pub fn build_profiles(cruise: &str, table: &MergedTable, schema: &EpicSchema) -> Result<Vec<Profile>> {
    let depth_col = resolve_alias(&table.columns, &DEPTH_ALIASES).ok_or_else(|| {
        EpicError::MissingColumn {
            aliases: DEPTH_ALIASES.iter().map(|a| a.to_string()).collect(),
            source_name: "bottle report".to_string(),
        }
    })?;
    let lat_col = resolve_alias(&table.columns, &LATITUDE_ALIASES);
    let lon_col = resolve_alias(&table.columns, &LONGITUDE_ALIASES);

    let mut fields: Vec<(&str, &str)> = Vec::new();
    for desc in schema.variables() {
        match desc.resolve_label(&table.columns) {
            Some(label) => {
                info!(key = %desc.key, column = label, "found in source");
                fields.push((desc.key.as_str(), label));
            }
            None => warn!(key = %desc.key, labels = ?desc.sbe_labels, "no source column, field will be missing"),
        }
    }

    // keyed on the cast number so `ctd001` and `CTD001` land in one profile
    let mut casts: BTreeMap<u16, Vec<&MergedRow>> = BTreeMap::new();
    for row in &table.rows {
        match (&row.cast_name, row.timestamp) {
            (Some(_), Some(_)) => casts.entry(row.key.cast).or_default().push(row),
            _ => warn!(
                key = %row.key,
                "discrete sample without a bottle report row, likely a bucket sample; skipped"
            ),
        }
    }

    let profiles = casts
        .into_par_iter()
        .filter_map(|(_, mut rows)| {
            rows.sort_by_key(|r| r.key);
            let first = rows.first()?;
            let time = first.timestamp?;
            let cast_name = first.cast_name.clone()?;
            let column = |name: &str| -> Vec<f64> {
                rows.iter()
                    .map(|r| r.values.get(name).copied().unwrap_or(MISSING_VALUE))
                    .collect()
            };
            let scalar = |col: &Option<String>| {
                col.as_deref()
                    .and_then(|c| first.values.get(c).copied())
                    .unwrap_or(MISSING_VALUE)
            };

            Some(Profile {
                cruise: cruise.to_string(),
                cast_name,
                time,
                latitude: scalar(&lat_col),
                longitude: scalar(&lon_col),
                depth: column(&depth_col),
                data: fields
                    .iter()
                    .map(|(key, label)| (key.to_string(), column(label)))
                    .collect(),
            })
        })
        .collect();

    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{discrete::parse_discrete_table, report::parse_bottle_report, schema::EpicSchema};

    const REPORT: &str = "\
cast   date     time     nb  PrDM    T090C
ctd001 20170915 17:42:08 2   30.020  7.1020
ctd001 20170915 17:40:00 1   50.211  6.5530
ctd002 20170916 02:10:00 1   10.500  8.0000
";

    const NUTS: &str = "\
Cast,Niskin,PO4 (uM)
1,1,1.52
1,2,1.31
9,1,0.50
";

    const SCHEMA: &str = r#"
T_28:
  sbe_label: T090C
  name: T
  longname: TEMPERATURE (C)
  generic_name: temp
  units: C
  fortran_format: f10.2
  EPIC_KEY: 28
PO4_186:
  sbe_label: PO4 (uM)
  name: PO4
  longname: PHOSPHATE (uM)
  generic_name: po4
  units: uM
  fortran_format: f10.2
  EPIC_KEY: 186
SI_188:
  sbe_label: SiO4 (uM)
  name: SI
  longname: SILICATE (uM)
  generic_name: si
  units: uM
  fortran_format: f10.2
  EPIC_KEY: 188
"#;

    fn report() -> BottleReport {
        parse_bottle_report(REPORT.as_bytes(), "r.report_btl").unwrap()
    }

    #[test]
    fn test_bottle_only_profiles() {
        let schema = EpicSchema::from_yaml_str(SCHEMA).unwrap();
        let table = MergedTable::from_report(&report());
        let profiles = build_profiles("dy1707", &table, &schema).unwrap();

        assert_eq!(profiles.len(), 2);
        let p = &profiles[0];
        assert_eq!(p.cast_name, "ctd001");
        // sorted by niskin, so niskin 1 (50 dbar) comes first
        assert_eq!(p.depth, vec![50.211, 30.020]);
        assert_eq!(p.time.to_string(), "2017-09-15 17:40:00");
        assert_eq!(p.latitude, MISSING_VALUE);
        assert_eq!(p.data["T_28"], vec![6.5530, 7.1020]);
        assert!(!p.data.contains_key("PO4_186"));
    }

    #[test]
    fn test_discrete_merge_overlays_and_keeps_orphans() {
        let nuts = parse_discrete_table(NUTS, "nut.csv").unwrap();
        let table = MergedTable::merge(&report(), &nuts);

        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.orphans().count(), 1);
        assert!(table.columns.contains(&"PO4 (uM)".to_string()));
        assert!(!table.columns.contains(&"Cast".to_string()));

        let schema = EpicSchema::from_yaml_str(SCHEMA).unwrap();
        let profiles = build_profiles("dy1707", &table, &schema).unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].data["PO4_186"], vec![1.52, 1.31]);
        assert_eq!(profiles[1].data["PO4_186"], vec![MISSING_VALUE]);
    }

    #[test]
    fn test_cast_name_case_is_one_profile() {
        let text = "\
cast   date     time     nb  PrDM    T090C
ctd001 20170915 17:40:00 1   50.211  6.5530
CTD001 20170915 17:42:08 2   30.020  7.1020
";
        let report = parse_bottle_report(text.as_bytes(), "r").unwrap();
        let schema = EpicSchema::from_yaml_str(SCHEMA).unwrap();
        let profiles = build_profiles("dy1707", &MergedTable::from_report(&report), &schema).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].cast_name, "ctd001");
        assert_eq!(profiles[0].depth, vec![50.211, 30.020]);
    }

    #[test]
    fn test_missing_depth_column() {
        let text = "cast date time nb T090C\nctd001 20170915 17:42:08 1 6.5\n";
        let report = parse_bottle_report(text.as_bytes(), "r").unwrap();
        let schema = EpicSchema::from_yaml_str(SCHEMA).unwrap();
        let err = build_profiles("c", &MergedTable::from_report(&report), &schema).unwrap_err();
        assert!(matches!(err, EpicError::MissingColumn { .. }));
    }

    #[test]
    fn test_write_csv_includes_orphans() {
        let nuts = parse_discrete_table(NUTS, "nut.csv").unwrap();
        let table = MergedTable::merge(&report(), &nuts);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged.csv");
        table.write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("Cast_Niskin,cast,date_time,nb,PrDM,T090C,PO4 (uM)"));
        assert!(lines[4].starts_with("009_01,,,"));
    }
}
