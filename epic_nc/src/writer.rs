//! EPIC container writer.
//!
//! Calls go in this order:
//!
//! ```text
//! create → global_attributes → declare_dimensions → declare_fields
//!        → write_coordinates → write_data → append_history → close
//! ```
//!
//! `declare_fields` before `declare_dimensions`, or a coordinate/data write
//! before `declare_fields`, is an [`EpicError::OutOfOrder`]. `close` consumes
//! the writer.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use chrono::{NaiveDateTime, Utc};
use netcdf::{AttributeValue, FileMut, Options, VariableMut};
use tracing::debug;

use crate::{
    error::{EpicError, Result},
    schema::{EpicSchema, VariableDescriptor},
    time::{EpicTime, TimeUnits, CF_TIME_UNITS},
};

pub const HISTORY_ATTR: &str = "History";
pub const RECORD_DIM: &str = "recnum";
pub const PROFILE_DIMS: [&str; 4] = ["time", "dep", "lat", "lon"];

/// Names a schema key may not take in the profile layout.
pub const COORDINATE_NAMES: [&str; 6] = ["time", "time2", "dep", "depth", "lat", "lon"];

const GENERATOR: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));
const HISTORY_STAMP: &str = "%B %d, %Y %H:%M UTC";

struct Coordinate {
    name: &'static str,
    dim: &'static str,
    long_name: &'static str,
    units: &'static str,
    epic_code: i32,
}

const EPIC_TIME: [Coordinate; 2] = [
    Coordinate { name: "time", dim: "time", long_name: "time", units: "True Julian Day", epic_code: 624 },
    Coordinate { name: "time2", dim: "time", long_name: "time2", units: "msec since 0:00 GMT", epic_code: 624 },
];

const SPATIAL: [Coordinate; 3] = [
    Coordinate { name: "dep", dim: "dep", long_name: "depth", units: "dbar", epic_code: 1 },
    Coordinate { name: "lat", dim: "lat", long_name: "latitude", units: "degree_north", epic_code: 500 },
    Coordinate { name: "lon", dim: "lon", long_name: "longitude", units: "degree_west", epic_code: 501 },
];

/// How the time coordinate is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeConvention {
    /// `time` + `time2` integer words.
    #[default]
    Epic,
    /// One f64 `time` in [`CF_TIME_UNITS`].
    Cf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// time × dep × lat × lon, lat/lon of length 1.
    Profile { time_len: usize, depth_len: usize },
    /// 1-D along `recnum` (ship tracks).
    Record { len: usize },
}

impl Layout {
    /// Number of values in one data field.
    pub fn field_len(&self) -> usize {
        match *self {
            Layout::Profile { time_len, depth_len } => time_len * depth_len,
            Layout::Record { len } => len,
        }
    }
}

/// File-level EPIC metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalAttributes {
    pub raw_data_file: String,
    pub cruise: Option<String>,
    pub cast: Option<String>,
    pub instrument_type: String,
    pub water_mass: String,
    pub water_depth: i32,
    pub prog_comment: String,
    pub edit_comment: String,
    pub station_name: String,
    pub experiment: String,
    pub serial_number: String,
    pub history: String,
    pub extra: BTreeMap<String, String>,
}

impl Default for GlobalAttributes {
    fn default() -> Self {
        Self {
            raw_data_file: String::new(),
            cruise: None,
            cast: None,
            instrument_type: String::new(),
            water_mass: String::new(),
            water_depth: 9999,
            prog_comment: String::new(),
            edit_comment: String::new(),
            station_name: String::new(),
            experiment: String::new(),
            serial_number: String::new(),
            history: String::new(),
            extra: BTreeMap::new(),
        }
    }
}

/// Which schema keys got real data and which got the sentinel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteSummary {
    pub written: Vec<String>,
    pub filled: Vec<String>,
}

pub struct EpicWriter {
    file: FileMut,
    path: PathBuf,
    convention: TimeConvention,
    layout: Option<Layout>,
    declared: Vec<String>,
    // classic files take definitions and data in separate modes
    define_mode: bool,
}

impl EpicWriter {
    /// Create a new netCDF-3 classic container. An existing file is an error
    /// unless `overwrite`.
    pub fn create(path: &Path, overwrite: bool) -> Result<Self> {
        // no NETCDF4 flag: the library default, CDF-1 classic
        let options = if overwrite { Options::empty() } else { Options::NOCLOBBER };
        let file = netcdf::create_with(path, options).map_err(|source| match source {
            netcdf::Error::AlreadyExists => EpicError::AlreadyExists(path.to_path_buf()),
            source => EpicError::Create {
                path: path.to_path_buf(),
                source,
            },
        })?;
        debug!(path = %path.display(), "created container");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            convention: TimeConvention::Epic,
            layout: None,
            declared: Vec::new(),
            define_mode: true,
        })
    }

    /// Reopen an existing container for in-place edits (history, blanking,
    /// added variables).
    pub fn append(path: &Path) -> Result<Self> {
        let file = netcdf::append(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            convention: TimeConvention::Epic,
            layout: None,
            declared: Vec::new(),
            define_mode: false,
        })
    }

    pub fn with_convention(mut self, convention: TimeConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> Option<Layout> {
        self.layout
    }

    pub fn global_attributes(&mut self, atts: &GlobalAttributes) -> Result<()> {
        let created = Utc::now().format(HISTORY_STAMP).to_string();
        self.define()?;
        let f = &mut self.file;
        f.add_attribute("CREATION_DATE", created.as_str())?;
        f.add_attribute("COMPOSITE", 1i32)?;
        f.add_attribute("INST_TYPE", atts.instrument_type.as_str())?;
        f.add_attribute("DATA_CMNT", atts.raw_data_file.as_str())?;
        f.add_attribute("EPIC_FILE_GENERATOR", GENERATOR)?;
        f.add_attribute("PROG_CMNT01", atts.prog_comment.as_str())?;
        f.add_attribute("EDIT_CMNT01", atts.edit_comment.as_str())?;
        f.add_attribute("WATER_DEPTH", atts.water_depth)?;
        f.add_attribute("MOORING", atts.station_name.as_str())?;
        f.add_attribute("WATER_MASS", atts.water_mass.as_str())?;
        f.add_attribute("EXPERIMENT", atts.experiment.as_str())?;
        f.add_attribute("PROJECT", atts.experiment.as_str())?;
        f.add_attribute("SERIAL_NUMBER", atts.serial_number.as_str())?;
        if let Some(cruise) = &atts.cruise {
            f.add_attribute("CRUISE", cruise.as_str())?;
        }
        if let Some(cast) = &atts.cast {
            f.add_attribute("CAST", cast.as_str())?;
        }
        for (name, value) in &atts.extra {
            f.add_attribute(name, value.as_str())?;
        }
        f.add_attribute(HISTORY_ATTR, atts.history.as_str())?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────
    // Dimensions + fields
    // ─────────────────────────────────────────────────────────────────
    pub fn declare_dimensions(&mut self, time_len: usize, depth_len: usize) -> Result<()> {
        if self.layout.is_some() {
            return Err(EpicError::OutOfOrder("declare_dimensions", "dimensions already declared"));
        }
        self.define()?;
        self.file.add_dimension("time", time_len)?;
        self.file.add_dimension("dep", depth_len)?;
        self.file.add_dimension("lat", 1)?;
        self.file.add_dimension("lon", 1)?;
        self.layout = Some(Layout::Profile { time_len, depth_len });
        Ok(())
    }

    pub fn declare_record_dimension(&mut self, len: usize) -> Result<()> {
        if self.layout.is_some() {
            return Err(EpicError::OutOfOrder("declare_record_dimension", "dimensions already declared"));
        }
        self.define()?;
        self.file.add_dimension(RECORD_DIM, len)?;
        self.layout = Some(Layout::Record { len });
        Ok(())
    }

    /// Coordinates first, then one field per descriptor in schema order.
    pub fn declare_fields(&mut self, schema: &EpicSchema) -> Result<()> {
        let layout = self
            .layout
            .ok_or(EpicError::OutOfOrder("declare_fields", "declare dimensions first"))?;
        if !self.declared.is_empty() {
            return Err(EpicError::OutOfOrder("declare_fields", "fields already declared"));
        }
        self.define()?;

        match layout {
            Layout::Profile { .. } => {
                for desc in schema.variables() {
                    if COORDINATE_NAMES.contains(&desc.key.as_str()) {
                        return Err(EpicError::ReservedKey(desc.key.clone()));
                    }
                }
                self.declare_time()?;
                for c in &SPATIAL {
                    let mut v = self.file.add_variable::<f32>(c.name, &[c.dim])?;
                    put_coordinate_attrs(&mut v, c)?;
                }
                for desc in schema.variables() {
                    debug!(variable = %desc.key, "adding variable");
                    let mut v = self.file.add_variable::<f32>(&desc.key, &PROFILE_DIMS)?;
                    put_descriptor_attrs(&mut v, desc)?;
                }
            }
            Layout::Record { .. } => {
                if let Some(desc) = schema.variables().iter().find(|d| d.key == RECORD_DIM) {
                    return Err(EpicError::ReservedKey(desc.key.clone()));
                }
                let mut v = self.file.add_variable::<i32>(RECORD_DIM, &[RECORD_DIM])?;
                v.put_attribute("long_name", "record number")?;
                v.put_attribute("units", "")?;
                for desc in schema.variables() {
                    debug!(variable = %desc.key, "adding variable");
                    let mut v = self.file.add_variable::<f64>(&desc.key, &[RECORD_DIM])?;
                    put_descriptor_attrs(&mut v, desc)?;
                }
            }
        }

        self.declared = schema.keys().map(str::to_string).collect();
        Ok(())
    }

    fn declare_time(&mut self) -> Result<()> {
        match self.convention {
            TimeConvention::Epic => {
                for c in &EPIC_TIME {
                    let mut v = self.file.add_variable::<i32>(c.name, &[c.dim])?;
                    put_coordinate_attrs(&mut v, c)?;
                }
            }
            TimeConvention::Cf => {
                let mut v = self.file.add_variable::<f64>("time", &["time"])?;
                v.put_attribute("standard_name", "time")?;
                v.put_attribute("long_name", "time")?;
                v.put_attribute("units", CF_TIME_UNITS)?;
                v.put_attribute("calendar", "standard")?;
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────
    // Values
    // ─────────────────────────────────────────────────────────────────
    pub fn write_coordinates(
        &mut self,
        depth: &[f32],
        latitude: f32,
        longitude: f32,
        time: EpicTime,
    ) -> Result<()> {
        let (time_len, depth_len) = match self.layout {
            Some(Layout::Profile { time_len, depth_len }) if !self.declared.is_empty() => {
                (time_len, depth_len)
            }
            _ => return Err(EpicError::OutOfOrder("write_coordinates", "declare profile fields first")),
        };
        if depth.len() != depth_len {
            return Err(EpicError::Shape {
                key: "dep".to_string(),
                expected: depth_len,
                got: depth.len(),
            });
        }

        match self.convention {
            TimeConvention::Epic => {
                self.var_mut("time")?.put_values(&vec![time.julian_day; time_len], ..)?;
                self.var_mut("time2")?.put_values(&vec![time.millis; time_len], ..)?;
            }
            TimeConvention::Cf => {
                let units = TimeUnits::parse(CF_TIME_UNITS)?;
                let hours = units.encode(&time.to_datetime());
                self.var_mut("time")?.put_values(&vec![hours; time_len], ..)?;
            }
        }
        self.var_mut("dep")?.put_values(depth, ..)?;
        self.var_mut("lat")?.put_values(&[latitude], ..)?;
        self.var_mut("lon")?.put_values(&[longitude], ..)?;
        Ok(())
    }

    /// `recnum` = 1..=len.
    pub fn write_record_index(&mut self) -> Result<()> {
        let len = match self.layout {
            Some(Layout::Record { len }) if !self.declared.is_empty() => len,
            _ => return Err(EpicError::OutOfOrder("write_record_index", "declare record fields first")),
        };
        let index: Vec<i32> = (1..=len as i32).collect();
        self.var_mut(RECORD_DIM)?.put_values(&index, ..)?;
        Ok(())
    }

    /// Write every declared schema key: `data[key]` when present, otherwise
    /// `missing` throughout. No declared field is left unset.
    pub fn write_data(
        &mut self,
        schema: &EpicSchema,
        data: &BTreeMap<String, Vec<f64>>,
        missing: f64,
    ) -> Result<WriteSummary> {
        let layout = match self.layout {
            Some(layout) if !self.declared.is_empty() => layout,
            _ => return Err(EpicError::OutOfOrder("write_data", "declare fields first")),
        };
        let expected = layout.field_len();

        let mut summary = WriteSummary::default();
        for key in schema.keys() {
            if !self.declared.iter().any(|d| d == key) {
                return Err(EpicError::MissingVariable(key.to_string()));
            }
            let values: Vec<f64> = match data.get(key) {
                Some(v) if v.len() == expected => {
                    summary.written.push(key.to_string());
                    v.clone()
                }
                Some(v) => {
                    return Err(EpicError::Shape {
                        key: key.to_string(),
                        expected,
                        got: v.len(),
                    })
                }
                None => {
                    summary.filled.push(key.to_string());
                    vec![missing; expected]
                }
            };

            let mut var = self.var_mut(key)?;
            match layout {
                Layout::Profile { .. } => {
                    let narrowed: Vec<f32> = values.iter().map(|&v| v as f32).collect();
                    var.put_values(&narrowed, ..)?;
                }
                Layout::Record { .. } => var.put_values(&values, ..)?,
            }
        }
        Ok(summary)
    }

    /// Fill every element of `name` with `value`.
    pub fn replace_variable(&mut self, name: &str, value: f64) -> Result<()> {
        let len = self.variable_len(name)?;
        self.var_mut(name)?.put_values(&vec![value; len], ..)?;
        Ok(())
    }

    /// Overwrite every element of an existing variable.
    pub fn put_field(&mut self, name: &str, values: &[f64]) -> Result<()> {
        let len = self.variable_len(name)?;
        if values.len() != len {
            return Err(EpicError::Shape {
                key: name.to_string(),
                expected: len,
                got: values.len(),
            });
        }
        self.var_mut(name)?.put_values(values, ..)?;
        Ok(())
    }

    /// Declare one more profile field on a reopened container, filled with
    /// `missing`. The file must already carry the profile dimensions.
    pub fn add_field(&mut self, desc: &VariableDescriptor, missing: f64) -> Result<()> {
        if self.file.variable(&desc.key).is_some() {
            return Err(EpicError::VariableExists(desc.key.clone()));
        }
        if let Some(dim) = PROFILE_DIMS.iter().find(|d| self.file.dimension(d).is_none()) {
            return Err(EpicError::MissingDimension(*dim));
        }

        self.define()?;
        debug!(variable = %desc.key, "adding variable");
        let mut v = self.file.add_variable::<f32>(&desc.key, &PROFILE_DIMS)?;
        put_descriptor_attrs(&mut v, desc)?;

        let len = self.variable_len(&desc.key)?;
        self.var_mut(&desc.key)?.put_values(&vec![missing; len], ..)?;
        Ok(())
    }

    fn variable_len(&self, name: &str) -> Result<usize> {
        Ok(self
            .file
            .variable(name)
            .ok_or_else(|| EpicError::MissingVariable(name.to_string()))?
            .dimensions()
            .iter()
            .map(|d| d.len())
            .product())
    }

    // ─────────────────────────────────────────────────────────────────
    // History
    // ─────────────────────────────────────────────────────────────────
    pub fn history(&self) -> Result<String> {
        match self.file.attribute(HISTORY_ATTR) {
            Some(attr) => Ok(match attr.value()? {
                AttributeValue::Str(s) => s,
                other => format!("{other:?}"),
            }),
            None => Ok(String::new()),
        }
    }

    /// Append `"<Month DD, YYYY HH:MM UTC> note"` on a new line.
    pub fn append_history(&mut self, note: &str) -> Result<()> {
        self.append_history_at(note, Utc::now().naive_utc())
    }

    pub fn append_history_at(&mut self, note: &str, now: NaiveDateTime) -> Result<()> {
        let line = format!("{} {}", now.format(HISTORY_STAMP), note);
        let history = append_line(&self.history()?, &line);
        self.define()?;
        self.file.add_attribute(HISTORY_ATTR, history.as_str())?;
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        debug!(path = %self.path.display(), "closing container");
        self.file.close()?;
        Ok(())
    }

    fn define(&mut self) -> Result<()> {
        if !self.define_mode {
            self.file.redef()?;
            self.define_mode = true;
        }
        Ok(())
    }

    fn data(&mut self) -> Result<()> {
        if self.define_mode {
            self.file.enddef()?;
            self.define_mode = false;
        }
        Ok(())
    }

    fn var_mut(&mut self, name: &str) -> Result<VariableMut<'_>> {
        self.data()?;
        self.file
            .variable_mut(name)
            .ok_or_else(|| EpicError::MissingVariable(name.to_string()))
    }
}

fn append_line(previous: &str, line: &str) -> String {
    if previous.trim().is_empty() {
        line.to_string()
    } else {
        format!("{previous}\n{line}")
    }
}

fn put_coordinate_attrs(v: &mut VariableMut<'_>, c: &Coordinate) -> Result<()> {
    v.put_attribute("name", c.name)?;
    v.put_attribute("long_name", c.long_name)?;
    v.put_attribute("generic_name", c.long_name)?;
    v.put_attribute("FORTRAN_format", "")?;
    v.put_attribute("units", c.units)?;
    v.put_attribute("type", "EVEN")?;
    v.put_attribute("epic_code", c.epic_code)?;
    Ok(())
}

fn put_descriptor_attrs(v: &mut VariableMut<'_>, d: &VariableDescriptor) -> Result<()> {
    v.put_attribute("name", d.name.as_str())?;
    v.put_attribute("long_name", d.long_name.as_str())?;
    v.put_attribute("generic_name", d.generic_name.as_str())?;
    v.put_attribute("FORTRAN_format", d.fortran_format.as_str())?;
    v.put_attribute("units", d.units.as_str())?;
    v.put_attribute("type", "")?;
    v.put_attribute("epic_code", d.epic_code)?;
    Ok(())
}
