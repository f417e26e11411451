use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use chrono::NaiveDateTime;
use netcdf::AttributeValue;

use crate::{
    error::{EpicError, Result},
    time::{try_to_calendar, EpicTime, TimeUnits},
    writer::{COORDINATE_NAMES, HISTORY_ATTR, RECORD_DIM},
};

/// Attribute value as read back from a container.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Int(i64),
    Float(f64),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(i) => Some(*i as f64),
            AttrValue::Float(f) => Some(*f),
            AttrValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<AttributeValue> for AttrValue {
    fn from(value: AttributeValue) -> Self {
        match value {
            AttributeValue::Str(s) => AttrValue::Text(s),
            AttributeValue::Short(i) => AttrValue::Int(i.into()),
            AttributeValue::Int(i) => AttrValue::Int(i.into()),
            AttributeValue::Longlong(i) => AttrValue::Int(i),
            AttributeValue::Float(f) => AttrValue::Float(f.into()),
            AttributeValue::Double(f) => AttrValue::Float(f),
            AttributeValue::Shorts(v) => AttrValue::Ints(v.into_iter().map(i64::from).collect()),
            AttributeValue::Ints(v) => AttrValue::Ints(v.into_iter().map(i64::from).collect()),
            AttributeValue::Floats(v) => AttrValue::Floats(v.into_iter().map(f64::from).collect()),
            AttributeValue::Doubles(v) => AttrValue::Floats(v),
            other => AttrValue::Text(format!("{other:?}")),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |v: Vec<String>| v.join(",");
        match self {
            AttrValue::Text(s) => f.write_str(s),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Float(x) => write!(f, "{x}"),
            AttrValue::Ints(v) => f.write_str(&join(v.iter().map(|x| x.to_string()).collect())),
            AttrValue::Floats(v) => f.write_str(&join(v.iter().map(|x| x.to_string()).collect())),
        }
    }
}

/// Read side of an EPIC container.
pub struct EpicReader {
    file: netcdf::File,
    path: PathBuf,
}

impl EpicReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = netcdf::open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn global_attributes(&self) -> Result<BTreeMap<String, AttrValue>> {
        let mut out = BTreeMap::new();
        for attr in self.file.attributes() {
            out.insert(attr.name().to_string(), AttrValue::from(attr.value()?));
        }
        Ok(out)
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.file.variables().map(|v| v.name()).collect()
    }

    pub fn variable_attributes(&self, name: &str) -> Result<BTreeMap<String, AttrValue>> {
        let var = self
            .file
            .variable(name)
            .ok_or_else(|| EpicError::MissingVariable(name.to_string()))?;
        let mut out = BTreeMap::new();
        for attr in var.attributes() {
            out.insert(attr.name().to_string(), AttrValue::from(attr.value()?));
        }
        Ok(out)
    }

    /// All values of `name`, flattened. For a (1, depth, 1, 1) field this is
    /// the depth profile.
    pub fn values(&self, name: &str) -> Result<Vec<f64>> {
        let var = self
            .file
            .variable(name)
            .ok_or_else(|| EpicError::MissingVariable(name.to_string()))?;
        Ok(var.get_values::<f64, _>(..)?)
    }

    /// First `time`/`time2` pair.
    pub fn epic_time(&self) -> Result<EpicTime> {
        let first = |name: &str| -> Result<i32> {
            self.values(name)?
                .first()
                .map(|&v| v as i32)
                .ok_or_else(|| EpicError::MissingVariable(name.to_string()))
        };
        EpicTime::new(first("time")?, first("time2")?)
    }

    pub fn read_all(&self) -> Result<EpicDataset> {
        let mut variables = BTreeMap::new();
        for name in self.variable_names() {
            let values = self.values(&name)?;
            variables.insert(name, values);
        }
        let time_units = self
            .variable_attributes("time")
            .ok()
            .and_then(|atts| atts.get("units").and_then(|u| u.as_text().map(str::to_string)));

        Ok(EpicDataset {
            path: self.path.clone(),
            globals: self.global_attributes()?,
            variables,
            time_units,
        })
    }

    pub fn close(self) {
        drop(self.file);
    }
}

/// Everything in one container, loaded into memory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EpicDataset {
    pub path: PathBuf,
    pub globals: BTreeMap<String, AttrValue>,
    pub variables: BTreeMap<String, Vec<f64>>,
    pub time_units: Option<String>,
}

pub const DEPTH_NAMES: [&str; 2] = ["dep", "depth"];

impl EpicDataset {
    pub fn load(path: &Path) -> Result<Self> {
        let reader = EpicReader::open(path)?;
        let ds = reader.read_all()?;
        reader.close();
        Ok(ds)
    }

    pub fn global_text(&self, name: &str) -> Option<String> {
        self.globals.get(name).map(|v| v.to_string())
    }

    pub fn history(&self) -> String {
        self.global_text(HISTORY_ATTR).unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.variables.get(name).map(Vec::as_slice)
    }

    pub fn depth(&self) -> Option<&[f64]> {
        DEPTH_NAMES.iter().find_map(|n| self.get(n))
    }

    pub fn latitude(&self) -> Option<f64> {
        self.get("lat").and_then(|v| v.first().copied())
    }

    pub fn longitude(&self) -> Option<f64> {
        self.get("lon").and_then(|v| v.first().copied())
    }

    /// Cast time from EPIC words, or from a UDUNITS `time` when there is no `time2`.
    /// Fill-valued or out-of-range words give `None`.
    pub fn time(&self) -> Option<NaiveDateTime> {
        let t = self.get("time")?.first().copied()?;
        match self.get("time2").and_then(|v| v.first().copied()) {
            Some(t2) => try_to_calendar(t as i32, t2 as i32),
            None => {
                let units = TimeUnits::parse(self.time_units.as_deref()?).ok()?;
                units.decode(t)
            }
        }
    }

    /// Data variables: everything that is not a coordinate.
    pub fn data_keys(&self) -> Vec<&str> {
        self.variables
            .keys()
            .map(String::as_str)
            .filter(|k| !COORDINATE_NAMES.contains(k) && *k != RECORD_DIM)
            .collect()
    }
}
