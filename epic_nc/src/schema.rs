//! EPIC variable dictionary.
//!
//! A schema file maps EPIC keys to descriptors:
//!
//! ```yaml
//! T_28:
//!   sbe_label: T090C
//!   name: T
//!   longname: TEMPERATURE (C)
//!   generic_name: temp
//!   units: C
//!   fortran_format: f10.2
//!   EPIC_KEY: 28
//! ```
//!
//! Key order in the file is the order variables are declared in the output.
//! `sbe_label` may be a single column name or a list of aliases tried in order.

use std::{
    fmt,
    fs,
    path::{Path, PathBuf},
};

use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer,
};

use crate::error::{EpicError, Result};

/// One declared output variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDescriptor {
    pub key: String,
    pub sbe_labels: Vec<String>,
    pub name: String,
    pub long_name: String,
    pub generic_name: String,
    pub units: String,
    pub fortran_format: String,
    pub epic_code: i32,
}

impl VariableDescriptor {
    /// First alias present in `columns`.
    pub fn resolve_label<'a, S: AsRef<str>>(&'a self, columns: &[S]) -> Option<&'a str> {
        self.sbe_labels
            .iter()
            .find(|label| columns.iter().any(|c| c.as_ref() == label.as_str()))
            .map(String::as_str)
    }
}

/// Ordered, validated set of descriptors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EpicSchema {
    variables: Vec<VariableDescriptor>,
}

impl EpicSchema {
    pub fn new(variables: Vec<VariableDescriptor>) -> Result<Self> {
        if variables.is_empty() {
            return Err(EpicError::EmptySchema);
        }
        Ok(Self { variables })
    }

    pub fn variables(&self) -> &[VariableDescriptor] {
        &self.variables
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|v| v.key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&VariableDescriptor> {
        self.variables.iter().find(|v| v.key == key)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: RawSchema = serde_json::from_str(text).map_err(|e| EpicError::Config {
            path: PathBuf::from("<json>"),
            message: e.to_string(),
        })?;
        raw.validate()
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let raw: RawSchema = serde_yaml::from_str(text).map_err(|e| EpicError::Config {
            path: PathBuf::from("<yaml>"),
            message: e.to_string(),
        })?;
        raw.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// `.json`/`.pyini` are JSON, `.yaml`/`.yml` are YAML, everything else is refused.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") | Some("pyini") => Ok(ConfigFormat::Json),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            _ => Err(EpicError::UnsupportedConfig(path.to_path_buf())),
        }
    }
}

/// Load and validate a schema file, picking the parser from the extension.
pub fn load_schema(path: &Path) -> Result<EpicSchema> {
    let format = ConfigFormat::from_path(path)?;
    let text = fs::read_to_string(path).map_err(|e| EpicError::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let parsed = match format {
        ConfigFormat::Json => EpicSchema::from_json_str(&text),
        ConfigFormat::Yaml => EpicSchema::from_yaml_str(&text),
    };
    // re-tag parse errors with the real path
    parsed.map_err(|e| match e {
        EpicError::Config { message, .. } => EpicError::Config {
            path: path.to_path_buf(),
            message,
        },
        other => other,
    })
}

// ─────────────────────────────────────────────────────────────────────
// Raw (unvalidated) form
// ─────────────────────────────────────────────────────────────────────
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Labels {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Code {
    Int(i64),
    Text(String),
}

#[derive(Debug, Default, Deserialize)]
struct RawDescriptor {
    #[serde(default)]
    sbe_label: Option<Labels>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    longname: Option<String>,
    #[serde(default)]
    generic_name: Option<String>,
    #[serde(default)]
    units: Option<String>,
    #[serde(default, alias = "fortran")]
    fortran_format: Option<String>,
    #[serde(default, rename = "EPIC_KEY")]
    epic_key: Option<Code>,
}

struct RawSchema(Vec<(String, RawDescriptor)>);

impl<'de> Deserialize<'de> for RawSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedEntries;

        impl<'de> Visitor<'de> for OrderedEntries {
            type Value = RawSchema;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of EPIC key to variable descriptor")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<RawSchema, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, RawDescriptor>()? {
                    entries.push((key, value));
                }
                Ok(RawSchema(entries))
            }
        }

        deserializer.deserialize_map(OrderedEntries)
    }
}

impl RawSchema {
    fn validate(self) -> Result<EpicSchema> {
        let mut variables = Vec::with_capacity(self.0.len());
        for (key, raw) in self.0 {
            if variables.iter().any(|v: &VariableDescriptor| v.key == key) {
                return Err(EpicError::Config {
                    path: PathBuf::new(),
                    message: format!("duplicate key {key}"),
                });
            }
            variables.push(raw.validate(key)?);
        }
        EpicSchema::new(variables)
    }
}

impl RawDescriptor {
    fn validate(self, key: String) -> Result<VariableDescriptor> {
        let need = |value: Option<String>, field: &'static str| {
            value.ok_or_else(|| EpicError::MissingDescriptorField {
                key: key.clone(),
                field,
            })
        };

        let name = need(self.name, "name")?;
        let long_name = need(self.longname, "longname")?;
        let generic_name = need(self.generic_name, "generic_name")?;
        let units = need(self.units, "units")?;
        let fortran_format = need(self.fortran_format, "fortran_format")?;

        let epic_code = match self.epic_key {
            Some(Code::Int(n)) => i32::try_from(n).ok(),
            Some(Code::Text(s)) => s.trim().parse().ok(),
            None => None,
        }
        .ok_or_else(|| EpicError::MissingDescriptorField {
            key: key.clone(),
            field: "EPIC_KEY",
        })?;

        // an empty or null label means "not sourced from an input column"
        let sbe_labels = match self.sbe_label {
            Some(Labels::One(s)) => vec![s],
            Some(Labels::Many(v)) => v,
            None => Vec::new(),
        }
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

        Ok(VariableDescriptor {
            key,
            sbe_labels,
            name,
            long_name,
            generic_name,
            units,
            fortran_format,
            epic_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
T_28:
  sbe_label: T090C
  name: T
  longname: TEMPERATURE (C)
  generic_name: temp
  units: C
  fortran_format: f10.2
  EPIC_KEY: 28
S_41:
  sbe_label: [Sal00, Sal11]
  name: S
  longname: SALINITY (PSU)
  generic_name: sal
  units: PSU
  fortran: f10.2
  EPIC_KEY: "41"
BTL_103:
  sbe_label:
  name: BTL
  longname: Bottle Number
  generic_name: btl
  units: ""
  fortran_format: f10.0
  EPIC_KEY: 103
"#;

    #[test]
    fn test_yaml_keeps_file_order() {
        let schema = EpicSchema::from_yaml_str(YAML).unwrap();
        let keys: Vec<_> = schema.keys().collect();
        assert_eq!(keys, vec!["T_28", "S_41", "BTL_103"]);

        let sal = schema.get("S_41").unwrap();
        assert_eq!(sal.sbe_labels, vec!["Sal00", "Sal11"]);
        assert_eq!(sal.epic_code, 41);
        assert_eq!(sal.fortran_format, "f10.2");

        assert!(schema.get("BTL_103").unwrap().sbe_labels.is_empty());
    }

    #[test]
    fn test_json_schema() {
        let json = r#"{
            "PO4_186": {"sbe_label": "PO4 (uM)", "name": "PO4", "longname": "PHOSPHATE (UMOL/KG)",
                        "generic_name": "po4", "units": "umol/kg", "fortran_format": "f10.2", "EPIC_KEY": 186},
            "NO3_182": {"sbe_label": "NO3 (uM)", "name": "NO3", "longname": "NITRATE (UMOL/KG)",
                        "generic_name": "no3", "units": "umol/kg", "fortran_format": "f10.2", "EPIC_KEY": 182}
        }"#;
        let schema = EpicSchema::from_json_str(json).unwrap();
        assert_eq!(schema.keys().collect::<Vec<_>>(), vec!["PO4_186", "NO3_182"]);
    }

    #[test]
    fn test_missing_mandatory_field_fails() {
        let yaml = "T_28:\n  name: T\n  longname: TEMP\n  generic_name: temp\n  fortran_format: f10.2\n  EPIC_KEY: 28\n";
        let err = EpicSchema::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(
            err,
            EpicError::MissingDescriptorField { ref key, field: "units" } if key == "T_28"
        ));
    }

    #[test]
    fn test_empty_schema_fails() {
        assert!(matches!(EpicSchema::from_json_str("{}"), Err(EpicError::EmptySchema)));
    }

    #[test]
    fn test_resolve_label_uses_alias_order() {
        let schema = EpicSchema::from_yaml_str(YAML).unwrap();
        let sal = schema.get("S_41").unwrap();
        assert_eq!(sal.resolve_label(&["Sal11", "Sal00"]), Some("Sal00"));
        assert_eq!(sal.resolve_label(&["Sal11"]), Some("Sal11"));
        assert_eq!(sal.resolve_label(&["T090C"]), None);
    }

    #[test]
    fn test_config_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a/btl_epickeys.yaml")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a/keys.pyini")).unwrap(), ConfigFormat::Json);
        assert!(matches!(
            ConfigFormat::from_path(Path::new("a/keys.toml")),
            Err(EpicError::UnsupportedConfig(_))
        ));
    }
}
