//! CTD profile + nutrient bottle file → one merged profile on the CTD depth grid.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::{
    error::{EpicError, Result},
    merge::match_nearest_depth,
    profile::Profile,
    reader::{AttrValue, EpicDataset},
    schema::EpicSchema,
    writer::GlobalAttributes,
    MISSING_VALUE,
};

/// Where a merged field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    Ctd,
    Nutrient,
    Missing,
}

/// Build the merged profile for one cast.
///
/// Each schema key is taken from the CTD file when it has it, otherwise from
/// the nutrient file by nearest rounded depth, otherwise left to the sentinel.
/// With `nut == None` this is a plain copy of the CTD fields.
pub fn merge_cast(
    ctd: &EpicDataset,
    nut: Option<&EpicDataset>,
    schema: &EpicSchema,
) -> Result<(Profile, BTreeMap<String, FieldSource>)> {
    let depth = ctd
        .depth()
        .ok_or_else(|| EpicError::MissingVariable("dep".to_string()))?
        .to_vec();
    let time = ctd
        .time()
        .ok_or_else(|| EpicError::MissingVariable("time".to_string()))?;

    let matches = nut.and_then(|n| n.depth()).map(|nut_depth| match_nearest_depth(&depth, nut_depth));

    let mut data = BTreeMap::new();
    let mut sources = BTreeMap::new();
    for key in schema.keys() {
        let from_ctd = ctd.get(key).filter(|v| v.len() == depth.len());
        let from_nut = nut.and_then(|n| n.get(key)).zip(matches.as_ref());

        let source = match (from_ctd, from_nut) {
            (Some(values), _) => {
                data.insert(key.to_string(), values.to_vec());
                FieldSource::Ctd
            }
            (None, Some((values, idx))) => {
                let picked = idx
                    .iter()
                    .map(|i| i.and_then(|i| values.get(i).copied()).unwrap_or(MISSING_VALUE))
                    .collect();
                data.insert(key.to_string(), picked);
                FieldSource::Nutrient
            }
            (None, None) => FieldSource::Missing,
        };
        debug!(key, ?source, "merged field");
        sources.insert(key.to_string(), source);
    }

    let profile = Profile {
        cruise: ctd.global_text("CRUISE").unwrap_or_default(),
        cast_name: ctd.global_text("CAST").unwrap_or_default(),
        time,
        latitude: ctd.latitude().unwrap_or(MISSING_VALUE),
        longitude: ctd.longitude().unwrap_or(MISSING_VALUE),
        depth,
        data,
    };
    Ok((profile, sources))
}

/// Global attributes of the CTD file carried onto the merged file, History included.
pub fn carried_globals(ctd: &EpicDataset) -> GlobalAttributes {
    let text = |name: &str| ctd.global_text(name).unwrap_or_default();
    let mut atts = GlobalAttributes {
        raw_data_file: text("DATA_CMNT"),
        cruise: ctd.global_text("CRUISE"),
        cast: ctd.global_text("CAST"),
        instrument_type: text("INST_TYPE"),
        water_mass: text("WATER_MASS"),
        prog_comment: text("PROG_CMNT01"),
        edit_comment: text("EDIT_CMNT01"),
        station_name: text("MOORING"),
        experiment: text("EXPERIMENT"),
        serial_number: text("SERIAL_NUMBER"),
        history: ctd.history(),
        ..GlobalAttributes::default()
    };
    if let Some(depth) = ctd.globals.get("WATER_DEPTH").and_then(AttrValue::as_f64) {
        atts.water_depth = depth as i32;
    }
    for name in ["STATION_NAME", "STATION_NUMBER"] {
        if let Some(v) = ctd.global_text(name) {
            atts.extra.insert(name.to_string(), v);
        }
    }
    atts
}

/// Log the copy-through case once per cast.
pub fn warn_unpaired(ctd: &EpicDataset) {
    warn!(
        cast = %ctd.global_text("CAST").unwrap_or_default(),
        file = %ctd.path.display(),
        "no matched nutrient data, copying CTD data through"
    );
}
