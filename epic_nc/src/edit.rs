//! In-place edits of existing EPIC files. Every edit is logged in `History`.

use std::path::Path;

use tracing::debug;

use crate::{
    error::{EpicError, Result},
    is_missing,
    reader::EpicDataset,
    schema::VariableDescriptor,
    writer::{EpicWriter, RECORD_DIM},
    MISSING_VALUE,
};

/// Coordinates and pressure/depth fields a surface fill never touches.
pub const SURFACE_FILL_SKIP: [&str; 10] = [
    "time", "time2", "dep", "depth", "P_1", "D_3", "lat", "latitude", "lon", "longitude",
];

fn usable(d: f64) -> bool {
    d.is_finite() && !is_missing(d)
}

/// Index of the shallowest level at or below `from`.
pub fn source_level(depth: &[f64], from: f64) -> Option<usize> {
    depth
        .iter()
        .enumerate()
        .filter(|&(_, &d)| usable(d) && d >= from)
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
}

/// Copy the value found at `from` onto every shallower level.
/// `None` when the shapes differ or nothing lies at or below `from`.
pub fn fill_to_surface(depth: &[f64], values: &[f64], from: f64) -> Option<Vec<f64>> {
    if depth.len() != values.len() {
        return None;
    }
    let source = values[source_level(depth, from)?];
    Some(
        depth
            .iter()
            .zip(values)
            .map(|(&d, &v)| if usable(d) && d < from { source } else { v })
            .collect(),
    )
}

/// Surface-fill every data field of the profile at `path` from depth `from`.
/// Returns the names of the fields that were rewritten.
pub fn surface_fill(path: &Path, from: f64) -> Result<Vec<String>> {
    let ds = EpicDataset::load(path)?;
    let depth = ds
        .depth()
        .ok_or_else(|| EpicError::MissingVariable("dep".to_string()))?;
    if source_level(depth, from).is_none() {
        return Err(EpicError::NoDepthLevel(from));
    }

    let mut nc = EpicWriter::append(path)?;
    let mut filled = Vec::new();
    for (name, values) in &ds.variables {
        if SURFACE_FILL_SKIP.contains(&name.as_str()) || name == RECORD_DIM {
            continue;
        }
        match fill_to_surface(depth, values, from) {
            Some(new) => {
                nc.put_field(name, &new)?;
                filled.push(name.clone());
            }
            None => debug!(variable = %name, "not on the depth axis, left alone"),
        }
    }
    nc.append_history(&format!("Interpolated from {from} to SFC"))?;
    nc.close()?;
    Ok(filled)
}

/// Add `desc` as a new profile field filled with the EPIC sentinel.
pub fn add_variable(path: &Path, desc: &VariableDescriptor) -> Result<()> {
    let mut nc = EpicWriter::append(path)?;
    nc.add_field(desc, MISSING_VALUE)?;
    nc.append_history(&format!("{} added", desc.key))?;
    nc.close()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_to_surface() {
        let depth = [1.0, 2.0, 3.0, 4.0, 5.0];
        let t = [9.0, 8.5, 7.0, 6.5, 6.0];
        assert_eq!(fill_to_surface(&depth, &t, 3.0).unwrap(), vec![7.0, 7.0, 7.0, 6.5, 6.0]);
        // nothing shallower than the first level
        assert_eq!(fill_to_surface(&depth, &t, 1.0).unwrap(), t.to_vec());
    }

    #[test]
    fn test_fill_between_levels_uses_next_deeper() {
        let depth = [0.5, 2.5, 4.5];
        let s = [30.0, 31.0, 32.0];
        assert_eq!(fill_to_surface(&depth, &s, 2.0).unwrap(), vec![31.0, 31.0, 32.0]);
    }

    #[test]
    fn test_fill_ignores_sentinel_depths() {
        let depth = [MISSING_VALUE, 2.0, 3.0];
        let v = [1.0, 2.0, 3.0];
        assert_eq!(fill_to_surface(&depth, &v, 3.0).unwrap(), vec![1.0, 3.0, 3.0]);
        assert_eq!(source_level(&depth, 10.0), None);
        assert_eq!(fill_to_surface(&depth, &v[..2], 3.0), None);
    }
}
