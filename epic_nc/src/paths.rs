//! Directory listings and the per-cast output naming scheme.

use std::path::{Path, PathBuf};

use glob::glob;

use crate::error::{EpicError, Result};

/// Every file directly under `dir` whose name ends in `suffix`, sorted.
pub fn list_nc_files(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*{}", dir.display(), suffix);
    let mut v: Vec<_> = glob(&pattern)
        .map_err(|e| EpicError::Parse {
            source_name: pattern.clone(),
            line: 0,
            message: e.to_string(),
        })?
        .filter_map(std::result::Result::ok)
        .filter(|p| p.is_file())
        .collect();
    v.sort();
    Ok(v)
}

/// `<cruise><cast>_<suffix>.nc`, lowercase, with `ctd` shortened to `c`:
/// `DY1707`, `ctd001`, `btl` → `dy1707c001_btl.nc`.
pub fn profile_file_name(cruise: &str, cast_name: &str, suffix: &str) -> String {
    format!(
        "{}{}_{}.nc",
        cruise.to_lowercase(),
        cast_name.to_lowercase().replace("ctd", "c"),
        suffix
    )
}

pub fn profile_path(out_dir: &Path, cruise: &str, cast_name: &str, suffix: &str) -> PathBuf {
    out_dir.join(profile_file_name(cruise, cast_name, suffix))
}

/// Swap the trailing `_<from>.nc` of a file name for `_<to>.nc` and place the
/// result in `dir`. `None` when the name does not carry that suffix.
pub fn paired_path(path: &Path, from: &str, to: &str, dir: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(&format!("_{from}.nc"))?;
    Some(dir.join(format!("{stem}_{to}.nc")))
}
