//! Joining discrete samples to bottle reports and CTD depths to bottle depths.

use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::{
    error::{EpicError, Result},
    is_missing,
};

/// Cast/niskin pair used to join independently captured tables.
///
/// Field order makes the derived `Ord` agree with the lexical order of the
/// rendered `"CCC_NN"` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CastNiskin {
    pub cast: u16,
    pub niskin: u8,
}

impl CastNiskin {
    pub const MAX_CAST: i64 = 999;
    pub const MAX_NISKIN: i64 = 99;

    pub fn new(cast: i64, niskin: i64) -> Result<Self> {
        if !(0..=Self::MAX_CAST).contains(&cast) || !(0..=Self::MAX_NISKIN).contains(&niskin) {
            return Err(EpicError::KeyRange { cast, niskin });
        }
        Ok(Self {
            cast: cast as u16,
            niskin: niskin as u8,
        })
    }
}

impl fmt::Display for CastNiskin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}_{:02}", self.cast, self.niskin)
    }
}

impl FromStr for CastNiskin {
    type Err = EpicError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || EpicError::Parse {
            source_name: "cast/niskin key".to_string(),
            line: 0,
            message: format!("{s:?} is not CCC_NN"),
        };
        let (cast, niskin) = s.split_once('_').ok_or_else(bad)?;
        if cast.len() != 3 || niskin.len() != 2 {
            return Err(bad());
        }
        Self::new(
            cast.parse().map_err(|_| bad())?,
            niskin.parse().map_err(|_| bad())?,
        )
    }
}

/// `"{cast:03}_{bottle:02}"`, the join key shared by every discrete table.
pub fn build_composite_key(cast: i64, bottle: i64) -> Result<String> {
    Ok(CastNiskin::new(cast, bottle)?.to_string())
}

/// `ctd007` → 7. Case-insensitive; a run-name prefix such as `dy1707l1ctd007` is allowed.
pub fn parse_cast_name(name: &str) -> Result<u16> {
    let bad = || EpicError::CastName(name.to_string());
    let lower = name.trim().to_ascii_lowercase();
    let (_, digits) = lower.rsplit_once("ctd").ok_or_else(bad)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let cast: i64 = digits.parse().map_err(|_| bad())?;
    if cast > CastNiskin::MAX_CAST {
        return Err(bad());
    }
    Ok(cast as u16)
}

// ─────────────────────────────────────────────────────────────────────
// Full outer join
// ─────────────────────────────────────────────────────────────────────

/// One output row of [`outer_join`]. At least one side is always present.
#[derive(Debug, Clone, PartialEq)]
pub struct Joined<A, B> {
    pub key: CastNiskin,
    pub left: Option<A>,
    pub right: Option<B>,
}

impl<A, B> Joined<A, B> {
    pub fn is_matched(&self) -> bool {
        self.left.is_some() && self.right.is_some()
    }
}

/// Full outer join on the cast/niskin key.
///
/// Unmatched rows on either side are kept with the other side empty.
/// Repeated keys produce every left×right pairing. Output is sorted by key,
/// ties keep input order (left first, then right).
pub fn outer_join<A: Clone, B: Clone>(
    left: Vec<(CastNiskin, A)>,
    right: Vec<(CastNiskin, B)>,
) -> Vec<Joined<A, B>> {
    let mut groups: BTreeMap<CastNiskin, (Vec<A>, Vec<B>)> = BTreeMap::new();
    for (key, row) in left {
        groups.entry(key).or_default().0.push(row);
    }
    for (key, row) in right {
        groups.entry(key).or_default().1.push(row);
    }

    let mut out = Vec::new();
    for (key, (lefts, rights)) in groups {
        match (lefts.is_empty(), rights.is_empty()) {
            (false, true) => out.extend(lefts.into_iter().map(|l| Joined {
                key,
                left: Some(l),
                right: None,
            })),
            (true, false) => out.extend(rights.into_iter().map(|r| Joined {
                key,
                left: None,
                right: Some(r),
            })),
            _ => {
                for l in &lefts {
                    for r in &rights {
                        out.push(Joined {
                            key,
                            left: Some(l.clone()),
                            right: Some(r.clone()),
                        });
                    }
                }
            }
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────
// Depth matching
// ─────────────────────────────────────────────────────────────────────

/// For every CTD depth, the index of the first `other` depth that rounds to the
/// same whole number, or `None`.
///
/// Rounding is half-to-even on both sides. When several `other` depths round
/// to the same value the lowest index wins. Sentinel and non-finite depths
/// never match.
pub fn match_nearest_depth(ctd_depths: &[f64], other_depths: &[f64]) -> Vec<Option<usize>> {
    let mut first_at: BTreeMap<i64, usize> = BTreeMap::new();
    for (i, &d) in other_depths.iter().enumerate() {
        if let Some(bin) = depth_bin(d) {
            first_at.entry(bin).or_insert(i);
        }
    }
    ctd_depths
        .iter()
        .map(|&d| depth_bin(d).and_then(|bin| first_at.get(&bin).copied()))
        .collect()
}

fn depth_bin(depth: f64) -> Option<i64> {
    if !depth.is_finite() || is_missing(depth) {
        return None;
    }
    Some(depth.round_ties_even() as i64)
}
