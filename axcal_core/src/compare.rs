//! Tolerance-based comparison of calibrations.
//!
//! Two calibrations of the same axis key match when, in this order:
//! the type flags are equal, the units are convertible, the origins are
//! close, and the resolutions are close. Channels axes additionally need
//! equal channel counts and matching channels, compared by position.
//! Names and descriptions are never compared.

use crate::axes::AsAxisKey;
use crate::service::AxisCalibration;
use crate::types::{CalibrationRecord, ChannelRecord};
use crate::units::Unit;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn default_rtol() -> f64 {
    1e-4
}

fn default_atol() -> f64 {
    1e-4
}

fn default_equal_nan() -> bool {
    true
}

/// Closeness rule: `|a - b| <= atol + rtol * |b|`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    #[serde(default = "default_rtol")]
    pub rtol: f64,
    #[serde(default = "default_atol")]
    pub atol: f64,
    /// Whether two NaNs count as close.
    #[serde(default = "default_equal_nan")]
    pub equal_nan: bool,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            rtol: default_rtol(),
            atol: default_atol(),
            equal_nan: default_equal_nan(),
        }
    }
}

impl Tolerance {
    pub fn is_close(&self, a: f64, b: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            return self.equal_nan && a.is_nan() && b.is_nan();
        }
        if a.is_infinite() || b.is_infinite() {
            return a == b;
        }
        (a - b).abs() <= self.atol + self.rtol * b.abs()
    }
}

/// Calibration properties to leave out of a comparison.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ignore {
    pub units: bool,
    pub origin: bool,
    pub resolution: bool,
}

impl Ignore {
    pub const NOTHING: Self = Self {
        units: false,
        origin: false,
        resolution: false,
    };

    pub fn units() -> Self {
        Self {
            units: true,
            ..Self::NOTHING
        }
    }

    pub fn origin() -> Self {
        Self {
            origin: true,
            ..Self::NOTHING
        }
    }

    pub fn resolution() -> Self {
        Self {
            resolution: true,
            ..Self::NOTHING
        }
    }
}

impl FromStr for Ignore {
    type Err = Error;

    /// Comma-separated subset of `units`, `origin`, `resolution`.
    fn from_str(s: &str) -> Result<Self> {
        let mut ignore = Ignore::NOTHING;
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.to_lowercase().as_str() {
                "units" => ignore.units = true,
                "origin" => ignore.origin = true,
                "resolution" => ignore.resolution = true,
                other => {
                    return Err(Error::InvalidArgument(format!(
                        "cannot ignore '{}': expected units, origin or resolution",
                        other
                    )))
                }
            }
        }
        Ok(ignore)
    }
}

impl fmt::Display for Ignore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [
            (self.units, "units"),
            (self.origin, "origin"),
            (self.resolution, "resolution"),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| *name)
        .collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Units, origin and resolution of an axis or one channel.
#[derive(Clone, Copy, Debug)]
struct Triple {
    units: Unit,
    origin: f64,
    resolution: f64,
}

impl From<&ChannelRecord> for Triple {
    fn from(c: &ChannelRecord) -> Self {
        Self {
            units: c.units,
            origin: c.origin,
            resolution: c.resolution,
        }
    }
}

/// Axis-level values; a Channels axis is represented by its default channel.
fn axis_triple(record: &CalibrationRecord) -> Triple {
    let default_channel = record
        .channels
        .get(&0)
        .or_else(|| record.channels.values().next());
    match (record.is_channels(), default_channel) {
        (true, Some(channel)) => Triple::from(channel),
        _ => Triple {
            units: record.units,
            origin: record.origin,
            resolution: record.resolution,
        },
    }
}

/// Compare `other` against `mine`, converting `other` into `mine`'s units.
fn triples_match(mine: Triple, other: Triple, ignore: Ignore, tolerance: Tolerance) -> bool {
    let convertible = other.units.is_convertible_to(mine.units);
    if !ignore.units && !convertible {
        return false;
    }
    let factor = if convertible {
        other.units.conversion_factor(mine.units).unwrap_or(1.0)
    } else {
        1.0
    };

    if !ignore.origin && !tolerance.is_close(mine.origin, other.origin * factor) {
        return false;
    }
    if !ignore.resolution && !tolerance.is_close(mine.resolution, other.resolution * factor) {
        return false;
    }
    true
}

/// Whether two records describe the same calibration.
pub fn records_match(
    mine: &CalibrationRecord,
    other: &CalibrationRecord,
    ignore: Ignore,
    tolerance: Tolerance,
) -> bool {
    if mine.axis_type != other.axis_type {
        return false;
    }
    if !triples_match(axis_triple(mine), axis_triple(other), ignore, tolerance) {
        return false;
    }
    if !mine.is_channels() {
        return true;
    }
    if mine.channels.len() != other.channels.len() {
        return false;
    }
    mine.channels
        .values()
        .zip(other.channels.values())
        .all(|(a, b)| triples_match(a.into(), b.into(), ignore, tolerance))
}

impl AxisCalibration {
    /// Compare this calibration of `axis` with `other`'s calibration of the
    /// same key.
    ///
    /// Fails with `NotFound` when either side does not calibrate the key.
    pub fn is_same_as<K: AsAxisKey + ?Sized>(
        &self,
        other: &AxisCalibration,
        axis: &K,
        ignore: Ignore,
        tolerance: Tolerance,
    ) -> Result<bool> {
        let key = axis.axis_key();
        let mine = self.record(key)?;
        let theirs = other.record(key).map_err(|_| {
            Error::NotFound(format!(
                "axis '{}' not found in the calibration compared against",
                key
            ))
        })?;
        let same = records_match(mine, theirs, ignore, tolerance);
        tracing::debug!("Compared axis '{}' (ignoring [{}]): same = {}", key, ignore, same);
        Ok(same)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AxisType;
    use crate::units::unit;
    use std::collections::BTreeMap;

    fn time(units: &str, origin: f64, resolution: f64) -> CalibrationRecord {
        CalibrationRecord {
            axis_key: "t".into(),
            axis_name: None,
            axis_type: AxisType::TIME,
            units: unit(units),
            origin,
            resolution,
            channels: BTreeMap::new(),
        }
    }

    fn channels(entries: &[(usize, &str, f64, f64)]) -> CalibrationRecord {
        let mut record = CalibrationRecord::new("c", AxisType::CHANNELS);
        record.channels = entries
            .iter()
            .map(|&(i, u, o, r)| {
                (
                    i,
                    ChannelRecord {
                        name: None,
                        units: unit(u),
                        origin: o,
                        resolution: r,
                    },
                )
            })
            .collect();
        record.normalize();
        record
    }

    #[test]
    fn test_tolerance_rule() {
        let tol = Tolerance::default();
        assert!(tol.is_close(1.0, 1.00005));
        assert!(!tol.is_close(1.0, 1.01));
        assert!(tol.is_close(0.0, 0.00009));
        assert!(tol.is_close(f64::NAN, f64::NAN));
        let strict = Tolerance {
            equal_nan: false,
            ..tol
        };
        assert!(!strict.is_close(f64::NAN, f64::NAN));
        assert!(!tol.is_close(f64::NAN, 1.0));
        assert!(tol.is_close(f64::INFINITY, f64::INFINITY));
    }

    #[test]
    fn test_converted_units_compare_symmetrically() {
        let a = time("s", 0.0, 1.0);
        let b = time("ms", 0.0, 1000.0);
        let tol = Tolerance::default();
        assert!(records_match(&a, &b, Ignore::NOTHING, tol));
        assert!(records_match(&b, &a, Ignore::NOTHING, tol));
    }

    #[test]
    fn test_order_of_checks() {
        let tol = Tolerance::default();
        let a = time("s", 0.0, 1.0);
        assert!(!records_match(&a, &time("mV", 0.0, 1.0), Ignore::NOTHING, tol));
        assert!(records_match(&a, &time("mV", 0.0, 1.0), Ignore::units(), tol));
        assert!(!records_match(&a, &time("s", 3.0, 1.0), Ignore::NOTHING, tol));
        assert!(records_match(&a, &time("s", 3.0, 1.0), Ignore::origin(), tol));
        assert!(!records_match(&a, &time("s", 0.0, 2.0), Ignore::NOTHING, tol));
        assert!(records_match(&a, &time("s", 0.0, 2.0), Ignore::resolution(), tol));

        let mut space = time("s", 0.0, 1.0);
        space.axis_type = AxisType::SPACE;
        assert!(!records_match(&a, &space, Ignore::NOTHING, tol));
    }

    #[test]
    fn test_names_are_not_compared() {
        let a = time("s", 0.0, 1.0);
        let mut b = a.clone();
        b.axis_name = Some("elapsed".into());
        assert!(records_match(&a, &b, Ignore::NOTHING, Tolerance::default()));
    }

    #[test]
    fn test_channels_compared_by_position() {
        let tol = Tolerance::default();
        let a = channels(&[(0, "mV", 0.0, 1.0), (1, "pA", 0.0, 2.0)]);
        let b = channels(&[(3, "V", 0.0, 0.001), (8, "nA", 0.0, 0.002)]);
        assert!(records_match(&a, &b, Ignore::NOTHING, tol));

        let c = channels(&[(0, "mV", 0.0, 1.0)]);
        assert!(!records_match(&a, &c, Ignore::NOTHING, tol));

        let d = channels(&[(0, "mV", 0.0, 1.0), (1, "pA", 0.0, 3.0)]);
        assert!(!records_match(&a, &d, Ignore::NOTHING, tol));
    }

    #[test]
    fn test_ignore_parse() {
        let ignore: Ignore = "units, Resolution".parse().unwrap();
        assert!(ignore.units && ignore.resolution && !ignore.origin);
        assert_eq!(ignore.to_string(), "units,resolution");
        assert_eq!("".parse::<Ignore>().unwrap(), Ignore::NOTHING);
        assert!("colour".parse::<Ignore>().is_err());
    }
}
