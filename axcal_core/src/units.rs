//! Physical units and unit-tagged quantities.
//!
//! This is the small physical-quantity capability the calibration code needs:
//! - a fixed vocabulary of units, looked up by symbol or name
//! - dimensionality checks and conversion factors between compatible units
//! - [`Quantity`] (a value tagged with a unit) and [`Scalar`] (plain or tagged)
//!
//! It is deliberately not a unit algebra: units are never multiplied together.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::ops::Mul;
use std::str::FromStr;

// ============================================================================
// Dimensionality
// ============================================================================

/// Exponents of the base dimensions a unit is made of.
///
/// Order: length, mass, time, current, temperature, amount, luminosity, angle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Dimensionality([i8; 8]);

impl Dimensionality {
    pub const NONE: Self = Self([0; 8]);

    const fn of(length: i8, mass: i8, time: i8, current: i8, temperature: i8, angle: i8) -> Self {
        Self([length, mass, time, current, temperature, 0, 0, angle])
    }

    pub fn is_dimensionless(&self) -> bool {
        *self == Self::NONE
    }
}

impl fmt::Display for Dimensionality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const BASES: [&str; 8] = ["L", "M", "T", "I", "Θ", "N", "J", "rad"];
        let parts: Vec<String> = BASES
            .iter()
            .zip(self.0.iter())
            .filter(|(_, exp)| **exp != 0)
            .map(|(base, exp)| {
                if *exp == 1 {
                    base.to_string()
                } else {
                    format!("{}^{}", base, exp)
                }
            })
            .collect();

        if parts.is_empty() {
            write!(f, "dimensionless")
        } else {
            write!(f, "{}", parts.join("·"))
        }
    }
}

const LENGTH: Dimensionality = Dimensionality::of(1, 0, 0, 0, 0, 0);
const INVERSE_LENGTH: Dimensionality = Dimensionality::of(-1, 0, 0, 0, 0, 0);
const MASS: Dimensionality = Dimensionality::of(0, 1, 0, 0, 0, 0);
const TIME: Dimensionality = Dimensionality::of(0, 0, 1, 0, 0, 0);
const FREQUENCY: Dimensionality = Dimensionality::of(0, 0, -1, 0, 0, 0);
const CURRENT: Dimensionality = Dimensionality::of(0, 0, 0, 1, 0, 0);
const POTENTIAL: Dimensionality = Dimensionality::of(2, 1, -3, -1, 0, 0);
const RESISTANCE: Dimensionality = Dimensionality::of(2, 1, -3, -2, 0, 0);
const CONDUCTANCE: Dimensionality = Dimensionality::of(-2, -1, 3, 2, 0, 0);
const CAPACITANCE: Dimensionality = Dimensionality::of(-2, -1, 4, 2, 0, 0);
const CHARGE: Dimensionality = Dimensionality::of(0, 0, 1, 1, 0, 0);
const TEMPERATURE: Dimensionality = Dimensionality::of(0, 0, 0, 0, 1, 0);
const ANGLE: Dimensionality = Dimensionality::of(0, 0, 0, 0, 0, 1);
const INVERSE_ANGLE: Dimensionality = Dimensionality::of(0, 0, 0, 0, 0, -1);

// ============================================================================
// Units
// ============================================================================

/// A unit from the fixed vocabulary.
///
/// Units compare equal by symbol. `scale` is the factor to the coherent SI
/// unit of the same dimensionality (e.g. 1e-3 for `ms`).
#[derive(Clone, Copy, Debug)]
pub struct Unit {
    symbol: &'static str,
    name: &'static str,
    dims: Dimensionality,
    scale: f64,
}

impl Unit {
    const fn define(symbol: &'static str, name: &'static str, dims: Dimensionality, scale: f64) -> Self {
        Self {
            symbol,
            name,
            dims,
            scale,
        }
    }

    pub fn symbol(&self) -> &'static str {
        self.symbol
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn dimensionality(&self) -> Dimensionality {
        self.dims
    }

    pub fn is_dimensionless(&self) -> bool {
        self.dims.is_dimensionless()
    }

    /// Look up a unit by symbol, name or alias.
    pub fn from_name_or_symbol(s: &str) -> Option<Unit> {
        LOOKUP.get(s.trim()).copied()
    }

    /// Whether a conversion factor exists from `self` to `other`.
    pub fn is_convertible_to(&self, other: Unit) -> bool {
        self.dims == other.dims
    }

    /// Factor `f` such that `x [self] == x * f [to]`.
    pub fn conversion_factor(&self, to: Unit) -> Result<f64> {
        if self.dims != to.dims {
            return Err(Error::IncompatibleUnits {
                from: format!("{} ({})", self.symbol, self.dims),
                to: format!("{} ({})", to.symbol, to.dims),
            });
        }
        if self == &to {
            return Ok(1.0);
        }
        Ok(self.scale / to.scale)
    }

    /// Every unit in the vocabulary.
    pub fn all() -> &'static [Unit] {
        UNITS
    }
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
    }
}

impl Eq for Unit {}

impl std::hash::Hash for Unit {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.symbol.hash(state);
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Unit::from_name_or_symbol(s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown unit '{}'", s)))
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.symbol)
    }
}

impl<'de> Deserialize<'de> for Unit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Plain dimensionless unit.
pub const DIMENSIONLESS: Unit = Unit::define("dimensionless", "dimensionless", Dimensionality::NONE, 1.0);
/// Default unit for channel values.
pub const ARBITRARY_UNIT: Unit = Unit::define("a.u.", "arbitrary unit", Dimensionality::NONE, 1.0);
/// Default unit for non-channel axis values (one sample).
pub const PIXEL_UNIT: Unit = Unit::define("pixel", "pixel", Dimensionality::NONE, 1.0);
/// Unit of a channel axis itself when it has several channels.
pub const CHANNEL_UNIT: Unit = Unit::define("channel", "channel", Dimensionality::NONE, 1.0);

const DAY: f64 = 86_400.0;
const WEEK: f64 = 7.0 * DAY;

static UNITS: &[Unit] = &[
    DIMENSIONLESS,
    ARBITRARY_UNIT,
    PIXEL_UNIT,
    CHANNEL_UNIT,
    // time
    Unit::define("s", "second", TIME, 1.0),
    Unit::define("ms", "millisecond", TIME, 1e-3),
    Unit::define("us", "microsecond", TIME, 1e-6),
    Unit::define("ns", "nanosecond", TIME, 1e-9),
    Unit::define("min", "minute", TIME, 60.0),
    Unit::define("h", "hour", TIME, 3_600.0),
    Unit::define("d", "day", TIME, DAY),
    Unit::define("week", "week", TIME, WEEK),
    Unit::define("div", "day in vitro", TIME, DAY),
    Unit::define("wiv", "week in vitro", TIME, WEEK),
    Unit::define("pnd", "postnatal day", TIME, DAY),
    Unit::define("pnw", "postnatal week", TIME, WEEK),
    Unit::define("emd", "embryonic day", TIME, DAY),
    Unit::define("emw", "embryonic week", TIME, WEEK),
    // length
    Unit::define("m", "meter", LENGTH, 1.0),
    Unit::define("km", "kilometer", LENGTH, 1e3),
    Unit::define("cm", "centimeter", LENGTH, 1e-2),
    Unit::define("mm", "millimeter", LENGTH, 1e-3),
    Unit::define("um", "micrometer", LENGTH, 1e-6),
    Unit::define("nm", "nanometer", LENGTH, 1e-9),
    Unit::define("1/m", "space frequency unit", INVERSE_LENGTH, 1.0),
    // mass
    Unit::define("kg", "kilogram", MASS, 1.0),
    Unit::define("g", "gram", MASS, 1e-3),
    // frequency
    Unit::define("Hz", "hertz", FREQUENCY, 1.0),
    Unit::define("kHz", "kilohertz", FREQUENCY, 1e3),
    Unit::define("MHz", "megahertz", FREQUENCY, 1e6),
    // electrical
    Unit::define("V", "volt", POTENTIAL, 1.0),
    Unit::define("mV", "millivolt", POTENTIAL, 1e-3),
    Unit::define("uV", "microvolt", POTENTIAL, 1e-6),
    Unit::define("A", "ampere", CURRENT, 1.0),
    Unit::define("mA", "milliampere", CURRENT, 1e-3),
    Unit::define("uA", "microampere", CURRENT, 1e-6),
    Unit::define("nA", "nanoampere", CURRENT, 1e-9),
    Unit::define("pA", "picoampere", CURRENT, 1e-12),
    Unit::define("ohm", "ohm", RESISTANCE, 1.0),
    Unit::define("kohm", "kiloohm", RESISTANCE, 1e3),
    Unit::define("Mohm", "megaohm", RESISTANCE, 1e6),
    Unit::define("Gohm", "gigaohm", RESISTANCE, 1e9),
    Unit::define("S", "siemens", CONDUCTANCE, 1.0),
    Unit::define("mS", "millisiemens", CONDUCTANCE, 1e-3),
    Unit::define("uS", "microsiemens", CONDUCTANCE, 1e-6),
    Unit::define("nS", "nanosiemens", CONDUCTANCE, 1e-9),
    Unit::define("pS", "picosiemens", CONDUCTANCE, 1e-12),
    Unit::define("F", "farad", CAPACITANCE, 1.0),
    Unit::define("uF", "microfarad", CAPACITANCE, 1e-6),
    Unit::define("nF", "nanofarad", CAPACITANCE, 1e-9),
    Unit::define("pF", "picofarad", CAPACITANCE, 1e-12),
    Unit::define("C", "coulomb", CHARGE, 1.0),
    Unit::define("pC", "picocoulomb", CHARGE, 1e-12),
    // temperature (kelvin only; offset scales are not conversions by factor)
    Unit::define("K", "kelvin", TEMPERATURE, 1.0),
    // angle
    Unit::define("rad", "radian", ANGLE, 1.0),
    Unit::define("deg", "arcdegree", ANGLE, std::f64::consts::PI / 180.0),
    Unit::define("1/rad", "angle frequency unit", INVERSE_ANGLE, 1.0),
];

const ALIASES: &[(&str, &str)] = &[
    ("µs", "us"),
    ("μs", "us"),
    ("µm", "um"),
    ("μm", "um"),
    ("µV", "uV"),
    ("μV", "uV"),
    ("µA", "uA"),
    ("µS", "uS"),
    ("µF", "uF"),
    ("Ω", "ohm"),
    ("kΩ", "kohm"),
    ("MΩ", "Mohm"),
    ("GΩ", "Gohm"),
    ("sec", "s"),
    ("hr", "h"),
    ("day", "d"),
    ("metre", "m"),
    ("degree", "deg"),
    ("au", "a.u."),
];

/// Symbol, name and alias lookup, built once.
static LOOKUP: Lazy<HashMap<&'static str, Unit>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for unit in UNITS {
        map.insert(unit.name, *unit);
    }
    // symbols take precedence over names that happen to collide
    for unit in UNITS {
        map.insert(unit.symbol, *unit);
    }
    for (alias, symbol) in ALIASES {
        if let Some(unit) = UNITS.iter().find(|u| u.symbol == *symbol) {
            map.insert(*alias, *unit);
        }
    }
    map
});

// ============================================================================
// Quantities
// ============================================================================

/// A value tagged with a unit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// The value expressed in `target` units.
    pub fn value_in(&self, target: Unit) -> Result<f64> {
        Ok(self.value * self.unit.conversion_factor(target)?)
    }

    /// A copy of this quantity expressed in `target` units.
    pub fn rescale(&self, target: Unit) -> Result<Quantity> {
        Ok(Quantity::new(self.value_in(target)?, target))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

impl Mul<Unit> for f64 {
    type Output = Quantity;

    fn mul(self, unit: Unit) -> Quantity {
        Quantity::new(self, unit)
    }
}

impl Mul<f64> for Quantity {
    type Output = Quantity;

    fn mul(self, rhs: f64) -> Quantity {
        Quantity::new(self.value * rhs, self.unit)
    }
}

/// A scalar argument that may or may not carry a unit.
///
/// Plain values are interpreted in whatever units the receiving axis or
/// channel already uses.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar {
    Plain(f64),
    Tagged(Quantity),
}

impl Scalar {
    pub fn unit(&self) -> Option<Unit> {
        match self {
            Scalar::Plain(_) => None,
            Scalar::Tagged(q) => Some(q.unit),
        }
    }

    /// The magnitude expressed in `target` units (plain values pass through).
    pub fn value_in(&self, target: Unit) -> Result<f64> {
        match self {
            Scalar::Plain(v) => Ok(*v),
            Scalar::Tagged(q) => q.value_in(target),
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Plain(value)
    }
}

impl From<Quantity> for Scalar {
    fn from(q: Quantity) -> Self {
        Scalar::Tagged(q)
    }
}

/// Test shorthand: `unit("mV")`. Callers parse with `str::parse::<Unit>()`,
/// which rejects unknown symbols.
#[cfg(test)]
pub(crate) fn unit(symbol: &str) -> Unit {
    Unit::from_name_or_symbol(symbol).unwrap_or_else(|| panic!("unknown unit {:?}", symbol))
}
