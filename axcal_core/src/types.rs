//! Core domain types for axis calibration.
//!
//! This module defines:
//! - Axis type bit flags and the standard axis keys
//! - Per-channel and per-axis calibration records

use crate::units::{Unit, ARBITRARY_UNIT, PIXEL_UNIT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitAnd, BitOr};

// ============================================================================
// Axis Types
// ============================================================================

/// Bit flags describing the kind of an axis.
///
/// A single axis may carry several bits, e.g. a temporal frequency axis is
/// `FREQUENCY | TIME`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AxisType(pub u32);

impl AxisType {
    pub const CHANNELS: Self = Self(1);
    pub const SPACE: Self = Self(1 << 1);
    pub const ANGLE: Self = Self(1 << 2);
    pub const TIME: Self = Self(1 << 3);
    pub const FREQUENCY: Self = Self(1 << 4);
    pub const EDGE: Self = Self(1 << 5);
    pub const UNKNOWN: Self = Self(1 << 6);
    /// Every kind except channels.
    pub const NON_CHANNEL: Self = Self(62);
    pub const ALL: Self = Self(127);

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// `true` if all bits of `other` are set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_channels(self) -> bool {
        self.contains(Self::CHANNELS)
    }

    /// Type flags for one of the standard axis keys.
    pub fn from_key(key: &str) -> Option<Self> {
        STANDARD_KEYS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, flags)| *flags)
    }

    /// First standard key with exactly these flags.
    pub fn default_key(self) -> Option<&'static str> {
        STANDARD_KEYS
            .iter()
            .find(|(_, flags)| *flags == self)
            .map(|(k, _)| *k)
    }

    /// Human-readable name used when an axis has none.
    pub fn default_name(self) -> &'static str {
        if self.is_channels() {
            "Channels"
        } else if self.contains(Self::FREQUENCY | Self::SPACE) {
            "Spatial Frequency"
        } else if self.contains(Self::FREQUENCY | Self::TIME) {
            "Temporal Frequency"
        } else if self.contains(Self::FREQUENCY) {
            "Frequency"
        } else if self.contains(Self::SPACE) {
            "Space"
        } else if self.contains(Self::TIME) {
            "Time"
        } else if self.contains(Self::ANGLE) {
            "Angle"
        } else if self.contains(Self::EDGE) {
            "Edge"
        } else {
            "Unknown"
        }
    }

    /// Parse type flags from an integer bitmask or a type name.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(bits) = s.parse::<u32>() {
            return Some(Self(bits));
        }
        let lowered = s.to_lowercase();
        let flags = match lowered.as_str() {
            "channels" | "channel" => Self::CHANNELS,
            "space" => Self::SPACE,
            "angle" => Self::ANGLE,
            "time" => Self::TIME,
            "frequency" => Self::FREQUENCY,
            "spatial frequency" => Self::FREQUENCY | Self::SPACE,
            "temporal frequency" => Self::FREQUENCY | Self::TIME,
            "edge" => Self::EDGE,
            "unknown" | "unknownaxistype" => Self::UNKNOWN,
            "nonchannel" => Self::NON_CHANNEL,
            "allaxes" => Self::ALL,
            _ => return None,
        };
        Some(flags)
    }
}

impl BitOr for AxisType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for AxisType {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Default for AxisType {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for AxisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Standard axis keys and the type each one implies.
const STANDARD_KEYS: &[(&str, AxisType)] = &[
    ("x", AxisType::SPACE),
    ("y", AxisType::SPACE),
    ("z", AxisType::SPACE),
    ("t", AxisType::TIME),
    ("c", AxisType::CHANNELS),
    ("a", AxisType::ANGLE),
    ("e", AxisType::EDGE),
    ("f", AxisType::FREQUENCY),
    ("fx", AxisType(AxisType::FREQUENCY.0 | AxisType::SPACE.0)),
    ("fy", AxisType(AxisType::FREQUENCY.0 | AxisType::SPACE.0)),
    ("fz", AxisType(AxisType::FREQUENCY.0 | AxisType::SPACE.0)),
    ("ft", AxisType(AxisType::FREQUENCY.0 | AxisType::TIME.0)),
    ("?", AxisType::UNKNOWN),
];

/// Key used for axes whose kind cannot be determined.
pub const UNKNOWN_AXIS_KEY: &str = "?";

// ============================================================================
// Calibration Records
// ============================================================================

/// Calibration of a single channel inside a Channels axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub name: Option<String>,
    pub units: Unit,
    pub origin: f64,
    pub resolution: f64,
}

impl Default for ChannelRecord {
    fn default() -> Self {
        Self {
            name: None,
            units: ARBITRARY_UNIT,
            origin: 0.0,
            resolution: 1.0,
        }
    }
}

/// Calibration of one axis.
///
/// `channels` is only populated for Channels axes. While such an axis has at
/// most one channel, the axis-level `units`/`origin`/`resolution` mirror that
/// channel (see [`CalibrationRecord::normalize`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub axis_key: String,
    pub axis_name: Option<String>,
    pub axis_type: AxisType,
    pub units: Unit,
    pub origin: f64,
    pub resolution: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub channels: BTreeMap<usize, ChannelRecord>,
}

impl CalibrationRecord {
    /// Default calibration for an axis: sample units, origin 0, resolution 1.
    ///
    /// Channels axes get a single default channel 0.
    pub fn new(axis_key: impl Into<String>, axis_type: AxisType) -> Self {
        let mut record = Self {
            axis_key: axis_key.into(),
            axis_name: None,
            axis_type,
            units: PIXEL_UNIT,
            origin: 0.0,
            resolution: 1.0,
            channels: BTreeMap::new(),
        };
        if axis_type.is_channels() {
            record.channels.insert(0, ChannelRecord::default());
            record.normalize();
        }
        record
    }

    pub fn is_channels(&self) -> bool {
        self.axis_type.is_channels()
    }

    /// Sorted literal channel indices.
    pub fn channel_indices(&self) -> Vec<usize> {
        self.channels.keys().copied().collect()
    }

    /// Keep axis-level values equal to the sole channel's values.
    ///
    /// No-op for non-channel axes and for axes with two or more channels.
    pub fn normalize(&mut self) {
        if !self.is_channels() || self.channels.len() > 1 {
            return;
        }
        let first = self
            .channels
            .get(&0)
            .or_else(|| self.channels.values().next())
            .map(|c| (c.units, c.origin, c.resolution));
        if let Some((units, origin, resolution)) = first {
            self.units = units;
            self.origin = origin;
            self.resolution = resolution;
        }
    }

    /// Name to display: the stored name or the type's default.
    pub fn display_name(&self) -> &str {
        self.axis_name
            .as_deref()
            .unwrap_or_else(|| self.axis_type.default_name())
    }
}
