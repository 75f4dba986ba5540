//! The calibration service.
//!
//! [`AxisCalibration`] owns a [`CalibrationStore`] and a handle to an axis
//! collection that usually belongs to someone else. All reads and writes of
//! calibration data go through it. It re-embeds calibration text into the
//! descriptors on demand and reconciles its store with the collection in
//! [`AxisCalibration::synchronize`].

use crate::axes::{AsAxisKey, AxisDescriptor, AxisTags, SharedAxisTags};
use crate::codec;
use crate::store::{CalibrationStore, ChannelUpdate};
use crate::types::{AxisType, CalibrationRecord, ChannelRecord, UNKNOWN_AXIS_KEY};
use crate::units::{Quantity, Scalar, Unit, ARBITRARY_UNIT};
use crate::{Error, Result};
use std::fmt;
use std::ops::Range;

// ============================================================================
// Construction parameters
// ============================================================================

/// Calibration values that override whatever was decoded at construction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AtomicCalibration {
    pub units: Option<Unit>,
    pub origin: Option<Scalar>,
    pub resolution: Option<Scalar>,
    pub axis_name: Option<String>,
    /// Literal channel index the values apply to (Channels axes only).
    pub channel: Option<usize>,
    pub channel_name: Option<String>,
}

impl AtomicCalibration {
    pub fn with_units(mut self, units: Unit) -> Self {
        self.units = Some(units);
        self
    }

    pub fn with_origin(mut self, origin: impl Into<Scalar>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_resolution(mut self, resolution: impl Into<Scalar>) -> Self {
        self.resolution = Some(resolution.into());
        self
    }

    pub fn with_axis_name(mut self, name: impl Into<String>) -> Self {
        self.axis_name = Some(name.into());
        self
    }

    pub fn with_channel(mut self, channel: usize) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = Some(name.into());
        self
    }
}

/// Everything needed to build a one-axis calibration from scratch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CalibrationParams {
    /// A standard axis key (`"t"`), a type name (`"Time"`) or type bits (`"8"`).
    pub axis: Option<String>,
    /// Explicit type flags; win over the type implied by `axis`.
    pub axis_type: Option<AxisType>,
    pub values: AtomicCalibration,
}

impl CalibrationParams {
    pub fn new(axis: impl Into<String>) -> Self {
        Self {
            axis: Some(axis.into()),
            ..Default::default()
        }
    }

    pub fn with_axis_type(mut self, axis_type: AxisType) -> Self {
        self.axis_type = Some(axis_type);
        self
    }

    pub fn with_axis_name(mut self, name: impl Into<String>) -> Self {
        self.values = self.values.with_axis_name(name);
        self
    }

    pub fn with_units(mut self, units: Unit) -> Self {
        self.values = self.values.with_units(units);
        self
    }

    pub fn with_origin(mut self, origin: impl Into<Scalar>) -> Self {
        self.values = self.values.with_origin(origin);
        self
    }

    pub fn with_resolution(mut self, resolution: impl Into<Scalar>) -> Self {
        self.values = self.values.with_resolution(resolution);
        self
    }

    pub fn with_channel(mut self, channel: usize) -> Self {
        self.values = self.values.with_channel(channel);
        self
    }

    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.values = self.values.with_channel_name(name);
        self
    }

    /// Resolve the axis key and type flags.
    fn resolve_axis(&self) -> Result<(String, AxisType)> {
        let (key, implied) = match self.axis.as_deref().map(str::trim) {
            Some(given) => match AxisType::from_key(given) {
                Some(flags) => (given.to_string(), flags),
                None => {
                    let flags = AxisType::parse(given).ok_or_else(|| {
                        Error::InvalidArgument(format!(
                            "'{}' is neither an axis key nor an axis type",
                            given
                        ))
                    })?;
                    (default_key(flags), flags)
                }
            },
            None => {
                let flags = self.axis_type.ok_or_else(|| {
                    Error::InvalidArgument("an axis key or axis type is required".into())
                })?;
                (default_key(flags), flags)
            }
        };

        let mut flags = self.axis_type.unwrap_or(implied);
        if flags != implied {
            tracing::warn!(
                "Axis type {} overrides type {} implied by '{}'",
                flags,
                implied,
                key
            );
        }

        if self.values.channel.is_some() && flags == AxisType::UNKNOWN {
            flags = AxisType::CHANNELS;
            return Ok((default_key(flags), flags));
        }
        Ok((key, flags))
    }
}

fn default_key(flags: AxisType) -> String {
    flags.default_key().unwrap_or(UNKNOWN_AXIS_KEY).to_string()
}

/// Full calibration for one channel, as given to
/// [`AxisCalibration::set_channel_calibration`].
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelCalibration {
    pub name: Option<String>,
    pub units: Unit,
    pub origin: Scalar,
    pub resolution: Scalar,
}

impl Default for ChannelCalibration {
    fn default() -> Self {
        Self {
            name: None,
            units: ARBITRARY_UNIT,
            origin: Scalar::Plain(0.0),
            resolution: Scalar::Plain(1.0),
        }
    }
}

impl ChannelCalibration {
    pub fn new(units: Unit, origin: impl Into<Scalar>, resolution: impl Into<Scalar>) -> Self {
        Self {
            name: None,
            units,
            origin: origin.into(),
            resolution: resolution.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A half-open interval `[start, stop)` in calibrated units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interval(pub Scalar, pub Scalar);

impl From<(f64, f64)> for Interval {
    fn from((start, stop): (f64, f64)) -> Self {
        Interval(start.into(), stop.into())
    }
}

impl From<[f64; 2]> for Interval {
    fn from([start, stop]: [f64; 2]) -> Self {
        Interval(start.into(), stop.into())
    }
}

impl From<(Quantity, Quantity)> for Interval {
    fn from((start, stop): (Quantity, Quantity)) -> Self {
        Interval(start.into(), stop.into())
    }
}

impl TryFrom<&[f64]> for Interval {
    type Error = Error;

    fn try_from(values: &[f64]) -> Result<Self> {
        match values {
            [start, stop] => Ok(Interval::from((*start, *stop))),
            _ => Err(Error::InvalidArgument(format!(
                "an interval needs exactly two values; got {}",
                values.len()
            ))),
        }
    }
}

// ============================================================================
// Unit resolution
// ============================================================================

/// Pick the units for new values.
///
/// Explicit units win. Otherwise the existing units are kept, except that a
/// dimensionless placeholder gives way to the unit of a tagged origin or
/// resolution. Without existing units the tagged unit is used.
fn resolve_units(
    explicit: Option<Unit>,
    existing: Option<Unit>,
    origin: Option<&Scalar>,
    resolution: Option<&Scalar>,
    key: &str,
) -> Result<Unit> {
    if let Some(units) = explicit {
        return Ok(units);
    }
    let tagged = origin
        .and_then(Scalar::unit)
        .or_else(|| resolution.and_then(Scalar::unit));
    match (existing, tagged) {
        (Some(current), Some(tag)) if current.is_dimensionless() && !tag.is_dimensionless() => {
            Ok(tag)
        }
        (Some(current), _) => Ok(current),
        (None, Some(tag)) => Ok(tag),
        (None, None) => Err(Error::InvalidArgument(format!(
            "units for axis '{}' must be given, or implied by a unit-tagged origin or resolution",
            key
        ))),
    }
}

/// Apply construction-time values on top of an optional decoded record.
fn apply_atomic(
    base: Option<CalibrationRecord>,
    key: &str,
    axis_type: AxisType,
    atomic: AtomicCalibration,
) -> Result<CalibrationRecord> {
    let is_channels = axis_type.is_channels();
    let channel = match atomic.channel {
        Some(c) if !is_channels => {
            tracing::warn!(
                "Channel index {} will be ignored for axis '{}' of type {}",
                c,
                key,
                axis_type.default_name()
            );
            None
        }
        other => other,
    };

    let target = if is_channels {
        Some(match (&base, channel) {
            (_, Some(c)) => c,
            (Some(record), None) if !record.channels.contains_key(&0) => {
                record.channels.keys().next().copied().unwrap_or(0)
            }
            _ => 0,
        })
    } else {
        None
    };

    let existing = base.as_ref().map(|record| {
        target
            .and_then(|i| record.channels.get(&i))
            .map(|c| (c.units, c.origin, c.resolution))
            .unwrap_or((record.units, record.origin, record.resolution))
    });

    let units = resolve_units(
        atomic.units,
        existing.map(|e| e.0),
        atomic.origin.as_ref(),
        atomic.resolution.as_ref(),
        key,
    )?;
    let origin = match &atomic.origin {
        Some(value) => value.value_in(units)?,
        None => existing.map(|e| e.1).ok_or_else(|| {
            Error::InvalidArgument(format!("origin for axis '{}' must be given", key))
        })?,
    };
    let resolution = match &atomic.resolution {
        Some(value) => value.value_in(units)?,
        None => existing.map(|e| e.2).ok_or_else(|| {
            Error::InvalidArgument(format!("resolution for axis '{}' must be given", key))
        })?,
    };

    let mut record = base.unwrap_or_else(|| {
        let mut fresh = CalibrationRecord::new(key, axis_type);
        fresh.channels.clear();
        fresh
    });
    record.axis_key = key.to_string();
    record.axis_type = axis_type;
    if let Some(name) = atomic.axis_name {
        record.axis_name = Some(name);
    }

    match target {
        Some(index) => {
            let entry = record.channels.entry(index).or_default();
            entry.units = units;
            entry.origin = origin;
            entry.resolution = resolution;
            if let Some(name) = atomic.channel_name {
                entry.name = Some(name);
            }
            record.normalize();
        }
        None => {
            record.units = units;
            record.origin = origin;
            record.resolution = resolution;
        }
    }
    Ok(record)
}

/// Decode a descriptor's description, or default it.
///
/// The descriptor's key and type flags are authoritative; a missing axis
/// name falls back to the type's default name.
fn record_from_descriptor(descriptor: &AxisDescriptor) -> Result<CalibrationRecord> {
    let mut decoded = codec::parse_description(&descriptor.description)?;
    if let Some(decoded_type) = decoded.axis_type {
        if decoded_type != descriptor.type_flags {
            tracing::debug!(
                "Axis '{}': embedded type {} replaced by descriptor type {}",
                descriptor.key,
                decoded_type,
                descriptor.type_flags
            );
        }
    }
    if decoded.axis_name.is_none() {
        decoded.axis_name = Some(descriptor.type_flags.default_name().to_string());
    }
    Ok(decoded.into_record(&descriptor.key, descriptor.type_flags))
}

// ============================================================================
// AxisCalibration
// ============================================================================

/// Calibration data for every axis of an axis collection.
///
/// Not thread-safe: the collection handle is an `Rc<RefCell<_>>`.
#[derive(Debug)]
pub struct AxisCalibration {
    axes: SharedAxisTags,
    store: CalibrationStore,
}

impl AxisCalibration {
    /// Calibrate every axis of a shared collection, in collection order.
    ///
    /// Descriptors are re-embedded afterwards, which upgrades old-format
    /// description text in place.
    pub fn from_axes(axes: SharedAxisTags) -> Result<Self> {
        let mut store = CalibrationStore::new();
        for descriptor in axes.borrow().iter() {
            if store.contains(&descriptor.key) {
                return Err(Error::InvalidArgument(format!(
                    "axis '{}' appears more than once in the collection",
                    descriptor.key
                )));
            }
            store.set(&descriptor.key, record_from_descriptor(descriptor)?);
        }
        let calibration = Self { axes, store };
        calibration.calibrate_axes()?;
        tracing::debug!("Calibrated {} axes", calibration.store.len());
        Ok(calibration)
    }

    /// Calibrate a single descriptor, applying `overrides` on top of what its
    /// description carries. The collection is a private one-axis copy.
    pub fn from_descriptor(descriptor: &AxisDescriptor, overrides: AtomicCalibration) -> Result<Self> {
        let base = record_from_descriptor(descriptor)?;
        let record = apply_atomic(Some(base), &descriptor.key, descriptor.type_flags, overrides)?;
        Self::single(descriptor.clone(), record)
    }

    /// Build a one-axis calibration from explicit values.
    ///
    /// Axis, axis name, origin and resolution are required; units may be
    /// implied by a unit-tagged origin or resolution.
    pub fn from_params(params: CalibrationParams) -> Result<Self> {
        let (key, axis_type) = params.resolve_axis()?;
        if params.values.axis_name.is_none() {
            return Err(Error::InvalidArgument(format!(
                "axis name for axis '{}' must be given",
                key
            )));
        }
        let record = apply_atomic(None, &key, axis_type, params.values)?;
        Self::single(AxisDescriptor::new(key, axis_type), record)
    }

    /// Build a one-axis calibration from encoded calibration text.
    pub fn from_calibration_string(text: &str, overrides: AtomicCalibration) -> Result<Self> {
        if !codec::has_calibration_string(text) {
            tracing::warn!("Text carries no calibration block; using defaults");
        }
        let mut decoded = codec::parse_description(text)?;
        let key = decoded.axis_key();
        let axis_type = decoded.axis_type();
        if decoded.axis_name.is_none() {
            decoded.axis_name = Some(axis_type.default_name().to_string());
        }
        let base = decoded.into_record(&key, axis_type);
        let record = apply_atomic(Some(base), &key, axis_type, overrides)?;
        Self::single(AxisDescriptor::new(key, axis_type), record)
    }

    fn single(descriptor: AxisDescriptor, record: CalibrationRecord) -> Result<Self> {
        let mut store = CalibrationStore::new();
        store.set(&descriptor.key, record);
        let axes = AxisTags::from_descriptors(vec![descriptor])?.into_shared();
        let calibration = Self { axes, store };
        calibration.calibrate_axes()?;
        Ok(calibration)
    }

    // ------------------------------------------------------------------
    // Lookup helpers
    // ------------------------------------------------------------------

    /// The record for `key`, which must be in both the store and the collection.
    fn checked(&self, key: &str) -> Result<&CalibrationRecord> {
        if !self.axes.borrow().contains(key) {
            return Err(Error::NotFound(format!(
                "axis '{}' is not in the axis collection",
                key
            )));
        }
        self.store.get(key)
    }

    /// Units, origin and resolution of the axis, or of a channel on a
    /// Channels axis.
    fn values(&self, key: &str, channel: usize) -> Result<(Unit, f64, f64)> {
        let record = self.checked(key)?;
        if record.is_channels() {
            let c = self.store.channel(key, channel)?;
            Ok((c.units, c.origin, c.resolution))
        } else {
            Ok((record.units, record.origin, record.resolution))
        }
    }

    fn update_values<F>(&mut self, key: &str, channel: usize, f: F) -> Result<()>
    where
        F: FnOnce(&mut Unit, &mut f64, &mut f64),
    {
        let record = self.checked(key)?;
        let literal = if record.is_channels() {
            Some(self.store.resolve_channel(key, channel)?)
        } else {
            None
        };
        self.store.update(key, |record| match literal {
            Some(index) => {
                if let Some(c) = record.channels.get_mut(&index) {
                    f(&mut c.units, &mut c.origin, &mut c.resolution);
                }
            }
            None => f(&mut record.units, &mut record.origin, &mut record.resolution),
        })
    }

    fn channel_record(&self, key: &str) -> Result<&CalibrationRecord> {
        let record = self.checked(key)?;
        if !record.is_channels() {
            return Err(Error::InvalidArgument(format!(
                "axis '{}' is not a Channels axis",
                key
            )));
        }
        Ok(record)
    }

    // ------------------------------------------------------------------
    // Collection-level queries
    // ------------------------------------------------------------------

    /// The shared axis collection.
    pub fn axes(&self) -> SharedAxisTags {
        SharedAxisTags::clone(&self.axes)
    }

    pub fn store(&self) -> &CalibrationStore {
        &self.store
    }

    pub fn record<K: AsAxisKey + ?Sized>(&self, axis: &K) -> Result<&CalibrationRecord> {
        self.checked(axis.axis_key())
    }

    /// Whether the store holds calibration for the axis.
    pub fn has_axis<K: AsAxisKey + ?Sized>(&self, axis: &K) -> bool {
        self.store.contains(axis.axis_key())
    }

    pub fn has_channel_axis(&self) -> bool {
        self.store.iter().any(|(_, record)| record.is_channels())
    }

    /// Calibrated keys in collection order.
    pub fn axis_keys(&self) -> Vec<String> {
        self.axes
            .borrow()
            .iter()
            .filter(|d| self.store.contains(&d.key))
            .map(|d| d.key.clone())
            .collect()
    }

    /// Key of the collection's Channels axis, if it is calibrated.
    pub fn channel_axis_key(&self) -> Option<String> {
        self.axes
            .borrow()
            .channel_axis()
            .map(|d| d.key.clone())
            .filter(|key| self.store.contains(key))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn units<K: AsAxisKey + ?Sized>(&self, axis: &K, channel: usize) -> Result<Unit> {
        Ok(self.values(axis.axis_key(), channel)?.0)
    }

    pub fn origin<K: AsAxisKey + ?Sized>(&self, axis: &K, channel: usize) -> Result<Quantity> {
        let (units, origin, _) = self.values(axis.axis_key(), channel)?;
        Ok(origin * units)
    }

    pub fn dimensionless_origin<K: AsAxisKey + ?Sized>(&self, axis: &K, channel: usize) -> Result<f64> {
        Ok(self.values(axis.axis_key(), channel)?.1)
    }

    pub fn resolution<K: AsAxisKey + ?Sized>(&self, axis: &K, channel: usize) -> Result<Quantity> {
        let (units, _, resolution) = self.values(axis.axis_key(), channel)?;
        Ok(resolution * units)
    }

    pub fn dimensionless_resolution<K: AsAxisKey + ?Sized>(
        &self,
        axis: &K,
        channel: usize,
    ) -> Result<f64> {
        Ok(self.values(axis.axis_key(), channel)?.2)
    }

    /// `(units, origin, resolution)` of the axis or channel.
    pub fn calibration_tuple<K: AsAxisKey + ?Sized>(
        &self,
        axis: &K,
        channel: usize,
    ) -> Result<(Unit, f64, f64)> {
        self.values(axis.axis_key(), channel)
    }

    pub fn axis_name<K: AsAxisKey + ?Sized>(&self, axis: &K) -> Result<Option<&str>> {
        Ok(self.checked(axis.axis_key())?.axis_name.as_deref())
    }

    pub fn axis_type<K: AsAxisKey + ?Sized>(&self, axis: &K) -> Result<AxisType> {
        Ok(self.checked(axis.axis_key())?.axis_type)
    }

    /// Same as [`axis_type`](Self::axis_type).
    pub fn type_flags<K: AsAxisKey + ?Sized>(&self, axis: &K) -> Result<AxisType> {
        self.axis_type(axis)
    }

    /// Name of a channel; `None` for unnamed channels and non-channel axes.
    pub fn channel_name<K: AsAxisKey + ?Sized>(&self, axis: &K, channel: usize) -> Result<Option<&str>> {
        let key = axis.axis_key();
        if !self.checked(key)?.is_channels() {
            return Ok(None);
        }
        Ok(self.store.channel(key, channel)?.name.as_deref())
    }

    /// Sorted literal channel indices; empty for non-channel axes.
    pub fn channel_indices<K: AsAxisKey + ?Sized>(&self, axis: &K) -> Result<Vec<usize>> {
        Ok(self.checked(axis.axis_key())?.channel_indices())
    }

    pub fn channel_names<K: AsAxisKey + ?Sized>(&self, axis: &K) -> Result<Vec<Option<String>>> {
        let record = self.checked(axis.axis_key())?;
        Ok(record.channels.values().map(|c| c.name.clone()).collect())
    }

    pub fn channel_indices_and_names<K: AsAxisKey + ?Sized>(
        &self,
        axis: &K,
    ) -> Result<Vec<(usize, Option<String>)>> {
        let record = self.checked(axis.axis_key())?;
        Ok(record
            .channels
            .iter()
            .map(|(i, c)| (*i, c.name.clone()))
            .collect())
    }

    pub fn number_of_channels<K: AsAxisKey + ?Sized>(&self, axis: &K) -> Result<usize> {
        Ok(self.channel_record(axis.axis_key())?.channels.len())
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    /// Replace the units without converting the stored numbers.
    pub fn set_units<K: AsAxisKey + ?Sized>(&mut self, axis: &K, units: Unit, channel: usize) -> Result<()> {
        self.update_values(axis.axis_key(), channel, |u, _, _| *u = units)
    }

    /// Set the origin; tagged values are converted into the current units.
    pub fn set_origin<K: AsAxisKey + ?Sized>(
        &mut self,
        axis: &K,
        value: impl Into<Scalar>,
        channel: usize,
    ) -> Result<()> {
        let key = axis.axis_key();
        let (units, _, _) = self.values(key, channel)?;
        let origin = value.into().value_in(units)?;
        self.update_values(key, channel, |_, o, _| *o = origin)
    }

    /// Set the resolution; tagged values are converted into the current units.
    pub fn set_resolution<K: AsAxisKey + ?Sized>(
        &mut self,
        axis: &K,
        value: impl Into<Scalar>,
        channel: usize,
    ) -> Result<()> {
        let key = axis.axis_key();
        let (units, _, _) = self.values(key, channel)?;
        let resolution = value.into().value_in(units)?;
        self.update_values(key, channel, |_, _, r| *r = resolution)
    }

    pub fn set_axis_name<K: AsAxisKey + ?Sized>(&mut self, axis: &K, name: Option<&str>) -> Result<()> {
        let key = axis.axis_key();
        self.checked(key)?;
        self.store
            .update(key, |record| record.axis_name = name.map(str::to_string))
    }

    /// Name a channel by literal index, creating it with default values if
    /// it does not exist.
    pub fn set_channel_name<K: AsAxisKey + ?Sized>(
        &mut self,
        axis: &K,
        channel: usize,
        name: Option<&str>,
    ) -> Result<()> {
        let key = axis.axis_key();
        let exists = self.channel_record(key)?.channels.contains_key(&channel);
        if exists {
            return self.store.update(key, |record| {
                if let Some(c) = record.channels.get_mut(&channel) {
                    c.name = name.map(str::to_string);
                }
            });
        }
        let update = ChannelUpdate {
            name: name.map(str::to_string),
            ..ChannelUpdate::full(None, ARBITRARY_UNIT, 0.0, 1.0)
        };
        self.store.set_channel(key, channel, update)
    }

    /// Define or redefine channel `channel` (literal index).
    ///
    /// Dimensionless units give way to the unit of a tagged origin or
    /// resolution; otherwise tagged values are converted into `units`.
    pub fn set_channel_calibration<K: AsAxisKey + ?Sized>(
        &mut self,
        axis: &K,
        channel: usize,
        calibration: ChannelCalibration,
    ) -> Result<()> {
        let key = axis.axis_key();
        self.channel_record(key)?;

        let units = resolve_units(
            None,
            Some(calibration.units),
            Some(&calibration.origin),
            Some(&calibration.resolution),
            key,
        )?;
        let origin = calibration.origin.value_in(units)?;
        let resolution = calibration.resolution.value_in(units)?;

        self.store.set_channel(
            key,
            channel,
            ChannelUpdate::full(calibration.name, units, origin, resolution),
        )
    }

    /// Remove a channel (literal index first, then position).
    pub fn remove_channel_calibration<K: AsAxisKey + ?Sized>(
        &mut self,
        axis: &K,
        channel: usize,
    ) -> Result<ChannelRecord> {
        let key = axis.axis_key();
        self.channel_record(key)?;
        self.store.remove_channel(key, channel)
    }

    /// Convert origin and resolution into `target` and switch to it.
    pub fn rescale_units<K: AsAxisKey + ?Sized>(&mut self, target: Unit, axis: &K, channel: usize) -> Result<()> {
        let key = axis.axis_key();
        let (units, _, _) = self.values(key, channel)?;
        let factor = units.conversion_factor(target)?;
        self.update_values(key, channel, |u, o, r| {
            *u = target;
            *o *= factor;
            *r *= factor;
        })
    }

    // ------------------------------------------------------------------
    // Collection surgery and reconciliation
    // ------------------------------------------------------------------

    /// Insert a descriptor into the shared collection and calibrate it.
    ///
    /// This splices the collection directly: whoever owns it will not be
    /// told, and its own per-axis bookkeeping can go stale.
    pub fn add_axis(&mut self, descriptor: AxisDescriptor, index: Option<usize>) -> Result<()> {
        let key = descriptor.key.clone();
        if self.store.contains(&key) || self.axes.borrow().contains(&key) {
            return Err(Error::InvalidArgument(format!("axis '{}' already exists", key)));
        }
        let record = record_from_descriptor(&descriptor)?;
        {
            let mut axes = self.axes.borrow_mut();
            let at = index.unwrap_or(axes.len());
            axes.insert(at, descriptor)?;
        }
        self.store.set(&key, record);
        self.calibrate_key(&key)?;
        tracing::debug!("Added axis '{}'", key);
        Ok(())
    }

    /// Remove a descriptor from the shared collection along with its
    /// calibration. Same caveat as [`add_axis`](Self::add_axis).
    pub fn remove_axis<K: AsAxisKey + ?Sized>(&mut self, axis: &K) -> Result<CalibrationRecord> {
        let key = axis.axis_key();
        self.checked(key)?;
        self.axes.borrow_mut().remove(key);
        let record = self.store.remove_axis(key).ok_or_else(|| {
            Error::NotFound(format!("no calibration for axis '{}'", key))
        })?;
        tracing::debug!("Removed axis '{}'", key);
        Ok(record)
    }

    /// Bring the store in line with the collection after external changes.
    ///
    /// New descriptors are decoded (or defaulted) and embedded; records for
    /// vanished keys are dropped. Idempotent.
    pub fn synchronize(&mut self) -> Result<()> {
        let added: Vec<CalibrationRecord> = self
            .axes
            .borrow()
            .iter()
            .filter(|d| !self.store.contains(&d.key))
            .map(record_from_descriptor)
            .collect::<Result<_>>()?;

        let obsolete: Vec<String> = {
            let axes = self.axes.borrow();
            self.store
                .keys()
                .filter(|key| !axes.contains(key))
                .map(str::to_string)
                .collect()
        };

        for key in &obsolete {
            self.store.remove_axis(key);
        }
        let added_keys: Vec<String> = added.iter().map(|r| r.axis_key.clone()).collect();
        for record in added {
            let key = record.axis_key.clone();
            self.store.set(&key, record);
        }
        for key in &added_keys {
            self.calibrate_key(key)?;
        }

        if !added_keys.is_empty() || !obsolete.is_empty() {
            tracing::debug!(
                "Synchronized axes: added {:?}, removed {:?}",
                added_keys,
                obsolete
            );
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Embedding
    // ------------------------------------------------------------------

    /// Encoded calibration text for the axis.
    pub fn calibration_string<K: AsAxisKey + ?Sized>(&self, axis: &K) -> Result<String> {
        Ok(codec::encode(self.checked(axis.axis_key())?))
    }

    /// Embed calibration text into a descriptor.
    ///
    /// The descriptor need not belong to the collection, but its key must be
    /// calibrated here with the same type flags. Older calibration text is
    /// replaced, and the numeric resolution is updated (channel 0's for a
    /// Channels axis).
    pub fn calibrate_axis<'d>(&self, descriptor: &'d mut AxisDescriptor) -> Result<&'d mut AxisDescriptor> {
        let key = descriptor.key.as_str();
        let record = self.store.get(key).map_err(|_| {
            Error::NotFound(format!(
                "no calibration for axis '{}' with type flags {}",
                key, descriptor.type_flags
            ))
        })?;
        if record.axis_type != descriptor.type_flags {
            return Err(Error::TypeMismatch(format!(
                "axis '{}' has type flags {} but was calibrated as {}",
                key, descriptor.type_flags, record.axis_type
            )));
        }

        let resolution = if record.is_channels() {
            self.store.channel(key, 0)?.resolution
        } else {
            record.resolution
        };
        let encoded = codec::encode(record);
        let free_text = codec::strip_calibration(&descriptor.description);

        descriptor.description = if free_text.is_empty() {
            encoded
        } else {
            format!("{} {}", free_text, encoded)
        };
        descriptor.resolution = resolution;
        Ok(descriptor)
    }

    /// Re-embed calibration into every descriptor of the collection.
    pub fn calibrate_axes(&self) -> Result<()> {
        let mut axes = self.axes.borrow_mut();
        for descriptor in axes.iter_mut() {
            self.calibrate_axis(descriptor)?;
        }
        Ok(())
    }

    fn calibrate_key(&self, key: &str) -> Result<()> {
        let mut axes = self.axes.borrow_mut();
        let descriptor = axes
            .get_mut(key)
            .ok_or_else(|| Error::NotFound(format!("axis '{}' is not in the axis collection", key)))?;
        self.calibrate_axis(descriptor)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Conversions
    // ------------------------------------------------------------------

    /// Number of samples spanned by a calibrated distance.
    pub fn distance_in_samples<K: AsAxisKey + ?Sized>(
        &self,
        value: impl Into<Scalar>,
        axis: &K,
        channel: usize,
    ) -> Result<f64> {
        let (units, _, resolution) = self.values(axis.axis_key(), channel)?;
        Ok(value.into().value_in(units)? / resolution)
    }

    /// Calibrated length of `samples` samples.
    pub fn calibrated_axial_distance<K: AsAxisKey + ?Sized>(
        &self,
        samples: f64,
        axis: &K,
        channel: usize,
    ) -> Result<Quantity> {
        let (units, _, resolution) = self.values(axis.axis_key(), channel)?;
        Ok((samples * resolution) * units)
    }

    /// Calibrated coordinate of sample position `samples`.
    pub fn calibrated_axis_coordinate<K: AsAxisKey + ?Sized>(
        &self,
        samples: f64,
        axis: &K,
        channel: usize,
    ) -> Result<Quantity> {
        let (units, origin, resolution) = self.values(axis.axis_key(), channel)?;
        Ok((samples * resolution + origin) * units)
    }

    /// Calibrated length of an axis `length` samples long.
    pub fn calibrated_axis_length<K: AsAxisKey + ?Sized>(
        &self,
        length: usize,
        axis: &K,
        channel: usize,
    ) -> Result<Quantity> {
        self.calibrated_axial_distance(length as f64, axis, channel)
    }

    /// Sample index range for a calibrated interval; endpoints are divided
    /// by the resolution and truncated toward zero.
    pub fn calibrated_interval_as_slice<K: AsAxisKey + ?Sized>(
        &self,
        interval: Interval,
        axis: &K,
        channel: usize,
    ) -> Result<Range<i64>> {
        let (units, _, resolution) = self.values(axis.axis_key(), channel)?;
        let start = interval.0.value_in(units)? / resolution;
        let stop = interval.1.value_in(units)? / resolution;
        Ok(start as i64..stop as i64)
    }
}

impl fmt::Display for AxisCalibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "AxisCalibration:")?;
        for (position, key) in self.axis_keys().iter().enumerate() {
            let record = match self.store.get(key) {
                Ok(record) => record,
                Err(_) => continue,
            };
            writeln!(f, "Axis {} ({}): {}", position, key, record.display_name())?;
            writeln!(f, "  type: {}", record.axis_type)?;
            writeln!(f, "  origin: {}", record.origin * record.units)?;
            writeln!(f, "  resolution: {}", record.resolution * record.units)?;
            if record.is_channels() {
                match record.channels.len() {
                    1 => writeln!(f, "  1 channel:")?,
                    n => writeln!(f, "  {} channels:", n)?,
                }
                for (index, c) in &record.channels {
                    writeln!(
                        f,
                        "    channel {}: name: {}, units: {}, origin: {}, resolution: {}",
                        index,
                        c.name.as_deref().unwrap_or("None"),
                        c.units,
                        c.origin * c.units,
                        c.resolution * c.units
                    )?;
                }
            }
        }
        Ok(())
    }
}
