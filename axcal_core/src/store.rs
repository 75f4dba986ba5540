//! In-memory calibration store.
//!
//! Maps axis keys to [`CalibrationRecord`]s. Every mutator leaves Channels
//! axes with at least one channel and re-applies the single-channel mirroring
//! rule (see [`CalibrationRecord::normalize`]). Consistency with the axis
//! collection is the service's job, not the store's.

use crate::types::{CalibrationRecord, ChannelRecord};
use crate::units::Unit;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Fields to change on a channel. `None` leaves a field alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChannelUpdate {
    pub name: Option<String>,
    pub units: Option<Unit>,
    pub origin: Option<f64>,
    pub resolution: Option<f64>,
}

impl ChannelUpdate {
    /// A complete channel definition, as required to create a channel.
    pub fn full(name: Option<String>, units: Unit, origin: f64, resolution: f64) -> Self {
        Self {
            name,
            units: Some(units),
            origin: Some(origin),
            resolution: Some(resolution),
        }
    }

    fn is_complete(&self) -> bool {
        self.units.is_some() && self.origin.is_some() && self.resolution.is_some()
    }

    fn apply(self, channel: &mut ChannelRecord) {
        if let Some(name) = self.name {
            channel.name = Some(name);
        }
        if let Some(units) = self.units {
            channel.units = units;
        }
        if let Some(origin) = self.origin {
            channel.origin = origin;
        }
        if let Some(resolution) = self.resolution {
            channel.resolution = resolution;
        }
    }
}

/// Axis key → calibration record.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CalibrationStore {
    records: BTreeMap<String, CalibrationRecord>,
}

impl CalibrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CalibrationRecord)> {
        self.records.iter().map(|(k, r)| (k.as_str(), r))
    }

    pub fn get(&self, key: &str) -> Result<&CalibrationRecord> {
        self.records
            .get(key)
            .ok_or_else(|| Error::NotFound(format!("no calibration for axis '{}'", key)))
    }

    /// Replace or create the record for `key`.
    pub fn set(&mut self, key: &str, mut record: CalibrationRecord) {
        record.axis_key = key.to_string();
        record.normalize();
        self.records.insert(key.to_string(), record);
    }

    /// Mutate a record in place, then re-apply normalization.
    pub fn update<F>(&mut self, key: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut CalibrationRecord),
    {
        let record = self
            .records
            .get_mut(key)
            .ok_or_else(|| Error::NotFound(format!("no calibration for axis '{}'", key)))?;
        f(record);
        record.normalize();
        Ok(())
    }

    /// Resolve a channel argument to a literal channel index.
    ///
    /// An existing literal index wins; otherwise `index` is a position in the
    /// sorted list of existing indices.
    pub fn resolve_channel(&self, key: &str, index: usize) -> Result<usize> {
        let record = self.get(key)?;
        if record.channels.is_empty() {
            return Err(Error::NotFound(format!(
                "axis '{}' has no channel calibration (requested channel {})",
                key, index
            )));
        }
        if record.channels.contains_key(&index) {
            return Ok(index);
        }
        record.channels.keys().nth(index).copied().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "invalid channel index {} for axis '{}': {} channel(s) defined at {:?}",
                index,
                key,
                record.channels.len(),
                record.channel_indices()
            ))
        })
    }

    pub fn channel(&self, key: &str, index: usize) -> Result<&ChannelRecord> {
        let literal = self.resolve_channel(key, index)?;
        let record = self.get(key)?;
        record
            .channels
            .get(&literal)
            .ok_or_else(|| Error::NotFound(format!("channel {} of axis '{}'", literal, key)))
    }

    /// Update channel `index` (literal), creating it if absent.
    ///
    /// Creation requires units, origin and resolution together.
    pub fn set_channel(&mut self, key: &str, index: usize, update: ChannelUpdate) -> Result<()> {
        let record = self.get(key)?;
        if !record.is_channels() {
            return Err(Error::InvalidArgument(format!(
                "axis '{}' is not a Channels axis; cannot set channel {}",
                key, index
            )));
        }
        if !record.channels.contains_key(&index) && !update.is_complete() {
            return Err(Error::InvalidArgument(format!(
                "new channel {} of axis '{}' needs units, origin and resolution",
                index, key
            )));
        }

        self.update(key, |record| {
            let channel = record
                .channels
                .entry(index)
                .or_insert_with(ChannelRecord::default);
            update.apply(channel);
        })
    }

    /// Remove a channel (literal-then-positional). The last channel stays.
    pub fn remove_channel(&mut self, key: &str, index: usize) -> Result<ChannelRecord> {
        let literal = self.resolve_channel(key, index)?;
        if self.get(key)?.channels.len() == 1 {
            return Err(Error::InvalidArgument(format!(
                "cannot remove channel {} of axis '{}': a Channels axis needs at least one channel",
                literal, key
            )));
        }

        let mut removed = None;
        self.update(key, |record| removed = record.channels.remove(&literal))?;
        removed.ok_or_else(|| Error::NotFound(format!("channel {} of axis '{}'", literal, key)))
    }

    pub fn remove_axis(&mut self, key: &str) -> Option<CalibrationRecord> {
        self.records.remove(key)
    }
}
