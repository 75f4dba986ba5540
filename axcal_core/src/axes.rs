//! Axis descriptors and ordered axis collections.
//!
//! An [`AxisTags`] collection is normally owned by some array-like object and
//! shared with an [`AxisCalibration`](crate::AxisCalibration) through a
//! [`SharedAxisTags`] handle. The owner may add or drop axes at any time;
//! the calibration catches up in `synchronize()`.
//!
//! Collections can also be persisted as JSON "axes files" with file locking.

use crate::types::AxisType;
use crate::{Error, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::rc::Rc;
use tempfile::NamedTempFile;

/// Metadata for one array dimension.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisDescriptor {
    pub key: String,
    pub type_flags: AxisType,
    #[serde(default)]
    pub resolution: f64,
    /// Free text; calibration travels embedded in here.
    #[serde(default)]
    pub description: String,
}

impl AxisDescriptor {
    pub fn new(key: impl Into<String>, type_flags: AxisType) -> Self {
        Self {
            key: key.into(),
            type_flags,
            resolution: 0.0,
            description: String::new(),
        }
    }

    /// Descriptor for a standard key (`"x"`, `"t"`, `"c"`, ...).
    ///
    /// Non-standard keys get `AxisType::UNKNOWN`.
    pub fn from_key(key: &str) -> Self {
        let flags = AxisType::from_key(key).unwrap_or(AxisType::UNKNOWN);
        Self::new(key, flags)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn is_channel(&self) -> bool {
        self.type_flags.is_channels()
    }
}

/// Anything that names an axis: a key string or a descriptor.
pub trait AsAxisKey {
    fn axis_key(&self) -> &str;
}

impl AsAxisKey for str {
    fn axis_key(&self) -> &str {
        self
    }
}

impl AsAxisKey for String {
    fn axis_key(&self) -> &str {
        self
    }
}

impl AsAxisKey for AxisDescriptor {
    fn axis_key(&self) -> &str {
        &self.key
    }
}

impl<T: AsAxisKey + ?Sized> AsAxisKey for &T {
    fn axis_key(&self) -> &str {
        (**self).axis_key()
    }
}

/// Ordered collection of axis descriptors with unique keys.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AxisTags {
    axes: Vec<AxisDescriptor>,
}

/// Single-threaded shared handle to a collection owned elsewhere.
pub type SharedAxisTags = Rc<RefCell<AxisTags>>;

impl AxisTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection, rejecting duplicate keys.
    pub fn from_descriptors(axes: Vec<AxisDescriptor>) -> Result<Self> {
        let mut tags = Self::new();
        for axis in axes {
            tags.push(axis)?;
        }
        Ok(tags)
    }

    /// Wrap in a shared handle.
    pub fn into_shared(self) -> SharedAxisTags {
        Rc::new(RefCell::new(self))
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AxisDescriptor> {
        self.axes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AxisDescriptor> {
        self.axes.iter_mut()
    }

    pub fn keys(&self) -> Vec<String> {
        self.axes.iter().map(|a| a.key.clone()).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index_of(key).is_some()
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.axes.iter().position(|a| a.key == key)
    }

    pub fn get(&self, key: &str) -> Option<&AxisDescriptor> {
        self.axes.iter().find(|a| a.key == key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut AxisDescriptor> {
        self.axes.iter_mut().find(|a| a.key == key)
    }

    pub fn at(&self, index: usize) -> Option<&AxisDescriptor> {
        self.axes.get(index)
    }

    /// Replace the descriptor with the same key.
    pub fn set(&mut self, descriptor: AxisDescriptor) -> Result<()> {
        let slot = self
            .get_mut(&descriptor.key)
            .ok_or_else(|| Error::NotFound(format!("axis '{}'", descriptor.key)))?;
        *slot = descriptor;
        Ok(())
    }

    /// Position of the Channels axis, if any.
    pub fn channel_index(&self) -> Option<usize> {
        self.axes.iter().position(|a| a.is_channel())
    }

    pub fn channel_axis(&self) -> Option<&AxisDescriptor> {
        self.channel_index().and_then(|i| self.axes.get(i))
    }

    pub fn push(&mut self, descriptor: AxisDescriptor) -> Result<()> {
        let at = self.len();
        self.insert(at, descriptor)
    }

    /// Insert at `index` (0..=len). Every key is unique, `?` included.
    pub fn insert(&mut self, index: usize, descriptor: AxisDescriptor) -> Result<()> {
        if self.contains(&descriptor.key) {
            return Err(Error::InvalidArgument(format!(
                "axis '{}' already exists",
                descriptor.key
            )));
        }
        if index > self.len() {
            return Err(Error::InvalidArgument(format!(
                "axis index must be between 0 and {}, inclusive; got {}",
                self.len(),
                index
            )));
        }
        self.axes.insert(index, descriptor);
        Ok(())
    }

    /// Remove the descriptor with `key`.
    pub fn remove(&mut self, key: &str) -> Option<AxisDescriptor> {
        self.index_of(key).map(|i| self.axes.remove(i))
    }

    /// Load a collection from a JSON axes file with shared locking.
    ///
    /// Unlike transient state, an axes file is user data: a missing or
    /// malformed file is an error, never silently replaced by defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!("axes file {:?}", path)));
        }

        let file = File::open(path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        let read = reader.read_to_string(&mut contents);
        file.unlock()?;
        read?;

        let axes: Vec<AxisDescriptor> = serde_json::from_str(&contents)?;
        let tags = Self::from_descriptors(axes)?;
        tracing::debug!("Loaded {} axes from {:?}", tags.len(), path);
        Ok(tags)
    }

    /// Save the collection to a JSON axes file with exclusive locking
    ///
    /// Atomically writes by:
    /// 1. Writing to a temp file in the same directory
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    pub fn save(&self, path: &Path, pretty: bool) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        std::fs::create_dir_all(&parent)?;

        let temp = NamedTempFile::new_in(&parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = if pretty {
                serde_json::to_string_pretty(&self.axes)?
            } else {
                serde_json::to_string(&self.axes)?
            };
            writer.write_all(contents.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved {} axes to {:?}", self.len(), path);
        Ok(())
    }
}

impl<'a> IntoIterator for &'a AxisTags {
    type Item = &'a AxisDescriptor;
    type IntoIter = std::slice::Iter<'a, AxisDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.axes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xytc() -> AxisTags {
        AxisTags::from_descriptors(vec![
            AxisDescriptor::from_key("x"),
            AxisDescriptor::from_key("y"),
            AxisDescriptor::from_key("t"),
            AxisDescriptor::from_key("c"),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup_and_channel_axis() {
        let tags = xytc();
        assert_eq!(tags.len(), 4);
        assert_eq!(tags.index_of("t"), Some(2));
        assert_eq!(tags.channel_index(), Some(3));
        assert_eq!(tags.channel_axis().map(|a| a.key.as_str()), Some("c"));
        assert_eq!(tags.get("y").unwrap().type_flags, AxisType::SPACE);
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let mut tags = xytc();
        let err = tags.push(AxisDescriptor::from_key("x")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_second_unknown_axis_rejected() {
        let mut tags = AxisTags::new();
        tags.push(AxisDescriptor::from_key("?")).unwrap();
        let err = tags.insert(0, AxisDescriptor::from_key("?")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(tags.len(), 1);

        let loaded = AxisTags::from_descriptors(vec![
            AxisDescriptor::from_key("?"),
            AxisDescriptor::from_key("?"),
        ]);
        assert!(matches!(loaded, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_insert_and_remove() {
        let mut tags = xytc();
        tags.insert(0, AxisDescriptor::from_key("z")).unwrap();
        assert_eq!(tags.keys(), vec!["z", "x", "y", "t", "c"]);
        assert!(tags.insert(9, AxisDescriptor::from_key("fx")).is_err());

        let removed = tags.remove("t").unwrap();
        assert_eq!(removed.key, "t");
        assert!(tags.remove("t").is_none());
        assert_eq!(tags.len(), 4);
    }

    #[test]
    fn test_axis_key_from_str_and_descriptor() {
        let d = AxisDescriptor::from_key("t");
        assert_eq!(d.axis_key(), "t");
        assert_eq!("x".axis_key(), "x");
        assert_eq!(String::from("c").axis_key(), "c");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("axes.json");

        let mut tags = xytc();
        tags.get_mut("t").unwrap().description = "recorded at 10 kHz".into();
        tags.save(&path, true).unwrap();

        let loaded = AxisTags::load(&path).unwrap();
        assert_eq!(loaded, tags);

        // no stray temp files remain
        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "axes.json")
            .collect();
        assert!(extras.is_empty(), "found extras: {:?}", extras);
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = AxisTags::load(&temp_dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_load_corrupted_file_is_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("axes.json");
        std::fs::write(&path, "{ invalid json }").unwrap();
        assert!(matches!(AxisTags::load(&path), Err(Error::Json(_))));
    }
}
