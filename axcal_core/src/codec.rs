//! Calibration text codec.
//!
//! A calibration record travels inside an axis description as an
//! `<axis_calibration>` block. Decoding runs in two passes: the block
//! locator finds the block (and any old-style `<name>` block) by marker
//! search inside arbitrary free text, then the [`markup`](crate::markup)
//! parser reads the located slice.
//!
//! Absence of a block is not an error and yields defaults. A block that is
//! present but cannot be parsed is [`Error::MalformedEncoding`]. A `<name>`
//! marker with no `</name>` after it is ordinary free text.

use crate::axes::AxisDescriptor;
use crate::markup::{Element, Writer};
use crate::types::{AxisType, CalibrationRecord, ChannelRecord, UNKNOWN_AXIS_KEY};
use crate::units::{Unit, ARBITRARY_UNIT, DIMENSIONLESS, PIXEL_UNIT};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

const CALIBRATION_TAG: &str = "axis_calibration";
pub const CALIBRATION_OPEN: &str = "<axis_calibration>";
pub const CALIBRATION_CLOSE: &str = "</axis_calibration>";
const NAME_OPEN: &str = "<name>";
const NAME_CLOSE: &str = "</name>";

// ============================================================================
// Decode notices
// ============================================================================

/// Something recoverable that happened while decoding.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodeNotice {
    /// A channel defined in the old `<name>` block overwrote the same channel
    /// from the calibration block.
    LegacyChannelOverride { channel: usize },
    /// Unit text not in the vocabulary; the default unit was used.
    UnknownUnit { field: String, text: String },
    /// Number text that does not parse; the default value was used.
    InvalidNumber { field: String, text: String },
}

impl fmt::Display for DecodeNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeNotice::LegacyChannelOverride { channel } => write!(
                f,
                "channel {} from the legacy <name> block overrides the calibration block",
                channel
            ),
            DecodeNotice::UnknownUnit { field, text } => {
                write!(f, "unknown unit {:?} in <{}>, using default", text, field)
            }
            DecodeNotice::InvalidNumber { field, text } => {
                write!(f, "invalid number {:?} in <{}>, using default", text, field)
            }
        }
    }
}

fn report(notices: &mut Vec<DecodeNotice>, notice: DecodeNotice) {
    tracing::warn!("{}", notice);
    notices.push(notice);
}

// ============================================================================
// Decoded (partial) calibration
// ============================================================================

/// Channel fields as found in the text; `None` means absent or empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartialChannel {
    pub name: Option<String>,
    pub units: Option<Unit>,
    pub origin: Option<f64>,
    pub resolution: Option<f64>,
}

impl PartialChannel {
    /// Overwrite fields with the ones present in `other`.
    fn merge(&mut self, other: PartialChannel) {
        if other.name.is_some() {
            self.name = other.name;
        }
        if other.units.is_some() {
            self.units = other.units;
        }
        if other.origin.is_some() {
            self.origin = other.origin;
        }
        if other.resolution.is_some() {
            self.resolution = other.resolution;
        }
    }

    pub fn into_record(self) -> ChannelRecord {
        ChannelRecord {
            name: self.name,
            units: channel_units(self.units),
            origin: self.origin.unwrap_or(0.0),
            resolution: self.resolution.unwrap_or(1.0),
        }
    }
}

/// Plain dimensionless channel units read as arbitrary units.
fn channel_units(units: Option<Unit>) -> Unit {
    match units {
        Some(u) if u != DIMENSIONLESS => u,
        _ => ARBITRARY_UNIT,
    }
}

/// Everything recovered from a description, before defaults are applied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Decoded {
    /// Whether an `<axis_calibration>` block was present.
    pub found: bool,
    pub axis_key: Option<String>,
    pub axis_name: Option<String>,
    pub axis_type: Option<AxisType>,
    pub units: Option<Unit>,
    pub origin: Option<f64>,
    pub resolution: Option<f64>,
    pub channels: BTreeMap<usize, PartialChannel>,
    pub notices: Vec<DecodeNotice>,
}

impl Decoded {
    /// Axis type: explicit, else implied by the key, else unknown.
    pub fn axis_type(&self) -> AxisType {
        self.axis_type
            .or_else(|| self.axis_key.as_deref().and_then(AxisType::from_key))
            .unwrap_or(AxisType::UNKNOWN)
    }

    /// Axis key: explicit, else the standard key for the type, else `"?"`.
    ///
    /// A standard key that contradicts an explicit type is replaced by the
    /// type's own key.
    pub fn axis_key(&self) -> String {
        let by_type = || {
            self.axis_type
                .and_then(AxisType::default_key)
                .unwrap_or(UNKNOWN_AXIS_KEY)
                .to_string()
        };
        match (&self.axis_key, self.axis_type) {
            (Some(key), Some(flags)) => match AxisType::from_key(key) {
                Some(implied) if implied != flags => {
                    let reconciled = by_type();
                    tracing::warn!(
                        "Axis key '{}' contradicts axis type {}; using key '{}'",
                        key,
                        flags.bits(),
                        reconciled
                    );
                    reconciled
                }
                _ => key.clone(),
            },
            (Some(key), None) => key.clone(),
            (None, _) => by_type(),
        }
    }

    /// Fill defaults and build a record for an axis with the given key and type.
    ///
    /// Channel data is kept only for Channels axes. A Channels axis without
    /// channel blocks gets channel 0 from the axis-level values.
    pub fn into_record(self, axis_key: &str, axis_type: AxisType) -> CalibrationRecord {
        let mut record = CalibrationRecord {
            axis_key: axis_key.to_string(),
            axis_name: self.axis_name,
            axis_type,
            units: self.units.unwrap_or(PIXEL_UNIT),
            origin: self.origin.unwrap_or(0.0),
            resolution: self.resolution.unwrap_or(1.0),
            channels: BTreeMap::new(),
        };

        if axis_type.is_channels() {
            if self.channels.is_empty() {
                let channel = PartialChannel {
                    name: None,
                    units: self.units,
                    origin: self.origin,
                    resolution: self.resolution,
                };
                record.channels.insert(0, channel.into_record());
            } else {
                record.channels = self
                    .channels
                    .into_iter()
                    .map(|(index, channel)| (index, channel.into_record()))
                    .collect();
            }
            record.normalize();
        } else if !self.channels.is_empty() {
            tracing::debug!(
                "Dropping {} channel block(s) for non-channel axis '{}'",
                self.channels.len(),
                axis_key
            );
        }

        record
    }
}

// ============================================================================
// Block locator
// ============================================================================

/// Byte range of the first `open ... close` block, end marker included.
fn locate(text: &str, open: &str, close: &str, what: &str) -> Result<Option<Range<usize>>> {
    let start = match text.find(open) {
        Some(start) => start,
        None => return Ok(None),
    };
    match text[start..].find(close) {
        Some(offset) => Ok(Some(start..start + offset + close.len())),
        None => Err(Error::MalformedEncoding(format!(
            "{} starting at byte {} has no closing {}",
            what, start, close
        ))),
    }
}

/// Byte range of the first old-style `<name>...</name>` block, if closed.
fn legacy_range(text: &str) -> Option<Range<usize>> {
    let start = text.find(NAME_OPEN)?;
    let offset = text[start..].find(NAME_CLOSE)?;
    Some(start..start + offset + NAME_CLOSE.len())
}

/// Join the trimmed free text on either side of a removed range.
fn splice_out(text: &str, range: Range<usize>) -> String {
    let before = text[..range.start].trim();
    let after = text[range.end..].trim();
    match (before.is_empty(), after.is_empty()) {
        (true, _) => after.to_string(),
        (_, true) => before.to_string(),
        _ => format!("{} {}", before, after),
    }
}

// ============================================================================
// Field parsing
// ============================================================================

/// Names are kept verbatim; only an empty element means "no name".
fn name_value(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Old writers padded names and spelled a missing name `None`.
fn legacy_name(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() || text == "None" {
        None
    } else {
        Some(text.to_string())
    }
}

/// Unit symbol or name; also accepts `"1.0 mV"` as written by old writers.
fn unit_text(field: &str, text: &str, notices: &mut Vec<DecodeNotice>) -> Option<Unit> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(unit) = Unit::from_name_or_symbol(text) {
        return Some(unit);
    }
    if let Some((magnitude, symbol)) = text.split_once(char::is_whitespace) {
        if magnitude.parse::<f64>().is_ok() {
            if let Some(unit) = Unit::from_name_or_symbol(symbol) {
                return Some(unit);
            }
        }
    }
    report(
        notices,
        DecodeNotice::UnknownUnit {
            field: field.to_string(),
            text: text.to_string(),
        },
    );
    None
}

fn number_text(field: &str, text: &str, notices: &mut Vec<DecodeNotice>) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match text.parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) => {
            report(
                notices,
                DecodeNotice::InvalidNumber {
                    field: field.to_string(),
                    text: text.to_string(),
                },
            );
            None
        }
    }
}

/// Literal index from a `channelN` tag; bare `channel` takes the next index.
fn channel_index(tag: &str, next: usize) -> Option<usize> {
    let suffix = tag.to_lowercase();
    let suffix = suffix.strip_prefix("channel")?.trim();
    if suffix.is_empty() {
        Some(next)
    } else {
        suffix.parse().ok()
    }
}

fn parse_channel(
    element: &Element,
    legacy: bool,
    notices: &mut Vec<DecodeNotice>,
) -> PartialChannel {
    let mut channel = PartialChannel::default();
    for child in &element.children {
        match child.tag.to_lowercase().as_str() {
            "name" if legacy => channel.name = legacy_name(&child.text),
            "name" => channel.name = name_value(&child.text),
            "units" => channel.units = unit_text(&element.tag, &child.text, notices),
            "origin" => channel.origin = number_text(&element.tag, &child.text, notices),
            "resolution" => channel.resolution = number_text(&element.tag, &child.text, notices),
            other => tracing::debug!("Ignoring <{}> in <{}>", other, element.tag),
        }
    }
    channel
}

fn parse_calibration_block(root: &Element, decoded: &mut Decoded) {
    for child in &root.children {
        let tag = child.tag.to_lowercase();
        if tag.starts_with("channel") {
            match channel_index(&tag, decoded.channels.len()) {
                Some(index) => {
                    let channel = parse_channel(child, false, &mut decoded.notices);
                    decoded.channels.insert(index, channel);
                }
                None => tracing::debug!("Ignoring <{}>: not a channel index", child.tag),
            }
            continue;
        }
        match tag.as_str() {
            "axiskey" => {
                let key = child.text.trim();
                if !key.is_empty() {
                    decoded.axis_key = Some(key.to_string());
                }
            }
            "axisname" | "name" => decoded.axis_name = name_value(&child.text),
            "axistype" => {
                let text = child.text.trim();
                if !text.is_empty() {
                    decoded.axis_type = AxisType::parse(text);
                    if decoded.axis_type.is_none() {
                        report(
                            &mut decoded.notices,
                            DecodeNotice::InvalidNumber {
                                field: "axistype".into(),
                                text: text.to_string(),
                            },
                        );
                    }
                }
            }
            "units" => decoded.units = unit_text("units", &child.text, &mut decoded.notices),
            "origin" => decoded.origin = number_text("origin", &child.text, &mut decoded.notices),
            "resolution" => {
                decoded.resolution = number_text("resolution", &child.text, &mut decoded.notices)
            }
            _ => tracing::debug!("Ignoring <{}> in calibration block", child.tag),
        }
    }
}

/// Merge an old-style `<name>` block: channel entries override, bare text
/// supplies a missing axis name.
fn merge_legacy_block(root: &Element, decoded: &mut Decoded) {
    if decoded.axis_name.is_none() {
        decoded.axis_name = legacy_name(&root.text);
    }
    for child in &root.children {
        let index = match channel_index(&child.tag, decoded.channels.len()) {
            Some(index) => index,
            None => continue,
        };
        let mut channel = parse_channel(child, true, &mut decoded.notices);
        if channel.name.is_none() {
            channel.name = legacy_name(&child.text);
        }
        match decoded.channels.get_mut(&index) {
            Some(existing) => {
                report(
                    &mut decoded.notices,
                    DecodeNotice::LegacyChannelOverride { channel: index },
                );
                existing.merge(channel);
            }
            None => {
                decoded.channels.insert(index, channel);
            }
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Recover calibration fields from free text without applying defaults.
pub fn parse_description(text: &str) -> Result<Decoded> {
    let mut decoded = Decoded::default();

    let block = locate(text, CALIBRATION_OPEN, CALIBRATION_CLOSE, "calibration block")?;
    let outside = match &block {
        Some(range) => {
            let root = Element::parse(&text[range.clone()])?;
            if root.tag != CALIBRATION_TAG {
                return Err(Error::MalformedEncoding(format!(
                    "expected <{}>, found <{}>",
                    CALIBRATION_TAG, root.tag
                )));
            }
            decoded.found = true;
            parse_calibration_block(&root, &mut decoded);
            splice_out(text, range.clone())
        }
        None => text.to_string(),
    };

    match legacy_range(&outside) {
        Some(range) => {
            let root = Element::parse(&outside[range])?;
            merge_legacy_block(&root, &mut decoded);
        }
        None if outside.contains(NAME_OPEN) => {
            tracing::debug!("Unclosed <name> marker treated as free text");
        }
        None => {}
    }

    Ok(decoded)
}

/// Decode a record, filling defaults for anything missing.
pub fn decode(text: &str) -> Result<CalibrationRecord> {
    decode_with_notices(text).map(|(record, _)| record)
}

/// Like [`decode`], also returning the recoverable problems encountered.
pub fn decode_with_notices(text: &str) -> Result<(CalibrationRecord, Vec<DecodeNotice>)> {
    let mut decoded = parse_description(text)?;
    let notices = std::mem::take(&mut decoded.notices);
    let key = decoded.axis_key();
    let axis_type = decoded.axis_type();
    Ok((decoded.into_record(&key, axis_type), notices))
}

fn number(value: f64) -> String {
    format!("{}", value)
}

/// Encode a record as an `<axis_calibration>` block.
pub fn encode(record: &CalibrationRecord) -> String {
    let mut w = Writer::new();
    w.open(CALIBRATION_TAG)
        .leaf("axiskey", &record.axis_key)
        .leaf("axisname", record.axis_name.as_deref().unwrap_or(""))
        .leaf("axistype", &record.axis_type.bits().to_string());

    if record.is_channels() {
        for (index, channel) in &record.channels {
            let tag = format!("channel{}", index);
            w.open(&tag)
                .leaf("name", channel.name.as_deref().unwrap_or(""))
                .leaf("units", channel.units.symbol())
                .leaf("origin", &number(channel.origin))
                .leaf("resolution", &number(channel.resolution))
                .close(&tag);
        }
    }

    w.leaf("units", record.units.symbol())
        .leaf("origin", &number(record.origin))
        .leaf("resolution", &number(record.resolution))
        .close(CALIBRATION_TAG);
    w.finish()
}

/// Whether the text looks like it carries a calibration block.
///
/// Only checks for both markers; does not validate the block.
pub fn has_calibration_string(text: &str) -> bool {
    text.contains(CALIBRATION_OPEN) && text.contains(CALIBRATION_CLOSE)
}

/// Whether the text carries an old-style `<name>` block.
pub fn has_name_string(text: &str) -> bool {
    legacy_range(text).is_some()
}

/// Remove calibration blocks and old-style name blocks, keeping the
/// surrounding free text.
///
/// Everything from the first `<axis_calibration>` to the last closing marker
/// goes; an unmatched calibration marker is removed on its own. An unclosed
/// `<name>` is free text and stays.
pub fn strip_calibration(text: &str) -> String {
    let mut s = text.to_string();

    if let Some(start) = s.find(CALIBRATION_OPEN) {
        let end = match s.rfind(CALIBRATION_CLOSE) {
            Some(end) if end > start => end + CALIBRATION_CLOSE.len(),
            _ => start + CALIBRATION_OPEN.len(),
        };
        s = splice_out(&s, start..end);
    }

    while let Some(range) = legacy_range(&s) {
        s = splice_out(&s, range);
    }

    s
}

/// Whether the descriptor's description carries a calibration block.
pub fn is_axis_calibrated(descriptor: &AxisDescriptor) -> bool {
    has_calibration_string(&descriptor.description)
}

/// Strip all calibration text from the descriptor's description.
pub fn remove_calibration_data(descriptor: &mut AxisDescriptor) -> &mut AxisDescriptor {
    descriptor.description = strip_calibration(&descriptor.description);
    descriptor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::unit;
    use approx::assert_relative_eq;

    fn time_record() -> CalibrationRecord {
        CalibrationRecord {
            axis_key: "t".into(),
            axis_name: Some("time".into()),
            axis_type: AxisType::TIME,
            units: unit("s"),
            origin: 0.0,
            resolution: 0.001,
            channels: BTreeMap::new(),
        }
    }

    fn two_channel_record() -> CalibrationRecord {
        let mut record = CalibrationRecord::new("c", AxisType::CHANNELS);
        record.axis_name = Some("Channels".into());
        record.channels.insert(
            0,
            ChannelRecord {
                name: Some("Vm".into()),
                units: unit("mV"),
                origin: -65.0,
                resolution: 0.1,
            },
        );
        record.channels.insert(
            3,
            ChannelRecord {
                name: None,
                units: unit("pA"),
                origin: 0.0,
                resolution: 2.5,
            },
        );
        record
    }

    #[test]
    fn test_encode_layout() {
        let text = encode(&time_record());
        assert_eq!(
            text,
            "<axis_calibration><axiskey>t</axiskey><axisname>time</axisname>\
             <axistype>8</axistype><units>s</units><origin>0</origin>\
             <resolution>0.001</resolution></axis_calibration>"
        );
    }

    #[test]
    fn test_roundtrip_time_axis() {
        let record = time_record();
        let decoded = decode(&encode(&record)).unwrap();
        assert_eq!(decoded.axis_key, record.axis_key);
        assert_eq!(decoded.axis_name, record.axis_name);
        assert_eq!(decoded.axis_type, record.axis_type);
        assert_eq!(decoded.units, record.units);
        assert_relative_eq!(decoded.resolution, record.resolution);
        assert_relative_eq!(decoded.origin, record.origin);
    }

    #[test]
    fn test_roundtrip_channels_axis() {
        let record = two_channel_record();
        let text = encode(&record);
        assert!(text.contains("<channel0><name>Vm</name><units>mV</units>"));
        assert!(text.contains("<channel3><name></name><units>pA</units>"));
        assert_eq!(decode(&text).unwrap(), record);
    }

    #[test]
    fn test_roundtrip_escapes_names() {
        let mut record = time_record();
        record.axis_name = Some("t < 5 & rising".into());
        let text = encode(&record);
        assert!(text.contains("t &lt; 5 &amp; rising"));
        assert_eq!(decode(&text).unwrap().axis_name, record.axis_name);
    }

    #[test]
    fn test_roundtrip_keeps_names_verbatim() {
        let mut record = two_channel_record();
        record.axis_name = Some(" time ".into());
        if let Some(channel) = record.channels.get_mut(&3) {
            channel.name = Some("None".into());
        }
        if let Some(channel) = record.channels.get_mut(&0) {
            channel.name = Some("\tVm  ".into());
        }
        assert_eq!(decode(&encode(&record)).unwrap(), record);

        let mut record = time_record();
        record.axis_name = Some("None".into());
        assert_eq!(decode(&encode(&record)).unwrap().axis_name.as_deref(), Some("None"));
    }

    #[test]
    fn test_contradictory_key_follows_type() {
        let text = "<axis_calibration><axiskey>t</axiskey><axistype>2</axistype></axis_calibration>";
        let record = decode(text).unwrap();
        assert_eq!(record.axis_key, "x");
        assert_eq!(record.axis_type, AxisType::SPACE);

        let text = "<axis_calibration><axiskey>t</axiskey><axistype>0</axistype></axis_calibration>";
        assert_eq!(decode(text).unwrap().axis_key, "?");

        let text = "<axis_calibration><axiskey>stage_x</axiskey><axistype>2</axistype></axis_calibration>";
        assert_eq!(decode(text).unwrap().axis_key, "stage_x", "non-standard keys are kept");
    }

    #[test]
    fn test_decode_empty_text_gives_defaults() {
        let record = decode("").unwrap();
        assert_eq!(record.units, PIXEL_UNIT);
        assert_eq!(record.origin, 0.0);
        assert_eq!(record.resolution, 1.0);
        assert_eq!(record.axis_name, None);
        assert_eq!(record.axis_type, AxisType::UNKNOWN);
        assert_eq!(record.axis_key, "?");
    }

    #[test]
    fn test_decode_inside_free_text() {
        let text = format!("recorded on rig 2 {} (filtered)", encode(&time_record()));
        let decoded = parse_description(&text).unwrap();
        assert!(decoded.found);
        assert_eq!(decoded.units, Some(unit("s")));
    }

    #[test]
    fn test_decode_permissive_fields() {
        let text = "<axis_calibration>\
            <axiskey>t</axiskey><axisname>None</axisname><axistype>Time</axistype>\
            <bogus>ignored</bogus><units>1.0 ms</units><origin></origin>\
            <resolution>abc</resolution></axis_calibration>";
        let (record, notices) = decode_with_notices(text).unwrap();
        assert_eq!(record.axis_name.as_deref(), Some("None"));
        assert_eq!(record.axis_type, AxisType::TIME);
        assert_eq!(record.units, unit("ms"));
        assert_eq!(record.origin, 0.0);
        assert_eq!(record.resolution, 1.0);
        assert_eq!(
            notices,
            vec![DecodeNotice::InvalidNumber {
                field: "resolution".into(),
                text: "abc".into()
            }]
        );
    }

    #[test]
    fn test_unknown_unit_falls_back_with_notice() {
        let text = "<axis_calibration><axiskey>x</axiskey><units>furlong</units></axis_calibration>";
        let (record, notices) = decode_with_notices(text).unwrap();
        assert_eq!(record.units, PIXEL_UNIT);
        assert_eq!(record.axis_type, AxisType::SPACE);
        assert!(matches!(notices[0], DecodeNotice::UnknownUnit { .. }));
    }

    #[test]
    fn test_channel_defaults_and_bare_channel_tags() {
        crate::logging::init_test();
        let text = "<axis_calibration><axistype>1</axistype>\
            <channel><units>mV</units></channel><channel><name>b</name></channel>\
            </axis_calibration>";
        let record = decode(text).unwrap();
        assert_eq!(record.axis_key, "c");
        assert_eq!(record.channel_indices(), vec![0, 1]);
        assert_eq!(record.channels[&0].units, unit("mV"));
        assert_eq!(record.channels[&1].units, ARBITRARY_UNIT);
        assert_eq!(record.channels[&1].resolution, 1.0);
    }

    #[test]
    fn test_channels_axis_without_channel_blocks() {
        let text = "<axis_calibration><axiskey>c</axiskey><axistype>1</axistype>\
            <units>mV</units><origin>-65</origin><resolution>0.1</resolution></axis_calibration>";
        let record = decode(text).unwrap();
        assert_eq!(record.channel_indices(), vec![0]);
        assert_eq!(record.channels[&0].units, unit("mV"));
        assert_eq!(record.channels[&0].origin, -65.0);
    }

    #[test]
    fn test_legacy_name_block_overrides_present_fields() {
        let text = format!(
            "{}<name><channel0>Membrane</channel0><channel7><units>nA</units></channel7></name>",
            encode(&two_channel_record())
        );
        let (record, notices) = decode_with_notices(&text).unwrap();
        assert_eq!(notices, vec![DecodeNotice::LegacyChannelOverride { channel: 0 }]);
        let ch0 = &record.channels[&0];
        assert_eq!(ch0.name.as_deref(), Some("Membrane"));
        assert_eq!(ch0.units, unit("mV"), "absent legacy fields keep main values");
        assert_eq!(record.channels[&7].units, unit("nA"));
        assert_eq!(record.channel_indices(), vec![0, 3, 7]);
    }

    #[test]
    fn test_channel_names_inside_block_are_not_legacy() {
        let (_, notices) = decode_with_notices(&encode(&two_channel_record())).unwrap();
        assert!(notices.is_empty());
    }

    #[test]
    fn test_truncated_block_is_malformed() {
        let err = decode("<axis_calibration><axiskey>t</axiskey>").unwrap_err();
        assert!(matches!(err, Error::MalformedEncoding(_)));

        let err = decode("<axis_calibration><units>s</axis_calibration>").unwrap_err();
        assert!(matches!(err, Error::MalformedEncoding(_)));

        let err = decode("<name><channel0>x</name>").unwrap_err();
        assert!(matches!(err, Error::MalformedEncoding(_)));

        let depth = 200_000;
        let deep = format!(
            "<axis_calibration>{}{}</axis_calibration>",
            "<a>".repeat(depth),
            "</a>".repeat(depth)
        );
        assert!(matches!(decode(&deep), Err(Error::MalformedEncoding(_))));
    }

    #[test]
    fn test_unclosed_name_marker_is_free_text() {
        let record = decode("operator typed <name> here").unwrap();
        assert_eq!(record.axis_key, "?");
        assert_eq!(record.axis_name, None);

        let decoded = parse_description("operator typed <name> here").unwrap();
        assert!(!decoded.found);
        assert!(decoded.notices.is_empty());
        assert!(!has_name_string("operator typed <name> here"));

        let text = format!("fill in <name> later {}", encode(&time_record()));
        assert_eq!(decode(&text).unwrap(), time_record());
        assert_eq!(strip_calibration(&text), "fill in <name> later");
    }

    #[test]
    fn test_strip_calibration_keeps_free_text() {
        let text = format!(
            "before {} after <name><channel0>x</channel0></name> end",
            encode(&time_record())
        );
        assert!(has_calibration_string(&text));
        assert!(has_name_string(&text));
        let stripped = strip_calibration(&text);
        assert_eq!(stripped, "before after end");
        assert!(!has_calibration_string(&stripped));
        assert_eq!(strip_calibration("plain"), "plain");
        assert_eq!(strip_calibration("x <axis_calibration> y"), "x y");
    }

    #[test]
    fn test_remove_calibration_data_from_descriptor() {
        let mut d = AxisDescriptor::from_key("t").with_description(encode(&time_record()));
        assert!(is_axis_calibrated(&d));
        remove_calibration_data(&mut d);
        assert!(!is_axis_calibrated(&d));
        assert_eq!(d.description, "");
    }
}
