#![forbid(unsafe_code)]

//! Core library for axis calibration.
//!
//! This crate provides:
//! - Units and physical quantities
//! - Axis descriptors and shared axis collections
//! - The calibration text codec (encode, decode, strip)
//! - The calibration store and the `AxisCalibration` service
//! - Tolerance-based calibration comparison

pub mod types;
pub mod error;
pub mod units;
pub mod axes;
pub mod markup;
pub mod codec;
pub mod store;
pub mod service;
pub mod compare;
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use units::{Quantity, Scalar, Unit, ARBITRARY_UNIT, CHANNEL_UNIT, DIMENSIONLESS, PIXEL_UNIT};
pub use axes::{AsAxisKey, AxisDescriptor, AxisTags, SharedAxisTags};
pub use codec::{decode, decode_with_notices, encode, DecodeNotice};
pub use store::{CalibrationStore, ChannelUpdate};
pub use service::{AtomicCalibration, AxisCalibration, CalibrationParams, ChannelCalibration, Interval};
pub use compare::{Ignore, Tolerance};
pub use config::Config;
