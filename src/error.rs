// THEORY:
// Every failure the calibration pipeline can report lives here. The enums are split by
// the layer that raises them so that callers can tell, by type alone, how far a failure
// reaches:
//
// 1.  `RegionError` and `CalibrationError` are raised by the two numeric leaves.
// 2.  `SessionError` wraps them with channel context. Anything of this type is confined
//     to one channel: the run marks the channel as rejected and moves on.
// 3.  `AggregateError` signals an integrity violation between sessions and the profile.
//     It is fatal to the whole run and surfaces through `RunError`.

use crate::core_modules::channel::Channel;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegionError {
    #[error("region centered at ({x}, {y}) with radius {radius} has no pixels inside the {width}x{height} grid")]
    OutOfBoundsRegion {
        x: i32,
        y: i32,
        radius: u32,
        width: u32,
        height: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("calibration intensity {intensity} is not positive; reflectance cannot be normalized")]
    DegenerateCalibration { intensity: f64 },
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read calibration profile {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed calibration profile: {0}")]
    Json(#[from] serde_json::Error),
    #[error("calibration truth for channel {channel} must be a finite positive percentage, got {value}")]
    InvalidTruth { channel: Channel, value: f64 },
    #[error("calibration truth for channel {channel} is not a number: {value}")]
    NonNumericTruth { channel: Channel, value: String },
    #[error("sample label {label:?} is not of the form \"Sample <n>\" with n >= 1")]
    InvalidSampleLabel { label: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("calibration profile has no entry for channel {channel}")]
    UnknownChannel { channel: Channel },
    #[error("channel {channel}: {received} region(s) selected, at least {required} needed (calibration target first, then the samples)")]
    InsufficientRegions {
        channel: Channel,
        required: usize,
        received: usize,
    },
    #[error("channel {channel}: selection cancelled by the operator")]
    Cancelled { channel: Channel },
    #[error("channel {channel}: region #{region_index} cannot be measured: {source}")]
    Region {
        channel: Channel,
        /// 0 is the calibration region, `n` is sample ordinal `n`.
        region_index: usize,
        #[source]
        source: RegionError,
    },
    #[error("channel {channel}: {source}")]
    Calibration {
        channel: Channel,
        #[source]
        source: CalibrationError,
    },
    #[error("channel {channel}: session step called out of order")]
    OutOfOrder { channel: Channel },
    #[error("channel {channel}: grid unavailable: {reason}")]
    GridUnavailable { channel: Channel, reason: String },
    #[error("channel {channel}: pointer source failed: {reason}")]
    Source { channel: Channel, reason: String },
}

impl SessionError {
    pub fn channel(&self) -> Channel {
        match self {
            Self::UnknownChannel { channel }
            | Self::InsufficientRegions { channel, .. }
            | Self::Cancelled { channel }
            | Self::Region { channel, .. }
            | Self::Calibration { channel, .. }
            | Self::OutOfOrder { channel }
            | Self::GridUnavailable { channel, .. }
            | Self::Source { channel, .. } => *channel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregateError {
    #[error("channel {channel}: sample ordinal {ordinal} has no entry in the calibration profile")]
    UnknownSample { channel: Channel, ordinal: usize },
    #[error("sample ordinal {ordinal} already has a {channel} reflectance ({existing}); refusing to overwrite with {rejected}")]
    DuplicateObservation {
        channel: Channel,
        ordinal: usize,
        existing: f64,
        rejected: f64,
    },
}

#[derive(Debug, Error)]
pub enum GridError {
    #[error("no image configured for channel {0}")]
    Missing(Channel),
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("grid buffer holds {actual} values, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read selection file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed selection file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("pointer device failed: {0}")]
    Device(String),
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("row {row}: unknown channel code {code:?}")]
    UnknownChannelCode { row: usize, code: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("at least one sample region must be required per channel")]
    NoSamplesRequired,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error("channel worker for {channel} failed to complete: {reason}")]
    Worker { channel: Channel, reason: String },
}
