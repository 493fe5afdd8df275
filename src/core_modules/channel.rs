// THEORY:
// A `Channel` is one of the four spectral bands an image set is captured in. The set is
// closed, so it is an enum rather than a string code: profile lookups, aggregator slots
// and table rows all go through the same four variants. String codes ("B", "G", "R",
// "NIR") only appear at the edges, when reading configuration or writing tables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of spectral bands in a run.
pub const CHANNEL_COUNT: usize = 4;

/// A spectral acquisition band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "B")]
    Blue,
    #[serde(rename = "G")]
    Green,
    #[serde(rename = "R")]
    Red,
    #[serde(rename = "NIR")]
    NearInfrared,
}

impl Channel {
    /// The fixed processing order of a run.
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::Blue,
        Channel::Green,
        Channel::Red,
        Channel::NearInfrared,
    ];

    /// The code used in calibration files, selection files and output tables.
    pub fn code(self) -> &'static str {
        match self {
            Channel::Blue => "B",
            Channel::Green => "G",
            Channel::Red => "R",
            Channel::NearInfrared => "NIR",
        }
    }

    /// Slot of this channel in per-sample arrays, following `Channel::ALL`.
    pub fn index(self) -> usize {
        match self {
            Channel::Blue => 0,
            Channel::Green => 1,
            Channel::Red => 2,
            Channel::NearInfrared => 3,
        }
    }

    /// Nominal center wavelength of the band, used on the x axis of reflectance plots.
    pub fn wavelength_nm(self) -> u32 {
        match self {
            Channel::Blue => 450,
            Channel::Green => 550,
            Channel::Red => 650,
            Channel::NearInfrared => 850,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownChannelCode(pub String);

impl fmt::Display for UnknownChannelCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown channel code {:?} (expected B, G, R or NIR)", self.0)
    }
}

impl std::error::Error for UnknownChannelCode {}

impl FromStr for Channel {
    type Err = UnknownChannelCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| UnknownChannelCode(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_from_str() {
        for channel in Channel::ALL {
            assert_eq!(channel.code().parse::<Channel>(), Ok(channel));
        }
        assert!("nir".parse::<Channel>().is_err());
    }

    #[test]
    fn processing_order_matches_slot_index() {
        for (i, channel) in Channel::ALL.iter().enumerate() {
            assert_eq!(channel.index(), i);
        }
        assert_eq!(Channel::NearInfrared.wavelength_nm(), 850);
    }

    #[test]
    fn serializes_as_code() {
        let json = serde_json::to_string(&Channel::NearInfrared).unwrap();
        assert_eq!(json, "\"NIR\"");
    }
}
