// THEORY:
// The `CalibrationProfile` is the read-only configuration every part of a run shares.
// It answers two questions:
//
// 1.  **What is the true reflectance of the calibration target in this band?** One
//     percentage per channel. A channel without an entry cannot be calibrated, so its
//     session is refused before any region is collected.
// 2.  **Which physical sample does ordinal `n` refer to?** An optional mapping from the
//     position of a sample region ("Sample 1", "Sample 2", ...) to a display identity
//     (name, plot color, plot line style). Ordinals are positional, so this mapping is
//     only meaningful if the operator clicks samples in the same order in every band.
//
// The on-disk format is a flat JSON object, e.g.
//
//     { "B": 23.7, "G": 25.5, "R": 29.9, "NIR": 30.0,
//       "samples": { "Sample 1": { "name": "Soil", "color": "tab:(Brown)", "linestyle": "--" } } }
//
// When the `samples` section is absent, identities are synthesized from the ordinal.

use crate::core_modules::channel::Channel;
use crate::error::ProfileError;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

const SAMPLES_KEY: &str = "samples";
const SAMPLE_LABEL_PREFIX: &str = "Sample ";
pub const DEFAULT_COLOR: &str = "blue";
pub const DEFAULT_LINESTYLE: &str = "-";

/// The display identity a sample ordinal resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleIdentity {
    pub ordinal: usize,
    pub name: String,
    pub color: String,
    pub linestyle: String,
}

impl SampleIdentity {
    /// Identity used when the profile carries no sample metadata.
    pub fn anonymous(ordinal: usize) -> Self {
        Self {
            ordinal,
            name: sample_label(ordinal),
            color: DEFAULT_COLOR.to_string(),
            linestyle: DEFAULT_LINESTYLE.to_string(),
        }
    }
}

/// The label a sample ordinal is written under: `"Sample <n>"`.
pub fn sample_label(ordinal: usize) -> String {
    format!("{SAMPLE_LABEL_PREFIX}{ordinal}")
}

/// Parses a `"Sample <n>"` label back to its ordinal. Only the form written by
/// `sample_label` is accepted, so `"Sample 01"` or `"Sample +1"` do not alias ordinal 1.
pub fn parse_sample_label(label: &str) -> Option<usize> {
    label
        .strip_prefix(SAMPLE_LABEL_PREFIX)
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|&n| n >= 1 && sample_label(n) == label)
}

#[derive(Debug, Deserialize)]
struct SampleEntry {
    name: String,
    #[serde(default = "default_color")]
    color: String,
    #[serde(default = "default_linestyle")]
    linestyle: String,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_linestyle() -> String {
    DEFAULT_LINESTYLE.to_string()
}

/// Per-channel calibration truth plus optional sample metadata for one run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CalibrationProfile {
    truths: BTreeMap<Channel, f64>,
    samples: Option<BTreeMap<usize, SampleIdentity>>,
}

impl CalibrationProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the known reflectance percentage of the calibration target in `channel`.
    pub fn with_truth(mut self, channel: Channel, truth_pct: f64) -> Self {
        self.truths.insert(channel, truth_pct);
        self
    }

    /// Binds `ordinal` to a named sample. Once any sample is bound, ordinals without a
    /// binding no longer resolve.
    pub fn with_sample(mut self, ordinal: usize, name: &str, color: &str, linestyle: &str) -> Self {
        self.samples.get_or_insert_with(BTreeMap::new).insert(
            ordinal,
            SampleIdentity {
                ordinal,
                name: name.to_string(),
                color: color.to_string(),
                linestyle: linestyle.to_string(),
            },
        );
        self
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ProfileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ProfileError> {
        let root: Map<String, Value> = serde_json::from_str(text)?;
        Self::from_map(root)
    }

    fn from_map(root: Map<String, Value>) -> Result<Self, ProfileError> {
        let mut profile = Self::new();

        for (key, value) in root {
            if key == SAMPLES_KEY {
                let entries: BTreeMap<String, SampleEntry> = serde_json::from_value(value)?;
                let mut samples = BTreeMap::new();
                for (label, entry) in entries {
                    let ordinal = parse_sample_label(&label)
                        .ok_or_else(|| ProfileError::InvalidSampleLabel { label: label.clone() })?;
                    samples.insert(
                        ordinal,
                        SampleIdentity {
                            ordinal,
                            name: entry.name,
                            color: entry.color,
                            linestyle: entry.linestyle,
                        },
                    );
                }
                profile.samples = Some(samples);
                continue;
            }

            let Some(channel) = Channel::from_code(&key) else {
                warn!("Ignoring unrecognised calibration key {key:?}");
                continue;
            };

            let truth = value.as_f64().ok_or_else(|| ProfileError::NonNumericTruth {
                channel,
                value: value.to_string(),
            })?;
            if !truth.is_finite() || truth <= 0.0 {
                return Err(ProfileError::InvalidTruth {
                    channel,
                    value: truth,
                });
            }
            profile.truths.insert(channel, truth);
        }

        Ok(profile)
    }

    /// The calibration target's true reflectance percentage in `channel`.
    pub fn truth(&self, channel: Channel) -> Option<f64> {
        self.truths.get(&channel).copied()
    }

    /// Whether the profile carries a `samples` mapping at all.
    pub fn has_sample_metadata(&self) -> bool {
        self.samples.is_some()
    }

    /// Resolves a sample ordinal to its identity. Without sample metadata every ordinal
    /// resolves to an anonymous identity; with it, only mapped ordinals resolve.
    pub fn resolve_sample(&self, ordinal: usize) -> Option<SampleIdentity> {
        match &self.samples {
            Some(samples) => samples.get(&ordinal).cloned(),
            None if ordinal >= 1 => Some(SampleIdentity::anonymous(ordinal)),
            None => None,
        }
    }

    /// Looks a sample up by its `"Sample <n>"` label.
    pub fn sample_by_label(&self, label: &str) -> Option<&SampleIdentity> {
        let ordinal = parse_sample_label(label)?;
        self.samples.as_ref()?.get(&ordinal)
    }
}
