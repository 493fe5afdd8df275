// THEORY:
// The aggregator is the cross-channel memory of a run. Each channel session only knows
// "sample 3 reflects 12% in Red"; the aggregator resolves ordinal 3 to a sample identity
// through the calibration profile and files the value into that sample's four-band
// `ReflectanceVector`.
//
// Key architectural principles:
// 1.  **Lazy creation**: a vector is born with the first observation for its sample and
//     filled in place by later channels.
// 2.  **Write once**: every (sample, channel) slot is written at most once. A second
//     write means some channel was processed twice, which is a logic error upstream, so
//     it is refused instead of silently overwriting the first value.
// 3.  **Explicit gaps**: a channel that was rejected leaves its slot empty. Empty slots
//     stay `None` all the way to the output; they are never filled with zero.

use crate::core_modules::channel::{CHANNEL_COUNT, Channel};
use crate::core_modules::channel_session::{ChannelObservation, ChannelReport};
use crate::core_modules::profile::{CalibrationProfile, SampleIdentity};
use crate::error::AggregateError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Reflectance of one sample across the four bands.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReflectanceVector {
    pub identity: SampleIdentity,
    /// Indexed by `Channel::index`; `None` marks a band with no measurement.
    values: [Option<f64>; CHANNEL_COUNT],
}

impl ReflectanceVector {
    fn new(identity: SampleIdentity) -> Self {
        Self {
            identity,
            values: [None; CHANNEL_COUNT],
        }
    }

    pub fn get(&self, channel: Channel) -> Option<f64> {
        self.values[channel.index()]
    }

    /// `(channel, reflectance)` pairs in processing order.
    pub fn bands(&self) -> impl Iterator<Item = (Channel, Option<f64>)> + '_ {
        Channel::ALL.into_iter().map(|c| (c, self.get(c)))
    }

    pub fn missing_channels(&self) -> Vec<Channel> {
        self.bands()
            .filter_map(|(c, v)| v.is_none().then_some(c))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }
}

/// Accumulates channel observations into per-sample reflectance vectors.
pub struct Aggregator<'p> {
    profile: &'p CalibrationProfile,
    vectors: BTreeMap<usize, ReflectanceVector>,
}

impl<'p> Aggregator<'p> {
    pub fn new(profile: &'p CalibrationProfile) -> Self {
        Self {
            profile,
            vectors: BTreeMap::new(),
        }
    }

    pub fn ingest(&mut self, observation: &ChannelObservation) -> Result<(), AggregateError> {
        let ordinal = observation.sample_ordinal;
        let channel = observation.channel;

        let vector = match self.vectors.entry(ordinal) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let identity = self
                    .profile
                    .resolve_sample(ordinal)
                    .ok_or(AggregateError::UnknownSample { channel, ordinal })?;
                entry.insert(ReflectanceVector::new(identity))
            }
        };

        let slot = &mut vector.values[channel.index()];
        if let Some(existing) = *slot {
            return Err(AggregateError::DuplicateObservation {
                channel,
                ordinal,
                existing,
                rejected: observation.reflectance_pct,
            });
        }
        *slot = Some(observation.reflectance_pct);
        Ok(())
    }

    /// Ingests every observation of a completed channel, in ordinal order.
    pub fn ingest_report(&mut self, report: &ChannelReport) -> Result<(), AggregateError> {
        report.observations.iter().try_for_each(|o| self.ingest(o))
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// The accumulated vectors, ordered by sample ordinal.
    pub fn finalize(self) -> Vec<ReflectanceVector> {
        self.vectors.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(channel: Channel, ordinal: usize, pct: f64) -> ChannelObservation {
        ChannelObservation {
            channel,
            sample_ordinal: ordinal,
            raw_intensity: pct * 2.0,
            reflectance_pct: pct,
        }
    }

    fn named_profile() -> CalibrationProfile {
        CalibrationProfile::new()
            .with_truth(Channel::Blue, 10.0)
            .with_sample(1, "Soil", "brown", "-")
            .with_sample(2, "Leaf", "green", "--")
    }

    #[test]
    fn merges_channels_per_sample() {
        let profile = named_profile();
        let mut aggregator = Aggregator::new(&profile);
        aggregator.ingest(&observation(Channel::Blue, 1, 5.0)).unwrap();
        aggregator.ingest(&observation(Channel::Blue, 2, 7.0)).unwrap();
        aggregator.ingest(&observation(Channel::Red, 1, 9.0)).unwrap();
        assert_eq!(aggregator.len(), 2);

        let vectors = aggregator.finalize();
        assert_eq!(vectors[0].identity.name, "Soil");
        assert_eq!(vectors[0].get(Channel::Blue), Some(5.0));
        assert_eq!(vectors[0].get(Channel::Red), Some(9.0));
        assert_eq!(vectors[1].identity.name, "Leaf");
        assert_eq!(vectors[1].get(Channel::Red), None);
    }

    #[test]
    fn unfilled_slots_stay_missing() {
        let profile = named_profile();
        let mut aggregator = Aggregator::new(&profile);
        aggregator.ingest(&observation(Channel::Green, 1, 0.0)).unwrap();
        let vector = &aggregator.finalize()[0];
        // A measured 0% is a value; absent channels are not.
        assert_eq!(vector.get(Channel::Green), Some(0.0));
        assert_eq!(
            vector.missing_channels(),
            vec![Channel::Blue, Channel::Red, Channel::NearInfrared]
        );
        assert!(!vector.is_complete());
    }

    #[test]
    fn second_write_to_a_slot_is_refused() {
        let profile = named_profile();
        let mut aggregator = Aggregator::new(&profile);
        aggregator.ingest(&observation(Channel::Blue, 1, 5.0)).unwrap();
        let err = aggregator.ingest(&observation(Channel::Blue, 1, 6.0)).unwrap_err();
        assert_eq!(
            err,
            AggregateError::DuplicateObservation {
                channel: Channel::Blue,
                ordinal: 1,
                existing: 5.0,
                rejected: 6.0,
            }
        );
        assert_eq!(aggregator.finalize()[0].get(Channel::Blue), Some(5.0));
    }

    #[test]
    fn unmapped_ordinal_is_unknown_sample() {
        let profile = named_profile();
        let mut aggregator = Aggregator::new(&profile);
        let err = aggregator.ingest(&observation(Channel::Blue, 3, 5.0)).unwrap_err();
        assert_eq!(
            err,
            AggregateError::UnknownSample {
                channel: Channel::Blue,
                ordinal: 3
            }
        );
        assert!(aggregator.is_empty());
    }

    #[test]
    fn complete_vector_lists_all_bands() {
        let profile = CalibrationProfile::new();
        let mut aggregator = Aggregator::new(&profile);
        for (i, channel) in Channel::ALL.into_iter().enumerate() {
            aggregator.ingest(&observation(channel, 1, i as f64)).unwrap();
        }
        let vector = &aggregator.finalize()[0];
        assert!(vector.is_complete());
        assert_eq!(vector.identity.name, "Sample 1");
        let bands: Vec<_> = vector.bands().collect();
        assert_eq!(bands[3], (Channel::NearInfrared, Some(3.0)));
    }
}
