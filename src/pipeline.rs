// THEORY:
// The `pipeline` module is the top-level API for a reflectance run. It strings the
// layers together for the four channels, one after the other, in the fixed order
// B, G, R, NIR:
//
//     Stage 1: open a `ChannelSession` (refused if the profile cannot calibrate the band)
//     Stage 2: load the channel's grid
//     Stage 3: block on the pointer source until the operator completes or cancels
//     Stage 4: finalize and compute the session
//     Stage 5: feed the observations of a completed channel into the `Aggregator`
//
// Failures in stages 1-4 only reject their own channel; the run continues with the next
// one. Failures in stage 5 are integrity violations and end the run.

use crate::core_modules::aggregator::{Aggregator, ReflectanceVector};
use crate::core_modules::channel::Channel;
use crate::core_modules::channel_session::{ChannelObservation, ChannelReport, ChannelSession};
use crate::core_modules::grid::GridSource;
use crate::core_modules::pointer::{CaptureRequest, PointerSource};
use crate::core_modules::profile::CalibrationProfile;
use crate::error::{ConfigError, RunError, SessionError};
use log::{info, warn};

pub const DEFAULT_RADIUS: u32 = 10;
pub const DEFAULT_POINTS_REQUIRED: usize = 9;

/// Run-wide parameters shared by every channel session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Radius of every sampling circle, in pixels of the (resized) grid.
    pub radius: u32,
    /// Number of sample regions required after the calibration region.
    pub points_required: usize,
}

impl PipelineConfig {
    pub fn new(radius: u32, points_required: usize) -> Result<Self, ConfigError> {
        if points_required == 0 {
            return Err(ConfigError::NoSamplesRequired);
        }
        Ok(Self {
            radius,
            points_required,
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS,
            points_required: DEFAULT_POINTS_REQUIRED,
        }
    }
}

/// How a channel ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelStatus {
    Done(ChannelReport),
    Rejected(SessionError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelOutcome {
    pub channel: Channel,
    pub status: ChannelStatus,
}

impl ChannelOutcome {
    pub fn report(&self) -> Option<&ChannelReport> {
        match &self.status {
            ChannelStatus::Done(report) => Some(report),
            ChannelStatus::Rejected(_) => None,
        }
    }

    pub fn error(&self) -> Option<&SessionError> {
        match &self.status {
            ChannelStatus::Done(_) => None,
            ChannelStatus::Rejected(err) => Some(err),
        }
    }
}

/// The output of a complete run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// One entry per channel, in processing order.
    pub outcomes: Vec<ChannelOutcome>,
    /// One vector per sample that was observed in at least one channel.
    pub vectors: Vec<ReflectanceVector>,
}

impl RunReport {
    pub fn outcome(&self, channel: Channel) -> Option<&ChannelOutcome> {
        self.outcomes.iter().find(|o| o.channel == channel)
    }

    /// Every observation of every completed channel, channel by channel.
    pub fn observations(&self) -> impl Iterator<Item = &ChannelObservation> {
        self.outcomes
            .iter()
            .filter_map(ChannelOutcome::report)
            .flat_map(|r| r.observations.iter())
    }

    pub fn rejected(&self) -> impl Iterator<Item = &SessionError> {
        self.outcomes.iter().filter_map(ChannelOutcome::error)
    }

    pub fn vector(&self, ordinal: usize) -> Option<&ReflectanceVector> {
        self.vectors.iter().find(|v| v.identity.ordinal == ordinal)
    }
}

/// Accumulates channel results into a `RunReport`, ingesting each completed channel
/// as soon as it is recorded.
pub(crate) struct RunAssembler<'p> {
    aggregator: Aggregator<'p>,
    outcomes: Vec<ChannelOutcome>,
}

impl<'p> RunAssembler<'p> {
    pub(crate) fn new(profile: &'p CalibrationProfile) -> Self {
        Self {
            aggregator: Aggregator::new(profile),
            outcomes: Vec::with_capacity(Channel::ALL.len()),
        }
    }

    pub(crate) fn record(
        &mut self,
        channel: Channel,
        result: Result<ChannelReport, SessionError>,
    ) -> Result<(), RunError> {
        let status = match result {
            Ok(report) => {
                self.aggregator.ingest_report(&report)?;
                info!(
                    "Channel {channel} done: {} sample(s) calibrated",
                    report.observations.len()
                );
                ChannelStatus::Done(report)
            }
            Err(err) => {
                warn!("Channel {channel} rejected: {err}");
                ChannelStatus::Rejected(err)
            }
        };
        self.outcomes.push(ChannelOutcome { channel, status });
        Ok(())
    }

    pub(crate) fn finish(self) -> RunReport {
        RunReport {
            outcomes: self.outcomes,
            vectors: self.aggregator.finalize(),
        }
    }
}

/// Sequential, interactive reflectance run.
pub struct Pipeline<'p> {
    profile: &'p CalibrationProfile,
    config: PipelineConfig,
}

impl<'p> Pipeline<'p> {
    pub fn new(profile: &'p CalibrationProfile, config: PipelineConfig) -> Self {
        Self { profile, config }
    }

    pub fn run<G, S>(&self, grids: &G, source: &mut S) -> Result<RunReport, RunError>
    where
        G: GridSource + ?Sized,
        S: PointerSource + ?Sized,
    {
        let mut assembler = RunAssembler::new(self.profile);
        for channel in Channel::ALL {
            // Each channel is ingested before the next one starts.
            let result = self.run_channel(channel, grids, source);
            assembler.record(channel, result)?;
        }
        Ok(assembler.finish())
    }

    fn run_channel<G, S>(
        &self,
        channel: Channel,
        grids: &G,
        source: &mut S,
    ) -> Result<ChannelReport, SessionError>
    where
        G: GridSource + ?Sized,
        S: PointerSource + ?Sized,
    {
        let mut session = ChannelSession::begin(channel, self.profile, &self.config)?;

        let grid = grids
            .load(channel)
            .map_err(|err| SessionError::GridUnavailable {
                channel,
                reason: err.to_string(),
            })?;

        let request = CaptureRequest {
            channel,
            grid: &grid,
            radius: self.config.radius,
            points_required: self.config.points_required,
        };
        let capture = source
            .capture(&request)
            .map_err(|err| SessionError::Source {
                channel,
                reason: err.to_string(),
            })?;

        for point in capture.points {
            session.add_point(point)?;
        }
        session.finish(capture.termination, &grid)
    }
}
