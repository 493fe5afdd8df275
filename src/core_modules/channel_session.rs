// THEORY:
// A `ChannelSession` owns everything that happens to one spectral channel: it collects
// the operator's clicks, decides whether they are enough, and turns them into calibrated
// observations. A fresh session is built for every channel, so no click can ever leak
// from one band into the next.
//
// Lifecycle:
//
//     Collecting --finalize--> Finalizing --+--> Rejected   (too few regions, cancelled)
//                                           |
//                                           +--> Computing --+--> Done
//                                                            +--> Rejected (bad region,
//                                                                 degenerate calibration)
//
// Key architectural principles:
// 1.  **Uninterpreted collection**: while collecting, points are only appended. The
//     session does not measure anything until the operator signals the end.
// 2.  **Typed positional split**: finalizing turns the raw point list into a
//     `RegionSelection` with one calibration region and an ordered list of sample
//     regions. Sample ordinal `n` is always the `(n + 1)`-th point received. Sample
//     identity in the profile is resolved through the same ordinal, so this binding is
//     never reordered.
// 3.  **All or nothing**: a channel either emits one observation per sample region or
//     none at all. A region that cannot be measured, or a calibration region with no
//     intensity, rejects the whole channel.

use crate::core_modules::calibration::CalibrationScale;
use crate::core_modules::channel::Channel;
use crate::core_modules::grid::Grid;
use crate::core_modules::pointer::{Capture, Termination};
use crate::core_modules::profile::CalibrationProfile;
use crate::core_modules::region::{CircleStencil, Point, Region, measure_with};
use crate::error::SessionError;
use crate::pipeline::PipelineConfig;
use log::{debug, info};
use serde::Serialize;

/// One calibrated sample measurement in one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelObservation {
    pub channel: Channel,
    /// 1-based position of the sample region after the calibration region.
    pub sample_ordinal: usize,
    pub raw_intensity: f64,
    pub reflectance_pct: f64,
}

/// The result of a channel that reached `Done`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReport {
    pub channel: Channel,
    pub calibration_intensity: f64,
    pub truth_pct: f64,
    pub observations: Vec<ChannelObservation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Collecting,
    Finalizing,
    Computing,
    Done,
    Rejected,
}

/// The operator's regions for one channel, split by role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSelection {
    calibration: Region,
    /// Sample regions in click order; index `i` is sample ordinal `i + 1`.
    samples: Vec<Region>,
}

impl RegionSelection {
    /// Splits `points` into calibration and samples, or `None` if there are fewer than
    /// `points_required + 1` of them.
    pub fn from_points(points: &[Point], radius: u32, points_required: usize) -> Option<Self> {
        if points.len() < points_required + 1 {
            return None;
        }
        let (first, rest) = points.split_first()?;
        Some(Self {
            calibration: Region::new(*first, radius),
            samples: rest.iter().map(|&p| Region::new(p, radius)).collect(),
        })
    }

    pub fn calibration(&self) -> &Region {
        &self.calibration
    }

    pub fn samples(&self) -> &[Region] {
        &self.samples
    }

    /// Sample regions paired with their ordinals.
    pub fn ordinal_samples(&self) -> impl Iterator<Item = (usize, &Region)> {
        self.samples.iter().enumerate().map(|(i, r)| (i + 1, r))
    }
}

/// Collects and processes the regions of a single channel.
#[derive(Debug)]
pub struct ChannelSession {
    channel: Channel,
    truth_pct: f64,
    radius: u32,
    points_required: usize,
    points: Vec<Point>,
    state: SessionState,
    /// Set by `finalize` and consumed by `compute`.
    selection: Option<RegionSelection>,
}

impl ChannelSession {
    /// Opens a session for `channel`. Fails if the profile cannot calibrate the channel.
    pub fn begin(
        channel: Channel,
        profile: &CalibrationProfile,
        config: &PipelineConfig,
    ) -> Result<Self, SessionError> {
        let truth_pct = profile
            .truth(channel)
            .ok_or(SessionError::UnknownChannel { channel })?;

        info!("Processing channel: {channel} (calibration reflectance: {truth_pct}%)");

        Ok(Self {
            channel,
            truth_pct,
            radius: config.radius,
            points_required: config.points_required,
            points: Vec::new(),
            state: SessionState::Collecting,
            selection: None,
        })
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Appends an operator click.
    pub fn add_point(&mut self, point: Point) -> Result<(), SessionError> {
        if self.state != SessionState::Collecting {
            return Err(SessionError::OutOfOrder {
                channel: self.channel,
            });
        }
        debug!("Channel {}: region added at {}, {}", self.channel, point.x, point.y);
        self.points.push(point);
        Ok(())
    }

    /// Ends collection and validates the region count. The accepted selection is kept by
    /// the session for `compute`; the returned copy is for inspection only.
    pub fn finalize(&mut self, termination: Termination) -> Result<RegionSelection, SessionError> {
        if self.state != SessionState::Collecting {
            return Err(SessionError::OutOfOrder {
                channel: self.channel,
            });
        }
        self.state = SessionState::Finalizing;

        if termination == Termination::Cancelled {
            return Err(self.reject(SessionError::Cancelled {
                channel: self.channel,
            }));
        }

        match RegionSelection::from_points(&self.points, self.radius, self.points_required) {
            Some(selection) => {
                self.state = SessionState::Computing;
                self.selection = Some(selection.clone());
                Ok(selection)
            }
            None => {
                let err = SessionError::InsufficientRegions {
                    channel: self.channel,
                    required: self.points_required + 1,
                    received: self.points.len(),
                };
                Err(self.reject(err))
            }
        }
    }

    /// Measures every region accepted by `finalize` on `grid` and calibrates the samples.
    pub fn compute(&mut self, grid: &Grid) -> Result<ChannelReport, SessionError> {
        let out_of_order = SessionError::OutOfOrder {
            channel: self.channel,
        };
        if self.state != SessionState::Computing {
            return Err(out_of_order);
        }
        let Some(selection) = self.selection.take() else {
            return Err(out_of_order);
        };

        match self.measure_selection(&selection, grid) {
            Ok(report) => {
                self.state = SessionState::Done;
                self.points.clear();
                Ok(report)
            }
            Err(err) => Err(self.reject(err)),
        }
    }

    /// Finalizes and computes in one step.
    pub fn finish(&mut self, termination: Termination, grid: &Grid) -> Result<ChannelReport, SessionError> {
        self.finalize(termination)?;
        self.compute(grid)
    }

    fn measure_selection(
        &self,
        selection: &RegionSelection,
        grid: &Grid,
    ) -> Result<ChannelReport, SessionError> {
        let channel = self.channel;
        let stencil = CircleStencil::new(self.radius);

        let calibration_intensity = measure_with(grid, selection.calibration.center, &stencil)
            .map_err(|source| SessionError::Region {
                channel,
                region_index: 0,
                source,
            })?;
        info!("Calibration intensity for {channel}: {calibration_intensity}");

        let scale = CalibrationScale::new(calibration_intensity, self.truth_pct)
            .map_err(|source| SessionError::Calibration { channel, source })?;

        let mut observations = Vec::with_capacity(selection.samples.len());
        for (ordinal, region) in selection.ordinal_samples() {
            let raw_intensity = measure_with(grid, region.center, &stencil).map_err(|source| {
                SessionError::Region {
                    channel,
                    region_index: ordinal,
                    source,
                }
            })?;
            let reflectance_pct = scale.apply(raw_intensity);
            debug!("Channel {channel}: sample {ordinal} intensity {raw_intensity:.3} -> {reflectance_pct:.2}%");
            observations.push(ChannelObservation {
                channel,
                sample_ordinal: ordinal,
                raw_intensity,
                reflectance_pct,
            });
        }

        Ok(ChannelReport {
            channel,
            calibration_intensity: scale.calibration_intensity(),
            truth_pct: scale.truth_pct(),
            observations,
        })
    }

    fn reject(&mut self, err: SessionError) -> SessionError {
        self.state = SessionState::Rejected;
        self.points.clear();
        self.selection = None;
        err
    }
}

/// Runs a whole session for an already captured selection.
pub fn process_capture(
    channel: Channel,
    profile: &CalibrationProfile,
    config: &PipelineConfig,
    capture: &Capture,
    grid: &Grid,
) -> Result<ChannelReport, SessionError> {
    let mut session = ChannelSession::begin(channel, profile, config)?;
    for &point in &capture.points {
        session.add_point(point)?;
    }
    session.finish(capture.termination, grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CalibrationError, RegionError};
    use approx::assert_relative_eq;

    fn config(points_required: usize) -> PipelineConfig {
        PipelineConfig::new(3, points_required).unwrap()
    }

    fn profile() -> CalibrationProfile {
        CalibrationProfile::new()
            .with_truth(Channel::Blue, 10.0)
            .with_truth(Channel::Green, 35.6)
    }

    /// 40x10 grid with four 10x10 tiles of the given intensities.
    fn tiled(values: [u8; 4]) -> Grid {
        let mut data = vec![0u8; 40 * 10];
        for y in 0..10 {
            for x in 0..40 {
                data[y * 40 + x] = values[x / 10];
            }
        }
        Grid::from_vec(40, 10, data).unwrap()
    }

    fn tile_center(i: i32) -> Point {
        Point::new(i * 10 + 5, 5)
    }

    #[test]
    fn unknown_channel_fails_before_collecting() {
        let err = ChannelSession::begin(Channel::NearInfrared, &profile(), &config(1)).unwrap_err();
        assert_eq!(
            err,
            SessionError::UnknownChannel {
                channel: Channel::NearInfrared
            }
        );
    }

    #[test]
    fn exactly_points_required_is_insufficient() {
        let grid = tiled([100, 50, 50, 50]);
        let mut session = ChannelSession::begin(Channel::Blue, &profile(), &config(3)).unwrap();
        for i in 0..3 {
            session.add_point(tile_center(i)).unwrap();
        }

        let err = session.finish(Termination::Completed, &grid).unwrap_err();
        assert_eq!(
            err,
            SessionError::InsufficientRegions {
                channel: Channel::Blue,
                required: 4,
                received: 3,
            }
        );
        assert_eq!(session.state(), SessionState::Rejected);
        assert!(session.points().is_empty());
    }

    #[test]
    fn binds_ordinals_by_click_position() {
        // Samples are clicked right-to-left; ordinals must follow click order, not x.
        let grid = tiled([200, 20, 40, 60]);
        let capture = Capture::completed([tile_center(0), tile_center(3), tile_center(2), tile_center(1)]);
        let report = process_capture(Channel::Blue, &profile(), &config(3), &capture, &grid).unwrap();

        let by_ordinal: Vec<(usize, f64)> = report
            .observations
            .iter()
            .map(|o| (o.sample_ordinal, o.raw_intensity))
            .collect();
        assert_eq!(by_ordinal, vec![(1, 60.0), (2, 40.0), (3, 20.0)]);
        assert_relative_eq!(report.calibration_intensity, 200.0);
        assert_relative_eq!(report.observations[0].reflectance_pct, 3.0);
    }

    #[test]
    fn extra_regions_become_extra_samples() {
        let grid = tiled([100, 50, 25, 75]);
        let capture = Capture::completed([tile_center(0), tile_center(1), tile_center(2), tile_center(3)]);
        let report = process_capture(Channel::Blue, &profile(), &config(1), &capture, &grid).unwrap();
        assert_eq!(report.observations.len(), 3);
        assert_relative_eq!(report.observations[2].reflectance_pct, 7.5);
    }

    #[test]
    fn calibrates_against_the_first_region() {
        let grid = tiled([100, 50, 0, 0]);
        let capture = Capture::completed([tile_center(0), tile_center(1)]);
        let report = process_capture(Channel::Blue, &profile(), &config(1), &capture, &grid).unwrap();
        assert_eq!(report.observations.len(), 1);
        let obs = report.observations[0];
        assert_eq!(obs.channel, Channel::Blue);
        assert_eq!(obs.sample_ordinal, 1);
        assert_relative_eq!(obs.raw_intensity, 50.0);
        assert_relative_eq!(obs.reflectance_pct, 5.0);
    }

    #[test]
    fn dark_calibration_region_rejects_channel() {
        let grid = tiled([0, 50, 0, 0]);
        let mut session = ChannelSession::begin(Channel::Blue, &profile(), &config(1)).unwrap();
        session.add_point(tile_center(0)).unwrap();
        session.add_point(tile_center(1)).unwrap();
        let err = session.finish(Termination::Completed, &grid).unwrap_err();
        assert_eq!(
            err,
            SessionError::Calibration {
                channel: Channel::Blue,
                source: CalibrationError::DegenerateCalibration { intensity: 0.0 },
            }
        );
        assert_eq!(session.state(), SessionState::Rejected);
    }

    #[test]
    fn out_of_bounds_sample_reports_its_index() {
        let grid = tiled([100, 50, 50, 50]);
        let capture = Capture::completed([tile_center(0), tile_center(1), Point::new(500, 500)]);
        let err = process_capture(Channel::Green, &profile(), &config(2), &capture, &grid).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Region {
                channel: Channel::Green,
                region_index: 2,
                source: RegionError::OutOfBoundsRegion { .. },
            }
        ));
    }

    #[test]
    fn cancelled_selection_is_rejected() {
        let grid = tiled([100, 50, 50, 50]);
        let mut session = ChannelSession::begin(Channel::Blue, &profile(), &config(1)).unwrap();
        session.add_point(tile_center(0)).unwrap();
        session.add_point(tile_center(1)).unwrap();
        let err = session.finish(Termination::Cancelled, &grid).unwrap_err();
        assert_eq!(err, SessionError::Cancelled { channel: Channel::Blue });
    }

    #[test]
    fn no_points_accepted_after_finalizing() {
        let mut session = ChannelSession::begin(Channel::Blue, &profile(), &config(1)).unwrap();
        session.add_point(tile_center(0)).unwrap();
        session.add_point(tile_center(1)).unwrap();
        let selection = session.finalize(Termination::Completed).unwrap();
        assert_eq!(session.state(), SessionState::Computing);
        assert_eq!(selection.samples().len(), 1);
        assert!(session.add_point(tile_center(2)).is_err());

        session.compute(&tiled([100, 50, 0, 0])).unwrap();
        assert_eq!(session.state(), SessionState::Done);
        // A finished session cannot be computed again.
        assert!(session.compute(&tiled([100, 50, 0, 0])).is_err());
    }

    #[test]
    fn compute_requires_an_accepted_selection() {
        let grid = tiled([100, 50, 50, 50]);
        let out_of_order = SessionError::OutOfOrder {
            channel: Channel::Blue,
        };

        // Never finalized.
        let mut session = ChannelSession::begin(Channel::Blue, &profile(), &config(3)).unwrap();
        for i in 0..4 {
            session.add_point(tile_center(i)).unwrap();
        }
        assert_eq!(session.compute(&grid), Err(out_of_order.clone()));
        assert_eq!(session.state(), SessionState::Collecting);

        // Finalized with too few regions.
        let mut short = ChannelSession::begin(Channel::Blue, &profile(), &config(3)).unwrap();
        short.add_point(tile_center(0)).unwrap();
        short.add_point(tile_center(1)).unwrap();
        assert!(short.finalize(Termination::Completed).is_err());
        assert_eq!(short.compute(&grid), Err(out_of_order));
        assert_eq!(short.state(), SessionState::Rejected);

        // Finalized with enough regions: every sample is measured.
        let selection = session.finalize(Termination::Completed).unwrap();
        assert_eq!(selection.samples().len(), 3);
        let report = session.compute(&grid).unwrap();
        assert_eq!(report.observations.len(), 3);
        assert_eq!(session.state(), SessionState::Done);
    }

    #[test]
    fn region_selection_split() {
        let points = [Point::new(1, 1), Point::new(2, 2), Point::new(3, 3)];
        assert!(RegionSelection::from_points(&points, 10, 3).is_none());
        let selection = RegionSelection::from_points(&points, 10, 2).unwrap();
        assert_eq!(selection.calibration().center, Point::new(1, 1));
        let ordinals: Vec<_> = selection.ordinal_samples().map(|(n, r)| (n, r.center)).collect();
        assert_eq!(ordinals, vec![(1, Point::new(2, 2)), (2, Point::new(3, 3))]);
    }
}
