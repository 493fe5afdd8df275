// THEORY:
// The pointer source is the seam between the calibration core and whatever device the
// operator uses to mark regions. The core never polls for events; it makes one blocking
// call per channel and receives everything the operator did:
//
// 1.  **Append-only points**: the ordered list of clicked coordinates, in click order.
//     Order is load-bearing: the first point is the calibration target and the rest are
//     samples by position.
// 2.  **Termination reason**: whether the operator finished the channel or abandoned it.
//
// Two implementations ship: `ScriptedSource` replays a recorded `SelectionSet` (batch
// runs, tests) and the `region_picker` binary drives an interactive window.

use crate::core_modules::channel::Channel;
use crate::core_modules::grid::Grid;
use crate::core_modules::region::Point;
use crate::error::SourceError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Why the operator stopped selecting regions for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Termination {
    #[default]
    Completed,
    Cancelled,
}

/// Everything the operator selected for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Capture {
    pub points: Vec<Point>,
    pub termination: Termination,
}

impl Capture {
    pub fn completed(points: impl IntoIterator<Item = Point>) -> Self {
        Self {
            points: points.into_iter().collect(),
            termination: Termination::Completed,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            points: Vec::new(),
            termination: Termination::Cancelled,
        }
    }
}

/// What the pipeline asks a pointer source for.
#[derive(Debug, Clone, Copy)]
pub struct CaptureRequest<'a> {
    pub channel: Channel,
    pub grid: &'a Grid,
    pub radius: u32,
    pub points_required: usize,
}

/// A blocking provider of operator-selected coordinates.
pub trait PointerSource {
    fn capture(&mut self, request: &CaptureRequest<'_>) -> Result<Capture, SourceError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CaptureRecord {
    points: Vec<(i32, i32)>,
    #[serde(default)]
    termination: Termination,
}

/// Recorded selections for a run, keyed by channel.
///
/// JSON form: `{ "B": { "points": [[x, y], ...], "termination": "completed" }, ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionSet {
    captures: BTreeMap<Channel, Capture>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capture(mut self, channel: Channel, capture: Capture) -> Self {
        self.insert(channel, capture);
        self
    }

    pub fn insert(&mut self, channel: Channel, capture: Capture) {
        self.captures.insert(channel, capture);
    }

    pub fn get(&self, channel: Channel) -> Option<&Capture> {
        self.captures.get(&channel)
    }

    pub fn take(&mut self, channel: Channel) -> Option<Capture> {
        self.captures.remove(&channel)
    }

    pub fn from_json_str(text: &str) -> Result<Self, SourceError> {
        let records: BTreeMap<Channel, CaptureRecord> = serde_json::from_str(text)?;
        let captures = records
            .into_iter()
            .map(|(channel, record)| {
                let capture = Capture {
                    points: record.points.into_iter().map(Point::from).collect(),
                    termination: record.termination,
                };
                (channel, capture)
            })
            .collect();
        Ok(Self { captures })
    }

    pub fn from_json_file(path: &Path) -> Result<Self, SourceError> {
        let text = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String, SourceError> {
        let records: BTreeMap<Channel, CaptureRecord> = self
            .captures
            .iter()
            .map(|(channel, capture)| {
                let record = CaptureRecord {
                    points: capture.points.iter().map(|p| (p.x, p.y)).collect(),
                    termination: capture.termination,
                };
                (*channel, record)
            })
            .collect();
        Ok(serde_json::to_string_pretty(&records)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SourceError> {
        std::fs::write(path, self.to_json_string()?).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Replays a `SelectionSet`. Each channel's capture is handed out once; a channel with no
/// recorded capture is reported as cancelled.
pub struct ScriptedSource {
    selections: SelectionSet,
}

impl ScriptedSource {
    pub fn new(selections: SelectionSet) -> Self {
        Self { selections }
    }
}

impl PointerSource for ScriptedSource {
    fn capture(&mut self, request: &CaptureRequest<'_>) -> Result<Capture, SourceError> {
        match self.selections.take(request.channel) {
            Some(capture) => {
                info!(
                    "Replaying {} recorded region(s) for channel {}",
                    capture.points.len(),
                    request.channel
                );
                Ok(capture)
            }
            None => {
                warn!("No recorded selection for channel {}", request.channel);
                Ok(Capture::cancelled())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_selection_file() {
        let set = SelectionSet::from_json_str(
            r#"{
                "B": { "points": [[10, 12], [40, 41]] },
                "NIR": { "points": [[1, 1]], "termination": "cancelled" }
            }"#,
        )
        .unwrap();

        let blue = set.get(Channel::Blue).unwrap();
        assert_eq!(blue.points, vec![Point::new(10, 12), Point::new(40, 41)]);
        assert_eq!(blue.termination, Termination::Completed);
        assert_eq!(
            set.get(Channel::NearInfrared).unwrap().termination,
            Termination::Cancelled
        );
        assert!(set.get(Channel::Red).is_none());
    }

    #[test]
    fn json_round_trip_preserves_order() {
        let set = SelectionSet::new().with_capture(
            Channel::Green,
            Capture::completed([Point::new(5, 5), Point::new(1, 9), Point::new(3, 2)]),
        );
        let text = set.to_json_string().unwrap();
        assert_eq!(SelectionSet::from_json_str(&text).unwrap(), set);
    }

    #[test]
    fn scripted_source_hands_out_each_channel_once() {
        let grid = Grid::filled(8, 8, 0);
        let mut source = ScriptedSource::new(
            SelectionSet::new().with_capture(Channel::Red, Capture::completed([Point::new(2, 2)])),
        );
        let request = CaptureRequest {
            channel: Channel::Red,
            grid: &grid,
            radius: 2,
            points_required: 1,
        };

        let first = source.capture(&request).unwrap();
        assert_eq!(first.points.len(), 1);
        let second = source.capture(&request).unwrap();
        assert_eq!(second, Capture::cancelled());
    }

    #[test]
    fn rejects_unknown_channel_codes() {
        assert!(SelectionSet::from_json_str(r#"{"UV": {"points": []}}"#).is_err());
    }
}
