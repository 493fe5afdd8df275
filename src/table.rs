// THEORY:
// The flat reflectance table is the hand-off format between a run and anything
// downstream (spreadsheets, the `series` command, plotting scripts). One row per
// observation, channels in processing order and samples by ordinal inside each channel.
// Rejected channels simply contribute no rows.

use crate::core_modules::channel::Channel;
use crate::core_modules::profile::sample_label;
use crate::error::TableError;
use crate::pipeline::RunReport;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReflectanceRow {
    #[serde(rename = "Channel")]
    pub channel: Channel,
    /// `"Sample <n>"` label of the observation's ordinal.
    #[serde(rename = "Sample")]
    pub sample: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Raw Intensity")]
    pub raw_intensity: f64,
    #[serde(rename = "Reflectance (%)")]
    pub reflectance_pct: f64,
}

// Channel codes are parsed by hand so a bad code can be reported with its row number.
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "Channel")]
    channel: String,
    #[serde(rename = "Sample")]
    sample: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Raw Intensity")]
    raw_intensity: f64,
    #[serde(rename = "Reflectance (%)")]
    reflectance_pct: f64,
}

/// Flattens every completed channel of a run into table rows.
pub fn rows_from_report(report: &RunReport) -> Vec<ReflectanceRow> {
    report
        .observations()
        .map(|obs| {
            let sample = sample_label(obs.sample_ordinal);
            let name = report
                .vector(obs.sample_ordinal)
                .map(|v| v.identity.name.clone())
                .unwrap_or_else(|| sample.clone());
            ReflectanceRow {
                channel: obs.channel,
                sample,
                name,
                raw_intensity: obs.raw_intensity,
                reflectance_pct: obs.reflectance_pct,
            }
        })
        .collect()
}

pub fn write_rows<W: Write>(writer: W, rows: &[ReflectanceRow]) -> Result<(), TableError> {
    let mut csv = csv::Writer::from_writer(writer);
    for row in rows {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_table(path: &Path, rows: &[ReflectanceRow]) -> Result<(), TableError> {
    let file = std::fs::File::create(path)?;
    write_rows(file, rows)
}

pub fn read_rows<R: Read>(reader: R) -> Result<Vec<ReflectanceRow>, TableError> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for (index, record) in csv.deserialize::<RawRow>().enumerate() {
        let raw = record?;
        let channel = raw
            .channel
            .parse::<Channel>()
            .map_err(|_| TableError::UnknownChannelCode {
                row: index + 1,
                code: raw.channel.clone(),
            })?;
        rows.push(ReflectanceRow {
            channel,
            sample: raw.sample,
            name: raw.name,
            raw_intensity: raw.raw_intensity,
            reflectance_pct: raw.reflectance_pct,
        });
    }
    Ok(rows)
}

pub fn read_table(path: &Path) -> Result<Vec<ReflectanceRow>, TableError> {
    let file = std::fs::File::open(path)?;
    read_rows(file)
}
