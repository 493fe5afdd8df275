// THEORY:
// Plot series are the reflectance-versus-wavelength curves of each sample: one point per
// measured band, at the band's nominal center wavelength. Rendering is left to the
// consumer; this module only groups table rows by sample and attaches the display style
// from the calibration profile.
//
// `render_summary` is the console counterpart: the per-channel "Sample n: x.xx%" lines
// an operator reads at the end of a run.

use crate::core_modules::profile::{CalibrationProfile, parse_sample_label};
use crate::pipeline::{ChannelStatus, RunReport};
use crate::table::ReflectanceRow;
use log::warn;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotSeries {
    /// `"Sample <n>"` label the rows were grouped by.
    pub label: String,
    pub name: String,
    pub color: String,
    pub linestyle: String,
    /// `(wavelength_nm, reflectance_pct)`, sorted by wavelength.
    pub points: Vec<(u32, f64)>,
}

/// Reduces a styled color such as `"tab:(Brown)"` to a plain name (`"brown"`): the text
/// after the last `(`, with `)` stripped from both ends.
pub fn sanitize_color(color: &str) -> String {
    let tail = color.rsplit('(').next().unwrap_or(color);
    tail.trim_matches(')').to_lowercase()
}

/// Groups rows into one series per sample known to the profile. Samples the profile has
/// no metadata for are skipped.
pub fn build_series(rows: &[ReflectanceRow], profile: &CalibrationProfile) -> Vec<PlotSeries> {
    let mut grouped: BTreeMap<(usize, &str), Vec<&ReflectanceRow>> = BTreeMap::new();
    for row in rows {
        // Unparseable labels sort last, after every real ordinal.
        let ordinal = parse_sample_label(&row.sample).unwrap_or(usize::MAX);
        grouped.entry((ordinal, row.sample.as_str())).or_default().push(row);
    }

    let mut series = Vec::with_capacity(grouped.len());
    for ((_, label), group) in grouped {
        let Some(identity) = profile.sample_by_label(label) else {
            warn!("Metadata for {label} not found. Skipping...");
            continue;
        };
        let mut points: Vec<(u32, f64)> = group
            .iter()
            .map(|row| (row.channel.wavelength_nm(), row.reflectance_pct))
            .collect();
        points.sort_by_key(|&(wavelength, _)| wavelength);

        series.push(PlotSeries {
            label: label.to_string(),
            name: identity.name.clone(),
            color: sanitize_color(&identity.color),
            linestyle: identity.linestyle.clone(),
            points,
        });
    }
    series
}

/// Human-readable reflectance report of a run, one block per channel.
pub fn render_summary(report: &RunReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        match &outcome.status {
            ChannelStatus::Done(channel_report) => {
                let _ = writeln!(
                    out,
                    "Reflection Values for {} (calibration intensity {:.2}, truth {}%):",
                    outcome.channel, channel_report.calibration_intensity, channel_report.truth_pct
                );
                for obs in &channel_report.observations {
                    let _ = writeln!(out, "Sample {}: {:.2}%", obs.sample_ordinal, obs.reflectance_pct);
                }
            }
            ChannelStatus::Rejected(err) => {
                let _ = writeln!(out, "Channel {} skipped: {err}", outcome.channel);
            }
        }
    }
    out
}
