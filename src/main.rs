// Command-line runner for the `spectral_reflectance` library.
//
// `batch` replays recorded region selections against one image per band and writes the
// reflectance table; `series` turns a table back into per-sample plot data. Interactive
// selection lives in the `region_picker` crate.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use spectral_reflectance::core_modules::grid::GridSource;
use spectral_reflectance::core_modules::pointer::{ScriptedSource, SelectionSet};
use spectral_reflectance::core_modules::utils::{ChannelImages, save_selection_preview};
use spectral_reflectance::pipeline::{DEFAULT_POINTS_REQUIRED, DEFAULT_RADIUS};
use spectral_reflectance::report::{build_series, render_summary};
use spectral_reflectance::table::{read_table, rows_from_report, write_table};
use spectral_reflectance::{CalibrationProfile, Channel, ParallelPipeline, Pipeline, PipelineConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "spectral_reflectance")]
#[command(version, about = "Calibrated four-band reflectance from selected image regions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure reflectance from recorded region selections
    Batch {
        /// Blue band image
        #[arg(long, value_name = "FILE")]
        blue: Option<PathBuf>,

        /// Green band image
        #[arg(long, value_name = "FILE")]
        green: Option<PathBuf>,

        /// Red band image
        #[arg(long, value_name = "FILE")]
        red: Option<PathBuf>,

        /// Near-infrared band image
        #[arg(long, value_name = "FILE")]
        nir: Option<PathBuf>,

        /// Calibration profile (JSON)
        #[arg(short, long, value_name = "FILE")]
        calibration: PathBuf,

        /// Recorded region selections (JSON)
        #[arg(short, long, value_name = "FILE")]
        selections: PathBuf,

        /// Sample regions required per band, after the calibration region
        #[arg(long, value_name = "N", default_value_t = DEFAULT_POINTS_REQUIRED)]
        points: usize,

        /// Radius of every sampling circle, in pixels of the 720p grid
        #[arg(long, value_name = "PIXELS", default_value_t = DEFAULT_RADIUS)]
        radius: u32,

        /// Output table
        #[arg(short, long, value_name = "FILE", default_value = "reflectance.csv")]
        out: PathBuf,

        /// Write a PNG per band with the selected regions outlined
        #[arg(long, value_name = "DIR")]
        preview_dir: Option<PathBuf>,

        /// Process the bands concurrently
        #[arg(long)]
        parallel: bool,
    },

    /// Print per-sample plot series of a reflectance table as JSON
    Series {
        /// Reflectance table written by `batch`
        #[arg(value_name = "TABLE")]
        table: PathBuf,

        /// Calibration profile holding the sample metadata
        #[arg(long, value_name = "FILE")]
        meta: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Batch {
            blue,
            green,
            red,
            nir,
            calibration,
            selections,
            points,
            radius,
            out,
            preview_dir,
            parallel,
        } => {
            let mut images = ChannelImages::new();
            for (channel, path) in Channel::ALL.into_iter().zip([blue, green, red, nir]) {
                if let Some(path) = path {
                    images = images.with_image(channel, path);
                }
            }

            let profile = CalibrationProfile::from_json_file(&calibration)
                .with_context(|| format!("loading calibration profile {}", calibration.display()))?;
            let recorded = SelectionSet::from_json_file(&selections)
                .with_context(|| format!("loading selections {}", selections.display()))?;
            let config = PipelineConfig::new(radius, points).context("invalid run configuration")?;

            if let Some(dir) = &preview_dir {
                write_previews(dir, &images, &recorded, radius)?;
            }

            let report = if parallel {
                ParallelPipeline::new(Arc::new(profile), config)
                    .run(Arc::new(images), recorded)
                    .await?
            } else {
                Pipeline::new(&profile, config).run(&images, &mut ScriptedSource::new(recorded))?
            };

            print!("{}", render_summary(&report));

            let rows = rows_from_report(&report);
            write_table(&out, &rows).with_context(|| format!("writing {}", out.display()))?;
            println!("Data saved to {}", out.display());
        }

        Commands::Series { table, meta } => {
            let rows = read_table(&table).with_context(|| format!("reading {}", table.display()))?;
            let profile = CalibrationProfile::from_json_file(&meta)
                .with_context(|| format!("loading calibration profile {}", meta.display()))?;
            let series = build_series(&rows, &profile);
            println!("{}", serde_json::to_string_pretty(&series)?);
        }
    }

    Ok(())
}

fn write_previews(
    dir: &Path,
    images: &ChannelImages,
    selections: &SelectionSet,
    radius: u32,
) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for channel in Channel::ALL {
        let Some(capture) = selections.get(channel) else {
            continue;
        };
        // Bands that fail to load are reported by the run itself.
        let Ok(grid) = images.load(channel) else {
            continue;
        };
        let path = dir.join(format!("selection_{}.png", channel.code()));
        save_selection_preview(&path, &grid, &capture.points, radius)
            .with_context(|| format!("writing preview {}", path.display()))?;
        info!("Preview for {channel} saved to {}", path.display());
    }
    Ok(())
}
