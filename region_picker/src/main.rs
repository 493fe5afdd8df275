use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::info;
use opencv::{
    core::{self, Mat, Scalar},
    highgui, imgproc,
    prelude::*,
};
use spectral_reflectance::core_modules::pointer::{
    Capture, CaptureRequest, PointerSource, SelectionSet, Termination,
};
use spectral_reflectance::core_modules::region::Point;
use spectral_reflectance::core_modules::utils::ChannelImages;
use spectral_reflectance::error::SourceError;
use spectral_reflectance::pipeline::{DEFAULT_POINTS_REQUIRED, DEFAULT_RADIUS};
use spectral_reflectance::report::render_summary;
use spectral_reflectance::table::{rows_from_report, write_table};
use spectral_reflectance::{CalibrationProfile, Channel, Pipeline, PipelineConfig};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const KEY_DONE: i32 = b'q' as i32;
const KEY_CANCEL: i32 = 27;
const OUTLINE_THICKNESS: i32 = 2;

/// Select calibration and sample regions on each band, then compute reflectance.
#[derive(Parser)]
#[command(name = "region_picker", version)]
struct Args {
    #[arg(long, value_name = "FILE")]
    blue: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    green: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    red: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    nir: Option<PathBuf>,

    /// Calibration profile (JSON)
    #[arg(short, long, value_name = "FILE")]
    calibration: PathBuf,

    #[arg(long, value_name = "N", default_value_t = DEFAULT_POINTS_REQUIRED)]
    points: usize,

    #[arg(long, value_name = "PIXELS", default_value_t = DEFAULT_RADIUS)]
    radius: u32,

    #[arg(short, long, value_name = "FILE", default_value = "reflectance.csv")]
    out: PathBuf,

    /// Record the clicks so the run can be replayed with `spectral_reflectance batch`
    #[arg(long, value_name = "FILE")]
    save_selections: Option<PathBuf>,
}

/// Collects clicks in an OpenCV window, one window per band.
#[derive(Default)]
struct HighGuiSource {
    recorded: SelectionSet,
}

impl PointerSource for HighGuiSource {
    fn capture(&mut self, request: &CaptureRequest<'_>) -> Result<Capture, SourceError> {
        let capture = select_regions(request).map_err(|err| SourceError::Device(format!("{err:#}")))?;
        self.recorded.insert(request.channel, capture.clone());
        Ok(capture)
    }
}

/// The clicks recorded so far. A poisoned buffer means the mouse callback panicked and
/// the list can no longer be trusted.
fn snapshot(clicks: &Mutex<Vec<Point>>) -> Result<Vec<Point>> {
    clicks
        .lock()
        .map(|points| points.clone())
        .map_err(|_| anyhow!("click buffer poisoned by the mouse callback"))
}

fn select_regions(request: &CaptureRequest<'_>) -> Result<Capture> {
    let channel = request.channel;
    let title = format!("Select Circles - {}", channel.code());
    let grid = request.grid;
    let base = Mat::from_slice_rows_cols(grid.as_raw(), grid.height() as usize, grid.width() as usize)?;

    let clicks = Arc::new(Mutex::new(Vec::<Point>::new()));
    let sink = Arc::clone(&clicks);
    highgui::named_window(&title, highgui::WINDOW_AUTOSIZE)?;
    highgui::set_mouse_callback(
        &title,
        Some(Box::new(move |event, x, y, _flags| {
            if event == highgui::EVENT_LBUTTONDOWN {
                if let Ok(mut points) = sink.lock() {
                    points.push(Point::new(x, y));
                    info!("Circle added at: {x}, {y} ({channel})");
                }
            }
        })),
    )?;

    println!("Channel {channel}:");
    println!("Step 1: Click to encircle the calibration target.");
    println!(
        "Step 2: Click to encircle the {} sample regions after the calibration target.",
        request.points_required
    );
    println!("Press 'q' when done, 'Esc' to skip this channel.");

    let termination = loop {
        let mut frame = base.try_clone()?;
        for point in &snapshot(&clicks)? {
            imgproc::circle(
                &mut frame,
                core::Point::new(point.x, point.y),
                request.radius as i32,
                Scalar::all(255.0),
                OUTLINE_THICKNESS,
                imgproc::LINE_8,
                0,
            )?;
        }
        highgui::imshow(&title, &frame)?;

        match highgui::wait_key(1)? & 0xFF {
            KEY_DONE => break Termination::Completed,
            KEY_CANCEL => break Termination::Cancelled,
            _ => {}
        }
    };
    highgui::destroy_window(&title)?;

    Ok(Capture {
        points: snapshot(&clicks)?,
        termination,
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut images = ChannelImages::new();
    for (channel, path) in Channel::ALL
        .into_iter()
        .zip([args.blue, args.green, args.red, args.nir])
    {
        if let Some(path) = path {
            images = images.with_image(channel, path);
        }
    }

    let profile = CalibrationProfile::from_json_file(&args.calibration)
        .with_context(|| format!("loading calibration profile {}", args.calibration.display()))?;
    let config = PipelineConfig::new(args.radius, args.points).context("invalid run configuration")?;

    let mut source = HighGuiSource::default();
    let report = Pipeline::new(&profile, config).run(&images, &mut source)?;
    print!("{}", render_summary(&report));

    write_table(&args.out, &rows_from_report(&report))
        .with_context(|| format!("writing {}", args.out.display()))?;
    println!("Data saved to {}", args.out.display());

    if let Some(path) = &args.save_selections {
        source
            .recorded
            .save(path)
            .with_context(|| format!("writing selections {}", path.display()))?;
        println!("Selections saved to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poisoned_click_buffer_is_an_error() {
        let clicks = Arc::new(Mutex::new(vec![Point::new(4, 7)]));
        assert_eq!(snapshot(&clicks).unwrap(), vec![Point::new(4, 7)]);

        let callback = Arc::clone(&clicks);
        let _ = std::thread::spawn(move || {
            let _guard = callback.lock().unwrap();
            panic!("mouse callback failed");
        })
        .join();

        assert!(clicks.is_poisoned());
        assert!(snapshot(&clicks).is_err());
    }
}
