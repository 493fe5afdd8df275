// THEORY:
// This file is the main entry point for the `spectral_reflectance` library crate.
// It exposes the two pipelines (`Pipeline` for interactive, channel-by-channel runs and
// `ParallelPipeline` for replaying recorded selections) together with the data they
// produce: per-channel reports, per-sample reflectance vectors, the flat CSV table and
// the plot series derived from it.
//
// The numeric core (`core_modules`) stays usable on its own: a caller that already has
// a grid and a circle can measure and normalize without going through a pipeline.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod report;
pub mod table;

pub use core_modules::aggregator::ReflectanceVector;
pub use core_modules::channel::Channel;
pub use core_modules::profile::CalibrationProfile;
pub use parallel_pipeline::ParallelPipeline;
pub use pipeline::{Pipeline, PipelineConfig, RunReport};
