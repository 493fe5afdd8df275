// THEORY:
// Batch runs do not wait on an operator: every channel's clicks are already recorded in
// a `SelectionSet`. That removes the only reason channels had to run one after another,
// so this pipeline decodes and measures the four channels concurrently on tokio's
// blocking pool, bounded by a worker semaphore.
//
// Concurrency never reaches the shared state. Each channel runs in its own isolated
// session and returns its report; the reports are merged into the `Aggregator`
// afterwards, in the fixed B, G, R, NIR order. The ordinal binding inside a channel and
// the write-once rule of the aggregator therefore hold exactly as in the sequential
// pipeline, and both pipelines produce identical reports for identical inputs.

use crate::core_modules::channel::{CHANNEL_COUNT, Channel};
use crate::core_modules::channel_session::{ChannelReport, ChannelSession};
use crate::core_modules::grid::GridSource;
use crate::core_modules::pointer::{Capture, SelectionSet};
use crate::core_modules::profile::CalibrationProfile;
use crate::error::{RunError, SessionError};
use crate::pipeline::{PipelineConfig, RunAssembler, RunReport};
use log::info;
use std::sync::Arc;
use tokio::sync::Semaphore;

type ChannelResult = Result<ChannelReport, SessionError>;

pub struct ParallelPipeline {
    profile: Arc<CalibrationProfile>,
    config: PipelineConfig,
    workers: usize,
}

impl ParallelPipeline {
    pub fn new(profile: Arc<CalibrationProfile>, config: PipelineConfig) -> Self {
        Self {
            profile,
            config,
            workers: num_cpus::get().clamp(1, CHANNEL_COUNT),
        }
    }

    /// Caps the number of channels processed at the same time.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub async fn run<G>(&self, grids: Arc<G>, mut selections: SelectionSet) -> Result<RunReport, RunError>
    where
        G: GridSource + Send + Sync + 'static,
    {
        info!(
            "Dispatching {} channels across {} worker(s)",
            CHANNEL_COUNT, self.workers
        );
        let semaphore = Arc::new(Semaphore::new(self.workers));

        let tasks = Channel::ALL.into_iter().map(|channel| {
            let capture = selections.take(channel).unwrap_or_else(Capture::cancelled);
            Self::process_channel(
                channel,
                Arc::clone(&self.profile),
                self.config,
                Arc::clone(&grids),
                capture,
                Arc::clone(&semaphore),
            )
        });
        let results = futures::future::join_all(tasks).await;

        let mut assembler = RunAssembler::new(&self.profile);
        for (channel, result) in Channel::ALL.into_iter().zip(results) {
            assembler.record(channel, result?)?;
        }
        Ok(assembler.finish())
    }

    async fn process_channel<G>(
        channel: Channel,
        profile: Arc<CalibrationProfile>,
        config: PipelineConfig,
        grids: Arc<G>,
        capture: Capture,
        semaphore: Arc<Semaphore>,
    ) -> Result<ChannelResult, RunError>
    where
        G: GridSource + Send + Sync + 'static,
    {
        // An uncalibrated channel is refused before it takes a worker.
        let mut session = match ChannelSession::begin(channel, &profile, &config) {
            Ok(session) => session,
            Err(err) => return Ok(Err(err)),
        };

        let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|err| RunError::Worker {
                channel,
                reason: err.to_string(),
            })?;

        tokio::task::spawn_blocking(move || {
            let grid = grids
                .load(channel)
                .map_err(|err| SessionError::GridUnavailable {
                    channel,
                    reason: err.to_string(),
                })?;
            for point in capture.points {
                session.add_point(point)?;
            }
            session.finish(capture.termination, &grid)
        })
        .await
        .map_err(|err| RunError::Worker {
            channel,
            reason: err.to_string(),
        })
    }
}
