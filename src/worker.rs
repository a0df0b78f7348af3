use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::api::api_objects::Job;
use crate::channel_objects::JobOutcome;
use crate::errors::JobError;
use crate::process_runner::{JobRunner, ProcessRunner};
use crate::requests_queue::{ExecutionSlot, JobAdmission, admission_channel};
use crate::result_store::ResultStore;
use crate::tactics::TacticsFile;
use crate::utils::Config;

/// Sole consumer of the admission channel. Runs one job at a time for the
/// lifetime of the process.
pub struct Worker {
    intake: mpsc::Receiver<Job>,
    slot: Arc<ExecutionSlot>,
    results: ResultStore,
    runner: Arc<dyn JobRunner>,
}

impl Worker {
    pub fn new(
        intake: mpsc::Receiver<Job>,
        slot: Arc<ExecutionSlot>,
        results: ResultStore,
        runner: Arc<dyn JobRunner>,
    ) -> Self {
        Worker {
            intake,
            slot,
            results,
            runner,
        }
    }

    pub async fn start(mut self) {
        info!("worker started");
        while let Some(job) = self.intake.recv().await {
            self.slot.begin(&job);
            info!(job_id = %job.id, "start processing request");

            match self.process(&job).await {
                Ok(outcome) => info!(job_id = %job.id, %outcome, "job finished"),
                Err(err) => error!(job_id = %job.id, error = %err, "job failed"),
            }

            self.slot.finish();
        }
        info!("admission channel closed, worker exiting");
    }

    /// Skip check, input materialization, then the tool. Any error ends the
    /// job without touching the artifact further.
    pub async fn process(&self, job: &Job) -> Result<JobOutcome, JobError> {
        if self.results.should_skip(&job.id).await? {
            info!(job_id = %job.id, "result exists, skipping");
            return Ok(JobOutcome::Skipped);
        }

        let paths = self.results.materialize_input(job).await?;
        self.runner.run(job, &paths).await?;
        Ok(JobOutcome::Completed)
    }
}

/// A running gateway: the submission side plus the worker task.
pub struct Gateway {
    pub admission: JobAdmission,
    pub worker: JoinHandle<()>,
}

/// Spawns the worker on the current tokio runtime.
pub fn spawn_worker(results: ResultStore, runner: Arc<dyn JobRunner>) -> Gateway {
    let slot = Arc::new(ExecutionSlot::new());
    let (admission, intake) = admission_channel(slot.clone());
    let worker = Worker::new(intake, slot, results, runner);
    Gateway {
        admission,
        worker: tokio::spawn(worker.start()),
    }
}

/// Prepares directories and the tactics document, then spawns the worker.
pub async fn start_gateway(config: &Config) -> anyhow::Result<Gateway> {
    let results = ResultStore::new(&config.input_directory, &config.output_directory);
    results
        .ensure_directories()
        .await
        .context("failed to prepare input/output directories")?;

    let tactics = match &config.invocation.tactics {
        Some(tactics_config) => Some(
            TacticsFile::load(tactics_config).context("failed to load base tactics document")?,
        ),
        None => None,
    };

    let runner = ProcessRunner::new(config, tactics);
    Ok(spawn_worker(results, Arc::new(runner)))
}
