use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};

use crate::api::api_objects::Job;
use crate::channel_objects::ExecutionState;
use crate::errors::AdmissionError;

/// The single execution slot. Written by admission (occupy) and by the worker
/// (begin/finish); read by status queries.
#[derive(Debug, Default)]
pub struct ExecutionSlot {
    state: Mutex<ExecutionState>,
}

impl ExecutionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ExecutionState {
        self.state.lock().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    /// Called by the worker once it holds the job.
    pub fn begin(&self, job: &Job) {
        *self.state.lock() = ExecutionState::running(job.clone());
    }

    /// Resets to idle; runs after every job whatever its outcome.
    pub fn finish(&self) {
        *self.state.lock() = ExecutionState::default();
    }
}

/// Creates the capacity-1 hand-off between the HTTP side and the worker.
pub fn admission_channel(slot: Arc<ExecutionSlot>) -> (JobAdmission, mpsc::Receiver<Job>) {
    let (tx, rx) = mpsc::channel::<Job>(1);
    (JobAdmission { tx, slot }, rx)
}

#[derive(Debug, Clone)]
pub struct JobAdmission {
    tx: mpsc::Sender<Job>,
    slot: Arc<ExecutionSlot>,
}

impl JobAdmission {
    /// Hands the job to the worker if the slot is free. Never waits.
    ///
    /// The slot is marked busy here, under the same lock as the check, so a
    /// second submission is rejected from the moment the first is accepted
    /// until the worker finishes it.
    pub fn try_submit(&self, job: Job) -> Result<(), AdmissionError> {
        let mut state = self.slot.state.lock();
        if state.busy {
            debug!(job_id = %job.id, running = ?state.job_id(), "rejecting job, slot occupied");
            return Err(AdmissionError::Busy);
        }

        let accepted = job.clone();
        match self.tx.try_send(job) {
            Ok(()) => {
                info!(job_id = %accepted.id, "job admitted");
                *state = ExecutionState::running(accepted);
                Ok(())
            }
            Err(TrySendError::Full(job)) => {
                debug!(job_id = %job.id, "rejecting job, hand-off slot full");
                Err(AdmissionError::Busy)
            }
            Err(TrySendError::Closed(_)) => Err(AdmissionError::WorkerUnavailable),
        }
    }

    pub fn status(&self) -> ExecutionState {
        self.slot.snapshot()
    }

    pub fn slot(&self) -> &Arc<ExecutionSlot> {
        &self.slot
    }
}
