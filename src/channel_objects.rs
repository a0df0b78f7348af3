use std::fmt;

use crate::api::api_objects::Job;

/// Busy flag plus the job occupying the slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionState {
    pub busy: bool,
    pub job: Option<Job>,
}

impl ExecutionState {
    pub fn running(job: Job) -> Self {
        ExecutionState {
            busy: true,
            job: Some(job),
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job.as_ref().map(|job| job.id.as_str())
    }
}

/// How a job that did not fail finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// A non-empty artifact already existed; the tool was not run.
    Skipped,
    Completed,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Skipped => write!(f, "skipped"),
            JobOutcome::Completed => write!(f, "completed"),
        }
    }
}
