use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::api::api_objects::Job;
use crate::errors::JobError;

const INPUT_EXTENSION: &str = "json";
const ARTIFACT_EXTENSION: &str = "html";

/// Where one job reads its input and writes its artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Filesystem-backed result artifacts, keyed by job id.
#[derive(Debug, Clone)]
pub struct ResultStore {
    input_directory: PathBuf,
    output_directory: PathBuf,
}

impl ResultStore {
    pub fn new(input_directory: impl Into<PathBuf>, output_directory: impl Into<PathBuf>) -> Self {
        ResultStore {
            input_directory: input_directory.into(),
            output_directory: output_directory.into(),
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn input_path(&self, job_id: &str) -> PathBuf {
        self.input_directory.join(format!("{}.{}", job_id, INPUT_EXTENSION))
    }

    pub fn artifact_path(&self, job_id: &str) -> PathBuf {
        self.output_directory.join(format!("{}.{}", job_id, ARTIFACT_EXTENSION))
    }

    pub fn paths(&self, job_id: &str) -> JobPaths {
        JobPaths {
            input: self.input_path(job_id),
            output: self.artifact_path(job_id),
        }
    }

    pub async fn ensure_directories(&self) -> Result<(), JobError> {
        for dir in [&self.input_directory, &self.output_directory] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| JobError::filesystem("create directory", dir, e))?;
        }
        Ok(())
    }

    /// True only for an existing, non-empty artifact. A zero-byte file left by
    /// an interrupted run means the job has to run again.
    pub async fn should_skip(&self, job_id: &str) -> Result<bool, JobError> {
        let path = self.artifact_path(job_id);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => {
                debug!(job_id, size = meta.len(), "artifact found");
                Ok(meta.len() > 0)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(JobError::filesystem("stat", path, e)),
        }
    }

    /// Writes the payload verbatim, empty or not, to the job's input path.
    pub async fn materialize_input(&self, job: &Job) -> Result<JobPaths, JobError> {
        self.ensure_directories().await?;
        let paths = self.paths(&job.id);
        tokio::fs::write(&paths.input, &job.data)
            .await
            .map_err(|e| JobError::filesystem("write", &paths.input, e))?;
        debug!(job_id = %job.id, path = %paths.input.display(), bytes = job.data.len(), "input written");
        Ok(paths)
    }
}
