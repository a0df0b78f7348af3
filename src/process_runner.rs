use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::api::api_objects::Job;
use crate::errors::JobError;
use crate::result_store::JobPaths;
use crate::tactics::TacticsFile;
use crate::utils::{ArgumentStyle, Config, InvocationConfig, PayloadDelivery, PtElement};

/// Bytes of stderr kept for the error message of a failed run.
const STDERR_TAIL_BYTES: usize = 2048;

/// Executes one admitted job.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &Job, paths: &JobPaths) -> Result<(), JobError>;
}

/// Everything needed to start the tool for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationPlan {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_directory: PathBuf,
    pub env_override: (String, OsString),
    pub stdin: Option<Vec<u8>>,
}

impl InvocationPlan {
    /// The inherited environment with the override applied.
    pub fn environment(&self) -> BTreeMap<OsString, OsString> {
        let mut env: BTreeMap<OsString, OsString> = std::env::vars_os().collect();
        let (name, value) = &self.env_override;
        env.insert(OsString::from(name), value.clone());
        env
    }
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    executable_path: PathBuf,
    working_directory: PathBuf,
    env_name: String,
    env_value: OsString,
    invocation: InvocationConfig,
    tactics: Option<TacticsFile>,
}

impl ProcessRunner {
    pub fn new(config: &Config, tactics: Option<TacticsFile>) -> Self {
        ProcessRunner {
            executable_path: config.executable_path.clone(),
            working_directory: config.working_directory.clone(),
            env_name: config.library_path.variable.clone(),
            env_value: config.library_path_value().into_os_string(),
            invocation: config.invocation.clone(),
            tactics,
        }
    }

    fn flag(&self, short: &'static str, long: &'static str) -> &'static str {
        match self.invocation.argument_style {
            ArgumentStyle::Short => short,
            ArgumentStyle::Long => long,
        }
    }

    /// Builds the invocation. Depends only on the job and the fixed configuration.
    pub fn plan(&self, job: &Job, paths: &JobPaths) -> InvocationPlan {
        let inv = &self.invocation;
        let mut args: Vec<OsString> = Vec::new();

        args.push(self.flag("-e", "--engine").into());
        args.push(inv.engine.clone().into());
        args.push(self.flag("-a", "--actor").into());
        args.push(job.target_actor.to_string().into());

        if inv.pt_list.pass_as_argument {
            args.push("--pt".into());
            args.push(encode_pt_list(&job.pt_list, inv.pt_list.element, &inv.pt_list.delimiter).into());
        }

        args.push("--deviation-threshold".into());
        args.push(format!("{:.6}", job.deviation_threshold).into());

        if inv.pass_output_path {
            args.push(self.flag("-o", "--out-file").into());
            args.push(paths.output.clone().into_os_string());
        }

        let stdin = match inv.payload_delivery {
            PayloadDelivery::File => {
                args.push(self.flag("-i", "--in-file").into());
                args.push(paths.input.clone().into_os_string());
                None
            }
            PayloadDelivery::Stdin => Some(job.data.clone()),
        };

        if let Some(tactics) = &self.tactics {
            args.push("--akochan-tactics".into());
            args.push(tactics.output_path().as_os_str().to_owned());
        }

        if let Some(lang) = &inv.lang {
            args.push("--lang".into());
            args.push(lang.clone().into());
        }

        args.extend(inv.flags.iter().map(OsString::from));

        InvocationPlan {
            program: self.executable_path.clone(),
            args,
            working_directory: self.working_directory.clone(),
            env_override: (self.env_name.clone(), self.env_value.clone()),
            stdin,
        }
    }

    pub async fn execute(&self, plan: &InvocationPlan) -> Result<(), JobError> {
        let mut child = Command::new(&plan.program)
            .args(&plan.args)
            .current_dir(&plan.working_directory)
            .env(&plan.env_override.0, &plan.env_override.1)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .stdin(if plan.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .spawn()
            .map_err(|source| JobError::Launch {
                program: plan.program.clone(),
                source,
            })?;
        debug!(pid = ?child.id(), "tool started");

        // drained alongside the stdin write
        let stderr = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(read_tail(pipe, STDERR_TAIL_BYTES)));

        if let Some(payload) = &plan.stdin {
            // always present: stdin was configured as piped above
            if let Some(mut pipe) = child.stdin.take() {
                let delivered = match pipe.write_all(payload).await {
                    Ok(()) => pipe.shutdown().await.map_err(|e| ("close", e)),
                    Err(e) => Err(("write", e)),
                };
                drop(pipe);
                if let Err((action, source)) = delivered {
                    warn!(action, error = %source, "stdin delivery failed, stopping tool");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    return Err(JobError::Pipe {
                        action,
                        program: plan.program.clone(),
                        source,
                    });
                }
            }
        }

        let status = child.wait().await.map_err(|source| JobError::Launch {
            program: plan.program.clone(),
            source,
        })?;
        if status.success() {
            return Ok(());
        }

        let tail = match stderr {
            Some(task) => task.await.unwrap_or_else(|_| StderrTail::new(STDERR_TAIL_BYTES)),
            None => StderrTail::new(STDERR_TAIL_BYTES),
        };
        Err(JobError::Execution {
            program: plan.program.clone(),
            status,
            stderr: tail.render(),
        })
    }
}

#[async_trait]
impl JobRunner for ProcessRunner {
    async fn run(&self, job: &Job, paths: &JobPaths) -> Result<(), JobError> {
        if let Some(tactics) = &self.tactics {
            tactics
                .write_for(&job.id, &job.pt_list, self.invocation.pt_list.element)
                .await?;
        }

        if let Some(parent) = paths.output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| JobError::filesystem("create directory", parent, e))?;
        }

        let plan = self.plan(job, paths);
        info!(
            job_id = %job.id,
            program = %plan.program.display(),
            args = ?plan.args,
            "running analysis"
        );
        self.execute(&plan).await
    }
}

pub fn encode_pt_list(pt_list: &[f64], element: PtElement, delimiter: &str) -> String {
    pt_list
        .iter()
        .map(|pt| element.format(*pt))
        .collect::<Vec<_>>()
        .join(delimiter)
}

/// The last `limit` bytes of a stream, kept while it is read.
#[derive(Debug)]
struct StderrTail {
    limit: usize,
    bytes: Vec<u8>,
    truncated: bool,
}

impl StderrTail {
    fn new(limit: usize) -> Self {
        StderrTail {
            limit,
            bytes: Vec::new(),
            truncated: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
        if self.bytes.len() > self.limit {
            let excess = self.bytes.len() - self.limit;
            self.bytes.drain(..excess);
            self.truncated = true;
        }
    }

    fn render(&self) -> String {
        let mut start = 0;
        if self.truncated {
            // skip a character cut in half by the window
            while start < self.bytes.len() && self.bytes[start] & 0xC0 == 0x80 {
                start += 1;
            }
        }
        let text = String::from_utf8_lossy(&self.bytes[start..]);
        let text = text.trim();
        if self.truncated {
            format!("...{}", text)
        } else {
            text.to_string()
        }
    }
}

async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> StderrTail {
    let mut tail = StderrTail::new(limit);
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => tail.push(&chunk[..n]),
            Err(e) => {
                debug!(error = %e, "stopped reading tool stderr");
                break;
            }
        }
    }
    tail
}
