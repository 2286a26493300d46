//! Transfer jobs: file synchronization and database dump/restore.
//!
//! Both jobs share one execution model. In synchronous mode the job's
//! processes run to completion while their output is forwarded line by line.
//! In background mode the processes are detached into their own process
//! group and a tokio task awaits them, so the real exit status is captured
//! even though the caller only tracks a PID.

pub mod database;
pub mod files;

pub use database::DatabaseTransferJob;
pub use files::FileTransferJob;

use std::fmt;
use std::process::Stdio;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{MigrateError, Result};

/// How a job's processes are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Block until exit, streaming output.
    Synchronous,
    /// Detach and return a PID immediately.
    Background,
}

impl ExecutionMode {
    pub fn from_synchronous(synchronous: bool) -> Self {
        if synchronous {
            ExecutionMode::Synchronous
        } else {
            ExecutionMode::Background
        }
    }
}

/// Which transfer a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    FileTransfer,
    DatabaseTransfer,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::FileTransfer => f.write_str("file transfer"),
            JobKind::DatabaseTransfer => f.write_str("database transfer"),
        }
    }
}

/// Final status of a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobExit {
    pub kind: JobKind,
    /// Exit code of the first failing process, or of the last one on success.
    /// `None` when a process was killed by a signal or could not be awaited.
    pub code: Option<i32>,
    pub success: bool,
}

/// PID-level view of a background job, as seen by the completion monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedJob {
    pub kind: JobKind,
    pub pid: u32,
}

/// A detached job: its PID plus the task that reaps it.
#[derive(Debug)]
pub struct JobHandle {
    kind: JobKind,
    pid: u32,
    task: JoinHandle<JobExit>,
}

impl JobHandle {
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn tracked(&self) -> TrackedJob {
        TrackedJob {
            kind: self.kind,
            pid: self.pid,
        }
    }

    /// Await the reaper task and return the captured exit status.
    pub async fn outcome(self) -> Result<JobExit> {
        self.task
            .await
            .map_err(|e| MigrateError::transfer(self.kind.to_string(), format!("task panicked: {}", e)))
    }
}

/// What `start` produced.
#[derive(Debug)]
pub enum JobResult {
    /// Synchronous run finished.
    Completed(JobExit),
    /// Background run detached.
    Detached(JobHandle),
    /// The run mode excludes this job.
    Skipped,
}

/// One process of a job, labelled for log output.
pub(crate) struct Stage {
    pub label: &'static str,
    pub child: Child,
}

/// Apply the stdio and process-group settings for `mode`.
pub(crate) fn configure_output(cmd: &mut Command, mode: ExecutionMode) {
    match mode {
        ExecutionMode::Synchronous => {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        ExecutionMode::Background => {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
            // Own process group: a terminal interrupt must not reach the job.
            #[cfg(unix)]
            cmd.process_group(0);
        }
    }
}

/// Run stages to completion, forwarding their output.
pub(crate) async fn run_to_completion(kind: JobKind, mut stages: Vec<Stage>) -> JobExit {
    let mut forwarders = Vec::new();
    for stage in &mut stages {
        if let Some(stdout) = stage.child.stdout.take() {
            forwarders.push(tokio::spawn(forward_lines(stdout, stage.label, false)));
        }
        if let Some(stderr) = stage.child.stderr.take() {
            forwarders.push(tokio::spawn(forward_lines(stderr, stage.label, true)));
        }
    }

    let exit = wait_all(kind, stages).await;

    for forwarder in forwarders {
        let _ = forwarder.await;
    }

    exit
}

/// Hand the stages to a reaper task and return the tail process's PID.
pub(crate) fn detach(kind: JobKind, stages: Vec<Stage>) -> Result<JobHandle> {
    let pid = stages
        .last()
        .and_then(|s| s.child.id())
        .ok_or_else(|| MigrateError::launch(kind.to_string(), "no process identifier was assigned"))?;

    let task = tokio::spawn(wait_all(kind, stages));

    Ok(JobHandle { kind, pid, task })
}

async fn wait_all(kind: JobKind, stages: Vec<Stage>) -> JobExit {
    let mut first_failure: Option<Option<i32>> = None;
    let mut last_code = None;

    for mut stage in stages {
        match stage.child.wait().await {
            Ok(status) => {
                last_code = status.code();
                if !status.success() && first_failure.is_none() {
                    warn!("{}: {} exited with {}", kind, stage.label, status);
                    first_failure = Some(status.code());
                }
            }
            Err(e) => {
                error!("{}: failed to wait for {}: {}", kind, stage.label, e);
                if first_failure.is_none() {
                    first_failure = Some(None);
                }
            }
        }
    }

    match first_failure {
        Some(code) => JobExit {
            kind,
            code,
            success: false,
        },
        None => JobExit {
            kind,
            code: last_code,
            success: true,
        },
    }
}

async fn forward_lines<R>(reader: R, tool: &'static str, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        emit(tool, &line, is_stderr);
    }
}

// Event targets must be static, so each tool gets its own arm. The message
// names the tool as well since the text log format omits targets.
fn emit(tool: &str, line: &str, is_stderr: bool) {
    let line = tool_line(tool, line);
    match (tool, is_stderr) {
        ("rsync", false) => info!(target: "rsync", "{}", line),
        ("rsync", true) => warn!(target: "rsync", "{}", line),
        ("mysqldump", false) => info!(target: "mysqldump", "{}", line),
        ("mysqldump", true) => warn!(target: "mysqldump", "{}", line),
        ("mysql", false) => info!(target: "mysql", "{}", line),
        ("mysql", true) => warn!(target: "mysql", "{}", line),
        (_, false) => info!("{}", line),
        (_, true) => warn!("{}", line),
    }
}

fn tool_line(tool: &str, line: &str) -> String {
    format!("{}: {}", tool, line)
}
