//! Remote shell executor.
//!
//! Runs probes and SQL against the source server over ssh. The source
//! database is only reachable from the remote host, so queries tunnel a
//! `mysql` client invocation through the remote shell.

pub mod command;
pub mod process;

pub use process::{is_process_alive, require_binary, LivenessProbe, OsLivenessProbe};

use std::process::{Output, Stdio};

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::{DatabaseConfig, SshTarget};
use crate::error::{MigrateError, Result};

/// Outcome of the ssh authentication probe.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectivityResult {
    pub success: bool,
    /// Combined stdout/stderr of the probe.
    pub output: String,
}

/// Synchronous command runner for the source server.
#[derive(Debug, Clone)]
pub struct RemoteShell {
    target: SshTarget,
}

impl RemoteShell {
    pub fn new(target: SshTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &SshTarget {
        &self.target
    }

    /// Run `whoami` over ssh in batch mode.
    ///
    /// A failed probe is reported in the result, not as an error; only a
    /// failure to start `ssh` at all is an `Err`.
    pub async fn verify_connectivity(&self) -> Result<ConnectivityResult> {
        let cmd = command::ssh_command(&self.target, "whoami");
        let output = run_with_input(cmd, None).await?;

        let mut text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stderr.trim());
        }

        Ok(ConnectivityResult {
            success: output.status.success(),
            output: text,
        })
    }

    /// Check whether `path` exists on the remote host.
    pub async fn path_exists(&self, path: &str) -> Result<bool> {
        let cmd = command::ssh_command(&self.target, &command::remote_stat(path));
        let output = run_with_input(cmd, None).await?;
        Ok(output.status.success())
    }

    /// Run one SQL statement against `db` from the remote host.
    ///
    /// Returns the non-empty stdout lines; a non-zero exit becomes a
    /// Connectivity error carrying stderr.
    pub async fn run_remote_query(&self, db: &DatabaseConfig, sql: &str) -> Result<Vec<String>> {
        debug!("Remote query on {}: {}", db.database, sql);

        let cmd = command::ssh_command(&self.target, &command::remote_query(db, sql));
        let output = run_with_input(cmd, Some(command::password_line(db))).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(MigrateError::connectivity(
                format!("source database {}@{}", db.database, db.host),
                if stderr.is_empty() {
                    format!("mysql exited with {}", output.status)
                } else {
                    stderr
                },
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .filter(|l| !l.trim().is_empty())
            .collect())
    }
}

/// Run a command to completion, optionally feeding `input` on stdin.
async fn run_with_input(mut cmd: Command, input: Option<String>) -> Result<Output> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = cmd.spawn()?;
    if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
        stdin.write_all(input.as_bytes()).await?;
        stdin.shutdown().await?;
    }

    Ok(child.wait_with_output().await?)
}
