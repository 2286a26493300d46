//! Database dump-and-restore pipeline.
//!
//! `ssh source mysqldump ... | mysql destination`, streamed with no
//! intermediate file. The source password is fed to the remote shell on
//! stdin and the destination password goes through the child environment.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::{configure_output, detach, run_to_completion, ExecutionMode, JobKind, JobResult, Stage};
use crate::config::{Credentials, DatabaseConfig, RunMode, SshTarget};
use crate::error::{MigrateError, Result};
use crate::remote::command;

/// Tables whose rows are not migrated: visitor logs, guest sessions, the mail
/// log and the search index. Their structure is still dumped.
pub const DENYLIST: &[&str] = &[
    "connections",
    "connections_page",
    "connections_source",
    "guest",
    "log",
    "mail",
    "pagenotfound",
    "search_index",
    "search_word",
    "statssearch",
];

/// Streams the source database into the destination database.
#[derive(Debug, Clone)]
pub struct DatabaseTransferJob {
    target: SshTarget,
    source: DatabaseConfig,
    destination: DatabaseConfig,
    excluded_tables: Vec<String>,
}

impl DatabaseTransferJob {
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            target: credentials.ssh.clone(),
            source: credentials.source.clone(),
            destination: credentials.destination.clone(),
            excluded_tables: DENYLIST
                .iter()
                .map(|t| format!("{}{}", credentials.table_prefix, t))
                .collect(),
        }
    }

    /// Reason the run mode excludes this job, if it does.
    pub fn skip_reason(mode: &RunMode) -> Option<&'static str> {
        if mode.configure_only {
            Some("--configure-only")
        } else if mode.files_only {
            Some("--files-only")
        } else {
            None
        }
    }

    /// Prefixed names of the tables dumped without rows.
    pub fn excluded_tables(&self) -> &[String] {
        &self.excluded_tables
    }

    /// Command line run by the remote shell: a full dump minus the denylist,
    /// followed by a structure-only dump of the denylisted tables.
    pub fn remote_dump_script(&self) -> String {
        let db = &self.source;
        let port = db.port.to_string();
        let base = [
            "mysqldump",
            "-h",
            db.host.as_str(),
            "-P",
            port.as_str(),
            "-u",
            db.user.as_str(),
            "--single-transaction",
            "--quick",
            "--no-tablespaces",
        ];

        let mut data_dump: Vec<String> = base.iter().map(|s| s.to_string()).collect();
        data_dump.extend(
            self.excluded_tables
                .iter()
                .map(|t| format!("--ignore-table={}.{}", db.database, t)),
        );
        data_dump.push(db.database.clone());

        let mut script = shell_words::join(&data_dump);

        if !self.excluded_tables.is_empty() {
            let mut schema_dump: Vec<String> = base.iter().map(|s| s.to_string()).collect();
            schema_dump.push("--no-data".to_string());
            schema_dump.push(db.database.clone());
            schema_dump.extend(self.excluded_tables.iter().cloned());
            script.push_str(" && ");
            script.push_str(&shell_words::join(&schema_dump));
        }

        command::with_password_from_stdin(&script)
    }

    /// Local restore client; the password travels in `MYSQL_PWD`.
    pub fn restore_command(&self) -> Command {
        let db = &self.destination;
        let mut cmd = Command::new("mysql");
        cmd.arg("-h")
            .arg(&db.host)
            .arg("-P")
            .arg(db.port.to_string())
            .arg("-u")
            .arg(&db.user)
            .arg(&db.database)
            .env("MYSQL_PWD", &db.password);
        cmd
    }

    /// Start the pipeline according to `mode`.
    pub async fn start(&self, mode: &RunMode) -> Result<JobResult> {
        if let Some(reason) = Self::skip_reason(mode) {
            info!("Skipping database transfer ({})", reason);
            return Ok(JobResult::Skipped);
        }

        let kind = JobKind::DatabaseTransfer;
        let execution = ExecutionMode::from_synchronous(mode.synchronous);
        let launch_err = |e: std::io::Error| MigrateError::launch(kind.to_string(), e.to_string());

        let script = self.remote_dump_script();
        debug!("Remote dump: {}", script);

        let mut dump = command::ssh_command(&self.target, &script);
        configure_output(&mut dump, execution);
        dump.stdin(Stdio::piped()).stdout(Stdio::piped());

        info!(
            "Starting database transfer {}@{} -> {}@{}",
            self.source.database, self.source.host, self.destination.database, self.destination.host
        );
        let mut dump_child = dump.spawn().map_err(launch_err)?;

        if let Some(mut stdin) = dump_child.stdin.take() {
            stdin
                .write_all(command::password_line(&self.source).as_bytes())
                .await
                .map_err(launch_err)?;
            stdin.shutdown().await.map_err(launch_err)?;
        }

        let dump_stdout: Stdio = dump_child
            .stdout
            .take()
            .ok_or_else(|| MigrateError::launch(kind.to_string(), "dump output was not captured"))?
            .try_into()
            .map_err(launch_err)?;

        let mut restore = self.restore_command();
        configure_output(&mut restore, execution);
        restore.stdin(dump_stdout);

        let spawned = restore.spawn();
        // The command still owns the pipe's read end; the dump only sees
        // EPIPE once the restore client is the sole reader.
        drop(restore);
        let restore_child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let _ = dump_child.start_kill();
                return Err(launch_err(e));
            }
        };

        let stages = vec![
            Stage {
                label: "mysqldump",
                child: dump_child,
            },
            Stage {
                label: "mysql",
                child: restore_child,
            },
        ];

        match execution {
            ExecutionMode::Synchronous => Ok(JobResult::Completed(run_to_completion(kind, stages).await)),
            ExecutionMode::Background => {
                let handle = detach(kind, stages)?;
                info!("Database transfer running in background (pid {})", handle.pid());
                Ok(JobResult::Detached(handle))
            }
        }
    }
}
