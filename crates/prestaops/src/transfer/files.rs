//! Shop file synchronization with rsync over ssh.

use std::path::PathBuf;

use tokio::process::Command;
use tracing::info;

use super::{configure_output, detach, run_to_completion, ExecutionMode, JobKind, JobResult, Stage};
use crate::config::{Credentials, RunMode, SshTarget};
use crate::error::{MigrateError, Result};
use crate::remote::command;

/// Paths (relative to the shop root) that are never copied: caches, logs,
/// temporary images and the environment-specific parameter files.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "/app/config/parameters.php",
    "/config/settings.inc.php",
    "/var/cache/*",
    "/var/logs/*",
    "/cache/smarty/cache/*",
    "/cache/smarty/compile/*",
    "/cache/cachefs/*",
    "/img/tmp/*",
    "/.git",
];

/// Copies the shop tree from the source host into DESTINATION_PATH.
#[derive(Debug, Clone)]
pub struct FileTransferJob {
    target: SshTarget,
    source_path: String,
    destination_path: PathBuf,
    excludes: Vec<String>,
}

impl FileTransferJob {
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            target: credentials.ssh.clone(),
            source_path: credentials.source_path.clone(),
            destination_path: credentials.destination_path.clone(),
            excludes: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Reason the run mode excludes this job, if it does.
    pub fn skip_reason(mode: &RunMode) -> Option<&'static str> {
        if mode.configure_only {
            Some("--configure-only")
        } else if mode.database_only {
            Some("--database-only")
        } else {
            None
        }
    }

    /// rsync argument vector (without the program name).
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-avz".to_string(),
            "-e".to_string(),
            command::rsync_shell(),
        ];
        args.extend(self.excludes.iter().map(|e| format!("--exclude={}", e)));
        args.push(format!(
            "{}:{}/",
            self.target.destination(),
            self.source_path.trim_end_matches('/')
        ));
        args.push(format!(
            "{}/",
            self.destination_path.to_string_lossy().trim_end_matches('/')
        ));
        args
    }

    /// Start the transfer according to `mode`.
    pub async fn start(&self, mode: &RunMode) -> Result<JobResult> {
        if let Some(reason) = Self::skip_reason(mode) {
            info!("Skipping file transfer ({})", reason);
            return Ok(JobResult::Skipped);
        }

        tokio::fs::create_dir_all(&self.destination_path).await?;

        let execution = ExecutionMode::from_synchronous(mode.synchronous);
        let mut cmd = Command::new("rsync");
        cmd.args(self.args());
        configure_output(&mut cmd, execution);

        info!(
            "Starting file transfer {}:{} -> {}",
            self.target.host,
            self.source_path,
            self.destination_path.display()
        );
        let child = cmd
            .spawn()
            .map_err(|e| MigrateError::launch(JobKind::FileTransfer.to_string(), e.to_string()))?;
        let stages = vec![Stage {
            label: "rsync",
            child,
        }];

        match execution {
            ExecutionMode::Synchronous => Ok(JobResult::Completed(
                run_to_completion(JobKind::FileTransfer, stages).await,
            )),
            ExecutionMode::Background => {
                let handle = detach(JobKind::FileTransfer, stages)?;
                info!("File transfer running in background (pid {})", handle.pid());
                Ok(JobResult::Detached(handle))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    fn credentials() -> Credentials {
        let db = DatabaseConfig {
            host: "localhost".into(),
            port: 3306,
            user: "shop".into(),
            password: "pw".into(),
            database: "shop".into(),
        };
        Credentials {
            ssh: SshTarget {
                user: "deploy".into(),
                host: "old.example.com".into(),
            },
            source_path: "/var/www/shop/".into(),
            source: db.clone(),
            destination: db,
            destination_path: PathBuf::from("/srv/shop"),
            table_prefix: "ps_".into(),
            prestashop_version: "1.7.8".into(),
            htaccess_template: None,
        }
    }

    #[test]
    fn test_args_copy_contents_into_destination() {
        let args = FileTransferJob::new(&credentials()).args();
        let n = args.len();
        assert_eq!(args[n - 2], "deploy@old.example.com:/var/www/shop/");
        assert_eq!(args[n - 1], "/srv/shop/");
        assert!(args.contains(&"--exclude=/var/cache/*".to_string()));
        assert!(args.contains(&"--exclude=/app/config/parameters.php".to_string()));
    }

    #[test]
    fn test_args_use_batch_ssh() {
        let args = FileTransferJob::new(&credentials()).args();
        let e = args.iter().position(|a| a == "-e").unwrap();
        assert!(args[e + 1].contains("BatchMode=yes"));
    }

    #[test]
    fn test_skip_reasons() {
        let mut mode = RunMode::default();
        assert_eq!(FileTransferJob::skip_reason(&mode), None);

        mode.files_only = true;
        assert_eq!(FileTransferJob::skip_reason(&mode), None);

        mode.database_only = true;
        assert_eq!(FileTransferJob::skip_reason(&mode), Some("--database-only"));

        let mode = RunMode {
            configure_only: true,
            ..Default::default()
        };
        assert_eq!(FileTransferJob::skip_reason(&mode), Some("--configure-only"));
    }

    #[tokio::test]
    async fn test_skipped_job_starts_nothing() {
        let mode = RunMode {
            database_only: true,
            ..Default::default()
        };
        let result = FileTransferJob::new(&credentials()).start(&mode).await.unwrap();
        assert!(matches!(result, JobResult::Skipped));
    }
}
