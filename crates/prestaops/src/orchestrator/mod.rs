//! Migration orchestrator - sequences probes, transfers and site configuration.

mod plan;

pub use plan::MigrationPlan;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{
    ask_until_valid, CredentialKey, CredentialSet, CredentialStore, Credentials, Prompt, RunMode,
    MAX_PROMPT_ATTEMPTS,
};
use crate::error::{MigrateError, Result};
use crate::monitor::CompletionMonitor;
use crate::remote::{require_binary, ConnectivityResult, RemoteShell};
use crate::site::{MysqlShopUrlStore, RecordStatus, SiteConfigurator, SiteReport};
use crate::transfer::{
    DatabaseTransferJob, FileTransferJob, JobExit, JobHandle, JobKind, JobResult,
};

/// Everything a run needs, passed explicitly to each component.
#[derive(Debug, Clone)]
pub struct MigrationContext {
    pub credentials: Credentials,
    pub mode: RunMode,
}

/// Final state of one transfer stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Skipped,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub job: JobKind,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl StageReport {
    fn skipped(job: JobKind) -> Self {
        Self {
            job,
            status: StageStatus::Skipped,
            pid: None,
            exit_code: None,
        }
    }

    fn finished(exit: &JobExit, pid: Option<u32>) -> Self {
        Self {
            job: exit.kind,
            status: if exit.success {
                StageStatus::Succeeded
            } else {
                StageStatus::Failed
            },
            pid,
            exit_code: exit.code,
        }
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Flags the run was started with.
    pub mode: RunMode,

    /// Transfer stages in launch order.
    pub stages: Vec<StageReport>,

    /// Site configuration outcome, when a staging suffix was set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<SiteReport>,
}

impl MigrationResult {
    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Outcome of the source-side probes.
#[derive(Debug, Clone, Serialize)]
pub struct SourceCheck {
    pub ssh: ConnectivityResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    /// Raw `id domain domain_ssl` lines from the source shop_url table.
    pub shop_urls: Vec<String>,
}

/// Migration orchestrator.
pub struct Orchestrator {
    store: CredentialStore,
    prompt: Box<dyn Prompt>,
    variables: CredentialSet,
    context: MigrationContext,
    show_progress: bool,
}

impl Orchestrator {
    /// Validate `mode`, then load (and prompt for) the credentials.
    ///
    /// Run-mode errors are reported before any prompt or file access.
    pub fn new(store: CredentialStore, prompt: Box<dyn Prompt>, mode: RunMode) -> Result<Self> {
        mode.validate()?;
        if mode.database_only && mode.files_only {
            warn!("--database-only and --files-only together skip both transfers");
        }

        let variables = store.ensure_loaded(prompt.as_ref())?;
        let credentials = Credentials::try_from(&variables)?;

        Ok(Self {
            store,
            prompt,
            variables,
            context: MigrationContext { credentials, mode },
            show_progress: true,
        })
    }

    /// Show or hide the completion monitor's spinner.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn context(&self) -> &MigrationContext {
        &self.context
    }

    /// Run the source-side probes only.
    pub async fn check(&mut self) -> Result<SourceCheck> {
        require_binary("ssh")?;
        self.verify_source(true, true).await
    }

    /// Run the migration.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let plan = MigrationPlan::from_mode(&self.context.mode);

        info!("Starting migration run: {}", run_id);
        info!("{}", plan);
        ensure_not_cancelled(&cancel)?;

        for binary in plan.required_binaries() {
            require_binary(binary)?;
        }

        // The ssh probe always runs; path and database probes follow the plan.
        self.verify_source(plan.transfer_files, plan.transfer_database)
            .await?;

        // Launch: files first, then database.
        let mut stages = Vec::new();
        let mut handles = Vec::new();
        let file_job = FileTransferJob::new(&self.context.credentials);
        let database_job = DatabaseTransferJob::new(&self.context.credentials);

        ensure_not_cancelled(&cancel)?;
        let result = file_job.start(&self.context.mode).await?;
        record_launch(JobKind::FileTransfer, result, &mut stages, &mut handles)?;

        ensure_not_cancelled(&cancel)?;
        let result = database_job.start(&self.context.mode).await?;
        record_launch(JobKind::DatabaseTransfer, result, &mut stages, &mut handles)?;

        if plan.wait_before_configure && !handles.is_empty() {
            info!("Waiting for transfers before configuring the site");
            stages.extend(self.await_jobs(std::mem::take(&mut handles), &cancel).await?);
        }

        ensure_not_cancelled(&cancel)?;
        let site = match SiteConfigurator::from_run(&self.context.mode, &self.context.credentials) {
            Some(configurator) => Some(self.configure_site(&configurator).await),
            None => {
                if self.context.mode.disable_ssl {
                    warn!("--disable-ssl has no effect without --staging-url-suffix");
                }
                None
            }
        };

        let (site, finished) = self.settle(site.transpose(), handles, &cancel).await?;
        stages.extend(finished);

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let degraded = site.as_ref().is_some_and(|s| {
            s.count(RecordStatus::Failed) > 0 || s.rewrite_generator.is_none()
        });
        let status = if degraded {
            "completed_with_warnings"
        } else {
            "completed"
        };

        info!("Migration {} in {:.1}s", status, duration);

        Ok(MigrationResult {
            run_id,
            status: status.to_string(),
            duration_seconds: duration,
            started_at,
            completed_at,
            mode: self.context.mode,
            stages,
            site,
        })
    }

    /// SSH probe, source path probe and source database probe.
    async fn verify_source(&mut self, check_path: bool, check_database: bool) -> Result<SourceCheck> {
        let shell = RemoteShell::new(self.context.credentials.ssh.clone());
        let destination = shell.target().destination();

        info!("Checking SSH connection to {}", destination);
        let ssh = shell.verify_connectivity().await?;
        if !ssh.success {
            error!("SSH connection to {} failed", destination);
            return Err(MigrateError::connectivity(destination, ssh.output));
        }
        info!("SSH connection OK (remote user: {})", ssh.output);

        let source_path = if check_path {
            Some(self.verify_source_path(&shell).await?)
        } else {
            None
        };

        let shop_urls = if check_database {
            self.verify_source_database(&shell).await?
        } else {
            Vec::new()
        };

        Ok(SourceCheck {
            ssh,
            source_path,
            shop_urls,
        })
    }

    /// Confirm SOURCE_PATH holds a shop; re-prompt and persist on a miss.
    async fn verify_source_path(&mut self, shell: &RemoteShell) -> Result<String> {
        let marker = configuration_marker(&self.context.credentials.prestashop_version);

        for attempt in 1..=MAX_PROMPT_ATTEMPTS {
            let source_path = self.context.credentials.source_path.clone();
            let probe = format!("{}/{}", source_path.trim_end_matches('/'), marker);

            if shell.path_exists(&probe).await? {
                info!("Source path OK: {}", source_path);
                return Ok(source_path);
            }

            warn!(
                "{} not found on {} (attempt {}/{})",
                probe,
                shell.target().host,
                attempt,
                MAX_PROMPT_ATTEMPTS
            );
            if attempt == MAX_PROMPT_ATTEMPTS {
                break;
            }

            let corrected = ask_until_valid(self.prompt.as_ref(), CredentialKey::SourcePath)?;
            self.store
                .update(&mut self.variables, CredentialKey::SourcePath, corrected.clone())?;
            self.context.credentials.source_path = corrected;
        }

        Err(MigrateError::connectivity(
            shell.target().destination(),
            format!(
                "no PrestaShop installation found at {}",
                self.context.credentials.source_path
            ),
        ))
    }

    async fn verify_source_database(&self, shell: &RemoteShell) -> Result<Vec<String>> {
        let credentials = &self.context.credentials;
        let sql = format!(
            "SELECT id_shop_url, domain, domain_ssl FROM {}shop_url;",
            credentials.table_prefix
        );

        info!("Checking source database {}", credentials.source.database);
        let lines = shell.run_remote_query(&credentials.source, &sql).await?;
        for line in &lines {
            info!("Source shop URL: {}", line);
        }
        Ok(lines)
    }

    async fn configure_site(&self, configurator: &SiteConfigurator) -> Result<SiteReport> {
        let credentials = &self.context.credentials;
        let mut store =
            MysqlShopUrlStore::connect(&credentials.destination, &credentials.table_prefix).await?;
        let report = configurator.apply(&mut store).await;
        store.close().await?;
        report
    }

    /// Wait for detached jobs whatever the site configuration outcome, then
    /// report a configuration error ahead of any job failure.
    async fn settle(
        &self,
        site: Result<Option<SiteReport>>,
        handles: Vec<JobHandle>,
        cancel: &CancellationToken,
    ) -> Result<(Option<SiteReport>, Vec<StageReport>)> {
        if let Err(e) = &site {
            error!("Site configuration failed: {}", e);
            if !handles.is_empty() {
                warn!("Waiting for background transfers before exiting");
            }
        }

        let finished = if handles.is_empty() {
            Ok(Vec::new())
        } else {
            self.await_jobs(handles, cancel).await
        };

        let site = site?;
        Ok((site, finished?))
    }

    /// Monitor detached jobs until they exit, then collect their statuses.
    async fn await_jobs(
        &self,
        handles: Vec<JobHandle>,
        cancel: &CancellationToken,
    ) -> Result<Vec<StageReport>> {
        let tracked: Vec<_> = handles.iter().map(JobHandle::tracked).collect();
        CompletionMonitor::new()
            .show_progress(self.show_progress)
            .wait_for_all(&tracked, cancel)
            .await?;
        collect_outcomes(handles).await
    }
}

/// File whose presence marks a shop root, by platform version.
fn configuration_marker(version: &str) -> &'static str {
    if version.trim().starts_with("1.6") {
        "config/settings.inc.php"
    } else {
        "app/config/parameters.php"
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(MigrateError::Cancelled)
    } else {
        Ok(())
    }
}

/// Record a launch; a failed synchronous job stops the run.
fn record_launch(
    kind: JobKind,
    result: JobResult,
    stages: &mut Vec<StageReport>,
    handles: &mut Vec<JobHandle>,
) -> Result<()> {
    match result {
        JobResult::Skipped => stages.push(StageReport::skipped(kind)),
        JobResult::Completed(exit) => {
            stages.push(StageReport::finished(&exit, None));
            if !exit.success {
                return Err(MigrateError::transfer(kind.to_string(), exit_description(&exit)));
            }
            info!("{} completed", kind);
        }
        JobResult::Detached(handle) => handles.push(handle),
    }
    Ok(())
}

/// Await the reaper of every handle; any failed job fails the run.
async fn collect_outcomes(handles: Vec<JobHandle>) -> Result<Vec<StageReport>> {
    let mut reports = Vec::with_capacity(handles.len());
    let mut failures = Vec::new();

    for handle in handles {
        let pid = handle.pid();
        let exit = handle.outcome().await?;
        if exit.success {
            info!("{} (pid {}) completed", exit.kind, pid);
        } else {
            error!("{} (pid {}) {}", exit.kind, pid, exit_description(&exit));
            failures.push(format!("{} {}", exit.kind, exit_description(&exit)));
        }
        reports.push(StageReport::finished(&exit, Some(pid)));
    }

    if failures.is_empty() {
        Ok(reports)
    } else {
        Err(MigrateError::transfer("background transfer", failures.join("; ")))
    }
}

fn exit_description(exit: &JobExit) -> String {
    match exit.code {
        Some(code) => format!("exited with code {}", code),
        None => "was terminated by a signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DESTINATION_DATABASE_PORT;
    use crate::site::{ShopDomainRecord, ShopUrlStore};
    use async_trait::async_trait;
    use crate::transfer::{configure_output, detach, ExecutionMode, Stage};
    use std::cell::Cell;
    use tempfile::TempDir;
    use tokio::process::Command;

    struct CountingPrompt {
        calls: std::rc::Rc<Cell<usize>>,
    }

    impl Prompt for CountingPrompt {
        fn ask(&self, key: CredentialKey) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            Err(MigrateError::Prompt(format!("unexpected prompt for {}", key)))
        }
    }

    fn counting_prompt() -> (Box<dyn Prompt>, std::rc::Rc<Cell<usize>>) {
        let calls = std::rc::Rc::new(Cell::new(0));
        (
            Box::new(CountingPrompt {
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn complete_store(dir: &TempDir) -> CredentialStore {
        let store = CredentialStore::new(dir.path().join(".prestaops"));
        let mut set: CredentialSet = CredentialKey::REQUIRED
            .iter()
            .map(|k| (k.as_str().to_string(), "value".to_string()))
            .collect();
        set.set("DATABASE_PREFIX", "ps_");
        set.set("PRESTASHOP_VERSION", "8.1.2");
        set.set(DESTINATION_DATABASE_PORT, "3306");
        store.save(&set).unwrap();
        store
    }

    #[test]
    fn test_configure_only_without_suffix_fails_before_prompting() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join(".prestaops"));
        let (prompt, calls) = counting_prompt();

        let mode = RunMode {
            configure_only: true,
            ..Default::default()
        };
        let err = Orchestrator::new(store.clone(), prompt, mode).err().unwrap();

        assert!(matches!(err, MigrateError::Config(_)));
        assert_eq!(calls.get(), 0);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_complete_store_needs_no_prompt() {
        let dir = TempDir::new().unwrap();
        let (prompt, calls) = counting_prompt();
        let orchestrator =
            Orchestrator::new(complete_store(&dir), prompt, RunMode::default()).unwrap();
        assert_eq!(calls.get(), 0);
        assert_eq!(orchestrator.context().credentials.table_prefix, "ps_");
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_before_launching() {
        let dir = TempDir::new().unwrap();
        let (prompt, _) = counting_prompt();
        let mode = RunMode {
            database_only: true,
            files_only: true,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = Orchestrator::new(complete_store(&dir), prompt, mode)
            .unwrap()
            .run(cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Cancelled));
    }

    fn background(kind: JobKind, script: &str) -> JobHandle {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        configure_output(&mut cmd, ExecutionMode::Background);
        let stage = Stage {
            label: "sh",
            child: cmd.spawn().unwrap(),
        };
        detach(kind, vec![stage]).unwrap()
    }

    #[tokio::test]
    async fn test_collect_outcomes_reports_each_job() {
        let handles = vec![
            background(JobKind::FileTransfer, "exit 0"),
            background(JobKind::DatabaseTransfer, "sleep 0.05"),
        ];
        let reports = collect_outcomes(handles).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.status == StageStatus::Succeeded));
        assert!(reports.iter().all(|r| r.pid.is_some()));
    }

    #[tokio::test]
    async fn test_collect_outcomes_fails_on_nonzero_exit() {
        let handles = vec![
            background(JobKind::FileTransfer, "exit 0"),
            background(JobKind::DatabaseTransfer, "exit 1"),
        ];
        let err = collect_outcomes(handles).await.unwrap_err();
        match err {
            MigrateError::Transfer { message, .. } => {
                assert!(message.contains("database transfer exited with code 1"))
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    /// Destination that refuses every query.
    struct UnreachableStore;

    #[async_trait]
    impl ShopUrlStore for UnreachableStore {
        async fn fetch_shop_urls(&mut self) -> Result<Vec<ShopDomainRecord>> {
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into())
        }

        async fn disable_ssl(&mut self) -> Result<()> {
            Ok(())
        }

        async fn update_shop_url(&mut self, _record: &ShopDomainRecord) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_site_failure_still_waits_for_background_jobs() {
        let dir = TempDir::new().unwrap();
        let (prompt, _) = counting_prompt();
        let orchestrator = Orchestrator::new(complete_store(&dir), prompt, RunMode::default())
            .unwrap()
            .with_progress(false);

        let restored = dir.path().join("restored");
        let handle = background(
            JobKind::DatabaseTransfer,
            &format!("sleep 0.2; touch '{}'", restored.display()),
        );

        let site = SiteConfigurator::new("staging.example.com", false)
            .apply(&mut UnreachableStore)
            .await;
        assert!(site.is_err());

        let err = orchestrator
            .settle(site.map(Some), vec![handle], &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MigrateError::Io(_)));
        assert!(restored.exists());
    }

    #[tokio::test]
    async fn test_settle_reports_job_failure_after_site_success() {
        let dir = TempDir::new().unwrap();
        let (prompt, _) = counting_prompt();
        let orchestrator = Orchestrator::new(complete_store(&dir), prompt, RunMode::default())
            .unwrap()
            .with_progress(false);

        let handle = background(JobKind::FileTransfer, "exit 23");
        let err = orchestrator
            .settle(Ok(None), vec![handle], &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_failed_synchronous_job_stops_run() {
        let mut stages = Vec::new();
        let mut handles = Vec::new();
        let exit = JobExit {
            kind: JobKind::FileTransfer,
            code: Some(23),
            success: false,
        };
        let err = record_launch(
            JobKind::FileTransfer,
            JobResult::Completed(exit),
            &mut stages,
            &mut handles,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert_eq!(stages[0].exit_code, Some(23));
    }

    #[test]
    fn test_configuration_marker_by_version() {
        assert_eq!(configuration_marker("1.6.1.24"), "config/settings.inc.php");
        assert_eq!(configuration_marker("1.7.8.11"), "app/config/parameters.php");
        assert_eq!(configuration_marker("8.1.2"), "app/config/parameters.php");
    }
}
