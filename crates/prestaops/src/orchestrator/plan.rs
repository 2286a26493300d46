//! Stage selection derived from the run mode.

use std::fmt;

use serde::Serialize;

use crate::config::RunMode;
use crate::transfer::{DatabaseTransferJob, ExecutionMode, FileTransferJob};

/// Which stages a run performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    pub transfer_files: bool,
    pub transfer_database: bool,
    pub configure_site: bool,
    pub execution: ExecutionMode,
    /// Block on detached transfers before configuring the site.
    pub wait_before_configure: bool,
}

impl MigrationPlan {
    pub fn from_mode(mode: &RunMode) -> Self {
        let transfer_files = FileTransferJob::skip_reason(mode).is_none();
        let transfer_database = DatabaseTransferJob::skip_reason(mode).is_none();
        let configure_site = mode.staging_suffix().is_some();

        Self {
            transfer_files,
            transfer_database,
            configure_site,
            execution: ExecutionMode::from_synchronous(mode.synchronous),
            wait_before_configure: mode.wait_before_configure && configure_site,
        }
    }

    /// Local programs the plan invokes. The ssh probe runs on every plan.
    pub fn required_binaries(&self) -> Vec<&'static str> {
        let mut binaries = vec!["ssh"];
        if self.transfer_files {
            binaries.push("rsync");
        }
        if self.transfer_database {
            binaries.push("mysql");
        }
        binaries
    }
}

impl fmt::Display for MigrationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on = |b: bool| if b { "yes" } else { "no" };
        write!(
            f,
            "Plan: files={} database={} configure={} mode={:?}",
            on(self.transfer_files),
            on(self.transfer_database),
            on(self.configure_site),
            self.execution
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_run() {
        let plan = MigrationPlan::from_mode(&RunMode::default());
        assert!(plan.transfer_files && plan.transfer_database);
        assert!(!plan.configure_site);
        assert_eq!(plan.execution, ExecutionMode::Background);
        assert_eq!(plan.required_binaries(), vec!["ssh", "rsync", "mysql"]);
    }

    #[test]
    fn test_database_only_skips_files() {
        let plan = MigrationPlan::from_mode(&RunMode {
            database_only: true,
            ..Default::default()
        });
        assert!(!plan.transfer_files);
        assert!(plan.transfer_database);
        assert_eq!(plan.required_binaries(), vec!["ssh", "mysql"]);
    }

    #[test]
    fn test_files_only_skips_database() {
        let plan = MigrationPlan::from_mode(&RunMode {
            files_only: true,
            synchronous: true,
            ..Default::default()
        });
        assert!(plan.transfer_files);
        assert!(!plan.transfer_database);
        assert_eq!(plan.execution, ExecutionMode::Synchronous);
    }

    #[test]
    fn test_both_skip_flags_skip_both() {
        let plan = MigrationPlan::from_mode(&RunMode {
            database_only: true,
            files_only: true,
            ..Default::default()
        });
        assert!(!plan.transfer_files && !plan.transfer_database);
        assert_eq!(plan.required_binaries(), vec!["ssh"]);
    }

    #[test]
    fn test_configure_only_still_requires_ssh() {
        let plan = MigrationPlan::from_mode(&RunMode {
            configure_only: true,
            staging_url_suffix: Some("staging.example.com".into()),
            wait_before_configure: true,
            ..Default::default()
        });
        assert!(plan.configure_site);
        assert!(!plan.transfer_files && !plan.transfer_database);
        assert_eq!(plan.required_binaries(), vec!["ssh"]);
    }

    #[test]
    fn test_wait_requires_configuration() {
        let plan = MigrationPlan::from_mode(&RunMode {
            wait_before_configure: true,
            ..Default::default()
        });
        assert!(!plan.wait_before_configure);
    }
}
