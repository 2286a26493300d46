//! # prestaops
//!
//! Migration orchestration for PrestaShop installations.
//!
//! This library moves a shop from a remote server to a local staging copy:
//!
//! - **File transfer** with rsync over ssh, excluding caches and credentials
//! - **Database transfer** streamed from a remote `mysqldump` into the local server
//! - **Background jobs** tracked by PID with their exit status captured
//! - **Site configuration** rewriting shop URLs under a staging domain
//! - **Credential store** prompting for and persisting migration variables
//!
//! ## Example
//!
//! ```rust,no_run
//! use prestaops::{CredentialKey, CredentialStore, Orchestrator, Prompt, RunMode};
//! use tokio_util::sync::CancellationToken;
//!
//! struct NoPrompt;
//!
//! impl Prompt for NoPrompt {
//!     fn ask(&self, key: CredentialKey) -> prestaops::Result<String> {
//!         Err(prestaops::MigrateError::Prompt(format!("{} is missing", key)))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> prestaops::Result<()> {
//!     let mode = RunMode {
//!         staging_url_suffix: Some("staging.example.com".into()),
//!         ..Default::default()
//!     };
//!     let orchestrator = Orchestrator::new(CredentialStore::new(".prestaops"), Box::new(NoPrompt), mode)?;
//!     let result = orchestrator.run(CancellationToken::new()).await?;
//!     println!("{}", result.status);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod monitor;
pub mod orchestrator;
pub mod remote;
pub mod site;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use config::{CredentialKey, CredentialSet, CredentialStore, Credentials, Prompt, RunMode};
pub use error::{MigrateError, Result};
pub use monitor::CompletionMonitor;
pub use orchestrator::{MigrationContext, MigrationPlan, MigrationResult, Orchestrator, SourceCheck};
pub use remote::{is_process_alive, RemoteShell};
pub use site::{SiteConfigurator, SiteReport};
pub use transfer::{DatabaseTransferJob, FileTransferJob, JobKind, JobResult};
