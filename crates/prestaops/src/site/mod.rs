//! Post-transfer configuration of the destination shop.
//!
//! Rewrites every shop URL under the staging suffix, optionally turns SSL
//! enforcement off and regenerates the rewrite file. A failing record is
//! logged and skipped; earlier updates are not rolled back.

pub mod domain;
pub mod rewrite;
pub mod store;

pub use domain::{already_suffixed, staging_domain, ShopDomainRecord};
pub use rewrite::{
    default_generators, NativeHtaccessGenerator, RewriteFileGenerator, TemplateHtaccessGenerator,
};
pub use store::{MysqlShopUrlStore, ShopUrlStore, SSL_OFF_SETTINGS};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{Credentials, RunMode};
use crate::error::Result;

/// What happened to one shop URL record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Updated,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
    pub id: u32,
    pub previous_domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_domain: Option<String>,
    pub status: RecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a configuration pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SiteReport {
    pub records: Vec<RecordOutcome>,
    pub ssl_disabled: bool,
    /// Generator that produced the rewrite file, if any did.
    pub rewrite_generator: Option<String>,
}

impl SiteReport {
    pub fn count(&self, status: RecordStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }
}

/// Applies the staging suffix to the destination shop.
pub struct SiteConfigurator {
    suffix: String,
    disable_ssl: bool,
    generators: Vec<Box<dyn RewriteFileGenerator>>,
}

impl SiteConfigurator {
    pub fn new(suffix: impl Into<String>, disable_ssl: bool) -> Self {
        Self {
            suffix: suffix.into(),
            disable_ssl,
            generators: Vec::new(),
        }
    }

    /// Configurator for `mode`, or `None` when no staging suffix is set.
    pub fn from_run(mode: &RunMode, credentials: &Credentials) -> Option<Self> {
        let suffix = mode.staging_suffix()?;
        Some(
            Self::new(suffix, mode.disable_ssl).with_generators(default_generators(
                &credentials.destination_path,
                credentials.htaccess_template.clone(),
            )),
        )
    }

    pub fn with_generators(mut self, generators: Vec<Box<dyn RewriteFileGenerator>>) -> Self {
        self.generators = generators;
        self
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Rewrite all records in `store`, then regenerate the rewrite file.
    ///
    /// Only a failure to read the records is returned as an error.
    pub async fn apply(&self, store: &mut dyn ShopUrlStore) -> Result<SiteReport> {
        info!("Configuring shop URLs with staging suffix {}", self.suffix);
        let records = store.fetch_shop_urls().await?;
        let mut report = SiteReport::default();

        for record in records {
            // SSL flags are global; they are re-applied for every record.
            if self.disable_ssl {
                match store.disable_ssl().await {
                    Ok(()) => report.ssl_disabled = true,
                    Err(e) => warn!("Could not disable SSL (shop URL {}): {}", record.id, e),
                }
            }

            let Some(staged) = record.with_staging_suffix(&self.suffix) else {
                if already_suffixed(&record.domain, &self.suffix) {
                    info!(
                        "Shop URL {} already uses {} ({}), skipping",
                        record.id, self.suffix, record.domain
                    );
                } else {
                    warn!(
                        "Shop URL {} has no domain label to rewrite ({:?}), skipping",
                        record.id, record.domain
                    );
                }
                report.records.push(RecordOutcome {
                    id: record.id,
                    previous_domain: record.domain,
                    new_domain: None,
                    status: RecordStatus::Skipped,
                    error: None,
                });
                continue;
            };

            let outcome = match store.update_shop_url(&staged).await {
                Ok(()) => {
                    info!("Shop URL {}: {} -> {}", record.id, record.domain, staged.domain);
                    RecordOutcome {
                        id: record.id,
                        previous_domain: record.domain,
                        new_domain: Some(staged.domain),
                        status: RecordStatus::Updated,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!("Failed to update shop URL {} ({}): {}", record.id, record.domain, e);
                    RecordOutcome {
                        id: record.id,
                        previous_domain: record.domain,
                        new_domain: Some(staged.domain),
                        status: RecordStatus::Failed,
                        error: Some(e.to_string()),
                    }
                }
            };
            report.records.push(outcome);
        }

        report.rewrite_generator = rewrite::regenerate(&self.generators)
            .await
            .map(str::to_string);

        info!(
            "Site configuration done: {} updated, {} skipped, {} failed",
            report.count(RecordStatus::Updated),
            report.count(RecordStatus::Skipped),
            report.count(RecordStatus::Failed)
        );
        Ok(report)
    }
}
