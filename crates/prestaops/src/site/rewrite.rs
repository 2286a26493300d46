//! Web server rewrite file (`.htaccess`) regeneration.
//!
//! Generators are tried in order until one succeeds: the destination
//! installation's own generator first, then a static template.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};

/// Template shipped with the binary.
pub const BUNDLED_TEMPLATE: &str = include_str!("htaccess.dist");

/// PHP run inside the shop root to call the platform's generator.
const NATIVE_SCRIPT: &str = "define('_PS_ADMIN_DIR_', getcwd()); \
    require 'config/config.inc.php'; \
    exit(Tools::generateHtaccess() ? 0 : 1);";

/// A way to (re)create the rewrite file.
#[async_trait]
pub trait RewriteFileGenerator: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    async fn generate(&self) -> Result<()>;
}

/// Calls `Tools::generateHtaccess()` of the installation with the local `php`.
#[derive(Debug, Clone)]
pub struct NativeHtaccessGenerator {
    root: PathBuf,
}

impl NativeHtaccessGenerator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl RewriteFileGenerator for NativeHtaccessGenerator {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn generate(&self) -> Result<()> {
        let bootstrap = self.root.join("config").join("config.inc.php");
        if !bootstrap.exists() {
            return Err(MigrateError::Config(format!(
                "{} not found; not a PrestaShop installation",
                bootstrap.display()
            )));
        }

        let output = Command::new("php")
            .arg("-r")
            .arg(NATIVE_SCRIPT)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!("php stdout: {}", String::from_utf8_lossy(&output.stdout).trim());
            Err(MigrateError::transfer(
                "rewrite file generation",
                format!("php exited with {}: {}", output.status, stderr),
            ))
        }
    }
}

/// Writes a static template to `{root}/.htaccess`.
#[derive(Debug, Clone)]
pub struct TemplateHtaccessGenerator {
    root: PathBuf,
    template: Option<PathBuf>,
}

impl TemplateHtaccessGenerator {
    /// `template` overrides the bundled template.
    pub fn new(root: impl Into<PathBuf>, template: Option<PathBuf>) -> Self {
        Self {
            root: root.into(),
            template,
        }
    }

    pub fn target(&self) -> PathBuf {
        self.root.join(".htaccess")
    }
}

#[async_trait]
impl RewriteFileGenerator for TemplateHtaccessGenerator {
    fn name(&self) -> &'static str {
        "template"
    }

    async fn generate(&self) -> Result<()> {
        let content = match &self.template {
            Some(path) => tokio::fs::read_to_string(path).await?,
            None => BUNDLED_TEMPLATE.to_string(),
        };
        tokio::fs::write(self.target(), content).await?;
        Ok(())
    }
}

/// Default generator chain for a shop rooted at `root`.
pub fn default_generators(
    root: &Path,
    template: Option<PathBuf>,
) -> Vec<Box<dyn RewriteFileGenerator>> {
    vec![
        Box::new(NativeHtaccessGenerator::new(root)),
        Box::new(TemplateHtaccessGenerator::new(root, template)),
    ]
}

/// Try each generator in order; returns the name of the one that succeeded.
pub async fn regenerate(generators: &[Box<dyn RewriteFileGenerator>]) -> Option<&'static str> {
    for generator in generators {
        match generator.generate().await {
            Ok(()) => {
                info!("Rewrite file generated ({})", generator.name());
                return Some(generator.name());
            }
            Err(e) => warn!("Rewrite file generation ({}) failed: {}", generator.name(), e),
        }
    }

    warn!("Could not regenerate the rewrite file; regenerate it from the back office");
    None
}
