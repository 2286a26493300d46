//! Local module audit of a PrestaShop installation.
//!
//! Reads each module's main class file as text and records its declared
//! name, version, author and marketplace key in a `;`-delimited report.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{MigrateError, Result};

/// Default report file name.
pub const DEFAULT_REPORT_FILE: &str = "module-check.csv";

/// Properties read from a module's constructor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    /// Directory name under `modules/`.
    pub directory: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    pub module_key: Option<String>,
}

impl ModuleInfo {
    /// Report line: `dir;author;key;version;;;`. The two trailing columns
    /// (marketplace page, latest release) are left empty by the local audit.
    pub fn csv_line(&self) -> String {
        format!(
            "{};{};{};{};;;\n",
            self.directory,
            self.author.as_deref().unwrap_or_default(),
            self.module_key.as_deref().unwrap_or_default(),
            self.version.as_deref().unwrap_or_default()
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    pub modules: Vec<ModuleInfo>,
    /// Module directories without a main class file.
    pub skipped: Vec<String>,
    pub output: PathBuf,
}

/// Audit the installation at `root` and write the report to `output`.
pub fn run_audit(root: &Path, output: &Path) -> Result<AuditReport> {
    let parameters = root.join("app").join("config").join("parameters.php");
    if !parameters.exists() {
        return Err(MigrateError::Config(format!(
            "not in a PrestaShop root: {} not found",
            parameters.display()
        )));
    }
    if !fs::read_to_string(&parameters)?.contains("database_host") {
        return Err(MigrateError::Config(
            "PrestaShop was found but app/config/parameters.php has no database parameters"
                .into(),
        ));
    }

    let modules_dir = root.join("modules");
    if !modules_dir.is_dir() {
        return Err(MigrateError::Config(format!(
            "modules directory not found in {}",
            root.display()
        )));
    }

    info!("Scanning modules...");
    let mut directories: Vec<PathBuf> = fs::read_dir(&modules_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    directories.sort();

    let mut report = AuditReport {
        output: output.to_path_buf(),
        ..Default::default()
    };
    for dir in directories {
        match read_module(&dir)? {
            Some(module) => {
                info!(
                    "Checking module: {}",
                    module.name.as_deref().unwrap_or(&module.directory)
                );
                report.modules.push(module);
            }
            None => {
                let name = dir_name(&dir);
                warn!("Skipping module {} - main file not found.", name);
                report.skipped.push(name);
            }
        }
    }

    let content: String = report.modules.iter().map(ModuleInfo::csv_line).collect();
    fs::write(output, content)?;

    info!(
        "Audit completed: {} modules written to {}",
        report.modules.len(),
        output.display()
    );
    Ok(report)
}

/// Read `modules/<dir>/<dir>.php`; `None` when it does not exist.
pub fn read_module(dir: &Path) -> Result<Option<ModuleInfo>> {
    let directory = dir_name(dir);
    let main_file = dir.join(format!("{}.php", directory));
    if !main_file.is_file() {
        return Ok(None);
    }

    let bytes = fs::read(&main_file)?;
    let source = String::from_utf8_lossy(&bytes);

    Ok(Some(ModuleInfo {
        name: property_value(&source, "name"),
        version: property_value(&source, "version"),
        author: property_value(&source, "author"),
        module_key: property_value(&source, "module_key"),
        directory,
    }))
}

/// Constructor assignments of the audited properties. Empty literals do
/// not match.
fn property_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\$this->(name|version|author|module_key)\s*=\s*['"]([^'"]+)['"]"#)
            .expect("valid module property pattern")
    })
}

/// First non-empty string literal assigned to `$this->{property}` in `source`.
fn property_value(source: &str, property: &str) -> Option<String> {
    property_pattern()
        .captures_iter(source)
        .find(|caps| &caps[1] == property)
        .map(|caps| caps[2].to_string())
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
