//! Credential store: loading, prompting for and persisting migration variables.
//!
//! Variables live in a plain-text file with one `KEY="value"` line per entry.
//! The file is a cache of operator answers and is rewritten in full whenever a
//! prompt fills a gap.

mod types;
mod validation;

pub use types::*;
pub use validation::{validate_run_mode, validate_staging_suffix, validate_table_prefix};

use crate::error::{MigrateError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default configuration file name, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".prestaops";

/// Attempts allowed per missing variable before giving up.
pub const MAX_PROMPT_ATTEMPTS: usize = 3;

/// Source of operator answers for missing variables.
pub trait Prompt {
    /// Ask the operator for a value of `key`.
    fn ask(&self, key: CredentialKey) -> Result<String>;
}

impl Credentials {
    /// Validate the credentials.
    pub fn validate(&self) -> Result<()> {
        validation::validate_credentials(self)
    }
}

impl RunMode {
    /// Validate the run mode.
    pub fn validate(&self) -> Result<()> {
        validation::validate_run_mode(self)
    }
}

/// File-backed credential store.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted set, or an empty set when the file does not exist.
    pub fn load(&self) -> Result<CredentialSet> {
        if !self.path.exists() {
            debug!("No configuration file at {:?}", self.path);
            return Ok(CredentialSet::new());
        }

        info!("Loading migration variables from {:?}", self.path);
        let content = std::fs::read_to_string(&self.path)?;
        Ok(parse(&content))
    }

    /// Rewrite the whole file from `set` (atomic write, owner-only permissions).
    pub fn save(&self, set: &CredentialSet) -> Result<()> {
        let content = render(set);
        let temp_path = self.path.with_extension("tmp");

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&temp_path, &self.path)?;

        debug!("Wrote {} variables to {:?}", set.len(), self.path);
        Ok(())
    }

    /// Load the set and prompt for every missing required variable.
    ///
    /// Each answer is persisted immediately, so an interrupted session keeps
    /// what was already entered.
    pub fn ensure_loaded(&self, prompt: &dyn Prompt) -> Result<CredentialSet> {
        info!("Checking migration variables...");
        let mut set = self.load()?;

        for key in set.missing() {
            info!("{} is not set.", key);
            let value = ask_until_valid(prompt, key)?;
            set.set(key.as_str(), value);
            self.save(&set)?;
        }

        Ok(set)
    }

    /// Replace a single variable and rewrite the file.
    pub fn update(&self, set: &mut CredentialSet, key: CredentialKey, value: String) -> Result<()> {
        set.set(key.as_str(), value);
        self.save(set)
    }
}

/// Prompt for `key` until a usable answer arrives or attempts run out.
pub fn ask_until_valid(prompt: &dyn Prompt, key: CredentialKey) -> Result<String> {
    for attempt in 1..=MAX_PROMPT_ATTEMPTS {
        let answer = prompt.ask(key)?;
        if key.is_secret() {
            return Ok(answer);
        }

        let answer = answer.trim().to_string();
        if !answer.is_empty() {
            return Ok(answer);
        }

        warn!(
            "{} cannot be empty (attempt {}/{})",
            key, attempt, MAX_PROMPT_ATTEMPTS
        );
    }

    Err(MigrateError::Config(format!(
        "{} is required but no value was entered after {} attempts",
        key, MAX_PROMPT_ATTEMPTS
    )))
}

/// Parse `KEY="value"` lines. Blank lines and `#` comments are ignored.
pub fn parse(content: &str) -> CredentialSet {
    let mut set = CredentialSet::new();

    for (line_no, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            warn!("Ignoring malformed configuration line {}", line_no + 1);
            continue;
        };

        set.set(key.trim(), unquote(value.trim()));
    }

    set
}

/// Render the set as `KEY="value"` lines. Values are written verbatim.
pub fn render(set: &CredentialSet) -> String {
    set.iter()
        .map(|(key, value)| format!("{}=\"{}\"\n", key, value))
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
