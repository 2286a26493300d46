//! Credential and run-mode type definitions.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::{MigrateError, Result};

/// Variables every migration needs, in prompt order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    SshHost,
    SshUser,
    SourcePath,
    SourceDatabaseHost,
    SourceDatabaseUser,
    SourceDatabasePass,
    SourceDatabaseName,
    DestinationDatabaseHost,
    DestinationDatabaseUser,
    DestinationDatabasePass,
    DestinationDatabaseName,
    DestinationPath,
    DatabasePrefix,
    PrestashopVersion,
}

impl CredentialKey {
    /// All required keys, in the order they are prompted for.
    pub const REQUIRED: [CredentialKey; 14] = [
        CredentialKey::SshHost,
        CredentialKey::SshUser,
        CredentialKey::SourcePath,
        CredentialKey::SourceDatabaseHost,
        CredentialKey::SourceDatabaseUser,
        CredentialKey::SourceDatabasePass,
        CredentialKey::SourceDatabaseName,
        CredentialKey::DestinationDatabaseHost,
        CredentialKey::DestinationDatabaseUser,
        CredentialKey::DestinationDatabasePass,
        CredentialKey::DestinationDatabaseName,
        CredentialKey::DestinationPath,
        CredentialKey::DatabasePrefix,
        CredentialKey::PrestashopVersion,
    ];

    /// Variable name as stored in the configuration file.
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialKey::SshHost => "SSH_HOST",
            CredentialKey::SshUser => "SSH_USER",
            CredentialKey::SourcePath => "SOURCE_PATH",
            CredentialKey::SourceDatabaseHost => "SOURCE_DATABASE_HOST",
            CredentialKey::SourceDatabaseUser => "SOURCE_DATABASE_USER",
            CredentialKey::SourceDatabasePass => "SOURCE_DATABASE_PASS",
            CredentialKey::SourceDatabaseName => "SOURCE_DATABASE_NAME",
            CredentialKey::DestinationDatabaseHost => "DESTINATION_DATABASE_HOST",
            CredentialKey::DestinationDatabaseUser => "DESTINATION_DATABASE_USER",
            CredentialKey::DestinationDatabasePass => "DESTINATION_DATABASE_PASS",
            CredentialKey::DestinationDatabaseName => "DESTINATION_DATABASE_NAME",
            CredentialKey::DestinationPath => "DESTINATION_PATH",
            CredentialKey::DatabasePrefix => "DATABASE_PREFIX",
            CredentialKey::PrestashopVersion => "PRESTASHOP_VERSION",
        }
    }

    /// Secrets are prompted without echo and may be empty.
    pub fn is_secret(self) -> bool {
        matches!(
            self,
            CredentialKey::SourceDatabasePass | CredentialKey::DestinationDatabasePass
        )
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional destination port variable (defaults to 3306).
pub const DESTINATION_DATABASE_PORT: &str = "DESTINATION_DATABASE_PORT";

/// Optional path to a static rewrite-file template.
pub const HTACCESS_TEMPLATE: &str = "HTACCESS_TEMPLATE";

/// Raw name -> value mapping as persisted in the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    values: BTreeMap<String, String>,
}

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn contains(&self, key: CredentialKey) -> bool {
        self.values.contains_key(key.as_str())
    }

    /// Required keys absent from the set.
    pub fn missing(&self) -> Vec<CredentialKey> {
        CredentialKey::REQUIRED
            .into_iter()
            .filter(|k| !self.contains(*k))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn require(&self, key: CredentialKey) -> Result<String> {
        self.get(key.as_str())
            .map(str::to_string)
            .ok_or_else(|| MigrateError::Config(format!("{} is not set", key)))
    }
}

impl FromIterator<(String, String)> for CredentialSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Remote shell login target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub user: String,
    pub host: String,
}

impl SshTarget {
    /// `user@host` destination string.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// MySQL connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .finish()
    }
}

/// Typed view over a complete credential set.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub ssh: SshTarget,
    pub source_path: String,
    pub source: DatabaseConfig,
    pub destination: DatabaseConfig,
    pub destination_path: PathBuf,
    pub table_prefix: String,
    pub prestashop_version: String,
    pub htaccess_template: Option<PathBuf>,
}

impl TryFrom<&CredentialSet> for Credentials {
    type Error = MigrateError;

    fn try_from(set: &CredentialSet) -> Result<Self> {
        use CredentialKey::*;

        let destination_port = match set.get(DESTINATION_DATABASE_PORT) {
            Some(raw) if !raw.trim().is_empty() => raw.trim().parse::<u16>().map_err(|_| {
                MigrateError::Config(format!(
                    "{} must be a port number, got '{}'",
                    DESTINATION_DATABASE_PORT, raw
                ))
            })?,
            _ => 3306,
        };

        let credentials = Self {
            ssh: SshTarget {
                user: set.require(SshUser)?,
                host: set.require(SshHost)?,
            },
            source_path: set.require(SourcePath)?,
            source: DatabaseConfig {
                host: set.require(SourceDatabaseHost)?,
                port: 3306,
                user: set.require(SourceDatabaseUser)?,
                password: set.require(SourceDatabasePass)?,
                database: set.require(SourceDatabaseName)?,
            },
            destination: DatabaseConfig {
                host: set.require(DestinationDatabaseHost)?,
                port: destination_port,
                user: set.require(DestinationDatabaseUser)?,
                password: set.require(DestinationDatabasePass)?,
                database: set.require(DestinationDatabaseName)?,
            },
            destination_path: PathBuf::from(set.require(DestinationPath)?),
            table_prefix: set.require(DatabasePrefix)?,
            prestashop_version: set.require(PrestashopVersion)?,
            htaccess_template: set
                .get(HTACCESS_TEMPLATE)
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        };

        credentials.validate()?;
        Ok(credentials)
    }
}

/// Stage selection and behavior flags for a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunMode {
    /// Skip the file transfer.
    pub database_only: bool,

    /// Skip the database transfer.
    pub files_only: bool,

    /// Skip both transfers; only rewrite the destination configuration.
    pub configure_only: bool,

    /// Block on each job and stream its output instead of detaching.
    pub synchronous: bool,

    /// Turn off SSL enforcement on the destination shop.
    pub disable_ssl: bool,

    /// Wait for background transfers before configuring the site.
    pub wait_before_configure: bool,

    /// Domain suffix appended to migrated shop URLs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_url_suffix: Option<String>,
}

impl RunMode {
    /// Suffix with surrounding whitespace and dots removed, if any is left.
    pub fn staging_suffix(&self) -> Option<&str> {
        self.staging_url_suffix
            .as_deref()
            .map(|s| s.trim().trim_matches('.'))
            .filter(|s| !s.is_empty())
    }
}
