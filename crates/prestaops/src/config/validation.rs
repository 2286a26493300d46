//! Configuration validation.

use super::{Credentials, RunMode};
use crate::error::{MigrateError, Result};

/// Validate a run mode before any network or process operation.
pub fn validate_run_mode(mode: &RunMode) -> Result<()> {
    if mode.configure_only && mode.staging_suffix().is_none() {
        return Err(MigrateError::Config(
            "--configure-only requires --staging-url-suffix".into(),
        ));
    }

    if let Some(suffix) = mode.staging_suffix() {
        validate_staging_suffix(suffix)?;
    }

    Ok(())
}

/// Validate the staging suffix as a domain name.
pub fn validate_staging_suffix(suffix: &str) -> Result<()> {
    if suffix.len() > 253 {
        return Err(MigrateError::Config(format!(
            "staging suffix '{}' is longer than 253 characters",
            suffix
        )));
    }

    for label in suffix.split('.') {
        if label.is_empty() {
            return Err(MigrateError::Config(format!(
                "staging suffix '{}' contains an empty label",
                suffix
            )));
        }
        if label.len() > 63 {
            return Err(MigrateError::Config(format!(
                "staging suffix label '{}' is longer than 63 characters",
                label
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(MigrateError::Config(format!(
                "staging suffix label '{}' cannot start or end with '-'",
                label
            )));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(MigrateError::Config(format!(
                "staging suffix '{}' contains invalid characters",
                suffix
            )));
        }
    }

    Ok(())
}

/// Validate that the table prefix is safe to splice into SQL identifiers.
pub fn validate_table_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(MigrateError::Config("DATABASE_PREFIX is required".into()));
    }
    if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(MigrateError::Config(format!(
            "DATABASE_PREFIX must contain only letters, digits and '_', got '{}'",
            prefix
        )));
    }
    Ok(())
}

/// Validate the typed credentials.
pub fn validate_credentials(credentials: &Credentials) -> Result<()> {
    if credentials.ssh.host.trim().is_empty() {
        return Err(MigrateError::Config("SSH_HOST is required".into()));
    }
    if credentials.ssh.user.trim().is_empty() {
        return Err(MigrateError::Config("SSH_USER is required".into()));
    }
    if credentials.source.host.trim().is_empty() {
        return Err(MigrateError::Config("SOURCE_DATABASE_HOST is required".into()));
    }
    if credentials.destination.host.trim().is_empty() {
        return Err(MigrateError::Config(
            "DESTINATION_DATABASE_HOST is required".into(),
        ));
    }
    if credentials.destination_path.as_os_str().is_empty() {
        return Err(MigrateError::Config("DESTINATION_PATH is required".into()));
    }

    validate_table_prefix(&credentials.table_prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, SshTarget};
    use std::path::PathBuf;

    fn valid_credentials() -> Credentials {
        Credentials {
            ssh: SshTarget {
                user: "deploy".to_string(),
                host: "shop.example.com".to_string(),
            },
            source_path: "/var/www/shop".to_string(),
            source: DatabaseConfig {
                host: "localhost".to_string(),
                port: 3306,
                user: "shop".to_string(),
                password: "source_secret".to_string(),
                database: "shop".to_string(),
            },
            destination: DatabaseConfig {
                host: "127.0.0.1".to_string(),
                port: 3306,
                user: "root".to_string(),
                password: "destination_secret".to_string(),
                database: "shop_staging".to_string(),
            },
            destination_path: PathBuf::from("/srv/shop"),
            table_prefix: "ps_".to_string(),
            prestashop_version: "8.1.7".to_string(),
            htaccess_template: None,
        }
    }

    #[test]
    fn test_valid_credentials() {
        assert!(validate_credentials(&valid_credentials()).is_ok());
    }

    #[test]
    fn test_blank_ssh_host_rejected() {
        let mut credentials = valid_credentials();
        credentials.ssh.host = "  ".to_string();
        assert!(validate_credentials(&credentials).is_err());
    }

    #[test]
    fn test_prefix_with_sql_characters_rejected() {
        let mut credentials = valid_credentials();
        credentials.table_prefix = "ps`; DROP".to_string();
        assert!(validate_credentials(&credentials).is_err());
    }

    #[test]
    fn test_configure_only_requires_suffix() {
        let mode = RunMode {
            configure_only: true,
            ..Default::default()
        };
        let err = validate_run_mode(&mode).unwrap_err();
        assert_eq!(err.exit_code(), 1);

        let blank = RunMode {
            configure_only: true,
            staging_url_suffix: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(validate_run_mode(&blank).is_err());
    }

    #[test]
    fn test_configure_only_with_suffix_accepted() {
        let mode = RunMode {
            configure_only: true,
            staging_url_suffix: Some("local.test".to_string()),
            ..Default::default()
        };
        assert!(validate_run_mode(&mode).is_ok());
    }

    #[test]
    fn test_staging_suffix_syntax() {
        assert!(validate_staging_suffix("staging.example.com").is_ok());
        assert!(validate_staging_suffix("localhost").is_ok());
        assert!(validate_staging_suffix("my-shop.test").is_ok());
        assert!(validate_staging_suffix("bad..label").is_err());
        assert!(validate_staging_suffix("-leading.test").is_err());
        assert!(validate_staging_suffix("under_score.test").is_err());
        assert!(validate_staging_suffix("space here.test").is_err());
    }

    #[test]
    fn test_both_skip_flags_accepted() {
        let mode = RunMode {
            database_only: true,
            files_only: true,
            ..Default::default()
        };
        assert!(validate_run_mode(&mode).is_ok());
    }

    #[test]
    fn test_database_config_debug_redacts_password() {
        let credentials = valid_credentials();
        let debug_output = format!("{:?}", credentials.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("source_secret"),
            "Debug output should not contain actual password value"
        );
    }
}
