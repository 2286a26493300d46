//! Error types for the operations library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (missing variable, invalid suffix, invalid run mode)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Interactive prompt failed or was exhausted
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Remote shell or database probe failed
    #[error("Connectivity check failed for {target}: {message}")]
    Connectivity { target: String, message: String },

    /// A background or synchronous job could not be started
    #[error("Failed to start {job}: {message}")]
    Launch { job: String, message: String },

    /// A job ran but did not finish successfully
    #[error("{job} failed: {message}")]
    Transfer { job: String, message: String },

    /// Destination database error
    #[error("Destination database error: {0}")]
    Database(#[from] mysql_async::Error),

    /// IO error (file operations, process spawning)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was interrupted (SIGINT, SIGTERM)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Connectivity error
    pub fn connectivity(target: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Connectivity {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a Launch error
    pub fn launch(job: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Launch {
            job: job.into(),
            message: message.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(job: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            job: job.into(),
            message: message.into(),
        }
    }

    /// Process exit status for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Prompt(_) | MigrateError::Json(_) => 1,
            MigrateError::Connectivity { .. } => 2,
            MigrateError::Launch { .. } => 3,
            MigrateError::Transfer { .. } => 4,
            MigrateError::Database(_) => 5,
            MigrateError::Io(_) => 7,
            MigrateError::Cancelled => 130,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
