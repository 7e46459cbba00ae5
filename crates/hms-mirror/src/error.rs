//! Error types for the mirror library.

use thiserror::Error;

/// Exit code for configuration problems (bad YAML, missing fields, rejected rules).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code when a cluster client cannot be established.
pub const EXIT_SESSION_ERROR: u8 = 2;
/// Exit code for cluster/statement failures surfaced outside a table task.
pub const EXIT_CLUSTER_ERROR: u8 = 3;
/// Exit code for a timed out cluster call.
pub const EXIT_TIMEOUT: u8 = 4;
/// Exit code for state file errors.
pub const EXIT_STATE_ERROR: u8 = 5;
/// Exit code for a run that completed with table issues.
pub const EXIT_RUN_ISSUES: u8 = 6;
/// Exit code for filesystem errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for mirror operations.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rename or location-map rules are malformed or contradictory.
    #[error("Translation rules are ambiguous: {}", .0.join("; "))]
    TranslationAmbiguity(Vec<String>),

    /// A required collaborator could not be initialized.
    #[error("Session error for {environment}: {message}")]
    SessionFatal {
        environment: String,
        message: String,
    },

    /// A strategy step failed for a specific table.
    #[error("Step '{step}' failed for table {table}: {message}")]
    StepExecution {
        table: String,
        step: String,
        message: String,
    },

    /// A cluster call failed.
    #[error("Cluster error: {message}\n  Statement: {statement}")]
    Cluster { message: String, statement: String },

    /// A cluster call did not finish in time.
    #[error("Timed out after {seconds}s: {statement}")]
    Timeout { seconds: u64, statement: String },

    /// State file error
    #[error("State file error: {0}")]
    State(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Run cancelled")]
    Cancelled,
}

impl MirrorError {
    /// Create a StepExecution error.
    pub fn step(
        table: impl Into<String>,
        step: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MirrorError::StepExecution {
            table: table.into(),
            step: step.into(),
            message: message.into(),
        }
    }

    /// Create a Cluster error for a statement.
    pub fn cluster(message: impl Into<String>, statement: impl Into<String>) -> Self {
        MirrorError::Cluster {
            message: message.into(),
            statement: statement.into(),
        }
    }

    /// Create a SessionFatal error.
    pub fn session(environment: impl ToString, message: impl Into<String>) -> Self {
        MirrorError::SessionFatal {
            environment: environment.to_string(),
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MirrorError::Config(_) | MirrorError::TranslationAmbiguity(_) | MirrorError::Yaml(_) => {
                EXIT_CONFIG_ERROR
            }
            MirrorError::SessionFatal { .. } => EXIT_SESSION_ERROR,
            MirrorError::StepExecution { .. } | MirrorError::Cluster { .. } => EXIT_CLUSTER_ERROR,
            MirrorError::Timeout { .. } => EXIT_TIMEOUT,
            MirrorError::State(_) | MirrorError::Json(_) => EXIT_STATE_ERROR,
            MirrorError::Io(_) => EXIT_IO_ERROR,
            MirrorError::Cancelled => EXIT_RUN_ISSUES,
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

/// Result type alias for mirror operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MirrorError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            MirrorError::TranslationAmbiguity(vec!["dup".into()]).exit_code(),
            EXIT_CONFIG_ERROR
        );
        assert_eq!(MirrorError::session("LEFT", "down").exit_code(), EXIT_SESSION_ERROR);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(MirrorError::from(io).exit_code(), EXIT_IO_ERROR);
    }

    #[test]
    fn test_translation_ambiguity_message_lists_violations() {
        let err = MirrorError::TranslationAmbiguity(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Translation rules are ambiguous: a; b");
    }

    #[test]
    fn test_format_detailed_includes_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = MirrorError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: disk gone"));
    }
}
