//! File-based run state.
//!
//! The final [`Conversion`] of a run is written as signed JSON so a later
//! `show-state` (or an operator) can inspect exactly what was planned and
//! executed for every table.

use crate::error::{MirrorError, Result};
use crate::model::Conversion;
use crate::outcome::OutcomeCode;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

/// Persisted record of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Unique run identifier.
    pub run_id: String,

    /// SHA256 hash of the configuration.
    pub config_hash: String,

    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    pub status: RunStatus,

    /// Union of every issue category raised in the run.
    #[serde(default)]
    pub outcome: OutcomeCode,

    #[serde(default)]
    pub conversion: Conversion,

    /// HMAC-SHA256 signature for integrity validation.
    /// Computed over serialized state (excluding this field) using config_hash as key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithIssues,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithIssues => "completed_with_issues",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

impl RunState {
    pub fn new(run_id: String, config_hash: String) -> Self {
        Self {
            run_id,
            config_hash,
            started_at: Utc::now(),
            completed_at: None,
            status: RunStatus::Running,
            outcome: OutcomeCode::CLEAN,
            conversion: Conversion::new(),
            hmac: None,
        }
    }

    /// Record the final conversion and status.
    pub fn finish(&mut self, conversion: Conversion, status: RunStatus) {
        self.outcome = conversion.outcome();
        self.conversion = conversion;
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// HMAC-SHA256 over the state without its signature, keyed on the
    /// config hash.
    fn compute_hmac(&self) -> Result<String> {
        let mut unsigned = self.clone();
        unsigned.hmac = None;

        let content = serde_json::to_string(&unsigned)
            .map_err(|e| MirrorError::State(format!("Failed to serialize state for HMAC: {}", e)))?;

        let mut mac = HmacSha256::new_from_slice(self.config_hash.as_bytes())
            .map_err(|e| MirrorError::State(format!("Failed to create HMAC: {}", e)))?;

        mac.update(content.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Load state from a file, rejecting tampered content.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&content)?;

        match &state.hmac {
            Some(stored) => {
                if stored != &state.compute_hmac()? {
                    return Err(MirrorError::State(
                        "State file integrity check failed: HMAC mismatch (possible tampering)".to_string(),
                    ));
                }
            }
            None => {
                tracing::warn!("State file has no HMAC signature, integrity cannot be verified");
            }
        }

        Ok(state)
    }

    /// Save state to a file (atomic write with HMAC).
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();

        self.hmac = Some(self.compute_hmac()?);

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| MirrorError::State(format!("Failed to serialize state: {}", e)))?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Environment, Pair};
    use crate::outcome::IssueCode;
    use tempfile::NamedTempFile;

    fn conversion() -> Conversion {
        let mut conversion = Conversion::new();
        let db = conversion.add_database("sales");
        let table = db.add_table("orders");
        table
            .env_mut(Environment::Right)
            .add_sql(Pair::new("Creating Table", "CREATE EXTERNAL TABLE ..."));
        db.add_table("returns")
            .add_issue(Environment::Left, IssueCode::StepFailed, "boom");
        conversion
    }

    #[test]
    fn test_state_save_load() {
        let mut state = RunState::new("test-run".into(), "abc123".into());
        state.finish(conversion(), RunStatus::CompletedWithIssues);

        let file = NamedTempFile::new().unwrap();
        state.save(file.path()).unwrap();

        let loaded = RunState::load(file.path()).unwrap();
        assert_eq!(loaded.run_id, "test-run");
        assert_eq!(loaded.status, RunStatus::CompletedWithIssues);
        assert!(loaded.outcome.contains(IssueCode::StepFailed));
        assert_eq!(loaded.conversion, state.conversion);
    }

    #[test]
    fn test_tampering_detected() {
        let mut state = RunState::new("test-run".into(), "abc123".into());
        state.finish(conversion(), RunStatus::Completed);

        let file = NamedTempFile::new().unwrap();
        state.save(file.path()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        std::fs::write(file.path(), content.replace("\"completed\"", "\"failed\"")).unwrap();

        let err = RunState::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("HMAC mismatch"));
    }

    #[test]
    fn test_unsigned_state_accepted() {
        let state = RunState::new("old".into(), "hash".into());
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), serde_json::to_string(&state).unwrap()).unwrap();

        assert_eq!(RunState::load(file.path()).unwrap().run_id, "old");
    }

    #[test]
    fn test_state_file_is_pretty_json() {
        let mut state = RunState::new("test".into(), "hash".into());
        let file = NamedTempFile::new().unwrap();
        state.save(file.path()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.contains('\n'));
        assert!(content.contains("\"run_id\""));
        assert!(!content.starts_with("---"));
    }
}
