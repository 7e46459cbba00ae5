//! In-memory model of the databases and tables being mirrored.

mod phase;

pub use phase::PhaseState;

use crate::ddl::TableDefinition;
use crate::outcome::{IssueCode, OutcomeCode};
use crate::strategy::DataStrategy;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Cluster or staging environment a table lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Environment {
    Left,
    Right,
    Transfer,
    Shadow,
}

impl Environment {
    /// Physical cluster side a staging environment runs on.
    pub fn cluster(self) -> Environment {
        match self {
            Environment::Left | Environment::Transfer => Environment::Left,
            Environment::Right | Environment::Shadow => Environment::Right,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Left => "LEFT",
            Environment::Right => "RIGHT",
            Environment::Transfer => "TRANSFER",
            Environment::Shadow => "SHADOW",
        };
        f.write_str(name)
    }
}

/// Audit record of one planned or executed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    pub description: String,
    pub action: String,
}

impl Pair {
    pub fn new(description: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            action: action.into(),
        }
    }
}

/// Storage statistics of a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_file_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

/// One table as seen in one environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentTable {
    #[serde(default)]
    pub name: String,

    /// Whether the table was found in this environment.
    #[serde(default)]
    pub exists: bool,

    /// `CREATE TABLE` lines.
    #[serde(default)]
    pub definition: Vec<String>,

    /// Partition spec to storage location.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub partitions: BTreeMap<String, String>,

    #[serde(default)]
    pub statistics: Statistics,

    /// Planned or executed actions, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sql: Vec<Pair>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

impl EnvironmentTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Typed view of the definition.
    pub fn parsed(&self) -> TableDefinition {
        TableDefinition::parse(&self.definition)
    }

    pub fn add_sql(&mut self, pair: Pair) {
        self.sql.push(pair);
    }

    pub fn add_issue(&mut self, issue: impl Into<String>) {
        self.issues.push(issue.into());
    }
}

/// A logical table across environments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMirror {
    pub name: String,

    #[serde(default)]
    pub environments: BTreeMap<Environment, EnvironmentTable>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<DataStrategy>,

    #[serde(default)]
    pub phase: PhaseState,

    #[serde(default)]
    pub removed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_reason: Option<String>,

    /// Issue categories raised by this table.
    #[serde(default)]
    pub outcome: OutcomeCode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TableMirror {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn env(&self, environment: Environment) -> Option<&EnvironmentTable> {
        self.environments.get(&environment)
    }

    /// Environment entry, created on first use.
    pub fn env_mut(&mut self, environment: Environment) -> &mut EnvironmentTable {
        let name = self.name.clone();
        self.environments
            .entry(environment)
            .or_insert_with(|| EnvironmentTable::new(name))
    }

    /// Record an issue against an environment and raise its category.
    pub fn add_issue(&mut self, environment: Environment, code: IssueCode, issue: impl Into<String>) {
        self.env_mut(environment).add_issue(issue);
        self.outcome.insert(code);
    }

    /// Exclude the table from execution.
    pub fn mark_removed(&mut self, reason: impl Into<String>) {
        self.removed = true;
        self.remove_reason = Some(reason.into());
    }

    /// Move to `Error` unless already terminal.
    pub fn mark_error(&mut self) {
        if self.phase.advance(PhaseState::Error) {
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn mark_success(&mut self) {
        if self.phase.advance(PhaseState::Success) {
            self.completed_at = Some(Utc::now());
        }
    }

    /// All issue strings across environments.
    pub fn issues(&self) -> Vec<String> {
        self.environments
            .iter()
            .flat_map(|(env, t)| t.issues.iter().map(move |i| format!("{env}: {i}")))
            .collect()
    }
}

/// One database and its tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DBMirror {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_location: Option<String>,

    /// When the target database was confirmed to exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sql: Vec<Pair>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,

    #[serde(default)]
    pub outcome: OutcomeCode,

    #[serde(default)]
    pub tables: IndexMap<String, TableMirror>,
}

impl DBMirror {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Register a table; an existing registration is returned unchanged.
    pub fn add_table(&mut self, name: &str) -> &mut TableMirror {
        self.tables
            .entry(name.to_string())
            .or_insert_with(|| TableMirror::new(name))
    }

    pub fn table(&self, name: &str) -> Option<&TableMirror> {
        self.tables.get(name)
    }

    pub fn add_issue(&mut self, code: IssueCode, issue: impl Into<String>) {
        self.issues.push(issue.into());
        self.outcome.insert(code);
    }

    /// Union of database and table issue categories.
    pub fn outcome(&self) -> OutcomeCode {
        self.tables
            .values()
            .fold(self.outcome, |acc, t| acc | t.outcome)
    }
}

/// Every database of a run, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    #[serde(default)]
    pub databases: IndexMap<String, DBMirror>,
}

impl Conversion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a database; an existing registration is returned unchanged.
    pub fn add_database(&mut self, name: &str) -> &mut DBMirror {
        self.databases
            .entry(name.to_string())
            .or_insert_with(|| DBMirror::new(name))
    }

    pub fn database(&self, name: &str) -> Option<&DBMirror> {
        self.databases.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&DBMirror, &TableMirror)> {
        self.databases
            .values()
            .flat_map(|db| db.tables.values().map(move |t| (db, t)))
    }

    /// Aggregate outcome across every database and table.
    pub fn outcome(&self) -> OutcomeCode {
        self.databases
            .values()
            .fold(OutcomeCode::CLEAN, |acc, db| acc | db.outcome())
    }
}
