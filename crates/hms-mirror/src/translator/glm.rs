//! Global location map: source path prefixes mapped to target prefixes.

use super::location::{is_path_prefix, normalize_path};
use serde::{Deserialize, Serialize};

/// Table type qualifier of a location-map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableType {
    /// Matches any table.
    #[default]
    Any,
    /// Managed (warehouse-owned) tables, ACID included.
    Managed,
    /// External tables.
    External,
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableType::Any => write!(f, "ANY"),
            TableType::Managed => write!(f, "MANAGED"),
            TableType::External => write!(f, "EXTERNAL"),
        }
    }
}

/// One location-map rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlmEntry {
    /// Namespace-relative source prefix, e.g. `/tpcds_base_dir`.
    pub source: String,

    /// Namespace-relative target prefix.
    pub target: String,

    /// Table type this rule applies to.
    #[serde(default)]
    pub table_type: TableType,

    /// Restrict the rule to one source database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Tables whose directory the target already names. For these the
    /// substituted path is used as-is.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<String>,
}

impl GlmEntry {
    pub fn new(source: impl Into<String>, target: impl Into<String>, table_type: TableType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            table_type,
            database: None,
            tables: Vec::new(),
        }
    }

    /// Scope the entry to a database.
    pub fn for_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Enumerate a table owned by this entry.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.tables.push(table.into());
        self
    }

    pub(crate) fn source_path(&self) -> String {
        normalize_path(&self.source)
    }

    pub(crate) fn target_path(&self) -> String {
        normalize_path(&self.target)
    }

    pub(crate) fn enumerates(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t.eq_ignore_ascii_case(table))
    }

    fn applies_to(&self, database: &str, table_type: TableType) -> bool {
        let db_ok = self
            .database
            .as_deref()
            .map(|d| d.eq_ignore_ascii_case(database))
            .unwrap_or(true);
        let type_ok = self.table_type == TableType::Any || self.table_type == table_type;
        db_ok && type_ok
    }
}

/// A matched entry and the length of the matched source prefix.
#[derive(Debug)]
pub struct GlmMatch<'a> {
    pub entry: &'a GlmEntry,
    pub prefix: String,
}

/// Ordered location map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalLocationMap {
    entries: Vec<GlmEntry>,
}

impl GlobalLocationMap {
    pub fn new(entries: Vec<GlmEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[GlmEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, entry: GlmEntry) {
        self.entries.push(entry);
    }

    /// Most specific entry matching a namespace-relative path.
    ///
    /// Longest prefix wins; ties go to a type-qualified entry over `ANY`,
    /// then to a database-scoped entry over a global one, then to the
    /// earliest entry.
    pub fn best_match(&self, database: &str, table_type: TableType, path: &str) -> Option<GlmMatch<'_>> {
        let mut best: Option<(&GlmEntry, String, (usize, bool, bool))> = None;

        for entry in &self.entries {
            if !entry.applies_to(database, table_type) {
                continue;
            }
            let prefix = entry.source_path();
            let candidate = if prefix == "/" { String::new() } else { prefix };
            if !is_path_prefix(&candidate, path) {
                continue;
            }
            let rank = (
                candidate.len(),
                entry.table_type != TableType::Any,
                entry.database.is_some(),
            );
            let better = match &best {
                Some((_, _, current)) => rank > *current,
                None => true,
            };
            if better {
                best = Some((entry, candidate, rank));
            }
        }

        best.map(|(entry, prefix, _)| GlmMatch { entry, prefix })
    }
}
