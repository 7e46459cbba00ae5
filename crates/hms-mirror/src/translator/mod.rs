//! Location translation.
//!
//! The [`Translator`] computes target database names, table names and
//! storage locations. It is a pure function of its inputs and its
//! [`TranslatorConfig`]: the same inputs always produce the same outputs,
//! which is what makes re-runs idempotent and lets a run recognise schemas
//! it already created.

mod distcp;
mod glm;
pub mod location;

pub use distcp::{DistcpPlan, DistcpPlanner};
pub use glm::{GlmEntry, GlmMatch, GlobalLocationMap, TableType};

use location::{is_path_prefix, join_namespace, last_directory, normalize_path, reduce_url_by, strip_namespace, with_last_segment};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Rules driving name and location translation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatorConfig {
    /// Prefix prepended to every database name without an exact rename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_prefix: Option<String>,

    /// Exact database renames, source name to target name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub database_rename: BTreeMap<String, String>,

    /// Per-table renames keyed by source database, then source table.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub table_rename: BTreeMap<String, BTreeMap<String, String>>,

    /// Root URI of the target filesystem, e.g. `hdfs://RIGHT`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_namespace: String,

    /// Trailing path segments collapsed when no map entry applies.
    #[serde(default)]
    pub consolidation_level: i32,

    /// Location map rules.
    #[serde(default, skip_serializing_if = "GlobalLocationMap::is_empty")]
    pub global_location_map: GlobalLocationMap,

    /// Always emit an explicit external location, even for tables that
    /// would otherwise stay managed.
    #[serde(default)]
    pub force_external_location: bool,

    /// Base directory for external table and database locations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_warehouse_dir: Option<String>,

    /// Base directory for managed database locations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_warehouse_dir: Option<String>,
}

/// Translated database locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseLocations {
    pub location: Option<String>,
    pub managed_location: Option<String>,
}

/// Name and location translator for one run.
#[derive(Debug, Clone)]
pub struct Translator {
    config: TranslatorConfig,
}

impl Translator {
    pub fn new(config: TranslatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    pub fn target_namespace(&self) -> &str {
        &self.config.target_namespace
    }

    /// Exact rename, else prefix, else identity.
    pub fn translate_database(&self, name: &str) -> String {
        if let Some(renamed) = self.config.database_rename.get(name) {
            return renamed.clone();
        }
        match &self.config.database_prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}{name}"),
            _ => name.to_string(),
        }
    }

    /// Per-table rename, else identity.
    pub fn translate_table(&self, database: &str, table: &str) -> String {
        self.config
            .table_rename
            .get(database)
            .and_then(|tables| tables.get(table))
            .cloned()
            .unwrap_or_else(|| table.to_string())
    }

    /// Target location for a table. Blank input yields `None`.
    ///
    /// Without a location map match, consolidation level `n` keeps the last
    /// `n - 1` parent directories of the source under `<warehouse>/<db>.db`
    /// and renames the final segment to the table. Level 1 therefore gives
    /// the same `<warehouse>/<db>.db/<table>` as level 0.
    pub fn translate_table_location(
        &self,
        database: &str,
        table: &str,
        table_type: TableType,
        original: &str,
    ) -> Option<String> {
        if original.trim().is_empty() {
            return None;
        }

        let relative = strip_namespace(original);
        let target_db = self.translate_database(database);
        let target_table = self.translate_table(database, table);

        let path = match self
            .config
            .global_location_map
            .best_match(database, table_type, &relative)
        {
            Some(found) => {
                let remainder = &relative[found.prefix.len()..];
                let base = if found.entry.target_path() == "/" {
                    normalize_path(remainder)
                } else {
                    format!("{}{}", found.entry.target_path(), remainder)
                };
                if found.entry.enumerates(table) {
                    base
                } else if remainder.is_empty() || remainder == "/" {
                    if last_directory(&base).as_deref() == Some(target_table.as_str()) {
                        base
                    } else {
                        format!("{}/{}", base.trim_end_matches('/'), target_table)
                    }
                } else {
                    with_last_segment(&base, &target_table)
                }
            }
            None if self.consolidation_level() > 0 => {
                let parent = reduce_url_by(&relative, self.consolidation_level());
                let tail = relative[parent.len()..].trim_end_matches('/');
                if tail.is_empty() {
                    format!("{}/{}.db/{}", self.warehouse_base(), target_db, target_table)
                } else {
                    let rebased = format!("{}/{}.db{}", self.warehouse_base(), target_db, tail);
                    with_last_segment(&rebased, &target_table)
                }
            }
            None => format!("{}/{}.db/{}", self.warehouse_base(), target_db, target_table),
        };

        Some(join_namespace(&self.config.target_namespace, &path))
    }

    /// Target location for one partition of a table.
    ///
    /// Partitions living under the table directory follow the table to its
    /// translated location; others go through the location map, falling back
    /// to a plain namespace swap.
    pub fn translate_partition_location(
        &self,
        database: &str,
        table_type: TableType,
        table_original: &str,
        table_translated: &str,
        partition_original: &str,
    ) -> Option<String> {
        if partition_original.trim().is_empty() {
            return None;
        }
        let table_rel = strip_namespace(table_original);
        let part_rel = strip_namespace(partition_original);

        if is_path_prefix(&table_rel, &part_rel) {
            let suffix = &part_rel[table_rel.trim_end_matches('/').len()..];
            return Some(format!("{}{}", table_translated.trim_end_matches('/'), suffix));
        }

        let path = match self
            .config
            .global_location_map
            .best_match(database, table_type, &part_rel)
        {
            Some(found) => format!(
                "{}{}",
                found.entry.target_path().trim_end_matches('/'),
                &part_rel[found.prefix.len()..]
            ),
            None => part_rel,
        };
        Some(join_namespace(&self.config.target_namespace, &path))
    }

    /// Database location and managed location on the target, when the
    /// corresponding warehouse directories are configured.
    pub fn database_locations(&self, database: &str) -> DatabaseLocations {
        let target_db = self.translate_database(database);
        let under = |dir: &Option<String>| {
            dir.as_deref().filter(|d| !d.trim().is_empty()).map(|d| {
                join_namespace(
                    &self.config.target_namespace,
                    &format!("{}/{}.db", normalize_path(d).trim_end_matches('/'), target_db),
                )
            })
        };
        DatabaseLocations {
            location: under(&self.config.external_warehouse_dir),
            managed_location: under(&self.config.managed_warehouse_dir),
        }
    }

    /// Rule violations; empty when the rules are consistent.
    pub fn violations(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let mut db_targets: HashMap<&str, &str> = HashMap::new();
        for (source, target) in &self.config.database_rename {
            if let Some(previous) = db_targets.insert(target.as_str(), source.as_str()) {
                problems.push(format!(
                    "database rename: '{previous}' and '{source}' both map to '{target}'"
                ));
            }
        }

        for (database, tables) in &self.config.table_rename {
            let mut seen: HashMap<&str, &str> = HashMap::new();
            for (source, target) in tables {
                if let Some(previous) = seen.insert(target.as_str(), source.as_str()) {
                    problems.push(format!(
                        "table rename in {database}: '{previous}' and '{source}' both map to '{target}'"
                    ));
                }
            }
        }

        if self.config.consolidation_level < 0 {
            problems.push(format!(
                "consolidation level must be non-negative, got {}",
                self.config.consolidation_level
            ));
        }

        let mut seen: HashMap<(Option<String>, String, TableType), String> = HashMap::new();
        for entry in self.config.global_location_map.entries() {
            for (label, path) in [("source", &entry.source), ("target", &entry.target)] {
                if let Some(reason) = malformed_path(path) {
                    problems.push(format!("location map {label} '{path}': {reason}"));
                }
            }
            let key = (
                entry.database.as_ref().map(|d| d.to_lowercase()),
                entry.source_path(),
                entry.table_type,
            );
            if let Some(previous) = seen.get(&key) {
                if previous != &entry.target_path() {
                    problems.push(format!(
                        "location map '{}' ({}) maps to both '{}' and '{}'",
                        entry.source, entry.table_type, previous, entry.target
                    ));
                }
            } else {
                seen.insert(key, entry.target_path());
            }
        }

        problems
    }

    /// True when the rules are consistent. Never errors.
    pub fn validate(&self) -> bool {
        self.violations().is_empty()
    }

    fn consolidation_level(&self) -> usize {
        self.config.consolidation_level.max(0) as usize
    }

    fn warehouse_base(&self) -> String {
        self.config
            .external_warehouse_dir
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(|d| normalize_path(d).trim_end_matches('/').to_string())
            .unwrap_or_default()
    }
}

fn malformed_path(path: &str) -> Option<&'static str> {
    if path.trim().is_empty() {
        Some("empty path")
    } else if path.contains("://") {
        Some("must be namespace-relative")
    } else if !path.starts_with('/') {
        Some("must start with '/'")
    } else if path.chars().any(char::is_whitespace) {
        Some("contains whitespace")
    } else if path.trim_end_matches('/').contains("//") {
        Some("contains an empty segment")
    } else {
        None
    }
}
