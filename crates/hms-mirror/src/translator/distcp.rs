//! Distcp planning: which source directories feed which target directory.

use super::location::reduce_url_by;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Target directory to the set of source directories copied into it.
pub type DistcpPlan = BTreeMap<String, BTreeSet<String>>;

/// Collects `(source, target)` location pairs per database and folds them
/// into a copy plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistcpPlanner {
    translations: BTreeMap<String, BTreeMap<String, String>>,
}

impl DistcpPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a translated location. The first translation recorded for a
    /// source wins.
    pub fn add(&mut self, database: &str, source: &str, target: &str) {
        self.translations
            .entry(database.to_string())
            .or_default()
            .entry(source.trim_end_matches('/').to_string())
            .or_insert_with(|| target.trim_end_matches('/').to_string());
    }

    pub fn databases(&self) -> impl Iterator<Item = &str> {
        self.translations.keys().map(String::as_str)
    }

    /// Plan for one database. Both sides are reduced by `consolidation`
    /// segments so a single copy covers sibling table directories.
    pub fn plan(&self, database: &str, consolidation: usize) -> DistcpPlan {
        let mut plan = DistcpPlan::new();
        if let Some(entries) = self.translations.get(database) {
            for (source, target) in entries {
                plan.entry(reduce_url_by(target, consolidation))
                    .or_default()
                    .insert(reduce_url_by(source, consolidation));
            }
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_without_consolidation() {
        let mut planner = DistcpPlanner::new();
        planner.add("sales", "hdfs://LEFT/w/sales.db/a", "hdfs://RIGHT/w/sales.db/a");
        planner.add("sales", "hdfs://LEFT/w/sales.db/b/", "hdfs://RIGHT/w/sales.db/b");

        let plan = planner.plan("sales", 0);
        assert_eq!(plan.len(), 2);
        assert!(plan["hdfs://RIGHT/w/sales.db/a"].contains("hdfs://LEFT/w/sales.db/a"));
        assert!(plan["hdfs://RIGHT/w/sales.db/b"].contains("hdfs://LEFT/w/sales.db/b"));
    }

    #[test]
    fn test_plan_groups_sources_under_consolidated_target() {
        let mut planner = DistcpPlanner::new();
        planner.add("sales", "hdfs://LEFT/w/sales.db/a", "hdfs://RIGHT/w/sales.db/a");
        planner.add("sales", "hdfs://LEFT/w/sales.db/b", "hdfs://RIGHT/w/sales.db/b");
        planner.add("sales", "hdfs://LEFT/other/c", "hdfs://RIGHT/w/sales.db/c");

        let plan = planner.plan("sales", 1);
        assert_eq!(plan.len(), 1);
        let sources = &plan["hdfs://RIGHT/w/sales.db"];
        assert_eq!(sources.len(), 2);
        assert!(sources.contains("hdfs://LEFT/w/sales.db"));
        assert!(sources.contains("hdfs://LEFT/other"));
    }

    #[test]
    fn test_unknown_database_has_empty_plan() {
        assert!(DistcpPlanner::new().plan("nope", 0).is_empty());
    }
}
