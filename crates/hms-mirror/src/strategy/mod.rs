//! Strategy selection and execution.
//!
//! A run is configured with one [`DataStrategy`]. For every table the
//! [`decision`] table resolves it to the variant that actually runs (or
//! rejects the table), [`steps`] turns the variant into an ordered pipeline
//! of named steps, and [`runner`] executes the pipeline.

pub mod decision;
pub mod runner;
pub mod steps;

pub use decision::{select_strategy, Selection, TableShape, ACID_NOT_ON, ACID_STRATEGY_REJECTED};
pub use runner::migrate_table;
pub use steps::{Step, StepInput, TablePlan};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Top-level migration strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataStrategy {
    /// Schema on RIGHT, data moved out of band.
    #[default]
    SchemaOnly,
    /// RIGHT schema pointing at LEFT data.
    Linked,
    /// Alias of `Linked`.
    Common,
    /// Data moved with `INSERT OVERWRITE ... SELECT`.
    Sql,
    /// Data moved with `EXPORT`/`IMPORT`.
    ExportImport,
    /// `Sql` or `ExportImport`, chosen per table.
    Hybrid,
    /// Data staged on intermediate storage reachable from both clusters.
    Intermediate,
    /// Relocate tables within the LEFT cluster.
    StorageMigration,
    /// Convert LEFT tables to Iceberg in place.
    IcebergConversion,
    /// Record definitions only.
    Dump,
}

impl DataStrategy {
    pub const ALL: [DataStrategy; 10] = [
        DataStrategy::SchemaOnly,
        DataStrategy::Linked,
        DataStrategy::Common,
        DataStrategy::Sql,
        DataStrategy::ExportImport,
        DataStrategy::Hybrid,
        DataStrategy::Intermediate,
        DataStrategy::StorageMigration,
        DataStrategy::IcebergConversion,
        DataStrategy::Dump,
    ];

    /// Whether the strategy touches a distinct RIGHT cluster.
    pub fn requires_right(self) -> bool {
        !matches!(
            self,
            DataStrategy::Dump | DataStrategy::StorageMigration | DataStrategy::IcebergConversion
        )
    }

    /// Whether target databases are created before table work.
    pub fn creates_databases(self) -> bool {
        !matches!(self, DataStrategy::Dump | DataStrategy::IcebergConversion)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataStrategy::SchemaOnly => "SCHEMA_ONLY",
            DataStrategy::Linked => "LINKED",
            DataStrategy::Common => "COMMON",
            DataStrategy::Sql => "SQL",
            DataStrategy::ExportImport => "EXPORT_IMPORT",
            DataStrategy::Hybrid => "HYBRID",
            DataStrategy::Intermediate => "INTERMEDIATE",
            DataStrategy::StorageMigration => "STORAGE_MIGRATION",
            DataStrategy::IcebergConversion => "ICEBERG_CONVERSION",
            DataStrategy::Dump => "DUMP",
        }
    }
}

impl fmt::Display for DataStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataStrategy {
    type Err = String;

    /// Accepts `EXPORT_IMPORT`, `export_import` and `export-import`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        DataStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == wanted)
            .ok_or_else(|| format!("unknown data strategy '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strategy_names() {
        assert_eq!("export-import".parse::<DataStrategy>(), Ok(DataStrategy::ExportImport));
        assert_eq!("SCHEMA_ONLY".parse::<DataStrategy>(), Ok(DataStrategy::SchemaOnly));
        assert_eq!("hybrid".parse::<DataStrategy>(), Ok(DataStrategy::Hybrid));
        assert!("bogus".parse::<DataStrategy>().is_err());
    }

    #[test]
    fn test_display_matches_serde() {
        for strategy in DataStrategy::ALL {
            let yaml = serde_yaml::to_string(&strategy).unwrap();
            assert_eq!(yaml.trim(), strategy.to_string());
        }
    }
}
