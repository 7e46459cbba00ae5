//! Strategy decision table.

use super::DataStrategy;
use crate::config::Config;

/// Reason given when an ACID table meets a strategy that cannot carry it.
pub const ACID_STRATEGY_REJECTED: &str =
    "ACID tables only supported with EXPORT_IMPORT or HYBRID data strategies.";

/// Reason given when ACID migration is switched off.
pub const ACID_NOT_ON: &str =
    "This is an ACID table.  Turn on ACID migration `-ma|--migrate-acid`.";

/// Reason given for non-ACID tables in an ACID-only run.
pub const NON_ACID_SKIPPED: &str = "Non-ACID table skipped: ACID-only migration requested.";

/// The facts about a table that drive strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableShape {
    pub is_acid: bool,
    pub is_partitioned: bool,
    pub partition_count: usize,
}

/// Outcome of strategy selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Variant(DataStrategy),
    Rejected(String),
}

/// Pick the strategy a table will run under.
///
/// HYBRID sends every ACID table to EXPORT_IMPORT. The ACID migration switch
/// and partition limit only gate a directly configured EXPORT_IMPORT.
pub fn select_strategy(config: &Config, shape: &TableShape) -> Selection {
    let configured = config.data_strategy;
    let acid = &config.migrate_acid;

    if shape.is_acid {
        match configured {
            DataStrategy::Hybrid => return Selection::Variant(DataStrategy::ExportImport),
            DataStrategy::ExportImport => {}
            _ => return Selection::Rejected(ACID_STRATEGY_REJECTED.to_string()),
        }
        if !acid.on {
            return Selection::Rejected(ACID_NOT_ON.to_string());
        }
        if acid.partition_limit > 0 && shape.partition_count > acid.partition_limit {
            return Selection::Rejected(format!(
                "The number of partitions ({}) exceeds the ACID partition limit ({}).",
                shape.partition_count, acid.partition_limit
            ));
        }
        return Selection::Variant(DataStrategy::ExportImport);
    }

    if acid.only {
        return Selection::Rejected(NON_ACID_SKIPPED.to_string());
    }

    match configured {
        DataStrategy::Hybrid => {
            if shape.is_partitioned && shape.partition_count > config.hybrid.sql_partition_limit {
                Selection::Variant(DataStrategy::ExportImport)
            } else {
                Selection::Variant(DataStrategy::Sql)
            }
        }
        other => Selection::Variant(other),
    }
}
