//! Configuration type definitions with auto-tuning based on system resources.

use crate::strategy::DataStrategy;
use crate::translator::TranslatorConfig;
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::info;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_cores = sys.cpus().len();

        Self {
            total_memory_gb,
            cpu_cores,
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Strategy requested for every table.
    #[serde(default)]
    pub data_strategy: DataStrategy,

    /// Send statements to the clusters. Without it a run only records
    /// what it would do.
    #[serde(default)]
    pub execute: bool,

    /// Databases to mirror, in processing order.
    #[serde(default)]
    pub databases: Vec<String>,

    #[serde(default)]
    pub filter: FilterConfig,

    pub clusters: ClustersConfig,

    #[serde(default)]
    pub migrate_acid: MigrateAcidConfig,

    #[serde(default)]
    pub hybrid: HybridConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    /// Issue explicit partition locations instead of `MSCK REPAIR`.
    #[serde(default)]
    pub evaluate_partition_location: bool,

    #[serde(default)]
    pub iceberg: IcebergConfig,

    #[serde(default)]
    pub translator: TranslatorConfig,

    /// Definition fixers to apply, by tag. All when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixers: Option<Vec<String>>,

    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.concurrency = self.concurrency.with_auto_tuning(&resources);
        self
    }
}

/// Table selection within the configured databases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Only tables matching this regex are mirrored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_include: Option<String>,

    /// Tables matching this regex are skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_exclude: Option<String>,
}

/// The two metastore-backed clusters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClustersConfig {
    pub left: ClusterConfig,

    /// Not needed for strategies that stay on LEFT.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<ClusterConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Filesystem root, e.g. `hdfs://nameservice1`.
    #[serde(default)]
    pub hcfs_namespace: String,
}

/// Transactional table handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrateAcidConfig {
    #[serde(default)]
    pub on: bool,

    /// Skip every non-ACID table.
    #[serde(default)]
    pub only: bool,

    /// ACID tables with more partitions are rejected. 0 disables the check.
    #[serde(default = "default_partition_limit")]
    pub partition_limit: usize,

    /// Bucket declarations at or below this count are dropped on RIGHT.
    #[serde(default = "default_bucket_threshold")]
    pub bucket_threshold: u32,
}

impl Default for MigrateAcidConfig {
    fn default() -> Self {
        Self {
            on: false,
            only: false,
            partition_limit: default_partition_limit(),
            bucket_threshold: default_bucket_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridConfig {
    /// Partitioned tables above this count go through EXPORT/IMPORT.
    #[serde(default = "default_partition_limit")]
    pub sql_partition_limit: usize,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            sql_partition_limit: default_partition_limit(),
        }
    }
}

/// Staging and relocation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Name prefix of LEFT-side staging tables.
    #[serde(default = "default_transfer_prefix")]
    pub transfer_prefix: String,

    /// Name prefix of RIGHT-side staging tables.
    #[serde(default = "default_shadow_prefix")]
    pub shadow_prefix: String,

    /// Directory prefix for `EXPORT` output, suffixed with `<db>/<table>`.
    #[serde(default = "default_export_base_dir_prefix")]
    pub export_base_dir_prefix: String,

    /// Storage reachable from both clusters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediate_storage: Option<String>,

    /// Namespace that translated locations are rooted in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,

    #[serde(default)]
    pub warehouse: WarehouseConfig,

    #[serde(default)]
    pub storage_migration: StorageMigrationConfig,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            transfer_prefix: default_transfer_prefix(),
            shadow_prefix: default_shadow_prefix(),
            export_base_dir_prefix: default_export_base_dir_prefix(),
            intermediate_storage: None,
            target_namespace: None,
            warehouse: WarehouseConfig::default(),
            storage_migration: StorageMigrationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_directory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_directory: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageMigrationConfig {
    /// Rename the original and rebuild it at the new location, instead of
    /// writing a transfer table next to it.
    #[serde(default)]
    pub in_place: bool,

    /// Produce a distcp plan for the moved locations.
    #[serde(default)]
    pub distcp: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcebergConfig {
    #[serde(default = "default_iceberg_version")]
    pub version: u32,
}

impl Default for IcebergConfig {
    fn default() -> Self {
        Self {
            version: default_iceberg_version(),
        }
    }
}

/// Scheduler settings.
/// Fields use Option<T> to distinguish "not set" (auto-tuned) from
/// "explicitly set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Concurrent tasks per phase. Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_threads: Option<usize>,

    /// Upper bound on one cluster call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_timeout_secs: Option<u64>,
}

impl ConcurrencyConfig {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that are None (not explicitly set).
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        // Metastore calls are I/O bound: twice the cores, between 4 and 32
        if self.max_threads.is_none() {
            self.max_threads = Some((resources.cpu_cores * 2).clamp(4, 32));
        }

        info!("Auto-tuned config: max_threads={}", self.get_max_threads());
        self
    }

    pub fn get_max_threads(&self) -> usize {
        self.max_threads.unwrap_or(10)
    }

    pub fn get_step_timeout_secs(&self) -> u64 {
        self.step_timeout_secs.unwrap_or(300)
    }
}

// Default value functions for serde
fn default_partition_limit() -> usize {
    500
}

fn default_bucket_threshold() -> u32 {
    2
}

fn default_transfer_prefix() -> String {
    "hms_mirror_transfer_".to_string()
}

fn default_shadow_prefix() -> String {
    "hms_mirror_shadow_".to_string()
}

fn default_export_base_dir_prefix() -> String {
    "/apps/hive/warehouse/export_".to_string()
}

fn default_iceberg_version() -> u32 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_tuning_respects_explicit_value() {
        let resources = SystemResources {
            total_memory_gb: 16.0,
            cpu_cores: 64,
        };
        let tuned = ConcurrencyConfig::default().with_auto_tuning(&resources);
        assert_eq!(tuned.max_threads, Some(32));

        let explicit = ConcurrencyConfig {
            max_threads: Some(3),
            ..Default::default()
        }
        .with_auto_tuning(&resources);
        assert_eq!(explicit.max_threads, Some(3));
    }

    #[test]
    fn test_auto_tuning_floor() {
        let resources = SystemResources {
            total_memory_gb: 2.0,
            cpu_cores: 1,
        };
        assert_eq!(ConcurrencyConfig::default().with_auto_tuning(&resources).max_threads, Some(4));
    }
}
