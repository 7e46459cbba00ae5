//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::cluster::FixerRegistry;
use crate::error::{MirrorError, Result};
use crate::translator::TranslatorConfig;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration for state validation.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Translator rules with the target namespace and warehouse
    /// directories resolved.
    ///
    /// The namespace comes from the translator section, then
    /// `transfer.target_namespace`, then the cluster the strategy writes to.
    pub fn translator_config(&self) -> TranslatorConfig {
        let mut config = self.translator.clone();
        if config.target_namespace.trim().is_empty() {
            config.target_namespace = self
                .transfer
                .target_namespace
                .clone()
                .filter(|ns| !ns.trim().is_empty())
                .unwrap_or_else(|| self.target_cluster().hcfs_namespace.clone());
        }
        if config.external_warehouse_dir.is_none() {
            config.external_warehouse_dir = self.transfer.warehouse.external_directory.clone();
        }
        if config.managed_warehouse_dir.is_none() {
            config.managed_warehouse_dir = self.transfer.warehouse.managed_directory.clone();
        }
        config
    }

    /// Cluster that receives the migrated schemas.
    pub fn target_cluster(&self) -> &ClusterConfig {
        match &self.clusters.right {
            Some(right) if self.data_strategy.requires_right() => right,
            _ => &self.clusters.left,
        }
    }

    /// Fixers enabled for this run.
    pub fn fixer_registry(&self) -> Result<FixerRegistry> {
        match &self.fixers {
            Some(tags) => FixerRegistry::with_tags(tags),
            None => Ok(FixerRegistry::standard()),
        }
    }

    /// Compiled table filter.
    pub fn table_filter(&self) -> Result<TableFilter> {
        let compile = |label: &str, pattern: &Option<String>| -> Result<Option<Regex>> {
            pattern
                .as_deref()
                .filter(|p| !p.is_empty())
                .map(|p| {
                    Regex::new(p).map_err(|e| {
                        MirrorError::Config(format!("filter.{label} is not a valid regex: {e}"))
                    })
                })
                .transpose()
        };
        Ok(TableFilter {
            include: compile("table_include", &self.filter.table_include)?,
            exclude: compile("table_exclude", &self.filter.table_exclude)?,
        })
    }
}

/// Include/exclude rules over table names.
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl TableFilter {
    pub fn accepts(&self, table: &str) -> bool {
        self.include.as_ref().map_or(true, |re| re.is_match(table))
            && !self.exclude.as_ref().is_some_and(|re| re.is_match(table))
    }
}
