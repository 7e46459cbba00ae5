//! Configuration validation.

use super::Config;
use crate::error::{MirrorError, Result};
use crate::strategy::DataStrategy;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Cluster validation
    if config.clusters.left.hcfs_namespace.trim().is_empty() {
        return Err(MirrorError::Config("clusters.left.hcfs_namespace is required".into()));
    }
    if config.data_strategy.requires_right() {
        match &config.clusters.right {
            None => {
                return Err(MirrorError::Config(format!(
                    "clusters.right is required for {}",
                    config.data_strategy
                )));
            }
            Some(right) if right.hcfs_namespace.trim().is_empty() => {
                return Err(MirrorError::Config("clusters.right.hcfs_namespace is required".into()));
            }
            Some(_) => {}
        }
    }

    // Strategy prerequisites
    if config.data_strategy == DataStrategy::Intermediate
        && config
            .transfer
            .intermediate_storage
            .as_deref()
            .map_or(true, |s| s.trim().is_empty())
    {
        return Err(MirrorError::Config(
            "transfer.intermediate_storage is required for INTERMEDIATE".into(),
        ));
    }
    if config.migrate_acid.only && !config.migrate_acid.on {
        return Err(MirrorError::Config(
            "migrate_acid.only requires migrate_acid.on".into(),
        ));
    }

    // Concurrency validation - only check if explicitly set
    if let Some(0) = config.concurrency.max_threads {
        return Err(MirrorError::Config(
            "concurrency.max_threads must be at least 1".into(),
        ));
    }
    if let Some(0) = config.concurrency.step_timeout_secs {
        return Err(MirrorError::Config(
            "concurrency.step_timeout_secs must be at least 1".into(),
        ));
    }

    config.table_filter()?;
    config.fixer_registry()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::valid_config;

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_left_namespace() {
        let mut config = valid_config();
        config.clusters.left.hcfs_namespace = "".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("clusters.left.hcfs_namespace is required"));
    }

    #[test]
    fn test_right_needed_only_when_strategy_uses_it() {
        let mut config = valid_config();
        config.clusters.right = None;
        assert!(validate(&config).is_err());

        config.data_strategy = DataStrategy::Dump;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_intermediate_requires_storage() {
        let mut config = valid_config();
        config.data_strategy = DataStrategy::Intermediate;
        assert!(validate(&config).is_err());

        config.transfer.intermediate_storage = Some("s3a://staging".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_threads_rejected() {
        let mut config = valid_config();
        config.concurrency.max_threads = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_filter_regex_rejected() {
        let mut config = valid_config();
        config.filter.table_exclude = Some("(".into());
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("filter.table_exclude"));
    }

    #[test]
    fn test_unknown_fixer_rejected() {
        let mut config = valid_config();
        config.fixers = Some(vec!["BAD_ORC_DEF".into(), "NOPE".into()]);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_acid_only_requires_acid_on() {
        let mut config = valid_config();
        config.migrate_acid.only = true;
        assert!(validate(&config).is_err());
        config.migrate_acid.on = true;
        assert!(validate(&config).is_ok());
    }
}
