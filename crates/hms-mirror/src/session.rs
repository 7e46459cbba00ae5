//! Run-scoped collaborators.

use crate::cluster::{ClusterClient, ClusterConnector, SchemaFixer};
use crate::config::Config;
use crate::error::{MirrorError, Result};
use crate::model::Environment;
use crate::translator::Translator;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Configuration, translator, cluster clients and schema fixer for one run.
///
/// Built once before any phase starts and shared read-only by every task.
pub struct Session {
    config: Config,
    translator: Translator,
    left: Arc<dyn ClusterClient>,
    right: Arc<dyn ClusterClient>,
    fixer: Arc<dyn SchemaFixer>,
}

impl Session {
    /// Validate translator rules and open the cluster clients the strategy
    /// needs. Strategies that stay on LEFT use the LEFT client for both sides.
    pub async fn connect(config: Config, connector: &dyn ClusterConnector) -> Result<Self> {
        let translator = Translator::new(config.translator_config());
        let violations = translator.violations();
        if !violations.is_empty() {
            return Err(MirrorError::TranslationAmbiguity(violations));
        }
        let fixer: Arc<dyn SchemaFixer> = Arc::new(config.fixer_registry()?);

        let left = connector.connect(Environment::Left).await?;
        let right = if config.data_strategy.requires_right() {
            connector.connect(Environment::Right).await?
        } else {
            debug!("{} stays on LEFT, reusing the LEFT client", config.data_strategy);
            left.clone()
        };
        info!(
            "Session ready: strategy={}, target namespace={}",
            config.data_strategy,
            translator.target_namespace()
        );

        Ok(Self {
            config,
            translator,
            left,
            right,
            fixer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    pub fn fixer(&self) -> &dyn SchemaFixer {
        self.fixer.as_ref()
    }

    /// Client for the cluster an environment runs on.
    pub fn client(&self, environment: Environment) -> &Arc<dyn ClusterClient> {
        match environment.cluster() {
            Environment::Left => &self.left,
            _ => &self.right,
        }
    }

    /// Run one statement on an environment's cluster, bounded by the step
    /// timeout.
    pub async fn execute(&self, environment: Environment, sql: &str) -> Result<()> {
        let client = self.client(environment);
        self.bounded(sql, client.execute(sql)).await
    }

    /// Bound any cluster call by the step timeout.
    pub async fn bounded<T>(
        &self,
        statement: &str,
        call: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        let seconds = self.config.concurrency.get_step_timeout_secs();
        match tokio::time::timeout(Duration::from_secs(seconds), call).await {
            Ok(result) => result,
            Err(_) => Err(MirrorError::Timeout {
                seconds,
                statement: statement.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{MemoryCluster, MemoryConnector};
    use crate::config::tests::valid_config;
    use crate::strategy::DataStrategy;
    use crate::translator::{GlmEntry, GlobalLocationMap, TableType};

    fn connector() -> (MemoryConnector, Arc<MemoryCluster>, Arc<MemoryCluster>) {
        let left = Arc::new(MemoryCluster::new(Environment::Left));
        let right = Arc::new(MemoryCluster::new(Environment::Right));
        let connector = MemoryConnector::new()
            .with_cluster(Environment::Left, left.clone())
            .with_cluster(Environment::Right, right.clone());
        (connector, left, right)
    }

    #[tokio::test]
    async fn test_staging_environments_route_to_their_cluster() {
        let (connector, left, right) = connector();
        let session = Session::connect(valid_config(), &connector).await.unwrap();

        session.execute(Environment::Shadow, "DROP TABLE IF EXISTS s").await.unwrap();
        session.execute(Environment::Transfer, "DROP TABLE IF EXISTS t").await.unwrap();

        assert_eq!(right.executed().await, vec!["DROP TABLE IF EXISTS s"]);
        assert_eq!(left.executed().await, vec!["DROP TABLE IF EXISTS t"]);
    }

    #[tokio::test]
    async fn test_missing_right_is_fatal() {
        let left = Arc::new(MemoryCluster::new(Environment::Left));
        let connector = MemoryConnector::new().with_cluster(Environment::Left, left);
        let err = Session::connect(valid_config(), &connector).await.err().unwrap();
        assert!(matches!(err, MirrorError::SessionFatal { .. }));
    }

    #[tokio::test]
    async fn test_left_only_strategy_needs_no_right() {
        let left = Arc::new(MemoryCluster::new(Environment::Left));
        let connector = MemoryConnector::new().with_cluster(Environment::Left, left.clone());
        let mut config = valid_config();
        config.data_strategy = DataStrategy::Dump;
        let session = Session::connect(config, &connector).await.unwrap();

        session.execute(Environment::Right, "SELECT 1").await.unwrap();
        assert_eq!(left.executed().await, vec!["SELECT 1"]);
    }

    #[tokio::test]
    async fn test_ambiguous_rules_rejected_before_connecting() {
        let (connector, _, _) = connector();
        let mut config = valid_config();
        config.translator.global_location_map = GlobalLocationMap::new(vec![
            GlmEntry::new("/data", "/lake/a", TableType::Any),
            GlmEntry::new("/data", "/lake/b", TableType::Any),
        ]);
        let err = Session::connect(config, &connector).await.err().unwrap();
        assert!(matches!(err, MirrorError::TranslationAmbiguity(_)));
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let (connector, _, _) = connector();
        let mut config = valid_config();
        config.concurrency.step_timeout_secs = Some(1);
        let session = Session::connect(config, &connector).await.unwrap();

        let err = session
            .bounded("SLOW", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Timeout { seconds: 1, .. }));
    }
}
