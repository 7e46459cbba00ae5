//! In-process cluster.

use super::{ClusterClient, ClusterConnector};
use crate::error::{MirrorError, Result};
use crate::model::{DBMirror, Environment};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    definition: Vec<String>,
    partitions: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    databases: IndexMap<String, IndexMap<String, MemoryTable>>,
    executed: Vec<String>,
}

/// A cluster whose metadata lives in memory.
///
/// Every call is described by a statement (`SHOW TABLES IN db`,
/// `SHOW CREATE TABLE db.t`, or the executed SQL). Calls whose statement
/// contains a configured failure pattern return a cluster error, which is
/// how tests inject faults.
#[derive(Debug)]
pub struct MemoryCluster {
    environment: Environment,
    state: RwLock<State>,
    failures: Vec<String>,
}

impl MemoryCluster {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            state: RwLock::new(State::default()),
            failures: Vec::new(),
        }
    }

    /// Seed a cluster from one environment's view of test-data databases.
    pub fn from_databases(environment: Environment, databases: &[DBMirror]) -> Self {
        let mut state = State::default();
        for db in databases {
            let tables = state.databases.entry(db.name.clone()).or_default();
            for table in db.tables.values() {
                let Some(env) = table.env(environment) else {
                    continue;
                };
                tables.insert(
                    table.name.clone(),
                    MemoryTable {
                        definition: env.definition.clone(),
                        partitions: env.partitions.clone(),
                    },
                );
            }
        }
        Self {
            environment,
            state: RwLock::new(state),
            failures: Vec::new(),
        }
    }

    pub fn with_database(mut self, name: &str) -> Self {
        self.state.get_mut().databases.entry(name.to_string()).or_default();
        self
    }

    pub fn with_table(mut self, database: &str, table: &str, definition: Vec<String>) -> Self {
        self.table_mut(database, table).definition = definition;
        self
    }

    pub fn with_partitions(mut self, database: &str, table: &str, partitions: &[(&str, &str)]) -> Self {
        self.table_mut(database, table)
            .partitions
            .extend(partitions.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self
    }

    fn table_mut(&mut self, database: &str, table: &str) -> &mut MemoryTable {
        self.state
            .get_mut()
            .databases
            .entry(database.to_string())
            .or_default()
            .entry(table.to_string())
            .or_default()
    }

    /// Fail every call whose statement contains `pattern`.
    pub fn fail_on(mut self, pattern: &str) -> Self {
        self.failures.push(pattern.to_string());
        self
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Statements executed so far, in order.
    pub async fn executed(&self) -> Vec<String> {
        self.state.read().await.executed.clone()
    }

    pub async fn has_database(&self, name: &str) -> bool {
        self.state.read().await.databases.contains_key(name)
    }

    fn check(&self, statement: &str) -> Result<()> {
        match self.failures.iter().find(|p| statement.contains(p.as_str())) {
            Some(pattern) => Err(MirrorError::cluster(
                format!("{} rejected statement matching '{}'", self.environment, pattern),
                statement,
            )),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn create_database(&self, name: &str) -> Result<()> {
        let statement = format!("CREATE DATABASE {name}");
        self.check(&statement)?;
        let mut state = self.state.write().await;
        state.databases.entry(name.to_string()).or_default();
        state.executed.push(statement);
        Ok(())
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        let statement = format!("SHOW TABLES IN {database}");
        self.check(&statement)?;
        let state = self.state.read().await;
        match state.databases.get(database) {
            Some(tables) => Ok(tables.keys().cloned().collect()),
            None => Err(MirrorError::cluster(
                format!("database '{database}' does not exist on {}", self.environment),
                statement,
            )),
        }
    }

    async fn fetch_definition(&self, database: &str, table: &str) -> Result<Option<Vec<String>>> {
        self.check(&format!("SHOW CREATE TABLE {database}.{table}"))?;
        let state = self.state.read().await;
        Ok(state
            .databases
            .get(database)
            .and_then(|tables| tables.get(table))
            .filter(|t| !t.definition.is_empty())
            .map(|t| t.definition.clone()))
    }

    async fn list_partitions(&self, database: &str, table: &str) -> Result<Vec<(String, String)>> {
        self.check(&format!("SHOW PARTITIONS {database}.{table}"))?;
        let state = self.state.read().await;
        Ok(state
            .databases
            .get(database)
            .and_then(|tables| tables.get(table))
            .map(|t| t.partitions.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        self.check(sql)?;
        self.state.write().await.executed.push(sql.to_string());
        Ok(())
    }
}

/// Hands out preconfigured [`MemoryCluster`]s.
#[derive(Debug, Default, Clone)]
pub struct MemoryConnector {
    clusters: HashMap<Environment, Arc<MemoryCluster>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster(mut self, environment: Environment, cluster: Arc<MemoryCluster>) -> Self {
        self.clusters.insert(environment, cluster);
        self
    }
}

#[async_trait]
impl ClusterConnector for MemoryConnector {
    async fn connect(&self, environment: Environment) -> Result<Arc<dyn ClusterClient>> {
        self.clusters
            .get(&environment)
            .map(|c| c.clone() as Arc<dyn ClusterClient>)
            .ok_or_else(|| MirrorError::session(environment, "no cluster configured"))
    }
}

/// Databases and tables used to seed in-memory clusters, loaded from YAML
/// (`databases: [...]`). Each table's LEFT and RIGHT environments become
/// the contents of the matching cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestData {
    #[serde(default)]
    pub databases: Vec<DBMirror>,
}

impl TestData {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn database_names(&self) -> Vec<String> {
        self.databases.iter().map(|db| db.name.clone()).collect()
    }

    /// Connector serving LEFT and RIGHT clusters seeded from this data.
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector::new()
            .with_cluster(
                Environment::Left,
                Arc::new(MemoryCluster::from_databases(Environment::Left, &self.databases)),
            )
            .with_cluster(
                Environment::Right,
                Arc::new(MemoryCluster::from_databases(Environment::Right, &self.databases)),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::tests::external_definition;

    #[tokio::test]
    async fn test_tables_listed_in_insertion_order() {
        let cluster = MemoryCluster::new(Environment::Left)
            .with_table("db", "zeta", external_definition("zeta", "hdfs://LEFT/z"))
            .with_table("db", "alpha", external_definition("alpha", "hdfs://LEFT/a"));
        assert_eq!(cluster.list_tables("db").await.unwrap(), vec!["zeta", "alpha"]);
        assert!(cluster.fetch_definition("db", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_database_is_cluster_error() {
        let cluster = MemoryCluster::new(Environment::Left);
        let err = cluster.list_tables("nope").await.unwrap_err();
        assert!(matches!(err, MirrorError::Cluster { .. }));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let cluster = MemoryCluster::new(Environment::Right).fail_on("CREATE DATABASE bad");
        assert!(cluster.create_database("good").await.is_ok());
        assert!(cluster.create_database("bad").await.is_err());
        assert!(cluster.has_database("good").await);
        assert!(!cluster.has_database("bad").await);
        assert_eq!(cluster.executed().await, vec!["CREATE DATABASE good"]);
    }

    #[tokio::test]
    async fn test_from_databases_uses_environment_view() {
        let mut db = DBMirror::new("sales");
        let table = db.add_table("orders");
        table.env_mut(Environment::Left).definition = external_definition("orders", "hdfs://LEFT/o");
        table
            .env_mut(Environment::Left)
            .partitions
            .insert("dt=1".into(), "hdfs://LEFT/o/dt=1".into());

        let left = MemoryCluster::from_databases(Environment::Left, std::slice::from_ref(&db));
        let right = MemoryCluster::from_databases(Environment::Right, &[db]);

        assert_eq!(left.list_partitions("sales", "orders").await.unwrap().len(), 1);
        assert!(right.list_tables("sales").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_test_data_seeds_both_sides() {
        let yaml = r#"
databases:
  - name: sales
    tables:
      orders:
        name: orders
        environments:
          LEFT:
            definition:
              - "CREATE EXTERNAL TABLE `orders`("
              - "  `id` int)"
              - "LOCATION"
              - "  'hdfs://LEFT/data/orders'"
"#;
        let data = TestData::from_yaml(yaml).unwrap();
        assert_eq!(data.database_names(), vec!["sales"]);

        let connector = data.connector();
        let left = connector.connect(Environment::Left).await.unwrap();
        let right = connector.connect(Environment::Right).await.unwrap();
        assert_eq!(left.list_tables("sales").await.unwrap(), vec!["orders"]);
        assert!(right.fetch_definition("sales", "orders").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connector_missing_environment() {
        let connector = MemoryConnector::new();
        let err = connector.connect(Environment::Right).await.err().unwrap();
        assert!(matches!(err, MirrorError::SessionFatal { .. }));
    }
}
