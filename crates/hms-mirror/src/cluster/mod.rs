//! Cluster access abstractions.
//!
//! The migration engine never talks to a metastore directly. It goes through
//! these traits:
//!
//! - [`ClusterClient`]: Metadata reads and statement execution on one cluster
//! - [`ClusterConnector`]: Opens a client per environment at session start
//! - [`SchemaFixer`]: Normalises fetched definitions before they are used
//!
//! [`MemoryCluster`] implements the client over in-process state, used for
//! test-data runs and dry runs that never reach a real cluster.

mod fixers;
mod memory;

pub use fixers::{Fixer, FixerRegistry, FIXERS};
pub use memory::{MemoryCluster, MemoryConnector, TestData};

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::model::Environment;

/// Metadata and execution access to one cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create a database if it does not exist.
    async fn create_database(&self, name: &str) -> Result<()>;

    /// Table names of a database, in the order the cluster reports them.
    async fn list_tables(&self, database: &str) -> Result<Vec<String>>;

    /// `SHOW CREATE TABLE` lines, or `None` when the table is absent.
    async fn fetch_definition(&self, database: &str, table: &str) -> Result<Option<Vec<String>>>;

    /// Partition specs with their storage locations.
    async fn list_partitions(&self, _database: &str, _table: &str) -> Result<Vec<(String, String)>> {
        Ok(Vec::new())
    }

    /// Run one statement.
    async fn execute(&self, sql: &str) -> Result<()>;
}

/// Opens cluster clients for a session.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self, environment: Environment) -> Result<Arc<dyn ClusterClient>>;
}

/// Rewrites a fetched definition into its canonical form.
pub trait SchemaFixer: Send + Sync {
    fn normalize(&self, definition: Vec<String>) -> Vec<String>;
}
