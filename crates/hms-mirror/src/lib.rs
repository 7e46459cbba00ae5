//! # hms-mirror
//!
//! Hive metastore migration library.
//!
//! Moves table definitions (and optionally data) from a LEFT cluster to a
//! RIGHT cluster, or relocates them within LEFT, with support for:
//!
//! - **Location translation** through a global location map, warehouse
//!   directories and namespace swaps
//! - **Per-table strategy selection** for ACID, external and partitioned
//!   tables
//! - **Phased, bounded concurrency** over databases and tables
//! - **Dry runs** that record every statement without executing it
//! - **Signed run state** written as JSON
//!
//! ## Example
//!
//! ```rust,no_run
//! use hms_mirror::{Config, Orchestrator, TestData};
//!
//! #[tokio::main]
//! async fn main() -> hms_mirror::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let data = TestData::load("test-data.yaml")?;
//!     let orchestrator = Orchestrator::new(config, &data.connector()).await?;
//!     let result = orchestrator.with_test_data(&data).run(None).await?;
//!     println!("{} tables, outcome code {}", result.tables_total, result.outcome_code);
//!     Ok(())
//! }
//! ```

pub mod cluster;
pub mod config;
pub mod ddl;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod outcome;
pub mod session;
pub mod state;
pub mod strategy;
pub mod translator;

// Re-exports for convenient access
pub use cluster::{ClusterClient, ClusterConnector, MemoryCluster, MemoryConnector, TestData};
pub use config::Config;
pub use ddl::TableDefinition;
pub use error::{MirrorError, Result};
pub use model::{Conversion, DBMirror, Environment, Pair, PhaseState, TableMirror};
pub use orchestrator::{MirrorResult, Orchestrator};
pub use outcome::{IssueCode, OutcomeCode};
pub use session::Session;
pub use state::{RunState, RunStatus};
pub use strategy::DataStrategy;
pub use translator::{TableType, Translator, TranslatorConfig};
