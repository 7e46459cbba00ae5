//! Mirror orchestrator - main workflow coordinator.
//!
//! A run goes through three phases, each a bounded pool of tasks joined
//! before the next phase starts:
//!
//! 1. Databases: collect table lists, create target databases.
//! 2. Metadata: fetch LEFT/RIGHT definitions, partitions and statistics.
//! 3. Migration: pick a strategy per table and run its pipeline.
//!
//! Every task owns the record it works on and hands it back when done, so
//! no record is shared between tasks.

use crate::cluster::{ClusterConnector, TestData};
use crate::config::{Config, TableFilter};
use crate::ddl::TableDefinition;
use crate::error::{MirrorError, Result};
use crate::model::{Conversion, DBMirror, Environment, PhaseState, Pair, TableMirror};
use crate::outcome::IssueCode;
use crate::session::Session;
use crate::state::{RunState, RunStatus};
use crate::strategy::{migrate_table, steps::sql};
use crate::translator::{DistcpPlan, DistcpPlanner, TableType};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Mirror orchestrator.
pub struct Orchestrator {
    session: Arc<Session>,
    conversion: Conversion,
    state_file: Option<PathBuf>,
}

/// Result of a mirror run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: RunStatus,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub databases_total: usize,
    pub tables_total: usize,
    pub tables_success: usize,
    pub tables_failed: usize,
    pub tables_removed: usize,

    /// Union of every issue category raised; 0 is a clean run.
    pub outcome_code: u64,

    /// Every recorded issue, prefixed with where it was raised.
    pub issues: Vec<String>,

    /// Per-database copy plan, when requested.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub distcp: BTreeMap<String, DistcpPlan>,

    /// Full per-table record of the run.
    pub conversion: Conversion,
}

impl MirrorResult {
    /// Convert result to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Open a session and register the configured databases.
    pub async fn new(config: Config, connector: &dyn ClusterConnector) -> Result<Self> {
        let session = Session::connect(config, connector).await?;
        Ok(Self::with_session(session))
    }

    /// Build on an existing session.
    pub fn with_session(session: Session) -> Self {
        let mut conversion = Conversion::new();
        for database in &session.config().databases {
            conversion.add_database(database);
        }
        Self {
            session: Arc::new(session),
            conversion,
            state_file: None,
        }
    }

    /// Set the state file path.
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file = Some(path);
        self
    }

    /// Register the databases of a test-data fixture.
    pub fn with_test_data(mut self, data: &TestData) -> Self {
        for name in data.database_names() {
            self.conversion.add_database(&name);
        }
        self
    }

    /// Run all three phases.
    pub async fn run(mut self, cancel: Option<CancellationToken>) -> Result<MirrorResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let cancel = cancel.unwrap_or_else(CancellationToken::new);
        let config = self.session.config();
        let mut state = RunState::new(run_id.clone(), config.hash());

        info!("Starting mirror run: {}", run_id);
        info!(
            "Strategy {}, {} databases, {} concurrent tasks, {}",
            config.data_strategy,
            self.conversion.databases.len(),
            config.concurrency.get_max_threads(),
            if config.execute { "executing" } else { "dry run" }
        );

        if !cancel.is_cancelled() {
            info!("Phase 1: Collecting tables and creating databases");
            self.setup_databases(&cancel).await?;
        }
        if !cancel.is_cancelled() {
            info!("Phase 2: Collecting table metadata");
            self.collect_metadata(&cancel).await?;
        }
        if !cancel.is_cancelled() {
            info!("Phase 3: Migrating tables");
            self.migrate_tables(&cancel).await?;
        } else {
            info!("Cancellation requested, remaining phases skipped");
        }

        let distcp = self.distcp_plans();
        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let outcome = self.conversion.outcome();
        let status = if cancel.is_cancelled() {
            RunStatus::Cancelled
        } else if outcome.is_clean() {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithIssues
        };

        let mut tables_total = 0;
        let mut tables_success = 0;
        let mut tables_failed = 0;
        let mut tables_removed = 0;
        for (_, table) in self.conversion.tables() {
            tables_total += 1;
            if table.removed {
                tables_removed += 1;
            } else if table.phase == PhaseState::Success {
                tables_success += 1;
            } else if table.phase == PhaseState::Error {
                tables_failed += 1;
            }
        }

        let result = MirrorResult {
            run_id,
            status,
            started_at,
            completed_at,
            duration_seconds: duration,
            databases_total: self.conversion.databases.len(),
            tables_total,
            tables_success,
            tables_failed,
            tables_removed,
            outcome_code: outcome.bits(),
            issues: collect_issues(&self.conversion),
            distcp,
            conversion: self.conversion.clone(),
        };

        if let Some(path) = &self.state_file {
            state.finish(self.conversion, status);
            state.save(path)?;
            debug!("State written to {:?}", path);
        }

        info!(
            "Mirror run {}: {} tables ({} success, {} failed, {} removed) in {:.1}s, outcome code {}",
            result.status,
            result.tables_total,
            result.tables_success,
            result.tables_failed,
            result.tables_removed,
            result.duration_seconds,
            result.outcome_code
        );

        Ok(result)
    }

    /// Phase 1: table lists and target databases, one task per database.
    async fn setup_databases(&mut self, cancel: &CancellationToken) -> Result<()> {
        let filter = Arc::new(self.session.config().table_filter()?);
        let semaphore = Arc::new(Semaphore::new(self.session.config().concurrency.get_max_threads()));
        let mut pending: Vec<(String, DBMirror)> = Vec::new();
        let mut handles: Vec<JoinHandle<DBMirror>> = Vec::new();

        let names: Vec<String> = self.conversion.databases.keys().cloned().collect();
        for name in names {
            if cancel.is_cancelled() {
                info!("Cancellation requested, stopping new database tasks");
                break;
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| MirrorError::Cancelled)?;

            let Some(slot) = self.conversion.databases.get_mut(&name) else {
                continue;
            };
            let db = std::mem::take(slot);
            let backup = db.clone();
            let session = self.session.clone();
            let filter = filter.clone();

            let handle = tokio::spawn(async move {
                let db = setup_database(&session, &filter, db).await;
                drop(permit);
                db
            });
            pending.push((name, backup));
            handles.push(handle);
        }

        for ((name, mut backup), joined) in pending.into_iter().zip(join_all(handles).await) {
            let db = match joined {
                Ok(db) => db,
                Err(e) => {
                    error!("{}: database task panicked - {}", name, e);
                    backup.add_issue(IssueCode::TaskAborted, format!("Task panicked: {e}"));
                    backup
                }
            };
            if let Some(slot) = self.conversion.databases.get_mut(&name) {
                *slot = db;
            }
        }
        Ok(())
    }

    /// Phase 2: definitions, partitions and statistics, one task per table.
    async fn collect_metadata(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.run_table_phase("metadata", cancel, |session, database, table| async move {
            collect_table(&session, &database, table).await
        })
        .await
    }

    /// Phase 3: strategy selection and execution, one task per table.
    async fn migrate_tables(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.run_table_phase("migration", cancel, |session, database, table| async move {
            migrate_table(&session, &database, table).await
        })
        .await
    }

    /// Run `work` for every table still in play, at most `max_threads` at a
    /// time, and wait for all of them. Each task takes its table out of the
    /// conversion and the result is put back under the same key, so table
    /// order is unchanged.
    async fn run_table_phase<F, Fut>(&mut self, phase: &str, cancel: &CancellationToken, work: F) -> Result<()>
    where
        F: Fn(Arc<Session>, String, TableMirror) -> Fut,
        Fut: Future<Output = TableMirror> + Send + 'static,
    {
        let max_threads = self.session.config().concurrency.get_max_threads();
        let semaphore = Arc::new(Semaphore::new(max_threads));
        let mut spawned: Vec<(String, String, TableMirror)> = Vec::new();
        let mut handles: Vec<JoinHandle<TableMirror>> = Vec::new();

        let pending: Vec<(String, String)> = self
            .conversion
            .tables()
            .filter(|(_, t)| !t.removed && !t.phase.is_terminal())
            .map(|(db, t)| (db.name.clone(), t.name.clone()))
            .collect();
        info!("Running {} phase for {} tables with {} tasks", phase, pending.len(), max_threads);

        for (database, name) in pending {
            if cancel.is_cancelled() {
                info!("Cancellation requested, stopping new {} tasks", phase);
                break;
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| MirrorError::Cancelled)?;

            let Some(slot) = self
                .conversion
                .databases
                .get_mut(&database)
                .and_then(|db| db.tables.get_mut(&name))
            else {
                continue;
            };
            let table = std::mem::take(slot);
            let backup = table.clone();
            let task = work(self.session.clone(), database.clone(), table);

            let handle = tokio::spawn(async move {
                let table = task.await;
                drop(permit);
                table
            });
            spawned.push((database, name, backup));
            handles.push(handle);
        }

        for ((database, name, mut backup), joined) in spawned.into_iter().zip(join_all(handles).await) {
            let table = match joined {
                Ok(table) => table,
                Err(e) => {
                    error!("{}.{}: task panicked - {}", database, name, e);
                    backup.add_issue(Environment::Left, IssueCode::TaskAborted, format!("Task panicked: {e}"));
                    backup.mark_error();
                    backup
                }
            };
            if let Some(slot) = self
                .conversion
                .databases
                .get_mut(&database)
                .and_then(|db| db.tables.get_mut(&name))
            {
                *slot = table;
            }
        }
        Ok(())
    }

    /// Copy plans for every successfully migrated table with a location.
    fn distcp_plans(&self) -> BTreeMap<String, DistcpPlan> {
        let config = self.session.config();
        if !config.transfer.storage_migration.distcp {
            return BTreeMap::new();
        }
        let translator = self.session.translator();
        let mut planner = DistcpPlanner::new();
        for (db, table) in self.conversion.tables() {
            if table.phase != PhaseState::Success {
                continue;
            }
            let Some(left) = table.env(Environment::Left) else {
                continue;
            };
            let definition = left.parsed();
            let Some(source) = definition.location() else {
                continue;
            };
            let table_type = if definition.is_external() {
                TableType::External
            } else {
                TableType::Managed
            };
            if let Some(target) = translator.translate_table_location(&db.name, &table.name, table_type, &source) {
                planner.add(&db.name, &source, &target);
            }
        }
        let consolidation = translator.config().consolidation_level.max(0) as usize;
        planner
            .databases()
            .map(|db| (db.to_string(), planner.plan(db, consolidation)))
            .collect()
    }
}

/// Collect a database's tables and create its target database.
async fn setup_database(session: &Session, filter: &TableFilter, mut db: DBMirror) -> DBMirror {
    let config = session.config();
    let translator = session.translator();
    let target = translator.translate_database(&db.name);
    let locations = translator.database_locations(&db.name);
    db.translated_name = Some(target.clone());
    db.location = locations.location;
    db.managed_location = locations.managed_location;

    let statement = format!("SHOW TABLES IN {}", db.name);
    let left = session.client(Environment::Left);
    match session.bounded(&statement, left.list_tables(&db.name)).await {
        Ok(tables) => {
            info!("{}: found {} tables", db.name, tables.len());
            for name in tables {
                let accepted = filter.accepts(&name);
                if !accepted {
                    debug!("{}.{}: filtered", db.name, name);
                }
                let table = db.add_table(&name);
                if !accepted {
                    table.mark_removed("filtered");
                }
            }
        }
        Err(e) => {
            warn!("{}: cannot list tables - {}", db.name, e);
            db.add_issue(IssueCode::CollectingTables, e.to_string());
            return db;
        }
    }

    if !config.data_strategy.creates_databases() {
        return db;
    }

    db.sql.push(Pair::new("Creating Database", sql::create_database(&target)));
    if let Some(location) = &db.location {
        db.sql.push(Pair::new("Setting Database Location", sql::alter_db_location(&target, location)));
    }
    if let Some(location) = &db.managed_location {
        db.sql.push(Pair::new(
            "Setting Database Managed Location",
            sql::alter_db_managed_location(&target, location),
        ));
    }

    if config.execute {
        let side = if config.data_strategy.requires_right() {
            Environment::Right
        } else {
            Environment::Left
        };
        let client = session.client(side);
        let mut outcome = session
            .bounded(&db.sql[0].action, client.create_database(&target))
            .await;
        for pair in db.sql.iter().skip(1) {
            if outcome.is_err() {
                break;
            }
            outcome = session.execute(side, &pair.action).await;
        }
        if let Err(e) = outcome {
            warn!("{}: cannot create database {} - {}", db.name, target, e);
            db.add_issue(IssueCode::DatabaseCreation, e.to_string());
            for table in db.tables.values_mut().filter(|t| !t.removed) {
                table.mark_error();
            }
            return db;
        }
    }

    db.created_at = Some(Utc::now());
    db
}

/// Fetch what the strategies need to know about one table.
async fn collect_table(session: &Session, database: &str, mut table: TableMirror) -> TableMirror {
    table.metadata_started_at = Some(Utc::now());
    let left = session.client(Environment::Left);
    let statement = format!("SHOW CREATE TABLE {}.{}", database, table.name);

    let definition = match session.bounded(&statement, left.fetch_definition(database, &table.name)).await {
        Ok(Some(lines)) => session.fixer().normalize(lines),
        Ok(None) => {
            table.add_issue(Environment::Left, IssueCode::MetadataFetch, "table not found on LEFT");
            table.mark_error();
            return table;
        }
        Err(e) => {
            warn!("{}.{}: cannot fetch definition - {}", database, table.name, e);
            table.add_issue(Environment::Left, IssueCode::MetadataFetch, e.to_string());
            table.mark_error();
            return table;
        }
    };

    let parsed = TableDefinition::parse(&definition);
    {
        let env = table.env_mut(Environment::Left);
        env.exists = true;
        env.statistics = parsed.statistics();
        env.definition = definition;
    }

    if parsed.is_partitioned() {
        let statement = format!("SHOW PARTITIONS {}.{}", database, table.name);
        match session.bounded(&statement, left.list_partitions(database, &table.name)).await {
            Ok(partitions) => {
                table.env_mut(Environment::Left).partitions = partitions.into_iter().collect();
            }
            Err(e) => {
                warn!("{}.{}: cannot list partitions - {}", database, table.name, e);
                table.add_issue(Environment::Left, IssueCode::MetadataFetch, e.to_string());
                table.mark_error();
                return table;
            }
        }
    }

    if session.config().data_strategy.requires_right() {
        let translator = session.translator();
        let target_db = translator.translate_database(database);
        let target_table = translator.translate_table(database, &table.name);
        let statement = format!("SHOW CREATE TABLE {}.{}", target_db, target_table);
        let right = session.client(Environment::Right);
        match session.bounded(&statement, right.fetch_definition(&target_db, &target_table)).await {
            Ok(Some(lines)) => {
                let env = table.env_mut(Environment::Right);
                env.exists = true;
                env.definition = lines;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("{}.{}: cannot check RIGHT - {}", target_db, target_table, e);
                table.add_issue(Environment::Right, IssueCode::MetadataFetch, e.to_string());
                table.mark_error();
            }
        }
    }

    debug!(
        "{}.{}: metadata collected ({} partitions)",
        database,
        table.name,
        table.env(Environment::Left).map(|e| e.partitions.len()).unwrap_or(0)
    );
    table
}

fn collect_issues(conversion: &Conversion) -> Vec<String> {
    let mut issues = Vec::new();
    for db in conversion.databases.values() {
        issues.extend(db.issues.iter().map(|i| format!("{}: {}", db.name, i)));
        for table in db.tables.values() {
            issues.extend(
                table
                    .issues()
                    .into_iter()
                    .map(|i| format!("{}.{}: {}", db.name, table.name, i)),
            );
        }
    }
    issues
}
