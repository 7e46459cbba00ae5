//! Per-table strategy execution.

use super::decision::{select_strategy, Selection};
use super::steps::{steps_for, Step, StepInput, TablePlan};
use crate::error::MirrorError;
use crate::model::{Environment, PhaseState, TableMirror};
use crate::outcome::IssueCode;
use crate::session::Session;
use tracing::{debug, info, warn};

/// Resolve the strategy for one table and run its pipeline.
///
/// The table comes back in a terminal state unless it was already removed
/// before this phase, in which case it is returned untouched.
pub async fn migrate_table(session: &Session, database: &str, mut table: TableMirror) -> TableMirror {
    if table.removed || table.phase.is_terminal() {
        return table;
    }

    let plan = match TablePlan::new(session.translator(), session.config(), database, &table) {
        Ok(plan) => plan,
        Err(e) => {
            warn!("{}.{}: cannot plan migration - {}", database, table.name, e);
            table.add_issue(Environment::Left, IssueCode::MetadataFetch, e.to_string());
            table.mark_error();
            return table;
        }
    };

    match select_strategy(session.config(), &plan.shape()) {
        Selection::Rejected(reason) => {
            warn!("{}: removed - {}", plan.source_name(), reason);
            table.add_issue(Environment::Left, IssueCode::StrategyRejected, reason.clone());
            table.mark_removed(reason);
            table.mark_error();
        }
        Selection::Variant(variant) => {
            debug!("{}: running {}", plan.source_name(), variant);
            if plan.right_exists && variant.requires_right() {
                debug!("{}: already present on RIGHT", plan.target_name());
            }
            table.strategy = Some(variant);
            let steps = steps_for(variant, session.config());
            run_steps(session, &mut table, &plan, steps).await;
        }
    }
    table
}

/// Run `steps` in order, stopping at the first failure.
///
/// Every built statement is recorded on the step's audit environment before
/// it is sent, so a failed run still shows what was attempted. Statements
/// only reach a cluster when the run is executing and the step mutates.
/// Returns whether every step succeeded.
pub async fn run_steps(session: &Session, table: &mut TableMirror, plan: &TablePlan, steps: &[Step]) -> bool {
    table.phase.advance(PhaseState::Started);
    let execute = session.config().execute;

    for (idx, step) in steps.iter().enumerate() {
        let input = StepInput {
            plan,
            config: session.config(),
            translator: session.translator(),
        };
        let pairs = match (step.build)(&input) {
            Ok(pairs) => pairs,
            Err(e) => {
                fail(table, step, &e);
                return false;
            }
        };

        for pair in pairs {
            table.env_mut(step.audit).add_sql(pair.clone());
            if execute && step.mutating {
                if let Err(e) = session.execute(step.on, &pair.action).await {
                    fail(table, step, &e);
                    return false;
                }
            }
        }
        table.phase.advance(PhaseState::StepComplete(idx as u32 + 1));
    }

    table.mark_success();
    info!("{}: {} steps complete", plan.source_name(), steps.len());
    true
}

fn fail(table: &mut TableMirror, step: &Step, error: &MirrorError) {
    warn!("{}: step {} failed - {}", table.name, step.name, error);
    let message = match error {
        MirrorError::StepExecution { message, .. } => format!("{}: {}", step.name, message),
        other => format!("{}: {}", step.name, other),
    };
    table.add_issue(step.audit, IssueCode::StepFailed, message);
    table.mark_error();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{MemoryCluster, MemoryConnector};
    use crate::config::tests::valid_config;
    use crate::config::Config;
    use crate::ddl::tests::{acid_definition, external_definition};
    use crate::strategy::{DataStrategy, ACID_STRATEGY_REJECTED};
    use std::sync::Arc;

    async fn session_with(config: Config) -> (Session, Arc<MemoryCluster>, Arc<MemoryCluster>) {
        let left = Arc::new(MemoryCluster::new(Environment::Left));
        let right = Arc::new(MemoryCluster::new(Environment::Right));
        let connector = MemoryConnector::new()
            .with_cluster(Environment::Left, left.clone())
            .with_cluster(Environment::Right, right.clone());
        let session = Session::connect(config, &connector).await.unwrap();
        (session, left, right)
    }

    fn table(definition: Vec<String>) -> TableMirror {
        let mut table = TableMirror::new("web");
        let left = table.env_mut(Environment::Left);
        left.exists = true;
        left.definition = definition;
        table
    }

    #[tokio::test]
    async fn test_dry_run_records_without_executing() {
        let (session, left, right) = session_with(valid_config()).await;
        let done = migrate_table(&session, "sales", table(external_definition("web", "hdfs://LEFT/data/web"))).await;

        assert_eq!(done.phase, PhaseState::Success);
        assert_eq!(done.strategy, Some(DataStrategy::SchemaOnly));
        assert!(done.outcome.is_clean());
        assert_eq!(done.env(Environment::Right).unwrap().sql.len(), 2);
        assert!(left.executed().await.is_empty());
        assert!(right.executed().await.is_empty());
    }

    #[tokio::test]
    async fn test_execute_sends_statements_to_the_step_cluster() {
        let mut config = valid_config();
        config.execute = true;
        config.data_strategy = DataStrategy::ExportImport;
        let (session, left, right) = session_with(config).await;
        let done = migrate_table(&session, "sales", table(external_definition("web", "hdfs://LEFT/data/web"))).await;

        assert_eq!(done.phase, PhaseState::Success);
        let left_log = left.executed().await;
        assert_eq!(left_log.len(), 1);
        assert!(left_log[0].starts_with("EXPORT TABLE sales.web"));
        assert_eq!(right.executed().await.len(), 2);
    }

    #[tokio::test]
    async fn test_acid_table_removed_under_sql() {
        let mut config = valid_config();
        config.data_strategy = DataStrategy::Sql;
        let (session, _, _) = session_with(config).await;
        let done = migrate_table(&session, "tpcds", table(acid_definition())).await;

        assert!(done.removed);
        assert_eq!(done.remove_reason.as_deref(), Some(ACID_STRATEGY_REJECTED));
        assert_eq!(done.phase, PhaseState::Error);
        assert!(done.outcome.contains(IssueCode::StrategyRejected));
        assert!(done.env(Environment::Right).is_none());
    }

    #[tokio::test]
    async fn test_hybrid_acid_import_drops_small_buckets() {
        let mut config = valid_config();
        config.data_strategy = DataStrategy::Hybrid;
        let (session, _, _) = session_with(config.clone()).await;
        let done = migrate_table(&session, "tpcds", table(acid_definition())).await;

        assert_eq!(done.phase, PhaseState::Success);
        assert_eq!(done.strategy, Some(DataStrategy::ExportImport));
        let right: Vec<&str> = done.env(Environment::Right).unwrap().sql.iter().map(|p| p.action.as_str()).collect();
        assert_eq!(right.last(), Some(&"ALTER TABLE tpcds.web NOT CLUSTERED"));

        config.migrate_acid.bucket_threshold = 1;
        let (session, _, _) = session_with(config).await;
        let done = migrate_table(&session, "tpcds", table(acid_definition())).await;
        let right = &done.env(Environment::Right).unwrap().sql;
        assert!(!right.iter().any(|p| p.action.contains("NOT CLUSTERED")));
    }

    #[tokio::test]
    async fn test_failed_step_stops_pipeline() {
        let mut config = valid_config();
        config.execute = true;
        config.data_strategy = DataStrategy::Sql;
        let left = Arc::new(MemoryCluster::new(Environment::Left));
        let right = Arc::new(MemoryCluster::new(Environment::Right).fail_on("INSERT OVERWRITE"));
        let connector = MemoryConnector::new()
            .with_cluster(Environment::Left, left)
            .with_cluster(Environment::Right, right.clone());
        let session = Session::connect(config, &connector).await.unwrap();

        let done = migrate_table(&session, "sales", table(external_definition("web", "hdfs://LEFT/data/web"))).await;

        assert_eq!(done.phase, PhaseState::Error);
        assert!(done.outcome.contains(IssueCode::StepFailed));
        let issues = &done.env(Environment::Right).unwrap().issues;
        assert!(issues[0].starts_with("move-data: "), "{issues:?}");
        assert!(!right.executed().await.iter().any(|s| s.starts_with("DROP TABLE")));
    }

    #[tokio::test]
    async fn test_terminal_tables_are_left_alone() {
        let (session, _, _) = session_with(valid_config()).await;
        let mut removed = table(external_definition("web", "hdfs://LEFT/data/web"));
        removed.mark_removed("filtered");
        let done = migrate_table(&session, "sales", removed.clone()).await;
        assert_eq!(done, removed);
    }

    #[tokio::test]
    async fn test_missing_definition_is_metadata_issue() {
        let (session, _, _) = session_with(valid_config()).await;
        let done = migrate_table(&session, "sales", TableMirror::new("ghost")).await;
        assert_eq!(done.phase, PhaseState::Error);
        assert!(done.outcome.contains(IssueCode::MetadataFetch));
    }
}
