//! Step pipelines for each strategy variant.
//!
//! A [`Step`] names an action, the environment whose audit log records it,
//! the environment whose cluster runs it, and a pure build function that
//! turns a [`TablePlan`] into the statements to issue. Pipelines are plain
//! slices of steps; the runner does the rest.

use super::DataStrategy;
use crate::config::Config;
use crate::ddl::TableDefinition;
use crate::error::{MirrorError, Result};
use crate::model::{Environment, Pair, TableMirror};
use crate::translator::{location, TableType, Translator};
use std::collections::BTreeMap;

/// Hive statement templates.
pub mod sql {
    pub fn create_database(db: &str) -> String {
        format!("CREATE DATABASE IF NOT EXISTS {db}")
    }
    pub fn alter_db_location(db: &str, location: &str) -> String {
        format!("ALTER DATABASE {db} SET LOCATION \"{location}\"")
    }
    pub fn alter_db_managed_location(db: &str, location: &str) -> String {
        format!("ALTER DATABASE {db} SET MANAGEDLOCATION \"{location}\"")
    }
    pub fn use_db(db: &str) -> String {
        format!("USE {db}")
    }
    pub fn msck(table: &str) -> String {
        format!("MSCK REPAIR TABLE {table}")
    }
    pub fn drop_table(table: &str) -> String {
        format!("DROP TABLE IF EXISTS {table}")
    }
    pub fn rename_table(from: &str, to: &str) -> String {
        format!("ALTER TABLE {from} RENAME TO {to}")
    }
    pub fn export(table: &str, dir: &str) -> String {
        format!("EXPORT TABLE {table} TO \"{dir}\"")
    }
    pub fn import_external(table: &str, dir: &str, location: &str) -> String {
        format!("IMPORT EXTERNAL TABLE {table} FROM \"{dir}\" LOCATION \"{location}\"")
    }
    pub fn import(table: &str, dir: &str) -> String {
        format!("IMPORT TABLE {table} FROM \"{dir}\"")
    }
    pub fn not_clustered(table: &str) -> String {
        format!("ALTER TABLE {table} NOT CLUSTERED")
    }
    pub fn insert_overwrite(from: &str, to: &str, partition_columns: &[String]) -> String {
        if partition_columns.is_empty() {
            format!("FROM {from} INSERT OVERWRITE TABLE {to} SELECT *")
        } else {
            format!(
                "FROM {from} INSERT OVERWRITE TABLE {to} PARTITION ({}) SELECT *",
                partition_columns.join(", ")
            )
        }
    }
    pub fn create_like(table: &str, like: &str, location: &str) -> String {
        format!("CREATE EXTERNAL TABLE IF NOT EXISTS {table} LIKE {like} LOCATION \"{location}\"")
    }
    pub fn set_properties(table: &str, properties: &[(&str, String)]) -> String {
        let props: Vec<String> = properties
            .iter()
            .map(|(k, v)| format!("'{k}'='{v}'"))
            .collect();
        format!("ALTER TABLE {table} SET TBLPROPERTIES ({})", props.join(", "))
    }
    pub fn add_partitions(table: &str, partitions: &[(String, String)]) -> String {
        let specs: Vec<String> = partitions
            .iter()
            .map(|(spec, location)| format!("PARTITION ({spec}) LOCATION \"{location}\""))
            .collect();
        format!("ALTER TABLE {table} ADD IF NOT EXISTS\n{}", specs.join("\n"))
    }

    pub const DYNAMIC_PARTITION_MODE: &str = "SET hive.exec.dynamic.partition.mode=nonstrict";
    pub const ICEBERG_STORAGE_HANDLER: &str = "org.apache.iceberg.mr.hive.HiveIcebergStorageHandler";
}

/// Everything a step needs to know about one table, computed once before
/// the pipeline runs.
#[derive(Debug, Clone)]
pub struct TablePlan {
    pub database: String,
    pub table: String,
    pub target_database: String,
    pub target_table: String,
    /// Normalised LEFT definition.
    pub definition: TableDefinition,
    pub table_type: TableType,
    pub is_acid: bool,
    pub is_partitioned: bool,
    pub partition_columns: Vec<String>,
    /// LEFT partition spec to location.
    pub partitions: BTreeMap<String, String>,
    pub left_location: Option<String>,
    pub translated_location: Option<String>,
    pub left_namespace: String,
    pub right_exists: bool,
}

impl TablePlan {
    pub fn new(translator: &Translator, config: &Config, database: &str, table: &TableMirror) -> Result<Self> {
        let left = table
            .env(Environment::Left)
            .filter(|env| !env.definition.is_empty())
            .ok_or_else(|| {
                MirrorError::step(&table.name, "plan", "no LEFT definition was collected")
            })?;
        let definition = left.parsed();
        let table_type = if definition.is_external() {
            TableType::External
        } else {
            TableType::Managed
        };
        let left_location = definition.location();
        let translated_location = left_location.as_deref().and_then(|loc| {
            translator.translate_table_location(database, &table.name, table_type, loc)
        });

        Ok(Self {
            database: database.to_string(),
            table: table.name.clone(),
            target_database: translator.translate_database(database),
            target_table: translator.translate_table(database, &table.name),
            is_acid: definition.is_acid(),
            is_partitioned: definition.is_partitioned(),
            partition_columns: definition.partition_columns(),
            partitions: left.partitions.clone(),
            left_namespace: config.clusters.left.hcfs_namespace.clone(),
            right_exists: table.env(Environment::Right).map(|r| r.exists).unwrap_or(false),
            definition,
            table_type,
            left_location,
            translated_location,
        })
    }

    pub fn shape(&self) -> super::TableShape {
        super::TableShape {
            is_acid: self.is_acid,
            is_partitioned: self.is_partitioned,
            partition_count: self.partitions.len(),
        }
    }

    pub fn source_name(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }

    pub fn target_name(&self) -> String {
        format!("{}.{}", self.target_database, self.target_table)
    }

    fn fail(&self, step: &str, message: impl Into<String>) -> MirrorError {
        MirrorError::step(self.source_name(), step, message)
    }

    fn require_left_location(&self, step: &str) -> Result<&str> {
        self.left_location
            .as_deref()
            .ok_or_else(|| self.fail(step, "table has no LOCATION"))
    }

    fn require_translated_location(&self, step: &str) -> Result<&str> {
        self.translated_location
            .as_deref()
            .ok_or_else(|| self.fail(step, "target location could not be translated"))
    }
}

/// Inputs handed to a step's build function.
pub struct StepInput<'a> {
    pub plan: &'a TablePlan,
    pub config: &'a Config,
    pub translator: &'a Translator,
}

type BuildFn = fn(&StepInput<'_>) -> Result<Vec<Pair>>;

/// One named unit of a strategy pipeline.
#[derive(Clone, Copy)]
pub struct Step {
    pub name: &'static str,
    /// Audit log receiving the step's statements.
    pub audit: Environment,
    /// Cluster the statements run on.
    pub on: Environment,
    /// Whether the statements are sent to the cluster when executing.
    pub mutating: bool,
    pub build: BuildFn,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("audit", &self.audit)
            .field("on", &self.on)
            .field("mutating", &self.mutating)
            .finish()
    }
}

const fn step(name: &'static str, audit: Environment, on: Environment, build: BuildFn) -> Step {
    Step {
        name,
        audit,
        on,
        mutating: true,
        build,
    }
}

use Environment::{Left, Right, Shadow, Transfer};

const SCHEMA_ONLY: &[Step] = &[
    step("build-schema", Right, Right, build_schema_relative),
    step("partition-maintenance", Right, Right, partition_maintenance_relative),
];

const LINKED: &[Step] = &[
    step("build-schema", Right, Right, build_schema_linked),
    step("partition-maintenance", Right, Right, partition_maintenance_linked),
];

const SQL: &[Step] = &[
    step("build-schema", Right, Right, build_schema_translated),
    step("build-shadow-table", Shadow, Right, build_shadow_on_left_data),
    step("partition-discovery", Shadow, Right, discover_shadow_partitions),
    step("move-data", Right, Right, move_shadow_to_final),
    step("retire-shadow", Shadow, Right, drop_shadow),
];

const EXPORT_IMPORT: &[Step] = &[
    step("export", Left, Left, export_table),
    step("import", Right, Right, import_table),
    step("bucket-maintenance", Right, Right, drop_small_buckets),
];

const STORAGE_MIGRATION: &[Step] = &[
    step("build-transfer-table", Transfer, Left, build_relocated_transfer),
    step("move-data", Transfer, Left, move_to_relocated_transfer),
];

const STORAGE_MIGRATION_IN_PLACE: &[Step] = &[
    step("archive-table", Left, Left, archive_original),
    step("build-schema", Left, Left, build_relocated_original),
    step("move-data", Left, Left, restore_from_archive),
];

const INTERMEDIATE: &[Step] = &[
    step("build-transfer-table", Transfer, Left, build_intermediate_transfer),
    step("move-data-to-transfer", Transfer, Left, move_to_intermediate_transfer),
    step("build-shadow-table", Shadow, Right, build_shadow_on_intermediate),
    step("build-schema", Right, Right, build_schema_translated),
    step("partition-discovery", Shadow, Right, discover_shadow_partitions),
    step("move-data", Right, Right, move_shadow_to_final),
    step("retire-shadow", Shadow, Right, drop_shadow),
    step("retire-transfer", Transfer, Left, drop_intermediate_transfer),
];

const ICEBERG_CONVERSION: &[Step] = &[step("convert-to-iceberg", Left, Left, convert_to_iceberg)];

const DUMP: &[Step] = &[Step {
    name: "dump-definition",
    audit: Left,
    on: Left,
    mutating: false,
    build: dump_definition,
}];

/// Pipeline for a resolved variant. `Hybrid` never reaches execution; it
/// resolves to `Sql` or `ExportImport` first.
pub fn steps_for(variant: DataStrategy, config: &Config) -> &'static [Step] {
    match variant {
        DataStrategy::SchemaOnly => SCHEMA_ONLY,
        DataStrategy::Linked | DataStrategy::Common => LINKED,
        DataStrategy::Sql | DataStrategy::Hybrid => SQL,
        DataStrategy::ExportImport => EXPORT_IMPORT,
        DataStrategy::StorageMigration if config.transfer.storage_migration.in_place => {
            STORAGE_MIGRATION_IN_PLACE
        }
        DataStrategy::StorageMigration => STORAGE_MIGRATION,
        DataStrategy::Intermediate => INTERMEDIATE,
        DataStrategy::IcebergConversion => ICEBERG_CONVERSION,
        DataStrategy::Dump => DUMP,
    }
}

// ---- shared pieces ----------------------------------------------------------

fn shadow_name(input: &StepInput<'_>) -> String {
    format!(
        "{}.{}{}",
        input.plan.target_database, input.config.transfer.shadow_prefix, input.plan.target_table
    )
}

fn transfer_name(input: &StepInput<'_>) -> String {
    format!(
        "{}.{}{}",
        input.plan.database, input.config.transfer.transfer_prefix, input.plan.table
    )
}

fn archive_name(plan: &TablePlan) -> String {
    format!("{}.{}_archive", plan.database, plan.table)
}

/// LEFT definition renamed, made external and pointed at `location`.
fn external_definition(input: &StepInput<'_>, name: &str, location: &str, purge: bool) -> TableDefinition {
    input
        .plan
        .definition
        .with_table_name(name)
        .to_external(purge)
        .with_location(location)
        .with_if_not_exists()
}

fn create_pairs(description: &str, database: &str, def: &TableDefinition) -> Vec<Pair> {
    vec![
        Pair::new("Selecting Database", sql::use_db(database)),
        Pair::new(description, def.to_sql()),
    ]
}

/// `MSCK`, or explicit partitions rebased onto `table_location`.
fn partition_pairs(input: &StepInput<'_>, table: &str, table_location: &str) -> Vec<Pair> {
    let plan = input.plan;
    if !plan.is_partitioned {
        return Vec::new();
    }
    if input.config.evaluate_partition_location && !plan.partitions.is_empty() {
        let left_location = plan.left_location.as_deref().unwrap_or(table_location);
        let partitions: Vec<(String, String)> = plan
            .partitions
            .iter()
            .filter_map(|(spec, location)| {
                input
                    .translator
                    .translate_partition_location(
                        &plan.database,
                        plan.table_type,
                        left_location,
                        table_location,
                        location,
                    )
                    .map(|translated| (partition_spec(spec), translated))
            })
            .collect();
        if !partitions.is_empty() {
            return vec![Pair::new("Adding Partitions", sql::add_partitions(table, &partitions))];
        }
    }
    vec![Pair::new("Repairing Table (MSCK)", sql::msck(table))]
}

/// `dt=2024-01-01/region=us` to `dt='2024-01-01', region='us'`.
pub fn partition_spec(path_spec: &str) -> String {
    path_spec
        .split('/')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, value)) => format!("{key}='{value}'"),
            None => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn quoted(db: &str, table: &str) -> String {
    format!("`{db}`.`{table}`")
}

fn relative_location(input: &StepInput<'_>) -> Result<String> {
    let left = input.plan.require_left_location("build-schema")?;
    Ok(location::replace_namespace(left, input.translator.target_namespace()))
}

// ---- SCHEMA_ONLY / LINKED ---------------------------------------------------

fn build_schema_relative(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    let plan = input.plan;
    let location = relative_location(input)?;
    let purge = !plan.definition.is_external();
    let def = external_definition(input, &quoted(&plan.target_database, &plan.target_table), &location, purge);
    Ok(create_pairs("Creating Table", &plan.target_database, &def))
}

fn partition_maintenance_relative(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    let location = relative_location(input)?;
    Ok(partition_pairs(input, &input.plan.target_name(), &location))
}

fn build_schema_linked(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    let plan = input.plan;
    let location = plan.require_left_location("build-schema")?;
    let def = external_definition(input, &quoted(&plan.target_database, &plan.target_table), location, false);
    Ok(create_pairs("Creating Table", &plan.target_database, &def))
}

fn partition_maintenance_linked(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    let location = input.plan.require_left_location("partition-maintenance")?;
    Ok(partition_pairs(input, &input.plan.target_name(), location))
}

// ---- SQL / INTERMEDIATE -----------------------------------------------------

fn build_schema_translated(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    let plan = input.plan;
    let location = plan.require_translated_location("build-schema")?;
    let purge = !plan.definition.is_external();
    let def = external_definition(input, &quoted(&plan.target_database, &plan.target_table), location, purge);
    Ok(create_pairs("Creating Table", &plan.target_database, &def))
}

fn build_shadow_on_left_data(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    let plan = input.plan;
    let location = plan.require_left_location("build-shadow-table")?;
    let name = format!("{}{}", input.config.transfer.shadow_prefix, plan.target_table);
    let def = external_definition(input, &quoted(&plan.target_database, &name), location, false);
    Ok(create_pairs("Creating Shadow Table", &plan.target_database, &def))
}

fn discover_shadow_partitions(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    if !input.plan.is_partitioned {
        return Ok(Vec::new());
    }
    Ok(vec![Pair::new("Repairing Table (MSCK)", sql::msck(&shadow_name(input)))])
}

fn move_shadow_to_final(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    let plan = input.plan;
    let mut pairs = Vec::new();
    if plan.is_partitioned {
        pairs.push(Pair::new("Setting Dynamic Partition Mode", sql::DYNAMIC_PARTITION_MODE));
    }
    pairs.push(Pair::new(
        "Loading table from Shadow",
        sql::insert_overwrite(&shadow_name(input), &plan.target_name(), &plan.partition_columns),
    ));
    Ok(pairs)
}

fn drop_shadow(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    Ok(vec![Pair::new("Dropping Shadow Table", sql::drop_table(&shadow_name(input)))])
}

fn intermediate_location(input: &StepInput<'_>) -> Result<String> {
    let base = input
        .config
        .transfer
        .intermediate_storage
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| input.plan.fail("intermediate", "transfer.intermediate_storage is not set"))?;
    Ok(format!(
        "{}/{}/{}",
        base.trim_end_matches('/'),
        input.plan.database,
        input.plan.table
    ))
}

fn build_intermediate_transfer(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    let location = intermediate_location(input)?;
    Ok(vec![Pair::new(
        "Creating Transfer Table",
        sql::create_like(&transfer_name(input), &input.plan.source_name(), &location),
    )])
}

fn move_to_intermediate_transfer(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    let plan = input.plan;
    let mut pairs = Vec::new();
    if plan.is_partitioned {
        pairs.push(Pair::new("Setting Dynamic Partition Mode", sql::DYNAMIC_PARTITION_MODE));
    }
    pairs.push(Pair::new(
        "Moving data to transfer table",
        sql::insert_overwrite(&plan.source_name(), &transfer_name(input), &plan.partition_columns),
    ));
    Ok(pairs)
}

fn build_shadow_on_intermediate(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    let plan = input.plan;
    let location = intermediate_location(input)?;
    let name = format!("{}{}", input.config.transfer.shadow_prefix, plan.target_table);
    let def = external_definition(input, &quoted(&plan.target_database, &name), &location, false);
    Ok(create_pairs("Creating Shadow Table", &plan.target_database, &def))
}

fn drop_intermediate_transfer(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    Ok(vec![Pair::new("Dropping Transfer Table", sql::drop_table(&transfer_name(input)))])
}

// ---- EXPORT_IMPORT ----------------------------------------------------------

fn export_dir(input: &StepInput<'_>) -> String {
    let prefix = location::normalize_path(&input.config.transfer.export_base_dir_prefix);
    location::join_namespace(
        &input.plan.left_namespace,
        &format!("{}{}/{}", prefix, input.plan.database, input.plan.table),
    )
}

fn export_table(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    Ok(vec![Pair::new(
        "EXPORT Table",
        sql::export(&input.plan.source_name(), &export_dir(input)),
    )])
}

fn import_table(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    let plan = input.plan;
    let dir = export_dir(input);
    let statement = if plan.is_acid && !input.translator.config().force_external_location {
        sql::import(&plan.target_name(), &dir)
    } else {
        sql::import_external(&plan.target_name(), &dir, plan.require_translated_location("import")?)
    };
    Ok(vec![
        Pair::new("Selecting Database", sql::use_db(&plan.target_database)),
        Pair::new("IMPORT Table", statement),
    ])
}

/// Imported ACID tables at or below the bucket threshold lose their bucketing.
fn drop_small_buckets(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    let plan = input.plan;
    match plan.definition.bucket_count() {
        Some(buckets) if plan.is_acid && buckets <= input.config.migrate_acid.bucket_threshold => Ok(vec![
            Pair::new("Removing Buckets", sql::not_clustered(&plan.target_name())),
        ]),
        _ => Ok(Vec::new()),
    }
}

// ---- STORAGE_MIGRATION ------------------------------------------------------

fn relocated_location<'a>(input: &'a StepInput<'_>, step: &str) -> Result<&'a str> {
    let plan = input.plan;
    let translated = plan.require_translated_location(step)?;
    let original = plan.require_left_location(step)?;
    if translated.trim_end_matches('/') == original.trim_end_matches('/') {
        return Err(plan.fail(
            step,
            "Location Mapping can't be determined. No matching location map entry and the namespace is unchanged.",
        ));
    }
    Ok(translated)
}

fn build_relocated_transfer(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    let plan = input.plan;
    let location = relocated_location(input, "build-transfer-table")?;
    let name = format!("{}{}", input.config.transfer.transfer_prefix, plan.table);
    let def = external_definition(input, &quoted(&plan.database, &name), location, true);
    Ok(create_pairs("Creating Transfer Table", &plan.database, &def))
}

fn move_to_relocated_transfer(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    let plan = input.plan;
    let mut pairs = Vec::new();
    if plan.is_partitioned {
        pairs.push(Pair::new("Setting Dynamic Partition Mode", sql::DYNAMIC_PARTITION_MODE));
    }
    pairs.push(Pair::new(
        "Moving data to transfer table",
        sql::insert_overwrite(&plan.source_name(), &transfer_name(input), &plan.partition_columns),
    ));
    Ok(pairs)
}

fn archive_original(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    relocated_location(input, "archive-table")?;
    let plan = input.plan;
    Ok(vec![Pair::new(
        "RENAME Table",
        sql::rename_table(&plan.source_name(), &archive_name(plan)),
    )])
}

fn build_relocated_original(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    let plan = input.plan;
    let location = relocated_location(input, "build-schema")?;
    let def = external_definition(input, &quoted(&plan.database, &plan.table), location, true);
    Ok(create_pairs("Creating Table", &plan.database, &def))
}

fn restore_from_archive(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    let plan = input.plan;
    let mut pairs = Vec::new();
    if plan.is_partitioned {
        pairs.push(Pair::new("Setting Dynamic Partition Mode", sql::DYNAMIC_PARTITION_MODE));
    }
    pairs.push(Pair::new(
        "Moving data to new table",
        sql::insert_overwrite(&archive_name(plan), &plan.source_name(), &plan.partition_columns),
    ));
    Ok(pairs)
}

// ---- ICEBERG_CONVERSION / DUMP ----------------------------------------------

fn convert_to_iceberg(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    let plan = input.plan;
    if plan.is_acid || !plan.definition.is_external() {
        return Err(plan.fail(
            "convert-to-iceberg",
            "Iceberg conversion requires an external, non-transactional table",
        ));
    }
    let properties = [
        ("storage_handler", sql::ICEBERG_STORAGE_HANDLER.to_string()),
        ("format-version", input.config.iceberg.version.to_string()),
    ];
    Ok(vec![Pair::new(
        "Converting to Iceberg",
        sql::set_properties(&plan.source_name(), &properties),
    )])
}

fn dump_definition(input: &StepInput<'_>) -> Result<Vec<Pair>> {
    Ok(vec![Pair::new("Table Definition", input.plan.definition.to_sql())])
}
