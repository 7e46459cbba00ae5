//! Definition fixers.
//!
//! Some metastores report columnar tables with a delimited text row format
//! next to a columnar input format. The result cannot be recreated as-is, so
//! such definitions are rewritten to a plain `STORED AS <format>` before any
//! strategy sees them.

use super::SchemaFixer;
use crate::ddl::TableDefinition;
use crate::error::{MirrorError, Result};
use tracing::debug;

/// One named rewrite.
#[derive(Debug, Clone, Copy)]
pub struct Fixer {
    pub tag: &'static str,
    pub description: &'static str,
    applies: fn(&TableDefinition) -> bool,
    fix: fn(&TableDefinition) -> TableDefinition,
}

impl Fixer {
    pub fn applies(&self, definition: &TableDefinition) -> bool {
        (self.applies)(definition)
    }

    pub fn fix(&self, definition: &TableDefinition) -> TableDefinition {
        (self.fix)(definition)
    }
}

fn delimited_with_input(definition: &TableDefinition, input_class: &str) -> bool {
    let delimited = definition
        .row_format()
        .and_then(|lines| lines.first())
        .map(|l| l.to_ascii_uppercase().starts_with("ROW FORMAT DELIMITED"))
        .unwrap_or(false);
    delimited
        && definition
            .io_formats()
            .map(|(input, _)| input.ends_with(input_class))
            .unwrap_or(false)
}

/// Every known fixer, in application order.
pub const FIXERS: [Fixer; 3] = [
    Fixer {
        tag: "BAD_ORC_DEF",
        description: "ORC table declared with a delimited row format",
        applies: |d| delimited_with_input(d, "orc.OrcInputFormat"),
        fix: |d| d.with_stored_as("ORC"),
    },
    Fixer {
        tag: "BAD_PARQUET_DEF",
        description: "Parquet table declared with a delimited row format",
        applies: |d| delimited_with_input(d, "parquet.MapredParquetInputFormat"),
        fix: |d| d.with_stored_as("PARQUET"),
    },
    Fixer {
        tag: "BAD_RC_DEF",
        description: "RCFile table declared with a delimited row format",
        applies: |d| delimited_with_input(d, "RCFileInputFormat"),
        fix: |d| d.with_stored_as("RCFILE"),
    },
];

/// The fixers enabled for a run.
#[derive(Debug, Clone)]
pub struct FixerRegistry {
    enabled: Vec<Fixer>,
}

impl FixerRegistry {
    /// All known fixers.
    pub fn standard() -> Self {
        Self {
            enabled: FIXERS.to_vec(),
        }
    }

    /// Only the named fixers. Unknown tags are a configuration error.
    pub fn with_tags<S: AsRef<str>>(tags: &[S]) -> Result<Self> {
        let enabled = tags
            .iter()
            .map(|tag| {
                Self::lookup(tag.as_ref())
                    .ok_or_else(|| MirrorError::Config(format!("unknown fixer '{}'", tag.as_ref())))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { enabled })
    }

    pub fn lookup(tag: &str) -> Option<Fixer> {
        FIXERS.iter().find(|f| f.tag.eq_ignore_ascii_case(tag.trim())).copied()
    }

    pub fn tags(&self) -> Vec<&'static str> {
        self.enabled.iter().map(|f| f.tag).collect()
    }
}

impl SchemaFixer for FixerRegistry {
    fn normalize(&self, definition: Vec<String>) -> Vec<String> {
        let mut parsed = TableDefinition::parse(&definition);
        let mut changed = false;
        for fixer in &self.enabled {
            if fixer.applies(&parsed) {
                debug!("applying {} to {:?}", fixer.tag, parsed.table_name());
                parsed = fixer.fix(&parsed);
                changed = true;
            }
        }
        if changed {
            parsed.lines()
        } else {
            definition
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::tests::external_definition;

    fn bad_orc() -> Vec<String> {
        [
            "CREATE EXTERNAL TABLE `events`(",
            "  `id` int)",
            "ROW FORMAT DELIMITED ",
            "  FIELDS TERMINATED BY ',' ",
            "STORED AS INPUTFORMAT ",
            "  'org.apache.hadoop.hive.ql.io.orc.OrcInputFormat' ",
            "OUTPUTFORMAT ",
            "  'org.apache.hadoop.hive.ql.io.orc.OrcOutputFormat'",
            "LOCATION",
            "  'hdfs://LEFT/data/events'",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[test]
    fn test_bad_orc_rewritten() {
        let fixed = FixerRegistry::standard().normalize(bad_orc());
        let def = TableDefinition::parse(&fixed);
        assert!(def.row_format().is_none());
        assert!(fixed.contains(&"STORED AS ORC".to_string()));
        assert_eq!(def.location().as_deref(), Some("hdfs://LEFT/data/events"));
    }

    #[test]
    fn test_good_definition_untouched() {
        let lines = external_definition("t", "hdfs://LEFT/t");
        assert_eq!(FixerRegistry::standard().normalize(lines.clone()), lines);
    }

    #[test]
    fn test_disabled_fixer_is_skipped() {
        let registry = FixerRegistry::with_tags(&["BAD_PARQUET_DEF"]).unwrap();
        assert_eq!(registry.normalize(bad_orc()), bad_orc());
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = FixerRegistry::with_tags(&["BAD_AVRO_DEF"]).unwrap_err();
        assert!(matches!(err, MirrorError::Config(_)));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(FixerRegistry::lookup("bad_rc_def").map(|f| f.tag), Some("BAD_RC_DEF"));
    }
}
