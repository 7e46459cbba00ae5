//! Table definitions as typed sections.
//!
//! `SHOW CREATE TABLE` output is kept as an ordered sequence of sections
//! (header, columns, partitioning, bucketing, row format, storage,
//! location, properties). Sections that are never rewritten keep their
//! original lines, so an untouched definition renders back byte-for-byte.
//! All rewrites return a new definition.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TABLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\s*CREATE\s+(?:(?:EXTERNAL|TEMPORARY|TRANSACTIONAL)\s+)*TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?)((?:`[^`]+`|[\w$]+)(?:\.(?:`[^`]+`|[\w$]+))?)")
        .expect("table name pattern is valid")
});

static BUCKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)INTO\s+(\d+)\s+BUCKETS").expect("bucket pattern is valid"));

static PROPERTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'((?:[^'\\]|\\.)*)'\s*=\s*'((?:[^'\\]|\\.)*)'").expect("property pattern is valid")
});

/// Kind of a definition section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionKind {
    Header,
    Columns,
    Comment,
    PartitionedBy,
    ClusteredBy,
    SkewedBy,
    RowFormat,
    StoredAs,
    Location,
    TblProperties,
    Other,
}

impl SectionKind {
    /// Section opened by a line. Top-level clauses start in column 0;
    /// indented lines always continue the current section.
    fn opened_by(line: &str) -> Option<SectionKind> {
        if line.starts_with(char::is_whitespace) {
            return None;
        }
        let upper = line.to_ascii_uppercase();
        let kind = if upper.starts_with("CREATE ") {
            SectionKind::Header
        } else if upper.starts_with("COMMENT") {
            SectionKind::Comment
        } else if upper.starts_with("PARTITIONED BY") {
            SectionKind::PartitionedBy
        } else if upper.starts_with("CLUSTERED BY") {
            SectionKind::ClusteredBy
        } else if upper.starts_with("SKEWED BY") {
            SectionKind::SkewedBy
        } else if upper.starts_with("ROW FORMAT") {
            SectionKind::RowFormat
        } else if upper.starts_with("STORED AS") || upper.starts_with("STORED BY") {
            SectionKind::StoredAs
        } else if upper.starts_with("LOCATION") {
            SectionKind::Location
        } else if upper.starts_with("TBLPROPERTIES") {
            SectionKind::TblProperties
        } else {
            return None;
        };
        Some(kind)
    }
}

/// One contiguous block of definition lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub lines: Vec<String>,
}

impl Section {
    fn new(kind: SectionKind, lines: Vec<String>) -> Self {
        Self { kind, lines }
    }
}

/// Ordered sequence of typed sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    sections: Vec<Section>,
}

impl TableDefinition {
    /// Split definition lines into sections.
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut sections: Vec<Section> = Vec::new();

        for line in lines {
            let line = line.as_ref().to_string();
            match SectionKind::opened_by(&line) {
                Some(kind) => sections.push(Section::new(kind, vec![line])),
                None => match sections.last_mut() {
                    Some(last) if last.kind == SectionKind::Header => {
                        sections.push(Section::new(SectionKind::Columns, vec![line]))
                    }
                    Some(last) => last.lines.push(line),
                    None => sections.push(Section::new(SectionKind::Other, vec![line])),
                },
            }
        }

        Self { sections }
    }

    /// Render back to lines.
    pub fn lines(&self) -> Vec<String> {
        self.sections.iter().flat_map(|s| s.lines.iter().cloned()).collect()
    }

    /// Render as a single statement.
    pub fn to_sql(&self) -> String {
        self.lines().join("\n")
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    fn header(&self) -> Option<&str> {
        self.section(SectionKind::Header)
            .and_then(|s| s.lines.first())
            .map(String::as_str)
    }

    // ---- inspection -------------------------------------------------------

    /// Table identifier as written in the header, backticks removed.
    pub fn table_name(&self) -> Option<String> {
        let header = self.header()?;
        TABLE_NAME
            .captures(header)
            .map(|c| c[2].replace('`', ""))
    }

    /// Storage location with quotes removed.
    pub fn location(&self) -> Option<String> {
        let section = self.section(SectionKind::Location)?;
        let joined = section.lines.join(" ");
        let value = joined.trim_start()[("LOCATION".len())..].trim();
        let value = value.trim_matches(|c| c == '\'' || c == '"').trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    pub fn is_external(&self) -> bool {
        self.header()
            .map(|h| h.to_ascii_uppercase().contains("EXTERNAL TABLE"))
            .unwrap_or(false)
    }

    pub fn is_partitioned(&self) -> bool {
        self.section(SectionKind::PartitionedBy).is_some()
    }

    /// Managed table with `'transactional'='true'`.
    pub fn is_acid(&self) -> bool {
        !self.is_external()
            && self
                .property("transactional")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
    }

    /// Partition column names, in declaration order.
    pub fn partition_columns(&self) -> Vec<String> {
        let Some(section) = self.section(SectionKind::PartitionedBy) else {
            return Vec::new();
        };
        section
            .lines
            .iter()
            .flat_map(|line| line.split(", "))
            .filter_map(|chunk| {
                let chunk = match chunk.find('(') {
                    Some(idx) if chunk.to_ascii_uppercase().starts_with("PARTITIONED BY") => &chunk[idx + 1..],
                    _ => chunk,
                };
                let chunk = chunk.trim_start();
                let rest = chunk.strip_prefix('`')?;
                rest.find('`').map(|end| rest[..end].to_string())
            })
            .collect()
    }

    /// Declared bucket count.
    pub fn bucket_count(&self) -> Option<u32> {
        let section = self.section(SectionKind::ClusteredBy)?;
        section
            .lines
            .iter()
            .find_map(|l| BUCKETS.captures(l))
            .and_then(|c| c[1].parse().ok())
    }

    /// Table properties in declaration order.
    pub fn properties(&self) -> Vec<(String, String)> {
        self.section(SectionKind::TblProperties)
            .map(|s| {
                s.lines
                    .iter()
                    .flat_map(|l| PROPERTY.captures_iter(l))
                    .map(|c| (c[1].to_string(), c[2].to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn property(&self, key: &str) -> Option<String> {
        self.properties()
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// Statistics derived from the stats table properties.
    pub fn statistics(&self) -> crate::model::Statistics {
        let number = |key: &str| self.property(key).and_then(|v| v.parse::<u64>().ok());
        let file_count = number("numFiles");
        let data_size = number("totalSize");
        let avg_file_size = match (file_count, data_size) {
            (Some(files), Some(size)) if files > 0 => Some(size as f64 / files as f64),
            _ => None,
        };
        crate::model::Statistics {
            file_count,
            data_size,
            row_count: number("numRows"),
            avg_file_size,
        }
    }

    // ---- rewrites ---------------------------------------------------------

    /// Replace the table identifier, e.g. with `` `db`.`table` ``.
    pub fn with_table_name(&self, qualified: &str) -> Self {
        let mut next = self.clone();
        if let Some(section) = next.sections.iter_mut().find(|s| s.kind == SectionKind::Header) {
            if let Some(first) = section.lines.first_mut() {
                *first = TABLE_NAME
                    .replace(first, |c: &regex::Captures<'_>| format!("{}{}", &c[1], qualified))
                    .into_owned();
            }
        }
        next
    }

    /// Add `IF NOT EXISTS` to the header when missing.
    pub fn with_if_not_exists(&self) -> Self {
        let mut next = self.clone();
        if let Some(section) = next.sections.iter_mut().find(|s| s.kind == SectionKind::Header) {
            if let Some(first) = section.lines.first_mut() {
                if !first.to_ascii_uppercase().contains("IF NOT EXISTS") {
                    *first = replace_keyword(first, "TABLE ", "TABLE IF NOT EXISTS ");
                }
            }
        }
        next
    }

    /// Set the storage location, adding the section when absent.
    pub fn with_location(&self, location: &str) -> Self {
        let section = Section::new(
            SectionKind::Location,
            vec!["LOCATION".to_string(), format!("  '{location}'")],
        );
        self.replace_or_insert(section, SectionKind::TblProperties)
    }

    pub fn without_location(&self) -> Self {
        self.without(SectionKind::Location)
    }

    /// Make the table external, dropping transactional properties.
    pub fn to_external(&self, purge: bool) -> Self {
        let mut next = self
            .without_property("transactional")
            .without_property("transactional_properties");
        if !next.is_external() {
            if let Some(section) = next.sections.iter_mut().find(|s| s.kind == SectionKind::Header) {
                if let Some(first) = section.lines.first_mut() {
                    *first = replace_keyword(first, "CREATE TABLE", "CREATE EXTERNAL TABLE");
                }
            }
        }
        if purge {
            next = next.with_property("external.table.purge", "true");
        }
        next
    }

    /// Add or replace a table property.
    pub fn with_property(&self, key: &str, value: &str) -> Self {
        let mut properties = self.properties();
        match properties.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some(existing) => existing.1 = value.to_string(),
            None => properties.push((key.to_string(), value.to_string())),
        }
        self.with_properties(&properties)
    }

    /// Remove a table property. The section goes away with its last entry.
    pub fn without_property(&self, key: &str) -> Self {
        let properties = self.properties();
        if !properties.iter().any(|(k, _)| k.eq_ignore_ascii_case(key)) {
            return self.clone();
        }
        let remaining: Vec<_> = properties
            .into_iter()
            .filter(|(k, _)| !k.eq_ignore_ascii_case(key))
            .collect();
        if remaining.is_empty() {
            self.without(SectionKind::TblProperties)
        } else {
            self.with_properties(&remaining)
        }
    }

    /// Replace row format and storage sections with `STORED AS <format>`.
    pub fn with_stored_as(&self, format: &str) -> Self {
        let mut next = self.without(SectionKind::RowFormat);
        let section = Section::new(SectionKind::StoredAs, vec![format!("STORED AS {format}")]);
        next = next.replace_or_insert(section, SectionKind::Location);
        next
    }

    /// Row format lines, if declared.
    pub fn row_format(&self) -> Option<&[String]> {
        self.section(SectionKind::RowFormat).map(|s| s.lines.as_slice())
    }

    /// Input and output format classes, quotes removed.
    pub fn io_formats(&self) -> Option<(String, String)> {
        let section = self.section(SectionKind::StoredAs)?;
        let mut input = None;
        let mut output = None;
        let mut lines = section.lines.iter().peekable();
        while let Some(line) = lines.next() {
            let upper = line.trim().to_ascii_uppercase();
            let slot = if upper.starts_with("STORED AS INPUTFORMAT") {
                &mut input
            } else if upper.starts_with("OUTPUTFORMAT") {
                &mut output
            } else {
                continue;
            };
            if let Some(value) = lines.peek() {
                *slot = Some(value.trim().trim_matches('\'').to_string());
            }
        }
        input.zip(output)
    }

    fn with_properties(&self, properties: &[(String, String)]) -> Self {
        let mut lines = vec!["TBLPROPERTIES (".to_string()];
        let last = properties.len().saturating_sub(1);
        for (idx, (key, value)) in properties.iter().enumerate() {
            let tail = if idx == last { ")" } else { ", " };
            lines.push(format!("  '{key}'='{value}'{tail}"));
        }
        self.replace_or_insert(Section::new(SectionKind::TblProperties, lines), SectionKind::Other)
    }

    fn without(&self, kind: SectionKind) -> Self {
        Self {
            sections: self
                .sections
                .iter()
                .filter(|s| s.kind != kind)
                .cloned()
                .collect(),
        }
    }

    /// Replace the section of the same kind, or insert it before `before`
    /// (appending when that is absent too).
    fn replace_or_insert(&self, section: Section, before: SectionKind) -> Self {
        let mut next = self.clone();
        if let Some(existing) = next.sections.iter_mut().find(|s| s.kind == section.kind) {
            *existing = section;
            return next;
        }
        match next.sections.iter().position(|s| s.kind == before) {
            Some(idx) => next.sections.insert(idx, section),
            None => next.sections.push(section),
        }
        next
    }
}

fn replace_keyword(line: &str, from: &str, to: &str) -> String {
    let upper = line.to_ascii_uppercase();
    match upper.find(from) {
        Some(idx) => format!("{}{}{}", &line[..idx], to, &line[idx + from.len()..]),
        None => line.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) fn acid_definition() -> Vec<String> {
        [
            "CREATE TABLE `web_sales`(",
            "  `ws_item_sk` int, ",
            "  `ws_net_paid` decimal(7,2))",
            "PARTITIONED BY ( ",
            "  `ws_sold_date_sk` int, ",
            "  `ws_region` string)",
            "CLUSTERED BY ( ",
            "  ws_item_sk) ",
            "INTO 2 BUCKETS",
            "ROW FORMAT SERDE ",
            "  'org.apache.hadoop.hive.ql.io.orc.OrcSerde' ",
            "STORED AS INPUTFORMAT ",
            "  'org.apache.hadoop.hive.ql.io.orc.OrcInputFormat' ",
            "OUTPUTFORMAT ",
            "  'org.apache.hadoop.hive.ql.io.orc.OrcOutputFormat'",
            "LOCATION",
            "  'hdfs://LEFT/warehouse/tablespace/managed/hive/tpcds.db/web_sales'",
            "TBLPROPERTIES (",
            "  'bucketing_version'='2', ",
            "  'transactional'='true', ",
            "  'transactional_properties'='default', ",
            "  'numFiles'='4', ",
            "  'totalSize'='4096', ",
            "  'transient_lastDdlTime'='1623456789')",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub(crate) fn external_definition(name: &str, location: &str) -> Vec<String> {
        vec![
            format!("CREATE EXTERNAL TABLE `{name}`("),
            "  `id` int, ".to_string(),
            "  `name` string)".to_string(),
            "ROW FORMAT SERDE ".to_string(),
            "  'org.apache.hadoop.hive.serde2.lazy.LazySimpleSerDe' ".to_string(),
            "STORED AS INPUTFORMAT ".to_string(),
            "  'org.apache.hadoop.mapred.TextInputFormat' ".to_string(),
            "OUTPUTFORMAT ".to_string(),
            "  'org.apache.hadoop.hive.ql.io.HiveIgnoreKeyTextOutputFormat'".to_string(),
            "LOCATION".to_string(),
            format!("  '{location}'"),
            "TBLPROPERTIES (".to_string(),
            "  'transient_lastDdlTime'='1623456789')".to_string(),
        ]
    }

    #[test]
    fn test_round_trip_is_byte_for_byte() {
        let lines = acid_definition();
        assert_eq!(TableDefinition::parse(&lines).lines(), lines);
    }

    #[test]
    fn test_section_layout() {
        let def = TableDefinition::parse(&acid_definition());
        let kinds: Vec<_> = def.sections().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SectionKind::Header,
                SectionKind::Columns,
                SectionKind::PartitionedBy,
                SectionKind::ClusteredBy,
                SectionKind::RowFormat,
                SectionKind::StoredAs,
                SectionKind::Location,
                SectionKind::TblProperties,
            ]
        );
    }

    #[test]
    fn test_markers() {
        let def = TableDefinition::parse(&acid_definition());
        assert!(def.is_acid());
        assert!(!def.is_external());
        assert!(def.is_partitioned());
        assert_eq!(def.table_name().as_deref(), Some("web_sales"));
        assert_eq!(def.bucket_count(), Some(2));
        assert_eq!(def.partition_columns(), vec!["ws_sold_date_sk", "ws_region"]);
        assert_eq!(
            def.location().as_deref(),
            Some("hdfs://LEFT/warehouse/tablespace/managed/hive/tpcds.db/web_sales")
        );
        assert_eq!(def.property("TRANSACTIONAL").as_deref(), Some("true"));
        assert_eq!(
            def.io_formats().map(|(i, _)| i).as_deref(),
            Some("org.apache.hadoop.hive.ql.io.orc.OrcInputFormat")
        );
    }

    #[test]
    fn test_external_is_not_acid() {
        let def = TableDefinition::parse(&external_definition("t", "hdfs://LEFT/x/t"));
        assert!(def.is_external());
        assert!(!def.is_acid());
        assert!(!def.is_partitioned());
        assert!(def.partition_columns().is_empty());
        assert_eq!(def.bucket_count(), None);
    }

    #[test]
    fn test_with_table_name_and_location() {
        let def = TableDefinition::parse(&external_definition("t", "hdfs://LEFT/x/t"))
            .with_table_name("`db2`.`t2`")
            .with_location("hdfs://RIGHT/db2.db/t2");
        let lines = def.lines();
        assert_eq!(lines[0], "CREATE EXTERNAL TABLE `db2`.`t2`(");
        assert_eq!(def.table_name().as_deref(), Some("db2.t2"));
        assert_eq!(def.location().as_deref(), Some("hdfs://RIGHT/db2.db/t2"));
    }

    #[test]
    fn test_location_inserted_before_properties() {
        let def = TableDefinition::parse(&external_definition("t", "hdfs://LEFT/x/t")).without_location();
        assert_eq!(def.location(), None);
        let def = def.with_location("hdfs://RIGHT/t");
        let kinds: Vec<_> = def.sections().iter().map(|s| s.kind).collect();
        let loc = kinds.iter().position(|k| *k == SectionKind::Location).unwrap();
        let props = kinds.iter().position(|k| *k == SectionKind::TblProperties).unwrap();
        assert!(loc < props);
    }

    #[test]
    fn test_remove_last_property_fixes_trailing_comma() {
        let def = TableDefinition::parse(&acid_definition()).without_property("transient_lastDdlTime");
        let lines = def.lines();
        assert_eq!(lines.last().map(String::as_str), Some("  'totalSize'='4096')"));
        assert!(lines.contains(&"  'numFiles'='4', ".to_string()));
    }

    #[test]
    fn test_remove_only_property_drops_section() {
        let def = TableDefinition::parse(&external_definition("t", "hdfs://LEFT/x/t"))
            .without_property("transient_lastDdlTime");
        assert!(def.sections().iter().all(|s| s.kind != SectionKind::TblProperties));
    }

    #[test]
    fn test_to_external() {
        let def = TableDefinition::parse(&acid_definition()).to_external(true);
        assert!(def.is_external());
        assert!(!def.is_acid());
        assert_eq!(def.property("transactional"), None);
        assert_eq!(def.property("transactional_properties"), None);
        assert_eq!(def.property("external.table.purge").as_deref(), Some("true"));
        assert!(def.lines()[0].starts_with("CREATE EXTERNAL TABLE `web_sales`"));
    }

    #[test]
    fn test_if_not_exists_added_once() {
        let def = TableDefinition::parse(&external_definition("t", "hdfs://LEFT/t")).with_if_not_exists();
        assert_eq!(def.lines()[0], "CREATE EXTERNAL TABLE IF NOT EXISTS `t`(");
        assert_eq!(def.with_if_not_exists(), def);
        assert_eq!(def.table_name().as_deref(), Some("t"));
    }

    #[test]
    fn test_statistics() {
        let stats = TableDefinition::parse(&acid_definition()).statistics();
        assert_eq!(stats.file_count, Some(4));
        assert_eq!(stats.data_size, Some(4096));
        assert_eq!(stats.avg_file_size, Some(1024.0));
        assert_eq!(stats.row_count, None);
    }
}
