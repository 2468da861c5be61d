use crate::tree::Node;
use clap::ValueEnum;
use serde::Serialize;
use std::{collections::BTreeMap, io::Write};
use thiserror::Error;
use tracing::{debug, warn};

/// header of the fixed shape CSV export of uperf results
pub const LEGACY_CSV_HEADER: [&str; 7] = [
    "Test Type",
    "Protocol",
    "Message Size",
    "Threads",
    "UUID",
    "Key",
    "Value",
];

pub const LEGACY_CSV_SEPARATOR: &str = ", ";

/// field -> run -> value, the verbatim metadata of every run
pub type MetadataTable = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to write output")]
    Io(#[from] std::io::Error),
    #[error("Failed to write CSV")]
    Csv(#[from] csv::Error),
    #[error("Failed to serialize JSON")]
    Json(#[from] serde_json::Error),
    #[error("Failed to serialize YAML")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    /// aligned text table
    Text,
    Json,
    Yaml,
    /// one record per bucket path, key and run
    Csv,
    /// fixed uperf layout: test type, protocol, message size, threads
    LegacyCsv,
}

impl OutputMode {
    /// structured modes serialize the merged tree instead of walking it into rows
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Json | Self::Yaml | Self::LegacyCsv)
    }
}

/// One flattened leaf: bucket values from the root down, the aggregation key
/// and one cell per run, in run order
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub path: Vec<String>,
    pub key: String,
    pub values: Vec<Option<f64>>,
}

/// A merged tree of one compute spec together with what is needed to walk it
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComputeTable {
    pub filter: Vec<(String, String)>,
    pub buckets: Vec<String>,
    pub aggregations: Vec<String>,
    pub tree: Node,
}

impl ComputeTable {
    /// one tree level per bucket field plus one per bucket value
    pub fn max_depth(&self) -> usize {
        2 * self.buckets.len()
    }

    pub fn rows(&self, runs: &[String]) -> Vec<Row> {
        rows(&self.tree, &self.aggregations, runs, self.max_depth())
    }
}

/// Walk `tree` down to `max_depth` and emit one row per (bucket path, aggregation)
/// present at that depth. Even levels hold bucket field names and are not part
/// of the path, odd levels hold bucket values.
pub fn rows(tree: &Node, aggregations: &[String], runs: &[String], max_depth: usize) -> Vec<Row> {
    let mut rows = Vec::new();
    walk(tree, aggregations, runs, max_depth, 0, &mut Vec::new(), &mut rows);

    rows
}

fn walk(
    node: &Node,
    aggregations: &[String],
    runs: &[String],
    max_depth: usize,
    level: usize,
    path: &mut Vec<String>,
    rows: &mut Vec<Row>,
) {
    if level == max_depth {
        for key in aggregations {
            if let Some(leaf) = node.get(key).and_then(Node::as_leaf) {
                rows.push(Row {
                    path: path.clone(),
                    key: key.clone(),
                    values: runs.iter().map(|run| leaf.get(run).copied()).collect(),
                });
            }
        }

        return;
    }

    for (key, child) in node.children() {
        if level % 2 == 1 {
            path.push(key.clone());
            walk(child, aggregations, runs, max_depth, level + 1, path, rows);
            path.pop();
        } else {
            walk(child, aggregations, runs, max_depth, level + 1, path, rows);
        }
    }
}

/// numeric cell, always with a decimal point, blank if absent
pub fn format_value(value: Option<f64>) -> String {
    value.map(|value| format!("{value:?}")).unwrap_or_default()
}

pub fn write_metadata<W: Write>(
    out: &mut W,
    fields: &[String],
    metadata: &MetadataTable,
    runs: &[String],
) -> Result<(), RenderError> {
    let rule = "=".repeat(57);

    writeln!(out, "{rule} Key Metadata {rule}")?;

    let mut header = format!("{:40} |", "key");
    for run in runs {
        header += &format!(" {run:40} |");
    }
    writeln!(out, "{header}")?;

    for field in fields {
        let mut line = format!("{field:40} |");
        for run in runs {
            let value = metadata
                .get(field)
                .and_then(|values| values.get(run))
                .map(String::as_str)
                .unwrap_or("");
            line += &format!(" {value:40} |");
        }
        writeln!(out, "{line}")?;
    }

    writeln!(out, "{rule} End Metadata {rule}")?;
    writeln!(out)?;

    Ok(())
}

/// Aligned table for one compute spec: the filter values prefix every row
pub fn write_text<W: Write>(
    out: &mut W,
    table: &ComputeTable,
    runs: &[String],
) -> Result<(), RenderError> {
    let mut header = format!("{:30} |", "bucket_name");
    let mut prefix = format!("{:30} |", "bucket_value");

    for (field, value) in table.filter.iter() {
        header += &format!(" {field:20} |");
        prefix += &format!(" {value:20} |");
    }
    for bucket in table.buckets.iter() {
        header += &format!(" {bucket:20} |");
    }
    header += &format!(" {:20} |", "key");
    for run in runs {
        header += &format!(" {run:40} |");
    }

    writeln!(out, "{header}")?;
    writeln!(out, "{}", "-".repeat(header.len()))?;

    let rows = table.rows(runs);
    debug!(rows = rows.len(), "Rendering text table");

    for row in rows {
        let mut line = prefix.clone();
        for value in row.path.iter() {
            line += &format!(" {value:20} |");
        }
        line += &format!(" {:20} |", row.key);
        for value in row.values {
            line += &format!(" {:40} |", format_value(value));
        }
        writeln!(out, "{line}")?;
    }
    writeln!(out)?;

    Ok(())
}

/// CSV writer for the tree walking export, the header is emitted once for
/// the first table written
pub struct CsvExporter<W: Write> {
    writer: csv::Writer<W>,
    header_written: bool,
}

impl<W: Write> CsvExporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().flexible(true).from_writer(out),
            header_written: false,
        }
    }

    pub fn write_table(&mut self, table: &ComputeTable, runs: &[String]) -> Result<(), RenderError> {
        if !self.header_written {
            let header = table
                .filter
                .iter()
                .map(|(field, _)| field.as_str())
                .chain(table.buckets.iter().map(String::as_str))
                .chain(["key", "uuid", "value"]);
            self.writer.write_record(header)?;
            self.header_written = true;
        }

        for row in table.rows(runs) {
            for (run, value) in runs.iter().zip(row.values.iter()) {
                let record = table
                    .filter
                    .iter()
                    .map(|(_, value)| value.clone())
                    .chain(row.path.iter().cloned())
                    .chain([row.key.clone(), run.clone(), format_value(*value)]);
                self.writer.write_record(record)?;
            }
        }

        Ok(())
    }

    pub fn finish(mut self) -> Result<(), RenderError> {
        self.writer.flush()?;

        Ok(())
    }
}

/// Fixed shape export of uperf results walking
/// `test_type.keyword/<type>/protocol/<protocol>/message_size/<size>/num_threads/<threads>`.
/// Fields are separated by `", "` and never quoted, consumers parse this layout
/// positionally.
pub fn write_legacy_csv<W: Write>(mut out: W, tree: &Node, runs: &[String]) -> Result<(), RenderError> {
    let Some(test_types) = tree.get("test_type.keyword") else {
        warn!("No uperf values loaded, nothing to export");
        return Ok(());
    };

    writeln!(out, "{}", LEGACY_CSV_HEADER.join(LEGACY_CSV_SEPARATOR))?;

    for (test_type, node) in test_types.children() {
        for (protocol, node) in children_of(node, "protocol") {
            for (message_size, node) in children_of(node, "message_size") {
                for (threads, node) in children_of(node, "num_threads") {
                    for (metric, leaf) in node.children() {
                        let Some(leaf) = leaf.as_leaf() else { continue };

                        for run in runs {
                            let value = format_value(leaf.get(run).copied());
                            let record = [
                                test_type.as_str(),
                                protocol,
                                message_size,
                                threads,
                                run.as_str(),
                                metric.as_str(),
                                value.as_str(),
                            ];
                            writeln!(out, "{}", record.join(LEGACY_CSV_SEPARATOR))?;
                        }
                    }
                }
            }
        }
    }

    out.flush()?;

    Ok(())
}

fn children_of<'a>(node: &'a Node, field: &str) -> impl Iterator<Item = (&'a str, &'a Node)> {
    node.get(field)
        .into_iter()
        .flat_map(Node::children)
        .map(|(key, child)| (key.as_str(), child))
}

fn write_serialized_json<W: Write, T: Serialize>(out: W, value: &T) -> Result<(), RenderError> {
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(out, formatter);
    value.serialize(&mut serializer)?;

    Ok(())
}

/// the merged tree, pretty printed with four space indentation
pub fn write_json<W: Write>(mut out: W, tree: &Node) -> Result<(), RenderError> {
    write_serialized_json(&mut out, tree)?;
    writeln!(out)?;

    Ok(())
}

pub fn write_yaml<W: Write>(out: W, tree: &Node) -> Result<(), RenderError> {
    serde_yaml::to_writer(out, tree)?;

    Ok(())
}
