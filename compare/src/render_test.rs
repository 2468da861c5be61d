use crate::{
    render::{
        format_value, rows, write_json, write_legacy_csv, write_metadata, write_text, ComputeTable,
        CsvExporter, MetadataTable, OutputMode,
    },
    tree::Node,
};
use serde_json::json;

fn runs() -> Vec<String> {
    vec!["A".to_owned(), "B".to_owned()]
}

fn node(value: serde_json::Value) -> Node {
    serde_json::from_value(value).unwrap()
}

fn uperf_table() -> ComputeTable {
    ComputeTable {
        filter: vec![("test_type.keyword".to_owned(), "stream".to_owned())],
        buckets: vec!["protocol".to_owned(), "message_size".to_owned()],
        aggregations: vec!["max".to_owned(), "avg".to_owned()],
        tree: node(json!({
            "protocol": {
                "tcp": {
                    "message_size": {
                        "64": { "avg": { "A": 10.0, "B": 12.0 }, "max": { "A": 20.0, "B": 22.5 } },
                        "1024": { "max": { "A": 400.0 } },
                    }
                },
                "udp": {
                    "message_size": {
                        "64": { "avg": { "B": 3.0 } },
                    }
                }
            }
        })),
    }
}

#[test]
fn format_cells() {
    assert_eq!(format_value(Some(1.0)), "1.0");
    assert_eq!(format_value(Some(22.5)), "22.5");
    assert_eq!(format_value(None), "");
}

#[test]
fn rows_follow_bucket_values() {
    let table = uperf_table();
    let rows = table.rows(&runs());

    let summary: Vec<(String, &str)> = rows
        .iter()
        .map(|row| (row.path.join("/"), row.key.as_str()))
        .collect();

    assert_eq!(
        summary,
        vec![
            ("tcp/1024".to_owned(), "max"),
            ("tcp/64".to_owned(), "max"),
            ("tcp/64".to_owned(), "avg"),
            ("udp/64".to_owned(), "avg"),
        ]
    );
    assert_eq!(rows[0].values, vec![Some(400.0), None]);
    assert_eq!(rows[3].values, vec![None, Some(3.0)]);
}

#[test]
fn rows_without_buckets() {
    let tree = node(json!({ "sum": { "A": 1.0, "B": 2.0 } }));
    let rows = rows(&tree, &["sum".to_owned()], &runs(), 0);

    assert_eq!(rows.len(), 1);
    assert!(rows[0].path.is_empty());
    assert_eq!(rows[0].values, vec![Some(1.0), Some(2.0)]);
}

#[test]
fn rows_ignore_unknown_keys() {
    let tree = node(json!({ "p99": { "A": 1.0 } }));

    assert!(rows(&tree, &["avg".to_owned()], &runs(), 0).is_empty());
    assert!(rows(&Node::new(), &[], &runs(), 0).is_empty());
}

#[test]
fn text_table() {
    let mut out = Vec::new();
    write_text(&mut out, &uperf_table(), &runs()).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    let header: Vec<&str> = lines[0].split('|').map(str::trim).collect();
    assert_eq!(
        header,
        vec!["bucket_name", "test_type.keyword", "protocol", "message_size", "key", "A", "B", ""]
    );
    assert!(lines[1].chars().all(|c| c == '-'));
    assert_eq!(lines[1].len(), lines[0].len());

    let first: Vec<&str> = lines[2].split('|').map(str::trim).collect();
    assert_eq!(
        first,
        vec!["bucket_value", "stream", "tcp", "1024", "max", "400.0", "", ""]
    );
    assert_eq!(lines.len(), 7);
}

#[test]
fn metadata_block() {
    let fields = vec!["uuid".to_owned(), "kind".to_owned()];
    let mut metadata = MetadataTable::new();
    metadata.entry("uuid".to_owned()).or_default().insert("A".to_owned(), "A".to_owned());
    metadata.entry("uuid".to_owned()).or_default().insert("B".to_owned(), "B".to_owned());
    metadata.entry("kind".to_owned()).or_default().insert("A".to_owned(), "pod".to_owned());

    let mut out = Vec::new();
    write_metadata(&mut out, &fields, &metadata, &runs()).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines[0], format!("{0} Key Metadata {0}", "=".repeat(57)));
    let kind: Vec<&str> = lines[3].split('|').map(str::trim).collect();
    assert_eq!(kind, vec!["kind", "pod", "", ""]);
    assert!(lines[4].contains("End Metadata"));
}

#[test]
fn csv_header_once() {
    let mut out = Vec::new();
    let mut exporter = CsvExporter::new(&mut out);
    exporter.write_table(&uperf_table(), &runs()).unwrap();
    exporter.write_table(&uperf_table(), &runs()).unwrap();
    exporter.finish().unwrap();

    let csv = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(lines[0], "test_type.keyword,protocol,message_size,key,uuid,value");
    assert_eq!(lines[1], "stream,tcp,1024,max,A,400.0");
    assert_eq!(lines[2], "stream,tcp,1024,max,B,");
    assert_eq!(lines.iter().filter(|line| line.ends_with("uuid,value")).count(), 1);
    assert_eq!(lines.len(), 1 + 2 * 8);
}

#[test]
fn legacy_csv() {
    let tree = node(json!({
        "test_type.keyword": {
            "stream": {
                "protocol": {
                    "tcp": {
                        "message_size": {
                            "64": {
                                "num_threads": {
                                    "1": {
                                        "avg_norm_byte": { "A": 0.5 },
                                        "max_norm_byte": { "A": 1.0, "B": 2.0 },
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }));

    let mut out = Vec::new();
    write_legacy_csv(&mut out, &tree, &runs()).unwrap();
    let csv = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(
        lines,
        vec![
            "Test Type, Protocol, Message Size, Threads, UUID, Key, Value",
            "stream, tcp, 64, 1, A, avg_norm_byte, 0.5",
            "stream, tcp, 64, 1, B, avg_norm_byte, ",
            "stream, tcp, 64, 1, A, max_norm_byte, 1.0",
            "stream, tcp, 64, 1, B, max_norm_byte, 2.0",
        ]
    );
}

#[test]
fn legacy_csv_header_without_rows() {
    let tree = node(json!({ "test_type.keyword": { "stream": {} } }));

    let mut out = Vec::new();
    write_legacy_csv(&mut out, &tree, &runs()).unwrap();

    assert_eq!(
        String::from_utf8(out).unwrap(),
        "Test Type, Protocol, Message Size, Threads, UUID, Key, Value\n"
    );
}

#[test]
fn legacy_csv_without_uperf_tree() {
    let mut out: Vec<u8> = Vec::new();
    write_legacy_csv(&mut out, &Node::new(), &runs()).unwrap();

    assert!(out.is_empty());
}

#[test]
fn json_uses_four_spaces() {
    let mut out = Vec::new();
    write_json(&mut out, &node(json!({ "cpu": { "A": 1.0 } }))).unwrap();

    assert_eq!(
        String::from_utf8(out).unwrap(),
        "{\n    \"cpu\": {\n        \"A\": 1.0\n    }\n}\n"
    );
}

#[test]
fn structured_modes() {
    assert!(OutputMode::Json.is_structured());
    assert!(OutputMode::LegacyCsv.is_structured());
    assert!(!OutputMode::Text.is_structured());
    assert!(!OutputMode::Csv.is_structured());
}
