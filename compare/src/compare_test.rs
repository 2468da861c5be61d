use crate::{
    benchmarks::{AggregationOperator, Benchmark, BenchmarkSpec, ComputeSpec, RIPSAW},
    compare::{broadcast_urls, CompareError, Comparison, Run},
    database::{ComputeResult, ConnectionError, Metadata, QueryAdapter, StoreType},
    render::OutputMode,
    tree::Node,
};
use serde_json::json;
use std::{collections::BTreeMap, sync::Arc};

const INDEX: &str = "ripsaw-kube-burner";

/// In memory store: run -> metric -> (avg, max)
#[derive(Default)]
struct Fixture {
    runs: BTreeMap<String, BTreeMap<String, (f64, f64)>>,
    broken: bool,
}

impl Fixture {
    fn run(mut self, run: &str, metrics: &[(&str, f64, f64)]) -> Self {
        self.runs.insert(
            run.to_owned(),
            metrics
                .iter()
                .map(|(metric, avg, max)| (metric.to_string(), (*avg, *max)))
                .collect(),
        );
        self
    }

    fn missing(&self, run: &str, index: &str) -> ConnectionError {
        ConnectionError::MissingRunData {
            run: run.to_owned(),
            index: index.to_owned(),
        }
    }
}

impl QueryAdapter for Fixture {
    fn emit_compare(
        &self,
        run: &str,
        index: &str,
        fields: &[String],
    ) -> Result<Metadata, ConnectionError> {
        if !self.runs.contains_key(run) {
            return Err(self.missing(run, index));
        }

        Ok(fields
            .iter()
            .map(|field| (field.clone(), format!("{field}-of-{run}")))
            .collect())
    }

    fn emit_compute(
        &self,
        run: &str,
        index: &str,
        spec: &ComputeSpec,
    ) -> Result<ComputeResult, ConnectionError> {
        if self.broken {
            return Err(ConnectionError::Query("index is closed".to_owned()));
        }

        let metrics = self.runs.get(run).ok_or_else(|| self.missing(run, index))?;
        let mut result = ComputeResult::empty(spec);

        for (metric, (avg, max)) in metrics {
            let path = [spec.buckets[0].as_str(), metric.as_str()];
            result.tree.insert_value(path.as_slice(), "avg", run, *avg);
            result.tree.insert_value(path.as_slice(), "max", run, *max);
        }

        Ok(result)
    }
}

fn kubeburner() -> BenchmarkSpec {
    BenchmarkSpec::new(Benchmark::Kubeburner, StoreType::Elasticsearch, RIPSAW).index(
        INDEX,
        ["uuid"],
        vec![ComputeSpec::new(["metricName"])
            .aggregate("value", [AggregationOperator::Avg, AggregationOperator::Max])],
    )
}

fn runs(fixture: Fixture, ids: &[&str]) -> Vec<Run<Fixture>> {
    let fixture = Arc::new(fixture);

    ids.iter()
        .map(|id| Run::new(*id, fixture.clone()))
        .collect()
}

fn two_runs() -> Fixture {
    Fixture::default()
        .run("A", &[("cpu", 1.0, 2.0), ("memory", 100.0, 120.0)])
        .run("B", &[("cpu", 1.5, 2.5)])
}

fn output(comparison: &Comparison<'_, Fixture>, mode: OutputMode) -> String {
    let mut out = Vec::new();
    comparison.write(mode, &mut out).unwrap();

    String::from_utf8(out).unwrap()
}

#[test]
fn broadcast_single_url() {
    let urls = broadcast_urls(&["http://es:9200".to_owned()], 3).unwrap();

    assert_eq!(urls, vec!["http://es:9200"; 3]);
}

#[test]
fn broadcast_url_per_run() {
    let urls: Vec<String> = ["a", "b", "c"].iter().map(|url| url.to_string()).collect();

    assert_eq!(broadcast_urls(&urls, 3).unwrap(), urls);
    assert_eq!(broadcast_urls(&urls, 2).unwrap(), vec!["a", "b"]);
    assert_eq!(broadcast_urls(&urls[..2], 3).unwrap(), vec!["a"; 3]);
}

#[test]
fn broadcast_without_urls() {
    assert!(matches!(broadcast_urls(&[], 2), Err(CompareError::Argument(_))));
}

#[test]
fn needs_two_runs() {
    let spec = kubeburner();

    assert!(matches!(
        Comparison::new(&spec, runs(two_runs(), &["A"]), None),
        Err(CompareError::Argument(_))
    ));
}

#[test]
fn merged_table_rows() {
    let spec = kubeburner();
    let comparison = Comparison::new(&spec, runs(two_runs(), &["A", "B"]), Some(1)).unwrap();

    let tables = comparison.tables(INDEX).unwrap();
    assert_eq!(tables.len(), 1);

    let table = &tables[0];
    assert_eq!(table.buckets, vec!["metricName"]);
    assert_eq!(table.aggregations, vec!["avg", "max"]);

    let rows = table.rows(&comparison.run_ids());
    let cells: Vec<(Vec<String>, String, Vec<Option<f64>>)> = rows
        .into_iter()
        .map(|row| (row.path, row.key, row.values))
        .collect();

    assert_eq!(
        cells,
        vec![
            (vec!["cpu".to_owned()], "avg".to_owned(), vec![Some(1.0), Some(1.5)]),
            (vec!["cpu".to_owned()], "max".to_owned(), vec![Some(2.0), Some(2.5)]),
            (vec!["memory".to_owned()], "avg".to_owned(), vec![Some(100.0), None]),
            (vec!["memory".to_owned()], "max".to_owned(), vec![Some(120.0), None]),
        ]
    );
}

#[test]
fn structured_tree() {
    let spec = kubeburner();
    let comparison = Comparison::new(&spec, runs(two_runs(), &["A", "B"]), None).unwrap();

    let expected: Node = serde_json::from_value(json!({
        "metricName": {
            "cpu": {
                "avg": { "A": 1.0, "B": 1.5 },
                "max": { "A": 2.0, "B": 2.5 },
            },
            "memory": {
                "avg": { "A": 100.0 },
                "max": { "A": 120.0 },
            },
        }
    }))
    .unwrap();

    assert_eq!(comparison.structured().unwrap(), expected);

    let json: Node = serde_json::from_str(&output(&comparison, OutputMode::Json)).unwrap();
    assert_eq!(json, expected);

    let yaml: Node = serde_yaml::from_str(&output(&comparison, OutputMode::Yaml)).unwrap();
    assert_eq!(yaml, expected);
}

#[test]
fn filtered_results_nest_below_filter_path() {
    let spec = BenchmarkSpec::new(Benchmark::Uperf, StoreType::Elasticsearch, RIPSAW).index(
        INDEX,
        Vec::<String>::new(),
        vec![ComputeSpec::new(["protocol"])
            .filter("test_type", "stream")
            .aggregate("value", [AggregationOperator::Avg])],
    );
    let comparison = Comparison::new(&spec, runs(two_runs(), &["A", "B"]), None).unwrap();

    let tree = comparison.structured().unwrap();
    let avg = tree
        .get_path(["test_type", "stream", "protocol", "cpu", "avg"])
        .and_then(Node::as_leaf)
        .unwrap();

    assert_eq!(avg["A"], 1.0);
    assert_eq!(avg["B"], 1.5);
}

#[test]
fn three_runs_one_store() {
    let spec = kubeburner();
    let fixture = two_runs().run("C", &[("cpu", 3.0, 4.0)]);
    let comparison = Comparison::new(&spec, runs(fixture, &["A", "B", "C"]), Some(2)).unwrap();

    let tree = comparison.structured().unwrap();
    let avg = tree
        .get_path(["metricName", "cpu", "avg"])
        .and_then(Node::as_leaf)
        .unwrap();

    assert_eq!(avg.keys().collect::<Vec<_>>(), vec!["A", "B", "C"]);
}

#[test]
fn missing_run_leaves_blank_cells() {
    let spec = kubeburner();
    let comparison = Comparison::new(&spec, runs(two_runs(), &["A", "Z"]), None).unwrap();

    let rows = comparison.tables(INDEX).unwrap()[0].rows(&comparison.run_ids());
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|row| row.values[1].is_none()));

    let metadata = comparison.metadata(INDEX, &["uuid".to_owned()]).unwrap();
    assert_eq!(metadata["uuid"].get("A").map(String::as_str), Some("uuid-of-A"));
    assert!(metadata["uuid"].get("Z").is_none());
}

#[test]
fn backend_failure_aborts() {
    let spec = kubeburner();
    let fixture = Fixture {
        broken: true,
        ..two_runs()
    };
    let comparison = Comparison::new(&spec, runs(fixture, &["A", "B"]), None).unwrap();

    assert!(matches!(
        comparison.structured(),
        Err(CompareError::Connection(ConnectionError::Query(_)))
    ));
}

#[test]
fn text_output() {
    let spec = kubeburner();
    let comparison = Comparison::new(&spec, runs(two_runs(), &["A", "B"]), None).unwrap();

    let text = output(&comparison, OutputMode::Text);
    let lines: Vec<&str> = text.lines().collect();

    assert!(lines[0].contains("Key Metadata"));
    assert!(lines[2].starts_with("uuid"));
    assert!(lines[2].contains("uuid-of-B"));

    let cpu_avg = lines
        .iter()
        .find(|line| line.contains("cpu") && line.contains("avg"))
        .unwrap();
    let cells: Vec<&str> = cpu_avg.split('|').map(str::trim).collect();
    assert_eq!(&cells[1..5], &["cpu", "avg", "1.0", "1.5"]);

    let memory_max = lines
        .iter()
        .find(|line| line.contains("memory") && line.contains("max"))
        .unwrap();
    let cells: Vec<&str> = memory_max.split('|').map(str::trim).collect();
    assert_eq!(&cells[3..5], &["120.0", ""]);
}

#[test]
fn csv_output() {
    let spec = kubeburner();
    let comparison = Comparison::new(&spec, runs(two_runs(), &["A", "B"]), None).unwrap();

    let csv = output(&comparison, OutputMode::Csv);
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(lines[0], "metricName,key,uuid,value");
    assert_eq!(lines[1], "cpu,avg,A,1.0");
    assert_eq!(lines[2], "cpu,avg,B,1.5");
    assert!(lines.contains(&"memory,max,B,"));
    assert_eq!(lines.len(), 9);
}

#[test]
fn structured_output_without_any_run_data() {
    let spec = kubeburner();
    let comparison = Comparison::new(&spec, runs(two_runs(), &["Y", "Z"]), None).unwrap();

    let json = output(&comparison, OutputMode::Json);
    assert_eq!(json, "{}\n");
    assert_eq!(serde_json::from_str::<Node>(&json).unwrap(), Node::new());

    let yaml = output(&comparison, OutputMode::Yaml);
    assert_eq!(serde_yaml::from_str::<Node>(&yaml).unwrap(), Node::new());

    assert!(output(&comparison, OutputMode::LegacyCsv).is_empty());
}
