//! In-process aggregation over raw JSON documents, for stores that keep the
//! benchmark documents but cannot aggregate them on their own.

use super::{util::plain_field, ComputeResult, Metadata};
use crate::{
    benchmarks::{AggregationOperator, ComputeSpec},
    tree::Node,
};
use itertools::Itertools;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Resolve `field` in `document`, first as a literal key then as a dotted path
pub fn lookup<'a>(document: &'a Value, field: &str) -> Option<&'a Value> {
    let field = plain_field(field);

    document.get(field).or_else(|| {
        field
            .split('.')
            .try_fold(document, |value, segment| value.get(segment))
    })
}

/// string form of a scalar, `None` for null, arrays and objects
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(string) => Some(string.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(boolean) => Some(boolean.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(string) => string.parse().ok(),
        _ => None,
    }
}

/// First value found for every field, documents are searched in order
pub fn compare_fields(documents: &[Value], fields: &[String]) -> Metadata {
    fields
        .iter()
        .filter_map(|field| {
            documents
                .iter()
                .find_map(|document| lookup(document, field).and_then(scalar_string))
                .map(|value| (field.clone(), value))
        })
        .collect()
}

/// Reduce samples with `operator`, `None` without samples
pub fn aggregate(operator: AggregationOperator, samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    let count = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / count;

    let value = match operator {
        AggregationOperator::Avg => mean,
        AggregationOperator::Sum => samples.iter().sum(),
        AggregationOperator::Max => samples.iter().copied().fold(f64::MIN, f64::max),
        AggregationOperator::Min => samples.iter().copied().fold(f64::MAX, f64::min),
        AggregationOperator::Variance => variance(samples, mean),
        AggregationOperator::Deviation => variance(samples, mean).sqrt(),
        AggregationOperator::Percentile(percent) => percentile(samples, percent),
    };

    Some(value)
}

fn variance(samples: &[f64], mean: f64) -> f64 {
    samples
        .iter()
        .map(|sample| (sample - mean).powi(2))
        .sum::<f64>()
        / samples.len() as f64
}

/// linear interpolation between the two closest ranks
fn percentile(samples: &[f64], percent: f64) -> f64 {
    let sorted = samples
        .iter()
        .copied()
        .sorted_by(|a, b| a.total_cmp(b))
        .collect_vec();

    let rank = percent / 100.0 * (sorted.len() - 1) as f64;
    let (lower, upper) = (rank.floor() as usize, rank.ceil() as usize);

    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}

fn matches_filter(document: &Value, spec: &ComputeSpec) -> bool {
    spec.filter.iter().all(|(field, expected)| {
        lookup(document, field)
            .and_then(scalar_string)
            .map_or(false, |value| &value == expected)
    })
}

/// Bucket and aggregate the documents of one run the way a search backend would:
/// documents failing the filter or missing a bucket field are skipped.
pub fn compute(run: &str, documents: &[Value], spec: &ComputeSpec) -> ComputeResult {
    let leaf_keys = spec.leaf_keys();
    // alternating field/value path -> value field -> samples
    let mut groups: BTreeMap<Vec<String>, BTreeMap<&str, Vec<f64>>> = BTreeMap::new();

    for document in documents.iter().filter(|document| matches_filter(document, spec)) {
        let path: Option<Vec<String>> = spec
            .buckets
            .iter()
            .map(|bucket| {
                lookup(document, bucket)
                    .and_then(scalar_string)
                    .map(|value| [bucket.clone(), value])
            })
            .collect::<Option<Vec<_>>>()
            .map(|steps| steps.concat());

        let Some(path) = path else {
            trace!(run, "Skipping document without all bucket fields");
            continue;
        };

        let samples = groups.entry(path).or_default();
        for field in spec.aggregations.keys() {
            if let Some(sample) = lookup(document, field).and_then(number) {
                samples.entry(field.as_str()).or_default().push(sample);
            }
        }
    }

    debug!(run, groups = groups.len(), "Aggregating document buckets");

    let mut tree = Node::new();
    for (path, samples) in groups.iter() {
        for leaf in leaf_keys.iter() {
            let values = samples.get(leaf.field.as_str()).map(Vec::as_slice).unwrap_or(&[]);

            if let Some(value) = aggregate(leaf.operator, values) {
                tree.insert_value(path.as_slice(), &leaf.key, run, value);
            }
        }
    }

    ComputeResult {
        tree,
        buckets: spec.buckets.clone(),
        aggregations: leaf_keys.into_iter().map(|leaf| leaf.key).collect(),
    }
}
