use super::{
    documents::{compare_fields, scalar_string},
    util::{base_url, plain_field},
    ComputeResult, ConnectionError, Metadata, QueryAdapter,
};
use crate::{
    benchmarks::{AggregationOperator, ComputeSpec, LeafKey},
    config::ElasticsearchConfig,
    tree::Node,
};
use reqwest::{blocking::Client, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, instrument, trace};

/// field every benchmark document carries its run id in
const RUN_FIELD: &str = "uuid";

#[derive(Debug)]
pub struct ElasticConnection {
    client: Client,
    url: String,
    bucket_size: usize,
}

impl ElasticConnection {
    /// build a client and make sure the cluster answers
    pub fn load(url: &str, config: &ElasticsearchConfig) -> Result<Self, ConnectionError> {
        let url = base_url(url);
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        client
            .get(&url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|error| ConnectionError::Connect {
                url: url.clone(),
                reason: error.to_string(),
            })?;

        info!(url = %url, "Connected to Elasticsearch");

        Ok(Self {
            client,
            url,
            bucket_size: config.bucket_size,
        })
    }

    fn search(&self, run: &str, index: &str, body: &Value) -> Result<Value, ConnectionError> {
        trace!(index, body = %body, "Sending search");

        let response = self
            .client
            .post(format!("{}/{index}/_search", self.url))
            .json(body)
            .send()?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ConnectionError::MissingRunData {
                run: run.to_owned(),
                index: index.to_owned(),
            }),
            status if !status.is_success() => Err(ConnectionError::Query(format!(
                "{status}: {}",
                response.text().unwrap_or_default()
            ))),
            _ => Ok(response.json()?),
        }
    }
}

fn run_query(run: &str, filter: &[Value]) -> Value {
    let mut clauses = vec![json!({ "match_phrase": { RUN_FIELD: run } })];
    clauses.extend_from_slice(filter);

    json!({ "bool": { "filter": clauses } })
}

fn metric_aggregation(leaf: &LeafKey) -> Value {
    let field = &leaf.field;

    match leaf.operator {
        AggregationOperator::Avg => json!({ "avg": { "field": field } }),
        AggregationOperator::Max => json!({ "max": { "field": field } }),
        AggregationOperator::Min => json!({ "min": { "field": field } }),
        AggregationOperator::Sum => json!({ "sum": { "field": field } }),
        AggregationOperator::Variance | AggregationOperator::Deviation => {
            json!({ "extended_stats": { "field": field } })
        }
        AggregationOperator::Percentile(percent) => {
            json!({ "percentiles": { "field": field, "percents": [percent] } })
        }
    }
}

fn metric_value(aggregation: &Value, operator: AggregationOperator) -> Option<f64> {
    match operator {
        AggregationOperator::Variance => aggregation.get("variance")?.as_f64(),
        AggregationOperator::Deviation => aggregation.get("std_deviation")?.as_f64(),
        AggregationOperator::Percentile(_) => {
            aggregation.get("values")?.as_object()?.values().next()?.as_f64()
        }
        _ => aggregation.get("value")?.as_f64(),
    }
}

/// Search body for one compute spec: nested `terms` aggregations, one per bucket
/// field, with the metric aggregations at the innermost level
pub fn compute_body(run: &str, spec: &ComputeSpec, bucket_size: usize) -> Value {
    let filter: Vec<Value> = spec
        .filter
        .iter()
        .map(|(field, value)| json!({ "term": { field: value } }))
        .collect();

    let metrics: Map<String, Value> = spec
        .leaf_keys()
        .iter()
        .map(|leaf| (leaf.key.clone(), metric_aggregation(leaf)))
        .collect();

    let aggregations = spec.buckets.iter().rev().fold(metrics, |inner, bucket| {
        let mut outer = Map::new();
        outer.insert(
            bucket.clone(),
            json!({
                "terms": { "field": bucket, "size": bucket_size },
                "aggs": inner,
            }),
        );
        outer
    });

    json!({
        "size": 0,
        "query": run_query(run, &filter),
        "aggs": aggregations,
    })
}

fn walk_buckets(
    aggregations: &Value,
    buckets: &[String],
    leaf_keys: &[LeafKey],
    run: &str,
    path: &mut Vec<String>,
    tree: &mut Node,
) {
    let Some((bucket, rest)) = buckets.split_first() else {
        for leaf in leaf_keys {
            if let Some(value) = aggregations
                .get(&leaf.key)
                .and_then(|aggregation| metric_value(aggregation, leaf.operator))
            {
                tree.insert_value(path.as_slice(), &leaf.key, run, value);
            }
        }

        return;
    };

    let entries = aggregations
        .get(bucket)
        .and_then(|terms| terms.get("buckets"))
        .and_then(Value::as_array);

    for entry in entries.into_iter().flatten() {
        let key = entry
            .get("key_as_string")
            .or_else(|| entry.get("key"))
            .and_then(scalar_string);

        if let Some(key) = key {
            path.push(bucket.clone());
            path.push(key);
            walk_buckets(entry, rest, leaf_keys, run, path, tree);
            path.truncate(path.len() - 2);
        }
    }
}

/// Turn the `aggregations` section of a search response into a comparison tree
pub fn parse_compute(run: &str, spec: &ComputeSpec, response: &Value) -> ComputeResult {
    let leaf_keys = spec.leaf_keys();
    let mut tree = Node::new();

    if let Some(aggregations) = response.get("aggregations") {
        walk_buckets(
            aggregations,
            &spec.buckets,
            &leaf_keys,
            run,
            &mut Vec::new(),
            &mut tree,
        );
    }

    ComputeResult {
        tree,
        buckets: spec.buckets.clone(),
        aggregations: leaf_keys.into_iter().map(|leaf| leaf.key).collect(),
    }
}

impl QueryAdapter for ElasticConnection {
    #[instrument(level = "debug", skip(self, fields))]
    fn emit_compare(
        &self,
        run: &str,
        index: &str,
        fields: &[String],
    ) -> Result<Metadata, ConnectionError> {
        let source: Vec<&str> = fields.iter().map(|field| plain_field(field)).collect();
        let body = json!({
            "size": 1,
            "query": run_query(run, &[]),
            "_source": source,
        });

        let response = self.search(run, index, &body)?;
        let hits: Vec<Value> = response
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .map(|hits| {
                hits.iter()
                    .filter_map(|hit| hit.get("_source").cloned())
                    .collect()
            })
            .unwrap_or_default();

        if hits.is_empty() {
            return Err(ConnectionError::MissingRunData {
                run: run.to_owned(),
                index: index.to_owned(),
            });
        }

        Ok(compare_fields(&hits, fields))
    }

    #[instrument(level = "debug", skip(self, spec))]
    fn emit_compute(
        &self,
        run: &str,
        index: &str,
        spec: &ComputeSpec,
    ) -> Result<ComputeResult, ConnectionError> {
        let body = compute_body(run, spec, self.bucket_size);
        let response = self.search(run, index, &body)?;

        if let Some(error) = response.get("error") {
            return Err(ConnectionError::Query(error.to_string()));
        }

        let result = parse_compute(run, spec, &response);
        debug!(empty = result.tree.is_empty(), "Parsed aggregations");

        Ok(result)
    }
}
