use crate::benchmarks::{BenchmarkSpec, Registry};
use serde::{Deserialize, Serialize};
use std::{fs, io::Error, path::Path};
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config file")]
    Read(#[from] Error),
    #[error("Failed to parse config file")]
    Parse(#[from] serde_yaml::Error),
    #[error("Config failed preflight checks, see the log for details")]
    Invalid,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct CompareConfig {
    // used when no connection url is passed on the command line
    #[serde(default, alias = "urls")]
    pub connection_urls: Vec<String>,
    // size of the fetch thread pool, defaults to one thread per run
    pub jobs: Option<usize>,

    #[serde(default, alias = "es")]
    pub elasticsearch: ElasticsearchConfig,

    // additional or overriding benchmark descriptors
    #[serde(default)]
    pub descriptors: Vec<BenchmarkSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ElasticsearchConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    // maximum number of terms returned per bucket aggregation
    #[serde(default = "default_bucket_size")]
    pub bucket_size: usize,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            bucket_size: default_bucket_size(),
        }
    }
}

impl CompareConfig {
    /// read, parse and check a YAML config file
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        debug!(path = ?path, "Loading config");

        let mut config: Self = serde_yaml::from_str(&fs::read_to_string(path)?)?;

        if config.preflight_checks() {
            Err(ConfigErrors::Invalid)
        } else {
            Ok(config)
        }
    }

    /// built-in descriptors with the ones from this config layered on top
    pub fn registry(&self) -> Registry {
        let mut registry = Registry::builtin();

        for descriptor in self.descriptors.iter() {
            registry.insert(descriptor.clone());
        }

        registry
    }

    /// Check the config, logging every problem instead of stopping at the first.
    /// Returns true if any error was found.
    pub fn preflight_checks(&mut self) -> bool {
        let mut contains_error = false;

        if self.jobs == Some(0) {
            error!("jobs cannot be 0, leave it out to use one thread per run");
            contains_error = true;
        }

        if self.connection_urls.iter().any(|url| url.trim().is_empty()) {
            error!("connection_urls must not contain empty entries");
            contains_error = true;
        }

        if self.elasticsearch.bucket_size == 0 {
            error!("elasticsearch.bucket_size cannot be 0");
            contains_error = true;
        }

        for descriptor in self.descriptors.iter_mut() {
            descriptor.harness = descriptor.harness.to_lowercase();
            let name = format!(
                "{}/{}/{}",
                descriptor.benchmark, descriptor.database, descriptor.harness
            );

            if descriptor.indices.is_empty() {
                warn!("Descriptor {name} defines no index and will compare nothing");
            }

            for (index, spec) in descriptor.indices.iter() {
                for (position, compute) in spec.compute.iter().enumerate() {
                    if compute.buckets.iter().any(|bucket| bucket.trim().is_empty()) {
                        error!("{name}.{index}.compute[{position}] contains an empty bucket name");
                        contains_error = true;
                    }

                    if compute.aggregations.is_empty() {
                        error!("{name}.{index}.compute[{position}] has no aggregations");
                        contains_error = true;
                    }

                    for (field, operators) in compute.aggregations.iter() {
                        if operators.is_empty() {
                            error!(
                                "{name}.{index}.compute[{position}].aggregations.{field} lists no operator"
                            );
                            contains_error = true;
                        }
                    }

                    if !compute.collate.is_empty() {
                        warn!("{name}.{index}.compute[{position}].collate is parsed but not applied");
                    }
                }
            }
        }

        contains_error
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_bucket_size() -> usize {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        benchmarks::{AggregationOperator, Benchmark},
        database::StoreType,
    };

    const CONFIG: &str = r#"
connection_urls: ["http://localhost:9200"]
jobs: 4
es:
  timeout_ms: 500
descriptors:
  - benchmark: kubeburner
    database: elasticsearch
    harness: Ripsaw
    indices:
      kube-burner-custom:
        compare: [uuid, version]
        compute:
          - filter: { jobName: density, replicas: 3 }
            buckets: [metricName.keyword]
            aggregations:
              value: [avg, percentile_99]
"#;

    #[test]
    fn parse_config() {
        let mut config: CompareConfig = serde_yaml::from_str(CONFIG).unwrap();

        assert!(!config.preflight_checks());
        assert_eq!(config.jobs, Some(4));
        assert_eq!(config.elasticsearch.timeout_ms, 500);
        assert_eq!(config.elasticsearch.bucket_size, 10_000);

        let descriptor = &config.descriptors[0];
        assert_eq!(descriptor.harness, "ripsaw");

        let compute = &descriptor.indices["kube-burner-custom"].compute[0];
        assert_eq!(compute.filter["replicas"], "3");
        assert_eq!(
            compute.aggregations["value"],
            vec![AggregationOperator::Avg, AggregationOperator::Percentile(99.0)]
        );
    }

    #[test]
    fn config_overrides_builtin_descriptor() {
        let mut config: CompareConfig = serde_yaml::from_str(CONFIG).unwrap();
        config.preflight_checks();

        let registry = config.registry();
        let spec = registry
            .resolve(Benchmark::Kubeburner, StoreType::Elasticsearch, "ripsaw")
            .unwrap();

        assert_eq!(spec.indices().collect::<Vec<_>>(), vec!["kube-burner-custom"]);
    }

    #[test]
    fn preflight_reports_bad_specs() {
        let mut config: CompareConfig = serde_yaml::from_str(
            r#"
jobs: 0
descriptors:
  - benchmark: ycsb
    database: sqlite
    harness: ripsaw
    indices:
      ycsb:
        compute:
          - buckets: [""]
            aggregations: {}
"#,
        )
        .unwrap();

        assert!(config.preflight_checks());
    }

    #[test]
    fn unknown_operator_fails_to_parse() {
        let result: Result<CompareConfig, _> = serde_yaml::from_str(
            r#"
descriptors:
  - benchmark: ycsb
    database: sqlite
    harness: ripsaw
    indices:
      ycsb:
        compute:
          - buckets: [workload]
            aggregations: { value: [median] }
"#,
        );

        assert!(result.is_err());
    }
}
