mod kubeburner;
mod pgbench;
mod uperf;
mod ycsb;


use crate::database::StoreType;
use clap::ValueEnum;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error;
use tracing::{debug, info};

/// Harness every built-in descriptor is registered for
pub const RIPSAW: &str = "ripsaw";

/// map of index name -> fields shown verbatim per run
pub type CompareMap = BTreeMap<String, Vec<String>>;
/// map of index name -> aggregate queries
pub type ComputeMap = BTreeMap<String, Vec<ComputeSpec>>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("benchmark {benchmark} is not supported for database {database} with harness {harness}")]
    UnsupportedBenchmark {
        benchmark: Benchmark,
        database: StoreType,
        harness: String,
    },
    #[error("index {0} is not defined for this benchmark")]
    UnknownIndex(String),
}

#[derive(
    ValueEnum, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Benchmark {
    Uperf,
    Ycsb,
    Pgbench,
    Kubeburner,
}

impl fmt::Display for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uperf => "uperf",
            Self::Ycsb => "ycsb",
            Self::Pgbench => "pgbench",
            Self::Kubeburner => "kubeburner",
        })
    }
}

/// Reduction the backend computes over the raw samples of one value field
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AggregationOperator {
    Avg,
    Max,
    Min,
    Sum,
    /// population variance
    Variance,
    /// population standard deviation
    Deviation,
    /// percentile in the range [0, 100]
    Percentile(f64),
}

impl FromStr for AggregationOperator {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "avg" | "average" => Ok(Self::Avg),
            "max" => Ok(Self::Max),
            "min" => Ok(Self::Min),
            "sum" => Ok(Self::Sum),
            "variance" => Ok(Self::Variance),
            "deviation" | "std_deviation" => Ok(Self::Deviation),
            other => match other.strip_prefix("percentile_").map(str::parse::<f64>) {
                Some(Ok(percent)) if (0.0..=100.0).contains(&percent) => {
                    Ok(Self::Percentile(percent))
                }
                _ => Err(format!("unknown aggregation operator '{other}'")),
            },
        }
    }
}

impl TryFrom<String> for AggregationOperator {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AggregationOperator> for String {
    fn from(value: AggregationOperator) -> Self {
        value.to_string()
    }
}

impl fmt::Display for AggregationOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avg => f.write_str("avg"),
            Self::Max => f.write_str("max"),
            Self::Min => f.write_str("min"),
            Self::Sum => f.write_str("sum"),
            Self::Variance => f.write_str("variance"),
            Self::Deviation => f.write_str("deviation"),
            Self::Percentile(percent) => write!(f, "percentile_{percent}"),
        }
    }
}

/// Post aggregation instruction, parsed and carried but not interpreted yet
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Collate {
    pub name: String,
    #[serde(default)]
    pub parameter: BTreeMap<String, serde_yaml::Value>,
}

/// One aggregate query: filter, bucket fields and aggregation operators
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ComputeSpec {
    #[serde(default, deserialize_with = "scalar_map")]
    pub filter: BTreeMap<String, String>,
    pub buckets: Vec<String>,
    pub aggregations: BTreeMap<String, Vec<AggregationOperator>>,
    #[serde(default)]
    pub collate: Vec<Collate>,
}

/// A single (value field, operator) pair together with the leaf key it is stored under
#[derive(Clone, Debug, PartialEq)]
pub struct LeafKey {
    pub field: String,
    pub operator: AggregationOperator,
    pub key: String,
}

impl ComputeSpec {
    pub fn new<I, S>(buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filter: BTreeMap::new(),
            buckets: buckets.into_iter().map(Into::into).collect(),
            aggregations: BTreeMap::new(),
            collate: Vec::new(),
        }
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter.insert(field.into(), value.into());
        self
    }

    pub fn aggregate(
        mut self,
        field: impl Into<String>,
        operators: impl IntoIterator<Item = AggregationOperator>,
    ) -> Self {
        self.aggregations
            .entry(field.into())
            .or_default()
            .extend(operators);
        self
    }

    /// filter as an ordered list of (field, value) pairs
    pub fn filter_pairs(&self) -> Vec<(String, String)> {
        self.filter
            .iter()
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }

    /// All leaf keys of this spec. A single value field keeps the bare operator name,
    /// several fields are disambiguated as `<operator>_<field>`.
    pub fn leaf_keys(&self) -> Vec<LeafKey> {
        let single = self.aggregations.len() == 1;

        self.aggregations
            .iter()
            .flat_map(|(field, operators)| {
                operators.iter().map(move |operator| LeafKey {
                    field: field.clone(),
                    operator: *operator,
                    key: if single {
                        operator.to_string()
                    } else {
                        format!("{operator}_{field}")
                    },
                })
            })
            .collect()
    }
}

/// Fields to compare verbatim and the aggregate queries for one index
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct IndexSpec {
    #[serde(default)]
    pub compare: Vec<String>,
    #[serde(default)]
    pub compute: Vec<ComputeSpec>,
}

/// Everything needed to compare one benchmark stored in one kind of database
/// by one harness
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkSpec {
    pub benchmark: Benchmark,
    pub database: StoreType,
    pub harness: String,
    pub indices: BTreeMap<String, IndexSpec>,
    #[serde(default)]
    pub metadata: BTreeMap<String, IndexSpec>,
}

impl BenchmarkSpec {
    pub fn new(benchmark: Benchmark, database: StoreType, harness: impl Into<String>) -> Self {
        Self {
            benchmark,
            database,
            harness: harness.into(),
            indices: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn index<I, S>(mut self, name: impl Into<String>, compare: I, compute: Vec<ComputeSpec>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indices.insert(
            name.into(),
            IndexSpec {
                compare: compare.into_iter().map(Into::into).collect(),
                compute,
            },
        );
        self
    }

    pub fn indices(&self) -> impl Iterator<Item = &str> {
        self.indices.keys().map(String::as_str)
    }

    /// (compare fields, compute specs) for a single index
    pub fn resolve_index(&self, index: &str) -> Result<(&[String], &[ComputeSpec]), RegistryError> {
        self.indices
            .get(index)
            .map(|spec| (spec.compare.as_slice(), spec.compute.as_slice()))
            .ok_or_else(|| RegistryError::UnknownIndex(index.to_owned()))
    }

    pub fn compare_map(&self) -> CompareMap {
        debug!(benchmark = %self.benchmark, "Building compare map");

        self.indices
            .iter()
            .map(|(index, spec)| (index.clone(), spec.compare.clone()))
            .collect()
    }

    pub fn compute_map(&self) -> ComputeMap {
        debug!(benchmark = %self.benchmark, "Building compute map");

        self.indices
            .iter()
            .map(|(index, spec)| (index.clone(), spec.compute.clone()))
            .collect()
    }

    /// auxiliary search spec over metadata indices
    pub fn metadata_search_spec(&self) -> &BTreeMap<String, IndexSpec> {
        &self.metadata
    }
}

type RegistryKey = (Benchmark, StoreType, String);

/// Read-only lookup table of benchmark descriptors, built once at startup
#[derive(Clone, Debug, Default)]
pub struct Registry {
    specs: BTreeMap<RegistryKey, BenchmarkSpec>,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// registry with all descriptors shipped with touchstone
    pub fn builtin() -> Self {
        let mut registry = Self::empty();

        for database in [StoreType::Elasticsearch, StoreType::Sqlite] {
            registry.insert(kubeburner::descriptor(database));
            registry.insert(uperf::descriptor(database));
            registry.insert(ycsb::descriptor(database));
            registry.insert(pgbench::descriptor(database));
        }

        registry
    }

    /// register a descriptor, replacing any previous one for the same key
    pub fn insert(&mut self, spec: BenchmarkSpec) {
        let key = (spec.benchmark, spec.database, spec.harness.clone());

        if self.specs.insert(key, spec).is_some() {
            info!("Replaced an existing benchmark descriptor");
        }
    }

    pub fn resolve(
        &self,
        benchmark: Benchmark,
        database: StoreType,
        harness: &str,
    ) -> Result<&BenchmarkSpec, RegistryError> {
        debug!(%benchmark, %database, harness, "Resolving benchmark descriptor");

        self.specs
            .get(&(benchmark, database, harness.to_owned()))
            .ok_or_else(|| RegistryError::UnsupportedBenchmark {
                benchmark,
                database,
                harness: harness.to_owned(),
            })
    }

    /// all index names registered for a database type
    pub fn list_indices(&self, database: StoreType) -> Vec<&str> {
        let mut indices: Vec<&str> = self
            .specs
            .values()
            .filter(|spec| spec.database == database)
            .flat_map(BenchmarkSpec::indices)
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// accept any YAML scalar as a filter value
fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?
        .into_iter()
        .map(|(field, value)| {
            let value = match value {
                serde_yaml::Value::String(string) => string,
                serde_yaml::Value::Number(number) => number.to_string(),
                serde_yaml::Value::Bool(boolean) => boolean.to_string(),
                other => {
                    return Err(de::Error::custom(format!(
                        "filter {field} must be a scalar, got {other:?}"
                    )))
                }
            };

            Ok((field, value))
        })
        .collect()
}
