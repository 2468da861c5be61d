pub mod documents;
#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod util;


use crate::{benchmarks::ComputeSpec, config::CompareConfig, tree::Node};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};
use thiserror::Error;
use tracing::info;

/// field -> value fetched verbatim for a single run
pub type Metadata = BTreeMap<String, String>;

#[derive(
    ValueEnum, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    Elasticsearch,
    Sqlite,
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Elasticsearch => "elasticsearch",
            Self::Sqlite => "sqlite",
        })
    }
}

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("Run {run} has no data in index {index}")]
    MissingRunData { run: String, index: String },
    #[cfg(feature = "elasticsearch")]
    #[error("Elasticsearch request failed")]
    Http(#[from] reqwest::Error),
    #[cfg(feature = "sqlite")]
    #[error("SQLite Error")]
    SQLite(rusqlite::Error),
    #[error("Failed to decode document")]
    Decode(#[from] serde_json::Error),
    #[error("Backend rejected the query: {0}")]
    Query(String),
    #[error("Support for {0} was not compiled in")]
    Unsupported(StoreType),
}

/// Aggregated data of one run for one compute spec, together with the bucket
/// fields and aggregation keys the query used
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputeResult {
    pub tree: Node,
    pub buckets: Vec<String>,
    pub aggregations: Vec<String>,
}

impl ComputeResult {
    /// result without any data, shaped like `spec`
    pub fn empty(spec: &ComputeSpec) -> Self {
        Self {
            tree: Node::new(),
            buckets: spec.buckets.clone(),
            aggregations: spec.leaf_keys().into_iter().map(|leaf| leaf.key).collect(),
        }
    }
}

/// Everything the comparison needs from a backing store
pub trait QueryAdapter: Send + Sync {
    /// fetch `fields` verbatim for `run`
    fn emit_compare(
        &self,
        run: &str,
        index: &str,
        fields: &[String],
    ) -> Result<Metadata, ConnectionError>;

    /// fetch the aggregates described by `spec` for `run`
    fn emit_compute(
        &self,
        run: &str,
        index: &str,
        spec: &ComputeSpec,
    ) -> Result<ComputeResult, ConnectionError>;
}

#[derive(Debug)]
/// All supported backends
/// (enum dispatch on top of `QueryAdapter`, the set of stores is closed)
pub enum ConnectionAdapter {
    #[cfg(feature = "elasticsearch")]
    Elasticsearch(elasticsearch::ElasticConnection),
    #[cfg(feature = "sqlite")]
    SQLite(sqlite::SharedConnection),
}

impl ConnectionAdapter {
    pub fn connect(
        store: StoreType,
        url: &str,
        config: &CompareConfig,
    ) -> Result<Self, ConnectionError> {
        info!(%store, url, "Connecting to backend");

        match store {
            #[cfg(feature = "elasticsearch")]
            StoreType::Elasticsearch => Ok(Self::Elasticsearch(
                elasticsearch::ElasticConnection::load(url, &config.elasticsearch)?,
            )),
            #[cfg(feature = "sqlite")]
            StoreType::Sqlite => Ok(Self::SQLite(sqlite::SharedConnection::load(url)?)),
            #[allow(unreachable_patterns)]
            unsupported => {
                let _ = config;
                Err(ConnectionError::Unsupported(unsupported))
            }
        }
    }

    pub fn close(self) -> Result<(), ConnectionError> {
        match self {
            #[cfg(feature = "elasticsearch")]
            Self::Elasticsearch(_) => Ok(()),
            #[cfg(feature = "sqlite")]
            Self::SQLite(connection) => connection.close(),
        }
    }
}

impl QueryAdapter for ConnectionAdapter {
    fn emit_compare(
        &self,
        run: &str,
        index: &str,
        fields: &[String],
    ) -> Result<Metadata, ConnectionError> {
        match self {
            #[cfg(feature = "elasticsearch")]
            Self::Elasticsearch(connection) => connection.emit_compare(run, index, fields),
            #[cfg(feature = "sqlite")]
            Self::SQLite(connection) => connection.emit_compare(run, index, fields),
        }
    }

    fn emit_compute(
        &self,
        run: &str,
        index: &str,
        spec: &ComputeSpec,
    ) -> Result<ComputeResult, ConnectionError> {
        match self {
            #[cfg(feature = "elasticsearch")]
            Self::Elasticsearch(connection) => connection.emit_compute(run, index, spec),
            #[cfg(feature = "sqlite")]
            Self::SQLite(connection) => connection.emit_compute(run, index, spec),
        }
    }
}
