use crate::{
    benchmarks::{BenchmarkSpec, ComputeSpec, RegistryError},
    cli::Args,
    config::{CompareConfig, ConfigErrors},
    database::{ComputeResult, ConnectionAdapter, ConnectionError, Metadata, QueryAdapter, StoreType},
    render::{
        write_json, write_legacy_csv, write_metadata, write_text, write_yaml, ComputeTable,
        CsvExporter, MetadataTable, OutputMode, RenderError,
    },
    tree::{distribute, merge, Node},
};
use itertools::Itertools;
use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};
use std::{collections::BTreeMap, io::Write, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum CompareError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error("Invalid arguments: {0}")]
    Argument(String),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("Failed to build the fetch thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// One connection url per run. Fewer urls than runs means the first one is
/// used for every run, surplus urls are ignored.
pub fn broadcast_urls(urls: &[String], runs: usize) -> Result<Vec<String>, CompareError> {
    match urls {
        [] => Err(CompareError::Argument(
            "at least one connection url is required".to_owned(),
        )),
        _ if urls.len() >= runs => {
            if urls.len() > runs {
                warn!(
                    "Got {} connection urls for {runs} runs, ignoring the surplus",
                    urls.len()
                );
            }

            Ok(urls[..runs].to_vec())
        }
        [first, rest @ ..] => {
            if !rest.is_empty() {
                warn!("Fewer connection urls than runs, using {first} for every run");
            }

            Ok(vec![first.clone(); runs])
        }
    }
}

/// A run id and the store its results live in
#[derive(Debug)]
pub struct Run<A> {
    pub id: String,
    pub adapter: Arc<A>,
}

impl<A> Run<A> {
    pub fn new(id: impl Into<String>, adapter: Arc<A>) -> Self {
        Self {
            id: id.into(),
            adapter,
        }
    }
}

/// a missing run renders as blank cells, every other failure aborts
fn tolerate_missing<T>(
    result: Result<T, ConnectionError>,
    empty: impl FnOnce() -> T,
) -> Result<T, ConnectionError> {
    match result {
        Err(ConnectionError::MissingRunData { run, index }) => {
            warn!(run = %run, index = %index, "Run has no data, its cells stay blank");

            Ok(empty())
        }
        other => other,
    }
}

/// hook for post aggregation instructions, none are interpreted yet
fn collate(spec: &ComputeSpec, tree: Node) -> Node {
    for instruction in spec.collate.iter() {
        debug!(name = %instruction.name, "Skipping collate instruction");
    }

    tree
}

/// One comparison pass of a benchmark over two or more runs
pub struct Comparison<'a, A> {
    spec: &'a BenchmarkSpec,
    runs: Vec<Run<A>>,
    pool: ThreadPool,
}

impl<'a, A: QueryAdapter> Comparison<'a, A> {
    pub fn new(
        spec: &'a BenchmarkSpec,
        runs: Vec<Run<A>>,
        jobs: Option<usize>,
    ) -> Result<Self, CompareError> {
        if runs.len() < 2 {
            return Err(CompareError::Argument(format!(
                "at least two uuids are needed for a comparison, got {}",
                runs.len()
            )));
        }

        let threads = jobs.unwrap_or(runs.len()).max(1);
        debug!("Starting fetch pool with {threads} threads");

        Ok(Self {
            spec,
            runs,
            pool: ThreadPoolBuilder::new().num_threads(threads).build()?,
        })
    }

    pub fn run_ids(&self) -> Vec<String> {
        self.runs.iter().map(|run| run.id.clone()).collect()
    }

    /// verbatim fields of every run, blank for runs without data
    pub fn metadata(&self, index: &str, fields: &[String]) -> Result<MetadataTable, CompareError> {
        let fetched: Vec<Metadata> = self.pool.install(|| {
            self.runs
                .par_iter()
                .map(|run| {
                    tolerate_missing(run.adapter.emit_compare(&run.id, index, fields), Metadata::new)
                })
                .collect::<Result<Vec<_>, ConnectionError>>()
        })?;

        let mut table: MetadataTable = fields
            .iter()
            .map(|field| (field.clone(), BTreeMap::new()))
            .collect();

        for (run, values) in self.runs.iter().zip(fetched) {
            for (field, value) in values {
                table.entry(field).or_default().insert(run.id.clone(), value);
            }
        }

        Ok(table)
    }

    /// results of every run in run order, fetched concurrently
    #[instrument(level = "debug", skip(self, spec))]
    fn fetch(&self, index: &str, spec: &ComputeSpec) -> Result<Vec<ComputeResult>, CompareError> {
        let results = self.pool.install(|| {
            self.runs
                .par_iter()
                .map(|run| {
                    debug!(run = %run.id, "Fetching aggregates");

                    tolerate_missing(run.adapter.emit_compute(&run.id, index, spec), || {
                        ComputeResult::empty(spec)
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })?;

        Ok(results)
    }

    /// The tree for structured exports: every compute spec of every index, each
    /// placed below the path of its filter
    pub fn structured(&self) -> Result<Node, CompareError> {
        let mut truth = Node::new();

        for index in self.spec.indices() {
            let (_, computes) = self.spec.resolve_index(index)?;
            let mut tree = Node::new();

            for compute in computes {
                let filter = compute.filter_pairs();

                for result in self.fetch(index, compute)? {
                    if !result.tree.is_empty() {
                        tree = distribute(&filter, tree, filter.len(), result.tree);
                    }
                }

                tree = collate(compute, tree);
            }

            truth.absorb(tree);
        }

        Ok(truth)
    }

    /// One merged table per compute spec of `index` for the row based outputs
    pub fn tables(&self, index: &str) -> Result<Vec<ComputeTable>, CompareError> {
        let (_, computes) = self.spec.resolve_index(index)?;

        computes
            .iter()
            .map(|compute| -> Result<ComputeTable, CompareError> {
                let results = self.fetch(index, compute)?;

                let aggregations = results
                    .iter()
                    .flat_map(|result| result.aggregations.iter().cloned())
                    .unique()
                    .collect_vec();
                let buckets = results
                    .last()
                    .map(|result| result.buckets.clone())
                    .unwrap_or_else(|| compute.buckets.clone());
                let tree = results
                    .iter()
                    .fold(Node::new(), |tree, result| merge(&tree, &result.tree));

                Ok(ComputeTable {
                    filter: compute.filter_pairs(),
                    buckets,
                    aggregations,
                    tree: collate(compute, tree),
                })
            })
            .collect()
    }

    pub fn write<W: Write>(&self, mode: OutputMode, out: &mut W) -> Result<(), CompareError> {
        let runs = self.run_ids();
        info!(benchmark = %self.spec.benchmark, ?mode, runs = runs.len(), "Comparing runs");

        if mode.is_structured() {
            let tree = self.structured()?;

            match mode {
                OutputMode::Json => write_json(out, &tree)?,
                OutputMode::Yaml => write_yaml(out, &tree)?,
                _ => write_legacy_csv(out, &tree, &runs)?,
            }

            return Ok(());
        }

        match mode {
            OutputMode::Csv => {
                let mut exporter = CsvExporter::new(out);

                for index in self.spec.indices() {
                    for table in self.tables(index)? {
                        exporter.write_table(&table, &runs)?;
                    }
                }

                exporter.finish()?;
            }
            _ => {
                for index in self.spec.indices() {
                    let (fields, _) = self.spec.resolve_index(index)?;
                    let metadata = self.metadata(index, fields)?;
                    write_metadata(out, fields, &metadata, &runs)?;

                    for table in self.tables(index)? {
                        write_text(out, &table, &runs)?;
                    }
                }
            }
        }

        Ok(())
    }
}

impl Comparison<'_, ConnectionAdapter> {
    /// close every connection once its last run lets go of it
    pub fn close(self) -> Result<(), CompareError> {
        for run in self.runs {
            if let Ok(adapter) = Arc::try_unwrap(run.adapter) {
                adapter.close()?;
            }
        }

        Ok(())
    }
}

/// connect each run to its url, runs sharing a url share the connection
pub fn connect_runs(
    store: StoreType,
    ids: &[String],
    urls: &[String],
    config: &CompareConfig,
) -> Result<Vec<Run<ConnectionAdapter>>, CompareError> {
    let mut connections: BTreeMap<&str, Arc<ConnectionAdapter>> = BTreeMap::new();

    ids.iter()
        .zip(urls.iter())
        .map(|(id, url)| -> Result<Run<ConnectionAdapter>, CompareError> {
            let adapter = match connections.get(url.as_str()) {
                Some(adapter) => adapter.clone(),
                None => {
                    let adapter = Arc::new(ConnectionAdapter::connect(store, url, config)?);
                    connections.insert(url.as_str(), adapter.clone());
                    adapter
                }
            };

            Ok(Run::new(id.clone(), adapter))
        })
        .collect()
}

/// Resolve the benchmark, connect to every run's store and write the comparison
pub fn execute<W: Write>(args: &Args, config: &CompareConfig, out: &mut W) -> Result<(), CompareError> {
    if args.uuid.len() < 2 {
        return Err(CompareError::Argument(format!(
            "at least two uuids are needed for a comparison, got {}",
            args.uuid.len()
        )));
    }

    let registry = config.registry();
    let spec = registry.resolve(args.benchmark, args.database, &args.harness.to_lowercase())?;

    let urls = if args.connection_url.is_empty() {
        &config.connection_urls
    } else {
        &args.connection_url
    };
    let urls = broadcast_urls(urls, args.uuid.len())?;

    let runs = connect_runs(args.database, &args.uuid, &urls, config)?;
    let comparison = Comparison::new(spec, runs, args.jobs.or(config.jobs))?;

    comparison.write(args.output, out)?;
    out.flush().map_err(RenderError::from)?;

    comparison.close()
}
