use super::{AggregationOperator::*, Benchmark, BenchmarkSpec, ComputeSpec, RIPSAW};
use crate::database::StoreType;
use tracing::debug;

pub fn descriptor(database: StoreType) -> BenchmarkSpec {
    debug!(%database, "Building search map for pgbench");

    BenchmarkSpec::new(Benchmark::Pgbench, database, RIPSAW).index(
        "ripsaw-pgbench-summary",
        [
            "uuid",
            "user",
            "cluster_name",
            "scaling_factor",
            "clients",
            "threads",
            "transaction_type",
        ],
        vec![ComputeSpec::new(["transaction_type.keyword"])
            .aggregate("tps_incl_con_est", [Max, Avg, Min])
            .aggregate("latency_average_ms", [Avg, Deviation])],
    )
}
