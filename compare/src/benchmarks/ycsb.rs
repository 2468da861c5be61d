use super::{AggregationOperator::*, Benchmark, BenchmarkSpec, ComputeSpec, RIPSAW};
use crate::database::StoreType;
use tracing::debug;

pub fn descriptor(database: StoreType) -> BenchmarkSpec {
    debug!(%database, "Building search map for ycsb");

    BenchmarkSpec::new(Benchmark::Ycsb, database, RIPSAW).index(
        "ripsaw-ycsb-summary",
        [
            "uuid",
            "user",
            "cluster_name",
            "recordcount",
            "operationcount",
            "driver",
        ],
        vec![
            ComputeSpec::new(["workload_type.keyword"])
                .aggregate("data.OVERALL.Throughput(ops/sec)", [Max, Avg])
                .aggregate("data.OVERALL.RunTime(ms)", [Max, Avg]),
        ],
    )
}
