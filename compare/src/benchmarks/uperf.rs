use super::{AggregationOperator::*, Benchmark, BenchmarkSpec, ComputeSpec, RIPSAW};
use crate::database::StoreType;
use tracing::debug;

const BUCKETS: [&str; 3] = ["protocol", "message_size", "num_threads"];

pub fn descriptor(database: StoreType) -> BenchmarkSpec {
    debug!(%database, "Building search map for uperf");

    BenchmarkSpec::new(Benchmark::Uperf, database, RIPSAW).index(
        "ripsaw-uperf-results",
        [
            "uuid",
            "user",
            "cluster_name",
            "hostnetwork",
            "service_ip",
            "kind",
        ],
        vec![
            ComputeSpec::new(BUCKETS)
                .filter("test_type.keyword", "stream")
                .aggregate("norm_byte", [Max, Avg]),
            ComputeSpec::new(BUCKETS)
                .filter("test_type.keyword", "rr")
                .aggregate("norm_ops", [Max, Avg])
                .aggregate("norm_ltcy", [Avg, Percentile(95.0), Percentile(99.0)]),
        ],
    )
}
