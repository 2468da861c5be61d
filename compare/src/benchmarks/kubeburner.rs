use super::{AggregationOperator::*, Benchmark, BenchmarkSpec, ComputeSpec, RIPSAW};
use crate::database::StoreType;
use tracing::debug;

pub fn descriptor(database: StoreType) -> BenchmarkSpec {
    debug!(%database, "Building search map for kube-burner");

    BenchmarkSpec::new(Benchmark::Kubeburner, database, RIPSAW).index(
        "ripsaw-kube-burner",
        ["uuid"],
        vec![ComputeSpec::new(["metricName.keyword"]).aggregate("value", [Avg, Max, Min])],
    )
}
