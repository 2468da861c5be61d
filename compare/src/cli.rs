use crate::{benchmarks::Benchmark, database::StoreType, render::OutputMode};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "touchstone", version, about = "compare results from benchmarks")]
pub struct Args {
    /// which type of benchmark to compare
    #[arg(value_enum)]
    pub benchmark: Benchmark,

    /// the type of database data is stored in
    #[arg(value_enum)]
    pub database: StoreType,

    /// the test harness that was used to run the benchmark
    pub harness: String,

    /// run ids to compare, at least two
    #[arg(short, long, num_args = 1.., required = true)]
    pub uuid: Vec<String>,

    /// how the result should be printed
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputMode,

    /// database connection strings in the same order as the uuids,
    /// a single one is used for every uuid
    #[arg(short = 'c', long = "connection-url", visible_alias = "url", num_args = 1..)]
    pub connection_url: Vec<String>,

    /// YAML config with connection defaults and extra benchmark descriptors
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// number of runs fetched concurrently
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// -v for info, -vv for debug output
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}
