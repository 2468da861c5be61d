pub mod benchmarks;
pub mod cli;
pub mod compare;
pub mod config;
pub mod database;
pub mod render;
pub mod tree;

#[cfg(test)]
mod compare_test;
#[cfg(test)]
mod render_test;

pub use compare::{execute, CompareError, Comparison, Run};
pub use tree::{distribute, merge, Node};
