//! Command execution results and shard fan-out
//!
//! This module provides:
//! - [`ExecutionResult`] / [`ResultData`]: what a command produced
//! - [`ShardExecutor`]: runs one command against every shard concurrently

pub mod fanout;
pub mod result;

pub use fanout::{ShardExecutor, ShardOutcome};
pub use result::{ExecutionResult, ExecutionStats, ResultData};
