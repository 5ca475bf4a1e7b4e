//! mshell library
//!
//! The building blocks of a shell for document database clusters: script
//! text is evaluated against proxy objects, translated into canonical
//! commands, executed against one or many backend connections, and rendered
//! as shell-style text.
//!
//! # Modules
//!
//! - `bridge`: Proxy objects for the database, collections, cursors and replica set
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: Driver connections and shard topology
//! - `cursor`: Lazy batch cursor
//! - `error`: Error types and handling
//! - `executor`: Execution results and shard fan-out
//! - `formatter`: Output formatting and display
//! - `script`: Expression evaluator and script loading
//! - `session`: One endpoint's shell state
//! - `translator`: Dynamic values to canonical commands
//! - `transport`: Backend connection seam
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mshell::{CommandTranslator, Formatter, Session, transport::MemoryTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(MemoryTransport::new("memory"));
//!     let translator = Arc::new(CommandTranslator::new(transport, Some("shop".into()), 20));
//!     let mut session = Session::new("memory", translator);
//!
//!     session.execute("db.orders.insertOne({item: 'pen', qty: 5})").await?;
//!     let result = session.execute("db.orders.find({qty: {$gt: 1}})").await?;
//!     println!("{}", Formatter::new(false).format(&result));
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod cli;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod executor;
pub mod formatter;
pub mod script;
pub mod session;
pub mod translator;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use connection::{ConnectionManager, StaticTopology, TopologyProvider};
pub use error::{Result, ShellError};
pub use executor::{ExecutionResult, ResultData, ShardExecutor, ShardOutcome};
pub use formatter::Formatter;
pub use session::Session;
pub use translator::CommandTranslator;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
