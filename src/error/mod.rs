//! Error handling for the shell.
//!
//! - [`kinds`]: the crate-wide [`ShellError`] and its sub-kinds
//! - [`mongo`]: structured information extracted from driver errors
//!
//! # Example
//!
//! ```rust,no_run
//! use mshell::error::{Result, ShellError};
//!
//! fn select(name: &str) -> Result<()> {
//!     if name.is_empty() {
//!         return Err(ShellError::Generic("specify database name".into()));
//!     }
//!     Ok(())
//! }
//! ```

pub mod kinds;
pub mod mongo;

pub use kinds::{
    ConfigError, ConnectionError, ExecutionError, ParseError, Result, ScriptError, ShellError,
};
pub use mongo::{ErrorDetails, ErrorInfo};
