//! Script evaluation
//!
//! This module provides:
//! - A lexer and recursive-descent parser for the shell's expression subset
//! - [`ExpressionEvaluator`], which evaluates programs against a bridge scope
//! - [`ScriptLoader`] for reading script files passed on the command line

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;

use std::fs;
use std::path::Path;

pub use eval::{ExpressionEvaluator, ScriptEvaluator};
pub use parser::Parser;

use crate::error::{Result, ScriptError};

/// Script loader for reading and validating script files
pub struct ScriptLoader {
    /// Maximum script size in bytes
    max_size_bytes: u64,
}

impl ScriptLoader {
    /// Create a new script loader
    ///
    /// # Returns
    /// * `Self` - New loader with default settings
    pub fn new() -> Self {
        Self {
            max_size_bytes: 10 * 1024 * 1024, // 10 MB
        }
    }

    /// Load script from file
    ///
    /// # Arguments
    /// * `path` - Path to script file
    ///
    /// # Returns
    /// * `Result<String>` - Script content or error
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScriptError::FileNotFound(path.display().to_string()).into());
        }

        let metadata = fs::metadata(path)?;
        if metadata.len() > self.max_size_bytes {
            return Err(ScriptError::RuntimeError(format!(
                "Script file too large: {} bytes (max: {} bytes)",
                metadata.len(),
                self.max_size_bytes
            ))
            .into());
        }

        fs::read_to_string(path)
            .map_err(|e| ScriptError::RuntimeError(format!("Failed to read script file: {}", e)).into())
    }

    /// Set maximum script size
    pub fn set_max_size(&mut self, bytes: u64) {
        self.max_size_bytes = bytes;
    }
}

impl Default for ScriptLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// True while `source` has unclosed brackets or an unterminated string,
/// meaning the operator is still typing a multi-line command.
pub fn needs_continuation(source: &str) -> bool {
    let mut depth: i64 = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in source.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' | '(' | '[' => depth += 1,
            '}' | ')' | ']' => depth -= 1,
            _ => {}
        }
    }

    quote.is_some() || depth > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "db.orders.count()").unwrap();
        let content = ScriptLoader::new().load_file(file.path()).unwrap();
        assert_eq!(content.trim(), "db.orders.count()");
    }

    #[test]
    fn test_needs_continuation() {
        assert!(needs_continuation("db.orders.find({"));
        assert!(needs_continuation("db.orders.insertOne({a: [1,"));
        assert!(needs_continuation("print('open"));
        assert!(!needs_continuation("db.orders.find({a: '{'})"));
        assert!(!needs_continuation("db.orders.find({\n  a: 1\n})"));
        assert!(!needs_continuation("print('it\\'s')"));
    }

    #[test]
    fn test_missing_and_oversized_files() {
        let err = ScriptLoader::new().load_file("/nonexistent/script.js").unwrap_err();
        assert_eq!(err.to_string(), "Script file not found: /nonexistent/script.js");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "db.orders.find()").unwrap();
        let mut loader = ScriptLoader::new();
        loader.set_max_size(4);
        assert!(loader.load_file(file.path()).unwrap_err().to_string().contains("too large"));
    }
}
