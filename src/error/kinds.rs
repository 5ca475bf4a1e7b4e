use std::{fmt, io};

use crate::error::mongo::format_mongodb_error;

/// Crate-wide `Result` type using [`ShellError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ShellError>;

/// Top-level error type for the shell.
///
/// Recoverable conditions (no database selected, unknown `show` alias) are
/// not errors; they travel as notices. Everything here ends at a single
/// `ERROR: <message>` print point or is attached to a shard outcome.
#[derive(Debug)]
pub enum ShellError {
    /// Connection and topology errors.
    Connection(ConnectionError),

    /// Script tokenizing/parsing errors.
    Parse(ParseError),

    /// Command execution errors.
    Execution(ExecutionError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// Script evaluation errors.
    Script(ScriptError),

    /// The operator interrupted a running command.
    Interrupted,

    /// Generic error with a free-form message.
    Generic(String),
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to establish a connection.
    ConnectionFailed(String),

    /// Invalid connection URI.
    InvalidUri(String),

    /// Ping command failed.
    PingFailed(String),

    /// A shard entry could not be parsed (`name=uri` expected).
    InvalidShard(String),

    /// Two shard entries share a name.
    DuplicateShard(String),
}

/// Parsing-specific errors.
#[derive(Debug)]
pub enum ParseError {
    /// Syntax error in a script.
    SyntaxError(String),

    /// Unexpected token while parsing.
    UnexpectedToken { expected: String, found: String },

    /// String literal without a closing quote.
    UnterminatedString(usize),

    /// Regex literal without a closing slash.
    UnterminatedRegex(usize),

    /// Character the lexer does not understand.
    UnexpectedChar { ch: char, position: usize },
}

/// Execution-specific errors.
#[derive(Debug)]
pub enum ExecutionError {
    /// Backend command failed.
    CommandFailed(String),

    /// Invalid operation parameters.
    InvalidParameters(String),

    /// A shard task did not complete.
    TaskFailed { shard: String, message: String },
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

/// Script evaluation errors.
#[derive(Debug)]
pub enum ScriptError {
    /// Name not present in the evaluation scope.
    ReferenceError(String),

    /// Value used in a way its type does not support.
    TypeError(String),

    /// Any other runtime failure.
    RuntimeError(String),

    /// Script file could not be found.
    FileNotFound(String),
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellError::Connection(e) => write!(f, "Connection error: {e}"),
            ShellError::Parse(e) => write!(f, "{e}"),
            ShellError::Execution(e) => write!(f, "{e}"),
            ShellError::Config(e) => write!(f, "Configuration error: {e}"),
            ShellError::Io(e) => write!(f, "I/O error: {e}"),
            ShellError::MongoDb(e) => format_mongodb_error(f, e),
            ShellError::Script(e) => write!(f, "{e}"),
            ShellError::Interrupted => write!(f, "Interrupted"),
            ShellError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::InvalidUri(uri) => write!(f, "Invalid connection URI: {uri}"),
            ConnectionError::PingFailed(msg) => write!(f, "Ping failed: {msg}"),
            ConnectionError::InvalidShard(entry) => {
                write!(f, "Invalid shard entry '{entry}', expected name=uri")
            }
            ConnectionError::DuplicateShard(name) => write!(f, "Duplicate shard name: {name}"),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::SyntaxError(msg) => write!(f, "SyntaxError: {msg}"),
            ParseError::UnexpectedToken { expected, found } => {
                write!(f, "SyntaxError: expected {expected}, found {found}")
            }
            ParseError::UnterminatedString(pos) => {
                write!(f, "SyntaxError: unterminated string at position {pos}")
            }
            ParseError::UnterminatedRegex(pos) => {
                write!(f, "SyntaxError: unterminated regex at position {pos}")
            }
            ParseError::UnexpectedChar { ch, position } => {
                write!(f, "SyntaxError: unexpected character '{ch}' at position {position}")
            }
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::CommandFailed(msg) => write!(f, "Command failed: {msg}"),
            ExecutionError::InvalidParameters(msg) => write!(f, "Invalid parameters: {msg}"),
            ExecutionError::TaskFailed { shard, message } => {
                write!(f, "Task for shard {shard} failed: {message}")
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::ReferenceError(name) => write!(f, "ReferenceError: {name} is not defined"),
            ScriptError::TypeError(msg) => write!(f, "TypeError: {msg}"),
            ScriptError::RuntimeError(msg) => write!(f, "{msg}"),
            ScriptError::FileNotFound(path) => write!(f, "Script file not found: {path}"),
        }
    }
}

impl std::error::Error for ShellError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShellError::Io(e) => Some(e),
            ShellError::MongoDb(e) => Some(e),
            _ => None,
        }
    }
}
impl std::error::Error for ConnectionError {}
impl std::error::Error for ParseError {}
impl std::error::Error for ExecutionError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for ScriptError {}

/* ========================= Conversions to ShellError ========================= */

impl From<io::Error> for ShellError {
    fn from(err: io::Error) -> Self {
        ShellError::Io(err)
    }
}

impl From<mongodb::error::Error> for ShellError {
    fn from(err: mongodb::error::Error) -> Self {
        ShellError::MongoDb(err)
    }
}

impl From<ConnectionError> for ShellError {
    fn from(err: ConnectionError) -> Self {
        ShellError::Connection(err)
    }
}

impl From<ParseError> for ShellError {
    fn from(err: ParseError) -> Self {
        ShellError::Parse(err)
    }
}

impl From<ExecutionError> for ShellError {
    fn from(err: ExecutionError) -> Self {
        ShellError::Execution(err)
    }
}

impl From<ConfigError> for ShellError {
    fn from(err: ConfigError) -> Self {
        ShellError::Config(err)
    }
}

impl From<ScriptError> for ShellError {
    fn from(err: ScriptError) -> Self {
        ShellError::Script(err)
    }
}

impl From<String> for ShellError {
    fn from(msg: String) -> Self {
        ShellError::Generic(msg)
    }
}

impl From<&str> for ShellError {
    fn from(msg: &str) -> Self {
        ShellError::Generic(msg.to_owned())
    }
}
