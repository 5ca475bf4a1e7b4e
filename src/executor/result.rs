//! Execution result types
//!
//! - ExecutionResult: what one command produced, plus anything it printed
//! - ResultData: the shapes a result can take
//! - ExecutionStats: timing and document counts

use mongodb::bson::{Bson, Document};

/// Result of command execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub data: ResultData,

    pub stats: ExecutionStats,

    /// Lines written by `print`/`printjson`, in order
    pub printed: Vec<String>,
}

/// Data returned from command execution
#[derive(Debug, Clone, PartialEq)]
pub enum ResultData {
    /// Fully materialized list of documents
    Documents(Vec<Document>),

    /// Single document
    Document(Document),

    /// One batch pulled from a live cursor
    Batch { documents: Vec<Document>, has_more: bool },

    /// Any other canonical value (numbers, arrays, ...)
    Value(Bson),

    /// Text message (notices, confirmations)
    Message(String),

    /// List of names
    List(Vec<String>),

    /// No data
    None,
}

/// Execution statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionStats {
    pub execution_time_ms: u64,

    pub documents_returned: usize,
}

impl ExecutionResult {
    pub fn new(data: ResultData) -> Self {
        let documents_returned = data.document_count();
        Self {
            data,
            stats: ExecutionStats {
                execution_time_ms: 0,
                documents_returned,
            },
            printed: Vec::new(),
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self::new(ResultData::Message(text.into()))
    }

    pub fn none() -> Self {
        Self::new(ResultData::None)
    }

    pub fn with_printed(mut self, printed: Vec<String>) -> Self {
        self.printed = printed;
        self
    }

    pub fn with_elapsed_ms(mut self, ms: u64) -> Self {
        self.stats.execution_time_ms = ms;
        self
    }
}

impl ResultData {
    pub fn document_count(&self) -> usize {
        match self {
            ResultData::Documents(docs) | ResultData::Batch { documents: docs, .. } => docs.len(),
            ResultData::Document(_) => 1,
            _ => 0,
        }
    }

    /// Classify a canonical value. Arrays made only of documents are
    /// document lists.
    pub fn from_bson(value: Bson) -> Self {
        match value {
            Bson::Null | Bson::Undefined => ResultData::None,
            Bson::String(s) => ResultData::Message(s),
            Bson::Document(doc) => ResultData::Document(doc),
            Bson::Array(items)
                if !items.is_empty() && items.iter().all(|i| matches!(i, Bson::Document(_))) =>
            {
                ResultData::Documents(
                    items
                        .into_iter()
                        .filter_map(|i| match i {
                            Bson::Document(doc) => Some(doc),
                            _ => None,
                        })
                        .collect(),
                )
            }
            other => ResultData::Value(other),
        }
    }
}
