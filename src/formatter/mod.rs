//! Output formatting for shell results
//!
//! This module turns execution results into operator-visible text:
//! - Shell-style document rendering (see [`shell`])
//! - Grouped top-level numbers (`1,234,567`)
//! - Document lists with a `Results: N document(s)` header
//! - Cursor batches with a `Type "it" for more` continuation hint
//! - Per-shard blocks for fan-out mode

pub mod colorizer;
pub mod shell;

use mongodb::bson::{Bson, Document};

pub use colorizer::{AnsiColors, Colorizer};
pub use shell::ShellFormatter;

use crate::error::ShellError;
use crate::executor::{ExecutionResult, ResultData, ShardOutcome};

/// Hint appended to a cursor batch when the cursor has more documents.
pub const MORE_HINT: &str = "Type \"it\" for more";
pub const NO_SHARDS: &str = "No shards available";

/// Main formatter for execution results
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    shell: ShellFormatter,

    colorizer: Colorizer,

    /// Append `Execution time: Nms` to results
    show_timing: bool,
}

impl Formatter {
    /// Create a new formatter
    ///
    /// # Arguments
    /// * `use_colors` - Enable colored output
    pub fn new(use_colors: bool) -> Self {
        Self {
            shell: ShellFormatter::new(use_colors),
            colorizer: Colorizer::new(use_colors),
            show_timing: false,
        }
    }

    pub fn with_timing(mut self, show_timing: bool) -> Self {
        self.show_timing = show_timing;
        self
    }

    /// Format an execution result: printed lines first, then the value.
    ///
    /// Returns an empty string when there is nothing to show.
    pub fn format(&self, result: &ExecutionResult) -> String {
        let mut lines: Vec<String> = result.printed.clone();

        let data = self.format_data(&result.data);
        if !data.is_empty() {
            lines.push(data);
        }

        if self.show_timing && result.stats.execution_time_ms > 0 {
            lines.push(
                self.colorizer
                    .hint(&format!("Execution time: {}ms", result.stats.execution_time_ms)),
            );
        }

        lines.join("\n")
    }

    /// Format result data alone
    pub fn format_data(&self, data: &ResultData) -> String {
        match data {
            ResultData::Documents(docs) => self.format_document_list(docs),
            ResultData::Document(doc) => self.shell.format_document(doc),
            ResultData::Batch {
                documents,
                has_more,
            } => {
                if documents.is_empty() {
                    return "no results".to_string();
                }
                let mut out: Vec<String> = documents
                    .iter()
                    .map(|doc| self.shell.format_document(doc))
                    .collect();
                if *has_more {
                    out.push(self.colorizer.hint(MORE_HINT));
                }
                out.join("\n")
            }
            ResultData::Value(value) => self.format_value(value),
            ResultData::Message(msg) => msg.clone(),
            ResultData::List(names) => names.join("\n"),
            ResultData::None => String::new(),
        }
    }

    /// Top-level values: numbers grouped, strings raw, the rest shell style.
    pub fn format_value(&self, value: &Bson) -> String {
        match value {
            Bson::Int32(n) => self.colorizer.number(&group_integer(i64::from(*n))),
            Bson::Int64(n) => self.colorizer.number(&group_integer(*n)),
            Bson::Double(f) => self.colorizer.number(&group_number(*f)),
            Bson::String(s) => s.clone(),
            Bson::Array(items)
                if !items.is_empty() && items.iter().all(|i| matches!(i, Bson::Document(_))) =>
            {
                let docs: Vec<Document> = items
                    .iter()
                    .filter_map(|i| i.as_document().cloned())
                    .collect();
                self.format_document_list(&docs)
            }
            other => self.shell.format_value(other),
        }
    }

    /// `ERROR: <message>`
    pub fn format_error(&self, error: &ShellError) -> String {
        self.colorizer.error(&error.to_string())
    }

    /// One block per shard, in the order given.
    pub fn format_outcomes(&self, outcomes: &[ShardOutcome]) -> String {
        if outcomes.is_empty() {
            return NO_SHARDS.to_string();
        }
        outcomes
            .iter()
            .map(|outcome| {
                let banner = self
                    .colorizer
                    .header(&format!("=== Shard: {} ===", outcome.shard));
                let body = match &outcome.result {
                    Ok(result) => {
                        let text = self.format(result);
                        if text.is_empty() {
                            "(no output)".to_string()
                        } else {
                            text
                        }
                    }
                    Err(err) => self.format_error(err),
                };
                format!("{}\n{}", banner, body)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn format_document_list(&self, docs: &[Document]) -> String {
        let mut out = Vec::with_capacity(docs.len() + 1);
        out.push(format!("Results: {} document(s)", docs.len()));
        out.extend(docs.iter().map(|doc| self.shell.format_document(doc)));
        out.join("\n")
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Group an integer with `,` every three digits.
pub fn group_integer(n: i64) -> String {
    let grouped = group_digits(&n.unsigned_abs().to_string());
    if n < 0 { format!("-{grouped}") } else { grouped }
}

/// Insert thousands separators into a run of ASCII digits.
fn group_digits(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Group the integral part of a double, keeping any fraction.
pub fn group_number(f: f64) -> String {
    if !f.is_finite() {
        return if f.is_nan() {
            "NaN".to_string()
        } else if f > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };
    }

    let text = f.to_string();
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, frac)) => (i, Some(frac)),
        None => (text.as_str(), None),
    };
    let digits = int_part.trim_start_matches('-');
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return text;
    }
    let grouped = if int_part.starts_with('-') {
        format!("-{}", group_digits(digits))
    } else {
        group_digits(digits)
    };
    match frac_part {
        Some(frac) => format!("{}.{}", grouped, frac),
        None => grouped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn test_group_integer() {
        assert_eq!(group_integer(0), "0");
        assert_eq!(group_integer(999), "999");
        assert_eq!(group_integer(1000), "1,000");
        assert_eq!(group_integer(1234567), "1,234,567");
        assert_eq!(group_integer(-1234567), "-1,234,567");
    }

    #[test]
    fn test_group_number() {
        assert_eq!(group_number(1234567.5), "1,234,567.5");
        assert_eq!(group_number(-0.25), "-0.25");
        assert_eq!(group_number(12.0), "12");
        assert_eq!(group_number(f64::NAN), "NaN");
        assert_eq!(group_number(1e20), "100,000,000,000,000,000,000");
        assert_eq!(group_number(-1e20), "-100,000,000,000,000,000,000");
    }

    #[test]
    fn test_format_top_level_number() {
        let formatter = Formatter::new(false);
        let result = ExecutionResult::new(ResultData::Value(Bson::Int64(1234567)));
        assert_eq!(formatter.format(&result), "1,234,567");
    }

    #[test]
    fn test_format_document_list() {
        let formatter = Formatter::new(false);
        let result = ExecutionResult::new(ResultData::Documents(vec![doc! { "a": 1 }]));
        assert_eq!(formatter.format(&result), "Results: 1 document(s)\n{\n  a: 1\n}");
    }

    #[test]
    fn test_format_batch_hint() {
        let formatter = Formatter::new(false);
        let more = ResultData::Batch {
            documents: vec![doc! { "a": 1 }],
            has_more: true,
        };
        assert!(formatter.format_data(&more).ends_with(MORE_HINT));

        let last = ResultData::Batch {
            documents: vec![doc! { "a": 1 }],
            has_more: false,
        };
        assert!(!formatter.format_data(&last).contains(MORE_HINT));

        let empty = ResultData::Batch {
            documents: vec![],
            has_more: false,
        };
        assert_eq!(formatter.format_data(&empty), "no results");
    }

    #[test]
    fn test_printed_lines_come_first() {
        let formatter = Formatter::new(false);
        let result = ExecutionResult::message("done").with_printed(vec!["hello".into()]);
        assert_eq!(formatter.format(&result), "hello\ndone");
    }

    #[test]
    fn test_timing_line() {
        let formatter = Formatter::new(false).with_timing(true);
        let result = ExecutionResult::none().with_elapsed_ms(12);
        assert_eq!(formatter.format(&result), "Execution time: 12ms");
    }

    #[test]
    fn test_format_outcomes() {
        let formatter = Formatter::new(false);
        let outcomes = vec![
            ShardOutcome {
                shard: "s0".into(),
                result: Ok(ExecutionResult::new(ResultData::Value(Bson::Int32(3)))),
            },
            ShardOutcome {
                shard: "s1".into(),
                result: Err(ShellError::Generic("connection refused".into())),
            },
            ShardOutcome {
                shard: "s2".into(),
                result: Ok(ExecutionResult::none()),
            },
        ];
        assert_eq!(
            formatter.format_outcomes(&outcomes),
            "=== Shard: s0 ===\n3\n\n=== Shard: s1 ===\nERROR: connection refused\n\n=== Shard: s2 ===\n(no output)"
        );
    }
}
