//! Shell-style formatting for documents
//!
//! - BSON value formatting with type wrappers (ObjectId, ISODate, Long, etc.)
//! - Pretty-printed nested documents and arrays
//! - Optional color highlighting for different value types

use mongodb::bson::{Bson, Document};

use super::colorizer::Colorizer;

/// Largest integer shown without a `Long(...)` wrapper.
const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Shell-style document formatter
#[derive(Debug, Clone, Copy)]
pub struct ShellFormatter {
    colorizer: Colorizer,
    indent: usize,
}

impl ShellFormatter {
    /// Create a new shell formatter
    ///
    /// # Arguments
    /// * `use_colors` - Enable colored output
    pub fn new(use_colors: bool) -> Self {
        Self {
            colorizer: Colorizer::new(use_colors),
            indent: 2,
        }
    }

    pub fn format_document(&self, doc: &Document) -> String {
        self.format_document_with_indent(doc, 0)
    }

    pub fn format_value(&self, value: &Bson) -> String {
        self.format_bson_value(value, 0)
    }

    fn format_document_with_indent(&self, doc: &Document, indent_level: usize) -> String {
        if doc.is_empty() {
            return "{}".to_string();
        }

        let indent = " ".repeat((indent_level + 1) * self.indent);
        let entries: Vec<String> = doc
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}{}: {}",
                    indent,
                    self.colorizer.field_key(&shell_key(key)),
                    self.format_bson_value(value, indent_level + 1)
                )
            })
            .collect();

        format!(
            "{{\n{}\n{}}}",
            entries.join(",\n"),
            " ".repeat(indent_level * self.indent)
        )
    }

    fn format_bson_value(&self, value: &Bson, indent_level: usize) -> String {
        match value {
            Bson::ObjectId(oid) => self.colorizer.type_wrapper("ObjectId", &oid.to_hex()),
            Bson::DateTime(dt) => {
                let iso = dt
                    .try_to_rfc3339_string()
                    .unwrap_or_else(|_| dt.timestamp_millis().to_string());
                self.colorizer.iso_date(&iso)
            }
            Bson::Int64(n) if n.unsigned_abs() <= MAX_SAFE_INTEGER => self.colorizer.number(&n.to_string()),
            Bson::Int64(n) => self.colorizer.type_wrapper("Long", &n.to_string()),
            Bson::Decimal128(d) => self.colorizer.type_wrapper("NumberDecimal", &d.to_string()),
            Bson::String(s) => self.colorizer.string(s),
            Bson::Int32(n) => self.colorizer.number(&n.to_string()),
            Bson::Double(f) => self.colorizer.number(&format_double(*f)),
            Bson::Boolean(b) => self.colorizer.boolean(*b),
            Bson::Null | Bson::Undefined => self.colorizer.null(),
            Bson::Array(arr) => self.format_array(arr, indent_level),
            Bson::Document(doc) => self.format_document_with_indent(doc, indent_level),
            Bson::Binary(bin) => self
                .colorizer
                .bin_data(u8::from(bin.subtype), &hex::encode(&bin.bytes)),
            Bson::RegularExpression(regex) => self.colorizer.regex(&regex.pattern, &regex.options),
            Bson::Timestamp(ts) => self.colorizer.timestamp(ts.time, ts.increment),
            other => other.to_string(),
        }
    }

    fn format_array(&self, arr: &[Bson], indent_level: usize) -> String {
        if arr.is_empty() {
            return "[]".to_string();
        }

        let indent = " ".repeat((indent_level + 1) * self.indent);
        let items: Vec<String> = arr
            .iter()
            .map(|value| format!("{}{}", indent, self.format_bson_value(value, indent_level + 1)))
            .collect();

        format!(
            "[\n{}\n{}]",
            items.join(",\n"),
            " ".repeat(indent_level * self.indent)
        )
    }
}

/// Keys that are not plain identifiers are quoted.
fn shell_key(key: &str) -> String {
    let plain = !key.is_empty()
        && !key.starts_with(|c: char| c.is_ascii_digit())
        && key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if plain {
        key.to_string()
    } else {
        format!("'{}'", key.replace('\'', "\\'"))
    }
}

fn format_double(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        f.to_string()
    }
}
