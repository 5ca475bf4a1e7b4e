//! Canonical value converter
//!
//! Turns whatever the evaluator hands the bridge into canonical BSON:
//! - objects and arrays convert element-wise, preserving order
//! - regex literals become `{$regex, $options}` markers
//! - `{$regex: /re/flags}` is flattened at the parent key
//! - extended-JSON helper shapes (`$oid`, `$date`, `$numberLong`,
//!   `$numberInt`) become native values
//! - everything else falls back to its textual form
//!
//! Conversion is total: it never fails, and it is idempotent on its own
//! output.

use mongodb::bson::{Bson, DateTime, Document, oid::ObjectId};
use tracing::warn;

use crate::bridge::{RegexLiteral, ShellValue};

/// Convert a dynamic value to a canonical value.
pub fn convert(value: &ShellValue) -> Bson {
    match value {
        ShellValue::Null => Bson::Null,
        ShellValue::Bool(b) => Bson::Boolean(*b),
        ShellValue::Number(n) => number_to_bson(*n),
        ShellValue::String(s) => Bson::String(s.clone()),
        ShellValue::Regex(re) => Bson::Document(regex_marker(re)),
        ShellValue::Object(entries) => object_to_bson(entries),
        ShellValue::Array(items) => Bson::Array(items.iter().map(convert).collect()),
        ShellValue::Canonical(b) => b.clone(),
        ShellValue::Opaque(opaque) => match opaque.wrapped.as_deref() {
            Some(ShellValue::Regex(re)) => Bson::Document(regex_marker(re)),
            _ => Bson::String(opaque.text.clone()),
        },
        ShellValue::Proxy(_) | ShellValue::Method(_) => Bson::String(value.to_string()),
    }
}

/// Convert a value that must be a document (filter, update, projection...).
///
/// `null`/absent becomes the empty document; any other non-document shape
/// is logged and also treated as empty.
pub fn to_document(value: &ShellValue) -> Document {
    match convert(value) {
        Bson::Document(doc) => doc,
        Bson::Null => Document::new(),
        other => {
            warn!("expected a document, got {}; using {{}}", other);
            Document::new()
        }
    }
}

/// Convert a value that must be a list of documents (pipelines, bulk inserts).
///
/// A single document is accepted as a one-element list.
pub fn to_document_list(value: &ShellValue) -> Vec<Document> {
    match convert(value) {
        Bson::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Bson::Document(doc) => Some(doc),
                other => {
                    warn!("skipping non-document list element: {}", other);
                    None
                }
            })
            .collect(),
        Bson::Document(doc) => vec![doc],
        Bson::Null => Vec::new(),
        other => {
            warn!("expected a list of documents, got {}", other);
            Vec::new()
        }
    }
}

/// Build the `{$regex, $options}` marker for a literal.
///
/// `$options` is omitted when the literal has no flags.
pub fn regex_marker(re: &RegexLiteral) -> Document {
    let (pattern, flags) = regex_parts(re);
    let mut doc = Document::new();
    doc.insert("$regex", pattern);
    if !flags.is_empty() {
        doc.insert("$options", flags);
    }
    doc
}

/// Pattern and flags of a literal.
///
/// Structured accessors win; otherwise the text is split at its last `/`.
/// Text that does not look like `/pattern/flags` is used whole as the
/// pattern.
pub fn regex_parts(re: &RegexLiteral) -> (String, String) {
    if let Some(source) = &re.source {
        return (source.clone(), re.flags.clone().unwrap_or_default());
    }

    let text = re.text.as_str();
    if let Some(body) = text.strip_prefix('/') {
        if let Some(last) = body.rfind('/') {
            return (body[..last].to_string(), body[last + 1..].to_string());
        }
    }
    (text.to_string(), String::new())
}

/// Regex literal inside a value, whether bare or boxed in a host wrapper.
fn as_regex(value: &ShellValue) -> Option<&RegexLiteral> {
    match value {
        ShellValue::Regex(re) => Some(re),
        ShellValue::Opaque(opaque) => match opaque.wrapped.as_deref() {
            Some(ShellValue::Regex(re)) => Some(re),
            _ => None,
        },
        _ => None,
    }
}

fn object_to_bson(entries: &[(String, ShellValue)]) -> Bson {
    let mut doc = Document::new();

    for (key, value) in entries {
        if key == "$regex" {
            if let Some(re) = as_regex(value) {
                let (pattern, flags) = regex_parts(re);
                doc.insert("$regex", pattern);
                // An explicit `$options` sibling overwrites this on insert.
                if !flags.is_empty() && !doc.contains_key("$options") {
                    doc.insert("$options", flags);
                }
                continue;
            }
        }
        doc.insert(key.clone(), convert(value));
    }

    extended_json(&doc).unwrap_or(Bson::Document(doc))
}

/// Recognize single-key extended-JSON helper documents.
fn extended_json(doc: &Document) -> Option<Bson> {
    if doc.len() != 1 {
        return None;
    }
    let (key, value) = doc.iter().next()?;
    match (key.as_str(), value) {
        ("$oid", Bson::String(hex)) => ObjectId::parse_str(hex).ok().map(Bson::ObjectId),
        ("$date", Bson::String(iso)) => DateTime::parse_rfc3339_str(iso).ok().map(Bson::DateTime),
        ("$date", Bson::Int64(ms)) => Some(Bson::DateTime(DateTime::from_millis(*ms))),
        ("$date", Bson::Int32(ms)) => Some(Bson::DateTime(DateTime::from_millis(i64::from(*ms)))),
        ("$numberLong", Bson::String(n)) => n.trim().parse::<i64>().ok().map(Bson::Int64),
        ("$numberInt", Bson::String(n)) => n.trim().parse::<i32>().ok().map(Bson::Int32),
        _ => None,
    }
}

/// Integral values become the narrowest integer type that holds them.
pub fn number_to_bson(n: f64) -> Bson {
    if n.fract() == 0.0 && n.is_finite() {
        if n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) {
            return Bson::Int32(n as i32);
        }
        if n >= i64::MIN as f64 && n < i64::MAX as f64 {
            return Bson::Int64(n as i64);
        }
    }
    Bson::Double(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::OpaqueValue;
    use mongodb::bson::doc;

    fn obj(entries: Vec<(&str, ShellValue)>) -> ShellValue {
        ShellValue::Object(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn test_bare_regex_with_flags() {
        let out = convert(&ShellValue::Regex(RegexLiteral::from_text("/ab+c/i")));
        assert_eq!(out, Bson::Document(doc! { "$regex": "ab+c", "$options": "i" }));
    }

    #[test]
    fn test_bare_regex_without_flags_has_no_options() {
        let out = convert(&ShellValue::Regex(RegexLiteral::from_text("/ab+c/")));
        assert_eq!(out, Bson::Document(doc! { "$regex": "ab+c" }));
    }

    #[test]
    fn test_regex_split_at_last_slash() {
        let (pattern, flags) = regex_parts(&RegexLiteral::from_text("/a/b/gi"));
        assert_eq!(pattern, "a/b");
        assert_eq!(flags, "gi");
    }

    #[test]
    fn test_unparseable_regex_text_is_whole_pattern() {
        let out = convert(&ShellValue::Regex(RegexLiteral::from_text("abc")));
        assert_eq!(out, Bson::Document(doc! { "$regex": "abc" }));
    }

    #[test]
    fn test_structured_accessors_preferred() {
        let re = RegexLiteral {
            source: Some("x+".into()),
            flags: Some("m".into()),
            text: "/ignored/".into(),
        };
        assert_eq!(regex_marker(&re), doc! { "$regex": "x+", "$options": "m" });
    }

    #[test]
    fn test_nested_regex_flattened_at_parent_key() {
        let value = obj(vec![(
            "name",
            obj(vec![("$regex", ShellValue::Regex(RegexLiteral::new("abc", "i")))]),
        )]);
        assert_eq!(
            convert(&value),
            Bson::Document(doc! { "name": { "$regex": "abc", "$options": "i" } })
        );
    }

    #[test]
    fn test_wrapped_regex_flattened() {
        let wrapped = ShellValue::Opaque(OpaqueValue {
            type_name: "RegExp".into(),
            text: "/^a/".into(),
            wrapped: Some(Box::new(ShellValue::Regex(RegexLiteral::from_text("/^a/")))),
        });
        let value = obj(vec![("name", obj(vec![("$regex", wrapped)]))]);
        assert_eq!(convert(&value), Bson::Document(doc! { "name": { "$regex": "^a" } }));
    }

    #[test]
    fn test_explicit_options_sibling_wins() {
        let value = obj(vec![
            ("$regex", ShellValue::Regex(RegexLiteral::new("abc", "i"))),
            ("$options", ShellValue::string("s")),
        ]);
        assert_eq!(convert(&value), Bson::Document(doc! { "$regex": "abc", "$options": "s" }));
    }

    #[test]
    fn test_other_siblings_kept() {
        let value = obj(vec![
            ("$regex", ShellValue::Regex(RegexLiteral::new("abc", ""))),
            ("$ne", ShellValue::string("abcd")),
        ]);
        assert_eq!(convert(&value), Bson::Document(doc! { "$regex": "abc", "$ne": "abcd" }));
    }

    #[test]
    fn test_numbers_narrowest_integer() {
        assert_eq!(convert(&ShellValue::Number(1.0)), Bson::Int32(1));
        assert_eq!(convert(&ShellValue::Number(5_000_000_000.0)), Bson::Int64(5_000_000_000));
        assert_eq!(convert(&ShellValue::Number(2.5)), Bson::Double(2.5));
    }

    #[test]
    fn test_extended_json_shapes() {
        let oid = obj(vec![("$oid", ShellValue::string("65705d84dfc3f3b5094e1f72"))]);
        assert!(matches!(convert(&oid), Bson::ObjectId(_)));

        let long = obj(vec![("$numberLong", ShellValue::string("42"))]);
        assert_eq!(convert(&long), Bson::Int64(42));

        let date = obj(vec![("$date", ShellValue::string("2024-01-02T03:04:05Z"))]);
        assert!(matches!(convert(&date), Bson::DateTime(_)));

        let bad = obj(vec![("$oid", ShellValue::string("nope"))]);
        assert_eq!(convert(&bad), Bson::Document(doc! { "$oid": "nope" }));
    }

    #[test]
    fn test_opaque_uses_text() {
        let value = ShellValue::Opaque(OpaqueValue {
            type_name: "Function".into(),
            text: "function () {}".into(),
            wrapped: None,
        });
        assert_eq!(convert(&value), Bson::String("function () {}".into()));
    }

    #[test]
    fn test_conversion_is_idempotent() {
        let samples = vec![
            obj(vec![
                ("a", ShellValue::Number(1.0)),
                ("name", obj(vec![("$regex", ShellValue::Regex(RegexLiteral::new("x", "i")))])),
                ("tags", ShellValue::Array(vec![ShellValue::string("t"), ShellValue::Null])),
                ("when", obj(vec![("$date", ShellValue::string("2024-01-02T03:04:05Z"))])),
            ]),
            ShellValue::Regex(RegexLiteral::from_text("/q/")),
            ShellValue::Number(7.25),
            ShellValue::Null,
        ];
        for sample in samples {
            let once = convert(&sample);
            let twice = convert(&ShellValue::Canonical(once.clone()));
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_document_helpers() {
        assert!(to_document(&ShellValue::Null).is_empty());
        assert!(to_document(&ShellValue::Number(3.0)).is_empty());

        let list = to_document_list(&ShellValue::Array(vec![
            obj(vec![("$match", obj(vec![]))]),
            ShellValue::Number(1.0),
        ]));
        assert_eq!(list, vec![doc! { "$match": {} }]);

        let single = to_document_list(&obj(vec![("a", ShellValue::Number(1.0))]));
        assert_eq!(single, vec![doc! { "a": 1 }]);
    }
}
