use std::fmt;

use mongodb::bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// Structured information pulled out of a driver error.
///
/// Rendered as a single `Name(code): message` line for the operator; the
/// JSON form is logged at `debug` level.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) details: Option<ErrorDetails>,
}

/// Namespace and index details of a write failure.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) key: Option<Document>,
}

impl ErrorInfo {
    /// Compact JSON form, used for debug logging.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// One-line operator-facing summary.
    pub fn summary(&self) -> String {
        let message = self.message.as_deref().unwrap_or("unknown error");
        match (&self.name, self.code) {
            (Some(name), Some(code)) => format!("{name}({code}): {message}"),
            (None, Some(code)) => format!("code {code}: {message}"),
            _ => message.to_string(),
        }
    }
}

/// Display hook for `ShellError::MongoDb`.
pub fn format_mongodb_error(
    f: &mut fmt::Formatter<'_>,
    error: &mongodb::error::Error,
) -> fmt::Result {
    let info = extract_error_info(error);
    if let Ok(json) = info.to_json() {
        tracing::debug!("driver error: {}", json);
    }
    write!(f, "{}", info.summary())
}

/// Extract structured information from a driver error using its typed kinds.
pub fn extract_error_info(error: &mongodb::error::Error) -> ErrorInfo {
    use mongodb::error::{ErrorKind, WriteFailure};

    let mut info = ErrorInfo::default();

    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            info.error_type = Some("write_error".to_string());
            info.code = Some(write_error.code);
            info.message = Some(write_error.message.clone());
            info.details = Some(details_from(&write_error.details, &write_error.message));
        }
        ErrorKind::Write(WriteFailure::WriteConcernError(wc_error)) => {
            info.error_type = Some("write_concern_error".to_string());
            info.code = Some(wc_error.code);
            info.message = Some(wc_error.message.clone());
        }
        ErrorKind::Command(command_error) => {
            info.error_type = Some("command_error".to_string());
            info.code = Some(command_error.code);
            info.message = Some(command_error.message.clone());
        }
        ErrorKind::InsertMany(insert_error) => {
            info.error_type = Some("insert_many_error".to_string());
            if let Some(first) = insert_error.write_errors.as_ref().and_then(|e| e.first()) {
                info.code = Some(first.code);
                info.message = Some(first.message.clone());
                info.details = Some(details_from(&first.details, &first.message));
            } else if let Some(wc_error) = &insert_error.write_concern_error {
                info.code = Some(wc_error.code);
                info.message = Some(wc_error.message.clone());
            }
        }
        ErrorKind::Authentication { message, .. } => {
            info.error_type = Some("authentication_error".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::InvalidArgument { message, .. } => {
            info.error_type = Some("invalid_argument".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::ServerSelection { message, .. } => {
            info.error_type = Some("server_selection_error".to_string());
            info.message = Some(message.clone());
        }
        _ => {
            info.message = Some(error.to_string());
        }
    }

    if let Some(code) = info.code {
        info.name = error_name(code);
        if code == 11000 || code == 11001 {
            info.message = Some("Duplicate key error".to_string());
        }
    }

    info
}

/// Human-readable name for well-known server error codes.
fn error_name(code: i32) -> Option<String> {
    let name = match code {
        11000 | 11001 => "DuplicateKey",
        13 => "Unauthorized",
        18 => "AuthenticationFailed",
        26 => "NamespaceNotFound",
        50 => "MaxTimeMSExpired",
        59 => "CommandNotFound",
        76 => "NoReplicationEnabled",
        94 => "NotYetInitialized",
        121 => "DocumentValidationFailure",
        _ => return None,
    };
    Some(name.to_string())
}

/// Pull namespace/index/key out of an error details document, falling back
/// to the `collection: ` and `index: ` fragments of the message.
fn details_from(error_details: &Option<Document>, message: &str) -> ErrorDetails {
    let mut details = ErrorDetails::default();

    if let Some(doc) = error_details {
        details.namespace = string_field(doc, &["namespace", "ns"]);
        details.index = string_field(doc, &["index", "indexName"]);
        details.key = ["keyPattern", "keyValue"]
            .iter()
            .find_map(|k| doc.get_document(k).ok().cloned());
    }

    if details.namespace.is_none() {
        details.namespace = fragment_after(message, "collection: ");
    }
    if details.index.is_none() {
        details.index = fragment_after(message, "index: ");
    }

    details
}

fn string_field(doc: &Document, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match doc.get(k) {
        Some(Bson::String(s)) => Some(s.clone()),
        _ => None,
    })
}

fn fragment_after(message: &str, marker: &str) -> Option<String> {
    let start = message.find(marker)? + marker.len();
    let rest = &message[start..];
    let end = rest.find(' ')?;
    Some(rest[..end].to_string())
}
