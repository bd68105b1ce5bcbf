use serde_json::Value;

use crate::error::{ArangoError, Result};

/// How a caller names a document: by key, by full `_id`, or by a body that
/// carries one of those fields.
#[derive(Debug, Clone)]
pub enum DocumentSelector {
    Key(String),
    Id(String),
    Doc(Value),
}

impl From<&str> for DocumentSelector {
    fn from(value: &str) -> Self {
        if value.contains('/') {
            DocumentSelector::Id(value.to_string())
        } else {
            DocumentSelector::Key(value.to_string())
        }
    }
}

impl From<String> for DocumentSelector {
    fn from(value: String) -> Self {
        DocumentSelector::from(value.as_str())
    }
}

impl From<Value> for DocumentSelector {
    fn from(value: Value) -> Self {
        DocumentSelector::Doc(value)
    }
}

impl From<&Value> for DocumentSelector {
    fn from(value: &Value) -> Self {
        DocumentSelector::Doc(value.clone())
    }
}

/// Check that a full document id belongs to the given collection.
pub(crate) fn validate_id(collection: &str, id: &str) -> Result<()> {
    let prefix = format!("{collection}/");
    if id.starts_with(&prefix) {
        Ok(())
    } else {
        Err(ArangoError::DocumentParse(format!(
            "bad collection name in document ID \"{id}\""
        )))
    }
}

/// Derive the full document id from a body, preferring `_key` over `_id`.
pub(crate) fn extract_id(collection: &str, body: &Value) -> Result<String> {
    if let Some(key) = body.get("_key").and_then(Value::as_str) {
        return Ok(format!("{collection}/{key}"));
    }
    if let Some(id) = body.get("_id").and_then(Value::as_str) {
        validate_id(collection, id)?;
        return Ok(id.to_string());
    }
    Err(ArangoError::DocumentParse(
        "field \"_key\" or \"_id\" required".to_string(),
    ))
}

/// Resolve a selector to the document handle plus the `If-Match` header for
/// revision-checked operations.
///
/// The explicit `rev` argument wins over a `_rev` field in the body; the
/// header is emitted only when a revision is known and `check_rev` is set.
pub(crate) fn prep_from_doc(
    collection: &str,
    selector: &DocumentSelector,
    rev: Option<&str>,
    check_rev: bool,
) -> Result<(String, Option<(String, String)>)> {
    let (id, body_rev) = match selector {
        DocumentSelector::Key(key) => (format!("{collection}/{key}"), None),
        DocumentSelector::Id(id) => {
            validate_id(collection, id)?;
            (id.clone(), None)
        }
        DocumentSelector::Doc(body) => {
            let id = extract_id(collection, body)?;
            let body_rev = body.get("_rev").and_then(Value::as_str).map(str::to_string);
            (id, body_rev)
        }
    };
    let rev = rev.map(str::to_string).or(body_rev);
    let header = match rev {
        Some(rev) if check_rev => Some(("If-Match".to_string(), rev)),
        _ => None,
    };
    Ok((id, header))
}
