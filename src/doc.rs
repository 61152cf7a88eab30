//! Document model and canonical serialization.
//!
//! Every document is one file in the working tree, named `<id><ext>`.
//! `.json` files hold canonical (key-sorted, minimally whitespaced) JSON so
//! that logically equal documents always produce the same blob OID. Files
//! with any other extension are text when the blob is valid UTF-8 and
//! binary otherwise.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;

/// Extension that marks a JSON document.
pub const JSON_EXT: &str = ".json";

/// Kind of a document file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Json,
    Text,
    Binary,
}

/// Document payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Doc {
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
}

impl Doc {
    pub fn doc_type(&self) -> DocType {
        match self {
            Doc::Json(_) => DocType::Json,
            Doc::Text(_) => DocType::Text,
            Doc::Binary(_) => DocType::Binary,
        }
    }

    /// Serialized bytes as stored in a blob.
    pub fn to_blob(&self) -> Result<Vec<u8>, SyncError> {
        match self {
            Doc::Json(value) => Ok(canonicalize(value).into_bytes()),
            Doc::Text(text) => Ok(text.as_bytes().to_vec()),
            Doc::Binary(bytes) => Ok(bytes.clone()),
        }
    }
}

/// A document together with its storage identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatDoc {
    /// Document id: the file path without its extension for JSON files,
    /// the full file path otherwise.
    #[serde(rename = "_id")]
    pub id: String,
    /// File path under the working tree.
    pub name: String,
    /// Git blob OID of the file content.
    pub file_oid: String,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    pub doc: Doc,
}

impl FatDoc {
    /// Build a fat doc from a blob fetched out of the object store.
    ///
    /// `.json` blobs must parse as JSON objects; parse failures surface
    /// [`SyncError::InvalidJsonObject`]. Other blobs become text documents
    /// when the content is valid UTF-8 and binary documents otherwise.
    pub fn from_blob(name: &str, file_oid: &str, content: &[u8]) -> Result<Self, SyncError> {
        if let Some(id) = name.strip_suffix(JSON_EXT) {
            let value: Value =
                serde_json::from_slice(content).map_err(|e| SyncError::InvalidJsonObject {
                    name: name.to_string(),
                    message: e.to_string(),
                })?;
            if !value.is_object() {
                return Err(SyncError::InvalidJsonObject {
                    name: name.to_string(),
                    message: "top-level value is not an object".to_string(),
                });
            }
            return Ok(FatDoc {
                id: id.to_string(),
                name: name.to_string(),
                file_oid: file_oid.to_string(),
                doc_type: DocType::Json,
                doc: Doc::Json(value),
            });
        }
        match std::str::from_utf8(content) {
            Ok(text) => Ok(FatDoc {
                id: name.to_string(),
                name: name.to_string(),
                file_oid: file_oid.to_string(),
                doc_type: DocType::Text,
                doc: Doc::Text(text.to_string()),
            }),
            Err(_) => Ok(FatDoc {
                id: name.to_string(),
                name: name.to_string(),
                file_oid: file_oid.to_string(),
                doc_type: DocType::Binary,
                doc: Doc::Binary(content.to_vec()),
            }),
        }
    }
}

/// Serialize a JSON value canonically: keys sorted, no insignificant
/// whitespace.
///
/// `serde_json`'s default map is ordered by key, so serializing a value
/// that was built or parsed without `preserve_order` already yields the
/// canonical byte sequence. Values are normalized through a sort pass so
/// callers may hand in maps built in any order.
pub fn canonicalize(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), sorted(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
