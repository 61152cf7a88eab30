use serde_json::json;

use crate::doc::{Doc, DocType, FatDoc, canonicalize};
use crate::error::SyncError;

#[test]
fn test_canonicalize_sorts_keys() {
    let doc = json!({"z": 1, "a": {"y": 2, "b": 3}, "m": [3, 1]});
    assert_eq!(canonicalize(&doc), r#"{"a":{"b":3,"y":2},"m":[3,1],"z":1}"#);
}

#[test]
fn test_canonicalize_round_trips() {
    let doc = json!({"_id": "1", "name": "fromA", "nested": {"k": [1, 2, 3]}});
    let bytes = canonicalize(&doc);
    let parsed: serde_json::Value = serde_json::from_str(&bytes).unwrap();
    assert_eq!(parsed, doc);
    // Same byte sequence on repeated serialization.
    assert_eq!(canonicalize(&parsed), bytes);
}

#[test]
fn test_json_blob_parses_to_fat_doc() {
    let content = br#"{"_id":"1","name":"fromA"}"#;
    let fat = FatDoc::from_blob("1.json", "abc123", content).unwrap();
    assert_eq!(fat.id, "1");
    assert_eq!(fat.name, "1.json");
    assert_eq!(fat.doc_type, DocType::Json);
    assert_eq!(fat.doc, Doc::Json(json!({"_id": "1", "name": "fromA"})));
}

#[test]
fn test_collection_path_keeps_id_relative_to_root() {
    let fat = FatDoc::from_blob("notes/2024/plan.json", "abc", b"{}").unwrap();
    assert_eq!(fat.id, "notes/2024/plan");
    assert_eq!(fat.name, "notes/2024/plan.json");
}

#[test]
fn test_invalid_json_blob_is_rejected() {
    let err = FatDoc::from_blob("1.json", "abc", b"not json").unwrap_err();
    assert!(matches!(err, SyncError::InvalidJsonObject { .. }));

    // A JSON scalar is not a document either.
    let err = FatDoc::from_blob("1.json", "abc", b"42").unwrap_err();
    assert!(matches!(err, SyncError::InvalidJsonObject { .. }));
}

#[test]
fn test_utf8_blob_is_text() {
    let fat = FatDoc::from_blob("readme.md", "abc", "hello wörld".as_bytes()).unwrap();
    assert_eq!(fat.doc_type, DocType::Text);
    assert_eq!(fat.doc, Doc::Text("hello wörld".to_string()));
    assert_eq!(fat.id, "readme.md");
}

#[test]
fn test_non_utf8_blob_is_binary() {
    let content = vec![0u8, 159, 146, 150];
    let fat = FatDoc::from_blob("img.png", "abc", &content).unwrap();
    assert_eq!(fat.doc_type, DocType::Binary);
    assert_eq!(fat.doc, Doc::Binary(content));
}

#[test]
fn test_doc_to_blob_is_canonical_for_json() {
    let doc = Doc::Json(json!({"b": 2, "a": 1}));
    assert_eq!(doc.to_blob().unwrap(), br#"{"a":1,"b":2}"#.to_vec());
}
