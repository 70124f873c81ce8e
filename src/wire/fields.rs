use bson::Bson;
use bson::Document;

use crate::constants::NOT_MASTER_CODES;

/// Numeric view of a field that servers send as double, int or bool
pub(crate) fn numeric(
    doc: &Document,
    key: &str,
) -> Option<f64> {
    match doc.get(key)? {
        Bson::Double(v) => Some(*v),
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
        _ => None,
    }
}

pub(crate) fn is_ok(doc: &Document) -> bool {
    numeric(doc, "ok") == Some(1.0)
}

pub(crate) fn error_code(doc: &Document) -> Option<i32> {
    numeric(doc, "code").map(|c| c as i32)
}

pub(crate) fn flag(
    doc: &Document,
    key: &str,
) -> bool {
    numeric(doc, key).is_some_and(|v| v != 0.0)
}

/// String field, treating `null` and non-strings as absent
pub(crate) fn string(
    doc: &Document,
    key: &str,
) -> Option<String> {
    match doc.get(key)? {
        Bson::String(s) => Some(s.clone()),
        Bson::Null => None,
        other => Some(other.to_string()),
    }
}

pub(crate) fn is_not_master(
    message: &str,
    code: Option<i32>,
) -> bool {
    code.is_some_and(|c| NOT_MASTER_CODES.contains(&c)) || message.contains("not master")
}
