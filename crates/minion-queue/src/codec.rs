//! Encoding of structured payloads (`args`, `result`, `notes`, `parents`,
//! worker `status`/`inbox`) to and from the text blobs SQLite actually
//! stores. The engine never inspects payload contents past validating that
//! they round-trip; `serde_json::Value` already is the tagged sum
//! `{ null, bool, number, string, list, map }` the spec calls for, so it
//! doubles as both our in-memory representation and the wire format.

use crate::error::{BackendError, Result};
use serde_json::{Map, Value};

/// Encode a structured value to the canonical text form stored in a column.
pub(crate) fn encode(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a column's text back into a structured value.
pub(crate) fn decode(text: &str) -> Result<Value> {
    Ok(serde_json::from_str(text)?)
}

/// Encode the `parents` column: an ordered list of job ids.
pub(crate) fn encode_ids(ids: &[i64]) -> Result<String> {
    Ok(serde_json::to_string(ids)?)
}

/// Decode the `parents` column back into an ordered list of job ids.
pub(crate) fn decode_ids(text: &str) -> Result<Vec<i64>> {
    Ok(serde_json::from_str(text)?)
}

/// Decode a worker's `inbox` column into the ordered list of pending
/// command messages (each message is itself `[command, ...args]`).
pub(crate) fn decode_inbox(text: &str) -> Result<Vec<Vec<Value>>> {
    Ok(serde_json::from_str(text)?)
}

pub(crate) fn encode_inbox(inbox: &[Vec<Value>]) -> Result<String> {
    Ok(serde_json::to_string(inbox)?)
}

/// Note keys must not contain `.`, `[`, or `]` - those characters are
/// reserved so that downstream consumers can address a note by a dotted
/// path without ambiguity. Rejected before touching storage.
pub fn validate_note_key(key: &str) -> Result<()> {
    if key.contains(['.', '[', ']']) {
        return Err(BackendError::InvalidInput(format!(
            "note key {key:?} must not contain '.', '[', or ']'"
        )));
    }
    Ok(())
}

/// Apply a merge-update to a notes object: `Some(value)` sets/overwrites
/// the key, `None` removes it. Keys not mentioned are left untouched.
pub(crate) fn merge_notes(notes: &mut Map<String, Value>, updates: &Map<String, Value>) {
    for (key, value) in updates {
        if value.is_null() {
            notes.remove(key);
        } else {
            notes.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_reserved_characters() {
        assert!(validate_note_key("progress.percent").is_err());
        assert!(validate_note_key("items[0]").is_err());
        assert!(validate_note_key("plain_key").is_ok());
    }

    #[test]
    fn merge_notes_removes_null_and_keeps_others() {
        let mut notes = Map::new();
        notes.insert("a".into(), Value::from(1));
        notes.insert("b".into(), Value::from(2));

        let mut updates = Map::new();
        updates.insert("a".into(), Value::Null);
        updates.insert("c".into(), Value::from(3));

        merge_notes(&mut notes, &updates);

        assert_eq!(notes.get("a"), None);
        assert_eq!(notes.get("b"), Some(&Value::from(2)));
        assert_eq!(notes.get("c"), Some(&Value::from(3)));
    }

    #[test]
    fn ids_round_trip() {
        let ids = vec![1, 2, 3];
        let encoded = encode_ids(&ids).unwrap();
        assert_eq!(decode_ids(&encoded).unwrap(), ids);
    }
}
