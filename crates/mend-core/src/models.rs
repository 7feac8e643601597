//! Document, patch, and batch types shared by every mend crate.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::defaults::{FIELD_CREATED_AT, FIELD_IS_ACTIVE, FIELD_LAST_MESSAGE, FIELD_LAST_MESSAGE_AT};
use crate::error::{Error, Result};

/// Unique key of a document within its collection (the match id).
pub type DocumentId = String;

// =============================================================================
// DOCUMENT
// =============================================================================

/// One record of a collection: an id plus an opaque JSON object of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub fields: Map<String, Value>,
}

impl Document {
    /// Create a document from an id and its field map.
    pub fn new(id: impl Into<DocumentId>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Create a document from a JSON value, which must be an object.
    pub fn from_value(id: impl Into<DocumentId>, value: Value) -> Result<Self> {
        let id = id.into();
        match value {
            Value::Object(fields) => Ok(Self { id, fields }),
            other => Err(Error::InvalidInput(format!(
                "document {} is not a JSON object: {}",
                id, other
            ))),
        }
    }

    /// Field value, treating JSON `null` the same as a missing key.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    /// Whether the field is present with a non-null value.
    ///
    /// An explicit `false` is present.
    pub fn has(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Merge a patch into this document's fields.
    pub fn apply(&mut self, patch: &Patch) {
        patch.apply_to(&mut self.fields);
    }
}

// =============================================================================
// TIMESTAMPS
// =============================================================================

/// A timestamp-valued field.
///
/// Keeps the stored JSON representation so a copied value is written back
/// exactly as it was read. Accepts RFC 3339 strings and store-native
/// `{"seconds", "nanoseconds"}` objects (also the `_seconds`/`_nanoseconds`
/// spelling).
#[derive(Debug, Clone, PartialEq)]
pub struct Timestamp {
    raw: Value,
    at: DateTime<Utc>,
}

impl Timestamp {
    /// Timestamp written by the engine: an RFC 3339 UTC string.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            raw: Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            at,
        }
    }

    /// Parse a stored value, returning the reason it is not a timestamp.
    pub fn parse(value: &Value) -> std::result::Result<Self, String> {
        let at = match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| format!("is not an RFC 3339 timestamp ({})", e))?,
            Value::Object(obj) => {
                let seconds = obj
                    .get("seconds")
                    .or_else(|| obj.get("_seconds"))
                    .and_then(Value::as_i64)
                    .ok_or_else(|| "timestamp object has no integer seconds".to_string())?;
                let nanos = match obj.get("nanoseconds").or_else(|| obj.get("_nanoseconds")) {
                    None => 0,
                    Some(v) => v
                        .as_u64()
                        .and_then(|n| u32::try_from(n).ok())
                        .filter(|n| *n < 1_000_000_000)
                        .ok_or_else(|| "timestamp object has invalid nanoseconds".to_string())?,
                };
                DateTime::from_timestamp(seconds, nanos)
                    .ok_or_else(|| "timestamp object is out of range".to_string())?
            }
            other => return Err(format!("is not a timestamp (found {})", json_kind(other))),
        };

        Ok(Self {
            raw: value.clone(),
            at,
        })
    }

    /// The instant this timestamp denotes.
    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }

    /// The stored JSON representation.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Consume into the stored JSON representation.
    pub fn into_value(self) -> Value {
        self.raw
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// TYPED FIELD VIEW
// =============================================================================

/// Presence view of the match fields the backfill inspects.
///
/// Only presence selects a repair rule. A value is decoded when a rule
/// copies it, through [`Document::timestamp`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MatchFields<'a> {
    pub is_active: Option<&'a Value>,
    pub last_message: Option<&'a Value>,
    pub last_message_at: Option<&'a Value>,
    pub created_at: Option<&'a Value>,
}

impl<'a> MatchFields<'a> {
    /// Read the known fields of a document.
    pub fn of(doc: &'a Document) -> Self {
        Self {
            is_active: doc.get(FIELD_IS_ACTIVE),
            last_message: doc.get(FIELD_LAST_MESSAGE),
            last_message_at: doc.get(FIELD_LAST_MESSAGE_AT),
            created_at: doc.get(FIELD_CREATED_AT),
        }
    }
}

impl Document {
    /// Decode a timestamp-valued field.
    ///
    /// A present value of the wrong shape is an [`Error::MalformedDocument`].
    pub fn timestamp(&self, field: &str) -> Result<Option<Timestamp>> {
        self.get(field)
            .map(|value| {
                Timestamp::parse(value).map_err(|reason| Error::malformed(&self.id, field, reason))
            })
            .transpose()
    }
}

// =============================================================================
// PATCHES & BATCHES
// =============================================================================

/// Field assignments to merge into exactly one document.
///
/// Fields not named in the patch are never touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    fields: Map<String, Value>,
}

impl Patch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a field.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Builder-style [`Patch::set`].
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set(field, value);
        self
    }

    /// Value assigned to a field, if any.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Whether the patch assigns nothing.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of assigned fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Iterate over the assignments.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// The assignments as a JSON object, ready for a merge write.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Merge into an existing field map.
    pub fn apply_to(&self, fields: &mut Map<String, Value>) {
        for (field, value) in &self.fields {
            fields.insert(field.clone(), value.clone());
        }
    }
}

/// A patch addressed to one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchEntry {
    pub id: DocumentId,
    pub patch: Patch,
}

impl PatchEntry {
    pub fn new(id: impl Into<DocumentId>, patch: Patch) -> Self {
        Self {
            id: id.into(),
            patch,
        }
    }
}

/// A size-bounded group of patches committed atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Zero-based position of this batch within its run.
    pub index: usize,
    pub entries: Vec<PatchEntry>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of the documents this batch writes, in order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, value: Value) -> Document {
        Document::from_value(id, value).unwrap()
    }

    #[test]
    fn test_document_from_non_object_is_rejected() {
        let err = Document::from_value("m1", json!([1, 2])).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_null_counts_as_absent() {
        let d = doc("m1", json!({"isActive": null, "lastMessage": "2026-01-01T00:00:00Z"}));
        assert!(!d.has("isActive"));
        assert!(d.has("lastMessage"));
        assert!(!d.has("createdAt"));
    }

    #[test]
    fn test_false_counts_as_present() {
        let d = doc("m1", json!({"isActive": false}));
        assert!(d.has("isActive"));
    }

    #[test]
    fn test_timestamp_parse_rfc3339() {
        let ts = Timestamp::parse(&json!("2026-03-04T05:06:07+02:00")).unwrap();
        assert_eq!(ts.at().to_rfc3339(), "2026-03-04T03:06:07+00:00");
        assert_eq!(ts.raw(), &json!("2026-03-04T05:06:07+02:00"));
    }

    #[test]
    fn test_timestamp_parse_native_object() {
        let ts = Timestamp::parse(&json!({"seconds": 1_700_000_000, "nanoseconds": 5})).unwrap();
        assert_eq!(ts.at().timestamp(), 1_700_000_000);
        assert_eq!(ts.at().timestamp_subsec_nanos(), 5);

        let ts = Timestamp::parse(&json!({"_seconds": 10, "_nanoseconds": 0})).unwrap();
        assert_eq!(ts.at().timestamp(), 10);
    }

    #[test]
    fn test_timestamp_parse_rejects_wrong_shapes() {
        assert!(Timestamp::parse(&json!(12345)).is_err());
        assert!(Timestamp::parse(&json!("yesterday")).is_err());
        assert!(Timestamp::parse(&json!({"nanoseconds": 1})).is_err());
        assert!(Timestamp::parse(&json!({"seconds": 1, "nanoseconds": 2_000_000_000u64})).is_err());
        assert!(Timestamp::parse(&json!(true)).is_err());
    }

    #[test]
    fn test_timestamp_from_datetime_is_rfc3339_string() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let ts = Timestamp::from_datetime(at);
        assert_eq!(ts.raw(), &json!("2023-11-14T22:13:20.000Z"));
        assert_eq!(Timestamp::parse(ts.raw()).unwrap().at(), at);
    }

    #[test]
    fn test_match_fields_track_presence_only() {
        let d = doc(
            "m1",
            json!({
                "isActive": "yes",
                "lastMessage": null,
                "lastMessageAt": 1_700_000_000_000u64,
                "players": ["a", "b"]
            }),
        );
        let fields = MatchFields::of(&d);
        assert_eq!(fields.is_active, Some(&json!("yes")));
        assert!(fields.last_message.is_none());
        assert!(fields.last_message_at.is_some());
        assert!(fields.created_at.is_none());
    }

    #[test]
    fn test_timestamp_field_decodes_or_reports_document() {
        let d = doc(
            "m4",
            json!({"lastMessageAt": {"seconds": 100, "nanoseconds": 0}, "createdAt": 42}),
        );
        assert_eq!(d.timestamp("lastMessageAt").unwrap().unwrap().at().timestamp(), 100);
        assert!(d.timestamp("lastMessage").unwrap().is_none());
        match d.timestamp("createdAt") {
            Err(Error::MalformedDocument { id, field, .. }) => {
                assert_eq!(id, "m4");
                assert_eq!(field, "createdAt");
            }
            other => panic!("Expected MalformedDocument, got {:?}", other),
        }
    }

    #[test]
    fn test_patch_merge_keeps_unrelated_fields() {
        let mut d = doc("m1", json!({"foo": "bar", "isActive": false}));
        let patch = Patch::new().with("lastMessage", json!("2026-01-01T00:00:00Z"));
        d.apply(&patch);
        assert_eq!(d.fields["foo"], json!("bar"));
        assert_eq!(d.fields["isActive"], json!(false));
        assert_eq!(d.fields["lastMessage"], json!("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn test_patch_serializes_as_plain_object() {
        let patch = Patch::new().with("isActive", json!(true));
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"isActive": true}));
        assert_eq!(patch.to_value(), json!({"isActive": true}));
        assert_eq!(patch.len(), 1);
    }
}
