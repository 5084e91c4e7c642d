//! Document identifiers
//!
//! A [`DocumentId`] is a tagged integer with three readings:
//!
//! - the `NEW` sentinel (`-1`): the client intends to create a document
//! - a temporary id (any other negative value): assigned client-side before
//!   the store has handed out a real id
//! - a persisted id (`>= 0`): assigned by the store
//!
//! String encoding is `"NEW"`, `"T<abs(n)>"` for temporary ids, or the
//! decimal value for persisted ids.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI32, Ordering};
use thiserror::Error;

const NEW_ID: i32 = -1;
const NEW_ID_STRING: &str = "NEW";
const TEMPORARY_ID_PREFIX: char = 'T';

/// Next temporary id, handed out by decrement-and-get.
///
/// Initialized once at process start and monotonically decreasing for the
/// lifetime of the process. Never persisted. Starting below `-1000` keeps
/// generated ids clear of the `NEW` sentinel and of small negative ids a
/// client may have produced on its own.
static NEXT_TEMPORARY_ID: AtomicI32 = AtomicI32::new(-1000);

/// Errors produced while turning raw input into a [`DocumentId`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("invalid document id format: {input:?}")]
    InvalidIdFormat { input: String },

    #[error("document id must not be null")]
    NullId,

    #[error("cannot convert {found} to a document id")]
    UnsupportedIdType { found: String },
}

/// Returns true if the raw id is not persisted yet, i.e. it is either the
/// `NEW` sentinel or a temporary (negative) id.
///
/// Broader than [`DocumentId::is_new`], which only matches the sentinel.
pub fn is_new(id: i32) -> bool {
    id == NEW_ID || id < 0
}

/// Document identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(i32);

impl DocumentId {
    /// The "not yet assigned" placeholder.
    pub const NEW: DocumentId = DocumentId(NEW_ID);

    /// Wrap a raw integer. Negative values other than the sentinel are valid
    /// temporary ids.
    pub fn of(id: i32) -> Self {
        if id == NEW_ID {
            return Self::NEW;
        }
        DocumentId(id)
    }

    /// Parse the string encoding (`"NEW"`, `"T<n>"` or decimal).
    pub fn parse(input: &str) -> Result<Self, IdError> {
        if input == NEW_ID_STRING {
            return Ok(Self::NEW);
        }
        if input.is_empty() {
            return Err(IdError::InvalidIdFormat {
                input: input.to_string(),
            });
        }

        let parsed = match input.strip_prefix(TEMPORARY_ID_PREFIX) {
            Some(rest) => format!("-{rest}").parse::<i32>(),
            None => input.parse::<i32>(),
        };

        parsed.map(Self::of).map_err(|_| IdError::InvalidIdFormat {
            input: input.to_string(),
        })
    }

    /// Like [`DocumentId::parse`], but a missing input fails with
    /// [`IdError::NullId`].
    pub fn parse_required(input: Option<&str>) -> Result<Self, IdError> {
        match input {
            Some(input) => Self::parse(input),
            None => Err(IdError::NullId),
        }
    }

    /// Parse an optional string; blank input means "no id".
    pub fn from_nullable(input: Option<&str>) -> Result<Option<Self>, IdError> {
        match input.map(str::trim) {
            None | Some("") => Ok(None),
            Some(trimmed) => Self::parse(trimmed).map(Some),
        }
    }

    /// Accepts a JSON integer or string.
    pub fn from_object(value: &serde_json::Value) -> Result<Self, IdError> {
        match value {
            serde_json::Value::String(s) => Self::parse(s),
            serde_json::Value::Number(n) => n
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .map(Self::of)
                .ok_or_else(|| IdError::UnsupportedIdType {
                    found: format!("number {n}"),
                }),
            other => Err(IdError::UnsupportedIdType {
                found: json_type_name(other).to_string(),
            }),
        }
    }

    /// Next process-wide temporary id. Safe to call from any thread; every
    /// call returns a distinct value below `-1000`.
    pub fn generate_temporary_id() -> i32 {
        NEXT_TEMPORARY_ID.fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// A fresh temporary document id.
    pub fn new_temporary() -> Self {
        Self::of(Self::generate_temporary_id())
    }

    pub fn to_int(&self) -> i32 {
        self.0
    }

    /// True only for the exact `NEW` sentinel.
    pub fn is_new(&self) -> bool {
        self.0 == NEW_ID
    }

    /// Same as [`DocumentId::is_new`]; reads better next to
    /// [`DocumentId::is_persisted`].
    pub fn is_placeholder(&self) -> bool {
        self.is_new()
    }

    /// A client-assigned negative id other than the sentinel.
    pub fn is_temporary(&self) -> bool {
        self.0 < 0 && self.0 != NEW_ID
    }

    /// Assigned by the store.
    pub fn is_persisted(&self) -> bool {
        !is_new(self.0)
    }

    pub fn to_json(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == NEW_ID {
            f.write_str(NEW_ID_STRING)
        } else if self.0 < 0 {
            write!(f, "{}{}", TEMPORARY_ID_PREFIX, self.0.unsigned_abs())
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for DocumentId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<i32> for DocumentId {
    fn from(id: i32) -> Self {
        Self::of(id)
    }
}

impl From<DocumentId> for i32 {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

impl Serialize for DocumentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_json())
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Self::from_object(&value).map_err(de::Error::custom)
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn test_new_sentinel() {
        assert_eq!(DocumentId::of(-1), DocumentId::NEW);
        assert_eq!(DocumentId::NEW.to_json(), "NEW");
        assert_eq!(DocumentId::parse("NEW").unwrap(), DocumentId::NEW);
        assert!(DocumentId::NEW.is_new());
        assert!(!DocumentId::NEW.is_persisted());
    }

    #[test]
    fn test_temporary_encoding() {
        let id = DocumentId::of(-1234);
        assert_eq!(id.to_json(), "T1234");
        assert_eq!(DocumentId::parse("T1234").unwrap(), id);
        assert!(id.is_temporary());
        assert!(!id.is_new());
        assert!(is_new(id.to_int()));
    }

    #[test]
    fn test_temporary_prefix_for_sentinel_value() {
        // "T1" decodes to -1, which is the sentinel
        assert_eq!(DocumentId::parse("T1").unwrap(), DocumentId::NEW);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            DocumentId::parse(""),
            Err(IdError::InvalidIdFormat { .. })
        ));
        assert!(matches!(
            DocumentId::parse("abc"),
            Err(IdError::InvalidIdFormat { .. })
        ));
        assert!(matches!(
            DocumentId::parse("T"),
            Err(IdError::InvalidIdFormat { .. })
        ));
        assert_eq!(DocumentId::parse_required(None), Err(IdError::NullId));
    }

    #[test]
    fn test_from_nullable() {
        assert_eq!(DocumentId::from_nullable(None).unwrap(), None);
        assert_eq!(DocumentId::from_nullable(Some("  ")).unwrap(), None);
        assert_eq!(
            DocumentId::from_nullable(Some(" 42 ")).unwrap(),
            Some(DocumentId::of(42))
        );
    }

    #[test]
    fn test_from_object() {
        assert_eq!(
            DocumentId::from_object(&serde_json::json!(7)).unwrap(),
            DocumentId::of(7)
        );
        assert_eq!(
            DocumentId::from_object(&serde_json::json!("T5")).unwrap(),
            DocumentId::of(-5)
        );
        assert!(matches!(
            DocumentId::from_object(&serde_json::json!(true)),
            Err(IdError::UnsupportedIdType { .. })
        ));
        assert!(matches!(
            DocumentId::from_object(&serde_json::json!(1.5)),
            Err(IdError::UnsupportedIdType { .. })
        ));
    }

    #[test]
    fn test_serde() {
        let json = serde_json::to_string(&DocumentId::of(-1500)).unwrap();
        assert_eq!(json, "\"T1500\"");
        let back: DocumentId = serde_json::from_str("12").unwrap();
        assert_eq!(back, DocumentId::of(12));
    }

    #[test]
    fn test_extreme_negative_id() {
        let id = DocumentId::of(i32::MIN);
        assert_eq!(id.to_json(), "T2147483648");
        assert_eq!(DocumentId::parse("T2147483648").unwrap(), id);
    }

    #[test]
    fn test_generate_temporary_id_concurrently() {
        let threads = 8;
        let per_thread = 500;
        let collected = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let collected = Arc::clone(&collected);
                thread::spawn(move || {
                    let ids: Vec<i32> = (0..per_thread)
                        .map(|_| DocumentId::generate_temporary_id())
                        .collect();
                    collected.lock().unwrap().extend(ids);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let all = collected.lock().unwrap().clone();
        assert_eq!(all.len(), threads * per_thread);
        let distinct: HashSet<i32> = all.iter().copied().collect();
        assert_eq!(distinct.len(), all.len());
        assert!(all.iter().all(|id| *id < -1000));
    }

    proptest! {
        #[test]
        fn prop_persisted_round_trip(n in 0i32..=i32::MAX) {
            let id = DocumentId::of(n);
            prop_assert_eq!(id.to_json(), n.to_string());
            prop_assert_eq!(DocumentId::parse(&id.to_json()).unwrap(), id);
            prop_assert!(id.is_persisted());
        }

        #[test]
        fn prop_temporary_round_trip(n in i32::MIN..-1i32) {
            let id = DocumentId::of(n);
            prop_assert_eq!(id.to_json(), format!("T{}", (n as i64).abs()));
            prop_assert_eq!(DocumentId::parse(&id.to_json()).unwrap().to_int(), n);
            prop_assert!(is_new(n));
        }
    }
}
