//! Field values, value classes and lookup values

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Declared storage type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueClass {
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    IntegerLookup,
    StringLookup,
    Bytes,
}

impl fmt::Display for ValueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueClass::Text => "Text",
            ValueClass::Integer => "Integer",
            ValueClass::Decimal => "Decimal",
            ValueClass::Boolean => "Boolean",
            ValueClass::Date => "Date",
            ValueClass::IntegerLookup => "IntegerLookup",
            ValueClass::StringLookup => "StringLookup",
            ValueClass::Bytes => "Bytes",
        };
        f.write_str(name)
    }
}

/// UI widget type of a field; drives date parsing and the default value class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WidgetType {
    Text,
    LongText,
    Integer,
    Number,
    Amount,
    Quantity,
    YesNo,
    Date,
    DateTime,
    Time,
    Lookup,
    List,
    Binary,
}

impl WidgetType {
    pub fn default_value_class(&self) -> ValueClass {
        match self {
            WidgetType::Text | WidgetType::LongText => ValueClass::Text,
            WidgetType::Integer => ValueClass::Integer,
            WidgetType::Number | WidgetType::Amount | WidgetType::Quantity => ValueClass::Decimal,
            WidgetType::YesNo => ValueClass::Boolean,
            WidgetType::Date | WidgetType::DateTime | WidgetType::Time => ValueClass::Date,
            WidgetType::Lookup => ValueClass::IntegerLookup,
            WidgetType::List => ValueClass::StringLookup,
            WidgetType::Binary => ValueClass::Bytes,
        }
    }
}

impl fmt::Display for WidgetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Key of a lookup entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LookupId {
    Int(i32),
    Str(String),
}

impl fmt::Display for LookupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupId::Int(id) => write!(f, "{id}"),
            LookupId::Str(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegerLookupValue {
    pub id: i32,
    pub display_name: String,
}

impl IntegerLookupValue {
    pub fn new(id: i32, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }

    /// Placeholder for an id whose display name is not known.
    pub fn unknown(id: i32) -> Self {
        Self::new(id, format!("<{id}>"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StringLookupValue {
    pub id: String,
    pub display_name: String,
}

impl StringLookupValue {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    pub fn unknown(id: impl Into<String>) -> Self {
        let id = id.into();
        let display_name = format!("<{id}>");
        Self { id, display_name }
    }
}

/// A lookup option: an id plus its display name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookupValue {
    Integer(IntegerLookupValue),
    String(StringLookupValue),
}

impl LookupValue {
    pub fn id(&self) -> LookupId {
        match self {
            LookupValue::Integer(v) => LookupId::Int(v.id),
            LookupValue::String(v) => LookupId::Str(v.id.clone()),
        }
    }

    /// Integer id; string ids are parsed.
    pub fn id_as_int(&self) -> Option<i32> {
        match self {
            LookupValue::Integer(v) => Some(v.id),
            LookupValue::String(v) => v.id.trim().parse().ok(),
        }
    }

    pub fn id_as_string(&self) -> String {
        match self {
            LookupValue::Integer(v) => v.id.to_string(),
            LookupValue::String(v) => v.id.clone(),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            LookupValue::Integer(v) => &v.display_name,
            LookupValue::String(v) => &v.display_name,
        }
    }
}

impl From<IntegerLookupValue> for LookupValue {
    fn from(value: IntegerLookupValue) -> Self {
        LookupValue::Integer(value)
    }
}

impl From<StringLookupValue> for LookupValue {
    fn from(value: StringLookupValue) -> Self {
        LookupValue::String(value)
    }
}

/// Resolves lookup entries by id, e.g. to fill in a blank display name
pub trait LookupValueByIdSupplier: Send + Sync + fmt::Debug {
    fn find_by_id(&self, id: &LookupId) -> Option<LookupValue>;
}

/// Runtime value of a field (or a raw value on its way into one)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Integer(i32),
    Decimal(Decimal),
    Boolean(bool),
    Date(DateTime<Utc>),
    /// High-precision instant as delivered by a store; normalized to `Date`
    /// before it is stored in a field.
    Timestamp(DateTime<Utc>),
    IntegerLookup(IntegerLookupValue),
    StringLookup(StringLookupValue),
    /// A `{id: displayName}` wire object
    Map(BTreeMap<String, String>),
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "Text",
            FieldValue::Integer(_) => "Integer",
            FieldValue::Decimal(_) => "Decimal",
            FieldValue::Boolean(_) => "Boolean",
            FieldValue::Date(_) => "Date",
            FieldValue::Timestamp(_) => "Timestamp",
            FieldValue::IntegerLookup(_) => "IntegerLookup",
            FieldValue::StringLookup(_) => "StringLookup",
            FieldValue::Map(_) => "Map",
            FieldValue::Bytes(_) => "Bytes",
        }
    }

    /// Value class this value is stored as, if it is a storable value.
    pub fn value_class(&self) -> Option<ValueClass> {
        match self {
            FieldValue::Text(_) => Some(ValueClass::Text),
            FieldValue::Integer(_) => Some(ValueClass::Integer),
            FieldValue::Decimal(_) => Some(ValueClass::Decimal),
            FieldValue::Boolean(_) => Some(ValueClass::Boolean),
            FieldValue::Date(_) => Some(ValueClass::Date),
            FieldValue::IntegerLookup(_) => Some(ValueClass::IntegerLookup),
            FieldValue::StringLookup(_) => Some(ValueClass::StringLookup),
            FieldValue::Bytes(_) => Some(ValueClass::Bytes),
            FieldValue::Timestamp(_) | FieldValue::Map(_) => None,
        }
    }

    /// Timestamps become plain dates at millisecond precision; every other
    /// value is returned unchanged.
    pub fn normalized(self) -> Self {
        match self {
            FieldValue::Timestamp(ts) => {
                let millis = ts.timestamp_millis();
                FieldValue::Date(DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or(ts))
            }
            other => other,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            FieldValue::IntegerLookup(v) => Some(v.id),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Decimal(d) => Some(*d),
            FieldValue::Integer(n) => Some(Decimal::from(*n)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_lookup(&self) -> Option<LookupValue> {
        match self {
            FieldValue::IntegerLookup(v) => Some(LookupValue::Integer(v.clone())),
            FieldValue::StringLookup(v) => Some(LookupValue::String(v.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Integer(n) => write!(f, "{n}"),
            FieldValue::Decimal(d) => write!(f, "{d}"),
            FieldValue::Boolean(b) => write!(f, "{b}"),
            FieldValue::Date(d) | FieldValue::Timestamp(d) => {
                f.write_str(&d.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            FieldValue::IntegerLookup(v) => write!(f, "{}", v.id),
            FieldValue::StringLookup(v) => f.write_str(&v.id),
            FieldValue::Map(map) => {
                let entries: Vec<String> =
                    map.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{{{}}}", entries.join(", "))
            }
            FieldValue::Bytes(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        FieldValue::Decimal(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Date(value)
    }
}

impl From<IntegerLookupValue> for FieldValue {
    fn from(value: IntegerLookupValue) -> Self {
        FieldValue::IntegerLookup(value)
    }
}

impl From<StringLookupValue> for FieldValue {
    fn from(value: StringLookupValue) -> Self {
        FieldValue::StringLookup(value)
    }
}

impl From<LookupValue> for FieldValue {
    fn from(value: LookupValue) -> Self {
        match value {
            LookupValue::Integer(v) => FieldValue::IntegerLookup(v),
            LookupValue::String(v) => FieldValue::StringLookup(v),
        }
    }
}
