//! Conversion of raw values into a field's declared value class
//!
//! Every value written into a [`DocumentField`](crate::DocumentField) passes
//! through [`convert_to_value_class`]. The rules are deliberately narrow:
//! a (source, target) pair that is not listed below fails with
//! [`ConversionError::UnconvertibleValue`].
//!
//! | target        | accepted sources                                        |
//! |---------------|---------------------------------------------------------|
//! | Text          | anything except a map                                   |
//! | Date          | text, parsed according to the widget type               |
//! | Integer       | text (exact), decimal, lookup value, `{id: name}` map   |
//! | Decimal       | text (empty means zero), integer                        |
//! | Boolean       | anything; text and string lookups by Yes/No code        |
//! | IntegerLookup | map, raw id (via supplier), string lookup               |
//! | StringLookup  | map, raw id (via supplier), integer lookup              |

use crate::error::ConversionError;
use crate::values::{
    FieldValue, IntegerLookupValue, LookupId, LookupValue, LookupValueByIdSupplier,
    StringLookupValue, ValueClass, WidgetType,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

/// Codes read as `true` when a text or a string lookup key becomes a boolean
const YES_CODES: &[&str] = &["Y", "y", "true", "TRUE", "True"];

/// Convert `value` to `target`.
///
/// `lookups` resolves raw ids and blank display names for lookup targets;
/// when a supplier knows no entry for an id the result is `None`.
pub fn convert_to_value_class(
    field_name: &str,
    value: Option<FieldValue>,
    widget_type: WidgetType,
    target: ValueClass,
    lookups: Option<&dyn LookupValueByIdSupplier>,
) -> Result<Option<FieldValue>, ConversionError> {
    let Some(value) = value else {
        return Ok(None);
    };

    let converter = Converter {
        field_name,
        widget_type,
        target,
        lookups,
    };
    converter.convert(value)
}

struct Converter<'a> {
    field_name: &'a str,
    widget_type: WidgetType,
    target: ValueClass,
    lookups: Option<&'a dyn LookupValueByIdSupplier>,
}

impl Converter<'_> {
    fn convert(&self, value: FieldValue) -> Result<Option<FieldValue>, ConversionError> {
        if let FieldValue::Timestamp(ts) = &value {
            if self.target == ValueClass::Date {
                debug!(
                    field = self.field_name,
                    timestamp = %ts,
                    "assignable but not identical value type; possible inefficiency"
                );
                return Ok(Some(value.normalized()));
            }
        }

        if value.value_class() == Some(self.target) {
            return Ok(Some(value));
        }

        match self.target {
            ValueClass::Text => self.to_text(value),
            ValueClass::Date => self.to_date(value),
            ValueClass::Integer => self.to_integer(value),
            ValueClass::Decimal => self.to_decimal(value),
            ValueClass::Boolean => Ok(Some(FieldValue::Boolean(to_boolean(&value)))),
            ValueClass::IntegerLookup => self.to_integer_lookup(value),
            ValueClass::StringLookup => self.to_string_lookup(value),
            ValueClass::Bytes => match value {
                FieldValue::Text(s) => Ok(Some(FieldValue::Bytes(s.into_bytes()))),
                other => Err(self.unconvertible(&other, "no conversion to bytes")),
            },
        }
    }

    fn to_text(&self, value: FieldValue) -> Result<Option<FieldValue>, ConversionError> {
        if matches!(value, FieldValue::Map(_)) {
            return Err(self.unconvertible(&value, "maps are not converted to text"));
        }
        Ok(Some(FieldValue::Text(value.to_string())))
    }

    fn to_date(&self, value: FieldValue) -> Result<Option<FieldValue>, ConversionError> {
        match &value {
            FieldValue::Text(s) if s.trim().is_empty() => Ok(None),
            FieldValue::Text(s) => parse_date(s.trim(), self.widget_type)
                .map(|date| Some(FieldValue::Date(date)))
                .ok_or_else(|| self.unconvertible(&value, "unparseable date")),
            _ => Err(self.unconvertible(&value, "no conversion to date")),
        }
    }

    fn to_integer(&self, value: FieldValue) -> Result<Option<FieldValue>, ConversionError> {
        match &value {
            FieldValue::Text(s) if s.is_empty() => Ok(None),
            FieldValue::Text(s) => {
                let exact = Decimal::from_str(s.trim())
                    .ok()
                    .filter(|d| d.fract().is_zero())
                    .and_then(|d| d.to_i32());
                exact
                    .map(|n| Some(FieldValue::Integer(n)))
                    .ok_or_else(|| self.unconvertible(&value, "not an exact integer"))
            }
            FieldValue::Decimal(d) => d
                .trunc()
                .to_i32()
                .map(|n| Some(FieldValue::Integer(n)))
                .ok_or_else(|| self.unconvertible(&value, "out of integer range")),
            FieldValue::IntegerLookup(lookup) => Ok(Some(FieldValue::Integer(lookup.id))),
            FieldValue::StringLookup(lookup) => lookup
                .id
                .trim()
                .parse()
                .map(|n| Some(FieldValue::Integer(n)))
                .map_err(|_| self.unconvertible(&value, "lookup id is not numeric")),
            FieldValue::Map(map) => {
                let (id, _) = self.decode_lookup_map(&value, map)?;
                id.trim()
                    .parse()
                    .map(|n| Some(FieldValue::Integer(n)))
                    .map_err(|_| self.unconvertible(&value, "lookup id is not numeric"))
            }
            _ => Err(self.unconvertible(&value, "no conversion to integer")),
        }
    }

    fn to_decimal(&self, value: FieldValue) -> Result<Option<FieldValue>, ConversionError> {
        match &value {
            FieldValue::Text(s) if s.is_empty() => Ok(Some(FieldValue::Decimal(Decimal::ZERO))),
            FieldValue::Text(s) => Decimal::from_str(s.trim())
                .map(|d| Some(FieldValue::Decimal(d)))
                .map_err(|e| self.unconvertible(&value, &e.to_string())),
            FieldValue::Integer(n) => Ok(Some(FieldValue::Decimal(Decimal::from(*n)))),
            _ => Err(self.unconvertible(&value, "no conversion to decimal")),
        }
    }

    fn to_integer_lookup(&self, value: FieldValue) -> Result<Option<FieldValue>, ConversionError> {
        match &value {
            FieldValue::Map(map) => {
                let (id, display_name) = self.decode_lookup_map(&value, map)?;
                let id: i32 = id
                    .trim()
                    .parse()
                    .map_err(|_| self.unconvertible(&value, "lookup id is not numeric"))?;
                if display_name.trim().is_empty() {
                    if let Some(lookups) = self.lookups {
                        return self.integer_lookup_of(lookups.find_by_id(&LookupId::Int(id)));
                    }
                }
                Ok(Some(IntegerLookupValue::new(id, display_name).into()))
            }
            FieldValue::Integer(n) => match self.lookups {
                Some(lookups) => self.integer_lookup_of(lookups.find_by_id(&LookupId::Int(*n))),
                None => Err(self.unconvertible(&value, "no lookup to resolve the id")),
            },
            FieldValue::Text(s) if s.is_empty() => Ok(None),
            FieldValue::Text(s) => match self.lookups {
                Some(lookups) => {
                    let id = match s.trim().parse::<i32>() {
                        Ok(n) => LookupId::Int(n),
                        Err(_) => LookupId::Str(s.clone()),
                    };
                    self.integer_lookup_of(lookups.find_by_id(&id))
                }
                None => Err(self.unconvertible(&value, "no lookup to resolve the id")),
            },
            FieldValue::StringLookup(lookup) => lookup
                .id
                .trim()
                .parse()
                .map(|id| Some(IntegerLookupValue::new(id, lookup.display_name.clone()).into()))
                .map_err(|_| self.unconvertible(&value, "lookup id is not numeric")),
            _ => Err(self.unconvertible(&value, "no conversion to integer lookup")),
        }
    }

    fn to_string_lookup(&self, value: FieldValue) -> Result<Option<FieldValue>, ConversionError> {
        match &value {
            FieldValue::Map(map) => {
                let (id, display_name) = self.decode_lookup_map(&value, map)?;
                if display_name.trim().is_empty() {
                    if let Some(lookups) = self.lookups {
                        return Ok(lookups
                            .find_by_id(&LookupId::Str(id))
                            .map(|resolved| string_lookup_of(resolved).into()));
                    }
                }
                Ok(Some(StringLookupValue::new(id, display_name).into()))
            }
            FieldValue::Text(s) if s.is_empty() => Ok(None),
            FieldValue::Text(s) => match self.lookups {
                Some(lookups) => Ok(lookups
                    .find_by_id(&LookupId::Str(s.clone()))
                    .map(|resolved| string_lookup_of(resolved).into())),
                None => Err(self.unconvertible(&value, "no lookup to resolve the id")),
            },
            FieldValue::IntegerLookup(lookup) => Ok(Some(
                StringLookupValue::new(lookup.id.to_string(), lookup.display_name.clone()).into(),
            )),
            _ => Err(self.unconvertible(&value, "no conversion to string lookup")),
        }
    }

    fn integer_lookup_of(
        &self,
        resolved: Option<LookupValue>,
    ) -> Result<Option<FieldValue>, ConversionError> {
        match resolved {
            None => Ok(None),
            Some(LookupValue::Integer(lookup)) => Ok(Some(lookup.into())),
            Some(LookupValue::String(lookup)) => {
                self.to_integer_lookup(FieldValue::StringLookup(lookup))
            }
        }
    }

    /// A wire lookup object carries exactly one `id -> display name` entry.
    fn decode_lookup_map(
        &self,
        value: &FieldValue,
        map: &BTreeMap<String, String>,
    ) -> Result<(String, String), ConversionError> {
        let mut entries = map.iter();
        match (entries.next(), entries.next()) {
            (Some((id, name)), None) => Ok((id.clone(), name.clone())),
            _ => Err(self.unconvertible(value, "expected a single {id: name} entry")),
        }
    }

    fn unconvertible(&self, value: &FieldValue, reason: &str) -> ConversionError {
        ConversionError::UnconvertibleValue {
            field_name: self.field_name.to_string(),
            value: value.to_string(),
            from_type: value.type_name().to_string(),
            to_type: self.target,
            widget_type: self.widget_type,
            reason: reason.to_string(),
        }
    }
}

fn string_lookup_of(resolved: LookupValue) -> StringLookupValue {
    match resolved {
        LookupValue::String(lookup) => lookup,
        LookupValue::Integer(lookup) => {
            StringLookupValue::new(lookup.id.to_string(), lookup.display_name)
        }
    }
}

/// Interpret a value as a boolean. Text and string lookup keys go through
/// the Yes/No code table; numbers are true when non-zero; anything else is
/// false.
pub fn to_boolean(value: &FieldValue) -> bool {
    match value {
        FieldValue::Boolean(b) => *b,
        FieldValue::Text(s) => YES_CODES.contains(&s.as_str()),
        FieldValue::StringLookup(lookup) => YES_CODES.contains(&lookup.id.as_str()),
        FieldValue::Integer(n) => *n != 0,
        FieldValue::Decimal(d) => !d.is_zero(),
        FieldValue::IntegerLookup(lookup) => lookup.id != 0,
        _ => false,
    }
}

fn parse_date(input: &str, widget_type: WidgetType) -> Option<DateTime<Utc>> {
    match widget_type {
        WidgetType::Time => parse_time(input),
        WidgetType::DateTime => parse_rfc3339(input).or_else(|| parse_plain_date(input)),
        _ => parse_plain_date(input).or_else(|| parse_rfc3339(input)),
    }
}

fn parse_plain_date(input: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .map(|date| NaiveDateTime::new(date, NaiveTime::default()).and_utc())
}

fn parse_rfc3339(input: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_time(input: &str) -> Option<DateTime<Utc>> {
    NaiveTime::parse_from_str(input, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M"))
        .ok()
        .map(|time| NaiveDateTime::new(NaiveDate::default(), time).and_utc())
}
