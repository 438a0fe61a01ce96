//! Typed attribute values.
//!
//! A [`Value`] is what a record holds under an attribute name. Besides primitive
//! scalars it models the CRM-specific shapes: references to other records, money,
//! single and multi-valued choices, and aliased values produced by linked columns.
//!
//! An attribute that is absent from a record is distinct from an attribute that is
//! present and holds [`Value::Null`]; both are representable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A pointer to another record: target type, target identifier, and an optional
/// cached display name.
///
/// Two references are equal when their target identifiers are equal; the type name
/// and display name are not compared.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EntityReference {
    /// Logical name of the referenced record type.
    pub logical_name: String,
    /// Identifier of the referenced record.
    pub id: Uuid,
    /// Cached display name of the referenced record.
    pub name: Option<String>,
}

impl EntityReference {
    /// Creates a reference to the record `id` of type `logical_name`.
    pub fn new(logical_name: impl Into<String>, id: Uuid) -> Self {
        Self {
            logical_name: logical_name.into(),
            id,
            name: None,
        }
    }

    /// Sets the cached display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl PartialEq for EntityReference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// A monetary amount.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Money(pub f64);

/// A single choice (option set) code.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionSetValue(pub i32);

/// A value returned for a column of a linked record.
///
/// Linked columns are projected under `alias.attribute` and wrap the original
/// value together with where it came from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AliasedValue {
    /// Logical name of the linked record type.
    pub entity: String,
    /// Attribute name on the linked record.
    pub attribute: String,
    /// The linked record's value.
    pub value: Box<Value>,
}

/// A typed attribute value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Explicit null.
    Null,
    /// Text.
    String(String),
    /// Whole number.
    Integer(i64),
    /// Floating-point number.
    Float(f64),
    /// Two-state value.
    Boolean(bool),
    /// Point in time, always UTC.
    DateTime(DateTime<Utc>),
    /// Bare unique identifier (primary keys and intersect columns).
    Guid(Uuid),
    /// Reference to another record.
    Reference(EntityReference),
    /// Monetary amount.
    Money(Money),
    /// Single choice code.
    Choice(OptionSetValue),
    /// Multi-valued choice codes.
    ChoiceSet(BTreeSet<i32>),
    /// Value of a linked record's column.
    Aliased(AliasedValue),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the string slice if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Aliased(aliased) => aliased.value.as_str(),
            _ => None,
        }
    }

    /// Returns the identifier held by a GUID or reference value.
    ///
    /// Strings holding a hyphenated identifier are parsed as well, so callers can
    /// compare identifiers supplied as text.
    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            Value::Guid(id) => Some(*id),
            Value::Reference(reference) => Some(reference.id),
            Value::String(s) => Uuid::parse_str(s).ok(),
            Value::Aliased(aliased) => aliased.value.as_guid(),
            _ => None,
        }
    }

    /// Returns the integer held by an integer or choice value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Choice(choice) => Some(i64::from(choice.0)),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::String(s) => s.trim().parse().ok(),
            Value::Aliased(aliased) => aliased.value.as_integer(),
            _ => None,
        }
    }

    /// Returns the point in time held by a date-time value or an RFC 3339 string.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Value::Aliased(aliased) => aliased.value.as_datetime(),
            _ => None,
        }
    }

    /// Returns the reference if this is a reference value.
    pub fn as_reference(&self) -> Option<&EntityReference> {
        match self {
            Value::Reference(reference) => Some(reference),
            Value::Aliased(aliased) => aliased.value.as_reference(),
            _ => None,
        }
    }

    /// Strips any [`AliasedValue`] wrapper.
    pub fn unaliased(&self) -> &Value {
        match self {
            Value::Aliased(aliased) => aliased.value.unaliased(),
            other => other,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Guid(value)
    }
}

impl From<EntityReference> for Value {
    fn from(value: EntityReference) -> Self {
        Value::Reference(value)
    }
}

impl From<Money> for Value {
    fn from(value: Money) -> Self {
        Value::Money(value)
    }
}

impl From<OptionSetValue> for Value {
    fn from(value: OptionSetValue) -> Self {
        Value::Choice(value)
    }
}

impl From<BTreeSet<i32>> for Value {
    fn from(value: BTreeSet<i32>) -> Self {
        Value::ChoiceSet(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
