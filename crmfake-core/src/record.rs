//! The record: one stored item of a given type.
//!
//! A [`Record`] is identified by its type's logical name and a 128-bit identifier and
//! holds a map from attribute name to [`Value`]. Attribute names are case-sensitive keys.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::{
    query::ColumnSet,
    value::{EntityReference, Value},
};

/// A stored item of a given record type.
///
/// An identifier of [`Uuid::nil`] means "not yet assigned"; creating such a record
/// assigns a fresh identifier.
///
/// # Example
///
/// ```ignore
/// use crmfake::prelude::*;
///
/// let contact = Record::new("contact")
///     .with("firstname", "Ada")
///     .with("lastname", "Lovelace");
///
/// assert_eq!(contact.get("firstname").and_then(Value::as_str), Some("Ada"));
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Record {
    /// Logical name of the record type.
    pub logical_name: String,
    /// Unique identifier within the record type.
    pub id: Uuid,
    /// Attribute values keyed by attribute name.
    pub attributes: BTreeMap<String, Value>,
    /// Related records retrieved alongside this one, keyed by relationship name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub related_entities: BTreeMap<String, Vec<Record>>,
}

impl Record {
    /// Creates an empty record of type `logical_name` without an identifier.
    pub fn new(logical_name: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            ..Self::default()
        }
    }

    /// Creates an empty record of type `logical_name` with the given identifier.
    pub fn with_id(logical_name: impl Into<String>, id: Uuid) -> Self {
        Self {
            logical_name: logical_name.into(),
            id,
            ..Self::default()
        }
    }

    /// Sets an attribute and returns the record, for fluent construction.
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(attribute, value);
        self
    }

    /// Sets an attribute, replacing any previous value.
    pub fn set(&mut self, attribute: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(attribute.into(), value.into());
    }

    /// Returns the value of an attribute, if present.
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    /// Returns `true` if the attribute is present (even when it holds null).
    pub fn contains(&self, attribute: &str) -> bool {
        self.attributes.contains_key(attribute)
    }

    /// Removes an attribute, returning its value.
    pub fn remove(&mut self, attribute: &str) -> Option<Value> {
        self.attributes.remove(attribute)
    }

    /// Name of the primary identifier attribute of this record's type (`<type>id`).
    pub fn primary_id_attribute(&self) -> String {
        primary_id_attribute(&self.logical_name)
    }

    /// Returns the value of an attribute, falling back to the record identifier when
    /// the attribute is the primary identifier attribute and is not stored.
    pub fn attribute_or_id(&self, attribute: &str) -> Option<Value> {
        match self.attributes.get(attribute) {
            Some(value) => Some(value.clone()),
            None if attribute == self.primary_id_attribute() => Some(Value::Guid(self.id)),
            None => None,
        }
    }

    /// Returns a reference pointing at this record.
    pub fn to_reference(&self) -> EntityReference {
        EntityReference::new(self.logical_name.clone(), self.id)
    }

    /// Merges the attributes of `other` into this record.
    ///
    /// Attributes present on `other` overwrite the local ones; attributes absent from
    /// `other` are left untouched.
    pub fn merge(&mut self, other: Record) {
        self.attributes.extend(other.attributes);
    }

    /// Returns a copy of this record holding only the requested columns.
    ///
    /// Requested columns the record does not hold stay absent.
    pub fn project(&self, columns: &ColumnSet) -> Record {
        let attributes = match columns {
            ColumnSet::All => self.attributes.clone(),
            ColumnSet::Columns(names) => names
                .iter()
                .filter_map(|name| {
                    self.attributes
                        .get(name)
                        .map(|value| (name.clone(), value.clone()))
                })
                .collect(),
            ColumnSet::None => BTreeMap::new(),
        };

        Record {
            logical_name: self.logical_name.clone(),
            id: self.id,
            attributes,
            related_entities: BTreeMap::new(),
        }
    }
}

/// Name of the primary identifier attribute for a record type (`<type>id`).
pub fn primary_id_attribute(logical_name: &str) -> String {
    format!("{logical_name}id")
}
