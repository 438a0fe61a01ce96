//! Early-bound entities.
//!
//! Typed Rust structs can stand in for records. A type implementing [`Entity`]
//! converts to and from a [`Record`] through its serde representation, via the
//! blanket [`EntityExt`] extension.
//!
//! The identifier does not take part in serialization: mark the field
//! `#[serde(skip)]` and expose it through [`Entity::id`] and [`Entity::set_id`].
//!
//! # Example
//!
//! ```ignore
//! use crmfake::prelude::*;
//! use serde::{Deserialize, Serialize};
//! use uuid::Uuid;
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! pub struct Contact {
//!     #[serde(skip)]
//!     pub id: Uuid,
//!     pub firstname: String,
//!     pub lastname: Option<String>,
//! }
//!
//! impl Entity for Contact {
//!     fn logical_name() -> &'static str {
//!         "contact"
//!     }
//!
//!     fn id(&self) -> Uuid {
//!         self.id
//!     }
//!
//!     fn set_id(&mut self, id: Uuid) {
//!         self.id = id;
//!     }
//! }
//! ```

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Number, Value as Json, from_value, to_value};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::{
    error::{CrmError, CrmResult},
    record::Record,
    value::{EntityReference, Value},
};

/// A typed record.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Logical name of the record type.
    fn logical_name() -> &'static str;

    /// Identifier of this record; nil when not yet assigned.
    fn id(&self) -> Uuid;

    /// Assigns the identifier.
    fn set_id(&mut self, id: Uuid);
}

/// Conversions between typed entities and records.
pub trait EntityExt: Entity {
    /// Converts this entity to a record.
    ///
    /// Fields serialized as null are left out, so converting an entity with unset
    /// optional fields never overwrites stored values on update.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not serialize to a JSON object.
    fn to_record(&self) -> CrmResult<Record>;

    /// Creates an entity from a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is of another type or its attributes do not
    /// deserialize into the entity.
    fn from_record(record: &Record) -> CrmResult<Self>;
}

impl<E: Entity> EntityExt for E {
    fn to_record(&self) -> CrmResult<Record> {
        let Json::Object(fields) = to_value(self)? else {
            return Err(CrmError::Serialization(format!(
                "entity '{}' must serialize to an object",
                E::logical_name()
            )));
        };

        let mut record = Record::with_id(E::logical_name(), self.id());
        for (name, json) in fields {
            if let Some(value) = json_to_value(json) {
                record.set(name, value);
            }
        }

        Ok(record)
    }

    fn from_record(record: &Record) -> CrmResult<Self> {
        if record.logical_name != E::logical_name() {
            return Err(CrmError::InvalidArgument(format!(
                "cannot read a '{}' record as '{}'",
                record.logical_name,
                E::logical_name()
            )));
        }

        let fields: Map<String, Json> = record
            .attributes
            .iter()
            .map(|(name, value)| (name.clone(), value_to_json(value)))
            .collect();

        let mut entity: E = from_value(Json::Object(fields))?;
        entity.set_id(record.id);
        Ok(entity)
    }
}

fn json_to_value(json: Json) -> Option<Value> {
    match json {
        Json::Null => None,
        Json::Bool(b) => Some(Value::Boolean(b)),
        Json::Number(n) => Some(match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or_default()),
        }),
        Json::String(s) => Some(Value::String(s)),
        Json::Array(items) => {
            let codes: Option<BTreeSet<i32>> = items
                .iter()
                .map(|item| item.as_i64().and_then(|code| i32::try_from(code).ok()))
                .collect();
            codes.map(Value::ChoiceSet)
        }
        Json::Object(fields) => reference_from_object(&fields).map(Value::Reference),
    }
}

fn reference_from_object(fields: &Map<String, Json>) -> Option<EntityReference> {
    let logical_name = fields.get("logical_name")?.as_str()?;
    let id = Uuid::parse_str(fields.get("id")?.as_str()?).ok()?;
    let reference = EntityReference::new(logical_name, id);

    Some(match fields.get("name").and_then(Json::as_str) {
        Some(name) => reference.with_name(name),
        None => reference,
    })
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::String(s) => Json::String(s.clone()),
        Value::Integer(i) => Json::from(*i),
        Value::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Boolean(b) => Json::Bool(*b),
        Value::DateTime(dt) => Json::String(dt.to_rfc3339()),
        Value::Guid(id) => Json::String(id.hyphenated().to_string()),
        Value::Reference(reference) => to_value(reference).unwrap_or(Json::Null),
        Value::Money(money) => Number::from_f64(money.0).map_or(Json::Null, Json::Number),
        Value::Choice(choice) => Json::from(choice.0),
        Value::ChoiceSet(codes) => Json::Array(codes.iter().map(|c| Json::from(*c)).collect()),
        Value::Aliased(aliased) => value_to_json(&aliased.value),
    }
}
