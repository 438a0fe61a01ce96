//! Relationship descriptors.
//!
//! A [`Relationship`] declares how two record types relate. Relationships are used
//! by links that name a relationship instead of join attributes, by related-record
//! retrieval, by associate/disassociate, and by hierarchical condition operators.
//! The store never enforces them at write time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{
    error::{CrmError, CrmResult},
    record::primary_id_attribute,
};

/// The shape of a relationship.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum RelationshipKind {
    /// An attribute on the "many" side references the "one" side.
    OneToMany {
        /// The "one" side record type.
        referenced_entity: String,
        /// Attribute on the "one" side the reference points at (usually its primary id).
        referenced_attribute: String,
        /// The "many" side record type.
        referencing_entity: String,
        /// Attribute on the "many" side holding the reference.
        referencing_attribute: String,
        /// Whether the relationship describes a parent/child hierarchy.
        hierarchical: bool,
    },
    /// Pairs are stored as records of an intersect type.
    ManyToMany {
        /// First record type.
        entity1: String,
        /// Intersect attribute holding the first record's identifier.
        entity1_intersect_attribute: String,
        /// Second record type.
        entity2: String,
        /// Intersect attribute holding the second record's identifier.
        entity2_intersect_attribute: String,
        /// The intersect record type.
        intersect_entity: String,
    },
}

/// A named relationship between two record types.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Relationship {
    /// Unique name of the relationship.
    pub schema_name: String,
    /// The relationship shape.
    pub kind: RelationshipKind,
}

impl Relationship {
    /// Declares a one-to-many relationship where `referencing_attribute` on
    /// `referencing_entity` points at the primary identifier of `referenced_entity`.
    pub fn one_to_many(
        schema_name: impl Into<String>,
        referenced_entity: impl Into<String>,
        referencing_entity: impl Into<String>,
        referencing_attribute: impl Into<String>,
    ) -> Self {
        let referenced_entity = referenced_entity.into();

        Self {
            schema_name: schema_name.into(),
            kind: RelationshipKind::OneToMany {
                referenced_attribute: primary_id_attribute(&referenced_entity),
                referenced_entity,
                referencing_entity: referencing_entity.into(),
                referencing_attribute: referencing_attribute.into(),
                hierarchical: false,
            },
        }
    }

    /// Declares a self-referencing parent relationship used by the hierarchical
    /// condition operators.
    pub fn hierarchical(
        schema_name: impl Into<String>,
        entity: impl Into<String>,
        parent_attribute: impl Into<String>,
    ) -> Self {
        let entity = entity.into();

        Self {
            schema_name: schema_name.into(),
            kind: RelationshipKind::OneToMany {
                referenced_attribute: primary_id_attribute(&entity),
                referenced_entity: entity.clone(),
                referencing_entity: entity,
                referencing_attribute: parent_attribute.into(),
                hierarchical: true,
            },
        }
    }

    /// Declares a many-to-many relationship stored in `intersect_entity`, whose
    /// records hold `<entity1>id` and `<entity2>id` (or `<entity>idone`/`<entity>idtwo`
    /// when both sides are the same type).
    pub fn many_to_many(
        schema_name: impl Into<String>,
        entity1: impl Into<String>,
        entity2: impl Into<String>,
        intersect_entity: impl Into<String>,
    ) -> Self {
        let entity1 = entity1.into();
        let entity2 = entity2.into();
        let (entity1_intersect_attribute, entity2_intersect_attribute) = if entity1 == entity2 {
            (format!("{entity1}idone"), format!("{entity2}idtwo"))
        } else {
            (primary_id_attribute(&entity1), primary_id_attribute(&entity2))
        };

        Self {
            schema_name: schema_name.into(),
            kind: RelationshipKind::ManyToMany {
                entity1,
                entity1_intersect_attribute,
                entity2,
                entity2_intersect_attribute,
                intersect_entity: intersect_entity.into(),
            },
        }
    }
}

/// Registry of relationships keyed by schema name.
#[derive(Debug, Clone, Default)]
pub struct Relationships {
    by_name: HashMap<String, Relationship>,
    // Schema names in first-registration order.
    order: Vec<String>,
}

impl Relationships {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a relationship, replacing any previous one with the same name.
    ///
    /// A replaced relationship keeps its original registration position.
    pub fn add(&mut self, relationship: Relationship) {
        let name = relationship.schema_name.clone();
        if self.by_name.insert(name.clone(), relationship).is_none() {
            self.order.push(name);
        }
    }

    /// Looks up a relationship by name.
    pub fn get(&self, schema_name: &str) -> Option<&Relationship> {
        self.by_name.get(schema_name)
    }

    /// Looks up a relationship by name, raising a configuration error naming it when
    /// it is not registered.
    pub fn require(&self, schema_name: &str) -> CrmResult<&Relationship> {
        self.get(schema_name).ok_or_else(|| {
            CrmError::Configuration(format!("relationship '{schema_name}' is not declared"))
        })
    }

    /// Attribute holding the parent reference for hierarchical operators on `entity`.
    ///
    /// Uses the first registered hierarchical relationship when there is one and
    /// `parent<entity>id` otherwise.
    pub fn hierarchy_attribute(&self, entity: &str) -> String {
        self.order
            .iter()
            .filter_map(|name| self.by_name.get(name))
            .find_map(|relationship| match &relationship.kind {
                RelationshipKind::OneToMany {
                    referencing_entity,
                    referencing_attribute,
                    hierarchical: true,
                    ..
                } if referencing_entity == entity => Some(referencing_attribute.clone()),
                _ => None,
            })
            .unwrap_or_else(|| format!("parent{entity}id"))
    }

    /// Number of registered relationships.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns `true` if no relationship is registered.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_attribute_prefers_the_first_registered_relationship() {
        let mut relationships = Relationships::new();
        for index in 0..16 {
            relationships.add(Relationship::one_to_many(
                format!("unrelated_{index}"),
                "account",
                "contact",
                "parentcustomerid",
            ));
        }
        relationships.add(Relationship::hierarchical(
            "account_parent_account",
            "account",
            "parentaccountid",
        ));
        relationships.add(Relationship::hierarchical(
            "account_master_account",
            "account",
            "masteraccountid",
        ));

        assert_eq!(relationships.hierarchy_attribute("account"), "parentaccountid");

        // Re-registering keeps the original position.
        relationships.add(Relationship::hierarchical(
            "account_parent_account",
            "account",
            "parentaccountid",
        ));
        assert_eq!(relationships.hierarchy_attribute("account"), "parentaccountid");
        assert_eq!(relationships.len(), 18);
    }

    #[test]
    fn undeclared_hierarchies_fall_back_to_the_parent_attribute() {
        let relationships = Relationships::new();
        assert_eq!(relationships.hierarchy_attribute("contact"), "parentcontactid");
    }
}
