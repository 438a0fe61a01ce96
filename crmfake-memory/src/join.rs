//! Link (join) resolution.
//!
//! Links are first resolved against the query: every link gets an alias and
//! concrete join attributes, either given explicitly or derived from a declared
//! relationship. [`JoinResolver`] then expands primary records into joined rows,
//! one row per combination of matches, keyed by alias.

use std::collections::{BTreeMap, HashMap, HashSet};

use crmfake_core::{
    error::{CrmError, CrmResult},
    query::{ColumnSet, FilterExpression, JoinOperator, LinkEntity, OrderExpression},
    record::{Record, primary_id_attribute},
    relationship::{RelationshipKind, Relationships},
    value::Value,
};

use crate::{
    evaluator::{EvaluationContext, FilterCompiler, RowScope},
    snapshot::SnapshotCache,
};

/// A link with its alias and join attributes settled.
#[derive(Debug, Clone)]
pub struct ResolvedLink {
    /// Unique alias within the query.
    pub alias: String,
    /// Linked record type.
    pub entity: String,
    /// Attribute read on the parent side.
    pub from_attribute: String,
    /// Attribute read on the linked side.
    pub to_attribute: String,
    /// Join kind.
    pub join_operator: JoinOperator,
    /// Columns to project.
    pub columns: ColumnSet,
    /// Filter narrowing the candidates.
    pub filter: Option<FilterExpression>,
    /// Sorts on the linked record.
    pub orders: Vec<OrderExpression>,
    /// Nested links.
    pub links: Vec<ResolvedLink>,
    /// Intersect hop of a many-to-many link; never projected.
    pub hidden: bool,
}

impl ResolvedLink {
    /// Visits this link and every nested link, parents first.
    pub fn walk<'l>(&'l self, visit: &mut impl FnMut(&'l ResolvedLink)) {
        visit(self);
        for link in &self.links {
            link.walk(visit);
        }
    }
}

/// Resolves the links of a query.
pub struct LinkResolver<'r> {
    relationships: &'r Relationships,
    seen: HashSet<String>,
    ordinal: usize,
}

impl<'r> LinkResolver<'r> {
    /// Creates a resolver consulting `relationships` for links that name one.
    pub fn new(relationships: &'r Relationships) -> Self {
        Self {
            relationships,
            seen: HashSet::new(),
            ordinal: 0,
        }
    }

    /// Resolves the links declared from `entity`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when two links share an alias, when a link
    /// names an undeclared relationship or one that does not connect the two
    /// record types, or when a link gives neither join attributes nor a relationship.
    pub fn resolve(&mut self, entity: &str, links: &[LinkEntity]) -> CrmResult<Vec<ResolvedLink>> {
        links.iter().map(|link| self.resolve_one(entity, link)).collect()
    }

    fn claim(&mut self, alias: String) -> CrmResult<String> {
        if !self.seen.insert(alias.clone()) {
            return Err(CrmError::Configuration(format!(
                "link alias '{alias}' is used more than once in the query"
            )));
        }

        Ok(alias)
    }

    fn resolve_one(&mut self, parent: &str, link: &LinkEntity) -> CrmResult<ResolvedLink> {
        self.ordinal += 1;
        let alias = match &link.alias {
            Some(alias) => alias.clone(),
            None => format!("{}{}", link.link_to_entity, self.ordinal),
        };
        let alias = self.claim(alias)?;
        let nested = self.resolve(&link.link_to_entity, &link.links)?;

        let target = |from_attribute: String, to_attribute: String| ResolvedLink {
            alias: alias.clone(),
            entity: link.link_to_entity.clone(),
            from_attribute,
            to_attribute,
            join_operator: link.join_operator,
            columns: link.columns.clone(),
            filter: link.filter.clone(),
            orders: link.orders.clone(),
            links: nested.clone(),
            hidden: false,
        };

        let Some(name) = &link.relationship else {
            if link.link_from_attribute.is_empty() || link.link_to_attribute.is_empty() {
                return Err(CrmError::Configuration(format!(
                    "link '{alias}' to '{}' names neither join attributes nor a relationship",
                    link.link_to_entity
                )));
            }
            return Ok(target(
                link.link_from_attribute.clone(),
                link.link_to_attribute.clone(),
            ));
        };

        let relationships = self.relationships;
        let relationship = relationships.require(name)?;
        let to = link.link_to_entity.as_str();
        let disconnected = || {
            CrmError::Configuration(format!(
                "relationship '{name}' does not connect '{parent}' to '{to}'"
            ))
        };

        match &relationship.kind {
            RelationshipKind::OneToMany {
                referenced_entity,
                referenced_attribute,
                referencing_entity,
                referencing_attribute,
                ..
            } => {
                // From the "one" side this lists children; from the "many" side it
                // reaches the referenced record.
                if parent == referenced_entity && to == referencing_entity {
                    Ok(target(referenced_attribute.clone(), referencing_attribute.clone()))
                } else if parent == referencing_entity && to == referenced_entity {
                    Ok(target(referencing_attribute.clone(), referenced_attribute.clone()))
                } else {
                    Err(disconnected())
                }
            }
            RelationshipKind::ManyToMany {
                entity1,
                entity1_intersect_attribute,
                entity2,
                entity2_intersect_attribute,
                intersect_entity,
            } => {
                let (near, far) = if parent == entity1 && to == entity2 {
                    (entity1_intersect_attribute, entity2_intersect_attribute)
                } else if parent == entity2 && to == entity1 {
                    (entity2_intersect_attribute, entity1_intersect_attribute)
                } else {
                    return Err(disconnected());
                };

                let hop_alias = self.claim(format!("{alias}.{intersect_entity}"))?;
                Ok(ResolvedLink {
                    alias: hop_alias,
                    entity: intersect_entity.clone(),
                    from_attribute: primary_id_attribute(parent),
                    to_attribute: near.clone(),
                    join_operator: link.join_operator,
                    columns: ColumnSet::None,
                    filter: None,
                    orders: Vec::new(),
                    links: vec![target(far.clone(), primary_id_attribute(to))],
                    hidden: true,
                })
            }
        }
    }
}

/// A primary record together with the linked records of one combination.
///
/// A linked slot holding `None` is an outer-join miss.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    /// The primary record.
    pub primary: Record,
    /// Linked records keyed by alias.
    pub linked: BTreeMap<String, Option<Record>>,
}

impl JoinedRow {
    /// Wraps a primary record with no links applied.
    pub fn new(primary: Record) -> Self {
        Self {
            primary,
            linked: BTreeMap::new(),
        }
    }
}

impl RowScope for JoinedRow {
    fn record(&self, alias: Option<&str>) -> Option<&Record> {
        match alias {
            None => Some(&self.primary),
            Some(alias) => self.linked.get(alias).and_then(Option::as_ref),
        }
    }
}

/// Normalized join key: values that compare equal produce the same key.
fn join_key(value: &Value) -> Option<String> {
    match value.unaliased() {
        Value::Null => None,
        Value::Guid(id) => Some(format!("g:{id}")),
        Value::Reference(reference) => Some(format!("g:{}", reference.id)),
        Value::String(text) => Some(match uuid::Uuid::parse_str(text) {
            Ok(id) => format!("g:{id}"),
            Err(_) => format!("s:{}", text.to_lowercase()),
        }),
        Value::Integer(i) => Some(format!("n:{i}")),
        Value::Choice(choice) => Some(format!("n:{}", choice.0)),
        Value::Float(f) => Some(format!("n:{f}")),
        Value::Money(money) => Some(format!("n:{}", money.0)),
        Value::Boolean(b) => Some(format!("b:{b}")),
        Value::DateTime(dt) => Some(format!("d:{}", dt.timestamp_micros())),
        Value::ChoiceSet(_) | Value::Aliased(_) => None,
    }
}

fn join_value(record: &Record, attribute: &str) -> Option<String> {
    match record.get(attribute) {
        Some(value) => join_key(value),
        None => record
            .attribute_or_id(attribute)
            .as_ref()
            .and_then(join_key),
    }
}

/// Expands primary records through resolved links.
pub struct JoinResolver<'q, 'a> {
    context: EvaluationContext<'a>,
    snapshots: &'q SnapshotCache<'a>,
}

impl<'q, 'a> JoinResolver<'q, 'a> {
    /// Creates a resolver reading linked records from `snapshots`.
    pub fn new(context: EvaluationContext<'a>, snapshots: &'q SnapshotCache<'a>) -> Self {
        Self { context, snapshots }
    }

    /// Produces one row per combination of matches for every link.
    ///
    /// Inner links drop rows without a match; outer links keep them once with a
    /// `None` slot. A link under an outer-join miss gets a `None` slot as well.
    pub fn expand(&self, primaries: Vec<Record>, links: &[ResolvedLink]) -> CrmResult<Vec<JoinedRow>> {
        let mut rows: Vec<JoinedRow> = primaries.into_iter().map(JoinedRow::new).collect();

        for link in links {
            rows = self.apply(rows, link, None)?;
        }

        Ok(rows)
    }

    fn candidates(&self, link: &ResolvedLink) -> CrmResult<HashMap<String, Vec<Record>>> {
        let records = self.snapshots.of_type(&link.entity);
        let filter = match &link.filter {
            Some(filter) => {
                let aliases = HashMap::from([(link.alias.clone(), link.entity.clone())]);
                Some(FilterCompiler::new(self.context, self.snapshots, &link.entity, &aliases).compile(filter)?)
            }
            None => None,
        };

        let mut index: HashMap<String, Vec<Record>> = HashMap::new();
        for record in records.iter() {
            if filter.as_ref().is_some_and(|filter| !filter.matches(record)) {
                continue;
            }
            if let Some(key) = join_value(record, &link.to_attribute) {
                index.entry(key).or_default().push(record.clone());
            }
        }

        Ok(index)
    }

    fn apply(
        &self,
        rows: Vec<JoinedRow>,
        link: &ResolvedLink,
        parent: Option<&str>,
    ) -> CrmResult<Vec<JoinedRow>> {
        let index = self.candidates(link)?;
        let mut joined = Vec::with_capacity(rows.len());

        for row in rows {
            let Some(source) = row.record(parent) else {
                let mut row = row;
                row.linked.insert(link.alias.clone(), None);
                joined.push(row);
                continue;
            };

            let matches = join_value(source, &link.from_attribute)
                .and_then(|key| index.get(&key))
                .filter(|matches| !matches.is_empty());

            match (matches, link.join_operator) {
                (Some(matches), _) => {
                    for matched in matches {
                        let mut expanded = row.clone();
                        expanded.linked.insert(link.alias.clone(), Some(matched.clone()));
                        joined.push(expanded);
                    }
                }
                (None, JoinOperator::LeftOuter) => {
                    let mut row = row;
                    row.linked.insert(link.alias.clone(), None);
                    joined.push(row);
                }
                (None, JoinOperator::Inner) => {}
            }
        }

        for nested in &link.links {
            joined = self.apply(joined, nested, Some(&link.alias))?;
        }

        Ok(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crmfake_core::{
        backend::RecordBackend, context::CallerContext, error::ErrorKind, query::Filter,
        relationship::Relationship, value::EntityReference,
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn expand(
        store: &InMemoryStore,
        relationships: &Relationships,
        entity: &str,
        links: &[LinkEntity],
    ) -> CrmResult<Vec<JoinedRow>> {
        let caller = CallerContext::default();
        let context = EvaluationContext {
            now: Utc::now(),
            caller: &caller,
            relationships,
            validate_attributes: true,
        };
        let snapshots = SnapshotCache::new(store);
        let resolved = LinkResolver::new(relationships).resolve(entity, links)?;

        JoinResolver::new(context, &snapshots).expand(store.all_of_type(entity), &resolved)
    }

    fn fixture() -> (InMemoryStore, Uuid, Uuid, Uuid) {
        let store = InMemoryStore::new();
        let contoso = Uuid::new_v4();
        store
            .insert(Record::with_id("account", contoso).with("name", "Contoso"))
            .unwrap();

        let ada = Uuid::new_v4();
        let grace = Uuid::new_v4();
        store
            .insert(
                Record::with_id("contact", ada)
                    .with("fullname", "Ada")
                    .with("parentcustomerid", EntityReference::new("account", contoso)),
            )
            .unwrap();
        store
            .insert(Record::with_id("contact", grace).with("fullname", "Grace"))
            .unwrap();

        (store, contoso, ada, grace)
    }

    #[test]
    fn inner_links_drop_unmatched_primaries() {
        let (store, contoso, ada, _) = fixture();
        let link = LinkEntity::new("account", "parentcustomerid", "accountid", JoinOperator::Inner)
            .alias("acc");

        let rows = expand(&store, &Relationships::new(), "contact", &[link]).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].primary.id, ada);
        assert_eq!(rows[0].linked["acc"].as_ref().map(|r| r.id), Some(contoso));
    }

    #[test]
    fn outer_links_keep_unmatched_primaries_with_an_empty_slot() {
        let (store, _, _, grace) = fixture();
        let link = LinkEntity::new("account", "parentcustomerid", "accountid", JoinOperator::LeftOuter)
            .alias("acc")
            .link(
                LinkEntity::new("contact", "accountid", "parentcustomerid", JoinOperator::Inner)
                    .alias("siblings"),
            );

        let rows = expand(&store, &Relationships::new(), "contact", &[link]).unwrap();

        assert_eq!(rows.len(), 2);
        let miss = rows.iter().find(|row| row.primary.id == grace).unwrap();
        assert_eq!(miss.linked.get("acc"), Some(&None));
        assert_eq!(miss.linked.get("siblings"), Some(&None));
    }

    #[test]
    fn link_filters_narrow_candidates_before_joining() {
        let (store, _, _, _) = fixture();
        let link = LinkEntity::new("account", "parentcustomerid", "accountid", JoinOperator::LeftOuter)
            .alias("acc")
            .filter(Filter::eq("name", "Fabrikam"));

        let rows = expand(&store, &Relationships::new(), "contact", &[link]).unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.linked["acc"].is_none()));
    }

    #[test]
    fn one_to_many_links_expand_per_match() {
        let (store, contoso, _, _) = fixture();
        store
            .insert(
                Record::with_id("contact", Uuid::new_v4())
                    .with("fullname", "Alan")
                    .with("parentcustomerid", EntityReference::new("account", contoso)),
            )
            .unwrap();

        let mut relationships = Relationships::new();
        relationships.add(Relationship::one_to_many(
            "contact_customer_accounts",
            "account",
            "contact",
            "parentcustomerid",
        ));
        let link = LinkEntity::via("contact_customer_accounts", "contact", JoinOperator::Inner);

        let rows = expand(&store, &relationships, "account", &[link]).unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.linked.contains_key("contact1")));
    }

    #[test]
    fn many_to_many_links_hop_through_the_intersect() {
        let store = InMemoryStore::new();
        let (lead, product) = (Uuid::new_v4(), Uuid::new_v4());
        store.insert(Record::with_id("lead", lead)).unwrap();
        store
            .insert(Record::with_id("product", product).with("name", "Widget"))
            .unwrap();
        store
            .insert(
                Record::with_id("leadproduct", Uuid::new_v4())
                    .with("leadid", lead)
                    .with("productid", product),
            )
            .unwrap();

        let mut relationships = Relationships::new();
        relationships.add(Relationship::many_to_many(
            "leadproduct_association",
            "lead",
            "product",
            "leadproduct",
        ));
        let link = LinkEntity::via("leadproduct_association", "product", JoinOperator::Inner)
            .alias("p");

        let rows = expand(&store, &relationships, "lead", &[link]).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].linked["p"].as_ref().map(|r| r.id), Some(product));
    }

    #[test]
    fn duplicate_aliases_and_unknown_relationships_are_configuration_errors() {
        let (store, _, _, _) = fixture();
        let links = [
            LinkEntity::new("account", "parentcustomerid", "accountid", JoinOperator::Inner).alias("a"),
            LinkEntity::new("account", "parentcustomerid", "accountid", JoinOperator::Inner).alias("a"),
        ];
        let err = expand(&store, &Relationships::new(), "contact", &links).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("'a'"));

        let link = LinkEntity::via("no_such_relationship", "account", JoinOperator::Inner);
        let err = expand(&store, &Relationships::new(), "contact", &[link]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("no_such_relationship"));
    }

    #[test]
    fn dotted_aliases_are_opaque_labels() {
        let (store, contoso, _, _) = fixture();
        let link = LinkEntity::new("account", "parentcustomerid", "accountid", JoinOperator::Inner)
            .alias("parent.account");

        let rows = expand(&store, &Relationships::new(), "contact", &[link]).unwrap();

        assert_eq!(rows[0].linked["parent.account"].as_ref().map(|r| r.id), Some(contoso));
    }
}
