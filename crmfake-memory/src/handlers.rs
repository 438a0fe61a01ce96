//! Built-in operation handlers.
//!
//! One handler per typed [`Request`] variant. They are registered by
//! [`OperationPipeline::with_default_handlers`](crate::pipeline::OperationPipeline::with_default_handlers)
//! and can be shadowed by registering another handler for the same kind.

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crmfake_core::{
    error::{CrmError, CrmResult},
    page::EntityCollection,
    query::{Filter, JoinOperator, LinkEntity, QueryExpression},
    record::{Record, primary_id_attribute},
    relationship::{Relationship, RelationshipKind},
    request::{AssociateRequest, RelatedQuery, Request, Response, RetrieveRequest},
    value::{EntityReference, OptionSetValue, Value},
};

use crate::{
    pipeline::OperationHandler,
    service::FakeOrganizationService,
    translator::QueryTranslator,
};

/// Handles [`Request::Create`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateHandler;

/// Handles [`Request::Retrieve`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrieveHandler;

/// Handles [`Request::Update`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateHandler;

/// Handles [`Request::Delete`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteHandler;

/// Handles [`Request::Associate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AssociateHandler;

/// Handles [`Request::Disassociate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DisassociateHandler;

/// Handles [`Request::RetrieveMultiple`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrieveMultipleHandler;

/// Handles [`Request::Upsert`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertHandler;

/// Handles [`Request::WhoAmI`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WhoAmIHandler;

fn mismatch(handler: &str, request: &Request) -> CrmError {
    CrmError::Configuration(format!(
        "handler '{handler}' cannot execute a '{}' request",
        request.kind()
    ))
}

impl OperationHandler for CreateHandler {
    fn name(&self) -> &str {
        "create"
    }

    fn can_handle(&self, request: &Request) -> bool {
        matches!(request, Request::Create(_))
    }

    fn execute(&self, request: &Request, service: &FakeOrganizationService) -> CrmResult<Response> {
        let Request::Create(record) = request else {
            return Err(mismatch(self.name(), request));
        };

        create(service, record.clone()).map(Response::Create)
    }
}

impl OperationHandler for RetrieveHandler {
    fn name(&self) -> &str {
        "retrieve"
    }

    fn can_handle(&self, request: &Request) -> bool {
        matches!(request, Request::Retrieve(_))
    }

    fn execute(&self, request: &Request, service: &FakeOrganizationService) -> CrmResult<Response> {
        let Request::Retrieve(retrieve) = request else {
            return Err(mismatch(self.name(), request));
        };

        self::retrieve(service, retrieve).map(Response::Retrieve)
    }
}

impl OperationHandler for UpdateHandler {
    fn name(&self) -> &str {
        "update"
    }

    fn can_handle(&self, request: &Request) -> bool {
        matches!(request, Request::Update(_))
    }

    fn execute(&self, request: &Request, service: &FakeOrganizationService) -> CrmResult<Response> {
        let Request::Update(record) = request else {
            return Err(mismatch(self.name(), request));
        };

        update(service, record.clone())?;
        Ok(Response::Update)
    }
}

impl OperationHandler for DeleteHandler {
    fn name(&self) -> &str {
        "delete"
    }

    fn can_handle(&self, request: &Request) -> bool {
        matches!(request, Request::Delete(_))
    }

    fn execute(&self, request: &Request, service: &FakeOrganizationService) -> CrmResult<Response> {
        let Request::Delete(target) = request else {
            return Err(mismatch(self.name(), request));
        };

        service.backend().delete(&target.logical_name, target.id)?;
        Ok(Response::Delete)
    }
}

impl OperationHandler for AssociateHandler {
    fn name(&self) -> &str {
        "associate"
    }

    fn can_handle(&self, request: &Request) -> bool {
        matches!(request, Request::Associate(_))
    }

    fn execute(&self, request: &Request, service: &FakeOrganizationService) -> CrmResult<Response> {
        let Request::Associate(associate) = request else {
            return Err(mismatch(self.name(), request));
        };

        self::associate(service, associate)?;
        Ok(Response::Associate)
    }
}

impl OperationHandler for DisassociateHandler {
    fn name(&self) -> &str {
        "disassociate"
    }

    fn can_handle(&self, request: &Request) -> bool {
        matches!(request, Request::Disassociate(_))
    }

    fn execute(&self, request: &Request, service: &FakeOrganizationService) -> CrmResult<Response> {
        let Request::Disassociate(disassociate) = request else {
            return Err(mismatch(self.name(), request));
        };

        self::disassociate(service, disassociate)?;
        Ok(Response::Disassociate)
    }
}

impl OperationHandler for RetrieveMultipleHandler {
    fn name(&self) -> &str {
        "retrieve-multiple"
    }

    fn can_handle(&self, request: &Request) -> bool {
        matches!(request, Request::RetrieveMultiple(_))
    }

    fn execute(&self, request: &Request, service: &FakeOrganizationService) -> CrmResult<Response> {
        let Request::RetrieveMultiple(query) = request else {
            return Err(mismatch(self.name(), request));
        };

        query_records(service, query).map(Response::RetrieveMultiple)
    }
}

impl OperationHandler for UpsertHandler {
    fn name(&self) -> &str {
        "upsert"
    }

    fn can_handle(&self, request: &Request) -> bool {
        matches!(request, Request::Upsert(_))
    }

    fn execute(&self, request: &Request, service: &FakeOrganizationService) -> CrmResult<Response> {
        let Request::Upsert(record) = request else {
            return Err(mismatch(self.name(), request));
        };

        let id = record_id(record);
        if !id.is_nil() && service.backend().contains(&record.logical_name, id) {
            let mut record = record.clone();
            record.id = id;
            update(service, record)?;
            return Ok(Response::Upsert { id, created: false });
        }

        let id = create(service, record.clone())?;
        Ok(Response::Upsert { id, created: true })
    }
}

impl OperationHandler for WhoAmIHandler {
    fn name(&self) -> &str {
        "who-am-i"
    }

    fn can_handle(&self, request: &Request) -> bool {
        matches!(request, Request::WhoAmI)
    }

    fn execute(&self, _: &Request, service: &FakeOrganizationService) -> CrmResult<Response> {
        let caller = service.caller();
        Ok(Response::WhoAmI {
            user_id: caller.user_id,
            business_unit_id: caller.business_unit_id,
            organization_id: caller.organization_id,
        })
    }
}

/// Identifier of a record, falling back to its primary identifier attribute.
fn record_id(record: &Record) -> Uuid {
    if !record.id.is_nil() {
        return record.id;
    }

    record
        .get(&record.primary_id_attribute())
        .and_then(Value::as_guid)
        .unwrap_or_else(Uuid::nil)
}

fn stamp_if_absent(record: &mut Record, attribute: &str, value: impl Into<Value>) {
    if !record.contains(attribute) {
        record.set(attribute, value);
    }
}

fn create(service: &FakeOrganizationService, mut record: Record) -> CrmResult<Uuid> {
    record.id = match record_id(&record) {
        id if id.is_nil() => Uuid::new_v4(),
        id => id,
    };

    if service.config().auto_attributes {
        let now: DateTime<Utc> = Utc::now();
        let primary = record.primary_id_attribute();
        record.set(primary, record.id);
        stamp_if_absent(&mut record, "createdon", now);
        stamp_if_absent(&mut record, "modifiedon", now);
        stamp_if_absent(&mut record, "ownerid", service.caller().user_reference());
        stamp_if_absent(&mut record, "statecode", OptionSetValue(0));
    }

    let id = record.id;
    service.backend().insert(record)?;
    Ok(id)
}

fn update(service: &FakeOrganizationService, mut record: Record) -> CrmResult<()> {
    record.id = record_id(&record);
    if record.id.is_nil() {
        return Err(CrmError::InvalidArgument(format!(
            "update of '{}' carries no record identifier",
            record.logical_name
        )));
    }

    if service.config().auto_attributes {
        record.set("modifiedon", Utc::now());
    }

    service.backend().merge(record)
}

fn query_records(
    service: &FakeOrganizationService,
    query: &QueryExpression,
) -> CrmResult<EntityCollection> {
    QueryTranslator::new(service.backend(), service.evaluation_context(), service.config())
        .execute(query)
}

fn retrieve(service: &FakeOrganizationService, request: &RetrieveRequest) -> CrmResult<Record> {
    let target = &request.target;
    let stored = service.backend().get(&target.logical_name, target.id)?;
    let mut record = stored.project(&request.columns);

    for related in &request.related {
        let records = related_records(service, target, related)?;
        record
            .related_entities
            .insert(related.relationship.clone(), records);
    }

    Ok(record)
}

/// Runs a related-record query restricted to records related to `target`.
///
/// The restriction is an inner link from the related type back to the target
/// with a filter on the target's identifier.
fn related_records(
    service: &FakeOrganizationService,
    target: &EntityReference,
    related: &RelatedQuery,
) -> CrmResult<Vec<Record>> {
    let relationship = service.relationships().require(&related.relationship)?;
    let alias = format!("{}.target", relationship.schema_name);
    let target_id = Filter::eq(
        primary_id_attribute(&target.logical_name),
        target.id,
    );

    let link = match &relationship.kind {
        RelationshipKind::OneToMany {
            referenced_entity,
            referenced_attribute,
            referencing_entity,
            referencing_attribute,
            ..
        } => {
            if target.logical_name == *referenced_entity
                && related.query.entity_name == *referencing_entity
            {
                LinkEntity::new(
                    &target.logical_name,
                    referencing_attribute,
                    referenced_attribute,
                    JoinOperator::Inner,
                )
            } else if target.logical_name == *referencing_entity
                && related.query.entity_name == *referenced_entity
            {
                LinkEntity::new(
                    &target.logical_name,
                    referenced_attribute,
                    referencing_attribute,
                    JoinOperator::Inner,
                )
            } else {
                return Err(disconnected(relationship, target, &related.query.entity_name));
            }
        }
        RelationshipKind::ManyToMany { .. } => {
            LinkEntity::via(&relationship.schema_name, &target.logical_name, JoinOperator::Inner)
        }
    };

    let mut query = related.query.clone();
    query.links.push(link.alias(alias).filter(target_id));
    Ok(query_records(service, &query)?.records)
}

fn disconnected(relationship: &Relationship, target: &EntityReference, other: &str) -> CrmError {
    CrmError::Configuration(format!(
        "relationship '{}' does not connect '{}' to '{other}'",
        relationship.schema_name, target.logical_name
    ))
}

/// The pair `(entity1 id, entity2 id)` of an intersect record.
fn intersect_pair(
    relationship: &Relationship,
    target: &EntityReference,
    related: &EntityReference,
) -> CrmResult<(Uuid, Uuid)> {
    let RelationshipKind::ManyToMany {
        entity1, entity2, ..
    } = &relationship.kind
    else {
        return Err(disconnected(relationship, target, &related.logical_name));
    };

    if target.logical_name == *entity1 && related.logical_name == *entity2 {
        Ok((target.id, related.id))
    } else if target.logical_name == *entity2 && related.logical_name == *entity1 {
        Ok((related.id, target.id))
    } else {
        Err(disconnected(relationship, target, &related.logical_name))
    }
}

/// Matches intersect records linking `id1` and `id2`.
fn links_pair<'a>(
    (attribute1, id1): (&'a str, Uuid),
    (attribute2, id2): (&'a str, Uuid),
) -> impl Fn(&Record) -> bool + 'a {
    let holds = |record: &Record, attribute: &str, id: Uuid| {
        record.get(attribute).and_then(Value::as_guid) == Some(id)
    };

    move |record| holds(record, attribute1, id1) && holds(record, attribute2, id2)
}

fn find_intersect(
    service: &FakeOrganizationService,
    intersect_entity: &str,
    first: (&str, Uuid),
    second: (&str, Uuid),
) -> Option<Uuid> {
    let links = links_pair(first, second);

    service
        .backend()
        .all_of_type(intersect_entity)
        .into_iter()
        .find(|record| links(record))
        .map(|record| record.id)
}

fn associate(service: &FakeOrganizationService, request: &AssociateRequest) -> CrmResult<()> {
    let backend = service.backend();
    let relationship = service.relationships().require(&request.relationship)?;
    let target = &request.target;
    backend.get(&target.logical_name, target.id)?;

    for related in &request.related_entities {
        backend.get(&related.logical_name, related.id)?;

        match &relationship.kind {
            RelationshipKind::OneToMany {
                referenced_entity,
                referencing_entity,
                referencing_attribute,
                ..
            } => {
                let (child, parent) = if target.logical_name == *referenced_entity
                    && related.logical_name == *referencing_entity
                {
                    (related, target)
                } else if target.logical_name == *referencing_entity
                    && related.logical_name == *referenced_entity
                {
                    (target, related)
                } else {
                    return Err(disconnected(relationship, target, &related.logical_name));
                };

                backend.merge(
                    Record::with_id(&child.logical_name, child.id).with(
                        referencing_attribute,
                        EntityReference::new(&parent.logical_name, parent.id),
                    ),
                )?;
            }
            RelationshipKind::ManyToMany {
                entity1_intersect_attribute,
                entity2_intersect_attribute,
                intersect_entity,
                ..
            } => {
                let (id1, id2) = intersect_pair(relationship, target, related)?;
                backend.insert_unless(
                    Record::with_id(intersect_entity, Uuid::new_v4())
                        .with(entity1_intersect_attribute, id1)
                        .with(entity2_intersect_attribute.as_str(), id2),
                    &links_pair(
                        (entity1_intersect_attribute.as_str(), id1),
                        (entity2_intersect_attribute.as_str(), id2),
                    ),
                )?;
            }
        }
    }

    debug!(
        relationship = %request.relationship,
        target = %target.id,
        related = request.related_entities.len(),
        "associated records"
    );
    Ok(())
}

fn disassociate(service: &FakeOrganizationService, request: &AssociateRequest) -> CrmResult<()> {
    let backend = service.backend();
    let relationship = service.relationships().require(&request.relationship)?;
    let target = &request.target;

    for related in &request.related_entities {
        match &relationship.kind {
            RelationshipKind::OneToMany {
                referenced_entity,
                referencing_entity,
                referencing_attribute,
                ..
            } => {
                let (child, parent) = if target.logical_name == *referenced_entity
                    && related.logical_name == *referencing_entity
                {
                    (related, target)
                } else if target.logical_name == *referencing_entity
                    && related.logical_name == *referenced_entity
                {
                    (target, related)
                } else {
                    return Err(disconnected(relationship, target, &related.logical_name));
                };

                let stored = backend.get(&child.logical_name, child.id)?;
                let linked = stored
                    .get(referencing_attribute)
                    .and_then(Value::as_guid)
                    .is_some_and(|id| id == parent.id);
                if !linked {
                    return Err(CrmError::NotFound {
                        entity: child.logical_name.clone(),
                        id: child.id,
                    });
                }

                backend.merge(
                    Record::with_id(&child.logical_name, child.id)
                        .with(referencing_attribute, Value::Null),
                )?;
            }
            RelationshipKind::ManyToMany {
                entity1_intersect_attribute,
                entity2_intersect_attribute,
                intersect_entity,
                ..
            } => {
                let (id1, id2) = intersect_pair(relationship, target, related)?;
                let existing = find_intersect(
                    service,
                    intersect_entity,
                    (entity1_intersect_attribute.as_str(), id1),
                    (entity2_intersect_attribute.as_str(), id2),
                )
                .ok_or_else(|| CrmError::NotFound {
                    entity: intersect_entity.clone(),
                    id: related.id,
                })?;

                backend.delete(intersect_entity, existing)?;
            }
        }
    }

    debug!(
        relationship = %request.relationship,
        target = %target.id,
        related = request.related_entities.len(),
        "disassociated records"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmfake_core::{config::ServiceConfig, error::ErrorKind, query::ColumnSet};

    fn service() -> FakeOrganizationService {
        FakeOrganizationService::builder()
            .with_relationship(Relationship::one_to_many(
                "contact_customer_accounts",
                "account",
                "contact",
                "parentcustomerid",
            ))
            .with_relationship(Relationship::many_to_many(
                "accountleads_association",
                "account",
                "lead",
                "accountleads",
            ))
            .build()
    }

    #[test]
    fn create_stamps_automatic_attributes_without_overwriting() {
        let service = service();
        let owner = EntityReference::new("systemuser", Uuid::new_v4());
        let id = service
            .create(Record::new("contact").with("ownerid", owner.clone()))
            .unwrap();

        let stored = service.retrieve("contact", id, ColumnSet::All).unwrap();
        assert_eq!(stored.get("contactid"), Some(&Value::Guid(id)));
        assert!(stored.contains("createdon"));
        assert!(stored.contains("modifiedon"));
        assert_eq!(stored.get("ownerid"), Some(&Value::Reference(owner)));
        assert_eq!(stored.get("statecode"), Some(&Value::Choice(OptionSetValue(0))));
    }

    #[test]
    fn automatic_attributes_can_be_disabled() {
        let service = FakeOrganizationService::builder()
            .with_config(ServiceConfig::builder().with_auto_attributes(false).build())
            .build();
        let id = service.create(Record::new("contact").with("fullname", "Ada")).unwrap();

        let stored = service.retrieve("contact", id, ColumnSet::All).unwrap();
        assert_eq!(stored.attributes.len(), 1);
    }

    #[test]
    fn create_takes_the_identifier_from_the_primary_attribute() {
        let service = service();
        let id = Uuid::new_v4();

        assert_eq!(service.create(Record::new("contact").with("contactid", id)).unwrap(), id);
        assert_eq!(
            service.create(Record::with_id("contact", id)).unwrap_err().kind(),
            ErrorKind::Duplicate
        );
    }

    #[test]
    fn upsert_creates_then_merges() {
        let service = service();
        let id = Uuid::new_v4();

        let created = service
            .execute(Request::Upsert(Record::with_id("contact", id).with("firstname", "Ada")))
            .unwrap();
        assert_eq!(created, Response::Upsert { id, created: true });

        let updated = service
            .execute(Request::Upsert(Record::with_id("contact", id).with("lastname", "Lovelace")))
            .unwrap();
        assert_eq!(updated, Response::Upsert { id, created: false });

        let stored = service.retrieve("contact", id, ColumnSet::All).unwrap();
        assert_eq!(stored.get("firstname").and_then(Value::as_str), Some("Ada"));
        assert_eq!(stored.get("lastname").and_then(Value::as_str), Some("Lovelace"));
    }

    #[test]
    fn one_to_many_association_round_trip() {
        let service = service();
        let account = service.create(Record::new("account").with("name", "Contoso")).unwrap();
        let contact = service.create(Record::new("contact").with("fullname", "Ada")).unwrap();
        let related = vec![EntityReference::new("contact", contact)];

        service
            .associate("account", account, "contact_customer_accounts", related.clone())
            .unwrap();
        let stored = service.retrieve("contact", contact, ColumnSet::All).unwrap();
        assert_eq!(
            stored.get("parentcustomerid").and_then(Value::as_guid),
            Some(account)
        );

        service
            .disassociate("account", account, "contact_customer_accounts", related.clone())
            .unwrap();
        let stored = service.retrieve("contact", contact, ColumnSet::All).unwrap();
        assert_eq!(stored.get("parentcustomerid"), Some(&Value::Null));

        let err = service
            .disassociate("account", account, "contact_customer_accounts", related)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn many_to_many_association_maintains_intersect_records() {
        let service = service();
        let account = service.create(Record::new("account").with("name", "Contoso")).unwrap();
        let lead = service.create(Record::new("lead").with("subject", "Expansion")).unwrap();
        let related = vec![EntityReference::new("lead", lead)];

        service
            .associate("account", account, "accountleads_association", related.clone())
            .unwrap();
        assert_eq!(service.backend().all_of_type("accountleads").len(), 1);

        let err = service
            .associate("account", account, "accountleads_association", related.clone())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Duplicate);

        // Same pair from the other side.
        service
            .disassociate(
                "lead",
                lead,
                "accountleads_association",
                vec![EntityReference::new("account", account)],
            )
            .unwrap();
        assert!(service.backend().all_of_type("accountleads").is_empty());
    }

    #[test]
    fn associate_requires_existing_records_and_known_relationships() {
        let service = service();
        let account = service.create(Record::new("account")).unwrap();
        let missing = vec![EntityReference::new("contact", Uuid::new_v4())];

        let err = service
            .associate("account", account, "contact_customer_accounts", missing)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = service
            .associate("account", account, "no_such_relationship", Vec::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("no_such_relationship"));
    }

    #[test]
    fn retrieve_includes_related_records() {
        let service = service();
        let account = service.create(Record::new("account").with("name", "Contoso")).unwrap();
        let other = service.create(Record::new("account").with("name", "Fabrikam")).unwrap();
        for (name, parent) in [("Ada", account), ("Grace", account), ("Linus", other)] {
            service
                .create(
                    Record::new("contact")
                        .with("fullname", name)
                        .with("parentcustomerid", EntityReference::new("account", parent)),
                )
                .unwrap();
        }
        let lead = service.create(Record::new("lead").with("subject", "Expansion")).unwrap();
        service
            .associate(
                "account",
                account,
                "accountleads_association",
                vec![EntityReference::new("lead", lead)],
            )
            .unwrap();

        let response = service
            .execute(Request::Retrieve(RetrieveRequest {
                target: EntityReference::new("account", account),
                columns: ColumnSet::columns(["name"]),
                related: vec![
                    RelatedQuery {
                        relationship: "contact_customer_accounts".to_string(),
                        query: QueryExpression::new("contact"),
                    },
                    RelatedQuery {
                        relationship: "accountleads_association".to_string(),
                        query: QueryExpression::new("lead"),
                    },
                ],
            }))
            .unwrap()
            .into_record()
            .unwrap();

        let contacts = &response.related_entities["contact_customer_accounts"];
        let mut names: Vec<_> = contacts
            .iter()
            .filter_map(|record| record.get("fullname").and_then(Value::as_str))
            .collect();
        names.sort_unstable();
        assert_eq!(names, ["Ada", "Grace"]);

        let leads = &response.related_entities["accountleads_association"];
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].id, lead);
    }

    #[test]
    fn who_am_i_reports_the_caller() {
        let service = service();
        let caller = service.caller().clone();

        let response = service.execute(Request::WhoAmI).unwrap();
        assert_eq!(
            response,
            Response::WhoAmI {
                user_id: caller.user_id,
                business_unit_id: caller.business_unit_id,
                organization_id: caller.organization_id,
            }
        );
    }
}
