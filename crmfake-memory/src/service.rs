//! The organization service.
//!
//! [`FakeOrganizationService`] is the synchronous call surface collaborators use:
//! CRUD, associate/disassociate, queries, and generic requests. Every call is
//! turned into a [`Request`] and dispatched through the [`OperationPipeline`], so
//! a registered handler can intercept any of them.
//!
//! Registration (handlers, relationships) needs `&mut self`. Configure the
//! service first, then share it behind an `Arc`.

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crmfake_core::{
    backend::RecordBackend,
    config::ServiceConfig,
    context::CallerContext,
    entity::{Entity, EntityExt},
    error::CrmResult,
    page::EntityCollection,
    query::{ColumnSet, QueryExpression},
    record::Record,
    relationship::{Relationship, Relationships},
    request::{AssociateRequest, Request, Response, RetrieveRequest},
    value::EntityReference,
};

use crate::{
    evaluator::EvaluationContext,
    pipeline::{OperationHandler, OperationPipeline},
    store::InMemoryStore,
};

/// In-memory stand-in for a CRM organization service.
///
/// # Example
///
/// ```rust
/// use crmfake_core::{query::{ColumnSet, Filter, QueryExpression}, record::Record};
/// use crmfake_memory::FakeOrganizationService;
///
/// # fn main() -> crmfake_core::error::CrmResult<()> {
/// let service = FakeOrganizationService::new();
/// let id = service.create(Record::new("contact").with("fullname", "Ada Lovelace"))?;
///
/// let query = QueryExpression::builder("contact")
///     .filter(Filter::eq("fullname", "Ada Lovelace"))
///     .build();
/// let found = service.retrieve_multiple(&query)?;
/// assert_eq!(found.records[0].id, id);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FakeOrganizationService {
    backend: Arc<dyn RecordBackend>,
    pipeline: OperationPipeline,
    relationships: Relationships,
    caller: CallerContext,
    config: ServiceConfig,
}

impl FakeOrganizationService {
    /// Creates a service over an empty in-memory store with the defaults.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a new builder.
    pub fn builder() -> FakeOrganizationServiceBuilder {
        FakeOrganizationServiceBuilder::new()
    }

    /// Executes a request through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns a not-implemented error when no handler accepts the request, and
    /// whatever the handler raises otherwise.
    pub fn execute(&self, request: impl Into<Request>) -> CrmResult<Response> {
        let request = request.into();
        let handler = self.pipeline.resolve(&request)?;
        debug!(kind = request.kind(), handler = handler.name(), "dispatching request");
        handler.execute(&request, self)
    }

    /// Creates a record and returns its identifier.
    ///
    /// An identifier is assigned when the record has none.
    pub fn create(&self, record: Record) -> CrmResult<Uuid> {
        self.execute(Request::Create(record))?.into_id()
    }

    /// Retrieves one record, projected to `columns`.
    pub fn retrieve(&self, entity: &str, id: Uuid, columns: ColumnSet) -> CrmResult<Record> {
        self.execute(Request::Retrieve(RetrieveRequest {
            target: EntityReference::new(entity, id),
            columns,
            related: Vec::new(),
        }))?
        .into_record()
    }

    /// Merges the supplied attributes into the stored record.
    ///
    /// Attributes absent from `record` are left untouched.
    pub fn update(&self, record: Record) -> CrmResult<()> {
        self.execute(Request::Update(record)).map(|_| ())
    }

    /// Deletes a record.
    pub fn delete(&self, entity: &str, id: Uuid) -> CrmResult<()> {
        self.execute(Request::Delete(EntityReference::new(entity, id)))
            .map(|_| ())
    }

    /// Creates the record when absent and merges into it otherwise.
    ///
    /// Returns the identifier and whether the record was created.
    pub fn upsert(&self, record: Record) -> CrmResult<(Uuid, bool)> {
        match self.execute(Request::Upsert(record))? {
            Response::Upsert { id, created } => Ok((id, created)),
            other => other.into_id().map(|id| (id, true)),
        }
    }

    /// Links `related` to the target record through a relationship.
    pub fn associate(
        &self,
        entity: &str,
        id: Uuid,
        relationship: &str,
        related: Vec<EntityReference>,
    ) -> CrmResult<()> {
        self.execute(Request::Associate(AssociateRequest {
            target: EntityReference::new(entity, id),
            relationship: relationship.to_string(),
            related_entities: related,
        }))
        .map(|_| ())
    }

    /// Unlinks `related` from the target record.
    pub fn disassociate(
        &self,
        entity: &str,
        id: Uuid,
        relationship: &str,
        related: Vec<EntityReference>,
    ) -> CrmResult<()> {
        self.execute(Request::Disassociate(AssociateRequest {
            target: EntityReference::new(entity, id),
            relationship: relationship.to_string(),
            related_entities: related,
        }))
        .map(|_| ())
    }

    /// Runs a query. The query itself is not modified.
    pub fn retrieve_multiple(&self, query: &QueryExpression) -> CrmResult<EntityCollection> {
        self.execute(Request::RetrieveMultiple(query.clone()))?
            .into_collection()
    }

    /// Returns the identity the service acts for, as reported by its handlers.
    pub fn who_am_i(&self) -> CrmResult<CallerContext> {
        match self.execute(Request::WhoAmI)? {
            Response::WhoAmI {
                user_id,
                business_unit_id,
                organization_id,
            } => Ok(CallerContext::new(user_id, business_unit_id, organization_id)),
            _ => Ok(self.caller.clone()),
        }
    }

    /// Creates a typed entity and returns its identifier.
    pub fn create_entity<E: Entity>(&self, entity: &E) -> CrmResult<Uuid> {
        self.create(entity.to_record()?)
    }

    /// Retrieves a typed entity with all its columns.
    pub fn retrieve_entity<E: Entity>(&self, id: Uuid) -> CrmResult<E> {
        E::from_record(&self.retrieve(E::logical_name(), id, ColumnSet::All)?)
    }

    /// Registers a handler for an exact operation kind.
    pub fn register_handler(
        &mut self,
        kind: impl Into<String>,
        handler: impl OperationHandler + 'static,
    ) {
        self.pipeline.register(kind, handler);
    }

    /// Registers a catch-all handler.
    pub fn register_catch_all(&mut self, handler: impl OperationHandler + 'static) {
        self.pipeline.register_catch_all(handler);
    }

    /// Declares a relationship used by links, related retrieval and association.
    pub fn add_relationship(&mut self, relationship: Relationship) {
        debug!(relationship = %relationship.schema_name, "declared relationship");
        self.relationships.add(relationship);
    }

    /// Replaces the caller identity.
    pub fn set_caller(&mut self, caller: CallerContext) {
        self.caller = caller;
    }

    /// The record store.
    pub fn backend(&self) -> &dyn RecordBackend {
        self.backend.as_ref()
    }

    /// The declared relationships.
    pub fn relationships(&self) -> &Relationships {
        &self.relationships
    }

    /// The caller identity.
    pub fn caller(&self) -> &CallerContext {
        &self.caller
    }

    /// The service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The operation pipeline.
    pub fn pipeline(&self) -> &OperationPipeline {
        &self.pipeline
    }

    /// Context for evaluating filters, with relative dates anchored at the current time.
    pub fn evaluation_context(&self) -> EvaluationContext<'_> {
        EvaluationContext {
            now: Utc::now(),
            caller: &self.caller,
            relationships: &self.relationships,
            validate_attributes: self.config.validate_attributes,
        }
    }
}

impl Default for FakeOrganizationService {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`FakeOrganizationService`].
#[derive(Debug)]
pub struct FakeOrganizationServiceBuilder {
    backend: Option<Arc<dyn RecordBackend>>,
    pipeline: OperationPipeline,
    relationships: Relationships,
    caller: Option<CallerContext>,
    config: ServiceConfig,
}

impl FakeOrganizationServiceBuilder {
    /// Creates a builder with the built-in handlers and default configuration.
    pub fn new() -> Self {
        Self {
            backend: None,
            pipeline: OperationPipeline::with_default_handlers(),
            relationships: Relationships::new(),
            caller: None,
            config: ServiceConfig::default(),
        }
    }

    /// Uses `backend` as the record store instead of a fresh [`InMemoryStore`].
    pub fn with_backend(mut self, backend: impl RecordBackend + 'static) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the caller identity. A random identity is used otherwise.
    pub fn with_caller(mut self, caller: CallerContext) -> Self {
        self.caller = Some(caller);
        self
    }

    /// Declares a relationship.
    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.add(relationship);
        self
    }

    /// Registers a handler for an exact operation kind.
    pub fn with_handler(
        mut self,
        kind: impl Into<String>,
        handler: impl OperationHandler + 'static,
    ) -> Self {
        self.pipeline.register(kind, handler);
        self
    }

    /// Registers a catch-all handler.
    pub fn with_catch_all(mut self, handler: impl OperationHandler + 'static) -> Self {
        self.pipeline.register_catch_all(handler);
        self
    }

    /// Builds the service.
    pub fn build(self) -> FakeOrganizationService {
        FakeOrganizationService {
            backend: self
                .backend
                .unwrap_or_else(|| Arc::new(InMemoryStore::new())),
            pipeline: self.pipeline,
            relationships: self.relationships,
            caller: self.caller.unwrap_or_default(),
            config: self.config,
        }
    }
}

impl Default for FakeOrganizationServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmfake_core::{
        error::{CrmError, ErrorKind},
        request::{OrganizationRequest, OrganizationResponse},
        value::Value,
    };

    #[derive(Debug)]
    struct RejectContacts;

    impl OperationHandler for RejectContacts {
        fn name(&self) -> &str {
            "reject-contacts"
        }

        fn can_handle(&self, request: &Request) -> bool {
            matches!(request, Request::Create(record) if record.logical_name == "contact")
        }

        fn execute(&self, _: &Request, _: &FakeOrganizationService) -> CrmResult<Response> {
            Err(CrmError::InvalidArgument("contacts are read-only".to_string()))
        }
    }

    struct Echo;

    impl OperationHandler for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn can_handle(&self, request: &Request) -> bool {
            matches!(request, Request::Custom(_))
        }

        fn execute(&self, request: &Request, _: &FakeOrganizationService) -> CrmResult<Response> {
            let Request::Custom(custom) = request else {
                return Err(CrmError::Configuration("not a custom request".to_string()));
            };

            Ok(Response::Custom(OrganizationResponse {
                response_name: custom.request_name.clone(),
                results: custom.parameters.clone(),
            }))
        }
    }

    #[test]
    fn crud_round_trip() {
        let service = FakeOrganizationService::new();
        let id = service
            .create(Record::new("contact").with("firstname", "Ada").with("lastname", "Byron"))
            .unwrap();

        service
            .update(Record::with_id("contact", id).with("lastname", "Lovelace"))
            .unwrap();
        let stored = service.retrieve("contact", id, ColumnSet::All).unwrap();
        assert_eq!(stored.get("firstname").and_then(Value::as_str), Some("Ada"));
        assert_eq!(stored.get("lastname").and_then(Value::as_str), Some("Lovelace"));

        let projected = service
            .retrieve("contact", id, ColumnSet::columns(["firstname"]))
            .unwrap();
        assert_eq!(projected.attributes.len(), 1);

        service.delete("contact", id).unwrap();
        assert_eq!(service.delete("contact", id).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            service.retrieve("contact", id, ColumnSet::All).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn update_of_a_missing_record_is_not_found() {
        let service = FakeOrganizationService::new();
        let err = service
            .update(Record::with_id("contact", Uuid::new_v4()).with("firstname", "Ada"))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn registered_handlers_shadow_built_ins() {
        let service = FakeOrganizationService::builder()
            .with_handler(crmfake_core::request::kinds::CREATE, RejectContacts)
            .build();

        let err = service.create(Record::new("contact")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        // Declined requests fall through to the built-in handler.
        assert!(service.create(Record::new("account")).is_ok());
    }

    #[test]
    fn custom_requests_reach_catch_all_handlers() {
        let mut service = FakeOrganizationService::new();
        let request = OrganizationRequest::new("Echo").with("answer", 42);

        let err = service.execute(request.clone()).unwrap_err();
        assert_eq!(
            err,
            CrmError::NotImplemented {
                request: "Echo".to_string()
            }
        );

        service.register_catch_all(Echo);
        let Response::Custom(response) = service.execute(request).unwrap() else {
            panic!("expected a custom response");
        };
        assert_eq!(response.response_name, "Echo");
        assert_eq!(response.results.get("answer"), Some(&Value::Integer(42)));
    }

    #[test]
    fn who_am_i_uses_the_configured_caller() {
        let caller = CallerContext::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let service = FakeOrganizationService::builder()
            .with_caller(caller.clone())
            .build();

        assert_eq!(service.who_am_i().unwrap(), caller);
    }
}
