//! Operation requests and responses.
//!
//! Every call into the organization service is a [`Request`]. Built-in operations
//! have typed variants; anything else travels as an [`OrganizationRequest`] carrying
//! a request name and named parameters. [`Request::kind`] is the tag the operation
//! pipeline dispatches on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::{
    error::{CrmError, CrmResult},
    page::EntityCollection,
    query::{ColumnSet, QueryExpression},
    record::Record,
    value::{EntityReference, Value},
};

/// Operation kind tags of the built-in requests.
pub mod kinds {
    /// Create a record.
    pub const CREATE: &str = "Create";
    /// Retrieve one record by identifier.
    pub const RETRIEVE: &str = "Retrieve";
    /// Merge attributes into a record.
    pub const UPDATE: &str = "Update";
    /// Delete a record.
    pub const DELETE: &str = "Delete";
    /// Link records through a relationship.
    pub const ASSOCIATE: &str = "Associate";
    /// Unlink records related through a relationship.
    pub const DISASSOCIATE: &str = "Disassociate";
    /// Run a query.
    pub const RETRIEVE_MULTIPLE: &str = "RetrieveMultiple";
    /// Create or update a record.
    pub const UPSERT: &str = "Upsert";
    /// Return the caller identity.
    pub const WHO_AM_I: &str = "WhoAmI";
}

/// Named parameters of a generic request or response.
pub type ParameterCollection = BTreeMap<String, Value>;

/// A generic, untyped operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OrganizationRequest {
    /// The operation kind tag.
    pub request_name: String,
    /// Named parameters.
    pub parameters: ParameterCollection,
}

impl OrganizationRequest {
    /// Creates a request with no parameters.
    pub fn new(request_name: impl Into<String>) -> Self {
        Self {
            request_name: request_name.into(),
            parameters: ParameterCollection::new(),
        }
    }

    /// Adds a named parameter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// Result of a generic operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct OrganizationResponse {
    /// The operation kind tag of the request this answers.
    pub response_name: String,
    /// Named results.
    pub results: ParameterCollection,
}

/// A related-record query attached to a retrieve.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RelatedQuery {
    /// Relationship to follow from the retrieved record.
    pub relationship: String,
    /// Query over the related record type.
    pub query: QueryExpression,
}

/// Retrieve one record by identifier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RetrieveRequest {
    /// The record to retrieve.
    pub target: EntityReference,
    /// Columns to return.
    pub columns: ColumnSet,
    /// Related records to retrieve alongside.
    pub related: Vec<RelatedQuery>,
}

/// Link or unlink records through a relationship.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AssociateRequest {
    /// The record on one side.
    pub target: EntityReference,
    /// The relationship.
    pub relationship: String,
    /// The records on the other side.
    pub related_entities: Vec<EntityReference>,
}

/// An operation submitted to the organization service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Request {
    /// Create a record, assigning an identifier if absent.
    Create(Record),
    /// Retrieve one record.
    Retrieve(RetrieveRequest),
    /// Merge the supplied attributes into a stored record.
    Update(Record),
    /// Delete a record.
    Delete(EntityReference),
    /// Link records through a relationship.
    Associate(AssociateRequest),
    /// Unlink records related through a relationship.
    Disassociate(AssociateRequest),
    /// Run a query.
    RetrieveMultiple(QueryExpression),
    /// Create the record if absent, otherwise merge into it.
    Upsert(Record),
    /// Return the caller identity.
    WhoAmI,
    /// Any other operation.
    Custom(OrganizationRequest),
}

impl Request {
    /// The operation kind tag used for dispatch.
    pub fn kind(&self) -> &str {
        match self {
            Request::Create(_) => kinds::CREATE,
            Request::Retrieve(_) => kinds::RETRIEVE,
            Request::Update(_) => kinds::UPDATE,
            Request::Delete(_) => kinds::DELETE,
            Request::Associate(_) => kinds::ASSOCIATE,
            Request::Disassociate(_) => kinds::DISASSOCIATE,
            Request::RetrieveMultiple(_) => kinds::RETRIEVE_MULTIPLE,
            Request::Upsert(_) => kinds::UPSERT,
            Request::WhoAmI => kinds::WHO_AM_I,
            Request::Custom(request) => &request.request_name,
        }
    }
}

impl From<OrganizationRequest> for Request {
    fn from(request: OrganizationRequest) -> Self {
        Request::Custom(request)
    }
}

/// The result of an operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Response {
    /// Identifier of the created record.
    Create(Uuid),
    /// The retrieved record.
    Retrieve(Record),
    /// The update succeeded.
    Update,
    /// The delete succeeded.
    Delete,
    /// The association succeeded.
    Associate,
    /// The disassociation succeeded.
    Disassociate,
    /// The query results.
    RetrieveMultiple(EntityCollection),
    /// Identifier of the upserted record and whether it was created.
    Upsert {
        /// Identifier of the record.
        id: Uuid,
        /// `true` when the record did not exist before.
        created: bool,
    },
    /// The caller identity.
    WhoAmI {
        /// The calling user.
        user_id: Uuid,
        /// The calling user's business unit.
        business_unit_id: Uuid,
        /// The organization.
        organization_id: Uuid,
    },
    /// Result of any other operation.
    Custom(OrganizationResponse),
}

impl Response {
    fn unexpected(&self, expected: &str) -> CrmError {
        CrmError::Configuration(format!(
            "handler returned {self:?} where a {expected} response was expected"
        ))
    }

    /// Extracts the created identifier.
    pub fn into_id(self) -> CrmResult<Uuid> {
        match self {
            Response::Create(id) | Response::Upsert { id, .. } => Ok(id),
            other => Err(other.unexpected(kinds::CREATE)),
        }
    }

    /// Extracts the retrieved record.
    pub fn into_record(self) -> CrmResult<Record> {
        match self {
            Response::Retrieve(record) => Ok(record),
            other => Err(other.unexpected(kinds::RETRIEVE)),
        }
    }

    /// Extracts the query results.
    pub fn into_collection(self) -> CrmResult<EntityCollection> {
        match self {
            Response::RetrieveMultiple(collection) => Ok(collection),
            other => Err(other.unexpected(kinds::RETRIEVE_MULTIPLE)),
        }
    }
}
