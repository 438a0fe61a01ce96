//! Convenient re-exports of commonly used types from crmfake.
//!
//! ```rust
//! use crmfake::prelude::*;
//! ```

pub use crmfake_core::{
    backend::RecordBackend,
    config::{ServiceConfig, ServiceConfigBuilder},
    context::CallerContext,
    entity::{Entity, EntityExt},
    error::{CrmError, CrmResult, ErrorKind, Fault},
    page::EntityCollection,
    query::{
        ColumnSet, ConditionExpression, ConditionOperator, Filter, FilterExpression, FilterNode,
        JoinOperator, LinkEntity, LogicalOperator, OrderExpression, PagingInfo, QueryBuilder,
        QueryExpression, QueryVisitor, SortDirection,
    },
    record::Record,
    relationship::{Relationship, RelationshipKind, Relationships},
    request::{OrganizationRequest, OrganizationResponse, Request, Response},
    value::{EntityReference, Money, OptionSetValue, Value},
};
pub use crmfake_memory::{
    FakeOrganizationService, FakeOrganizationServiceBuilder, HandlerPriority, InMemoryStore,
    OperationHandler, OperationPipeline,
};
