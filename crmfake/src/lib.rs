//! Main crmfake crate providing an in-memory CRM organization service.
//!
//! This crate is the primary entry point. It re-exports the data model from
//! `crmfake-core` and the engine from `crmfake-memory`, so tests of CRM-facing
//! code can create, query and relate records without a live backend.
//!
//! # Features
//!
//! - **Typed values and records** - references, money, choices and aliased values
//! - **Query expressions** - nested AND/OR filters, links, sorting, distinct and paging
//! - **Operation pipeline** - every call is a request that registered handlers can intercept
//! - **Early-bound entities** - map serde structs to records and back
//!
//! # Quick Start
//!
//! ```rust
//! use crmfake::prelude::*;
//!
//! # fn main() -> CrmResult<()> {
//! let service = FakeOrganizationService::new();
//!
//! for name in ["Contact 1", "Contact 2"] {
//!     service.create(Record::new("contact").with("name", name))?;
//! }
//!
//! let query = QueryExpression::builder("contact")
//!     .filter(Filter::eq("name", "Contact 1"))
//!     .build();
//! let found = service.retrieve_multiple(&query)?;
//!
//! assert_eq!(found.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Early-bound entities
//!
//! ```rust
//! use crmfake::prelude::*;
//! use crmfake::uuid::Uuid;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Account {
//!     #[serde(skip)]
//!     id: Uuid,
//!     name: String,
//! }
//!
//! impl Entity for Account {
//!     fn logical_name() -> &'static str { "account" }
//!     fn id(&self) -> Uuid { self.id }
//!     fn set_id(&mut self, id: Uuid) { self.id = id; }
//! }
//!
//! # fn main() -> CrmResult<()> {
//! let service = FakeOrganizationService::new();
//! let id = service.create_entity(&Account { id: Uuid::nil(), name: "Contoso".into() })?;
//!
//! let account: Account = service.retrieve_entity(id)?;
//! assert_eq!(account.name, "Contoso");
//! # Ok(())
//! # }
//! ```
//!
//! # Sharing across threads
//!
//! Register handlers and relationships first, then wrap the service in an `Arc`.
//! Operations on one record type are serialized by that type's lock; different
//! types proceed in parallel.

pub mod prelude;

pub use crmfake_core::{
    backend, config, context, entity, error, page, query, record, relationship, request, value,
};

// Re-export uuid so callers can name record identifiers without another dependency
pub use uuid;

/// The in-memory engine.
pub mod memory {
    pub use crmfake_memory::{
        evaluator, handlers, hierarchy, join, pipeline, service, snapshot, store, translator,
        EvaluationContext, FakeOrganizationService, FakeOrganizationServiceBuilder,
        HandlerPriority, InMemoryStore, InMemoryStoreBuilder, JoinResolver, OperationHandler,
        OperationPipeline, QueryTranslator, RecordEvaluator,
    };
}
