//! In-memory CRM engine for crmfake.
//!
//! This crate provides the record store, the query engine and the organization
//! service built on top of them. Everything runs synchronously on the caller's
//! thread; nothing touches the network or the disk.
//!
//! # Components
//!
//! - [`InMemoryStore`] - per-type partitioned record store implementing
//!   [`RecordBackend`](crmfake_core::backend::RecordBackend)
//! - [`RecordEvaluator`] - filter evaluation, including hierarchy operators
//! - [`JoinResolver`] - inner and outer links, nested links, relationship links
//! - [`QueryTranslator`] - filter, join, projection, distinct, sort and paging
//! - [`OperationPipeline`] - request dispatch to registered handlers
//! - [`FakeOrganizationService`] - the call surface
//!
//! # Quick Start
//!
//! ```rust
//! use crmfake_core::{
//!     query::{Filter, JoinOperator, LinkEntity, QueryExpression},
//!     record::Record,
//!     value::EntityReference,
//! };
//! use crmfake_memory::FakeOrganizationService;
//!
//! # fn main() -> crmfake_core::error::CrmResult<()> {
//! let service = FakeOrganizationService::new();
//! let account = service.create(Record::new("account").with("name", "Contoso"))?;
//! service.create(
//!     Record::new("contact")
//!         .with("fullname", "Ada Lovelace")
//!         .with("parentcustomerid", EntityReference::new("account", account)),
//! )?;
//!
//! let query = QueryExpression::builder("contact")
//!     .link(
//!         LinkEntity::new("account", "parentcustomerid", "accountid", JoinOperator::Inner)
//!             .alias("acc")
//!             .columns(["name"])
//!             .filter(Filter::eq("name", "Contoso")),
//!     )
//!     .build();
//!
//! let contacts = service.retrieve_multiple(&query)?;
//! assert_eq!(contacts.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod evaluator;
pub mod handlers;
pub mod hierarchy;
pub mod join;
pub mod pipeline;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod translator;

pub use evaluator::{EvaluationContext, RecordEvaluator};
pub use join::JoinResolver;
pub use pipeline::{HandlerPriority, OperationHandler, OperationPipeline};
pub use service::{FakeOrganizationService, FakeOrganizationServiceBuilder};
pub use store::{InMemoryStore, InMemoryStoreBuilder};
pub use translator::QueryTranslator;
