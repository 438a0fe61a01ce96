//! Core data model of an in-memory CRM organization service.
//!
//! This crate holds everything the engine and its callers share:
//!
//! - **Values and records** ([`value`], [`record`]) - Typed attribute values and stored records
//! - **Query description** ([`query`]) - Filters, links, ordering, paging and column sets
//! - **Result pages** ([`page`]) - Entity collections and paging cookies
//! - **Requests** ([`request`]) - Operation requests and responses dispatched by the pipeline
//! - **Store abstraction** ([`backend`]) - The record store contract
//! - **Relationships** ([`relationship`]) - One-to-many and many-to-many descriptors
//! - **Early-bound entities** ([`entity`]) - Typed structs mapped to records
//! - **Caller identity** ([`context`]) - The user, business unit and organization of the caller
//! - **Configuration** ([`config`]) - Page sizes and behavior switches
//! - **Error handling** ([`error`]) - The error type, fault codes and result alias
//!
//! # Example
//!
//! ```ignore
//! use crmfake_core::{query::{Filter, QueryExpression}, record::Record};
//!
//! let contact = Record::new("contact").with("lastname", "King");
//! let query = QueryExpression::builder("contact")
//!     .filter(Filter::eq("lastname", "King"))
//!     .build();
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod page;
pub mod query;
pub mod record;
pub mod relationship;
pub mod request;
pub mod value;
