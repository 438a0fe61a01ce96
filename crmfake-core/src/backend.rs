//! Record store abstraction.
//!
//! The [`RecordBackend`] trait is the contract of the record store: records grouped
//! by type, keyed by identifier, with get/insert/put/merge/delete/enumerate. The
//! query engine and the built-in operation handlers only talk to the store through
//! this trait.
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync` and safe to call from many threads at once.
//! Operations against the same record type are expected to be linearized; operations
//! against different types should not contend.
//!
//! # Snapshots
//!
//! [`all_of_type`](RecordBackend::all_of_type) returns a point-in-time copy. Mutations
//! made while a caller iterates that copy never corrupt it and are not visible in it.

use std::{fmt::Debug, sync::Arc};
use uuid::Uuid;

use crate::{error::CrmResult, record::Record};

/// Abstract interface for record stores.
pub trait RecordBackend: Send + Sync + Debug {
    /// Returns a copy of the record `id` of type `entity`.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the type or the identifier is absent.
    fn get(&self, entity: &str, id: Uuid) -> CrmResult<Record>;

    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// Returns a duplicate-record error if the identifier already exists in the type.
    fn insert(&self, record: Record) -> CrmResult<()>;

    /// Inserts a new record unless a stored record of the same type satisfies
    /// `conflicts`. The check and the insert happen atomically.
    ///
    /// # Errors
    ///
    /// Returns a duplicate-record error naming the first conflicting record, or the
    /// new identifier when it already exists.
    fn insert_unless(
        &self,
        record: Record,
        conflicts: &dyn Fn(&Record) -> bool,
    ) -> CrmResult<()>;

    /// Inserts the record, or merges its attributes into the stored one.
    fn put(&self, record: Record) -> CrmResult<()>;

    /// Merges the record's attributes into the stored record with the same identifier.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the identifier is absent.
    fn merge(&self, record: Record) -> CrmResult<()>;

    /// Removes a record.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the identifier is absent.
    fn delete(&self, entity: &str, id: Uuid) -> CrmResult<()>;

    /// Returns `true` if the record exists.
    fn contains(&self, entity: &str, id: Uuid) -> bool;

    /// Returns `true` if at least one record of the type has ever been stored.
    fn exists_type(&self, entity: &str) -> bool;

    /// Returns a point-in-time copy of every record of the type, in insertion order.
    fn all_of_type(&self, entity: &str) -> Vec<Record>;

    /// Lists the names of the known record types.
    fn list_types(&self) -> Vec<String>;
}

impl<B> RecordBackend for &B
where
    B: RecordBackend + ?Sized,
{
    fn get(&self, entity: &str, id: Uuid) -> CrmResult<Record> {
        (**self).get(entity, id)
    }

    fn insert(&self, record: Record) -> CrmResult<()> {
        (**self).insert(record)
    }

    fn insert_unless(
        &self,
        record: Record,
        conflicts: &dyn Fn(&Record) -> bool,
    ) -> CrmResult<()> {
        (**self).insert_unless(record, conflicts)
    }

    fn put(&self, record: Record) -> CrmResult<()> {
        (**self).put(record)
    }

    fn merge(&self, record: Record) -> CrmResult<()> {
        (**self).merge(record)
    }

    fn delete(&self, entity: &str, id: Uuid) -> CrmResult<()> {
        (**self).delete(entity, id)
    }

    fn contains(&self, entity: &str, id: Uuid) -> bool {
        (**self).contains(entity, id)
    }

    fn exists_type(&self, entity: &str) -> bool {
        (**self).exists_type(entity)
    }

    fn all_of_type(&self, entity: &str) -> Vec<Record> {
        (**self).all_of_type(entity)
    }

    fn list_types(&self) -> Vec<String> {
        (**self).list_types()
    }
}

impl<B> RecordBackend for Arc<B>
where
    B: RecordBackend + ?Sized,
{
    fn get(&self, entity: &str, id: Uuid) -> CrmResult<Record> {
        (**self).get(entity, id)
    }

    fn insert(&self, record: Record) -> CrmResult<()> {
        (**self).insert(record)
    }

    fn insert_unless(
        &self,
        record: Record,
        conflicts: &dyn Fn(&Record) -> bool,
    ) -> CrmResult<()> {
        (**self).insert_unless(record, conflicts)
    }

    fn put(&self, record: Record) -> CrmResult<()> {
        (**self).put(record)
    }

    fn merge(&self, record: Record) -> CrmResult<()> {
        (**self).merge(record)
    }

    fn delete(&self, entity: &str, id: Uuid) -> CrmResult<()> {
        (**self).delete(entity, id)
    }

    fn contains(&self, entity: &str, id: Uuid) -> bool {
        (**self).contains(entity, id)
    }

    fn exists_type(&self, entity: &str) -> bool {
        (**self).exists_type(entity)
    }

    fn all_of_type(&self, entity: &str) -> Vec<Record> {
        (**self).all_of_type(entity)
    }

    fn list_types(&self) -> Vec<String> {
        (**self).list_types()
    }
}
