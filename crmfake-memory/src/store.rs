//! In-memory record store.
//!
//! Records are grouped into one partition per record type. Each partition sits
//! behind its own read-write lock, so operations on different types never contend,
//! and operations on the same type are linearized by that type's lock.

use dashmap::DashMap;
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use tracing::debug;
use uuid::Uuid;

use crmfake_core::{
    backend::RecordBackend,
    error::{CrmError, CrmResult},
    record::Record,
};

/// Records of one type, with the order they were first stored in.
#[derive(Debug, Default)]
struct Partition {
    records: HashMap<Uuid, (u64, Record)>,
    next_sequence: u64,
}

impl Partition {
    fn insert_new(&mut self, record: Record) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.records.insert(record.id, (sequence, record));
    }
}

type SharedPartition = Arc<RwLock<Partition>>;

/// Thread-safe in-memory record store.
///
/// This struct implements [`RecordBackend`] over a table of per-type partitions.
/// Reads hand out copies, and [`all_of_type`](RecordBackend::all_of_type) returns a
/// point-in-time snapshot in insertion order.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state. Multiple
/// clones of the same instance share the same underlying data.
///
/// # Performance
///
/// Queries scan every record of a type (no indexing). This is intended for test
/// fixtures and development workloads.
///
/// # Example
///
/// ```ignore
/// use crmfake_memory::InMemoryStore;
/// use crmfake_core::{backend::RecordBackend, record::Record};
/// use uuid::Uuid;
///
/// let store = InMemoryStore::new();
/// let id = Uuid::new_v4();
/// store.insert(Record::with_id("contact", id).with("lastname", "King"))?;
///
/// assert!(store.contains("contact", id));
/// assert_eq!(store.all_of_type("contact").len(), 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// The partition table: record type -> partition
    partitions: Arc<DashMap<String, SharedPartition>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for seeding a store with records.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    fn partition(&self, entity: &str) -> Option<SharedPartition> {
        self.partitions
            .get(entity)
            .map(|partition| Arc::clone(partition.value()))
    }

    fn partition_or_create(&self, entity: &str) -> SharedPartition {
        if let Some(partition) = self.partition(entity) {
            return partition;
        }

        Arc::clone(
            self.partitions
                .entry(entity.to_string())
                .or_default()
                .value(),
        )
    }

    /// Number of records stored for a type.
    pub fn count(&self, entity: &str) -> usize {
        self.partition(entity)
            .map_or(0, |partition| read(&partition).records.len())
    }
}

// Records are plain data, so a panic while a lock was held cannot leave a
// partition half-updated in a way later readers would misinterpret.
fn read(partition: &RwLock<Partition>) -> RwLockReadGuard<'_, Partition> {
    partition.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(partition: &RwLock<Partition>) -> RwLockWriteGuard<'_, Partition> {
    partition.write().unwrap_or_else(PoisonError::into_inner)
}

fn not_found(entity: &str, id: Uuid) -> CrmError {
    CrmError::NotFound {
        entity: entity.to_string(),
        id,
    }
}

impl RecordBackend for InMemoryStore {
    fn get(&self, entity: &str, id: Uuid) -> CrmResult<Record> {
        let partition = self
            .partition(entity)
            .ok_or_else(|| CrmError::EntityNotFound(entity.to_string()))?;
        let guard = read(&partition);

        guard
            .records
            .get(&id)
            .map(|(_, record)| record.clone())
            .ok_or_else(|| not_found(entity, id))
    }

    fn insert(&self, record: Record) -> CrmResult<()> {
        let partition = self.partition_or_create(&record.logical_name);
        let mut guard = write(&partition);

        if guard.records.contains_key(&record.id) {
            return Err(CrmError::DuplicateRecord {
                entity: record.logical_name,
                id: record.id,
            });
        }

        debug!(entity = %record.logical_name, id = %record.id, "inserted record");
        guard.insert_new(record);

        Ok(())
    }

    fn insert_unless(
        &self,
        record: Record,
        conflicts: &dyn Fn(&Record) -> bool,
    ) -> CrmResult<()> {
        let partition = self.partition_or_create(&record.logical_name);
        let mut guard = write(&partition);

        let existing = guard
            .records
            .values()
            .find(|(_, stored)| stored.id == record.id || conflicts(stored))
            .map(|(_, stored)| stored.id);
        if let Some(id) = existing {
            return Err(CrmError::DuplicateRecord {
                entity: record.logical_name,
                id,
            });
        }

        debug!(entity = %record.logical_name, id = %record.id, "inserted record");
        guard.insert_new(record);

        Ok(())
    }

    fn put(&self, record: Record) -> CrmResult<()> {
        let partition = self.partition_or_create(&record.logical_name);
        let mut guard = write(&partition);

        match guard.records.get_mut(&record.id) {
            Some((_, stored)) => {
                debug!(entity = %record.logical_name, id = %record.id, "merged record");
                stored.merge(record);
            }
            None => {
                debug!(entity = %record.logical_name, id = %record.id, "inserted record");
                guard.insert_new(record);
            }
        }

        Ok(())
    }

    fn merge(&self, record: Record) -> CrmResult<()> {
        let partition = self
            .partition(&record.logical_name)
            .ok_or_else(|| not_found(&record.logical_name, record.id))?;
        let mut guard = write(&partition);

        let Some((_, stored)) = guard.records.get_mut(&record.id) else {
            return Err(not_found(&record.logical_name, record.id));
        };

        debug!(
            entity = %record.logical_name,
            id = %record.id,
            attributes = record.attributes.len(),
            "merged record"
        );
        stored.merge(record);

        Ok(())
    }

    fn delete(&self, entity: &str, id: Uuid) -> CrmResult<()> {
        let partition = self
            .partition(entity)
            .ok_or_else(|| not_found(entity, id))?;

        if write(&partition).records.remove(&id).is_none() {
            return Err(not_found(entity, id));
        }

        debug!(entity, %id, "deleted record");
        Ok(())
    }

    fn contains(&self, entity: &str, id: Uuid) -> bool {
        self.partition(entity)
            .is_some_and(|partition| read(&partition).records.contains_key(&id))
    }

    fn exists_type(&self, entity: &str) -> bool {
        self.partitions.contains_key(entity)
    }

    fn all_of_type(&self, entity: &str) -> Vec<Record> {
        let Some(partition) = self.partition(entity) else {
            return Vec::new();
        };

        let mut entries: Vec<(u64, Record)> = read(&partition)
            .records
            .values()
            .map(|(sequence, record)| (*sequence, record.clone()))
            .collect();
        entries.sort_unstable_by_key(|(sequence, _)| *sequence);

        entries.into_iter().map(|(_, record)| record).collect()
    }

    fn list_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .partitions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        types.sort();
        types
    }
}

/// Builder for constructing [`InMemoryStore`] instances pre-seeded with records.
///
/// # Example
///
/// ```ignore
/// use crmfake_memory::InMemoryStore;
/// use crmfake_core::record::Record;
/// use uuid::Uuid;
///
/// let store = InMemoryStore::builder()
///     .with_record(Record::with_id("account", Uuid::new_v4()).with("name", "Contoso"))
///     .build()?;
/// ```
#[derive(Default, Debug)]
pub struct InMemoryStoreBuilder {
    records: Vec<Record>,
}

impl InMemoryStoreBuilder {
    /// Adds a record to seed the store with.
    pub fn with_record(mut self, record: Record) -> Self {
        self.records.push(record);
        self
    }

    /// Adds several records to seed the store with.
    pub fn with_records(mut self, records: impl IntoIterator<Item = Record>) -> Self {
        self.records.extend(records);
        self
    }

    /// Builds and returns the seeded store.
    ///
    /// Records without an identifier are given a fresh one.
    ///
    /// # Errors
    ///
    /// Returns a duplicate-record error if two seed records share an identifier
    /// within a type.
    pub fn build(self) -> CrmResult<InMemoryStore> {
        let store = InMemoryStore::new();

        for mut record in self.records {
            if record.id.is_nil() {
                record.id = Uuid::new_v4();
            }
            store.insert(record)?;
        }

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmfake_core::{error::ErrorKind, value::Value};
    use std::thread;

    fn contact(name: &str) -> Record {
        Record::with_id("contact", Uuid::new_v4()).with("fullname", name)
    }

    #[test]
    fn get_returns_a_copy_of_the_stored_record() {
        let store = InMemoryStore::new();
        let record = contact("Ada");
        store.insert(record.clone()).unwrap();

        let mut fetched = store.get("contact", record.id).unwrap();
        fetched.set("fullname", "changed");

        assert_eq!(
            store.get("contact", record.id).unwrap().get("fullname"),
            Some(&Value::from("Ada"))
        );
    }

    #[test]
    fn insert_rejects_duplicate_identifiers() {
        let store = InMemoryStore::new();
        let record = contact("Ada");
        store.insert(record.clone()).unwrap();

        let err = store.insert(record).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Duplicate);
    }

    #[test]
    fn put_merges_into_existing_records() {
        let store = InMemoryStore::new();
        let record = contact("Ada").with("city", "London");
        store.insert(record.clone()).unwrap();

        store
            .put(Record::with_id("contact", record.id).with("city", "Paris"))
            .unwrap();

        let stored = store.get("contact", record.id).unwrap();
        assert_eq!(stored.get("fullname"), Some(&Value::from("Ada")));
        assert_eq!(stored.get("city"), Some(&Value::from("Paris")));
    }

    #[test]
    fn merge_and_delete_require_an_existing_record() {
        let store = InMemoryStore::new();
        let record = contact("Ada");

        assert_eq!(store.merge(record.clone()).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            store.delete("contact", record.id).unwrap_err().kind(),
            ErrorKind::NotFound
        );

        store.insert(record.clone()).unwrap();
        store.delete("contact", record.id).unwrap();
        assert_eq!(
            store.delete("contact", record.id).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(store.exists_type("contact"));
    }

    #[test]
    fn all_of_type_preserves_insertion_order() {
        let store = InMemoryStore::new();
        let names = ["c", "a", "d", "b"];
        for name in names {
            store.insert(contact(name)).unwrap();
        }

        let snapshot: Vec<_> = store
            .all_of_type("contact")
            .into_iter()
            .filter_map(|record| record.get("fullname").and_then(Value::as_str).map(String::from))
            .collect();

        assert_eq!(snapshot, names);
    }

    #[test]
    fn snapshots_are_isolated_from_later_mutations() {
        let store = InMemoryStore::new();
        let record = contact("Ada");
        store.insert(record.clone()).unwrap();

        let snapshot = store.all_of_type("contact");
        store.delete("contact", record.id).unwrap();
        store.insert(contact("Grace")).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, record.id);
    }

    #[test]
    fn builder_assigns_missing_identifiers() {
        let store = InMemoryStore::builder()
            .with_record(Record::new("account").with("name", "Contoso"))
            .with_records([contact("Ada"), contact("Grace")])
            .build()
            .unwrap();

        assert_eq!(store.list_types(), vec!["account", "contact"]);
        assert!(!store.all_of_type("account")[0].id.is_nil());
        assert_eq!(store.count("contact"), 2);
    }

    #[test]
    fn insert_unless_admits_only_one_of_racing_equivalent_records() {
        let store = InMemoryStore::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    let same_name = |stored: &Record| {
                        stored.get("fullname").and_then(Value::as_str) == Some("Ada")
                    };
                    store.insert_unless(contact("Ada"), &same_name)
                })
            })
            .collect();

        let outcomes: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
        let stored = store.all_of_type("contact");
        assert_eq!(stored.len(), 1);
        for outcome in outcomes.into_iter().filter_map(Result::err) {
            assert!(
                matches!(outcome, CrmError::DuplicateRecord { id, .. } if id == stored[0].id)
            );
        }
    }

    #[test]
    fn concurrent_writers_on_different_types_do_not_interfere() {
        let store = InMemoryStore::new();

        let handles: Vec<_> = ["contact", "account", "lead", "incident"]
            .into_iter()
            .map(|entity| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        store.insert(Record::with_id(entity, Uuid::new_v4())).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        for entity in ["contact", "account", "lead", "incident"] {
            assert_eq!(store.all_of_type(entity).len(), 200);
        }
    }
}
