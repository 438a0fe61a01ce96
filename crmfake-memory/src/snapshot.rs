//! Per-query snapshots of record types.
//!
//! A query reads every record type it touches at most once. The first read of a
//! type copies it out of the store; later reads within the same query reuse that
//! copy, so the primary records, every link and every hierarchy traversal of one
//! query see the same state of a given type.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
};

use crmfake_core::{backend::RecordBackend, record::{Record, primary_id_attribute}};

/// Lazily populated, query-local cache of record-type snapshots.
#[derive(Debug)]
pub struct SnapshotCache<'a> {
    backend: &'a dyn RecordBackend,
    records: RefCell<HashMap<String, Rc<Vec<Record>>>>,
    attributes: RefCell<HashMap<String, Rc<HashSet<String>>>>,
}

impl<'a> SnapshotCache<'a> {
    /// Creates an empty cache reading from `backend`.
    pub fn new(backend: &'a dyn RecordBackend) -> Self {
        Self {
            backend,
            records: RefCell::new(HashMap::new()),
            attributes: RefCell::new(HashMap::new()),
        }
    }

    /// Every record of the type, in insertion order.
    pub fn of_type(&self, entity: &str) -> Rc<Vec<Record>> {
        if let Some(records) = self.records.borrow().get(entity) {
            return Rc::clone(records);
        }

        let records = Rc::new(self.backend.all_of_type(entity));
        self.records
            .borrow_mut()
            .insert(entity.to_string(), Rc::clone(&records));
        records
    }

    /// Returns `true` if `attribute` is known for the type.
    ///
    /// An attribute is known when it is the primary identifier attribute or some
    /// stored record of the type holds it. Every attribute is known for a type
    /// without records.
    pub fn knows(&self, entity: &str, attribute: &str) -> bool {
        if attribute == primary_id_attribute(entity) {
            return true;
        }

        let records = self.of_type(entity);
        if records.is_empty() {
            return true;
        }

        let cached = self.attributes.borrow().get(entity).map(Rc::clone);
        let known = match cached {
            Some(known) => known,
            None => {
                let known: Rc<HashSet<String>> = Rc::new(
                    records
                        .iter()
                        .flat_map(|record| record.attributes.keys().cloned())
                        .collect(),
                );
                self.attributes
                    .borrow_mut()
                    .insert(entity.to_string(), Rc::clone(&known));
                known
            }
        };

        known.contains(attribute)
    }
}
