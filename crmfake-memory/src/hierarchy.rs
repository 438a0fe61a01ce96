//! Breadth-first traversal of self-referencing hierarchies.
//!
//! A hierarchy is the set of records of one type linked to their parent through a
//! reference attribute. Traversal stops at the first revisited record, so a cycle in
//! the data truncates the closure instead of looping.

use std::collections::{HashMap, HashSet, VecDeque};
use tracing::warn;
use uuid::Uuid;

use crmfake_core::record::Record;

fn parent_of(record: &Record, parent_attribute: &str) -> Option<Uuid> {
    record
        .get(parent_attribute)
        .and_then(|value| value.unaliased().as_guid())
}

/// Identifiers of every record strictly below `root`.
pub fn descendants(records: &[Record], parent_attribute: &str, root: Uuid) -> HashSet<Uuid> {
    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for record in records {
        if let Some(parent) = parent_of(record, parent_attribute) {
            children.entry(parent).or_default().push(record.id);
        }
    }

    let mut visited = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);

    while let Some(current) = queue.pop_front() {
        for &child in children.get(&current).into_iter().flatten() {
            if !visited.insert(child) {
                warn!(%root, %child, parent_attribute, "cycle detected while collecting descendants");
                continue;
            }
            queue.push_back(child);
        }
    }

    visited.remove(&root);
    visited
}

/// Identifiers of every record strictly above `start`.
pub fn ancestors(records: &[Record], parent_attribute: &str, start: Uuid) -> HashSet<Uuid> {
    let parents: HashMap<Uuid, Uuid> = records
        .iter()
        .filter_map(|record| parent_of(record, parent_attribute).map(|parent| (record.id, parent)))
        .collect();

    let mut visited = HashSet::from([start]);
    let mut current = start;

    while let Some(&parent) = parents.get(&current) {
        if !visited.insert(parent) {
            warn!(%start, %parent, parent_attribute, "cycle detected while collecting ancestors");
            break;
        }
        current = parent;
    }

    visited.remove(&start);
    visited
}
