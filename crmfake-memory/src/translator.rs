//! Query execution.
//!
//! [`QueryTranslator`] turns a [`QueryExpression`] into a page of records:
//! snapshot the primary type, expand links, apply the root filter, project the
//! requested columns, collapse duplicates, sort, and finally cut the page.
//! The query description itself is only ever read.

use std::{cmp::Ordering, collections::HashMap, collections::HashSet};
use tracing::trace;

use crmfake_core::{
    backend::RecordBackend,
    config::ServiceConfig,
    error::{CrmError, CrmResult},
    page::{EntityCollection, PagingCookie},
    query::{ColumnSet, OrderExpression, PagingInfo, QueryExpression, SortDirection},
    record::Record,
    value::{AliasedValue, Value},
};

use crate::{
    evaluator::{EvaluationContext, FilterCompiler, RowScope, sort_order},
    join::{JoinResolver, JoinedRow, LinkResolver, ResolvedLink},
    snapshot::SnapshotCache,
};

/// A sort key bound to the record it reads from.
#[derive(Debug, Clone)]
struct SortKey {
    alias: Option<String>,
    attribute: String,
    direction: SortDirection,
}

/// A projected record with the sort values of the row it came from.
#[derive(Debug)]
struct ResultRow {
    record: Record,
    key: Vec<Value>,
}

/// Executes queries against a record backend.
pub struct QueryTranslator<'a> {
    backend: &'a dyn RecordBackend,
    context: EvaluationContext<'a>,
    config: &'a ServiceConfig,
}

impl<'a> QueryTranslator<'a> {
    /// Creates a translator.
    pub fn new(
        backend: &'a dyn RecordBackend,
        context: EvaluationContext<'a>,
        config: &'a ServiceConfig,
    ) -> Self {
        Self {
            backend,
            context,
            config,
        }
    }

    /// Runs a query and returns one page of results.
    ///
    /// # Errors
    ///
    /// - Schema mismatch for an unknown attribute in a condition or a sort
    /// - Configuration errors for duplicate aliases or undeclared relationships
    /// - Invalid argument for wrong operator arity or a malformed paging cookie
    /// - Not supported for unimplemented operators
    pub fn execute(&self, query: &QueryExpression) -> CrmResult<EntityCollection> {
        let snapshots = SnapshotCache::new(self.backend);
        let links = LinkResolver::new(self.context.relationships)
            .resolve(&query.entity_name, &query.links)?;

        let mut aliases = HashMap::new();
        for link in &links {
            link.walk(&mut |link| {
                aliases.insert(link.alias.clone(), link.entity.clone());
            });
        }

        let criteria = query
            .criteria
            .as_ref()
            .map(|filter| {
                FilterCompiler::new(self.context, &snapshots, &query.entity_name, &aliases)
                    .compile(filter)
            })
            .transpose()?;
        let sort_keys = self.sort_keys(query, &links, &aliases, &snapshots)?;

        let primaries = snapshots.of_type(&query.entity_name);
        let scanned = primaries.len();

        let mut rows = JoinResolver::new(self.context, &snapshots)
            .expand(Vec::clone(&primaries), &links)?;
        let joined = rows.len();

        if let Some(criteria) = &criteria {
            rows.retain(|row| criteria.matches(row));
        }

        let mut results = rows
            .iter()
            .map(|row| ResultRow {
                record: project(row, &query.columns, &links),
                key: sort_keys
                    .iter()
                    .map(|key| {
                        row.record(key.alias.as_deref())
                            .and_then(|record| record.attribute_or_id(&key.attribute))
                            .unwrap_or(Value::Null)
                    })
                    .collect(),
            })
            .collect::<Vec<_>>();

        if query.distinct {
            results = distinct(results)?;
        }

        results.sort_by(|a, b| compare_keys(&sort_keys, &a.key, &b.key));

        trace!(
            entity = %query.entity_name,
            scanned,
            joined,
            matched = results.len(),
            "executed query"
        );

        self.page(query, &sort_keys, results)
    }

    fn sort_keys(
        &self,
        query: &QueryExpression,
        links: &[ResolvedLink],
        aliases: &HashMap<String, String>,
        snapshots: &SnapshotCache<'_>,
    ) -> CrmResult<Vec<SortKey>> {
        let mut keys: Vec<(Option<String>, &OrderExpression)> = query
            .orders
            .iter()
            .map(|order| (order.entity_alias.clone(), order))
            .collect();

        for link in links {
            link.walk(&mut |link| {
                for order in &link.orders {
                    let alias = order.entity_alias.clone().unwrap_or_else(|| link.alias.clone());
                    keys.push((Some(alias), order));
                }
            });
        }

        keys.into_iter()
            .map(|(alias, order)| {
                let entity = match &alias {
                    None => query.entity_name.as_str(),
                    Some(alias) => aliases.get(alias).map(String::as_str).ok_or_else(|| {
                        CrmError::Configuration(format!(
                            "sort on '{}' names unknown link alias '{alias}'",
                            order.attribute
                        ))
                    })?,
                };

                if self.context.validate_attributes && !snapshots.knows(entity, &order.attribute) {
                    return Err(CrmError::SchemaMismatch {
                        entity: entity.to_string(),
                        attribute: order.attribute.clone(),
                    });
                }

                Ok(SortKey {
                    alias,
                    attribute: order.attribute.clone(),
                    direction: order.direction,
                })
            })
            .collect()
    }

    fn page(
        &self,
        query: &QueryExpression,
        sort_keys: &[SortKey],
        results: Vec<ResultRow>,
    ) -> CrmResult<EntityCollection> {
        let paging = query.page_info.clone().unwrap_or_default();
        let total = paging
            .return_total_record_count
            .then_some(results.len());

        if let Some(top) = query.top_count {
            let records = results
                .into_iter()
                .take(top.min(self.config.max_page_size))
                .map(|row| row.record)
                .collect();

            return Ok(EntityCollection::builder(&query.entity_name, records)
                .with_total_record_count(total)
                .build());
        }

        let page_size = self.config.page_size(paging.count);
        let start = match &paging.paging_cookie {
            Some(cookie) => resume_position(sort_keys, &results, &PagingCookie::decode(cookie)?),
            None => paging.offset(page_size),
        };

        let end = start.saturating_add(page_size).min(results.len());
        let more_records = end < results.len();
        let cookie = match (more_records, results.get(end.wrapping_sub(1))) {
            (true, Some(last)) if end > start => Some(
                PagingCookie {
                    page: page_number(&paging),
                    last_id: last.record.id,
                    last_key: last.key.clone(),
                    tie_offset: tie_offset(sort_keys, &results, end - 1),
                }
                .encode()?,
            ),
            _ => None,
        };

        let records = results
            .into_iter()
            .skip(start)
            .take(end.saturating_sub(start))
            .map(|row| row.record)
            .collect();

        Ok(EntityCollection::builder(&query.entity_name, records)
            .with_more_records(more_records)
            .with_paging_cookie(cookie)
            .with_total_record_count(total)
            .build())
    }
}

fn page_number(paging: &PagingInfo) -> usize {
    paging.page_number.max(1)
}

fn compare_keys(sort_keys: &[SortKey], a: &[Value], b: &[Value]) -> Ordering {
    sort_keys
        .iter()
        .zip(a.iter().zip(b))
        .map(|(key, (a, b))| {
            let ordering = sort_order(Some(a), Some(b));
            match key.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Number of rows up to and including `index` that share its sort key.
fn tie_offset(sort_keys: &[SortKey], results: &[ResultRow], index: usize) -> usize {
    let key = &results[index].key;
    let first = results[..index]
        .iter()
        .rposition(|row| compare_keys(sort_keys, &row.key, key).is_ne())
        .map_or(0, |position| position + 1);

    index - first + 1
}

/// Position right after the row a cookie was issued for.
///
/// The row is located by identifier among the rows sharing its sort key. When it
/// is gone, the tie offset recorded in the cookie is used instead.
fn resume_position(sort_keys: &[SortKey], results: &[ResultRow], cookie: &PagingCookie) -> usize {
    let ties_start =
        results.partition_point(|row| compare_keys(sort_keys, &row.key, &cookie.last_key).is_lt());
    let ties_end =
        results.partition_point(|row| compare_keys(sort_keys, &row.key, &cookie.last_key).is_le());

    match results[ties_start..ties_end]
        .iter()
        .position(|row| row.record.id == cookie.last_id)
    {
        Some(position) => ties_start + position + 1,
        None => (ties_start + cookie.tie_offset).min(ties_end),
    }
}

fn project(row: &JoinedRow, columns: &ColumnSet, links: &[ResolvedLink]) -> Record {
    let mut record = row.primary.project(columns);

    for link in links {
        link.walk(&mut |link| {
            if link.hidden {
                return;
            }
            let Some(Some(linked)) = row.linked.get(&link.alias) else {
                return;
            };

            for (attribute, value) in linked.project(&link.columns).attributes {
                record.set(
                    format!("{}.{attribute}", link.alias),
                    Value::Aliased(AliasedValue {
                        entity: link.entity.clone(),
                        attribute,
                        value: Box::new(value),
                    }),
                );
            }
        });
    }

    record
}

/// Keeps the first row of every group of rows with identical projected columns.
fn distinct(results: Vec<ResultRow>) -> CrmResult<Vec<ResultRow>> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(results.len());

    for row in results {
        if seen.insert(serde_json::to_string(&row.record.attributes)?) {
            kept.push(row);
        }
    }

    Ok(kept)
}
