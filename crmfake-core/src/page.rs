//! Result pages and paging cookies.
//!
//! This module provides [`EntityCollection`], the page of records returned by a
//! query, and [`PagingCookie`], the opaque token that resumes a query right after
//! the last record of a page.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::CrmResult, record::Record, value::Value};

/// A single page of query results.
///
/// # Example
///
/// ```ignore
/// use crmfake::page::EntityCollection;
///
/// let page = EntityCollection::builder("contact", records)
///     .with_more_records(true)
///     .with_paging_cookie(Some(cookie))
///     .build();
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct EntityCollection {
    /// Logical name of the primary record type.
    pub entity_name: String,
    /// The records contained in this page.
    pub records: Vec<Record>,
    /// Whether records remain after this page.
    pub more_records: bool,
    /// Cookie resuming the query after this page.
    pub paging_cookie: Option<String>,
    /// Total matching count, when requested.
    pub total_record_count: Option<usize>,
}

impl EntityCollection {
    /// Creates a new builder for constructing a page.
    pub fn builder(entity_name: impl Into<String>, records: Vec<Record>) -> EntityCollectionBuilder {
        EntityCollectionBuilder::new(entity_name, records)
    }

    /// Number of records in this page.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if this page holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Builder for constructing [`EntityCollection`] instances.
pub struct EntityCollectionBuilder {
    entity_name: String,
    records: Vec<Record>,
    more_records: bool,
    paging_cookie: Option<String>,
    total_record_count: Option<usize>,
}

impl EntityCollectionBuilder {
    /// Creates a new builder with the given records.
    pub fn new(entity_name: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            entity_name: entity_name.into(),
            records,
            more_records: false,
            paging_cookie: None,
            total_record_count: None,
        }
    }

    /// Sets whether records remain after this page.
    pub fn with_more_records(mut self, more_records: bool) -> Self {
        self.more_records = more_records;
        self
    }

    /// Sets the cookie resuming the query after this page.
    pub fn with_paging_cookie(mut self, paging_cookie: Option<String>) -> Self {
        self.paging_cookie = paging_cookie;
        self
    }

    /// Sets the total matching count.
    pub fn with_total_record_count(mut self, total_record_count: Option<usize>) -> Self {
        self.total_record_count = total_record_count;
        self
    }

    /// Builds and returns the final [`EntityCollection`].
    pub fn build(self) -> EntityCollection {
        EntityCollection {
            entity_name: self.entity_name,
            records: self.records,
            more_records: self.more_records,
            paging_cookie: self.paging_cookie,
            total_record_count: self.total_record_count,
        }
    }
}

/// Resumption state of a paged query.
///
/// The cookie records the sort key of the last returned row and how many rows
/// sharing that key had been returned, so the next page starts exactly after it
/// under the same sort order. It travels as URL-safe base64 of its JSON form.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PagingCookie {
    /// Page number the cookie was issued with.
    pub page: usize,
    /// Identifier of the last returned record.
    pub last_id: Uuid,
    /// Sort key of the last returned row, one value per sort.
    pub last_key: Vec<Value>,
    /// Rows sharing `last_key` already returned, including the last one.
    pub tie_offset: usize,
}

impl PagingCookie {
    /// Encodes the cookie as an opaque string.
    pub fn encode(&self) -> CrmResult<String> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decodes a cookie produced by [`encode`](PagingCookie::encode).
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if the text is not a cookie.
    pub fn decode(text: &str) -> CrmResult<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(text)?;
        serde_json::from_slice(&bytes).map_err(|err| {
            crate::error::CrmError::InvalidArgument(format!("malformed paging cookie: {err}"))
        })
    }
}
