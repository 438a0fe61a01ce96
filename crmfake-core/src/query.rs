//! Query description and filtering API.
//!
//! A [`QueryExpression`] describes a relational query over the record store: the
//! primary record type, the projected columns, a boolean filter tree, links (joins)
//! to other record types, sort order, paging and distinct.
//!
//! Query descriptions are built by callers and never mutated by query execution, so
//! the same query object can be submitted any number of times.
//!
//! # Query Building
//!
//! ```ignore
//! use crmfake::query::{QueryExpression, Filter, SortDirection, LinkEntity, JoinOperator};
//!
//! let query = QueryExpression::builder("contact")
//!     .columns(["fullname", "emailaddress1"])
//!     .filter(Filter::and([
//!         Filter::eq("statecode", 0),
//!         Filter::like("fullname", "A%"),
//!     ]))
//!     .link(
//!         LinkEntity::new("account", "parentcustomerid", "accountid", JoinOperator::LeftOuter)
//!             .alias("acc")
//!             .columns(["name"]),
//!     )
//!     .order("fullname", SortDirection::Asc)
//!     .build();
//! ```
//!
//! # Filter Expression API
//!
//! The [`Filter`] struct provides static constructors for conditions and groups:
//!
//! - Comparison: `eq`, `ne`, `gt`, `ge`, `lt`, `le`, `between`
//! - Null checks: `null`, `not_null`
//! - Sets: `in_values`, `not_in`, `contain_values`, `does_not_contain_values`
//! - Strings: `like`, `not_like`, `begins_with`, `ends_with`, `contains`
//! - Dates: `older_than`, `last_x`, `next_x`, `on`
//! - Hierarchy: `under`, `under_or_equal`, `above`, `above_or_equal`, `not_under`
//! - Logical: `and`, `or`

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{error::CrmError, value::Value};

/// Sort direction for query results.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (nulls first).
    Asc,
    /// Descending order (nulls last).
    Desc,
}

/// Sort specification for query results.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OrderExpression {
    /// The attribute to sort by.
    pub attribute: String,
    /// The sort direction.
    pub direction: SortDirection,
    /// Alias of the linked record the attribute belongs to, if not the primary.
    pub entity_alias: Option<String>,
}

impl OrderExpression {
    /// Creates a sort on a primary attribute.
    pub fn new(attribute: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            attribute: attribute.into(),
            direction,
            entity_alias: None,
        }
    }
}

/// Columns to return for a record type.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub enum ColumnSet {
    /// Every attribute the record holds.
    All,
    /// Only the listed attributes.
    Columns(Vec<String>),
    /// No attributes (the identifier is still returned).
    #[default]
    None,
}

impl ColumnSet {
    /// Builds an explicit column list.
    pub fn columns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ColumnSet::Columns(names.into_iter().map(Into::into).collect())
    }

    /// Names of the explicitly requested columns (empty for `All` and `None`).
    pub fn names(&self) -> &[String] {
        match self {
            ColumnSet::Columns(names) => names,
            _ => &[],
        }
    }
}

/// Logical operator combining the children of a filter group.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    /// All children must match; an empty group matches.
    And,
    /// Any child must match; an empty group does not match.
    Or,
}

/// Condition operators.
///
/// Each operator documents how many comparison values it accepts; the engine raises
/// [`CrmError::ConditionArity`] for any other count.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionOperator {
    /// Equal to (1 value).
    Equal,
    /// Not equal to (1 value).
    NotEqual,
    /// Greater than (1 value).
    GreaterThan,
    /// Greater than or equal to (1 value).
    GreaterEqual,
    /// Less than (1 value).
    LessThan,
    /// Less than or equal to (1 value).
    LessEqual,
    /// Inclusive range (2 values).
    Between,
    /// Outside an inclusive range (2 values).
    NotBetween,
    /// Absent or explicit null (0 values).
    Null,
    /// Present and not null (0 values).
    NotNull,
    /// Member of the supplied set (1+ values).
    In,
    /// Not a member of the supplied set (1+ values).
    NotIn,
    /// Multi-valued choice overlaps the supplied codes (1+ values).
    ContainValues,
    /// Multi-valued choice shares no code with the supplied ones (1+ values).
    DoesNotContainValues,
    /// Case-insensitive pattern with `%` and `_` wildcards (1 value).
    Like,
    /// Negated `Like` (1 value).
    NotLike,
    /// Case-insensitive prefix (1 value).
    BeginsWith,
    /// Negated `BeginsWith` (1 value).
    DoesNotBeginWith,
    /// Case-insensitive suffix (1 value).
    EndsWith,
    /// Negated `EndsWith` (1 value).
    DoesNotEndWith,
    /// Case-insensitive substring (1 value).
    Contains,
    /// Negated `Contains` (1 value).
    DoesNotContain,
    /// Same UTC calendar day (1 value).
    On,
    /// On or before a UTC calendar day (1 value).
    OnOrBefore,
    /// On or after a UTC calendar day (1 value).
    OnOrAfter,
    /// Today, UTC (0 values).
    Today,
    /// Yesterday, UTC (0 values).
    Yesterday,
    /// Tomorrow, UTC (0 values).
    Tomorrow,
    /// Within the last X hours (1 value).
    LastXHours,
    /// Within the last X days (1 value).
    LastXDays,
    /// Within the last X weeks (1 value).
    LastXWeeks,
    /// Within the last X months (1 value).
    LastXMonths,
    /// Within the last X years (1 value).
    LastXYears,
    /// Within the next X hours (1 value).
    NextXHours,
    /// Within the next X days (1 value).
    NextXDays,
    /// Within the next X weeks (1 value).
    NextXWeeks,
    /// Within the next X months (1 value).
    NextXMonths,
    /// Within the next X years (1 value).
    NextXYears,
    /// Strictly before now minus X minutes (1 value).
    OlderThanXMinutes,
    /// Strictly before now minus X hours (1 value).
    OlderThanXHours,
    /// Strictly before now minus X days (1 value).
    OlderThanXDays,
    /// Strictly before now minus X weeks (1 value).
    OlderThanXWeeks,
    /// Strictly before now minus X months (1 value).
    OlderThanXMonths,
    /// Strictly before now minus X years (1 value).
    OlderThanXYears,
    /// References the calling user (0 values).
    EqualUserId,
    /// Does not reference the calling user (0 values).
    NotEqualUserId,
    /// References the calling user's business unit (0 values).
    EqualBusinessId,
    /// Does not reference the calling user's business unit (0 values).
    NotEqualBusinessId,
    /// Strict descendant of the referenced record (1 value).
    Under,
    /// Descendant of, or equal to, the referenced record (1 value).
    UnderOrEqual,
    /// Strict ancestor of the referenced record (1 value).
    Above,
    /// Ancestor of, or equal to, the referenced record (1 value).
    AboveOrEqual,
    /// Not a strict descendant of the referenced record (1 value).
    NotUnder,
    /// Fiscal year comparison; not evaluated by the engine.
    InFiscalYear,
    /// Fiscal period comparison; not evaluated by the engine.
    InFiscalPeriod,
    /// Team membership of the calling user; not evaluated by the engine.
    EqualUserTeams,
    /// Language of the calling user; not evaluated by the engine.
    EqualUserLanguage,
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A single condition on one attribute.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConditionExpression {
    /// The attribute to test.
    pub attribute: String,
    /// The comparison operator.
    pub operator: ConditionOperator,
    /// Comparison values; the accepted count depends on the operator.
    pub values: Vec<Value>,
    /// Alias of the linked record the attribute belongs to, if not the primary.
    pub entity_alias: Option<String>,
}

impl ConditionExpression {
    /// Creates a condition on a primary attribute.
    pub fn new<I, V>(attribute: impl Into<String>, operator: ConditionOperator, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            attribute: attribute.into(),
            operator,
            values: values.into_iter().map(Into::into).collect(),
            entity_alias: None,
        }
    }

    /// Binds the condition to a linked record by alias.
    pub fn on_alias(mut self, alias: impl Into<String>) -> Self {
        self.entity_alias = Some(alias.into());
        self
    }
}

/// A node of the filter tree: a condition or a nested group.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// A single condition.
    Condition(ConditionExpression),
    /// A nested group.
    Group(FilterExpression),
}

impl From<ConditionExpression> for FilterNode {
    fn from(condition: ConditionExpression) -> Self {
        FilterNode::Condition(condition)
    }
}

impl From<FilterExpression> for FilterNode {
    fn from(filter: FilterExpression) -> Self {
        FilterNode::Group(filter)
    }
}

/// A group of filter nodes combined with a logical operator.
///
/// Groups nest arbitrarily; children are evaluated in order and evaluation
/// short-circuits.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FilterExpression {
    /// How the children are combined.
    pub operator: LogicalOperator,
    /// Ordered children: conditions or nested groups.
    pub children: Vec<FilterNode>,
}

impl FilterExpression {
    /// Creates an empty group.
    pub fn new(operator: LogicalOperator) -> Self {
        Self {
            operator,
            children: Vec::new(),
        }
    }

    /// Appends a child node.
    pub fn push(mut self, node: impl Into<FilterNode>) -> Self {
        self.children.push(node.into());
        self
    }

    /// Combines this group with another node using logical AND.
    ///
    /// If this group is already an AND group, the node is appended. Otherwise a new
    /// AND group holding both is created.
    pub fn and(self, other: impl Into<FilterNode>) -> Self {
        match self.operator {
            LogicalOperator::And => self.push(other),
            LogicalOperator::Or => FilterExpression::new(LogicalOperator::And)
                .push(self)
                .push(other),
        }
    }

    /// Combines this group with another node using logical OR.
    ///
    /// If this group is already an OR group, the node is appended. Otherwise a new
    /// OR group holding both is created.
    pub fn or(self, other: impl Into<FilterNode>) -> Self {
        match self.operator {
            LogicalOperator::Or => self.push(other),
            LogicalOperator::And => FilterExpression::new(LogicalOperator::Or)
                .push(self)
                .push(other),
        }
    }
}

impl From<ConditionExpression> for FilterExpression {
    fn from(condition: ConditionExpression) -> Self {
        FilterExpression::new(LogicalOperator::And).push(condition)
    }
}

/// How a link is joined to its parent.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOperator {
    /// Parents without a match are dropped.
    Inner,
    /// Parents without a match are kept once with a null linked slot.
    LeftOuter,
}

/// A join from the primary record type (or a parent link) to another record type.
///
/// The link either names its join attributes explicitly or names a registered
/// relationship, from which the attributes are resolved.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LinkEntity {
    /// Logical name of the linked record type.
    pub link_to_entity: String,
    /// Attribute on the parent side of the join.
    pub link_from_attribute: String,
    /// Attribute on the linked side of the join.
    pub link_to_attribute: String,
    /// Registered relationship to resolve the join attributes from.
    pub relationship: Option<String>,
    /// Join kind.
    pub join_operator: JoinOperator,
    /// Alias used to qualify linked columns and conditions.
    pub alias: Option<String>,
    /// Columns of the linked record to return.
    pub columns: ColumnSet,
    /// Filter narrowing the candidate linked records before the join.
    pub filter: Option<FilterExpression>,
    /// Nested links starting from this linked record.
    pub links: Vec<LinkEntity>,
    /// Sorts on the linked record, applied after the primary sorts.
    pub orders: Vec<OrderExpression>,
}

impl LinkEntity {
    /// Creates a link joining `link_from_attribute` on the parent side to
    /// `link_to_attribute` on records of type `link_to_entity`.
    pub fn new(
        link_to_entity: impl Into<String>,
        link_from_attribute: impl Into<String>,
        link_to_attribute: impl Into<String>,
        join_operator: JoinOperator,
    ) -> Self {
        Self {
            link_to_entity: link_to_entity.into(),
            link_from_attribute: link_from_attribute.into(),
            link_to_attribute: link_to_attribute.into(),
            relationship: None,
            join_operator,
            alias: None,
            columns: ColumnSet::None,
            filter: None,
            links: Vec::new(),
            orders: Vec::new(),
        }
    }

    /// Creates a link to `link_to_entity` whose join attributes come from the
    /// registered relationship named `relationship`.
    pub fn via(
        relationship: impl Into<String>,
        link_to_entity: impl Into<String>,
        join_operator: JoinOperator,
    ) -> Self {
        Self {
            relationship: Some(relationship.into()),
            ..Self::new(link_to_entity, String::new(), String::new(), join_operator)
        }
    }

    /// Sets the alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Sets the returned columns to an explicit list.
    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = ColumnSet::columns(names);
        self
    }

    /// Sets the returned columns.
    pub fn column_set(mut self, columns: ColumnSet) -> Self {
        self.columns = columns;
        self
    }

    /// Sets the filter applied to the linked records.
    pub fn filter(mut self, filter: impl Into<FilterExpression>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Adds a nested link.
    pub fn link(mut self, link: LinkEntity) -> Self {
        self.links.push(link);
        self
    }

    /// Adds a sort on a linked attribute.
    pub fn order(mut self, attribute: impl Into<String>, direction: SortDirection) -> Self {
        self.orders.push(OrderExpression::new(attribute, direction));
        self
    }
}

/// Paging request for a query.
///
/// Pages are 1-indexed. A `count` of zero means "use the configured default page
/// size". The cookie returned with a page resumes the query right after that page.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PagingInfo {
    /// The page number (1-indexed).
    pub page_number: usize,
    /// Records per page; zero selects the default.
    pub count: usize,
    /// Cookie returned with the previous page.
    pub paging_cookie: Option<String>,
    /// Whether to compute the total matching count.
    pub return_total_record_count: bool,
}

impl PagingInfo {
    /// Creates paging parameters for `page_number` with `count` records per page.
    pub fn new(page_number: usize, count: usize) -> Self {
        Self {
            page_number,
            count,
            paging_cookie: None,
            return_total_record_count: false,
        }
    }

    /// Sets the cookie returned with the previous page.
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.paging_cookie = Some(cookie.into());
        self
    }

    /// Requests the total matching count.
    pub fn with_total_count(mut self) -> Self {
        self.return_total_record_count = true;
        self
    }

    /// Number of records to skip when no cookie is supplied.
    pub fn offset(&self, page_size: usize) -> usize {
        self.page_number.saturating_sub(1).saturating_mul(page_size)
    }
}

impl Default for PagingInfo {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

/// A structured query for retrieving records.
///
/// Use [`QueryBuilder`] for ergonomic construction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QueryExpression {
    /// Logical name of the primary record type.
    pub entity_name: String,
    /// Columns of the primary record to return.
    pub columns: ColumnSet,
    /// Root of the filter tree; absent matches every record.
    pub criteria: Option<FilterExpression>,
    /// Links to other record types.
    pub links: Vec<LinkEntity>,
    /// Sorts on primary attributes, applied in order.
    pub orders: Vec<OrderExpression>,
    /// Row cap; overrides paging when set.
    pub top_count: Option<usize>,
    /// Paging request.
    pub page_info: Option<PagingInfo>,
    /// Collapse rows with identical projected columns.
    pub distinct: bool,
}

impl QueryExpression {
    /// Creates a query returning every record of `entity_name` with all columns.
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            columns: ColumnSet::All,
            criteria: None,
            links: Vec::new(),
            orders: Vec::new(),
            top_count: None,
            page_info: None,
            distinct: false,
        }
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder(entity_name: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(entity_name)
    }
}

/// Helper struct for constructing filter expressions.
///
/// Provides static methods to construct common conditions and groups.
///
/// # Example
///
/// ```ignore
/// use crmfake::query::Filter;
///
/// let filter = Filter::or([
///     Filter::eq("lastname", "McDonald"),
///     Filter::eq("lastname", "King"),
/// ]);
/// ```
pub struct Filter;

impl Filter {
    /// Creates a condition with an arbitrary operator and values.
    pub fn condition<I, V>(
        attribute: impl Into<String>,
        operator: ConditionOperator,
        values: I,
    ) -> ConditionExpression
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        ConditionExpression::new(attribute, operator, values)
    }

    /// Matches records where the attribute equals the value.
    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::Equal, [value.into()])
    }

    /// Matches records where the attribute does not equal the value.
    pub fn ne(attribute: impl Into<String>, value: impl Into<Value>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::NotEqual, [value.into()])
    }

    /// Matches records where the attribute is greater than the value.
    pub fn gt(attribute: impl Into<String>, value: impl Into<Value>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::GreaterThan, [value.into()])
    }

    /// Matches records where the attribute is greater than or equal to the value.
    pub fn ge(attribute: impl Into<String>, value: impl Into<Value>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::GreaterEqual, [value.into()])
    }

    /// Matches records where the attribute is less than the value.
    pub fn lt(attribute: impl Into<String>, value: impl Into<Value>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::LessThan, [value.into()])
    }

    /// Matches records where the attribute is less than or equal to the value.
    pub fn le(attribute: impl Into<String>, value: impl Into<Value>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::LessEqual, [value.into()])
    }

    /// Matches records where the attribute lies within `[low, high]`.
    pub fn between(
        attribute: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> ConditionExpression {
        ConditionExpression::new(
            attribute,
            ConditionOperator::Between,
            [low.into(), high.into()],
        )
    }

    /// Matches records where the attribute is absent or null.
    pub fn null(attribute: impl Into<String>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::Null, Vec::<Value>::new())
    }

    /// Matches records where the attribute is present and not null.
    pub fn not_null(attribute: impl Into<String>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::NotNull, Vec::<Value>::new())
    }

    /// Matches records where the attribute is one of the values.
    pub fn in_values<I, V>(attribute: impl Into<String>, values: I) -> ConditionExpression
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        ConditionExpression::new(attribute, ConditionOperator::In, values)
    }

    /// Matches records where the attribute is none of the values.
    pub fn not_in<I, V>(attribute: impl Into<String>, values: I) -> ConditionExpression
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        ConditionExpression::new(attribute, ConditionOperator::NotIn, values)
    }

    /// Matches multi-valued choices sharing at least one code with `codes`.
    pub fn contain_values(
        attribute: impl Into<String>,
        codes: impl IntoIterator<Item = i32>,
    ) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::ContainValues, codes)
    }

    /// Matches multi-valued choices sharing no code with `codes`.
    pub fn does_not_contain_values(
        attribute: impl Into<String>,
        codes: impl IntoIterator<Item = i32>,
    ) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::DoesNotContainValues, codes)
    }

    /// Matches strings against a `%`/`_` pattern, ignoring case.
    pub fn like(attribute: impl Into<String>, pattern: impl Into<String>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::Like, [pattern.into()])
    }

    /// Matches strings not matching a `%`/`_` pattern, ignoring case.
    pub fn not_like(attribute: impl Into<String>, pattern: impl Into<String>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::NotLike, [pattern.into()])
    }

    /// Matches strings starting with the prefix, ignoring case.
    pub fn begins_with(attribute: impl Into<String>, prefix: impl Into<String>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::BeginsWith, [prefix.into()])
    }

    /// Matches strings ending with the suffix, ignoring case.
    pub fn ends_with(attribute: impl Into<String>, suffix: impl Into<String>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::EndsWith, [suffix.into()])
    }

    /// Matches strings containing the fragment, ignoring case.
    pub fn contains(attribute: impl Into<String>, fragment: impl Into<String>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::Contains, [fragment.into()])
    }

    /// Matches date-times on the same UTC day as `value`.
    pub fn on(attribute: impl Into<String>, value: impl Into<Value>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::On, [value.into()])
    }

    /// Matches date-times strictly older than `amount` units before now.
    ///
    /// `operator` must be one of the `OlderThanX*` operators.
    pub fn older_than(
        attribute: impl Into<String>,
        operator: ConditionOperator,
        amount: i64,
    ) -> ConditionExpression {
        ConditionExpression::new(attribute, operator, [amount])
    }

    /// Matches date-times within the last `amount` units.
    ///
    /// `operator` must be one of the `LastX*` operators.
    pub fn last_x(
        attribute: impl Into<String>,
        operator: ConditionOperator,
        amount: i64,
    ) -> ConditionExpression {
        ConditionExpression::new(attribute, operator, [amount])
    }

    /// Matches date-times within the next `amount` units.
    ///
    /// `operator` must be one of the `NextX*` operators.
    pub fn next_x(
        attribute: impl Into<String>,
        operator: ConditionOperator,
        amount: i64,
    ) -> ConditionExpression {
        ConditionExpression::new(attribute, operator, [amount])
    }

    /// Matches records strictly below `id` in the hierarchy.
    pub fn under(attribute: impl Into<String>, id: impl Into<Value>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::Under, [id.into()])
    }

    /// Matches records below or equal to `id` in the hierarchy.
    pub fn under_or_equal(attribute: impl Into<String>, id: impl Into<Value>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::UnderOrEqual, [id.into()])
    }

    /// Matches records strictly above `id` in the hierarchy.
    pub fn above(attribute: impl Into<String>, id: impl Into<Value>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::Above, [id.into()])
    }

    /// Matches records above or equal to `id` in the hierarchy.
    pub fn above_or_equal(attribute: impl Into<String>, id: impl Into<Value>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::AboveOrEqual, [id.into()])
    }

    /// Matches records not strictly below `id` in the hierarchy.
    pub fn not_under(attribute: impl Into<String>, id: impl Into<Value>) -> ConditionExpression {
        ConditionExpression::new(attribute, ConditionOperator::NotUnder, [id.into()])
    }

    /// Creates an AND group: all nodes must match.
    pub fn and<I, N>(nodes: I) -> FilterExpression
    where
        I: IntoIterator<Item = N>,
        N: Into<FilterNode>,
    {
        FilterExpression {
            operator: LogicalOperator::And,
            children: nodes.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates an OR group: any node must match.
    pub fn or<I, N>(nodes: I) -> FilterExpression
    where
        I: IntoIterator<Item = N>,
        N: Into<FilterNode>,
    {
        FilterExpression {
            operator: LogicalOperator::Or,
            children: nodes.into_iter().map(Into::into).collect(),
        }
    }
}

/// Fluent builder for [`QueryExpression`].
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    query: QueryExpression,
}

impl QueryBuilder {
    /// Creates a builder for a query over `entity_name`.
    pub fn new(entity_name: impl Into<String>) -> Self {
        QueryBuilder {
            query: QueryExpression::new(entity_name),
        }
    }

    /// Returns only the listed columns of the primary record.
    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.columns = ColumnSet::columns(names);
        self
    }

    /// Sets the primary column set.
    pub fn column_set(mut self, columns: ColumnSet) -> Self {
        self.query.columns = columns;
        self
    }

    /// Sets the root filter.
    pub fn filter(mut self, filter: impl Into<FilterExpression>) -> Self {
        self.query.criteria = Some(filter.into());
        self
    }

    /// Adds a link.
    pub fn link(mut self, link: LinkEntity) -> Self {
        self.query.links.push(link);
        self
    }

    /// Adds a sort on a primary attribute.
    pub fn order(mut self, attribute: impl Into<String>, direction: SortDirection) -> Self {
        self.query
            .orders
            .push(OrderExpression::new(attribute, direction));
        self
    }

    /// Caps the number of returned rows.
    pub fn top(mut self, count: usize) -> Self {
        self.query.top_count = Some(count);
        self
    }

    /// Sets the paging request.
    pub fn page(mut self, page_info: PagingInfo) -> Self {
        self.query.page_info = Some(page_info);
        self
    }

    /// Collapses rows with identical projected columns.
    pub fn distinct(mut self, distinct: bool) -> Self {
        self.query.distinct = distinct;
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> QueryExpression {
        self.query
    }
}

/// Visitor over a filter tree.
///
/// Implementors decide what a group and a condition produce; the default
/// [`visit_filter`](QueryVisitor::visit_filter) and [`visit_node`](QueryVisitor::visit_node)
/// dispatch on the node shape.
pub trait QueryVisitor {
    type Output;
    type Error: Into<CrmError>;

    fn visit_and(&mut self, children: &[FilterNode]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, children: &[FilterNode]) -> Result<Self::Output, Self::Error>;
    fn visit_condition(
        &mut self,
        condition: &ConditionExpression,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_filter(&mut self, filter: &FilterExpression) -> Result<Self::Output, Self::Error> {
        match filter.operator {
            LogicalOperator::And => self.visit_and(&filter.children),
            LogicalOperator::Or => self.visit_or(&filter.children),
        }
    }

    fn visit_node(&mut self, node: &FilterNode) -> Result<Self::Output, Self::Error> {
        match node {
            FilterNode::Condition(condition) => self.visit_condition(condition),
            FilterNode::Group(filter) => self.visit_filter(filter),
        }
    }
}
