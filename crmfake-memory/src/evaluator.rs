//! Filter evaluation.
//!
//! Filters are evaluated in two steps. [`FilterCompiler`] walks a filter tree once
//! per query, validating operator arity and attribute names and turning every
//! condition into a [`Predicate`]: a closed set of match rules each carrying only
//! what it needs (a regex, a date window, a precomputed hierarchy closure). The
//! resulting [`CompiledFilter`] is then tested against any number of rows without
//! further allocation or error handling.
//!
//! Absent attributes and attributes holding null are treated alike: they satisfy
//! `Null` and every negated operator, and nothing else.

use chrono::{DateTime, Days, Months, NaiveTime, TimeDelta, TimeZone, Utc};
use regex::{Regex, RegexBuilder};
use std::{
    borrow::Cow,
    cmp::Ordering,
    collections::{BTreeSet, HashMap, HashSet},
};
use uuid::Uuid;

use crmfake_core::{
    context::CallerContext,
    error::{CrmError, CrmResult},
    query::{ConditionExpression, ConditionOperator, FilterExpression, FilterNode, QueryVisitor},
    record::Record,
    relationship::Relationships,
    value::Value,
};

use crate::{hierarchy, snapshot::SnapshotCache};

/// Type-erased, comparable view of a [`Value`].
///
/// Numeric shapes (integers, floats, money, single choices) normalize to `f64`;
/// references and GUIDs normalize to their identifier.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    Text(&'a str),
    DateTime(DateTime<Utc>),
    Guid(Uuid),
    Codes(&'a BTreeSet<i32>),
}

impl<'a> From<&'a Value> for Comparable<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => Comparable::Null,
            Value::Boolean(b) => Comparable::Bool(*b),
            Value::Integer(i) => Comparable::Number(*i as f64),
            Value::Float(f) => Comparable::Number(*f),
            Value::Money(money) => Comparable::Number(money.0),
            Value::Choice(choice) => Comparable::Number(f64::from(choice.0)),
            Value::String(s) => Comparable::Text(s),
            Value::DateTime(dt) => Comparable::DateTime(*dt),
            Value::Guid(id) => Comparable::Guid(*id),
            Value::Reference(reference) => Comparable::Guid(reference.id),
            Value::ChoiceSet(codes) => Comparable::Codes(codes),
            Value::Aliased(aliased) => Comparable::from(aliased.value.as_ref()),
        }
    }
}

impl Comparable<'_> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Bool(_) => 1,
            Comparable::Number(_) => 2,
            Comparable::Text(_) => 3,
            Comparable::DateTime(_) => 4,
            Comparable::Guid(_) => 5,
            Comparable::Codes(_) => 6,
        }
    }
}

fn fold_case(text: &str) -> impl Iterator<Item = char> + '_ {
    text.chars().flat_map(char::to_lowercase)
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Compares two values; `None` when they are not comparable.
///
/// Text compares case-insensitively. Text is coerced when compared against a
/// GUID or a date-time. A multi-valued choice equals a single code only when it
/// holds exactly that code.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (Comparable::from(left), Comparable::from(right)) {
        (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
        (Comparable::Bool(a), Comparable::Bool(b)) => Some(a.cmp(&b)),
        (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(&b),
        (Comparable::Text(a), Comparable::Text(b)) => Some(fold_case(a).cmp(fold_case(b))),
        (Comparable::DateTime(a), Comparable::DateTime(b)) => Some(a.cmp(&b)),
        (Comparable::DateTime(a), Comparable::Text(b)) => parse_datetime(b).map(|b| a.cmp(&b)),
        (Comparable::Text(a), Comparable::DateTime(b)) => parse_datetime(a).map(|a| a.cmp(&b)),
        (Comparable::Guid(a), Comparable::Guid(b)) => Some(a.cmp(&b)),
        (Comparable::Guid(a), Comparable::Text(b)) => Uuid::parse_str(b).ok().map(|b| a.cmp(&b)),
        (Comparable::Text(a), Comparable::Guid(b)) => Uuid::parse_str(a).ok().map(|a| a.cmp(&b)),
        (Comparable::Codes(a), Comparable::Codes(b)) => Some(a.cmp(b)),
        (Comparable::Codes(codes), Comparable::Number(n))
        | (Comparable::Number(n), Comparable::Codes(codes)) => {
            (codes.len() == 1 && codes.iter().all(|&code| f64::from(code) == n))
                .then_some(Ordering::Equal)
        }
        _ => None,
    }
}

/// Total order used for sorting: missing and null first, then values of the
/// same shape by [`compare_values`], then by shape.
pub fn sort_order(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left = left.map(Value::unaliased).filter(|value| !value.is_null());
    let right = right.map(Value::unaliased).filter(|value| !value.is_null());

    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or_else(|| {
            Comparable::from(a).rank().cmp(&Comparable::from(b).rank())
        }),
    }
}

fn codes_of(values: &[Value]) -> BTreeSet<i32> {
    values
        .iter()
        .flat_map(|value| match value.unaliased() {
            Value::ChoiceSet(codes) => codes.iter().copied().collect::<Vec<_>>(),
            other => other
                .as_integer()
                .and_then(|code| i32::try_from(code).ok())
                .into_iter()
                .collect(),
        })
        .collect()
}

/// Half-open date-time window `[start, end)`, or `[start, end]` when
/// `end_inclusive` is set. Missing bounds are unbounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateWindow {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    end_inclusive: bool,
}

impl DateWindow {
    fn contains(&self, instant: DateTime<Utc>) -> bool {
        let after_start = self.start.is_none_or(|start| instant >= start);
        let before_end = self.end.is_none_or(|end| {
            if self.end_inclusive {
                instant <= end
            } else {
                instant < end
            }
        });

        after_start && before_end
    }

    fn day(instant: DateTime<Utc>) -> Self {
        let start = start_of_day(instant);
        Self {
            start: Some(start),
            end: start.checked_add_days(Days::new(1)),
            end_inclusive: false,
        }
    }
}

fn start_of_day(instant: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&instant.date_naive().and_time(NaiveTime::MIN))
}

/// Calendar unit of a relative date operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl DateUnit {
    /// Moves `instant` by `amount` units, backwards when `backwards` is set.
    fn shift(self, instant: DateTime<Utc>, amount: u32, backwards: bool) -> Option<DateTime<Utc>> {
        let delta = match self {
            DateUnit::Minutes => TimeDelta::try_minutes(i64::from(amount)),
            DateUnit::Hours => TimeDelta::try_hours(i64::from(amount)),
            DateUnit::Days => TimeDelta::try_days(i64::from(amount)),
            DateUnit::Weeks => TimeDelta::try_weeks(i64::from(amount)),
            DateUnit::Months => {
                let months = Months::new(amount);
                return if backwards {
                    instant.checked_sub_months(months)
                } else {
                    instant.checked_add_months(months)
                };
            }
            DateUnit::Years => {
                let months = Months::new(amount.checked_mul(12)?);
                return if backwards {
                    instant.checked_sub_months(months)
                } else {
                    instant.checked_add_months(months)
                };
            }
        }?;

        if backwards {
            instant.checked_sub_signed(delta)
        } else {
            instant.checked_add_signed(delta)
        }
    }
}

/// A compiled match rule for one condition.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Attribute is absent or null.
    Null,
    /// Comparison against a single operand.
    Compare(Comparison, Value),
    /// Inclusive range.
    Between(Value, Value),
    /// Membership in a set of values (exact set equality for multi-valued choices).
    In(Vec<Value>),
    /// Multi-valued choice overlaps the given codes.
    ContainValues(BTreeSet<i32>),
    /// Case-insensitive match of a text attribute.
    Pattern(Regex),
    /// Date-time falls inside the window.
    Window(DateWindow),
    /// Identifier is one of the given set.
    Members(HashSet<Uuid>),
    /// Negation; matches absent and null values.
    Not(Box<Predicate>),
}

/// Ordering relation of a [`Predicate::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

impl Comparison {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Equal => ordering == Ordering::Equal,
            Comparison::Greater => ordering == Ordering::Greater,
            Comparison::GreaterEqual => ordering != Ordering::Less,
            Comparison::Less => ordering == Ordering::Less,
            Comparison::LessEqual => ordering != Ordering::Greater,
        }
    }
}

impl Predicate {
    fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Tests an attribute value; `None` means the attribute is absent.
    pub fn test(&self, value: Option<&Value>) -> bool {
        let value = value.map(Value::unaliased).filter(|value| !value.is_null());

        match (self, value) {
            (Predicate::Null, value) => value.is_none(),
            (Predicate::Not(inner), value) => !inner.test(value),
            (_, None) => false,
            (predicate, Some(value)) => predicate.test_present(value),
        }
    }

    fn test_present(&self, value: &Value) -> bool {
        match self {
            Predicate::Compare(comparison, operand) => {
                compare_values(value, operand).is_some_and(|ordering| comparison.accepts(ordering))
            }
            Predicate::Between(low, high) => {
                compare_values(value, low).is_some_and(|o| o != Ordering::Less)
                    && compare_values(value, high).is_some_and(|o| o != Ordering::Greater)
            }
            Predicate::In(operands) => match value {
                Value::ChoiceSet(codes) => *codes == codes_of(operands),
                _ => operands
                    .iter()
                    .any(|operand| compare_values(value, operand) == Some(Ordering::Equal)),
            },
            Predicate::ContainValues(wanted) => match value {
                Value::ChoiceSet(codes) => !codes.is_disjoint(wanted),
                other => other
                    .as_integer()
                    .and_then(|code| i32::try_from(code).ok())
                    .is_some_and(|code| wanted.contains(&code)),
            },
            Predicate::Pattern(regex) => value.as_str().is_some_and(|text| regex.is_match(text)),
            Predicate::Window(window) => value.as_datetime().is_some_and(|dt| window.contains(dt)),
            Predicate::Members(ids) => value.as_guid().is_some_and(|id| ids.contains(&id)),
            Predicate::Null => false,
            Predicate::Not(inner) => !inner.test_present(value),
        }
    }
}

/// A condition bound to the record it reads from.
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    /// Link alias of the record the condition reads, `None` for the scope's own record.
    pub alias: Option<String>,
    /// Attribute name.
    pub attribute: String,
    /// Match rule.
    pub predicate: Predicate,
}

/// A filter tree ready for evaluation.
#[derive(Debug, Clone)]
pub enum CompiledFilter {
    /// Every child matches; vacuously true when empty.
    And(Vec<CompiledFilter>),
    /// Some child matches; vacuously false when empty.
    Or(Vec<CompiledFilter>),
    /// A single condition.
    Condition(CompiledCondition),
}

/// Source of the records a filter reads from.
pub trait RowScope {
    /// Record bound to `alias` (`None` for the scope's own record). Returns `None` for
    /// an outer-join miss.
    fn record(&self, alias: Option<&str>) -> Option<&Record>;
}

impl RowScope for Record {
    fn record(&self, _alias: Option<&str>) -> Option<&Record> {
        Some(self)
    }
}

fn attribute_value<'r>(record: &'r Record, attribute: &str) -> Option<Cow<'r, Value>> {
    match record.get(attribute) {
        Some(value) => Some(Cow::Borrowed(value)),
        None => record.attribute_or_id(attribute).map(Cow::Owned),
    }
}

impl CompiledFilter {
    /// Evaluates the filter against a row, short-circuiting groups.
    pub fn matches(&self, scope: &impl RowScope) -> bool {
        match self {
            CompiledFilter::And(children) => children.iter().all(|child| child.matches(scope)),
            CompiledFilter::Or(children) => children.iter().any(|child| child.matches(scope)),
            CompiledFilter::Condition(condition) => {
                // A condition on an outer-join miss never matches, whatever its operator.
                let Some(record) = scope.record(condition.alias.as_deref()) else {
                    return false;
                };
                let value = attribute_value(record, &condition.attribute);
                condition.predicate.test(value.as_deref())
            }
        }
    }
}

/// Ambient values some operators depend on.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// The instant relative-date operators are computed against.
    pub now: DateTime<Utc>,
    /// The caller identity-relative operators compare against.
    pub caller: &'a CallerContext,
    /// Declared relationships, consulted for hierarchy attributes.
    pub relationships: &'a Relationships,
    /// Reject conditions on attributes unknown to the record type.
    pub validate_attributes: bool,
}

/// Number of comparison values an operator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    Zero,
    One,
    Two,
    AtLeastOne,
}

impl Arity {
    fn of(operator: ConditionOperator) -> Self {
        use ConditionOperator::*;

        match operator {
            Null | NotNull | Today | Yesterday | Tomorrow | EqualUserId | NotEqualUserId
            | EqualBusinessId | NotEqualBusinessId | EqualUserTeams | EqualUserLanguage
            | InFiscalYear | InFiscalPeriod => Arity::Zero,
            Between | NotBetween => Arity::Two,
            In | NotIn | ContainValues | DoesNotContainValues => Arity::AtLeastOne,
            _ => Arity::One,
        }
    }

    fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Zero => count == 0,
            Arity::One => count == 1,
            Arity::Two => count == 2,
            Arity::AtLeastOne => count >= 1,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Arity::Zero => "no",
            Arity::One => "exactly one",
            Arity::Two => "exactly two",
            Arity::AtLeastOne => "at least one",
        }
    }
}

/// Converts the LIKE pattern language (`%` any run, `_` any single character,
/// `\` escapes the next character) into an anchored regular expression.
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push_str("(?s)^");

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    regex.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

/// Compiles filter trees against a scope of record types.
///
/// The scope maps link aliases to their record types; conditions without an alias
/// read the scope's own record type.
pub struct FilterCompiler<'q, 'a> {
    context: EvaluationContext<'a>,
    snapshots: &'q SnapshotCache<'a>,
    entity: &'q str,
    aliases: &'q HashMap<String, String>,
}

impl<'q, 'a> FilterCompiler<'q, 'a> {
    /// Creates a compiler for filters on `entity` that may reference `aliases`.
    pub fn new(
        context: EvaluationContext<'a>,
        snapshots: &'q SnapshotCache<'a>,
        entity: &'q str,
        aliases: &'q HashMap<String, String>,
    ) -> Self {
        Self {
            context,
            snapshots,
            entity,
            aliases,
        }
    }

    /// Compiles a filter tree.
    pub fn compile(&mut self, filter: &FilterExpression) -> CrmResult<CompiledFilter> {
        self.visit_filter(filter)
    }

    fn compile_children(&mut self, children: &[FilterNode]) -> CrmResult<Vec<CompiledFilter>> {
        children.iter().map(|child| self.visit_node(child)).collect()
    }

    fn resolve_entity(&self, alias: Option<&str>) -> CrmResult<&'q str> {
        match alias {
            None => Ok(self.entity),
            Some(alias) => self
                .aliases
                .get(alias)
                .map(String::as_str)
                .ok_or_else(|| {
                    CrmError::Configuration(format!("no link with alias '{alias}' in the query"))
                }),
        }
    }

    fn single<'c>(&self, condition: &'c ConditionExpression) -> &'c Value {
        // Arity was checked before any operand is read.
        &condition.values[0]
    }

    fn text_operand(&self, condition: &ConditionExpression) -> CrmResult<String> {
        self.single(condition)
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                CrmError::InvalidArgument(format!(
                    "condition on '{}' with operator '{}' expects a text value",
                    condition.attribute, condition.operator
                ))
            })
    }

    fn pattern(&self, condition: &ConditionExpression, regex: &str) -> CrmResult<Predicate> {
        RegexBuilder::new(regex)
            .case_insensitive(true)
            .build()
            .map(Predicate::Pattern)
            .map_err(|err| {
                CrmError::InvalidArgument(format!(
                    "invalid pattern for attribute '{}': {err}",
                    condition.attribute
                ))
            })
    }

    fn magnitude(&self, condition: &ConditionExpression) -> CrmResult<u32> {
        let amount = self.single(condition).as_integer().ok_or_else(|| {
            CrmError::InvalidArgument(format!(
                "condition on '{}' with operator '{}' expects a whole number",
                condition.attribute, condition.operator
            ))
        })?;

        if amount <= 0 {
            return Err(CrmError::InvalidArgument(format!(
                "condition on '{}' with operator '{}' requires a positive amount, got {amount}",
                condition.attribute, condition.operator
            )));
        }

        u32::try_from(amount).map_err(|_| {
            CrmError::InvalidArgument(format!(
                "amount {amount} for attribute '{}' is out of range",
                condition.attribute
            ))
        })
    }

    fn shifted(
        &self,
        condition: &ConditionExpression,
        unit: DateUnit,
        backwards: bool,
    ) -> CrmResult<DateTime<Utc>> {
        let amount = self.magnitude(condition)?;
        unit.shift(self.context.now, amount, backwards)
            .ok_or_else(|| {
                CrmError::InvalidArgument(format!(
                    "amount {amount} for attribute '{}' is out of range",
                    condition.attribute
                ))
            })
    }

    fn date_operand(&self, condition: &ConditionExpression) -> CrmResult<DateTime<Utc>> {
        self.single(condition).as_datetime().ok_or_else(|| {
            CrmError::InvalidArgument(format!(
                "condition on '{}' with operator '{}' expects a date-time",
                condition.attribute, condition.operator
            ))
        })
    }

    fn guid_operand(&self, condition: &ConditionExpression) -> CrmResult<Uuid> {
        self.single(condition).as_guid().ok_or_else(|| {
            CrmError::InvalidArgument(format!(
                "condition on '{}' with operator '{}' expects an identifier",
                condition.attribute, condition.operator
            ))
        })
    }

    fn hierarchy(
        &self,
        condition: &ConditionExpression,
        entity: &str,
        below: bool,
        include_self: bool,
    ) -> CrmResult<Predicate> {
        let id = self.guid_operand(condition)?;
        let records = self.snapshots.of_type(entity);
        let parent_attribute = self.context.relationships.hierarchy_attribute(entity);

        let mut ids = if below {
            hierarchy::descendants(&records, &parent_attribute, id)
        } else {
            hierarchy::ancestors(&records, &parent_attribute, id)
        };
        if include_self {
            ids.insert(id);
        }

        Ok(Predicate::Members(ids))
    }

    fn window(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>, end_inclusive: bool) -> Predicate {
        Predicate::Window(DateWindow {
            start,
            end,
            end_inclusive,
        })
    }

    fn predicate(&self, condition: &ConditionExpression, entity: &str) -> CrmResult<Predicate> {
        use ConditionOperator as Op;

        let now = self.context.now;
        let compare = |comparison| Predicate::Compare(comparison, self.single(condition).clone());

        let predicate = match condition.operator {
            Op::Equal => compare(Comparison::Equal),
            Op::NotEqual => compare(Comparison::Equal).negate(),
            Op::GreaterThan => compare(Comparison::Greater),
            Op::GreaterEqual => compare(Comparison::GreaterEqual),
            Op::LessThan => compare(Comparison::Less),
            Op::LessEqual => compare(Comparison::LessEqual),
            Op::Between => {
                Predicate::Between(condition.values[0].clone(), condition.values[1].clone())
            }
            Op::NotBetween => {
                Predicate::Between(condition.values[0].clone(), condition.values[1].clone())
                    .negate()
            }
            Op::Null => Predicate::Null,
            Op::NotNull => Predicate::Null.negate(),
            Op::In => Predicate::In(condition.values.clone()),
            Op::NotIn => Predicate::In(condition.values.clone()).negate(),
            Op::ContainValues => Predicate::ContainValues(codes_of(&condition.values)),
            Op::DoesNotContainValues => {
                Predicate::ContainValues(codes_of(&condition.values)).negate()
            }
            Op::Like => self.pattern(condition, &like_to_regex(&self.text_operand(condition)?))?,
            Op::NotLike => self
                .pattern(condition, &like_to_regex(&self.text_operand(condition)?))?
                .negate(),
            Op::BeginsWith => self.pattern(
                condition,
                &format!("^{}", regex::escape(&self.text_operand(condition)?)),
            )?,
            Op::DoesNotBeginWith => self
                .pattern(
                    condition,
                    &format!("^{}", regex::escape(&self.text_operand(condition)?)),
                )?
                .negate(),
            Op::EndsWith => self.pattern(
                condition,
                &format!("{}$", regex::escape(&self.text_operand(condition)?)),
            )?,
            Op::DoesNotEndWith => self
                .pattern(
                    condition,
                    &format!("{}$", regex::escape(&self.text_operand(condition)?)),
                )?
                .negate(),
            Op::Contains => {
                self.pattern(condition, &regex::escape(&self.text_operand(condition)?))?
            }
            Op::DoesNotContain => self
                .pattern(condition, &regex::escape(&self.text_operand(condition)?))?
                .negate(),
            Op::On => Predicate::Window(DateWindow::day(self.date_operand(condition)?)),
            Op::OnOrBefore => {
                let day = DateWindow::day(self.date_operand(condition)?);
                Self::window(None, day.end, false)
            }
            Op::OnOrAfter => {
                let day = DateWindow::day(self.date_operand(condition)?);
                Self::window(day.start, None, false)
            }
            Op::Today => Predicate::Window(DateWindow::day(now)),
            Op::Yesterday => Predicate::Window(DateWindow::day(
                now.checked_sub_days(Days::new(1)).unwrap_or(now),
            )),
            Op::Tomorrow => Predicate::Window(DateWindow::day(
                now.checked_add_days(Days::new(1)).unwrap_or(now),
            )),
            Op::LastXHours => Self::window(Some(self.shifted(condition, DateUnit::Hours, true)?), Some(now), true),
            Op::LastXDays => Self::window(Some(self.shifted(condition, DateUnit::Days, true)?), Some(now), true),
            Op::LastXWeeks => Self::window(Some(self.shifted(condition, DateUnit::Weeks, true)?), Some(now), true),
            Op::LastXMonths => Self::window(Some(self.shifted(condition, DateUnit::Months, true)?), Some(now), true),
            Op::LastXYears => Self::window(Some(self.shifted(condition, DateUnit::Years, true)?), Some(now), true),
            Op::NextXHours => Self::window(Some(now), Some(self.shifted(condition, DateUnit::Hours, false)?), true),
            Op::NextXDays => Self::window(Some(now), Some(self.shifted(condition, DateUnit::Days, false)?), true),
            Op::NextXWeeks => Self::window(Some(now), Some(self.shifted(condition, DateUnit::Weeks, false)?), true),
            Op::NextXMonths => Self::window(Some(now), Some(self.shifted(condition, DateUnit::Months, false)?), true),
            Op::NextXYears => Self::window(Some(now), Some(self.shifted(condition, DateUnit::Years, false)?), true),
            Op::OlderThanXMinutes => Self::window(None, Some(self.shifted(condition, DateUnit::Minutes, true)?), false),
            Op::OlderThanXHours => Self::window(None, Some(self.shifted(condition, DateUnit::Hours, true)?), false),
            Op::OlderThanXDays => Self::window(None, Some(self.shifted(condition, DateUnit::Days, true)?), false),
            Op::OlderThanXWeeks => Self::window(None, Some(self.shifted(condition, DateUnit::Weeks, true)?), false),
            Op::OlderThanXMonths => Self::window(None, Some(self.shifted(condition, DateUnit::Months, true)?), false),
            Op::OlderThanXYears => Self::window(None, Some(self.shifted(condition, DateUnit::Years, true)?), false),
            Op::EqualUserId => Predicate::Compare(Comparison::Equal, self.context.caller.user_id.into()),
            Op::NotEqualUserId => {
                Predicate::Compare(Comparison::Equal, self.context.caller.user_id.into()).negate()
            }
            Op::EqualBusinessId => {
                Predicate::Compare(Comparison::Equal, self.context.caller.business_unit_id.into())
            }
            Op::NotEqualBusinessId => {
                Predicate::Compare(Comparison::Equal, self.context.caller.business_unit_id.into())
                    .negate()
            }
            Op::Under => self.hierarchy(condition, entity, true, false)?,
            Op::UnderOrEqual => self.hierarchy(condition, entity, true, true)?,
            Op::NotUnder => self.hierarchy(condition, entity, true, false)?.negate(),
            Op::Above => self.hierarchy(condition, entity, false, false)?,
            Op::AboveOrEqual => self.hierarchy(condition, entity, false, true)?,
            Op::InFiscalYear | Op::InFiscalPeriod | Op::EqualUserTeams | Op::EqualUserLanguage => {
                return Err(CrmError::NotSupported(condition.operator.to_string()));
            }
        };

        Ok(predicate)
    }
}

impl QueryVisitor for FilterCompiler<'_, '_> {
    type Output = CompiledFilter;
    type Error = CrmError;

    fn visit_and(&mut self, children: &[FilterNode]) -> Result<Self::Output, Self::Error> {
        Ok(CompiledFilter::And(self.compile_children(children)?))
    }

    fn visit_or(&mut self, children: &[FilterNode]) -> Result<Self::Output, Self::Error> {
        Ok(CompiledFilter::Or(self.compile_children(children)?))
    }

    fn visit_condition(
        &mut self,
        condition: &ConditionExpression,
    ) -> Result<Self::Output, Self::Error> {
        use ConditionOperator as Op;

        if matches!(
            condition.operator,
            Op::InFiscalYear | Op::InFiscalPeriod | Op::EqualUserTeams | Op::EqualUserLanguage
        ) {
            return Err(CrmError::NotSupported(condition.operator.to_string()));
        }

        let arity = Arity::of(condition.operator);
        if !arity.accepts(condition.values.len()) {
            return Err(CrmError::ConditionArity {
                attribute: condition.attribute.clone(),
                operator: condition.operator.to_string(),
                expected: arity.describe(),
                actual: condition.values.len(),
            });
        }

        let entity = self.resolve_entity(condition.entity_alias.as_deref())?;
        if self.context.validate_attributes && !self.snapshots.knows(entity, &condition.attribute) {
            return Err(CrmError::SchemaMismatch {
                entity: entity.to_string(),
                attribute: condition.attribute.clone(),
            });
        }

        Ok(CompiledFilter::Condition(CompiledCondition {
            alias: condition.entity_alias.clone(),
            attribute: condition.attribute.clone(),
            predicate: self.predicate(condition, entity)?,
        }))
    }
}

/// Tests single records against filter trees.
///
/// Convenience wrapper over [`FilterCompiler`] for callers holding one record and
/// a filter that references no links.
pub struct RecordEvaluator<'q, 'a> {
    context: EvaluationContext<'a>,
    snapshots: &'q SnapshotCache<'a>,
}

impl<'q, 'a> RecordEvaluator<'q, 'a> {
    /// Creates an evaluator.
    pub fn new(context: EvaluationContext<'a>, snapshots: &'q SnapshotCache<'a>) -> Self {
        Self { context, snapshots }
    }

    /// Returns `true` if `record` matches `filter`.
    ///
    /// # Errors
    ///
    /// Returns the compilation error of the filter: wrong arity, unknown attribute,
    /// unsupported operator or malformed operand.
    pub fn matches(&self, record: &Record, filter: &FilterExpression) -> CrmResult<bool> {
        let aliases = HashMap::new();
        let compiled = FilterCompiler::new(self.context, self.snapshots, &record.logical_name, &aliases)
            .compile(filter)?;

        Ok(compiled.matches(record))
    }

    /// Keeps the records matching `filter`, preserving their order.
    pub fn filter_records(
        &self,
        entity: &str,
        records: impl IntoIterator<Item = Record>,
        filter: &FilterExpression,
    ) -> CrmResult<Vec<Record>> {
        let aliases = HashMap::new();
        let compiled =
            FilterCompiler::new(self.context, self.snapshots, entity, &aliases).compile(filter)?;

        Ok(records
            .into_iter()
            .filter(|record| compiled.matches(record))
            .collect())
    }
}
