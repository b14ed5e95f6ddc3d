//! Document queries
//!
//! Filters, ordering and limits evaluated against fetched documents.
//! Values compare within their own type only: a string never equals or
//! orders against a number. Strings that both parse as RFC 3339 timestamps
//! compare as instants.
//!
//! Sorting needs a total order, so timestamp strings and plain strings sort
//! as separate tiers: every timestamp before every plain string.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::models::Document;

/// A single filter clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    Lt { field: String, value: Value },
    Lte { field: String, value: Value },
    Gt { field: String, value: Value },
    Gte { field: String, value: Value },
    /// Field is an array holding `value`
    ArrayContains { field: String, value: Value },
    /// Field is present (a `null` value counts as present)
    Exists { field: String },
    /// Field is absent
    Missing { field: String },
}

impl Filter {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Eq { field, value } => lookup(doc, field).is_some_and(|v| v == value),
            Self::Ne { field, value } => lookup(doc, field).is_some_and(|v| v != value),
            Self::Lt { field, value } => compare_field(doc, field, value) == Some(Ordering::Less),
            Self::Lte { field, value } => matches!(
                compare_field(doc, field, value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::Gt { field, value } => {
                compare_field(doc, field, value) == Some(Ordering::Greater)
            }
            Self::Gte { field, value } => matches!(
                compare_field(doc, field, value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::ArrayContains { field, value } => lookup(doc, field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Self::Exists { field } => lookup(doc, field).is_some(),
            Self::Missing { field } => lookup(doc, field).is_none(),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// Ordering clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub field: String,
    #[serde(default)]
    pub direction: Direction,
}

/// Query over one collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order_by: Vec<Order>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq {
            field: field.to_string(),
            value: value.into(),
        })
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by.push(Order {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Filter, sort and truncate documents. The sort is stable, so documents
    /// tied on every ordering field keep their input order.
    pub fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut docs: Vec<Document> = docs
            .into_iter()
            .filter(|d| self.filters.iter().all(|f| f.matches(d)))
            .collect();

        if !self.order_by.is_empty() {
            docs.sort_by(|a, b| {
                for order in &self.order_by {
                    let ord = sort_order(lookup(a, &order.field), lookup(b, &order.field));
                    let ord = match order.direction {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

/// Resolve a field path; dotted paths descend into nested objects.
fn lookup<'a>(doc: &'a Document, field: &str) -> Option<&'a Value> {
    let mut parts = field.split('.');
    let mut current = doc.fields.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn compare_field(doc: &Document, field: &str, value: &Value) -> Option<Ordering> {
    lookup(doc, field).and_then(|v| compare_values(v, value))
}

/// Compare two values of the same kind; `None` across kinds.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(
            match (parse_timestamp(x), parse_timestamp(y)) {
                (Some(tx), Some(ty)) => tx.cmp(&ty),
                _ => x.cmp(y),
            },
        ),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok()
}

/// Total order used for sorting: missing < null < bool < number
/// < timestamp string < plain string < array < object.
fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(s)) if parse_timestamp(s).is_some() => 4,
            Some(Value::String(_)) => 5,
            Some(Value::Array(_)) => 6,
            Some(Value::Object(_)) => 7,
        }
    }

    match rank(a).cmp(&rank(b)) {
        Ordering::Equal => match (a, b) {
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        tiers => tiers,
    }
}
