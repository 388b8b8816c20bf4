//! Collection queries: filters, ordering and page selection.
//!
//! Every backend evaluates queries through [`Query::select_page`], so paging
//! behaves the same regardless of where documents are stored.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::field_at;
use super::{DocumentData, QueryDocument, Reference};

/// Sort direction of one ordering clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    }
}

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    /// The field is an array holding the value.
    ArrayContains,
    /// The value is an array holding the field.
    In,
}

/// A single field predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn matches(&self, data: &DocumentData) -> bool {
        let Some(actual) = field_at(data, &self.field) else {
            return false;
        };
        let ordered = |accept: fn(Ordering) -> bool| {
            same_kind(actual, &self.value) && accept(compare_values(actual, &self.value))
        };

        match self.op {
            FilterOp::Eq => compare_values(actual, &self.value).is_eq(),
            FilterOp::NotEq => !actual.is_null() && compare_values(actual, &self.value).is_ne(),
            FilterOp::Lt => ordered(Ordering::is_lt),
            FilterOp::Le => ordered(Ordering::is_le),
            FilterOp::Gt => ordered(Ordering::is_gt),
            FilterOp::Ge => ordered(Ordering::is_ge),
            FilterOp::ArrayContains => actual.as_array().is_some_and(|items| {
                items
                    .iter()
                    .any(|item| compare_values(item, &self.value).is_eq())
            }),
            FilterOp::In => self.value.as_array().is_some_and(|candidates| {
                candidates
                    .iter()
                    .any(|candidate| compare_values(actual, candidate).is_eq())
            }),
        }
    }
}

/// One ordering clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Position of one row in query order: its ordered-field values plus its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageKey {
    pub values: Vec<Value>,
    pub id: String,
}

/// A filtered, ordered query over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: String,
    filters: Vec<Filter>,
    order_by: Vec<OrderBy>,
}

impl Query {
    /// Creates an unfiltered query over `collection`, ordered by document id.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: Vec::new(),
        }
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns true if the document belongs to the result set.
    ///
    /// Documents missing an ordered field are never part of the result.
    pub fn matches(&self, reference: &Reference, data: &DocumentData) -> bool {
        reference.collection() == self.collection
            && self
                .order_by
                .iter()
                .all(|order| field_at(data, &order.field).is_some())
            && self.filters.iter().all(|filter| filter.matches(data))
    }

    /// Builds the page key of a row.
    pub fn page_key(&self, id: &str, data: &DocumentData) -> PageKey {
        PageKey {
            values: self
                .order_by
                .iter()
                .map(|order| field_at(data, &order.field).cloned().unwrap_or(Value::Null))
                .collect(),
            id: id.to_string(),
        }
    }

    /// Compares two page keys in query order.
    ///
    /// Ties on every ordered field fall back to the document id, in the
    /// direction of the last ordering clause.
    pub fn compare_keys(&self, a: &PageKey, b: &PageKey) -> Ordering {
        for (index, order) in self.order_by.iter().enumerate() {
            let left = a.values.get(index).unwrap_or(&Value::Null);
            let right = b.values.get(index).unwrap_or(&Value::Null);
            let ordering = order.direction.apply(compare_values(left, right));
            if ordering.is_ne() {
                return ordering;
            }
        }

        let tie_break = self
            .order_by
            .last()
            .map_or(Direction::Ascending, |order| order.direction);
        tie_break.apply(a.id.cmp(&b.id))
    }

    /// Selects one page of results from a set of candidate documents.
    ///
    /// Candidates may include documents from other collections or documents
    /// that do not match; they are filtered out here. Rows are returned in
    /// query order, strictly after `start_after`, capped at `limit`.
    pub fn select_page<I>(
        &self,
        documents: I,
        start_after: Option<&PageKey>,
        limit: usize,
    ) -> Vec<QueryDocument>
    where
        I: IntoIterator<Item = (Reference, DocumentData)>,
    {
        let mut rows: Vec<QueryDocument> = documents
            .into_iter()
            .filter(|(reference, data)| self.matches(reference, data))
            .map(|(reference, data)| {
                let page_key = self.page_key(reference.id(), &data);
                QueryDocument {
                    reference,
                    data,
                    page_key,
                }
            })
            .collect();

        rows.sort_by(|a, b| self.compare_keys(&a.page_key, &b.page_key));

        rows.into_iter()
            .filter(|row| {
                start_after.is_none_or(|key| self.compare_keys(&row.page_key, key).is_gt())
            })
            .take(limit)
            .collect()
    }
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    kind_rank(a) == kind_rank(b)
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ordering = compare_values(left, right);
                if ordering.is_ne() {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, value: Value) -> (Reference, DocumentData) {
        (
            Reference::new("routes", id),
            value.as_object().cloned().unwrap(),
        )
    }

    fn ids(rows: &[QueryDocument]) -> Vec<&str> {
        rows.iter().map(|row| row.reference.id()).collect()
    }

    fn sample() -> Vec<(Reference, DocumentData)> {
        vec![
            doc("a", json!({ "created_at": 10, "setter": "users/bob", "tags": ["crimp"] })),
            doc("b", json!({ "created_at": 30, "setter": "users/bob", "tags": ["sloper"] })),
            doc("c", json!({ "created_at": 20, "setter": "users/carol" })),
            doc("d", json!({ "created_at": 30, "setter": "users/bob" })),
            doc("e", json!({ "setter": "users/bob" })),
        ]
    }

    #[test]
    fn test_compare_values_orders_kinds() {
        let ascending = [
            json!(null),
            json!(false),
            json!(true),
            json!(-3),
            json!(2.5),
            json!(7),
            json!("a"),
            json!("b"),
            json!([1]),
            json!([1, 2]),
            json!({}),
        ];
        for pair in ascending.windows(2) {
            assert_eq!(
                compare_values(&pair[0], &pair[1]),
                Ordering::Less,
                "{} < {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_descending_order_with_id_tie_break() {
        let query = Query::new("routes").order_by("created_at", Direction::Descending);

        let rows = query.select_page(sample(), None, 10);

        // "e" lacks created_at; b/d tie and break on id descending.
        assert_eq!(ids(&rows), vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn test_filters_apply() {
        let query = Query::new("routes")
            .where_eq("setter", "users/bob")
            .order_by("created_at", Direction::Ascending);

        let rows = query.select_page(sample(), None, 10);

        assert_eq!(ids(&rows), vec!["a", "b", "d"]);
    }

    #[test]
    fn test_array_contains_and_in() {
        let contains = Query::new("routes").filter("tags", FilterOp::ArrayContains, "crimp");
        assert_eq!(ids(&contains.select_page(sample(), None, 10)), vec!["a"]);

        let within = Query::new("routes").filter("created_at", FilterOp::In, json!([20, 30]));
        assert_eq!(ids(&within.select_page(sample(), None, 10)), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_range_filters_require_same_kind() {
        let query = Query::new("routes").filter("created_at", FilterOp::Gt, "10");
        assert!(query.select_page(sample(), None, 10).is_empty());

        let query = Query::new("routes").filter("created_at", FilterOp::Ge, 20);
        assert_eq!(ids(&query.select_page(sample(), None, 10)), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_start_after_resumes_strictly_after_key() {
        let query = Query::new("routes").order_by("created_at", Direction::Descending);

        let first = query.select_page(sample(), None, 2);
        assert_eq!(ids(&first), vec!["d", "b"]);

        let last_key = first.last().map(|row| row.page_key.clone());
        let second = query.select_page(sample(), last_key.as_ref(), 2);
        assert_eq!(ids(&second), vec!["c", "a"]);

        let last_key = second.last().map(|row| row.page_key.clone());
        assert!(query.select_page(sample(), last_key.as_ref(), 2).is_empty());
    }

    #[test]
    fn test_other_collections_are_ignored() {
        let mut documents = sample();
        documents.push((
            Reference::new("users", "z"),
            json!({ "created_at": 99 }).as_object().cloned().unwrap(),
        ));
        let query = Query::new("routes").order_by("created_at", Direction::Descending);

        let rows = query.select_page(documents, None, 10);

        assert_eq!(ids(&rows), vec!["d", "b", "c", "a"]);
    }
}
