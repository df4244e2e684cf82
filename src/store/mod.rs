//! Entity store contract: filtered queries, eager relation loading and atomic transactions.
//!
//! Records travel as JSON objects keyed by column name, with included relations attached
//! under the include name. Callers decode them into typed models.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::StoreError;
use crate::schema::EntityKind;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Column values for a create or update, keyed by column name.
pub type Record = Map<String, Value>;

pub type StoreResult<T> = Result<T, StoreError>;

/// One predicate on a column. Conditions in a [`Filter`] are combined with AND.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Eq(&'static str, Value),
    /// Not equal; a NULL column counts as different.
    Ne(&'static str, Value),
    EqIgnoreCase(&'static str, String),
    /// Case-insensitive substring match.
    Contains(&'static str, String),
    Gte(&'static str, Value),
    /// Strictly less; paired with `Gte` for half-open ranges.
    Lt(&'static str, Value),
    In(&'static str, Vec<Value>),
    /// OR over the nested conditions. Empty means no constraint.
    Any(Vec<Condition>),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// A relation to load with each record, optionally with its own nested relations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Include {
    pub name: &'static str,
    pub nested: Vec<Include>,
}

impl Include {
    pub fn new(name: &'static str) -> Self {
        Include {
            name,
            nested: Vec::new(),
        }
    }

    pub fn with(mut self, nested: Include) -> Self {
        self.nested.push(nested);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub column: &'static str,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: &'static str) -> Self {
        OrderBy {
            column,
            descending: false,
        }
    }

    pub fn desc(column: &'static str) -> Self {
        OrderBy {
            column,
            descending: true,
        }
    }
}

/// Parameters of a bounded fetch. Rows are ordered by each `order_by` key in turn, then by
/// ascending id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindMany {
    pub filter: Filter,
    pub includes: Vec<Include>,
    pub offset: u64,
    pub limit: Option<u64>,
    pub order_by: Vec<OrderBy>,
}

impl FindMany {
    pub fn new(filter: Filter) -> Self {
        FindMany {
            filter,
            ..FindMany::default()
        }
    }

    pub fn includes(mut self, includes: Vec<Include>) -> Self {
        self.includes = includes;
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add a sort key after any already given.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn count(&self, kind: EntityKind, filter: &Filter) -> StoreResult<u64>;

    async fn find_many(&self, kind: EntityKind, query: &FindMany) -> StoreResult<Vec<Value>>;

    async fn find_one(
        &self,
        kind: EntityKind,
        id: i64,
        includes: &[Include],
    ) -> StoreResult<Option<Value>>;

    /// Insert one row and return it with `includes` loaded.
    async fn create(&self, kind: EntityKind, data: &Record, includes: &[Include]) -> StoreResult<Value>;

    /// Partial update; only columns present in `data` are written. `None` if the id does not exist.
    async fn update(
        &self,
        kind: EntityKind,
        id: i64,
        data: &Record,
        includes: &[Include],
    ) -> StoreResult<Option<Value>>;

    /// Delete by id, returning the removed row. `None` if the id does not exist.
    async fn delete(&self, kind: EntityKind, id: i64) -> StoreResult<Option<Value>>;

    /// Start a transaction. Dropping it without [`StoreTransaction::commit`] rolls back.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;

    /// Cheap round-trip used by readiness checks.
    async fn ping(&self) -> StoreResult<()>;
}

/// The same operations as [`EntityStore`], executed as one atomic unit.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn count(&mut self, kind: EntityKind, filter: &Filter) -> StoreResult<u64>;

    async fn find_many(&mut self, kind: EntityKind, query: &FindMany) -> StoreResult<Vec<Value>>;

    async fn find_one(
        &mut self,
        kind: EntityKind,
        id: i64,
        includes: &[Include],
    ) -> StoreResult<Option<Value>>;

    async fn create(
        &mut self,
        kind: EntityKind,
        data: &Record,
        includes: &[Include],
    ) -> StoreResult<Value>;

    async fn update(
        &mut self,
        kind: EntityKind,
        id: i64,
        data: &Record,
        includes: &[Include],
    ) -> StoreResult<Option<Value>>;

    async fn delete(&mut self, kind: EntityKind, id: i64) -> StoreResult<Option<Value>>;

    /// Delete every row matching `filter`; returns the number of rows removed.
    async fn delete_where(&mut self, kind: EntityKind, filter: &Filter) -> StoreResult<u64>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Escape `%`, `_` and `\` so a search term matches literally inside LIKE patterns.
pub(crate) fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builders_compose() {
        let query = FindMany::new(Filter::new().and(Condition::Eq("pet_id", json!(4))))
            .includes(vec![Include::new("pet").with(Include::new("owner"))])
            .offset(20)
            .limit(10)
            .order_by(OrderBy::desc("date"));
        assert_eq!(query.filter.conditions.len(), 1);
        assert_eq!(query.includes[0].nested[0].name, "owner");
        assert_eq!(query.limit, Some(10));
        assert!(query.order_by[0].descending);
    }

    #[test]
    fn like_escaping() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("Rex"), "Rex");
    }
}
