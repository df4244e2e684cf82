//! In-memory entity store with the same semantics as the PostgreSQL one: typed column
//! coercion, foreign keys without cascade, unique columns, the appointment slot index and
//! nested includes. A transaction holds the table lock and works on a copy that replaces
//! the tables on commit, so an uncommitted transaction leaves no trace.
//!
//! While a transaction is open every other operation on the store waits for it.

use super::{
    Condition, EntityStore, Filter, FindMany, Include, OrderBy, Record, StoreResult, StoreTransaction,
};
use crate::dates::{parse_day, parse_instant};
use crate::error::StoreError;
use crate::schema::{
    unique_constraint_name, ColumnInfo, EntityKind, APPOINTMENT_SLOT_INDEX, CREATED_AT, PRIMARY_KEY,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[derive(Clone, Debug, Default)]
struct Tables {
    rows: HashMap<EntityKind, BTreeMap<i64, Record>>,
    last_id: HashMap<EntityKind, i64>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ValueClass {
    Integer,
    Decimal,
    Instant,
    Date,
    Text,
}

fn class_of(column: &ColumnInfo) -> ValueClass {
    match column.pg_type {
        "int8" | "int4" | "int2" => ValueClass::Integer,
        t if t.starts_with("numeric") || t == "float8" => ValueClass::Decimal,
        "timestamptz" | "timestamp" => ValueClass::Instant,
        "date" => ValueClass::Date,
        _ => ValueClass::Text,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Convert an incoming value to the stored shape of the column, as PostgreSQL's cast would.
fn coerce(column: &ColumnInfo, v: &Value) -> StoreResult<Value> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let invalid = || StoreError::Decode(format!("invalid {} value for {}", column.pg_type, column.name));
    let out = match class_of(column) {
        ValueClass::Integer => match v {
            Value::Number(n) if n.is_i64() => v.clone(),
            Value::String(s) => Value::from(s.trim().parse::<i64>().map_err(|_| invalid())?),
            _ => return Err(invalid()),
        },
        ValueClass::Decimal => {
            let n = as_f64(v).and_then(Number::from_f64).ok_or_else(invalid)?;
            Value::Number(n)
        }
        ValueClass::Instant => {
            let dt = v.as_str().and_then(parse_instant).ok_or_else(invalid)?;
            Value::String(dt.to_rfc3339())
        }
        ValueClass::Date => {
            let d = v.as_str().and_then(parse_day).ok_or_else(invalid)?;
            Value::String(d.format("%Y-%m-%d").to_string())
        }
        ValueClass::Text => Value::String(text_of(v).ok_or_else(invalid)?),
    };
    Ok(out)
}

/// Value of a column default expression, or NULL.
fn default_value(column: &ColumnInfo) -> Value {
    match column.default {
        Some("NOW()") => Value::String(Utc::now().to_rfc3339()),
        Some(expr) if expr.starts_with('\'') => Value::String(expr.trim_matches('\'').to_string()),
        Some(expr) => expr
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        None => Value::Null,
    }
}

fn compare(column: &ColumnInfo, a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    match class_of(column) {
        ValueClass::Integer | ValueClass::Decimal => as_f64(a)?.partial_cmp(&as_f64(b)?),
        ValueClass::Instant => Some(parse_instant(a.as_str()?)?.cmp(&parse_instant(b.as_str()?)?)),
        ValueClass::Date => Some(parse_day(a.as_str()?)?.cmp(&parse_day(b.as_str()?)?)),
        ValueClass::Text => Some(text_of(a)?.cmp(&text_of(b)?)),
    }
}

fn same(column: &ColumnInfo, a: &Value, b: &Value) -> bool {
    compare(column, a, b) == Some(Ordering::Equal)
}

static NULL: Value = Value::Null;

fn field<'r>(kind: EntityKind, row: &'r Record, col: &str) -> Option<(&'static ColumnInfo, &'r Value)> {
    let column = kind.def().column(col)?;
    Some((column, row.get(col).unwrap_or(&NULL)))
}

/// `None` when the condition names an unknown column and is ignored.
fn eval(kind: EntityKind, row: &Record, cond: &Condition) -> Option<bool> {
    let result = match cond {
        Condition::Eq(col, Value::Null) => field(kind, row, col)?.1.is_null(),
        Condition::Eq(col, v) => {
            let (c, cur) = field(kind, row, col)?;
            same(c, cur, v)
        }
        Condition::Ne(col, v) => {
            let (c, cur) = field(kind, row, col)?;
            match (cur.is_null(), v.is_null()) {
                (true, true) => false,
                (true, false) | (false, true) => true,
                (false, false) => !same(c, cur, v),
            }
        }
        Condition::EqIgnoreCase(col, s) => {
            let (_, cur) = field(kind, row, col)?;
            text_of(cur).is_some_and(|t| t.to_lowercase() == s.to_lowercase())
        }
        Condition::Contains(col, s) => {
            let (_, cur) = field(kind, row, col)?;
            text_of(cur).is_some_and(|t| t.to_lowercase().contains(&s.to_lowercase()))
        }
        Condition::Gte(col, v) => {
            let (c, cur) = field(kind, row, col)?;
            matches!(compare(c, cur, v), Some(Ordering::Greater | Ordering::Equal))
        }
        Condition::Lt(col, v) => {
            let (c, cur) = field(kind, row, col)?;
            compare(c, cur, v) == Some(Ordering::Less)
        }
        Condition::In(col, values) => {
            let (c, cur) = field(kind, row, col)?;
            values.iter().any(|v| same(c, cur, v))
        }
        Condition::Any(conds) => {
            let outcomes: Vec<bool> = conds.iter().filter_map(|c| eval(kind, row, c)).collect();
            if outcomes.is_empty() {
                return None;
            }
            outcomes.into_iter().any(|b| b)
        }
    };
    Some(result)
}

fn matches(kind: EntityKind, row: &Record, filter: &Filter) -> bool {
    filter
        .conditions
        .iter()
        .all(|c| eval(kind, row, c).unwrap_or(true))
}

fn id_of(row: &Record) -> Option<i64> {
    row.get(PRIMARY_KEY).and_then(Value::as_i64)
}

impl Tables {
    fn rows_of(&self, kind: EntityKind) -> impl Iterator<Item = &Record> {
        self.rows.get(&kind).into_iter().flat_map(|t| t.values())
    }

    fn get(&self, kind: EntityKind, id: i64) -> Option<&Record> {
        self.rows.get(&kind).and_then(|t| t.get(&id))
    }

    fn count(&self, kind: EntityKind, filter: &Filter) -> u64 {
        self.rows_of(kind).filter(|r| matches(kind, r, filter)).count() as u64
    }

    fn find_many(&self, kind: EntityKind, query: &FindMany) -> StoreResult<Vec<Value>> {
        let mut rows: Vec<&Record> = self
            .rows_of(kind)
            .filter(|r| matches(kind, r, &query.filter))
            .collect();
        let keys: Vec<(&OrderBy, &ColumnInfo)> = query
            .order_by
            .iter()
            .filter_map(|o| kind.def().column(o.column).map(|c| (o, c)))
            .collect();
        if !keys.is_empty() {
            rows.sort_by(|a, b| {
                keys.iter()
                    .map(|(order, column)| {
                        let av = a.get(order.column).unwrap_or(&NULL);
                        let bv = b.get(order.column).unwrap_or(&NULL);
                        // NULLs sort as the largest value, as in PostgreSQL.
                        let ord = match (av.is_null(), bv.is_null()) {
                            (true, true) => Ordering::Equal,
                            (true, false) => Ordering::Greater,
                            (false, true) => Ordering::Less,
                            (false, false) => compare(column, av, bv).unwrap_or(Ordering::Equal),
                        };
                        if order.descending {
                            ord.reverse()
                        } else {
                            ord
                        }
                    })
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        rows.into_iter()
            .skip(query.offset as usize)
            .take(limit)
            .map(|r| self.attach(kind, r, &query.includes))
            .collect()
    }

    fn find_one(&self, kind: EntityKind, id: i64, includes: &[Include]) -> StoreResult<Option<Value>> {
        self.get(kind, id)
            .map(|r| self.attach(kind, r, includes))
            .transpose()
    }

    /// The record as JSON with each include attached under its name.
    fn attach(&self, kind: EntityKind, row: &Record, includes: &[Include]) -> StoreResult<Value> {
        let def = kind.def();
        let mut out = row.clone();
        for inc in includes {
            let rel = def.include(inc.name).ok_or_else(|| StoreError::UnknownRelation {
                table: def.table_name,
                relation: inc.name.to_string(),
            })?;
            let key = row.get(rel.our_key_column).and_then(Value::as_i64);
            let mut related = self.rows_of(rel.related).filter(|r| {
                key.is_some() && r.get(rel.their_key_column).and_then(Value::as_i64) == key
            });
            let value = match rel.direction {
                crate::schema::IncludeDirection::ToOne => match related.next() {
                    Some(r) => self.attach(rel.related, r, &inc.nested)?,
                    None => Value::Null,
                },
                crate::schema::IncludeDirection::ToMany => Value::Array(
                    related
                        .map(|r| self.attach(rel.related, r, &inc.nested))
                        .collect::<StoreResult<Vec<_>>>()?,
                ),
            };
            out.insert(inc.name.to_string(), value);
        }
        Ok(Value::Object(out))
    }

    fn check_references(&self, kind: EntityKind, row: &Record) -> StoreResult<()> {
        for fk in kind.def().foreign_keys {
            let value = row.get(fk.column).unwrap_or(&NULL);
            if value.is_null() {
                continue;
            }
            let exists = value
                .as_i64()
                .is_some_and(|id| self.get(fk.references, id).is_some());
            if !exists {
                return Err(StoreError::MissingReference(fk.column.to_string()));
            }
        }
        Ok(())
    }

    fn check_unique(&self, kind: EntityKind, id: i64, row: &Record) -> StoreResult<()> {
        let def = kind.def();
        for col in def.unique {
            let value = row.get(*col).unwrap_or(&NULL);
            if value.is_null() {
                continue;
            }
            let taken = self
                .rows_of(kind)
                .any(|r| id_of(r) != Some(id) && r.get(*col) == Some(value));
            if taken {
                return Err(StoreError::UniqueViolation {
                    constraint: unique_constraint_name(def.table_name, col),
                    column: Some(col.to_string()),
                });
            }
        }
        if kind == EntityKind::Appointment {
            self.check_slot(id, row)?;
        }
        Ok(())
    }

    /// One non-cancelled appointment per vet, UTC day and time slot.
    fn check_slot(&self, id: i64, row: &Record) -> StoreResult<()> {
        let active = |r: &Record| r.get("status").and_then(Value::as_str) != Some("cancelled");
        let day = |r: &Record| {
            r.get("date")
                .and_then(Value::as_str)
                .and_then(parse_instant)
                .map(|dt| dt.date_naive())
        };
        if !active(row) {
            return Ok(());
        }
        let clash = self.rows_of(EntityKind::Appointment).any(|other| {
            id_of(other) != Some(id)
                && active(other)
                && other.get("vet_id") == row.get("vet_id")
                && other.get("time_slot") == row.get("time_slot")
                && day(other) == day(row)
        });
        if clash {
            return Err(StoreError::UniqueViolation {
                constraint: APPOINTMENT_SLOT_INDEX.to_string(),
                column: None,
            });
        }
        Ok(())
    }

    fn check_not_referenced(&self, kind: EntityKind, id: i64) -> StoreResult<()> {
        for child in EntityKind::ALL {
            for fk in child.def().foreign_keys.iter().filter(|fk| fk.references == kind) {
                let referenced = self
                    .rows_of(child)
                    .any(|r| r.get(fk.column).and_then(Value::as_i64) == Some(id));
                if referenced {
                    return Err(StoreError::StillReferenced(child.table_name().to_string()));
                }
            }
        }
        Ok(())
    }

    fn write_column(row: &mut Record, column: &ColumnInfo, value: &Value) -> StoreResult<()> {
        let value = coerce(column, value)?;
        if value.is_null() && !column.nullable {
            return Err(StoreError::NotNull(column.name.to_string()));
        }
        row.insert(column.name.to_string(), value);
        Ok(())
    }

    fn create(&mut self, kind: EntityKind, data: &Record, includes: &[Include]) -> StoreResult<Value> {
        let def = kind.def();
        let id = self.last_id.get(&kind).copied().unwrap_or(0) + 1;
        let mut row = Record::new();
        row.insert(PRIMARY_KEY.to_string(), Value::from(id));
        for column in def.writable_columns() {
            let value = data.get(column.name).cloned().unwrap_or_else(|| default_value(column));
            Self::write_column(&mut row, column, &value)?;
        }
        row.insert(CREATED_AT.to_string(), Value::String(Utc::now().to_rfc3339()));
        self.check_references(kind, &row)?;
        self.check_unique(kind, id, &row)?;
        let out = self.attach(kind, &row, includes)?;
        self.last_id.insert(kind, id);
        self.rows.entry(kind).or_default().insert(id, row);
        Ok(out)
    }

    fn update(
        &mut self,
        kind: EntityKind,
        id: i64,
        data: &Record,
        includes: &[Include],
    ) -> StoreResult<Option<Value>> {
        let Some(mut row) = self.get(kind, id).cloned() else {
            return Ok(None);
        };
        for column in kind.def().writable_columns() {
            if let Some(value) = data.get(column.name) {
                Self::write_column(&mut row, column, value)?;
            }
        }
        self.check_references(kind, &row)?;
        self.check_unique(kind, id, &row)?;
        self.rows.entry(kind).or_default().insert(id, row);
        self.find_one(kind, id, includes)
    }

    fn delete(&mut self, kind: EntityKind, id: i64) -> StoreResult<Option<Value>> {
        if self.get(kind, id).is_none() {
            return Ok(None);
        }
        self.check_not_referenced(kind, id)?;
        Ok(self
            .rows
            .get_mut(&kind)
            .and_then(|t| t.remove(&id))
            .map(Value::Object))
    }

    fn delete_where(&mut self, kind: EntityKind, filter: &Filter) -> StoreResult<u64> {
        let ids: Vec<i64> = self
            .rows_of(kind)
            .filter(|r| matches(kind, r, filter))
            .filter_map(id_of)
            .collect();
        for id in &ids {
            self.check_not_referenced(kind, *id)?;
        }
        if let Some(table) = self.rows.get_mut(&kind) {
            for id in &ids {
                table.remove(id);
            }
        }
        Ok(ids.len() as u64)
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn count(&self, kind: EntityKind, filter: &Filter) -> StoreResult<u64> {
        Ok(self.tables.lock().await.count(kind, filter))
    }

    async fn find_many(&self, kind: EntityKind, query: &FindMany) -> StoreResult<Vec<Value>> {
        self.tables.lock().await.find_many(kind, query)
    }

    async fn find_one(&self, kind: EntityKind, id: i64, includes: &[Include]) -> StoreResult<Option<Value>> {
        self.tables.lock().await.find_one(kind, id, includes)
    }

    async fn create(&self, kind: EntityKind, data: &Record, includes: &[Include]) -> StoreResult<Value> {
        let mut tables = self.tables.lock().await;
        // Work on a copy so a failed insert leaves nothing behind.
        let mut working = tables.clone();
        let out = working.create(kind, data, includes)?;
        *tables = working;
        Ok(out)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: i64,
        data: &Record,
        includes: &[Include],
    ) -> StoreResult<Option<Value>> {
        let mut tables = self.tables.lock().await;
        let mut working = tables.clone();
        let out = working.update(kind, id, data, includes)?;
        *tables = working;
        Ok(out)
    }

    async fn delete(&self, kind: EntityKind, id: i64) -> StoreResult<Option<Value>> {
        self.tables.lock().await.delete(kind, id)
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn count(&mut self, kind: EntityKind, filter: &Filter) -> StoreResult<u64> {
        Ok(self.working.count(kind, filter))
    }

    async fn find_many(&mut self, kind: EntityKind, query: &FindMany) -> StoreResult<Vec<Value>> {
        self.working.find_many(kind, query)
    }

    async fn find_one(&mut self, kind: EntityKind, id: i64, includes: &[Include]) -> StoreResult<Option<Value>> {
        self.working.find_one(kind, id, includes)
    }

    async fn create(&mut self, kind: EntityKind, data: &Record, includes: &[Include]) -> StoreResult<Value> {
        self.working.create(kind, data, includes)
    }

    async fn update(
        &mut self,
        kind: EntityKind,
        id: i64,
        data: &Record,
        includes: &[Include],
    ) -> StoreResult<Option<Value>> {
        self.working.update(kind, id, data, includes)
    }

    async fn delete(&mut self, kind: EntityKind, id: i64) -> StoreResult<Option<Value>> {
        self.working.delete(kind, id)
    }

    async fn delete_where(&mut self, kind: EntityKind, filter: &Filter) -> StoreResult<u64> {
        self.working.delete_where(kind, filter)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create(
                EntityKind::Owner,
                &record(json!({"first_name": "Ona", "last_name": "Kairė", "email": "ona@example.com"})),
                &[],
            )
            .await
            .unwrap();
        store
            .create(
                EntityKind::Pet,
                &record(json!({"name": "Rex", "species": "Šuo", "owner_id": "1", "birth_date": "2020-06-01"})),
                &[],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn create_coerces_columns_and_applies_defaults() {
        let store = seeded().await;
        let pet = store
            .find_one(EntityKind::Pet, 1, &[Include::new("owner")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pet["owner_id"], json!(1));
        assert_eq!(pet["breed"], Value::Null);
        assert_eq!(pet["owner"]["first_name"], json!("Ona"));
        assert!(pet["created_at"].as_str().is_some());

        let service = store
            .create(EntityKind::Service, &record(json!({"name": "Checkup"})), &[])
            .await
            .unwrap();
        assert_eq!(service["price"].as_f64(), Some(0.0));
    }

    #[tokio::test]
    async fn foreign_keys_and_unique_columns_are_enforced() {
        let store = seeded().await;
        let err = store
            .create(
                EntityKind::Pet,
                &record(json!({"name": "Tom", "species": "cat", "owner_id": 42})),
                &[],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingReference(ref c) if c == "owner_id"));

        let err = store
            .create(
                EntityKind::Owner,
                &record(json!({"first_name": "A", "last_name": "B", "email": "ona@example.com"})),
                &[],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { column: Some(ref c), .. } if c == "email"));

        let err = store.delete(EntityKind::Owner, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::StillReferenced(ref t) if t == "pets"));
        assert_eq!(store.count(EntityKind::Owner, &Filter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn filters_match_case_insensitively_and_skip_empty_any() {
        let store = seeded().await;
        let filter = Filter::new()
            .and(Condition::EqIgnoreCase("species", "šuo".into()))
            .and(Condition::Any(vec![]));
        assert_eq!(store.count(EntityKind::Pet, &filter).await.unwrap(), 1);
        let filter = Filter::new().and(Condition::Contains("name", "EX".into()));
        assert_eq!(store.count(EntityKind::Pet, &filter).await.unwrap(), 1);
        let filter = Filter::new().and(Condition::In("id", vec![]));
        assert_eq!(store.count(EntityKind::Pet, &filter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn uncommitted_transaction_rolls_back() {
        let store = seeded().await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.create(
                EntityKind::Pet,
                &record(json!({"name": "Tom", "species": "cat", "owner_id": 1})),
                &[],
            )
            .await
            .unwrap();
            assert_eq!(tx.count(EntityKind::Pet, &Filter::new()).await.unwrap(), 2);
        }
        assert_eq!(store.count(EntityKind::Pet, &Filter::new()).await.unwrap(), 1);

        let mut tx = store.begin().await.unwrap();
        tx.create(
            EntityKind::Pet,
            &record(json!({"name": "Tom", "species": "cat", "owner_id": 1})),
            &[],
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.count(EntityKind::Pet, &Filter::new()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn ordering_puts_nulls_last_and_pages() {
        let store = seeded().await;
        for name in ["Bo", "Al"] {
            store
                .create(
                    EntityKind::Pet,
                    &record(json!({"name": name, "species": "cat", "owner_id": 1})),
                    &[],
                )
                .await
                .unwrap();
        }
        let rows = store
            .find_many(
                EntityKind::Pet,
                &FindMany::new(Filter::new()).order_by(OrderBy::asc("birth_date")).limit(2),
            )
            .await
            .unwrap();
        assert_eq!(rows[0]["name"], json!("Rex"));
        assert_eq!(rows[1]["name"], json!("Bo"));
        assert_eq!(rows.len(), 2);
    }
}
