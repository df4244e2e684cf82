//! PostgreSQL entity store over a sqlx pool. Each operation is a single statement; relations
//! are loaded by the statement itself, so there are no follow-up queries per row.

use super::{EntityStore, Filter, FindMany, Include, Record, StoreResult, StoreTransaction};
use crate::error::StoreError;
use crate::schema::{column_for_unique_constraint, foreign_key_for_constraint, EntityKind};
use crate::sql::{self, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::error::ErrorKind;
use sqlx::postgres::{PgDatabaseError, PgPool, Postgres};
use sqlx::{Executor, Row, Transaction};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

/// A transaction on one pooled connection. Dropped without commit, sqlx rolls it back.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Op {
    Write,
    Delete,
}

/// Classify constraint violations by SQLSTATE and constraint name.
fn map_db_error(err: sqlx::Error, op: Op) -> StoreError {
    let sqlx::Error::Database(db) = &err else {
        return StoreError::Db(err);
    };
    match db.kind() {
        ErrorKind::UniqueViolation => {
            let constraint = db.constraint().unwrap_or_default().to_string();
            let column = column_for_unique_constraint(&constraint).map(str::to_string);
            StoreError::UniqueViolation { constraint, column }
        }
        ErrorKind::ForeignKeyViolation => {
            let fk = db.constraint().and_then(foreign_key_for_constraint);
            match (op, fk) {
                (Op::Delete, Some((table, _))) => StoreError::StillReferenced(table.to_string()),
                (Op::Delete, None) => StoreError::StillReferenced("other records".into()),
                (Op::Write, Some((_, column))) => StoreError::MissingReference(column.to_string()),
                (Op::Write, None) => StoreError::MissingReference("record".into()),
            }
        }
        ErrorKind::NotNullViolation => {
            let column = db
                .try_downcast_ref::<PgDatabaseError>()
                .and_then(|e| e.column())
                .unwrap_or("value")
                .to_string();
            StoreError::NotNull(column)
        }
        _ => StoreError::Db(err),
    }
}

async fn fetch_rows<'c, E>(exec: E, q: &QueryBuf) -> Result<Vec<Value>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    tracing::debug!(sql = %q.sql, params = q.params.len(), "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    let rows = query.fetch_all(exec).await?;
    rows.iter().map(|r| r.try_get::<Value, _>("row")).collect()
}

async fn fetch_count<'c, E>(exec: E, q: &QueryBuf) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    tracing::debug!(sql = %q.sql, params = q.params.len(), "count");
    let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    let n = query.fetch_one(exec).await?;
    Ok(n.max(0) as u64)
}

async fn count_on<'c, E>(exec: E, kind: EntityKind, filter: &Filter) -> StoreResult<u64>
where
    E: Executor<'c, Database = Postgres>,
{
    Ok(fetch_count(exec, &sql::count(kind.def(), filter)).await?)
}

async fn find_many_on<'c, E>(exec: E, kind: EntityKind, query: &FindMany) -> StoreResult<Vec<Value>>
where
    E: Executor<'c, Database = Postgres>,
{
    let q = sql::select_many(kind.def(), query)?;
    Ok(fetch_rows(exec, &q).await?)
}

async fn find_one_on<'c, E>(
    exec: E,
    kind: EntityKind,
    id: i64,
    includes: &[Include],
) -> StoreResult<Option<Value>>
where
    E: Executor<'c, Database = Postgres>,
{
    let q = sql::select_by_id(kind.def(), id, includes)?;
    Ok(fetch_rows(exec, &q).await?.into_iter().next())
}

async fn create_on<'c, E>(exec: E, kind: EntityKind, data: &Record, includes: &[Include]) -> StoreResult<Value>
where
    E: Executor<'c, Database = Postgres>,
{
    let q = sql::insert(kind.def(), data, includes)?;
    let rows = fetch_rows(exec, &q)
        .await
        .map_err(|e| map_db_error(e, Op::Write))?;
    rows.into_iter()
        .next()
        .ok_or_else(|| StoreError::Decode(format!("insert into {} returned no row", kind.table_name())))
}

async fn update_on<'c, E>(
    exec: E,
    kind: EntityKind,
    id: i64,
    data: &Record,
    includes: &[Include],
) -> StoreResult<Option<Value>>
where
    E: Executor<'c, Database = Postgres>,
{
    let q = sql::update(kind.def(), id, data, includes)?;
    let rows = fetch_rows(exec, &q)
        .await
        .map_err(|e| map_db_error(e, Op::Write))?;
    Ok(rows.into_iter().next())
}

async fn delete_on<'c, E>(exec: E, kind: EntityKind, id: i64) -> StoreResult<Option<Value>>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = fetch_rows(exec, &sql::delete(kind.def(), id))
        .await
        .map_err(|e| map_db_error(e, Op::Delete))?;
    Ok(rows.into_iter().next())
}

#[async_trait]
impl EntityStore for PgStore {
    async fn count(&self, kind: EntityKind, filter: &Filter) -> StoreResult<u64> {
        count_on(&self.pool, kind, filter).await
    }

    async fn find_many(&self, kind: EntityKind, query: &FindMany) -> StoreResult<Vec<Value>> {
        find_many_on(&self.pool, kind, query).await
    }

    async fn find_one(&self, kind: EntityKind, id: i64, includes: &[Include]) -> StoreResult<Option<Value>> {
        find_one_on(&self.pool, kind, id, includes).await
    }

    async fn create(&self, kind: EntityKind, data: &Record, includes: &[Include]) -> StoreResult<Value> {
        create_on(&self.pool, kind, data, includes).await
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: i64,
        data: &Record,
        includes: &[Include],
    ) -> StoreResult<Option<Value>> {
        update_on(&self.pool, kind, id, data, includes).await
    }

    async fn delete(&self, kind: EntityKind, id: i64) -> StoreResult<Option<Value>> {
        delete_on(&self.pool, kind, id).await
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn count(&mut self, kind: EntityKind, filter: &Filter) -> StoreResult<u64> {
        count_on(&mut *self.tx, kind, filter).await
    }

    async fn find_many(&mut self, kind: EntityKind, query: &FindMany) -> StoreResult<Vec<Value>> {
        find_many_on(&mut *self.tx, kind, query).await
    }

    async fn find_one(&mut self, kind: EntityKind, id: i64, includes: &[Include]) -> StoreResult<Option<Value>> {
        find_one_on(&mut *self.tx, kind, id, includes).await
    }

    async fn create(&mut self, kind: EntityKind, data: &Record, includes: &[Include]) -> StoreResult<Value> {
        create_on(&mut *self.tx, kind, data, includes).await
    }

    async fn update(
        &mut self,
        kind: EntityKind,
        id: i64,
        data: &Record,
        includes: &[Include],
    ) -> StoreResult<Option<Value>> {
        update_on(&mut *self.tx, kind, id, data, includes).await
    }

    async fn delete(&mut self, kind: EntityKind, id: i64) -> StoreResult<Option<Value>> {
        delete_on(&mut *self.tx, kind, id).await
    }

    async fn delete_where(&mut self, kind: EntityKind, filter: &Filter) -> StoreResult<u64> {
        fetch_count(&mut *self.tx, &sql::delete_where(kind.def(), filter))
            .await
            .map_err(|e| map_db_error(e, Op::Delete))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
