//! Builds parameterized SELECT, COUNT, INSERT, UPDATE and DELETE statements from an entity
//! definition. Every statement that returns rows yields one JSON column named `row`, with
//! requested relations attached as nested JSON by correlated sub-selects.

use crate::error::StoreError;
use crate::schema::{EntityDef, IncludeDirection, PRIMARY_KEY};
use crate::store::{escape_like, Condition, Filter, FindMany, Include, OrderBy, Record};
use serde_json::Value;

const MAIN_ALIAS: &str = "main";

/// Quote identifier for PostgreSQL (identifiers only ever come from the static schema).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn column_ref(alias: &str, column: &str) -> String {
    format!("{}.{}", alias, quoted(column))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
    aliases: u32,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf::default()
    }

    fn push_param(&mut self, v: Value) -> u32 {
        self.params.push(v);
        self.params.len() as u32
    }

    /// Placeholder cast to `pg_type`, e.g. `$3::timestamptz`.
    fn typed(&mut self, v: Value, pg_type: &str) -> String {
        let n = self.push_param(v);
        format!("${}::{}", n, pg_type)
    }

    fn next_alias(&mut self) -> String {
        self.aliases += 1;
        format!("t{}", self.aliases)
    }
}

fn condition_sql(def: &EntityDef, alias: &str, cond: &Condition, q: &mut QueryBuf) -> Option<String> {
    let typed = |col: &str| def.column(col).map(|c| c.pg_type);
    match cond {
        Condition::Eq(col, Value::Null) => {
            typed(col)?;
            Some(format!("{} IS NULL", column_ref(alias, col)))
        }
        Condition::Eq(col, v) => {
            let ty = typed(col)?;
            let ph = q.typed(v.clone(), ty);
            Some(format!("{} = {}", column_ref(alias, col), ph))
        }
        Condition::Ne(col, v) => {
            let ty = typed(col)?;
            let ph = q.typed(v.clone(), ty);
            Some(format!("{} IS DISTINCT FROM {}", column_ref(alias, col), ph))
        }
        Condition::EqIgnoreCase(col, s) => {
            typed(col)?;
            let ph = q.typed(Value::String(s.clone()), "text");
            Some(format!("LOWER({}) = LOWER({})", column_ref(alias, col), ph))
        }
        Condition::Contains(col, s) => {
            typed(col)?;
            let ph = q.typed(Value::String(format!("%{}%", escape_like(s))), "text");
            Some(format!("{} ILIKE {}", column_ref(alias, col), ph))
        }
        Condition::Gte(col, v) | Condition::Lt(col, v) => {
            let ty = typed(col)?;
            let op = if matches!(cond, Condition::Gte(..)) { ">=" } else { "<" };
            let ph = q.typed(v.clone(), ty);
            Some(format!("{} {} {}", column_ref(alias, col), op, ph))
        }
        Condition::In(col, values) => {
            let ty = typed(col)?;
            if values.is_empty() {
                return Some("FALSE".into());
            }
            let phs: Vec<String> = values.iter().map(|v| q.typed(v.clone(), ty)).collect();
            Some(format!("{} IN ({})", column_ref(alias, col), phs.join(", ")))
        }
        Condition::Any(conds) => {
            let parts: Vec<String> = conds
                .iter()
                .filter_map(|c| condition_sql(def, alias, c, q))
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(format!("({})", parts.join(" OR ")))
            }
        }
    }
}

/// ` WHERE ...` for the filter, or empty. Conditions on unknown columns are skipped.
fn where_clause(def: &EntityDef, alias: &str, filter: &Filter, q: &mut QueryBuf) -> String {
    let parts: Vec<String> = filter
        .conditions
        .iter()
        .filter_map(|c| condition_sql(def, alias, c, q))
        .collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// Known sort columns in order, then the primary key. Unknown columns are skipped.
fn order_clause(def: &EntityDef, alias: &str, order: &[OrderBy]) -> String {
    let mut keys: Vec<String> = order
        .iter()
        .filter(|o| def.column(o.column).is_some())
        .map(|o| {
            format!(
                "{} {}",
                column_ref(alias, o.column),
                if o.descending { "DESC" } else { "ASC" }
            )
        })
        .collect();
    keys.push(column_ref(alias, PRIMARY_KEY));
    format!(" ORDER BY {}", keys.join(", "))
}

/// One `(<sub-select>) AS "name"` column per include; nested includes recurse.
fn include_columns(
    def: &EntityDef,
    includes: &[Include],
    parent_alias: &str,
    q: &mut QueryBuf,
) -> Result<Vec<String>, StoreError> {
    let mut out = Vec::with_capacity(includes.len());
    for inc in includes {
        let rel = def.include(inc.name).ok_or_else(|| StoreError::UnknownRelation {
            table: def.table_name,
            relation: inc.name.to_string(),
        })?;
        let related = rel.related.def();
        let alias = q.next_alias();
        let mut cols = vec![format!("{}.*", alias)];
        cols.extend(include_columns(related, &inc.nested, &alias, q)?);
        let inner = format!(
            "SELECT {} FROM {} {} WHERE {} = {}",
            cols.join(", "),
            quoted(related.table_name),
            alias,
            column_ref(&alias, rel.their_key_column),
            column_ref(parent_alias, rel.our_key_column),
        );
        let expr = match rel.direction {
            IncludeDirection::ToOne => format!("(SELECT row_to_json(sub) FROM ({}) sub)", inner),
            IncludeDirection::ToMany => format!(
                "(SELECT COALESCE(json_agg(row_to_json(sub) ORDER BY sub.{}), '[]'::json) FROM ({}) sub)",
                quoted(PRIMARY_KEY),
                inner
            ),
        };
        out.push(format!("{} AS {}", expr, quoted(inc.name)));
    }
    Ok(out)
}

/// `SELECT row_to_json(r) AS "row" FROM (SELECT main.*, <includes> FROM <source> main <tail>) r`
fn wrap_rows(
    def: &EntityDef,
    source: &str,
    includes: &[Include],
    q: &mut QueryBuf,
    tail: &str,
) -> Result<String, StoreError> {
    let mut cols = vec![format!("{}.*", MAIN_ALIAS)];
    cols.extend(include_columns(def, includes, MAIN_ALIAS, q)?);
    Ok(format!(
        "SELECT row_to_json(r) AS \"row\" FROM (SELECT {} FROM {} {}{}) r",
        cols.join(", "),
        source,
        MAIN_ALIAS,
        tail
    ))
}

/// Filtered, ordered, paginated fetch with includes.
pub fn select_many(def: &EntityDef, query: &FindMany) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let mut tail = where_clause(def, MAIN_ALIAS, &query.filter, &mut q);
    tail.push_str(&order_clause(def, MAIN_ALIAS, &query.order_by));
    if let Some(limit) = query.limit {
        tail.push_str(&format!(" LIMIT {}", limit));
    }
    if query.offset > 0 {
        tail.push_str(&format!(" OFFSET {}", query.offset));
    }
    let sql = wrap_rows(def, &quoted(def.table_name), &query.includes, &mut q, &tail)?;
    q.sql = format!("{}{}", sql, order_clause(def, "r", &query.order_by));
    Ok(q)
}

/// SELECT by primary key with includes.
pub fn select_by_id(def: &EntityDef, id: i64, includes: &[Include]) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let ph = q.typed(Value::from(id), "int8");
    let tail = format!(" WHERE {} = {}", column_ref(MAIN_ALIAS, PRIMARY_KEY), ph);
    q.sql = wrap_rows(def, &quoted(def.table_name), includes, &mut q, &tail)?;
    Ok(q)
}

pub fn count(def: &EntityDef, filter: &Filter) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(def, MAIN_ALIAS, filter, &mut q);
    q.sql = format!(
        "SELECT COUNT(*) FROM {} {}{}",
        quoted(def.table_name),
        MAIN_ALIAS,
        where_sql
    );
    q
}

/// INSERT of the writable columns present in `data`; omitted columns take their SQL default.
/// Returns the new row with includes through a CTE.
pub fn insert(def: &EntityDef, data: &Record, includes: &[Include]) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in def.writable_columns() {
        let Some(v) = data.get(c.name) else { continue };
        placeholders.push(q.typed(v.clone(), c.pg_type));
        cols.push(quoted(c.name));
    }
    let insert_sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING *", quoted(def.table_name))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            quoted(def.table_name),
            cols.join(", "),
            placeholders.join(", ")
        )
    };
    let select = wrap_rows(def, MAIN_ALIAS, includes, &mut q, "")?;
    q.sql = format!("WITH {} AS ({}) {}", MAIN_ALIAS, insert_sql, select);
    Ok(q)
}

/// UPDATE by id: SET only writable columns present in `data`. With nothing to set this is
/// a plain select of the current row.
pub fn update(def: &EntityDef, id: i64, data: &Record, includes: &[Include]) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for c in def.writable_columns() {
        let Some(v) = data.get(c.name) else { continue };
        let ph = q.typed(v.clone(), c.pg_type);
        sets.push(format!("{} = {}", quoted(c.name), ph));
    }
    if sets.is_empty() {
        return select_by_id(def, id, includes);
    }
    let id_ph = q.typed(Value::from(id), "int8");
    let update_sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING *",
        quoted(def.table_name),
        sets.join(", "),
        quoted(PRIMARY_KEY),
        id_ph
    );
    let select = wrap_rows(def, MAIN_ALIAS, includes, &mut q, "")?;
    q.sql = format!("WITH {} AS ({}) {}", MAIN_ALIAS, update_sql, select);
    Ok(q)
}

/// DELETE by id, returning the removed row.
pub fn delete(def: &EntityDef, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.typed(Value::from(id), "int8");
    q.sql = format!(
        "WITH {m} AS (DELETE FROM {} WHERE {} = {} RETURNING *) SELECT row_to_json({m}) AS \"row\" FROM {m}",
        quoted(def.table_name),
        quoted(PRIMARY_KEY),
        ph,
        m = MAIN_ALIAS
    );
    q
}

/// DELETE of every matching row; selects the number removed.
pub fn delete_where(def: &EntityDef, filter: &Filter) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(def, MAIN_ALIAS, filter, &mut q);
    q.sql = format!(
        "WITH deleted AS (DELETE FROM {} AS {}{} RETURNING 1) SELECT COUNT(*) FROM deleted",
        quoted(def.table_name),
        MAIN_ALIAS,
        where_sql
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityKind;
    use serde_json::json;

    #[test]
    fn filter_conditions_bind_typed_params() {
        let filter = Filter::new()
            .and(Condition::Eq("owner_id", json!(3)))
            .and(Condition::EqIgnoreCase("species", "Šuo".into()))
            .and(Condition::Any(vec![
                Condition::Contains("name", "50%".into()),
                Condition::Contains("breed", "lab".into()),
            ]));
        let q = count(EntityKind::Pet.def(), &filter);
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) FROM \"pets\" main WHERE main.\"owner_id\" = $1::int8 \
             AND LOWER(main.\"species\") = LOWER($2::text) \
             AND (main.\"name\" ILIKE $3::text OR main.\"breed\" ILIKE $4::text)"
        );
        assert_eq!(q.params[2], json!("%50\\%%"));
    }

    #[test]
    fn empty_in_matches_nothing_and_empty_any_is_dropped() {
        let filter = Filter::new()
            .and(Condition::Any(vec![]))
            .and(Condition::In("id", vec![]));
        let q = count(EntityKind::Owner.def(), &filter);
        assert!(q.sql.ends_with("WHERE FALSE"));
        assert!(q.params.is_empty());
    }

    #[test]
    fn unknown_filter_columns_are_skipped() {
        let filter = Filter::new().and(Condition::Eq("nickname", json!("x")));
        let q = count(EntityKind::Vet.def(), &filter);
        assert!(!q.sql.contains("WHERE"));
    }

    #[test]
    fn nested_includes_use_distinct_aliases() {
        let query = FindMany::new(Filter::new())
            .includes(vec![
                Include::new("pet").with(Include::new("owner")),
                Include::new("services").with(Include::new("service")),
            ])
            .limit(10)
            .offset(20)
            .order_by(OrderBy::desc("date"));
        let q = select_many(EntityKind::Visit.def(), &query).unwrap();
        assert!(q.sql.contains("FROM \"pets\" t1 WHERE t1.\"id\" = main.\"pet_id\""));
        assert!(q.sql.contains("FROM \"owners\" t2 WHERE t2.\"id\" = t1.\"owner_id\""));
        assert!(q.sql.contains("FROM \"visit_services\" t3 WHERE t3.\"visit_id\" = main.\"id\""));
        assert!(q.sql.contains("json_agg"));
        assert!(q.sql.contains("ORDER BY main.\"date\" DESC, main.\"id\" LIMIT 10 OFFSET 20"));
        assert!(q.sql.ends_with("ORDER BY r.\"date\" DESC, r.\"id\""));
    }

    #[test]
    fn day_range_and_sort_keys() {
        let filter = Filter::new()
            .and(Condition::Gte("date", json!("2025-04-10T00:00:00+00:00")))
            .and(Condition::Lt("date", json!("2025-04-11T00:00:00+00:00")));
        let query = FindMany::new(filter)
            .order_by(OrderBy::asc("date"))
            .order_by(OrderBy::asc("time_slot"))
            .order_by(OrderBy::asc("nickname"));
        let q = select_many(EntityKind::Appointment.def(), &query).unwrap();
        assert!(q
            .sql
            .contains("main.\"date\" >= $1::timestamptz AND main.\"date\" < $2::timestamptz"));
        assert!(q
            .sql
            .contains("ORDER BY main.\"date\" ASC, main.\"time_slot\" ASC, main.\"id\""));
    }

    #[test]
    fn unknown_include_is_an_error() {
        let err = select_by_id(EntityKind::Service.def(), 1, &[Include::new("visits")]).unwrap_err();
        assert!(matches!(err, StoreError::UnknownRelation { table: "services", .. }));
    }

    #[test]
    fn insert_skips_absent_and_system_columns() {
        let data = json!({"id": 99, "name": "Rex", "species": "dog", "owner_id": 1});
        let Value::Object(data) = data else { unreachable!() };
        let q = insert(EntityKind::Pet.def(), &data, &[Include::new("owner")]).unwrap();
        assert!(q.sql.starts_with(
            "WITH main AS (INSERT INTO \"pets\" (\"name\", \"species\", \"owner_id\") \
             VALUES ($1::text, $2::text, $3::int8) RETURNING *)"
        ));
        assert_eq!(q.params, vec![json!("Rex"), json!("dog"), json!(1)]);
    }

    #[test]
    fn update_without_fields_selects_current_row() {
        let q = update(EntityKind::Owner.def(), 5, &Record::new(), &[]).unwrap();
        assert!(q.sql.starts_with("SELECT row_to_json(r)"));
        assert_eq!(q.params, vec![json!(5)]);

        let mut data = Record::new();
        data.insert("phone".into(), json!("555"));
        let q = update(EntityKind::Owner.def(), 5, &data, &[]).unwrap();
        assert!(q.sql.contains("UPDATE \"owners\" SET \"phone\" = $1::text WHERE \"id\" = $2::int8"));
    }

    #[test]
    fn delete_where_counts_removed_rows() {
        let filter = Filter::new().and(Condition::Eq("visit_id", json!(8)));
        let q = delete_where(EntityKind::VisitService.def(), &filter);
        assert_eq!(
            q.sql,
            "WITH deleted AS (DELETE FROM \"visit_services\" AS main WHERE main.\"visit_id\" = $1::int8 \
             RETURNING 1) SELECT COUNT(*) FROM deleted"
        );
    }
}
