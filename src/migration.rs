//! Idempotent DDL bootstrap generated from the entity schema: tables in foreign-key order,
//! then indexes. Safe to run on every start.

use crate::error::StoreError;
use crate::models::{STATUSES, TIME_SLOTS};
use crate::schema::{
    foreign_key_constraint_name, unique_constraint_name, EntityDef, EntityKind, APPOINTMENT_SLOT_INDEX,
    PRIMARY_KEY,
};
use sqlx::PgPool;

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn literal_list(values: &[&str]) -> String {
    values
        .iter()
        .map(|v| format!("'{}'", v.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Table-level CHECK constraints beyond what the column types express.
fn checks(kind: EntityKind) -> Vec<String> {
    match kind {
        EntityKind::Service => vec!["CHECK (\"price\" >= 0)".into()],
        EntityKind::Visit => vec!["CHECK (length(btrim(\"diagnosis\")) > 0)".into()],
        EntityKind::Appointment => vec![
            format!("CHECK (\"time_slot\" IN ({}))", literal_list(&TIME_SLOTS)),
            format!("CHECK (\"status\" IN ({}))", literal_list(&STATUSES)),
        ],
        _ => Vec::new(),
    }
}

fn create_table(def: &EntityDef) -> String {
    let mut parts: Vec<String> = def
        .columns
        .iter()
        .map(|c| {
            if c.name == PRIMARY_KEY {
                return format!("{} BIGSERIAL PRIMARY KEY", quote(c.name));
            }
            let mut col = format!("{} {}", quote(c.name), c.pg_type);
            if !c.nullable {
                col.push_str(" NOT NULL");
            }
            if let Some(default) = c.default {
                col.push_str(" DEFAULT ");
                col.push_str(default);
            }
            col
        })
        .collect();
    for col in def.unique {
        parts.push(format!(
            "CONSTRAINT {} UNIQUE ({})",
            quote(&unique_constraint_name(def.table_name, col)),
            quote(col)
        ));
    }
    for fk in def.foreign_keys {
        parts.push(format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            quote(&foreign_key_constraint_name(def.table_name, fk.column)),
            quote(fk.column),
            quote(fk.references.table_name()),
            quote(PRIMARY_KEY)
        ));
    }
    parts.extend(checks(def.kind));
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote(def.table_name),
        parts.join(",\n    ")
    )
}

/// All bootstrap statements, in execution order.
pub fn schema_statements() -> Vec<String> {
    let mut out: Vec<String> = EntityKind::ALL.iter().map(|k| create_table(k.def())).collect();
    for kind in EntityKind::ALL {
        let def = kind.def();
        for fk in def.foreign_keys {
            out.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote(&format!("{}_{}_idx", def.table_name, fk.column)),
                quote(def.table_name),
                quote(fk.column)
            ));
        }
    }
    out.push(format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON \"appointments\" \
         (\"vet_id\", ((\"date\" AT TIME ZONE 'UTC')::date), \"time_slot\") \
         WHERE \"status\" <> 'cancelled'",
        quote(APPOINTMENT_SLOT_INDEX)
    ));
    out
}

/// Create missing tables and indexes in one transaction.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    let statements = schema_statements();
    let mut tx = pool.begin().await?;
    for sql in &statements {
        tracing::debug!(sql = %sql, "bootstrap");
        sqlx::query(sql).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    tracing::info!(statements = statements.len(), "schema ensured");
    Ok(())
}
