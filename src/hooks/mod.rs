//! Per-entity specializations of the CRUD engine: filters, relations, validation,
//! input normalization, side effects and delete guards.

mod appointment;
mod owner;
mod pet;
mod service;
mod vet;
mod visit;

pub use appointment::AppointmentHooks;
pub use owner::OwnerHooks;
pub use pet::PetHooks;
pub use service::ServiceHooks;
pub use vet::VetHooks;
pub use visit::VisitHooks;

use crate::case::to_camel_case;
use crate::dates::{parse_day, parse_instant, start_of_day, start_of_next_day};
use crate::error::AppError;
use crate::events::EventSink;
use crate::schema::EntityKind;
use crate::service::{Mode, RequestValidator, Rules, ValidationRule};
use crate::sort::SortFields;
use crate::store::{Condition, Filter, Include, Record, StoreTransaction};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Number, Value};
use std::collections::HashMap;

/// Hooks the engine calls around each operation. Only the entity kind, filter construction
/// and projection are required; everything else has a neutral default.
#[async_trait]
pub trait EntityHooks: Send + Sync + 'static {
    type Record: DeserializeOwned + Send + Sync;
    type Dto: Serialize + SortFields + Clone + Send + Sync;

    fn kind(&self) -> EntityKind;

    /// Filter from snake_cased query parameters. Unknown parameters are ignored; a known
    /// parameter with an unusable value is a validation error.
    fn build_filter(&self, params: &HashMap<String, String>) -> Result<Filter, AppError>;

    fn project_one(&self, record: &Self::Record) -> Self::Dto;

    fn project_many(&self, records: &[Self::Record]) -> Vec<Self::Dto> {
        records.iter().map(|r| self.project_one(r)).collect()
    }

    /// Relations loaded with every read and returned by create/update.
    fn relations(&self) -> Vec<Include> {
        Vec::new()
    }

    fn validation_rules(&self) -> Rules {
        Vec::new()
    }

    fn validate(&self, input: &Record, mode: Mode) -> Result<(), AppError> {
        RequestValidator::check(input, &self.validation_rules(), mode)
    }

    fn normalize_input(&self, input: Record) -> Record {
        input
    }

    async fn after_create(&self, _events: &dyn EventSink, _record: &Self::Record) -> Result<(), AppError> {
        Ok(())
    }

    /// `before` is the row as it was when the update started.
    async fn after_update(
        &self,
        _events: &dyn EventSink,
        _before: &Self::Record,
        _after: &Self::Record,
    ) -> Result<(), AppError> {
        Ok(())
    }

    /// Runs inside the delete transaction; an error aborts the delete.
    async fn before_delete(&self, _tx: &mut dyn StoreTransaction, _id: i64) -> Result<(), AppError> {
        Ok(())
    }
}

/// Digits with optional leading `+`, spaces, dashes and parentheses.
const PHONE_PATTERN: &str = r"^\s*\+?[0-9][0-9 ()\-]*\s*$";

/// Optional contact phone shared by owners and vets.
fn phone_rule() -> ValidationRule {
    ValidationRule::optional()
        .min_length(5)
        .max_length(30)
        .pattern(PHONE_PATTERN)
}

fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Exact id match; a value that is not an integer matches nothing.
fn id_condition(params: &HashMap<String, String>, key: &str, column: &'static str) -> Option<Condition> {
    let raw = param(params, key)?;
    Some(match raw.parse::<i64>() {
        Ok(id) => Condition::Eq(column, Value::from(id)),
        Err(_) => Condition::In(column, Vec::new()),
    })
}

/// Case-insensitive substring match on any of `columns`.
fn search_condition(params: &HashMap<String, String>, columns: &[&'static str]) -> Option<Condition> {
    let term = param(params, "search")?;
    Some(Condition::Any(
        columns
            .iter()
            .map(|c| Condition::Contains(*c, term.to_string()))
            .collect(),
    ))
}

fn day_param(params: &HashMap<String, String>, key: &str) -> Result<Option<chrono::NaiveDate>, AppError> {
    match param(params, key) {
        None => Ok(None),
        Some(raw) => parse_day(raw)
            .map(Some)
            .ok_or_else(|| AppError::Validation(format!("{} must be a valid date", to_camel_case(key)))),
    }
}

/// `date_from` / `date_to` as inclusive UTC calendar days on `column`.
fn date_range(
    filter: &mut Filter,
    params: &HashMap<String, String>,
    column: &'static str,
) -> Result<(), AppError> {
    if let Some(day) = day_param(params, "date_from")? {
        filter.push(Condition::Gte(column, Value::String(start_of_day(day).to_rfc3339())));
    }
    if let Some(day) = day_param(params, "date_to")? {
        filter.push(Condition::Lt(column, Value::String(start_of_next_day(day).to_rfc3339())));
    }
    Ok(())
}

fn trim_strings(input: &mut Record, columns: &[&str]) {
    for col in columns {
        if let Some(Value::String(s)) = input.get_mut(*col) {
            let trimmed = s.trim();
            if trimmed.len() != s.len() {
                *s = trimmed.to_string();
            }
        }
    }
}

fn lowercase(input: &mut Record, column: &str) {
    if let Some(Value::String(s)) = input.get_mut(column) {
        *s = s.trim().to_lowercase();
    }
}

fn to_integer(input: &mut Record, column: &str) {
    if let Some(v) = input.get_mut(column) {
        if let Some(n) = v.as_str().and_then(|s| s.trim().parse::<i64>().ok()) {
            *v = Value::from(n);
        }
    }
}

fn to_number(input: &mut Record, column: &str) {
    if let Some(v) = input.get_mut(column) {
        if let Some(n) = v
            .as_str()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .and_then(Number::from_f64)
        {
            *v = Value::Number(n);
        }
    }
}

/// Calendar date column as `YYYY-MM-DD`.
fn to_day(input: &mut Record, column: &str) {
    if let Some(v) = input.get_mut(column) {
        if let Some(day) = v.as_str().and_then(parse_day) {
            *v = Value::String(day.format("%Y-%m-%d").to_string());
        }
    }
}

/// Timestamp column as RFC 3339 UTC.
fn to_instant(input: &mut Record, column: &str) {
    if let Some(v) = input.get_mut(column) {
        if let Some(dt) = v.as_str().and_then(parse_instant) {
            *v = Value::String(dt.to_rfc3339());
        }
    }
}
