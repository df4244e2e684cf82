//! Handlers for coordinated writes and the read-side aggregates.

use super::{body_to_record, parse_id};
use crate::dates::{parse_day, today};
use crate::error::AppError;
use crate::response::{success_one_created, success_one_ok};
use crate::service::Scheduler;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: Option<String>,
}

pub async fn create_visit(
    State(scheduler): State<Arc<Scheduler>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let input = body_to_record(body)?;
    let visit = scheduler.create_visit_with_services(input).await?;
    Ok(success_one_created(visit))
}

pub async fn create_appointment(
    State(scheduler): State<Arc<Scheduler>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let input = body_to_record(body)?;
    let appointment = scheduler.create_appointment(input).await?;
    Ok(success_one_created(appointment))
}

/// `?date=YYYY-MM-DD`, today when omitted.
pub async fn vet_availability(
    State(scheduler): State<Arc<Scheduler>>,
    Path(id): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<impl IntoResponse, AppError> {
    let vet_id = parse_id(&id)?;
    let day = match query.date.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_day(raw).ok_or_else(|| AppError::Validation("date must be a valid date".into()))?,
        None => today(),
    };
    let slots = scheduler.get_vet_availability(vet_id, day).await?;
    Ok(success_one_ok(slots))
}

pub async fn daily_stats(State(scheduler): State<Arc<Scheduler>>) -> Result<impl IntoResponse, AppError> {
    Ok(success_one_ok(scheduler.get_daily_stats().await?))
}

pub async fn owner_dashboard(
    State(scheduler): State<Arc<Scheduler>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let owner_id = parse_id(&id)?;
    Ok(success_one_ok(scheduler.get_owner_dashboard(owner_id).await?))
}

pub async fn pet_history(
    State(scheduler): State<Arc<Scheduler>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let pet_id = parse_id(&id)?;
    Ok(success_one_ok(scheduler.get_full_pet_history(pet_id).await?))
}
