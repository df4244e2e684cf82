//! Entity CRUD handlers, generic over the entity's hooks. Each route picks its engine out of
//! the application state by type.

use super::{body_to_record, parse_id};
use crate::case::params_to_snake_case;
use crate::error::AppError;
use crate::hooks::EntityHooks;
use crate::response::{success_many, success_one_created, success_one_message, success_one_ok};
use crate::service::{CrudEngine, ListRequest};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub async fn list<H: EntityHooks>(
    State(engine): State<Arc<CrudEngine<H>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let request = ListRequest::from_params(params_to_snake_case(params));
    let page = engine.list(&request).await?;
    let paging = page.paging();
    Ok(success_many(page.items, paging))
}

pub async fn read<H: EntityHooks>(
    State(engine): State<Arc<CrudEngine<H>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let dto = engine
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found(engine.hooks().kind(), id))?;
    Ok(success_one_ok(dto))
}

pub async fn create<H: EntityHooks>(
    State(engine): State<Arc<CrudEngine<H>>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let input = body_to_record(body)?;
    let dto = engine.create(input).await?;
    Ok(success_one_created(dto))
}

pub async fn update<H: EntityHooks>(
    State(engine): State<Arc<CrudEngine<H>>>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let input = body_to_record(body)?;
    let dto = engine.update(id, input).await?;
    Ok(success_one_message(dto, "updated"))
}

pub async fn delete<H: EntityHooks>(
    State(engine): State<Arc<CrudEngine<H>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let id = engine.delete(id).await?;
    Ok(success_one_message(json!({ "id": id }), "deleted"))
}
