use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use super::read_body;
use crate::error::AppError;
use crate::middleware::Authenticated;
use crate::models::{NewTask, TaskPatch};
use crate::tasks::{parse_task_id, OwnerScope};
use crate::AppState;

pub async fn list_tasks(
    Authenticated { user, .. }: Authenticated,
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let tasks = OwnerScope::of(&user).list(&state.db)?;
    info!(user_id = %user.id, count = tasks.len(), "Listed tasks");
    Ok(Json(json!({ "tasks": tasks })))
}

pub async fn create_task(
    Authenticated { user, .. }: Authenticated,
    State(state): State<AppState>,
    body: Result<Json<NewTask>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let req = read_body(body)?;
    let task = OwnerScope::of(&user).create(&state.db, &req.text)?;
    info!(user_id = %user.id, id = %task.id, "Created task");
    Ok(Json(json!({ "task": task })))
}

pub async fn get_task(
    Authenticated { user, .. }: Authenticated,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_task_id(&id)?;
    let task = OwnerScope::of(&user).fetch(&state.db, id)?;
    Ok(Json(json!({ "task": task })))
}

pub async fn update_task(
    Authenticated { user, .. }: Authenticated,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    // An unknown id is a 404 whatever the body holds.
    let id = parse_task_id(&id)?;
    let patch = read_body(body)?;
    let changes = patch.resolve(state.clock.as_ref())?;
    let task = OwnerScope::of(&user).update(&state.db, id, &changes)?;
    info!(id = %task.id, completed = task.completed, "Updated task");
    Ok(Json(json!({ "task": task })))
}

pub async fn delete_task(
    Authenticated { user, .. }: Authenticated,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_task_id(&id)?;
    let task = OwnerScope::of(&user).delete(&state.db, id)?;
    info!(id = %task.id, "Deleted task");
    Ok(Json(json!({ "task": task })))
}
