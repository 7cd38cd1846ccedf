use async_trait::async_trait;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{body, path_id};
use crate::completion::Completion;
use crate::db::entity::{Entity, Managed};
use crate::db::model::{
    NewNotification, NewWorkDone, NewWorkToDo, NewWorker, Notification, Page, TrashItem, WorkDone,
    WorkToDo, Worker,
};
use crate::db::query::{ListParams, ListQuery};
use crate::db::{self, Pool};
use crate::error::{ApiError, Error};
use crate::server::AppState;

/// A CRM entity exposed with the full list/get/create/update/delete set.
#[async_trait]
pub trait Resource: Managed + Clone {
    type New: DeserializeOwned + Send + 'static;

    const OP_LIST: &'static str;
    const OP_FETCH: &'static str;
    const OP_CREATE: &'static str;
    const OP_UPDATE: &'static str;
    const OP_DELETE: &'static str;

    async fn insert(pool: &Pool, new: Self::New) -> crate::error::Result<Self>;
}

#[async_trait]
impl Resource for Worker {
    type New = NewWorker;
    const OP_LIST: &'static str = "CRM Workers error";
    const OP_FETCH: &'static str = "CRM Worker fetch error";
    const OP_CREATE: &'static str = "CRM Workers create error";
    const OP_UPDATE: &'static str = "CRM Workers update error";
    const OP_DELETE: &'static str = "CRM Workers delete error";

    async fn insert(pool: &Pool, new: NewWorker) -> crate::error::Result<Self> {
        db::create_worker(pool, new).await
    }
}

#[async_trait]
impl Resource for WorkDone {
    type New = NewWorkDone;
    const OP_LIST: &'static str = "CRM Work Done error";
    const OP_FETCH: &'static str = "CRM Work Done fetch error";
    const OP_CREATE: &'static str = "CRM Work Done create error";
    const OP_UPDATE: &'static str = "CRM Work Done update error";
    const OP_DELETE: &'static str = "CRM Work Done delete error";

    async fn insert(pool: &Pool, new: NewWorkDone) -> crate::error::Result<Self> {
        db::create_work_done(pool, new).await
    }
}

#[async_trait]
impl Resource for WorkToDo {
    type New = NewWorkToDo;
    const OP_LIST: &'static str = "CRM Work To-Do error";
    const OP_FETCH: &'static str = "CRM Work To-Do fetch error";
    const OP_CREATE: &'static str = "CRM Work To-Do create error";
    const OP_UPDATE: &'static str = "CRM Work To-Do update error";
    const OP_DELETE: &'static str = "CRM Work To-Do delete error";

    async fn insert(pool: &Pool, new: NewWorkToDo) -> crate::error::Result<Self> {
        db::create_work_to_do(pool, new).await
    }
}

#[async_trait]
impl Resource for Notification {
    type New = NewNotification;
    const OP_LIST: &'static str = "CRM Notifications error";
    const OP_FETCH: &'static str = "CRM Notification fetch error";
    const OP_CREATE: &'static str = "CRM Notifications create error";
    const OP_UPDATE: &'static str = "CRM Notifications update error";
    const OP_DELETE: &'static str = "CRM Notifications delete error";

    async fn insert(pool: &Pool, new: NewNotification) -> crate::error::Result<Self> {
        db::create_notification(pool, new).await
    }
}

/// Shared by every paginated listing, CRM or IoT.
pub(crate) async fn list_page<E: Entity>(
    pool: &Pool,
    params: &ListParams,
    operation: &'static str,
) -> Result<Json<Page<E>>, ApiError> {
    let q = ListQuery::<E::Sort>::from_params(params);
    let page = db::list::<E>(pool, &q)
        .await
        .map_err(|e| e.during(operation))?;
    Ok(Json(page))
}

pub async fn list<E: Resource>(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<E>>, ApiError> {
    list_page::<E>(&state.pool, &params, E::OP_LIST).await
}

pub async fn fetch<E: Resource>(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<E>, ApiError> {
    let id = path_id(id, E::OP_FETCH)?;
    let row = db::fetch::<E>(&state.pool, id)
        .await
        .map_err(|e| e.during(E::OP_FETCH))?;
    Ok(Json(row))
}

pub async fn create<E: Resource>(
    State(state): State<AppState>,
    payload: Result<Json<E::New>, JsonRejection>,
) -> Result<(StatusCode, Json<E>), ApiError> {
    let new = body(payload, E::OP_CREATE)?;
    let row = E::insert(&state.pool, new)
        .await
        .map_err(|e| e.during(E::OP_CREATE))?;
    info!(table = E::TABLE, "created row");
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn update<E: Resource>(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<E>, ApiError> {
    let id = path_id(id, E::OP_UPDATE)?;
    let Value::Object(fields) = body(payload, E::OP_UPDATE)? else {
        return Err(Error::bad_input("body must be a JSON object").during(E::OP_UPDATE));
    };
    debug!(table = E::TABLE, id, keys = ?fields.keys().collect::<Vec<_>>(), "update request");
    let row = db::update::<E>(&state.pool, id, &fields)
        .await
        .map_err(|e| e.during(E::OP_UPDATE))?;
    Ok(Json(row))
}

pub async fn delete<E: Resource>(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let id = path_id(id, E::OP_DELETE)?;
    db::delete_to_trash::<E>(&state.pool, id)
        .await
        .map_err(|e| e.during(E::OP_DELETE))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Worker delete cascades to pending tasks. A missing worker still answers
/// 204 so the route stays idempotent.
pub async fn delete_worker(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let id = path_id(id, Worker::OP_DELETE)?;
    match db::delete_worker(&state.pool, id).await {
        Ok(report) => {
            info!(id, tasks = report.tasks_trashed, "worker deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(Error::NotFound(_)) => {
            debug!(id, "delete of missing worker ignored");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => Err(e.during(Worker::OP_DELETE)),
    }
}

/// 200 with the confirmed task on the first call, 201 with the new
/// work-done row on the second.
pub async fn complete(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<(StatusCode, Json<Completion>), ApiError> {
    const OP: &str = "CRM Work To-Do complete error";
    let id = path_id(id, OP)?;
    let outcome = db::complete_work_to_do(&state.pool, id)
        .await
        .map_err(|e| e.during(OP))?;
    let status = if outcome.state().is_terminal() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

pub async fn list_trash(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<TrashItem>>, ApiError> {
    list_page::<TrashItem>(&state.pool, &params, "CRM Trash error").await
}

#[derive(Debug, Serialize)]
pub struct Cleared {
    pub deleted: u64,
}

pub async fn clear_trash(State(state): State<AppState>) -> Result<Json<Cleared>, ApiError> {
    let deleted = db::clear_trash(&state.pool)
        .await
        .map_err(|e| e.during("CRM Trash clear error"))?;
    Ok(Json(Cleared { deleted }))
}
