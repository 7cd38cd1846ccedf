use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{Executor, Sqlite};
use tracing::{debug, info, instrument};

use super::entity::{Entity, Managed};
use super::model::{
    blank_to_none, Farmer, NewNotification, NewWorkDone, NewWorkToDo, NewWorker, Notification,
    Page, WorkDone, WorkToDo, Worker,
};
use super::query::{select_count, select_page, update_statement, ListQuery};
use super::Pool;
use crate::completion::{Completion, CompletionState, CompletionStep};
use crate::error::{Error, Result};
use crate::model::ItemType;

/// One page of `E` plus the total matching the same filter.
#[instrument(skip_all, fields(table = E::TABLE))]
pub async fn list<E: Entity>(pool: &Pool, q: &ListQuery<E::Sort>) -> Result<Page<E>> {
    let mut page = select_page::<E>(q);
    debug!(sql = page.sql(), page = q.page, limit = q.limit, "list query");
    let data = page.build_query_as::<E>().fetch_all(pool).await?;

    let mut count = select_count::<E>(q.search.as_deref());
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(pool).await?;
    Ok(Page { data, total })
}

#[instrument(skip(pool))]
pub async fn get<E: Entity>(pool: &Pool, id: i64) -> Result<Option<E>> {
    let sql = format!("SELECT * FROM {} WHERE id = ?", E::TABLE);
    let row = sqlx::query_as::<_, E>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Like [`get`] but a missing row is an error.
pub async fn fetch<E: Entity>(pool: &Pool, id: i64) -> Result<E> {
    get::<E>(pool, id)
        .await?
        .ok_or_else(|| Error::not_found(E::LABEL))
}

/// Presence-based partial update. Keys outside the entity's column list are
/// ignored; with nothing to change the current row is returned.
#[instrument(skip(pool, fields))]
pub async fn update<E: Managed>(pool: &Pool, id: i64, fields: &Map<String, Value>) -> Result<E> {
    let Some(mut stmt) = update_statement::<E>(id, fields)? else {
        debug!(table = E::TABLE, id, "no updatable fields; returning current row");
        return fetch::<E>(pool, id).await;
    };
    debug!(sql = stmt.sql(), "update query");
    stmt.build_query_as::<E>()
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::not_found(E::LABEL))
}

async fn insert_trash<'c, X>(exec: X, item_type: ItemType, row: &impl Serialize) -> Result<()>
where
    X: Executor<'c, Database = Sqlite>,
{
    let snapshot = serde_json::to_value(row)?;
    sqlx::query("INSERT INTO trash (item_type, item_data) VALUES (?, ?)")
        .bind(item_type.as_str())
        .bind(Json(snapshot))
        .execute(exec)
        .await?;
    Ok(())
}

/// Snapshot the row into trash, then delete it. A missing row is a no-op and
/// returns `false`.
///
/// The two statements are not wrapped in a transaction: a crash in between
/// leaves the row in place next to its snapshot.
#[instrument(skip(pool))]
pub async fn delete_to_trash<E: Managed>(pool: &Pool, id: i64) -> Result<bool> {
    let Some(row) = get::<E>(pool, id).await? else {
        debug!(table = E::TABLE, id, "delete of missing row ignored");
        return Ok(false);
    };
    insert_trash(pool, E::ITEM_TYPE, &row).await?;
    let sql = format!("DELETE FROM {} WHERE id = ?", E::TABLE);
    sqlx::query(&sql).bind(id).execute(pool).await?;
    info!(table = E::TABLE, id, "moved row to trash");
    Ok(true)
}

/// Outcome of [`delete_worker`].
#[derive(Debug, Clone)]
pub struct CascadeReport {
    pub worker: Worker,
    pub tasks_trashed: usize,
}

/// Delete a worker together with its pending tasks, snapshotting each row to
/// trash, all in one transaction. Completed work keeps pointing at the
/// deleted worker id.
#[instrument(skip(pool))]
pub async fn delete_worker(pool: &Pool, id: i64) -> Result<CascadeReport> {
    let mut tx = pool.begin().await?;

    let worker = sqlx::query_as::<_, Worker>("SELECT * FROM workers WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::not_found(Worker::LABEL))?;

    let tasks = sqlx::query_as::<_, WorkToDo>("SELECT * FROM work_to_do WHERE worker_id = ?")
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
    for task in &tasks {
        insert_trash(&mut *tx, ItemType::WorkToDo, task).await?;
    }
    sqlx::query("DELETE FROM work_to_do WHERE worker_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    insert_trash(&mut *tx, ItemType::Workers, &worker).await?;
    sqlx::query("DELETE FROM workers WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!(id, tasks = tasks.len(), "deleted worker with pending tasks");
    Ok(CascadeReport {
        worker,
        tasks_trashed: tasks.len(),
    })
}

/// Advance a task one completion step. See [`crate::completion`].
#[instrument(skip(pool))]
pub async fn complete_work_to_do(pool: &Pool, id: i64) -> Result<Completion> {
    let mut tx = pool.begin().await?;
    let task = sqlx::query_as::<_, WorkToDo>("SELECT * FROM work_to_do WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::not_found(WorkToDo::LABEL))?;

    let state = CompletionState::of(&task);
    let step = state
        .step()
        .ok_or_else(|| Error::not_found(WorkToDo::LABEL))?;

    let outcome = match step {
        CompletionStep::Confirm => {
            let updated = sqlx::query_as::<_, WorkToDo>(
                "UPDATE work_to_do SET nb = ? WHERE id = ? RETURNING *",
            )
            .bind(true)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
            info!(id, "task confirmed; next completion archives it");
            Completion::Confirmed(updated)
        }
        CompletionStep::Archive => {
            let done = sqlx::query_as::<_, WorkDone>(
                "INSERT INTO work_done (task, date, worker_id, sector, cattle_count, cost, duration, equipment, status) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
            )
            .bind(&task.task)
            .bind(Utc::now().date_naive())
            .bind(task.worker_id)
            .bind(&task.sector)
            .bind(task.cattle_count)
            .bind(task.cost)
            .bind(task.duration)
            .bind(&task.equipment)
            .bind("completed")
            .fetch_one(&mut *tx)
            .await?;
            sqlx::query("DELETE FROM work_to_do WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            info!(id, work_done_id = done.id, "task archived to work done");
            Completion::Archived(done)
        }
    };

    tx.commit().await?;
    debug!(id, from = ?state, to = ?state.next(), "completion step committed");
    Ok(outcome)
}

#[instrument(skip_all)]
pub async fn create_worker(pool: &Pool, new: NewWorker) -> Result<Worker> {
    if new.name.trim().is_empty() {
        return Err(Error::bad_input("name is required"));
    }
    let row = sqlx::query_as::<_, Worker>(
        "INSERT INTO workers (name, role, contact, hours, sector) VALUES (?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(new.name)
    .bind(blank_to_none(new.role))
    .bind(blank_to_none(new.contact))
    .bind(new.hours)
    .bind(blank_to_none(new.sector))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

#[instrument(skip_all)]
pub async fn create_work_done(pool: &Pool, new: NewWorkDone) -> Result<WorkDone> {
    if new.task.trim().is_empty() {
        return Err(Error::bad_input("task is required"));
    }
    let row = sqlx::query_as::<_, WorkDone>(
        "INSERT INTO work_done (task, date, worker_id, sector, cattle_count, cost, duration, equipment, status) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(new.task)
    .bind(new.date.unwrap_or_else(|| Utc::now().date_naive()))
    .bind(new.worker_id)
    .bind(blank_to_none(new.sector))
    .bind(new.cattle_count)
    .bind(new.cost)
    .bind(new.duration)
    .bind(blank_to_none(new.equipment))
    .bind(blank_to_none(new.status).unwrap_or_else(|| "completed".to_string()))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

#[instrument(skip_all)]
pub async fn create_work_to_do(pool: &Pool, new: NewWorkToDo) -> Result<WorkToDo> {
    if new.task.trim().is_empty() {
        return Err(Error::bad_input("task is required"));
    }
    let row = sqlx::query_as::<_, WorkToDo>(
        "INSERT INTO work_to_do (task, due_date, worker_id, sector, cattle_count, cost, duration, equipment, priority, nb, status) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(new.task)
    .bind(new.due_date)
    .bind(new.worker_id)
    .bind(blank_to_none(new.sector))
    .bind(new.cattle_count)
    .bind(new.cost)
    .bind(new.duration)
    .bind(blank_to_none(new.equipment))
    .bind(blank_to_none(new.priority))
    .bind(false)
    .bind(blank_to_none(new.status).unwrap_or_else(|| "pending".to_string()))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

#[instrument(skip_all)]
pub async fn create_notification(pool: &Pool, new: NewNotification) -> Result<Notification> {
    if new.message.trim().is_empty() {
        return Err(Error::bad_input("message is required"));
    }
    let row = sqlx::query_as::<_, Notification>(
        "INSERT INTO notifications (message, worker_id) VALUES (?, ?) RETURNING *",
    )
    .bind(new.message)
    .bind(new.worker_id)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Empty the trash bin. Returns the number of snapshots removed.
#[instrument(skip_all)]
pub async fn clear_trash(pool: &Pool) -> Result<u64> {
    let res = sqlx::query("DELETE FROM trash").execute(pool).await?;
    info!(deleted = res.rows_affected(), "trash cleared");
    Ok(res.rows_affected())
}

#[instrument(skip(pool))]
pub async fn find_farmer_by_name(pool: &Pool, name: &str) -> Result<Option<Farmer>> {
    let row = sqlx::query_as::<_, Farmer>(
        "SELECT id, name, location, password_hash FROM farmer_details WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[instrument(skip(pool))]
pub async fn find_farmer(pool: &Pool, id: i64) -> Result<Option<Farmer>> {
    let row = sqlx::query_as::<_, Farmer>(
        "SELECT id, name, location, password_hash FROM farmer_details WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Insert or replace a farmer login. Returns the farmer id.
#[instrument(skip(pool, password_hash))]
pub async fn upsert_farmer(
    pool: &Pool,
    name: &str,
    location: Option<&str>,
    password_hash: &str,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO farmer_details (name, location, password_hash) VALUES (?, ?, ?) \
         ON CONFLICT (name) DO UPDATE SET location = excluded.location, password_hash = excluded.password_hash \
         RETURNING id",
    )
    .bind(name)
    .bind(location)
    .bind(password_hash)
    .fetch_one(pool)
    .await?;
    Ok(id)
}
