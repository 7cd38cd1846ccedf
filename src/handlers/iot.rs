use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use super::body;
use super::crm::list_page;
use crate::db::model::{CattleHealth, Infrastructure, Page};
use crate::db::query::ListParams;
use crate::db::sensors::{self, SensorPayload};
use crate::error::ApiError;
use crate::iot::{self, SimulationReport};
use crate::server::AppState;

pub async fn cattle(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<CattleHealth>>, ApiError> {
    list_page::<CattleHealth>(&state.pool, &params, "IoT Cattle error").await
}

pub async fn infrastructure(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<Infrastructure>>, ApiError> {
    list_page::<Infrastructure>(&state.pool, &params, "IoT Infrastructure error").await
}

pub async fn map() -> Json<Value> {
    Json(iot::map_data())
}

pub async fn simulate(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SimulationReport>), ApiError> {
    let report = iot::simulate(&state.pool)
        .await
        .map_err(|e| e.during("IoT Simulate error"))?;
    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn webhook(
    State(state): State<AppState>,
    payload: Result<Json<SensorPayload>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    const OP: &str = "Webhook error";
    let payload = body(payload, OP)?;
    let report = sensors::ingest(&state.pool, &payload)
        .await
        .map_err(|e| e.during(OP))?;
    info!(cattle = report.cattle, infrastructure = report.infrastructure, "webhook processed");
    Ok(Json(json!({
        "message": "Webhook data processed",
        "cattle": report.cattle,
        "infrastructure": report.infrastructure,
    })))
}
