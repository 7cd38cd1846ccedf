use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::body;
use crate::auth::verify_password;
use crate::db::{self, model::FarmerProfile};
use crate::error::{ApiError, Error};
use crate::server::{AppState, CurrentFarmer};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Any failure here, store errors included, answers 401 "Login failed".
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    const OP: &str = "Login failed";
    let unauthorized = |msg: String| Error::Unauthorized(msg).during(OP);

    let req = body(payload, OP).map_err(|e| unauthorized(e.source.to_string()))?;
    let farmer = db::find_farmer_by_name(&state.pool, &req.name)
        .await
        .map_err(|e| unauthorized(e.to_string()))?;
    let Some(farmer) = farmer else {
        warn!(name = %req.name, "login for unknown farmer");
        return Err(unauthorized("Farmer not found".to_string()));
    };
    if !verify_password(&req.password, &farmer.password_hash) {
        warn!(farmer = farmer.id, "login with wrong password");
        return Err(unauthorized("Invalid password".to_string()));
    }

    let token = state
        .tokens
        .issue(farmer.id, &farmer.name)
        .map_err(|e| unauthorized(e.to_string()))?;
    info!(farmer = farmer.id, "login succeeded");
    Ok(Json(LoginResponse { token }))
}

/// Profile of the token holder, or an empty guest profile.
pub async fn current_user(
    State(state): State<AppState>,
    Extension(CurrentFarmer(claims)): Extension<CurrentFarmer>,
) -> Result<Json<FarmerProfile>, ApiError> {
    let Some(claims) = claims else {
        return Ok(Json(FarmerProfile::guest()));
    };
    let farmer = db::find_farmer(&state.pool, claims.id)
        .await
        .map_err(|e| e.during("Get user error"))?;
    Ok(Json(farmer.map(FarmerProfile::from).unwrap_or_else(FarmerProfile::guest)))
}
