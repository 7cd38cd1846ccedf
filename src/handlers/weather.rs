use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ApiError, Error};
use crate::server::AppState;
use crate::weather::{process_forecast, WeatherReport};

/// Coordinates arrive as raw strings; blanks and garbage fall back to the
/// configured farm location.
#[derive(Debug, Default, Deserialize)]
pub struct ForecastParams {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

fn coordinate(raw: Option<&str>, fallback: f64) -> f64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(fallback)
}

pub async fn forecast(
    State(state): State<AppState>,
    Query(params): Query<ForecastParams>,
) -> Result<Json<WeatherReport>, ApiError> {
    const OP: &str = "Weather fetch error";
    let (default_lat, default_lon) = state.default_location;
    let latitude = coordinate(params.latitude.as_deref(), default_lat);
    let longitude = coordinate(params.longitude.as_deref(), default_lon);
    let raw = state
        .weather
        .forecast(latitude, longitude)
        .await
        .map_err(|e| e.during(OP))?;
    let report = process_forecast(&raw, Utc::now()).map_err(|e| e.during(OP))?;
    Ok(Json(report))
}

#[derive(Debug, Default, Deserialize)]
pub struct SuggestionParams {
    pub q: Option<String>,
}

pub async fn suggestions(
    State(state): State<AppState>,
    Query(params): Query<SuggestionParams>,
) -> Result<Json<Value>, ApiError> {
    const OP: &str = "Suggestions fetch error";
    let Some(q) = params.q.filter(|q| !q.trim().is_empty()) else {
        return Err(Error::bad_input("Query parameter required").during(OP));
    };
    let data = state
        .weather
        .suggestions(&q)
        .await
        .map_err(|e| e.during(OP))?;
    Ok(Json(data))
}
