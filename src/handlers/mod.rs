//! Request handlers grouped by area. Each returns `Result<_, ApiError>` so a
//! failure carries the operation label that ends up in the JSON body.

pub mod auth;
pub mod crm;
pub mod iot;
pub mod weather;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::Path;
use axum::Json;

use crate::error::{ApiError, Error};

/// Unwrap a JSON body, turning extractor rejections into a 400 in our
/// error shape.
pub(crate) fn body<T>(
    payload: Result<Json<T>, JsonRejection>,
    operation: &'static str,
) -> Result<T, ApiError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| Error::bad_input(e.body_text()).during(operation))
}

pub(crate) fn path_id(
    path: Result<Path<i64>, PathRejection>,
    operation: &'static str,
) -> Result<i64, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|e| Error::bad_input(e.body_text()).during(operation))
}
