//! Advertisement API handlers and HTTP error translation.
//!
//! Every handler that touches the store runs its work inside
//! [`in_transaction`]: one pooled connection, one transaction, committed on
//! success and rolled back when the closure returns an error.
//!
//! Transactions are opened `IMMEDIATE` so concurrent writers queue on the
//! busy timeout rather than failing with `SQLITE_BUSY_SNAPSHOT`.

use crate::AppState;
use adboard_adverts::{validate_create, validate_patch, AdvertError, FieldError};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Extension, Json, Path,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::{Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

/// Response body for `GET /test/{id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdvertView {
    /// The advertisement title.
    pub adv: String,
    /// ISO-8601 creation timestamp.
    pub creation_time: String,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<FieldError>),
    #[error("request body rejected ({status}): {message}")]
    Rejected { status: StatusCode, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl From<AdvertError> for ApiError {
    fn from(e: AdvertError) -> Self {
        match e {
            AdvertError::NotFound(_) => ApiError::NotFound("adv not found".to_string()),
            AdvertError::TitleTaken(_) => ApiError::Conflict("title already exist".to_string()),
            AdvertError::ValueTooLong { column, limit } => {
                ApiError::Validation(vec![FieldError::too_long(&column, limit)])
            }
            AdvertError::Database(e) => ApiError::Internal(format!("db query failed: {}", e)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(errors) => {
                tracing::warn!(count = errors.len(), "request failed validation");
                (StatusCode::BAD_REQUEST, json!(errors))
            }
            ApiError::Rejected { status, message } => {
                tracing::warn!(status = status.as_u16(), "request body rejected: {}", message);
                (status, json!(message))
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!(msg)),
            ApiError::Conflict(msg) => {
                tracing::warn!("conflict: {}", msg);
                (StatusCode::CONFLICT, json!(msg))
            }
            ApiError::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!("internal server error"),
                )
            }
        };

        let body = Json(json!({
            "status": "error",
            "message": message
        }));

        (status, body).into_response()
    }
}

/// Runs `op` on the blocking pool inside a fresh transaction.
async fn in_transaction<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Transaction<'_>) -> Result<T, ApiError> + Send + 'static,
{
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| ApiError::Internal(format!("db connection failed: {}", e)))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| ApiError::Internal(format!("begin transaction failed: {}", e)))?;

        let value = op(&tx)?;

        tx.commit()
            .map_err(|e| ApiError::Internal(format!("commit failed: {}", e)))?;
        Ok(value)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("task join error: {}", e)))?
}

/// Non-integer ids never match an advertisement.
fn advert_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|_| ApiError::NotFound("not found".to_string()))
}

/// Handler for `GET /test/{id}`.
pub async fn get_advert_handler(
    Extension(state): Extension<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<AdvertView>, ApiError> {
    let id = advert_id(path)?;

    let advert =
        in_transaction(&state, move |tx| Ok(adboard_adverts::get_by_id(tx, id)?)).await?;

    Ok(Json(AdvertView {
        creation_time: advert.creation_time_iso(),
        adv: advert.title,
    }))
}

/// Handler for `POST /test/`.
pub async fn create_advert_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    let advert = validate_create(&payload).map_err(ApiError::Validation)?;

    let id =
        in_transaction(&state, move |tx| Ok(adboard_adverts::create(tx, &advert)?)).await?;

    tracing::info!(id, "advertisement created");
    Ok(Json(json!({"status": "ok", "id": id})))
}

/// Handler for `PATCH /test/{id}`.
///
/// Every supplied field is applied in the same transaction.
pub async fn patch_advert_handler(
    Extension(state): Extension<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = advert_id(path)?;
    let Json(payload) = payload?;
    let changes = validate_patch(&payload).map_err(ApiError::Validation)?;

    in_transaction(&state, move |tx| Ok(adboard_adverts::patch(tx, id, &changes)?)).await?;

    tracing::info!(id, "advertisement patched");
    Ok(Json(json!({"status": "ok"})))
}

/// Handler for `DELETE /test/{id}`.
pub async fn delete_advert_handler(
    Extension(state): Extension<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = advert_id(path)?;

    in_transaction(&state, move |tx| Ok(adboard_adverts::delete(tx, id)?)).await?;

    tracing::info!(id, "advertisement deleted");
    Ok(Json(json!({"status": "ok"})))
}

/// Fallback for unknown routes.
pub async fn not_found_handler() -> ApiError {
    ApiError::NotFound("not found".to_string())
}
