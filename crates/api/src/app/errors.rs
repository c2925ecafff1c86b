use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use catering_infra::FulfillmentError;

pub fn fulfillment_error_to_response(err: FulfillmentError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        FulfillmentError::NotFound { .. } => json_error(StatusCode::NOT_FOUND, "not_found", message),
        FulfillmentError::InvalidTransition { .. } => {
            json_error(StatusCode::CONFLICT, "invalid_transition", message)
        }
        FulfillmentError::NotCancellable { .. } => {
            json_error(StatusCode::CONFLICT, "not_cancellable", message)
        }
        FulfillmentError::NotDeletable { .. } => {
            json_error(StatusCode::CONFLICT, "not_deletable", message)
        }
        FulfillmentError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        FulfillmentError::InsufficientStock(shortages) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": message,
                "shortages": shortages,
            })),
        )
            .into_response(),
        FulfillmentError::Validation(_) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", message)
        }
        FulfillmentError::Store(_) => {
            tracing::error!(error = %message, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", message)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path segment into one of the uuid-backed ids.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}
