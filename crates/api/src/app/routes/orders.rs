use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use catering_core::OrderId;
use catering_infra::FulfillmentService;
use catering_orders::OrderStatus;

use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(place_order))
        .route("/:id", get(get_order).delete(delete_order))
        .route("/:id/status", post(change_status))
        .route("/:id/cancel", post(cancel_order))
}

pub async fn place_order(
    Extension(services): Extension<Arc<FulfillmentService>>,
    Json(body): Json<dto::PlaceOrderRequest>,
) -> axum::response::Response {
    match services.place_order(body.menu_ids, body.person_number).await {
        Ok(order) => (StatusCode::CREATED, Json(dto::order_to_json(&order))).into_response(),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<FulfillmentService>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.get_order(order_id).await {
        Ok(order) => Json(dto::order_to_json(&order)).into_response(),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn change_status(
    Extension(services): Extension<Arc<FulfillmentService>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeStatusRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let to: OrderStatus = match body.status.parse() {
        Ok(s) => s,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_status", format!("{e}"));
        }
    };

    match services.transition_order(order_id, to).await {
        Ok(order) => Json(dto::order_to_json(&order)).into_response(),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<FulfillmentService>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.cancel_order(order_id).await {
        Ok(order) => Json(dto::order_to_json(&order)).into_response(),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn delete_order(
    Extension(services): Extension<Arc<FulfillmentService>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.delete_pending_order(order_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}
