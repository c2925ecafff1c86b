use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use catering_core::{DishId, IngredientId, MenuId};
use catering_infra::FulfillmentService;

use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/menus", get(list_menus))
        .route("/menus/:id", get(get_menu_availability))
        .route("/menus/:id/feasibility", get(get_feasibility))
        .route("/menus/:id/quota", post(adjust_menu_quota))
        .route("/dishes/:id", get(get_dish_availability))
        .route("/alerts", get(list_alerts))
        .route("/ingredients/:id/adjust", post(adjust_ingredient))
}

pub async fn list_menus(
    Extension(services): Extension<Arc<FulfillmentService>>,
) -> axum::response::Response {
    match services.all_menus_stock().await {
        Ok(rows) => Json(dto::menu_stock_to_json(rows)).into_response(),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn get_menu_availability(
    Extension(services): Extension<Arc<FulfillmentService>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let menu_id: MenuId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.compute_menu_availability(menu_id).await {
        Ok(a) => Json(dto::availability_to_json("menu", menu_id.to_string(), a)).into_response(),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn get_feasibility(
    Extension(services): Extension<Arc<FulfillmentService>>,
    Path(id): Path<String>,
    Query(query): Query<dto::FeasibilityQuery>,
) -> axum::response::Response {
    let menu_id: MenuId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.feasibility(menu_id, query.person_number).await {
        Ok(f) => Json(dto::feasibility_to_json(f)).into_response(),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn adjust_menu_quota(
    Extension(services): Extension<Arc<FulfillmentService>>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdjustQuotaRequest>,
) -> axum::response::Response {
    let menu_id: MenuId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.adjust_menu_quota(menu_id, body.delta).await {
        Ok(menu) => Json(dto::menu_quota_to_json(menu)).into_response(),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn get_dish_availability(
    Extension(services): Extension<Arc<FulfillmentService>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let dish_id: DishId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.compute_dish_availability(dish_id).await {
        Ok(a) => Json(dto::availability_to_json("dish", dish_id.to_string(), a)).into_response(),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn list_alerts(
    Extension(services): Extension<Arc<FulfillmentService>>,
) -> axum::response::Response {
    match services.list_low_stock_alerts().await {
        Ok(alerts) => Json(alerts).into_response(),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn adjust_ingredient(
    Extension(services): Extension<Arc<FulfillmentService>>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdjustIngredientRequest>,
) -> axum::response::Response {
    let ingredient_id: IngredientId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.adjust_ingredient_stock(ingredient_id, body.delta).await {
        Ok(ingredient) => Json(dto::ingredient_to_json(ingredient)).into_response(),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}
