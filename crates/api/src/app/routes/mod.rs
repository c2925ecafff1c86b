use axum::Router;

pub mod orders;
pub mod stock;
pub mod system;

/// Router for every fulfillment endpoint.
pub fn router() -> Router {
    Router::new()
        .nest("/stock", stock::router())
        .nest("/orders", orders::router())
}
