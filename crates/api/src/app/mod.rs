//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store adapter selection and catalog seeding
//! - `routes/`: HTTP routes + handlers (stock and orders)
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use catering_infra::FulfillmentService;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router over an already wired service.
pub fn build_app(services: FulfillmentService) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(ServiceBuilder::new().layer(Extension(Arc::new(services))))
}
