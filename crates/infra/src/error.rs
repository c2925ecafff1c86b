use thiserror::Error;

use catering_core::DomainError;
use catering_inventory::Shortage;
use catering_orders::{OrderError, OrderStatus};

use crate::store::{EntityKind, StoreError, describe_shortages};

/// Error surfaced by the fulfillment core to its callers.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("order in status {status} can no longer be cancelled")]
    NotCancellable { status: OrderStatus },

    #[error("order in status {status} can no longer be deleted")]
    NotDeletable { status: OrderStatus },

    #[error("insufficient stock: {}", describe_shortages(.0))]
    InsufficientStock(Vec<Shortage>),

    #[error("validation failed: {0}")]
    Validation(String),

    /// Lost an optimistic concurrency race; re-read and retry if still wanted.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<StoreError> for FulfillmentError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { kind, id } => FulfillmentError::NotFound { kind, id },
            StoreError::Concurrency(msg) => FulfillmentError::Conflict(msg),
            StoreError::InsufficientStock(shortages) => FulfillmentError::InsufficientStock(shortages),
            StoreError::Invalid(msg) => FulfillmentError::Validation(msg),
            StoreError::Backend(msg) => FulfillmentError::Store(msg),
        }
    }
}

impl From<DomainError> for FulfillmentError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg)
            | DomainError::InvariantViolation(msg)
            | DomainError::InvalidId(msg) => FulfillmentError::Validation(msg),
            DomainError::Conflict(msg) => FulfillmentError::Conflict(msg),
            DomainError::NotFound { what, id } => FulfillmentError::NotFound {
                kind: EntityKind::from_name(what).unwrap_or(EntityKind::Order),
                id,
            },
        }
    }
}

impl From<OrderError> for FulfillmentError {
    fn from(value: OrderError) -> Self {
        match value {
            OrderError::InvalidTransition { from, to } => {
                FulfillmentError::InvalidTransition { from, to }
            }
            OrderError::NotCancellable { status } => FulfillmentError::NotCancellable { status },
            OrderError::NotDeletable { status } => FulfillmentError::NotDeletable { status },
            OrderError::Validation(msg) => FulfillmentError::Validation(msg),
            OrderError::Domain(err) => err.into(),
        }
    }
}
