use thiserror::Error;

use catering_core::DomainError;

use crate::status::OrderStatus;

/// Lifecycle rule violations.
///
/// `NotCancellable` is a policy rule and stays distinct from a failed table
/// lookup (`InvalidTransition`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("order in status {status} can no longer be cancelled")]
    NotCancellable { status: OrderStatus },

    #[error("order in status {status} can no longer be deleted")]
    NotDeletable { status: OrderStatus },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl OrderError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
