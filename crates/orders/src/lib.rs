//! Catering orders domain module.
//!
//! This crate contains the order lifecycle rules (transition table, cancellation
//! policy, which edges move stock) and the pricing applied at placement,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod error;
pub mod order;
pub mod pricing;
pub mod status;

pub use error::OrderError;
pub use order::{
    CancelOrder, ChangeStatus, MAX_PERSON_NUMBER, MenuQuote, Order, OrderCommand, OrderEvent, OrderPlaced,
    OrderRecord, OrderStatusChanged, PlaceOrder,
};
pub use pricing::{OrderNumber, Pricing, delivery_price, quote};
pub use status::{OrderStatus, StockEffect};
