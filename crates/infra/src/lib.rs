//! Infrastructure layer: store adapters, the stock mutation engine and the
//! fulfillment service that wires the order lifecycle to stock.

pub mod error;
pub mod fulfillment;
pub mod stock_engine;
pub mod store;

pub use error::FulfillmentError;
pub use fulfillment::{Feasibility, FulfillmentService};
pub use stock_engine::StockMutationEngine;
pub use store::{
    CatalogStore, EntityKind, FulfillmentStore, InMemoryStore, OrderRepository, PostgresStore,
    StockLedger, StoreError,
};
