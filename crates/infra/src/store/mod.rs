//! Data-access contracts and their adapters.

mod in_memory;
mod postgres;
mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{
    CatalogStore, EntityKind, FulfillmentStore, OrderRepository, StockLedger, StoreError,
};
pub(crate) use r#trait::describe_shortages;
