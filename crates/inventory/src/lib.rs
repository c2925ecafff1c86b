//! Ingredient ledger, bill-of-materials index and stock calculator.
//!
//! This crate contains the availability rules for the catering catalog,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).
//! Stores hand it snapshots of the stock counters; it never mutates them.

pub mod availability;
pub mod bom;
pub mod calculator;
pub mod catalog;
pub mod ingredient;
pub mod plan;

pub use availability::Availability;
pub use bom::{Dish, Menu, Requirement};
pub use calculator::{
    MenuStock, Shortage, StockLevels, StockSnapshot, all_menus_stock, find_shortages,
    has_stock_for_order, low_stock_alerts, max_orders_for_menu, max_servings_for_dish,
    orders_needed,
};
pub use catalog::{CatalogSeed, MenuSeed};
pub use ingredient::{Ingredient, LowStockAlert};
pub use plan::{StockDirection, StockPlan};
