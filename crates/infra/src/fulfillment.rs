//! Fulfillment service: availability queries and the order lifecycle.
//!
//! ```text
//! request
//!   ↓
//! 1. load order / menus from the store
//!   ↓
//! 2. aggregate decides (transition table, cancel policy, pricing)
//!   ↓
//! 3. StockEffect of the decided transition picks the plan (none, deduct, restore)
//!   ↓
//! 4. status + plan commit in one unit of work, guarded by the order version
//! ```
//!
//! A confirm or cancel that races another transition of the same order loses
//! the version check and fails with `Conflict` with nothing applied, so stock
//! is consumed and restored at most once per order.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument, warn};

use catering_core::{AggregateRoot, DishId, ExpectedVersion, IngredientId, MenuId, OrderId};
use catering_inventory::{
    Availability, Ingredient, LowStockAlert, Menu, MenuStock, Shortage, StockDirection,
    StockPlan, StockSnapshot, all_menus_stock, find_shortages, low_stock_alerts,
    max_orders_for_menu, max_servings_for_dish, orders_needed,
};
use catering_orders::{
    CancelOrder, ChangeStatus, MenuQuote, Order, OrderCommand, OrderEvent, OrderNumber,
    OrderStatus, PlaceOrder, StockEffect,
};

use crate::error::FulfillmentError;
use crate::stock_engine::StockMutationEngine;
use crate::store::FulfillmentStore;

/// Answer to "can this menu serve `person_number` people right now?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feasibility {
    pub menu_id: MenuId,
    pub person_number: u32,
    pub feasible: bool,
    pub orders_needed: Option<u64>,
    pub max_orders: Availability,
    pub remaining_qty: i64,
    pub shortages: Vec<Shortage>,
}

#[derive(Clone)]
pub struct FulfillmentService {
    store: Arc<dyn FulfillmentStore>,
    engine: StockMutationEngine,
}

impl core::fmt::Debug for FulfillmentService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FulfillmentService").finish_non_exhaustive()
    }
}

impl FulfillmentService {
    pub fn new(store: Arc<dyn FulfillmentStore>) -> Self {
        let engine = StockMutationEngine::new(store.clone());
        Self { store, engine }
    }

    pub fn store(&self) -> &Arc<dyn FulfillmentStore> {
        &self.store
    }

    pub fn engine(&self) -> &StockMutationEngine {
        &self.engine
    }

    /// Current stock of every ingredient the menus consume.
    async fn levels_for(&self, menus: &[Menu]) -> Result<StockSnapshot, FulfillmentError> {
        let mut ids: Vec<IngredientId> = menus.iter().flat_map(Menu::ingredient_ids).collect();
        ids.sort();
        ids.dedup();
        let ingredients = self.store.ingredients_by_ids(&ids).await?;
        Ok(StockSnapshot::from_ingredients(&ingredients))
    }

    // ---- stock calculator ----

    #[instrument(skip(self), fields(menu_id = %menu_id), err)]
    pub async fn compute_menu_availability(
        &self,
        menu_id: MenuId,
    ) -> Result<Availability, FulfillmentError> {
        let menu = self.store.get_menu(menu_id).await?;
        let levels = self.levels_for(std::slice::from_ref(&menu)).await?;
        Ok(max_orders_for_menu(&menu, &levels))
    }

    #[instrument(skip(self), fields(dish_id = %dish_id), err)]
    pub async fn compute_dish_availability(
        &self,
        dish_id: DishId,
    ) -> Result<Availability, FulfillmentError> {
        let dish = self.store.get_dish(dish_id).await?;
        let ids: Vec<IngredientId> = dish.requirements.iter().map(|r| r.ingredient_id).collect();
        let ingredients = self.store.ingredients_by_ids(&ids).await?;
        Ok(max_servings_for_dish(
            &dish,
            &StockSnapshot::from_ingredients(&ingredients),
        ))
    }

    pub async fn check_order_feasible(
        &self,
        menu_id: MenuId,
        person_number: u32,
    ) -> Result<bool, FulfillmentError> {
        Ok(self.feasibility(menu_id, person_number).await?.feasible)
    }

    #[instrument(skip(self), fields(menu_id = %menu_id), err)]
    pub async fn feasibility(
        &self,
        menu_id: MenuId,
        person_number: u32,
    ) -> Result<Feasibility, FulfillmentError> {
        if person_number < 1 {
            return Err(FulfillmentError::Validation(
                "person_number must be at least 1".to_string(),
            ));
        }
        let menu = self.store.get_menu(menu_id).await?;
        let levels = self.levels_for(std::slice::from_ref(&menu)).await?;
        let shortages = find_shortages(&menu, person_number, &levels);
        Ok(Feasibility {
            menu_id,
            person_number,
            feasible: shortages.is_empty(),
            orders_needed: orders_needed(person_number, menu.person_min),
            max_orders: max_orders_for_menu(&menu, &levels),
            remaining_qty: menu.remaining_qty,
            shortages,
        })
    }

    pub async fn list_low_stock_alerts(&self) -> Result<Vec<LowStockAlert>, FulfillmentError> {
        let low = self.store.list_low_stock_ingredients().await?;
        Ok(low_stock_alerts(&low))
    }

    pub async fn all_menus_stock(&self) -> Result<Vec<MenuStock>, FulfillmentError> {
        let menus = self.store.list_menus().await?;
        let ingredients = self.store.list_ingredients().await?;
        Ok(all_menus_stock(
            &menus,
            &StockSnapshot::from_ingredients(&ingredients),
        ))
    }

    // ---- administrative stock ----

    pub async fn adjust_ingredient_stock(
        &self,
        id: IngredientId,
        delta: Decimal,
    ) -> Result<Ingredient, FulfillmentError> {
        self.engine.adjust_ingredient_stock(id, delta).await
    }

    pub async fn adjust_menu_quota(&self, id: MenuId, delta: i64) -> Result<Menu, FulfillmentError> {
        self.engine.adjust_menu_quota(id, delta).await
    }

    // ---- order lifecycle ----

    /// Validate, check feasibility, price and store a new `pending` order.
    ///
    /// Placement only checks stock; consumption happens on confirmation.
    #[instrument(skip(self), err)]
    pub async fn place_order(
        &self,
        menu_ids: Vec<MenuId>,
        person_number: u32,
    ) -> Result<Order, FulfillmentError> {
        let menus = self.engine.load_menus(&menu_ids).await?;
        let now = Utc::now();
        let order_id = OrderId::new();
        let command = OrderCommand::PlaceOrder(PlaceOrder {
            order_id,
            order_number: OrderNumber::generate(now),
            person_number,
            menus: menus.iter().map(MenuQuote::from).collect(),
            occurred_at: now,
        });
        let (order, _) = Order::empty(order_id).execute(&command)?;

        let levels = self.levels_for(&menus).await?;
        let shortages = StockPlan::deduct(menus, person_number).shortages(&levels);
        if !shortages.is_empty() {
            warn!(
                order_number = %order.order_number(),
                shortages = shortages.len(),
                "order rejected: insufficient stock"
            );
            return Err(FulfillmentError::InsufficientStock(shortages));
        }

        self.store.insert_order(&(&order).into()).await?;
        info!(
            order_id = %order_id,
            order_number = %order.order_number(),
            person_number,
            total_price = %order.total_price(),
            "order placed"
        );
        Ok(order)
    }

    pub async fn get_order(&self, id: OrderId) -> Result<Order, FulfillmentError> {
        Ok(self.store.get_order(id).await?.into())
    }

    /// Move an order along the transition table, applying the edge's stock effect.
    #[instrument(skip(self), fields(order_id = %id, to = %to), err)]
    pub async fn transition_order(
        &self,
        id: OrderId,
        to: OrderStatus,
    ) -> Result<Order, FulfillmentError> {
        let order = self.get_order(id).await?;
        let command = OrderCommand::ChangeStatus(ChangeStatus {
            order_id: id,
            to,
            occurred_at: Utc::now(),
        });
        self.commit(order, command).await
    }

    /// Cancel within the cancellation window, restoring held stock.
    #[instrument(skip(self), fields(order_id = %id), err)]
    pub async fn cancel_order(&self, id: OrderId) -> Result<Order, FulfillmentError> {
        let order = self.get_order(id).await?;
        let command = OrderCommand::CancelOrder(CancelOrder {
            order_id: id,
            occurred_at: Utc::now(),
        });
        self.commit(order, command).await
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    pub async fn delete_pending_order(&self, id: OrderId) -> Result<(), FulfillmentError> {
        let order = self.get_order(id).await?;
        order.ensure_deletable()?;
        self.store
            .delete_pending_order(id, ExpectedVersion::Exact(order.version()))
            .await?;
        info!(order_id = %id, order_number = %order.order_number(), "pending order deleted");
        Ok(())
    }

    async fn commit(&self, order: Order, command: OrderCommand) -> Result<Order, FulfillmentError> {
        let (next, events) = order.execute(&command)?;

        let effect = events
            .iter()
            .map(OrderEvent::stock_effect)
            .find(|e| *e != StockEffect::None)
            .unwrap_or(StockEffect::None);
        let plan = match effect {
            StockEffect::None => None,
            StockEffect::Consume => Some(self.engine.plan_for_order(&order, StockDirection::Deduct).await?),
            StockEffect::Restore => Some(self.engine.plan_for_order(&order, StockDirection::Restore).await?),
        };

        self.engine
            .commit_transition(&next, ExpectedVersion::Exact(order.version()), plan.as_ref())
            .await?;

        info!(
            order_id = %order.id(),
            from = %order.status(),
            to = %next.status(),
            stock_effect = ?effect,
            version = next.version(),
            "order status changed"
        );
        Ok(next)
    }
}
