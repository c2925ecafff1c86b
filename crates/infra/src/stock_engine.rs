//! Stock mutation engine: the only writer of `current_stock` and
//! `remaining_qty` on the order path.
//!
//! Every mutation is built as a [`StockPlan`] and handed to the store as one
//! unit of work, so a deduction either lands for every ingredient and menu
//! of the order or for none of them.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use catering_core::{ExpectedVersion, IngredientId, MenuId};
use catering_inventory::{Ingredient, Menu, StockDirection, StockPlan};
use catering_orders::{Order, OrderRecord};

use crate::error::FulfillmentError;
use crate::store::{FulfillmentStore, StoreError};

#[derive(Clone)]
pub struct StockMutationEngine {
    store: Arc<dyn FulfillmentStore>,
}

impl core::fmt::Debug for StockMutationEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StockMutationEngine").finish_non_exhaustive()
    }
}

impl StockMutationEngine {
    pub fn new(store: Arc<dyn FulfillmentStore>) -> Self {
        Self { store }
    }

    pub(crate) async fn load_menus(&self, ids: &[MenuId]) -> Result<Vec<Menu>, FulfillmentError> {
        let mut menus = Vec::with_capacity(ids.len());
        for id in ids {
            menus.push(self.store.get_menu(*id).await?);
        }
        Ok(menus)
    }

    /// The plan an order's stock effect applies: every menu of the order at
    /// its `person_number`.
    pub async fn plan_for_order(
        &self,
        order: &Order,
        direction: StockDirection,
    ) -> Result<StockPlan, FulfillmentError> {
        let menus = self.load_menus(order.menu_ids()).await?;
        Ok(match direction {
            StockDirection::Deduct => StockPlan::deduct(menus, order.person_number()),
            StockDirection::Restore => StockPlan::restore(menus, order.person_number()),
        })
    }

    /// Consume one order unit of `menu_id` and its ingredients for
    /// `person_number` servings.
    pub async fn deduct_for_order(
        &self,
        menu_id: MenuId,
        person_number: u32,
    ) -> Result<StockPlan, FulfillmentError> {
        self.deduct_for_menus(&[menu_id], person_number).await
    }

    /// Exact inverse of [`deduct_for_order`](Self::deduct_for_order).
    pub async fn restore_for_order(
        &self,
        menu_id: MenuId,
        person_number: u32,
    ) -> Result<StockPlan, FulfillmentError> {
        self.restore_for_menus(&[menu_id], person_number).await
    }

    #[instrument(skip(self), err)]
    pub async fn deduct_for_menus(
        &self,
        menu_ids: &[MenuId],
        person_number: u32,
    ) -> Result<StockPlan, FulfillmentError> {
        let plan = StockPlan::deduct(self.load_menus(menu_ids).await?, person_number);
        self.apply(&plan).await?;
        Ok(plan)
    }

    #[instrument(skip(self), err)]
    pub async fn restore_for_menus(
        &self,
        menu_ids: &[MenuId],
        person_number: u32,
    ) -> Result<StockPlan, FulfillmentError> {
        let plan = StockPlan::restore(self.load_menus(menu_ids).await?, person_number);
        self.apply(&plan).await?;
        Ok(plan)
    }

    /// Apply a prepared plan as one unit of work.
    pub async fn apply(&self, plan: &StockPlan) -> Result<(), FulfillmentError> {
        match self.store.apply_plan(plan).await {
            Ok(()) => {
                log_applied(plan);
                Ok(())
            }
            Err(err) => Err(log_rejected(err)),
        }
    }

    /// Administrative restock (positive) or write-off (negative).
    #[instrument(skip(self), fields(ingredient_id = %id, delta = %delta), err)]
    pub async fn adjust_ingredient_stock(
        &self,
        id: IngredientId,
        delta: Decimal,
    ) -> Result<Ingredient, FulfillmentError> {
        let ingredient = self
            .store
            .atomic_adjust_stock(id, delta)
            .await
            .map_err(log_rejected)?;
        info!(
            ingredient_id = %id,
            %delta,
            current_stock = %ingredient.current_stock,
            "ingredient stock adjusted"
        );
        Ok(ingredient)
    }

    /// Administrative change to a menu's `remaining_qty`.
    #[instrument(skip(self), fields(menu_id = %id), err)]
    pub async fn adjust_menu_quota(&self, id: MenuId, delta: i64) -> Result<Menu, FulfillmentError> {
        let menu = self
            .store
            .atomic_adjust_remaining_qty(id, delta)
            .await
            .map_err(log_rejected)?;
        info!(menu_id = %id, delta, remaining_qty = menu.remaining_qty, "menu quota adjusted");
        Ok(menu)
    }

    /// Persist an order transition and its plan in one unit of work.
    pub async fn commit_transition(
        &self,
        next: &Order,
        expected: ExpectedVersion,
        plan: Option<&StockPlan>,
    ) -> Result<(), FulfillmentError> {
        let record = OrderRecord::from(next);
        self.store
            .commit_transition(&record, expected, plan)
            .await
            .map_err(log_rejected)?;
        if let Some(plan) = plan {
            log_applied(plan);
        }
        Ok(())
    }
}

fn log_applied(plan: &StockPlan) {
    info!(
        direction = ?plan.direction(),
        person_number = plan.person_number(),
        menus = ?plan.menu_ids(),
        ingredients = plan.ingredient_ids().len(),
        "stock plan committed"
    );
}

fn log_rejected(err: StoreError) -> FulfillmentError {
    match &err {
        StoreError::InsufficientStock(shortages) => {
            warn!(shortages = shortages.len(), error = %err, "stock mutation rejected");
        }
        StoreError::Concurrency(msg) => {
            warn!(%msg, "concurrent modification detected");
        }
        _ => {}
    }
    err.into()
}
