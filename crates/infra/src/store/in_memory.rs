use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use rust_decimal::Decimal;

use catering_core::{DishId, Entity, ExpectedVersion, IngredientId, MenuId, OrderId};
use catering_inventory::{
    CatalogSeed, Dish, Ingredient, Menu, MenuSeed, Shortage, StockDirection, StockLevels,
    StockPlan,
};
use catering_orders::{OrderRecord, OrderStatus};

use super::r#trait::{CatalogStore, EntityKind, OrderRepository, StockLedger, StoreError};

#[derive(Debug, Default)]
struct State {
    ingredients: HashMap<IngredientId, Ingredient>,
    dishes: HashMap<DishId, Dish>,
    menus: HashMap<MenuId, MenuSeed>,
    orders: HashMap<OrderId, OrderRecord>,
}

impl StockLevels for State {
    fn ingredient_stock(&self, id: &IngredientId) -> Option<Decimal> {
        self.ingredients.get(id).map(|i| i.current_stock)
    }

    fn remaining_qty(&self, id: &MenuId) -> Option<i64> {
        self.menus.get(id).map(|m| m.remaining_qty)
    }
}

fn upsert_all<E: Entity + Clone>(table: &mut HashMap<E::Id, E>, records: &[E]) {
    for record in records {
        table.insert(*record.id(), record.clone());
    }
}

impl State {
    fn resolve_menu(&self, seed: &MenuSeed) -> Result<Menu, StoreError> {
        let dishes = seed
            .dish_ids
            .iter()
            .map(|id| {
                self.dishes
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StoreError::not_found(EntityKind::Dish, id))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Menu {
            id: seed.id,
            name: seed.name.clone(),
            person_min: seed.person_min,
            remaining_qty: seed.remaining_qty,
            price_per_person: seed.price_per_person,
            published: seed.published,
            dishes,
        })
    }

    /// Validate the whole plan, then write it. Nothing is written on error.
    fn apply_plan(&mut self, plan: &StockPlan) -> Result<(), StoreError> {
        let menu_deltas = plan.menu_deltas();

        if let Some(missing) = menu_deltas.keys().find(|id| !self.menus.contains_key(id)) {
            return Err(StoreError::not_found(EntityKind::Menu, missing));
        }
        if plan.direction() == StockDirection::Restore {
            if let Some(missing) = plan
                .ingredient_ids()
                .into_iter()
                .find(|id| !self.ingredients.contains_key(id))
            {
                return Err(StoreError::not_found(EntityKind::Ingredient, missing));
            }
        }

        let shortages = plan.shortages(&*self);
        if !shortages.is_empty() {
            return Err(StoreError::InsufficientStock(shortages));
        }
        let ingredient_deltas = plan.ingredient_deltas()?;

        let mut next_remaining = Vec::with_capacity(menu_deltas.len());
        for (id, delta) in &menu_deltas {
            let remaining = self.menus[id].remaining_qty;
            let next = remaining
                .checked_add(*delta)
                .filter(|n| *n >= 0)
                .ok_or_else(|| {
                    StoreError::InsufficientStock(vec![Shortage::MenuQuota {
                        menu_id: *id,
                        remaining,
                    }])
                })?;
            next_remaining.push((*id, next));
        }

        let mut next_ingredients = Vec::with_capacity(ingredient_deltas.len());
        for (id, delta) in &ingredient_deltas {
            let current = self
                .ingredients
                .get(id)
                .ok_or_else(|| StoreError::not_found(EntityKind::Ingredient, id))?;
            let next = current.adjusted(*delta).map_err(|_| {
                StoreError::InsufficientStock(vec![Shortage::Ingredient {
                    ingredient_id: *id,
                    available: current.current_stock,
                    required: -*delta,
                }])
            })?;
            next_ingredients.push(next);
        }

        for (id, remaining) in next_remaining {
            if let Some(menu) = self.menus.get_mut(&id) {
                menu.remaining_qty = remaining;
            }
        }
        for ingredient in next_ingredients {
            self.ingredients.insert(ingredient.id, ingredient);
        }
        Ok(())
    }
}

/// In-memory fulfillment store.
///
/// Intended for tests/dev. Every write runs under one write lock, which
/// serializes commits and makes each of them all-or-nothing.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn get_ingredient(&self, id: IngredientId) -> Result<Ingredient, StoreError> {
        self.read()?
            .ingredients
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Ingredient, id))
    }

    async fn ingredients_by_ids(&self, ids: &[IngredientId]) -> Result<Vec<Ingredient>, StoreError> {
        let state = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.ingredients.get(id).cloned())
            .collect())
    }

    async fn list_ingredients(&self) -> Result<Vec<Ingredient>, StoreError> {
        let mut ingredients: Vec<_> = self.read()?.ingredients.values().cloned().collect();
        ingredients.sort_by_key(|i| i.id);
        Ok(ingredients)
    }

    async fn list_low_stock_ingredients(&self) -> Result<Vec<Ingredient>, StoreError> {
        let mut low: Vec<_> = self
            .read()?
            .ingredients
            .values()
            .filter(|i| i.is_low_stock())
            .cloned()
            .collect();
        low.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(low)
    }

    async fn get_dish(&self, id: DishId) -> Result<Dish, StoreError> {
        self.read()?
            .dishes
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Dish, id))
    }

    async fn get_menu(&self, id: MenuId) -> Result<Menu, StoreError> {
        let state = self.read()?;
        let seed = state
            .menus
            .get(&id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Menu, id))?;
        state.resolve_menu(seed)
    }

    async fn list_menus(&self) -> Result<Vec<Menu>, StoreError> {
        let state = self.read()?;
        let mut menus = state
            .menus
            .values()
            .map(|seed| state.resolve_menu(seed))
            .collect::<Result<Vec<_>, _>>()?;
        menus.sort_by_key(|m| m.id);
        Ok(menus)
    }

    async fn seed(&self, seed: &CatalogSeed) -> Result<(), StoreError> {
        seed.validate()?;
        let mut state = self.write()?;
        upsert_all(&mut state.ingredients, &seed.ingredients);
        upsert_all(&mut state.dishes, &seed.dishes);
        upsert_all(&mut state.menus, &seed.menus);
        Ok(())
    }
}

#[async_trait]
impl StockLedger for InMemoryStore {
    async fn atomic_adjust_stock(
        &self,
        id: IngredientId,
        delta: Decimal,
    ) -> Result<Ingredient, StoreError> {
        let mut state = self.write()?;
        let current = state
            .ingredients
            .get(&id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Ingredient, id))?;
        let next = current.adjusted(delta).map_err(|_| {
            StoreError::InsufficientStock(vec![Shortage::Ingredient {
                ingredient_id: id,
                available: current.current_stock,
                required: -delta,
            }])
        })?;
        state.ingredients.insert(id, next.clone());
        Ok(next)
    }

    async fn atomic_adjust_remaining_qty(&self, id: MenuId, delta: i64) -> Result<Menu, StoreError> {
        let mut state = self.write()?;
        let seed = state
            .menus
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Menu, id))?;
        let remaining = seed.remaining_qty;
        seed.remaining_qty = remaining
            .checked_add(delta)
            .filter(|n| *n >= 0)
            .ok_or_else(|| {
                StoreError::InsufficientStock(vec![Shortage::MenuQuota {
                    menu_id: id,
                    remaining,
                }])
            })?;
        let seed = seed.clone();
        state.resolve_menu(&seed)
    }

    async fn apply_plan(&self, plan: &StockPlan) -> Result<(), StoreError> {
        self.write()?.apply_plan(plan)
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn get_order(&self, id: OrderId) -> Result<OrderRecord, StoreError> {
        self.read()?
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Order, id))
    }

    async fn insert_order(&self, order: &OrderRecord) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::Concurrency(format!(
                "order {} already exists",
                order.id
            )));
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn commit_transition(
        &self,
        next: &OrderRecord,
        expected: ExpectedVersion,
        plan: Option<&StockPlan>,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let current = state
            .orders
            .get(&next.id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Order, next.id))?;

        expected.check(current.version)?;

        if let Some(plan) = plan {
            state.apply_plan(plan)?;
        }
        state.orders.insert(next.id, next.clone());
        Ok(())
    }

    async fn delete_pending_order(
        &self,
        id: OrderId,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let current = state
            .orders
            .get(&id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Order, id))?;

        expected.check(current.version)?;
        if current.status != OrderStatus::Pending {
            return Err(StoreError::Concurrency(format!(
                "order {id} is {} and can no longer be deleted",
                current.status
            )));
        }
        state.orders.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catering_inventory::Requirement;

    fn catalog(stock: i64, remaining_qty: i64) -> (CatalogSeed, IngredientId, MenuId) {
        let x = IngredientId::new();
        let dish = Dish::new(
            DishId::new(),
            "Risotto",
            vec![Requirement::new(x, Decimal::from(2)).unwrap()],
        )
        .unwrap();
        let menu = MenuSeed {
            id: MenuId::new(),
            name: "Italian".into(),
            person_min: 10,
            remaining_qty,
            price_per_person: Decimal::from(30),
            published: true,
            dish_ids: vec![dish.id],
        };
        let seed = CatalogSeed {
            ingredients: vec![
                Ingredient::new(x, "Rice", "kg", Decimal::from(stock), Decimal::from(5)).unwrap(),
            ],
            dishes: vec![dish],
            menus: vec![menu.clone()],
        };
        (seed, x, menu.id)
    }

    #[tokio::test]
    async fn seeded_menu_resolves_dishes() {
        let store = InMemoryStore::new();
        let (seed, _, menu_id) = catalog(100, 3);
        store.seed(&seed).await.unwrap();

        let menu = store.get_menu(menu_id).await.unwrap();
        assert_eq!(menu.dishes.len(), 1);
        assert_eq!(menu.dishes[0].name, "Risotto");
    }

    #[tokio::test]
    async fn failed_plan_writes_nothing() {
        let store = InMemoryStore::new();
        let (seed, x, menu_id) = catalog(30, 3);
        store.seed(&seed).await.unwrap();
        let menu = store.get_menu(menu_id).await.unwrap();

        // 20 persons need 40 of the 30 available.
        let err = store.apply_plan(&StockPlan::deduct(vec![menu], 20)).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock(ref s) if s.len() == 1));

        assert_eq!(store.get_ingredient(x).await.unwrap().current_stock, Decimal::from(30));
        assert_eq!(store.get_menu(menu_id).await.unwrap().remaining_qty, 3);
    }

    #[tokio::test]
    async fn adjust_stock_refuses_to_go_negative() {
        let store = InMemoryStore::new();
        let (seed, x, menu_id) = catalog(10, 1);
        store.seed(&seed).await.unwrap();

        let updated = store.atomic_adjust_stock(x, Decimal::from(-4)).await.unwrap();
        assert_eq!(updated.current_stock, Decimal::from(6));
        assert!(matches!(
            store.atomic_adjust_stock(x, Decimal::from(-7)).await,
            Err(StoreError::InsufficientStock(_))
        ));

        assert_eq!(store.atomic_adjust_remaining_qty(menu_id, -1).await.unwrap().remaining_qty, 0);
        assert!(matches!(
            store.atomic_adjust_remaining_qty(menu_id, -1).await,
            Err(StoreError::InsufficientStock(_))
        ));
    }

    #[tokio::test]
    async fn low_stock_lists_only_ingredients_below_minimum() {
        let store = InMemoryStore::new();
        let (seed, x, _) = catalog(4, 1);
        store.seed(&seed).await.unwrap();

        let low = store.list_low_stock_ingredients().await.unwrap();
        assert_eq!(low.iter().map(|i| i.id).collect::<Vec<_>>(), vec![x]);

        store.atomic_adjust_stock(x, Decimal::ONE).await.unwrap();
        assert!(store.list_low_stock_ingredients().await.unwrap().is_empty());
    }

    fn pending_order(menu_id: MenuId) -> OrderRecord {
        let now = chrono::Utc::now();
        OrderRecord {
            id: OrderId::new(),
            order_number: "CMD-20260301-ABC123".into(),
            status: OrderStatus::Pending,
            person_number: 10,
            menu_ids: vec![menu_id],
            menu_price: Decimal::from(300),
            delivery_price: Decimal::from(35),
            total_price: Decimal::from(335),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[tokio::test]
    async fn overflowing_plan_is_rejected_and_store_stays_usable() {
        let store = InMemoryStore::new();
        let x = IngredientId::new();
        let dish = Dish::new(
            DishId::new(),
            "Bulk stew",
            vec![Requirement::new(x, Decimal::MAX / Decimal::from(2)).unwrap()],
        )
        .unwrap();
        let menu = MenuSeed {
            id: MenuId::new(),
            name: "Bulk".into(),
            person_min: 0,
            remaining_qty: 5,
            price_per_person: Decimal::from(10),
            published: true,
            dish_ids: vec![dish.id],
        };
        let seed = CatalogSeed {
            ingredients: vec![
                Ingredient::new(x, "Beans", "kg", Decimal::from(1000), Decimal::ZERO).unwrap(),
            ],
            dishes: vec![dish],
            menus: vec![menu.clone()],
        };
        store.seed(&seed).await.unwrap();
        let resolved = store.get_menu(menu.id).await.unwrap();

        let err = store
            .apply_plan(&StockPlan::deduct(vec![resolved.clone()], 10))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientStock(ref s)
                if s == &vec![Shortage::Ingredient {
                    ingredient_id: x,
                    available: Decimal::from(1000),
                    required: Decimal::MAX,
                }]
        ));
        assert!(matches!(
            store.apply_plan(&StockPlan::restore(vec![resolved], 10)).await,
            Err(StoreError::Invalid(_))
        ));

        assert_eq!(store.get_menu(menu.id).await.unwrap().remaining_qty, 5);
        assert_eq!(store.get_ingredient(x).await.unwrap().current_stock, Decimal::from(1000));
    }

    #[tokio::test]
    async fn commit_transition_is_version_guarded() {
        let store = InMemoryStore::new();
        let (seed, _, menu_id) = catalog(100, 3);
        store.seed(&seed).await.unwrap();
        let order = pending_order(menu_id);
        store.insert_order(&order).await.unwrap();

        let next = OrderRecord {
            status: OrderStatus::Confirmed,
            version: 2,
            ..order.clone()
        };
        assert!(matches!(
            store.commit_transition(&next, ExpectedVersion::Exact(7), None).await,
            Err(StoreError::Concurrency(_))
        ));
        store
            .commit_transition(&next, ExpectedVersion::Exact(1), None)
            .await
            .unwrap();
        assert_eq!(store.get_order(order.id).await.unwrap(), next);
    }

    #[tokio::test]
    async fn status_override_skips_table_and_stock() {
        let store = InMemoryStore::new();
        let (seed, x, menu_id) = catalog(100, 3);
        store.seed(&seed).await.unwrap();
        let order = pending_order(menu_id);
        store.insert_order(&order).await.unwrap();

        // pending -> completed is not an edge of the lifecycle table.
        let written = store
            .persist_order_status(order.id, OrderStatus::Completed)
            .await
            .unwrap();
        assert_eq!(written.status, OrderStatus::Completed);
        assert_eq!(written.version, 2);
        assert_eq!(store.get_order(order.id).await.unwrap(), written);

        assert_eq!(store.get_ingredient(x).await.unwrap().current_stock, Decimal::from(100));
        assert_eq!(store.get_menu(menu_id).await.unwrap().remaining_qty, 3);

        assert!(matches!(
            store.persist_order_status(OrderId::new(), OrderStatus::Cancelled).await,
            Err(StoreError::NotFound { kind: EntityKind::Order, .. })
        ));
    }

    #[tokio::test]
    async fn unknown_rows_are_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.get_menu(MenuId::new()).await,
            Err(StoreError::NotFound { kind: EntityKind::Menu, .. })
        ));
        assert!(matches!(
            store.get_order(OrderId::new()).await,
            Err(StoreError::NotFound { kind: EntityKind::Order, .. })
        ));
    }
}
