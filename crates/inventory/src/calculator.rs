//! Stock calculator: bottleneck availability over the BOM graph.
//!
//! All functions are pure and read-only. They take the current counters through
//! [`StockLevels`] so the same rules run against a dashboard snapshot or against
//! rows a store has just locked inside a transaction.
//!
//! Servings are floored per ingredient, the dish minimum is the bottleneck, and
//! servings are floored again into order units of `person_min`. Orders needed
//! are ceiled, so partial servings are never promised.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use catering_core::{IngredientId, MenuId};

use crate::availability::Availability;
use crate::bom::{Dish, Menu};
use crate::ingredient::{Ingredient, LowStockAlert};

/// Read access to the store-owned counters.
pub trait StockLevels {
    fn ingredient_stock(&self, id: &IngredientId) -> Option<Decimal>;

    /// Fresh `remaining_qty` for a menu, when the caller has one newer than
    /// the menu record it passes in.
    fn remaining_qty(&self, _id: &MenuId) -> Option<i64> {
        None
    }
}

/// Point-in-time copy of the counters a calculation needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockSnapshot {
    ingredients: HashMap<IngredientId, Decimal>,
    remaining: HashMap<MenuId, i64>,
}

impl StockSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ingredients<'a>(ingredients: impl IntoIterator<Item = &'a Ingredient>) -> Self {
        let mut snapshot = Self::new();
        for i in ingredients {
            snapshot.set_ingredient(i.id, i.current_stock);
        }
        snapshot
    }

    pub fn with_ingredient(mut self, id: IngredientId, stock: Decimal) -> Self {
        self.set_ingredient(id, stock);
        self
    }

    pub fn with_remaining_qty(mut self, id: MenuId, remaining: i64) -> Self {
        self.set_remaining_qty(id, remaining);
        self
    }

    pub fn set_ingredient(&mut self, id: IngredientId, stock: Decimal) {
        self.ingredients.insert(id, stock);
    }

    pub fn set_remaining_qty(&mut self, id: MenuId, remaining: i64) {
        self.remaining.insert(id, remaining);
    }
}

impl StockLevels for StockSnapshot {
    fn ingredient_stock(&self, id: &IngredientId) -> Option<Decimal> {
        self.ingredients.get(id).copied()
    }

    fn remaining_qty(&self, id: &MenuId) -> Option<i64> {
        self.remaining.get(id).copied()
    }
}

impl StockLevels for HashMap<IngredientId, Ingredient> {
    fn ingredient_stock(&self, id: &IngredientId) -> Option<Decimal> {
        self.get(id).map(|i| i.current_stock)
    }
}

/// Why an order cannot be served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shortage {
    Ingredient {
        ingredient_id: IngredientId,
        available: Decimal,
        required: Decimal,
    },
    MenuQuota {
        menu_id: MenuId,
        remaining: i64,
    },
}

impl core::fmt::Display for Shortage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Shortage::Ingredient {
                ingredient_id,
                available,
                required,
            } => write!(
                f,
                "ingredient {ingredient_id}: {available} available, {required} required"
            ),
            Shortage::MenuQuota { menu_id, remaining } => {
                write!(f, "menu {menu_id}: {remaining} order units remaining")
            }
        }
    }
}

/// Row of the batch menu listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuStock {
    pub menu_id: MenuId,
    pub name: String,
    pub max_orders: Availability,
    pub remaining_qty: i64,
}

fn stock_of<L: StockLevels + ?Sized>(levels: &L, id: &IngredientId) -> Decimal {
    // Unknown ingredients count as empty; negative counters as zero.
    levels
        .ingredient_stock(id)
        .unwrap_or(Decimal::ZERO)
        .max(Decimal::ZERO)
}

fn remaining_of<L: StockLevels + ?Sized>(menu: &Menu, levels: &L) -> i64 {
    levels.remaining_qty(&menu.id).unwrap_or(menu.remaining_qty)
}

/// Max servings of `dish` the stock allows: min over requirements of
/// `floor(stock / quantity)`; no constraining requirement means unbounded.
pub fn max_servings_for_dish<L: StockLevels + ?Sized>(dish: &Dish, levels: &L) -> Availability {
    dish.requirements
        .iter()
        .filter(|r| r.constrains())
        .map(|r| {
            let stock = stock_of(levels, &r.ingredient_id);
            let servings = stock
                .checked_div(r.quantity)
                .map(|q| q.floor().to_u64().unwrap_or(u64::MAX))
                .unwrap_or(u64::MAX);
            Availability::Bounded(servings)
        })
        .fold(Availability::Unbounded, Ord::min)
}

/// Max order units of `menu`: bottleneck dish servings floored by `person_min`.
pub fn max_orders_for_menu<L: StockLevels + ?Sized>(menu: &Menu, levels: &L) -> Availability {
    menu.dishes
        .iter()
        .map(|d| max_servings_for_dish(d, levels))
        .fold(Availability::Unbounded, Ord::min)
        .per_unit(menu.person_min)
}

/// `ceil(person_number / person_min)`; `None` when `person_min == 0`.
pub fn orders_needed(person_number: u32, person_min: u32) -> Option<u64> {
    if person_min == 0 {
        return None;
    }
    Some(u64::from(person_number).div_ceil(u64::from(person_min)))
}

pub fn has_stock_for_order<L: StockLevels + ?Sized>(
    menu: &Menu,
    person_number: u32,
    levels: &L,
) -> bool {
    if remaining_of(menu, levels) < 1 {
        return false;
    }
    match orders_needed(person_number, menu.person_min) {
        None => true,
        Some(needed) => max_orders_for_menu(menu, levels).covers(needed),
    }
}

/// Same decision as [`has_stock_for_order`], naming what is short.
///
/// An ingredient is short when its stock cannot cover the servings reserved
/// by the order units needed (`orders_needed * person_min`) for some dish.
/// Empty result iff `has_stock_for_order` is true.
pub fn find_shortages<L: StockLevels + ?Sized>(
    menu: &Menu,
    person_number: u32,
    levels: &L,
) -> Vec<Shortage> {
    let mut shortages = Vec::new();

    let remaining = remaining_of(menu, levels);
    if remaining < 1 {
        shortages.push(Shortage::MenuQuota {
            menu_id: menu.id,
            remaining,
        });
    }

    let Some(needed) = orders_needed(person_number, menu.person_min) else {
        return shortages;
    };
    let servings = Decimal::from(needed) * Decimal::from(menu.person_min);

    let mut worst: BTreeMap<IngredientId, (Decimal, Decimal)> = BTreeMap::new();
    for req in menu.dishes.iter().flat_map(|d| d.requirements.iter()) {
        if !req.constrains() {
            continue;
        }
        let available = stock_of(levels, &req.ingredient_id);
        let required = req.quantity.checked_mul(servings).unwrap_or(Decimal::MAX);
        if available < required {
            let entry = worst
                .entry(req.ingredient_id)
                .or_insert((available, required));
            entry.1 = entry.1.max(required);
        }
    }

    shortages.extend(
        worst
            .into_iter()
            .map(|(ingredient_id, (available, required))| Shortage::Ingredient {
                ingredient_id,
                available,
                required,
            }),
    );
    shortages
}

/// Every ingredient strictly below its minimum level, in name order.
pub fn low_stock_alerts<'a>(ingredients: impl IntoIterator<Item = &'a Ingredient>) -> Vec<LowStockAlert> {
    let mut alerts: Vec<LowStockAlert> = ingredients
        .into_iter()
        .filter(|i| i.is_low_stock())
        .map(LowStockAlert::from)
        .collect();
    alerts.sort_by(|a, b| a.name.cmp(&b.name));
    alerts
}

/// Batch availability of every published menu.
pub fn all_menus_stock<'a, L: StockLevels + ?Sized>(
    menus: impl IntoIterator<Item = &'a Menu>,
    levels: &L,
) -> Vec<MenuStock> {
    menus
        .into_iter()
        .filter(|m| m.published)
        .map(|m| MenuStock {
            menu_id: m.id,
            name: m.name.clone(),
            max_orders: max_orders_for_menu(m, levels),
            remaining_qty: remaining_of(m, levels),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bom::Requirement;
    use catering_core::DishId;
    use proptest::prelude::*;

    fn dish(reqs: Vec<(IngredientId, Decimal)>) -> Dish {
        Dish::new(
            DishId::new(),
            "dish",
            reqs.into_iter()
                .map(|(id, q)| Requirement::new(id, q).unwrap())
                .collect(),
        )
        .unwrap()
    }

    fn menu(person_min: u32, remaining_qty: i64, dishes: Vec<Dish>) -> Menu {
        Menu {
            id: MenuId::new(),
            name: "menu".into(),
            person_min,
            remaining_qty,
            price_per_person: Decimal::from(20),
            published: true,
            dishes,
        }
    }

    fn ingredient(name: &str, stock: i64, min: i64) -> Ingredient {
        Ingredient::new(IngredientId::new(), name, "g", Decimal::from(stock), Decimal::from(min)).unwrap()
    }

    #[test]
    fn dish_servings_are_floored_per_requirement() {
        // 100 g in stock, 20 g per serving.
        let x = IngredientId::new();
        let levels = StockSnapshot::new().with_ingredient(x, Decimal::from(100));
        let d = dish(vec![(x, Decimal::from(20))]);
        assert_eq!(max_servings_for_dish(&d, &levels), Availability::Bounded(5));

        let levels = StockSnapshot::new().with_ingredient(x, Decimal::from(119));
        assert_eq!(max_servings_for_dish(&d, &levels), Availability::Bounded(5));
    }

    #[test]
    fn dish_bottleneck_is_the_scarcest_ingredient() {
        let a = IngredientId::new();
        let b = IngredientId::new();
        let levels = StockSnapshot::new()
            .with_ingredient(a, Decimal::from(1000))
            .with_ingredient(b, Decimal::new(15, 1));
        let d = dish(vec![(a, Decimal::from(10)), (b, Decimal::new(25, 2))]);
        // a: 100 servings, b: 1.5 / 0.25 = 6 servings.
        assert_eq!(max_servings_for_dish(&d, &levels), Availability::Bounded(6));
    }

    #[test]
    fn dish_without_constraints_is_unbounded() {
        let levels = StockSnapshot::new();
        assert_eq!(max_servings_for_dish(&dish(vec![]), &levels), Availability::Unbounded);

        let x = IngredientId::new();
        assert_eq!(
            max_servings_for_dish(&dish(vec![(x, Decimal::ZERO)]), &levels),
            Availability::Unbounded
        );
    }

    #[test]
    fn unknown_ingredient_counts_as_empty() {
        let d = dish(vec![(IngredientId::new(), Decimal::ONE)]);
        assert_eq!(max_servings_for_dish(&d, &StockSnapshot::new()), Availability::Bounded(0));
    }

    #[test]
    fn menu_orders_floor_bottleneck_by_person_min() {
        let x = IngredientId::new();
        // 47 servings available.
        let levels = StockSnapshot::new().with_ingredient(x, Decimal::from(47));
        let m = menu(10, 3, vec![dish(vec![(x, Decimal::ONE)])]);
        assert_eq!(max_orders_for_menu(&m, &levels), Availability::Bounded(4));
    }

    #[test]
    fn menu_edge_cases_are_unbounded() {
        let x = IngredientId::new();
        let levels = StockSnapshot::new().with_ingredient(x, Decimal::from(47));
        assert_eq!(max_orders_for_menu(&menu(10, 3, vec![]), &levels), Availability::Unbounded);
        assert_eq!(
            max_orders_for_menu(&menu(0, 3, vec![dish(vec![(x, Decimal::ONE)])]), &levels),
            Availability::Unbounded
        );
    }

    #[test]
    fn order_feasible_when_needed_units_fit() {
        let x = IngredientId::new();
        let levels = StockSnapshot::new().with_ingredient(x, Decimal::from(47));
        let m = menu(10, 3, vec![dish(vec![(x, Decimal::ONE)])]);

        assert_eq!(orders_needed(25, 10), Some(3));
        assert!(has_stock_for_order(&m, 25, &levels));
        assert!(find_shortages(&m, 25, &levels).is_empty());

        // 41 people need 5 units, only 4 available.
        assert!(!has_stock_for_order(&m, 41, &levels));
        assert_eq!(
            find_shortages(&m, 41, &levels),
            vec![Shortage::Ingredient {
                ingredient_id: x,
                available: Decimal::from(47),
                required: Decimal::from(50),
            }]
        );
    }

    #[test]
    fn exhausted_quota_fails_fast() {
        let m = menu(10, 0, vec![]);
        let levels = StockSnapshot::new();
        assert!(!has_stock_for_order(&m, 10, &levels));
        assert_eq!(
            find_shortages(&m, 10, &levels),
            vec![Shortage::MenuQuota {
                menu_id: m.id,
                remaining: 0
            }]
        );

        // A fresher counter from the store wins over the record.
        let levels = StockSnapshot::new().with_remaining_qty(m.id, 2);
        assert!(has_stock_for_order(&m, 10, &levels));
    }

    #[test]
    fn alerts_list_only_ingredients_below_threshold() {
        let items = vec![
            ingredient("Salt", 5, 10),
            ingredient("Butter", 100, 10),
            ingredient("Cream", 10, 10),
            ingredient("Basil", 0, 1),
        ];
        let names: Vec<_> = low_stock_alerts(&items).into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["Basil", "Salt"]);
    }

    #[test]
    fn batch_listing_skips_unpublished_and_reports_sentinel() {
        let x = IngredientId::new();
        let levels = StockSnapshot::new().with_ingredient(x, Decimal::from(47));
        let open = menu(0, 5, vec![dish(vec![(x, Decimal::ONE)])]);
        let mut hidden = menu(10, 5, vec![]);
        hidden.published = false;

        let rows = all_menus_stock([&open, &hidden], &levels);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].menu_id, open.id);
        assert_eq!(rows[0].max_orders.to_sentinel(), -1);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: dish servings equal the min over requirements of floor(stock / quantity).
        #[test]
        fn dish_servings_match_min_floor(
            reqs in prop::collection::vec((0i64..10_000, 1i64..500), 1..6)
        ) {
            let mut levels = StockSnapshot::new();
            let mut requirements = Vec::new();
            let mut expected = u64::MAX;
            for (stock, qty) in reqs {
                let id = IngredientId::new();
                levels.set_ingredient(id, Decimal::from(stock));
                requirements.push((id, Decimal::from(qty)));
                expected = expected.min((stock / qty) as u64);
            }
            let d = dish(requirements);
            prop_assert_eq!(max_servings_for_dish(&d, &levels), Availability::Bounded(expected));
        }

        /// Property: menu orders equal floor(min dish servings / person_min).
        #[test]
        fn menu_orders_match_floored_bottleneck(
            stocks in prop::collection::vec(0i64..5_000, 1..5),
            person_min in 1u32..30
        ) {
            let mut levels = StockSnapshot::new();
            let mut dishes = Vec::new();
            for stock in &stocks {
                let id = IngredientId::new();
                levels.set_ingredient(id, Decimal::from(*stock));
                dishes.push(dish(vec![(id, Decimal::ONE)]));
            }
            let m = menu(person_min, 1, dishes);
            let bottleneck = *stocks.iter().min().unwrap() as u64;
            prop_assert_eq!(
                max_orders_for_menu(&m, &levels),
                Availability::Bounded(bottleneck / u64::from(person_min))
            );
        }

        /// Property: shortages are reported exactly when the order is infeasible.
        #[test]
        fn shortages_agree_with_feasibility(
            stock_a in 0i64..2_000,
            stock_b in 0i64..2_000,
            qty_cents in 1i64..500,
            person_min in 0u32..20,
            person_number in 1u32..200,
            remaining in 0i64..3
        ) {
            let a = IngredientId::new();
            let b = IngredientId::new();
            let levels = StockSnapshot::new()
                .with_ingredient(a, Decimal::from(stock_a))
                .with_ingredient(b, Decimal::from(stock_b));
            let m = menu(person_min, remaining, vec![
                dish(vec![(a, Decimal::new(qty_cents, 2))]),
                dish(vec![(a, Decimal::ONE), (b, Decimal::TWO)]),
            ]);
            prop_assert_eq!(
                has_stock_for_order(&m, person_number, &levels),
                find_shortages(&m, person_number, &levels).is_empty()
            );
        }
    }
}
