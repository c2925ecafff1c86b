//! Stock plans: the exact counter deltas one order applies or gives back.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use catering_core::{DomainError, DomainResult, IngredientId, MenuId};

use crate::bom::Menu;
use crate::calculator::{Shortage, StockLevels, find_shortages};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StockDirection {
    Deduct,
    Restore,
}

/// Deduction or restoration for one order: every menu of the order at the
/// order's `person_number`.
///
/// Per menu: `remaining_qty` moves by one order unit and each ingredient by
/// `quantity * person_number` for every dish requiring it. Deltas are keyed in
/// id order so stores lock rows in the same order for every plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockPlan {
    direction: StockDirection,
    person_number: u32,
    menus: Vec<Menu>,
}

impl StockPlan {
    pub fn deduct(menus: Vec<Menu>, person_number: u32) -> Self {
        Self {
            direction: StockDirection::Deduct,
            person_number,
            menus,
        }
    }

    pub fn restore(menus: Vec<Menu>, person_number: u32) -> Self {
        Self {
            direction: StockDirection::Restore,
            person_number,
            menus,
        }
    }

    pub fn direction(&self) -> StockDirection {
        self.direction
    }

    pub fn person_number(&self) -> u32 {
        self.person_number
    }

    pub fn menus(&self) -> &[Menu] {
        &self.menus
    }

    fn sign(&self) -> i64 {
        match self.direction {
            StockDirection::Deduct => -1,
            StockDirection::Restore => 1,
        }
    }

    pub fn menu_deltas(&self) -> BTreeMap<MenuId, i64> {
        let mut deltas = BTreeMap::new();
        for menu in &self.menus {
            *deltas.entry(menu.id).or_insert(0) += self.sign();
        }
        deltas
    }

    /// Total quantity each ingredient moves by, unsigned. `None` marks a total
    /// that does not fit in a `Decimal`.
    fn ingredient_totals(&self) -> BTreeMap<IngredientId, Option<Decimal>> {
        let persons = Decimal::from(self.person_number);
        let mut totals: BTreeMap<IngredientId, Option<Decimal>> = BTreeMap::new();
        for req in self
            .menus
            .iter()
            .flat_map(|m| m.dishes.iter())
            .flat_map(|d| d.requirements.iter())
            .filter(|r| r.constrains())
        {
            let entry = totals.entry(req.ingredient_id).or_insert(Some(Decimal::ZERO));
            *entry = (*entry)
                .zip(req.quantity.checked_mul(persons))
                .and_then(|(sum, qty)| sum.checked_add(qty));
        }
        totals
    }

    /// Signed counter deltas per ingredient.
    ///
    /// Fails when a total overflows; such a plan can never be applied.
    pub fn ingredient_deltas(&self) -> DomainResult<BTreeMap<IngredientId, Decimal>> {
        let sign = Decimal::from(self.sign());
        self.ingredient_totals()
            .into_iter()
            .map(|(id, total)| match total {
                Some(total) => Ok((id, total * sign)),
                None => Err(DomainError::invariant(format!(
                    "stock delta for ingredient {id} overflows"
                ))),
            })
            .collect()
    }

    pub fn menu_ids(&self) -> Vec<MenuId> {
        self.menu_deltas().into_keys().collect()
    }

    pub fn ingredient_ids(&self) -> Vec<IngredientId> {
        self.ingredient_totals().into_keys().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.menus.is_empty()
    }

    /// What would be short if this plan were applied to `levels` now.
    ///
    /// Deductions run the per-menu sufficiency rule, then check the summed
    /// deltas so ingredients shared across dishes or menus are not
    /// over-committed. Restorations never fall short.
    pub fn shortages<L: StockLevels + ?Sized>(&self, levels: &L) -> Vec<Shortage> {
        if self.direction == StockDirection::Restore {
            return Vec::new();
        }

        let mut by_ingredient: BTreeMap<IngredientId, (Decimal, Decimal)> = BTreeMap::new();
        let mut by_menu: BTreeMap<MenuId, i64> = BTreeMap::new();

        let mut record = |shortage: Shortage| match shortage {
            Shortage::Ingredient {
                ingredient_id,
                available,
                required,
            } => {
                let entry = by_ingredient.entry(ingredient_id).or_insert((available, required));
                entry.1 = entry.1.max(required);
            }
            Shortage::MenuQuota { menu_id, remaining } => {
                by_menu.insert(menu_id, remaining);
            }
        };

        for menu in &self.menus {
            for shortage in find_shortages(menu, self.person_number, levels) {
                record(shortage);
            }
        }

        for (ingredient_id, total) in self.ingredient_totals() {
            let available = levels
                .ingredient_stock(&ingredient_id)
                .unwrap_or(Decimal::ZERO);
            // An overflowing total exceeds any stock.
            let required = total.unwrap_or(Decimal::MAX);
            if available < required {
                record(Shortage::Ingredient {
                    ingredient_id,
                    available,
                    required,
                });
            }
        }

        for (menu_id, delta) in self.menu_deltas() {
            let remaining = levels.remaining_qty(&menu_id).or_else(|| {
                self.menus
                    .iter()
                    .find(|m| m.id == menu_id)
                    .map(|m| m.remaining_qty)
            });
            if let Some(remaining) = remaining {
                if remaining.checked_add(delta).is_none_or(|n| n < 0) {
                    record(Shortage::MenuQuota { menu_id, remaining });
                }
            }
        }

        let mut shortages: Vec<Shortage> = by_menu
            .into_iter()
            .map(|(menu_id, remaining)| Shortage::MenuQuota { menu_id, remaining })
            .collect();
        shortages.extend(by_ingredient.into_iter().map(
            |(ingredient_id, (available, required))| Shortage::Ingredient {
                ingredient_id,
                available,
                required,
            },
        ));
        shortages
    }
}
