//! Catalog seed: the JSON shape used to load ingredients, dishes and menus
//! into a store at start-up.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use catering_core::{DishId, DomainError, DomainResult, Entity, MenuId};

use crate::bom::{Dish, Menu};
use crate::ingredient::Ingredient;

/// Menu as stored: dishes referenced by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuSeed {
    pub id: MenuId,
    pub name: String,
    pub person_min: u32,
    pub remaining_qty: i64,
    pub price_per_person: Decimal,
    #[serde(default = "default_published")]
    pub published: bool,
    #[serde(default)]
    pub dish_ids: Vec<DishId>,
}

fn default_published() -> bool {
    true
}

impl Entity for MenuSeed {
    type Id = MenuId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn ensure_unique_ids<E: Entity>(records: &[E], kind: &str) -> DomainResult<()> {
    let mut seen = std::collections::HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(*record.id()) {
            return Err(DomainError::validation(format!(
                "duplicate {kind} id {} ({})",
                record.id(),
                record.name()
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub dishes: Vec<Dish>,
    #[serde(default)]
    pub menus: Vec<MenuSeed>,
}

impl CatalogSeed {
    /// Check every record and every reference in the graph.
    pub fn validate(&self) -> DomainResult<()> {
        ensure_unique_ids(&self.ingredients, "ingredient")?;
        ensure_unique_ids(&self.dishes, "dish")?;
        ensure_unique_ids(&self.menus, "menu")?;
        for ingredient in &self.ingredients {
            ingredient.validate()?;
        }
        let known: std::collections::HashSet<_> = self.ingredients.iter().map(|i| i.id).collect();
        for dish in &self.dishes {
            dish.validate()?;
            if let Some(r) = dish
                .requirements
                .iter()
                .find(|r| !known.contains(&r.ingredient_id))
            {
                return Err(DomainError::validation(format!(
                    "dish {} references unknown ingredient {}",
                    dish.id, r.ingredient_id
                )));
            }
        }
        self.menus().map(|_| ())
    }

    /// Menus with their dishes resolved.
    pub fn menus(&self) -> DomainResult<Vec<Menu>> {
        let dishes: HashMap<DishId, &Dish> = self.dishes.iter().map(|d| (d.id, d)).collect();
        self.menus
            .iter()
            .map(|seed| {
                let resolved = seed
                    .dish_ids
                    .iter()
                    .map(|id| {
                        dishes.get(id).map(|d| (*d).clone()).ok_or_else(|| {
                            DomainError::validation(format!(
                                "menu {} references unknown dish {id}",
                                seed.id
                            ))
                        })
                    })
                    .collect::<DomainResult<Vec<_>>>()?;
                let menu = Menu {
                    id: seed.id,
                    name: seed.name.clone(),
                    person_min: seed.person_min,
                    remaining_qty: seed.remaining_qty,
                    price_per_person: seed.price_per_person,
                    published: seed.published,
                    dishes: resolved,
                };
                menu.validate()?;
                Ok(menu)
            })
            .collect()
    }
}
