//! Bill-of-materials index: dish -> ingredients, menu -> dishes.
//!
//! Read-only in the fulfillment path; catalog management creates and edits it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use catering_core::{DishId, DomainError, DomainResult, Entity, IngredientId, MenuId};

/// Quantity of one ingredient consumed by a single serving of a dish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub ingredient_id: IngredientId,
    pub quantity: Decimal,
}

impl Requirement {
    pub fn new(ingredient_id: IngredientId, quantity: Decimal) -> DomainResult<Self> {
        if quantity < Decimal::ZERO {
            return Err(DomainError::validation("requirement quantity cannot be negative"));
        }
        Ok(Self {
            ingredient_id,
            quantity,
        })
    }

    /// Zero quantities carry no constraint.
    pub fn constrains(&self) -> bool {
        self.quantity > Decimal::ZERO
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dish {
    pub id: DishId,
    pub name: String,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

impl Dish {
    pub fn new(id: DishId, name: impl Into<String>, requirements: Vec<Requirement>) -> DomainResult<Self> {
        let dish = Self {
            id,
            name: name.into(),
            requirements,
        };
        dish.validate()?;
        Ok(dish)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("dish name cannot be empty"));
        }
        if self.requirements.iter().any(|r| r.quantity < Decimal::ZERO) {
            return Err(DomainError::validation("requirement quantity cannot be negative"));
        }
        Ok(())
    }
}

impl Entity for Dish {
    type Id = DishId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A sellable menu with its dishes resolved.
///
/// `remaining_qty` is the administrative cap on order units still for sale,
/// independent of ingredient accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Menu {
    pub id: MenuId,
    pub name: String,
    pub person_min: u32,
    pub remaining_qty: i64,
    pub price_per_person: Decimal,
    pub published: bool,
    #[serde(default)]
    pub dishes: Vec<Dish>,
}

impl Menu {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("menu name cannot be empty"));
        }
        if self.remaining_qty < 0 {
            return Err(DomainError::invariant("remaining_qty cannot go negative"));
        }
        if self.price_per_person < Decimal::ZERO {
            return Err(DomainError::validation("price_per_person cannot be negative"));
        }
        for dish in &self.dishes {
            dish.validate()?;
        }
        Ok(())
    }

    /// Every ingredient the menu consumes, in id order.
    pub fn ingredient_ids(&self) -> Vec<IngredientId> {
        let mut ids: Vec<_> = self
            .dishes
            .iter()
            .flat_map(|d| d.requirements.iter())
            .filter(|r| r.constrains())
            .map(|r| r.ingredient_id)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

impl Entity for Menu {
    type Id = MenuId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_requirement_is_rejected() {
        assert!(Requirement::new(IngredientId::new(), Decimal::from(-1)).is_err());
        assert!(!Requirement::new(IngredientId::new(), Decimal::ZERO).unwrap().constrains());
    }

    #[test]
    fn menu_ingredient_ids_are_sorted_and_unique() {
        let shared = IngredientId::new();
        let other = IngredientId::new();
        let unused = IngredientId::new();
        let dish = |reqs| Dish::new(DishId::new(), "d", reqs).unwrap();
        let menu = Menu {
            id: MenuId::new(),
            name: "Buffet".into(),
            person_min: 10,
            remaining_qty: 3,
            price_per_person: Decimal::from(12),
            published: true,
            dishes: vec![
                dish(vec![Requirement::new(shared, Decimal::ONE).unwrap()]),
                dish(vec![
                    Requirement::new(shared, Decimal::TWO).unwrap(),
                    Requirement::new(other, Decimal::ONE).unwrap(),
                    Requirement::new(unused, Decimal::ZERO).unwrap(),
                ]),
            ],
        };

        let mut expected = vec![shared, other];
        expected.sort();
        assert_eq!(menu.ingredient_ids(), expected);
    }
}
