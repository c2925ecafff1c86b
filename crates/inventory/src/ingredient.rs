use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use catering_core::{DomainError, DomainResult, Entity, IngredientId};

/// Ledger entry: current and minimum stock of one ingredient.
///
/// `current_stock` is expressed in `unit` and never goes below zero; stores
/// enforce that when they apply a delta, not before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: IngredientId,
    pub name: String,
    pub unit: String,
    pub current_stock: Decimal,
    pub min_stock_level: Decimal,
}

impl Ingredient {
    pub fn new(
        id: IngredientId,
        name: impl Into<String>,
        unit: impl Into<String>,
        current_stock: Decimal,
        min_stock_level: Decimal,
    ) -> DomainResult<Self> {
        let ingredient = Self {
            id,
            name: name.into(),
            unit: unit.into(),
            current_stock,
            min_stock_level,
        };
        ingredient.validate()?;
        Ok(ingredient)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("ingredient name cannot be empty"));
        }
        if self.unit.trim().is_empty() {
            return Err(DomainError::validation("ingredient unit cannot be empty"));
        }
        if self.current_stock < Decimal::ZERO {
            return Err(DomainError::invariant("stock cannot go negative"));
        }
        if self.min_stock_level < Decimal::ZERO {
            return Err(DomainError::validation("min_stock_level cannot be negative"));
        }
        Ok(())
    }

    /// Copy of this entry with `delta` applied to `current_stock`.
    pub fn adjusted(&self, delta: Decimal) -> DomainResult<Self> {
        let new_stock = self
            .current_stock
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("stock adjustment overflows"))?;
        if new_stock < Decimal::ZERO {
            return Err(DomainError::invariant("stock cannot go negative"));
        }
        Ok(Self {
            current_stock: new_stock,
            ..self.clone()
        })
    }

    pub fn is_low_stock(&self) -> bool {
        self.current_stock < self.min_stock_level
    }
}

impl Entity for Ingredient {
    type Id = IngredientId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Dashboard row for an ingredient below its alert threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockAlert {
    pub id: IngredientId,
    pub name: String,
    pub current_stock: Decimal,
    pub min_stock_level: Decimal,
    pub unit: String,
}

impl From<&Ingredient> for LowStockAlert {
    fn from(value: &Ingredient) -> Self {
        Self {
            id: value.id,
            name: value.name.clone(),
            current_stock: value.current_stock,
            min_stock_level: value.min_stock_level,
            unit: value.unit.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flour(stock: i64) -> Ingredient {
        Ingredient::new(IngredientId::new(), "Flour", "g", Decimal::from(stock), Decimal::from(500))
            .unwrap()
    }

    #[test]
    fn negative_stock_is_rejected_at_construction() {
        let err = Ingredient::new(
            IngredientId::new(),
            "Flour",
            "g",
            Decimal::from(-1),
            Decimal::ZERO,
        )
        .unwrap_err();
        assert_eq!(err, DomainError::invariant("stock cannot go negative"));
    }

    #[test]
    fn adjusted_refuses_to_go_below_zero() {
        let ingredient = flour(100);
        assert_eq!(ingredient.adjusted(Decimal::from(-100)).unwrap().current_stock, Decimal::ZERO);
        assert!(ingredient.adjusted(Decimal::from(-101)).is_err());
        assert_eq!(ingredient.current_stock, Decimal::from(100));
    }

    #[test]
    fn low_stock_is_strictly_below_threshold() {
        assert!(flour(499).is_low_stock());
        assert!(!flour(500).is_low_stock());
    }

    #[test]
    fn alert_serializes_with_dashboard_field_names() {
        let ingredient = flour(10);
        let json = serde_json::to_value(LowStockAlert::from(&ingredient)).unwrap();
        assert_eq!(json["name"], "Flour");
        assert_eq!(json["unit"], "g");
        assert!(json.get("currentStock").is_some());
        assert!(json.get("minStockLevel").is_some());
    }
}
