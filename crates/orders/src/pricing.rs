//! Pricing applied when an order is placed, and order number generation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OrderError;
use crate::order::MenuQuote;

/// Prices fixed at placement time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub menu_price: Decimal,
    pub delivery_price: Decimal,
}

impl Pricing {
    /// Saturates; `quote` only produces pricings whose total fits.
    pub fn total(&self) -> Decimal {
        self.menu_price.saturating_add(self.delivery_price)
    }
}

/// Delivery fee by party size.
pub fn delivery_price(person_number: u32) -> Decimal {
    match person_number {
        50.. => Decimal::ZERO,
        30..=49 => Decimal::from(15),
        20..=29 => Decimal::from(25),
        _ => Decimal::from(35),
    }
}

/// `menu_price` is the per-person price summed over all menus, times the
/// party size.
pub fn quote(menus: &[MenuQuote], person_number: u32) -> Result<Pricing, OrderError> {
    let overflow = || OrderError::validation("order price is out of range");
    let per_person = menus
        .iter()
        .try_fold(Decimal::ZERO, |sum, m| sum.checked_add(m.price_per_person))
        .ok_or_else(overflow)?;
    let pricing = Pricing {
        menu_price: per_person
            .checked_mul(Decimal::from(person_number))
            .ok_or_else(overflow)?,
        delivery_price: delivery_price(person_number),
    };
    pricing
        .menu_price
        .checked_add(pricing.delivery_price)
        .ok_or_else(overflow)?;
    Ok(pricing)
}

/// External order reference: `CMD-YYYYMMDD-XXXXXX`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Date part from `at`, suffix from the random bits of a fresh UUIDv7.
    pub fn generate(at: DateTime<Utc>) -> Self {
        let random = Uuid::now_v7().simple().to_string();
        let suffix = random[random.len() - 6..].to_uppercase();
        Self(format!("CMD-{}-{suffix}", at.format("%Y%m%d")))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
