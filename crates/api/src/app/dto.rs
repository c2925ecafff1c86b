use rust_decimal::Decimal;
use serde::Deserialize;

use catering_core::MenuId;
use catering_infra::Feasibility;
use catering_inventory::{Availability, Ingredient, Menu, MenuStock};
use catering_orders::{Order, OrderRecord};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AdjustIngredientRequest {
    pub delta: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct AdjustQuotaRequest {
    pub delta: i64,
}

#[derive(Debug, Deserialize)]
pub struct FeasibilityQuery {
    pub person_number: u32,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub menu_ids: Vec<MenuId>,
    pub person_number: u32,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn menu_stock_to_json(rows: Vec<MenuStock>) -> serde_json::Value {
    serde_json::Value::Array(
        rows.into_iter()
            .map(|row| {
                serde_json::json!({
                    "menuId": row.menu_id,
                    "name": row.name,
                    "maxOrders": row.max_orders.to_sentinel(),
                    "remainingQty": row.remaining_qty,
                })
            })
            .collect(),
    )
}

pub fn availability_to_json(kind: &str, id: String, availability: Availability) -> serde_json::Value {
    serde_json::json!({
        "kind": kind,
        "id": id,
        "availability": availability,
    })
}

pub fn feasibility_to_json(f: Feasibility) -> serde_json::Value {
    serde_json::json!({
        "menu_id": f.menu_id,
        "person_number": f.person_number,
        "feasible": f.feasible,
        "orders_needed": f.orders_needed,
        "max_orders": f.max_orders,
        "remaining_qty": f.remaining_qty,
        "shortages": f.shortages,
    })
}

pub fn ingredient_to_json(i: Ingredient) -> serde_json::Value {
    serde_json::json!({
        "id": i.id,
        "name": i.name,
        "unit": i.unit,
        "current_stock": i.current_stock,
        "min_stock_level": i.min_stock_level,
        "low_stock": i.is_low_stock(),
    })
}

pub fn menu_quota_to_json(m: Menu) -> serde_json::Value {
    serde_json::json!({
        "id": m.id,
        "name": m.name,
        "remaining_qty": m.remaining_qty,
    })
}

pub fn order_to_json(order: &Order) -> serde_json::Value {
    let record = OrderRecord::from(order);
    serde_json::json!({
        "id": record.id,
        "order_number": record.order_number,
        "status": record.status,
        "person_number": record.person_number,
        "menu_ids": record.menu_ids,
        "menu_price": record.menu_price,
        "delivery_price": record.delivery_price,
        "total_price": record.total_price,
        "created_at": record.created_at,
        "updated_at": record.updated_at,
        "version": record.version,
    })
}
