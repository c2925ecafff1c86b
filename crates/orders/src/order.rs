use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use catering_core::{Aggregate, AggregateRoot, DomainError, Event, MenuId, OrderId};
use catering_inventory::Menu;

use crate::error::OrderError;
use crate::pricing::{OrderNumber, Pricing, quote};
use crate::status::{OrderStatus, StockEffect};

/// Largest party size an order may carry; stored orders keep it in a signed
/// 32-bit column.
pub const MAX_PERSON_NUMBER: u32 = i32::MAX as u32;

/// The slice of a menu an order needs at placement time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuQuote {
    pub menu_id: MenuId,
    pub name: String,
    pub price_per_person: Decimal,
    pub person_min: u32,
}

impl From<&Menu> for MenuQuote {
    fn from(menu: &Menu) -> Self {
        Self {
            menu_id: menu.id,
            name: menu.name.clone(),
            price_per_person: menu.price_per_person,
            person_min: menu.person_min,
        }
    }
}

/// Aggregate root: Order.
///
/// Status only moves through `handle`/`apply`; stores persist the resulting
/// state as an [`OrderRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    order_number: OrderNumber,
    status: OrderStatus,
    person_number: u32,
    menu_ids: Vec<MenuId>,
    menu_price: Decimal,
    delivery_price: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-placed aggregate instance.
    pub fn empty(id: OrderId) -> Self {
        let now = Utc::now();
        Self {
            id,
            order_number: OrderNumber::from_string(""),
            status: OrderStatus::Pending,
            person_number: 0,
            menu_ids: Vec::new(),
            menu_price: Decimal::ZERO,
            delivery_price: Decimal::ZERO,
            created_at: now,
            updated_at: now,
            version: 0,
            created: false,
        }
    }

    pub fn order_number(&self) -> &OrderNumber {
        &self.order_number
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn person_number(&self) -> u32 {
        self.person_number
    }

    pub fn menu_ids(&self) -> &[MenuId] {
        &self.menu_ids
    }

    pub fn menu_price(&self) -> Decimal {
        self.menu_price
    }

    pub fn delivery_price(&self) -> Decimal {
        self.delivery_price
    }

    pub fn pricing(&self) -> Pricing {
        Pricing {
            menu_price: self.menu_price,
            delivery_price: self.delivery_price,
        }
    }

    pub fn total_price(&self) -> Decimal {
        self.pricing().total()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_placed(&self) -> bool {
        self.created
    }

    /// Physical deletion is only allowed before the order leaves `pending`.
    pub fn ensure_deletable(&self) -> Result<(), OrderError> {
        if !self.created {
            return Err(DomainError::not_found("order", self.id).into());
        }
        if self.status != OrderStatus::Pending {
            return Err(OrderError::NotDeletable {
                status: self.status,
            });
        }
        Ok(())
    }

    /// Decide and apply in one step, returning the next state and its events.
    pub fn execute(&self, command: &OrderCommand) -> Result<(Self, Vec<OrderEvent>), OrderError> {
        let events = self.handle(command)?;
        let mut next = self.clone();
        for event in &events {
            next.apply(event);
        }
        Ok((next, events))
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Persisted shape of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub person_number: u32,
    pub menu_ids: Vec<MenuId>,
    pub menu_price: Decimal,
    pub delivery_price: Decimal,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl From<&Order> for OrderRecord {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number.to_string(),
            status: order.status,
            person_number: order.person_number,
            menu_ids: order.menu_ids.clone(),
            menu_price: order.menu_price,
            delivery_price: order.delivery_price,
            total_price: order.total_price(),
            created_at: order.created_at,
            updated_at: order.updated_at,
            version: order.version,
        }
    }
}

impl From<OrderRecord> for Order {
    fn from(record: OrderRecord) -> Self {
        Self {
            id: record.id,
            order_number: OrderNumber::from_string(record.order_number),
            status: record.status,
            person_number: record.person_number,
            menu_ids: record.menu_ids,
            menu_price: record.menu_price,
            delivery_price: record.delivery_price,
            created_at: record.created_at,
            updated_at: record.updated_at,
            version: record.version,
            created: true,
        }
    }
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub person_number: u32,
    pub menus: Vec<MenuQuote>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub order_id: OrderId,
    pub to: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    ChangeStatus(ChangeStatus),
    CancelOrder(CancelOrder),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub person_number: u32,
    pub menu_ids: Vec<MenuId>,
    pub menu_price: Decimal,
    pub delivery_price: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub stock_effect: StockEffect,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    OrderStatusChanged(OrderStatusChanged),
}

impl OrderEvent {
    /// Stock movement the event asks for.
    pub fn stock_effect(&self) -> StockEffect {
        match self {
            OrderEvent::OrderPlaced(_) => StockEffect::None,
            OrderEvent::OrderStatusChanged(e) => e.stock_effect,
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::OrderStatusChanged(_) => "orders.order.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::OrderStatusChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = OrderError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.order_number = e.order_number.clone();
                self.status = OrderStatus::Pending;
                self.person_number = e.person_number;
                self.menu_ids = e.menu_ids.clone();
                self.menu_price = e.menu_price;
                self.delivery_price = e.delivery_price;
                self.created_at = e.occurred_at;
                self.updated_at = e.occurred_at;
                self.created = true;
            }
            OrderEvent::OrderStatusChanged(e) => {
                self.status = e.to;
                self.updated_at = e.occurred_at;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Order {
    fn ensure_placed(&self, order_id: OrderId) -> Result<(), OrderError> {
        if !self.created {
            return Err(DomainError::not_found("order", order_id).into());
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch").into());
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, OrderError> {
        if self.created {
            return Err(DomainError::conflict("order already exists").into());
        }
        if cmd.person_number < 1 {
            return Err(OrderError::validation("person_number must be at least 1"));
        }
        if cmd.person_number > MAX_PERSON_NUMBER {
            return Err(OrderError::validation(format!(
                "person_number must be at most {MAX_PERSON_NUMBER}"
            )));
        }
        if cmd.menus.is_empty() {
            return Err(OrderError::validation("an order needs at least one menu"));
        }

        let mut seen = HashSet::new();
        for menu in &cmd.menus {
            if !seen.insert(menu.menu_id) {
                return Err(OrderError::validation(format!(
                    "menu {} is listed more than once",
                    menu.menu_id
                )));
            }
            if cmd.person_number < menu.person_min {
                return Err(OrderError::validation(format!(
                    "menu '{}' requires at least {} persons, got {}",
                    menu.name, menu.person_min, cmd.person_number
                )));
            }
        }

        let pricing = quote(&cmd.menus, cmd.person_number)?;

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            person_number: cmd.person_number,
            menu_ids: cmd.menus.iter().map(|m| m.menu_id).collect(),
            menu_price: pricing.menu_price,
            delivery_price: pricing.delivery_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(&self, cmd: &ChangeStatus) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed(cmd.order_id)?;
        self.status_changed(cmd.to, cmd.occurred_at)
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed(cmd.order_id)?;

        if !self.status.can_cancel() {
            return Err(OrderError::NotCancellable {
                status: self.status,
            });
        }

        self.status_changed(OrderStatus::Cancelled, cmd.occurred_at)
    }

    fn status_changed(
        &self,
        to: OrderStatus,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        Ok(vec![OrderEvent::OrderStatusChanged(OrderStatusChanged {
            order_id: self.id,
            from: self.status,
            to,
            stock_effect: StockEffect::for_transition(self.status, to),
            occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn menu_quote(person_min: u32, price: i64) -> MenuQuote {
        MenuQuote {
            menu_id: MenuId::new(),
            name: "Garden buffet".into(),
            price_per_person: Decimal::from(price),
            person_min,
        }
    }

    fn place(order_id: OrderId, person_number: u32, menus: Vec<MenuQuote>) -> OrderCommand {
        OrderCommand::PlaceOrder(PlaceOrder {
            order_id,
            order_number: OrderNumber::generate(test_time()),
            person_number,
            menus,
            occurred_at: test_time(),
        })
    }

    fn placed_order() -> Order {
        let id = OrderId::new();
        let (order, _) = Order::empty(id)
            .execute(&place(id, 25, vec![menu_quote(10, 20)]))
            .unwrap();
        order
    }

    fn move_to(order: &Order, to: OrderStatus) -> Order {
        let cmd = OrderCommand::ChangeStatus(ChangeStatus {
            order_id: *order.id(),
            to,
            occurred_at: test_time(),
        });
        order.execute(&cmd).unwrap().0
    }

    fn order_in(status: OrderStatus) -> Order {
        use OrderStatus::*;
        let path: &[OrderStatus] = match status {
            Pending => &[],
            Confirmed => &[Confirmed],
            Preparing => &[Confirmed, Preparing],
            Ready => &[Confirmed, Preparing, Ready],
            Delivering => &[Confirmed, Preparing, Ready, Delivering],
            Delivered => &[Confirmed, Preparing, Ready, Delivering, Delivered],
            Completed => &[Confirmed, Preparing, Ready, Delivering, Delivered, Completed],
            Cancelled => &[Cancelled],
        };
        path.iter().fold(placed_order(), |order, to| move_to(&order, *to))
    }

    #[test]
    fn place_order_starts_pending_at_version_one_with_prices() {
        let order = placed_order();

        assert!(order.is_placed());
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.version(), 1);
        assert_eq!(order.menu_price(), Decimal::from(500));
        assert_eq!(order.delivery_price(), Decimal::from(25));
        assert_eq!(order.total_price(), Decimal::from(525));
        assert!(order.order_number().as_str().starts_with("CMD-"));
    }

    #[test]
    fn place_order_validates_input() {
        let id = OrderId::new();
        let empty = Order::empty(id);

        match empty.handle(&place(id, 0, vec![menu_quote(0, 10)])) {
            Err(OrderError::Validation(msg)) if msg.contains("person_number") => {}
            other => panic!("expected validation error, got {other:?}"),
        }

        match empty.handle(&place(id, 10, vec![])) {
            Err(OrderError::Validation(msg)) if msg.contains("at least one menu") => {}
            other => panic!("expected validation error, got {other:?}"),
        }

        let dup = menu_quote(1, 10);
        match empty.handle(&place(id, 10, vec![dup.clone(), dup])) {
            Err(OrderError::Validation(msg)) if msg.contains("more than once") => {}
            other => panic!("expected validation error, got {other:?}"),
        }

        match empty.handle(&place(id, 9, vec![menu_quote(10, 10)])) {
            Err(OrderError::Validation(msg)) if msg.contains("at least 10 persons") => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn party_size_and_price_must_fit_storage() {
        let id = OrderId::new();
        let empty = Order::empty(id);

        match empty.handle(&place(id, MAX_PERSON_NUMBER + 1, vec![menu_quote(1, 10)])) {
            Err(OrderError::Validation(msg)) if msg.contains("at most") => {}
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(empty.handle(&place(id, MAX_PERSON_NUMBER, vec![menu_quote(1, 10)])).is_ok());

        let mut pricey = menu_quote(1, 0);
        pricey.price_per_person = Decimal::MAX;
        match empty.handle(&place(id, 2, vec![pricey])) {
            Err(OrderError::Validation(msg)) if msg.contains("out of range") => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn cannot_place_twice() {
        let order = placed_order();
        let err = order
            .handle(&place(*order.id(), 25, vec![menu_quote(10, 20)]))
            .unwrap_err();
        assert!(matches!(err, OrderError::Domain(DomainError::Conflict(_))));
    }

    #[test]
    fn pending_to_ready_is_an_invalid_transition() {
        let order = placed_order();
        let err = order
            .handle(&OrderCommand::ChangeStatus(ChangeStatus {
                order_id: *order.id(),
                to: OrderStatus::Ready,
                occurred_at: test_time(),
            }))
            .unwrap_err();

        assert_eq!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Ready,
            }
        );
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn delivering_order_is_not_cancellable() {
        let order = order_in(OrderStatus::Delivering);
        let err = order
            .handle(&OrderCommand::CancelOrder(CancelOrder {
                order_id: *order.id(),
                occurred_at: test_time(),
            }))
            .unwrap_err();

        assert_eq!(
            err,
            OrderError::NotCancellable {
                status: OrderStatus::Delivering
            }
        );
    }

    #[test]
    fn ready_cannot_be_cancelled_via_status_change() {
        let order = order_in(OrderStatus::Ready);
        let err = order
            .handle(&OrderCommand::ChangeStatus(ChangeStatus {
                order_id: *order.id(),
                to: OrderStatus::Cancelled,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));

        let delivering = move_to(&order, OrderStatus::Delivering);
        assert_eq!(delivering.status(), OrderStatus::Delivering);
    }

    #[test]
    fn confirm_and_cancel_carry_their_stock_effect() {
        let pending = placed_order();
        let (confirmed, events) = pending
            .execute(&OrderCommand::ChangeStatus(ChangeStatus {
                order_id: *pending.id(),
                to: OrderStatus::Confirmed,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(events[0].stock_effect(), StockEffect::Consume);
        assert_eq!(confirmed.version(), 2);

        let (cancelled, events) = confirmed
            .execute(&OrderCommand::CancelOrder(CancelOrder {
                order_id: *confirmed.id(),
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(events[0].stock_effect(), StockEffect::Restore);
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(events[0].event_type(), "orders.order.status_changed");
    }

    #[test]
    fn only_pending_orders_are_deletable() {
        assert!(placed_order().ensure_deletable().is_ok());
        assert_eq!(
            order_in(OrderStatus::Confirmed).ensure_deletable(),
            Err(OrderError::NotDeletable {
                status: OrderStatus::Confirmed
            })
        );
        assert!(matches!(
            Order::empty(OrderId::new()).ensure_deletable(),
            Err(OrderError::Domain(DomainError::NotFound { what: "order", .. }))
        ));
    }

    #[test]
    fn record_round_trip_keeps_state() {
        let order = order_in(OrderStatus::Preparing);
        let record = OrderRecord::from(&order);
        assert_eq!(record.total_price, order.total_price());
        assert_eq!(Order::from(record), order);
    }

    fn any_status() -> impl Strategy<Value = OrderStatus> {
        prop::sample::select(OrderStatus::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        /// Property: a status change is accepted exactly when the table allows it,
        /// and a rejected change leaves the order untouched.
        #[test]
        fn status_change_follows_table(from in any_status(), to in any_status()) {
            let order = order_in(from);
            let cmd = OrderCommand::ChangeStatus(ChangeStatus {
                order_id: *order.id(),
                to,
                occurred_at: test_time(),
            });

            match order.execute(&cmd) {
                Ok((next, _)) => {
                    prop_assert!(from.can_transition_to(to));
                    prop_assert_eq!(next.status(), to);
                    prop_assert_eq!(next.version(), order.version() + 1);
                }
                Err(err) => {
                    prop_assert!(!from.can_transition_to(to));
                    prop_assert_eq!(err, OrderError::InvalidTransition { from, to });
                }
            }
        }

        /// Property: cancel succeeds exactly inside the cancellation window.
        #[test]
        fn cancel_follows_policy(from in any_status()) {
            let order = order_in(from);
            let result = order.handle(&OrderCommand::CancelOrder(CancelOrder {
                order_id: *order.id(),
                occurred_at: test_time(),
            }));
            prop_assert_eq!(result.is_ok(), from.can_cancel());
        }
    }
}
