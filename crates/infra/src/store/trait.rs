use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use catering_core::{DishId, DomainError, ExpectedVersion, IngredientId, MenuId, OrderId};
use catering_inventory::{CatalogSeed, Dish, Ingredient, Menu, Shortage, StockPlan};
use catering_orders::{OrderRecord, OrderStatus};

/// Which kind of row a lookup missed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntityKind {
    Ingredient,
    Dish,
    Menu,
    Order,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Ingredient => "ingredient",
            EntityKind::Dish => "dish",
            EntityKind::Menu => "menu",
            EntityKind::Order => "order",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ingredient" => Some(EntityKind::Ingredient),
            "dish" => Some(EntityKind::Dish),
            "menu" => Some(EntityKind::Menu),
            "order" => Some(EntityKind::Order),
            _ => None,
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store operation error.
///
/// These are infrastructure outcomes (missing rows, lost races, guarded
/// counters refusing to go negative) as opposed to lifecycle rule violations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("insufficient stock: {}", describe_shortages(.0))]
    InsufficientStock(Vec<Shortage>),

    #[error("invalid data: {0}")]
    Invalid(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<DomainError> for StoreError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Conflict(msg) => StoreError::Concurrency(msg),
            DomainError::NotFound { what, id } => StoreError::NotFound {
                kind: EntityKind::from_name(what).unwrap_or(EntityKind::Order),
                id,
            },
            other => StoreError::Invalid(other.to_string()),
        }
    }
}

pub(crate) fn describe_shortages(shortages: &[Shortage]) -> String {
    shortages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Read access to the bill of materials and the ingredient ledger.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_ingredient(&self, id: IngredientId) -> Result<Ingredient, StoreError>;

    /// Ingredient rows for `ids`. Unknown ids are skipped.
    async fn ingredients_by_ids(&self, ids: &[IngredientId]) -> Result<Vec<Ingredient>, StoreError>;

    async fn list_ingredients(&self) -> Result<Vec<Ingredient>, StoreError>;

    /// Ingredients with `current_stock < min_stock_level`.
    async fn list_low_stock_ingredients(&self) -> Result<Vec<Ingredient>, StoreError>;

    async fn get_dish(&self, id: DishId) -> Result<Dish, StoreError>;

    /// Menu with its dishes and their requirements resolved.
    async fn get_menu(&self, id: MenuId) -> Result<Menu, StoreError>;

    async fn list_menus(&self) -> Result<Vec<Menu>, StoreError>;

    /// Insert or replace every record of the seed.
    async fn seed(&self, seed: &CatalogSeed) -> Result<(), StoreError>;
}

/// Atomic counter updates on `current_stock` and `remaining_qty`.
///
/// Every method is a single unit of work: a guarded update either lands in
/// full or is rejected with `InsufficientStock` before anything is written.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Add `delta` (possibly negative) to one ingredient's stock.
    async fn atomic_adjust_stock(
        &self,
        id: IngredientId,
        delta: Decimal,
    ) -> Result<Ingredient, StoreError>;

    /// Add `delta` (possibly negative) to one menu's `remaining_qty`.
    async fn atomic_adjust_remaining_qty(&self, id: MenuId, delta: i64) -> Result<Menu, StoreError>;

    /// Apply every delta of `plan` or none of them.
    ///
    /// Deductions re-run the sufficiency check against the locked counters.
    async fn apply_plan(&self, plan: &StockPlan) -> Result<(), StoreError>;
}

/// Order persistence with optimistic concurrency on `version`.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get_order(&self, id: OrderId) -> Result<OrderRecord, StoreError>;

    async fn insert_order(&self, order: &OrderRecord) -> Result<(), StoreError>;

    /// Store `next` if the stored order is still at `expected`, applying
    /// `plan` in the same unit of work.
    async fn commit_transition(
        &self,
        next: &OrderRecord,
        expected: ExpectedVersion,
        plan: Option<&StockPlan>,
    ) -> Result<(), StoreError>;

    /// Remove an order that is still `pending` at `expected`.
    async fn delete_pending_order(
        &self,
        id: OrderId,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    /// Overwrite an order's status, bumping its version.
    ///
    /// Administrative override only: the transition table is not consulted
    /// and no stock moves, so the caller owns any counter repair. Order
    /// lifecycle changes go through `FulfillmentService`, which commits via
    /// `commit_transition`. Loses to a concurrent writer with `Concurrency`.
    async fn persist_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderRecord, StoreError> {
        let current = self.get_order(id).await?;
        let version = current
            .version
            .checked_add(1)
            .ok_or_else(|| StoreError::Invalid(format!("order {id} version overflows")))?;
        let next = OrderRecord {
            status,
            updated_at: chrono::Utc::now(),
            version,
            ..current.clone()
        };
        self.commit_transition(&next, ExpectedVersion::Exact(current.version), None)
            .await?;
        Ok(next)
    }
}

/// Everything the fulfillment core needs from a backend.
pub trait FulfillmentStore: CatalogStore + StockLedger + OrderRepository {}

impl<T> FulfillmentStore for T where T: CatalogStore + StockLedger + OrderRepository + ?Sized {}
