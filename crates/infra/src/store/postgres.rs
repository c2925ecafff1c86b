//! Postgres-backed fulfillment store.
//!
//! ## Atomicity
//!
//! Every stock plan and order commit runs in one transaction:
//!
//! 1. compare-and-swap the order version (`UPDATE orders ... WHERE version = $n`)
//! 2. lock the menu and ingredient rows in id order (`SELECT ... ORDER BY id FOR UPDATE`)
//! 3. re-run the sufficiency check against the locked values
//! 4. apply each delta as a guarded update
//!    (`SET current_stock = current_stock + $d WHERE current_stock + $d >= 0`)
//! 5. commit
//!
//! Dropping the transaction on any error rolls everything back.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |-----------------------|------------|----------|
//! | `23505` | `Concurrency` | duplicate order id or order number |
//! | `23503` | `Invalid` | seed references a missing row |
//! | `23514` | `InsufficientStock` | a counter `CHECK (... >= 0)` fired |
//! | any other | `Backend` | network, pool, syntax |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use catering_core::{DishId, ExpectedVersion, IngredientId, MenuId, OrderId};
use catering_inventory::{
    CatalogSeed, Dish, Ingredient, Menu, Requirement, Shortage, StockDirection, StockPlan,
    StockSnapshot,
};
use catering_orders::{OrderRecord, OrderStatus};

use super::r#trait::{CatalogStore, EntityKind, OrderRepository, StockLedger, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_catering.sql");

/// Postgres-backed store for catalog, stock counters and orders.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn load_dishes(&self, ids: &[Uuid]) -> Result<Vec<Dish>, StoreError> {
        let dish_rows = sqlx::query("SELECT id, name FROM dishes WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_dishes", e))?;

        let requirement_rows = sqlx::query(
            r#"
            SELECT dish_id, ingredient_id, quantity
            FROM dish_requirements
            WHERE dish_id = ANY($1)
            ORDER BY dish_id, position
            "#,
        )
        .bind(ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_dish_requirements", e))?;

        let mut dishes = Vec::with_capacity(dish_rows.len());
        for row in &dish_rows {
            let id: Uuid = get(row, "id")?;
            let requirements = requirement_rows
                .iter()
                .filter(|r| r.try_get::<Uuid, _>("dish_id").ok() == Some(id))
                .map(|r| {
                    Ok(Requirement {
                        ingredient_id: IngredientId::from_uuid(get(r, "ingredient_id")?),
                        quantity: get(r, "quantity")?,
                    })
                })
                .collect::<Result<Vec<_>, StoreError>>()?;
            dishes.push(Dish {
                id: DishId::from_uuid(id),
                name: get(row, "name")?,
                requirements,
            });
        }
        Ok(dishes)
    }

    async fn load_menus(&self, filter: Option<MenuId>) -> Result<Vec<Menu>, StoreError> {
        let menu_rows = sqlx::query(
            r#"
            SELECT id, name, person_min, remaining_qty, price_per_person, published
            FROM menus
            WHERE $1::uuid IS NULL OR id = $1
            ORDER BY id
            "#,
        )
        .bind(filter.map(|id| *id.as_uuid()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_menus", e))?;

        let menu_ids: Vec<Uuid> = menu_rows
            .iter()
            .map(|r| get(r, "id"))
            .collect::<Result<_, _>>()?;

        let links = sqlx::query(
            r#"
            SELECT menu_id, dish_id
            FROM menu_dishes
            WHERE menu_id = ANY($1)
            ORDER BY menu_id, position
            "#,
        )
        .bind(&menu_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_menu_dishes", e))?;

        let links: Vec<(Uuid, Uuid)> = links
            .iter()
            .map(|r| Ok((get(r, "menu_id")?, get(r, "dish_id")?)))
            .collect::<Result<_, StoreError>>()?;
        let mut dish_ids: Vec<Uuid> = links.iter().map(|(_, d)| *d).collect();
        dish_ids.sort();
        dish_ids.dedup();
        let dishes = self.load_dishes(&dish_ids).await?;

        let mut menus = Vec::with_capacity(menu_rows.len());
        for row in &menu_rows {
            let id: Uuid = get(row, "id")?;
            let resolved = links
                .iter()
                .filter(|(menu_id, _)| *menu_id == id)
                .map(|(_, dish_id)| {
                    dishes
                        .iter()
                        .find(|d| d.id.as_uuid() == dish_id)
                        .cloned()
                        .ok_or_else(|| StoreError::not_found(EntityKind::Dish, dish_id))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let person_min: i32 = get(row, "person_min")?;
            menus.push(Menu {
                id: MenuId::from_uuid(id),
                name: get(row, "name")?,
                person_min: u32::try_from(person_min)
                    .map_err(|_| StoreError::Invalid(format!("menu {id}: negative person_min")))?,
                remaining_qty: get(row, "remaining_qty")?,
                price_per_person: get(row, "price_per_person")?,
                published: get(row, "published")?,
                dishes: resolved,
            });
        }
        Ok(menus)
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to read column {column}: {e}")))
}

fn ingredient_from_row(row: &PgRow) -> Result<Ingredient, StoreError> {
    Ok(Ingredient {
        id: IngredientId::from_uuid(get(row, "id")?),
        name: get(row, "name")?,
        unit: get(row, "unit")?,
        current_stock: get(row, "current_stock")?,
        min_stock_level: get(row, "min_stock_level")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<OrderRecord, StoreError> {
    let status: String = get(row, "status")?;
    let person_number: i32 = get(row, "person_number")?;
    let version: i64 = get(row, "version")?;
    let menu_ids: Vec<Uuid> = get(row, "menu_ids")?;
    Ok(OrderRecord {
        id: OrderId::from_uuid(get(row, "id")?),
        order_number: get(row, "order_number")?,
        status: status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Invalid(e.to_string()))?,
        person_number: u32::try_from(person_number)
            .map_err(|_| StoreError::Invalid("negative person_number".to_string()))?,
        menu_ids: menu_ids.into_iter().map(MenuId::from_uuid).collect(),
        menu_price: get(row, "menu_price")?,
        delivery_price: get(row, "delivery_price")?,
        total_price: get(row, "total_price")?,
        created_at: get::<DateTime<Utc>>(row, "created_at")?,
        updated_at: get::<DateTime<Utc>>(row, "updated_at")?,
        version: u64::try_from(version)
            .map_err(|_| StoreError::Invalid("negative version".to_string()))?,
    })
}

fn person_number_to_db(person_number: u32) -> Result<i32, StoreError> {
    i32::try_from(person_number)
        .map_err(|_| StoreError::Invalid(format!("person_number {person_number} is out of range")))
}

fn version_to_db(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version)
        .map_err(|_| StoreError::Invalid(format!("version {version} is out of range")))
}

fn expected_to_db(expected: ExpectedVersion) -> Result<Option<i64>, StoreError> {
    match expected {
        ExpectedVersion::Exact(v) => version_to_db(v).map(Some),
        ExpectedVersion::Any => Ok(None),
    }
}

const INGREDIENT_COLUMNS: &str = "id, name, unit, current_stock, min_stock_level";

const ORDER_COLUMNS: &str = "id, order_number, status, person_number, menu_ids, menu_price, \
     delivery_price, total_price, created_at, updated_at, version";

/// Lock, check and apply a plan inside `tx`.
async fn apply_plan_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    plan: &StockPlan,
) -> Result<(), StoreError> {
    let menu_deltas = plan.menu_deltas();
    let menu_ids: Vec<Uuid> = menu_deltas.keys().map(|id| *id.as_uuid()).collect();
    let ingredient_ids: Vec<Uuid> = plan
        .ingredient_ids()
        .iter()
        .map(|id| *id.as_uuid())
        .collect();

    // Menus before ingredients, each in id order, for every plan.
    let locked_menus = sqlx::query(
        "SELECT id, remaining_qty FROM menus WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    )
    .bind(&menu_ids)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_menus", e))?;

    let locked_ingredients = sqlx::query(
        "SELECT id, current_stock FROM ingredients WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    )
    .bind(&ingredient_ids)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_ingredients", e))?;

    let mut levels = StockSnapshot::new();
    for row in &locked_menus {
        levels.set_remaining_qty(MenuId::from_uuid(get(row, "id")?), get(row, "remaining_qty")?);
    }
    for row in &locked_ingredients {
        levels.set_ingredient(
            IngredientId::from_uuid(get(row, "id")?),
            get(row, "current_stock")?,
        );
    }

    if locked_menus.len() != menu_ids.len() {
        let missing = menu_deltas
            .keys()
            .find(|id| {
                !locked_menus
                    .iter()
                    .any(|r| r.try_get::<Uuid, _>("id").ok().as_ref() == Some(id.as_uuid()))
            })
            .map(ToString::to_string)
            .unwrap_or_default();
        return Err(StoreError::not_found(EntityKind::Menu, missing));
    }

    let shortages = plan.shortages(&levels);
    if !shortages.is_empty() {
        return Err(StoreError::InsufficientStock(shortages));
    }
    let ingredient_deltas = plan.ingredient_deltas()?;

    for (menu_id, delta) in &menu_deltas {
        let updated = sqlx::query(
            r#"
            UPDATE menus
            SET remaining_qty = remaining_qty + $2
            WHERE id = $1 AND remaining_qty + $2 >= 0
            RETURNING remaining_qty
            "#,
        )
        .bind(menu_id.as_uuid())
        .bind(*delta)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("adjust_remaining_qty", e))?;

        if updated.is_none() {
            return Err(StoreError::InsufficientStock(vec![Shortage::MenuQuota {
                menu_id: *menu_id,
                remaining: 0,
            }]));
        }
    }

    for (ingredient_id, delta) in &ingredient_deltas {
        let updated = sqlx::query(
            r#"
            UPDATE ingredients
            SET current_stock = current_stock + $2
            WHERE id = $1 AND current_stock + $2 >= 0
            RETURNING current_stock
            "#,
        )
        .bind(ingredient_id.as_uuid())
        .bind(*delta)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("adjust_stock", e))?;

        if updated.is_none() {
            return Err(match plan.direction() {
                StockDirection::Restore => StoreError::not_found(EntityKind::Ingredient, ingredient_id),
                StockDirection::Deduct => StoreError::InsufficientStock(vec![Shortage::Ingredient {
                    ingredient_id: *ingredient_id,
                    available: Decimal::ZERO,
                    required: -*delta,
                }]),
            });
        }
    }

    Ok(())
}

#[async_trait]
impl CatalogStore for PostgresStore {
    #[instrument(skip(self), fields(ingredient_id = %id), err)]
    async fn get_ingredient(&self, id: IngredientId) -> Result<Ingredient, StoreError> {
        let row = sqlx::query(&format!("SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_ingredient", e))?
            .ok_or_else(|| StoreError::not_found(EntityKind::Ingredient, id))?;
        ingredient_from_row(&row)
    }

    async fn ingredients_by_ids(&self, ids: &[IngredientId]) -> Result<Vec<Ingredient>, StoreError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(&ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ingredients_by_ids", e))?;
        rows.iter().map(ingredient_from_row).collect()
    }

    async fn list_ingredients(&self) -> Result<Vec<Ingredient>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {INGREDIENT_COLUMNS} FROM ingredients ORDER BY id"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_ingredients", e))?;
        rows.iter().map(ingredient_from_row).collect()
    }

    async fn list_low_stock_ingredients(&self) -> Result<Vec<Ingredient>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {INGREDIENT_COLUMNS} FROM ingredients \
             WHERE current_stock < min_stock_level ORDER BY name"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_low_stock_ingredients", e))?;
        rows.iter().map(ingredient_from_row).collect()
    }

    #[instrument(skip(self), fields(dish_id = %id), err)]
    async fn get_dish(&self, id: DishId) -> Result<Dish, StoreError> {
        self.load_dishes(&[*id.as_uuid()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found(EntityKind::Dish, id))
    }

    #[instrument(skip(self), fields(menu_id = %id), err)]
    async fn get_menu(&self, id: MenuId) -> Result<Menu, StoreError> {
        self.load_menus(Some(id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found(EntityKind::Menu, id))
    }

    async fn list_menus(&self) -> Result<Vec<Menu>, StoreError> {
        self.load_menus(None).await
    }

    #[instrument(
        skip(self, seed),
        fields(
            ingredients = seed.ingredients.len(),
            dishes = seed.dishes.len(),
            menus = seed.menus.len()
        ),
        err
    )]
    async fn seed(&self, seed: &CatalogSeed) -> Result<(), StoreError> {
        seed.validate()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for i in &seed.ingredients {
            sqlx::query(
                r#"
                INSERT INTO ingredients (id, name, unit, current_stock, min_stock_level)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    unit = EXCLUDED.unit,
                    current_stock = EXCLUDED.current_stock,
                    min_stock_level = EXCLUDED.min_stock_level
                "#,
            )
            .bind(i.id.as_uuid())
            .bind(&i.name)
            .bind(&i.unit)
            .bind(i.current_stock)
            .bind(i.min_stock_level)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("seed_ingredient", e))?;
        }

        for dish in &seed.dishes {
            sqlx::query(
                "INSERT INTO dishes (id, name) VALUES ($1, $2) \
                 ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name",
            )
            .bind(dish.id.as_uuid())
            .bind(&dish.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("seed_dish", e))?;

            sqlx::query("DELETE FROM dish_requirements WHERE dish_id = $1")
                .bind(dish.id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("seed_dish", e))?;

            for (position, req) in dish.requirements.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO dish_requirements (dish_id, position, ingredient_id, quantity) \
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(dish.id.as_uuid())
                .bind(position as i32)
                .bind(req.ingredient_id.as_uuid())
                .bind(req.quantity)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("seed_dish_requirement", e))?;
            }
        }

        for menu in &seed.menus {
            let person_min = i32::try_from(menu.person_min)
                .map_err(|_| StoreError::Invalid(format!("menu {}: person_min too large", menu.id)))?;
            sqlx::query(
                r#"
                INSERT INTO menus (id, name, person_min, remaining_qty, price_per_person, published)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    person_min = EXCLUDED.person_min,
                    remaining_qty = EXCLUDED.remaining_qty,
                    price_per_person = EXCLUDED.price_per_person,
                    published = EXCLUDED.published
                "#,
            )
            .bind(menu.id.as_uuid())
            .bind(&menu.name)
            .bind(person_min)
            .bind(menu.remaining_qty)
            .bind(menu.price_per_person)
            .bind(menu.published)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("seed_menu", e))?;

            sqlx::query("DELETE FROM menu_dishes WHERE menu_id = $1")
                .bind(menu.id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("seed_menu", e))?;

            for (position, dish_id) in menu.dish_ids.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO menu_dishes (menu_id, position, dish_id) VALUES ($1, $2, $3)",
                )
                .bind(menu.id.as_uuid())
                .bind(position as i32)
                .bind(dish_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("seed_menu_dish", e))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}

#[async_trait]
impl StockLedger for PostgresStore {
    #[instrument(skip(self), fields(ingredient_id = %id), err)]
    async fn atomic_adjust_stock(
        &self,
        id: IngredientId,
        delta: Decimal,
    ) -> Result<Ingredient, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE ingredients SET current_stock = current_stock + $2 \
             WHERE id = $1 AND current_stock + $2 >= 0 \
             RETURNING {INGREDIENT_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(delta)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("atomic_adjust_stock", e))?;

        match row {
            Some(row) => ingredient_from_row(&row),
            None => {
                // Either the row is missing or the guard refused the update.
                let current = self.get_ingredient(id).await?;
                Err(StoreError::InsufficientStock(vec![Shortage::Ingredient {
                    ingredient_id: id,
                    available: current.current_stock,
                    required: -delta,
                }]))
            }
        }
    }

    #[instrument(skip(self), fields(menu_id = %id), err)]
    async fn atomic_adjust_remaining_qty(&self, id: MenuId, delta: i64) -> Result<Menu, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE menus
            SET remaining_qty = remaining_qty + $2
            WHERE id = $1 AND remaining_qty + $2 >= 0
            RETURNING remaining_qty
            "#,
        )
        .bind(id.as_uuid())
        .bind(delta)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("atomic_adjust_remaining_qty", e))?;

        let menu = self.get_menu(id).await?;
        if row.is_none() {
            return Err(StoreError::InsufficientStock(vec![Shortage::MenuQuota {
                menu_id: id,
                remaining: menu.remaining_qty,
            }]));
        }
        Ok(menu)
    }

    #[instrument(
        skip(self, plan),
        fields(direction = ?plan.direction(), menus = plan.menus().len()),
        err
    )]
    async fn apply_plan(&self, plan: &StockPlan) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        apply_plan_in_tx(&mut tx, plan).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn get_order(&self, id: OrderId) -> Result<OrderRecord, StoreError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?
            .ok_or_else(|| StoreError::not_found(EntityKind::Order, id))?;
        order_from_row(&row)
    }

    #[instrument(skip(self, order), fields(order_id = %order.id, order_number = %order.order_number), err)]
    async fn insert_order(&self, order: &OrderRecord) -> Result<(), StoreError> {
        let menu_ids: Vec<Uuid> = order.menu_ids.iter().map(|id| *id.as_uuid()).collect();
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(order.status.as_str())
        .bind(person_number_to_db(order.person_number)?)
        .bind(&menu_ids)
        .bind(order.menu_price)
        .bind(order.delivery_price)
        .bind(order.total_price)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(version_to_db(order.version)?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    #[instrument(
        skip(self, next, plan),
        fields(
            order_id = %next.id,
            status = %next.status,
            expected_version = ?expected,
            with_plan = plan.is_some(),
            committed = tracing::field::Empty
        ),
        err
    )]
    async fn commit_transition(
        &self,
        next: &OrderRecord,
        expected: ExpectedVersion,
        plan: Option<&StockPlan>,
    ) -> Result<(), StoreError> {
        let span = Span::current();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let expected_version = expected_to_db(expected)?;
        let next_version = version_to_db(next.version)?;
        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, updated_at = $3, version = $4
            WHERE id = $1 AND ($5::bigint IS NULL OR version = $5)
            "#,
        )
        .bind(next.id.as_uuid())
        .bind(next.status.as_str())
        .bind(next.updated_at)
        .bind(next_version)
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_order_status", e))?;

        if updated.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            // Distinguish a missing order from a lost race.
            self.get_order(next.id).await?;
            return Err(StoreError::Concurrency(format!(
                "order {} is no longer at {expected:?}",
                next.id
            )));
        }

        if let Some(plan) = plan {
            apply_plan_in_tx(&mut tx, plan).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        span.record("committed", true);
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn delete_pending_order(
        &self,
        id: OrderId,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let expected_version = expected_to_db(expected)?;
        let deleted = sqlx::query(
            r#"
            DELETE FROM orders
            WHERE id = $1 AND status = 'pending' AND ($2::bigint IS NULL OR version = $2)
            "#,
        )
        .bind(id.as_uuid())
        .bind(expected_version)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_pending_order", e))?;

        if deleted.rows_affected() == 0 {
            self.get_order(id).await?;
            return Err(StoreError::Concurrency(format!(
                "order {id} changed since it was read"
            )));
        }
        Ok(())
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Concurrency(msg),
                Some("23503") => StoreError::Invalid(msg),
                Some("23514") => StoreError::InsufficientStock(Vec::new()),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
