//! # Order Repository
//!
//! Orders, line items and shipments: the three adjustable record kinds.
//!
//! ## Cached Totals
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  line_items / shipments                                                 │
//! │    adjustment_total, promo_total, included_tax_total,                   │
//! │    additional_tax_total   ← written per item by ItemAdjustments         │
//! │                                                                         │
//! │  orders                                                                 │
//! │    item_total      = Σ line_items.price × quantity                      │
//! │    shipment_total  = Σ shipments.cost                                   │
//! │    *_total         = Σ line item totals + Σ shipment totals             │
//! │                      + order-level adjustments                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::adjustment;
use storefront_core::validation::validate_present;
use storefront_core::{
    AdjustableKind, AdjustableRef, AdjustableSnapshot, AdjustmentTotals, Currency, LineItem,
    Money, Order, Shipment, ValidationError,
};

const ORDER_COLUMNS: &str = "id, number, currency, item_total_cents, shipment_total_cents, \
     adjustment_total_cents, promo_total_cents, included_tax_total_cents, \
     additional_tax_total_cents, created_at, updated_at";

const LINE_ITEM_COLUMNS: &str = "id, order_id, product_id, price_cents, quantity, \
     adjustment_total_cents, promo_total_cents, included_tax_total_cents, \
     additional_tax_total_cents, created_at, updated_at";

const SHIPMENT_COLUMNS: &str = "id, order_id, cost_cents, adjustment_total_cents, \
     promo_total_cents, included_tax_total_cents, additional_tax_total_cents, \
     created_at, updated_at";

/// Repository for orders and their adjustables.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Creates an empty order.
    pub async fn create(&self, number: &str, currency: &Currency) -> DbResult<Order> {
        let number = number.trim();
        validate_present("number", number)?;

        debug!(number = %number, currency = %currency, "Creating order");

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            number: number.to_string(),
            currency: currency.code().to_string(),
            item_total_cents: 0,
            shipment_total_cents: 0,
            adjustment_total_cents: 0,
            promo_total_cents: 0,
            included_tax_total_cents: 0,
            additional_tax_total_cents: 0,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO orders (id, number, currency, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&order.id)
        .bind(&order.number)
        .bind(&order.currency)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, number),
            other => other,
        })?;

        Ok(order)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE id = ?1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    pub async fn get_by_number(&self, number: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE number = ?1",
            ORDER_COLUMNS
        ))
        .bind(number.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    /// Adds a line item and refreshes the order's totals.
    pub async fn add_line_item(
        &self,
        order_id: &str,
        product_id: Option<&str>,
        price: Money,
        quantity: i64,
    ) -> DbResult<LineItem> {
        validate_quantity(quantity)?;
        if price.is_negative() {
            return Err(ValidationError::InvalidFormat {
                field: "price".to_string(),
                reason: "cannot be negative".to_string(),
            }
            .into());
        }

        debug!(order_id = %order_id, price = %price, quantity, "Adding line item");

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let mut tx = self.pool.begin().await?;
        ensure_order_in(&mut tx, order_id).await?;

        sqlx::query(
            r#"
            INSERT INTO line_items (id, order_id, product_id, price_cents, quantity, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
        )
        .bind(&id)
        .bind(order_id)
        .bind(product_id)
        .bind(price.cents())
        .bind(quantity)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        adjustment::refresh_order_in(&mut tx, order_id, now).await?;
        let item = line_item_in(&mut tx, &id).await?;
        tx.commit().await?;

        Ok(item)
    }

    /// Changes a line item's quantity and recomputes its adjustments.
    pub async fn update_quantity(&self, line_item_id: &str, quantity: i64) -> DbResult<LineItem> {
        validate_quantity(quantity)?;
        debug!(line_item_id = %line_item_id, quantity, "Updating line item quantity");

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE line_items SET quantity = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(line_item_id)
            .bind(quantity)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("LineItem", line_item_id));
        }

        adjustment::update_adjustable_in(&mut tx, &AdjustableRef::line_item(line_item_id), now)
            .await?;
        let item = line_item_in(&mut tx, line_item_id).await?;
        tx.commit().await?;

        Ok(item)
    }

    /// Adds a shipment and refreshes the order's totals.
    pub async fn add_shipment(&self, order_id: &str, cost: Money) -> DbResult<Shipment> {
        if cost.is_negative() {
            return Err(ValidationError::InvalidFormat {
                field: "cost".to_string(),
                reason: "cannot be negative".to_string(),
            }
            .into());
        }

        debug!(order_id = %order_id, cost = %cost, "Adding shipment");

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let mut tx = self.pool.begin().await?;
        ensure_order_in(&mut tx, order_id).await?;

        sqlx::query(
            r#"
            INSERT INTO shipments (id, order_id, cost_cents, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            "#,
        )
        .bind(&id)
        .bind(order_id)
        .bind(cost.cents())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        adjustment::refresh_order_in(&mut tx, order_id, now).await?;
        let shipment = shipment_in(&mut tx, &id).await?;
        tx.commit().await?;

        Ok(shipment)
    }

    pub async fn get_line_item(&self, id: &str) -> DbResult<Option<LineItem>> {
        let item = sqlx::query_as::<_, LineItem>(&format!(
            "SELECT {} FROM line_items WHERE id = ?1",
            LINE_ITEM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    pub async fn get_shipment(&self, id: &str) -> DbResult<Option<Shipment>> {
        let shipment = sqlx::query_as::<_, Shipment>(&format!(
            "SELECT {} FROM shipments WHERE id = ?1",
            SHIPMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(shipment)
    }

    /// Line items in creation order.
    pub async fn line_items(&self, order_id: &str) -> DbResult<Vec<LineItem>> {
        let items = sqlx::query_as::<_, LineItem>(&format!(
            "SELECT {} FROM line_items WHERE order_id = ?1 ORDER BY created_at, id",
            LINE_ITEM_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn shipments(&self, order_id: &str) -> DbResult<Vec<Shipment>> {
        let shipments = sqlx::query_as::<_, Shipment>(&format!(
            "SELECT {} FROM shipments WHERE order_id = ?1 ORDER BY created_at, id",
            SHIPMENT_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(shipments)
    }

    /// The amounts sources compute against for `adjustable`.
    pub async fn snapshot(&self, adjustable: &AdjustableRef) -> DbResult<AdjustableSnapshot> {
        let mut conn = self.pool.acquire().await?;
        snapshot_in(&mut conn, adjustable).await
    }

    /// Cached totals of `adjustable` as last written.
    pub async fn totals(&self, adjustable: &AdjustableRef) -> DbResult<AdjustmentTotals> {
        let row = sqlx::query_as::<_, TotalsRow>(&format!(
            "SELECT adjustment_total_cents, promo_total_cents, included_tax_total_cents, \
             additional_tax_total_cents FROM {} WHERE id = ?1",
            table_for(adjustable.kind)
        ))
        .bind(&adjustable.id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found(adjustable))?;
        Ok(row.into())
    }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct TotalsRow {
    adjustment_total_cents: i64,
    promo_total_cents: i64,
    included_tax_total_cents: i64,
    additional_tax_total_cents: i64,
}

impl From<TotalsRow> for AdjustmentTotals {
    fn from(row: TotalsRow) -> Self {
        let promo = Money::from_cents(row.promo_total_cents);
        let additional = Money::from_cents(row.additional_tax_total_cents);
        let adjustment = Money::from_cents(row.adjustment_total_cents);
        AdjustmentTotals {
            promo_total: promo,
            included_tax_total: Money::from_cents(row.included_tax_total_cents),
            additional_tax_total: additional,
            other_total: adjustment - promo - additional,
            adjustment_total: adjustment,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    order_id: String,
    currency: String,
    amount_cents: i64,
    quantity: i64,
}

// =============================================================================
// Connection-level helpers (shared with the adjustment repository)
// =============================================================================

fn table_for(kind: AdjustableKind) -> &'static str {
    match kind {
        AdjustableKind::Order => "orders",
        AdjustableKind::LineItem => "line_items",
        AdjustableKind::Shipment => "shipments",
    }
}

fn entity_for(kind: AdjustableKind) -> &'static str {
    match kind {
        AdjustableKind::Order => "Order",
        AdjustableKind::LineItem => "LineItem",
        AdjustableKind::Shipment => "Shipment",
    }
}

fn not_found(adjustable: &AdjustableRef) -> DbError {
    DbError::not_found(entity_for(adjustable.kind), &adjustable.id)
}

fn validate_quantity(quantity: i64) -> Result<(), ValidationError> {
    if quantity <= 0 {
        return Err(ValidationError::InvalidFormat {
            field: "quantity".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }
    Ok(())
}

async fn ensure_order_in(conn: &mut SqliteConnection, order_id: &str) -> DbResult<()> {
    let exists: Option<String> = sqlx::query_scalar("SELECT id FROM orders WHERE id = ?1")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;
    exists
        .map(|_| ())
        .ok_or_else(|| DbError::not_found("Order", order_id))
}

async fn line_item_in(conn: &mut SqliteConnection, id: &str) -> DbResult<LineItem> {
    sqlx::query_as::<_, LineItem>(&format!(
        "SELECT {} FROM line_items WHERE id = ?1",
        LINE_ITEM_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("LineItem", id))
}

async fn shipment_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Shipment> {
    sqlx::query_as::<_, Shipment>(&format!(
        "SELECT {} FROM shipments WHERE id = ?1",
        SHIPMENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("Shipment", id))
}

pub(crate) async fn order_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Order> {
    sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders WHERE id = ?1",
        ORDER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("Order", id))
}

/// Ids of an order's line items and shipments, as adjustable references.
pub(crate) async fn item_refs_in(
    conn: &mut SqliteConnection,
    order_id: &str,
) -> DbResult<Vec<AdjustableRef>> {
    let line_items: Vec<String> =
        sqlx::query_scalar("SELECT id FROM line_items WHERE order_id = ?1 ORDER BY created_at, id")
            .bind(order_id)
            .fetch_all(&mut *conn)
            .await?;
    let shipments: Vec<String> =
        sqlx::query_scalar("SELECT id FROM shipments WHERE order_id = ?1 ORDER BY created_at, id")
            .bind(order_id)
            .fetch_all(&mut *conn)
            .await?;

    Ok(line_items
        .into_iter()
        .map(AdjustableRef::line_item)
        .chain(shipments.into_iter().map(AdjustableRef::shipment))
        .collect())
}

pub(crate) async fn snapshot_in(
    conn: &mut SqliteConnection,
    adjustable: &AdjustableRef,
) -> DbResult<AdjustableSnapshot> {
    let sql = match adjustable.kind {
        AdjustableKind::LineItem => {
            r#"
            SELECT li.order_id, o.currency, li.price_cents * li.quantity AS amount_cents, li.quantity
            FROM line_items li
            INNER JOIN orders o ON o.id = li.order_id
            WHERE li.id = ?1
            "#
        }
        AdjustableKind::Shipment => {
            r#"
            SELECT s.order_id, o.currency, s.cost_cents AS amount_cents, 1 AS quantity
            FROM shipments s
            INNER JOIN orders o ON o.id = s.order_id
            WHERE s.id = ?1
            "#
        }
        AdjustableKind::Order => {
            r#"
            SELECT o.id AS order_id, o.currency,
                   (SELECT COALESCE(SUM(li.price_cents * li.quantity), 0)
                      FROM line_items li WHERE li.order_id = o.id) AS amount_cents,
                   1 AS quantity
            FROM orders o
            WHERE o.id = ?1
            "#
        }
    };

    let row = sqlx::query_as::<_, SnapshotRow>(sql)
        .bind(&adjustable.id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| not_found(adjustable))?;

    let promo_total: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount_cents), 0) FROM adjustments
        WHERE adjustable_type = ?1 AND adjustable_id = ?2
          AND source_type = 'promotion_action' AND eligible = 1
        "#,
    )
    .bind(adjustable.kind.as_str())
    .bind(&adjustable.id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(AdjustableSnapshot {
        adjustable: adjustable.clone(),
        order_id: row.order_id,
        currency: Currency::new(&row.currency)?,
        amount: Money::from_cents(row.amount_cents),
        quantity: row.quantity,
        promo_total: Money::from_cents(promo_total),
    })
}

/// The order an adjustable belongs to.
pub(crate) async fn owning_order_in(
    conn: &mut SqliteConnection,
    adjustable: &AdjustableRef,
) -> DbResult<String> {
    if adjustable.kind == AdjustableKind::Order {
        ensure_order_in(conn, &adjustable.id).await?;
        return Ok(adjustable.id.clone());
    }

    let order_id: Option<String> = sqlx::query_scalar(&format!(
        "SELECT order_id FROM {} WHERE id = ?1",
        table_for(adjustable.kind)
    ))
    .bind(&adjustable.id)
    .fetch_optional(&mut *conn)
    .await?;
    order_id.ok_or_else(|| not_found(adjustable))
}

pub(crate) async fn touch_adjustable_in(
    conn: &mut SqliteConnection,
    adjustable: &AdjustableRef,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(&format!(
        "UPDATE {} SET updated_at = ?2 WHERE id = ?1",
        table_for(adjustable.kind)
    ))
    .bind(&adjustable.id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(not_found(adjustable));
    }
    Ok(())
}

/// Writes cached totals onto a line item or shipment row.
pub(crate) async fn write_item_totals_in(
    conn: &mut SqliteConnection,
    adjustable: &AdjustableRef,
    totals: &AdjustmentTotals,
    now: DateTime<Utc>,
) -> DbResult<()> {
    if adjustable.kind == AdjustableKind::Order {
        return Ok(());
    }

    sqlx::query(&format!(
        r#"
        UPDATE {} SET
            adjustment_total_cents = ?2,
            promo_total_cents = ?3,
            included_tax_total_cents = ?4,
            additional_tax_total_cents = ?5,
            updated_at = ?6
        WHERE id = ?1
        "#,
        table_for(adjustable.kind)
    ))
    .bind(&adjustable.id)
    .bind(totals.adjustment_total.cents())
    .bind(totals.promo_total.cents())
    .bind(totals.included_tax_total.cents())
    .bind(totals.additional_tax_total.cents())
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Rolls item totals and `order_level` totals up onto the order row.
pub(crate) async fn write_order_totals_in(
    conn: &mut SqliteConnection,
    order_id: &str,
    order_level: &AdjustmentTotals,
    now: DateTime<Utc>,
) -> DbResult<Order> {
    let mut rollup = Vec::with_capacity(3);
    rollup.push(*order_level);
    for table in ["line_items", "shipments"] {
        let row = sqlx::query_as::<_, TotalsRow>(&format!(
            r#"
            SELECT
                COALESCE(SUM(adjustment_total_cents), 0) AS adjustment_total_cents,
                COALESCE(SUM(promo_total_cents), 0) AS promo_total_cents,
                COALESCE(SUM(included_tax_total_cents), 0) AS included_tax_total_cents,
                COALESCE(SUM(additional_tax_total_cents), 0) AS additional_tax_total_cents
            FROM {}
            WHERE order_id = ?1
            "#,
            table
        ))
        .bind(order_id)
        .fetch_one(&mut *conn)
        .await?;
        rollup.push(row.into());
    }
    let totals = AdjustmentTotals::sum(&rollup);

    let result = sqlx::query(
        r#"
        UPDATE orders SET
            item_total_cents = (SELECT COALESCE(SUM(price_cents * quantity), 0)
                                  FROM line_items WHERE order_id = ?1),
            shipment_total_cents = (SELECT COALESCE(SUM(cost_cents), 0)
                                      FROM shipments WHERE order_id = ?1),
            adjustment_total_cents = ?2,
            promo_total_cents = ?3,
            included_tax_total_cents = ?4,
            additional_tax_total_cents = ?5,
            updated_at = ?6
        WHERE id = ?1
        "#,
    )
    .bind(order_id)
    .bind(totals.adjustment_total.cents())
    .bind(totals.promo_total.cents())
    .bind(totals.included_tax_total.cents())
    .bind(totals.additional_tax_total.cents())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Order", order_id));
    }

    debug!(
        order_id = %order_id,
        adjustment_total = %totals.adjustment_total,
        "Order totals updated"
    );
    order_in(conn, order_id).await
}

// =============================================================================
// Unit Tests
// =============================================================================
