//! # Adjustment Repository
//!
//! Persistence for adjustments and the recalculation cascade.
//!
//! ## Recalculation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  create / destroy / update_adjustable                   │
//! │                                 │                                       │
//! │                                 ▼                                       │
//! │  ┌───────────────────────────────────────────────────────────────────┐ │
//! │  │ one transaction                                                   │ │
//! │  │                                                                   │ │
//! │  │  load adjustable snapshot + its adjustments + source catalog      │ │
//! │  │        │                                                          │ │
//! │  │        ▼                                                          │ │
//! │  │  ItemAdjustments::update  (promotions → taxes → the rest)         │ │
//! │  │        │                                                          │ │
//! │  │        ├── write changed adjustments                              │ │
//! │  │        ├── write item totals (line item / shipment row)           │ │
//! │  │        ▼                                                          │ │
//! │  │  order-level adjustments → roll every total up onto the order     │ │
//! │  └───────────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{order, source};
use storefront_core::{
    AdjustableKind, AdjustableRef, Adjustment, AdjustmentScope, AdjustmentState,
    AdjustmentTotals, ItemAdjustments, Money, NewAdjustment, Order, SourceCatalog, SourceKind,
    SourceRef, ValidationError,
};

const ADJUSTMENT_COLUMNS: &str = "id, order_id, adjustable_type, adjustable_id, source_type, \
     source_id, amount_cents, label, eligible, mandatory, included, state, \
     promotion_code_id, adjustment_reason_id, created_at, updated_at";

/// Repository for adjustment database operations.
///
/// ## Usage
/// ```rust,ignore
/// let adjustments = db.adjustments();
///
/// let tax = adjustments
///     .create(NewAdjustment::manual(order_id, AdjustableRef::line_item(item_id), Money::zero(), "Sales tax")
///         .with_source(SourceRef::new(SourceKind::TaxRate, rate_id)))
///     .await?;
///
/// let credits = adjustments
///     .list(&order_id, &[AdjustmentScope::Eligible, AdjustmentScope::Credit])
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct AdjustmentRepository {
    pool: SqlitePool,
}

impl AdjustmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AdjustmentRepository { pool }
    }

    /// Validates and inserts an adjustment, then recomputes its adjustable.
    ///
    /// The returned adjustment reflects the recomputation: a sourced
    /// adjustment's amount comes from its source, not from the input.
    pub async fn create(&self, mut new: NewAdjustment) -> DbResult<Adjustment> {
        let mut tx = self.pool.begin().await?;

        // Tax rates decide whether their adjustments are included in the price.
        if let Some(source) = new.source.as_ref().filter(|s| s.kind == SourceKind::TaxRate) {
            let catalog = source::catalog_in(&mut tx, [source]).await?;
            if let Some(rate) = catalog.resolve(source) {
                new.included = rate.included();
            }
        }

        let requires_code = match &new.source {
            Some(SourceRef {
                kind: SourceKind::PromotionAction,
                id: Some(action_id),
            }) => source::promotion_requires_code_in(&mut tx, action_id).await?,
            _ => false,
        };
        new.validate(requires_code)?;

        let owner = order::owning_order_in(&mut tx, &new.adjustable).await?;
        if owner != new.order_id {
            return Err(ValidationError::InvalidFormat {
                field: "adjustable".to_string(),
                reason: format!("belongs to order {}", owner),
            }
            .into());
        }

        let now = Utc::now();
        let adjustment = new.into_adjustment(Uuid::new_v4().to_string(), now);
        debug!(
            id = %adjustment.id,
            adjustable = %adjustment.adjustable.kind,
            label = %adjustment.label,
            "Creating adjustment"
        );

        insert_in(&mut tx, &adjustment).await?;
        order::touch_adjustable_in(&mut tx, &adjustment.adjustable, now).await?;
        update_adjustable_in(&mut tx, &adjustment.adjustable, now).await?;

        let created = fetch_in(&mut tx, &adjustment.id).await?;
        tx.commit().await?;

        Ok(created)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Adjustment>> {
        let row = sqlx::query_as::<_, AdjustmentRow>(&format!(
            "SELECT {} FROM adjustments WHERE id = ?1",
            ADJUSTMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Adjustment::from))
    }

    /// An order's adjustments (on any adjustable) matching every scope.
    pub async fn list(
        &self,
        order_id: &str,
        scopes: &[AdjustmentScope],
    ) -> DbResult<Vec<Adjustment>> {
        debug!(order_id = %order_id, ?scopes, "Listing adjustments");

        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM adjustments WHERE order_id = ",
            ADJUSTMENT_COLUMNS
        ));
        query.push_bind(order_id);
        push_scopes(&mut query, scopes);

        let rows = query
            .build_query_as::<AdjustmentRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Adjustment::from).collect())
    }

    /// The adjustments of one adjustable matching every scope.
    pub async fn for_adjustable(
        &self,
        adjustable: &AdjustableRef,
        scopes: &[AdjustmentScope],
    ) -> DbResult<Vec<Adjustment>> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM adjustments WHERE adjustable_type = ",
            ADJUSTMENT_COLUMNS
        ));
        query.push_bind(adjustable.kind.as_str());
        query.push(" AND adjustable_id = ");
        query.push_bind(&adjustable.id);
        push_scopes(&mut query, scopes);

        let rows = query
            .build_query_as::<AdjustmentRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Adjustment::from).collect())
    }

    /// Freezes an open adjustment.
    pub async fn close(&self, id: &str) -> DbResult<Adjustment> {
        self.transition(id, Adjustment::close).await
    }

    /// Unfreezes a closed adjustment.
    pub async fn open(&self, id: &str) -> DbResult<Adjustment> {
        self.transition(id, Adjustment::open).await
    }

    async fn transition(
        &self,
        id: &str,
        event: fn(&mut Adjustment, DateTime<Utc>) -> storefront_core::CoreResult<()>,
    ) -> DbResult<Adjustment> {
        let mut conn = self.pool.acquire().await?;
        let mut adjustment = fetch_in(&mut conn, id).await?;
        event(&mut adjustment, Utc::now())?;

        sqlx::query("UPDATE adjustments SET state = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(&adjustment.id)
            .bind(adjustment.state.as_str())
            .bind(adjustment.updated_at)
            .execute(&mut *conn)
            .await?;

        info!(id = %adjustment.id, state = %adjustment.state, "Adjustment state changed");
        Ok(adjustment)
    }

    /// Recomputes one adjustment's amount from its source.
    ///
    /// Closed adjustments and adjustments without a source keep their
    /// amount. The row is only written when something changed; cached
    /// totals are left for [`Self::update_adjustable`].
    pub async fn update_amount(&self, id: &str) -> DbResult<Money> {
        let mut conn = self.pool.acquire().await?;
        let mut adjustment = fetch_in(&mut conn, id).await?;
        if adjustment.is_closed() {
            debug!(id = %id, "Closed adjustment keeps its amount");
            return Ok(adjustment.amount());
        }

        let snapshot = order::snapshot_in(&mut conn, &adjustment.adjustable).await?;
        let catalog = source::catalog_in(&mut conn, adjustment.source.iter()).await?;

        if adjustment.recalculate(&snapshot, &catalog, Utc::now()) {
            debug!(id = %id, amount = %adjustment.amount(), "Adjustment amount changed");
            persist_in(&mut conn, &adjustment).await?;
        }

        Ok(adjustment.amount())
    }

    /// Deletes an adjustment and recomputes its adjustable.
    pub async fn destroy(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let adjustment = fetch_in(&mut tx, id).await?;

        debug!(id = %id, "Destroying adjustment");
        sqlx::query("DELETE FROM adjustments WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        update_adjustable_in(&mut tx, &adjustment.adjustable, Utc::now()).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Deletes the open adjustments generated by `source` and recomputes the
    /// adjustables they belonged to. Closed adjustments stay as history.
    pub async fn destroy_for_source(&self, source: &SourceRef) -> DbResult<u64> {
        let Some(source_id) = source.id.as_deref() else {
            return Ok(0);
        };

        let mut tx = self.pool.begin().await?;
        let affected = sqlx::query_as::<_, AdjustableRow>(
            r#"
            SELECT DISTINCT adjustable_type, adjustable_id FROM adjustments
            WHERE source_type = ?1 AND source_id = ?2 AND state = 'open'
            "#,
        )
        .bind(source.kind.as_str())
        .bind(source_id)
        .fetch_all(&mut *tx)
        .await?;

        let result = sqlx::query(
            "DELETE FROM adjustments WHERE source_type = ?1 AND source_id = ?2 AND state = 'open'",
        )
        .bind(source.kind.as_str())
        .bind(source_id)
        .execute(&mut *tx)
        .await?;

        let now = Utc::now();
        for row in affected {
            let adjustable = AdjustableRef::new(row.adjustable_type, row.adjustable_id);
            update_adjustable_in(&mut tx, &adjustable, now).await?;
        }
        tx.commit().await?;

        info!(
            source = %source.kind,
            source_id = %source_id,
            removed = result.rows_affected(),
            "Removed adjustments for source"
        );
        Ok(result.rows_affected())
    }

    /// Recomputes the adjustments of one adjustable and rolls the order's
    /// totals up. Returns the adjustable's own totals.
    pub async fn update_adjustable(&self, adjustable: &AdjustableRef) -> DbResult<AdjustmentTotals> {
        let mut tx = self.pool.begin().await?;
        let totals = update_adjustable_in(&mut tx, adjustable, Utc::now()).await?;
        tx.commit().await?;
        Ok(totals)
    }

    /// Recomputes every line item, shipment and order-level adjustment of
    /// an order in one transaction.
    pub async fn recalculate_order(&self, order_id: &str) -> DbResult<Order> {
        info!(order_id = %order_id, "Recalculating order");
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        for item in order::item_refs_in(&mut tx, order_id).await? {
            recalculate_item_in(&mut tx, &item, now).await?;
        }
        let order = refresh_order_in(&mut tx, order_id, now).await?;
        tx.commit().await?;

        Ok(order)
    }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct AdjustmentRow {
    id: String,
    order_id: String,
    adjustable_type: AdjustableKind,
    adjustable_id: String,
    source_type: Option<String>,
    source_id: Option<String>,
    amount_cents: i64,
    label: String,
    eligible: bool,
    mandatory: bool,
    included: bool,
    state: AdjustmentState,
    promotion_code_id: Option<String>,
    adjustment_reason_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AdjustmentRow> for Adjustment {
    fn from(row: AdjustmentRow) -> Self {
        Adjustment {
            id: row.id,
            order_id: row.order_id,
            adjustable: AdjustableRef::new(row.adjustable_type, row.adjustable_id),
            source: row.source_type.map(|kind| SourceRef {
                kind: SourceKind::parse(&kind),
                id: row.source_id,
            }),
            amount_cents: row.amount_cents,
            label: row.label,
            eligible: row.eligible,
            mandatory: row.mandatory,
            included: row.included,
            state: row.state,
            promotion_code_id: row.promotion_code_id,
            adjustment_reason_id: row.adjustment_reason_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AdjustableRow {
    adjustable_type: AdjustableKind,
    adjustable_id: String,
}

// =============================================================================
// Connection-level helpers
// =============================================================================

fn push_scopes(query: &mut QueryBuilder<'_, Sqlite>, scopes: &[AdjustmentScope]) {
    for scope in scopes {
        query.push(" AND ");
        query.push(scope.sql_predicate());
    }
    query.push(" ORDER BY created_at, id");
}

async fn insert_in(conn: &mut SqliteConnection, adjustment: &Adjustment) -> DbResult<()> {
    let (source_type, source_id) = match &adjustment.source {
        Some(source) => (Some(source.kind.as_str()), source.id.as_deref()),
        None => (None, None),
    };

    sqlx::query(&format!(
        "INSERT INTO adjustments ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        ADJUSTMENT_COLUMNS
    ))
    .bind(&adjustment.id)
    .bind(&adjustment.order_id)
    .bind(adjustment.adjustable.kind.as_str())
    .bind(&adjustment.adjustable.id)
    .bind(source_type)
    .bind(source_id)
    .bind(adjustment.amount_cents)
    .bind(&adjustment.label)
    .bind(adjustment.eligible)
    .bind(adjustment.mandatory)
    .bind(adjustment.included)
    .bind(adjustment.state.as_str())
    .bind(&adjustment.promotion_code_id)
    .bind(&adjustment.adjustment_reason_id)
    .bind(adjustment.created_at)
    .bind(adjustment.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::ForeignKeyViolation { .. } => ValidationError::InvalidFormat {
            field: "promotion_code".to_string(),
            reason: "unknown promotion code".to_string(),
        }
        .into(),
        other => other,
    })?;
    Ok(())
}

/// Writes the recomputable columns of an adjustment.
async fn persist_in(conn: &mut SqliteConnection, adjustment: &Adjustment) -> DbResult<()> {
    sqlx::query(
        "UPDATE adjustments SET amount_cents = ?2, eligible = ?3, updated_at = ?4 WHERE id = ?1",
    )
    .bind(&adjustment.id)
    .bind(adjustment.amount_cents)
    .bind(adjustment.eligible)
    .bind(adjustment.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn fetch_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Adjustment> {
    let row = sqlx::query_as::<_, AdjustmentRow>(&format!(
        "SELECT {} FROM adjustments WHERE id = ?1",
        ADJUSTMENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("Adjustment", id))?;
    Ok(row.into())
}

async fn for_adjustable_in(
    conn: &mut SqliteConnection,
    adjustable: &AdjustableRef,
) -> DbResult<Vec<Adjustment>> {
    let rows = sqlx::query_as::<_, AdjustmentRow>(&format!(
        "SELECT {} FROM adjustments WHERE adjustable_type = ?1 AND adjustable_id = ?2 ORDER BY created_at, id",
        ADJUSTMENT_COLUMNS
    ))
    .bind(adjustable.kind.as_str())
    .bind(&adjustable.id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(Adjustment::from).collect())
}

/// Runs `ItemAdjustments` for one adjustable, persists changed adjustments
/// and, for line items and shipments, the item's cached totals.
async fn recalculate_item_in(
    conn: &mut SqliteConnection,
    adjustable: &AdjustableRef,
    now: DateTime<Utc>,
) -> DbResult<AdjustmentTotals> {
    let snapshot = order::snapshot_in(conn, adjustable).await?;
    let mut adjustments = for_adjustable_in(conn, adjustable).await?;
    let catalog =
        source::catalog_in(conn, adjustments.iter().filter_map(|a| a.source.as_ref())).await?;

    let update = ItemAdjustments::new(snapshot, &catalog, now).update(&mut adjustments);

    for adjustment in adjustments
        .iter()
        .filter(|a| update.changed.contains(&a.id))
    {
        persist_in(conn, adjustment).await?;
    }
    order::write_item_totals_in(conn, adjustable, &update.totals, now).await?;

    debug!(
        adjustable = %adjustable.kind,
        id = %adjustable.id,
        changed = update.changed.len(),
        adjustment_total = %update.totals.adjustment_total,
        "Adjustable recalculated"
    );
    Ok(update.totals)
}

/// Recomputes the order-level adjustments and rolls all totals up.
pub(crate) async fn refresh_order_in(
    conn: &mut SqliteConnection,
    order_id: &str,
    now: DateTime<Utc>,
) -> DbResult<Order> {
    let order_level = recalculate_item_in(conn, &AdjustableRef::order(order_id), now).await?;
    order::write_order_totals_in(conn, order_id, &order_level, now).await
}

/// Recomputes one adjustable, then its order.
pub(crate) async fn update_adjustable_in(
    conn: &mut SqliteConnection,
    adjustable: &AdjustableRef,
    now: DateTime<Utc>,
) -> DbResult<AdjustmentTotals> {
    if adjustable.kind == AdjustableKind::Order {
        let totals = recalculate_item_in(conn, adjustable, now).await?;
        order::write_order_totals_in(conn, &adjustable.id, &totals, now).await?;
        return Ok(totals);
    }

    let totals = recalculate_item_in(conn, adjustable, now).await?;
    let order_id = order::owning_order_in(conn, adjustable).await?;
    refresh_order_in(conn, &order_id, now).await?;
    Ok(totals)
}

// =============================================================================
// Unit Tests
// =============================================================================
