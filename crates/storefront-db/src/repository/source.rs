//! # Source Repository
//!
//! Tax rates, promotions (with codes and actions) and unit cancellations:
//! the records that generate adjustments.
//!
//! Recalculation never queries sources one adjustment at a time; it preloads
//! an [`InMemoryCatalog`] with every source the adjustments reference.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use storefront_core::source::{Calculator, Promotion, PromotionAction, TaxRateSource, UnitCancel};
use storefront_core::validation::{validate_name, validate_present};
use storefront_core::{InMemoryCatalog, SourceKind, SourceRef, TaxRate};

/// Repository for adjustment sources.
#[derive(Debug, Clone)]
pub struct SourceRepository {
    pool: SqlitePool,
}

impl SourceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SourceRepository { pool }
    }

    // =========================================================================
    // Tax Rates
    // =========================================================================

    pub async fn create_tax_rate(
        &self,
        name: &str,
        rate: TaxRate,
        included_in_price: bool,
    ) -> DbResult<TaxRateSource> {
        let name = name.trim();
        validate_name(name)?;
        debug!(name = %name, bps = rate.bps(), included_in_price, "Creating tax rate");

        let now = Utc::now();
        let tax_rate = TaxRateSource {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            rate,
            included_in_price,
        };

        sqlx::query(
            r#"
            INSERT INTO tax_rates (id, name, rate_bps, included_in_price, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(&tax_rate.id)
        .bind(&tax_rate.name)
        .bind(rate.bps())
        .bind(included_in_price)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(tax_rate)
    }

    pub async fn get_tax_rate(&self, id: &str) -> DbResult<Option<TaxRateSource>> {
        let mut conn = self.pool.acquire().await?;
        tax_rate_in(&mut conn, id).await
    }

    // =========================================================================
    // Promotions
    // =========================================================================

    /// Creates a promotion; `None` bounds leave that side of the window open.
    pub async fn create_promotion(
        &self,
        name: &str,
        starts_at: Option<DateTime<Utc>>,
        expires_at: Option<DateTime<Utc>>,
    ) -> DbResult<Promotion> {
        let name = name.trim();
        validate_name(name)?;
        debug!(name = %name, "Creating promotion");

        let now = Utc::now();
        let promotion = Promotion {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            starts_at,
            expires_at,
            code_ids: Vec::new(),
        };

        sqlx::query(
            r#"
            INSERT INTO promotions (id, name, starts_at, expires_at, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(&promotion.id)
        .bind(&promotion.name)
        .bind(starts_at)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(promotion)
    }

    /// Adds a code to a promotion; returns the code's id.
    ///
    /// Codes are stored lower-cased, so lookups are case-insensitive.
    pub async fn add_promotion_code(&self, promotion_id: &str, value: &str) -> DbResult<String> {
        let value = value.trim().to_lowercase();
        validate_present("code", &value)?;
        debug!(promotion_id = %promotion_id, code = %value, "Adding promotion code");

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO promotion_codes (id, promotion_id, value, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&id)
        .bind(promotion_id)
        .bind(&value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("code", &value),
            DbError::ForeignKeyViolation { .. } => DbError::not_found("Promotion", promotion_id),
            other => other,
        })?;

        Ok(id)
    }

    /// Id of the promotion code with this value.
    pub async fn find_promotion_code(&self, value: &str) -> DbResult<Option<String>> {
        let id = sqlx::query_scalar("SELECT id FROM promotion_codes WHERE value = ?1")
            .bind(value.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn get_promotion(&self, id: &str) -> DbResult<Option<Promotion>> {
        let mut conn = self.pool.acquire().await?;
        promotion_in(&mut conn, id).await
    }

    pub async fn create_promotion_action(
        &self,
        promotion_id: &str,
        calculator: Calculator,
    ) -> DbResult<PromotionAction> {
        debug!(promotion_id = %promotion_id, calculator = calculator.as_str(), "Creating promotion action");

        let mut conn = self.pool.acquire().await?;
        let promotion = promotion_in(&mut conn, promotion_id)
            .await?
            .ok_or_else(|| DbError::not_found("Promotion", promotion_id))?;

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO promotion_actions (id, promotion_id, calculator_type, calculator_value, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&id)
        .bind(promotion_id)
        .bind(calculator.as_str())
        .bind(calculator.value())
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(PromotionAction {
            id,
            promotion,
            calculator,
        })
    }

    pub async fn get_promotion_action(&self, id: &str) -> DbResult<Option<PromotionAction>> {
        let mut conn = self.pool.acquire().await?;
        promotion_action_in(&mut conn, id).await
    }

    // =========================================================================
    // Unit Cancels
    // =========================================================================

    pub async fn create_unit_cancel(
        &self,
        line_item_id: Option<&str>,
        reason: &str,
    ) -> DbResult<UnitCancel> {
        let reason = reason.trim();
        validate_present("reason", reason)?;

        let cancel = UnitCancel {
            id: Uuid::new_v4().to_string(),
            reason: reason.to_string(),
        };

        sqlx::query(
            r#"
            INSERT INTO unit_cancels (id, line_item_id, reason, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&cancel.id)
        .bind(line_item_id)
        .bind(&cancel.reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(cancel)
    }

    /// Loads every resolvable source among `refs`.
    pub async fn catalog_for(&self, refs: &[SourceRef]) -> DbResult<InMemoryCatalog> {
        let mut conn = self.pool.acquire().await?;
        catalog_in(&mut conn, refs).await
    }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct TaxRateRow {
    id: String,
    name: String,
    rate_bps: u32,
    included_in_price: bool,
}

impl From<TaxRateRow> for TaxRateSource {
    fn from(row: TaxRateRow) -> Self {
        TaxRateSource {
            id: row.id,
            name: row.name,
            rate: TaxRate::from_bps(row.rate_bps),
            included_in_price: row.included_in_price,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PromotionRow {
    id: String,
    name: String,
    starts_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct PromotionActionRow {
    id: String,
    promotion_id: String,
    calculator_type: String,
    calculator_value: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct UnitCancelRow {
    id: String,
    reason: String,
}

// =============================================================================
// Connection-level helpers
// =============================================================================

async fn tax_rate_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<TaxRateSource>> {
    let row = sqlx::query_as::<_, TaxRateRow>(
        "SELECT id, name, rate_bps, included_in_price FROM tax_rates WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(TaxRateSource::from))
}

async fn promotion_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Promotion>> {
    let Some(row) = sqlx::query_as::<_, PromotionRow>(
        "SELECT id, name, starts_at, expires_at FROM promotions WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let code_ids: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM promotion_codes WHERE promotion_id = ?1 ORDER BY created_at, id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(Promotion {
        id: row.id,
        name: row.name,
        starts_at: row.starts_at,
        expires_at: row.expires_at,
        code_ids,
    }))
}

async fn promotion_action_in(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<PromotionAction>> {
    let Some(row) = sqlx::query_as::<_, PromotionActionRow>(
        "SELECT id, promotion_id, calculator_type, calculator_value FROM promotion_actions WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let calculator = Calculator::from_parts(&row.calculator_type, row.calculator_value)
        .ok_or_else(|| {
            DbError::Internal(format!(
                "promotion action {} has unknown calculator '{}'",
                row.id, row.calculator_type
            ))
        })?;
    let promotion = promotion_in(conn, &row.promotion_id)
        .await?
        .ok_or_else(|| DbError::not_found("Promotion", &row.promotion_id))?;

    Ok(Some(PromotionAction {
        id: row.id,
        promotion,
        calculator,
    }))
}

async fn unit_cancel_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<UnitCancel>> {
    let row = sqlx::query_as::<_, UnitCancelRow>("SELECT id, reason FROM unit_cancels WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| UnitCancel {
        id: r.id,
        reason: r.reason,
    }))
}

/// Whether the promotion behind `action_id` has codes.
pub(crate) async fn promotion_requires_code_in(
    conn: &mut SqliteConnection,
    action_id: &str,
) -> DbResult<bool> {
    let codes: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM promotion_codes pc
        INNER JOIN promotion_actions pa ON pa.promotion_id = pc.promotion_id
        WHERE pa.id = ?1
        "#,
    )
    .bind(action_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(codes > 0)
}

/// Loads the distinct sources behind `refs`; unknown kinds and dangling ids
/// are skipped, which leaves their adjustments untouched by recalculation.
pub(crate) async fn catalog_in<'a>(
    conn: &mut SqliteConnection,
    refs: impl IntoIterator<Item = &'a SourceRef>,
) -> DbResult<InMemoryCatalog> {
    let mut catalog = InMemoryCatalog::new();
    let mut seen = HashSet::new();

    for source in refs {
        let Some(id) = source.id.as_deref() else {
            continue;
        };
        if !seen.insert((source.kind.clone(), id.to_string())) {
            continue;
        }

        match source.kind {
            SourceKind::TaxRate => {
                if let Some(rate) = tax_rate_in(conn, id).await? {
                    catalog.insert_tax_rate(rate);
                }
            }
            SourceKind::PromotionAction => {
                if let Some(action) = promotion_action_in(conn, id).await? {
                    catalog.insert_promotion_action(action);
                }
            }
            SourceKind::UnitCancel => {
                if let Some(cancel) = unit_cancel_in(conn, id).await? {
                    catalog.insert_unit_cancel(cancel);
                }
            }
            SourceKind::Other(_) => {}
        }
    }

    debug!(sources = catalog.len(), "Source catalog loaded");
    Ok(catalog)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig, DbError};
    use storefront_core::source::Calculator;
    use storefront_core::{Money, SourceCatalog, SourceKind, SourceRef, TaxRate};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_promotion_round_trip_with_codes() {
        let db = db().await;
        let sources = db.sources();

        let promotion = sources.create_promotion("Spring Sale", None, None).await.unwrap();
        let code_id = sources
            .add_promotion_code(&promotion.id, " SPRING10 ")
            .await
            .unwrap();
        let action = sources
            .create_promotion_action(&promotion.id, Calculator::Percent(1000))
            .await
            .unwrap();

        assert_eq!(
            sources.find_promotion_code("spring10").await.unwrap(),
            Some(code_id.clone())
        );

        let loaded = sources.get_promotion_action(&action.id).await.unwrap().unwrap();
        assert_eq!(loaded.calculator, Calculator::Percent(1000));
        assert_eq!(loaded.promotion.code_ids, vec![code_id]);
        assert!(loaded.promotion.requires_code());
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let db = db().await;
        let sources = db.sources();
        let promotion = sources.create_promotion("Promo", None, None).await.unwrap();
        sources.add_promotion_code(&promotion.id, "save").await.unwrap();

        let again = sources.add_promotion_code(&promotion.id, "SAVE").await;
        assert!(matches!(again, Err(DbError::UniqueViolation { .. })));
    }

    #[tokio::test]
    async fn test_catalog_skips_unknown_sources() {
        let db = db().await;
        let sources = db.sources();
        let rate = sources
            .create_tax_rate("VAT", TaxRate::from_bps(2000), true)
            .await
            .unwrap();
        let promotion = sources.create_promotion("Promo", None, None).await.unwrap();
        let action = sources
            .create_promotion_action(&promotion.id, Calculator::FlatRate(Money::from_cents(500)))
            .await
            .unwrap();

        let refs = vec![
            SourceRef::new(SourceKind::TaxRate, &rate.id),
            SourceRef::new(SourceKind::TaxRate, &rate.id),
            SourceRef::new(SourceKind::PromotionAction, &action.id),
            SourceRef::new(SourceKind::Other("return_authorization".into()), "ra-1"),
            SourceRef::new(SourceKind::UnitCancel, "missing"),
        ];
        let catalog = sources.catalog_for(&refs).await.unwrap();

        assert_eq!(catalog.len(), 2);
        assert!(catalog.resolve(&refs[0]).is_some());
        assert!(catalog.resolve(&refs[3]).is_none());
        assert!(catalog.resolve(&refs[0]).unwrap().included());
    }
}
