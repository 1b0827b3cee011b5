//! # Product Repository
//!
//! Products and their classification under taxons.
//!
//! ## Classification Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  taxon "categories/bags"                                                │
//! │    position 0 → Canvas Tote                                             │
//! │    position 1 → Leather Tote   (inactive: hidden from active_products)  │
//! │    position 2 → Messenger Bag                                           │
//! │                                                                         │
//! │  classify()   appends at MAX(position) + 1 and touches the taxon        │
//! │  declassify() removes the link and touches the taxon                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Properties are named attributes with one value per product. The "brand"
//! property feeds the brand filter offered by taxons.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use super::taxon;
use crate::error::{DbError, DbResult};
use storefront_core::taxon::to_url;
use storefront_core::validation::{validate_name, validate_permalink};
use storefront_core::{Classification, Money, Product, ProductProperty, Property};

const PRODUCT_COLUMNS: &str = "id, name, slug, price_cents, is_active, created_at, updated_at";

/// Repository for product and classification operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Creates an active product. The slug defaults to the URL form of the
    /// name.
    pub async fn create(&self, name: &str, slug: Option<&str>, price: Money) -> DbResult<Product> {
        let name = name.trim();
        validate_name(name)?;
        let slug = slug
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| to_url(name));
        validate_permalink(&slug)?;

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            slug,
            price_cents: price.cents(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        debug!(slug = %product.slug, price = %price, "Creating product");

        sqlx::query(&format!(
            "INSERT INTO products ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            PRODUCT_COLUMNS
        ))
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.slug)
        .bind(product.price_cents)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("slug", &product.slug),
            other => other,
        })?;

        Ok(product)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE id = ?1",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    pub async fn get_by_slug(&self, slug: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE slug = ?1",
            PRODUCT_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    /// Activates or deactivates a product.
    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE products SET is_active = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        debug!(id = %id, active, "Product activation changed");
        Ok(())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Classifications
    // =========================================================================

    /// Places `product_id` last under `taxon_id`.
    pub async fn classify(&self, product_id: &str, taxon_id: &str) -> DbResult<Classification> {
        let mut tx = self.pool.begin().await?;
        let taxon = taxon::fetch_in(&mut tx, taxon_id).await?;

        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(DbError::not_found("Product", product_id));
        }

        let position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM classifications WHERE taxon_id = ?1",
        )
        .bind(taxon_id)
        .fetch_one(&mut *tx)
        .await?;

        let now = Utc::now();
        let classification = Classification {
            id: Uuid::new_v4().to_string(),
            taxon_id: taxon_id.to_string(),
            product_id: product_id.to_string(),
            position,
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO classifications (id, taxon_id, product_id, position, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&classification.id)
        .bind(&classification.taxon_id)
        .bind(&classification.product_id)
        .bind(classification.position)
        .bind(classification.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => {
                DbError::duplicate("classification", format!("{}/{}", taxon_id, product_id))
            }
            other => other,
        })?;

        taxon::touch_in(&mut tx, &taxon, now).await?;
        tx.commit().await?;

        info!(product_id = %product_id, taxon_id = %taxon_id, position, "Product classified");
        Ok(classification)
    }

    /// Removes the product from the taxon; returns whether a link existed.
    pub async fn declassify(&self, product_id: &str, taxon_id: &str) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        let taxon = taxon::fetch_in(&mut tx, taxon_id).await?;

        let result =
            sqlx::query("DELETE FROM classifications WHERE taxon_id = ?1 AND product_id = ?2")
                .bind(taxon_id)
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
        let removed = result.rows_affected() > 0;
        if removed {
            taxon::touch_in(&mut tx, &taxon, Utc::now()).await?;
        }

        tx.commit().await?;
        Ok(removed)
    }

    /// Classifications of a taxon in position order.
    pub async fn classifications(&self, taxon_id: &str) -> DbResult<Vec<Classification>> {
        let rows = sqlx::query_as::<_, Classification>(
            r#"
            SELECT id, taxon_id, product_id, position, created_at
            FROM classifications
            WHERE taxon_id = ?1
            ORDER BY position, created_at
            "#,
        )
        .bind(taxon_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Products classified directly under the taxon, in position order.
    pub async fn products_for_taxon(&self, taxon_id: &str) -> DbResult<Vec<Product>> {
        self.classified(taxon_id, false).await
    }

    /// Like [`Self::products_for_taxon`], skipping inactive products.
    pub async fn active_products(&self, taxon_id: &str) -> DbResult<Vec<Product>> {
        self.classified(taxon_id, true).await
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Sets the product's value for the property `name`, creating the
    /// property on first use.
    pub async fn set_property(
        &self,
        product_id: &str,
        name: &str,
        value: &str,
    ) -> DbResult<ProductProperty> {
        let name = name.trim();
        validate_name(name)?;
        let value = value.trim();

        let mut tx = self.pool.begin().await?;
        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(DbError::not_found("Product", product_id));
        }
        let now = Utc::now();
        let property = property_in(&mut tx, name, now).await?;

        let existing: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, created_at FROM product_properties WHERE product_id = ?1 AND property_id = ?2",
        )
        .bind(product_id)
        .bind(&property.id)
        .fetch_optional(&mut *tx)
        .await?;

        let product_property = match existing {
            Some((id, created_at)) => {
                sqlx::query("UPDATE product_properties SET value = ?2, updated_at = ?3 WHERE id = ?1")
                    .bind(&id)
                    .bind(value)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                ProductProperty {
                    id,
                    product_id: product_id.to_string(),
                    property_id: property.id,
                    value: value.to_string(),
                    created_at,
                    updated_at: now,
                }
            }
            None => {
                let product_property = ProductProperty {
                    id: Uuid::new_v4().to_string(),
                    product_id: product_id.to_string(),
                    property_id: property.id,
                    value: value.to_string(),
                    created_at: now,
                    updated_at: now,
                };
                sqlx::query(
                    r#"
                    INSERT INTO product_properties
                        (id, product_id, property_id, value, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(&product_property.id)
                .bind(&product_property.product_id)
                .bind(&product_property.property_id)
                .bind(&product_property.value)
                .bind(product_property.created_at)
                .bind(product_property.updated_at)
                .execute(&mut *tx)
                .await?;
                product_property
            }
        };
        tx.commit().await?;

        debug!(product_id = %product_id, property = %name, value = %value, "Product property set");
        Ok(product_property)
    }

    /// The product's value for the property `name`, if any.
    pub async fn property_value(&self, product_id: &str, name: &str) -> DbResult<Option<String>> {
        let value = sqlx::query_scalar(
            r#"
            SELECT pp.value FROM product_properties pp
            INNER JOIN properties p ON p.id = pp.property_id
            WHERE pp.product_id = ?1 AND p.name = ?2
            "#,
        )
        .bind(product_id)
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    /// Distinct values recorded for the property `name`, sorted. `None`
    /// when no such property exists.
    pub async fn property_values(&self, name: &str) -> DbResult<Option<Vec<String>>> {
        let mut conn = self.pool.acquire().await?;
        property_values_in(&mut conn, name).await
    }

    async fn classified(&self, taxon_id: &str, only_active: bool) -> DbResult<Vec<Product>> {
        let active_filter = if only_active { "AND p.is_active = 1" } else { "" };
        let products = sqlx::query_as::<_, Product>(&format!(
            r#"
            SELECT p.id, p.name, p.slug, p.price_cents, p.is_active, p.created_at, p.updated_at
            FROM products p
            INNER JOIN classifications c ON c.product_id = p.id
            WHERE c.taxon_id = ?1 {}
            ORDER BY c.position, c.created_at
            "#,
            active_filter
        ))
        .bind(taxon_id)
        .fetch_all(&self.pool)
        .await?;

        debug!(taxon_id = %taxon_id, only_active, count = products.len(), "Listed taxon products");
        Ok(products)
    }
}

pub(crate) async fn property_values_in(
    conn: &mut SqliteConnection,
    name: &str,
) -> DbResult<Option<Vec<String>>> {
    let property: Option<String> = sqlx::query_scalar("SELECT id FROM properties WHERE name = ?1")
        .bind(name.trim())
        .fetch_optional(&mut *conn)
        .await?;
    let Some(property_id) = property else {
        return Ok(None);
    };

    let values = sqlx::query_scalar(
        "SELECT DISTINCT value FROM product_properties WHERE property_id = ?1 ORDER BY value",
    )
    .bind(property_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(Some(values))
}

/// The property named `name`, inserted with `name` as its presentation when
/// missing.
async fn property_in(
    conn: &mut SqliteConnection,
    name: &str,
    now: DateTime<Utc>,
) -> DbResult<Property> {
    let existing = sqlx::query_as::<_, Property>(
        "SELECT id, name, presentation, created_at, updated_at FROM properties WHERE name = ?1",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(property) = existing {
        return Ok(property);
    }

    let property = Property {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        presentation: name.to_string(),
        created_at: now,
        updated_at: now,
    };
    sqlx::query(
        "INSERT INTO properties (id, name, presentation, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&property.id)
    .bind(&property.name)
    .bind(&property.presentation)
    .bind(property.created_at)
    .bind(property.updated_at)
    .execute(&mut *conn)
    .await?;

    info!(property = %name, "Property created");
    Ok(property)
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig, DbError};
    use storefront_core::taxon::FilterOptions;
    use storefront_core::{Money, NewTaxon};

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let taxonomy = db.taxonomies().create("Categories").await.unwrap();
        let root = db.taxonomies().root(&taxonomy.id).await.unwrap();
        let bags = db.taxons().create(&root.id, NewTaxon::named("Bags")).await.unwrap();
        (db, bags.id)
    }

    #[tokio::test]
    async fn test_create_defaults_slug() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let products = db.products();

        let tote = products
            .create("Canvas Tote", None, Money::from_cents(1999))
            .await
            .unwrap();
        assert_eq!(tote.slug, "canvas-tote");
        assert!(tote.is_active);
        assert_eq!(tote.price(), Money::from_cents(1999));

        let again = products.create("Canvas Tote", None, Money::zero()).await;
        assert!(matches!(again, Err(DbError::UniqueViolation { .. })));

        let found = products.get_by_slug("canvas-tote").await.unwrap().unwrap();
        assert_eq!(found.id, tote.id);
        assert_eq!(products.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_classify_appends_in_position_order() {
        let (db, bags_id) = setup().await;
        let products = db.products();
        let tote = products.create("Tote", None, Money::from_cents(1000)).await.unwrap();
        let duffel = products.create("Duffel", None, Money::from_cents(5000)).await.unwrap();

        let first = products.classify(&duffel.id, &bags_id).await.unwrap();
        let second = products.classify(&tote.id, &bags_id).await.unwrap();
        assert_eq!((first.position, second.position), (0, 1));

        let names: Vec<String> = products
            .products_for_taxon(&bags_id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["Duffel", "Tote"]);

        let twice = products.classify(&tote.id, &bags_id).await;
        assert!(matches!(twice, Err(DbError::UniqueViolation { .. })));
    }

    #[tokio::test]
    async fn test_active_products_hides_inactive() {
        let (db, bags_id) = setup().await;
        let products = db.products();
        let tote = products.create("Tote", None, Money::from_cents(1000)).await.unwrap();
        let duffel = products.create("Duffel", None, Money::from_cents(5000)).await.unwrap();
        products.classify(&tote.id, &bags_id).await.unwrap();
        products.classify(&duffel.id, &bags_id).await.unwrap();

        products.set_active(&duffel.id, false).await.unwrap();

        let active = products.active_products(&bags_id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, tote.id);
        assert_eq!(products.products_for_taxon(&bags_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_declassify_and_taxon_destroy() {
        let (db, bags_id) = setup().await;
        let products = db.products();
        let tote = products.create("Tote", None, Money::from_cents(1000)).await.unwrap();
        products.classify(&tote.id, &bags_id).await.unwrap();

        assert!(products.declassify(&tote.id, &bags_id).await.unwrap());
        assert!(!products.declassify(&tote.id, &bags_id).await.unwrap());

        products.classify(&tote.id, &bags_id).await.unwrap();
        db.taxons().destroy(&bags_id).await.unwrap();
        assert!(products.classifications(&bags_id).await.unwrap().is_empty());
        assert!(products.get_by_id(&tote.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_set_property_upserts_value() {
        let (db, _) = setup().await;
        let products = db.products();
        let tote = products.create("Tote", None, Money::from_cents(1000)).await.unwrap();

        assert_eq!(products.property_values("brand").await.unwrap(), None);

        let first = products.set_property(&tote.id, "brand", "Northwind").await.unwrap();
        let second = products.set_property(&tote.id, "brand", " Ridgeline ").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(
            products.property_value(&tote.id, "brand").await.unwrap().as_deref(),
            Some("Ridgeline")
        );
        assert_eq!(
            products.property_values("brand").await.unwrap(),
            Some(vec!["Ridgeline".to_string()])
        );

        let missing = products.set_property("missing", "brand", "Acme").await;
        assert!(matches!(missing, Err(DbError::NotFound { .. })));
        let blank = products.set_property(&tote.id, " ", "Acme").await;
        assert!(matches!(blank, Err(DbError::Validation(_))));
    }

    #[tokio::test]
    async fn test_brand_filter_follows_brand_property() {
        let (db, bags_id) = setup().await;
        let products = db.products();

        let filters = db.taxons().applicable_filters(&bags_id).await.unwrap();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].scope, "price_range_any");

        let tote = products.create("Tote", None, Money::from_cents(1000)).await.unwrap();
        let duffel = products.create("Duffel", None, Money::from_cents(5000)).await.unwrap();
        let mug = products.create("Mug", None, Money::from_cents(900)).await.unwrap();
        products.set_property(&tote.id, "brand", "Ridgeline").await.unwrap();
        products.set_property(&duffel.id, "brand", "Northwind").await.unwrap();
        products.set_property(&mug.id, "brand", "Ridgeline").await.unwrap();

        let filters = db.taxons().applicable_filters(&bags_id).await.unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(
            filters[1].options,
            FilterOptions::Values(vec!["Northwind".to_string(), "Ridgeline".to_string()])
        );

        let unknown = db.taxons().applicable_filters("missing").await;
        assert!(matches!(unknown, Err(DbError::NotFound { .. })));
    }
}
