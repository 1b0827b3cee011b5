//! # Taxonomy Repository
//!
//! A taxonomy owns exactly one root taxon, created with it and renamed with it.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use super::taxon::{self, TAXON_COLUMNS};
use crate::error::{DbError, DbResult};
use storefront_core::validation::validate_name;
use storefront_core::{Taxon, Taxonomy};

const TAXONOMY_COLUMNS: &str = "id, name, position, created_at, updated_at";

/// Repository for taxonomy operations.
#[derive(Debug, Clone)]
pub struct TaxonomyRepository {
    pool: SqlitePool,
}

impl TaxonomyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TaxonomyRepository { pool }
    }

    /// Creates a taxonomy at the end of the list, together with its root
    /// taxon (same name, permalink derived from the name).
    pub async fn create(&self, name: &str) -> DbResult<Taxonomy> {
        let name = name.trim();
        validate_name(name)?;

        let mut tx = self.pool.begin().await?;
        let position: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(position), -1) + 1 FROM taxonomies")
                .fetch_one(&mut *tx)
                .await?;

        let now = Utc::now();
        let taxonomy = Taxonomy {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            position,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(&format!(
            "INSERT INTO taxonomies ({}) VALUES (?1, ?2, ?3, ?4, ?5)",
            TAXONOMY_COLUMNS
        ))
        .bind(&taxonomy.id)
        .bind(&taxonomy.name)
        .bind(taxonomy.position)
        .bind(taxonomy.created_at)
        .bind(taxonomy.updated_at)
        .execute(&mut *tx)
        .await?;

        let root = taxon::insert_root_in(&mut tx, &taxonomy.id, name, now).await?;
        tx.commit().await?;

        info!(id = %taxonomy.id, name = %name, root_id = %root.id, "Taxonomy created");
        Ok(taxonomy)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Taxonomy>> {
        let taxonomy = sqlx::query_as::<_, Taxonomy>(&format!(
            "SELECT {} FROM taxonomies WHERE id = ?1",
            TAXONOMY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(taxonomy)
    }

    /// All taxonomies by position, then name.
    pub async fn list(&self) -> DbResult<Vec<Taxonomy>> {
        let taxonomies = sqlx::query_as::<_, Taxonomy>(&format!(
            "SELECT {} FROM taxonomies ORDER BY position, name",
            TAXONOMY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(taxonomies)
    }

    /// Renames the taxonomy and its root taxon. The root's permalink stays.
    pub async fn rename(&self, id: &str, name: &str) -> DbResult<Taxonomy> {
        let name = name.trim();
        validate_name(name)?;

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query("UPDATE taxonomies SET name = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(name)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Taxonomy", id));
        }

        let root = taxon::root_in(&mut tx, id).await?;
        sqlx::query("UPDATE taxons SET name = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(&root.id)
            .bind(name)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let taxonomy = sqlx::query_as::<_, Taxonomy>(&format!(
            "SELECT {} FROM taxonomies WHERE id = ?1",
            TAXONOMY_COLUMNS
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(id = %id, name = %name, "Taxonomy renamed");
        Ok(taxonomy)
    }

    /// The taxonomy's root taxon.
    pub async fn root(&self, taxonomy_id: &str) -> DbResult<Taxon> {
        let mut conn = self.pool.acquire().await?;
        taxon::root_in(&mut conn, taxonomy_id).await
    }

    pub async fn touch(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        taxon::touch_taxonomy_in(&mut conn, id, Utc::now()).await
    }

    /// Deletes the taxonomy with all its taxons and their classifications.
    pub async fn destroy(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM classifications WHERE taxon_id IN (SELECT id FROM taxons WHERE taxonomy_id = ?1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM taxons WHERE taxonomy_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM taxonomies WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Taxonomy", id));
        }

        tx.commit().await?;
        info!(id = %id, "Taxonomy destroyed");
        Ok(())
    }

    /// Every taxon in the taxonomy whose name matches `query`
    /// (case-insensitive substring), in tree order.
    pub async fn search_taxons(&self, taxonomy_id: &str, query: &str) -> DbResult<Vec<Taxon>> {
        let pattern = format!("%{}%", query.trim().to_lowercase());
        let taxons = sqlx::query_as::<_, Taxon>(&format!(
            "SELECT {} FROM taxons WHERE taxonomy_id = ?1 AND LOWER(name) LIKE ?2 ORDER BY lft",
            TAXON_COLUMNS
        ))
        .bind(taxonomy_id)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(taxons)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig, DbError};
    use storefront_core::NewTaxon;

    #[tokio::test]
    async fn test_create_makes_root() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let taxonomy = db.taxonomies().create("Brand Names").await.unwrap();
        assert_eq!(taxonomy.position, 0);

        let root = db.taxonomies().root(&taxonomy.id).await.unwrap();
        assert_eq!(root.name, "Brand Names");
        assert_eq!(root.permalink, "brand-names");
        assert_eq!((root.lft, root.rgt, root.depth), (1, 2, 0));
        assert!(root.parent_id.is_none());

        let second = db.taxonomies().create("Categories").await.unwrap();
        assert_eq!(second.position, 1);
        let names: Vec<String> = db
            .taxonomies()
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["Brand Names", "Categories"]);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let result = db.taxonomies().create("   ").await;
        assert!(matches!(result, Err(DbError::Validation(_))));
    }

    #[tokio::test]
    async fn test_rename_renames_root_only() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let taxonomy = db.taxonomies().create("Brand").await.unwrap();

        let renamed = db.taxonomies().rename(&taxonomy.id, "Brands").await.unwrap();
        assert_eq!(renamed.name, "Brands");

        let root = db.taxonomies().root(&taxonomy.id).await.unwrap();
        assert_eq!(root.name, "Brands");
        assert_eq!(root.permalink, "brand");

        let missing = db.taxonomies().rename("nope", "X").await;
        assert!(matches!(missing, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_destroy_removes_tree() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let taxonomy = db.taxonomies().create("Categories").await.unwrap();
        let root = db.taxonomies().root(&taxonomy.id).await.unwrap();
        let bags = db.taxons().create(&root.id, NewTaxon::named("Bags")).await.unwrap();
        db.taxons().create(&bags.id, NewTaxon::named("Totes")).await.unwrap();

        db.taxonomies().destroy(&taxonomy.id).await.unwrap();
        assert!(db.taxonomies().get_by_id(&taxonomy.id).await.unwrap().is_none());
        assert!(db.taxons().list(&taxonomy.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_taxons() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let taxonomy = db.taxonomies().create("Categories").await.unwrap();
        let root = db.taxonomies().root(&taxonomy.id).await.unwrap();
        db.taxons().create(&root.id, NewTaxon::named("Tote Bags")).await.unwrap();
        db.taxons().create(&root.id, NewTaxon::named("Mugs")).await.unwrap();

        let found = db.taxonomies().search_taxons(&taxonomy.id, "BAG").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Tote Bags");
    }
}
