//! # Taxon Repository
//!
//! Nested set persistence for taxon trees.
//!
//! ## Structural Changes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create / move / destroy / rebuild                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │  load (id, parent_id, lft, rgt, depth) for the taxonomy                 │
//! │  TaxonTree::from_nodes → mutate → renumber                              │
//! │  write only the rows whose bounds, depth or parent changed              │
//! │  touch the taxon's ancestors and its taxonomy                           │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Permalinks are derived once, at creation. Renaming or moving a taxon
//! leaves its permalink alone.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use super::product;
use crate::error::{DbError, DbResult};
use storefront_core::nested_set::{self, TaxonTree, TreeNode};
use storefront_core::taxon::{self, to_url, ProductFilter, BRAND_PROPERTY};
use storefront_core::validation::{validate_name, validate_permalink};
use storefront_core::{NewTaxon, Taxon, TaxonChanges, ValidationError};

pub(crate) const TAXON_COLUMNS: &str = "id, taxonomy_id, parent_id, lft, rgt, depth, name, \
     permalink, description, meta_title, meta_description, meta_keywords, created_at, updated_at";

/// Repository for taxon tree operations.
#[derive(Debug, Clone)]
pub struct TaxonRepository {
    pool: SqlitePool,
}

impl TaxonRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TaxonRepository { pool }
    }

    /// Creates a taxon as the last child of `parent_id`.
    ///
    /// The permalink is `parent.permalink/segment`; a permalink already used
    /// in the taxonomy is a validation error.
    pub async fn create(&self, parent_id: &str, new: NewTaxon) -> DbResult<Taxon> {
        new.validate()?;

        let mut tx = self.pool.begin().await?;
        let parent = fetch_in(&mut tx, parent_id).await?;
        let permalink = new.permalink_under(Some(&parent.permalink))?;
        ensure_permalink_free_in(&mut tx, &parent.taxonomy_id, &permalink).await?;

        debug!(parent_id = %parent_id, permalink = %permalink, "Creating taxon");

        let stored = nodes_in(&mut tx, &parent.taxonomy_id).await?;
        let mut tree = TaxonTree::from_nodes(stored.clone())?;
        let id = Uuid::new_v4().to_string();
        tree.add_child(parent_id, id.clone())?;

        let changes = tree.changes_from(&stored);
        let placed = changes
            .iter()
            .find(|node| node.id == id)
            .cloned()
            .ok_or_else(|| DbError::Internal(format!("taxon {} was not numbered", id)))?;
        write_bounds_in(&mut tx, changes.iter().filter(|node| node.id != id)).await?;

        let now = Utc::now();
        let taxon = Taxon {
            id,
            taxonomy_id: parent.taxonomy_id.clone(),
            parent_id: Some(parent.id.clone()),
            lft: placed.lft,
            rgt: placed.rgt,
            depth: placed.depth,
            name: new.name.trim().to_string(),
            permalink,
            description: new.description,
            meta_title: new.meta_title,
            meta_description: new.meta_description,
            meta_keywords: new.meta_keywords,
            created_at: now,
            updated_at: now,
        };
        insert_in(&mut tx, &taxon).await?;
        touch_ancestors_and_taxonomy_in(&mut tx, &taxon, now).await?;

        tx.commit().await?;
        Ok(taxon)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Taxon>> {
        let taxon = sqlx::query_as::<_, Taxon>(&format!(
            "SELECT {} FROM taxons WHERE id = ?1",
            TAXON_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(taxon)
    }

    /// Every taxon of a taxonomy in tree (pre-)order.
    pub async fn list(&self, taxonomy_id: &str) -> DbResult<Vec<Taxon>> {
        let taxons = sqlx::query_as::<_, Taxon>(&format!(
            "SELECT {} FROM taxons WHERE taxonomy_id = ?1 ORDER BY lft",
            TAXON_COLUMNS
        ))
        .bind(taxonomy_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(taxons)
    }

    /// Updates name, description and meta fields; touches ancestors.
    pub async fn update(&self, id: &str, changes: TaxonChanges) -> DbResult<Taxon> {
        let mut tx = self.pool.begin().await?;
        let mut taxon = fetch_in(&mut tx, id).await?;
        let now = Utc::now();
        changes.apply(&mut taxon, now)?;

        debug!(id = %id, name = %taxon.name, "Updating taxon");

        sqlx::query(
            r#"
            UPDATE taxons SET
                name = ?2,
                description = ?3,
                meta_title = ?4,
                meta_description = ?5,
                meta_keywords = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(&taxon.id)
        .bind(&taxon.name)
        .bind(&taxon.description)
        .bind(&taxon.meta_title)
        .bind(&taxon.meta_description)
        .bind(&taxon.meta_keywords)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        touch_ancestors_and_taxonomy_in(&mut tx, &taxon, now).await?;
        tx.commit().await?;
        Ok(taxon)
    }

    /// Bumps `updated_at` on the taxon, its ancestors and its taxonomy.
    pub async fn touch(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let taxon = fetch_in(&mut tx, id).await?;
        touch_in(&mut tx, &taxon, Utc::now()).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Re-inserts `id` as the `index`-th (0-based) child of `parent_id`.
    ///
    /// The index counts siblings after the taxon left its old position;
    /// indexes past the end append.
    pub async fn move_to_child_with_index(
        &self,
        id: &str,
        parent_id: &str,
        index: usize,
    ) -> DbResult<Taxon> {
        let mut tx = self.pool.begin().await?;
        let taxon = fetch_in(&mut tx, id).await?;
        let parent = fetch_in(&mut tx, parent_id).await?;
        if taxon.taxonomy_id != parent.taxonomy_id {
            return Err(DbError::Domain(storefront_core::CoreError::InvalidMove {
                id: id.to_string(),
                reason: "target parent belongs to another taxonomy".to_string(),
            }));
        }

        debug!(id = %id, parent_id = %parent_id, index, "Moving taxon");

        let stored = nodes_in(&mut tx, &taxon.taxonomy_id).await?;
        let mut tree = TaxonTree::from_nodes(stored.clone())?;
        tree.move_to_child_with_index(id, parent_id, index)?;
        write_bounds_in(&mut tx, tree.changes_from(&stored).iter()).await?;

        let now = Utc::now();
        let moved = fetch_in(&mut tx, id).await?;
        touch_in(&mut tx, &moved, now).await?;
        let moved = fetch_in(&mut tx, id).await?;

        tx.commit().await?;
        Ok(moved)
    }

    /// Repositions a taxon among its current siblings.
    pub async fn set_child_index(&self, id: &str, index: usize) -> DbResult<Taxon> {
        let taxon = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Taxon", id))?;
        let parent_id = taxon.parent_id.ok_or_else(|| {
            DbError::Domain(storefront_core::CoreError::InvalidMove {
                id: id.to_string(),
                reason: "a root taxon has no siblings".to_string(),
            })
        })?;
        self.move_to_child_with_index(id, &parent_id, index).await
    }

    /// Deletes the taxon, its descendants and their classifications.
    ///
    /// Returns the deleted ids, the taxon first.
    pub async fn destroy(&self, id: &str) -> DbResult<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let taxon = fetch_in(&mut tx, id).await?;

        let stored = nodes_in(&mut tx, &taxon.taxonomy_id).await?;
        let mut tree = TaxonTree::from_nodes(stored.clone())?;
        let removed = tree.remove(id)?;

        for taxon_id in &removed {
            sqlx::query("DELETE FROM classifications WHERE taxon_id = ?1")
                .bind(taxon_id)
                .execute(&mut *tx)
                .await?;
        }
        // Children first, so the parent_id foreign key never dangles.
        for taxon_id in removed.iter().rev() {
            sqlx::query("DELETE FROM taxons WHERE id = ?1")
                .bind(taxon_id)
                .execute(&mut *tx)
                .await?;
        }

        let remaining: Vec<TreeNode> = stored
            .into_iter()
            .filter(|node| !removed.contains(&node.id))
            .collect();
        write_bounds_in(&mut tx, tree.changes_from(&remaining).iter()).await?;

        let now = Utc::now();
        if let Some(parent_id) = taxon.parent_id.as_deref() {
            let parent = fetch_in(&mut tx, parent_id).await?;
            touch_in(&mut tx, &parent, now).await?;
        } else {
            touch_taxonomy_in(&mut tx, &taxon.taxonomy_id, now).await?;
        }

        tx.commit().await?;
        info!(id = %id, removed = removed.len(), "Taxon destroyed");
        Ok(removed)
    }

    /// Ancestors from the root down to the direct parent.
    pub async fn ancestors(&self, id: &str) -> DbResult<Vec<Taxon>> {
        let mut conn = self.pool.acquire().await?;
        let taxon = fetch_in(&mut conn, id).await?;
        ancestors_in(&mut conn, &taxon).await
    }

    /// Direct children in sibling order.
    pub async fn children(&self, id: &str) -> DbResult<Vec<Taxon>> {
        let taxons = sqlx::query_as::<_, Taxon>(&format!(
            "SELECT {} FROM taxons WHERE parent_id = ?1 ORDER BY lft",
            TAXON_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(taxons)
    }

    /// All descendants in tree order.
    pub async fn descendants(&self, id: &str) -> DbResult<Vec<Taxon>> {
        let mut conn = self.pool.acquire().await?;
        let taxon = fetch_in(&mut conn, id).await?;
        let taxons = sqlx::query_as::<_, Taxon>(&format!(
            "SELECT {} FROM taxons WHERE taxonomy_id = ?1 AND lft > ?2 AND rgt < ?3 ORDER BY lft",
            TAXON_COLUMNS
        ))
        .bind(&taxon.taxonomy_id)
        .bind(taxon.lft)
        .bind(taxon.rgt)
        .fetch_all(&mut *conn)
        .await?;
        Ok(taxons)
    }

    /// The root of the taxon's tree (the taxon itself for roots).
    pub async fn root_of(&self, id: &str) -> DbResult<Taxon> {
        let mut conn = self.pool.acquire().await?;
        let taxon = fetch_in(&mut conn, id).await?;
        if taxon.is_root() {
            return Ok(taxon);
        }
        let ancestors = ancestors_in(&mut conn, &taxon).await?;
        ancestors
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Domain(storefront_core::CoreError::CorruptTree(format!(
                "taxon {} has a parent but no ancestors",
                id
            ))))
    }

    /// Looks a taxon up by permalink across taxonomies (first taxonomy by
    /// position wins).
    pub async fn find_by_permalink(&self, permalink: &str) -> DbResult<Option<Taxon>> {
        let taxon = sqlx::query_as::<_, Taxon>(&format!(
            r#"
            SELECT {} FROM taxons
            WHERE permalink = ?1
            ORDER BY (SELECT position FROM taxonomies WHERE taxonomies.id = taxons.taxonomy_id), created_at
            LIMIT 1
            "#,
            prefixed_columns("taxons")
        ))
        .bind(permalink.trim_matches('/'))
        .fetch_optional(&self.pool)
        .await?;
        Ok(taxon)
    }

    pub async fn find_in_taxonomy(
        &self,
        taxonomy_id: &str,
        permalink: &str,
    ) -> DbResult<Option<Taxon>> {
        let taxon = sqlx::query_as::<_, Taxon>(&format!(
            "SELECT {} FROM taxons WHERE taxonomy_id = ?1 AND permalink = ?2",
            TAXON_COLUMNS
        ))
        .bind(taxonomy_id)
        .bind(permalink.trim_matches('/'))
        .fetch_optional(&self.pool)
        .await?;
        Ok(taxon)
    }

    /// `"Categories -> Bags -> Totes"`.
    pub async fn pretty_name(&self, id: &str) -> DbResult<String> {
        let mut conn = self.pool.acquire().await?;
        let taxon = fetch_in(&mut conn, id).await?;
        let ancestors = ancestors_in(&mut conn, &taxon).await?;
        Ok(taxon.pretty_name(&ancestors))
    }

    /// `meta_title`, or `"Root - Name"` (roots use their own name).
    pub async fn seo_title(&self, id: &str) -> DbResult<String> {
        let taxon = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Taxon", id))?;
        let root = self.root_of(id).await?;
        Ok(taxon.seo_title(&root.name))
    }

    /// Filters offered when browsing the taxon. The brand filter appears
    /// once a "brand" property exists.
    pub async fn applicable_filters(&self, id: &str) -> DbResult<Vec<ProductFilter>> {
        let mut conn = self.pool.acquire().await?;
        fetch_in(&mut conn, id).await?;
        let brands = product::property_values_in(&mut conn, BRAND_PROPERTY).await?;
        Ok(taxon::applicable_filters(brands))
    }

    /// Recomputes bounds and depths from parent pointers.
    ///
    /// Returns how many rows were rewritten.
    pub async fn rebuild(&self, taxonomy_id: &str) -> DbResult<usize> {
        let mut tx = self.pool.begin().await?;
        let stored = nodes_in(&mut tx, taxonomy_id).await?;
        let tree = TaxonTree::from_nodes(stored.clone())?;
        let changes = tree.changes_from(&stored);
        write_bounds_in(&mut tx, changes.iter()).await?;
        tx.commit().await?;

        info!(taxonomy_id = %taxonomy_id, rewritten = changes.len(), "Taxonomy rebuilt");
        Ok(changes.len())
    }

    /// Whether stored bounds agree with parent pointers.
    pub async fn is_valid(&self, taxonomy_id: &str) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        let stored = nodes_in(&mut conn, taxonomy_id).await?;
        Ok(nested_set::is_valid(&stored))
    }
}

// =============================================================================
// Connection-level helpers (shared with the taxonomy and product repositories)
// =============================================================================

fn prefixed_columns(table: &str) -> String {
    TAXON_COLUMNS
        .split(", ")
        .map(|column| format!("{}.{}", table, column.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) async fn fetch_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Taxon> {
    sqlx::query_as::<_, Taxon>(&format!(
        "SELECT {} FROM taxons WHERE id = ?1",
        TAXON_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("Taxon", id))
}

async fn ancestors_in(conn: &mut SqliteConnection, taxon: &Taxon) -> DbResult<Vec<Taxon>> {
    let taxons = sqlx::query_as::<_, Taxon>(&format!(
        "SELECT {} FROM taxons WHERE taxonomy_id = ?1 AND lft < ?2 AND rgt > ?3 ORDER BY lft",
        TAXON_COLUMNS
    ))
    .bind(&taxon.taxonomy_id)
    .bind(taxon.lft)
    .bind(taxon.rgt)
    .fetch_all(&mut *conn)
    .await?;
    Ok(taxons)
}

async fn nodes_in(conn: &mut SqliteConnection, taxonomy_id: &str) -> DbResult<Vec<TreeNode>> {
    let nodes = sqlx::query_as::<_, TreeNode>(
        "SELECT id, parent_id, lft, rgt, depth FROM taxons WHERE taxonomy_id = ?1 ORDER BY lft",
    )
    .bind(taxonomy_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(nodes)
}

async fn ensure_permalink_free_in(
    conn: &mut SqliteConnection,
    taxonomy_id: &str,
    permalink: &str,
) -> DbResult<()> {
    let taken: Option<String> =
        sqlx::query_scalar("SELECT id FROM taxons WHERE taxonomy_id = ?1 AND permalink = ?2")
            .bind(taxonomy_id)
            .bind(permalink)
            .fetch_optional(&mut *conn)
            .await?;
    if taken.is_some() {
        return Err(ValidationError::Duplicate {
            field: "permalink".to_string(),
            value: permalink.to_string(),
        }
        .into());
    }
    Ok(())
}

async fn write_bounds_in<'a>(
    conn: &mut SqliteConnection,
    nodes: impl Iterator<Item = &'a TreeNode>,
) -> DbResult<()> {
    let mut written = 0usize;
    for node in nodes {
        sqlx::query("UPDATE taxons SET parent_id = ?2, lft = ?3, rgt = ?4, depth = ?5 WHERE id = ?1")
            .bind(&node.id)
            .bind(&node.parent_id)
            .bind(node.lft)
            .bind(node.rgt)
            .bind(node.depth)
            .execute(&mut *conn)
            .await?;
        written += 1;
    }
    if written > 0 {
        debug!(written, "Nested set bounds written");
    }
    Ok(())
}

async fn insert_in(conn: &mut SqliteConnection, taxon: &Taxon) -> DbResult<()> {
    sqlx::query(&format!(
        "INSERT INTO taxons ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        TAXON_COLUMNS
    ))
    .bind(&taxon.id)
    .bind(&taxon.taxonomy_id)
    .bind(&taxon.parent_id)
    .bind(taxon.lft)
    .bind(taxon.rgt)
    .bind(taxon.depth)
    .bind(&taxon.name)
    .bind(&taxon.permalink)
    .bind(&taxon.description)
    .bind(&taxon.meta_title)
    .bind(&taxon.meta_description)
    .bind(&taxon.meta_keywords)
    .bind(taxon.created_at)
    .bind(taxon.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { .. } => ValidationError::Duplicate {
            field: "permalink".to_string(),
            value: taxon.permalink.clone(),
        }
        .into(),
        other => other,
    })?;
    Ok(())
}

/// Inserts the root taxon of a new taxonomy.
pub(crate) async fn insert_root_in(
    conn: &mut SqliteConnection,
    taxonomy_id: &str,
    name: &str,
    now: DateTime<Utc>,
) -> DbResult<Taxon> {
    validate_name(name)?;
    let permalink = to_url(name);
    validate_permalink(&permalink)?;
    let taxon = Taxon {
        id: Uuid::new_v4().to_string(),
        taxonomy_id: taxonomy_id.to_string(),
        parent_id: None,
        lft: 1,
        rgt: 2,
        depth: 0,
        name: name.to_string(),
        permalink,
        description: None,
        meta_title: None,
        meta_description: None,
        meta_keywords: None,
        created_at: now,
        updated_at: now,
    };
    insert_in(conn, &taxon).await?;
    Ok(taxon)
}

/// Root taxon of a taxonomy.
pub(crate) async fn root_in(conn: &mut SqliteConnection, taxonomy_id: &str) -> DbResult<Taxon> {
    sqlx::query_as::<_, Taxon>(&format!(
        "SELECT {} FROM taxons WHERE taxonomy_id = ?1 AND parent_id IS NULL ORDER BY lft LIMIT 1",
        TAXON_COLUMNS
    ))
    .bind(taxonomy_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("Root taxon", taxonomy_id))
}

pub(crate) async fn touch_taxonomy_in(
    conn: &mut SqliteConnection,
    taxonomy_id: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query("UPDATE taxonomies SET updated_at = ?2 WHERE id = ?1")
        .bind(taxonomy_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Touches every ancestor (one statement) and the taxonomy.
async fn touch_ancestors_and_taxonomy_in(
    conn: &mut SqliteConnection,
    taxon: &Taxon,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        "UPDATE taxons SET updated_at = ?4 WHERE taxonomy_id = ?1 AND lft < ?2 AND rgt > ?3",
    )
    .bind(&taxon.taxonomy_id)
    .bind(taxon.lft)
    .bind(taxon.rgt)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    touch_taxonomy_in(conn, &taxon.taxonomy_id, now).await
}

/// Touches the taxon itself, then its ancestors and taxonomy.
pub(crate) async fn touch_in(
    conn: &mut SqliteConnection,
    taxon: &Taxon,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query("UPDATE taxons SET updated_at = ?2 WHERE id = ?1")
        .bind(&taxon.id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    touch_ancestors_and_taxonomy_in(conn, taxon, now).await
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig, DbError};
    use storefront_core::{NewTaxon, TaxonChanges, ValidationError};

    async fn setup() -> (Database, String, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let taxonomy = db.taxonomies().create("Categories").await.unwrap();
        let root = db.taxonomies().root(&taxonomy.id).await.unwrap();
        (db, taxonomy.id, root.id)
    }

    #[tokio::test]
    async fn test_create_derives_permalink_and_bounds() {
        let (db, _, root_id) = setup().await;
        let taxons = db.taxons();

        let bags = taxons.create(&root_id, NewTaxon::named("Bags")).await.unwrap();
        assert_eq!(bags.permalink, "categories/bags");
        assert_eq!((bags.lft, bags.rgt, bags.depth), (2, 3, 1));

        let mut explicit = NewTaxon::named("Tote Bags");
        explicit.permalink = Some("whatever/totes".to_string());
        let totes = taxons.create(&bags.id, explicit).await.unwrap();
        assert_eq!(totes.permalink, "categories/bags/totes");
        assert_eq!(totes.depth, 2);

        let root = taxons.get_by_id(&root_id).await.unwrap().unwrap();
        assert_eq!((root.lft, root.rgt), (1, 6));
    }

    #[tokio::test]
    async fn test_duplicate_permalink_rejected() {
        let (db, _, root_id) = setup().await;
        db.taxons().create(&root_id, NewTaxon::named("Mugs")).await.unwrap();

        let again = db.taxons().create(&root_id, NewTaxon::named("mugs")).await;
        assert!(matches!(
            again,
            Err(DbError::Validation(ValidationError::Duplicate { .. }))
        ));
    }

    #[tokio::test]
    async fn test_update_keeps_permalink() {
        let (db, _, root_id) = setup().await;
        let mugs = db.taxons().create(&root_id, NewTaxon::named("Mugs")).await.unwrap();

        let renamed = db
            .taxons()
            .update(
                &mugs.id,
                TaxonChanges {
                    name: Some("Coffee Mugs".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Coffee Mugs");
        assert_eq!(renamed.permalink, "categories/mugs");
    }

    #[tokio::test]
    async fn test_update_validates_meta_length() {
        let (db, _, root_id) = setup().await;
        let mugs = db.taxons().create(&root_id, NewTaxon::named("Mugs")).await.unwrap();

        let result = db
            .taxons()
            .update(
                &mugs.id,
                TaxonChanges {
                    meta_keywords: Some(Some("k".repeat(256))),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(DbError::Validation(_))));
    }

    #[tokio::test]
    async fn test_queries_and_names() {
        let (db, _, root_id) = setup().await;
        let taxons = db.taxons();
        let bags = taxons.create(&root_id, NewTaxon::named("Bags")).await.unwrap();
        let totes = taxons.create(&bags.id, NewTaxon::named("Totes")).await.unwrap();
        taxons.create(&root_id, NewTaxon::named("Mugs")).await.unwrap();

        assert_eq!(
            taxons.pretty_name(&totes.id).await.unwrap(),
            "Categories -> Bags -> Totes"
        );
        assert_eq!(taxons.seo_title(&totes.id).await.unwrap(), "Categories - Totes");
        assert_eq!(taxons.seo_title(&root_id).await.unwrap(), "Categories");

        let names = |list: Vec<storefront_core::Taxon>| {
            list.into_iter().map(|t| t.name).collect::<Vec<_>>()
        };
        assert_eq!(names(taxons.ancestors(&totes.id).await.unwrap()), ["Categories", "Bags"]);
        assert_eq!(names(taxons.children(&root_id).await.unwrap()), ["Bags", "Mugs"]);
        assert_eq!(
            names(taxons.descendants(&root_id).await.unwrap()),
            ["Bags", "Totes", "Mugs"]
        );

        let found = taxons
            .find_by_permalink("categories/bags/totes")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, totes.id);
    }

    #[tokio::test]
    async fn test_move_and_reorder() {
        let (db, taxonomy_id, root_id) = setup().await;
        let taxons = db.taxons();
        let bags = taxons.create(&root_id, NewTaxon::named("Bags")).await.unwrap();
        let mugs = taxons.create(&root_id, NewTaxon::named("Mugs")).await.unwrap();
        let pens = taxons.create(&root_id, NewTaxon::named("Pens")).await.unwrap();

        taxons.set_child_index(&pens.id, 0).await.unwrap();
        let order: Vec<String> = taxons
            .children(&root_id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(order, ["Pens", "Bags", "Mugs"]);

        let moved = taxons.move_to_child_with_index(&mugs.id, &bags.id, 0).await.unwrap();
        assert_eq!(moved.parent_id.as_deref(), Some(bags.id.as_str()));
        assert_eq!(moved.depth, 2);
        assert_eq!(moved.permalink, "categories/mugs");
        assert!(taxons.is_valid(&taxonomy_id).await.unwrap());

        let cycle = taxons.move_to_child_with_index(&bags.id, &mugs.id, 0).await;
        assert!(matches!(cycle, Err(DbError::Domain(_))));
    }

    #[tokio::test]
    async fn test_destroy_removes_subtree() {
        let (db, taxonomy_id, root_id) = setup().await;
        let taxons = db.taxons();
        let bags = taxons.create(&root_id, NewTaxon::named("Bags")).await.unwrap();
        let totes = taxons.create(&bags.id, NewTaxon::named("Totes")).await.unwrap();
        taxons.create(&root_id, NewTaxon::named("Mugs")).await.unwrap();

        let removed = taxons.destroy(&bags.id).await.unwrap();
        assert_eq!(removed, vec![bags.id.clone(), totes.id.clone()]);
        assert!(taxons.get_by_id(&totes.id).await.unwrap().is_none());

        let root = taxons.get_by_id(&root_id).await.unwrap().unwrap();
        assert_eq!((root.lft, root.rgt), (1, 4));
        assert!(taxons.is_valid(&taxonomy_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_rebuild_repairs_bounds() {
        let (db, taxonomy_id, root_id) = setup().await;
        let taxons = db.taxons();
        taxons.create(&root_id, NewTaxon::named("Bags")).await.unwrap();
        taxons.create(&root_id, NewTaxon::named("Mugs")).await.unwrap();

        sqlx::query("UPDATE taxons SET rgt = 99 WHERE id = ?1")
            .bind(&root_id)
            .execute(db.pool())
            .await
            .unwrap();
        assert!(!taxons.is_valid(&taxonomy_id).await.unwrap());

        assert_eq!(taxons.rebuild(&taxonomy_id).await.unwrap(), 1);
        assert!(taxons.is_valid(&taxonomy_id).await.unwrap());
        assert_eq!(taxons.rebuild(&taxonomy_id).await.unwrap(), 0);
    }
}
