//! # Seed Data Generator
//!
//! Populates the database with a demo catalog and one priced order.
//!
//! ## Usage
//! ```bash
//! # Use the configured database (storefront.toml / STOREFRONT_DB_PATH)
//! cargo run -p storefront-db --bin seed
//!
//! # Specify database path
//! cargo run -p storefront-db --bin seed -- --db ./data/storefront.db
//!
//! # More detail
//! RUST_LOG=storefront_db=debug cargo run -p storefront-db --bin seed
//! ```
//!
//! ## Generated Data
//! - Taxonomies "Categories" and "Brand" with nested taxons
//! - Products classified under the leaf taxons, with a "brand" property
//! - Order `R100000001` with two line items and a shipment, a 10% additional
//!   sales tax and a coded 15% promotion on the first line item

use std::env;
use std::path::PathBuf;

use storefront_core::source::Calculator;
use storefront_core::taxon::BRAND_PROPERTY;
use storefront_core::{
    AdjustableRef, Money, NewAdjustment, NewTaxon, SourceKind, SourceRef, TaxRate,
};
use storefront_db::{Database, DbResult, StorefrontConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// (taxonomy, [(taxon path from the root, [(product, price in cents)])])
type CatalogSeed = (&'static str, &'static [(&'static [&'static str], &'static [(&'static str, i64)])]);

const CATALOG: &[CatalogSeed] = &[
    (
        "Categories",
        &[
            (&["Bags", "Totes"], &[("Canvas Tote", 1999), ("Leather Tote", 8900)]),
            (&["Bags", "Messenger Bags"], &[("Courier Messenger", 5400)]),
            (&["Mugs"], &[("Enamel Camp Mug", 1400), ("Stoneware Mug", 1800)]),
            (&["Clothing", "Shirts"], &[("Oxford Shirt", 4500)]),
        ],
    ),
    (
        "Brand",
        &[(&["Northwind"], &[]), (&["Ridgeline"], &[])],
    ),
];

/// (product slug, brand)
const BRANDS: &[(&str, &str)] = &[
    ("canvas-tote", "Northwind"),
    ("leather-tote", "Ridgeline"),
    ("courier-messenger", "Ridgeline"),
    ("enamel-camp-mug", "Northwind"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Storefront Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>       Database file path (default: from config)");
                println!("  -c, --config <PATH>   Config file (default: platform config dir)");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            other => warn!(arg = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let mut config = StorefrontConfig::load_or_default(config_path);
    if let Some(path) = db_path {
        config.database.path = Some(path);
    }
    let db_config = config.db_config();
    if let Some(parent) = db_config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    info!(path = %db_config.database_path.display(), store = %config.store.name, "Seeding database");
    let db = Database::new(db_config).await?;

    if db.products().count().await? > 0 {
        warn!("Database already has products; delete the file to regenerate");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let classified = seed_catalog(&db).await?;
    seed_brands(&db).await?;
    seed_order(&db, &config).await?;

    info!(classified, elapsed = ?start.elapsed(), "Seed complete");
    db.close().await;
    Ok(())
}

/// Builds the taxonomies, taxons and products; returns how many
/// classifications were created.
async fn seed_catalog(db: &Database) -> DbResult<usize> {
    let mut classified = 0;

    for (taxonomy_name, branches) in CATALOG {
        let taxonomy = db.taxonomies().create(taxonomy_name).await?;
        let root = db.taxonomies().root(&taxonomy.id).await?;

        for (path, products) in branches.iter() {
            let mut parent = root.clone();
            for segment in path.iter() {
                let permalink = format!("{}/{}", parent.permalink, storefront_core::taxon::to_url(segment));
                parent = match db.taxons().find_in_taxonomy(&taxonomy.id, &permalink).await? {
                    Some(existing) => existing,
                    None => db.taxons().create(&parent.id, NewTaxon::named(*segment)).await?,
                };
            }

            for (name, cents) in products.iter() {
                let product = db.products().create(name, None, Money::from_cents(*cents)).await?;
                db.products().classify(&product.id, &parent.id).await?;
                classified += 1;
            }
        }

        for taxon in db.taxons().list(&taxonomy.id).await? {
            info!(taxon = %db.taxons().pretty_name(&taxon.id).await?, permalink = %taxon.permalink, "Taxon");
        }
    }

    Ok(classified)
}

/// Records each product's brand and logs the filters a category offers.
async fn seed_brands(db: &Database) -> DbResult<()> {
    for (slug, brand) in BRANDS {
        if let Some(product) = db.products().get_by_slug(slug).await? {
            db.products().set_property(&product.id, BRAND_PROPERTY, brand).await?;
        }
    }

    if let Some(bags) = db.taxons().find_by_permalink("categories/bags").await? {
        for filter in db.taxons().applicable_filters(&bags.id).await? {
            info!(taxon = %bags.name, filter = %filter.name, scope = %filter.scope, "Filter");
        }
    }
    Ok(())
}

async fn seed_order(db: &Database, config: &StorefrontConfig) -> DbResult<()> {
    let order = db.orders().create("R100000001", &config.currency()).await?;

    let tote = db.products().get_by_slug("canvas-tote").await?;
    let mug = db.products().get_by_slug("enamel-camp-mug").await?;

    let first = db
        .orders()
        .add_line_item(
            &order.id,
            tote.as_ref().map(|p| p.id.as_str()),
            tote.as_ref().map_or(Money::from_cents(1999), |p| p.price()),
            2,
        )
        .await?;
    let second = db
        .orders()
        .add_line_item(
            &order.id,
            mug.as_ref().map(|p| p.id.as_str()),
            mug.as_ref().map_or(Money::from_cents(1400), |p| p.price()),
            1,
        )
        .await?;
    db.orders().add_shipment(&order.id, Money::from_cents(500)).await?;

    let sales_tax = db
        .sources()
        .create_tax_rate("Sales Tax", TaxRate::from_bps(1000), false)
        .await?;
    let promotion = db.sources().create_promotion("Spring Sale", None, None).await?;
    let code_id = db.sources().add_promotion_code(&promotion.id, "SPRING15").await?;
    let action = db
        .sources()
        .create_promotion_action(&promotion.id, Calculator::Percent(1500))
        .await?;

    db.adjustments()
        .create(
            NewAdjustment::manual(
                &order.id,
                AdjustableRef::line_item(&first.id),
                Money::zero(),
                "Promotion (Spring Sale)",
            )
            .with_source(SourceRef::new(SourceKind::PromotionAction, &action.id))
            .with_promotion_code(&code_id),
        )
        .await?;

    for item in [&first, &second] {
        db.adjustments()
            .create(
                NewAdjustment::manual(
                    &order.id,
                    AdjustableRef::line_item(&item.id),
                    Money::zero(),
                    "Sales Tax 10%",
                )
                .with_source(SourceRef::new(SourceKind::TaxRate, &sales_tax.id)),
            )
            .await?;
    }

    let order = db.adjustments().recalculate_order(&order.id).await?;
    let currency = config.currency();
    for adjustment in db.adjustments().list(&order.id, &[]).await? {
        info!(
            label = %adjustment.label,
            amount = %adjustment.display_amount(&currency),
            eligible = adjustment.eligible,
            "Adjustment"
        );
    }
    info!(
        number = %order.number,
        items = %order.item_total().display(&currency),
        promo = %Money::from_cents(order.promo_total_cents).display(&currency),
        tax = %Money::from_cents(order.additional_tax_total_cents).display(&currency),
        total = %order.total().display(&currency),
        "Order priced"
    );
    Ok(())
}
