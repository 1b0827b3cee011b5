//! # Taxons
//!
//! A taxon is a node of a product category tree. Its tree position lives in
//! the nested set bounds (`lft`, `rgt`, `depth`), see [`crate::nested_set`].
//!
//! ## Permalinks
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Taxonomy "Categories"                                                  │
//! │                                                                         │
//! │  Categories             permalink: categories                           │
//! │  └── Bags & Totes       permalink: categories/bags-and-totes            │
//! │      └── Mugs           permalink: categories/bags-and-totes/mugs       │
//! │                                                                         │
//! │  A child's permalink is its parent's permalink plus one segment.        │
//! │  The permalink is fixed when the taxon is created.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::validation::{validate_meta_field, validate_name, validate_permalink, ValidationResult};

/// A node of the category tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Taxon {
    pub id: String,
    pub taxonomy_id: String,
    pub parent_id: Option<String>,
    pub lft: i64,
    pub rgt: i64,
    pub depth: i64,
    pub name: String,
    pub permalink: String,
    pub description: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Taxon {
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.rgt - self.lft == 1
    }

    /// Number of descendants encoded by the bounds.
    #[inline]
    pub fn descendant_count(&self) -> i64 {
        (self.rgt - self.lft - 1) / 2
    }

    /// True when `other` lies strictly inside this taxon's bounds.
    pub fn is_ancestor_of(&self, other: &Taxon) -> bool {
        self.taxonomy_id == other.taxonomy_id && self.lft < other.lft && other.rgt < self.rgt
    }

    /// Route parameter for this taxon.
    pub fn to_param(&self) -> &str {
        &self.permalink
    }

    /// `meta_title` when set, otherwise the name prefixed by the root's name
    /// (`"Categories - Mugs"`). Roots use their bare name.
    pub fn seo_title(&self, root_name: &str) -> String {
        match self.meta_title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ if self.is_root() => self.name.clone(),
            _ => format!("{} - {}", root_name, self.name),
        }
    }

    /// The ancestors' names followed by this taxon's name, joined by arrows.
    pub fn pretty_name<'a>(&self, ancestors: impl IntoIterator<Item = &'a Taxon>) -> String {
        let mut pretty = String::new();
        for ancestor in ancestors {
            pretty.push_str(&ancestor.name);
            pretty.push_str(" -> ");
        }
        pretty.push_str(&self.name);
        pretty
    }
}

// =============================================================================
// Permalinks
// =============================================================================

/// Converts a display name into a URL segment.
///
/// Non-Latin text is transliterated first. A name with nothing left to
/// slug falls back to the hex of its trimmed bytes.
///
/// ```rust
/// use storefront_core::taxon::to_url;
///
/// assert_eq!(to_url("Bags & Totes"), "bags-and-totes");
/// assert_eq!(to_url("  Men's  T-Shirts!  "), "mens-t-shirts");
/// assert_eq!(to_url("Crème Brûlée"), "creme-brulee");
/// assert_eq!(to_url("!!!"), "212121");
/// ```
pub fn to_url(name: &str) -> String {
    let expanded = name
        .replace('&', " and ")
        .replace('@', " at ")
        .replace(['\'', '’'], "");
    let ascii = deunicode::deunicode(&expanded).replace('\'', "");

    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;
    for c in ascii.chars().map(|c| c.to_ascii_lowercase()) {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        return name.trim().bytes().map(|b| format!("{:02x}", b)).collect();
    }
    slug
}

/// Derives a permalink at creation time.
///
/// - With a parent: `parent_permalink/segment`, where the segment is the
///   last segment of `requested` or, when blank, `to_url(name)`.
/// - Without a parent: `requested`, or `to_url(name)` when blank.
pub fn derive_permalink(
    name: &str,
    requested: Option<&str>,
    parent_permalink: Option<&str>,
) -> String {
    let requested = requested.map(str::trim).filter(|p| !p.is_empty());

    match parent_permalink {
        Some(parent) => {
            let segment = requested
                .and_then(|p| p.rsplit('/').find(|s| !s.is_empty()))
                .map(str::to_string)
                .unwrap_or_else(|| to_url(name));
            format!("{}/{}", parent, segment)
        }
        None => requested
            .map(str::to_string)
            .unwrap_or_else(|| to_url(name)),
    }
}

// =============================================================================
// New Taxon
// =============================================================================

/// Input for creating a taxon under a parent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTaxon {
    pub name: String,
    /// Explicit permalink; only its last segment is kept for child taxons.
    pub permalink: Option<String>,
    pub description: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
}

impl NewTaxon {
    pub fn named(name: impl Into<String>) -> Self {
        NewTaxon {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> ValidationResult<()> {
        validate_name(&self.name)?;
        validate_meta_fields(
            self.meta_title.as_deref(),
            self.meta_description.as_deref(),
            self.meta_keywords.as_deref(),
        )
    }

    /// The permalink this taxon gets under `parent_permalink`, validated.
    pub fn permalink_under(&self, parent_permalink: Option<&str>) -> ValidationResult<String> {
        let permalink =
            derive_permalink(&self.name, self.permalink.as_deref(), parent_permalink);
        validate_permalink(&permalink)?;
        Ok(permalink)
    }
}

/// Editable attributes of an existing taxon; the permalink is not among them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxonChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub meta_title: Option<Option<String>>,
    pub meta_description: Option<Option<String>>,
    pub meta_keywords: Option<Option<String>>,
}

impl TaxonChanges {
    /// Applies the changes to `taxon` after validating the result.
    pub fn apply(self, taxon: &mut Taxon, now: DateTime<Utc>) -> ValidationResult<()> {
        let mut updated = taxon.clone();
        if let Some(name) = self.name {
            updated.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            updated.description = description;
        }
        if let Some(meta_title) = self.meta_title {
            updated.meta_title = meta_title;
        }
        if let Some(meta_description) = self.meta_description {
            updated.meta_description = meta_description;
        }
        if let Some(meta_keywords) = self.meta_keywords {
            updated.meta_keywords = meta_keywords;
        }

        validate_name(&updated.name)?;
        validate_meta_fields(
            updated.meta_title.as_deref(),
            updated.meta_description.as_deref(),
            updated.meta_keywords.as_deref(),
        )?;

        updated.updated_at = now;
        *taxon = updated;
        Ok(())
    }
}

fn validate_meta_fields(
    title: Option<&str>,
    description: Option<&str>,
    keywords: Option<&str>,
) -> ValidationResult<()> {
    for (field, value) in [
        ("meta_title", title),
        ("meta_description", description),
        ("meta_keywords", keywords),
    ] {
        if let Some(value) = value {
            validate_meta_field(field, value)?;
        }
    }
    Ok(())
}

// =============================================================================
// Product Filters
// =============================================================================

/// Name of the product property backing the brand filter.
pub const BRAND_PROPERTY: &str = "brand";

/// A named product filter and the choices it offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    pub name: String,
    pub scope: String,
    pub options: FilterOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "choices", rename_all = "snake_case")]
pub enum FilterOptions {
    PriceRanges(Vec<PriceRange>),
    /// Distinct property values, sorted.
    Values(Vec<String>),
}

/// A half-open price band `[min, max)`; `None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub label: String,
    pub min: Option<Money>,
    pub max: Option<Money>,
}

impl PriceRange {
    pub fn contains(&self, price: Money) -> bool {
        self.min.map_or(true, |min| price >= min) && self.max.map_or(true, |max| price < max)
    }
}

impl ProductFilter {
    /// Price bands: under 10, 10-15, 15-18, 18-20, 20 and above.
    pub fn price_ranges() -> Self {
        let band = |label: &str, min: Option<i64>, max: Option<i64>| PriceRange {
            label: label.to_string(),
            min: min.map(Money::from_cents),
            max: max.map(Money::from_cents),
        };

        ProductFilter {
            name: "Price Range".to_string(),
            scope: "price_range_any".to_string(),
            options: FilterOptions::PriceRanges(vec![
                band("Under 10.00", None, Some(1000)),
                band("10.00 - 15.00", Some(1000), Some(1500)),
                band("15.00 - 18.00", Some(1500), Some(1800)),
                band("18.00 - 20.00", Some(1800), Some(2000)),
                band("20.00 or over", Some(2000), None),
            ]),
        }
    }

    /// One choice per distinct brand value; blank values are skipped.
    pub fn brands(values: impl IntoIterator<Item = String>) -> Self {
        let mut brands: Vec<String> = values
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        brands.sort();
        brands.dedup();

        ProductFilter {
            name: "Brands".to_string(),
            scope: "brand_any".to_string(),
            options: FilterOptions::Values(brands),
        }
    }

    /// Label of the first price range containing `price`.
    pub fn range_for(&self, price: Money) -> Option<&str> {
        match &self.options {
            FilterOptions::PriceRanges(ranges) => ranges
                .iter()
                .find(|r| r.contains(price))
                .map(|r| r.label.as_str()),
            FilterOptions::Values(_) => None,
        }
    }
}

/// Filters offered when browsing a taxon: always the price filter, plus
/// the brand filter when the store defines a brand property.
pub fn applicable_filters(brand_values: Option<Vec<String>>) -> Vec<ProductFilter> {
    let mut filters = vec![ProductFilter::price_ranges()];
    if let Some(values) = brand_values {
        filters.push(ProductFilter::brands(values));
    }
    filters
}


// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::tests_support::taxon;
    use super::*;

    #[test]
    fn test_to_url() {
        assert_eq!(to_url("Brands"), "brands");
        assert_eq!(to_url("Bags & Totes"), "bags-and-totes");
        assert_eq!(to_url("info@shop"), "info-at-shop");
        assert_eq!(to_url("Men's"), "mens");
        assert_eq!(to_url("--Mugs--"), "mugs");
        assert_eq!(to_url("snake_case name"), "snake_case-name");
        assert_eq!(to_url("!!!"), "212121");
    }

    #[test]
    fn test_to_url_transliterates() {
        assert_eq!(to_url("Crème Brûlée"), "creme-brulee");
        assert_eq!(to_url("Straße"), "strasse");
        assert_eq!(to_url("Ça va? L'été"), "ca-va-lete");

        let japanese = to_url("日本");
        assert!(!japanese.is_empty());
        assert!(japanese.chars().all(|c| c.is_ascii_lowercase() || c == '-'));
        assert!(crate::validation::validate_permalink(&japanese).is_ok());
    }

    #[test]
    fn test_root_permalink() {
        assert_eq!(derive_permalink("Northwind Co", None, None), "northwind-co");
        assert_eq!(derive_permalink("Northwind Co", Some(""), None), "northwind-co");
        assert_eq!(derive_permalink("Northwind Co", Some("nf"), None), "nf");
    }

    #[test]
    fn test_child_permalink() {
        assert_eq!(
            derive_permalink("Northwind Co", None, Some("brands")),
            "brands/northwind-co"
        );
        assert_eq!(
            derive_permalink("Northwind Co", Some("northwind"), Some("brands")),
            "brands/northwind"
        );
        // Only the last segment of an explicit permalink survives.
        assert_eq!(
            derive_permalink("Outdoor", Some("old/parent/outdoor"), Some("brands")),
            "brands/outdoor"
        );
    }

    #[test]
    fn test_new_taxon_validation() {
        assert!(NewTaxon::named("Mugs").validate().is_ok());
        assert!(NewTaxon::named("").validate().is_err());

        let long = NewTaxon {
            meta_keywords: Some("k".repeat(256)),
            ..NewTaxon::named("Mugs")
        };
        assert!(long.validate().is_err());

        assert_eq!(
            NewTaxon::named("!!!").permalink_under(Some("brands")).unwrap(),
            "brands/212121"
        );
        let permalink = NewTaxon::named("日本").permalink_under(Some("brands")).unwrap();
        assert!(permalink.starts_with("brands/"));
        assert!(permalink.len() > "brands/".len());
        assert_eq!(
            NewTaxon::named("Mugs").permalink_under(Some("brands")).unwrap(),
            "brands/mugs"
        );
    }

    #[test]
    fn test_seo_title() {
        let mut root = taxon("Categories");
        assert_eq!(root.seo_title("Categories"), "Categories");

        let mut child = taxon("Mugs");
        child.parent_id = Some(root.id.clone());
        assert_eq!(child.seo_title("Categories"), "Categories - Mugs");

        child.meta_title = Some("Coffee mugs".to_string());
        assert_eq!(child.seo_title("Categories"), "Coffee mugs");

        root.meta_title = Some("   ".to_string());
        assert_eq!(root.seo_title("Categories"), "Categories");
    }

    #[test]
    fn test_pretty_name() {
        let a = taxon("Categories");
        let b = taxon("Bags");
        let c = taxon("Totes");
        assert_eq!(c.pretty_name([&a, &b]), "Categories -> Bags -> Totes");
        assert_eq!(a.pretty_name([]), "Categories");
    }

    #[test]
    fn test_changes_keep_permalink() {
        let mut t = taxon("Mugs");
        let before = t.permalink.clone();
        TaxonChanges {
            name: Some("Cups".to_string()),
            meta_title: Some(Some("Cups!".to_string())),
            ..Default::default()
        }
        .apply(&mut t, Utc::now())
        .unwrap();

        assert_eq!(t.name, "Cups");
        assert_eq!(t.permalink, before);
        assert_eq!(t.meta_title.as_deref(), Some("Cups!"));
    }

    #[test]
    fn test_invalid_changes_leave_taxon_untouched() {
        let mut t = taxon("Mugs");
        let result = TaxonChanges {
            name: Some(" ".to_string()),
            ..Default::default()
        }
        .apply(&mut t, Utc::now());

        assert!(result.is_err());
        assert_eq!(t.name, "Mugs");
    }

    #[test]
    fn test_bounds_helpers() {
        let mut parent = taxon("Categories");
        parent.rgt = 6;
        let mut child = taxon("Bags");
        child.lft = 2;
        child.rgt = 3;

        assert!(parent.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&parent));
        assert_eq!(parent.descendant_count(), 2);
        assert!(child.is_leaf());
    }

    #[test]
    fn test_applicable_filters() {
        let filters = applicable_filters(None);
        assert_eq!(filters.len(), 1);

        let price = &filters[0];
        assert_eq!(price.range_for(Money::from_cents(999)), Some("Under 10.00"));
        assert_eq!(price.range_for(Money::from_cents(1000)), Some("10.00 - 15.00"));
        assert_eq!(price.range_for(Money::from_cents(2500)), Some("20.00 or over"));
    }

    #[test]
    fn test_brand_filter_lists_distinct_values() {
        let values = ["Ridgeline", "Northwind", " ", "Ridgeline"].map(String::from);
        let filters = applicable_filters(Some(values.to_vec()));
        assert_eq!(filters.len(), 2);

        let brands = &filters[1];
        assert_eq!(brands.scope, "brand_any");
        assert_eq!(
            brands.options,
            FilterOptions::Values(vec!["Northwind".to_string(), "Ridgeline".to_string()])
        );
        assert_eq!(brands.range_for(Money::from_cents(500)), None);

        let empty = applicable_filters(Some(vec![]));
        assert_eq!(empty[1].options, FilterOptions::Values(vec![]));
    }
}
