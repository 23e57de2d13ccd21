//! Shopify product import column schema.
//!
//! Every output row is serialized against [`ALL`] in this exact order.
//! Columns are split by scope: product-scoped columns live on the
//! `Parent`/`Single` row, variant-scoped columns on `Variant`/`Single` rows.

pub const HANDLE: &str = "Handle";
pub const TITLE: &str = "Title";
pub const BODY: &str = "Body (HTML)";
pub const VENDOR: &str = "Vendor";
pub const CATEGORY: &str = "Product Category";
pub const TYPE: &str = "Type";
pub const TAGS: &str = "Tags";
pub const PUBLISHED: &str = "Published";
pub const OPTION1_NAME: &str = "Option1 Name";
pub const OPTION1_VALUE: &str = "Option1 Value";
pub const SKU: &str = "Variant SKU";
pub const GRAMS: &str = "Variant Grams";
pub const INVENTORY_TRACKER: &str = "Variant Inventory Tracker";
pub const INVENTORY_QTY: &str = "Variant Inventory Qty";
pub const INVENTORY_POLICY: &str = "Variant Inventory Policy";
pub const FULFILLMENT_SERVICE: &str = "Variant Fulfillment Service";
pub const PRICE: &str = "Variant Price";
pub const COMPARE_AT_PRICE: &str = "Variant Compare At Price";
pub const REQUIRES_SHIPPING: &str = "Variant Requires Shipping";
pub const TAXABLE: &str = "Variant Taxable";
pub const BARCODE: &str = "Variant Barcode";
pub const IMAGE_SRC: &str = "Image Src";
pub const IMAGE_POSITION: &str = "Image Position";
pub const IMAGE_ALT: &str = "Image Alt Text";
pub const VARIANT_IMAGE: &str = "Variant Image";
pub const SEO_TITLE: &str = "SEO Title";
pub const SEO_DESCRIPTION: &str = "SEO Description";
pub const STATUS: &str = "Status";

/// Output column order.
pub const ALL: &[&str] = &[
    HANDLE,
    TITLE,
    BODY,
    VENDOR,
    CATEGORY,
    TYPE,
    TAGS,
    PUBLISHED,
    OPTION1_NAME,
    OPTION1_VALUE,
    SKU,
    GRAMS,
    INVENTORY_TRACKER,
    INVENTORY_QTY,
    INVENTORY_POLICY,
    FULFILLMENT_SERVICE,
    PRICE,
    COMPARE_AT_PRICE,
    REQUIRES_SHIPPING,
    TAXABLE,
    BARCODE,
    IMAGE_SRC,
    IMAGE_POSITION,
    IMAGE_ALT,
    VARIANT_IMAGE,
    SEO_TITLE,
    SEO_DESCRIPTION,
    STATUS,
];

/// Columns describing the product as a whole.
pub const PRODUCT_SCOPED: &[&str] = &[
    TITLE,
    BODY,
    VENDOR,
    CATEGORY,
    TYPE,
    TAGS,
    PUBLISHED,
    SEO_TITLE,
    SEO_DESCRIPTION,
    STATUS,
];

/// Columns describing one purchasable variant.
pub const VARIANT_SCOPED: &[&str] = &[
    SKU,
    GRAMS,
    INVENTORY_TRACKER,
    INVENTORY_QTY,
    INVENTORY_POLICY,
    FULFILLMENT_SERVICE,
    PRICE,
    COMPARE_AT_PRICE,
    REQUIRES_SHIPPING,
    TAXABLE,
    BARCODE,
    VARIANT_IMAGE,
];

/// Newer template column names accepted as mapping targets.
const ALIASES: &[(&str, &str)] = &[
    ("URL handle", HANDLE),
    ("Description", BODY),
    ("Published on online store", PUBLISHED),
    ("SKU", SKU),
    ("Price", PRICE),
    ("Compare-at price", COMPARE_AT_PRICE),
    ("Product image URL", IMAGE_SRC),
    ("Option1 name", OPTION1_NAME),
    ("Option1 value", OPTION1_VALUE),
    ("Inventory tracker", INVENTORY_TRACKER),
    ("Inventory quantity", INVENTORY_QTY),
    ("Continue selling when out of stock", INVENTORY_POLICY),
    ("Fulfillment service", FULFILLMENT_SERVICE),
    ("Weight value (grams)", GRAMS),
    ("Requires shipping", REQUIRES_SHIPPING),
    ("Charge tax", TAXABLE),
    ("Image alt text", IMAGE_ALT),
    ("Variant image URL", VARIANT_IMAGE),
    ("SEO title", SEO_TITLE),
    ("SEO description", SEO_DESCRIPTION),
];

/// Resolve a configured target name to its import column.
///
/// Accepts both import names (`Variant Price`) and template aliases
/// (`Price`). Returns `None` for columns outside the schema.
pub fn canonical(name: &str) -> Option<&'static str> {
    let name = name.trim();
    if let Some(column) = ALL.iter().find(|c| **c == name) {
        return Some(column);
    }
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, column)| *column)
}

pub fn is_product_scoped(column: &str) -> bool {
    PRODUCT_SCOPED.contains(&column)
}

pub fn is_variant_scoped(column: &str) -> bool {
    VARIANT_SCOPED.contains(&column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_accepts_import_names_and_aliases() {
        assert_eq!(canonical("Variant Price"), Some(PRICE));
        assert_eq!(canonical("Price"), Some(PRICE));
        assert_eq!(canonical("URL handle"), Some(HANDLE));
        assert_eq!(canonical(" Title "), Some(TITLE));
        assert_eq!(canonical("Warehouse Bin"), None);
    }

    #[test]
    fn test_scopes_are_disjoint() {
        for column in PRODUCT_SCOPED {
            assert!(!is_variant_scoped(column), "{} in both scopes", column);
        }
    }
}
