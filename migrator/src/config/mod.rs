//! Mapping configuration.
//!
//! A configuration is a JSON document describing the four rule categories
//! plus field requirements, grouping and normalization settings. Raw JSON is
//! checked against the embedded draft-7 schema (`schemas/mapping-config.json`)
//! before it is deserialized, so shape errors are reported all at once.
//!
//! ```json
//! {
//!   "mappings": {
//!     "direct":      { "fields": { "Product Name": "Title" } },
//!     "concatenate": { "fields": { "body": { "target": "Body (HTML)", "fields": ["Short", "Long"], "separator": "\n" } } },
//!     "conditional": { "fields": { "publish": { "target": "Published", "condition": { "field": "Stock", "operator": ">", "value": 0, "then": "TRUE", "else": "FALSE" } } } },
//!     "default":     { "fields": { "Vendor": "Acme" } }
//!   },
//!   "required_fields": ["Title", "Variant Price"]
//! }
//! ```
//!
//! Within a category, entries apply in document order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::models::columns;

const SCHEMA: &str = include_str!("../../schemas/mapping-config.json");

/// Environment variable holding the default configuration path.
pub const CONFIG_ENV_VAR: &str = "SHOPMIGRATE_CONFIG";

// =============================================================================
// Configuration types
// =============================================================================

/// A complete mapping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(default)]
    pub description: String,

    pub mappings: Mappings,

    /// Output columns that must be non-empty on the rows carrying their scope.
    #[serde(default)]
    pub required_fields: Vec<String>,

    /// Documented for analysis output; never enforced.
    #[serde(default)]
    pub optional_fields: Vec<String>,

    /// Source columns that must be non-blank before mapping.
    #[serde(default)]
    pub required_source_fields: Vec<String>,

    #[serde(default)]
    pub grouping: GroupingConfig,

    #[serde(default)]
    pub normalization: NormalizationConfig,
}

/// The four rule categories, in application order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Mappings {
    /// `source column -> target column`
    #[serde(default)]
    pub direct: Section<String>,
    #[serde(default)]
    pub concatenate: Section<ConcatenateSpec>,
    #[serde(default)]
    pub conditional: Section<ConditionalSpec>,
    /// `target column -> literal`
    #[serde(default)]
    pub default: Section<Value>,
}

/// A `{ "fields": { ... } }` block, entries kept in document order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct Section<T> {
    #[serde(default, with = "ordered_entries")]
    pub fields: Vec<(String, T)>,
}

impl<T> Default for Section<T> {
    fn default() -> Self {
        Self { fields: Vec::new() }
    }
}

impl<T> Section<T> {
    pub fn with(mut self, name: impl Into<String>, entry: T) -> Self {
        self.fields.push((name.into(), entry));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcatenateSpec {
    pub target: String,
    pub fields: Vec<String>,
    #[serde(default = "default_separator")]
    pub separator: String,
}

fn default_separator() -> String {
    " ".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalSpec {
    pub target: String,
    pub condition: ConditionSpec,
}

/// `field <operator> value ? then : else`.
///
/// A `null`/absent branch leaves the target unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionSpec {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, rename = "then")]
    pub then_value: Value,
    #[serde(default, rename = "else")]
    pub else_value: Value,
}

/// How group membership is finalized. Also the `--strategy` CLI value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GroupingStrategy {
    /// Buffer every group until end of input; variants may be non-adjacent.
    #[default]
    Buffered,
    /// Close a group as soon as the key changes; memory bounded by one group.
    /// Non-adjacent variants of one product end up as separate products.
    Contiguous,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingConfig {
    #[serde(default)]
    pub strategy: GroupingStrategy,

    /// Forces Option1 Name for every multi-variant product.
    #[serde(default)]
    pub option_name: Option<String>,

    /// Treat a trailing `(...)` in the title as the distinguishing value.
    #[serde(default = "default_true")]
    pub strip_parenthetical: bool,

    #[serde(default = "default_size_tokens")]
    pub size_tokens: Vec<String>,

    #[serde(default = "default_color_tokens")]
    pub color_tokens: Vec<String>,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            strategy: GroupingStrategy::default(),
            option_name: None,
            strip_parenthetical: true,
            size_tokens: default_size_tokens(),
            color_tokens: default_color_tokens(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_size_tokens() -> Vec<String> {
    [
        "Extra Small", "Extra Large", "XSmall", "XLarge", "Small", "Medium", "Large",
        "XXXXL", "XXXL", "XXL", "XL", "2XL", "3XL", "4XL", "5XL", "XXS", "XS", "S", "M", "L",
        "Petite", "Regular", "Tall", "Short", "Plus", "Oversized",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_color_tokens() -> Vec<String> {
    [
        "Black", "White", "Red", "Blue", "Green", "Yellow", "Orange", "Pink", "Purple",
        "Brown", "Grey", "Gray", "Silver", "Gold", "Navy", "Teal", "Cyan", "Magenta",
        "Beige", "Tan", "Maroon", "Olive", "Lime", "Aqua", "Coral", "Salmon", "Khaki",
        "Burgundy", "Charcoal", "Cream", "Ivory", "Mint", "Peach", "Turquoise", "Violet",
        "Amber", "Bronze", "Copper", "Indigo", "Lavender", "Mauve", "Mustard", "Plum",
        "Rose", "Ruby", "Sage", "Scarlet", "Taupe", "Wine", "Azure", "Champagne",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationConfig {
    /// Source column whose truthy value marks a product as in stock
    /// (drives the inventory default).
    #[serde(default)]
    pub in_stock_field: Option<String>,

    #[serde(default = "default_fulfillment")]
    pub fulfillment_service: String,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            in_stock_field: None,
            fulfillment_service: default_fulfillment(),
        }
    }
}

fn default_fulfillment() -> String {
    "manual".to_string()
}

// =============================================================================
// Loading
// =============================================================================

/// Validate a JSON value against a JSON schema (draft 7).
pub fn validate_against_schema(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

impl MappingConfig {
    /// Parse and schema-check a configuration value.
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        let schema: Value = serde_json::from_str(SCHEMA)?;
        validate_against_schema(&schema, &value).map_err(|errors| ConfigError::SchemaError { errors })?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Every target name the rules write to, in rule order.
    pub fn target_names(&self) -> Vec<&str> {
        let m = &self.mappings;
        m.direct
            .fields
            .iter()
            .map(|(_, target)| target.as_str())
            .chain(m.concatenate.fields.iter().map(|(_, c)| c.target.as_str()))
            .chain(m.conditional.fields.iter().map(|(_, c)| c.target.as_str()))
            .chain(m.default.fields.iter().map(|(target, _)| target.as_str()))
            .collect()
    }

    /// Targets and required fields naming no import column, deduplicated.
    pub fn unknown_targets(&self) -> Vec<String> {
        let mut unknown: Vec<String> = Vec::new();
        let names = self
            .target_names()
            .into_iter()
            .chain(self.required_fields.iter().map(String::as_str));
        for name in names {
            if columns::canonical(name).is_none() && !unknown.iter().any(|u| u == name) {
                unknown.push(name.to_string());
            }
        }
        unknown
    }

    /// Source columns referenced by any rule.
    pub fn source_columns(&self) -> Vec<String> {
        let m = &self.mappings;
        let mut cols: Vec<String> = m.direct.fields.iter().map(|(src, _)| src.clone()).collect();
        for (_, concat) in &m.concatenate.fields {
            cols.extend(concat.fields.iter().cloned());
        }
        for (_, cond) in &m.conditional.fields {
            cols.push(cond.condition.field.clone());
        }
        if let Some(ref field) = self.normalization.in_stock_field {
            cols.push(field.clone());
        }
        cols.sort();
        cols.dedup();
        cols
    }

    /// Source columns referenced by the config but missing from `headers`.
    pub fn missing_headers(&self, headers: &[String]) -> Vec<String> {
        self.source_columns()
            .into_iter()
            .filter(|col| !headers.iter().any(|h| h.trim() == col))
            .collect()
    }

    /// Canonical `required_fields`, unknown names dropped.
    pub fn required_columns(&self) -> Vec<&'static str> {
        self.required_fields
            .iter()
            .filter_map(|f| columns::canonical(f))
            .collect()
    }
}

/// Serde adapter keeping JSON object entries as an ordered list.
mod ordered_entries {
    use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
    use serde::ser::{Serialize, SerializeMap, Serializer};
    use std::fmt;
    use std::marker::PhantomData;

    pub fn serialize<S, T>(entries: &[(String, T)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        struct EntriesVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
            type Value = Vec<(String, T)>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of named entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, T>()? {
                    entries.push(entry);
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

/// Example configuration for documentation and `example-config`.
pub fn example_config() -> MappingConfig {
    let cond = |target: &str, field: &str, operator: &str, value: Value, then_value: &str, else_value: &str| {
        ConditionalSpec {
            target: target.to_string(),
            condition: ConditionSpec {
                field: field.to_string(),
                operator: operator.to_string(),
                value,
                then_value: Value::String(then_value.to_string()),
                else_value: Value::String(else_value.to_string()),
            },
        }
    };

    let direct = Section::default()
        .with("Product Name", "Title".to_string())
        .with("Brand", "Vendor".to_string())
        .with("Category", "Type".to_string())
        .with("Keywords", "Tags".to_string())
        .with("Item Code", "Variant SKU".to_string())
        .with("Selling Price", "Variant Price".to_string())
        .with("List Price", "Variant Compare At Price".to_string())
        .with("Stock", "Variant Inventory Qty".to_string())
        .with("Weight (g)", "Variant Grams".to_string())
        .with("EAN", "Variant Barcode".to_string())
        .with("Image URLs", "Image Src".to_string());

    let concatenate = Section::default().with(
        "description",
        ConcatenateSpec {
            target: "Body (HTML)".to_string(),
            fields: vec!["Short Description".to_string(), "Long Description".to_string()],
            separator: "\n".to_string(),
        },
    );

    let conditional = Section::default()
        .with(
            "published",
            cond("Published", "Stock", ">", Value::from(0), "TRUE", "FALSE"),
        )
        .with(
            "status",
            cond("Status", "Discontinued", "==", Value::from("yes"), "archived", "active"),
        );

    let default = Section::default()
        .with("Vendor", Value::from("Unknown Vendor"))
        .with("Variant Requires Shipping", Value::from("TRUE"))
        .with("Variant Taxable", Value::from("TRUE"))
        .with("Variant Inventory Policy", Value::from("deny"));

    MappingConfig {
        description: "Example mapping from a generic product export".to_string(),
        mappings: Mappings {
            direct,
            concatenate,
            conditional,
            default,
        },
        required_fields: vec![
            "Handle".to_string(),
            "Title".to_string(),
            "Variant Price".to_string(),
        ],
        optional_fields: vec!["Body (HTML)".to_string(), "Tags".to_string(), "Image Src".to_string()],
        required_source_fields: vec!["Product Name".to_string()],
        grouping: GroupingConfig::default(),
        normalization: NormalizationConfig {
            in_stock_field: Some("In Stock".to_string()),
            fulfillment_service: default_fulfillment(),
        },
    }
}
