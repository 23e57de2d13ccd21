//! Group mapped records into products and expand them into import rows.
//!
//! Variants of one product usually arrive as separate source rows whose
//! titles differ only by a trailing size/color word or parenthetical.
//! Those rows are clustered by the handle of their base title.
//!
//! # Architecture
//!
//! ```text
//! Mapped records                   →  Import rows
//! ┌──────────────────────────┐       ┌────────────────────────────────┐
//! │ Title: Tee (Small)  A-S  │       │ tee  Parent   Tee  Option1=Size │
//! │ Title: Tee (Large)  A-L  │  →    │ tee  Variant  Small  A-S        │
//! │ Title: Mug          M-1  │       │ tee  Variant  Large  A-L        │
//! └──────────────────────────┘       ├────────────────────────────────┤
//!                                    │ mug  Single   Mug    M-1        │
//!                                    └────────────────────────────────┘
//! ```
//!
//! # Expansion
//!
//! - One member and no distinguishing value: a `Single` row, then one
//!   `ImageOnly` row per extra image.
//! - Otherwise: a `Parent` row, one `Variant` row per member in arrival
//!   order, then `ImageOnly` rows for images 2..m.
//!
//! Row count is always `1 + variants + max(0, images - 1)`.

use regex::Regex;
use std::collections::HashMap;

use crate::config::{GroupingConfig, GroupingStrategy};
use crate::error::{ConfigError, ConfigResult};
use crate::models::{columns, MappedRecord, OutputRow, RowRole, ValidationIssue};
use crate::transform::context::HandleRegistry;
use crate::transform::mapping::{normalize_tags, slugify};

/// Option1 Name used when nothing more specific is known.
pub const DEFAULT_OPTION_NAME: &str = "Size";

/// Option1 Value for a variant with neither a distinguishing value nor a SKU.
pub const DEFAULT_OPTION_VALUE: &str = "Default";

// =============================================================================
// Title splitting
// =============================================================================

/// Which vocabulary a distinguishing value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionDimension {
    Size,
    Color,
}

impl OptionDimension {
    pub fn option_name(&self) -> &'static str {
        match self {
            OptionDimension::Size => "Size",
            OptionDimension::Color => "Color",
        }
    }
}

/// A title split into its base product name and distinguishing value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleSplit {
    pub base: String,
    pub token: Option<String>,
    pub dimension: Option<OptionDimension>,
}

/// Strips a trailing parenthetical or vocabulary word off a title.
#[derive(Debug, Clone)]
pub struct TitleSplitter {
    parenthetical: Option<Regex>,
    sizes: Option<Regex>,
    colors: Option<Regex>,
    color_words: Vec<String>,
}

fn vocabulary_pattern(tokens: &[String]) -> ConfigResult<Option<Regex>> {
    let mut words: Vec<&str> = tokens.iter().map(|t| t.trim()).filter(|t| !t.is_empty()).collect();
    if words.is_empty() {
        return Ok(None);
    }
    // Longest first so "Extra Large" wins over "Large".
    words.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    words.dedup();

    let alternatives: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
    let pattern = format!(
        r"(?i)^(?P<base>.*?\S)(?:\s*[-/,]\s*|\s+)(?P<token>{})\s*$",
        alternatives.join("|")
    );
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| ConfigError::InvalidVocabulary(e.to_string()))
}

impl TitleSplitter {
    pub fn new(config: &GroupingConfig) -> ConfigResult<Self> {
        let parenthetical = if config.strip_parenthetical {
            let re = Regex::new(r"^(?P<base>.*\S)\s*\((?P<token>[^()]*)\)\s*$")
                .map_err(|e| ConfigError::InvalidVocabulary(e.to_string()))?;
            Some(re)
        } else {
            None
        };

        Ok(Self {
            parenthetical,
            sizes: vocabulary_pattern(&config.size_tokens)?,
            colors: vocabulary_pattern(&config.color_tokens)?,
            color_words: config.color_tokens.iter().map(|c| c.trim().to_lowercase()).collect(),
        })
    }

    pub fn split(&self, title: &str) -> TitleSplit {
        let title = title.trim();

        if let Some(caps) = self.parenthetical.as_ref().and_then(|re| re.captures(title)) {
            let token = caps["token"].trim();
            if !token.is_empty() {
                let dimension = if self.color_words.contains(&token.to_lowercase()) {
                    OptionDimension::Color
                } else {
                    OptionDimension::Size
                };
                return TitleSplit {
                    base: caps["base"].trim().to_string(),
                    token: Some(token.to_string()),
                    dimension: Some(dimension),
                };
            }
        }

        let vocabularies = [
            (&self.sizes, OptionDimension::Size),
            (&self.colors, OptionDimension::Color),
        ];
        for (pattern, dimension) in vocabularies {
            if let Some(caps) = pattern.as_ref().and_then(|re| re.captures(title)) {
                return TitleSplit {
                    base: caps["base"].trim().to_string(),
                    token: Some(caps["token"].to_string()),
                    dimension: Some(dimension),
                };
            }
        }

        TitleSplit {
            base: title.to_string(),
            token: None,
            dimension: None,
        }
    }
}

// =============================================================================
// Product groups
// =============================================================================

/// One record inside a product group.
#[derive(Debug, Clone)]
pub struct GroupMember {
    pub record: MappedRecord,
    /// Distinguishing value, from an explicit Option1 Value or the title.
    pub token: Option<String>,
    pub dimension: Option<OptionDimension>,
    /// Issues raised while resolving the record; attached to its output row.
    pub warnings: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GroupImage {
    url: String,
    /// Index of the member that first contributed the image.
    member: usize,
}

/// Records sharing one base identity.
#[derive(Debug, Clone)]
pub struct ProductGroup {
    pub key: String,
    /// Explicit handle or base title; slugified when the handle is issued.
    pub handle_seed: String,
    pub base_title: String,
    pub members: Vec<GroupMember>,
    images: Vec<GroupImage>,
}

impl ProductGroup {
    fn new(key: String, handle_seed: String, base_title: String) -> Self {
        Self {
            key,
            handle_seed,
            base_title,
            members: Vec::new(),
            images: Vec::new(),
        }
    }

    fn add_member(&mut self, member: GroupMember) {
        let index = self.members.len();
        for url in &member.record.images {
            if !self.images.iter().any(|img| &img.url == url) {
                self.images.push(GroupImage {
                    url: url.clone(),
                    member: index,
                });
            }
        }
        self.members.push(member);
    }

    /// Deduplicated image URLs in arrival order.
    pub fn image_urls(&self) -> impl Iterator<Item = &str> {
        self.images.iter().map(|img| img.url.as_str())
    }

    /// Single-row product: one member and no distinguishing value.
    pub fn is_single(&self) -> bool {
        self.members.len() == 1 && self.members[0].token.is_none()
    }

    /// Source row of the member defining the product.
    pub fn first_row(&self) -> usize {
        self.members.first().map(|m| m.record.row_index).unwrap_or(0)
    }

    /// Rows this group expands into.
    pub fn row_count(&self) -> usize {
        let variants = if self.is_single() { 0 } else { self.members.len() };
        1 + variants + self.images.len().saturating_sub(1)
    }
}

// =============================================================================
// Grouping engine
// =============================================================================

/// Clusters mapped records into [`ProductGroup`]s.
///
/// With [`GroupingStrategy::Buffered`] every group stays open until
/// [`finish`](Self::finish) and groups come out in order of first appearance.
/// With [`GroupingStrategy::Contiguous`] a group closes as soon as a record
/// with another key arrives.
#[derive(Debug)]
pub struct GroupingEngine {
    splitter: TitleSplitter,
    strategy: GroupingStrategy,
    open: Vec<ProductGroup>,
    index: HashMap<String, usize>,
}

impl GroupingEngine {
    pub fn new(config: &GroupingConfig) -> ConfigResult<Self> {
        Ok(Self {
            splitter: TitleSplitter::new(config)?,
            strategy: config.strategy,
            open: Vec::new(),
            index: HashMap::new(),
        })
    }

    pub fn splitter(&self) -> &TitleSplitter {
        &self.splitter
    }

    /// Add a record; returns the groups this closed (contiguous only).
    pub fn push(&mut self, record: MappedRecord, warnings: Vec<ValidationIssue>) -> Vec<ProductGroup> {
        let split = self.splitter.split(record.value(columns::TITLE));
        let explicit_handle = record.get(columns::HANDLE).map(str::trim).filter(|h| !h.is_empty());

        let key = match explicit_handle.map(slugify).filter(|k| !k.is_empty()) {
            Some(key) => key,
            None => {
                let key = slugify(&split.base);
                if key.is_empty() {
                    // Never matches a slug: the record stays alone.
                    format!("#row-{}", record.row_index)
                } else {
                    key
                }
            }
        };

        let mut closed = Vec::new();
        if self.strategy == GroupingStrategy::Contiguous
            && self.open.last().is_some_and(|g| g.key != key)
        {
            closed = self.drain();
        }

        let position = match self.index.get(&key) {
            Some(&position) => position,
            None => {
                let seed = explicit_handle.unwrap_or(split.base.as_str()).to_string();
                self.open.push(ProductGroup::new(key.clone(), seed, split.base.clone()));
                self.index.insert(key, self.open.len() - 1);
                self.open.len() - 1
            }
        };

        let explicit_option = record
            .get(columns::OPTION1_VALUE)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);
        let member = GroupMember {
            token: explicit_option.or(split.token),
            dimension: split.dimension,
            record,
            warnings,
        };
        self.open[position].add_member(member);

        closed
    }

    /// Close every open group.
    pub fn finish(&mut self) -> Vec<ProductGroup> {
        self.drain()
    }

    pub fn open_groups(&self) -> usize {
        self.open.len()
    }

    fn drain(&mut self) -> Vec<ProductGroup> {
        self.index.clear();
        std::mem::take(&mut self.open)
    }
}

// =============================================================================
// Expansion
// =============================================================================

/// Rows produced by one group, before post-validation.
#[derive(Debug, Clone)]
pub struct Expansion {
    pub handle: String,
    pub rows: Vec<OutputRow>,
    /// Issues raised by the expansion itself (option value fallbacks).
    pub issues: Vec<ValidationIssue>,
}

fn copy_columns(row: &mut OutputRow, record: &MappedRecord, cols: &[&'static str]) {
    for column in cols {
        row.set(*column, record.value(column));
    }
}

/// Expand a closed group into ordered import rows.
///
/// The handle is peeked from `handles`, not reserved: the caller reserves
/// it once the group survives post-validation.
pub fn expand(group: &ProductGroup, handles: &HandleRegistry, option_name: Option<&str>) -> Expansion {
    let handle = handles.peek(&slugify(&group.handle_seed));
    let mut rows = Vec::with_capacity(group.row_count());
    let mut issues = Vec::new();

    let Some(first) = group.members.first() else {
        return Expansion { handle, rows, issues };
    };
    let first_image = group.images.first();

    let product_columns: Vec<&'static str> = columns::PRODUCT_SCOPED
        .iter()
        .copied()
        .filter(|c| *c != columns::TITLE && *c != columns::TAGS)
        .collect();
    let variant_columns: Vec<&'static str> = columns::VARIANT_SCOPED
        .iter()
        .copied()
        .filter(|c| *c != columns::VARIANT_IMAGE)
        .collect();

    let raw_tags: Vec<&str> = group.members.iter().map(|m| m.record.value(columns::TAGS)).collect();
    let tags = normalize_tags(&raw_tags);

    if group.is_single() {
        let mut row = OutputRow::new(RowRole::Single, first.record.row_index, &handle);
        row.set(columns::TITLE, first.record.value(columns::TITLE));
        row.set(columns::TAGS, tags);
        copy_columns(&mut row, &first.record, &product_columns);
        copy_columns(&mut row, &first.record, &variant_columns);
        if let Some(image) = first_image {
            row.set(columns::IMAGE_SRC, image.url.clone());
            row.set(columns::IMAGE_POSITION, "1");
            row.set(columns::IMAGE_ALT, first.record.value(columns::IMAGE_ALT));
        }
        row.warnings = first.warnings.clone();
        rows.push(row);
    } else {
        let option_values: Vec<String> = group
            .members
            .iter()
            .map(|member| match member.token {
                Some(ref token) => token.clone(),
                None => {
                    let row = member.record.row_index;
                    let fallback = match member.record.get(columns::SKU) {
                        Some(sku) => sku.to_string(),
                        None => DEFAULT_OPTION_VALUE.to_string(),
                    };
                    issues.push(ValidationIssue::transform_warning(
                        row,
                        columns::OPTION1_VALUE,
                        format!("no distinguishing value in title, using '{}'", fallback),
                    ));
                    fallback
                }
            })
            .collect();

        let name = option_name
            .map(String::from)
            .or_else(|| first.record.get(columns::OPTION1_NAME).map(String::from))
            .or_else(|| {
                group
                    .members
                    .iter()
                    .find_map(|m| m.dimension)
                    .map(|d| d.option_name().to_string())
            })
            .unwrap_or_else(|| DEFAULT_OPTION_NAME.to_string());

        let mut parent = OutputRow::new(RowRole::Parent, first.record.row_index, &handle);
        parent.set(columns::TITLE, group.base_title.clone());
        parent.set(columns::TAGS, tags);
        copy_columns(&mut parent, &first.record, &product_columns);
        parent.set(columns::OPTION1_NAME, name);
        if let Some(image) = first_image {
            parent.set(columns::IMAGE_SRC, image.url.clone());
            parent.set(columns::IMAGE_POSITION, "1");
            parent.set(columns::IMAGE_ALT, first.record.value(columns::IMAGE_ALT));
        }
        rows.push(parent);

        for (member, value) in group.members.iter().zip(&option_values) {
            let mut row = OutputRow::new(RowRole::Variant, member.record.row_index, &handle);
            row.set(columns::OPTION1_VALUE, value.clone());
            copy_columns(&mut row, &member.record, &variant_columns);
            if let Some(image) = member.record.images.first() {
                row.set(columns::VARIANT_IMAGE, image.clone());
            }
            row.warnings = member.warnings.clone();
            row.warnings
                .extend(issues.iter().filter(|i| i.row_index == member.record.row_index).cloned());
            rows.push(row);
        }
    }

    for (position, image) in group.images.iter().enumerate().skip(1) {
        let owner = &group.members[image.member];
        let mut row = OutputRow::new(RowRole::ImageOnly, owner.record.row_index, &handle);
        row.set(columns::IMAGE_SRC, image.url.clone());
        row.set(columns::IMAGE_POSITION, (position + 1).to_string());
        row.set(columns::IMAGE_ALT, owner.record.value(columns::IMAGE_ALT));

        let dedicated = owner.record.images.first() == Some(&image.url);
        if !group.is_single() && dedicated {
            let value = rows
                .iter()
                .find(|r| r.role == RowRole::Variant && r.source_row == owner.record.row_index)
                .map(|r| r.get(columns::OPTION1_VALUE).to_string())
                .unwrap_or_default();
            row.set(columns::OPTION1_VALUE, value);
        }
        rows.push(row);
    }

    Expansion { handle, rows, issues }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RuleKind;

    fn record(row: usize, pairs: &[(&'static str, &str)]) -> MappedRecord {
        let mut record = MappedRecord::new(row);
        for (column, value) in pairs {
            record.set_if_absent(*column, *value, RuleKind::Direct);
        }
        record
    }

    fn with_images(mut record: MappedRecord, images: &[&str]) -> MappedRecord {
        record.images = images.iter().map(|s| s.to_string()).collect();
        record
    }

    fn engine(strategy: GroupingStrategy) -> GroupingEngine {
        let config = GroupingConfig {
            strategy,
            ..GroupingConfig::default()
        };
        GroupingEngine::new(&config).unwrap()
    }

    #[test]
    fn test_title_split() {
        let splitter = TitleSplitter::new(&GroupingConfig::default()).unwrap();

        let split = splitter.split("Tee (Small)");
        assert_eq!(split.base, "Tee");
        assert_eq!(split.token.as_deref(), Some("Small"));
        assert_eq!(split.dimension, Some(OptionDimension::Size));

        let split = splitter.split("Hoodie - Extra Large");
        assert_eq!(split.base, "Hoodie");
        assert_eq!(split.token.as_deref(), Some("Extra Large"));

        let split = splitter.split("Mug Red");
        assert_eq!(split.base, "Mug");
        assert_eq!(split.dimension, Some(OptionDimension::Color));

        let split = splitter.split("Scarf (navy)");
        assert_eq!(split.dimension, Some(OptionDimension::Color));

        let split = splitter.split("Large");
        assert_eq!(split.base, "Large");
        assert_eq!(split.token, None);

        let split = splitter.split("Lamp");
        assert_eq!(split.base, "Lamp");
        assert_eq!(split.token, None);
    }

    #[test]
    fn test_buffered_groups_non_adjacent_members() {
        let mut engine = engine(GroupingStrategy::Buffered);
        assert!(engine.push(record(1, &[(columns::TITLE, "Tee (S)")]), vec![]).is_empty());
        assert!(engine.push(record(2, &[(columns::TITLE, "Mug")]), vec![]).is_empty());
        assert!(engine.push(record(3, &[(columns::TITLE, "Tee (L)")]), vec![]).is_empty());

        let groups = engine.finish();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "tee");
        assert_eq!(groups[0].members.len(), 2);
        assert_eq!(groups[1].key, "mug");
        assert_eq!(engine.open_groups(), 0);
    }

    #[test]
    fn test_contiguous_closes_on_key_change() {
        let mut engine = engine(GroupingStrategy::Contiguous);
        assert!(engine.push(record(1, &[(columns::TITLE, "Tee (S)")]), vec![]).is_empty());
        let closed = engine.push(record(2, &[(columns::TITLE, "Mug")]), vec![]);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].key, "tee");

        let closed = engine.push(record(3, &[(columns::TITLE, "Tee (L)")]), vec![]);
        assert_eq!(closed[0].key, "mug");
        let rest = engine.finish();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].key, "tee");
        assert_eq!(rest[0].members.len(), 1);
    }

    #[test]
    fn test_explicit_handle_seeds_key() {
        let mut engine = engine(GroupingStrategy::Buffered);
        engine.push(record(1, &[(columns::HANDLE, "Classic Tee"), (columns::TITLE, "Tee (S)")]), vec![]);
        engine.push(record(2, &[(columns::HANDLE, "classic-tee"), (columns::TITLE, "")]), vec![]);
        let groups = engine.finish();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "classic-tee");
        assert_eq!(groups[0].handle_seed, "Classic Tee");
    }

    #[test]
    fn test_blank_titles_never_group() {
        let mut engine = engine(GroupingStrategy::Buffered);
        engine.push(record(1, &[(columns::SKU, "A")]), vec![]);
        engine.push(record(2, &[(columns::SKU, "B")]), vec![]);
        assert_eq!(engine.finish().len(), 2);
    }

    #[test]
    fn test_expand_single_with_extra_images() {
        let mut engine = engine(GroupingStrategy::Buffered);
        let rec = with_images(
            record(1, &[(columns::TITLE, "Lamp"), (columns::PRICE, "10.00"), (columns::TAGS, "home")]),
            &["https://x.io/1.jpg", "https://x.io/2.jpg"],
        );
        engine.push(rec, vec![]);
        let group = engine.finish().remove(0);
        let expansion = expand(&group, &HandleRegistry::default(), None);

        assert_eq!(expansion.handle, "lamp");
        let roles: Vec<RowRole> = expansion.rows.iter().map(|r| r.role).collect();
        assert_eq!(roles, vec![RowRole::Single, RowRole::ImageOnly]);
        assert_eq!(expansion.rows[0].get(columns::PRICE), "10.00");
        assert_eq!(expansion.rows[0].get(columns::OPTION1_NAME), "");
        assert_eq!(expansion.rows[1].get(columns::IMAGE_POSITION), "2");
        assert_eq!(expansion.rows[1].get(columns::OPTION1_VALUE), "");
        assert_eq!(expansion.rows.len(), group.row_count());
    }

    #[test]
    fn test_expand_variants() {
        let mut engine = engine(GroupingStrategy::Buffered);
        engine.push(
            with_images(
                record(1, &[(columns::TITLE, "Tee (Small)"), (columns::SKU, "T-S"), (columns::VENDOR, "Acme")]),
                &["https://x.io/s.jpg"],
            ),
            vec![],
        );
        engine.push(
            with_images(
                record(2, &[(columns::TITLE, "Tee (Large)"), (columns::SKU, "T-L")]),
                &["https://x.io/l.jpg"],
            ),
            vec![],
        );
        let group = engine.finish().remove(0);
        let expansion = expand(&group, &HandleRegistry::default(), None);
        let rows = &expansion.rows;

        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.handle() == "tee"));

        assert_eq!(rows[0].role, RowRole::Parent);
        assert_eq!(rows[0].get(columns::TITLE), "Tee");
        assert_eq!(rows[0].get(columns::VENDOR), "Acme");
        assert_eq!(rows[0].get(columns::OPTION1_NAME), "Size");
        assert_eq!(rows[0].get(columns::SKU), "");
        assert_eq!(rows[0].get(columns::IMAGE_SRC), "https://x.io/s.jpg");

        assert_eq!(rows[1].get(columns::OPTION1_VALUE), "Small");
        assert_eq!(rows[1].get(columns::TITLE), "");
        assert_eq!(rows[1].get(columns::VARIANT_IMAGE), "https://x.io/s.jpg");
        assert_eq!(rows[2].get(columns::OPTION1_VALUE), "Large");

        assert_eq!(rows[3].role, RowRole::ImageOnly);
        assert_eq!(rows[3].get(columns::IMAGE_SRC), "https://x.io/l.jpg");
        assert_eq!(rows[3].get(columns::OPTION1_VALUE), "Large");
        assert!(expansion.issues.is_empty());
    }

    #[test]
    fn test_option_value_fallbacks() {
        let mut engine = engine(GroupingStrategy::Buffered);
        engine.push(record(1, &[(columns::HANDLE, "kit"), (columns::SKU, "K-1")]), vec![]);
        engine.push(record(2, &[(columns::HANDLE, "kit")]), vec![]);
        let group = engine.finish().remove(0);
        let expansion = expand(&group, &HandleRegistry::default(), Some("Style"));

        assert_eq!(expansion.rows[0].get(columns::OPTION1_NAME), "Style");
        assert_eq!(expansion.rows[1].get(columns::OPTION1_VALUE), "K-1");
        assert_eq!(expansion.rows[2].get(columns::OPTION1_VALUE), DEFAULT_OPTION_VALUE);
        assert_eq!(expansion.issues.len(), 2);
        assert_eq!(expansion.rows[2].warnings.len(), 1);
    }

    #[test]
    fn test_expand_peeks_handle() {
        let mut handles = HandleRegistry::default();
        handles.reserve("lamp");
        let mut engine = engine(GroupingStrategy::Buffered);
        engine.push(record(1, &[(columns::TITLE, "Lamp")]), vec![]);
        let group = engine.finish().remove(0);

        let expansion = expand(&group, &handles, None);
        assert_eq!(expansion.handle, "lamp-2");
        assert!(!handles.contains("lamp-2"));
    }
}
