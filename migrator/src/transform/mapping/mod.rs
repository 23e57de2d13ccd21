//! Source-to-target field mapping.
//!
//! - `rules`: the closed rule enum and the ordered [`RuleSet`]
//! - `resolver`: applies a rule set to one source record
//! - `normalize`: total, per-field normalizers the resolver runs afterwards
//!
//! ## Usage Flow
//!
//! ```text
//! MappingConfig → RuleSet::from_config → Resolver::resolve(SourceRecord) → (MappedRecord, issues)
//! ```

pub mod normalize;
pub mod resolver;
pub mod rules;

pub use normalize::{
    normalize_boolean, normalize_handle, normalize_image_url, normalize_inventory, normalize_price,
    normalize_tags, slugify, Normalized, FLOOR_PRICE,
};
pub use resolver::{resolve, Resolver};
pub use rules::{MappingRule, Operator, RuleSet};
