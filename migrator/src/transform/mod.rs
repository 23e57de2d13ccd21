//! Transformation module.
//!
//! - Mapping: rule resolution and field normalization
//! - Context: per-run handle and SKU registries
//! - Grouper: product grouping and row expansion
//! - Pipeline: record-at-a-time orchestration and file-level API

pub mod context;
pub mod grouper;
pub mod mapping;
pub mod pipeline;

pub use context::{HandleRegistry, RunContext, SkuRegistry};
pub use grouper::{expand, Expansion, GroupingEngine, ProductGroup, TitleSplitter};
pub use pipeline::*;
