//! Domain models for the migration pipeline.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`SourceRecord`] - One raw row from the source spreadsheet
//! - [`MappedRecord`] - Target fields resolved from one source record
//! - [`OutputRow`] - One row of the Shopify import file, tagged with its [`RowRole`]
//! - [`ValidationIssue`] - An error or warning in the run's issue log
//! - [`columns`] - The fixed import column schema

pub mod columns;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Source Record
// =============================================================================

/// A raw source row: column name to raw value, in source column order.
///
/// `row_index` is 1-based over data rows (the header is not counted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub row_index: usize,
    fields: Vec<(String, String)>,
}

impl SourceRecord {
    pub fn new(row_index: usize, fields: Vec<(String, String)>) -> Self {
        Self { row_index, fields }
    }

    /// Build a record from `(column, value)` pairs.
    pub fn from_pairs<K, V>(row_index: usize, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            row_index,
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Raw value of a column, `None` if the column is absent.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed value of a column, `None` if absent or blank.
    pub fn get_non_blank(&self, column: &str) -> Option<&str> {
        self.get(column).map(str::trim).filter(|v| !v.is_empty())
    }

    /// True when every value is blank (or there are no values at all).
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.trim().is_empty())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// =============================================================================
// Mapped Record
// =============================================================================

/// Which rule category produced a mapped value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Direct,
    Concatenate,
    Conditional,
    Default,
    /// Filled in by normalization (e.g. price floor, inventory default).
    Normalizer,
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RuleKind::Direct => "direct",
            RuleKind::Concatenate => "concatenate",
            RuleKind::Conditional => "conditional",
            RuleKind::Default => "default",
            RuleKind::Normalizer => "normalizer",
        };
        f.write_str(name)
    }
}

/// A resolved value with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedValue {
    pub value: String,
    pub origin: RuleKind,
}

/// Target fields resolved from one source record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappedRecord {
    pub row_index: usize,
    fields: BTreeMap<&'static str, MappedValue>,
    /// Normalized image URLs, in cell order.
    pub images: Vec<String>,
    /// In-stock flag read from the configured source column.
    pub in_stock: bool,
}

impl MappedRecord {
    pub fn new(row_index: usize) -> Self {
        Self {
            row_index,
            ..Default::default()
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(|v| v.value.as_str())
    }

    /// Value of a column, or `""` when unset.
    pub fn value(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    pub fn origin(&self, column: &str) -> Option<RuleKind> {
        self.fields.get(column).map(|v| v.origin)
    }

    pub fn is_set(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    /// Set a value only if the column is still unset.
    ///
    /// Returns `true` when the value was stored.
    pub fn set_if_absent(&mut self, column: &'static str, value: impl Into<String>, origin: RuleKind) -> bool {
        if self.fields.contains_key(column) {
            return false;
        }
        self.fields.insert(
            column,
            MappedValue {
                value: value.into(),
                origin,
            },
        );
        true
    }

    /// Replace a value keeping its original provenance (normalization).
    pub fn replace(&mut self, column: &'static str, value: impl Into<String>) {
        match self.fields.get_mut(column) {
            Some(existing) => existing.value = value.into(),
            None => {
                self.fields.insert(
                    column,
                    MappedValue {
                        value: value.into(),
                        origin: RuleKind::Normalizer,
                    },
                );
            }
        }
    }

    pub fn remove(&mut self, column: &str) -> Option<MappedValue> {
        self.fields.remove(column)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &MappedValue)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }
}

// =============================================================================
// Output Row
// =============================================================================

/// Role of a row within its product group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowRole {
    /// Product-scoped row of a multi-variant group.
    Parent,
    /// One option value's price/SKU/inventory.
    Variant,
    /// Continuation row carrying one extra image.
    ImageOnly,
    /// Self-contained product-and-variant row.
    Single,
}

impl RowRole {
    /// Parent and Single rows define the product; an error there drops the group.
    pub fn is_product_row(&self) -> bool {
        matches!(self, RowRole::Parent | RowRole::Single)
    }

    /// Variant and Single rows carry price, SKU and inventory.
    pub fn carries_variant(&self) -> bool {
        matches!(self, RowRole::Variant | RowRole::Single)
    }
}

impl std::fmt::Display for RowRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RowRole::Parent => "parent",
            RowRole::Variant => "variant",
            RowRole::ImageOnly => "image",
            RowRole::Single => "single",
        };
        f.write_str(name)
    }
}

/// One row of the import file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    pub role: RowRole,
    /// Source row this output row was derived from.
    pub source_row: usize,
    values: BTreeMap<&'static str, String>,
    /// Warnings attached to this row for reporting.
    pub warnings: Vec<ValidationIssue>,
}

impl OutputRow {
    pub fn new(role: RowRole, source_row: usize, handle: &str) -> Self {
        let mut row = Self {
            role,
            source_row,
            values: BTreeMap::new(),
            warnings: Vec::new(),
        };
        row.set(columns::HANDLE, handle);
        row
    }

    pub fn handle(&self) -> &str {
        self.get(columns::HANDLE)
    }

    /// Value of a column, `""` when not populated.
    pub fn get(&self, column: &str) -> &str {
        self.values.get(column).map(String::as_str).unwrap_or("")
    }

    /// Set a column; empty values are not stored.
    pub fn set(&mut self, column: &'static str, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            self.values.remove(column);
        } else {
            self.values.insert(column, value);
        }
    }

    /// Values in [`columns::ALL`] order, empty strings for unpopulated columns.
    pub fn to_record(&self) -> Vec<&str> {
        columns::ALL.iter().map(|c| self.get(c)).collect()
    }
}

// =============================================================================
// Validation Issues
// =============================================================================

/// When an issue was raised relative to group expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Pre,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Issue taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueKind {
    /// Source row rejected before mapping.
    SourceValidationError,
    /// A rule could not be resolved.
    MappingError,
    /// A normalizer applied a fallback value.
    TransformationWarning,
    /// Required field missing or uniqueness violated after expansion.
    PostValidationError,
    /// Format problem after expansion; row kept.
    PostValidationWarning,
}

impl IssueKind {
    pub fn phase(&self) -> Phase {
        match self {
            IssueKind::SourceValidationError
            | IssueKind::MappingError
            | IssueKind::TransformationWarning => Phase::Pre,
            IssueKind::PostValidationError | IssueKind::PostValidationWarning => Phase::Post,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            IssueKind::SourceValidationError
            | IssueKind::MappingError
            | IssueKind::PostValidationError => Severity::Error,
            IssueKind::TransformationWarning | IssueKind::PostValidationWarning => {
                Severity::Warning
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::SourceValidationError => "SourceValidationError",
            IssueKind::MappingError => "MappingError",
            IssueKind::TransformationWarning => "TransformationWarning",
            IssueKind::PostValidationError => "PostValidationError",
            IssueKind::PostValidationWarning => "PostValidationWarning",
        }
    }
}

/// One entry of the issue log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub row_index: usize,
    pub phase: Phase,
    pub severity: Severity,
    pub kind: IssueKind,
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(kind: IssueKind, row_index: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            row_index,
            phase: kind.phase(),
            severity: kind.severity(),
            kind,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn source_error(row_index: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(IssueKind::SourceValidationError, row_index, field, message)
    }

    pub fn mapping_error(row_index: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(IssueKind::MappingError, row_index, field, message)
    }

    pub fn transform_warning(row_index: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(IssueKind::TransformationWarning, row_index, field, message)
    }

    pub fn post_error(row_index: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(IssueKind::PostValidationError, row_index, field, message)
    }

    pub fn post_warning(row_index: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(IssueKind::PostValidationWarning, row_index, field, message)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Row {} [{}] {} on '{}': {}",
            self.row_index,
            self.kind.as_str(),
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            },
            self.field,
            self.message
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
