//! Record and row validation.
//!
//! # Pre-validation
//!
//! Runs on each [`SourceRecord`] before mapping:
//! - a completely empty row is a `SourceValidationError` and is skipped
//! - a blank required source column is an error, or only a warning when a
//!   default rule still covers the target it feeds
//!
//! # Post-validation
//!
//! Runs on a fully expanded group, see [`validate_group`]:
//! - `Parent`/`Single`: Title and Handle required, handle format, configured
//!   product-scoped required fields
//! - `Variant`: Option1 Value required and unique within the group
//! - `Variant`/`Single`: price > 0, inventory >= 0, configured variant-scoped
//!   required fields, SKU unique across the run
//! - every row: image URL shape, Published and Status formats (warnings)
//!
//! An error on a product row discards the whole group with one consolidated
//! issue. An error on any other row discards only that row.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::models::{columns, OutputRow, RowRole, SourceRecord, ValidationIssue};
use crate::transform::context::RunContext;
use crate::transform::mapping::{normalize_image_url, RuleSet};

static HANDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").expect("static regex"));

// =============================================================================
// Pre-validation
// =============================================================================

/// Structural checks on a raw source record.
///
/// Any error-severity issue in the result means the record must be skipped.
pub fn validate_source(
    record: &SourceRecord,
    required_source_fields: &[String],
    rules: &RuleSet,
) -> Vec<ValidationIssue> {
    let row = record.row_index;

    if record.is_blank() {
        return vec![ValidationIssue::source_error(row, "*", "row is empty")];
    }

    let mut issues = Vec::new();
    for field in required_source_fields {
        if record.get_non_blank(field).is_some() {
            continue;
        }
        let state = if record.get(field).is_some() { "blank" } else { "missing" };
        if rules.source_has_default(field) {
            issues.push(ValidationIssue::transform_warning(
                row,
                field.as_str(),
                format!("required source field is {}, default value applies", state),
            ));
        } else {
            issues.push(ValidationIssue::source_error(
                row,
                field.as_str(),
                format!("required source field is {}", state),
            ));
        }
    }
    issues
}

// =============================================================================
// Post-validation
// =============================================================================

/// Outcome of validating one expanded group.
#[derive(Debug, Clone, Default)]
pub struct GroupVerdict {
    /// Surviving rows, warnings attached, in expansion order.
    pub accepted: Vec<OutputRow>,
    /// Errors and warnings in row order.
    pub issues: Vec<ValidationIssue>,
    pub rejected_rows: usize,
    pub group_rejected: bool,
}

#[derive(Debug, Default)]
struct RowFindings {
    errors: Vec<(&'static str, String)>,
    warnings: Vec<(&'static str, String)>,
}

fn is_blank(row: &OutputRow, column: &str) -> bool {
    row.get(column).trim().is_empty()
}

/// Required-field and format checks that need no cross-row state.
fn check_row(row: &OutputRow, required: &[&'static str]) -> RowFindings {
    let mut findings = RowFindings::default();

    if row.role.is_product_row() {
        if is_blank(row, columns::TITLE) {
            findings.errors.push((columns::TITLE, "Title is required".to_string()));
        }
        let handle = row.handle();
        if handle.is_empty() {
            findings.errors.push((columns::HANDLE, "Handle is required".to_string()));
        } else if !HANDLE_RE.is_match(handle) {
            findings.errors.push((
                columns::HANDLE,
                format!("handle '{}' must contain only lowercase letters, digits and hyphens", handle),
            ));
        }
    }

    if row.role == RowRole::Variant && is_blank(row, columns::OPTION1_VALUE) {
        findings
            .errors
            .push((columns::OPTION1_VALUE, "Option1 Value is required on variant rows".to_string()));
    }

    if row.role.carries_variant() {
        let price = row.get(columns::PRICE).trim();
        match price.parse::<f64>() {
            Ok(value) if value > 0.0 => {}
            Ok(_) => findings
                .errors
                .push((columns::PRICE, format!("price '{}' must be greater than 0", price))),
            Err(_) if price.is_empty() => {
                findings.errors.push((columns::PRICE, "price is required".to_string()))
            }
            Err(_) => findings
                .errors
                .push((columns::PRICE, format!("price '{}' is not a number", price))),
        }

        let qty = row.get(columns::INVENTORY_QTY).trim();
        if !qty.is_empty() && !qty.parse::<i64>().is_ok_and(|q| q >= 0) {
            findings.errors.push((
                columns::INVENTORY_QTY,
                format!("inventory '{}' must be a non-negative integer", qty),
            ));
        }
    }

    for &column in required {
        let applies = match column {
            columns::OPTION1_VALUE => row.role == RowRole::Variant,
            columns::OPTION1_NAME => row.role == RowRole::Parent,
            // Checked above with a more specific message.
            columns::TITLE | columns::HANDLE | columns::PRICE => false,
            _ if columns::is_variant_scoped(column) => row.role.carries_variant(),
            _ => row.role.is_product_row(),
        };
        if applies && is_blank(row, column) {
            findings.errors.push((column, format!("{} is required", column)));
        }
    }

    for column in [columns::IMAGE_SRC, columns::VARIANT_IMAGE] {
        let url = row.get(column);
        if !url.is_empty() && normalize_image_url(url).is_none() {
            findings
                .warnings
                .push((column, format!("'{}' does not look like an image URL", url)));
        }
    }

    let published = row.get(columns::PUBLISHED);
    if !published.is_empty() && published != "TRUE" && published != "FALSE" {
        findings
            .warnings
            .push((columns::PUBLISHED, format!("Published '{}' should be TRUE or FALSE", published)));
    }

    let status = row.get(columns::STATUS);
    if !status.is_empty() && !matches!(status, "active" | "draft" | "archived") {
        findings.warnings.push((
            columns::STATUS,
            format!("Status '{}' should be active, draft or archived", status),
        ));
    }

    findings
}

/// Post-validate one expanded group.
///
/// SKUs of accepted rows are claimed in `ctx`; rejected rows and groups
/// claim nothing. The group handle is reserved only when the group survives.
pub fn validate_group(rows: Vec<OutputRow>, ctx: &mut RunContext, required: &[&'static str]) -> GroupVerdict {
    let mut verdict = GroupVerdict::default();
    let Some(product_row) = rows.iter().find(|r| r.role.is_product_row()) else {
        return verdict;
    };
    let handle = product_row.handle().to_string();
    let product_source = product_row.source_row;

    let mut findings: Vec<RowFindings> = rows.iter().map(|row| check_row(row, required)).collect();

    let mut seen_values: HashSet<String> = HashSet::new();
    for (row, found) in rows.iter().zip(findings.iter_mut()) {
        if row.role != RowRole::Variant {
            continue;
        }
        let value = row.get(columns::OPTION1_VALUE).trim().to_lowercase();
        if !value.is_empty() && !seen_values.insert(value) {
            found.errors.push((
                columns::OPTION1_VALUE,
                format!(
                    "duplicate option value '{}' for handle '{}'",
                    row.get(columns::OPTION1_VALUE),
                    handle
                ),
            ));
        }
    }

    // SKU uniqueness: within the group first, then against the run.
    let mut group_skus: HashSet<&str> = HashSet::new();
    for (row, found) in rows.iter().zip(findings.iter_mut()) {
        if !row.role.carries_variant() || !found.errors.is_empty() {
            continue;
        }
        let sku = row.get(columns::SKU).trim();
        if sku.is_empty() {
            continue;
        }
        if let Some(owner) = ctx.skus.owner(sku) {
            found
                .errors
                .push((columns::SKU, format!("duplicate SKU '{}' (first used on row {})", sku, owner)));
        } else if !group_skus.insert(sku) {
            found
                .errors
                .push((columns::SKU, format!("duplicate SKU '{}' within product '{}'", sku, handle)));
        }
    }

    let product_failed = rows
        .iter()
        .zip(&findings)
        .any(|(row, found)| row.role.is_product_row() && !found.errors.is_empty());

    if product_failed {
        let mut first_field = None;
        let mut messages = Vec::new();
        for (row, found) in rows.iter().zip(&findings) {
            if !row.role.is_product_row() {
                continue;
            }
            for (field, message) in &found.errors {
                first_field.get_or_insert(*field);
                messages.push(message.clone());
            }
        }
        verdict.issues.push(ValidationIssue::post_error(
            product_source,
            first_field.unwrap_or(columns::HANDLE),
            format!(
                "product '{}' excluded with its {} row(s): {}",
                if handle.is_empty() { "<no handle>" } else { handle.as_str() },
                rows.len(),
                messages.join("; ")
            ),
        ));
        verdict.rejected_rows = rows.len();
        verdict.group_rejected = true;
        return verdict;
    }

    for (mut row, found) in rows.into_iter().zip(findings) {
        for (field, message) in found.warnings {
            let issue = ValidationIssue::post_warning(row.source_row, field, message);
            verdict.issues.push(issue.clone());
            row.warnings.push(issue);
        }

        if found.errors.is_empty() {
            if row.role.carries_variant() {
                let sku = row.get(columns::SKU).trim().to_string();
                if !sku.is_empty() {
                    // Cannot conflict: checked above against the run and the group.
                    let _ = ctx.skus.claim(&sku, row.source_row);
                }
            }
            verdict.accepted.push(row);
        } else {
            for (field, message) in found.errors {
                verdict
                    .issues
                    .push(ValidationIssue::post_error(row.source_row, field, message));
            }
            verdict.rejected_rows += 1;
        }
    }

    // Image rows keep an option value only while that variant survives.
    let surviving: HashSet<String> = verdict
        .accepted
        .iter()
        .filter(|r| r.role == RowRole::Variant)
        .map(|r| r.get(columns::OPTION1_VALUE).trim().to_lowercase())
        .collect();
    for row in verdict.accepted.iter_mut().filter(|r| r.role == RowRole::ImageOnly) {
        let value = row.get(columns::OPTION1_VALUE).trim().to_string();
        if value.is_empty() || surviving.contains(&value.to_lowercase()) {
            continue;
        }
        row.set(columns::OPTION1_VALUE, "");
        let issue = ValidationIssue::post_warning(
            row.source_row,
            columns::OPTION1_VALUE,
            format!("option value '{}' cleared from image row, its variant was rejected", value),
        );
        verdict.issues.push(issue.clone());
        row.warnings.push(issue);
    }

    ctx.handles.reserve(&handle);

    let has_variants = verdict.accepted.iter().any(|r| r.role.carries_variant());
    if !has_variants {
        verdict.issues.push(ValidationIssue::post_warning(
            product_source,
            columns::OPTION1_VALUE,
            format!("product '{}' has no remaining variants", handle),
        ));
    }

    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IssueKind;
    use crate::transform::mapping::MappingRule;

    fn single(row: usize, handle: &str, sku: &str) -> OutputRow {
        let mut out = OutputRow::new(RowRole::Single, row, handle);
        out.set(columns::TITLE, "Lamp");
        out.set(columns::PRICE, "10.00");
        out.set(columns::INVENTORY_QTY, "10");
        out.set(columns::SKU, sku);
        out
    }

    fn parent(row: usize, handle: &str, title: &str) -> OutputRow {
        let mut out = OutputRow::new(RowRole::Parent, row, handle);
        out.set(columns::TITLE, title);
        out.set(columns::OPTION1_NAME, "Size");
        out
    }

    fn variant(row: usize, handle: &str, value: &str, sku: &str, price: &str) -> OutputRow {
        let mut out = OutputRow::new(RowRole::Variant, row, handle);
        out.set(columns::OPTION1_VALUE, value);
        out.set(columns::SKU, sku);
        out.set(columns::PRICE, price);
        out.set(columns::INVENTORY_QTY, "5");
        out
    }

    fn image_row(row: usize, handle: &str, value: &str) -> OutputRow {
        let mut out = OutputRow::new(RowRole::ImageOnly, row, handle);
        out.set(columns::OPTION1_VALUE, value);
        out.set(columns::IMAGE_SRC, format!("https://cdn.example.com/{}.jpg", row));
        out
    }

    #[test]
    fn test_image_row_option_cleared_when_variant_rejected() {
        let mut ctx = RunContext::new();
        let rows = vec![
            parent(1, "tee", "Tee"),
            variant(1, "tee", "S", "T-S", "10.00"),
            variant(2, "tee", "M", "T-M", "abc"),
            image_row(2, "tee", "M"),
            image_row(3, "tee", "s"),
        ];
        let verdict = validate_group(rows, &mut ctx, &[]);

        assert_eq!(verdict.accepted.len(), 4);
        let images: Vec<&OutputRow> = verdict
            .accepted
            .iter()
            .filter(|r| r.role == RowRole::ImageOnly)
            .collect();
        assert_eq!(images[0].get(columns::OPTION1_VALUE), "");
        assert_eq!(images[0].warnings.len(), 1);
        assert_eq!(images[1].get(columns::OPTION1_VALUE), "s");
        assert!(images[1].warnings.is_empty());

        let cleared: Vec<&ValidationIssue> = verdict
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::PostValidationWarning && i.field == columns::OPTION1_VALUE)
            .collect();
        assert_eq!(cleared.len(), 1);
        assert_eq!(cleared[0].row_index, 2);
        assert!(cleared[0].message.contains("'M'"));
    }

    #[test]
    fn test_empty_row_is_source_error() {
        let record = SourceRecord::from_pairs(7, [("Name", " "), ("Price", "")]);
        let issues = validate_source(&record, &[], &RuleSet::default());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::SourceValidationError);
        assert_eq!(issues[0].row_index, 7);
    }

    #[test]
    fn test_required_source_field_with_and_without_default() {
        let rules = RuleSet::new(vec![
            MappingRule::Direct {
                source: "Brand".into(),
                target: columns::VENDOR,
            },
            MappingRule::Direct {
                source: "Name".into(),
                target: columns::TITLE,
            },
            MappingRule::Default {
                target: columns::VENDOR,
                value: "Acme".into(),
            },
        ]);
        let required = vec!["Brand".to_string(), "Name".to_string()];
        let record = SourceRecord::from_pairs(2, [("Brand", ""), ("Sku", "A")]);
        let issues = validate_source(&record, &required, &rules);

        assert_eq!(issues.len(), 2);
        assert!(!issues[0].is_error());
        assert_eq!(issues[0].field, "Brand");
        assert!(issues[1].is_error());
        assert!(issues[1].message.contains("missing"));
    }

    #[test]
    fn test_valid_single_claims_sku_and_handle() {
        let mut ctx = RunContext::new();
        let verdict = validate_group(vec![single(1, "lamp", "L-1")], &mut ctx, &[]);
        assert_eq!(verdict.accepted.len(), 1);
        assert!(verdict.issues.is_empty());
        assert_eq!(ctx.skus.owner("L-1"), Some(1));
        assert!(ctx.handles.contains("lamp"));
    }

    #[test]
    fn test_parent_error_drops_group_once() {
        let mut ctx = RunContext::new();
        let rows = vec![
            parent(1, "tee", ""),
            variant(1, "tee", "S", "T-S", "10.00"),
            variant(2, "tee", "L", "T-L", "10.00"),
        ];
        let verdict = validate_group(rows, &mut ctx, &[]);

        assert!(verdict.group_rejected);
        assert!(verdict.accepted.is_empty());
        assert_eq!(verdict.rejected_rows, 3);
        assert_eq!(verdict.issues.len(), 1);
        assert_eq!(verdict.issues[0].field, columns::TITLE);
        assert!(ctx.skus.is_empty());
        assert!(!ctx.handles.contains("tee"));
    }

    #[test]
    fn test_variant_error_drops_only_that_row() {
        let mut ctx = RunContext::new();
        let rows = vec![
            parent(1, "tee", "Tee"),
            variant(1, "tee", "S", "T-S", "10.00"),
            variant(2, "tee", "s", "T-S2", "10.00"),
            variant(3, "tee", "L", "T-L", "abc"),
        ];
        let verdict = validate_group(rows, &mut ctx, &[]);

        assert!(!verdict.group_rejected);
        assert_eq!(verdict.accepted.len(), 2);
        assert_eq!(verdict.rejected_rows, 2);
        assert_eq!(verdict.issues.len(), 2);
        assert_eq!(verdict.issues[0].field, columns::OPTION1_VALUE);
        assert_eq!(verdict.issues[1].field, columns::PRICE);
        assert_eq!(ctx.skus.owner("T-S2"), None);
    }

    #[test]
    fn test_duplicate_sku_across_groups() {
        let mut ctx = RunContext::new();
        validate_group(vec![single(1, "lamp", "X-1")], &mut ctx, &[]);
        let verdict = validate_group(vec![single(4, "desk", "X-1")], &mut ctx, &[]);

        assert!(verdict.group_rejected);
        assert_eq!(verdict.issues.len(), 1);
        assert_eq!(verdict.issues[0].field, columns::SKU);
        assert_eq!(verdict.issues[0].row_index, 4);
        assert!(verdict.issues[0].message.contains("row 1"));
    }

    #[test]
    fn test_warnings_attach_to_surviving_rows() {
        let mut ctx = RunContext::new();
        let mut row = single(1, "lamp", "L-1");
        row.set(columns::IMAGE_SRC, "not a url");
        row.set(columns::PUBLISHED, "yes");
        let verdict = validate_group(vec![row], &mut ctx, &[]);

        assert_eq!(verdict.accepted.len(), 1);
        assert_eq!(verdict.accepted[0].warnings.len(), 2);
        assert!(verdict.issues.iter().all(|i| i.kind == IssueKind::PostValidationWarning));
    }

    #[test]
    fn test_bad_handle_format() {
        let mut ctx = RunContext::new();
        let verdict = validate_group(vec![single(1, "Lamp Shade", "")], &mut ctx, &[]);
        assert!(verdict.group_rejected);
        assert_eq!(verdict.issues[0].field, columns::HANDLE);
    }

    #[test]
    fn test_configured_required_fields_follow_scope() {
        let mut ctx = RunContext::new();
        let rows = vec![
            parent(1, "tee", "Tee"),
            variant(1, "tee", "S", "", "10.00"),
        ];
        let required = [columns::VENDOR, columns::SKU];
        let verdict = validate_group(rows, &mut ctx, &required);

        assert!(verdict.group_rejected);
        assert_eq!(verdict.issues[0].field, columns::VENDOR);
    }
}
