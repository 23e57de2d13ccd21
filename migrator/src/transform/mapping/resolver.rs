//! Mapping resolver.
//!
//! Turns one [`SourceRecord`] into a [`MappedRecord`] by applying the rule
//! set in category order, then runs the field normalizers over the result.
//! Problems never abort: they come back as [`ValidationIssue`]s next to the
//! record. A record with an error-severity issue must not be grouped.

use crate::config::NormalizationConfig;
use crate::models::{columns, MappedRecord, RuleKind, SourceRecord, ValidationIssue};

use super::normalize::{
    normalize_body_html, normalize_boolean, normalize_compare_at_price, normalize_grams,
    normalize_inventory, normalize_inventory_policy, normalize_inventory_tracker, normalize_price,
    normalize_seo, normalize_status, normalize_tags, parse_flag, split_image_cell,
    SEO_DESCRIPTION_MAX, SEO_TITLE_MAX,
};
use super::rules::{MappingRule, Operator, RuleSet};

/// Rule set plus the normalization settings applied after it.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    rules: RuleSet,
    normalization: NormalizationConfig,
}

impl Resolver {
    pub fn new(rules: RuleSet, normalization: NormalizationConfig) -> Self {
        Self { rules, normalization }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn resolve(&self, source: &SourceRecord) -> (MappedRecord, Vec<ValidationIssue>) {
        resolve_with(source, &self.rules, &self.normalization)
    }
}

/// Resolve with default normalization settings.
pub fn resolve(source: &SourceRecord, rules: &RuleSet) -> (MappedRecord, Vec<ValidationIssue>) {
    resolve_with(source, rules, &NormalizationConfig::default())
}

fn resolve_with(
    source: &SourceRecord,
    rules: &RuleSet,
    normalization: &NormalizationConfig,
) -> (MappedRecord, Vec<ValidationIssue>) {
    let mut record = MappedRecord::new(source.row_index);
    let mut issues = Vec::new();

    apply_rules(source, rules, &mut record, &mut issues);
    normalize_record(source, normalization, &mut record, &mut issues);

    (record, issues)
}

// =============================================================================
// Rule application
// =============================================================================

fn apply_rules(
    source: &SourceRecord,
    rules: &RuleSet,
    record: &mut MappedRecord,
    issues: &mut Vec<ValidationIssue>,
) {
    let row = source.row_index;

    for rule in rules.rules() {
        match rule {
            MappingRule::Direct { source: column, target } => {
                if let Some(value) = source.get_non_blank(column) {
                    record.set_if_absent(*target, value, RuleKind::Direct);
                }
            }
            MappingRule::Concatenate {
                target,
                sources,
                separator,
            } => {
                let parts: Vec<&str> = sources
                    .iter()
                    .filter_map(|column| source.get_non_blank(column))
                    .collect();
                if !parts.is_empty() {
                    record.set_if_absent(*target, parts.join(separator), RuleKind::Concatenate);
                }
            }
            MappingRule::Conditional {
                target,
                source: column,
                operator,
                value,
                then_value,
                else_value,
            } => {
                if let Operator::Unknown(raw) = operator {
                    issues.push(ValidationIssue::mapping_error(
                        row,
                        *target,
                        format!("unknown operator '{}' in condition on '{}'", raw, column),
                    ));
                    continue;
                }
                if record.is_set(target) {
                    continue;
                }

                let actual = source.get(column).unwrap_or("");
                let met = match evaluate(operator, actual, value) {
                    Ok(met) => met,
                    Err(message) => {
                        issues.push(ValidationIssue::transform_warning(row, *target, message));
                        false
                    }
                };
                let branch = if met { then_value } else { else_value };
                if let Some(chosen) = branch.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                    record.set_if_absent(*target, chosen, RuleKind::Conditional);
                }
            }
            MappingRule::Default { target, value } => {
                if !value.trim().is_empty() {
                    record.set_if_absent(*target, value.trim(), RuleKind::Default);
                }
            }
        }
    }
}

/// Evaluate `actual <op> expected`. `Err` carries the warning for a
/// numeric comparison on non-numeric input.
fn evaluate(operator: &Operator, actual: &str, expected: &str) -> Result<bool, String> {
    let actual_trimmed = actual.trim();
    let expected_trimmed = expected.trim();

    let numeric = |cmp: fn(f64, f64) -> bool| -> Result<bool, String> {
        match (actual_trimmed.parse::<f64>(), expected_trimmed.parse::<f64>()) {
            (Ok(a), Ok(b)) => Ok(cmp(a, b)),
            _ => Err(format!(
                "cannot compare '{}' {} '{}' numerically, using else branch",
                actual_trimmed, operator, expected_trimmed
            )),
        }
    };

    match operator {
        Operator::Gt => numeric(|a, b| a > b),
        Operator::Lt => numeric(|a, b| a < b),
        Operator::Ge => numeric(|a, b| a >= b),
        Operator::Le => numeric(|a, b| a <= b),
        Operator::Eq => Ok(actual_trimmed == expected_trimmed),
        Operator::Ne => Ok(actual_trimmed != expected_trimmed),
        Operator::Contains => Ok(actual_trimmed
            .to_lowercase()
            .contains(&expected_trimmed.to_lowercase())),
        Operator::Empty => Ok(actual_trimmed.is_empty()),
        Operator::Unknown(_) => Ok(false),
    }
}

// =============================================================================
// Normalization
// =============================================================================

fn normalize_record(
    source: &SourceRecord,
    settings: &NormalizationConfig,
    record: &mut MappedRecord,
    issues: &mut Vec<ValidationIssue>,
) {
    let row = source.row_index;
    let mut warn = |field: &str, origin: Option<RuleKind>, message: String| {
        issues.push(ValidationIssue::transform_warning(row, field, with_origin(message, origin)));
    };

    record.in_stock = settings
        .in_stock_field
        .as_deref()
        .and_then(|column| source.get(column))
        .map(parse_flag)
        .unwrap_or(false);

    // Compare-at first: the price falls back to it.
    let compare_at = match record.get(columns::COMPARE_AT_PRICE).map(normalize_compare_at_price) {
        Some(normalized) => {
            if let Some(message) = normalized.warning {
                warn(columns::COMPARE_AT_PRICE, record.origin(columns::COMPARE_AT_PRICE), message);
            }
            match normalized.value {
                Some(ref price) => record.replace(columns::COMPARE_AT_PRICE, price.clone()),
                None => {
                    record.remove(columns::COMPARE_AT_PRICE);
                }
            }
            normalized.value
        }
        None => None,
    };

    match (record.get(columns::PRICE).map(normalize_price), compare_at) {
        (Some(price), _) => {
            if let Some(message) = price.warning {
                warn(columns::PRICE, record.origin(columns::PRICE), message);
            }
            record.replace(columns::PRICE, price.value);
        }
        (None, Some(fallback)) => {
            warn(
                columns::PRICE,
                record.origin(columns::COMPARE_AT_PRICE),
                format!("price is missing, using compare-at price {}", fallback),
            );
            record.replace(columns::PRICE, fallback);
        }
        (None, None) => {
            let price = normalize_price("");
            if let Some(message) = price.warning {
                warn(columns::PRICE, record.origin(columns::PRICE), message);
            }
            record.replace(columns::PRICE, price.value);
        }
    }

    let qty = normalize_inventory(record.get(columns::INVENTORY_QTY), record.in_stock);
    if let Some(message) = qty.warning {
        warn(columns::INVENTORY_QTY, record.origin(columns::INVENTORY_QTY), message);
    }
    record.replace(columns::INVENTORY_QTY, qty.value.to_string());

    let tracker = normalize_inventory_tracker(record.value(columns::INVENTORY_TRACKER));
    record.replace(columns::INVENTORY_TRACKER, tracker);

    let policy = normalize_inventory_policy(record.value(columns::INVENTORY_POLICY));
    if let Some(message) = policy.warning {
        warn(columns::INVENTORY_POLICY, record.origin(columns::INVENTORY_POLICY), message);
    }
    record.replace(columns::INVENTORY_POLICY, policy.value);

    record.replace(columns::FULFILLMENT_SERVICE, settings.fulfillment_service.clone());

    if let Some(grams) = record.get(columns::GRAMS).map(normalize_grams) {
        if let Some(message) = grams.warning {
            warn(columns::GRAMS, record.origin(columns::GRAMS), message);
        }
        match grams.value {
            Some(value) => record.replace(columns::GRAMS, value),
            None => {
                record.remove(columns::GRAMS);
            }
        }
    }

    for column in [columns::PUBLISHED, columns::REQUIRES_SHIPPING, columns::TAXABLE] {
        if let Some(flag) = record.get(column).map(normalize_boolean) {
            if let Some(message) = flag.warning {
                warn(column, record.origin(column), message);
            }
            record.replace(column, flag.value);
        }
    }

    if let Some(status) = record.get(columns::STATUS).map(normalize_status) {
        if let Some(message) = status.warning {
            warn(columns::STATUS, record.origin(columns::STATUS), message);
        }
        record.replace(columns::STATUS, status.value);
    }

    if let Some(tags) = record.get(columns::TAGS).map(|raw| normalize_tags(&[raw])) {
        replace_or_remove(record, columns::TAGS, tags);
    }

    if let Some(body) = record.get(columns::BODY).map(normalize_body_html) {
        replace_or_remove(record, columns::BODY, body);
    }

    for (column, max) in [
        (columns::SEO_TITLE, SEO_TITLE_MAX),
        (columns::SEO_DESCRIPTION, SEO_DESCRIPTION_MAX),
    ] {
        if let Some(text) = record.get(column).map(|raw| normalize_seo(raw, max)) {
            replace_or_remove(record, column, text);
        }
    }

    // Image cells become the record's image list; the expansion decides
    // which row carries which image.
    for column in [columns::IMAGE_SRC, columns::VARIANT_IMAGE] {
        if let Some(cell) = record.remove(column) {
            let (valid, rejected) = split_image_cell(&cell.value);
            for url in rejected {
                warn(
                    column,
                    Some(cell.origin),
                    format!("'{}' is not a valid image URL, dropped", url),
                );
            }
            for url in valid {
                if !record.images.contains(&url) {
                    record.images.push(url);
                }
            }
        }
    }
}

/// Name the rule that produced a value a normalizer had to correct.
fn with_origin(message: String, origin: Option<RuleKind>) -> String {
    match origin {
        Some(RuleKind::Normalizer) | None => message,
        Some(kind) => format!("{} (value from {} rule)", message, kind),
    }
}

fn replace_or_remove(record: &mut MappedRecord, column: &'static str, value: String) {
    if value.is_empty() {
        record.remove(column);
    } else {
        record.replace(column, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MappingConfig;
    use crate::models::IssueKind;
    use serde_json::json;

    fn rules(value: serde_json::Value) -> RuleSet {
        RuleSet::from_config(&MappingConfig::from_value(value).unwrap())
    }

    #[test]
    fn test_category_order_and_provenance() {
        let rules = rules(json!({
            "mappings": {
                "direct": { "fields": { "Brand": "Vendor" } },
                "default": { "fields": { "Vendor": "Fallback", "Type": "Misc" } }
            }
        }));
        let source = SourceRecord::from_pairs(1, [("Brand", "Acme")]);
        let (record, _) = resolve(&source, &rules);

        assert_eq!(record.get(columns::VENDOR), Some("Acme"));
        assert_eq!(record.origin(columns::VENDOR), Some(RuleKind::Direct));
        assert_eq!(record.get(columns::TYPE), Some("Misc"));
        assert_eq!(record.origin(columns::TYPE), Some(RuleKind::Default));
    }

    #[test]
    fn test_concatenate_skips_blanks() {
        let rules = rules(json!({
            "mappings": {
                "concatenate": { "fields": {
                    "title": { "target": "Title", "fields": ["Brand", "Model", "Name"], "separator": " - " },
                    "seo": { "target": "SEO Title", "fields": ["Missing", "Empty"] }
                } }
            }
        }));
        let source = SourceRecord::from_pairs(3, [("Brand", "Acme"), ("Model", " "), ("Name", "Boot"), ("Empty", "")]);
        let (record, _) = resolve(&source, &rules);

        assert_eq!(record.get(columns::TITLE), Some("Acme - Boot"));
        assert!(!record.is_set(columns::SEO_TITLE));
    }

    #[test]
    fn test_conditional_branches() {
        let rules = rules(json!({
            "mappings": {
                "conditional": { "fields": {
                    "pub": { "target": "Published", "condition": { "field": "Stock", "operator": ">", "value": 0, "then": "yes", "else": "no" } },
                    "status": { "target": "Status", "condition": { "field": "Note", "operator": "contains", "value": "OLD", "then": "archived" } }
                } }
            }
        }));

        let (record, issues) = resolve(&SourceRecord::from_pairs(1, [("Stock", "5"), ("Note", "old stock")]), &rules);
        assert_eq!(record.get(columns::PUBLISHED), Some("TRUE"));
        assert_eq!(record.get(columns::STATUS), Some("archived"));
        assert!(issues.iter().all(|i| i.field != columns::PUBLISHED));

        let (record, issues) = resolve(&SourceRecord::from_pairs(2, [("Stock", "lots")]), &rules);
        assert_eq!(record.get(columns::PUBLISHED), Some("FALSE"));
        assert!(!record.is_set(columns::STATUS));
        assert!(issues
            .iter()
            .any(|i| i.field == columns::PUBLISHED && i.kind == IssueKind::TransformationWarning));
    }

    #[test]
    fn test_absent_conditional_source_is_empty() {
        let rules = rules(json!({
            "mappings": {
                "conditional": { "fields": {
                    "t": { "target": "Type", "condition": { "field": "Kind", "operator": "empty", "then": "Uncategorized" } }
                } }
            }
        }));
        let (record, issues) = resolve(&SourceRecord::from_pairs(1, [("Other", "x")]), &rules);
        assert_eq!(record.get(columns::TYPE), Some("Uncategorized"));
        assert!(issues.iter().all(|i| !i.is_error()));
    }

    #[test]
    fn test_unknown_operator_is_row_error() {
        let rules = rules(json!({
            "mappings": {
                "conditional": { "fields": {
                    "t": { "target": "Type", "condition": { "field": "Kind", "operator": "like", "value": "x", "then": "X" } }
                } }
            }
        }));
        let (_, issues) = resolve(&SourceRecord::from_pairs(4, [("Kind", "x")]), &rules);
        let error = issues.iter().find(|i| i.is_error()).unwrap();
        assert_eq!(error.kind, IssueKind::MappingError);
        assert_eq!(error.row_index, 4);
        assert_eq!(error.field, columns::TYPE);
    }

    #[test]
    fn test_price_falls_back_to_compare_at() {
        let rules = rules(json!({
            "mappings": { "direct": { "fields": { "List": "Variant Compare At Price", "Cost": "Variant Price" } } }
        }));

        let (record, issues) = resolve(&SourceRecord::from_pairs(1, [("List", "24.9"), ("Cost", "")]), &rules);
        assert_eq!(record.get(columns::PRICE), Some("24.90"));
        assert_eq!(record.get(columns::COMPARE_AT_PRICE), Some("24.90"));
        assert!(issues.iter().any(|i| i.field == columns::PRICE));

        let (record, _) = resolve(&SourceRecord::from_pairs(2, [("Cost", "abc")]), &rules);
        assert_eq!(record.get(columns::PRICE), Some("0.01"));
    }

    #[test]
    fn test_normalizer_warnings_name_rule_origin() {
        let rules = rules(json!({
            "mappings": {
                "direct": { "fields": { "Cost": "Variant Price" } },
                "default": { "fields": { "Status": "pending" } }
            }
        }));
        let (_, issues) = resolve(&SourceRecord::from_pairs(1, [("Cost", "free")]), &rules);

        let price = issues.iter().find(|i| i.field == columns::PRICE).unwrap();
        assert!(price.message.ends_with("(value from direct rule)"), "{}", price.message);
        let status = issues.iter().find(|i| i.field == columns::STATUS).unwrap();
        assert!(status.message.ends_with("(value from default rule)"), "{}", status.message);
        let qty = issues.iter().find(|i| i.field == columns::INVENTORY_QTY).unwrap();
        assert!(!qty.message.contains("rule)"));
    }

    #[test]
    fn test_free_resolve_matches_default_resolver() {
        let rules = rules(json!({
            "mappings": { "direct": { "fields": { "Cost": "Variant Price", "Name": "Title" } } }
        }));
        let source = SourceRecord::from_pairs(2, [("Cost", "1.234,5"), ("Name", "Lamp")]);
        let resolver = Resolver::new(rules.clone(), NormalizationConfig::default());

        let (free_record, free_issues) = resolve(&source, &rules);
        let (record, issues) = resolver.resolve(&source);
        assert_eq!(free_record.get(columns::PRICE), Some("1234.50"));
        assert_eq!(free_record.get(columns::PRICE), record.get(columns::PRICE));
        assert_eq!(free_issues.len(), issues.len());
    }

    #[test]
    fn test_variant_defaults_filled() {
        let (record, issues) = resolve(&SourceRecord::from_pairs(1, [("x", "y")]), &RuleSet::default());
        assert_eq!(record.get(columns::INVENTORY_QTY), Some("10"));
        assert_eq!(record.get(columns::INVENTORY_POLICY), Some("deny"));
        assert_eq!(record.get(columns::INVENTORY_TRACKER), Some("shopify"));
        assert_eq!(record.get(columns::FULFILLMENT_SERVICE), Some("manual"));
        assert!(issues.iter().any(|i| i.field == columns::INVENTORY_QTY));
        assert!(issues.iter().any(|i| i.field == columns::PRICE));
    }

    #[test]
    fn test_in_stock_flag_drives_inventory_default() {
        let config = MappingConfig::from_value(json!({
            "mappings": {},
            "normalization": { "in_stock_field": "Available" }
        }))
        .unwrap();
        let resolver = Resolver::new(RuleSet::from_config(&config), config.normalization.clone());
        let (record, _) = resolver.resolve(&SourceRecord::from_pairs(1, [("Available", "Yes")]));
        assert!(record.in_stock);
        assert_eq!(record.get(columns::INVENTORY_QTY), Some("100"));
    }

    #[test]
    fn test_image_cells_split_into_image_list() {
        let rules = rules(json!({
            "mappings": { "direct": { "fields": { "Images": "Image Src", "Main": "Variant Image" } } }
        }));
        let source = SourceRecord::from_pairs(
            1,
            [
                ("Images", "https://cdn.example.com/1.jpg, broken, https://cdn.example.com/2.jpg"),
                ("Main", "https://cdn.example.com/1.jpg"),
            ],
        );
        let (record, issues) = resolve(&source, &rules);

        assert_eq!(
            record.images,
            vec!["https://cdn.example.com/1.jpg", "https://cdn.example.com/2.jpg"]
        );
        assert!(!record.is_set(columns::IMAGE_SRC));
        assert_eq!(issues.iter().filter(|i| i.field == columns::IMAGE_SRC).count(), 1);
    }
}
