//! High-level migration API.
//!
//! Chains the stages for every source record: pre-validation, mapping and
//! normalization, grouping, expansion, post-validation.
//!
//! # Example
//!
//! ```rust,ignore
//! use shopmigrate::config::MappingConfig;
//! use shopmigrate::transform::pipeline::{migrate_file, MigrateOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MappingConfig::from_path("mapping.json")?;
//!     let report = migrate_file("export.csv", "shopify.csv", &config, &MigrateOptions::default())?;
//!
//!     println!("Wrote {} rows", report.stats.output_rows);
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::{GroupingStrategy, MappingConfig};
use crate::error::{ConfigResult, PipelineError, PipelineResult};
use crate::logs::{log_error, log_info, log_info_indent, log_success, log_warning, log_warning_indent};
use crate::models::{OutputRow, RowRole, SourceRecord, ValidationIssue};
use crate::parser::{format_delimiter, parse_csv_file_auto, write_issue_report, write_rows_to_path};
use crate::validation::{validate_group, validate_source};

use super::context::RunContext;
use super::grouper::{expand, GroupingEngine, ProductGroup};
use super::mapping::{Resolver, RuleSet};

// =============================================================================
// Statistics
// =============================================================================

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationStats {
    pub source_rows: usize,
    /// Source rows dropped before grouping (pre-validation or mapping errors).
    pub skipped_rows: usize,
    pub groups: usize,
    pub excluded_groups: usize,
    /// Rows dropped individually by post-validation, excluded groups included.
    pub excluded_rows: usize,
    pub single_rows: usize,
    pub parent_rows: usize,
    pub variant_rows: usize,
    pub image_rows: usize,
    pub output_rows: usize,
    pub errors: usize,
    pub warnings: usize,
}

impl MigrationStats {
    fn count_row(&mut self, role: RowRole) {
        match role {
            RowRole::Single => self.single_rows += 1,
            RowRole::Parent => self.parent_rows += 1,
            RowRole::Variant => self.variant_rows += 1,
            RowRole::ImageOnly => self.image_rows += 1,
        }
        self.output_rows += 1;
    }

    /// Share of source rows that did not reach the output, in percent.
    pub fn error_rate(&self) -> f64 {
        if self.source_rows == 0 {
            return 0.0;
        }
        self.skipped_rows as f64 / self.source_rows as f64 * 100.0
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Default)]
pub struct MigrationOutcome {
    pub rows: Vec<OutputRow>,
    pub issues: Vec<ValidationIssue>,
    pub stats: MigrationStats,
}

// =============================================================================
// Migrator
// =============================================================================

/// Record-at-a-time migration engine.
///
/// Owns the grouping buffer and the run's dedup state. A fresh `Migrator`
/// starts from empty handle and SKU sets.
pub struct Migrator {
    resolver: Resolver,
    engine: GroupingEngine,
    ctx: RunContext,
    required_sources: Vec<String>,
    required_columns: Vec<&'static str>,
    option_name: Option<String>,
    rows: Vec<OutputRow>,
    issues: Vec<ValidationIssue>,
    stats: MigrationStats,
}

impl Migrator {
    pub fn new(config: &MappingConfig) -> ConfigResult<Self> {
        let rules = RuleSet::from_config(config);
        for target in &rules.unknown_targets {
            log_warning(format!("Unknown target column '{}', rule ignored", target));
        }
        for (target, operator) in rules.unknown_operators() {
            log_warning(format!(
                "Unknown operator '{}' in condition for '{}', affected rows will be rejected",
                operator, target
            ));
        }

        Ok(Self {
            engine: GroupingEngine::new(&config.grouping)?,
            resolver: Resolver::new(rules, config.normalization.clone()),
            ctx: RunContext::new(),
            required_sources: config.required_source_fields.clone(),
            required_columns: config.required_columns(),
            option_name: config.grouping.option_name.clone(),
            rows: Vec::new(),
            issues: Vec::new(),
            stats: MigrationStats::default(),
        })
    }

    /// Feed one source record. Groups closed by it are expanded right away.
    pub fn push(&mut self, source: &SourceRecord) {
        self.stats.source_rows += 1;

        let mut issues = validate_source(source, &self.required_sources, self.resolver.rules());
        if issues.iter().any(ValidationIssue::is_error) {
            self.stats.skipped_rows += 1;
            self.issues.extend(issues);
            return;
        }

        let (record, mapping_issues) = self.resolver.resolve(source);
        issues.extend(mapping_issues);
        self.issues.extend(issues.iter().cloned());
        if issues.iter().any(ValidationIssue::is_error) {
            self.stats.skipped_rows += 1;
            return;
        }

        for group in self.engine.push(record, issues) {
            self.emit(group);
        }
    }

    /// Flush the grouping buffer and return the run's output.
    pub fn finish(mut self) -> MigrationOutcome {
        for group in self.engine.finish() {
            self.emit(group);
        }

        let errors = self.issues.iter().filter(|i| i.is_error()).count();
        self.stats.errors = errors;
        self.stats.warnings = self.issues.len() - errors;

        MigrationOutcome {
            rows: self.rows,
            issues: self.issues,
            stats: self.stats,
        }
    }

    fn emit(&mut self, group: ProductGroup) {
        self.stats.groups += 1;

        let expansion = expand(&group, &self.ctx.handles, self.option_name.as_deref());
        self.issues.extend(expansion.issues);

        let verdict = validate_group(expansion.rows, &mut self.ctx, &self.required_columns);
        self.issues.extend(verdict.issues);
        self.stats.excluded_rows += verdict.rejected_rows;
        if verdict.group_rejected {
            self.stats.excluded_groups += 1;
        }

        for row in &verdict.accepted {
            self.stats.count_row(row.role);
        }
        self.rows.extend(verdict.accepted);
    }
}

/// Migrate an in-memory record sequence with a fresh run context.
pub fn migrate_records(records: &[SourceRecord], config: &MappingConfig) -> ConfigResult<MigrationOutcome> {
    let mut migrator = Migrator::new(config)?;
    for record in records {
        migrator.push(record);
    }
    Ok(migrator.finish())
}

// =============================================================================
// File-level API
// =============================================================================

/// Options for [`migrate_file`].
#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    /// Process only the first N source records.
    pub sample: Option<usize>,
    /// Overrides the configured grouping strategy.
    pub strategy: Option<GroupingStrategy>,
    /// Issue report path; defaults to `error_report_<timestamp>.csv` next to the output.
    pub error_report: Option<PathBuf>,
    /// Where to write the JSON run report.
    pub summary: Option<PathBuf>,
}

/// Detection results for the source file.
#[derive(Debug, Clone, Serialize)]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: String,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Run report, written as JSON with `--summary`.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub input: PathBuf,
    pub output: PathBuf,
    /// Absent when the run produced no issues.
    pub error_report: Option<PathBuf>,
    pub source: CsvInfo,
    pub stats: MigrationStats,
    pub error_rate: f64,
}

/// Default issue report path: `error_report_YYYYmmdd_HHMMSS.csv` beside `output`.
pub fn default_report_path(output: &Path, at: DateTime<Utc>) -> PathBuf {
    let name = format!("error_report_{}.csv", at.format("%Y%m%d_%H%M%S"));
    match output.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Read `input`, migrate it and write the import file to `output`.
pub fn migrate_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &MappingConfig,
    options: &MigrateOptions,
) -> PipelineResult<MigrationReport> {
    let input = input.as_ref();
    let output = output.as_ref();
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    log_info(format!("🚀 Migration run {}", run_id));

    // Step 1: read the source file
    log_info(format!("📖 Reading {}...", input.display()));
    let parsed = parse_csv_file_auto(input)?;
    log_success(format!("Detected encoding: {}", parsed.encoding));
    log_success(format!("Detected separator: '{}'", format_delimiter(parsed.delimiter)));
    log_success(format!("Read {} rows", parsed.records.len()));

    let source = CsvInfo {
        encoding: parsed.encoding.clone(),
        delimiter: format_delimiter(parsed.delimiter).to_string(),
        headers: parsed.headers.clone(),
        row_count: parsed.records.len(),
    };

    let missing = config.missing_headers(&parsed.headers);
    if !missing.is_empty() {
        log_warning(format!("{} configured source column(s) not in file:", missing.len()));
        for column in &missing {
            log_warning_indent(column.clone(), 1);
        }
    }

    let records = match options.sample {
        Some(n) => {
            log_info(format!("Sampling first {} rows", n));
            &parsed.records[..n.min(parsed.records.len())]
        }
        None => &parsed.records[..],
    };
    if records.is_empty() {
        log_error("No records to migrate");
        return Err(PipelineError::EmptyInput);
    }

    // Step 2: map, group, expand, validate
    let mut config = config.clone();
    if let Some(strategy) = options.strategy {
        config.grouping.strategy = strategy;
    }
    log_info(format!(
        "🔄 Migrating {} rows ({:?} grouping)...",
        records.len(),
        config.grouping.strategy
    ));
    let outcome = migrate_records(records, &config)?;

    // Step 3: write outputs
    log_info(format!("💾 Writing {}...", output.display()));
    write_rows_to_path(output, &outcome.rows)?;
    log_success(format!("Wrote {} rows", outcome.rows.len()));

    let error_report = if outcome.issues.is_empty() {
        None
    } else {
        let path = options
            .error_report
            .clone()
            .unwrap_or_else(|| default_report_path(output, started_at));
        write_issue_report(&path, &outcome.issues)?;
        log_info(format!("📋 Issue report: {}", path.display()));
        Some(path)
    };

    print_summary(&outcome);

    let report = MigrationReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        error_report,
        source,
        error_rate: outcome.stats.error_rate(),
        stats: outcome.stats,
    };

    if let Some(ref path) = options.summary {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        log_info(format!("Summary written to {}", path.display()));
    }

    Ok(report)
}

fn print_summary(outcome: &MigrationOutcome) {
    let stats = &outcome.stats;
    log_info("📊 Summary:");
    log_info_indent(format!("Source rows: {}", stats.source_rows), 1);
    log_info_indent(format!("Skipped before grouping: {}", stats.skipped_rows), 1);
    log_info_indent(
        format!("Products: {} ({} excluded)", stats.groups, stats.excluded_groups),
        1,
    );
    log_info_indent(
        format!(
            "Output rows: {} (single {}, parent {}, variant {}, image {})",
            stats.output_rows, stats.single_rows, stats.parent_rows, stats.variant_rows, stats.image_rows
        ),
        1,
    );

    if stats.errors == 0 && stats.warnings == 0 {
        log_success("✅ No issues");
        return;
    }
    if stats.errors > 0 {
        log_warning(format!(
            "{} errors, {} warnings (error rate {:.1}%)",
            stats.errors,
            stats.warnings,
            stats.error_rate()
        ));
    } else {
        log_success(format!("No errors, {} warnings", stats.warnings));
    }

    let mut by_kind: Vec<(&str, usize)> = Vec::new();
    for issue in &outcome.issues {
        match by_kind.iter_mut().find(|(kind, _)| *kind == issue.kind.as_str()) {
            Some((_, count)) => *count += 1,
            None => by_kind.push((issue.kind.as_str(), 1)),
        }
    }
    for (kind, count) in by_kind {
        log_info_indent(format!("• {}: {}", kind, count), 1);
    }
}
