//! # Shopmigrate - flat product exports to Shopify import CSVs
//!
//! Shopmigrate maps rows from arbitrary product spreadsheets onto the
//! Shopify product import format, grouping variant rows into products and
//! expanding each product into parent, variant and image rows.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  CSV File   │────▶│   Parser    │────▶│   Mapping   │────▶│  Grouping   │────▶│  Shopify    │
//! │ (ISO/UTF8)  │     │ (auto-enc)  │     │ (rules+norm)│     │ (+validate) │     │  CSV + log  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shopmigrate::{migrate_file, MappingConfig, MigrateOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MappingConfig::from_path("mapping.json")?;
//!     let report = migrate_file("export.csv", "shopify.csv", &config, &MigrateOptions::default())?;
//!     println!("Wrote {} rows", report.stats.output_rows);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Mapping configuration and its JSON schema
//! - [`models`] - Source records, mapped records, output rows, issues
//! - [`parser`] - CSV reading with auto-detection, CSV writing
//! - [`transform`] - Mapping, grouping, and pipeline
//! - [`validation`] - Pre- and post-expansion checks
//! - [`logs`] - Log broadcasting; subscribe to [`LOG_BROADCASTER`] for progress

// Core modules
pub mod error;
pub mod models;

// Configuration
pub mod config;

// Logging
pub mod logs;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{ConfigError, ConfigResult, CsvError, CsvResult, PipelineError, PipelineResult};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    IssueKind,
    MappedRecord,
    OutputRow,
    Phase,
    RowRole,
    Severity,
    SourceRecord,
    ValidationIssue,
};

// =============================================================================
// Re-exports - Logging
// =============================================================================

pub use logs::{LogBroadcaster, LogEntry, LogLevel, LOG_BROADCASTER};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{example_config, GroupingStrategy, MappingConfig};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    analyze,
    detect_delimiter,
    detect_encoding,
    decode_content,
    parse_bytes_auto,
    parse_csv_file_auto,
    CsvAnalysis,
    ParseResult,
};

// =============================================================================
// Re-exports - Mapping
// =============================================================================

pub use transform::mapping::{resolve, MappingRule, Operator, Resolver, RuleSet};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    migrate_file,
    migrate_records,
    CsvInfo,
    MigrateOptions,
    MigrationOutcome,
    MigrationReport,
    MigrationStats,
    Migrator,
};
