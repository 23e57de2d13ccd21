//! Error types for the Shopmigrate pipeline.
//!
//! Only collaborator failures are Rust errors:
//!
//! - [`CsvError`] - CSV reading and writing errors
//! - [`ConfigError`] - Mapping configuration loading errors
//! - [`PipelineError`] - Top-level orchestration errors
//!
//! Data-quality problems (blank titles, duplicate SKUs, bad prices) never
//! surface here. They are recorded as [`crate::models::ValidationIssue`]s
//! and the run always completes.
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// CSV Errors
// =============================================================================

/// Errors while reading or writing delimited files.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read or write a file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to decode the file content.
    #[error("Failed to decode content: {0}")]
    EncodingError(String),

    /// Malformed CSV.
    #[error("Invalid CSV at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,

    /// Error raised by the csv writer.
    #[error("CSV write error: {0}")]
    WriteError(String),
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        let line = err
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(0);
        CsvError::ParseError {
            line,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading a mapping configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("Cannot read configuration '{path}': {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration is not valid JSON or does not match the expected types.
    #[error("Invalid configuration JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Configuration does not satisfy the embedded schema.
    #[error("Configuration failed schema validation: {errors:?}")]
    SchemaError { errors: Vec<String> },

    /// A grouping token pattern could not be compiled.
    #[error("Invalid grouping vocabulary: {0}")]
    InvalidVocabulary(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level orchestration errors.
///
/// Returned by the file-level entry points in [`crate::transform::pipeline`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Summary serialization failed.
    #[error("Summary serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error outside CSV handling.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No records to transform.
    #[error("No records to transform")]
    EmptyInput,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // CsvError -> PipelineError
        let csv_err = CsvError::EmptyFile;
        let pipeline_err: PipelineError = csv_err.into();
        assert!(pipeline_err.to_string().contains("empty"));

        // ConfigError -> PipelineError
        let config_err = ConfigError::SchemaError {
            errors: vec!["\"mappings\" is a required property".into()],
        };
        let pipeline_err: PipelineError = config_err.into();
        assert!(pipeline_err.to_string().contains("mappings"));
    }

    #[test]
    fn test_parse_error_format() {
        let err = CsvError::ParseError {
            line: 7,
            message: "unequal lengths".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("line 7"));
        assert!(msg.contains("unequal lengths"));
    }
}
