//! CSV writers for the import file and the issue report.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{CsvError, CsvResult};
use crate::models::{columns, OutputRow, Phase, ValidationIssue};

fn write_error(e: impl std::fmt::Display) -> CsvError {
    CsvError::WriteError(e.to_string())
}

fn create_parent(path: &Path) -> CsvResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Write rows in import-column order. The header is always written, even
/// when there are no rows.
pub fn write_rows<W: Write>(writer: W, rows: &[OutputRow]) -> CsvResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(columns::ALL).map_err(write_error)?;
    for row in rows {
        csv_writer.write_record(row.to_record()).map_err(write_error)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_rows_to_path<P: AsRef<Path>>(path: P, rows: &[OutputRow]) -> CsvResult<()> {
    let path = path.as_ref();
    create_parent(path)?;
    let file = fs::File::create(path)?;
    write_rows(file, rows)
}

/// Write the issue log with columns
/// `row_index, phase, severity, kind, field, message`.
pub fn write_issues<W: Write>(writer: W, issues: &[ValidationIssue]) -> CsvResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer
        .write_record(["row_index", "phase", "severity", "kind", "field", "message"])
        .map_err(write_error)?;
    for issue in issues {
        let row_index = issue.row_index.to_string();
        let phase = match issue.phase {
            Phase::Pre => "pre",
            Phase::Post => "post",
        };
        let severity = if issue.is_error() { "error" } else { "warning" };
        csv_writer
            .write_record([
                row_index.as_str(),
                phase,
                severity,
                issue.kind.as_str(),
                issue.field.as_str(),
                issue.message.as_str(),
            ])
            .map_err(write_error)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_issue_report<P: AsRef<Path>>(path: P, issues: &[ValidationIssue]) -> CsvResult<()> {
    let path = path.as_ref();
    create_parent(path)?;
    let file = fs::File::create(path)?;
    write_issues(file, issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RowRole;

    #[test]
    fn test_header_written_for_empty_output() {
        let mut buf = Vec::new();
        write_rows(&mut buf, &[]).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("Handle,Title,"));
    }

    #[test]
    fn test_rows_quoted_when_needed() {
        let mut row = OutputRow::new(RowRole::Single, 1, "tee");
        row.set(columns::TITLE, "Tee, cotton");
        let mut buf = Vec::new();
        write_rows(&mut buf, &[row]).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let line = text.lines().nth(1).unwrap();
        assert!(line.starts_with("tee,\"Tee, cotton\","));
        assert_eq!(line.matches(',').count(), columns::ALL.len());
    }

    #[test]
    fn test_issue_report_columns() {
        let issues = vec![
            ValidationIssue::source_error(3, "Product Name", "missing"),
            ValidationIssue::post_warning(4, columns::IMAGE_SRC, "not https"),
        ];
        let mut buf = Vec::new();
        write_issues(&mut buf, &issues).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "row_index,phase,severity,kind,field,message");
        assert_eq!(lines[1], "3,pre,error,SourceValidationError,Product Name,missing");
        assert_eq!(lines[2], "4,post,warning,PostValidationWarning,Image Src,not https");
    }

    #[test]
    fn test_paths_create_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out/nested/products.csv");
        let report = dir.path().join("reports/errors.csv");

        write_rows_to_path(&output, &[]).unwrap();
        write_issue_report(&report, &[]).unwrap();

        assert!(output.exists());
        assert_eq!(
            fs::read_to_string(&report).unwrap().trim(),
            "row_index,phase,severity,kind,field,message"
        );
    }
}
