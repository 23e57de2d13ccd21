//! Delimited file reader with encoding and delimiter auto-detection.
//!
//! Turns raw bytes into [`SourceRecord`]s. Nothing Shopify-specific here.

pub mod writer;

use serde::Serialize;
use std::path::Path;

use crate::error::{CsvError, CsvResult};
use crate::models::SourceRecord;

pub use writer::{write_issue_report, write_issues, write_rows, write_rows_to_path};

/// Parsed file plus detection metadata.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub records: Vec<SourceRecord>,
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
}

/// Detect the encoding of raw bytes using chardet.
pub fn detect_encoding(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return "utf-8".to_string();
    }
    let (charset, _confidence, _language) = chardet::detect(bytes);

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => chardet::charset2encoding(&charset).to_lowercase(),
    }
}

/// Decode bytes with the given encoding label. A leading BOM is stripped.
///
/// UTF-8 input that turns out not to be valid UTF-8 is re-read as
/// Windows-1252, the usual culprit for spreadsheet exports.
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let label = match encoding.to_lowercase().as_str() {
        "ascii" | "utf8" => "utf-8".to_string(),
        other => other.to_string(),
    };
    let codec = encoding_rs::Encoding::for_label(label.as_bytes())
        .ok_or_else(|| CsvError::EncodingError(format!("unsupported encoding '{}'", encoding)))?;

    let (text, used, had_errors) = codec.decode(bytes);
    if had_errors && used == encoding_rs::UTF_8 {
        let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
        return Ok(text.into_owned());
    }
    Ok(text.into_owned())
}

/// Detect the delimiter by counting unquoted occurrences in the header line.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let mut in_quotes = false;
        let mut count = 0;
        for c in first_line.chars() {
            match c {
                '"' => in_quotes = !in_quotes,
                c if c == sep && !in_quotes => count += 1,
                _ => {}
            }
        }
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse delimited text into records.
///
/// Short rows are padded with empty values, extra cells are ignored.
/// Row indices are 1-based over data rows.
pub fn parse_records(content: &str, delimiter: char) -> CsvResult<(Vec<String>, Vec<SourceRecord>)> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .has_headers(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::NoHeaders);
    }

    let mut records = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let row = result?;
        let fields = headers
            .iter()
            .enumerate()
            .map(|(col, header)| (header.clone(), row.get(col).unwrap_or("").to_string()))
            .collect();
        records.push(SourceRecord::new(i + 1, fields));
    }

    Ok((headers, records))
}

/// Parse decoded text with an explicit delimiter and keep the metadata.
pub fn parse_string_with_metadata(content: &str, delimiter: char, encoding: String) -> CsvResult<ParseResult> {
    let (headers, records) = parse_records(content, delimiter)?;
    Ok(ParseResult {
        records,
        encoding,
        delimiter,
        headers,
    })
}

/// Parse bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> CsvResult<ParseResult> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile);
    }
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    parse_string_with_metadata(&content, delimiter, encoding)
}

/// Parse a file with auto-detection of encoding and delimiter.
///
/// # Example
/// ```ignore
/// let result = parse_csv_file_auto("products.csv")?;
/// println!("Encoding: {}, Delimiter: '{}'", result.encoding, result.delimiter);
/// println!("Records: {}", result.records.len());
/// ```
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

/// Display name for a delimiter.
pub fn format_delimiter(d: char) -> &'static str {
    match d {
        ';' => ";",
        ',' => ",",
        '\t' => "TAB",
        '|' => "|",
        _ => "?",
    }
}

// =============================================================================
// Analysis
// =============================================================================

/// Fill statistics for one source column.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnStats {
    pub name: String,
    pub filled: usize,
    pub blank: usize,
}

/// Overview of a source file, for the `analyze` command.
#[derive(Debug, Clone, Serialize)]
pub struct CsvAnalysis {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub column_count: usize,
    pub blank_rows: usize,
    pub columns: Vec<ColumnStats>,
    pub sample: Vec<Vec<(String, String)>>,
}

pub fn analyze(parsed: &ParseResult, sample_rows: usize) -> CsvAnalysis {
    let columns = parsed
        .headers
        .iter()
        .map(|name| {
            let filled = parsed
                .records
                .iter()
                .filter(|r| r.get_non_blank(name).is_some())
                .count();
            ColumnStats {
                name: name.clone(),
                filled,
                blank: parsed.records.len() - filled,
            }
        })
        .collect();

    let sample = parsed
        .records
        .iter()
        .take(sample_rows)
        .map(|r| {
            r.columns()
                .map(|c| (c.to_string(), r.get(c).unwrap_or("").to_string()))
                .collect()
        })
        .collect();

    CsvAnalysis {
        encoding: parsed.encoding.clone(),
        delimiter: format_delimiter(parsed.delimiter).to_string(),
        row_count: parsed.records.len(),
        column_count: parsed.headers.len(),
        blank_rows: parsed.records.iter().filter(|r| r.is_blank()).count(),
        columns,
        sample,
    }
}
