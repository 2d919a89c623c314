//! Minimal CSV reading and writing
//!
//! Handles quoted fields and doubled quotes. Rows are plain `Vec<String>`;
//! interpretation is left to the jobs.

use crate::error::Result;
use std::io::Write;

/// Parse a CSV line into fields
pub fn parse_csv_line(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '"' {
            if in_quotes {
                // Check for escaped quote
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                in_quotes = true;
            }
        } else if c == delimiter && !in_quotes {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }

    fields.push(current);
    fields
}

/// Parse a whole document into rows, dropping blank lines.
///
/// A quoted field may span several lines; its line breaks come back as `\n`.
pub fn read_rows(text: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut open: Option<String> = None;

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        let record = match open.take() {
            Some(mut record) => {
                record.push('\n');
                record.push_str(line);
                record
            }
            None if line.trim().is_empty() => continue,
            None => line.to_string(),
        };

        if has_open_quote(&record) {
            open = Some(record);
        } else {
            rows.push(parse_csv_line(&record, delimiter));
        }
    }

    // unterminated quote at end of input
    if let Some(record) = open {
        rows.push(parse_csv_line(&record, delimiter));
    }
    rows
}

/// Doubled quotes count twice, so an odd count means a field is still open
fn has_open_quote(record: &str) -> bool {
    record.matches('"').count() % 2 == 1
}

/// Quote a field if it contains the delimiter, a quote, or a line break
pub fn escape_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') || field.contains('\n') || field.contains('\r')
    {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render one row without the trailing newline
pub fn format_row<S: AsRef<str>>(fields: &[S], delimiter: char) -> String {
    fields
        .iter()
        .map(|f| escape_field(f.as_ref(), delimiter))
        .collect::<Vec<_>>()
        .join(&delimiter.to_string())
}

/// Row-oriented CSV writer
pub struct CsvWriter<W: Write> {
    inner: W,
    delimiter: char,
    rows_written: usize,
}

impl<W: Write> CsvWriter<W> {
    /// Create a comma-delimited writer
    pub fn new(inner: W) -> Self {
        Self::with_delimiter(inner, ',')
    }

    /// Create a writer with a custom delimiter
    pub fn with_delimiter(inner: W, delimiter: char) -> Self {
        Self {
            inner,
            delimiter,
            rows_written: 0,
        }
    }

    /// Write one row
    pub fn write_row<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<()> {
        writeln!(self.inner, "{}", format_row(fields, self.delimiter))?;
        self.rows_written += 1;
        Ok(())
    }

    /// Number of rows written so far
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Flush and return the underlying writer
    pub fn into_inner(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
