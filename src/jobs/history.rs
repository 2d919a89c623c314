//! Reshape a stage history export into one column per stage
//!
//! Input rows look like `record_id, stage, date, stage, date, ...` with a
//! ragged number of pairs. Output has a `Record ID` column followed by one
//! column per distinct stage holding the date the record entered it.

use crate::decode::csv::{parse_csv_line, read_rows, CsvWriter};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

const JOB: &str = "reshape-history";

/// Reshaped table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTable {
    /// `Record ID` followed by the sorted stage names
    pub header: Vec<String>,
    /// One row per input row
    pub rows: Vec<Vec<String>>,
}

/// Summary of a reshape run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReshapeReport {
    /// Rows written (excluding the header)
    pub rows: usize,
    /// Distinct stages found
    pub stages: usize,
}

/// Normalise a stage name
pub fn clean_stage_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Pad every row with empty fields up to the widest row
pub fn pad_rows(mut rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut rows {
        row.resize(width, String::new());
    }
    rows
}

/// Build the stage table from padded rows.
///
/// Stages are taken from `start_col`; pairs are then read as
/// `(stage, date)` from `start_col` to the end of each row.
pub fn reshape(rows: &[Vec<String>], start_col: usize) -> Result<StageTable> {
    let width = rows.first().map_or(0, Vec::len);
    if width == 0 {
        return Err(Error::job(JOB, "input has no rows"));
    }
    if start_col == 0 || start_col >= width {
        return Err(Error::job(
            JOB,
            format!("start column {start_col} must be between 1 and {}", width - 1),
        ));
    }

    let stages: BTreeSet<String> = rows
        .iter()
        .filter_map(|row| row.get(start_col))
        .map(|s| clean_stage_name(s))
        .filter(|s| !s.is_empty())
        .collect();
    let position: HashMap<&str, usize> = stages
        .iter()
        .enumerate()
        .map(|(idx, stage)| (stage.as_str(), idx + 1))
        .collect();

    let mut header = Vec::with_capacity(stages.len() + 1);
    header.push("Record ID".to_string());
    header.extend(stages.iter().cloned());

    let rows = rows
        .iter()
        .map(|row| {
            let mut out = vec![String::new(); header.len()];
            out[0] = row.first().cloned().unwrap_or_default();

            for pair in row[start_col.min(row.len())..].chunks(2) {
                let stage = clean_stage_name(&pair[0]);
                let date = pair.get(1).map_or("", |d| d.as_str());
                if let Some(&idx) = position.get(stage.as_str()) {
                    if !date.trim().is_empty() {
                        out[idx] = date.to_string();
                    }
                }
            }
            out
        })
        .collect();

    Ok(StageTable { header, rows })
}

/// Read `input`, reshape it and write `output`.
///
/// When `padded_output` is given, the padded intermediate rows are written
/// there as well.
pub fn reshape_file(
    input: &Path,
    output: &Path,
    padded_output: Option<&Path>,
    start_col: usize,
) -> Result<ReshapeReport> {
    let text = fs::read_to_string(input).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: input.display().to_string(),
            }
        } else {
            Error::Io(e)
        }
    })?;

    let rows = pad_rows(read_rows(&text, ','));

    if let Some(path) = padded_output {
        let mut writer = CsvWriter::new(BufWriter::new(File::create(path)?));
        for row in &rows {
            writer.write_row(row)?;
        }
        writer.into_inner()?;
    }

    let table = reshape(&rows, start_col)?;

    let mut writer = CsvWriter::new(BufWriter::new(File::create(output)?));
    writer.write_row(&table.header)?;
    for row in &table.rows {
        writer.write_row(row)?;
    }
    writer.into_inner()?;

    let report = ReshapeReport {
        rows: table.rows.len(),
        stages: table.header.len() - 1,
    };
    info!(
        "Reshaped {} rows into {} stage columns: {}",
        report.rows,
        report.stages,
        output.display()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rows(lines: &[&str]) -> Vec<Vec<String>> {
        lines.iter().map(|l| parse_csv_line(l, ',')).collect()
    }

    #[test]
    fn test_pad_rows() {
        let padded = pad_rows(rows(&["1,a,2024-01-01", "2"]));
        assert_eq!(padded[1], vec!["2", "", ""]);
    }

    #[test]
    fn test_reshape_pairs() {
        let input = pad_rows(rows(&[
            "101, Won ,2024-03-01,Proposal,2024-02-01,Lead,2024-01-01",
            "102,Lead,2024-01-15",
            "103,proposal,",
        ]));

        let table = reshape(&input, 1).unwrap();

        assert_eq!(table.header, vec!["Record ID", "lead", "proposal", "won"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["101", "2024-01-01", "2024-02-01", "2024-03-01"],
                vec!["102", "2024-01-15", "", ""],
                vec!["103", "", "", ""],
            ]
        );
    }

    #[test]
    fn test_stages_only_come_from_start_column() {
        // "closed" appears only later in a row, never as a current stage
        let input = pad_rows(rows(&["1,open,2024-01-02,closed,2024-01-01"]));
        let table = reshape(&input, 1).unwrap();
        assert_eq!(table.header, vec!["Record ID", "open"]);
        assert_eq!(table.rows[0], vec!["1", "2024-01-02"]);
    }

    #[test]
    fn test_reshape_errors() {
        assert!(reshape(&[], 1).is_err());
        let input = pad_rows(rows(&["1,a,2024-01-01"]));
        assert!(reshape(&input, 0).is_err());
        assert!(reshape(&input, 3).is_err());
    }

    #[test]
    fn test_reshape_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("history.csv");
        let output = dir.path().join("output.csv");
        let padded = dir.path().join("padded.csv");
        fs::write(&input, "1,Lead,2024-01-01,New,2023-12-01\n2,New,2023-11-01\n").unwrap();

        let report = reshape_file(&input, &output, Some(&padded), 1).unwrap();
        assert_eq!(report, ReshapeReport { rows: 2, stages: 2 });

        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "Record ID,lead,new\n1,2024-01-01,2023-12-01\n2,,2023-11-01\n"
        );
        assert_eq!(
            fs::read_to_string(&padded).unwrap(),
            "1,Lead,2024-01-01,New,2023-12-01\n2,New,2023-11-01,,\n"
        );
    }

    #[test]
    fn test_reshape_file_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = reshape_file(
            &dir.path().join("missing.csv"),
            &dir.path().join("out.csv"),
            None,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }
}
