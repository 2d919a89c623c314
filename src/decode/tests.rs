//! Tests for decoder module

use super::csv::{escape_field, format_row, parse_csv_line, read_rows, CsvWriter};
use super::*;
use crate::error::Error;
use serde_json::json;

// ============================================================================
// JSON Decoder Tests
// ============================================================================

#[test]
fn test_json_decoder_default_reads_results() {
    let decoder = JsonDecoder::new();
    assert_eq!(decoder.record_path(), Some("results"));

    let body = json!({"results": [{"id": "1"}, {"id": "2"}]});
    let records = decoder.records(&body).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["id"], "2");
}

#[test]
fn test_json_decoder_nested_path() {
    let decoder = JsonDecoder::with_path("data.items");
    let body = json!({"data": {"items": [{"id": 1}]}});

    let records = decoder.records(&body).unwrap();
    assert_eq!(records, vec![json!({"id": 1})]);
}

#[test]
fn test_json_decoder_missing_path_is_malformed() {
    let decoder = JsonDecoder::new();
    let err = decoder.records(&json!({"status": "error"})).unwrap_err();

    match err {
        Error::MalformedResponse { message } => assert!(message.contains("results")),
        other => panic!("Expected MalformedResponse, got {other:?}"),
    }
}

#[test]
fn test_json_decoder_non_array_is_malformed() {
    let decoder = JsonDecoder::with_path("objects");
    let err = decoder.records(&json!({"objects": {"id": 1}})).unwrap_err();
    assert!(matches!(err, Error::MalformedResponse { .. }));
}

#[test]
fn test_json_decoder_empty_results() {
    let decoder = JsonDecoder::new();
    let records = decoder.records(&json!({"results": []})).unwrap();
    assert!(records.is_empty());
}

#[test]
fn test_json_decoder_root_array() {
    let decoder = JsonDecoder::root();
    let records = decoder.records(&json!([1, 2, 3])).unwrap();
    assert_eq!(records.len(), 3);

    assert!(decoder.records(&json!({"a": 1})).is_err());
}

#[test]
fn test_json_decoder_jsonpath_wildcard() {
    let decoder = JsonDecoder::with_path("$.results[*].id");
    let body = json!({"results": [{"id": "a"}, {"id": "b"}]});

    let records = decoder.records(&body).unwrap();
    assert_eq!(records, vec![json!("a"), json!("b")]);
}

// ============================================================================
// Lookup Tests
// ============================================================================

#[test]
fn test_lookup_cursor() {
    let body = json!({"paging": {"next": {"after": "NTI1Cg%3D%3D", "link": "https://x"}}});
    assert_eq!(
        lookup_string(&body, "paging.next.after"),
        Some("NTI1Cg%3D%3D".to_string())
    );
    assert_eq!(
        lookup_string(&body, "$.paging.next.link"),
        Some("https://x".to_string())
    );
    assert_eq!(lookup_string(&body, "paging.prev.before"), None);
}

#[test]
fn test_lookup_numbers_and_indexes() {
    let body = json!({"total": 42, "results": [{"id": 1}, {"id": 2}]});
    assert_eq!(lookup_string(&body, "total"), Some("42".to_string()));
    assert_eq!(lookup(&body, "results[0].id"), Some(&json!(1)));
    assert_eq!(lookup(&body, "results[-1].id"), Some(&json!(2)));
    assert_eq!(lookup(&body, "results[5].id"), None);
    // objects are not scalars
    assert_eq!(lookup_string(&body, "results"), None);
}

// ============================================================================
// CSV Tests
// ============================================================================

#[test]
fn test_parse_csv_line_quoted() {
    let fields = parse_csv_line(r#"1,"Smith, John","say ""hi""",,"#, ',');
    assert_eq!(fields, vec!["1", "Smith, John", r#"say "hi""#, "", ""]);
}

#[test]
fn test_read_rows_skips_blank_lines() {
    let rows = read_rows("a,b\r\n\n c,d\n", ',');
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], vec!["a", "b"]);
    assert_eq!(rows[1], vec![" c", "d"]);
}

#[test]
fn test_escape_field() {
    assert_eq!(escape_field("plain", ','), "plain");
    assert_eq!(escape_field("a,b", ','), "\"a,b\"");
    assert_eq!(escape_field("say \"x\"", ','), "\"say \"\"x\"\"\"");
    assert_eq!(escape_field("a,b", '\t'), "a,b");
}

#[test]
fn test_format_row_round_trips_through_parser() {
    let row = vec!["id", "Smith, John", "new\"line"];
    let line = format_row(&row, ',');
    assert_eq!(parse_csv_line(&line, ','), row);
}

#[test]
fn test_read_rows_keeps_multiline_quoted_field() {
    let rows = vec![
        vec!["id", "notes"],
        vec!["1", "first line\nsecond, with comma"],
        vec!["2", "plain"],
    ];
    let mut writer = CsvWriter::new(Vec::new());
    for row in &rows {
        writer.write_row(row.as_slice()).unwrap();
    }
    let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();

    assert_eq!(read_rows(&text, ','), rows);
}

#[test]
fn test_read_rows_multiline_crlf_and_blank_inside_quotes() {
    let rows = read_rows("a,\"x\r\n\r\ny\"\r\nb,c\r\n", ',');
    assert_eq!(rows, vec![vec!["a", "x\n\ny"], vec!["b", "c"]]);
}

#[test]
fn test_csv_writer() {
    let mut writer = CsvWriter::new(Vec::new());
    writer.write_row(&["contact_id", "source"]).unwrap();
    writer.write_row(&["1", "PAID_SEARCH"]).unwrap();
    assert_eq!(writer.rows_written(), 2);

    let bytes = writer.into_inner().unwrap();
    assert_eq!(
        String::from_utf8(bytes).unwrap(),
        "contact_id,source\n1,PAID_SEARCH\n"
    );
}
