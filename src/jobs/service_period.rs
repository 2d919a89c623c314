//! Months covered by an invoicing period
//!
//! Turns a start date and an end (or projected end) date, both epoch
//! milliseconds, into the list of calendar months they span.

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

const JOB: &str = "service-period";

/// Months of an invoicing period
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServicePeriod {
    /// `YYYY-MM` strings, first to last month inclusive
    pub months: Vec<String>,
    /// Whether the projected end date was used
    pub is_projected: bool,
}

impl ServicePeriod {
    /// Months joined with `;`
    pub fn months_joined(&self) -> String {
        self.months.join(";")
    }

    /// Number of months
    pub fn length(&self) -> usize {
        self.months.len()
    }

    /// `YES` or `NO`
    pub fn projected_flag(&self) -> &'static str {
        if self.is_projected {
            "YES"
        } else {
            "NO"
        }
    }

    /// Output fields as written back to the CRM
    pub fn output_fields(&self) -> serde_json::Value {
        serde_json::json!({
            "invoicing_period_months": self.months_joined(),
            "invoicing_period_length": self.length(),
            "is_projected": self.projected_flag(),
        })
    }
}

/// Compute the service period.
///
/// The actual end date wins over the projected one.
pub fn service_period(
    start_ms: Option<i64>,
    end_ms: Option<i64>,
    projected_end_ms: Option<i64>,
) -> Result<ServicePeriod> {
    let start = start_ms
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| Error::job(JOB, "Invalid invoicing period start date input."))?;

    let (end, is_projected) = match (end_ms, projected_end_ms) {
        (Some(end), _) => (DateTime::<Utc>::from_timestamp_millis(end), false),
        (None, Some(projected)) => (DateTime::<Utc>::from_timestamp_millis(projected), true),
        (None, None) => (None, false),
    };
    let end = end.ok_or_else(|| Error::job(JOB, "Invalid invoicing period end date input."))?;

    if start > end {
        return Err(Error::job(
            JOB,
            "Invoicing period start date is after the end date.",
        ));
    }

    Ok(ServicePeriod {
        months: month_range(start, end),
        is_projected,
    })
}

fn month_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<String> {
    let (mut year, mut month) = (start.year(), start.month());
    let last = (end.year(), end.month());
    let mut months = Vec::new();

    while (year, month) <= last {
        months.push(format!("{year:04}-{month:02}"));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    months
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // 2022-02-15, 2022-12-31 23:59:59, 2023-12-31 23:59:59
    const START: i64 = 1_644_883_200_000;
    const END: i64 = 1_672_531_199_000;
    const PROJECTED: i64 = 1_704_067_199_000;

    #[test]
    fn test_actual_end_date() {
        let period = service_period(Some(START), Some(END), Some(PROJECTED)).unwrap();
        assert_eq!(period.length(), 11);
        assert_eq!(period.months.first().map(String::as_str), Some("2022-02"));
        assert_eq!(period.months.last().map(String::as_str), Some("2022-12"));
        assert_eq!(period.projected_flag(), "NO");
    }

    #[test]
    fn test_projected_end_date() {
        let period = service_period(Some(START), None, Some(PROJECTED)).unwrap();
        assert!(period.is_projected);
        assert_eq!(period.length(), 23);
        assert_eq!(period.months.last().map(String::as_str), Some("2023-12"));
        assert_eq!(period.output_fields()["is_projected"], "YES");
    }

    #[test]
    fn test_single_month() {
        let period = service_period(Some(START), Some(START + 1000), None).unwrap();
        assert_eq!(period.months_joined(), "2022-02");
    }

    #[test]
    fn test_year_boundary() {
        // 2022-11-15 .. 2023-02-01
        let period = service_period(Some(1_668_470_400_000), Some(1_675_209_600_000), None).unwrap();
        assert_eq!(period.months_joined(), "2022-11;2022-12;2023-01;2023-02");
        assert_eq!(period.output_fields()["invoicing_period_length"], 4);
    }

    #[test]
    fn test_errors() {
        let missing_start = service_period(None, Some(END), None).unwrap_err();
        assert!(missing_start.to_string().contains("start date"));

        let missing_end = service_period(Some(START), None, None).unwrap_err();
        assert!(missing_end.to_string().contains("end date input"));

        let reversed = service_period(Some(END), Some(START), None).unwrap_err();
        assert!(reversed.to_string().contains("after the end date"));
    }
}
