//! Parsing values found in CSV cells.

use chrono::{NaiveDate, NaiveDateTime};

use crate::common::*;

/// Parse a value found in a CSV cell. This is analogous to Rust's built-in
/// [`std::str::FromStr`] trait, but it follows the rules of the trip-record
/// files we load.
pub(crate) trait FromCsvCell: Sized {
    /// Given the contents of a CSV cell, parse it as a value and return it.
    ///
    /// This function is not responsible for translating `""` to an SQL `NULL`
    /// value. That should be handled before calling this, if desired.
    fn from_csv_cell(cell: &str) -> Result<Self>;
}

/// Date-time layouts we accept, tried in order. `%.f` also matches a missing
/// fractional part.
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    // Older TLC exports.
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

impl FromCsvCell for NaiveDateTime {
    fn from_csv_cell(cell: &str) -> Result<Self> {
        let cell = cell.trim();
        for format in DATE_TIME_FORMATS {
            if let Ok(timestamp) = NaiveDateTime::parse_from_str(cell, format) {
                return Ok(timestamp);
            }
        }
        // A bare date means midnight.
        if let Ok(date) = NaiveDate::parse_from_str(cell, "%Y-%m-%d") {
            if let Some(timestamp) = date.and_hms_opt(0, 0, 0) {
                return Ok(timestamp);
            }
        }
        Err(format_err!("cannot parse timestamp {:?}", cell))
    }
}

#[test]
fn parse_timestamps() {
    let date = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
    let examples = &[
        ("2021-01-01 00:30:10", date.and_hms_opt(0, 30, 10).unwrap()),
        ("2021-01-01T00:30:10", date.and_hms_opt(0, 30, 10).unwrap()),
        (
            "2021-01-01 00:30:10.25",
            date.and_hms_milli_opt(0, 30, 10, 250).unwrap(),
        ),
        ("2021-01-01 00:30", date.and_hms_opt(0, 30, 0).unwrap()),
        ("  2021-01-01 00:30:10 ", date.and_hms_opt(0, 30, 10).unwrap()),
        ("01/01/2021 12:30:10 AM", date.and_hms_opt(0, 30, 10).unwrap()),
        ("01/01/2021 01:30:10 PM", date.and_hms_opt(13, 30, 10).unwrap()),
        ("01/01/2021 13:30:10", date.and_hms_opt(13, 30, 10).unwrap()),
        ("2021-01-01", date.and_hms_opt(0, 0, 0).unwrap()),
    ];
    for (s, expected) in examples {
        let parsed = NaiveDateTime::from_csv_cell(s).unwrap();
        assert_eq!(parsed, *expected, "parsing {:?}", s);
    }
}

#[test]
fn reject_malformed_timestamps() {
    for s in &["", "yesterday", "2021-13-01 00:00:00", "2021-01-01 25:00:00", "1609459200"] {
        assert!(NaiveDateTime::from_csv_cell(s).is_err(), "parsing {:?}", s);
    }
}
