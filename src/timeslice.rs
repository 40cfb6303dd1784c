//! Time slices and calendar dates
//!
//! Time coordinates are parsed with the primary datetime format first and
//! the date-only fallback second. Anything else is a hard `DateParse` error.
//!
//! A primary format that mixes a 24-hour `%H` with an AM/PM `%p` is read the
//! way `strptime` reads it: the hour is taken as written and the AM/PM marker
//! is ignored, so `12:00:00 AM` and `01:00:00 PM` both parse.

use crate::engine::DimensionValue;
use crate::errors::{ExtractError, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// Calendar date of one time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SliceDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl SliceDate {
    /// Parse a raw time coordinate.
    pub fn parse(raw: &str, primary: &str, fallback: &str) -> Result<Self> {
        let raw = raw.trim();
        let date = NaiveDateTime::parse_from_str(raw, primary)
            .or_else(|e| match without_meridiem(raw, primary) {
                Some((raw, format)) => NaiveDateTime::parse_from_str(&raw, &format),
                None => Err(e),
            })
            .map(|dt| dt.date())
            .or_else(|_| NaiveDate::parse_from_str(raw, fallback))
            .map_err(|_| ExtractError::DateParse {
                value: raw.to_string(),
            })?;
        Ok(Self::from(date))
    }

    /// `M/D/YYYY` without zero padding, as written to the `thedate` column.
    pub fn justdate(&self) -> String {
        format!("{}/{}/{}", self.month, self.day, self.year)
    }
}

/// Drop `%p` from a `%H` format and the AM/PM word from `raw`.
///
/// chrono rejects an hour that disagrees with the marker, `strptime` ignores
/// the marker when the hour is 24-hour.
fn without_meridiem(raw: &str, format: &str) -> Option<(String, String)> {
    if !format.contains("%H") || !format.contains("%p") {
        return None;
    }
    let format = format
        .split_whitespace()
        .filter(|item| *item != "%p")
        .collect::<Vec<_>>()
        .join(" ");
    let raw = raw
        .split_whitespace()
        .filter(|word| !word.eq_ignore_ascii_case("AM") && !word.eq_ignore_ascii_case("PM"))
        .collect::<Vec<_>>()
        .join(" ");
    Some((raw, format))
}

impl From<NaiveDate> for SliceDate {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }
}

/// One step along the time dimension of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSlice {
    pub index: usize,
    pub raw: DimensionValue,
    pub date: SliceDate,
}

impl TimeSlice {
    pub fn new(index: usize, raw: DimensionValue, primary: &str, fallback: &str) -> Result<Self> {
        let date = SliceDate::parse(&raw.to_string(), primary, fallback)?;
        Ok(Self { index, raw, date })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIMARY: &str = "%m/%d/%Y %H:%M:%S %p";
    const FALLBACK: &str = "%m/%d/%Y";

    #[test]
    fn primary_format_parses() {
        let d = SliceDate::parse("01/02/2020 00:00:00 AM", PRIMARY, FALLBACK).unwrap();
        assert_eq!(d, SliceDate { year: 2020, month: 1, day: 2 });
        assert_eq!(d.justdate(), "1/2/2020");
    }

    #[test]
    fn fallback_format_parses() {
        let d = SliceDate::parse("12/31/1999", PRIMARY, FALLBACK).unwrap();
        assert_eq!(d.justdate(), "12/31/1999");
    }

    #[test]
    fn meridiem_is_ignored_with_24_hour_clock() {
        for raw in [
            "01/01/2020 12:00:00 AM",
            "1/1/2020 12:00:00 AM",
            "01/01/2020 01:00:00 PM",
            "01/01/2020 13:30:00 AM",
        ] {
            let d = SliceDate::parse(raw, PRIMARY, FALLBACK).unwrap();
            assert_eq!(d.justdate(), "1/1/2020", "{raw}");
        }
    }

    #[test]
    fn twelve_hour_format_is_left_alone() {
        let d = SliceDate::parse("03/04/2021 12:15:00 AM", "%m/%d/%Y %I:%M:%S %p", FALLBACK).unwrap();
        assert_eq!(d.justdate(), "3/4/2021");
        assert!(without_meridiem("03/04/2021 12:15:00 AM", "%m/%d/%Y %I:%M:%S %p").is_none());
    }

    #[test]
    fn unknown_format_fails_hard() {
        let err = SliceDate::parse("2020-01-01", PRIMARY, FALLBACK).unwrap_err();
        assert!(matches!(err, ExtractError::DateParse { value } if value == "2020-01-01"));
    }

    #[test]
    fn numeric_time_values_are_not_dates() {
        let err = TimeSlice::new(0, DimensionValue::Number(43830.0), PRIMARY, FALLBACK);
        assert!(err.is_err());
    }
}
