use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Header names every batch file must provide
pub const REQUIRED_COLUMNS: [&str; 5] = [
    "turbine_id",
    "timestamp",
    "wind_speed",
    "wind_direction",
    "power_output",
];

/// Wind speed must lie strictly inside this range (m/s)
pub const WIND_SPEED_RANGE: (f64, f64) = (0.0, 25.0);

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// A row as it appears in a batch file, before validation
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TelemetryRow {
    pub turbine_id: i32,
    pub timestamp: String,
    pub wind_speed: f64,
    pub wind_direction: i32,
    pub power_output: f64,
}

/// A validated reading ready to be stored
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetryReading {
    pub turbine_id: i32,
    pub timestamp: DateTime<Utc>,
    pub wind_speed: f64,
    pub wind_direction: i32,
    pub power_output: f64,
}

impl TelemetryReading {
    /// Fixed plausibility filter applied before deduplication.
    pub fn passes_domain_filter(&self) -> bool {
        let (min_speed, max_speed) = WIND_SPEED_RANGE;
        self.wind_speed > min_speed
            && self.wind_speed < max_speed
            && (0..360).contains(&self.wind_direction)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowRejection {
    #[error("unparseable timestamp '{0}'")]
    Timestamp(String),

    #[error("power output is not a finite number")]
    NonFinitePower,

    #[error("{0}")]
    Malformed(String),
}

impl TryFrom<TelemetryRow> for TelemetryReading {
    type Error = RowRejection;

    fn try_from(row: TelemetryRow) -> Result<Self, Self::Error> {
        if !row.power_output.is_finite() {
            return Err(RowRejection::NonFinitePower);
        }
        Ok(Self {
            turbine_id: row.turbine_id,
            timestamp: parse_timestamp(&row.timestamp)?,
            wind_speed: row.wind_speed,
            wind_direction: row.wind_direction,
            power_output: row.power_output,
        })
    }
}

/// A row that was skipped, with its 1-based line in the source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub line: u64,
    pub reason: String,
}

impl RowError {
    pub fn new(line: u64, reason: impl ToString) -> Self {
        Self {
            line,
            reason: reason.to_string(),
        }
    }
}

/// Parses RFC 3339 or naive `YYYY-MM-DD[ T]HH:MM:SS[.fff]` timestamps; naive values are UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RowRejection> {
    let trimmed = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| RowRejection::Timestamp(trimmed.to_string()))
}

/// Outcome of validating one batch file
#[derive(Debug, Default)]
pub struct PreprocessedBatch {
    /// Accepted readings per turbine, ascending by timestamp, unique timestamps
    pub by_turbine: BTreeMap<i32, Vec<TelemetryReading>>,
    pub rejected: Vec<RowError>,
    /// Rows dropped by the domain filter
    pub filtered: usize,
}

impl PreprocessedBatch {
    pub fn accepted(&self) -> usize {
        self.by_turbine.values().map(Vec::len).sum()
    }
}

/// Validates rows, applies the domain filter and groups the survivors by turbine.
///
/// Later duplicates of a `(turbine, timestamp)` pair within the batch are dropped.
pub fn preprocess<I>(rows: I) -> PreprocessedBatch
where
    I: IntoIterator<Item = (u64, TelemetryRow)>,
{
    let mut batch = PreprocessedBatch::default();

    for (line, row) in rows {
        let reading = match TelemetryReading::try_from(row) {
            Ok(reading) => reading,
            Err(rejection) => {
                batch.rejected.push(RowError::new(line, rejection));
                continue;
            }
        };

        if !reading.passes_domain_filter() {
            batch.filtered += 1;
            continue;
        }

        batch
            .by_turbine
            .entry(reading.turbine_id)
            .or_default()
            .push(reading);
    }

    for readings in batch.by_turbine.values_mut() {
        // stable: the first occurrence of a timestamp survives dedup
        readings.sort_by_key(|r| r.timestamp);
        readings.dedup_by_key(|r| r.timestamp);
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn row(turbine_id: i32, timestamp: &str, speed: f64, direction: i32, power: f64) -> TelemetryRow {
        TelemetryRow {
            turbine_id,
            timestamp: timestamp.to_string(),
            wind_speed: speed,
            wind_direction: direction,
            power_output: power,
        }
    }

    #[test]
    fn filter_drops_out_of_range_speed_and_keeps_the_rest_unchanged() {
        let rows = vec![
            (2, row(1, "2023-01-01 00:00:00", 20.0, 180, 100.0)),
            (3, row(1, "2023-01-01 01:00:00", 30.0, 270, 200.0)),
            (4, row(1, "2023-01-01 02:00:00", 10.0, 90, 300.0)),
        ];

        let batch = preprocess(rows);

        assert_eq!(batch.filtered, 1);
        assert!(batch.rejected.is_empty());
        let kept = &batch.by_turbine[&1];
        assert_eq!(kept.len(), 2);
        assert_eq!((kept[0].wind_speed, kept[0].wind_direction), (20.0, 180));
        assert_eq!((kept[1].wind_speed, kept[1].wind_direction), (10.0, 90));
        assert_eq!(kept[0].power_output, 100.0);
        assert_eq!(kept[1].power_output, 300.0);
        assert_eq!(
            kept[0].timestamp,
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            kept[1].timestamp,
            Utc.with_ymd_and_hms(2023, 1, 1, 2, 0, 0).unwrap()
        );
    }

    #[rstest]
    #[case(0.0, 180, false)]
    #[case(25.0, 180, false)]
    #[case(24.9, 359, true)]
    #[case(0.1, 0, true)]
    #[case(12.0, 360, false)]
    #[case(12.0, -1, false)]
    fn domain_filter_bounds(#[case] speed: f64, #[case] direction: i32, #[case] kept: bool) {
        let reading = TelemetryReading::try_from(row(1, "2023-01-01 00:00:00", speed, direction, 1.0))
            .unwrap();
        assert_eq!(reading.passes_domain_filter(), kept);
    }

    #[rstest]
    #[case("2023-03-04 05:06:07")]
    #[case("2023-03-04T05:06:07")]
    #[case("2023-03-04T05:06:07Z")]
    #[case("2023-03-04T07:06:07+02:00")]
    #[case(" 2023-03-04 05:06:07 ")]
    fn timestamps_normalize_to_utc(#[case] raw: &str) {
        assert_eq!(
            parse_timestamp(raw).unwrap(),
            Utc.with_ymd_and_hms(2023, 3, 4, 5, 6, 7).unwrap()
        );
    }

    #[test]
    fn fractional_seconds_and_bare_dates_parse() {
        let parsed = parse_timestamp("2023-03-04 05:06:07.250").unwrap();
        assert_eq!(parsed.timestamp_subsec_millis(), 250);

        assert_eq!(
            parse_timestamp("2023-03-04").unwrap(),
            Utc.with_ymd_and_hms(2023, 3, 4, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn bad_rows_are_reported_with_their_line() {
        let rows = vec![
            (2, row(1, "yesterday", 10.0, 90, 100.0)),
            (3, row(1, "2023-01-01 00:00:00", 10.0, 90, f64::NAN)),
            (4, row(1, "2023-01-01 01:00:00", 10.0, 90, 100.0)),
        ];

        let batch = preprocess(rows);

        assert_eq!(batch.accepted(), 1);
        assert_eq!(batch.rejected.len(), 2);
        assert_eq!(batch.rejected[0].line, 2);
        assert!(batch.rejected[0].reason.contains("yesterday"));
        assert_eq!(batch.rejected[1].line, 3);
    }

    #[test]
    fn groups_sorts_and_dedups_per_turbine() {
        let rows = vec![
            (2, row(2, "2023-01-01 02:00:00", 10.0, 90, 1.0)),
            (3, row(1, "2023-01-01 01:00:00", 10.0, 90, 2.0)),
            (4, row(2, "2023-01-01 01:00:00", 10.0, 90, 3.0)),
            (5, row(2, "2023-01-01 02:00:00", 10.0, 90, 4.0)),
        ];

        let batch = preprocess(rows);

        assert_eq!(batch.by_turbine.len(), 2);
        let second = &batch.by_turbine[&2];
        assert_eq!(second.len(), 2);
        assert!(second[0].timestamp < second[1].timestamp);
        // first occurrence of the duplicated instant wins
        assert_eq!(second[1].power_output, 1.0);
    }
}
