//! Result-set ingest and normalization.
//!
//! This module is responsible for turning a raw store result set into a
//! `CanonicalSeries` that is safe to hand to the forecaster.
//!
//! Design goals:
//! - **Strict schema** for the two required fields (clear errors listing what was found)
//! - **Row-level validation** (drop bad rows, but report what happened)
//! - **Order preserving**: no sorting, deduplication, gap filling or resampling
//! - **Separation of concerns**: no fitting logic here

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::data::Query;
use crate::domain::{CanonicalSeries, Observation, RawResultSet, RawValue};
use crate::error::PipelineError;

/// Column names the normalizer looks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    pub ds: String,
    pub y: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            ds: "ds".to_string(),
            y: "y".to_string(),
        }
    }
}

impl From<&Query> for ColumnNames {
    fn from(query: &Query) -> Self {
        Self {
            ds: query.date_col.clone(),
            y: query.value_col.clone(),
        }
    }
}

/// A dropped row and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIssue {
    /// 1-based row number within the result set.
    pub row: usize,
    pub message: String,
}

/// What normalization did to the result set.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeReport {
    /// Result-set column names actually used.
    pub ds_column: String,
    pub y_column: String,
    pub rows_read: usize,
    pub rows_used: usize,
    pub row_issues: Vec<RowIssue>,
}

impl NormalizeReport {
    pub fn rows_dropped(&self) -> usize {
        self.rows_read - self.rows_used
    }
}

/// Normalizer output: the canonical series plus its report.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub series: CanonicalSeries,
    pub report: NormalizeReport,
}

/// Validate and coerce a raw result set into a canonical series.
pub fn normalize(raw: &RawResultSet, expected: &ColumnNames) -> Result<Normalized, PipelineError> {
    let (ds_idx, y_idx) = identify_columns(&raw.columns, expected)?;

    let mut points = Vec::with_capacity(raw.len());
    let mut row_issues = Vec::new();

    for (idx, record) in raw.rows.iter().enumerate() {
        let row = idx + 1;
        let ds_cell = record.get(ds_idx).unwrap_or(&RawValue::Null);
        let y_cell = record.get(y_idx).unwrap_or(&RawValue::Null);

        let parsed = parse_timestamp(ds_cell).and_then(|ds| parse_value(y_cell).map(|y| Observation { ds, y }));
        match parsed {
            Ok(obs) => points.push(obs),
            Err(message) => {
                debug!(row, %message, "dropping row");
                row_issues.push(RowIssue { row, message });
            }
        }
    }

    let rows_used = points.len();
    let series = CanonicalSeries::new(points, raw.len())?;

    let report = NormalizeReport {
        ds_column: raw.columns[ds_idx].clone(),
        y_column: raw.columns[y_idx].clone(),
        rows_read: raw.len(),
        rows_used,
        row_issues,
    };
    debug!(
        rows_read = report.rows_read,
        rows_used = report.rows_used,
        dropped = report.rows_dropped(),
        "normalized result set"
    );

    Ok(Normalized { series, report })
}

/// Locate the `ds` and `y` columns.
///
/// Exact names win; otherwise names are compared after trimming whitespace,
/// stripping a BOM, and lower-casing. If several columns match, the first one
/// is used.
pub fn identify_columns(columns: &[String], expected: &ColumnNames) -> Result<(usize, usize), PipelineError> {
    let ds = find_column(columns, &expected.ds);
    let y = find_column(columns, &expected.y);

    match (ds, y) {
        (Some(ds), Some(y)) if ds != y => Ok((ds, y)),
        _ => Err(PipelineError::Schema {
            expected: vec![expected.ds.clone(), expected.y.clone()],
            found: columns.to_vec(),
        }),
    }
}

fn find_column(columns: &[String], name: &str) -> Option<usize> {
    if let Some(idx) = columns.iter().position(|c| c == name) {
        return Some(idx);
    }
    let wanted = normalize_header_name(name);
    columns.iter().position(|c| normalize_header_name(c) == wanted)
}

fn normalize_header_name(name: &str) -> String {
    // Excel and other tools sometimes emit UTF-8 CSVs with a BOM prefix on the
    // first header. If we don't strip it, schema validation will incorrectly
    // report missing columns.
    let name = name.trim().trim_start_matches('\u{feff}').trim();
    name.to_lowercase()
}

/// Parse a date-like cell.
///
/// Text accepts ISO dates and date-times (with `T` or a space, optional
/// fractional seconds, optional offset which is converted to UTC) plus a few
/// common day-first and slash forms. Numbers are read as Unix epoch seconds.
pub fn parse_timestamp(cell: &RawValue) -> Result<NaiveDateTime, String> {
    match cell {
        RawValue::Null => Err("Missing date value.".to_string()),
        RawValue::Number(v) => {
            if !v.is_finite() {
                return Err(format!("Invalid epoch timestamp {v}."));
            }
            // Floor so negative fractions count back from the earlier second.
            let mut secs = v.floor() as i64;
            let mut nanos = ((v - v.floor()) * 1e9).round() as u32;
            if nanos >= 1_000_000_000 {
                secs += 1;
                nanos = 0;
            }
            DateTime::from_timestamp(secs, nanos)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| format!("Epoch timestamp {v} is out of range."))
        }
        RawValue::Text(s) => parse_timestamp_str(s.trim()),
    }
}

fn parse_timestamp_str(s: &str) -> Result<NaiveDateTime, String> {
    if s.is_empty() {
        return Err("Missing date value.".to_string());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    const OFFSET_FMTS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];
    for fmt in OFFSET_FMTS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(dt.naive_utc());
        }
    }

    const DATETIME_FMTS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in DATETIME_FMTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }

    const DATE_FMTS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y"];
    for fmt in DATE_FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d.and_time(chrono::NaiveTime::MIN));
        }
    }

    Err(format!("Invalid date '{s}'."))
}

/// Parse a numeric cell into a finite `f64`.
pub fn parse_value(cell: &RawValue) -> Result<f64, String> {
    let v = match cell {
        RawValue::Null => return Err("Missing value.".to_string()),
        RawValue::Number(v) => *v,
        RawValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed == "." {
                return Err("Missing value.".to_string());
            }
            trimmed
                .parse::<f64>()
                .map_err(|_| format!("Invalid numeric value '{trimmed}'."))?
        }
    };
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("Non-finite value {v}."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(columns: &[&str], rows: Vec<(RawValue, RawValue)>) -> RawResultSet {
        RawResultSet::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.into_iter().map(|(a, b)| vec![a, b]).collect(),
        )
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn values(n: &Normalized) -> Vec<(NaiveDateTime, f64)> {
        n.series.points().iter().map(|p| (p.ds, p.y)).collect()
    }

    #[test]
    fn valid_rows_keep_length_and_order() {
        // Deliberately unsorted: the normalizer must not re-sort.
        let set = raw(
            &["ds", "y"],
            vec![
                ("2023-01-03".into(), 3.0.into()),
                ("2023-01-01".into(), "1".into()),
                ("2023-01-02".into(), 2i64.into()),
                ("2023-01-02".into(), "2.5".into()),
            ],
        );
        let out = normalize(&set, &ColumnNames::default()).unwrap();
        assert_eq!(out.series.len(), 4);
        assert_eq!(
            values(&out),
            vec![
                (date(2023, 1, 3), 3.0),
                (date(2023, 1, 1), 1.0),
                (date(2023, 1, 2), 2.0),
                (date(2023, 1, 2), 2.5),
            ]
        );
        assert!(out.report.row_issues.is_empty());
    }

    #[test]
    fn scenario_a_drops_bad_value() {
        let set = raw(
            &["ds", "y"],
            vec![
                ("2023-01-01".into(), 10i64.into()),
                ("2023-01-02".into(), "bad".into()),
                ("2023-01-03".into(), 12i64.into()),
            ],
        );
        let out = normalize(&set, &ColumnNames::default()).unwrap();
        assert_eq!(values(&out), vec![(date(2023, 1, 1), 10.0), (date(2023, 1, 3), 12.0)]);
        assert_eq!(out.report.rows_dropped(), 1);
        assert_eq!(out.report.row_issues[0].row, 2);
    }

    #[test]
    fn scenario_b_drops_bad_date() {
        let set = raw(
            &["ds", "y"],
            vec![("not-a-date".into(), 5i64.into()), ("2023-02-01".into(), 6i64.into())],
        );
        let out = normalize(&set, &ColumnNames::default()).unwrap();
        assert_eq!(values(&out), vec![(date(2023, 2, 1), 6.0)]);
    }

    #[test]
    fn all_invalid_rows_is_empty_series_error() {
        let set = raw(
            &["ds", "y"],
            vec![("2023-01-01".into(), "N/A".into()), ("2023-01-02".into(), "N/A".into())],
        );
        let err = normalize(&set, &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptySeries { rows_read: 2 }));
    }

    #[test]
    fn empty_result_set_is_empty_series_error() {
        let set = raw(&["ds", "y"], Vec::new());
        let err = normalize(&set, &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptySeries { rows_read: 0 }));
    }

    #[test]
    fn column_matching_ignores_case_and_whitespace() {
        let rows = vec![("2023-01-01".into(), 1.0.into()), ("2023-01-02".into(), "x".into())];
        let plain = normalize(&raw(&["ds", "y"], rows.clone()), &ColumnNames::default()).unwrap();
        let fuzzy = normalize(&raw(&[" DS ", "Y"], rows), &ColumnNames::default()).unwrap();
        assert_eq!(plain.series, fuzzy.series);
        assert_eq!(fuzzy.report.ds_column, " DS ");
    }

    #[test]
    fn bom_prefixed_header_is_accepted() {
        let set = raw(&["\u{feff}ds", "y"], vec![("2023-01-01".into(), 1.0.into())]);
        assert!(normalize(&set, &ColumnNames::default()).is_ok());
    }

    #[test]
    fn exact_name_wins_over_normalized_match() {
        let columns: Vec<String> = ["DS", "ds", "y"].iter().map(|s| s.to_string()).collect();
        assert_eq!(identify_columns(&columns, &ColumnNames::default()).unwrap(), (1, 2));
    }

    #[test]
    fn missing_column_reports_found_fields() {
        let set = raw(&["date", "amount"], vec![("2023-01-01".into(), 1.0.into())]);
        match normalize(&set, &ColumnNames::default()).unwrap_err() {
            PipelineError::Schema { expected, found } => {
                assert_eq!(expected, vec!["ds", "y"]);
                assert_eq!(found, vec!["date", "amount"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn short_rows_are_dropped_not_fatal() {
        let set = RawResultSet::new(
            vec!["ds".to_string(), "y".to_string()],
            vec![vec![RawValue::text("2023-01-01")], vec![RawValue::text("2023-01-02"), RawValue::text("4")]],
        );
        let out = normalize(&set, &ColumnNames::default()).unwrap();
        assert_eq!(out.series.len(), 1);
    }

    #[test]
    fn timestamp_formats() {
        let expect = date(2023, 1, 5).date().and_hms_opt(13, 30, 0).unwrap();
        for s in [
            "2023-01-05T13:30:00",
            "2023-01-05 13:30:00",
            "2023-01-05 13:30",
            "2023-01-05T13:30:00Z",
            "2023-01-05T15:30:00+02:00",
            "2023-01-05 13:30:00.000",
        ] {
            assert_eq!(parse_timestamp(&RawValue::text(s)).unwrap(), expect, "{s}");
        }
        for s in ["2023-01-05", "2023/01/05", "05/01/2023", "05-01-2023"] {
            assert_eq!(parse_timestamp(&RawValue::text(s)).unwrap(), date(2023, 1, 5), "{s}");
        }
        assert_eq!(parse_timestamp(&RawValue::Number(1_672_531_200.0)).unwrap(), date(2023, 1, 1));
        assert!(parse_timestamp(&RawValue::text("2023-02-30")).is_err());
        assert!(parse_timestamp(&RawValue::Null).is_err());
    }

    #[test]
    fn negative_fractional_epoch_counts_back() {
        let epoch = date(1970, 1, 1);
        assert_eq!(
            parse_timestamp(&RawValue::Number(-1.5)).unwrap(),
            epoch - chrono::Duration::milliseconds(1_500)
        );
        assert_eq!(
            parse_timestamp(&RawValue::Number(1.25)).unwrap(),
            epoch + chrono::Duration::milliseconds(1_250)
        );
        assert_eq!(parse_timestamp(&RawValue::Number(-86_400.0)).unwrap(), date(1969, 12, 31));
    }

    #[test]
    fn value_parsing_rejects_non_finite_and_blank() {
        assert_eq!(parse_value(&RawValue::text(" 12.5 ")).unwrap(), 12.5);
        assert_eq!(parse_value(&RawValue::text("-3e2")).unwrap(), -300.0);
        for bad in ["", ".", "NaN", "inf", "N/A", "1,000"] {
            assert!(parse_value(&RawValue::text(bad)).is_err(), "{bad}");
        }
        assert!(parse_value(&RawValue::Number(f64::NAN)).is_err());
        assert!(parse_value(&RawValue::Null).is_err());
    }
}
