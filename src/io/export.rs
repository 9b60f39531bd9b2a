//! Forecast CSV export.
//!
//! Columns are `ds,yhat,yhat_lower,yhat_upper`, one row per historical and
//! future timestep, with a header row. Timestamps are written as plain dates
//! when every row falls on midnight, otherwise as `YYYY-MM-DD HH:MM:SS` with a fractional part when the
//! row has sub-second precision.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream
//! scripts; `read_forecast_csv` decodes it back.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use chrono::{NaiveDateTime, NaiveTime};

use crate::domain::{ForecastRow, RawValue};
use crate::error::PipelineError;
use crate::io::ingest::{parse_timestamp, parse_value};

pub const EXPORT_HEADER: [&str; 4] = ["ds", "yhat", "yhat_lower", "yhat_upper"];

/// Default file name offered for downloads.
pub const DEFAULT_EXPORT_NAME: &str = "forecast_results.csv";

/// Encode rows as CSV into any writer.
pub fn write_forecast<W: Write>(writer: W, rows: &[ForecastRow]) -> Result<(), PipelineError> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(EXPORT_HEADER)
        .map_err(|e| PipelineError::Export(format!("Failed to write export header: {e}")))?;

    let date_only = rows.iter().all(|r| r.ds.time() == NaiveTime::MIN);
    for r in rows {
        out.write_record([
            fmt_ds(r.ds, date_only),
            r.yhat.to_string(),
            r.yhat_lower.to_string(),
            r.yhat_upper.to_string(),
        ])
        .map_err(|e| PipelineError::Export(format!("Failed to write export row: {e}")))?;
    }

    out.flush()
        .map_err(|e| PipelineError::Export(format!("Failed to flush export: {e}")))?;
    Ok(())
}

/// Encode rows as UTF-8 CSV bytes.
pub fn encode_forecast_csv(rows: &[ForecastRow]) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vec::new();
    write_forecast(&mut buf, rows)?;
    Ok(buf)
}

/// Write rows to a CSV file.
pub fn write_forecast_csv(path: &Path, rows: &[ForecastRow]) -> Result<(), PipelineError> {
    let file = File::create(path).map_err(|e| {
        PipelineError::Export(format!("Failed to create export CSV '{}': {e}", path.display()))
    })?;
    write_forecast(file, rows)
}

/// Decode an export produced by `write_forecast`.
pub fn read_forecast<R: Read>(reader: R) -> Result<Vec<ForecastRow>, PipelineError> {
    let mut input = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = input
        .headers()
        .map_err(|e| PipelineError::Export(format!("Failed to read export header: {e}")))?;
    if headers.iter().ne(EXPORT_HEADER) {
        return Err(PipelineError::Export(format!(
            "Unexpected export header {:?}; expected {:?}.",
            headers.iter().collect::<Vec<_>>(),
            EXPORT_HEADER
        )));
    }

    let mut rows = Vec::new();
    for (idx, record) in input.records().enumerate() {
        let line = idx + 2;
        let record = record.map_err(|e| PipelineError::Export(format!("Export line {line}: {e}")))?;
        let cell = |i: usize| RawValue::text(record.get(i).unwrap_or_default());
        let bad = |e: String| PipelineError::Export(format!("Export line {line}: {e}"));

        rows.push(ForecastRow {
            ds: parse_timestamp(&cell(0)).map_err(bad)?,
            yhat: parse_value(&cell(1)).map_err(bad)?,
            yhat_lower: parse_value(&cell(2)).map_err(bad)?,
            yhat_upper: parse_value(&cell(3)).map_err(bad)?,
        });
    }
    Ok(rows)
}

pub fn decode_forecast_csv(bytes: &[u8]) -> Result<Vec<ForecastRow>, PipelineError> {
    read_forecast(bytes)
}

fn fmt_ds(ds: NaiveDateTime, date_only: bool) -> String {
    if date_only {
        ds.format("%Y-%m-%d").to_string()
    } else {
        // `%.f` prints nothing for whole seconds.
        ds.format("%Y-%m-%d %H:%M:%S%.f").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(day: u32, hour: u32, yhat: f64) -> ForecastRow {
        ForecastRow {
            ds: NaiveDate::from_ymd_opt(2023, 3, day).unwrap().and_hms_opt(hour, 0, 0).unwrap(),
            yhat,
            yhat_lower: yhat - 1.5,
            yhat_upper: yhat + 1.5,
        }
    }

    #[test]
    fn header_and_date_only_timestamps() {
        let bytes = encode_forecast_csv(&[row(1, 0, 10.0), row(2, 0, 11.25)]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("ds,yhat,yhat_lower,yhat_upper"));
        assert_eq!(lines.next(), Some("2023-03-01,10,8.5,11.5"));
        assert_eq!(lines.next(), Some("2023-03-02,11.25,9.75,12.75"));
    }

    #[test]
    fn decode_reproduces_count_and_order() {
        let rows = vec![row(3, 0, 1.0), row(1, 6, 2.0), row(2, 0, -3.5)];
        let decoded = decode_forecast_csv(&encode_forecast_csv(&rows).unwrap()).unwrap();
        assert_eq!(decoded.len(), rows.len());
        let ds: Vec<_> = decoded.iter().map(|r| r.ds).collect();
        assert_eq!(ds, rows.iter().map(|r| r.ds).collect::<Vec<_>>());
    }

    #[test]
    fn file_export_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_EXPORT_NAME);
        let rows = vec![row(1, 0, 100.0), row(2, 0, 101.0)];
        write_forecast_csv(&path, &rows).unwrap();
        let decoded = read_forecast(File::open(&path).unwrap()).unwrap();
        assert_eq!(decoded, rows);
    }

    #[test]
    fn sub_second_timestamps_survive_export() {
        let base = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        let rows = vec![
            ForecastRow { ds: base.and_hms_milli_opt(9, 30, 0, 250).unwrap(), ..row(1, 0, 1.0) },
            ForecastRow { ds: base.and_hms_opt(9, 30, 1).unwrap(), ..row(1, 0, 2.0) },
        ];
        let bytes = encode_forecast_csv(&rows).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("2023-03-01 09:30:00.250,"));
        assert!(text.contains("2023-03-01 09:30:01,"));

        let decoded = decode_forecast_csv(&bytes).unwrap();
        assert_eq!(decoded, rows);
    }

    #[test]
    fn wrong_header_is_rejected() {
        let err = decode_forecast_csv(b"date,value\n2023-01-01,1\n").unwrap_err();
        assert!(matches!(err, PipelineError::Export(_)));
    }
}
