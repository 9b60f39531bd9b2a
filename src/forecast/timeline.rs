//! Future timestamp generation.
//!
//! - daily: `last + k days` (time of day preserved)
//! - monthly: the k-th calendar month end strictly after `last`

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime};

use crate::domain::{Frequency, Horizon};
use crate::error::PipelineError;

/// Last day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?;
    first.checked_add_months(Months::new(1))?.pred_opt()
}

/// `start` advanced by `k` steps; monthly steps land on month ends.
pub fn step_date(start: NaiveDate, frequency: Frequency, k: u32) -> Result<NaiveDate, PipelineError> {
    let out = match frequency {
        Frequency::Day => start.checked_add_signed(Duration::days(k as i64)),
        Frequency::Month => NaiveDate::from_ymd_opt(start.year(), start.month(), 1)
            .and_then(|first| first.checked_add_months(Months::new(k)))
            .and_then(month_end),
    };
    out.ok_or_else(|| PipelineError::Forecast(format!("Date overflow stepping {k} {} from {start}.", frequency.unit_label())))
}

/// `horizon` timestamps after `last`.
pub fn future_timestamps(
    last: NaiveDateTime,
    frequency: Frequency,
    horizon: Horizon,
) -> Result<Vec<NaiveDateTime>, PipelineError> {
    let steps = horizon.steps();
    let mut out = Vec::with_capacity(steps as usize);

    match frequency {
        Frequency::Day => {
            for k in 1..=steps {
                let ts = last.checked_add_signed(Duration::days(k as i64)).ok_or_else(|| {
                    PipelineError::Forecast(format!("Date overflow extending {last} by {k} days."))
                })?;
                out.push(ts);
            }
        }
        Frequency::Month => {
            let midnight = NaiveTime::MIN;
            let this_end = month_end(last.date())
                .ok_or_else(|| PipelineError::Forecast(format!("No month end for {last}.")))?;
            // The first month end strictly after `last`.
            let first = if this_end.and_time(midnight) > last {
                this_end
            } else {
                step_date(this_end, Frequency::Month, 1)?
            };
            for k in 0..steps {
                out.push(step_date(first, Frequency::Month, k)?.and_time(midnight));
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HorizonRange;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn month_end_handles_leap_years() {
        assert_eq!(month_end(d(2024, 2, 10)).unwrap(), d(2024, 2, 29));
        assert_eq!(month_end(d(2023, 2, 10)).unwrap(), d(2023, 2, 28));
        assert_eq!(month_end(d(2023, 12, 31)).unwrap(), d(2023, 12, 31));
    }

    #[test]
    fn daily_steps_follow_last_timestamp() {
        let last = d(2023, 12, 30).and_hms_opt(6, 0, 0).unwrap();
        let h = Horizon::new(30, HorizonRange::DAILY).unwrap();
        let ts = future_timestamps(last, Frequency::Day, h).unwrap();
        assert_eq!(ts.len(), 30);
        assert_eq!(ts[0], d(2023, 12, 31).and_hms_opt(6, 0, 0).unwrap());
        assert_eq!(ts[2], d(2024, 1, 2).and_hms_opt(6, 0, 0).unwrap());
    }

    #[test]
    fn monthly_steps_are_month_ends_after_last() {
        let h = Horizon::default_for(HorizonRange::MONTHLY);

        let mid_month = d(2023, 1, 15).and_hms_opt(0, 0, 0).unwrap();
        let ts = future_timestamps(mid_month, Frequency::Month, h).unwrap();
        assert_eq!(ts.len(), 32);
        assert_eq!(ts[0].date(), d(2023, 1, 31));
        assert_eq!(ts[1].date(), d(2023, 2, 28));

        let on_month_end = d(2023, 1, 31).and_hms_opt(0, 0, 0).unwrap();
        let ts = future_timestamps(on_month_end, Frequency::Month, h).unwrap();
        assert_eq!(ts[0].date(), d(2023, 2, 28));
        assert_eq!(ts[31].date(), d(2025, 9, 30));
    }
}
