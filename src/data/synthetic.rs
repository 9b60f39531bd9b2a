//! Seeded synthetic table for offline runs and demos.
//!
//! The series is `level + trend + weekly + yearly + noise`, with a single
//! trend slope change two thirds of the way through so the changepoint logic
//! has something to find. Output is deterministic for a given spec.

use chrono::{Datelike, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::data::{Query, StoreConnection, StoreConnector};
use crate::domain::{Frequency, RawResultSet, RawValue};
use crate::error::PipelineError;
use crate::forecast::timeline::step_date;

const LEVEL: f64 = 1_000.0;
const SLOPE_PER_DAY: f64 = 0.8;
const SLOPE_AFTER_BREAK: f64 = 1.6;
const WEEKLY_AMPLITUDE: f64 = 25.0;
const YEARLY_AMPLITUDE: f64 = 120.0;
const NOISE_SIGMA: f64 = 15.0;

#[derive(Debug, Clone, Copy)]
pub struct SyntheticSpec {
    pub rows: usize,
    pub frequency: Frequency,
    pub seed: u64,
}

pub struct SyntheticConnector {
    spec: SyntheticSpec,
}

impl SyntheticConnector {
    pub fn new(spec: SyntheticSpec) -> Self {
        Self { spec }
    }
}

impl StoreConnector for SyntheticConnector {
    fn describe(&self) -> String {
        format!(
            "synthetic {} rows ({}), seed {}",
            self.spec.rows,
            self.spec.frequency.unit_label(),
            self.spec.seed
        )
    }

    fn connect(&self) -> Result<Box<dyn StoreConnection>, PipelineError> {
        Ok(Box::new(SyntheticConnection { spec: self.spec }))
    }
}

struct SyntheticConnection {
    spec: SyntheticSpec,
}

impl StoreConnection for SyntheticConnection {
    fn execute(&mut self, query: &Query) -> Result<RawResultSet, PipelineError> {
        let rows = generate_rows(&self.spec)?
            .into_iter()
            .map(|(date, y)| vec![RawValue::Text(date.format("%Y-%m-%d").to_string()), RawValue::Number(y)])
            .collect();
        Ok(RawResultSet::new(
            vec![query.date_col.clone(), query.value_col.clone()],
            rows,
        ))
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Generate `(date, value)` pairs in ascending date order.
pub fn generate_rows(spec: &SyntheticSpec) -> Result<Vec<(NaiveDate, f64)>, PipelineError> {
    if spec.rows == 0 {
        return Err(PipelineError::Config("Synthetic row count must be > 0.".to_string()));
    }

    let mut rng = StdRng::seed_from_u64(spec.seed);
    let normal = Normal::new(0.0, NOISE_SIGMA)
        .map_err(|e| PipelineError::Config(format!("Noise distribution error: {e}")))?;

    let start = match spec.frequency {
        Frequency::Day => NaiveDate::from_ymd_opt(2022, 1, 1),
        Frequency::Month => NaiveDate::from_ymd_opt(2020, 1, 31),
    }
    .ok_or_else(|| PipelineError::Config("Invalid synthetic start date.".to_string()))?;

    let break_day = {
        let last = step_date(start, spec.frequency, spec.rows as u32 - 1)?;
        (last - start).num_days() as f64 * 2.0 / 3.0
    };

    let mut out = Vec::with_capacity(spec.rows);
    for i in 0..spec.rows {
        let date = step_date(start, spec.frequency, i as u32)?;
        let day = (date - start).num_days() as f64;

        let trend = SLOPE_PER_DAY * day + (SLOPE_AFTER_BREAK - SLOPE_PER_DAY) * (day - break_day).max(0.0);
        let yearly = YEARLY_AMPLITUDE * (2.0 * std::f64::consts::PI * date.ordinal() as f64 / 365.25).sin();
        let weekly = match spec.frequency {
            Frequency::Day => {
                WEEKLY_AMPLITUDE * (2.0 * std::f64::consts::PI * date.weekday().num_days_from_monday() as f64 / 7.0).cos()
            }
            Frequency::Month => 0.0,
        };
        let noise = normal.sample(&mut rng);

        out.push((date, LEVEL + trend + yearly + weekly + noise));
    }
    Ok(out)
}
