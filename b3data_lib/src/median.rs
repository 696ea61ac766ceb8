//! Quarterly median prices from a daily series.
//!
//! Pure functions only. Fetching belongs to the price provider and row
//! synthesis to the augmenter.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use crate::types::{DailySeries, QuarterPrice};

/// Calendar quarter (1-4) of a date.
pub fn quarter_of(date: NaiveDate) -> u32 {
    (date.month() - 1) / 3 + 1
}

/// Last calendar day of the quarter `quarter` of `year`.
pub fn quarter_end_date(year: i32, quarter: u32) -> Option<NaiveDate> {
    if !(1..=4).contains(&quarter) {
        return None;
    }
    if quarter == 4 {
        return NaiveDate::from_ymd_opt(year, 12, 31);
    }
    NaiveDate::from_ymd_opt(year, quarter * 3 + 1, 1)?.pred_opt()
}

/// Statistical median; the mean of the two middle values for even counts.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Collapses a daily series into one median per calendar quarter.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceMedianizer;

impl PriceMedianizer {
    /// Returns one [`QuarterPrice`] per quarter that has at least one usable
    /// value, ascending by quarter end. Timestamps are read as wall-clock
    /// dates in their own offset.
    pub fn medianize(&self, series: &DailySeries) -> Vec<QuarterPrice> {
        let mut quarters: BTreeMap<(i32, u32), Vec<f64>> = BTreeMap::new();
        for bar in &series.bars {
            let date = bar.timestamp.naive_local().date();
            let key = (date.year(), quarter_of(date));
            let bucket = quarters.entry(key).or_default();
            if let Some(value) = bar.value() {
                bucket.push(value);
            }
        }

        quarters
            .into_iter()
            .filter_map(|((year, quarter), mut values)| {
                Some(QuarterPrice {
                    quarter_end_date: quarter_end_date(year, quarter)?,
                    median: median(&mut values)?,
                })
            })
            .collect()
    }
}
