/// Time series container and temporal resampling.
///
/// A `TimeSeries` is a sorted sequence of (timestamp, value) samples with
/// NaN marking missing values. Resampling aggregates samples into target
/// periods (hour, day, month, year); a period with fewer valid samples
/// than the configured `min_num_obs` is marked invalid (NaN) rather than
/// averaged, and resampling never upsamples.
///
/// # Clock injection
/// Nothing in this module reads the wall clock; timestamps always flow in
/// as data, which keeps resampling purely deterministic in tests.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{ResampleHow, TsType};

// ---------------------------------------------------------------------------
// Period arithmetic
// ---------------------------------------------------------------------------

fn utc_date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .expect("valid calendar date components")
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}

/// Start of the period containing `t` at the given frequency.
pub fn period_start(t: DateTime<Utc>, freq: TsType) -> DateTime<Utc> {
    match freq {
        TsType::Hourly => {
            let secs = t.timestamp();
            DateTime::from_timestamp(secs - secs.rem_euclid(3600), 0)
                .expect("hour-truncated timestamp is in range")
        }
        TsType::Daily => utc_date(t.year(), t.month(), t.day()),
        TsType::Monthly => utc_date(t.year(), t.month(), 1),
        TsType::Yearly => utc_date(t.year(), 1, 1),
    }
}

/// All period-start timestamps covering the closed year range
/// `[start_year, stop_year]` at the given frequency, ascending.
pub fn period_range(start_year: i32, stop_year: i32, freq: TsType) -> Vec<DateTime<Utc>> {
    let mut out = Vec::new();
    match freq {
        TsType::Yearly => {
            for y in start_year..=stop_year {
                out.push(utc_date(y, 1, 1));
            }
        }
        TsType::Monthly => {
            for y in start_year..=stop_year {
                for m in 1..=12 {
                    out.push(utc_date(y, m, 1));
                }
            }
        }
        TsType::Daily => {
            let mut t = utc_date(start_year, 1, 1);
            let end = utc_date(stop_year + 1, 1, 1);
            while t < end {
                out.push(t);
                t += Duration::days(1);
            }
        }
        TsType::Hourly => {
            let mut t = utc_date(start_year, 1, 1);
            let end = utc_date(stop_year + 1, 1, 1);
            while t < end {
                out.push(t);
                t += Duration::hours(1);
            }
        }
    }
    out
}

/// Aggregate a set of valid (non-NaN) values. Returns NaN for an empty
/// slice.
pub fn aggregate(values: &[f64], how: ResampleHow) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    match how {
        ResampleHow::Mean => values.iter().sum::<f64>() / values.len() as f64,
        ResampleHow::Median => {
            let mut sorted = values.to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).expect("no NaN in valid values"));
            let n = sorted.len();
            if n % 2 == 1 {
                sorted[n / 2]
            } else {
                (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TimeSeries
// ---------------------------------------------------------------------------

/// Sorted (timestamp, value) samples; NaN values mark missing data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    times: Vec<DateTime<Utc>>,
    values: Vec<f64>,
}

impl TimeSeries {
    pub fn new() -> Self {
        TimeSeries::default()
    }

    /// Build from unordered pairs; sorts by timestamp.
    pub fn from_pairs(mut pairs: Vec<(DateTime<Utc>, f64)>) -> Self {
        pairs.sort_by_key(|(t, _)| *t);
        TimeSeries {
            times: pairs.iter().map(|(t, _)| *t).collect(),
            values: pairs.iter().map(|(_, v)| *v).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.times.iter().copied().zip(self.values.iter().copied())
    }

    /// Pairs with NaN values removed.
    pub fn valid_pairs(&self) -> Vec<(DateTime<Utc>, f64)> {
        self.iter().filter(|(_, v)| v.is_finite()).collect()
    }

    /// Number of valid (finite) samples.
    pub fn num_valid(&self) -> usize {
        self.values.iter().filter(|v| v.is_finite()).count()
    }

    /// Discard samples outside `[low, high]` (bounds inclusive) by marking
    /// them NaN. Returns the number of samples discarded.
    pub fn remove_outliers(&mut self, low: f64, high: f64) -> usize {
        let mut removed = 0;
        for v in &mut self.values {
            if v.is_finite() && (*v < low || *v > high) {
                *v = f64::NAN;
                removed += 1;
            }
        }
        removed
    }

    /// Resample to the target frequency.
    ///
    /// Samples are binned into target periods (bin timestamp = period
    /// start). A bin whose valid-sample count falls below `min_num_obs`
    /// (only enforced when `apply_constraints` is true) yields NaN. Bins
    /// with no samples at all are absent from the output.
    pub fn resample(
        &self,
        to: TsType,
        how: ResampleHow,
        min_num_obs: Option<usize>,
        apply_constraints: bool,
    ) -> TimeSeries {
        let mut bins: BTreeMap<DateTime<Utc>, Vec<f64>> = BTreeMap::new();
        for (t, v) in self.iter() {
            if v.is_finite() {
                bins.entry(period_start(t, to)).or_default().push(v);
            }
        }
        let mut out = TimeSeries::new();
        for (t, vals) in bins {
            let value = match (apply_constraints, min_num_obs) {
                (true, Some(min)) if vals.len() < min => f64::NAN,
                _ => aggregate(&vals, how),
            };
            out.times.push(t);
            out.values.push(value);
        }
        out
    }

    /// Value at an exact timestamp, if present.
    pub fn value_at(&self, t: DateTime<Utc>) -> Option<f64> {
        self.times
            .binary_search(&t)
            .ok()
            .map(|idx| self.values[idx])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
