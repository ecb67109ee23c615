/// Model-vs-obs skill statistics over colocated data.
///
/// Statistics are computed from the paired (obs, model) cells of a
/// colocated artifact, optionally restricted to an evaluation period.
/// Undefined statistics (empty input, zero obs total, constant series)
/// are `None` rather than NaN so the values survive JSON.

use std::fmt;
use std::str::FromStr;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::colocation::ColocatedData;
use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Evaluation periods
// ---------------------------------------------------------------------------

/// An evaluation period: a single year (`"2010"`) or an inclusive year
/// range (`"2010-2012"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: i32,
    pub stop: i32,
}

impl Period {
    pub fn year(y: i32) -> Self {
        Period { start: y, stop: y }
    }

    pub fn contains_year(&self, year: i32) -> bool {
        year >= self.start && year <= self.stop
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.stop {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.stop)
        }
    }
}

impl FromStr for Period {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidConfigFile {
            path: Default::default(),
            reason: format!("invalid period '{s}', expected 'YYYY' or 'YYYY-YYYY'"),
        };
        let (start, stop) = match s.split_once('-') {
            Some((a, b)) => (
                a.trim().parse().map_err(|_| invalid())?,
                b.trim().parse().map_err(|_| invalid())?,
            ),
            None => {
                let y = s.trim().parse().map_err(|_| invalid())?;
                (y, y)
            }
        };
        if start > stop {
            return Err(ConfigError::InvalidTimeRange { start, stop });
        }
        Ok(Period { start, stop })
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Skill statistics of one model/obs pairing. Undefined entries are
/// `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Number of (station, time) cells in the evaluated window.
    pub totnum: usize,
    /// Cells where both sides carry a value.
    pub num_valid: usize,
    pub refdata_mean: Option<f64>,
    pub data_mean: Option<f64>,
    /// Mean bias (model minus obs).
    pub mb: Option<f64>,
    /// Normalised mean bias.
    pub nmb: Option<f64>,
    /// Modified normalised mean bias.
    pub mnmb: Option<f64>,
    /// Fractional gross error.
    pub fge: Option<f64>,
    pub rms: Option<f64>,
    #[serde(rename = "R")]
    pub r: Option<f64>,
}

/// Compute statistics from paired `(obs, model)` values. NaN pairs must
/// already be filtered out by the caller.
pub fn calc_statistics(pairs: &[(f64, f64)], totnum: usize) -> Statistics {
    let n = pairs.len();
    let mut stats = Statistics {
        totnum,
        num_valid: n,
        refdata_mean: None,
        data_mean: None,
        mb: None,
        nmb: None,
        mnmb: None,
        fge: None,
        rms: None,
        r: None,
    };
    if n == 0 {
        return stats;
    }
    let nf = n as f64;
    let obs_sum: f64 = pairs.iter().map(|(o, _)| o).sum();
    let mod_sum: f64 = pairs.iter().map(|(_, m)| m).sum();
    let diff_sum: f64 = pairs.iter().map(|(o, m)| m - o).sum();

    stats.refdata_mean = Some(obs_sum / nf);
    stats.data_mean = Some(mod_sum / nf);
    stats.mb = Some(diff_sum / nf);
    stats.rms = Some((pairs.iter().map(|(o, m)| (m - o).powi(2)).sum::<f64>() / nf).sqrt());
    if obs_sum != 0.0 {
        stats.nmb = Some(diff_sum / obs_sum);
    }

    // fractional metrics skip pairs whose sum is zero
    let fractional: Vec<(f64, f64)> = pairs.iter().copied().filter(|(o, m)| o + m != 0.0).collect();
    if !fractional.is_empty() {
        let fnf = fractional.len() as f64;
        stats.mnmb = Some(2.0 / fnf * fractional.iter().map(|(o, m)| (m - o) / (m + o)).sum::<f64>());
        stats.fge =
            Some(2.0 / fnf * fractional.iter().map(|(o, m)| (m - o).abs() / (m + o)).sum::<f64>());
    }

    stats.r = pearson(pairs);
    stats
}

fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let nf = pairs.len() as f64;
    let mean_o = pairs.iter().map(|(o, _)| o).sum::<f64>() / nf;
    let mean_m = pairs.iter().map(|(_, m)| m).sum::<f64>() / nf;
    let mut cov = 0.0;
    let mut var_o = 0.0;
    let mut var_m = 0.0;
    for (o, m) in pairs {
        cov += (o - mean_o) * (m - mean_m);
        var_o += (o - mean_o).powi(2);
        var_m += (m - mean_m).powi(2);
    }
    if var_o == 0.0 || var_m == 0.0 {
        return None;
    }
    Some(cov / (var_o.sqrt() * var_m.sqrt()))
}

// ---------------------------------------------------------------------------
// Colocated data aggregation
// ---------------------------------------------------------------------------

/// Statistics over all stations of a colocated artifact, restricted to
/// an evaluation period.
pub fn coldata_statistics(cd: &ColocatedData, period: &Period) -> Statistics {
    let indices: Vec<usize> = cd
        .time
        .iter()
        .enumerate()
        .filter(|(_, t)| period.contains_year(t.year()))
        .map(|(i, _)| i)
        .collect();
    let totnum = indices.len() * cd.num_stations();
    let mut pairs = Vec::new();
    for (obs_row, model_row) in cd.obs_vals.iter().zip(&cd.model_vals) {
        for &i in &indices {
            if let (Some(o), Some(m)) = (obs_row[i], model_row[i]) {
                pairs.push((o, m));
            }
        }
    }
    calc_statistics(&pairs, totnum)
}

/// Per-timestep mean across all stations (the "ALL" region curve),
/// obs and model side. Timesteps without any valid station are `None`.
pub fn coldata_mean_series(cd: &ColocatedData) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let mean_at = |rows: &[Vec<Option<f64>>], i: usize| -> Option<f64> {
        let vals: Vec<f64> = rows.iter().filter_map(|row| row[i]).collect();
        if vals.is_empty() {
            None
        } else {
            Some(vals.iter().sum::<f64>() / vals.len() as f64)
        }
    };
    let obs = (0..cd.time.len()).map(|i| mean_at(&cd.obs_vals, i)).collect();
    let model = (0..cd.time.len())
        .map(|i| mean_at(&cd.model_vals, i))
        .collect();
    (obs, model)
}
