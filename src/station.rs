/// In-memory representation of one observational station's multi-variable
/// time series, and the merge layer that folds overlapping records from
/// multiple input files into a single consistent record.
///
/// Merge rules:
///   - scalar metadata: string fields are unioned as ';'-separated token
///     sets (order-preserving, deduplicated); non-string scalars that
///     disagree become a two-element list; list fields append-if-absent.
///   - coordinates are never overwritten, only filled in when missing,
///     and merging fails if the two records are further apart than the
///     coordinate tolerance.
///   - variable data: samples of the incoming record whose timestamps
///     already carry data in this record are sidelined as "overlap"
///     rather than silently dropped.
///
/// All merge failures leave this record unmodified.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::error::MergeError;
use crate::model::TsType;
use crate::timeseries::TimeSeries;

/// Maximum allowed distance in km between coordinates of two records of
/// the same station, and between sampled coordinate readings within one
/// record.
pub const DEFAULT_COORD_TOL_KM: f64 = 0.1;

const EARTH_RADIUS_KM: f64 = 6371.0;
const KM_PER_DEG_LAT: f64 = 111.0;

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// A station coordinate is either a single fixed value or a set of sampled
/// readings (multi-platform campaigns report one position per sample).
/// Sampled readings collapse to their mean, subject to a spread check.
#[derive(Debug, Clone, PartialEq)]
pub enum Coordinate {
    FixedPoint(f64),
    SampledPoints(Vec<f64>),
}

impl Coordinate {
    /// Collapsed value: the fixed point, or the mean of the samples.
    /// `None` for an empty sample set.
    pub fn collapsed(&self) -> Option<f64> {
        match self {
            Coordinate::FixedPoint(v) => Some(*v),
            Coordinate::SampledPoints(vals) => {
                if vals.is_empty() {
                    None
                } else {
                    Some(vals.iter().sum::<f64>() / vals.len() as f64)
                }
            }
        }
    }

    /// Standard deviation of sampled readings; zero for a fixed point.
    pub fn spread(&self) -> f64 {
        match self {
            Coordinate::FixedPoint(_) => 0.0,
            Coordinate::SampledPoints(vals) => {
                if vals.len() < 2 {
                    return 0.0;
                }
                let mean = vals.iter().sum::<f64>() / vals.len() as f64;
                let var = vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / vals.len() as f64;
                var.sqrt()
            }
        }
    }
}

fn haversine_km(lat0: f64, lon0: f64, lat1: f64, lon1: f64) -> f64 {
    let (lat0, lon0, lat1, lon1) = (
        lat0.to_radians(),
        lon0.to_radians(),
        lat1.to_radians(),
        lon1.to_radians(),
    );
    let dlat = lat1 - lat0;
    let dlon = lon1 - lon0;
    let a = (dlat / 2.0).sin().powi(2) + lat0.cos() * lat1.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

// ---------------------------------------------------------------------------
// Metadata values
// ---------------------------------------------------------------------------

/// Scalar or list metadata value attached to a station or variable.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Str(String),
    Num(f64),
    List(Vec<MetaValue>),
}

impl MetaValue {
    /// ';'-separated tokens of a string value, trimmed.
    pub fn tokens(&self) -> Vec<String> {
        match self {
            MetaValue::Str(s) => s.split(';').map(|t| t.trim().to_string()).collect(),
            _ => Vec::new(),
        }
    }
}

/// Union of two ';'-separated token strings: tokens of `incoming` not yet
/// present in `existing` are appended, order-preserving.
fn merge_str_tokens(existing: &str, incoming: &str) -> String {
    let have: Vec<String> = existing.split(';').map(|t| t.trim().to_string()).collect();
    let mut merged = existing.to_string();
    for tok in incoming.split(';').map(|t| t.trim()) {
        if !have.iter().any(|h| h == tok) {
            merged.push(';');
            merged.push_str(tok);
        }
    }
    merged
}

/// Fold `incoming` into the map entry for `key` following the scalar
/// metadata merge rules.
fn append_meta_item(
    map: &mut BTreeMap<String, MetaValue>,
    key: &str,
    incoming: &MetaValue,
) -> Result<(), MergeError> {
    let Some(current) = map.get_mut(key) else {
        map.insert(key.to_string(), incoming.clone());
        return Ok(());
    };
    match (current, incoming) {
        (MetaValue::Str(cur), MetaValue::Str(inc)) => {
            *cur = merge_str_tokens(cur, inc);
            Ok(())
        }
        (MetaValue::Str(_), _) | (_, MetaValue::Str(_)) => Err(MergeError::TypeMismatch {
            key: key.to_string(),
        }),
        // appending a value that is itself a list is ambiguous
        (_, MetaValue::List(_)) => Err(MergeError::TypeMismatch {
            key: key.to_string(),
        }),
        (MetaValue::List(cur), inc) => {
            if !cur.contains(inc) {
                cur.push(inc.clone());
            }
            Ok(())
        }
        (cur @ MetaValue::Num(_), inc) => {
            if *cur != *inc {
                *cur = MetaValue::List(vec![cur.clone(), inc.clone()]);
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Variable metadata
// ---------------------------------------------------------------------------

/// Per-variable metadata carried alongside the time series.
#[derive(Debug, Clone, PartialEq)]
pub struct VarInfo {
    pub unit: String,
    pub ts_type: Option<TsType>,
    pub extra: BTreeMap<String, MetaValue>,
}

impl VarInfo {
    pub fn new(unit: &str, ts_type: Option<TsType>) -> Self {
        VarInfo {
            unit: unit.to_string(),
            ts_type,
            extra: BTreeMap::new(),
        }
    }

    fn merged_with(&self, other: &VarInfo) -> Result<VarInfo, MergeError> {
        let mut merged = self.clone();
        merged.unit = merge_str_tokens(&self.unit, &other.unit);
        // native resolution of the first record wins when they disagree
        if merged.ts_type.is_none() {
            merged.ts_type = other.ts_type;
        }
        for (key, val) in &other.extra {
            append_meta_item(&mut merged.extra, key, val)?;
        }
        Ok(merged)
    }
}

// ---------------------------------------------------------------------------
// StationData
// ---------------------------------------------------------------------------

/// One station's record: coordinates, free-form metadata, and one time
/// series per tracked variable, all aligned to a shared timeline.
///
/// Invariant: every variable's value vector has the same length as
/// `dtime`; gaps are NaN.
#[derive(Debug, Clone, Default)]
pub struct StationData {
    pub station_name: String,
    pub latitude: Option<Coordinate>,
    pub longitude: Option<Coordinate>,
    pub altitude: Option<Coordinate>,
    pub meta: BTreeMap<String, MetaValue>,
    pub var_info: BTreeMap<String, VarInfo>,
    /// Samples removed from incoming records during merges, keyed by
    /// variable. Accumulates across repeated merges.
    pub overlap: BTreeMap<String, TimeSeries>,
    dtime: Vec<DateTime<Utc>>,
    data: BTreeMap<String, Vec<f64>>,
}

impl StationData {
    pub fn new(station_name: &str) -> Self {
        StationData {
            station_name: station_name.to_string(),
            ..Default::default()
        }
    }

    pub fn set_coords(&mut self, latitude: f64, longitude: f64, altitude: f64) {
        self.latitude = Some(Coordinate::FixedPoint(latitude));
        self.longitude = Some(Coordinate::FixedPoint(longitude));
        self.altitude = Some(Coordinate::FixedPoint(altitude));
    }

    pub fn dtime(&self) -> &[DateTime<Utc>] {
        &self.dtime
    }

    pub fn var_names(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn has_var(&self, var_name: &str) -> bool {
        self.data.contains_key(var_name)
    }

    /// The variable's series on the shared timeline (NaN for gaps).
    pub fn series(&self, var_name: &str) -> Option<TimeSeries> {
        let values = self.data.get(var_name)?;
        Some(TimeSeries::from_pairs(
            self.dtime.iter().copied().zip(values.iter().copied()).collect(),
        ))
    }

    /// Insert (or replace) a variable's series, extending the shared
    /// timeline and re-aligning all other variables.
    pub fn insert_series(&mut self, var_name: &str, info: VarInfo, series: TimeSeries) {
        self.var_info.insert(var_name.to_string(), info);
        self.commit_series(var_name, series.iter().collect());
    }

    /// Collapsed (latitude, longitude, altitude), enforcing the sampled-
    /// coordinate spread limit.
    pub fn resolved_coords(&self) -> Result<(f64, f64, f64), MergeError> {
        let get = |c: &Option<Coordinate>, what: &str| -> Result<f64, MergeError> {
            c.as_ref().and_then(|c| c.collapsed()).ok_or_else(|| {
                MergeError::MetaData(format!(
                    "{what} information is not available for station '{}'",
                    self.station_name
                ))
            })
        };
        let lat = get(&self.latitude, "latitude")?;
        let lon = get(&self.longitude, "longitude")?;
        let alt = get(&self.altitude, "altitude")?;

        self.check_coord_spread(lat)?;
        Ok((lat, lon, alt))
    }

    fn check_coord_spread(&self, lat: f64) -> Result<(), MergeError> {
        let spread_km = |c: &Option<Coordinate>, scale: f64| {
            c.as_ref().map(|c| c.spread() * scale).unwrap_or(0.0)
        };
        let lat_km = spread_km(&self.latitude, KM_PER_DEG_LAT);
        let lon_km = spread_km(&self.longitude, KM_PER_DEG_LAT * lat.to_radians().cos());
        let alt_km = spread_km(&self.altitude, 1e-3);
        let worst = lat_km.max(lon_km).max(alt_km);
        if worst > DEFAULT_COORD_TOL_KM {
            return Err(MergeError::CoordinateSpread {
                station: self.station_name.clone(),
                spread_km: worst,
                tol_km: DEFAULT_COORD_TOL_KM,
            });
        }
        Ok(())
    }

    /// Horizontal distance to another station record in km.
    pub fn dist_other(&self, other: &StationData) -> Result<f64, MergeError> {
        let (lat0, lon0, _) = self.resolved_coords()?;
        let (lat1, lon1, _) = other.resolved_coords()?;
        Ok(haversine_km(lat0, lon0, lat1, lon1))
    }

    fn has_all_coords(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some() && self.altitude.is_some()
    }

    // -----------------------------------------------------------------------
    // Merging
    // -----------------------------------------------------------------------

    /// Merge scalar metadata from another record of the same station.
    ///
    /// When `check_coords` is true and both records carry full coordinates,
    /// merging fails if they are further apart than `coord_tol_km`
    /// (default [`DEFAULT_COORD_TOL_KM`]). Coordinate fields are only
    /// filled in when previously missing, never overwritten.
    pub fn merge_meta_same_station(
        &mut self,
        other: &StationData,
        coord_tol_km: Option<f64>,
        check_coords: bool,
    ) -> Result<(), MergeError> {
        if other.station_name != self.station_name {
            return Err(MergeError::MetaData(format!(
                "can only merge metadata from the same station, got '{}' vs '{}'",
                self.station_name, other.station_name
            )));
        }
        if check_coords && self.has_all_coords() && other.has_all_coords() {
            let tol_km = coord_tol_km.unwrap_or(DEFAULT_COORD_TOL_KM);
            let dist_km = self.dist_other(other)?;
            if dist_km > tol_km {
                return Err(MergeError::CoordinateMismatch {
                    station: self.station_name.clone(),
                    dist_km,
                    tol_km,
                });
            }
        }

        // all fallible merging happens on a copy, so a mid-merge type
        // mismatch cannot leave this record half-merged
        let mut merged = self.meta.clone();
        for (key, val) in &other.meta {
            append_meta_item(&mut merged, key, val)?;
        }

        if self.latitude.is_none() {
            self.latitude = other.latitude.clone();
        }
        if self.longitude.is_none() {
            self.longitude = other.longitude.clone();
        }
        if self.altitude.is_none() {
            self.altitude = other.altitude.clone();
        }
        self.meta = merged;
        Ok(())
    }

    /// Merge one variable's data from another record into this one.
    ///
    /// NaNs are dropped from both series first. Incoming samples whose
    /// timestamps already carry data here are stashed under `overlap`
    /// (never silently dropped); the remainder is concatenated, re-sorted,
    /// and the variable metadata is unioned.
    pub fn merge_vardata(&mut self, other: &StationData, var_name: &str) -> Result<(), MergeError> {
        if !self.has_var(var_name) {
            return Err(MergeError::VarNotAvailable(format!(
                "this record contains no data for '{var_name}'"
            )));
        }
        if !other.has_var(var_name) {
            return Err(MergeError::VarNotAvailable(format!(
                "incoming record contains no data for '{var_name}'"
            )));
        }
        let (Some(info_this), Some(info_other)) = (
            self.var_info.get(var_name),
            other.var_info.get(var_name),
        ) else {
            return Err(MergeError::MetaData(format!(
                "merging '{var_name}' requires variable metadata on both records"
            )));
        };
        // merging records that already carry sidelined overlap would need
        // a nested overlap-merge policy; refuse instead of guessing one
        if other.overlap.get(var_name).is_some_and(|o| !o.is_empty()) {
            return Err(MergeError::NestedOverlap(var_name.to_string()));
        }

        let merged_info = info_this.merged_with(info_other)?;

        let s0 = self
            .series(var_name)
            .map(|s| s.valid_pairs())
            .unwrap_or_default();
        let s1 = other
            .series(var_name)
            .map(|s| s.valid_pairs())
            .unwrap_or_default();

        let own_times: BTreeSet<DateTime<Utc>> = s0.iter().map(|(t, _)| *t).collect();
        let (overlapping, fresh): (Vec<_>, Vec<_>) =
            s1.into_iter().partition(|(t, _)| own_times.contains(t));

        let mut merged = s0;
        merged.extend(fresh);
        merged.sort_by_key(|(t, _)| *t);

        // commit
        self.var_info.insert(var_name.to_string(), merged_info);
        self.commit_series(var_name, merged);
        if !overlapping.is_empty() {
            let stash = self.overlap.entry(var_name.to_string()).or_default();
            let mut pairs = stash.iter().collect::<Vec<_>>();
            pairs.extend(overlapping);
            *stash = TimeSeries::from_pairs(pairs);
        }
        Ok(())
    }

    /// Merge another record of the same station: metadata first, then the
    /// given variable's data.
    pub fn merge_other(&mut self, other: &StationData, var_name: &str) -> Result<(), MergeError> {
        self.merge_meta_same_station(other, None, true)?;
        self.merge_vardata(other, var_name)
    }

    /// Replace `var_name`'s samples and re-align every variable to the
    /// union timeline, filling gaps with NaN.
    fn commit_series(&mut self, var_name: &str, pairs: Vec<(DateTime<Utc>, f64)>) {
        let mut timeline: BTreeSet<DateTime<Utc>> = self.dtime.iter().copied().collect();
        timeline.extend(pairs.iter().map(|(t, _)| *t));
        let new_dtime: Vec<DateTime<Utc>> = timeline.into_iter().collect();

        let mut new_data: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (name, values) in &self.data {
            if name == var_name {
                continue;
            }
            let old: BTreeMap<DateTime<Utc>, f64> = self
                .dtime
                .iter()
                .copied()
                .zip(values.iter().copied())
                .collect();
            new_data.insert(
                name.clone(),
                new_dtime
                    .iter()
                    .map(|t| old.get(t).copied().unwrap_or(f64::NAN))
                    .collect(),
            );
        }
        let fresh: BTreeMap<DateTime<Utc>, f64> = pairs.into_iter().collect();
        new_data.insert(
            var_name.to_string(),
            new_dtime
                .iter()
                .map(|t| fresh.get(t).copied().unwrap_or(f64::NAN))
                .collect(),
        );

        self.dtime = new_dtime;
        self.data = new_data;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
