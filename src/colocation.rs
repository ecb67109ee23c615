/// Colocation engine: aligns one gridded model variable with one
/// observation network's station records on a shared (time, station)
/// grid.
///
/// Both sides are resampled to the coarser of their native frequencies
/// (never upsampled), obs-side resampling honours the `min_num_obs`
/// constraint, and the result is persisted as a JSON artifact whose
/// filename encodes its full identity (see `filename`).
///
/// Matrices are stored as `Option<f64>` because the artifacts are
/// persisted as JSON, which has no NaN.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DataError, EvalError};
use crate::filename::ColdataFileMeta;
use crate::model::{ResampleHow, TsType, VerticalCode, VerticalScheme};
use crate::station::StationData;
use crate::timeseries::{period_range, TimeSeries};
use crate::variables;

// ---------------------------------------------------------------------------
// Reader interfaces
// ---------------------------------------------------------------------------

/// Source of gridded model fields. Implementations wrap whatever storage
/// the deployment uses; the engine only consumes this interface.
pub trait ModelReader {
    fn read_model_data(&self, model_id: &str, var_name: &str) -> Result<GriddedField, DataError>;
}

/// Source of ungridded observation records, one [`StationData`] per
/// station (already merged per station by the reader).
pub trait ObsReader {
    fn read_ungridded(&self, obs_id: &str, var_name: &str) -> Result<Vec<StationData>, DataError>;
}

// ---------------------------------------------------------------------------
// Gridded model data
// ---------------------------------------------------------------------------

/// A model variable field on a regular (time, lat, lon[, level]) grid,
/// values flattened row-major in that dimension order.
#[derive(Debug, Clone)]
pub struct GriddedField {
    pub var_name: String,
    pub unit: String,
    pub ts_type: TsType,
    pub times: Vec<DateTime<Utc>>,
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    /// Vertical level coordinates, ordered surface-first. `None` for
    /// 3-dimensional (surface/column) fields.
    pub levels: Option<Vec<f64>>,
    pub values: Vec<f64>,
}

impl GriddedField {
    fn num_levels(&self) -> usize {
        self.levels.as_ref().map(|l| l.len()).unwrap_or(1)
    }

    pub fn num_points(&self) -> usize {
        self.times.len() * self.lats.len() * self.lons.len() * self.num_levels()
    }

    fn value(&self, it: usize, ilat: usize, ilon: usize, ilev: usize) -> f64 {
        let nlev = self.num_levels();
        let idx = ((it * self.lats.len() + ilat) * self.lons.len() + ilon) * nlev + ilev;
        self.values[idx]
    }

    fn nearest(coords: &[f64], target: f64) -> usize {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (i, c) in coords.iter().enumerate() {
            let d = (c - target).abs();
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        best
    }

    /// Time series at the grid point nearest to (lat, lon), using the
    /// surface-most level for multi-level fields.
    pub fn sample_at(&self, lat: f64, lon: f64) -> TimeSeries {
        let ilat = Self::nearest(&self.lats, lat);
        let ilon = Self::nearest(&self.lons, lon);
        TimeSeries::from_pairs(
            self.times
                .iter()
                .enumerate()
                .map(|(it, t)| (*t, self.value(it, ilat, ilon, 0)))
                .collect(),
        )
    }

    /// Reject fields whose grid is degenerate or whose value buffer
    /// does not match the grid shape; indexing such a field would
    /// panic.
    pub fn check_shape(&self) -> Result<(), DataError> {
        let malformed = |reason: &str| DataError::MalformedField {
            var_name: self.var_name.clone(),
            reason: reason.to_string(),
        };
        if self.times.is_empty() {
            return Err(malformed("empty time dimension"));
        }
        if self.lats.is_empty() || self.lons.is_empty() {
            return Err(malformed("empty spatial grid"));
        }
        if self.levels.as_ref().is_some_and(|l| l.is_empty()) {
            return Err(malformed("empty level dimension"));
        }
        if self.values.len() != self.num_points() {
            return Err(malformed(&format!(
                "{} values for a grid of {} points",
                self.values.len(),
                self.num_points()
            )));
        }
        Ok(())
    }

    /// Check the field's dimensionality against the requested vertical
    /// code. `ModelLevel` requires a 4-dimensional field.
    pub fn check_vert_code(&self, vert_code: VerticalCode) -> Result<(), ConfigError> {
        match vert_code.scheme_alias() {
            Some(VerticalScheme::SurfaceLevel) if self.levels.is_none() => {
                Err(ConfigError::InvalidModelLevelData(format!(
                    "field '{}' has no level dimension",
                    self.var_name
                )))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Colocated data
// ---------------------------------------------------------------------------

/// Provenance metadata embedded in every colocated artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColocationMeta {
    /// (obs display name, model display name)
    pub data_source: (String, String),
    /// (obs variable, model variable)
    pub var_name: (String, String),
    pub ts_type: TsType,
    pub vert_code: VerticalCode,
    pub unit: String,
    pub start_year: i32,
    pub stop_year: i32,
    pub min_num_obs: Option<usize>,
    pub apply_constraints: bool,
    pub colocate_time: bool,
    pub resample_how: ResampleHow,
}

/// One model variable colocated with one obs variable: parallel
/// (station x time) matrices for the obs and model side, plus station
/// coordinates and provenance. Gaps are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColocatedData {
    pub meta: ColocationMeta,
    pub station_names: Vec<String>,
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    pub altitude: Vec<f64>,
    pub time: Vec<DateTime<Utc>>,
    /// Indexed `[station][time]`.
    pub obs_vals: Vec<Vec<Option<f64>>>,
    pub model_vals: Vec<Vec<Option<f64>>>,
}

impl ColocatedData {
    pub fn num_stations(&self) -> usize {
        self.station_names.len()
    }

    /// Number of (station, time) cells where both sides carry a value.
    pub fn num_valid(&self) -> usize {
        self.obs_vals
            .iter()
            .zip(&self.model_vals)
            .map(|(o, m)| {
                o.iter()
                    .zip(m)
                    .filter(|(ov, mv)| ov.is_some() && mv.is_some())
                    .count()
            })
            .sum()
    }

    /// Identity of the artifact file this data persists to.
    pub fn file_meta(&self) -> ColdataFileMeta {
        ColdataFileMeta {
            obs_name: self.meta.data_source.0.clone(),
            obs_var: self.meta.var_name.0.clone(),
            vert_code: self.meta.vert_code,
            model_name: self.meta.data_source.1.clone(),
            model_var: self.meta.var_name.1.clone(),
            ts_type: self.meta.ts_type,
            start_year: self.meta.start_year,
            stop_year: self.meta.stop_year,
        }
    }

    pub fn to_json_file(&self, dir: &Path) -> Result<PathBuf, DataError> {
        let path = dir.join(self.file_meta().filename());
        fs::write(&path, serde_json::to_vec(self)?)?;
        Ok(path)
    }

    pub fn from_json_file(path: &Path) -> Result<ColocatedData, DataError> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    /// Resample both matrices to a coarser frequency using this
    /// artifact's own resampling metadata. Returns `self` unchanged if
    /// `to` equals the current frequency.
    pub fn resample_time(&self, to: TsType) -> ColocatedData {
        if to == self.meta.ts_type {
            return self.clone();
        }
        let axis = period_range(self.meta.start_year, self.meta.stop_year, to);
        let resample_row = |row: &[Option<f64>], constrained: bool| -> Vec<Option<f64>> {
            let series = TimeSeries::from_pairs(
                self.time
                    .iter()
                    .zip(row)
                    .map(|(t, v)| (*t, v.unwrap_or(f64::NAN)))
                    .collect(),
            );
            let min_num_obs = if constrained { self.meta.min_num_obs } else { None };
            let res = series.resample(
                to,
                self.meta.resample_how,
                min_num_obs,
                self.meta.apply_constraints,
            );
            axis.iter()
                .map(|t| res.value_at(*t).filter(|v| !v.is_nan()))
                .collect()
        };
        let mut out = self.clone();
        out.meta.ts_type = to;
        out.time = axis.clone();
        out.obs_vals = self.obs_vals.iter().map(|r| resample_row(r, true)).collect();
        out.model_vals = self
            .model_vals
            .iter()
            .map(|r| resample_row(r, false))
            .collect();
        out
    }

    /// Obs and model series of one station, `None` cells as NaN.
    pub fn station_series(&self, i: usize) -> (TimeSeries, TimeSeries) {
        let to_series = |row: &[Option<f64>]| {
            TimeSeries::from_pairs(
                self.time
                    .iter()
                    .zip(row)
                    .map(|(t, v)| (*t, v.unwrap_or(f64::NAN)))
                    .collect(),
            )
        };
        (to_series(&self.obs_vals[i]), to_series(&self.model_vals[i]))
    }
}

// ---------------------------------------------------------------------------
// Colocation requests
// ---------------------------------------------------------------------------

/// Fully resolved parameters for one (model, obs, variable) colocation.
/// Built by the experiment layer from the configuration; variable
/// remapping (`model_use_vars`) is already applied.
#[derive(Debug, Clone)]
pub struct ColocationRequest {
    pub model_name: String,
    pub model_id: String,
    pub model_var: String,
    pub obs_name: String,
    pub obs_id: String,
    pub obs_var: String,
    pub obs_ts_type: TsType,
    pub vert_code: VerticalCode,
    pub start_year: i32,
    pub stop_year: i32,
    pub min_num_obs: Option<usize>,
    pub apply_constraints: bool,
    pub colocate_time: bool,
    pub resample_how: ResampleHow,
    pub remove_outliers: bool,
    pub harmonise_units: bool,
    /// Explicit outlier range for the obs variable; falls back to the
    /// variable registry's plausible range.
    pub outlier_range: Option<(f64, f64)>,
}

impl ColocationRequest {
    pub fn file_meta(&self, ts_type: TsType) -> ColdataFileMeta {
        ColdataFileMeta {
            obs_name: self.obs_name.clone(),
            obs_var: self.obs_var.clone(),
            vert_code: self.vert_code,
            model_name: self.model_name.clone(),
            model_var: self.model_var.clone(),
            ts_type,
            start_year: self.start_year,
            stop_year: self.stop_year,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Colocator<'a> {
    model_reader: &'a dyn ModelReader,
    obs_reader: &'a dyn ObsReader,
}

impl<'a> Colocator<'a> {
    pub fn new(model_reader: &'a dyn ModelReader, obs_reader: &'a dyn ObsReader) -> Self {
        Colocator {
            model_reader,
            obs_reader,
        }
    }

    /// Run one colocation. See the module docs for the alignment rules.
    pub fn run(&self, req: &ColocationRequest) -> Result<ColocatedData, EvalError> {
        let field = self
            .model_reader
            .read_model_data(&req.model_id, &req.model_var)?;
        field.check_shape()?;
        field.check_vert_code(req.vert_code)?;

        let stations = self.obs_reader.read_ungridded(&req.obs_id, &req.obs_var)?;
        if stations.is_empty() {
            return Err(DataError::NoObsData {
                obs_id: req.obs_id.clone(),
                var_name: req.obs_var.clone(),
            }
            .into());
        }

        // coarser native frequency wins, never upsample
        let ts_type = TsType::lowest_resolution([field.ts_type, req.obs_ts_type])
            .unwrap_or(req.obs_ts_type);
        let axis = period_range(req.start_year, req.stop_year, ts_type);

        let unit = self.check_units(req, &field, &stations)?;
        let outlier_range = self.outlier_range(req, &unit);

        let mut out = ColocatedData {
            meta: ColocationMeta {
                data_source: (req.obs_name.clone(), req.model_name.clone()),
                var_name: (req.obs_var.clone(), req.model_var.clone()),
                ts_type,
                vert_code: req.vert_code,
                unit,
                start_year: req.start_year,
                stop_year: req.stop_year,
                min_num_obs: req.min_num_obs,
                apply_constraints: req.apply_constraints,
                colocate_time: req.colocate_time,
                resample_how: req.resample_how,
            },
            station_names: Vec::new(),
            latitude: Vec::new(),
            longitude: Vec::new(),
            altitude: Vec::new(),
            time: axis.clone(),
            obs_vals: Vec::new(),
            model_vals: Vec::new(),
        };

        for station in &stations {
            let (lat, lon, alt) = match station.resolved_coords() {
                Ok(c) => c,
                Err(e) => {
                    log::warn!(
                        "skipping station '{}' in '{}': {e}",
                        station.station_name,
                        req.obs_name
                    );
                    continue;
                }
            };
            let Some(mut obs_series) = station.series(&req.obs_var) else {
                continue;
            };
            if let Some((low, high)) = outlier_range {
                obs_series.remove_outliers(low, high);
            }
            let obs = obs_series.resample(
                ts_type,
                req.resample_how,
                req.min_num_obs,
                req.apply_constraints,
            );

            let mut model = field
                .sample_at(lat, lon)
                .resample(ts_type, req.resample_how, None, false);
            if req.colocate_time {
                mask_to_valid(&mut model, &obs);
            }

            out.station_names.push(station.station_name.clone());
            out.latitude.push(lat);
            out.longitude.push(lon);
            out.altitude.push(alt);
            out.obs_vals.push(sample_axis(&obs, &axis));
            out.model_vals.push(sample_axis(&model, &axis));
        }

        if out.num_valid() == 0 {
            return Err(DataError::EmptyColocation {
                var_name: req.obs_var.clone(),
            }
            .into());
        }
        Ok(out)
    }

    /// Unit check: model and obs must agree when `harmonise_units` is
    /// set. Returns the unit recorded in the artifact.
    fn check_units(
        &self,
        req: &ColocationRequest,
        field: &GriddedField,
        stations: &[StationData],
    ) -> Result<String, EvalError> {
        let obs_unit = stations
            .iter()
            .find_map(|s| s.var_info.get(&req.obs_var).map(|i| i.unit.clone()))
            .unwrap_or_default();
        if req.harmonise_units
            && !obs_unit.is_empty()
            && !units_equal(&obs_unit, &field.unit)
        {
            return Err(DataError::UnitMismatch {
                var_name: req.obs_var.clone(),
                obs_unit,
                model_unit: field.unit.clone(),
            }
            .into());
        }
        Ok(if obs_unit.is_empty() {
            field.unit.clone()
        } else {
            obs_unit
        })
    }

    /// Outlier screening only happens when the obs data is in the
    /// variable's registry unit; otherwise the plausible range does not
    /// apply and screening is skipped with a warning.
    fn outlier_range(&self, req: &ColocationRequest, unit: &str) -> Option<(f64, f64)> {
        if !req.remove_outliers {
            return None;
        }
        if let Some(explicit) = req.outlier_range {
            return Some(explicit);
        }
        match variables::default_unit(&req.obs_var) {
            Some(default) if units_equal(default, unit) => variables::default_range(&req.obs_var),
            Some(default) => {
                log::warn!(
                    "not removing outliers for '{}': data unit '{unit}' differs from \
                     registry unit '{default}'",
                    req.obs_var
                );
                None
            }
            None => None,
        }
    }
}

fn units_equal(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn sample_axis(series: &TimeSeries, axis: &[DateTime<Utc>]) -> Vec<Option<f64>> {
    axis.iter()
        .map(|t| series.value_at(*t).filter(|v| !v.is_nan()))
        .collect()
}

/// Mask model samples to NaN wherever the obs side has no valid value
/// in the same period (the `colocate_time` option). Both series must
/// already be resampled to the common frequency, so their timestamps
/// are comparable period starts.
fn mask_to_valid(model: &mut TimeSeries, obs: &TimeSeries) {
    let valid: std::collections::BTreeSet<DateTime<Utc>> =
        obs.valid_pairs().into_iter().map(|(t, _)| t).collect();
    let masked: Vec<(DateTime<Utc>, f64)> = model
        .iter()
        .map(|(t, v)| {
            if valid.contains(&t) {
                (t, v)
            } else {
                (t, f64::NAN)
            }
        })
        .collect();
    *model = TimeSeries::from_pairs(masked);
}

// ---------------------------------------------------------------------------
// Directory scans
// ---------------------------------------------------------------------------

/// All colocated artifacts in `dir` for the given (model, obs, obs-var)
/// combination, in filename order.
pub fn find_coldata_files(
    dir: &Path,
    model_name: &str,
    obs_name: &str,
    obs_var: &str,
) -> Result<Vec<(PathBuf, ColdataFileMeta)>, DataError> {
    let mut found = Vec::new();
    if !dir.exists() {
        return Ok(found);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if let Some(meta) = ColdataFileMeta::parse(&path) {
            if meta.model_name == model_name && meta.obs_name == obs_name && meta.obs_var == obs_var
            {
                found.push((path, meta));
            }
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
