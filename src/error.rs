/// Error taxonomy for the evaluation service.
///
/// The three top-level classes carry different propagation policies:
///
/// - `ConfigError` — surfaced eagerly when an experiment configuration is
///   constructed or when output directories are set up. Never downgraded
///   to a per-entry skip.
/// - `DataError` — a (model, obs, variable) combination could not be
///   processed because source or colocated data is missing or ambiguous.
///   Fatal by default, but converted to a logged skip when the experiment
///   runs with `raise_exceptions=false`.
/// - `ConsistencyError` — proceeding would corrupt a merged artifact
///   (e.g. super-observation constituents disagreeing on vertical codes).
///   Never downgraded, regardless of `raise_exceptions`.
///
/// Stale on-disk artifacts are deliberately *not* an error class; they are
/// handled by the pruning passes in `menu`.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Invalid experiment configuration. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Obs/model names become filename tokens, so the reserved separator
    /// is forbidden in them.
    #[error("invalid name '{name}': must not contain '{sep}'")]
    ReservedCharInName { name: String, sep: char },

    #[error("name too long: '{name}' ({len} chars, max {max})")]
    NameTooLong { name: String, len: usize, max: usize },

    #[error("invalid variable name '{0}': must be non-empty ASCII alphanumeric")]
    InvalidVarName(String),

    #[error("missing mandatory field '{field}' in entry '{entry}'")]
    MissingField { entry: String, field: String },

    #[error("no vertical code declared for variable '{var_name}' in obs entry '{obs_name}'")]
    NoVertCode { obs_name: String, var_name: String },

    #[error("unknown vertical code '{0}'")]
    UnknownVertCode(String),

    #[error("unknown frequency '{0}'")]
    UnknownTsType(String),

    #[error("super-observation '{name}' references unknown constituent '{member}'")]
    UnknownSuperObsMember { name: String, member: String },

    #[error("model data for vertical code ModelLevel must have 4 dimensions (time, lat, lon, level): {0}")]
    InvalidModelLevelData(String),

    #[error("invalid time range: start year {start} is after stop year {stop}")]
    InvalidTimeRange { start: i32, stop: i32 },

    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no config file found for project '{proj_id}', experiment '{exp_id}' in {dir}")]
    ConfigFileNotFound {
        proj_id: String,
        exp_id: String,
        dir: PathBuf,
    },

    #[error("could not parse config file {path}: {reason}")]
    InvalidConfigFile { path: PathBuf, reason: String },
}

// ---------------------------------------------------------------------------
// Data availability errors
// ---------------------------------------------------------------------------

/// Missing or ambiguous data for one processing entry. Downgradeable to a
/// skip-and-log in best-effort runs.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no model data available for model '{model_id}', variable '{var_name}'")]
    NoModelData { model_id: String, var_name: String },

    #[error("no observation data available for network '{obs_id}', variable '{var_name}'")]
    NoObsData { obs_id: String, var_name: String },

    #[error("no colocated data files found for model '{model_name}', obs '{obs_name}', variable '{var_name}'")]
    NoColdataFiles {
        model_name: String,
        obs_name: String,
        var_name: String,
    },

    #[error(
        "found {count} colocated data files for model '{model_name}', obs '{obs_name}', \
         variable '{var_name}', need exactly one"
    )]
    AmbiguousColdataFiles {
        model_name: String,
        obs_name: String,
        var_name: String,
        count: usize,
    },

    #[error("unit mismatch for variable '{var_name}': obs reports '{obs_unit}', model reports '{model_unit}'")]
    UnitMismatch {
        var_name: String,
        obs_unit: String,
        model_unit: String,
    },

    #[error("colocation of '{var_name}' produced no valid data points")]
    EmptyColocation { var_name: String },

    #[error("malformed model field for variable '{var_name}': {reason}")]
    MalformedField { var_name: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Consistency errors
// ---------------------------------------------------------------------------

/// Merging would silently corrupt the result. Never downgraded.
#[derive(Debug, Error)]
pub enum ConsistencyError {
    #[error(
        "cannot merge observations with different vertical codes into super-observation \
         '{superobs_name}': {details}"
    )]
    VertCodeMismatch {
        superobs_name: String,
        details: String,
    },

    #[error("duplicate station name '{0}' while concatenating along station dimension")]
    DuplicateStation(String),

    #[error("constituent artifacts share no common time axis after resampling to '{0}'")]
    DisjointTimeAxes(String),
}

// ---------------------------------------------------------------------------
// Station merge errors
// ---------------------------------------------------------------------------

/// Errors from the StationData merge layer.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("metadata error: {0}")]
    MetaData(String),

    #[error("variable not available: {0}")]
    VarNotAvailable(String),

    #[error("cannot merge meta item '{key}' due to type mismatch")]
    TypeMismatch { key: String },

    /// Merging an incoming record that itself carries sidelined overlap
    /// samples is deliberately refused rather than guessing a nested
    /// overlap-merge policy.
    #[error("merging records with pre-existing overlap data is not supported (variable '{0}')")]
    NestedOverlap(String),

    #[error(
        "coordinate spread for station '{station}' exceeds tolerance: {spread_km:.4} km > {tol_km} km"
    )]
    CoordinateSpread {
        station: String,
        spread_km: f64,
        tol_km: f64,
    },

    #[error("coordinates of '{station}' differ by {dist_km:.4} km, tolerance is {tol_km} km")]
    CoordinateMismatch {
        station: String,
        dist_km: f64,
        tol_km: f64,
    },
}

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Any error the experiment pipeline can surface.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    #[error(transparent)]
    Merge(#[from] MergeError),
}

impl EvalError {
    /// True for error classes that must abort a run even in best-effort
    /// mode (`raise_exceptions=false`).
    pub fn is_fatal(&self) -> bool {
        matches!(self, EvalError::Config(_) | EvalError::Consistency(_))
    }
}

impl From<std::io::Error> for EvalError {
    fn from(e: std::io::Error) -> Self {
        EvalError::Data(DataError::Io(e))
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(e: serde_json::Error) -> Self {
        EvalError::Data(DataError::Json(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_and_consistency_errors_are_fatal() {
        let e = EvalError::from(ConfigError::UnknownVertCode("Mezzanine".to_string()));
        assert!(e.is_fatal());
        let e = EvalError::from(ConsistencyError::DuplicateStation("Birkenes".to_string()));
        assert!(e.is_fatal());
    }

    #[test]
    fn test_data_errors_are_downgradeable() {
        let e = EvalError::from(DataError::NoColdataFiles {
            model_name: "EMEP".to_string(),
            obs_name: "EEA".to_string(),
            var_name: "concno2".to_string(),
        });
        assert!(!e.is_fatal());
    }
}
