/// Typed experiment configuration.
///
/// The full setup round-trips through a JSON document (`cfg_<proj>_<exp>.json`)
/// that is also archived into the experiment output directory on every
/// run. All shape constraints are checked once, in [`ExperimentConfig::validate`],
/// before any processing starts; the processing layers can then assume a
/// well-formed configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::filename::{validate_name, validate_var_name};
use crate::model::{ResampleHow, TsType, VerticalCode};
use crate::stats::Period;

// ---------------------------------------------------------------------------
// Observation entries
// ---------------------------------------------------------------------------

/// Vertical code declaration of an obs entry: one code for all its
/// variables, or one per variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObsVertType {
    Uniform(VerticalCode),
    PerVariable(BTreeMap<String, VerticalCode>),
}

/// One observation network (or super-observation) to evaluate against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObsEntry {
    /// Reader identifier of the network. Empty for super-observations.
    #[serde(default)]
    pub obs_id: String,
    pub obs_vars: Vec<String>,
    pub obs_vert_type: ObsVertType,
    /// Native frequency the reader delivers.
    pub ts_type: TsType,
    #[serde(default)]
    pub is_superobs: bool,
    /// Constituent obs entries, for super-observations.
    #[serde(default)]
    pub superobs_members: Vec<String>,
    /// Entry only feeds super-observations and gets no menu entry of
    /// its own.
    #[serde(default)]
    pub only_superobs: bool,
    /// Display name in output artifacts; defaults to the entry key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_interface_name: Option<String>,
    #[serde(default)]
    pub diurnal_only: bool,
    /// Explicit outlier ranges per variable, overriding the registry.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outlier_ranges: BTreeMap<String, (f64, f64)>,
}

impl ObsEntry {
    /// Vertical code to use for one of this entry's variables.
    pub fn vert_code_for(&self, obs_name: &str, var_name: &str) -> Result<VerticalCode, ConfigError> {
        match &self.obs_vert_type {
            ObsVertType::Uniform(code) => Ok(*code),
            ObsVertType::PerVariable(map) => {
                map.get(var_name)
                    .copied()
                    .ok_or_else(|| ConfigError::NoVertCode {
                        obs_name: obs_name.to_string(),
                        var_name: var_name.to_string(),
                    })
            }
        }
    }

    /// Name shown in output artifacts for the entry keyed `key`.
    pub fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.web_interface_name.as_deref().unwrap_or(key)
    }
}

// ---------------------------------------------------------------------------
// Model entries
// ---------------------------------------------------------------------------

/// One model run to evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Reader identifier of the model run.
    pub model_id: String,
    /// Obs-variable to model-variable remapping, applied before the
    /// model data is read.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub model_use_vars: BTreeMap<String, String>,
}

impl ModelEntry {
    /// Model variable to read for a given obs variable.
    pub fn model_var_for<'a>(&'a self, obs_var: &'a str) -> &'a str {
        self.model_use_vars
            .get(obs_var)
            .map(String::as_str)
            .unwrap_or(obs_var)
    }
}

// ---------------------------------------------------------------------------
// Colocation options
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

/// Options shared by every colocation of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColocationOptions {
    pub start_year: i32,
    pub stop_year: i32,
    #[serde(default)]
    pub min_num_obs: Option<usize>,
    #[serde(default = "default_true")]
    pub apply_constraints: bool,
    #[serde(default)]
    pub colocate_time: bool,
    #[serde(default)]
    pub resample_how: ResampleHow,
    #[serde(default)]
    pub remove_outliers: bool,
    #[serde(default = "default_true")]
    pub harmonise_units: bool,
    /// Redo colocations even when a matching artifact exists.
    #[serde(default)]
    pub reanalyse_existing: bool,
    /// Abort the whole run on the first entry failure instead of
    /// logging and skipping.
    #[serde(default)]
    pub raise_exceptions: bool,
}

// ---------------------------------------------------------------------------
// Experiment configuration
// ---------------------------------------------------------------------------

fn default_stats_freqs() -> Vec<TsType> {
    vec![TsType::Daily, TsType::Monthly, TsType::Yearly]
}

fn default_regions_how() -> String {
    "default".to_string()
}

/// Complete setup of one evaluation experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub proj_id: String,
    pub exp_id: String,
    #[serde(default)]
    pub exp_name: String,
    #[serde(default)]
    pub exp_descr: String,

    #[serde(default = "default_stats_freqs")]
    pub statistics_freqs: Vec<TsType>,
    /// Evaluation periods as `"YYYY"` or `"YYYY-YYYY"` strings; empty
    /// means the colocation year range.
    #[serde(default)]
    pub statistics_periods: Vec<String>,
    /// Frequency of the time-series JSON; derived from
    /// `statistics_freqs` when unset.
    #[serde(default)]
    pub main_freq: Option<TsType>,

    #[serde(default = "default_true")]
    pub clear_existing_json: bool,
    #[serde(default)]
    pub only_colocation: bool,
    #[serde(default)]
    pub only_json: bool,
    #[serde(default)]
    pub weighted_stats: bool,
    #[serde(default)]
    pub annual_stats_constrained: bool,
    #[serde(default = "default_regions_how")]
    pub regions_how: String,

    /// Preferred ordering of variables in the menu; unlisted ones sort
    /// alphabetically after these.
    #[serde(default)]
    pub var_order_menu: Vec<String>,
    #[serde(default = "default_true")]
    pub modelorder_from_config: bool,
    #[serde(default = "default_true")]
    pub obsorder_from_config: bool,

    pub out_basedir: PathBuf,
    pub coldata_basedir: PathBuf,

    pub colocation: ColocationOptions,
    pub obs_config: BTreeMap<String, ObsEntry>,
    pub model_config: BTreeMap<String, ModelEntry>,
}

impl ExperimentConfig {
    /// Check every shape constraint. Processing layers assume a
    /// validated configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_name(&self.proj_id)?;
        validate_name(&self.exp_id)?;
        if self.colocation.start_year > self.colocation.stop_year {
            return Err(ConfigError::InvalidTimeRange {
                start: self.colocation.start_year,
                stop: self.colocation.stop_year,
            });
        }
        for (name, entry) in &self.obs_config {
            validate_name(name)?;
            if let Some(web_name) = &entry.web_interface_name {
                validate_name(web_name)?;
            }
            if entry.obs_vars.is_empty() {
                return Err(ConfigError::MissingField {
                    entry: name.clone(),
                    field: "obs_vars".to_string(),
                });
            }
            for var in &entry.obs_vars {
                validate_var_name(var)?;
                entry.vert_code_for(name, var)?;
            }
            if entry.is_superobs {
                for member in &entry.superobs_members {
                    let constituent = self.obs_config.get(member).ok_or_else(|| {
                        ConfigError::UnknownSuperObsMember {
                            name: name.clone(),
                            member: member.clone(),
                        }
                    })?;
                    if constituent.is_superobs {
                        // no nested super-observations
                        return Err(ConfigError::UnknownSuperObsMember {
                            name: name.clone(),
                            member: member.clone(),
                        });
                    }
                }
            } else if entry.obs_id.is_empty() {
                return Err(ConfigError::MissingField {
                    entry: name.clone(),
                    field: "obs_id".to_string(),
                });
            }
        }
        for (name, entry) in &self.model_config {
            validate_name(name)?;
            if entry.model_id.is_empty() {
                return Err(ConfigError::MissingField {
                    entry: name.clone(),
                    field: "model_id".to_string(),
                });
            }
            for (obs_var, model_var) in &entry.model_use_vars {
                validate_var_name(obs_var)?;
                validate_var_name(model_var)?;
            }
        }
        Ok(())
    }

    /// Frequency of the time-series JSON output.
    pub fn main_freq(&self) -> TsType {
        self.main_freq
            .or_else(|| TsType::lowest_resolution(self.statistics_freqs.iter().copied()))
            .unwrap_or(TsType::Monthly)
    }

    /// Parsed evaluation periods; the colocation year range when none
    /// are configured.
    pub fn periods(&self) -> Result<Vec<Period>, ConfigError> {
        if self.statistics_periods.is_empty() {
            return Ok(vec![Period {
                start: self.colocation.start_year,
                stop: self.colocation.stop_year,
            }]);
        }
        self.statistics_periods.iter().map(|s| s.parse()).collect()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Name of the archived configuration file.
    pub fn json_filename(proj_id: &str, exp_id: &str) -> String {
        format!("cfg_{proj_id}_{exp_id}.json")
    }

    pub fn to_json_file(&self, dir: &Path) -> Result<PathBuf, ConfigError> {
        let path = dir.join(Self::json_filename(&self.proj_id, &self.exp_id));
        let data = serde_json::to_vec_pretty(self).map_err(|e| ConfigError::InvalidConfigFile {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        fs::write(&path, data).map_err(|e| ConfigError::OutputDir {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }

    pub fn from_json_file(path: &Path) -> Result<ExperimentConfig, ConfigError> {
        let data = fs::read(path).map_err(|_| ConfigError::ConfigFileNotFound {
            proj_id: String::new(),
            exp_id: String::new(),
            dir: path.to_path_buf(),
        })?;
        let cfg: ExperimentConfig =
            serde_json::from_slice(&data).map_err(|e| ConfigError::InvalidConfigFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load the archived configuration of a previously run experiment.
    pub fn load_archived(dir: &Path, proj_id: &str, exp_id: &str) -> Result<ExperimentConfig, ConfigError> {
        let path = dir.join(Self::json_filename(proj_id, exp_id));
        if !path.exists() {
            return Err(ConfigError::ConfigFileNotFound {
                proj_id: proj_id.to_string(),
                exp_id: exp_id.to_string(),
                dir: dir.to_path_buf(),
            });
        }
        Self::from_json_file(&path)
    }
}
