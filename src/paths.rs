/// Output tree of one experiment.
///
/// Layout under `out_basedir`:
///
/// ```text
/// <out_basedir>/<proj_id>/<exp_id>/
///     menu.json
///     cfg_<proj_id>_<exp_id>.json
///     map/    one JSON per (obs, var, vert, model) combination
///     ts/     one JSON per (obs, var, vert), model curves inside
///     hm/     one glob_stats_<freq>.json per statistics frequency
/// ```
///
/// Colocated artifacts live in a separate tree,
/// `<coldata_basedir>/<proj_id>/<exp_id>/`, so JSON output can be wiped
/// and rebuilt without touching them.

use std::fs;
use std::path::PathBuf;

use crate::config::ExperimentConfig;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub proj_dir: PathBuf,
    pub exp_dir: PathBuf,
    pub map_dir: PathBuf,
    pub ts_dir: PathBuf,
    pub hm_dir: PathBuf,
    pub coldata_dir: PathBuf,
    pub menu_file: PathBuf,
    pub config_file: PathBuf,
}

impl OutputPaths {
    pub fn new(cfg: &ExperimentConfig) -> Self {
        let proj_dir = cfg.out_basedir.join(&cfg.proj_id);
        let exp_dir = proj_dir.join(&cfg.exp_id);
        OutputPaths {
            map_dir: exp_dir.join("map"),
            ts_dir: exp_dir.join("ts"),
            hm_dir: exp_dir.join("hm"),
            coldata_dir: cfg.coldata_basedir.join(&cfg.proj_id).join(&cfg.exp_id),
            menu_file: exp_dir.join("menu.json"),
            config_file: exp_dir.join(ExperimentConfig::json_filename(&cfg.proj_id, &cfg.exp_id)),
            proj_dir,
            exp_dir,
        }
    }

    /// Create every output directory, failing eagerly before any
    /// processing starts.
    pub fn ensure(&self) -> Result<(), ConfigError> {
        for dir in [
            &self.exp_dir,
            &self.map_dir,
            &self.ts_dir,
            &self.hm_dir,
            &self.coldata_dir,
        ] {
            fs::create_dir_all(dir).map_err(|e| ConfigError::OutputDir {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}
