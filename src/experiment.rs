/// Experiment orchestration: drives the (model x obs x variable) matrix
/// through colocation and JSON aggregation, then rebuilds the menu and
/// heatmaps so the output tree is consistent with the configuration.
///
/// Entry failures are isolated: a `DataError` aborts only its own
/// (model, obs, variable) combination unless `raise_exceptions` is set,
/// while configuration and consistency errors always abort the run.
/// Super-observation entries are processed after all regular entries so
/// their constituent artifacts exist.

use std::fs;

use chrono::Datelike;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::colocation::{
    find_coldata_files, ColocatedData, ColocationRequest, Colocator, ModelReader, ObsReader,
};
use crate::config::{ExperimentConfig, ModelEntry, ObsEntry};
use crate::error::{ConfigError, EvalError};
use crate::filename::{heatmap_filename, ColdataFileMeta};
use crate::menu::{add_heatmap_entry, clean_json_files, sync_heatmaps_to_menu, update_menu};
use crate::model::TsType;
use crate::paths::OutputPaths;
use crate::stats::{coldata_mean_series, coldata_statistics, Statistics};
use crate::superobs::{load_member_coldata, merge_superobs};

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// Outcome of one experiment run. `failed` lists skipped combinations
/// with the error that sidelined them (best-effort mode only).
#[derive(Debug, Default)]
pub struct RunReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl RunReport {
    pub fn all_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct ExperimentRunner<'a> {
    cfg: ExperimentConfig,
    paths: OutputPaths,
    model_reader: &'a dyn ModelReader,
    obs_reader: &'a dyn ObsReader,
}

impl<'a> ExperimentRunner<'a> {
    /// Validate the configuration and set up the output tree.
    pub fn new(
        cfg: ExperimentConfig,
        model_reader: &'a dyn ModelReader,
        obs_reader: &'a dyn ObsReader,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let paths = OutputPaths::new(&cfg);
        paths.ensure()?;
        Ok(ExperimentRunner {
            cfg,
            paths,
            model_reader,
            obs_reader,
        })
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    /// Run the full evaluation matrix. `var_filter` restricts the run to
    /// one obs variable; `None` processes everything.
    pub fn run(&self, var_filter: Option<&str>) -> Result<RunReport, EvalError> {
        log::info!(
            "running experiment '{}/{}'",
            self.cfg.proj_id,
            self.cfg.exp_id
        );
        if self.cfg.clear_existing_json && !self.cfg.only_colocation {
            clean_json_files(&self.paths, &self.cfg)?;
        }

        let mut report = RunReport::default();

        // regular entries first, super-observations afterwards, so every
        // constituent artifact exists before it is looked up
        let (regular, superobs): (Vec<_>, Vec<_>) = self
            .cfg
            .obs_config
            .iter()
            .partition(|(_, entry)| !entry.is_superobs);

        for (obs_key, obs_entry) in regular.into_iter().chain(superobs) {
            for (model_name, model_entry) in &self.cfg.model_config {
                let obs_name = obs_entry.display_name(obs_key);
                if model_name == obs_name {
                    log::info!("skipping self-evaluation of '{model_name}'");
                    continue;
                }
                for obs_var in &obs_entry.obs_vars {
                    if var_filter.is_some_and(|v| v != obs_var.as_str()) {
                        continue;
                    }
                    let label = format!("{model_name}/{obs_name}/{obs_var}");
                    match self.process_entry(obs_key, obs_entry, model_name, model_entry, obs_var) {
                        Ok(()) => report.succeeded.push(label),
                        Err(e) if e.is_fatal() || self.cfg.colocation.raise_exceptions => {
                            return Err(e);
                        }
                        Err(e) => {
                            log::warn!("skipping {label}: {e}");
                            report.failed.push((label, e.to_string()));
                        }
                    }
                }
            }
        }

        if !self.cfg.only_colocation {
            self.update_interface()?;
        }
        log::info!(
            "experiment done: {} succeeded, {} skipped",
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Rebuild menu, heatmaps and the archived configuration. Also runs
    /// standalone when only the JSON interface needs refreshing.
    pub fn update_interface(&self) -> Result<(), EvalError> {
        let menu = update_menu(&self.paths, &self.cfg)?;
        sync_heatmaps_to_menu(&self.paths, &menu)?;
        self.cfg.to_json_file(&self.paths.exp_dir)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Per-entry processing
    // ------------------------------------------------------------------

    fn process_entry(
        &self,
        obs_key: &str,
        obs_entry: &ObsEntry,
        model_name: &str,
        model_entry: &ModelEntry,
        obs_var: &str,
    ) -> Result<(), EvalError> {
        let coldata = if obs_entry.is_superobs {
            vec![self.merge_superobs_entry(obs_key, obs_entry, model_name, model_entry, obs_var)?]
        } else {
            self.get_or_colocate(obs_key, obs_entry, model_name, model_entry, obs_var)?
        };
        if self.cfg.only_colocation || obs_entry.only_superobs {
            return Ok(());
        }
        for cd in &coldata {
            self.write_json_outputs(cd)?;
        }
        Ok(())
    }

    /// Reuse matching colocated artifacts, or produce and persist one.
    /// `only_json` converts every artifact a previous run produced for
    /// this combination; the other modes yield exactly one.
    fn get_or_colocate(
        &self,
        obs_key: &str,
        obs_entry: &ObsEntry,
        model_name: &str,
        model_entry: &ModelEntry,
        obs_var: &str,
    ) -> Result<Vec<ColocatedData>, EvalError> {
        let obs_name = obs_entry.display_name(obs_key);
        let model_var = model_entry.model_var_for(obs_var);
        let vert_code = obs_entry.vert_code_for(obs_key, obs_var)?;
        let opts = &self.cfg.colocation;
        let matches_request = |meta: &ColdataFileMeta| {
            meta.model_var == model_var
                && meta.vert_code == vert_code
                && meta.start_year == opts.start_year
                && meta.stop_year == opts.stop_year
        };

        if self.cfg.only_json {
            let existing = find_coldata_files(&self.paths.coldata_dir, model_name, obs_name, obs_var)?;
            let matching: Vec<&(std::path::PathBuf, ColdataFileMeta)> =
                existing.iter().filter(|(_, meta)| matches_request(meta)).collect();
            if matching.is_empty() {
                return Err(crate::error::DataError::NoColdataFiles {
                    model_name: model_name.to_string(),
                    obs_name: obs_name.to_string(),
                    var_name: obs_var.to_string(),
                }
                .into());
            }
            return matching
                .into_iter()
                .map(|(path, _)| Ok(ColocatedData::from_json_file(path)?))
                .collect();
        }
        if !opts.reanalyse_existing {
            let existing = find_coldata_files(&self.paths.coldata_dir, model_name, obs_name, obs_var)?;
            if let Some((path, _)) = existing.iter().find(|(_, meta)| matches_request(meta)) {
                log::info!("reusing existing colocated artifact {}", path.display());
                return Ok(vec![ColocatedData::from_json_file(path)?]);
            }
        }

        let req = ColocationRequest {
            model_name: model_name.to_string(),
            model_id: model_entry.model_id.clone(),
            model_var: model_var.to_string(),
            obs_name: obs_name.to_string(),
            obs_id: obs_entry.obs_id.clone(),
            obs_var: obs_var.to_string(),
            obs_ts_type: obs_entry.ts_type,
            vert_code,
            start_year: opts.start_year,
            stop_year: opts.stop_year,
            min_num_obs: opts.min_num_obs,
            apply_constraints: opts.apply_constraints,
            colocate_time: opts.colocate_time,
            resample_how: opts.resample_how,
            remove_outliers: opts.remove_outliers,
            harmonise_units: opts.harmonise_units,
            outlier_range: obs_entry.outlier_ranges.get(obs_var).copied(),
        };
        let coldata = Colocator::new(self.model_reader, self.obs_reader).run(&req)?;
        coldata.to_json_file(&self.paths.coldata_dir)?;
        Ok(vec![coldata])
    }

    /// Merge the constituent artifacts of a super-observation entry.
    /// Missing constituents are a data error, never colocated on the
    /// fly. The merged artifact is not persisted.
    fn merge_superobs_entry(
        &self,
        obs_key: &str,
        obs_entry: &ObsEntry,
        model_name: &str,
        _model_entry: &ModelEntry,
        obs_var: &str,
    ) -> Result<ColocatedData, EvalError> {
        if obs_entry.diurnal_only {
            log::warn!(
                "ignoring diurnal_only on super-observation '{obs_key}': \
                 merged data has no diurnal resolution"
            );
        }
        let mut members = Vec::with_capacity(obs_entry.superobs_members.len());
        for member_key in &obs_entry.superobs_members {
            // members were validated to exist
            let Some(member) = self.cfg.obs_config.get(member_key) else {
                continue;
            };
            if !member.obs_vars.iter().any(|v| v == obs_var) {
                continue;
            }
            members.push(load_member_coldata(
                &self.paths.coldata_dir,
                model_name,
                member.display_name(member_key),
                obs_var,
            )?);
        }
        merge_superobs(obs_entry.display_name(obs_key), &members)
    }

    // ------------------------------------------------------------------
    // JSON outputs
    // ------------------------------------------------------------------

    fn write_json_outputs(&self, coldata: &ColocatedData) -> Result<(), EvalError> {
        let periods = self.cfg.periods()?;
        self.write_map_json(coldata, &periods)?;
        self.write_ts_json(coldata)?;
        self.write_heatmap_entries(coldata, &periods)?;
        Ok(())
    }

    fn write_map_json(
        &self,
        coldata: &ColocatedData,
        periods: &[crate::stats::Period],
    ) -> Result<(), EvalError> {
        #[derive(Serialize)]
        struct MapStation<'a> {
            station_name: &'a str,
            latitude: f64,
            longitude: f64,
            altitude: f64,
            stats: Map<String, Value>,
        }

        // never upsample: keep the artifact's frequency when the main
        // frequency is finer
        let freq = TsType::lowest_resolution([self.cfg.main_freq(), coldata.meta.ts_type])
            .unwrap_or(coldata.meta.ts_type);
        let cd = coldata.resample_time(freq);
        let mut stations = Vec::with_capacity(cd.num_stations());
        for i in 0..cd.num_stations() {
            let (obs, model) = cd.station_series(i);
            let mut stats = Map::new();
            for period in periods {
                let totnum = cd
                    .time
                    .iter()
                    .filter(|t| period.contains_year(t.year()))
                    .count();
                let in_period: Vec<(f64, f64)> = obs
                    .iter()
                    .zip(model.iter())
                    .filter(|((t, o), (_, m))| {
                        period.contains_year(t.year()) && !o.is_nan() && !m.is_nan()
                    })
                    .map(|((_, o), (_, m))| (o, m))
                    .collect();
                stats.insert(
                    period.to_string(),
                    serde_json::to_value(crate::stats::calc_statistics(&in_period, totnum))
                        .map_err(crate::error::DataError::Json)?,
                );
            }
            stations.push(MapStation {
                station_name: &cd.station_names[i],
                latitude: cd.latitude[i],
                longitude: cd.longitude[i],
                altitude: cd.altitude[i],
                stats,
            });
        }
        let path = self.paths.map_dir.join(coldata.file_meta().map_meta().filename());
        fs::write(
            &path,
            serde_json::to_vec_pretty(&stations).map_err(crate::error::DataError::Json)?,
        )
        .map_err(crate::error::DataError::Io)?;
        Ok(())
    }

    /// Merge this model's region-mean curve into the combination's
    /// time-series file, keyed by model name. Other models' curves are
    /// left alone; the cleanup pass strips stale keys.
    fn write_ts_json(&self, coldata: &ColocatedData) -> Result<(), EvalError> {
        let freq = TsType::lowest_resolution([self.cfg.main_freq(), coldata.meta.ts_type])
            .unwrap_or(coldata.meta.ts_type);
        let cd = coldata.resample_time(freq);
        let (obs_mean, model_mean) = coldata_mean_series(&cd);

        let path = self
            .paths
            .ts_dir
            .join(coldata.file_meta().map_meta().ts_meta().filename());
        let mut root: Map<String, Value> = if path.exists() {
            serde_json::from_slice(&fs::read(&path).map_err(crate::error::DataError::Io)?)
                .unwrap_or_default()
        } else {
            Map::new()
        };
        root.insert(
            cd.meta.data_source.1.clone(),
            serde_json::json!({
                "model_var": cd.meta.var_name.1,
                "obs_var": cd.meta.var_name.0,
                "unit": cd.meta.unit,
                "freq": freq,
                "time": cd.time,
                "obs": obs_mean,
                "model": model_mean,
            }),
        );
        fs::write(
            &path,
            serde_json::to_vec_pretty(&Value::Object(root)).map_err(crate::error::DataError::Json)?,
        )
        .map_err(crate::error::DataError::Io)?;
        Ok(())
    }

    fn write_heatmap_entries(
        &self,
        coldata: &ColocatedData,
        periods: &[crate::stats::Period],
    ) -> Result<(), EvalError> {
        for freq in &self.cfg.statistics_freqs {
            if freq.is_coarser_than(coldata.meta.ts_type) || *freq == coldata.meta.ts_type {
                // Yearly statistics pool the native-resolution points of
                // each period; `annual_stats_constrained` aggregates to
                // annual means first, so `min_num_obs` also gates the
                // annual values.
                let cd = if *freq == TsType::Yearly && !self.cfg.annual_stats_constrained {
                    coldata.clone()
                } else {
                    coldata.resample_time(*freq)
                };
                let hm_file = self.paths.hm_dir.join(heatmap_filename(*freq));
                for period in periods {
                    let stats: Statistics = coldata_statistics(&cd, period);
                    add_heatmap_entry(
                        &hm_file,
                        [
                            cd.meta.var_name.0.as_str(),
                            cd.meta.data_source.0.as_str(),
                            cd.meta.vert_code.as_str(),
                            cd.meta.data_source.1.as_str(),
                            cd.meta.var_name.1.as_str(),
                        ],
                        &period.to_string(),
                        &serde_json::to_value(&stats).map_err(crate::error::DataError::Json)?,
                    )
                    .map_err(EvalError::Data)?;
                }
            } else {
                log::debug!(
                    "no {freq} heatmap for {}: colocated data is {}",
                    coldata.file_meta(),
                    coldata.meta.ts_type
                );
            }
        }
        Ok(())
    }
}
