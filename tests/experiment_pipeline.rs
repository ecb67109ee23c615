//! End-to-end experiment runs against in-memory model and obs readers.
//!
//! These exercise the full pipeline: colocation, artifact persistence
//! and reuse, JSON aggregation, super-observation merging, and menu
//! consistency after configuration changes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, TimeZone, Utc};

use aeroeval_service::colocation::{GriddedField, ModelReader, ObsReader};
use aeroeval_service::config::{
    ColocationOptions, ExperimentConfig, ModelEntry, ObsEntry, ObsVertType,
};
use aeroeval_service::error::{DataError, EvalError};
use aeroeval_service::experiment::ExperimentRunner;
use aeroeval_service::model::{ResampleHow, TsType, VerticalCode};
use aeroeval_service::station::{StationData, VarInfo};
use aeroeval_service::timeseries::TimeSeries;

// ---------------------------------------------------------------------------
// Fake readers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeModelReader {
    fields: BTreeMap<String, GriddedField>,
}

impl ModelReader for FakeModelReader {
    fn read_model_data(&self, model_id: &str, var_name: &str) -> Result<GriddedField, DataError> {
        self.fields
            .get(var_name)
            .cloned()
            .ok_or_else(|| DataError::NoModelData {
                model_id: model_id.to_string(),
                var_name: var_name.to_string(),
            })
    }
}

#[derive(Default)]
struct FakeObsReader {
    networks: BTreeMap<String, Vec<StationData>>,
}

impl ObsReader for FakeObsReader {
    fn read_ungridded(&self, obs_id: &str, var_name: &str) -> Result<Vec<StationData>, DataError> {
        self.networks
            .get(obs_id)
            .cloned()
            .ok_or_else(|| DataError::NoObsData {
                obs_id: obs_id.to_string(),
                var_name: var_name.to_string(),
            })
    }
}

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2010, 1, d, 0, 0, 0).unwrap()
}

fn daily_field(var_name: &str, unit: &str, value: f64) -> GriddedField {
    GriddedField {
        var_name: var_name.to_string(),
        unit: unit.to_string(),
        ts_type: TsType::Daily,
        times: (1..=31).map(day).collect(),
        lats: vec![50.0, 60.0],
        lons: vec![5.0, 10.0],
        levels: None,
        values: vec![value; 31 * 2 * 2],
    }
}

fn hourly_field(var_name: &str, unit: &str, value: f64) -> GriddedField {
    let times: Vec<DateTime<Utc>> = (1..=31)
        .flat_map(|d| (0..24).map(move |h| Utc.with_ymd_and_hms(2010, 1, d, h, 0, 0).unwrap()))
        .collect();
    let n = times.len();
    GriddedField {
        var_name: var_name.to_string(),
        unit: unit.to_string(),
        ts_type: TsType::Hourly,
        times,
        lats: vec![50.0, 60.0],
        lons: vec![5.0, 10.0],
        levels: None,
        values: vec![value; n * 2 * 2],
    }
}

fn daily_station(name: &str, var_name: &str, unit: &str, lat: f64) -> StationData {
    let mut s = StationData::new(name);
    s.set_coords(lat, 8.2, 100.0);
    s.insert_series(
        var_name,
        VarInfo::new(unit, Some(TsType::Daily)),
        TimeSeries::from_pairs((1..=31).map(|d| (day(d), 10.0 + d as f64)).collect()),
    );
    s
}

fn obs_entry(obs_id: &str, vars: &[&str], ts_type: TsType) -> ObsEntry {
    ObsEntry {
        obs_id: obs_id.to_string(),
        obs_vars: vars.iter().map(|v| v.to_string()).collect(),
        obs_vert_type: ObsVertType::Uniform(VerticalCode::Surface),
        ts_type,
        is_superobs: false,
        superobs_members: Vec::new(),
        only_superobs: false,
        web_interface_name: None,
        diurnal_only: false,
        outlier_ranges: BTreeMap::new(),
    }
}

fn base_config(out: &Path, coldata: &Path) -> ExperimentConfig {
    let mut obs_config = BTreeMap::new();
    obs_config.insert("EEA".to_string(), obs_entry("EEA.v2", &["concno2"], TsType::Daily));
    let mut model_config = BTreeMap::new();
    model_config.insert(
        "EMEP".to_string(),
        ModelEntry {
            model_id: "EMEP.rv4".to_string(),
            model_use_vars: BTreeMap::new(),
        },
    );
    ExperimentConfig {
        proj_id: "testproj".to_string(),
        exp_id: "exp1".to_string(),
        exp_name: String::new(),
        exp_descr: String::new(),
        statistics_freqs: vec![TsType::Daily, TsType::Monthly, TsType::Yearly],
        statistics_periods: Vec::new(),
        main_freq: Some(TsType::Monthly),
        clear_existing_json: true,
        only_colocation: false,
        only_json: false,
        weighted_stats: false,
        annual_stats_constrained: false,
        regions_how: "default".to_string(),
        var_order_menu: Vec::new(),
        modelorder_from_config: true,
        obsorder_from_config: true,
        out_basedir: out.to_path_buf(),
        coldata_basedir: coldata.to_path_buf(),
        colocation: ColocationOptions {
            start_year: 2010,
            stop_year: 2010,
            min_num_obs: None,
            apply_constraints: true,
            colocate_time: false,
            resample_how: ResampleHow::Mean,
            remove_outliers: false,
            harmonise_units: true,
            reanalyse_existing: false,
            raise_exceptions: false,
        },
        obs_config,
        model_config,
    }
}

fn default_readers() -> (FakeModelReader, FakeObsReader) {
    let mut model = FakeModelReader::default();
    model
        .fields
        .insert("concno2".to_string(), daily_field("concno2", "ug m-3", 12.0));
    let mut obs = FakeObsReader::default();
    obs.networks.insert(
        "EEA.v2".to_string(),
        vec![
            daily_station("Birkenes", "concno2", "ug m-3", 58.4),
            daily_station("Zeppelin", "concno2", "ug m-3", 61.0),
        ],
    );
    (model, obs)
}

fn snapshot(dir: &Path) -> BTreeMap<String, SystemTime> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            let e = e.unwrap();
            (
                e.file_name().to_string_lossy().into_owned(),
                e.metadata().unwrap().modified().unwrap(),
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_full_run_produces_all_artifacts() {
    let out = tempfile::tempdir().unwrap();
    let coldata = tempfile::tempdir().unwrap();
    let cfg = base_config(out.path(), coldata.path());
    let (model, obs) = default_readers();

    let runner = ExperimentRunner::new(cfg, &model, &obs).unwrap();
    let report = runner.run(None).unwrap();
    assert_eq!(report.succeeded, vec!["EMEP/EEA/concno2".to_string()]);
    assert!(report.all_ok());

    let paths = runner.paths();
    assert!(paths
        .coldata_dir
        .join("EEA-concno2_Surface_EMEP-concno2_daily_2010-2010.json")
        .exists());
    assert!(paths
        .map_dir
        .join("EEA-concno2_Surface_EMEP-concno2.json")
        .exists());
    assert!(paths.ts_dir.join("OBS-EEA_concno2_Surface.json").exists());
    assert!(paths.hm_dir.join("glob_stats_monthly.json").exists());
    assert!(paths.menu_file.exists());
    assert!(paths.config_file.exists());

    let menu: serde_json::Value =
        serde_json::from_slice(&fs::read(&paths.menu_file).unwrap()).unwrap();
    assert_eq!(menu["concno2"]["EEA"]["Surface"]["EMEP"]["model_id"], "EMEP.rv4");

    let hm: serde_json::Value =
        serde_json::from_slice(&fs::read(paths.hm_dir.join("glob_stats_monthly.json")).unwrap())
            .unwrap();
    let stats = &hm["concno2"]["EEA"]["Surface"]["EMEP"]["concno2"]["2010"];
    // perfect agreement is not expected; just a well-formed block
    assert!(stats["num_valid"].as_u64().unwrap() > 0);
    assert!(stats["mb"].is_number());
}

#[test]
fn test_second_run_reuses_colocated_artifacts() {
    let out = tempfile::tempdir().unwrap();
    let coldata = tempfile::tempdir().unwrap();
    let cfg = base_config(out.path(), coldata.path());
    let (model, obs) = default_readers();

    let runner = ExperimentRunner::new(cfg, &model, &obs).unwrap();
    runner.run(None).unwrap();
    let before = snapshot(&runner.paths().coldata_dir);
    assert_eq!(before.len(), 1);

    runner.run(None).unwrap();
    let after = snapshot(&runner.paths().coldata_dir);
    // zero additional writes: same files, same modification times
    assert_eq!(before, after);
}

#[test]
fn test_reanalyse_existing_rewrites_artifacts() {
    let out = tempfile::tempdir().unwrap();
    let coldata = tempfile::tempdir().unwrap();
    let mut cfg = base_config(out.path(), coldata.path());
    cfg.colocation.reanalyse_existing = true;
    let (model, obs) = default_readers();

    let runner = ExperimentRunner::new(cfg, &model, &obs).unwrap();
    runner.run(None).unwrap();
    let before = snapshot(&runner.paths().coldata_dir);
    // filesystem mtime granularity
    std::thread::sleep(std::time::Duration::from_millis(20));
    runner.run(None).unwrap();
    let after = snapshot(&runner.paths().coldata_dir);
    assert_eq!(before.keys().collect::<Vec<_>>(), after.keys().collect::<Vec<_>>());
    assert_ne!(before, after);
}

#[test]
fn test_single_obs_var_yields_single_pair() {
    let out = tempfile::tempdir().unwrap();
    let coldata = tempfile::tempdir().unwrap();
    let mut cfg = base_config(out.path(), coldata.path());
    cfg.obs_config.clear();
    cfg.obs_config
        .insert("A".to_string(), obs_entry("A.v1", &["od550aer"], TsType::Daily));

    let mut model = FakeModelReader::default();
    model
        .fields
        .insert("od550aer".to_string(), daily_field("od550aer", "1", 0.2));
    let mut obs = FakeObsReader::default();
    obs.networks.insert(
        "A.v1".to_string(),
        vec![daily_station("Birkenes", "od550aer", "1", 58.4)],
    );

    let runner = ExperimentRunner::new(cfg, &model, &obs).unwrap();
    let report = runner.run(None).unwrap();
    assert_eq!(report.succeeded, vec!["EMEP/A/od550aer".to_string()]);
    assert!(report.failed.is_empty());
}

#[test]
fn test_model_use_vars_remaps_model_variable() {
    let out = tempfile::tempdir().unwrap();
    let coldata = tempfile::tempdir().unwrap();
    let mut cfg = base_config(out.path(), coldata.path());
    cfg.obs_config.clear();
    cfg.obs_config
        .insert("Aeronet".to_string(), obs_entry("Aeronet.v3", &["od550aer"], TsType::Daily));
    cfg.model_config
        .get_mut("EMEP")
        .unwrap()
        .model_use_vars
        .insert("od550aer".to_string(), "od550csaer".to_string());

    let mut model = FakeModelReader::default();
    model
        .fields
        .insert("od550csaer".to_string(), daily_field("od550csaer", "1", 0.2));
    let mut obs = FakeObsReader::default();
    obs.networks.insert(
        "Aeronet.v3".to_string(),
        vec![daily_station("Birkenes", "od550aer", "1", 58.4)],
    );

    let runner = ExperimentRunner::new(cfg, &model, &obs).unwrap();
    let report = runner.run(None).unwrap();
    assert!(report.all_ok());
    assert!(runner
        .paths()
        .coldata_dir
        .join("Aeronet-od550aer_Surface_EMEP-od550csaer_daily_2010-2010.json")
        .exists());
}

#[test]
fn test_missing_model_data_is_skipped_in_best_effort_mode() {
    let out = tempfile::tempdir().unwrap();
    let coldata = tempfile::tempdir().unwrap();
    let cfg = base_config(out.path(), coldata.path());
    let (_, obs) = default_readers();
    let model = FakeModelReader::default();

    let runner = ExperimentRunner::new(cfg, &model, &obs).unwrap();
    let report = runner.run(None).unwrap();
    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "EMEP/EEA/concno2");
    // an empty experiment still writes an (empty) menu
    let menu: serde_json::Value =
        serde_json::from_slice(&fs::read(&runner.paths().menu_file).unwrap()).unwrap();
    assert_eq!(menu, serde_json::json!({}));
}

#[test]
fn test_raise_exceptions_aborts_on_data_error() {
    let out = tempfile::tempdir().unwrap();
    let coldata = tempfile::tempdir().unwrap();
    let mut cfg = base_config(out.path(), coldata.path());
    cfg.colocation.raise_exceptions = true;
    let (_, obs) = default_readers();
    let model = FakeModelReader::default();

    let runner = ExperimentRunner::new(cfg, &model, &obs).unwrap();
    assert!(matches!(
        runner.run(None),
        Err(EvalError::Data(DataError::NoModelData { .. }))
    ));
}

#[test]
fn test_model_named_like_obs_is_skipped() {
    let out = tempfile::tempdir().unwrap();
    let coldata = tempfile::tempdir().unwrap();
    let mut cfg = base_config(out.path(), coldata.path());
    cfg.model_config.insert(
        "EEA".to_string(),
        ModelEntry {
            model_id: "EEA.model".to_string(),
            model_use_vars: BTreeMap::new(),
        },
    );
    let (model, obs) = default_readers();

    let runner = ExperimentRunner::new(cfg, &model, &obs).unwrap();
    let report = runner.run(None).unwrap();
    // only the EMEP/EEA pair ran; the EEA/EEA pair was skipped silently
    assert_eq!(report.succeeded, vec!["EMEP/EEA/concno2".to_string()]);
    assert!(report.failed.is_empty());
}

#[test]
fn test_only_colocation_writes_no_json_outputs() {
    let out = tempfile::tempdir().unwrap();
    let coldata = tempfile::tempdir().unwrap();
    let mut cfg = base_config(out.path(), coldata.path());
    cfg.only_colocation = true;
    let (model, obs) = default_readers();

    let runner = ExperimentRunner::new(cfg, &model, &obs).unwrap();
    runner.run(None).unwrap();
    let paths = runner.paths();
    assert_eq!(snapshot(&paths.coldata_dir).len(), 1);
    assert_eq!(snapshot(&paths.map_dir).len(), 0);
    assert_eq!(snapshot(&paths.ts_dir).len(), 0);
    assert!(!paths.menu_file.exists());
}

#[test]
fn test_only_json_rebuilds_outputs_from_existing_artifacts() {
    let out = tempfile::tempdir().unwrap();
    let coldata = tempfile::tempdir().unwrap();
    let cfg = base_config(out.path(), coldata.path());
    let (model, obs) = default_readers();
    let runner = ExperimentRunner::new(cfg, &model, &obs).unwrap();
    runner.run(None).unwrap();
    // a second artifact for the same combination at another frequency
    let daily = aeroeval_service::colocation::ColocatedData::from_json_file(
        &runner
            .paths()
            .coldata_dir
            .join("EEA-concno2_Surface_EMEP-concno2_daily_2010-2010.json"),
    )
    .unwrap();
    daily
        .resample_time(TsType::Monthly)
        .to_json_file(&runner.paths().coldata_dir)
        .unwrap();
    let before = snapshot(&runner.paths().coldata_dir);
    assert_eq!(before.len(), 2);

    // fresh output tree, empty readers: everything must come from the
    // persisted artifacts
    let out2 = tempfile::tempdir().unwrap();
    let mut cfg2 = base_config(out2.path(), coldata.path());
    cfg2.only_json = true;
    let empty_model = FakeModelReader::default();
    let empty_obs = FakeObsReader::default();
    let runner2 = ExperimentRunner::new(cfg2, &empty_model, &empty_obs).unwrap();
    let report = runner2.run(None).unwrap();
    assert!(report.all_ok(), "failures: {:?}", report.failed);

    let paths = runner2.paths();
    assert!(paths
        .map_dir
        .join("EEA-concno2_Surface_EMEP-concno2.json")
        .exists());
    assert!(paths.ts_dir.join("OBS-EEA_concno2_Surface.json").exists());
    assert!(paths.menu_file.exists());
    // artifacts were read, not rewritten
    assert_eq!(before, snapshot(&paths.coldata_dir));
}

#[test]
fn test_only_json_without_artifacts_is_data_error() {
    let out = tempfile::tempdir().unwrap();
    let coldata = tempfile::tempdir().unwrap();
    let mut cfg = base_config(out.path(), coldata.path());
    cfg.only_json = true;
    let model = FakeModelReader::default();
    let obs = FakeObsReader::default();

    let runner = ExperimentRunner::new(cfg, &model, &obs).unwrap();
    let report = runner.run(None).unwrap();
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].1.contains("no colocated data files"));
}

#[test]
fn test_annual_stats_constrained_gates_yearly_heatmap() {
    // pooled yearly stats count every native-resolution point; the
    // constrained variant aggregates to annual means first
    let run = |constrained: bool| -> serde_json::Value {
        let out = tempfile::tempdir().unwrap();
        let coldata = tempfile::tempdir().unwrap();
        let mut cfg = base_config(out.path(), coldata.path());
        cfg.annual_stats_constrained = constrained;
        let (model, obs) = default_readers();
        let runner = ExperimentRunner::new(cfg, &model, &obs).unwrap();
        runner.run(None).unwrap();
        serde_json::from_slice(
            &fs::read(runner.paths().hm_dir.join("glob_stats_yearly.json")).unwrap(),
        )
        .unwrap()
    };

    let pooled = run(false);
    let stats = &pooled["concno2"]["EEA"]["Surface"]["EMEP"]["concno2"]["2010"];
    // 2 stations x 31 daily values
    assert_eq!(stats["num_valid"], 62);

    let annual = run(true);
    let stats = &annual["concno2"]["EEA"]["Surface"]["EMEP"]["concno2"]["2010"];
    // 2 stations x 1 annual mean
    assert_eq!(stats["num_valid"], 2);
}

#[test]
fn test_menu_pruned_after_model_removed_from_config() {
    let out = tempfile::tempdir().unwrap();
    let coldata = tempfile::tempdir().unwrap();
    let cfg = base_config(out.path(), coldata.path());
    let (model, obs) = default_readers();

    // first run with a second model
    let mut cfg2 = cfg.clone();
    cfg2.model_config.insert(
        "Retired".to_string(),
        ModelEntry {
            model_id: "Retired.v1".to_string(),
            model_use_vars: BTreeMap::new(),
        },
    );
    let runner = ExperimentRunner::new(cfg2, &model, &obs).unwrap();
    let report = runner.run(None).unwrap();
    assert_eq!(report.succeeded.len(), 2);

    // second run without it: menu entry gone, artifacts cleaned
    let runner = ExperimentRunner::new(cfg, &model, &obs).unwrap();
    runner.run(None).unwrap();
    let menu: serde_json::Value =
        serde_json::from_slice(&fs::read(&runner.paths().menu_file).unwrap()).unwrap();
    assert!(menu["concno2"]["EEA"]["Surface"].get("EMEP").is_some());
    assert!(menu["concno2"]["EEA"]["Surface"].get("Retired").is_none());
    assert!(!runner
        .paths()
        .map_dir
        .join("EEA-concno2_Surface_Retired-concno2.json")
        .exists());

    let ts: serde_json::Value = serde_json::from_slice(
        &fs::read(runner.paths().ts_dir.join("OBS-EEA_concno2_Surface.json")).unwrap(),
    )
    .unwrap();
    assert!(ts.get("EMEP").is_some());
    assert!(ts.get("Retired").is_none());
}

// ---------------------------------------------------------------------------
// Super-observations
// ---------------------------------------------------------------------------

fn superobs_config(out: &Path, coldata: &Path) -> ExperimentConfig {
    let mut cfg = base_config(out, coldata);
    let mut ebas = obs_entry("EBAS.v1", &["concno2"], TsType::Hourly);
    ebas.only_superobs = true;
    cfg.obs_config.insert("EBAS".to_string(), ebas);
    cfg.obs_config.get_mut("EEA").unwrap().only_superobs = true;
    cfg.obs_config.insert(
        "AllSurface".to_string(),
        ObsEntry {
            obs_id: String::new(),
            obs_vars: vec!["concno2".to_string()],
            obs_vert_type: ObsVertType::Uniform(VerticalCode::Surface),
            ts_type: TsType::Daily,
            is_superobs: true,
            superobs_members: vec!["EEA".to_string(), "EBAS".to_string()],
            only_superobs: false,
            web_interface_name: None,
            diurnal_only: false,
            outlier_ranges: BTreeMap::new(),
        },
    );
    cfg
}

fn superobs_readers() -> (FakeModelReader, FakeObsReader) {
    let (mut model, mut obs) = default_readers();
    model
        .fields
        .insert("concno2".to_string(), hourly_field("concno2", "ug m-3", 12.0));
    let mut hourly_station = StationData::new("Pallas");
    hourly_station.set_coords(59.0, 9.0, 300.0);
    hourly_station.insert_series(
        "concno2",
        VarInfo::new("ug m-3", Some(TsType::Hourly)),
        TimeSeries::from_pairs(
            (1..=31)
                .flat_map(|d| {
                    (0..24).map(move |h| {
                        (Utc.with_ymd_and_hms(2010, 1, d, h, 0, 0).unwrap(), 8.0)
                    })
                })
                .collect(),
        ),
    );
    obs.networks.insert("EBAS.v1".to_string(), vec![hourly_station]);
    (model, obs)
}

#[test]
fn test_superobs_merges_constituents_and_feeds_json() {
    let out = tempfile::tempdir().unwrap();
    let coldata = tempfile::tempdir().unwrap();
    let cfg = superobs_config(out.path(), coldata.path());
    let (model, obs) = superobs_readers();

    let runner = ExperimentRunner::new(cfg, &model, &obs).unwrap();
    let report = runner.run(None).unwrap();
    assert!(report.all_ok(), "failures: {:?}", report.failed);
    // EEA, EBAS, AllSurface each against EMEP
    assert_eq!(report.succeeded.len(), 3);

    let paths = runner.paths();
    // the merged artifact is not persisted; only the two constituents are
    let coldata_files = snapshot(&paths.coldata_dir);
    assert_eq!(coldata_files.len(), 2);
    assert!(!coldata_files.keys().any(|k| k.contains("AllSurface")));

    // constituents are only_superobs, so only the super-obs reaches the menu
    let menu: serde_json::Value =
        serde_json::from_slice(&fs::read(&paths.menu_file).unwrap()).unwrap();
    assert!(menu["concno2"].get("AllSurface").is_some());
    assert!(menu["concno2"].get("EEA").is_none());
    assert!(menu["concno2"].get("EBAS").is_none());

    // merged station count = 2 (EEA) + 1 (EBAS), at the coarser daily freq
    let map: serde_json::Value = serde_json::from_slice(
        &fs::read(paths.map_dir.join("AllSurface-concno2_Surface_EMEP-concno2.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(map.as_array().unwrap().len(), 3);
}

#[test]
fn test_superobs_with_missing_constituent_artifact_fails() {
    let out = tempfile::tempdir().unwrap();
    let coldata = tempfile::tempdir().unwrap();
    let cfg = superobs_config(out.path(), coldata.path());
    let (model, mut obs) = superobs_readers();
    // EBAS delivers nothing, so its colocation fails and no artifact exists
    obs.networks.remove("EBAS.v1");

    let runner = ExperimentRunner::new(cfg, &model, &obs).unwrap();
    let report = runner.run(None).unwrap();
    let failed: Vec<&str> = report.failed.iter().map(|(l, _)| l.as_str()).collect();
    assert!(failed.contains(&"EMEP/EBAS/concno2"));
    assert!(failed.contains(&"EMEP/AllSurface/concno2"));
    // the super-obs failure is the zero-files case, not a colocation retry
    let (_, msg) = report
        .failed
        .iter()
        .find(|(l, _)| l == "EMEP/AllSurface/concno2")
        .unwrap();
    assert!(msg.contains("no colocated data files"), "got: {msg}");
}

#[test]
fn test_superobs_vert_code_mismatch_aborts_run() {
    let out = tempfile::tempdir().unwrap();
    let coldata = tempfile::tempdir().unwrap();
    let mut cfg = superobs_config(out.path(), coldata.path());
    cfg.obs_config.get_mut("EBAS").unwrap().obs_vert_type =
        ObsVertType::Uniform(VerticalCode::Column);
    let (model, obs) = superobs_readers();

    let runner = ExperimentRunner::new(cfg, &model, &obs).unwrap();
    // consistency errors abort even in best-effort mode
    let err = runner.run(None).unwrap_err();
    assert!(err.is_fatal());
}
