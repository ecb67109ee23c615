/// menu.json maintenance and output-tree garbage collection.
///
/// The menu is never edited incrementally: it is rebuilt from scratch by
/// scanning the map JSON directory and keeping only combinations that
/// are still backed by the current configuration. Stale entries are
/// silently omitted; the companion [`clean_json_files`] pass deletes the
/// stale files themselves.
///
/// Key order inside the menu is meaningful (it drives display order),
/// which is why JSON maps preserve insertion order here.

use std::fs;
use std::path::Path;

use serde_json::{json, Map, Value};

use crate::config::{ExperimentConfig, ObsEntry};
use crate::error::{DataError, EvalError};
use crate::filename::{MapFileMeta, TsFileMeta};
use crate::model::VerticalCode;
use crate::paths::OutputPaths;

// ---------------------------------------------------------------------------
// Validity
// ---------------------------------------------------------------------------

/// Obs entry behind a display name, ignoring entries that only exist to
/// feed super-observations.
fn entry_for_display_name<'a>(
    cfg: &'a ExperimentConfig,
    display_name: &str,
) -> Option<(&'a String, &'a ObsEntry)> {
    cfg.obs_config
        .iter()
        .find(|(key, entry)| !entry.only_superobs && entry.display_name(key) == display_name)
}

/// True if a persisted (obs, var, vert, model) combination is still
/// backed by the current configuration.
pub fn is_valid_combination(
    cfg: &ExperimentConfig,
    obs_name: &str,
    obs_var: &str,
    vert_code: VerticalCode,
    model_name: &str,
) -> bool {
    if !cfg.model_config.contains_key(model_name) {
        return false;
    }
    let Some((key, entry)) = entry_for_display_name(cfg, obs_name) else {
        return false;
    };
    entry.obs_vars.iter().any(|v| v == obs_var)
        && entry
            .vert_code_for(key, obs_var)
            .is_ok_and(|c| c == vert_code)
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Preferred names first (in preference order), the rest alphabetical.
fn sort_with_preference(mut items: Vec<String>, pref: &[String]) -> Vec<String> {
    items.sort();
    let mut out = Vec::with_capacity(items.len());
    for wanted in pref {
        if let Some(i) = items.iter().position(|x| x == wanted) {
            out.push(items.remove(i));
        }
    }
    out.extend(items);
    out
}

fn obs_order(cfg: &ExperimentConfig) -> Vec<String> {
    if !cfg.obsorder_from_config {
        return Vec::new();
    }
    cfg.obs_config
        .iter()
        .map(|(key, entry)| entry.display_name(key).to_string())
        .collect()
}

fn model_order(cfg: &ExperimentConfig) -> Vec<String> {
    if !cfg.modelorder_from_config {
        return Vec::new();
    }
    cfg.model_config.keys().cloned().collect()
}

// ---------------------------------------------------------------------------
// Menu
// ---------------------------------------------------------------------------

/// Rebuild menu.json from the map JSON directory, dropping combinations
/// no longer backed by the configuration. Returns the written menu.
pub fn update_menu(paths: &OutputPaths, cfg: &ExperimentConfig) -> Result<Value, EvalError> {
    let mut entries: Vec<MapFileMeta> = Vec::new();
    if paths.map_dir.exists() {
        for entry in fs::read_dir(&paths.map_dir).map_err(DataError::Io)? {
            let path = entry.map_err(DataError::Io)?.path();
            if let Some(meta) = MapFileMeta::parse(&path) {
                if is_valid_combination(cfg, &meta.obs_name, &meta.obs_var, meta.vert_code, &meta.model_name)
                {
                    entries.push(meta);
                } else {
                    log::info!("omitting stale menu entry {}", meta);
                }
            }
        }
    }

    let vars = sort_with_preference(
        dedup(entries.iter().map(|e| e.obs_var.clone())),
        &cfg.var_order_menu,
    );
    let obs_pref = obs_order(cfg);
    let model_pref = model_order(cfg);

    let mut menu = Map::new();
    for var in &vars {
        let of_var: Vec<&MapFileMeta> = entries.iter().filter(|e| &e.obs_var == var).collect();
        let mut var_node = Map::new();
        let obs_names =
            sort_with_preference(dedup(of_var.iter().map(|e| e.obs_name.clone())), &obs_pref);
        for obs_name in &obs_names {
            let of_obs: Vec<&&MapFileMeta> =
                of_var.iter().filter(|e| &e.obs_name == obs_name).collect();
            let mut obs_node = Map::new();
            let mut verts = dedup(of_obs.iter().map(|e| e.vert_code.to_string()));
            verts.sort();
            for vert in &verts {
                let mut vert_node = Map::new();
                let models = sort_with_preference(
                    dedup(
                        of_obs
                            .iter()
                            .filter(|e| &e.vert_code.to_string() == vert)
                            .map(|e| e.model_name.clone()),
                    ),
                    &model_pref,
                );
                for model_name in &models {
                    let Some(meta) = of_obs.iter().find(|e| {
                        &e.model_name == model_name && &e.vert_code.to_string() == vert
                    }) else {
                        continue;
                    };
                    let model_id = cfg
                        .model_config
                        .get(model_name)
                        .map(|m| m.model_id.clone())
                        .unwrap_or_default();
                    vert_node.insert(
                        model_name.clone(),
                        json!({
                            "model_var": meta.model_var,
                            "model_id": model_id,
                            "obs_var": meta.obs_var,
                        }),
                    );
                }
                obs_node.insert(vert.clone(), Value::Object(vert_node));
            }
            var_node.insert(obs_name.clone(), Value::Object(obs_node));
        }
        menu.insert(var.clone(), Value::Object(var_node));
    }

    let menu = Value::Object(menu);
    fs::write(
        &paths.menu_file,
        serde_json::to_vec_pretty(&menu).map_err(DataError::Json)?,
    )
    .map_err(DataError::Io)?;
    Ok(menu)
}

pub fn read_menu(paths: &OutputPaths) -> Result<Value, DataError> {
    if !paths.menu_file.exists() {
        return Ok(Value::Object(Map::new()));
    }
    Ok(serde_json::from_slice(&fs::read(&paths.menu_file)?)?)
}

fn dedup<I: Iterator<Item = String>>(items: I) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Heatmap sync
// ---------------------------------------------------------------------------

/// Insert one statistics block into a heatmap file, creating the nested
/// path `var -> obs -> vert -> model -> model_var -> period` as needed.
pub fn add_heatmap_entry(
    hm_file: &Path,
    keys: [&str; 5],
    period: &str,
    stats: &Value,
) -> Result<(), DataError> {
    let mut root: Value = if hm_file.exists() {
        serde_json::from_slice(&fs::read(hm_file)?)?
    } else {
        Value::Object(Map::new())
    };
    let mut node = &mut root;
    for key in keys {
        node = node
            .as_object_mut()
            .ok_or_else(|| serde_json::Error::io(std::io::Error::other("heatmap node is not an object")))?
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Some(obj) = node.as_object_mut() {
        obj.insert(period.to_string(), stats.clone());
    }
    fs::write(hm_file, serde_json::to_vec_pretty(&root)?)?;
    Ok(())
}

/// Rewrite every heatmap file so its nesting mirrors the menu: same
/// keys, same order, stale subtrees dropped.
pub fn sync_heatmaps_to_menu(paths: &OutputPaths, menu: &Value) -> Result<(), EvalError> {
    if !paths.hm_dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(&paths.hm_dir).map_err(DataError::Io)? {
        let path = entry.map_err(DataError::Io)?.path();
        if crate::filename::parse_heatmap_filename(&path).is_none() {
            continue;
        }
        let old: Value =
            serde_json::from_slice(&fs::read(&path).map_err(DataError::Io)?).map_err(DataError::Json)?;
        let synced = project_onto_menu(&old, menu);
        fs::write(&path, serde_json::to_vec_pretty(&synced).map_err(DataError::Json)?)
            .map_err(DataError::Io)?;
    }
    Ok(())
}

/// Keep only the heatmap subtrees whose (var, obs, vert, model) path
/// exists in the menu, in menu order. Below the model layer the heatmap
/// carries its own structure (model_var -> period -> stats).
fn project_onto_menu(heatmap: &Value, menu: &Value) -> Value {
    fn walk(hm: &Value, menu: &Value, depth: usize) -> Option<Value> {
        if depth == 4 {
            // model layer reached; keep the heatmap payload as-is
            return Some(hm.clone());
        }
        let (hm_obj, menu_obj) = (hm.as_object()?, menu.as_object()?);
        let mut out = Map::new();
        for (key, menu_child) in menu_obj {
            if let Some(hm_child) = hm_obj.get(key) {
                if let Some(projected) = walk(hm_child, menu_child, depth + 1) {
                    out.insert(key.clone(), projected);
                }
            }
        }
        Some(Value::Object(out))
    }
    walk(heatmap, menu, 0).unwrap_or_else(|| Value::Object(Map::new()))
}

// ---------------------------------------------------------------------------
// Garbage collection
// ---------------------------------------------------------------------------

/// Delete on-disk artifacts that fail the same staleness check the menu
/// rebuild applies: map and colocated-data files for unconfigured
/// combinations, time-series files for unconfigured obs/variable pairs,
/// and model keys inside surviving time-series files. Destructive and
/// idempotent. Returns the number of removed files.
pub fn clean_json_files(paths: &OutputPaths, cfg: &ExperimentConfig) -> Result<usize, EvalError> {
    let mut removed = 0;

    if paths.map_dir.exists() {
        for entry in fs::read_dir(&paths.map_dir).map_err(DataError::Io)? {
            let path = entry.map_err(DataError::Io)?.path();
            let stale = match MapFileMeta::parse(&path) {
                Some(meta) => !is_valid_combination(
                    cfg,
                    &meta.obs_name,
                    &meta.obs_var,
                    meta.vert_code,
                    &meta.model_name,
                ),
                None => path.extension().and_then(|e| e.to_str()) == Some("json"),
            };
            if stale {
                log::info!("removing stale map file {}", path.display());
                fs::remove_file(&path).map_err(DataError::Io)?;
                removed += 1;
            }
        }
    }

    if paths.coldata_dir.exists() {
        for entry in fs::read_dir(&paths.coldata_dir).map_err(DataError::Io)? {
            let path = entry.map_err(DataError::Io)?.path();
            let Some(meta) = crate::filename::ColdataFileMeta::parse(&path) else {
                continue;
            };
            // constituent artifacts of super-observations are keyed by
            // the member entry, which may be only_superobs; those are
            // still needed
            let known_obs = cfg
                .obs_config
                .iter()
                .any(|(key, e)| e.display_name(key) == meta.obs_name && e.obs_vars.contains(&meta.obs_var));
            if !known_obs || !cfg.model_config.contains_key(&meta.model_name) {
                log::info!("removing stale colocated artifact {}", path.display());
                fs::remove_file(&path).map_err(DataError::Io)?;
                removed += 1;
            }
        }
    }

    if paths.ts_dir.exists() {
        for entry in fs::read_dir(&paths.ts_dir).map_err(DataError::Io)? {
            let path = entry.map_err(DataError::Io)?.path();
            match TsFileMeta::parse(&path) {
                Some(meta) => {
                    let valid = entry_for_display_name(cfg, &meta.obs_name)
                        .is_some_and(|(key, e)| {
                            e.obs_vars.contains(&meta.obs_var)
                                && e
                                    .vert_code_for(key, &meta.obs_var)
                                    .is_ok_and(|c| c == meta.vert_code)
                        });
                    if valid {
                        clean_ts_file(&path, cfg)?;
                    } else {
                        log::info!("removing stale time-series file {}", path.display());
                        fs::remove_file(&path).map_err(DataError::Io)?;
                        removed += 1;
                    }
                }
                None if path.extension().and_then(|e| e.to_str()) == Some("json") => {
                    fs::remove_file(&path).map_err(DataError::Io)?;
                    removed += 1;
                }
                None => {}
            }
        }
    }

    Ok(removed)
}

/// Strip model keys that are no longer configured from one time-series
/// file. Unreadable files are removed rather than left to poison later
/// runs.
fn clean_ts_file(path: &Path, cfg: &ExperimentConfig) -> Result<(), EvalError> {
    let parsed: Result<Value, _> = fs::read(path)
        .map_err(DataError::Io)
        .and_then(|data| serde_json::from_slice(&data).map_err(DataError::Json));
    let mut root = match parsed {
        Ok(Value::Object(obj)) => obj,
        _ => {
            log::warn!("removing unreadable time-series file {}", path.display());
            fs::remove_file(path).map_err(DataError::Io)?;
            return Ok(());
        }
    };
    let stale: Vec<String> = root
        .keys()
        .filter(|k| !cfg.model_config.contains_key(*k))
        .cloned()
        .collect();
    if stale.is_empty() {
        return Ok(());
    }
    for key in stale {
        log::info!("dropping stale model '{key}' from {}", path.display());
        root.remove(&key);
    }
    fs::write(path, serde_json::to_vec_pretty(&Value::Object(root)).map_err(DataError::Json)?)
        .map_err(DataError::Io)?;
    Ok(())
}
