/// Super-observations: virtual observation networks whose colocated data
/// is the concatenation of previously colocated constituent networks.
///
/// Constituents are located through the stateless artifact-directory
/// scan (exactly one file each), resampled to the coarsest constituent
/// frequency using each artifact's *own* resampling metadata, and
/// concatenated along the station axis. The merged artifact is handed
/// straight to the statistics layer and never persisted.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::colocation::{find_coldata_files, ColocatedData};
use crate::error::{ConsistencyError, DataError, EvalError};
use crate::model::TsType;

/// Load the single colocated artifact for one constituent. Zero or more
/// than one matching file is a data error; a previous colocation pass
/// must have produced exactly one.
pub fn load_member_coldata(
    dir: &Path,
    model_name: &str,
    obs_name: &str,
    obs_var: &str,
) -> Result<ColocatedData, DataError> {
    let hits = find_coldata_files(dir, model_name, obs_name, obs_var)?;
    match hits.as_slice() {
        [] => Err(DataError::NoColdataFiles {
            model_name: model_name.to_string(),
            obs_name: obs_name.to_string(),
            var_name: obs_var.to_string(),
        }),
        [(path, _)] => ColocatedData::from_json_file(path),
        many => Err(DataError::AmbiguousColdataFiles {
            model_name: model_name.to_string(),
            obs_name: obs_name.to_string(),
            var_name: obs_var.to_string(),
            count: many.len(),
        }),
    }
}

/// Merge constituent artifacts into one super-observation artifact
/// labelled `superobs_name`.
///
/// All constituents must share one vertical code; the merged frequency
/// is the coarsest constituent frequency; station names must be
/// disjoint across constituents.
pub fn merge_superobs(
    superobs_name: &str,
    members: &[ColocatedData],
) -> Result<ColocatedData, EvalError> {
    let [first, rest @ ..] = members else {
        return Err(DataError::NoColdataFiles {
            model_name: String::new(),
            obs_name: superobs_name.to_string(),
            var_name: String::new(),
        }
        .into());
    };

    for member in rest {
        if member.meta.vert_code != first.meta.vert_code {
            return Err(ConsistencyError::VertCodeMismatch {
                superobs_name: superobs_name.to_string(),
                details: format!(
                    "'{}' is {} but '{}' is {}",
                    first.meta.data_source.0,
                    first.meta.vert_code,
                    member.meta.data_source.0,
                    member.meta.vert_code
                ),
            }
            .into());
        }
    }

    // coarsest constituent frequency wins
    let ts_type = TsType::lowest_resolution(members.iter().map(|m| m.meta.ts_type))
        .unwrap_or(first.meta.ts_type);
    let resampled: Vec<ColocatedData> = members.iter().map(|m| m.resample_time(ts_type)).collect();

    // union time axis across constituents, gaps filled with None
    let axis: Vec<DateTime<Utc>> = {
        let set: BTreeSet<DateTime<Utc>> = resampled
            .iter()
            .flat_map(|m| m.time.iter().copied())
            .collect();
        set.into_iter().collect()
    };
    if axis.is_empty() {
        return Err(ConsistencyError::DisjointTimeAxes(ts_type.to_string()).into());
    }

    let mut out = ColocatedData {
        meta: first.meta.clone(),
        station_names: Vec::new(),
        latitude: Vec::new(),
        longitude: Vec::new(),
        altitude: Vec::new(),
        time: axis.clone(),
        obs_vals: Vec::new(),
        model_vals: Vec::new(),
    };
    out.meta.data_source.0 = superobs_name.to_string();
    out.meta.ts_type = ts_type;
    out.meta.start_year = members.iter().map(|m| m.meta.start_year).min().unwrap_or(0);
    out.meta.stop_year = members.iter().map(|m| m.meta.stop_year).max().unwrap_or(0);

    let mut seen: BTreeSet<String> = BTreeSet::new();
    for member in &resampled {
        let on_axis = |row: &[Option<f64>]| -> Vec<Option<f64>> {
            let by_time: std::collections::BTreeMap<DateTime<Utc>, Option<f64>> =
                member.time.iter().copied().zip(row.iter().copied()).collect();
            axis.iter()
                .map(|t| by_time.get(t).copied().flatten())
                .collect()
        };
        for (i, name) in member.station_names.iter().enumerate() {
            if !seen.insert(name.clone()) {
                return Err(ConsistencyError::DuplicateStation(name.clone()).into());
            }
            out.station_names.push(name.clone());
            out.latitude.push(member.latitude[i]);
            out.longitude.push(member.longitude[i]);
            out.altitude.push(member.altitude[i]);
            out.obs_vals.push(on_axis(&member.obs_vals[i]));
            out.model_vals.push(on_axis(&member.model_vals[i]));
        }
    }
    Ok(out)
}
