/// Filename codecs for persisted artifacts.
///
/// Output directories are scanned statelessly: everything needed to
/// identify an artifact is encoded in its filename and must parse back
/// out losslessly. All codecs live here; call sites never split
/// filenames ad hoc.
///
/// Token grammar: fields are joined with '_', obs/model names are glued
/// to their variable with '-'. Losslessness relies on the name rules
/// enforced by [`validate_name`] and [`validate_var_name`]: names carry
/// no '_', variables are ASCII alphanumeric (so the rightmost '-' in a
/// name-variable token is always the glue).

use std::fmt;
use std::path::Path;

use crate::error::ConfigError;
use crate::model::{TsType, VerticalCode};

/// Hard limit on obs/model name length.
pub const NAME_MAX_LEN: usize = 25;
/// Names longer than this are accepted with a warning.
pub const NAME_WARN_LEN: usize = 20;

pub const FIELD_SEP: char = '_';
const NAME_VAR_SEP: char = '-';

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

/// Validate an obs or model name for use as a filename token.
pub fn validate_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.contains(FIELD_SEP) {
        return Err(ConfigError::ReservedCharInName {
            name: name.to_string(),
            sep: FIELD_SEP,
        });
    }
    if name.len() > NAME_MAX_LEN {
        return Err(ConfigError::NameTooLong {
            name: name.to_string(),
            len: name.len(),
            max: NAME_MAX_LEN,
        });
    }
    if name.len() > NAME_WARN_LEN {
        log::warn!(
            "name '{name}' is {} chars long, consider a shorter alias (<= {NAME_WARN_LEN})",
            name.len()
        );
    }
    Ok(())
}

/// Validate a variable name for use as a filename token.
pub fn validate_var_name(var_name: &str) -> Result<(), ConfigError> {
    if var_name.is_empty() || !var_name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConfigError::InvalidVarName(var_name.to_string()));
    }
    Ok(())
}

fn split_name_var(token: &str) -> Option<(&str, &str)> {
    let idx = token.rfind(NAME_VAR_SEP)?;
    let (name, var) = (&token[..idx], &token[idx + 1..]);
    if name.is_empty() || var.is_empty() {
        return None;
    }
    Some((name, var))
}

fn file_stem(path: &Path) -> Option<&str> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }
    path.file_stem().and_then(|s| s.to_str())
}

// ---------------------------------------------------------------------------
// Colocated data artifacts
// ---------------------------------------------------------------------------

/// Identity of a persisted colocated-data artifact, encoded as
/// `<OBS>-<OBSVAR>_<VERT>_<MODEL>-<MODVAR>_<TSTYPE>_<Y0>-<Y1>.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColdataFileMeta {
    pub obs_name: String,
    pub obs_var: String,
    pub vert_code: VerticalCode,
    pub model_name: String,
    pub model_var: String,
    pub ts_type: TsType,
    pub start_year: i32,
    pub stop_year: i32,
}

impl ColdataFileMeta {
    pub fn filename(&self) -> String {
        format!(
            "{}-{}_{}_{}-{}_{}_{}-{}.json",
            self.obs_name,
            self.obs_var,
            self.vert_code,
            self.model_name,
            self.model_var,
            self.ts_type,
            self.start_year,
            self.stop_year
        )
    }

    /// Parse an artifact filename. `None` for files that do not follow
    /// the grammar (directory scans skip those).
    pub fn parse(path: &Path) -> Option<ColdataFileMeta> {
        let stem = file_stem(path)?;
        let fields: Vec<&str> = stem.split(FIELD_SEP).collect();
        let [obs_token, vert, model_token, ts, years] = fields.as_slice() else {
            return None;
        };
        let (obs_name, obs_var) = split_name_var(obs_token)?;
        let (model_name, model_var) = split_name_var(model_token)?;
        let vert_code = vert.parse().ok()?;
        let ts_type = ts.parse().ok()?;
        let (y0, y1) = years.split_once(NAME_VAR_SEP)?;
        Some(ColdataFileMeta {
            obs_name: obs_name.to_string(),
            obs_var: obs_var.to_string(),
            vert_code,
            model_name: model_name.to_string(),
            model_var: model_var.to_string(),
            ts_type,
            start_year: y0.parse().ok()?,
            stop_year: y1.parse().ok()?,
        })
    }

    /// The map-JSON identity this artifact feeds.
    pub fn map_meta(&self) -> MapFileMeta {
        MapFileMeta {
            obs_name: self.obs_name.clone(),
            obs_var: self.obs_var.clone(),
            vert_code: self.vert_code,
            model_name: self.model_name.clone(),
            model_var: self.model_var.clone(),
        }
    }
}

impl fmt::Display for ColdataFileMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.filename())
    }
}

// ---------------------------------------------------------------------------
// Map JSON
// ---------------------------------------------------------------------------

/// Identity of a map-JSON file, encoded as
/// `<OBS>-<OBSVAR>_<VERT>_<MODEL>-<MODVAR>.json`. This is the 5-tuple
/// the menu is rebuilt from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MapFileMeta {
    pub obs_name: String,
    pub obs_var: String,
    pub vert_code: VerticalCode,
    pub model_name: String,
    pub model_var: String,
}

impl MapFileMeta {
    pub fn filename(&self) -> String {
        format!(
            "{}-{}_{}_{}-{}.json",
            self.obs_name, self.obs_var, self.vert_code, self.model_name, self.model_var
        )
    }

    pub fn parse(path: &Path) -> Option<MapFileMeta> {
        let stem = file_stem(path)?;
        let fields: Vec<&str> = stem.split(FIELD_SEP).collect();
        let [obs_token, vert, model_token] = fields.as_slice() else {
            return None;
        };
        let (obs_name, obs_var) = split_name_var(obs_token)?;
        let (model_name, model_var) = split_name_var(model_token)?;
        Some(MapFileMeta {
            obs_name: obs_name.to_string(),
            obs_var: obs_var.to_string(),
            vert_code: vert.parse().ok()?,
            model_name: model_name.to_string(),
            model_var: model_var.to_string(),
        })
    }

    /// The time-series file this combination writes into (models are
    /// merged inside that file, keyed by model name).
    pub fn ts_meta(&self) -> TsFileMeta {
        TsFileMeta {
            obs_name: self.obs_name.clone(),
            obs_var: self.obs_var.clone(),
            vert_code: self.vert_code,
        }
    }
}

impl fmt::Display for MapFileMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.filename())
    }
}

// ---------------------------------------------------------------------------
// Time-series JSON
// ---------------------------------------------------------------------------

/// Identity of a time-series JSON file, encoded as
/// `OBS-<OBS>_<OBSVAR>_<VERT>.json`. One file per obs/variable/vertical
/// combination; model curves live inside, keyed by model name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TsFileMeta {
    pub obs_name: String,
    pub obs_var: String,
    pub vert_code: VerticalCode,
}

impl TsFileMeta {
    pub fn filename(&self) -> String {
        format!("OBS-{}_{}_{}.json", self.obs_name, self.obs_var, self.vert_code)
    }

    pub fn parse(path: &Path) -> Option<TsFileMeta> {
        let stem = file_stem(path)?;
        let fields: Vec<&str> = stem.split(FIELD_SEP).collect();
        let [obs_token, obs_var, vert] = fields.as_slice() else {
            return None;
        };
        let obs_name = obs_token.strip_prefix("OBS-")?;
        if obs_name.is_empty() || obs_var.is_empty() {
            return None;
        }
        Some(TsFileMeta {
            obs_name: obs_name.to_string(),
            obs_var: obs_var.to_string(),
            vert_code: vert.parse().ok()?,
        })
    }
}

impl fmt::Display for TsFileMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.filename())
    }
}

// ---------------------------------------------------------------------------
// Heatmap JSON
// ---------------------------------------------------------------------------

/// Filename of the per-frequency statistics heatmap.
pub fn heatmap_filename(freq: TsType) -> String {
    format!("glob_stats_{freq}.json")
}

pub fn parse_heatmap_filename(path: &Path) -> Option<TsType> {
    let stem = file_stem(path)?;
    stem.strip_prefix("glob_stats_")?.parse().ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_coldata_filename_round_trip() {
        let meta = ColdataFileMeta {
            obs_name: "EEA".to_string(),
            obs_var: "concno2".to_string(),
            vert_code: VerticalCode::Surface,
            model_name: "EMEP".to_string(),
            model_var: "concno2".to_string(),
            ts_type: TsType::Daily,
            start_year: 2019,
            stop_year: 2020,
        };
        let name = meta.filename();
        assert_eq!(name, "EEA-concno2_Surface_EMEP-concno2_daily_2019-2020.json");
        assert_eq!(ColdataFileMeta::parse(&PathBuf::from(name)), Some(meta));
    }

    #[test]
    fn test_coldata_round_trip_with_remapped_model_var() {
        let meta = ColdataFileMeta {
            obs_name: "AeronetSun".to_string(),
            obs_var: "od550aer".to_string(),
            vert_code: VerticalCode::Column,
            model_name: "ECMWF-IFS".to_string(),
            model_var: "od550csaer".to_string(),
            ts_type: TsType::Monthly,
            start_year: 2010,
            stop_year: 2010,
        };
        let parsed = ColdataFileMeta::parse(&PathBuf::from(meta.filename())).unwrap();
        // names may themselves contain '-'; the rightmost one is the glue
        assert_eq!(parsed.model_name, "ECMWF-IFS");
        assert_eq!(parsed.model_var, "od550csaer");
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_map_filename_round_trip() {
        let meta = MapFileMeta {
            obs_name: "EEA".to_string(),
            obs_var: "concno2".to_string(),
            vert_code: VerticalCode::Surface,
            model_name: "EMEP".to_string(),
            model_var: "concno2".to_string(),
        };
        let name = meta.filename();
        assert_eq!(name, "EEA-concno2_Surface_EMEP-concno2.json");
        assert_eq!(MapFileMeta::parse(&PathBuf::from(name)), Some(meta));
    }

    #[test]
    fn test_ts_filename_round_trip() {
        let meta = TsFileMeta {
            obs_name: "EEA".to_string(),
            obs_var: "concno2".to_string(),
            vert_code: VerticalCode::Surface,
        };
        let name = meta.filename();
        assert_eq!(name, "OBS-EEA_concno2_Surface.json");
        assert_eq!(TsFileMeta::parse(&PathBuf::from(name)), Some(meta));
    }

    #[test]
    fn test_foreign_files_are_skipped() {
        for name in [
            "menu.json",
            "notes.txt",
            "EEA-concno2_Surface.json",
            "EEA_concno2_Surface_EMEP_concno2.json",
        ] {
            assert_eq!(ColdataFileMeta::parse(&PathBuf::from(name)), None, "{name}");
        }
        assert_eq!(MapFileMeta::parse(&PathBuf::from("menu.json")), None);
    }

    #[test]
    fn test_heatmap_filename_round_trip() {
        let name = heatmap_filename(TsType::Monthly);
        assert_eq!(name, "glob_stats_monthly.json");
        assert_eq!(
            parse_heatmap_filename(&PathBuf::from(name)),
            Some(TsType::Monthly)
        );
        assert_eq!(parse_heatmap_filename(&PathBuf::from("glob_stats.json")), None);
    }

    #[test]
    fn test_validate_name_rules() {
        assert!(validate_name("EMEP").is_ok());
        assert!(validate_name("ECMWF-IFS").is_ok());
        assert!(matches!(
            validate_name("EMEP_ctl"),
            Err(ConfigError::ReservedCharInName { .. })
        ));
        assert!(matches!(
            validate_name(""),
            Err(ConfigError::ReservedCharInName { .. })
        ));
        let long = "a".repeat(26);
        assert!(matches!(
            validate_name(&long),
            Err(ConfigError::NameTooLong { .. })
        ));
        // 21..=25 chars: accepted (with a warning)
        assert!(validate_name(&"a".repeat(21)).is_ok());
    }

    #[test]
    fn test_validate_var_name_rules() {
        assert!(validate_var_name("od550aer").is_ok());
        assert!(validate_var_name("concno2").is_ok());
        for bad in ["", "od550_aer", "od550-aer", "od550 aer"] {
            assert!(matches!(
                validate_var_name(bad),
                Err(ConfigError::InvalidVarName(_))
            ));
        }
    }
}
