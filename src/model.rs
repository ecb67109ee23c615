/// Core vocabulary types shared by the whole evaluation pipeline.
///
/// This module defines the categorical labels that tag every time series
/// and every persisted artifact: temporal resolution (`TsType`), vertical
/// scheme (`VerticalCode`) and resampling aggregation (`ResampleHow`).
/// It contains no logic beyond label handling, no I/O, and no external
/// dependencies — only types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Temporal resolution
// ---------------------------------------------------------------------------

/// Categorical temporal resolution of a time series, ordered from finest
/// to coarsest. The derived `Ord` follows that ordering, so the *maximum*
/// of a set of `TsType`s is the lowest (coarsest) common resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TsType {
    Hourly,
    Daily,
    Monthly,
    Yearly,
}

impl TsType {
    pub const ALL: &'static [TsType] = &[
        TsType::Hourly,
        TsType::Daily,
        TsType::Monthly,
        TsType::Yearly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TsType::Hourly => "hourly",
            TsType::Daily => "daily",
            TsType::Monthly => "monthly",
            TsType::Yearly => "yearly",
        }
    }

    /// True if `self` has lower resolution (wider periods) than `other`.
    pub fn is_coarser_than(&self, other: TsType) -> bool {
        self > &other
    }

    /// The coarsest entry of a non-empty set of frequencies. Resampling
    /// never upsamples, so the coarsest input always wins.
    pub fn lowest_resolution<I>(freqs: I) -> Option<TsType>
    where
        I: IntoIterator<Item = TsType>,
    {
        freqs.into_iter().max()
    }
}

impl fmt::Display for TsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TsType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hourly" => Ok(TsType::Hourly),
            "daily" => Ok(TsType::Daily),
            "monthly" => Ok(TsType::Monthly),
            "yearly" => Ok(TsType::Yearly),
            other => Err(ConfigError::UnknownTsType(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Vertical codes
// ---------------------------------------------------------------------------

/// Classification of how a variable's vertical extent is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VerticalCode {
    /// Value at the surface layer.
    Surface,
    /// Column-integrated quantity.
    Column,
    /// Native model levels; gridded data must carry a level dimension.
    ModelLevel,
    /// Vertical profile observation (e.g. lidar).
    Profile,
}

impl VerticalCode {
    pub const ALL: &'static [VerticalCode] = &[
        VerticalCode::Surface,
        VerticalCode::Column,
        VerticalCode::ModelLevel,
        VerticalCode::Profile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VerticalCode::Surface => "Surface",
            VerticalCode::Column => "Column",
            VerticalCode::ModelLevel => "ModelLevel",
            VerticalCode::Profile => "Profile",
        }
    }

    /// Colocation vertical-scheme parameter injected when the declared
    /// code names a known scheme alias. Codes without such an alias
    /// (e.g. `Column`) need no extraction step during colocation.
    pub fn scheme_alias(&self) -> Option<VerticalScheme> {
        match self {
            VerticalCode::Surface => Some(VerticalScheme::Surface),
            VerticalCode::ModelLevel => Some(VerticalScheme::SurfaceLevel),
            VerticalCode::Column | VerticalCode::Profile => None,
        }
    }
}

impl fmt::Display for VerticalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerticalCode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Surface" => Ok(VerticalCode::Surface),
            "Column" => Ok(VerticalCode::Column),
            "ModelLevel" => Ok(VerticalCode::ModelLevel),
            "Profile" => Ok(VerticalCode::Profile),
            other => Err(ConfigError::UnknownVertCode(other.to_string())),
        }
    }
}

/// Vertical extraction scheme applied to gridded model data during
/// colocation, resolved from the obs entry's declared `VerticalCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerticalScheme {
    /// Take the surface value directly (3-dim fields).
    Surface,
    /// Extract the lowest level from a 4-dim ModelLevel field.
    SurfaceLevel,
}

// ---------------------------------------------------------------------------
// Resampling aggregation
// ---------------------------------------------------------------------------

/// How samples within one target period are aggregated when resampling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleHow {
    #[default]
    Mean,
    Median,
}

impl ResampleHow {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResampleHow::Mean => "mean",
            ResampleHow::Median => "median",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
