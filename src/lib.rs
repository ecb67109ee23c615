//! Atmospheric model evaluation service.
//!
//! Colocates gridded model fields with surface observation networks,
//! computes skill statistics, and maintains the JSON output tree
//! (menu, map, time-series and heatmap files) of an evaluation
//! experiment. Model and observation access goes through the reader
//! traits in [`colocation`], so the engine is independent of any
//! particular storage backend.

pub mod colocation;
pub mod config;
pub mod error;
pub mod experiment;
pub mod filename;
pub mod logging;
pub mod menu;
pub mod model;
pub mod paths;
pub mod station;
pub mod stats;
pub mod superobs;
pub mod timeseries;
pub mod variables;
