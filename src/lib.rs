//! Batch driver for the walkhex accessibility pipeline: TOML run
//! configuration, a multi-city runner that skips failing cities, and
//! CSV / GeoJSON export.

pub mod config;
pub mod error;
pub mod export;
pub mod runner;

pub use config::{CityConfig, RunConfig};
pub use error::RunError;
pub use runner::{CityOutcome, IsochroneRequest, RunSummary, isochrones, run};
