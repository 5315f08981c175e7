//! Run configuration read from a TOML file

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkhex_core::hex::HexResolution;
use walkhex_core::index::IndexConfig;
use walkhex_core::loading::GraphBuilderConfig;
use walkhex_core::pipeline::AnalysisConfig;

use crate::error::RunError;

/// Rows written per CSV flush
pub const DEFAULT_CHUNK_ROWS: usize = 10_000;

fn default_chunk_rows() -> usize {
    DEFAULT_CHUNK_ROWS
}

fn default_id_column() -> String {
    "osmid".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Partition key of the tidy outputs; generated from the clock if absent
    #[serde(default)]
    pub run_id: Option<String>,
    pub output_dir: PathBuf,
    #[serde(default = "default_chunk_rows")]
    pub chunk_rows: usize,
    #[serde(default)]
    pub graph: GraphBuilderConfig,
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub index: Option<IndexConfig>,
    #[serde(default)]
    pub hex: HexOutputConfig,
    pub cities: Vec<CityConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HexOutputConfig {
    /// Node attribute used as aggregation weight (e.g. population)
    pub weight_column: Option<String>,
    /// Coarser H3 resolutions to re-aggregate every hex table to
    pub coarsen_to: Vec<u8>,
    pub geojson: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CityConfig {
    pub name: String,
    pub nodes: PathBuf,
    pub edges: PathBuf,
    pub pois: PathBuf,
    #[serde(default)]
    pub attributes: Option<AttributeSource>,
    /// Hex tables to aggregate onto
    #[serde(default)]
    pub hex_grids: Vec<HexGridSource>,
    /// H3 resolutions generated over the street network extent
    #[serde(default)]
    pub h3_resolutions: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributeSource {
    pub path: PathBuf,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HexGridSource {
    pub resolution: u8,
    pub path: PathBuf,
}

impl RunConfig {
    /// Reads and validates a configuration file. Relative paths inside it
    /// are resolved against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, RunError> {
        let text = std::fs::read_to_string(path).map_err(|e| RunError::io(path, e))?;
        let mut config: RunConfig = toml::from_str(&text).map_err(|source| RunError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, RunError> {
        let config: RunConfig = toml::from_str(text).map_err(|source| RunError::Toml {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.output_dir);
        for city in &mut self.cities {
            resolve(&mut city.nodes);
            resolve(&mut city.edges);
            resolve(&mut city.pois);
            if let Some(attributes) = &mut city.attributes {
                resolve(&mut attributes.path);
            }
            for grid in &mut city.hex_grids {
                resolve(&mut grid.path);
            }
        }
    }

    pub fn validate(&self) -> Result<(), RunError> {
        if self.cities.is_empty() {
            return Err(RunError::Config("no cities configured".to_string()));
        }
        if self.chunk_rows == 0 {
            return Err(RunError::Config("chunk_rows must be at least 1".to_string()));
        }
        if let Some(run_id) = &self.run_id
            && (run_id.is_empty() || run_id.contains(['/', '\\']))
        {
            return Err(RunError::Config(format!("invalid run id '{run_id}'")));
        }

        let mut names = BTreeSet::new();
        for city in &self.cities {
            if !names.insert(city.name.as_str()) {
                return Err(RunError::Config(format!(
                    "city '{}' is configured twice",
                    city.name
                )));
            }
            for res in city
                .hex_grids
                .iter()
                .map(|g| g.resolution)
                .chain(city.h3_resolutions.iter().copied())
            {
                HexResolution::try_from(res)?;
            }
        }
        for &res in &self.hex.coarsen_to {
            HexResolution::try_from(res)?;
        }
        Ok(())
    }

    /// Configured run id, or a UTC timestamp
    pub fn resolve_run_id(&self) -> String {
        self.run_id
            .clone()
            .unwrap_or_else(|| chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walkhex_core::model::{Crs, Weight};

    const CONFIG: &str = r#"
        run_id = "2024-aguascalientes"
        output_dir = "out"

        [graph]
        crs = "projected"
        walking_speed_kmh = 4.0

        [analysis]
        weight = "time_min"
        batch_size = 100
        shards = 4
        categories = [
            { name = "farmacia", codes = ["464111", "464112"] },
            { name = "hospitales", codes = ["622111", "622112"] },
        ]

        [index]
        components = [
            { category = "farmacia", k = 0.2, midpoint = 15.0, weight = 0.5 },
            { category = "hospitales", k = 0.05, midpoint = 45.0, weight = 0.5 },
        ]

        [hex]
        weight_column = "pobtot"

        [[cities]]
        name = "Aguascalientes"
        nodes = "ags/nodes.csv"
        edges = "ags/edges.csv"
        pois = "ags/denue.csv"
        attributes = { path = "ags/population.csv", columns = ["pobtot"] }
        hex_grids = [{ resolution = 8, path = "ags/hex8.csv" }]
    "#;

    #[test]
    fn parses_full_config() {
        let config = RunConfig::from_toml(CONFIG).unwrap();
        assert_eq!(config.graph.crs, Crs::Projected);
        assert_eq!(config.analysis.weight, Weight::TimeMin);
        assert_eq!(config.analysis.categories[1].codes, ["622111", "622112"]);
        assert_eq!(config.analysis.shards, Some(4));
        assert_eq!(config.chunk_rows, DEFAULT_CHUNK_ROWS);
        assert_eq!(config.hex.weight_column.as_deref(), Some("pobtot"));
        let attributes = config.cities[0].attributes.as_ref().unwrap();
        assert_eq!(attributes.id_column, "osmid");
        assert_eq!(config.resolve_run_id(), "2024-aguascalientes");
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let mut config = RunConfig::from_toml(CONFIG).unwrap();
        config.resolve_paths(Path::new("/data/runs"));
        assert_eq!(config.output_dir, Path::new("/data/runs/out"));
        assert_eq!(config.cities[0].hex_grids[0].path, Path::new("/data/runs/ags/hex8.csv"));
    }

    #[test]
    fn rejects_bad_resolution() {
        let text = CONFIG.replace("resolution = 8", "resolution = 16");
        assert!(matches!(RunConfig::from_toml(&text), Err(RunError::Core(_))));
    }

    #[test]
    fn rejects_duplicate_cities() {
        let mut config = RunConfig::from_toml(CONFIG).unwrap();
        config.cities.push(config.cities[0].clone());
        assert!(matches!(config.validate(), Err(RunError::Config(_))));
    }
}
