//! Per-category proximity analysis over a street graph

use std::time::Instant;

use itertools::Itertools;
use log::{info, warn};
use serde::Deserialize;

use crate::{
    Cost, Error, StreetNodeId,
    algo::{BatchDriver, NearestQuery, SnapConfig},
    loading::validate_poi_coverage,
    model::{AmenityCategory, Column, ColumnStore, CostTable, NodeFrame, Poi, StreetGraph, Weight},
};

pub const DEFAULT_BATCH_SIZE: usize = 250;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    pub categories: Vec<AmenityCategory>,
    #[serde(default)]
    pub weight: Weight,
    /// Points of interest routed per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_cost: Option<Cost>,
    #[serde(default)]
    pub reach_budget: Option<Cost>,
    #[serde(default)]
    pub snap: SnapConfig,
    /// Split the origins into this many shards computed in parallel; a
    /// failed shard is retried once before the category is given up
    #[serde(default)]
    pub shards: Option<usize>,
}

impl AnalysisConfig {
    pub fn new(categories: Vec<AmenityCategory>) -> Self {
        Self {
            categories,
            weight: Weight::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_cost: None,
            reach_budget: None,
            snap: SnapConfig::default(),
            shards: None,
        }
    }

    pub fn query(&self) -> NearestQuery {
        NearestQuery {
            weight: self.weight,
            max_cost: self.max_cost,
            reach_budget: self.reach_budget,
            snap: self.snap,
        }
    }

    fn validate(&self) -> Result<(), Error> {
        if let Some(name) = self.categories.iter().map(|c| &c.name).duplicates().next() {
            return Err(Error::InvalidConfig(format!(
                "category '{name}' is defined twice"
            )));
        }
        if let Some(c) = self.categories.iter().find(|c| c.codes.is_empty()) {
            return Err(Error::InvalidConfig(format!(
                "category '{}' has no codes",
                c.name
            )));
        }
        if self.shards == Some(0) {
            return Err(Error::InvalidConfig(
                "shards must be at least 1".to_string(),
            ));
        }
        for (name, value) in [("max_cost", self.max_cost), ("reach_budget", self.reach_budget)] {
            if value.is_some_and(|v| !(v.is_finite() && v >= 0.0)) {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be a non-negative number"
                )));
            }
        }
        Ok(())
    }
}

/// Category that could not be computed
#[derive(Debug)]
pub struct CategoryFailure {
    pub category: String,
    pub error: Error,
}

/// Node table with one `dist_<category>` column per computed category
#[derive(Debug)]
pub struct AnalysisReport {
    pub frame: NodeFrame,
    pub failures: Vec<CategoryFailure>,
}

/// Nearest-POI cost from every node of `graph` for each configured category.
///
/// A category without any point of interest gets a column of missing values.
/// Other recoverable failures skip the category and are listed in
/// [`AnalysisReport::failures`]; the remaining categories are still computed.
///
/// # Errors
///
/// Invalid configuration, or a failure that leaves the node table
/// inconsistent.
pub fn proximity_analysis(
    graph: &StreetGraph,
    pois: &[Poi],
    config: &AnalysisConfig,
) -> Result<AnalysisReport, Error> {
    config.validate()?;
    let driver = BatchDriver::new(graph, config.batch_size)?;
    let query = config.query();

    validate_poi_coverage(graph, pois);

    let mut frame = NodeFrame::from_graph(graph);
    let origins = frame.ids().to_vec();
    let mut failures = Vec::new();

    for category in &config.categories {
        let start = Instant::now();
        let selected = category.select(pois);

        match run_category(&driver, &origins, &selected, &category.name, &query, config.shards) {
            Ok(table) => {
                frame.insert_cost_table(&table)?;
                info!(
                    "'{}': {} points of interest, {} unreachable nodes, {:.2?}",
                    category.name,
                    selected.len(),
                    table.unreachable_count(),
                    start.elapsed()
                );
            }
            Err(Error::EmptyDestinationSet(_)) => {
                warn!(
                    "No points of interest for '{}' (codes {}) - column left empty",
                    category.name,
                    category.codes.iter().join(", ")
                );
                frame.insert_cost_table(&CostTable::missing(&category.name, config.weight, &origins))?;
                if config.reach_budget.is_some() {
                    frame.insert_column(
                        Column::Reachable(category.name.clone()),
                        vec![Some(0.0); origins.len()],
                    )?;
                }
            }
            Err(error) if error.is_recoverable() => {
                warn!("Skipping '{}': {error}", category.name);
                failures.push(CategoryFailure {
                    category: category.name.clone(),
                    error,
                });
            }
            Err(error) => return Err(error),
        }
    }

    if !failures.is_empty() {
        warn!(
            "{} categories failed: {}",
            failures.len(),
            failures.iter().map(|f| &f.category).join(", ")
        );
    }

    Ok(AnalysisReport { frame, failures })
}

/// One category through the batch driver, sharded over the origins when
/// more than one shard is configured
fn run_category(
    driver: &BatchDriver<'_>,
    origins: &[StreetNodeId],
    pois: &[&Poi],
    category: &str,
    query: &NearestQuery,
    shards: Option<usize>,
) -> Result<CostTable, Error> {
    let Some(shards) = shards.filter(|&n| n > 1) else {
        return driver.run(origins, pois, category, query);
    };
    if pois.is_empty() {
        return Err(Error::EmptyDestinationSet(category.to_string()));
    }

    let mut run = driver.run_sharded(origins, pois, category, query, shards)?;
    if !run.is_complete() {
        info!("'{category}': retrying {} failed shards", run.failed.len());
        run = driver.retry_failed(run, pois, category, query);
    }
    run.into_table()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loading::{EdgeRow, GraphBuilderConfig, NodeRow, build_street_graph};
    use crate::model::Crs;
    use geo::Point;

    // A --100-- B --200-- C
    fn graph() -> StreetGraph {
        let nodes = [(1, 0.0), (2, 100.0), (3, 300.0)]
            .into_iter()
            .map(|(osmid, x)| NodeRow {
                osmid,
                x,
                y: 0.0,
                street_count: None,
                elevation: None,
            })
            .collect::<Vec<_>>();
        let edges = [(1, 2, 100.0), (2, 3, 200.0)]
            .into_iter()
            .map(|(u, v, length)| EdgeRow {
                u,
                v,
                key: 0,
                length: Some(length),
                highway: vec![],
                grade: None,
                walkspeed: None,
                time_min: None,
                geometry: None,
            })
            .collect::<Vec<_>>();
        let config = GraphBuilderConfig {
            crs: Crs::Projected,
            ..GraphBuilderConfig::default()
        };
        build_street_graph(&nodes, &edges, &config).unwrap()
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig::new(vec![
            AmenityCategory::new("pharmacy", &["464111", "464112"]),
            AmenityCategory::new("hospital", &["622111"]),
        ])
    }

    #[test]
    fn pharmacy_and_empty_hospital_columns() {
        let graph = graph();
        let pois = vec![Poi {
            id: "f1".to_string(),
            code: "464112".to_string(),
            geometry: Point::new(300.0, 0.0),
        }];

        let report = proximity_analysis(&graph, &pois, &config()).unwrap();
        assert!(report.failures.is_empty());

        let pharmacy = report.frame.require(&Column::Distance("pharmacy".into())).unwrap();
        assert_eq!(pharmacy, &[Some(300.0), Some(200.0), Some(0.0)]);
        let hospital = report.frame.require(&Column::Distance("hospital".into())).unwrap();
        assert_eq!(hospital, &[None, None, None]);
    }

    #[test]
    fn sharded_run_matches_single_run() {
        let graph = graph();
        let pois = vec![Poi {
            id: "f1".to_string(),
            code: "464111".to_string(),
            geometry: Point::new(100.0, 0.0),
        }];
        let single = proximity_analysis(&graph, &pois, &config()).unwrap();

        let mut sharded_config = config();
        sharded_config.shards = Some(2);
        let sharded = proximity_analysis(&graph, &pois, &sharded_config).unwrap();
        assert!(sharded.failures.is_empty());

        for column in ["pharmacy", "hospital"].map(|c| Column::Distance(c.into())) {
            assert_eq!(
                sharded.frame.require(&column).unwrap(),
                single.frame.require(&column).unwrap()
            );
        }
        let pharmacy = sharded.frame.require(&Column::Distance("pharmacy".into())).unwrap();
        assert_eq!(pharmacy, &[Some(100.0), Some(0.0), Some(200.0)]);
    }

    #[test]
    fn zero_shards_is_rejected() {
        let graph = graph();
        let mut config = config();
        config.shards = Some(0);
        assert!(matches!(
            proximity_analysis(&graph, &[], &config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn duplicate_categories_are_rejected() {
        let graph = graph();
        let config = AnalysisConfig::new(vec![
            AmenityCategory::new("pharmacy", &["464111"]),
            AmenityCategory::new("pharmacy", &["464112"]),
        ]);
        let err = proximity_analysis(&graph, &[], &config).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let graph = graph();
        let mut config = config();
        config.batch_size = 0;
        assert!(proximity_analysis(&graph, &[], &config).is_err());
    }

    #[test]
    fn config_parses_with_defaults() {
        let config: AnalysisConfig = serde_json::from_str(
            r#"{"categories": [{"name": "farmacia", "codes": ["464111"]}], "weight": "time_min"}"#,
        )
        .unwrap();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.weight, Weight::TimeMin);
        assert_eq!(config.snap.max_snap_distance, None);
    }
}
