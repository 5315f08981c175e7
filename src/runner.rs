//! Multi-city driver.
//!
//! Each city runs the full pipeline independently: a failing city is logged
//! and skipped, and the outputs of the others are still written.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, error, info, info_span, warn};
use walkhex_core::algo::bulk_isochrones;
use walkhex_core::hex::{HexGrid, HexResolution, HexTable, group_by_hex};
use walkhex_core::index::CompositeIndex;
use walkhex_core::loading::{
    GraphBuilderConfig, build_street_graph, open_table, read_edges, read_hex_grid,
    read_hex_table, read_node_attributes, read_nodes, read_pois,
};
use walkhex_core::model::{Column, ColumnStore, Crs, NodeFrame, StreetGraph, Weight};
use walkhex_core::{Cost, StreetNodeId};

use crate::config::{CityConfig, RunConfig};
use crate::error::RunError;
use crate::export::{
    create_file, isochrones_to_geojson, run_partition, write_hex_geojson, write_hex_table,
    write_node_table, write_tidy,
};

#[derive(Debug)]
pub struct CityOutcome {
    pub city: String,
    pub nodes: usize,
    pub failed_categories: Vec<String>,
    /// Hexes written per resolution
    pub hexes: BTreeMap<HexResolution, usize>,
    pub orphans: usize,
}

#[derive(Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub completed: Vec<CityOutcome>,
    pub failed: Vec<(String, RunError)>,
}

/// Runs every configured city
pub fn run(config: &RunConfig) -> Result<RunSummary, RunError> {
    let run_id = config.resolve_run_id();
    let index = config
        .index
        .clone()
        .map(CompositeIndex::new)
        .transpose()?;
    info!(run_id = %run_id, cities = config.cities.len(), "Starting run");

    let mut summary = RunSummary {
        run_id,
        completed: Vec::new(),
        failed: Vec::new(),
    };
    for city in &config.cities {
        let _span = info_span!("city", name = %city.name).entered();
        let start = Instant::now();
        match run_city(city, config, index.as_ref(), &summary.run_id) {
            Ok(outcome) => {
                info!(elapsed = ?start.elapsed(), "City done");
                summary.completed.push(outcome);
            }
            Err(e) => {
                error!(error = %e, "City failed, skipping");
                summary.failed.push((city.name.clone(), e));
            }
        }
    }

    info!(
        completed = summary.completed.len(),
        failed = summary.failed.len(),
        "Run finished"
    );
    Ok(summary)
}

fn load_graph(nodes: &Path, edges: &Path, config: &GraphBuilderConfig) -> Result<StreetGraph, RunError> {
    let nodes = read_nodes(open_table(nodes)?)?;
    let edges = read_edges(open_table(edges)?)?;
    Ok(build_street_graph(&nodes, &edges, config)?)
}

fn run_city(
    city: &CityConfig,
    config: &RunConfig,
    index: Option<&CompositeIndex>,
    run_id: &str,
) -> Result<CityOutcome, RunError> {
    let graph = load_graph(&city.nodes, &city.edges, &config.graph)?;
    let pois = read_pois(open_table(&city.pois)?)?;

    let report = walkhex_core::pipeline::proximity_analysis(&graph, &pois, &config.analysis)?;
    let mut frame = report.frame;
    let failed_categories: Vec<String> =
        report.failures.into_iter().map(|f| f.category).collect();

    if let Some(attributes) = &city.attributes {
        let names: Vec<&str> = attributes.columns.iter().map(String::as_str).collect();
        for (column, values) in
            read_node_attributes(open_table(&attributes.path)?, &attributes.id_column, &names)?
        {
            frame.join_column(column, &values);
        }
    }

    if let Some(index) = index
        && let Err(e) = index.apply(&mut frame)
    {
        warn!(error = %e, "Node index skipped");
    }

    let city_dir = config.output_dir.join(&city.name);
    let partition = run_partition(&config.output_dir, &city.name, run_id);
    let tidy_path = partition.join("nodes_tidy.csv");
    let rows = write_tidy(
        create_file(&tidy_path)?,
        run_id,
        &frame.to_records(),
        config.chunk_rows,
    )?;
    info!(rows, path = %tidy_path.display(), "Wrote tidy node table");
    write_node_table(create_file(&partition.join("nodes.csv"))?, &frame)?;

    let tables = aggregate_hexes(city, config, &graph, &frame)?;
    let mut hexes = BTreeMap::new();
    let mut orphans = 0;
    for (resolution, (table, orphan_count)) in tables {
        orphans += orphan_count;

        for &target in &config.hex.coarsen_to {
            let target = HexResolution::try_from(target)?;
            if target >= resolution {
                continue;
            }
            match table.coarsen(target) {
                Ok(coarse) => {
                    let written = write_hex_outputs(&city_dir, coarse, config.hex.geojson)?;
                    hexes.insert(target, written);
                }
                Err(e) => warn!(%resolution, %target, error = %e, "Re-aggregation skipped"),
            }
        }

        let written = write_hex_outputs(&city_dir, table, config.hex.geojson)?;
        hexes.insert(resolution, written);
    }

    Ok(CityOutcome {
        city: city.name.clone(),
        nodes: frame.row_count(),
        failed_categories,
        hexes,
        orphans,
    })
}

/// Hex tables per resolution with their orphan counts. Several grids at
/// the same resolution are merged into one table keyed by hex id.
///
/// Every node result column is averaged, so hex `idx_` columns are the
/// (weighted) means of the node-level indices.
fn aggregate_hexes(
    city: &CityConfig,
    config: &RunConfig,
    graph: &StreetGraph,
    frame: &NodeFrame,
) -> Result<BTreeMap<HexResolution, (HexTable, usize)>, RunError> {
    let mut grids: Vec<HexGrid> = Vec::new();
    for source in &city.hex_grids {
        let grid = read_hex_grid(open_table(&source.path)?)?;
        if u8::from(grid.resolution()) != source.resolution {
            return Err(RunError::Config(format!(
                "{} holds resolution {} hexes, expected {}",
                source.path.display(),
                grid.resolution(),
                source.resolution
            )));
        }
        grids.push(grid);
    }
    if !city.h3_resolutions.is_empty() {
        if graph.projection().crs() == Crs::Geographic {
            let area = graph.coverage();
            for &res in &city.h3_resolutions {
                grids.push(HexGrid::covering(&area, HexResolution::try_from(res)?)?);
            }
        } else {
            warn!("H3 grids need geographic coordinates; skipping generated grids");
        }
    }

    let value_columns: Vec<Column> = frame
        .columns()
        .into_iter()
        .filter(|c| !matches!(c, Column::Attribute(_)))
        .cloned()
        .collect();
    let weight = config
        .hex
        .weight_column
        .as_ref()
        .map(|name| Column::Attribute(name.clone()))
        .filter(|column| {
            let present = frame.column(column).is_some();
            if !present {
                warn!(column = %column, "Weight column missing; using unweighted means");
            }
            present
        });

    let mut tables: BTreeMap<HexResolution, (HexTable, usize)> = BTreeMap::new();
    for grid in &grids {
        let aggregation = group_by_hex(frame, grid, &value_columns, weight.as_ref())?;
        let orphan_count = aggregation.orphans.nodes.len();
        match tables.entry(grid.resolution()) {
            Entry::Occupied(mut entry) => {
                let (table, orphans) = entry.get_mut();
                table.upsert(aggregation.table)?;
                *orphans += orphan_count;
            }
            Entry::Vacant(entry) => {
                entry.insert((aggregation.table, orphan_count));
            }
        }
    }

    Ok(tables)
}

/// Writes `table` into the city's hex outputs. A table already written by
/// an earlier run at the same resolution is loaded and the new columns are
/// upserted into it, so independent runs accumulate columns. Returns the
/// number of hexes written.
fn write_hex_outputs(city_dir: &Path, table: HexTable, geojson: bool) -> Result<usize, RunError> {
    let name = table.resolution().id_column();
    let path = city_dir.join(format!("{name}.csv"));

    let table = if path.exists() {
        let mut existing = read_hex_table(open_table(&path)?)?;
        existing.upsert(table)?;
        debug!(path = %path.display(), "Merged into existing hex table");
        existing
    } else {
        table
    };

    write_hex_table(create_file(&path)?, &table)?;
    info!(hexes = table.rows().len(), path = %path.display(), "Wrote hex table");
    if geojson {
        write_hex_geojson(&city_dir.join(format!("{name}.geojson")), &table)?;
    }
    Ok(table.rows().len())
}

/// Isochrones for a list of origin nodes
#[derive(Debug, Clone)]
pub struct IsochroneRequest {
    pub nodes: PathBuf,
    pub edges: PathBuf,
    pub graph: GraphBuilderConfig,
    pub origins: Vec<StreetNodeId>,
    pub budget: Cost,
    pub weight: Weight,
    pub resolution: u8,
    pub output: PathBuf,
}

/// Computes isochrones in parallel and writes them as GeoJSON. Returns the
/// number of origins that produced an area.
pub fn isochrones(request: &IsochroneRequest) -> Result<usize, RunError> {
    let resolution = HexResolution::try_from(request.resolution)?;
    let graph = load_graph(&request.nodes, &request.edges, &request.graph)?;

    let start = Instant::now();
    let results = bulk_isochrones(&graph, &request.origins, request.budget, request.weight, resolution);
    let done = results.iter().filter(|(_, r)| r.is_ok()).count();
    info!(
        done,
        requested = request.origins.len(),
        elapsed = ?start.elapsed(),
        "Isochrones computed"
    );

    let text = isochrones_to_geojson(results)?;
    std::io::Write::write_all(&mut create_file(&request.output)?, text.as_bytes())
        .map_err(|e| RunError::io(&request.output, e))?;
    Ok(done)
}
