#![allow(dead_code)]

use geo::{Point, polygon};
use rand::{Rng, SeedableRng, rngs::StdRng};
use walkhex_core::hex::{HexCell, HexGrid, HexResolution};
use walkhex_core::loading::{EdgeRow, GraphBuilderConfig, NodeRow, build_street_graph};
use walkhex_core::model::{Crs, Poi, StreetGraph};

pub fn node(osmid: i64, x: f64, y: f64) -> NodeRow {
    NodeRow {
        osmid,
        x,
        y,
        street_count: None,
        elevation: None,
    }
}

pub fn edge(u: i64, v: i64, length: f64) -> EdgeRow {
    EdgeRow {
        u,
        v,
        key: 0,
        length: Some(length),
        highway: vec!["footway".to_string()],
        grade: None,
        walkspeed: None,
        time_min: None,
        geometry: None,
    }
}

pub fn projected() -> GraphBuilderConfig {
    GraphBuilderConfig {
        crs: Crs::Projected,
        ..GraphBuilderConfig::default()
    }
}

pub fn poi(id: &str, code: &str, x: f64, y: f64) -> Poi {
    Poi {
        id: id.to_string(),
        code: code.to_string(),
        geometry: Point::new(x, y),
    }
}

/// `side` x `side` grid, 100m spacing, random edge lengths in [100, 300),
/// plus one isolated node far away (id 9999)
pub fn random_grid(rng: &mut StdRng, side: i64) -> StreetGraph {
    let id = |i: i64, j: i64| i * side + j;
    let mut nodes = vec![node(9999, 10_000.0, 10_000.0)];
    let mut edges = Vec::new();
    for i in 0..side {
        for j in 0..side {
            nodes.push(node(id(i, j), i as f64 * 100.0, j as f64 * 100.0));
            if i + 1 < side {
                edges.push(edge(id(i, j), id(i + 1, j), rng.random_range(100.0..300.0)));
            }
            if j + 1 < side {
                edges.push(edge(id(i, j), id(i, j + 1), rng.random_range(100.0..300.0)));
            }
        }
    }
    build_street_graph(&nodes, &edges, &projected()).unwrap()
}

pub fn random_pois(rng: &mut StdRng, count: usize, extent: f64) -> Vec<Poi> {
    (0..count)
        .map(|i| {
            poi(
                &format!("poi-{i}"),
                "464111",
                rng.random_range(0.0..extent),
                rng.random_range(0.0..extent),
            )
        })
        .collect()
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Square cells of `size` meters tiling `[0, cols*size) x [0, rows*size)`
pub fn square_grid(cols: usize, rows: usize, size: f64) -> HexGrid {
    let mut cells = Vec::new();
    for c in 0..cols {
        for r in 0..rows {
            let (x0, y0) = (c as f64 * size, r as f64 * size);
            cells.push(HexCell {
                id: format!("cell-{c}-{r}"),
                geometry: polygon![
                    (x: x0, y: y0),
                    (x: x0 + size, y: y0),
                    (x: x0 + size, y: y0 + size),
                    (x: x0, y: y0 + size),
                ],
            });
        }
    }
    HexGrid::from_cells(HexResolution::try_from(9).unwrap(), cells).unwrap()
}
