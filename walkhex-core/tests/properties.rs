mod common;

use approx::assert_relative_eq;
use hashbrown::HashMap;
use rand::Rng;
use walkhex_core::algo::{BatchDriver, NearestQuery, nearest_distance};
use walkhex_core::hex::group_by_hex;
use walkhex_core::index::{CompositeIndex, IndexComponent, IndexConfig};
use walkhex_core::model::{Column, ColumnStore, NodeFrame, Poi};

use common::*;

#[test]
fn batched_run_equals_unbatched_run() {
    for seed in 0..5 {
        let mut rng = rng(seed);
        let graph = random_grid(&mut rng, 6);
        let pois = random_pois(&mut rng, 11, 500.0);
        let refs: Vec<&Poi> = pois.iter().collect();
        let origins = graph.node_ids();
        let query = NearestQuery::default();

        let full = nearest_distance(&graph, &origins, &refs, "pharmacy", &query).unwrap();
        for k in [1, refs.len() / 2, refs.len()] {
            let driver = BatchDriver::new(&graph, k).unwrap();
            let batched = driver.run(&origins, &refs, "pharmacy", &query).unwrap();
            assert_eq!(batched.costs(), full.costs(), "seed {seed}, batch size {k}");
        }
    }
}

#[test]
fn batch_order_does_not_matter() {
    let mut rng = rng(7);
    let graph = random_grid(&mut rng, 5);
    let pois = random_pois(&mut rng, 9, 400.0);
    let origins = graph.node_ids();
    let query = NearestQuery::default();
    let driver = BatchDriver::new(&graph, 2).unwrap();

    let forward: Vec<&Poi> = pois.iter().collect();
    let reversed: Vec<&Poi> = pois.iter().rev().collect();
    let a = driver.run(&origins, &forward, "pharmacy", &query).unwrap();
    let b = driver.run(&origins, &reversed, "pharmacy", &query).unwrap();
    assert_eq!(a.costs(), b.costs());
}

#[test]
fn adding_a_poi_never_increases_distance() {
    for seed in 10..15 {
        let mut rng = rng(seed);
        let graph = random_grid(&mut rng, 5);
        let mut pois = random_pois(&mut rng, 3, 400.0);
        let origins = graph.node_ids();
        let query = NearestQuery::default();

        let before = {
            let refs: Vec<&Poi> = pois.iter().collect();
            nearest_distance(&graph, &origins, &refs, "school", &query).unwrap()
        };
        pois.extend(random_pois(&mut rng, 1, 400.0).into_iter().map(|mut p| {
            p.id = "extra".to_string();
            p
        }));
        let refs: Vec<&Poi> = pois.iter().collect();
        let after = nearest_distance(&graph, &origins, &refs, "school", &query).unwrap();

        for (b, a) in before.costs().iter().zip(after.costs()) {
            match (b, a) {
                (Some(b), Some(a)) => assert!(a <= b, "seed {seed}: {a} > {b}"),
                (Some(_), None) => panic!("seed {seed}: node became unreachable"),
                _ => {}
            }
        }
    }
}

#[test]
fn isolated_node_stays_missing_not_zero() {
    let mut rng = rng(3);
    let graph = random_grid(&mut rng, 4);
    let pois = random_pois(&mut rng, 5, 300.0);
    let refs: Vec<&Poi> = pois.iter().collect();
    let table = nearest_distance(&graph, &graph.node_ids(), &refs, "pharmacy", &NearestQuery::default()).unwrap();
    assert_eq!(table.cost_of(9999), Some(None));
}

fn random_frame(seed: u64, count: i64) -> NodeFrame {
    let mut rng = rng(seed);
    let points = (0..count)
        .map(|id| {
            let p = geo::Point::new(rng.random_range(0.0..400.0), rng.random_range(0.0..400.0));
            (id, p)
        })
        .collect();
    let mut frame = NodeFrame::from_points(points).unwrap();
    let values = (0..count)
        .map(|_| Some(rng.random_range(0.0..2000.0)))
        .collect();
    frame
        .insert_column(Column::Distance("pharmacy".into()), values)
        .unwrap();
    frame
}

#[test]
fn hex_mean_lies_between_node_extremes() {
    let frame = random_frame(21, 200);
    let grid = square_grid(4, 4, 100.0);
    let column = Column::Distance("pharmacy".into());
    let aggregation = group_by_hex(&frame, &grid, &[column.clone()], None).unwrap();
    let values = frame.require(&column).unwrap();

    let mut extremes: HashMap<String, (f64, f64)> = HashMap::new();
    for (row, point) in frame.geometry().iter().enumerate() {
        let Some(cell) = grid.locate(point) else {
            continue;
        };
        let v = values[row].unwrap();
        let entry = extremes
            .entry(grid.cells()[cell].id.clone())
            .or_insert((f64::INFINITY, f64::NEG_INFINITY));
        entry.0 = entry.0.min(v);
        entry.1 = entry.1.max(v);
    }

    assert_eq!(aggregation.table.rows().len(), extremes.len());
    for record in aggregation.table.rows() {
        let mean = aggregation.table.value(&record.hex_id, &column).unwrap();
        let (min, max) = extremes[&record.hex_id];
        assert!(min - 1e-9 <= mean && mean <= max + 1e-9, "{}: {mean}", record.hex_id);
    }
}

#[test]
fn equal_weights_match_unweighted_mean() {
    let mut frame = random_frame(22, 150);
    let population = Column::Attribute("population".into());
    frame
        .insert_column(population.clone(), vec![Some(3.0); 150])
        .unwrap();
    let grid = square_grid(4, 4, 100.0);
    let column = Column::Distance("pharmacy".into());

    let plain = group_by_hex(&frame, &grid, &[column.clone()], None).unwrap();
    let weighted = group_by_hex(&frame, &grid, &[column.clone()], Some(&population)).unwrap();

    for record in plain.table.rows() {
        let a = plain.table.value(&record.hex_id, &column).unwrap();
        let b = weighted.table.value(&record.hex_id, &column).unwrap();
        assert_relative_eq!(a, b, max_relative = 1e-12);
        let carried = weighted.table.record(&record.hex_id).unwrap().weight_sum.unwrap();
        assert_relative_eq!(carried, 3.0 * f64::from(record.node_count));
    }
}

#[test]
fn composite_index_is_bounded() {
    let index = CompositeIndex::new(IndexConfig::new(vec![
        IndexComponent::new("farmacia", 0.01, 500.0, 0.333),
        IndexComponent::new("escuelas", 0.005, 1000.0, 0.334),
        IndexComponent::new("hospitales", 0.001, 3000.0, 0.333),
    ]))
    .unwrap();

    let mut rng = rng(42);
    for _ in 0..1000 {
        let subs: Vec<Option<f64>> = index
            .components()
            .iter()
            .map(|c| {
                let d = match rng.random_range(0..4) {
                    0 => 0.0,
                    1 => rng.random_range(1.0e5..1.0e9),
                    _ => rng.random_range(0.0..20_000.0),
                };
                index.sub_index(c, Some(d))
            })
            .collect();
        for s in subs.iter().flatten() {
            assert!((0.0..=1.0).contains(s), "sub-index {s}");
        }
        let composite = index.composite(&subs).unwrap();
        assert!((0.0..=1.0).contains(&composite), "composite {composite}");
    }
}

#[test]
fn orphan_nodes_do_not_lower_hex_means() {
    let grid = square_grid(2, 1, 100.0);
    let column = Column::Distance("pharmacy".into());
    let points = vec![
        (1, geo::Point::new(10.0, 10.0)),
        (2, geo::Point::new(20.0, 20.0)),
        (3, geo::Point::new(150.0, 50.0)),
        (4, geo::Point::new(5_000.0, 5_000.0)),
    ];
    let mut frame = NodeFrame::from_points(points).unwrap();
    frame
        .insert_column(column.clone(), vec![Some(100.0), Some(300.0), Some(50.0), Some(0.0)])
        .unwrap();

    let aggregation = group_by_hex(&frame, &grid, &[column.clone()], None).unwrap();
    assert_eq!(aggregation.orphans.nodes, vec![4]);
    assert_eq!(aggregation.table.value("cell-0-0", &column), Some(200.0));
    assert_eq!(aggregation.table.value("cell-1-0", &column), Some(50.0));
    let total: u32 = aggregation.table.rows().iter().map(|r| r.node_count).sum();
    assert_eq!(total, 3);
}
