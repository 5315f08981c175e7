//! Hex grids either read from polygon tables or generated as an H3 coverage
//! of an area. Node points are joined to cells by point-in-polygon.

use std::fmt;

use geo::{BoundingRect, Coord, Intersects, LineString, Point, Polygon};
use h3o::{
    CellIndex, Resolution,
    geom::{ContainmentMode, TilerBuilder},
};
use hashbrown::HashSet;
use rstar::{AABB, RTree, primitives::GeomWithData, primitives::Rectangle};

use crate::Error;

/// Grid resolution level, `0..=15` as in H3
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HexResolution(u8);

impl TryFrom<u8> for HexResolution {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value <= 15 {
            Ok(Self(value))
        } else {
            Err(Error::InvalidResolution(format!(
                "{value} is outside 0..=15"
            )))
        }
    }
}

impl From<HexResolution> for u8 {
    fn from(value: HexResolution) -> Self {
        value.0
    }
}

impl fmt::Display for HexResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl HexResolution {
    /// Name of the id column for this resolution, `hex_id_<res>`
    pub fn id_column(self) -> String {
        format!("hex_id_{}", self.0)
    }

    pub fn to_h3(self) -> Result<Resolution, Error> {
        Resolution::try_from(self.0)
            .map_err(|e| Error::InvalidResolution(format!("Got invalid H3 resolution {e}")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HexCell {
    pub id: String,
    /// Polygon in the same CRS as the node table
    pub geometry: Polygon<f64>,
}

type IndexedCell = GeomWithData<Rectangle<[f64; 2]>, usize>;

#[derive(Debug, Clone)]
pub struct HexGrid {
    resolution: HexResolution,
    cells: Vec<HexCell>,
    rtree: RTree<IndexedCell>,
}

impl HexGrid {
    /// # Errors
    ///
    /// Fails on duplicate cell ids or empty polygons
    pub fn from_cells(resolution: HexResolution, cells: Vec<HexCell>) -> Result<Self, Error> {
        {
            let mut seen = HashSet::with_capacity(cells.len());
            if let Some(dup) = cells.iter().find(|cell| !seen.insert(cell.id.as_str())) {
                return Err(Error::InvalidData(format!("duplicate hex id {}", dup.id)));
            }
        }

        let mut envelopes = Vec::with_capacity(cells.len());
        for (idx, cell) in cells.iter().enumerate() {
            let rect = cell.geometry.bounding_rect().ok_or_else(|| {
                Error::InvalidData(format!("hex {} has an empty polygon", cell.id))
            })?;
            envelopes.push(IndexedCell::new(
                Rectangle::from_corners(rect.min().into(), rect.max().into()),
                idx,
            ));
        }

        Ok(Self {
            resolution,
            cells,
            rtree: RTree::bulk_load(envelopes),
        })
    }

    /// H3 cells covering `area` (lon/lat degrees)
    pub fn covering(area: &Polygon<f64>, resolution: HexResolution) -> Result<Self, Error> {
        let mut tiler = TilerBuilder::new(resolution.to_h3()?)
            .containment_mode(ContainmentMode::Covers)
            .build();
        tiler.add(area.clone())?;

        let mut cells: Vec<CellIndex> = tiler.into_coverage().collect();
        cells.sort_unstable();
        let cells = cells
            .into_iter()
            .map(|cell| HexCell {
                id: cell.to_string(),
                geometry: cell_polygon(cell),
            })
            .collect();

        Self::from_cells(resolution, cells)
    }

    pub fn resolution(&self) -> HexResolution {
        self.resolution
    }

    pub fn cells(&self) -> &[HexCell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell containing `point`. A point on a shared edge goes to the cell
    /// with the smallest id.
    pub fn locate(&self, point: &Point<f64>) -> Option<usize> {
        let envelope = AABB::from_point([point.x(), point.y()]);
        self.rtree
            .locate_in_envelope_intersecting(&envelope)
            .map(|candidate| candidate.data)
            .filter(|&idx| self.cells[idx].geometry.intersects(point))
            .min_by(|&a, &b| self.cells[a].id.cmp(&self.cells[b].id))
    }
}

/// Boundary of an H3 cell as a lon/lat polygon
pub fn cell_polygon(cell: CellIndex) -> Polygon<f64> {
    let mut ring: Vec<Coord<f64>> = cell
        .boundary()
        .iter()
        .map(|vertex| Coord {
            x: vertex.lng(),
            y: vertex.lat(),
        })
        .collect();
    if let Some(&first) = ring.first() {
        ring.push(first);
    }
    Polygon::new(LineString::new(ring), vec![])
}
