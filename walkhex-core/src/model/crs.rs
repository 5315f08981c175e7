//! Coordinate reference handling.
//!
//! Input tables are either geographic (lon/lat degrees) or already projected
//! to meters. The graph picks one [`Projection`] when it is built and every
//! metric computation (snapping, geometry lengths) goes through it; nothing
//! downstream reprojects.

use geo::Coord;
use serde::Deserialize;

const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Crs {
    /// Longitude/latitude in degrees (EPSG:4326)
    #[default]
    Geographic,
    /// Planar coordinates in meters
    Projected,
}

/// Maps input coordinates to a local planar frame in meters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Identity,
    /// Equirectangular projection around the centroid of the data. Accurate
    /// to well under a percent across a metropolitan area.
    Equirectangular { lon0: f64, lat0: f64, cos_lat0: f64 },
}

impl Projection {
    /// Picks the projection for data in `crs`, centred on the mean of `coords`
    #[allow(clippy::cast_precision_loss)]
    pub fn for_coords(crs: Crs, coords: impl IntoIterator<Item = Coord<f64>>) -> Self {
        match crs {
            Crs::Projected => Projection::Identity,
            Crs::Geographic => {
                let (mut sum_x, mut sum_y, mut n) = (0.0, 0.0, 0usize);
                for c in coords {
                    sum_x += c.x;
                    sum_y += c.y;
                    n += 1;
                }
                let (lon0, lat0) = if n == 0 {
                    (0.0, 0.0)
                } else {
                    (sum_x / n as f64, sum_y / n as f64)
                };
                Projection::Equirectangular {
                    lon0,
                    lat0,
                    cos_lat0: lat0.to_radians().cos(),
                }
            }
        }
    }

    pub fn crs(&self) -> Crs {
        match self {
            Projection::Identity => Crs::Projected,
            Projection::Equirectangular { .. } => Crs::Geographic,
        }
    }

    pub fn project(&self, coord: Coord<f64>) -> [f64; 2] {
        match *self {
            Projection::Identity => [coord.x, coord.y],
            Projection::Equirectangular {
                lon0,
                lat0,
                cos_lat0,
            } => [
                EARTH_RADIUS_M * (coord.x - lon0).to_radians() * cos_lat0,
                EARTH_RADIUS_M * (coord.y - lat0).to_radians(),
            ],
        }
    }

    /// Planar distance in meters between two input coordinates
    pub fn distance(&self, a: Coord<f64>, b: Coord<f64>) -> f64 {
        let [ax, ay] = self.project(a);
        let [bx, by] = self.project(b);
        (ax - bx).hypot(ay - by)
    }

    /// Length in meters of a polyline given in input coordinates
    pub fn line_length(&self, coords: &[Coord<f64>]) -> f64 {
        coords
            .windows(2)
            .map(|pair| self.distance(pair[0], pair[1]))
            .sum()
    }
}
