//! Points of interest and amenity categories

use geo::Point;
use hashbrown::HashSet;
use serde::Deserialize;

/// Geocoded amenity
#[derive(Debug, Clone, PartialEq)]
pub struct Poi {
    pub id: String,
    /// Raw classification code (e.g. a DENUE activity code)
    pub code: String,
    pub geometry: Point<f64>,
}

/// Named amenity category made of one or more raw codes
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AmenityCategory {
    pub name: String,
    pub codes: Vec<String>,
}

impl AmenityCategory {
    pub fn new(name: &str, codes: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            codes: codes.iter().map(ToString::to_string).collect(),
        }
    }

    /// Union of the points of interest matching any of the category codes.
    /// Each id is kept once, in input order.
    pub fn select<'a>(&self, pois: &'a [Poi]) -> Vec<&'a Poi> {
        let codes: HashSet<&str> = self.codes.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        pois.iter()
            .filter(|poi| codes.contains(poi.code.as_str()))
            .filter(|poi| seen.insert(poi.id.as_str()))
            .collect()
    }
}
