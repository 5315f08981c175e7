use serde::Deserialize;

use crate::{Error, model::Crs};

/// How walking time is derived for edges without a `time_min` value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedModel {
    /// Constant walking speed
    #[default]
    Flat,
    /// Tobler's hiking function on the edge grade; flat speed when the
    /// grade is unknown
    Tobler,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphBuilderConfig {
    pub crs: Crs,
    /// Keep edge direction; otherwise every edge is walkable both ways
    pub directed: bool,
    /// Share of nodes that may be synthesized from edge geometry before the
    /// graph is rejected as malformed
    pub max_missing_node_ratio: f64,
    pub walking_speed_kmh: f64,
    pub speed_model: SpeedModel,
}

impl Default for GraphBuilderConfig {
    fn default() -> Self {
        Self {
            crs: Crs::Geographic,
            directed: false,
            max_missing_node_ratio: 0.05,
            walking_speed_kmh: 4.5,
            speed_model: SpeedModel::Flat,
        }
    }
}

impl GraphBuilderConfig {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&self.max_missing_node_ratio) {
            return Err(Error::InvalidConfig(format!(
                "max_missing_node_ratio must be within [0, 1], got {}",
                self.max_missing_node_ratio
            )));
        }
        if !(self.walking_speed_kmh.is_finite() && self.walking_speed_kmh > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "walking_speed_kmh must be positive, got {}",
                self.walking_speed_kmh
            )));
        }
        Ok(())
    }

    /// Walking speed in meters per minute for an edge
    pub(crate) fn speed_m_per_min(&self, walkspeed_kmh: Option<f64>, grade: Option<f64>) -> f64 {
        let kmh = match (walkspeed_kmh.filter(|s| s.is_finite() && *s > 0.0), grade) {
            (Some(speed), _) => speed,
            (None, Some(grade)) if self.speed_model == SpeedModel::Tobler && grade.is_finite() => {
                6.0 * (-3.5 * (grade + 0.05).abs()).exp()
            }
            _ => self.walking_speed_kmh,
        };
        kmh * 1000.0 / 60.0
    }
}
