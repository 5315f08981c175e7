//! Logistic accessibility sub-indices and the weighted composite index

use log::info;
use serde::Deserialize;

use crate::{
    Error,
    model::{Column, ColumnStore},
};

/// Distances above this are clamped before the logistic transform
pub const DEFAULT_CEILING: f64 = 10_000.0;
/// Allowed deviation of the component weights from a sum of 1
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-3;

fn default_ceiling() -> f64 {
    DEFAULT_CEILING
}

/// Logistic decay `1 / (1 + exp(k * (d - midpoint)))`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DecayParams {
    /// Steepness, must be positive
    pub k: f64,
    /// Distance at which the sub-index equals 0.5
    pub midpoint: f64,
}

impl DecayParams {
    pub fn new(k: f64, midpoint: f64) -> Self {
        Self { k, midpoint }
    }

    /// Sub-index of a distance already clamped to `[0, ceiling]`
    pub fn apply(&self, distance: f64) -> f64 {
        let value = 1.0 / (1.0 + (self.k * (distance - self.midpoint)).exp());
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexComponent {
    pub category: String,
    #[serde(flatten)]
    pub decay: DecayParams,
    pub weight: f64,
}

impl IndexComponent {
    pub fn new(category: &str, k: f64, midpoint: f64, weight: f64) -> Self {
        Self {
            category: category.to_string(),
            decay: DecayParams::new(k, midpoint),
            weight,
        }
    }
}

/// What the composite does when some sub-indices of a row are missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    /// Any missing sub-index makes the composite missing
    #[default]
    Propagate,
    /// Weight the available sub-indices, rescaled to sum to 1
    Renormalize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexConfig {
    pub components: Vec<IndexComponent>,
    #[serde(default = "default_ceiling")]
    pub ceiling: f64,
    #[serde(default)]
    pub missing: MissingPolicy,
}

impl IndexConfig {
    pub fn new(components: Vec<IndexComponent>) -> Self {
        Self {
            components,
            ceiling: DEFAULT_CEILING,
            missing: MissingPolicy::default(),
        }
    }
}

/// Validated index definition
#[derive(Debug, Clone)]
pub struct CompositeIndex {
    components: Vec<IndexComponent>,
    ceiling: f64,
    missing: MissingPolicy,
}

impl CompositeIndex {
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] when there are no components, a category is
    /// repeated, `k` is not positive, the weights are negative or do not sum
    /// to 1, or the ceiling is not positive
    pub fn new(config: IndexConfig) -> Result<Self, Error> {
        let IndexConfig {
            mut components,
            ceiling,
            missing,
        } = config;

        if components.is_empty() {
            return Err(Error::InvalidConfig(
                "index needs at least one component".to_string(),
            ));
        }
        if !(ceiling.is_finite() && ceiling > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "index ceiling must be positive, got {ceiling}"
            )));
        }
        for (i, c) in components.iter().enumerate() {
            if c.category == "composite" {
                return Err(Error::InvalidConfig(
                    "'composite' is reserved and cannot be a category".to_string(),
                ));
            }
            if components[..i].iter().any(|o| o.category == c.category) {
                return Err(Error::InvalidConfig(format!(
                    "category '{}' appears twice in the index",
                    c.category
                )));
            }
            if !(c.decay.k.is_finite() && c.decay.k > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "k for '{}' must be positive, got {}",
                    c.category, c.decay.k
                )));
            }
            if !c.decay.midpoint.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "midpoint for '{}' must be finite",
                    c.category
                )));
            }
            if !(c.weight.is_finite() && c.weight >= 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "weight for '{}' must be non-negative, got {}",
                    c.category, c.weight
                )));
            }
        }

        let total: f64 = components.iter().map(|c| c.weight).sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::InvalidConfig(format!(
                "index weights must sum to 1, got {total}"
            )));
        }
        for c in &mut components {
            c.weight /= total;
        }

        Ok(Self {
            components,
            ceiling,
            missing,
        })
    }

    pub fn components(&self) -> &[IndexComponent] {
        &self.components
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    /// Sub-index of one component for a raw distance. Distances are clamped
    /// to `[0, ceiling]`; `NaN` is treated as missing.
    pub fn sub_index(&self, component: &IndexComponent, distance: Option<f64>) -> Option<f64> {
        distance
            .filter(|d| !d.is_nan())
            .map(|d| component.decay.apply(d.clamp(0.0, self.ceiling)))
    }

    /// Composite of sub-indices given in component order
    pub fn composite(&self, sub_indices: &[Option<f64>]) -> Option<f64> {
        let mut total = 0.0;
        let mut weight_sum = 0.0;
        for (component, value) in self.components.iter().zip(sub_indices) {
            match value {
                Some(v) => {
                    total += component.weight * v;
                    weight_sum += component.weight;
                }
                None if self.missing == MissingPolicy::Propagate => return None,
                None => {}
            }
        }
        match self.missing {
            MissingPolicy::Propagate => Some(total.clamp(0.0, 1.0)),
            MissingPolicy::Renormalize if weight_sum > 0.0 => {
                Some((total / weight_sum).clamp(0.0, 1.0))
            }
            MissingPolicy::Renormalize => None,
        }
    }

    /// Adds an `idx_<category>` column per component and `idx_composite`
    /// to a node or hex table holding the `dist_<category>` columns.
    ///
    /// # Errors
    ///
    /// [`Error::MissingColumn`] when a distance column is absent
    pub fn apply<S: ColumnStore>(&self, store: &mut S) -> Result<(), Error> {
        let mut sub_columns = Vec::with_capacity(self.components.len());
        for component in &self.components {
            let distances = store.require(&Column::Distance(component.category.clone()))?;
            let values: Vec<Option<f64>> = distances
                .iter()
                .map(|&d| self.sub_index(component, d))
                .collect();
            sub_columns.push(values);
        }

        let composite: Vec<Option<f64>> = (0..store.row_count())
            .map(|row| {
                let row_values: Vec<Option<f64>> = sub_columns.iter().map(|c| c[row]).collect();
                self.composite(&row_values)
            })
            .collect();
        let missing = composite.iter().filter(|v| v.is_none()).count();

        for (component, values) in self.components.iter().zip(sub_columns) {
            store.insert_column(Column::SubIndex(component.category.clone()), values)?;
        }
        store.insert_column(Column::Composite, composite)?;

        info!(
            "Composite index over {} categories: {} rows, {missing} without a value",
            self.components.len(),
            store.row_count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeFrame;
    use approx::assert_relative_eq;
    use geo::Point;

    fn three_way() -> CompositeIndex {
        CompositeIndex::new(IndexConfig::new(vec![
            IndexComponent::new("farmacia", 0.01, 500.0, 0.333),
            IndexComponent::new("escuelas", 0.005, 1000.0, 0.334),
            IndexComponent::new("hospitales", 0.001, 3000.0, 0.333),
        ]))
        .unwrap()
    }

    #[test]
    fn midpoint_gives_one_half() {
        let index = three_way();
        let pharmacy = &index.components()[0];
        assert_relative_eq!(index.sub_index(pharmacy, Some(500.0)).unwrap(), 0.5);
    }

    #[test]
    fn distances_are_clamped_to_the_ceiling() {
        let index = three_way();
        let hospital = &index.components()[2];
        assert_eq!(
            index.sub_index(hospital, Some(1.0e9)),
            index.sub_index(hospital, Some(DEFAULT_CEILING))
        );
        assert_eq!(index.sub_index(hospital, Some(f64::NAN)), None);
    }

    #[test]
    fn weights_must_sum_to_one() {
        let err = CompositeIndex::new(IndexConfig::new(vec![
            IndexComponent::new("a", 0.01, 500.0, 0.5),
            IndexComponent::new("b", 0.01, 500.0, 0.4),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn k_must_be_positive() {
        let err = CompositeIndex::new(IndexConfig::new(vec![IndexComponent::new(
            "a", 0.0, 500.0, 1.0,
        )]))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn missing_sub_index_propagates_by_default() {
        let index = three_way();
        assert_eq!(index.composite(&[Some(1.0), None, Some(1.0)]), None);
        assert_relative_eq!(
            index.composite(&[Some(1.0), Some(0.0), Some(1.0)]).unwrap(),
            0.666,
            epsilon = 1e-9
        );
    }

    #[test]
    fn renormalize_uses_available_components() {
        let mut config = IndexConfig::new(vec![
            IndexComponent::new("a", 0.01, 500.0, 0.5),
            IndexComponent::new("b", 0.01, 500.0, 0.5),
        ]);
        config.missing = MissingPolicy::Renormalize;
        let index = CompositeIndex::new(config).unwrap();
        assert_relative_eq!(index.composite(&[Some(0.8), None]).unwrap(), 0.8);
        assert_eq!(index.composite(&[None, None]), None);
    }

    #[test]
    fn apply_writes_sub_and_composite_columns() {
        let mut frame = NodeFrame::from_points(vec![
            (1, Point::new(0.0, 0.0)),
            (2, Point::new(1.0, 0.0)),
        ])
        .unwrap();
        for (category, values) in [
            ("farmacia", vec![Some(0.0), None]),
            ("escuelas", vec![Some(200.0), Some(300.0)]),
            ("hospitales", vec![Some(20_000.0), Some(100.0)]),
        ] {
            frame
                .insert_column(Column::Distance(category.to_string()), values)
                .unwrap();
        }

        three_way().apply(&mut frame).unwrap();

        let composite = frame.require(&Column::Composite).unwrap();
        assert!(composite[0].is_some_and(|v| (0.0..=1.0).contains(&v)));
        assert_eq!(composite[1], None);
        assert!(frame.column(&Column::SubIndex("farmacia".into())).is_some());
    }

    #[test]
    fn apply_requires_distance_columns() {
        let mut frame = NodeFrame::from_points(vec![(1, Point::new(0.0, 0.0))]).unwrap();
        let err = three_way().apply(&mut frame).unwrap_err();
        assert!(matches!(err, Error::MissingColumn(name) if name == "dist_farmacia"));
    }

    #[test]
    fn config_parses_with_defaults() {
        let config: IndexConfig = serde_json::from_str(
            r#"{"components": [{"category": "farmacia", "k": 0.01, "midpoint": 500, "weight": 1.0}]}"#,
        )
        .unwrap();
        assert_eq!(config.ceiling, DEFAULT_CEILING);
        assert_eq!(config.missing, MissingPolicy::Propagate);
        assert_eq!(config.components[0].decay.midpoint, 500.0);
    }
}
