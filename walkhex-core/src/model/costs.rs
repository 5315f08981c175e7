//! Per-origin cost tables produced by the distance engine

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::{Cost, Error, StreetNodeId, model::Weight};

/// Tidy (long) form of a node result: one row per node and category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceRecord {
    pub osmid: StreetNodeId,
    pub category: String,
    /// `None` when no point of interest of the category is reachable
    pub cost: Option<Cost>,
    pub reachable: Option<u32>,
}

/// Cost from each origin node to the nearest point of interest of one
/// category.
///
/// `None` marks an origin with no reachable destination; it is never
/// folded into `0`, which is reserved for a destination snapped onto the
/// origin itself.
#[derive(Debug, Clone, PartialEq)]
pub struct CostTable {
    category: String,
    weight: Weight,
    origins: Vec<StreetNodeId>,
    costs: Vec<Option<Cost>>,
    reachable: Option<Vec<u32>>,
}

impl CostTable {
    pub(crate) fn new(
        category: &str,
        weight: Weight,
        origins: Vec<StreetNodeId>,
        costs: Vec<Option<Cost>>,
        reachable: Option<Vec<u32>>,
    ) -> Self {
        debug_assert_eq!(origins.len(), costs.len());
        Self {
            category: category.to_string(),
            weight,
            origins,
            costs,
            reachable,
        }
    }

    /// Table where every origin is missing a destination
    pub fn missing(category: &str, weight: Weight, origins: &[StreetNodeId]) -> Self {
        Self::new(category, weight, origins.to_vec(), vec![None; origins.len()], None)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn weight(&self) -> Weight {
        self.weight
    }

    pub fn origins(&self) -> &[StreetNodeId] {
        &self.origins
    }

    pub fn costs(&self) -> &[Option<Cost>] {
        &self.costs
    }

    pub fn reachable(&self) -> Option<&[u32]> {
        self.reachable.as_deref()
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    pub fn cost_of(&self, origin: StreetNodeId) -> Option<Option<Cost>> {
        self.origins
            .iter()
            .position(|&id| id == origin)
            .map(|row| self.costs[row])
    }

    /// Origins with no reachable destination
    pub fn unreachable_count(&self) -> usize {
        self.costs.iter().filter(|cost| cost.is_none()).count()
    }

    /// Element-wise minimum of two tables over the same origins.
    ///
    /// Reachability counts add up, since batches partition the destinations.
    pub fn merge_min(mut self, other: CostTable) -> Result<CostTable, Error> {
        if self.category != other.category || self.weight != other.weight {
            return Err(Error::BatchMergeMismatch(format!(
                "cannot merge '{}' ({}) with '{}' ({})",
                self.category, self.weight, other.category, other.weight
            )));
        }
        if self.origins != other.origins {
            return Err(Error::BatchMergeMismatch(format!(
                "category '{}': {} origins vs {} origins",
                self.category,
                self.origins.len(),
                other.origins.len()
            )));
        }

        for (acc, next) in self.costs.iter_mut().zip(other.costs) {
            *acc = match (*acc, next) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }

        self.reachable = match (self.reachable, other.reachable) {
            (Some(mut a), Some(b)) => {
                a.iter_mut().zip(b).for_each(|(acc, n)| *acc += n);
                Some(a)
            }
            (None, None) => None,
            _ => {
                return Err(Error::BatchMergeMismatch(format!(
                    "category '{}': only one side carries reachability counts",
                    self.category
                )));
            }
        };

        Ok(self)
    }

    /// Joins tables computed for disjoint origin shards
    pub fn concat(tables: Vec<CostTable>) -> Result<CostTable, Error> {
        let mut tables = tables.into_iter();
        let Some(mut acc) = tables.next() else {
            return Err(Error::BatchMergeMismatch(
                "no shard results to concatenate".to_string(),
            ));
        };

        let mut seen: HashSet<StreetNodeId> = acc.origins.iter().copied().collect();
        for table in tables {
            if table.category != acc.category || table.weight != acc.weight {
                return Err(Error::BatchMergeMismatch(format!(
                    "shard of '{}' mixed with shard of '{}'",
                    acc.category, table.category
                )));
            }
            if let Some(dup) = table.origins.iter().find(|id| !seen.insert(**id)) {
                return Err(Error::BatchMergeMismatch(format!(
                    "origin {dup} appears in more than one shard"
                )));
            }
            acc.origins.extend(table.origins);
            acc.costs.extend(table.costs);
            acc.reachable = match (acc.reachable, table.reachable) {
                (Some(mut a), Some(b)) => {
                    a.extend(b);
                    Some(a)
                }
                (None, None) => None,
                _ => {
                    return Err(Error::BatchMergeMismatch(
                        "shards disagree on reachability counts".to_string(),
                    ));
                }
            };
        }

        Ok(acc)
    }

    pub fn to_records(&self) -> Vec<DistanceRecord> {
        self.origins
            .iter()
            .enumerate()
            .map(|(row, &osmid)| DistanceRecord {
                osmid,
                category: self.category.clone(),
                cost: self.costs[row],
                reachable: self.reachable.as_ref().map(|r| r[row]),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(costs: Vec<Option<Cost>>) -> CostTable {
        let origins = (1..=costs.len() as i64).collect();
        CostTable::new("pharmacy", Weight::Length, origins, costs, None)
    }

    #[test]
    fn merge_keeps_minimum_and_fills_missing() {
        let a = table(vec![Some(10.0), None, Some(3.0), None]);
        let b = table(vec![Some(4.0), Some(7.0), None, None]);
        let merged = a.merge_min(b).unwrap();
        assert_eq!(merged.costs(), &[Some(4.0), Some(7.0), Some(3.0), None]);
    }

    #[test]
    fn merge_rejects_different_origins() {
        let a = table(vec![Some(1.0), Some(2.0)]);
        let b = table(vec![Some(1.0)]);
        assert!(matches!(a.merge_min(b), Err(Error::BatchMergeMismatch(_))));
    }

    #[test]
    fn merge_adds_reachability_counts() {
        let a = CostTable::new("school", Weight::TimeMin, vec![1, 2], vec![Some(1.0), None], Some(vec![2, 0]));
        let b = CostTable::new("school", Weight::TimeMin, vec![1, 2], vec![Some(3.0), Some(9.0)], Some(vec![1, 1]));
        let merged = a.merge_min(b).unwrap();
        assert_eq!(merged.reachable(), Some(&[3, 1][..]));
    }

    #[test]
    fn concat_rejects_overlapping_shards() {
        let a = CostTable::new("park", Weight::Length, vec![1, 2], vec![None, None], None);
        let b = CostTable::new("park", Weight::Length, vec![2, 3], vec![None, None], None);
        assert!(CostTable::concat(vec![a, b]).is_err());
    }

    #[test]
    fn records_keep_missing_costs() {
        let records = table(vec![Some(0.0), None]).to_records();
        assert_eq!(records[0].cost, Some(0.0));
        assert_eq!(records[1].cost, None);
        assert_eq!(records[1].category, "pharmacy");
    }
}
