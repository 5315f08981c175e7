//! Chunked and sharded execution of the nearest-POI engine

use log::{debug, info, warn};
use rayon::prelude::*;

use super::nearest::{NearestQuery, nearest_distance};
use crate::{
    Error, StreetNodeId,
    model::{CostTable, Poi, StreetGraph},
};

/// Release freed heap pages back to the OS after large batches
fn release_memory() {
    // malloc_trim is only called on glibc targets, checked at compile time
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    unsafe {
        if libc::malloc_trim(0) == 0 {
            log::debug!("No heap memory released after batched run");
        } else {
            log::debug!("Trimmed unused heap memory after batched run");
        }
    }
}

/// Runs the nearest-POI engine over bounded batches of points of interest
/// and merges the partial results with an element-wise minimum.
///
/// Because `min` is associative and commutative the merged table is
/// identical to a single unbatched run, whatever the batch size.
#[derive(Debug, Clone, Copy)]
pub struct BatchDriver<'g> {
    graph: &'g StreetGraph,
    batch_size: usize,
}

impl<'g> BatchDriver<'g> {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when `batch_size` is zero
    pub fn new(graph: &'g StreetGraph, batch_size: usize) -> Result<Self, Error> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(Self { graph, batch_size })
    }

    pub fn graph(&self) -> &'g StreetGraph {
        self.graph
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Cost from every origin to the nearest of `pois`, processing at most
    /// `batch_size` points of interest at a time
    pub fn run(
        &self,
        origins: &[StreetNodeId],
        pois: &[&Poi],
        category: &str,
        query: &NearestQuery,
    ) -> Result<CostTable, Error> {
        if pois.is_empty() {
            return Err(Error::EmptyDestinationSet(category.to_string()));
        }

        let batch_count = pois.len().div_ceil(self.batch_size);
        let mut merged: Option<CostTable> = None;
        for (i, batch) in pois.chunks(self.batch_size).enumerate() {
            let table = nearest_distance(self.graph, origins, batch, category, query)?;
            debug!(
                "'{category}': batch {}/{batch_count} done ({} points of interest)",
                i + 1,
                batch.len()
            );
            merged = Some(match merged {
                Some(acc) => acc.merge_min(table)?,
                None => table,
            });
        }

        if batch_count > 1 {
            release_memory();
        }

        merged.ok_or_else(|| Error::EmptyDestinationSet(category.to_string()))
    }

    /// Split `origins` into `shards` disjoint groups and run each group
    /// independently in parallel. A failing shard does not abort the others;
    /// it is reported in [`ShardedRun::failed`] and can be retried.
    pub fn run_sharded(
        &self,
        origins: &[StreetNodeId],
        pois: &[&Poi],
        category: &str,
        query: &NearestQuery,
        shards: usize,
    ) -> Result<ShardedRun, Error> {
        if shards == 0 {
            return Err(Error::InvalidConfig(
                "shard count must be at least 1".to_string(),
            ));
        }
        let shard_size = origins.len().div_ceil(shards).max(1);
        let groups: Vec<(usize, Vec<StreetNodeId>)> = origins
            .chunks(shard_size)
            .map(<[StreetNodeId]>::to_vec)
            .enumerate()
            .collect();

        let run = self.run_groups(groups, pois, category, query);
        info!(
            "'{category}': {} of {} shards completed",
            run.completed.len(),
            run.completed.len() + run.failed.len()
        );
        Ok(run)
    }

    /// Re-run the failed shards of `previous`, keeping its completed ones
    pub fn retry_failed(
        &self,
        previous: ShardedRun,
        pois: &[&Poi],
        category: &str,
        query: &NearestQuery,
    ) -> ShardedRun {
        let ShardedRun { mut completed, failed } = previous;
        let groups = failed.into_iter().map(|f| (f.shard, f.origins)).collect();
        let retried = self.run_groups(groups, pois, category, query);
        completed.extend(retried.completed);
        completed.sort_by_key(|(shard, _)| *shard);
        ShardedRun {
            completed,
            failed: retried.failed,
        }
    }

    fn run_groups(
        &self,
        groups: Vec<(usize, Vec<StreetNodeId>)>,
        pois: &[&Poi],
        category: &str,
        query: &NearestQuery,
    ) -> ShardedRun {
        let results: Vec<(usize, Vec<StreetNodeId>, Result<CostTable, Error>)> = groups
            .into_par_iter()
            .map(|(shard, origins)| {
                let result = self.run(&origins, pois, category, query);
                (shard, origins, result)
            })
            .collect();

        let mut run = ShardedRun::default();
        for (shard, origins, result) in results {
            match result {
                Ok(table) => run.completed.push((shard, table)),
                Err(error) => {
                    warn!("'{category}': shard {shard} failed: {error}");
                    run.failed.push(ShardFailure {
                        shard,
                        origins,
                        error,
                    });
                }
            }
        }
        run
    }
}

#[derive(Debug)]
pub struct ShardFailure {
    pub shard: usize,
    pub origins: Vec<StreetNodeId>,
    pub error: Error,
}

/// Outcome of a sharded run: completed tables keyed by shard number and
/// the shards that still need to be computed
#[derive(Debug, Default)]
pub struct ShardedRun {
    pub completed: Vec<(usize, CostTable)>,
    pub failed: Vec<ShardFailure>,
}

impl ShardedRun {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Concatenate all shards into one table, in shard order.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failed shard if any shard is missing
    pub fn into_table(self) -> Result<CostTable, Error> {
        if let Some(failure) = self.failed.into_iter().min_by_key(|f| f.shard) {
            return Err(failure.error);
        }
        let mut completed = self.completed;
        completed.sort_by_key(|(shard, _)| *shard);
        CostTable::concat(completed.into_iter().map(|(_, table)| table).collect())
    }
}
