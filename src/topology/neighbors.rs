//! Per-patch neighbor table: who sits across each face, and where it lives.
//!
//! Each `(axis, side)` has exactly one entry. `None` marks a non-periodic
//! physical boundary; such faces take part in no messaging and particles
//! leaving through them are dropped.

use crate::topology::side::{MAX_DIM, Side};
use itertools::Itertools;

/// A neighboring patch and the rank that owns it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Neighbor {
    /// Global patch index.
    pub patch: usize,
    /// Owning rank.
    pub rank: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NeighborTable {
    entries: Vec<[Option<Neighbor>; 2]>,
}

impl NeighborTable {
    /// A table with every face on a physical boundary.
    pub fn isolated(n_dim: usize) -> Self {
        debug_assert!(n_dim <= MAX_DIM);
        Self {
            entries: vec![[None, None]; n_dim],
        }
    }

    pub fn n_dim(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn get(&self, axis: usize, side: Side) -> Option<Neighbor> {
        self.entries
            .get(axis)
            .and_then(|sides| sides[side.index()])
    }

    pub fn set(&mut self, axis: usize, side: Side, neighbor: Option<Neighbor>) {
        self.entries[axis][side.index()] = neighbor;
    }

    /// True when the neighbor exists and is co-located with `my_rank`.
    #[inline]
    pub fn is_local(&self, axis: usize, side: Side, my_rank: usize) -> bool {
        self.get(axis, side).is_some_and(|n| n.rank == my_rank)
    }

    /// Distinct remote ranks, sorted.
    pub fn remote_ranks(&self, my_rank: usize) -> Vec<usize> {
        self.entries
            .iter()
            .flat_map(|sides| sides.iter().flatten())
            .filter(|n| n.rank != my_rank)
            .map(|n| n.rank)
            .sorted_unstable()
            .dedup()
            .collect()
    }
}
