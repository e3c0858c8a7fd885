//! Patch grid: patch index ↔ grid coordinates, geometry and rank ownership.
//!
//! Patches are numbered row-major with axis 0 varying fastest. Ranks own
//! contiguous, balanced blocks of patch indices (the first `total % n_ranks`
//! ranks get one extra patch), so co-located patches are mostly neighbors
//! along axis 0.

use crate::exchange_error::ExchangeError;
use crate::params::SimulationParams;
use crate::topology::bounds::LocalBounds;
use crate::topology::neighbors::{Neighbor, NeighborTable};
use crate::topology::side::{MAX_DIM, Side};
use std::ops::Range;

#[derive(Clone, Debug, PartialEq)]
pub struct PatchGrid {
    n_dim: usize,
    number_of_patches: [usize; MAX_DIM],
    periodic: [bool; MAX_DIM],
    patch_length: [f64; MAX_DIM],
    n_ranks: usize,
}

impl PatchGrid {
    pub fn new(params: &SimulationParams, n_ranks: usize) -> Result<Self, ExchangeError> {
        params.validate()?;
        if n_ranks == 0 {
            return Err(ExchangeError::InvalidConfig(
                "at least one rank is required".to_string(),
            ));
        }
        let mut number_of_patches = [1usize; MAX_DIM];
        let mut periodic = [false; MAX_DIM];
        let mut patch_length = [0.0; MAX_DIM];
        for axis in 0..params.n_dim {
            number_of_patches[axis] = params.number_of_patches[axis];
            periodic[axis] = params.periodic[axis];
            patch_length[axis] = params.patch_length(axis);
        }
        Ok(Self {
            n_dim: params.n_dim,
            number_of_patches,
            periodic,
            patch_length,
            n_ranks,
        })
    }

    pub fn n_dim(&self) -> usize {
        self.n_dim
    }

    pub fn n_ranks(&self) -> usize {
        self.n_ranks
    }

    pub fn total_patches(&self) -> usize {
        self.number_of_patches[..self.n_dim].iter().product()
    }

    pub fn patches_along(&self, axis: usize) -> usize {
        self.number_of_patches[axis]
    }

    pub fn is_periodic(&self, axis: usize) -> bool {
        self.periodic[axis]
    }

    /// Extent of the global box along `axis`.
    pub fn domain_length(&self, axis: usize) -> f64 {
        self.patch_length[axis] * self.number_of_patches[axis] as f64
    }

    /// Grid coordinates of patch `hindex`.
    pub fn coords(&self, hindex: usize) -> [usize; MAX_DIM] {
        let mut coords = [0usize; MAX_DIM];
        let mut rest = hindex;
        for axis in 0..self.n_dim {
            coords[axis] = rest % self.number_of_patches[axis];
            rest /= self.number_of_patches[axis];
        }
        coords
    }

    /// Patch index at `coords`.
    pub fn index(&self, coords: &[usize; MAX_DIM]) -> usize {
        let mut idx = 0usize;
        for axis in (0..self.n_dim).rev() {
            idx = idx * self.number_of_patches[axis] + coords[axis];
        }
        idx
    }

    /// Range of patch indices held by `rank`.
    pub fn patches_of(&self, rank: usize) -> Range<usize> {
        let total = self.total_patches();
        let base = total / self.n_ranks;
        let rem = total % self.n_ranks;
        let start = rank * base + rank.min(rem);
        let len = base + usize::from(rank < rem);
        start.min(total)..(start + len).min(total)
    }

    /// Rank owning patch `hindex`.
    pub fn owner(&self, hindex: usize) -> usize {
        let total = self.total_patches();
        let base = total / self.n_ranks;
        let rem = total % self.n_ranks;
        let fat = rem * (base + 1);
        if hindex < fat {
            hindex / (base + 1)
        } else {
            // base > 0 here: with base == 0 every patch index is below `fat`.
            rem + (hindex - fat) / base
        }
    }

    /// Geometric bounds of patch `hindex`.
    pub fn bounds(&self, hindex: usize) -> LocalBounds {
        let coords = self.coords(hindex);
        let mut min = [0.0; MAX_DIM];
        let mut max = [0.0; MAX_DIM];
        for axis in 0..self.n_dim {
            min[axis] = coords[axis] as f64 * self.patch_length[axis];
            max[axis] = min[axis] + self.patch_length[axis];
        }
        LocalBounds::new(self.n_dim, min, max)
    }

    /// Face neighbors of `hindex`, wrapping on periodic axes.
    pub fn neighbors(&self, hindex: usize) -> NeighborTable {
        let coords = self.coords(hindex);
        let mut table = NeighborTable::isolated(self.n_dim);
        for axis in 0..self.n_dim {
            let n = self.number_of_patches[axis];
            for side in Side::ALL {
                let c = coords[axis];
                let target = match side {
                    Side::Low if c > 0 => Some(c - 1),
                    Side::Low if self.periodic[axis] => Some(n - 1),
                    Side::High if c + 1 < n => Some(c + 1),
                    Side::High if self.periodic[axis] => Some(0),
                    _ => None,
                };
                let neighbor = target.map(|t| {
                    let mut nc = coords;
                    nc[axis] = t;
                    let patch = self.index(&nc);
                    Neighbor {
                        patch,
                        rank: self.owner(patch),
                    }
                });
                table.set(axis, side, neighbor);
            }
        }
        table
    }

    /// Patch whose bounds contain `position`, if it lies inside the box.
    pub fn locate(&self, position: &[f64; MAX_DIM]) -> Option<usize> {
        let mut coords = [0usize; MAX_DIM];
        for axis in 0..self.n_dim {
            let x = position[axis];
            if !(x >= 0.0) || x >= self.domain_length(axis) {
                return None;
            }
            let c = (x / self.patch_length[axis]).floor() as usize;
            coords[axis] = c.min(self.number_of_patches[axis] - 1);
        }
        Some(self.index(&coords))
    }

    /// True when `hindex` touches the global boundary on `side` of `axis`.
    pub fn at_global_edge(&self, hindex: usize, axis: usize, side: Side) -> bool {
        let c = self.coords(hindex)[axis];
        match side {
            Side::Low => c == 0,
            Side::High => c + 1 == self.number_of_patches[axis],
        }
    }
}
