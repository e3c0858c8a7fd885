//! Geometric extent of one patch.

use crate::topology::side::{MAX_DIM, Side};

/// Half-open box `[min, max)` per axis. Only the first `n_dim` entries are meaningful.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LocalBounds {
    pub n_dim: usize,
    pub min: [f64; MAX_DIM],
    pub max: [f64; MAX_DIM],
}

impl LocalBounds {
    pub fn new(n_dim: usize, min: [f64; MAX_DIM], max: [f64; MAX_DIM]) -> Self {
        Self { n_dim, min, max }
    }

    /// Which side of `axis` the coordinate `x` lies beyond, if any.
    #[inline]
    pub fn outside(&self, axis: usize, x: f64) -> Option<Side> {
        if x < self.min[axis] {
            Some(Side::Low)
        } else if x >= self.max[axis] {
            Some(Side::High)
        } else {
            None
        }
    }

    /// True iff every meaningful coordinate lies inside.
    pub fn contains(&self, position: &[f64; MAX_DIM]) -> bool {
        (0..self.n_dim).all(|axis| self.outside(axis, position[axis]).is_none())
    }

    #[inline]
    pub fn length(&self, axis: usize) -> f64 {
        self.max[axis] - self.min[axis]
    }
}
