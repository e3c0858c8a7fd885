//! Particle record: the unit stored in bins and shipped between patches.
//!
//! The record is `#[repr(C)]` and [`Pod`], so a slice of particles is its own
//! wire format: transfers cast the slice to bytes without a packing step.
//! All fields are 8 bytes wide, which keeps the layout free of padding.

use crate::topology::side::MAX_DIM;
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

/// One macro-particle.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Particle {
    /// Position per axis; entries past `n_dim` are ignored.
    pub position: [f64; MAX_DIM],
    /// Momentum (always three components).
    pub momentum: [f64; 3],
    /// Statistical weight.
    pub weight: f64,
    /// Charge in units of the elementary charge.
    pub charge: f64,
    /// Globally unique identifier.
    pub id: u64,
}

const_assert_eq!(std::mem::size_of::<Particle>(), 72);
const_assert_eq!(std::mem::align_of::<Particle>(), 8);

impl Particle {
    /// A unit-weight particle at rest at `position`.
    pub fn at(id: u64, position: [f64; MAX_DIM]) -> Self {
        Self {
            position,
            momentum: [0.0; 3],
            weight: 1.0,
            charge: 1.0,
            id,
        }
    }

    /// Builder-style momentum setter.
    pub fn with_momentum(mut self, momentum: [f64; 3]) -> Self {
        self.momentum = momentum;
        self
    }

    /// Coordinate along `axis`.
    #[inline]
    pub fn coord(&self, axis: usize) -> f64 {
        self.position[axis]
    }
}
