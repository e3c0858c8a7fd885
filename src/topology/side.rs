//! Axis/side vocabulary shared by the neighbor table and the exchange state.

use std::fmt;

/// Largest supported number of spatial axes.
pub const MAX_DIM: usize = 3;

/// One of the two faces of a patch along an axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    /// Towards decreasing coordinate.
    Low,
    /// Towards increasing coordinate.
    High,
}

impl Side {
    /// Both sides, low first. Iteration order used by every per-axis loop.
    pub const ALL: [Side; 2] = [Side::Low, Side::High];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Side::Low => 0,
            Side::High => 1,
        }
    }

    #[inline]
    pub fn from_index(i: usize) -> Option<Side> {
        match i {
            0 => Some(Side::Low),
            1 => Some(Side::High),
            _ => None,
        }
    }

    /// The face a neighbor sees us through.
    #[inline]
    pub fn opposite(self) -> Side {
        match self {
            Side::Low => Side::High,
            Side::High => Side::Low,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Low => f.write_str("low"),
            Side::High => f.write_str("high"),
        }
    }
}

/// Destination of a departing particle: the first axis it left and on which side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AxisSide {
    pub axis: usize,
    pub side: Side,
}

impl AxisSide {
    pub fn new(axis: usize, side: Side) -> Self {
        Self { axis, side }
    }
}
