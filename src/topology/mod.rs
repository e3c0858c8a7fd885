//! Top-level module for the patch decomposition.
//!
//! This module provides the geometric and connectivity side of the exchange:
//! - Axis/side vocabulary ([`Side`], [`AxisSide`])
//! - Per-patch bounds ([`LocalBounds`])
//! - Per-patch neighbor tables with local/remote classification ([`NeighborTable`])
//! - The global patch grid and its rank ownership ([`PatchGrid`])

pub mod bounds;
pub mod grid;
pub mod neighbors;
pub mod side;

pub use bounds::LocalBounds;
pub use grid::PatchGrid;
pub use neighbors::{Neighbor, NeighborTable};
pub use side::{AxisSide, MAX_DIM, Side};
