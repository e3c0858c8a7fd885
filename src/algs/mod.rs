//! Re-export public algorithms.

pub mod communicator;
pub mod exchange;
pub mod wire;

pub use exchange::{ExchangeReport, exchange_particles};
