//! Field solver, interpolator and projector capability set.
//!
//! The exchange never calls these; each [`Patch`](crate::patch::Patch) only
//! owns one instance of each, built once from [`SimulationParams::operators`].

use crate::data::particle::Particle;
use crate::exchange_error::ExchangeError;
use crate::params::SimulationParams;
use crate::topology::bounds::LocalBounds;
use std::fmt;

/// Advances the fields of one patch.
pub trait FieldSolver: Send + Sync {
    fn name(&self) -> &str;
    fn solve(&mut self, bounds: &LocalBounds, dt: f64) -> Result<(), ExchangeError>;
}

/// Gathers fields at particle positions.
pub trait Interpolator: Send + Sync {
    fn name(&self) -> &str;
    /// Write `(E, B)` seen by each particle into `out`, one entry per particle.
    fn interpolate(
        &self,
        particles: &[Particle],
        out: &mut [([f64; 3], [f64; 3])],
    ) -> Result<(), ExchangeError>;
}

/// Deposits particle currents and densities onto the fields.
pub trait Projector: Send + Sync {
    fn name(&self) -> &str;
    fn project(&mut self, particles: &[Particle]) -> Result<(), ExchangeError>;
}

/// Operators that leave fields untouched and report zero fields.
#[derive(Clone, Copy, Debug, Default)]
pub struct Inert;

impl FieldSolver for Inert {
    fn name(&self) -> &str {
        "none"
    }

    fn solve(&mut self, _bounds: &LocalBounds, _dt: f64) -> Result<(), ExchangeError> {
        Ok(())
    }
}

impl Interpolator for Inert {
    fn name(&self) -> &str {
        "none"
    }

    fn interpolate(
        &self,
        particles: &[Particle],
        out: &mut [([f64; 3], [f64; 3])],
    ) -> Result<(), ExchangeError> {
        if out.len() != particles.len() {
            return Err(ExchangeError::IndexOutOfRange {
                index: particles.len(),
                len: out.len(),
            });
        }
        out.fill(([0.0; 3], [0.0; 3]));
        Ok(())
    }
}

impl Projector for Inert {
    fn name(&self) -> &str {
        "none"
    }

    fn project(&mut self, _particles: &[Particle]) -> Result<(), ExchangeError> {
        Ok(())
    }
}

/// One instance of each operator, owned by a patch.
pub struct OperatorSet {
    pub solver: Box<dyn FieldSolver>,
    pub interpolator: Box<dyn Interpolator>,
    pub projector: Box<dyn Projector>,
}

impl OperatorSet {
    /// Build the set named by `params.operators`.
    pub fn from_params(params: &SimulationParams) -> Result<Self, ExchangeError> {
        match params.operators.as_str() {
            "none" => Ok(Self::inert()),
            other => Err(ExchangeError::InvalidConfig(format!(
                "unknown operator set '{other}'"
            ))),
        }
    }

    pub fn inert() -> Self {
        Self {
            solver: Box::new(Inert),
            interpolator: Box::new(Inert),
            projector: Box::new(Inert),
        }
    }
}

impl fmt::Debug for OperatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorSet")
            .field("solver", &self.solver.name())
            .field("interpolator", &self.interpolator.name())
            .field("projector", &self.projector.name())
            .finish()
    }
}
