//! Simulation parameters consumed by the decomposition and the exchange.

use crate::exchange_error::ExchangeError;
use crate::topology::side::MAX_DIM;
use std::time::Duration;

/// Geometry and decomposition of the simulation box.
///
/// Per-axis vectors must all have `n_dim` entries. Bins partition each
/// patch's particle store along axis 0 only, `cells_per_bin` cells wide.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    pub n_dim: usize,
    /// Cell size per axis.
    pub cell_length: Vec<f64>,
    /// Cells per patch per axis.
    pub n_space: Vec<usize>,
    /// Patches per axis.
    pub number_of_patches: Vec<usize>,
    /// Periodic wrap per axis.
    pub periodic: Vec<bool>,
    /// Bin width along axis 0, in cells.
    pub cells_per_bin: usize,
    /// How long a posted receive may stay unanswered before the step aborts.
    pub comm_timeout_ms: u64,
    /// Key selecting the field solver / interpolator / projector set.
    pub operators: String,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            n_dim: 1,
            cell_length: vec![1.0],
            n_space: vec![8],
            number_of_patches: vec![2],
            periodic: vec![true],
            cells_per_bin: 1,
            comm_timeout_ms: 30_000,
            operators: "none".to_string(),
        }
    }
}

impl SimulationParams {
    /// Parse and validate a JSON document. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ExchangeError> {
        let params: SimulationParams = serde_json::from_str(json)
            .map_err(|e| ExchangeError::InvalidConfig(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ExchangeError> {
        if self.n_dim == 0 || self.n_dim > MAX_DIM {
            return Err(ExchangeError::InvalidConfig(format!(
                "n_dim must be in 1..={MAX_DIM}, got {}",
                self.n_dim
            )));
        }
        let lens = [
            ("cell_length", self.cell_length.len()),
            ("n_space", self.n_space.len()),
            ("number_of_patches", self.number_of_patches.len()),
            ("periodic", self.periodic.len()),
        ];
        for (name, len) in lens {
            if len != self.n_dim {
                return Err(ExchangeError::InvalidConfig(format!(
                    "{name} has {len} entries, expected n_dim = {}",
                    self.n_dim
                )));
            }
        }
        for axis in 0..self.n_dim {
            if !(self.cell_length[axis] > 0.0) || !self.cell_length[axis].is_finite() {
                return Err(ExchangeError::InvalidConfig(format!(
                    "cell_length[{axis}] must be positive and finite"
                )));
            }
            if self.n_space[axis] == 0 {
                return Err(ExchangeError::InvalidConfig(format!(
                    "n_space[{axis}] must be non-zero"
                )));
            }
            if self.number_of_patches[axis] == 0 {
                return Err(ExchangeError::InvalidConfig(format!(
                    "number_of_patches[{axis}] must be non-zero"
                )));
            }
        }
        if self.cells_per_bin == 0 || self.n_space[0] % self.cells_per_bin != 0 {
            return Err(ExchangeError::InvalidConfig(format!(
                "cells_per_bin ({}) must divide n_space[0] ({})",
                self.cells_per_bin, self.n_space[0]
            )));
        }
        if self.comm_timeout_ms == 0 {
            return Err(ExchangeError::InvalidConfig(
                "comm_timeout_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Extent of one patch along `axis`.
    #[inline]
    pub fn patch_length(&self, axis: usize) -> f64 {
        self.cell_length[axis] * self.n_space[axis] as f64
    }

    /// Extent of the global box along `axis`.
    #[inline]
    pub fn domain_length(&self, axis: usize) -> f64 {
        self.patch_length(axis) * self.number_of_patches[axis] as f64
    }

    #[inline]
    pub fn bin_width(&self) -> f64 {
        self.cell_length[0] * self.cells_per_bin as f64
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.n_space[0] / self.cells_per_bin
    }

    pub fn total_patches(&self) -> usize {
        self.number_of_patches.iter().product()
    }

    pub fn comm_timeout(&self) -> Duration {
        Duration::from_millis(self.comm_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        SimulationParams::default().validate().unwrap();
    }

    #[test]
    fn derived_lengths() {
        let p = SimulationParams {
            n_dim: 2,
            cell_length: vec![0.5, 2.0],
            n_space: vec![8, 4],
            number_of_patches: vec![3, 2],
            periodic: vec![true, false],
            cells_per_bin: 2,
            ..SimulationParams::default()
        };
        p.validate().unwrap();
        assert_eq!(p.patch_length(0), 4.0);
        assert_eq!(p.domain_length(1), 16.0);
        assert_eq!(p.bin_width(), 1.0);
        assert_eq!(p.n_bins(), 4);
        assert_eq!(p.total_patches(), 6);
    }

    #[test]
    fn bin_width_must_divide_patch() {
        let p = SimulationParams {
            n_space: vec![10],
            cells_per_bin: 3,
            ..SimulationParams::default()
        };
        assert!(matches!(p.validate(), Err(ExchangeError::InvalidConfig(_))));
    }
}
