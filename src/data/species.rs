//! One particle species held by a patch: its store and its departed list.

use crate::data::particle_store::ParticleStore;
use crate::exchange_error::ExchangeError;

/// Particle container for one species in one patch.
#[derive(Clone, Debug, Default)]
pub struct Species {
    /// Human-readable name, used in log lines only.
    pub name: String,
    /// Binned records.
    pub store: ParticleStore,
    /// Store indices of particles that left the patch this step.
    ///
    /// Filled by the particle push (or [`Species::mark_departed`]), extended
    /// by corner reclassification, and cleared after compaction.
    pub departed: Vec<usize>,
}

impl Species {
    /// An empty species with `n_bins` bins.
    pub fn new(name: impl Into<String>, n_bins: usize) -> Self {
        Self {
            name: name.into(),
            store: ParticleStore::with_bins(n_bins),
            departed: Vec::new(),
        }
    }

    /// Record store indices that left the patch. Order does not matter.
    pub fn mark_departed<I>(&mut self, indices: I) -> Result<(), ExchangeError>
    where
        I: IntoIterator<Item = usize>,
    {
        for i in indices {
            if i >= self.store.len() {
                return Err(ExchangeError::IndexOutOfRange {
                    index: i,
                    len: self.store.len(),
                });
            }
            self.departed.push(i);
        }
        Ok(())
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
