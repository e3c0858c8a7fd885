//! Bin-indexed particle store.
//!
//! A [`ParticleStore`] is a flat `Vec<Particle>` partitioned into bins along
//! axis 0. Bin `i` owns the index range `[bins[i].start, bins[i].end)`.
//!
//! # Invariants
//!
//! - Bin 0 starts at index 0.
//! - Bins are ordered and gapless: `bins[i].end == bins[i + 1].start`.
//! - `start <= end` for every bin.
//! - The last bin ends at `len()`.
//!
//! The store never re-bins on its own. Primitive operations (append, range
//! overwrite, truncation, blank creation) may leave the invariants broken
//! temporarily; the exchange's compaction pass is the one routine that moves
//! records across bin boundaries and restores them. All element access is
//! range-checked and reports [`ExchangeError::IndexOutOfRange`].

use crate::data::particle::Particle;
use crate::debug_invariants::DebugInvariants;
use crate::exchange_error::{ErrorContext, ExchangeError};

/// Half-open index range `[start, end)` owned by one bin.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BinRange {
    /// First index in the bin.
    pub start: usize,
    /// One past the last index in the bin.
    pub end: usize,
}

impl BinRange {
    /// Construct a range.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of records in the bin (zero if the range is inverted).
    #[inline]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the bin holds no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether index `i` falls in this bin.
    #[inline]
    pub fn contains(&self, i: usize) -> bool {
        self.start <= i && i < self.end
    }
}

/// Per-species particle container partitioned into axis-0 bins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParticleStore {
    particles: Vec<Particle>,
    bins: Vec<BinRange>,
}

impl ParticleStore {
    /// An empty store with `n_bins` empty bins.
    pub fn with_bins(n_bins: usize) -> Self {
        Self {
            particles: Vec::new(),
            bins: vec![BinRange::default(); n_bins],
        }
    }

    /// Bin an unordered set of particles by axis-0 coordinate.
    ///
    /// Bins are `bin_width` wide starting at `origin`. Relative order of
    /// particles within a bin follows their order in `particles`.
    ///
    /// # Errors
    /// `InvariantViolation` if a particle lies outside
    /// `[origin, origin + n_bins * bin_width)`.
    pub fn from_particles(
        particles: Vec<Particle>,
        origin: f64,
        bin_width: f64,
        n_bins: usize,
    ) -> Result<Self, ExchangeError> {
        let mut counts = vec![0usize; n_bins];
        let mut slot = Vec::with_capacity(particles.len());
        for p in &particles {
            let b = Self::bin_index(p.coord(0), origin, bin_width, n_bins).ok_or_else(|| {
                ExchangeError::invariant(
                    ErrorContext::default(),
                    format!(
                        "particle {} at x = {} lies outside the binned range",
                        p.id,
                        p.coord(0)
                    ),
                )
            })?;
            counts[b] += 1;
            slot.push(b);
        }
        let mut bins = Vec::with_capacity(n_bins);
        let mut offset = 0usize;
        for &c in &counts {
            bins.push(BinRange::new(offset, offset + c));
            offset += c;
        }
        let mut cursor: Vec<usize> = bins.iter().map(|b| b.start).collect();
        let mut sorted = vec![Particle::default(); particles.len()];
        for (p, b) in particles.into_iter().zip(slot) {
            sorted[cursor[b]] = p;
            cursor[b] += 1;
        }
        let store = Self {
            particles: sorted,
            bins,
        };
        store.debug_assert_invariants();
        Ok(store)
    }

    /// Bin holding axis-0 coordinate `x`, for bins `width` wide from `origin`.
    ///
    /// A coordinate whose quotient rounds up to exactly `n_bins` while still
    /// lying below the upper edge is placed in the last bin.
    pub fn bin_index(x: f64, origin: f64, width: f64, n_bins: usize) -> Option<usize> {
        let offset = x - origin;
        if !(offset >= 0.0) || n_bins == 0 {
            return None;
        }
        let b = (offset / width).floor() as usize;
        if b < n_bins {
            Some(b)
        } else if b == n_bins && offset < width * n_bins as f64 {
            log::warn!("bin lookup for x = {x} rounded onto the upper edge; clamped");
            Some(n_bins - 1)
        } else {
            None
        }
    }

    /// Number of records, including any not yet covered by a bin.
    #[inline]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// Whether the store holds no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Number of bins.
    #[inline]
    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    /// All bin ranges, in order.
    #[inline]
    pub fn bins(&self) -> &[BinRange] {
        &self.bins
    }

    /// Range of bin `b`.
    pub fn bin(&self, b: usize) -> Result<BinRange, ExchangeError> {
        self.bins
            .get(b)
            .copied()
            .ok_or(ExchangeError::IndexOutOfRange {
                index: b,
                len: self.bins.len(),
            })
    }

    /// Replace the bin table. The new table must satisfy the store invariants.
    pub fn set_bins(&mut self, bins: Vec<BinRange>) -> Result<(), ExchangeError> {
        let old = std::mem::replace(&mut self.bins, bins);
        if let Err(e) = self.validate_invariants() {
            self.bins = old;
            return Err(e);
        }
        Ok(())
    }

    /// All records as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[Particle] {
        &self.particles
    }

    /// Records of bin `b`.
    pub fn bin_slice(&self, b: usize) -> Result<&[Particle], ExchangeError> {
        let r = self.bin(b)?;
        self.particles
            .get(r.start..r.end)
            .ok_or(ExchangeError::IndexOutOfRange {
                index: r.end,
                len: self.particles.len(),
            })
    }

    /// Record at index `i`.
    pub fn get(&self, i: usize) -> Result<&Particle, ExchangeError> {
        let len = self.particles.len();
        self.particles
            .get(i)
            .ok_or(ExchangeError::IndexOutOfRange { index: i, len })
    }

    /// Mutable record at index `i`.
    pub fn get_mut(&mut self, i: usize) -> Result<&mut Particle, ExchangeError> {
        let len = self.particles.len();
        self.particles
            .get_mut(i)
            .ok_or(ExchangeError::IndexOutOfRange { index: i, len })
    }

    /// Append a record at the tail. Bins are not touched.
    pub fn append(&mut self, p: Particle) -> usize {
        self.particles.push(p);
        self.particles.len() - 1
    }

    /// Append a record and extend the last bin over it.
    ///
    /// Used to park a record that still has to leave on a later axis, so that
    /// the deletion pass finds it inside a bin.
    pub fn append_to_last_bin(&mut self, p: Particle) -> Result<usize, ExchangeError> {
        let len = self.particles.len();
        let n_bins = self.bins.len();
        let last = self.bins.last_mut().ok_or_else(|| {
            ExchangeError::invariant(ErrorContext::default(), "store has no bins")
        })?;
        if last.end != len {
            return Err(ExchangeError::invariant(
                ErrorContext::bin(n_bins - 1),
                format!("last bin ends at {} but store holds {len}", last.end),
            ));
        }
        last.end += 1;
        self.particles.push(p);
        Ok(len)
    }

    /// Copy record `src` over record `dst`.
    pub fn overwrite(&mut self, dst: usize, src: usize) -> Result<(), ExchangeError> {
        let p = *self.get(src)?;
        *self.get_mut(dst)? = p;
        Ok(())
    }

    /// Copy `count` records starting at `src` to `dst` (ranges may overlap).
    pub fn overwrite_range(
        &mut self,
        src: usize,
        dst: usize,
        count: usize,
    ) -> Result<(), ExchangeError> {
        let len = self.particles.len();
        let src_end = src
            .checked_add(count)
            .ok_or(ExchangeError::IndexOutOfRange { index: src, len })?;
        let dst_end = dst
            .checked_add(count)
            .ok_or(ExchangeError::IndexOutOfRange { index: dst, len })?;
        if src_end > len {
            return Err(ExchangeError::IndexOutOfRange {
                index: src_end - 1,
                len,
            });
        }
        if dst_end > len {
            return Err(ExchangeError::IndexOutOfRange {
                index: dst_end - 1,
                len,
            });
        }
        self.particles.copy_within(src..src_end, dst);
        Ok(())
    }

    /// Copy external records into `[offset, offset + src.len())`.
    pub fn write_at(&mut self, offset: usize, src: &[Particle]) -> Result<(), ExchangeError> {
        let len = self.particles.len();
        let end = offset
            .checked_add(src.len())
            .ok_or(ExchangeError::IndexOutOfRange { index: offset, len })?;
        let dst = self
            .particles
            .get_mut(offset..end)
            .ok_or(ExchangeError::IndexOutOfRange {
                index: end.saturating_sub(1),
                len,
            })?;
        dst.copy_from_slice(src);
        Ok(())
    }

    /// Truncate the store to `from` records.
    pub fn erase_tail(&mut self, from: usize) -> Result<(), ExchangeError> {
        if from > self.particles.len() {
            return Err(ExchangeError::IndexOutOfRange {
                index: from,
                len: self.particles.len(),
            });
        }
        self.particles.truncate(from);
        Ok(())
    }

    /// Reserve `n` blank records at the tail. Bins are not touched.
    pub fn create_blank(&mut self, n: usize) {
        self.particles
            .resize(self.particles.len() + n, Particle::default());
    }

    /// Verify every record's axis-0 coordinate lies in its bin's slice.
    pub fn check_binning(&self, origin: f64, bin_width: f64) -> Result<(), ExchangeError> {
        self.validate_invariants()?;
        let n_bins = self.bins.len();
        for (b, range) in self.bins.iter().enumerate() {
            for p in &self.particles[range.start..range.end] {
                let found = Self::bin_index(p.coord(0), origin, bin_width, n_bins);
                if found != Some(b) {
                    return Err(ExchangeError::invariant(
                        ErrorContext::bin(b),
                        format!(
                            "particle {} at x = {} belongs to bin {:?}",
                            p.id,
                            p.coord(0),
                            found
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl DebugInvariants for ParticleStore {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "ParticleStore");
    }

    fn validate_invariants(&self) -> Result<(), ExchangeError> {
        let mut expected_start = 0usize;
        for (b, range) in self.bins.iter().enumerate() {
            if range.start != expected_start {
                return Err(ExchangeError::invariant(
                    ErrorContext::bin(b),
                    format!(
                        "bin starts at {} but previous bin ends at {expected_start}",
                        range.start
                    ),
                ));
            }
            if range.end < range.start {
                return Err(ExchangeError::invariant(
                    ErrorContext::bin(b),
                    format!("inverted range [{}, {})", range.start, range.end),
                ));
            }
            expected_start = range.end;
        }
        if expected_start != self.particles.len() {
            return Err(ExchangeError::invariant(
                ErrorContext::default(),
                format!(
                    "bins cover {expected_start} records but store holds {}",
                    self.particles.len()
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: u64, x: f64) -> Particle {
        Particle::at(id, [x, 0.0, 0.0])
    }

    #[test]
    fn from_particles_sorts_into_bins() {
        let parts = vec![p(1, 3.5), p(2, 0.5), p(3, 2.1), p(4, 0.9), p(5, 3.0)];
        let s = ParticleStore::from_particles(parts, 0.0, 1.0, 4).unwrap();
        assert_eq!(
            s.bins(),
            &[
                BinRange::new(0, 2),
                BinRange::new(2, 2),
                BinRange::new(2, 3),
                BinRange::new(3, 5)
            ]
        );
        let ids: Vec<u64> = s.as_slice().iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![2, 4, 3, 1, 5]);
        s.check_binning(0.0, 1.0).unwrap();
    }

    #[test]
    fn from_particles_rejects_outsiders() {
        let err = ParticleStore::from_particles(vec![p(1, 4.0)], 0.0, 1.0, 4).unwrap_err();
        assert!(matches!(err, ExchangeError::InvariantViolation { .. }));
    }

    #[test]
    fn range_checked_access() {
        let mut s = ParticleStore::with_bins(1);
        assert!(matches!(
            s.get(0),
            Err(ExchangeError::IndexOutOfRange { index: 0, len: 0 })
        ));
        s.append(p(1, 0.1));
        s.append(p(2, 0.2));
        assert!(s.overwrite(0, 2).is_err());
        assert!(s.overwrite_range(1, 0, 2).is_err());
        assert!(s.erase_tail(3).is_err());
        assert!(s.write_at(1, &[p(9, 0.0), p(9, 0.0)]).is_err());
    }

    #[test]
    fn primitives_move_records() {
        let mut s = ParticleStore::with_bins(1);
        for i in 0..4 {
            s.append(p(i, i as f64 * 0.1));
        }
        s.overwrite(0, 3).unwrap();
        assert_eq!(s.get(0).unwrap().id, 3);
        s.create_blank(2);
        assert_eq!(s.len(), 6);
        s.overwrite_range(0, 4, 2).unwrap();
        assert_eq!(s.get(4).unwrap().id, 3);
        assert_eq!(s.get(5).unwrap().id, 1);
        s.erase_tail(2).unwrap();
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn append_to_last_bin_keeps_cover() {
        let mut s = ParticleStore::from_particles(vec![p(1, 0.5)], 0.0, 1.0, 2).unwrap();
        let idx = s.append_to_last_bin(p(2, 7.0)).unwrap();
        assert_eq!(idx, 1);
        s.validate_invariants().unwrap();
        s.append(p(3, 0.0));
        match s.append_to_last_bin(p(4, 0.0)).unwrap_err() {
            ExchangeError::InvariantViolation { context, .. } => {
                assert_eq!(context.bin, Some(1))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invariants_detect_gaps() {
        let mut s = ParticleStore::with_bins(2);
        s.create_blank(3);
        let err = s
            .set_bins(vec![BinRange::new(0, 1), BinRange::new(2, 3)])
            .unwrap_err();
        match err {
            ExchangeError::InvariantViolation { context, .. } => {
                assert_eq!(context.bin, Some(1))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(s.bins(), &[BinRange::default(); 2]);
        s.set_bins(vec![BinRange::new(0, 1), BinRange::new(1, 3)])
            .unwrap();
    }

    #[test]
    fn bin_index_clamps_rounding_only() {
        assert_eq!(ParticleStore::bin_index(0.0, 0.0, 0.5, 4), Some(0));
        assert_eq!(ParticleStore::bin_index(1.99, 0.0, 0.5, 4), Some(3));
        assert_eq!(ParticleStore::bin_index(2.0, 0.0, 0.5, 4), None);
        assert_eq!(ParticleStore::bin_index(-0.01, 0.0, 0.5, 4), None);
        assert_eq!(ParticleStore::bin_index(f64::NAN, 0.0, 0.5, 4), None);
    }
}
