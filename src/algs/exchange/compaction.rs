//! Compaction & insertion: the one routine that moves records across bins.
//!
//! Runs once per patch after the last axis. Deletion shrinks bins in place,
//! then a single prefix-summed shift opens exactly the room each bin needs
//! for its arrivals.

use super::state::{AxisSides, ExchangeState};
use crate::data::particle::Particle;
use crate::data::particle_store::{BinRange, ParticleStore};
use crate::debug_invariants::DebugInvariants;
use crate::exchange_error::{ErrorContext, ExchangeError};
use crate::patch::Patch;
use crate::topology::side::Side;

/// Remove the records at `departed` from `store`.
///
/// Indices are sorted and deduplicated first. Each bin deletes its own
/// departed records by swapping in its last live record, then bins are slid
/// left over the holes and the tail is truncated. Order inside a bin is not
/// preserved.
pub fn cleanup_departed(
    store: &mut ParticleStore,
    departed: &mut Vec<usize>,
) -> Result<(), ExchangeError> {
    departed.sort_unstable();
    departed.dedup();
    let mut bins = store.bins().to_vec();
    let covered = bins.last().map_or(0, |b| b.end);
    if let Some(&last) = departed.last() {
        if last >= covered {
            return Err(ExchangeError::IndexOutOfRange {
                index: last,
                len: covered,
            });
        }
    }

    // Descending, so the record swapped in is never itself departed.
    let mut b = bins.len();
    for &idx in departed.iter().rev() {
        while b > 0 && bins[b - 1].start > idx {
            b -= 1;
        }
        let Some(bin) = b.checked_sub(1).map(|i| &mut bins[i]) else {
            return Err(ExchangeError::invariant(
                ErrorContext::default(),
                format!("departed index {idx} lies in no bin"),
            ));
        };
        if !bin.contains(idx) {
            return Err(ExchangeError::invariant(
                ErrorContext::bin(b - 1),
                format!("departed index {idx} outside bin [{}, {})", bin.start, bin.end),
            ));
        }
        store.overwrite(idx, bin.end - 1)?;
        bin.end -= 1;
    }

    close_gaps(store, &mut bins)?;
    let end = bins.last().map_or(0, |b| b.end);
    store.erase_tail(end)?;
    store.set_bins(bins)
}

/// Slide bins `1..` left until each starts where the previous one ends.
fn close_gaps(store: &mut ParticleStore, bins: &mut [BinRange]) -> Result<(), ExchangeError> {
    for b in 1..bins.len() {
        let target = bins[b - 1].end;
        let gap = bins[b].start - target;
        if gap == 0 {
            continue;
        }
        let n = bins[b].len();
        let n_move = gap.min(n);
        store.overwrite_range(bins[b].end - n_move, target, n_move)?;
        bins[b] = BinRange::new(target, target + n);
    }
    Ok(())
}

/// Insert every particle of `incoming` into its bin; returns how many.
///
/// Axis-0 arrivals go to the first bin (low face) or the last bin (high
/// face) as a block. Arrivals through other axes are placed by their axis-0
/// coordinate, bins being `bin_width` wide from `origin`.
pub fn insert_incoming(
    store: &mut ParticleStore,
    incoming: &AxisSides<Vec<Particle>>,
    origin: f64,
    bin_width: f64,
) -> Result<usize, ExchangeError> {
    let mut bins = store.bins().to_vec();
    let n_bins = bins.len();
    let total: usize = incoming.iter().map(|(_, _, v)| v.len()).sum();
    if total == 0 {
        return Ok(0);
    }
    if n_bins == 0 {
        return Err(ExchangeError::invariant(
            ErrorContext::default(),
            "store has no bins to receive particles",
        ));
    }

    // Destination bin of every arrival, resolved before anything moves.
    let mut placed: Vec<(usize, &[Particle])> = Vec::new();
    let mut shift = vec![0usize; n_bins + 1];
    for (axis, side, parts) in incoming.iter() {
        if parts.is_empty() {
            continue;
        }
        if axis == 0 {
            let b = match side {
                Side::Low => 0,
                Side::High => n_bins - 1,
            };
            shift[b + 1] += parts.len();
            placed.push((b, parts.as_slice()));
            continue;
        }
        for p in parts {
            let b = ParticleStore::bin_index(p.coord(0), origin, bin_width, n_bins).ok_or_else(
                || {
                    ExchangeError::invariant(
                        ErrorContext::axis_side(axis, side),
                        format!(
                            "arriving particle {} at x = {} lies outside every bin",
                            p.id,
                            p.coord(0)
                        ),
                    )
                },
            )?;
            shift[b + 1] += 1;
            placed.push((b, std::slice::from_ref(p)));
        }
    }
    for b in 1..=n_bins {
        shift[b] += shift[b - 1];
    }
    debug_assert_eq!(shift[n_bins], total);

    store.create_blank(total);
    // Highest bin first: a lower bin's move would overwrite records of a
    // higher bin that has not moved yet.
    for b in (1..n_bins).rev() {
        let s = shift[b];
        if s == 0 {
            continue;
        }
        let n = bins[b].len();
        let n_move = n.min(s);
        let l_move = n.max(s);
        store.overwrite_range(bins[b].start, bins[b].start + l_move, n_move)?;
        bins[b].start += s;
        bins[b].end += s;
    }

    for (b, parts) in placed {
        store.write_at(bins[b].end, parts)?;
        bins[b].end += parts.len();
    }
    store.set_bins(bins)?;
    Ok(total)
}

/// Delete departed records of `species` in `patch` and insert its arrivals.
pub(crate) fn finish_patch(
    patch: &mut Patch,
    species: usize,
    state: &mut ExchangeState,
    bin_width: f64,
) -> Result<(), ExchangeError> {
    let origin = patch.bounds.min[0];
    let ctx = ErrorContext::species(species);
    let sp = patch.species_mut(species)?;
    cleanup_departed(&mut sp.store, &mut sp.departed).map_err(|e| e.within(ctx))?;
    state.received =
        insert_incoming(&mut sp.store, &state.recv, origin, bin_width).map_err(|e| e.within(ctx))?;
    sp.departed.clear();
    sp.store.debug_assert_invariants();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: u64, x: f64) -> Particle {
        Particle::at(id, [x, 0.0, 0.0])
    }

    fn store(xs: &[(u64, f64)]) -> ParticleStore {
        let parts = xs.iter().map(|&(id, x)| p(id, x)).collect();
        ParticleStore::from_particles(parts, 0.0, 1.0, 3).unwrap()
    }

    fn ids(s: &ParticleStore, b: usize) -> Vec<u64> {
        let mut v: Vec<u64> = s.bin_slice(b).unwrap().iter().map(|q| q.id).collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn deletion_closes_gaps() {
        let mut s = store(&[(1, 0.1), (2, 0.2), (3, 1.1), (4, 1.2), (5, 1.3), (6, 2.5)]);
        let mut departed = vec![4, 0, 2];
        cleanup_departed(&mut s, &mut departed).unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(ids(&s, 0), vec![2]);
        assert_eq!(ids(&s, 1), vec![4]);
        assert_eq!(ids(&s, 2), vec![6]);
        s.check_binning(0.0, 1.0).unwrap();
    }

    #[test]
    fn deleting_a_whole_bin() {
        let mut s = store(&[(1, 0.1), (2, 1.2), (3, 1.3), (4, 2.5), (5, 2.6)]);
        let mut departed = vec![1, 2];
        cleanup_departed(&mut s, &mut departed).unwrap();
        assert_eq!(s.bins()[1], BinRange::new(1, 1));
        assert_eq!(ids(&s, 2), vec![4, 5]);
        s.check_binning(0.0, 1.0).unwrap();
    }

    #[test]
    fn departed_past_the_bins_is_rejected() {
        let mut s = store(&[(1, 0.1)]);
        s.append(p(2, 0.2));
        let err = cleanup_departed(&mut s, &mut vec![1]).unwrap_err();
        assert!(matches!(err, ExchangeError::IndexOutOfRange { index: 1, .. }));
    }

    #[test]
    fn insertion_opens_room_in_every_bin() {
        let mut s = store(&[(1, 0.1), (2, 1.5), (3, 1.6), (4, 2.2)]);
        let mut incoming: AxisSides<Vec<Particle>> = AxisSides::new(2);
        incoming[(0, Side::Low)] = vec![p(10, 0.05), p(11, 0.01)];
        incoming[(0, Side::High)] = vec![p(12, 2.99)];
        incoming[(1, Side::Low)] = vec![p(13, 1.01), p(14, 0.5)];
        incoming[(1, Side::High)] = vec![p(15, 2.0)];
        let n = insert_incoming(&mut s, &incoming, 0.0, 1.0).unwrap();
        assert_eq!(n, 6);
        assert_eq!(s.len(), 10);
        assert_eq!(ids(&s, 0), vec![1, 10, 11, 14]);
        assert_eq!(ids(&s, 1), vec![2, 3, 13]);
        assert_eq!(ids(&s, 2), vec![4, 12, 15]);
        s.check_binning(0.0, 1.0).unwrap();
    }

    #[test]
    fn insertion_into_empty_store() {
        let mut s = ParticleStore::with_bins(3);
        let mut incoming: AxisSides<Vec<Particle>> = AxisSides::new(2);
        incoming[(1, Side::High)] = vec![p(1, 2.5), p(2, 0.5), p(3, 2.4)];
        insert_incoming(&mut s, &incoming, 0.0, 1.0).unwrap();
        assert_eq!(s.bins(), &[BinRange::new(0, 1), BinRange::new(1, 1), BinRange::new(1, 3)]);
        s.check_binning(0.0, 1.0).unwrap();
    }

    #[test]
    fn arrival_outside_every_bin_names_its_face() {
        let mut s = ParticleStore::with_bins(2);
        let mut incoming: AxisSides<Vec<Particle>> = AxisSides::new(2);
        incoming[(1, Side::Low)] = vec![p(1, 7.0)];
        match insert_incoming(&mut s, &incoming, 0.0, 1.0).unwrap_err() {
            ExchangeError::InvariantViolation { context, .. } => {
                assert_eq!(context.axis, Some(1));
                assert_eq!(context.side, Some(Side::Low));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(s.is_empty());
    }
}
