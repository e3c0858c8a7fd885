//! Wire types for the particle exchange.
//!
//! Two messages cross a face per axis/side/species/step: a [`WireCount`]
//! handshake, then `count` raw [`Particle`] records. Counts are
//! little-endian on the wire. Particle records travel in native layout,
//! as MPI datatypes of homogeneous clusters do.

use crate::data::particle::Particle;
use crate::exchange_error::ExchangeError;
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// Particle count announced ahead of a bulk transfer.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32,
}

impl WireCount {
    pub fn new(n: usize) -> Result<Self, ExchangeError> {
        let n = u32::try_from(n).map_err(|_| {
            ExchangeError::InvalidConfig(format!("{n} particles do not fit one handshake"))
        })?;
        Ok(Self { n_le: n.to_le() })
    }

    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

const_assert_eq!(size_of::<WireCount>(), 4);
const_assert_eq!(size_of::<Particle>() % 8, 0);

/// Bytes occupied by `n` particle records.
#[inline]
pub const fn particle_bytes(n: usize) -> usize {
    n * size_of::<Particle>()
}

/// Decode a handshake payload received from `neighbor`.
pub fn decode_count(bytes: &[u8], neighbor: usize) -> Result<usize, ExchangeError> {
    expect_exact_len(bytes.len(), size_of::<WireCount>())
        .map_err(|detail| ExchangeError::CommError { neighbor, detail })?;
    let mut c = WireCount::zeroed();
    cast_slice_mut(std::slice::from_mut(&mut c)).copy_from_slice(bytes);
    Ok(c.get())
}

/// Decode exactly `expected` particle records received from `neighbor`.
///
/// The payload is copied into an aligned buffer, so `bytes` may come from
/// any allocation.
pub fn decode_particles(
    bytes: &[u8],
    expected: usize,
    neighbor: usize,
) -> Result<Vec<Particle>, ExchangeError> {
    expect_exact_len(bytes.len(), particle_bytes(expected))
        .map_err(|detail| ExchangeError::CommError { neighbor, detail })?;
    let mut out = vec![Particle::zeroed(); expected];
    cast_slice_mut(&mut out).copy_from_slice(bytes);
    Ok(out)
}
