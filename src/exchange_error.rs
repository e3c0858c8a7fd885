//! ExchangeError: Unified error type for patch-exchange public APIs
//!
//! Every fallible operation in the crate returns this type. Protocol
//! violations and communication failures are fatal to the current step; the
//! caller is expected to abort the run with the rendered message, which names
//! the species/axis/side/bin where things went wrong.

use crate::topology::side::Side;
use std::fmt;
use thiserror::Error;

/// Where in the exchange an error was raised. Unknown fields are omitted
/// when rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub species: Option<usize>,
    pub axis: Option<usize>,
    pub side: Option<Side>,
    pub bin: Option<usize>,
}

impl ErrorContext {
    pub fn species(species: usize) -> Self {
        Self {
            species: Some(species),
            ..Self::default()
        }
    }

    pub fn axis_side(axis: usize, side: Side) -> Self {
        Self {
            axis: Some(axis),
            side: Some(side),
            ..Self::default()
        }
    }

    pub fn bin(bin: usize) -> Self {
        Self {
            bin: Some(bin),
            ..Self::default()
        }
    }

    pub fn with_species(mut self, species: usize) -> Self {
        self.species = Some(species);
        self
    }

    pub fn with_axis_side(mut self, axis: usize, side: Side) -> Self {
        self.axis = Some(axis);
        self.side = Some(side);
        self
    }

    pub fn with_bin(mut self, bin: usize) -> Self {
        self.bin = Some(bin);
        self
    }

    /// Fill fields still unknown here from `outer`.
    pub fn merge(self, outer: ErrorContext) -> Self {
        Self {
            species: self.species.or(outer.species),
            axis: self.axis.or(outer.axis),
            side: self.side.or(outer.side),
            bin: self.bin.or(outer.bin),
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(4);
        if let Some(s) = self.species {
            parts.push(format!("species {s}"));
        }
        if let Some(a) = self.axis {
            parts.push(format!("axis {a}"));
        }
        if let Some(side) = self.side {
            parts.push(format!("side {side}"));
        }
        if let Some(b) = self.bin {
            parts.push(format!("bin {b}"));
        }
        if parts.is_empty() {
            f.write_str("no context")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// Unified error type for patch-exchange operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// Addressing beyond the current bounds of a particle store.
    #[error("index {index} out of range for particle store of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    /// A bin or ordering invariant was broken. Programming error.
    #[error("invariant violation ({context}): {detail}")]
    InvariantViolation {
        context: ErrorContext,
        detail: String,
    },
    /// A remote peer never answered a posted receive.
    #[error("transfer timeout ({context}): no reply from patch {peer_patch} on rank {peer_rank}")]
    TransferTimeout {
        context: ErrorContext,
        peer_rank: usize,
        peer_patch: usize,
    },
    /// A message arrived but its payload was malformed.
    #[error("communication error with rank {neighbor}: {detail}")]
    CommError { neighbor: usize, detail: String },
    /// Rejected simulation parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// No patch with this index is held locally.
    #[error("patch {0} is not owned by this rank")]
    UnknownPatch(usize),
    /// Species index beyond the number of species in a patch.
    #[error("unknown species {0}")]
    UnknownSpecies(usize),
    /// The message tag does not fit in the portable MPI tag range.
    #[error("message tag overflow for species {species}, patch {patch}")]
    TagOverflow { species: usize, patch: usize },
}

impl ExchangeError {
    pub(crate) fn invariant(context: ErrorContext, detail: impl Into<String>) -> Self {
        ExchangeError::InvariantViolation {
            context,
            detail: detail.into(),
        }
    }

    /// Attach outer context to errors that carry one.
    pub fn within(self, outer: ErrorContext) -> Self {
        match self {
            ExchangeError::InvariantViolation { context, detail } => {
                ExchangeError::InvariantViolation {
                    context: context.merge(outer),
                    detail,
                }
            }
            ExchangeError::TransferTimeout {
                context,
                peer_rank,
                peer_patch,
            } => ExchangeError::TransferTimeout {
                context: context.merge(outer),
                peer_rank,
                peer_patch,
            },
            other => other,
        }
    }

    /// True for errors that abort the run (everything but config/lookup errors).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExchangeError::IndexOutOfRange { .. }
                | ExchangeError::InvariantViolation { .. }
                | ExchangeError::TransferTimeout { .. }
                | ExchangeError::CommError { .. }
        )
    }
}
