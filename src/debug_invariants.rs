//! Invariant checking shared by the particle store and the exchange state.
//!
//! Structural checks are cheap (O(bins)) and always available through
//! [`DebugInvariants::validate_invariants`]. The panicking flavour only runs
//! in debug builds or with the `check-invariants` / `strict-invariants`
//! features.

use crate::exchange_error::{ErrorContext, ExchangeError};

/// Trait for validating data structure invariants.
pub trait DebugInvariants {
    /// Assert invariants in debug builds or when invariant checking is enabled.
    fn debug_assert_invariants(&self);
    /// Validate invariants and return the first error encountered.
    fn validate_invariants(&self) -> Result<(), ExchangeError>;

    /// Same as [`validate_invariants`](Self::validate_invariants), tagging a
    /// failure with where the caller was.
    fn validate_within(&self, context: ErrorContext) -> Result<(), ExchangeError> {
        self.validate_invariants().map_err(|e| e.within(context))
    }
}

/// Run a fallible check and panic on error when invariant checking is enabled.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "strict-invariants", feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}
