#![forbid(unsafe_code)]

//! Errors surfaced to callers of `digest` and `apply`.
//!
//! User-code faults (panics inside watch functions, listeners and queued
//! tasks) never appear here; they are caught and routed to the tree's
//! [`ErrorSink`](crate::sink::ErrorSink). What remains are the two ways the
//! engine itself refuses to continue.

use crate::scope::Phase;

/// Errors from the digest engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// A digest or apply was requested while another one is running on the
    /// same tree. This is a programming error, e.g. calling `apply` from a
    /// listener.
    #[error("{active} already in progress (requested {requested})")]
    PhaseInProgress { active: Phase, requested: Phase },
    /// Watchers kept dirtying each other past the iteration ceiling. The phase
    /// is cleared before this is returned, so the tree stays usable.
    #[error("{ttl} digest iterations reached")]
    TooManyIterations { ttl: u32 },
}

impl ScopeError {
    /// Whether this is the runaway-convergence failure.
    #[must_use]
    pub fn is_runaway(&self) -> bool {
        matches!(self, Self::TooManyIterations { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = ScopeError::TooManyIterations { ttl: 10 };
        assert_eq!(err.to_string(), "10 digest iterations reached");
        assert!(err.is_runaway());

        let err = ScopeError::PhaseInProgress {
            active: Phase::Digest,
            requested: Phase::Apply,
        };
        assert_eq!(err.to_string(), "$digest already in progress (requested $apply)");
        assert!(!err.is_runaway());
    }
}
