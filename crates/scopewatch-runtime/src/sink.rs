#![forbid(unsafe_code)]

//! Where caught user-code faults go.
//!
//! Every callback the engine invokes (watch functions, listeners, deferred
//! and coalesced tasks, post-digest callbacks) runs behind a panic guard. A
//! panic is turned into a [`CallbackFault`] and handed to the tree's
//! [`ErrorSink`]; the loop that made the call carries on with the next item.
//!
//! # Sinks
//!
//! - [`TracingSink`] (default): logs each fault at `error` level.
//! - [`CollectingSink`]: keeps faults in memory for the host to inspect.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Which kind of callback faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOrigin {
    WatchFn,
    Listener,
    /// A task queued with `eval_async`.
    AsyncTask,
    /// A task queued with `apply_async`.
    ApplyAsyncTask,
    PostDigest,
    /// A digest or apply started from a timer failed.
    ScheduledDigest,
}

impl fmt::Display for FaultOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::WatchFn => "watch function",
            Self::Listener => "listener",
            Self::AsyncTask => "eval_async task",
            Self::ApplyAsyncTask => "apply_async task",
            Self::PostDigest => "post-digest callback",
            Self::ScheduledDigest => "scheduled digest",
        };
        f.write_str(label)
    }
}

/// A caught fault from user code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackFault {
    pub origin: FaultOrigin,
    pub message: String,
}

impl CallbackFault {
    #[must_use]
    pub fn new(origin: FaultOrigin, message: impl Into<String>) -> Self {
        Self {
            origin,
            message: message.into(),
        }
    }

    /// Build a fault from a `catch_unwind` payload.
    #[must_use]
    pub fn from_panic(origin: FaultOrigin, payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(origin, message)
    }
}

impl fmt::Display for CallbackFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} panicked: {}", self.origin, self.message)
    }
}

/// Receives faults caught inside the digest engine.
pub trait ErrorSink {
    fn report(&self, fault: &CallbackFault);
}

/// Logs faults through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, fault: &CallbackFault) {
        tracing::error!(origin = %fault.origin, message = %fault.message, "scope callback fault");
    }
}

/// Records faults in memory. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    faults: Rc<RefCell<Vec<CallbackFault>>>,
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    #[must_use]
    pub fn faults(&self) -> Vec<CallbackFault> {
        self.faults.borrow().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.faults.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.faults.borrow().is_empty()
    }

    /// Drop recorded faults.
    pub fn clear(&self) {
        self.faults.borrow_mut().clear();
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, fault: &CallbackFault) {
        self.faults.borrow_mut().push(fault.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;

    #[test]
    fn from_panic_reads_str_and_string_payloads() {
        let payload = panic::catch_unwind::<_, ()>(|| panic!("static message")).unwrap_err();
        let fault = CallbackFault::from_panic(FaultOrigin::Listener, &*payload);
        assert_eq!(fault.message, "static message");

        let code = 7;
        let payload = panic::catch_unwind::<_, ()>(|| panic!("code {code}")).unwrap_err();
        let fault = CallbackFault::from_panic(FaultOrigin::WatchFn, &*payload);
        assert_eq!(fault.message, "code 7");
        assert_eq!(fault.to_string(), "watch function panicked: code 7");
    }

    #[test]
    fn collecting_sink_clones_share_storage() {
        let sink = CollectingSink::new();
        let clone = sink.clone();
        clone.report(&CallbackFault::new(FaultOrigin::PostDigest, "boom"));
        assert_eq!(sink.len(), 1);
        sink.clear();
        assert!(clone.is_empty());
    }
}
