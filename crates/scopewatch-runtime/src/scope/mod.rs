#![forbid(unsafe_code)]

//! The scope tree and its dirty-checking digest.
//!
//! A [`Scope`] is an observation context: it owns an ordered set of watchers,
//! a bag of named properties, and a list of child scopes. Every scope in a
//! tree points at one [`Shared`] block that holds what the whole tree agrees
//! on: the phase flag, the last-dirty-watcher marker, the three execution
//! queues, the timer host and the error sink.
//!
//! # Architecture
//!
//! `Scope` is a cheap handle over `Rc<ScopeInner>`. Children are owned by
//! their parent (strong links down the tree); parent, prototype and root links
//! are `Weak`, so dropping the root releases the whole tree.
//!
//! Submodules split the engine by concern:
//!
//! - `watch`: registration, removal and watch groups.
//! - `collection`: shallow collection watches.
//! - `digest`: `digest_once` and the convergence loop.
//! - `queue`: `eval`, `apply`, `eval_async`, `apply_async`, `post_digest`.
//! - `tree`: child and isolated scope creation, traversal.
//!
//! # Invariants
//!
//! 1. At most one phase (digest or apply) is active per tree.
//! 2. Watchers are processed in registration order within a scope, scopes in
//!    pre-order.
//! 3. No `RefCell` borrow owned by the engine is held across a call into
//!    user code, so callbacks may freely register, remove, read and write.
//! 4. A non-isolated child reads through to its prototype but never writes to
//!    it.

mod collection;
mod digest;
mod queue;
mod tree;
mod watch;

pub use digest::DigestStats;
pub use watch::{Equality, WatchFn, WatchHandle};

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use scopewatch_value::Value;

use crate::config::ScopeConfig;
use crate::error::ScopeError;
use crate::sink::{CallbackFault, ErrorSink, FaultOrigin, TracingSink};
use crate::timer::{MacrotaskQueue, TimerHost, TimerId};

use self::watch::{Watcher, WatcherId};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a scope, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    fn next() -> Self {
        Self(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Which engine phase is running on a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Digest,
    Apply,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Digest => f.write_str("$digest"),
            Self::Apply => f.write_str("$apply"),
        }
    }
}

/// A task queued by `eval_async`: the scope it targets plus the expression.
pub(crate) struct AsyncTask {
    scope: Scope,
    expr: Box<dyn FnOnce(&Scope)>,
}

/// State shared by reference across a whole tree, isolated scopes included.
pub(crate) struct Shared {
    config: ScopeConfig,
    sink: Rc<dyn ErrorSink>,
    timers: Rc<dyn TimerHost>,
    /// The built-in queue, when the tree was built without a custom host.
    own_timers: Option<MacrotaskQueue>,
    root: OnceCell<Weak<ScopeInner>>,
    phase: Cell<Option<Phase>>,
    last_dirty: Cell<Option<WatcherId>>,
    async_queue: RefCell<VecDeque<AsyncTask>>,
    eval_async_timer: Cell<Option<TimerId>>,
    apply_async_queue: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    apply_async_timer: Cell<Option<TimerId>>,
    post_digest_queue: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    last_stats: Cell<DigestStats>,
}

impl Shared {
    fn begin_phase(&self, requested: Phase) -> Result<PhaseGuard<'_>, ScopeError> {
        if let Some(active) = self.phase.get() {
            tracing::debug!(%active, %requested, "phase already in progress");
            return Err(ScopeError::PhaseInProgress { active, requested });
        }
        self.phase.set(Some(requested));
        Ok(PhaseGuard { shared: self })
    }

    fn report(&self, fault: &CallbackFault) {
        self.sink.report(fault);
    }

    fn root(&self) -> Option<Scope> {
        self.root
            .get()
            .and_then(Weak::upgrade)
            .map(|inner| Scope { inner })
    }
}

/// Clears the phase flag when dropped, including during unwinding.
#[must_use = "dropping this guard ends the phase"]
pub(crate) struct PhaseGuard<'a> {
    shared: &'a Shared,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.shared.phase.set(None);
    }
}

pub(crate) struct ScopeInner {
    id: ScopeId,
    isolated: bool,
    props: RefCell<HashMap<String, Value>>,
    /// Where property reads fall through to. `None` for roots and isolated
    /// scopes.
    proto: Option<Weak<ScopeInner>>,
    parent: Option<Weak<ScopeInner>>,
    /// Stored newest-first; traversal walks from the back so processing order
    /// is registration order.
    watchers: RefCell<VecDeque<Rc<Watcher>>>,
    children: RefCell<Vec<Scope>>,
    shared: Rc<Shared>,
}

/// A node in a scope tree. Cloning yields another handle to the same node.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    /// Create a root scope with default configuration, a [`TracingSink`] and
    /// a private [`MacrotaskQueue`].
    ///
    /// Pump the private queue through [`Scope::timers`], or use
    /// [`Scope::builder`] to supply your own timer host.
    #[must_use]
    pub fn new_root() -> Self {
        Self::builder().build()
    }

    #[must_use]
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::default()
    }

    fn from_inner(inner: ScopeInner) -> Self {
        Self {
            inner: Rc::new(inner),
        }
    }

    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    #[must_use]
    pub fn is_isolated(&self) -> bool {
        self.inner.isolated
    }

    /// The phase currently running on this scope's tree, if any.
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        self.inner.shared.phase.get()
    }

    /// The tree's configuration.
    #[must_use]
    pub fn config(&self) -> ScopeConfig {
        self.inner.shared.config
    }

    /// The built-in timer queue behind `eval_async` and `apply_async`.
    ///
    /// `None` when the tree was built with a custom [`TimerHost`]; the host
    /// owns pumping then.
    #[must_use]
    pub fn timers(&self) -> Option<MacrotaskQueue> {
        self.inner.shared.own_timers.clone()
    }

    /// Whether two handles point at the same scope.
    #[must_use]
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // -- properties ---------------------------------------------------------

    /// Read a property, falling through to the prototype chain.
    ///
    /// Returns [`Value::Undefined`] when no scope on the chain has it.
    #[must_use]
    pub fn get(&self, name: &str) -> Value {
        let mut current = Some(Rc::clone(&self.inner));
        while let Some(scope) = current {
            if let Some(value) = scope.props.borrow().get(name) {
                return value.clone();
            }
            current = scope.proto.as_ref().and_then(Weak::upgrade);
        }
        Value::Undefined
    }

    /// Write a property on this scope. Never touches the prototype chain; a
    /// child writing an inherited name shadows it.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .props
            .borrow_mut()
            .insert(name.into(), value.into());
    }

    /// Read-modify-write: `f` sees the (possibly inherited) current value and
    /// the result is written on this scope.
    pub fn update(&self, name: &str, f: impl FnOnce(Value) -> Value) {
        let next = f(self.get(name));
        self.set(name, next);
    }

    /// Whether this scope itself (not its prototype) has the property.
    #[must_use]
    pub fn has_own(&self, name: &str) -> bool {
        self.inner.props.borrow().contains_key(name)
    }

    /// Remove an own property, un-shadowing any inherited one.
    pub fn remove_own(&self, name: &str) -> Option<Value> {
        self.inner.props.borrow_mut().remove(name)
    }

    // -- fault handling -----------------------------------------------------

    /// Run user code, routing a panic to the error sink.
    fn guard<R>(&self, origin: FaultOrigin, f: impl FnOnce() -> R) -> Option<R> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Some(value),
            Err(payload) => {
                let fault = CallbackFault::from_panic(origin, &*payload);
                self.inner.shared.report(&fault);
                None
            }
        }
    }

    fn report_scheduled_failure(&self, err: &ScopeError) {
        let fault = CallbackFault::new(FaultOrigin::ScheduledDigest, err.to_string());
        self.inner.shared.report(&fault);
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id.0)
            .field("isolated", &self.inner.isolated)
            .field("watchers", &self.inner.watchers.borrow().len())
            .field("children", &self.inner.children.borrow().len())
            .finish()
    }
}

/// Builds a root [`Scope`].
#[derive(Default)]
pub struct ScopeBuilder {
    config: ScopeConfig,
    sink: Option<Rc<dyn ErrorSink>>,
    timers: Option<Rc<dyn TimerHost>>,
}

impl ScopeBuilder {
    #[must_use]
    pub fn config(mut self, config: ScopeConfig) -> Self {
        self.config = config;
        self
    }

    /// Shorthand for `config(ScopeConfig::new().with_ttl(ttl))`.
    #[must_use]
    pub fn ttl(mut self, ttl: u32) -> Self {
        self.config = self.config.with_ttl(ttl);
        self
    }

    #[must_use]
    pub fn error_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.sink = Some(Rc::new(sink));
        self
    }

    #[must_use]
    pub fn timers(mut self, timers: impl TimerHost + 'static) -> Self {
        self.timers = Some(Rc::new(timers));
        self
    }

    #[must_use]
    pub fn build(self) -> Scope {
        let (timers, own_timers): (Rc<dyn TimerHost>, _) = match self.timers {
            Some(timers) => (timers, None),
            None => {
                let queue = MacrotaskQueue::new();
                (Rc::new(queue.clone()), Some(queue))
            }
        };
        let shared = Rc::new(Shared {
            config: self.config,
            sink: self.sink.unwrap_or_else(|| Rc::new(TracingSink)),
            timers,
            own_timers,
            root: OnceCell::new(),
            phase: Cell::new(None),
            last_dirty: Cell::new(None),
            async_queue: RefCell::default(),
            eval_async_timer: Cell::new(None),
            apply_async_queue: RefCell::default(),
            apply_async_timer: Cell::new(None),
            post_digest_queue: RefCell::default(),
            last_stats: Cell::default(),
        });
        let root = Scope::from_inner(ScopeInner {
            id: ScopeId::next(),
            isolated: false,
            props: RefCell::default(),
            proto: None,
            parent: None,
            watchers: RefCell::default(),
            children: RefCell::default(),
            shared: Rc::clone(&shared),
        });
        let _ = shared.root.set(Rc::downgrade(&root.inner));
        tracing::debug!(scope = root.id().get(), ttl = shared.config.ttl(), "created root scope");
        root
    }
}

impl fmt::Debug for ScopeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeBuilder")
            .field("config", &self.config)
            .field("custom_sink", &self.sink.is_some())
            .field("custom_timers", &self.timers.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
