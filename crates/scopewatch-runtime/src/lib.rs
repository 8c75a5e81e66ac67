#![forbid(unsafe_code)]

//! Dirty-checking change detection for scopewatch.
//!
//! Application code registers *watchers* on a [`Scope`]: a watch function that
//! computes a [`Value`] and a listener that runs when that value changes. A
//! *digest* evaluates every watcher in the tree, repeatedly, until a full pass
//! finds nothing dirty. Listeners may mutate state that other watchers read;
//! the loop keeps going until the tree settles or the TTL runs out.
//!
//! - [`Scope`]: an observation context with properties, watchers and
//!   children. Child scopes read through to their creator; isolated ones do
//!   not.
//! - [`Scope::digest`]: the convergence loop, bounded by
//!   [`ScopeConfig::ttl`].
//! - [`Scope::apply`], [`Scope::eval_async`], [`Scope::apply_async`],
//!   [`Scope::post_digest`]: ways to run code inside or around a digest.
//! - [`ErrorSink`]: where panics raised by user callbacks are sent. The
//!   digest logs and continues.
//! - [`TimerHost`]: the zero-delay scheduler behind `eval_async` and
//!   `apply_async`. [`MacrotaskQueue`] is a manually pumped implementation;
//!   a default root owns one, reachable through [`Scope::timers`].
//!
//! # Architecture
//!
//! Everything is single-threaded. Scopes are `Rc` handles; the tree-wide
//! state (phase, queues, last-dirty marker) lives behind one shared `Rc`.
//! Watch values are compared with the oracle from [`scopewatch_value`].
//!
//! # Failure Modes
//!
//! | Condition | Result |
//! |-----------|--------|
//! | `digest`/`apply` while a phase is running | [`ScopeError::PhaseInProgress`] |
//! | Tree does not settle within TTL | [`ScopeError::TooManyIterations`] |
//! | Watch fn, listener or queued task panics | reported to the [`ErrorSink`], digest continues |
//! | Expression passed to `apply` panics | digest still runs, then the panic resumes |

pub mod config;
pub mod error;
pub mod scope;
pub mod sink;
pub mod timer;

pub use config::ScopeConfig;
pub use error::ScopeError;
pub use scope::{DigestStats, Equality, Phase, Scope, ScopeBuilder, ScopeId, WatchFn, WatchHandle};
pub use sink::{CallbackFault, CollectingSink, ErrorSink, FaultOrigin, TracingSink};
pub use timer::{MacrotaskQueue, TimerHost, TimerId, TimerTask};

pub use scopewatch_value::{self, Value};
