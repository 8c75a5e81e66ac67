#![forbid(unsafe_code)]

//! The convergence loop.
//!
//! `digest_once` makes one pre-order pass over the subtree, evaluating every
//! watcher and firing listeners for those whose value changed. `digest`
//! repeats passes (draining the `eval_async` queue before each) until a pass
//! comes back clean with nothing queued, or the TTL runs out.
//!
//! # Short-circuit
//!
//! The tree remembers the last watcher found dirty. When a later pass reaches
//! that same watcher and finds it clean, every watcher has been evaluated
//! once since the last change, so the pass stops there. `digest` clears the
//! marker on entry; registering or removing a watcher clears it too.

use scopewatch_value::{Value, are_equal, deep_clone};

use super::watch::Equality;
use super::{Phase, Scope};
use crate::error::ScopeError;
use crate::sink::FaultOrigin;

/// Counters from the most recent `digest` on a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigestStats {
    /// `digest_once` passes run.
    pub passes: u32,
    /// Watch functions invoked across all passes.
    pub evaluations: u64,
}

impl Scope {
    /// Run watchers on this scope and its descendants until they settle.
    ///
    /// Before the loop, a pending `apply_async` flush is cancelled and run
    /// inline. Each iteration drains the `eval_async` queue and then makes one
    /// pass. Post-digest callbacks run once the loop has settled and the
    /// phase is cleared.
    ///
    /// # Errors
    ///
    /// - [`ScopeError::PhaseInProgress`] if a digest or apply is already
    ///   running on this tree.
    /// - [`ScopeError::TooManyIterations`] if watchers are still dirty after
    ///   the configured TTL. The phase is cleared and post-digest callbacks
    ///   stay queued for the next successful digest.
    pub fn digest(&self) -> Result<(), ScopeError> {
        let shared = &self.inner.shared;
        let _span = tracing::debug_span!("scope.digest", scope = self.inner.id.get()).entered();

        let phase = shared.begin_phase(Phase::Digest)?;
        shared.last_dirty.set(None);

        if let Some(timer) = shared.apply_async_timer.take() {
            shared.timers.clear_timeout(timer);
            self.flush_apply_async();
        }

        let ttl = shared.config.ttl();
        let mut remaining = ttl;
        let mut stats = DigestStats::default();
        loop {
            self.drain_async_queue();
            stats.passes += 1;
            let dirty = self.digest_once_counted(&mut stats.evaluations);
            let queued = !shared.async_queue.borrow().is_empty();
            if !dirty && !queued {
                break;
            }
            if remaining == 0 {
                drop(phase);
                shared.last_stats.set(stats);
                tracing::warn!(ttl, passes = stats.passes, "digest did not converge");
                return Err(ScopeError::TooManyIterations { ttl });
            }
            remaining -= 1;
        }

        drop(phase);
        shared.last_stats.set(stats);
        // The queue is empty here, so a pending eval_async timer has nothing
        // left to do.
        if let Some(timer) = shared.eval_async_timer.take() {
            shared.timers.clear_timeout(timer);
        }
        tracing::debug!(
            passes = stats.passes,
            evaluations = stats.evaluations,
            "digest settled"
        );
        self.drain_post_digest_queue();
        Ok(())
    }

    /// One pass over this scope's subtree. Returns whether any watcher was
    /// dirty.
    ///
    /// Does not take the phase, drain queues or reset the short-circuit
    /// marker; [`digest`](Self::digest) does all of that around it.
    pub fn digest_once(&self) -> bool {
        let mut evaluations = 0;
        self.digest_once_counted(&mut evaluations)
    }

    /// Counters recorded by the last `digest` anywhere on this tree.
    #[must_use]
    pub fn digest_stats(&self) -> DigestStats {
        self.inner.shared.last_stats.get()
    }

    fn digest_once_counted(&self, evaluations: &mut u64) -> bool {
        let mut dirty = false;
        self.every_scope(&mut |scope| scope.digest_watchers(&mut dirty, evaluations));
        dirty
    }

    /// Process this scope's own watchers. Returns `false` to stop the walk.
    fn digest_watchers(&self, dirty: &mut bool, evaluations: &mut u64) -> bool {
        let shared = &self.inner.shared;
        let mut index = self.inner.watchers.borrow().len();
        while index > 0 {
            index -= 1;
            let watcher = self.inner.watchers.borrow().get(index).cloned();
            let Some(watcher) = watcher else { continue };

            *evaluations += 1;
            let Some(new_value) = self.guard(FaultOrigin::WatchFn, || (watcher.watch_fn)(self))
            else {
                continue;
            };

            let value_eq = watcher.equality == Equality::Value;
            let last = watcher.last.borrow().clone();
            let changed = last
                .as_ref()
                .is_none_or(|old| !are_equal(&new_value, old, value_eq));

            if changed {
                shared.last_dirty.set(Some(watcher.id));
                let stored = if value_eq {
                    deep_clone(&new_value)
                } else {
                    new_value.clone()
                };
                *watcher.last.borrow_mut() = Some(stored);
                let old_value: Value = last.unwrap_or_else(|| new_value.clone());
                self.guard(FaultOrigin::Listener, || {
                    (watcher.listener)(&new_value, &old_value, self);
                });
                *dirty = true;
            } else if shared.last_dirty.get() == Some(watcher.id) {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
