#![forbid(unsafe_code)]

//! Scheduling primitives.
//!
//! | Entry point    | Runs the expression            | Triggers a digest                   |
//! |----------------|--------------------------------|-------------------------------------|
//! | `eval`         | now                            | no                                  |
//! | `apply`        | now, inside the apply phase    | yes, from the root, always          |
//! | `eval_async`   | at the start of the next pass  | via a zero-delay timer if idle      |
//! | `apply_async`  | on the coalescing timer        | one digest for the whole batch      |
//! | `post_digest`  | after the next digest settles  | no                                  |
//!
//! All three queues live on the tree's shared block, so a task queued from
//! an isolated scope lands in the same queue as one queued from the root.

use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use super::{AsyncTask, Phase, Scope};
use crate::error::ScopeError;
use crate::sink::FaultOrigin;

impl Scope {
    /// Call `expr` with this scope and return its result. No digest.
    pub fn eval<R>(&self, expr: impl FnOnce(&Scope) -> R) -> R {
        expr(self)
    }

    /// Like [`eval`](Self::eval), with extra locals passed alongside the scope.
    pub fn eval_with<L, R>(&self, locals: L, expr: impl FnOnce(&Scope, L) -> R) -> R {
        expr(self, locals)
    }

    /// Evaluate `expr` inside the apply phase, then digest from the root.
    ///
    /// The phase is cleared and the digest runs even when `expr` panics; the
    /// panic is resumed afterwards unless the digest itself failed.
    ///
    /// # Errors
    ///
    /// - [`ScopeError::PhaseInProgress`] if called during a digest or apply.
    ///   `expr` does not run.
    /// - Any error from the root digest.
    pub fn apply<R>(&self, expr: impl FnOnce(&Scope) -> R) -> Result<R, ScopeError> {
        let outcome = {
            let _phase = self.inner.shared.begin_phase(Phase::Apply)?;
            panic::catch_unwind(AssertUnwindSafe(|| self.eval(expr)))
        };
        self.root().digest()?;
        match outcome {
            Ok(value) => Ok(value),
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Queue `expr` to run on this scope early in the current or next digest.
    ///
    /// When nothing is running and the queue was empty, a zero-delay timer is
    /// also scheduled so the work happens even if nobody digests explicitly.
    /// A digest that settles first cancels that timer.
    pub fn eval_async(&self, expr: impl FnOnce(&Scope) + 'static) {
        let shared = &self.inner.shared;
        if shared.phase.get().is_none() && shared.async_queue.borrow().is_empty() {
            let root = Rc::downgrade(&self.root().inner);
            let id = shared.timers.set_timeout(Box::new(move || {
                let Some(inner) = root.upgrade() else { return };
                let root = Scope { inner };
                root.inner.shared.eval_async_timer.set(None);
                if root.inner.shared.async_queue.borrow().is_empty() {
                    return;
                }
                if let Err(err) = root.digest() {
                    root.report_scheduled_failure(&err);
                }
            }));
            if let Some(stale) = shared.eval_async_timer.replace(Some(id)) {
                shared.timers.clear_timeout(stale);
            }
        }
        shared.async_queue.borrow_mut().push_back(AsyncTask {
            scope: self.clone(),
            expr: Box::new(expr),
        });
    }

    /// Queue `expr` for a batched apply. All calls made before the timer
    /// fires share one apply and therefore one digest. An explicit digest in
    /// the meantime cancels the timer and runs the batch itself.
    pub fn apply_async(&self, expr: impl FnOnce(&Scope) + 'static) {
        let shared = &self.inner.shared;
        let scope = self.clone();
        shared
            .apply_async_queue
            .borrow_mut()
            .push_back(Box::new(move || scope.eval(expr)));

        if shared.apply_async_timer.get().is_some() {
            return;
        }
        let root = Rc::downgrade(&self.root().inner);
        let id = shared.timers.set_timeout(Box::new(move || {
            let Some(inner) = root.upgrade() else { return };
            let root = Scope { inner };
            if let Err(err) = root.apply(Scope::flush_apply_async) {
                root.report_scheduled_failure(&err);
            }
        }));
        shared.apply_async_timer.set(Some(id));
    }

    /// Run `f` once after the next digest settles. Changes it makes are not
    /// seen until the digest after that.
    pub fn post_digest(&self, f: impl FnOnce() + 'static) {
        self.inner
            .shared
            .post_digest_queue
            .borrow_mut()
            .push_back(Box::new(f));
    }

    pub(super) fn flush_apply_async(&self) {
        let shared = &self.inner.shared;
        loop {
            let task = shared.apply_async_queue.borrow_mut().pop_front();
            let Some(task) = task else { break };
            self.guard(FaultOrigin::ApplyAsyncTask, task);
        }
        shared.apply_async_timer.set(None);
    }

    pub(super) fn drain_async_queue(&self) {
        let shared = &self.inner.shared;
        loop {
            let task = shared.async_queue.borrow_mut().pop_front();
            let Some(AsyncTask { scope, expr }) = task else { break };
            scope.guard(FaultOrigin::AsyncTask, || expr(&scope));
        }
    }

    pub(super) fn drain_post_digest_queue(&self) {
        let shared = &self.inner.shared;
        loop {
            let callback = shared.post_digest_queue.borrow_mut().pop_front();
            let Some(callback) = callback else { break };
            self.guard(FaultOrigin::PostDigest, callback);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
