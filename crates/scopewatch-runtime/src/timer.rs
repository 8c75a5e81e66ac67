#![forbid(unsafe_code)]

//! Zero-delay timers: the macrotask boundary of the scheduler.
//!
//! `eval_async` and `apply_async` need "run this soon, after the current
//! call stack unwinds". The engine asks a [`TimerHost`] for that and never
//! blocks or spawns. Embedders with an event loop implement the trait on top
//! of it; everyone else uses [`MacrotaskQueue`] and pumps it.
//!
//! # Invariants
//!
//! 1. Tasks run in scheduling order.
//! 2. A cleared task never runs.
//! 3. `run_pending` only runs tasks that were queued before it was called;
//!    tasks scheduled while it runs wait for the next pump.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// A one-shot task scheduled on a [`TimerHost`].
pub type TimerTask = Box<dyn FnOnce()>;

/// Handle for cancelling a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Host-provided zero-delay timer facility.
pub trait TimerHost {
    /// Schedule `task` to run on a later turn of the host loop.
    fn set_timeout(&self, task: TimerTask) -> TimerId;
    /// Cancel a task. Unknown or already-run ids are ignored.
    fn clear_timeout(&self, id: TimerId);
}

#[derive(Default)]
struct QueueState {
    next_id: u64,
    tasks: VecDeque<(TimerId, TimerTask)>,
}

/// A manually pumped FIFO of zero-delay tasks. Clones share the same queue.
#[derive(Clone, Default)]
pub struct MacrotaskQueue {
    state: Rc<RefCell<QueueState>>,
}

impl MacrotaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.borrow().tasks.len()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Run every task queued before this call. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let Some(boundary) = self.state.borrow().tasks.back().map(|(id, _)| *id) else {
            return 0;
        };
        let mut ran = 0;
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let due = state
                    .tasks
                    .front()
                    .is_some_and(|(id, _)| id.0 <= boundary.0);
                if due { state.tasks.pop_front() } else { None }
            };
            let Some((id, task)) = next else { break };
            tracing::trace!(timer = id.0, "running macrotask");
            task();
            ran += 1;
        }
        ran
    }

    /// Pump until no tasks remain. Does not return if tasks keep
    /// rescheduling themselves.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while !self.is_idle() {
            ran += self.run_pending();
        }
        ran
    }
}

impl TimerHost for MacrotaskQueue {
    fn set_timeout(&self, task: TimerTask) -> TimerId {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = TimerId(state.next_id);
        state.tasks.push_back((id, task));
        tracing::trace!(timer = id.0, "scheduled macrotask");
        id
    }

    fn clear_timeout(&self, id: TimerId) {
        let mut state = self.state.borrow_mut();
        if let Some(pos) = state.tasks.iter().position(|(queued, _)| *queued == id) {
            state.tasks.remove(pos);
            tracing::trace!(timer = id.0, "cancelled macrotask");
        }
    }
}

impl fmt::Debug for MacrotaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacrotaskQueue")
            .field("pending", &self.pending())
            .finish()
    }
}
