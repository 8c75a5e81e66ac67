#![forbid(unsafe_code)]

//! Child scope creation and tree traversal.
//!
//! A plain child reads through to the scope that created it and shares that
//! scope's tree state. An isolated child starts with no inherited properties
//! but still shares its parent's queues, phase and root, so scheduling
//! behaves the same on both sides of the isolation boundary. Either way the
//! child gets its own watcher list and is appended to its parent's children,
//! which is what the digest walks.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::{Scope, ScopeId, ScopeInner};

impl Scope {
    /// Create a child that inherits this scope's properties.
    #[must_use]
    pub fn new_child(&self) -> Scope {
        self.new_scope(false, None)
    }

    /// Create an isolated child: no property inheritance, same tree state.
    #[must_use]
    pub fn new_isolated(&self) -> Scope {
        self.new_scope(true, None)
    }

    /// General form of child creation.
    ///
    /// `parent` decides whose child list the new scope joins (and so which
    /// digest reaches it); it defaults to `self`. A non-isolated scope always
    /// inherits properties and tree state from `self`. An isolated scope takes
    /// its tree state from `parent`.
    #[must_use]
    pub fn new_scope(&self, isolated: bool, parent: Option<&Scope>) -> Scope {
        let parent = parent.unwrap_or(self);
        let (shared, proto) = if isolated {
            (Rc::clone(&parent.inner.shared), None)
        } else {
            (
                Rc::clone(&self.inner.shared),
                Some(Rc::downgrade(&self.inner)),
            )
        };
        let child = Scope::from_inner(ScopeInner {
            id: ScopeId::next(),
            isolated,
            props: RefCell::default(),
            proto,
            parent: Some(Rc::downgrade(&parent.inner)),
            watchers: RefCell::default(),
            children: RefCell::default(),
            shared,
        });
        parent.inner.children.borrow_mut().push(child.clone());
        tracing::trace!(
            scope = child.id().get(),
            parent = parent.id().get(),
            isolated,
            "created child scope"
        );
        child
    }

    /// The scope whose child list holds this one. `None` for roots, or when
    /// the parent has been dropped.
    #[must_use]
    pub fn parent(&self) -> Option<Scope> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Scope { inner })
    }

    /// The root of this scope's tree. Falls back to `self` if the root has
    /// been dropped.
    #[must_use]
    pub fn root(&self) -> Scope {
        self.inner.shared.root().unwrap_or_else(|| self.clone())
    }

    /// Direct children, in creation order.
    #[must_use]
    pub fn children(&self) -> Vec<Scope> {
        self.inner.children.borrow().clone()
    }

    /// Watchers on this scope and every descendant.
    #[must_use]
    pub fn total_watcher_count(&self) -> usize {
        let mut total = 0;
        self.every_scope(&mut |scope| {
            total += scope.watcher_count();
            true
        });
        total
    }

    /// Pre-order walk. `f` returning `false` stops the walk, including for
    /// siblings and cousins not yet visited; the `false` propagates out.
    pub(super) fn every_scope(&self, f: &mut dyn FnMut(&Scope) -> bool) -> bool {
        if !f(self) {
            return false;
        }
        let children = self.children();
        children.iter().all(|child| child.every_scope(&mut *f))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
