#![no_main]

//! Interpret fuzz input as a program of scope operations and check that the
//! engine never leaves a phase set, never loses track of the tree, and that
//! every digest either settles or reports the TTL.

use std::cell::Cell;
use std::rc::Rc;

use libfuzzer_sys::fuzz_target;
use scopewatch_runtime::{
    CollectingSink, Equality, FaultOrigin, MacrotaskQueue, Scope, ScopeError, Value, WatchHandle,
};

const MAX_STEPS: usize = 256;
const MAX_SCOPES: usize = 16;
const PROPS: [&str; 4] = ["a", "b", "c", "d"];

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    run_scope_program(data);
});

fn run_scope_program(data: &[u8]) {
    let timers = MacrotaskQueue::new();
    let sink = CollectingSink::new();
    let ttl = 1 + u32::from(byte(data, 0) % 12);
    let root = Scope::builder()
        .ttl(ttl)
        .timers(timers.clone())
        .error_sink(sink.clone())
        .build();

    let mut scopes = vec![root.clone()];
    let mut handles: Vec<WatchHandle> = Vec::new();
    let fired = Rc::new(Cell::new(0u64));

    for (step, chunk) in data[1..].chunks(3).take(MAX_STEPS).enumerate() {
        let op = byte(chunk, 0);
        let arg = byte(chunk, 1);
        let val = byte(chunk, 2);
        let scope = scopes[usize::from(arg) % scopes.len()].clone();
        let prop = PROPS[usize::from(val) % PROPS.len()];

        match op % 12 {
            0 => scope.set(prop, i32::from(val % 4)),
            1 => {
                let f = Rc::clone(&fired);
                let equality = if val % 2 == 0 {
                    Equality::Reference
                } else {
                    Equality::Value
                };
                handles.push(scope.watch_with(
                    move |s| s.get(prop),
                    move |_, _, _| f.set(f.get() + 1),
                    equality,
                ));
            }
            2 => {
                // A listener that copies one property into another; chains of
                // these may or may not converge within the TTL.
                let target = PROPS[usize::from(arg) % PROPS.len()];
                handles.push(scope.watch(
                    move |s| s.get(prop),
                    move |new, _, s| s.set(target, new.clone()),
                ));
            }
            3 => {
                if !handles.is_empty() {
                    let handle = handles.swap_remove(usize::from(val) % handles.len());
                    handle.destroy();
                }
            }
            4 => check_digest(&scope, ttl),
            5 => {
                if let Err(err) = scope.apply(|s| s.set(prop, i32::from(arg % 4))) {
                    assert_eq!(err, ScopeError::TooManyIterations { ttl });
                }
            }
            6 => scope.eval_async(move |s| s.set(prop, Value::array([i32::from(val)]))),
            7 => scope.apply_async(move |s| s.set(prop, Value::Null)),
            8 => {
                let f = Rc::clone(&fired);
                scope.post_digest(move || f.set(f.get() + 1));
            }
            9 => {
                if scopes.len() < MAX_SCOPES {
                    let child = if val % 2 == 0 {
                        scope.new_child()
                    } else {
                        scope.new_isolated()
                    };
                    scopes.push(child);
                }
            }
            10 => {
                timers.run_pending();
            }
            _ => {
                let f = Rc::clone(&fired);
                handles.push(scope.watch_collection(
                    move |s| s.get(prop),
                    move |_, _, _| f.set(f.get() + 1),
                ));
            }
        }

        assert!(root.phase().is_none(), "phase leaked at step {step}");
    }

    let _ = timers.run_pending();
    check_digest(&root, ttl);
    assert!(root.phase().is_none());
    // No callback in this program panics; the only faults are timer-driven
    // digests that hit the TTL.
    for fault in sink.faults() {
        assert_eq!(fault.origin, FaultOrigin::ScheduledDigest, "{fault}");
    }
}

fn check_digest(scope: &Scope, ttl: u32) {
    match scope.digest() {
        Ok(()) => assert!(scope.digest_stats().passes <= ttl + 1),
        Err(err) => {
            assert_eq!(err, ScopeError::TooManyIterations { ttl });
            assert_eq!(scope.digest_stats().passes, ttl + 1);
        }
    }
}

fn byte(data: &[u8], index: usize) -> u8 {
    data.get(index).copied().unwrap_or(0)
}
