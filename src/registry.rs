//! Process-wide callback registry.
//!
//! The engine invokes callbacks through fixed trampolines carrying one
//! opaque context word; this table turns that word back into the host
//! closure. [`register`] hands out a process-unique token, [`resolve`] maps
//! it back, [`evict`] retires it. Tokens are never reused, so a lookup
//! after eviction fails instead of dispatching to a stale entry.
//!
//! The table lock is held only for the O(1) map operation, never across a
//! callback invocation: a closure is free to build and run a nested
//! optimizer (which registers and resolves entries of its own) without
//! deadlocking, and one optimizer's slow closure never blocks another
//! optimizer's registrations.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;

pub(crate) type ScalarClosure = Box<dyn FnMut(&[f64], Option<&mut [f64]>) -> f64 + Send>;
pub(crate) type VectorClosure = Box<dyn FnMut(&mut [f64], &[f64], Option<&mut [f64]>) + Send>;

/// The two native-visible callback shapes. The variant is fixed at
/// registration time and checked again at every dispatch.
pub(crate) enum Callback {
    Scalar(ScalarClosure),
    Vector(VectorClosure),
}

/// A registered closure, shared between the registry entry and every
/// optimizer holding an installation of it. The per-entry mutex is what the
/// trampoline locks for the duration of one invocation; the registry lock
/// is released before that.
pub(crate) type SharedCallback = Arc<Mutex<Callback>>;

/// Process-unique registry token, passed through the engine as the opaque
/// callback context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Token(usize);

impl Token {
    pub(crate) fn context(self) -> usize {
        self.0
    }

    pub(crate) fn from_context(ctx: usize) -> Self {
        Self(ctx)
    }
}

struct Table {
    next: usize,
    entries: HashMap<usize, SharedCallback>,
}

static TABLE: LazyLock<Mutex<Table>> = LazyLock::new(|| {
    Mutex::new(Table {
        next: 0,
        entries: HashMap::new(),
    })
});

/// Registers a callback and returns its token. Tokens start at 1, so the
/// zero context word never aliases a registration.
pub(crate) fn register(cb: SharedCallback) -> Token {
    let mut table = TABLE.lock();
    table.next += 1;
    let token = Token(table.next);
    table.entries.insert(token.0, cb);
    trace_debug!(token = token.0, "callback registered");
    token
}

/// Looks up a live registration.
pub(crate) fn resolve(token: Token) -> Option<SharedCallback> {
    TABLE.lock().entries.get(&token.0).cloned()
}

/// Retires a registration. Evicting an absent token is a no-op, which is
/// what keeps optimizer destruction idempotent.
pub(crate) fn evict(token: Token) {
    TABLE.lock().entries.remove(&token.0);
    trace_debug!(token = token.0, "callback evicted");
}

#[cfg(test)]
pub(crate) fn is_live(token: Token) -> bool {
    TABLE.lock().entries.contains_key(&token.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_entry(value: f64) -> SharedCallback {
        Arc::new(Mutex::new(Callback::Scalar(Box::new(
            move |_x: &[f64], _g: Option<&mut [f64]>| value,
        ))))
    }

    #[test]
    fn tokens_are_unique() {
        let tokens: Vec<_> = (0..100).map(|i| register(scalar_entry(f64::from(i)))).collect();
        for (i, a) in tokens.iter().enumerate() {
            for b in &tokens[i + 1..] {
                assert_ne!(a, b);
            }
        }
        for t in tokens {
            evict(t);
        }
    }

    #[test]
    fn tokens_are_unique_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..50)
                        .map(|_| register(scalar_entry(0.0)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all: Vec<Token> = Vec::new();
        for h in handles {
            all.extend(h.join().expect("registration thread panicked"));
        }
        let mut contexts: Vec<usize> = all.iter().map(|t| t.context()).collect();
        contexts.sort_unstable();
        contexts.dedup();
        assert_eq!(contexts.len(), 400);
        for t in all {
            evict(t);
        }
    }

    #[test]
    fn resolve_after_evict_fails() {
        let token = register(scalar_entry(7.0));
        assert!(resolve(token).is_some());
        evict(token);
        assert!(resolve(token).is_none());
        assert!(!is_live(token));
    }

    #[test]
    fn evict_is_idempotent() {
        let token = register(scalar_entry(1.0));
        evict(token);
        evict(token);
        assert!(resolve(token).is_none());
    }

    #[test]
    fn resolved_entry_dispatches_to_the_registered_closure() {
        let token = register(scalar_entry(42.0));
        let entry = resolve(token).expect("entry should be live");
        let got = match &mut *entry.lock() {
            Callback::Scalar(f) => f(&[0.0], None),
            Callback::Vector(_) => unreachable!("registered as scalar"),
        };
        assert!((got - 42.0).abs() < f64::EPSILON);
        evict(token);
    }
}
