// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wakeup plumbing between conditions and waitsets.
//!
//! Each waitset owns one [`Notifier`]: a coalescing "pending" flag guarded by
//! a mutex plus a condvar. Conditions keep weak [`WaitsetHook`]s to the
//! notifiers of the waitsets they are attached to and signal them after every
//! state change that may raise their trigger value.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

static NEXT_NOTIFIER_ID: AtomicU64 = AtomicU64::new(1);

/// Coalescing wakeup event.
pub(crate) struct Notifier {
    id: u64,
    pending: Mutex<bool>,
    ready: Condvar,
}

impl Notifier {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_NOTIFIER_ID.fetch_add(1, Ordering::Relaxed),
            pending: Mutex::new(false),
            ready: Condvar::new(),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Mark pending and wake every blocked waiter.
    pub(crate) fn signal(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.ready.notify_all();
    }

    /// Forget earlier signals. Must be called before re-evaluating conditions.
    pub(crate) fn clear(&self) {
        *self.pending.lock() = false;
    }

    /// Block until signalled or `deadline` passes (`None` waits forever).
    ///
    /// Returns `true` if a signal was observed.
    pub(crate) fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let mut pending = self.pending.lock();
        while !*pending {
            match deadline {
                Some(at) => {
                    if self.ready.wait_until(&mut pending, at).timed_out() {
                        return *pending;
                    }
                }
                None => self.ready.wait(&mut pending),
            }
        }
        true
    }
}

/// Weak link from a condition to the notifier of the waitset holding it.
struct WaitsetHook {
    condition_id: u64,
    notifier_id: u64,
    signal: Weak<Notifier>,
}

/// Set of waitset hooks owned by a condition source (a reader or a guard).
#[derive(Default)]
pub(crate) struct SignalHooks {
    hooks: Mutex<Vec<WaitsetHook>>,
}

impl SignalHooks {
    pub(crate) fn add(&self, condition_id: u64, notifier: &Arc<Notifier>) {
        let mut hooks = self.hooks.lock();
        hooks.retain(|hook| hook.signal.strong_count() > 0);
        hooks.push(WaitsetHook {
            condition_id,
            notifier_id: notifier.id(),
            signal: Arc::downgrade(notifier),
        });
    }

    pub(crate) fn remove(&self, condition_id: u64, notifier_id: u64) {
        self.hooks
            .lock()
            .retain(|hook| !(hook.condition_id == condition_id && hook.notifier_id == notifier_id));
    }

    /// Signal every live notifier, dropping dead hooks.
    pub(crate) fn notify(&self) {
        // Upgrade under the lock, signal outside it.
        let targets: Vec<Arc<Notifier>> = {
            let mut hooks = self.hooks.lock();
            hooks.retain(|hook| hook.signal.strong_count() > 0);
            hooks.iter().filter_map(|hook| hook.signal.upgrade()).collect()
        };
        for notifier in targets {
            notifier.signal();
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.hooks.lock().len()
    }
}
