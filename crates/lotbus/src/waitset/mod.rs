// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WaitSet - blocking dispatch over a set of conditions
//!
//! One thread can service any number of readers and guards: [`WaitSet::dispatch`]
//! blocks until at least one attached condition is ACTIVE, then runs the
//! handler of every ACTIVE condition once, in attach order.
//!
//! Conditions signal the waitset's notifier after each state change, so a
//! blocked dispatch wakes without polling. The entry table lock is never
//! held while handlers run: handlers may publish, take, attach or detach.
//!
//! # Example
//!
//! ```ignore
//! let waitset = WaitSet::new();
//! waitset.attach_with_handler(reader.read_condition(), move |_| {
//!     for notice in reader.take() { /* ... */ }
//!     Ok(())
//! })?;
//! loop {
//!     match waitset.dispatch(Duration::from_secs(4)) {
//!         Ok(_) | Err(Error::Timeout) => {}
//!         Err(e) => return Err(e),
//!     }
//! }
//! ```

pub(crate) mod driver;

use crate::condition::Condition;
use crate::error::{Error, Result};
use driver::Notifier;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Handler invoked by [`WaitSet::dispatch`] for an ACTIVE condition.
pub type Handler = Box<dyn FnMut(&Condition) -> Result<()> + Send>;

struct Entry {
    condition: Condition,
    handler: Option<Arc<Mutex<Handler>>>,
}

/// Result of one successful [`WaitSet::dispatch`].
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Conditions found ACTIVE, in attach order.
    pub active: Vec<Condition>,
    /// Number of handlers invoked.
    pub invoked: usize,
    /// Errors returned by handlers; they never abort the dispatch.
    pub failures: Vec<Error>,
}

impl DispatchOutcome {
    /// `true` if every invoked handler succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Blocking multiplexer over conditions.
pub struct WaitSet {
    notifier: Arc<Notifier>,
    entries: Mutex<Vec<Entry>>,
    interrupted: AtomicBool,
}

impl WaitSet {
    /// Create an empty waitset.
    #[must_use]
    pub fn new() -> Self {
        Self {
            notifier: Notifier::new(),
            entries: Mutex::new(Vec::new()),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Attach a condition without a handler (for use with [`WaitSet::wait`]).
    pub fn attach(&self, condition: impl Into<Condition>) -> Result<()> {
        self.insert(condition.into(), None)
    }

    /// Attach a condition and the handler `dispatch` runs when it is ACTIVE.
    ///
    /// # Errors
    ///
    /// [`Error::ConditionInUse`] if the condition is attached here or to
    /// another waitset.
    pub fn attach_with_handler<F>(&self, condition: impl Into<Condition>, handler: F) -> Result<()>
    where
        F: FnMut(&Condition) -> Result<()> + Send + 'static,
    {
        let handler: Handler = Box::new(handler);
        self.insert(condition.into(), Some(Arc::new(Mutex::new(handler))))
    }

    fn insert(&self, condition: Condition, handler: Option<Arc<Mutex<Handler>>>) -> Result<()> {
        let mut entries = self.entries.lock();
        if !condition.claim(&self.notifier) {
            return Err(Error::ConditionInUse(condition.id()));
        }
        log::debug!("[waitset] attach {:?}", condition);
        entries.push(Entry { condition, handler });
        Ok(())
    }

    /// Detach a condition; effective no later than the next dispatch.
    pub fn detach(&self, condition: &Condition) -> Result<()> {
        let mut entries = self.entries.lock();
        let pos = entries
            .iter()
            .position(|e| e.condition.id() == condition.id())
            .ok_or(Error::ConditionNotAttached(condition.id()))?;
        let entry = entries.remove(pos);
        entry.condition.release(&self.notifier);
        log::debug!("[waitset] detach {:?}", entry.condition);
        Ok(())
    }

    /// Attached conditions, in attach order.
    pub fn conditions(&self) -> Vec<Condition> {
        self.entries
            .lock()
            .iter()
            .map(|e| e.condition.clone())
            .collect()
    }

    /// Wake a blocked `wait`/`dispatch` without activating a condition.
    ///
    /// The woken call returns with no active condition.
    pub fn notify(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.notifier.signal();
    }

    /// Block until a condition is ACTIVE, then run every ACTIVE handler once.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] when nothing became ACTIVE within `timeout`; a zero
    /// timeout returns it immediately.
    pub fn dispatch(&self, timeout: Duration) -> Result<DispatchOutcome> {
        let ready = self.block(timeout)?;

        let mut outcome = DispatchOutcome {
            active: Vec::with_capacity(ready.len()),
            ..DispatchOutcome::default()
        };
        for (condition, handler) in ready {
            if let Some(handler) = handler {
                let mut handler = handler.lock();
                outcome.invoked += 1;
                if let Err(e) = (*handler)(&condition) {
                    log::warn!("[waitset] handler for {:?} failed: {}", condition, e);
                    outcome.failures.push(e);
                }
            }
            outcome.active.push(condition);
        }
        Ok(outcome)
    }

    /// Block until a condition is ACTIVE and return the ACTIVE conditions.
    pub fn wait(&self, timeout: Duration) -> Result<Vec<Condition>> {
        Ok(self.block(timeout)?.into_iter().map(|(c, _)| c).collect())
    }

    #[allow(clippy::type_complexity)]
    fn block(&self, timeout: Duration) -> Result<Vec<(Condition, Option<Arc<Mutex<Handler>>>)>> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            self.notifier.clear();

            let ready: Vec<_> = self
                .entries
                .lock()
                .iter()
                .filter(|e| e.condition.trigger_value())
                .map(|e| (e.condition.clone(), e.handler.clone()))
                .collect();
            if !ready.is_empty() {
                return Ok(ready);
            }
            if self.interrupted.swap(false, Ordering::AcqRel) {
                return Ok(Vec::new());
            }
            if deadline.is_some_and(|at| Instant::now() >= at) {
                return Err(Error::Timeout);
            }

            self.notifier.wait_until(deadline);
        }
    }
}

impl Default for WaitSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WaitSet {
    fn drop(&mut self) {
        for entry in self.entries.get_mut().drain(..) {
            entry.condition.release(&self.notifier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::GuardCondition;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_zero_timeout_without_active_condition() {
        let waitset = WaitSet::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        waitset
            .attach_with_handler(GuardCondition::new(), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        let start = Instant::now();
        assert!(matches!(waitset.dispatch(Duration::ZERO), Err(Error::Timeout)));
        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handlers_run_in_attach_order() {
        let waitset = WaitSet::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let guards: Vec<GuardCondition> = (0..3).map(|_| GuardCondition::new()).collect();
        for (i, guard) in guards.iter().enumerate() {
            let order = Arc::clone(&order);
            waitset
                .attach_with_handler(guard.clone(), move |_| {
                    order.lock().push(i);
                    Ok(())
                })
                .unwrap();
        }
        guards[2].set_trigger_value(true);
        guards[0].set_trigger_value(true);

        let outcome = waitset.dispatch(Duration::from_secs(1)).unwrap();
        assert_eq!(outcome.invoked, 2);
        assert_eq!(*order.lock(), vec![0, 2]);
    }

    #[test]
    fn test_handler_errors_are_collected() {
        let waitset = WaitSet::new();
        let guard = GuardCondition::new();
        guard.set_trigger_value(true);
        waitset
            .attach_with_handler(guard.clone(), |_| {
                Err(Error::InvalidArgument("boom".to_string()))
            })
            .unwrap();
        let outcome = waitset.dispatch(Duration::from_secs(1)).unwrap();
        assert_eq!(outcome.invoked, 1);
        assert!(!outcome.is_clean());
        // Conditions are not reset by dispatch.
        assert!(waitset.dispatch(Duration::ZERO).is_ok());
    }

    #[test]
    fn test_guard_wakes_blocked_dispatch() {
        let waitset = Arc::new(WaitSet::new());
        let guard = GuardCondition::new();
        waitset.attach(guard.clone()).unwrap();

        let remote = guard.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.set_trigger_value(true);
        });
        let active = waitset.wait(Duration::from_secs(5)).unwrap();
        assert_eq!(active, vec![Condition::from(guard)]);
        handle.join().unwrap();
    }

    #[test]
    fn test_notify_returns_without_active_conditions() {
        let waitset = Arc::new(WaitSet::new());
        waitset.attach(GuardCondition::new()).unwrap();
        let remote = Arc::clone(&waitset);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.notify();
        });
        let outcome = waitset.dispatch(Duration::from_secs(5)).unwrap();
        assert!(outcome.active.is_empty());
        handle.join().unwrap();
    }

    #[test]
    fn test_attach_rules() {
        let first = WaitSet::new();
        let second = WaitSet::new();
        let guard = GuardCondition::new();
        first.attach(guard.clone()).unwrap();
        assert!(matches!(first.attach(guard.clone()), Err(Error::ConditionInUse(_))));
        assert!(matches!(second.attach(guard.clone()), Err(Error::ConditionInUse(_))));

        let cond = Condition::from(guard.clone());
        first.detach(&cond).unwrap();
        assert!(matches!(first.detach(&cond), Err(Error::ConditionNotAttached(_))));
        second.attach(guard.clone()).unwrap();

        drop(second);
        first.attach(guard).unwrap();
        assert_eq!(first.conditions().len(), 1);
    }

    #[test]
    fn test_detach_from_handler() {
        let waitset = Arc::new(WaitSet::new());
        let guard = GuardCondition::new();
        guard.set_trigger_value(true);
        let ws = Arc::clone(&waitset);
        waitset
            .attach_with_handler(guard, move |cond| ws.detach(cond))
            .unwrap();

        let outcome = waitset.dispatch(Duration::from_secs(1)).unwrap();
        assert!(outcome.is_clean());
        assert!(waitset.conditions().is_empty());
        assert!(matches!(waitset.dispatch(Duration::ZERO), Err(Error::Timeout)));
    }
}
