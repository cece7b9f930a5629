//! Mutex adapters that sequence callbacks around lock release.
//!
//! Subsystems holding the lock can schedule notifications to run just before
//! release (still inside the critical section) or just after it (outside,
//! free to re-acquire). This keeps slow receivers out of the critical
//! section without losing the committed-then-notify ordering.

use std::sync::{Mutex, MutexGuard};

type Callback<'a> = Box<dyn FnOnce() + 'a>;

/// Mutex whose guard can schedule before/after-unlock callbacks.
#[derive(Debug, Default)]
pub struct AutoCallMutex<T> {
    inner: Mutex<T>,
}

impl<T> AutoCallMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn lock(&self) -> AutoCallGuard<'_, T> {
        AutoCallGuard {
            guard: Some(self.inner.lock().unwrap()),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    pub fn try_lock(&self) -> Option<AutoCallGuard<'_, T>> {
        self.inner.try_lock().ok().map(|guard| AutoCallGuard {
            guard: Some(guard),
            before: Vec::new(),
            after: Vec::new(),
        })
    }
}

/// Critical-section handle. On release (drop or [`AutoCallGuard::unlock`])
/// the scheduled `before` callbacks run in insertion order while the lock is
/// still held, the lock is released, then the `after` callbacks run in
/// insertion order. Both queues are empty afterwards.
pub struct AutoCallGuard<'a, T> {
    guard: Option<MutexGuard<'a, T>>,
    before: Vec<Callback<'a>>,
    after: Vec<Callback<'a>>,
}

impl<'a, T> AutoCallGuard<'a, T> {
    /// Schedules `f` to run at unlock time, before release. `f` observes the
    /// same critical section as the scheduler.
    pub fn call_before_unlock(&mut self, f: impl FnOnce() + 'a) {
        debug_assert!(self.guard.is_some(), "scheduling on an unlocked guard");
        self.before.push(Box::new(f));
    }

    /// Schedules `f` to run after release. `f` may re-acquire the lock
    /// without deadlock.
    pub fn call_after_unlock(&mut self, f: impl FnOnce() + 'a) {
        debug_assert!(self.guard.is_some(), "scheduling on an unlocked guard");
        self.after.push(Box::new(f));
    }

    /// Releases early, draining both queues. A second call is a no-op.
    pub fn unlock(&mut self) {
        if self.guard.is_none() {
            return;
        }
        for f in self.before.drain(..) {
            f();
        }
        let after: Vec<Callback<'a>> = self.after.drain(..).collect();
        self.guard = None;
        for f in after {
            f();
        }
    }
}

impl<T> Drop for AutoCallGuard<'_, T> {
    fn drop(&mut self) {
        self.unlock();
    }
}

impl<T> std::ops::Deref for AutoCallGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.guard.as_ref().expect("guard used after unlock")
    }
}

impl<T> std::ops::DerefMut for AutoCallGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.as_mut().expect("guard used after unlock")
    }
}

/// Scoped acquisition with guaranteed release and idempotent early unlock.
pub struct AutoLock<'a, T> {
    mutex: &'a Mutex<T>,
    guard: Option<MutexGuard<'a, T>>,
}

impl<'a, T> AutoLock<'a, T> {
    /// Acquires `mutex` for the scope of the returned value.
    pub fn new(mutex: &'a Mutex<T>) -> Self {
        Self {
            mutex,
            guard: Some(mutex.lock().unwrap()),
        }
    }

    /// Releases early; a second call is a no-op.
    pub fn unlock(&mut self) {
        self.guard = None;
    }

    /// Re-acquires after an early unlock.
    pub fn lock(&mut self) {
        if self.guard.is_none() {
            self.guard = Some(self.mutex.lock().unwrap());
        }
    }

    pub fn is_locked(&self) -> bool {
        self.guard.is_some()
    }
}

impl<T> std::ops::Deref for AutoLock<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.guard.as_ref().expect("auto lock used after unlock")
    }
}

impl<T> std::ops::DerefMut for AutoLock<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.as_mut().expect("auto lock used after unlock")
    }
}
