//! Per-scene lock.
//!
//! The scene lock is the one mutual-exclusion primitive shared between a
//! client editing a scene and the render worker snapshotting it. Unlike a
//! plain mutex it can be acquired and released in separate boundary calls,
//! so it records the holding thread instead of living in a guard.
//!
//! The lock is not reentrant. A thread that asks for a lock it already holds
//! gets a [`HostError::ScenePrecondition`] instead of deadlocking, and only
//! the holder may unlock.

use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{HostError, HostResult};

#[derive(Debug, Default)]
pub struct SceneLock {
    holder: Mutex<Option<ThreadId>>,
    released: Condvar,
}

impl SceneLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock without blocking.
    ///
    /// Returns `false` on contention, including when the calling thread is
    /// the holder.
    pub fn try_lock(&self) -> bool {
        let mut holder = self.holder.lock();
        if holder.is_some() {
            return false;
        }
        *holder = Some(thread::current().id());
        true
    }

    /// Blocks until the lock is acquired.
    pub fn lock(&self) -> HostResult<()> {
        let me = thread::current().id();
        let mut holder = self.holder.lock();
        if *holder == Some(me) {
            return Err(nested("lock"));
        }
        while holder.is_some() {
            self.released.wait(&mut holder);
        }
        *holder = Some(me);
        Ok(())
    }

    /// Waits at most `timeout` for the lock.
    pub fn try_lock_for(&self, timeout: Duration) -> bool {
        let me = thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut holder = self.holder.lock();
        if *holder == Some(me) {
            return false;
        }
        while holder.is_some() {
            if self.released.wait_until(&mut holder, deadline).timed_out() {
                if holder.is_some() {
                    return false;
                }
                break;
            }
        }
        *holder = Some(me);
        true
    }

    /// Releases a lock held by the calling thread.
    pub fn unlock(&self) -> HostResult<()> {
        let mut holder = self.holder.lock();
        if *holder != Some(thread::current().id()) {
            return Err(HostError::ScenePrecondition {
                operation: "unlock",
                reason: "the scene lock is not held by this thread".to_string(),
            });
        }
        *holder = None;
        drop(holder);
        self.released.notify_one();
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.holder.lock().is_some()
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        *self.holder.lock() == Some(thread::current().id())
    }

    /// Blocks for the lock and releases it when the guard drops.
    pub fn guard(&self) -> HostResult<SceneLockGuard<'_>> {
        self.lock()?;
        Ok(SceneLockGuard { lock: self })
    }

    /// Waits at most `timeout` for the lock, releasing it when the guard
    /// drops.
    pub fn try_guard_for(&self, timeout: Duration) -> Option<SceneLockGuard<'_>> {
        self.try_lock_for(timeout)
            .then(|| SceneLockGuard { lock: self })
    }

    /// Lock for a structural edit.
    ///
    /// If the calling thread already holds the lock (a batched edit between
    /// explicit `lock` and `unlock` calls) nothing is acquired and `None` is
    /// returned; otherwise the lock is taken for the guard's lifetime.
    pub fn scoped(&self) -> HostResult<Option<SceneLockGuard<'_>>> {
        if self.is_held_by_current_thread() {
            return Ok(None);
        }
        self.guard().map(Some)
    }
}

fn nested(operation: &'static str) -> HostError {
    HostError::ScenePrecondition {
        operation,
        reason: "the scene lock is already held by this thread".to_string(),
    }
}

/// Releases the [`SceneLock`] on drop.
#[derive(Debug)]
pub struct SceneLockGuard<'a> {
    lock: &'a SceneLock,
}

impl Drop for SceneLockGuard<'_> {
    fn drop(&mut self) {
        let mut holder = self.lock.holder.lock();
        *holder = None;
        drop(holder);
        self.lock.released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_try_lock_contention() {
        let lock = Arc::new(SceneLock::new());
        assert!(lock.try_lock());
        assert!(!lock.try_lock());

        let other = Arc::clone(&lock);
        let start = Instant::now();
        let acquired = thread::spawn(move || other.try_lock()).join().unwrap();
        assert!(!acquired);
        assert!(start.elapsed() < Duration::from_secs(1));

        lock.unlock().unwrap();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_nested_lock_is_reported() {
        let lock = SceneLock::new();
        lock.lock().unwrap();
        assert!(matches!(
            lock.lock(),
            Err(HostError::ScenePrecondition { .. })
        ));
        lock.unlock().unwrap();
        assert!(lock.unlock().is_err());
    }

    #[test]
    fn test_lock_unlock_repeatedly() {
        let lock = SceneLock::new();
        for _ in 0..100 {
            lock.lock().unwrap();
            lock.unlock().unwrap();
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_lock_waits_for_release() {
        let lock = Arc::new(SceneLock::new());
        lock.lock().unwrap();

        let other = Arc::clone(&lock);
        let waiter = thread::spawn(move || {
            other.lock().unwrap();
            let held = other.is_held_by_current_thread();
            other.unlock().unwrap();
            held
        });
        thread::sleep(Duration::from_millis(20));
        lock.unlock().unwrap();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_scoped_skips_when_held() {
        let lock = SceneLock::new();
        {
            let guard = lock.scoped().unwrap();
            assert!(guard.is_some());
            assert!(lock.is_held_by_current_thread());
        }
        assert!(!lock.is_locked());

        lock.lock().unwrap();
        assert!(lock.scoped().unwrap().is_none());
        assert!(lock.is_held_by_current_thread());
        lock.unlock().unwrap();
    }

    #[test]
    fn test_try_lock_for_times_out() {
        let lock = Arc::new(SceneLock::new());
        lock.lock().unwrap();
        let other = Arc::clone(&lock);
        let acquired = thread::spawn(move || other.try_lock_for(Duration::from_millis(10)))
            .join()
            .unwrap();
        assert!(!acquired);
        lock.unlock().unwrap();
        assert!(lock.try_lock_for(Duration::from_millis(10)));
    }
}
