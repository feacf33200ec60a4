use std::{
    mem::take,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};

/// The single root cancellation primitive used throughout the engine (spec §5).
///
/// Every cancellable wait — spawn, child-exit, probe I/O, backoff timers, the
/// shutdown grace period — blocks on a clone of the same `Context<bool>`.
/// `cancel_all` wakes every waiter at once; there is no per-waiter teardown
/// to coordinate.
#[derive(Debug, Clone, Default)]
pub struct Context<T>(Arc<(Mutex<T>, Condvar)>);

impl<T> Context<T>
where
    T: Default,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cancellation signal. All threads waiting on this `Context`
    /// are notified so they unblock and finish execution.
    pub fn cancel_all(&self, val: T) -> Result<(), PoisonError<MutexGuard<'_, T>>> {
        let (lck, cvar) = &*self.0;
        let mut lck = lck.lock()?;
        *lck = val;
        cvar.notify_all();
        Ok(())
    }

    /// Blocks until the condvar is notified, returning the value that
    /// triggered the notification and resetting the stored value to its
    /// default.
    pub fn wait_condvar(&self) -> Result<T, PoisonError<MutexGuard<'_, T>>> {
        let (lck, cvar) = &*self.0;
        let mut lck = lck.lock()?;
        lck = cvar.wait(lck)?;
        let current = take(&mut *lck);
        Ok(current)
    }

    pub fn get_lock_cvar(&self) -> &(Mutex<T>, Condvar) {
        &self.0
    }

    /// Resets the mutex contents to `T::default()`, without cancelling.
    pub fn reset(&self) -> Result<(), PoisonError<MutexGuard<'_, T>>> {
        let (lck, _) = &*self.0;
        let mut lck = lck.lock()?;
        *lck = <T as Default>::default();
        Ok(())
    }
}

impl Context<bool> {
    /// True once `cancel_all` has been called and not since `reset`.
    pub fn is_cancelled(&self) -> bool {
        let (lck, _) = &*self.0;
        *lck.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for `dur` unless cancelled first, returning `true` if the
    /// cancellation fired before the timeout elapsed. Every cancellable
    /// timer in the engine (startup delay, restart backoff, shutdown grace)
    /// is built on this rather than a plain `thread::sleep` (spec §5: "no
    /// blocking primitive in the core is allowed to be non-cancellable").
    pub fn sleep_or_cancelled(&self, dur: std::time::Duration) -> bool {
        let (lck, cvar) = &*self.0;
        let guard = lck.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, timeout_result) = cvar
            .wait_timeout_while(guard, dur, |cancelled| !*cancelled)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let cancelled = *guard;
        drop(guard);
        cancelled || !timeout_result.timed_out()
    }
}
