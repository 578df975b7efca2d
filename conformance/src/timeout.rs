//! Bounded waits for blocking calls.
//!
//! A [`Timeout`] arms `alarm(2)`. When it fires, the `SIGALRM` handler raises a
//! flag and the blocked syscall returns `EINTR`; the retry loop then calls
//! [`Timeout::check`], which turns the flag into [`Error::Timeout`].
//!
//! The alarm is per process, so guards must not be nested.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use libc::c_int;

use crate::error::Error;

/// Default budget, in seconds, for a single blocking step.
pub const TIMEOUT: u32 = 10;

static TIMED_OUT: AtomicBool = AtomicBool::new(false);

pub(crate) extern "C" fn on_alarm(_signo: c_int) {
    TIMED_OUT.store(true, Ordering::SeqCst);
}

/// Armed alarm; disarmed on drop.
#[must_use = "the alarm is cancelled as soon as the guard is dropped"]
pub struct Timeout {
    // The alarm belongs to the thread that armed it.
    _not_send: PhantomData<*const ()>,
}

impl Timeout {
    pub fn begin(seconds: u32) -> Self {
        TIMED_OUT.store(false, Ordering::SeqCst);
        // SAFETY: alarm has no memory-safety preconditions.
        unsafe { libc::alarm(seconds) };
        Self {
            _not_send: PhantomData,
        }
    }

    /// Fail with [`Error::Timeout`] if the alarm has fired.
    pub fn check(&self, op: &'static str) -> Result<(), Error> {
        if TIMED_OUT.load(Ordering::SeqCst) {
            return Err(Error::Timeout(op));
        }
        Ok(())
    }

    /// Sleep without restarting on `EINTR`, so the caller gets to `check`.
    pub fn sleep(&self, duration: Duration) {
        let micros = duration.as_micros().min(u128::from(u32::MAX)) as libc::useconds_t;
        // SAFETY: usleep has no memory-safety preconditions.
        unsafe { libc::usleep(micros) };
    }
}

impl Drop for Timeout {
    fn drop(&mut self) {
        // SAFETY: as above.
        unsafe { libc::alarm(0) };
        TIMED_OUT.store(false, Ordering::SeqCst);
    }
}

/// Serializes tests that arm the process-wide alarm.
#[cfg(test)]
pub(crate) fn serial() -> parking_lot::MutexGuard<'static, ()> {
    static LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());
    static INIT: std::sync::Once = std::sync::Once::new();

    INIT.call_once(|| crate::signal::init_signals().expect("install signal handlers"));
    LOCK.lock()
}
