//! Signal dispositions used by the harness.
//!
//! `SIGALRM` drives the [`Timeout`](crate::timeout::Timeout) guard and is
//! installed without `SA_RESTART`, so a blocked socket call returns `EINTR`
//! once the alarm fires. `SIGPIPE` is ignored for the whole run; scenarios
//! that need to observe it install their own handler through
//! [`SignalHandler`], which puts the previous disposition back on drop.

use std::io;
use std::mem;
use std::ptr;

use libc::c_int;

use crate::error::Error;
use crate::timeout;

fn sigaction(signo: c_int, handler: libc::sighandler_t) -> io::Result<libc::sigaction> {
    // SAFETY: both structs are plain C data, zero is a valid bit pattern, and
    // the handler is either SIG_IGN/SIG_DFL or an `extern "C" fn(c_int)` that
    // only touches atomics.
    unsafe {
        let mut act: libc::sigaction = mem::zeroed();
        act.sa_sigaction = handler;
        act.sa_flags = 0;
        libc::sigemptyset(&mut act.sa_mask);

        let mut old: libc::sigaction = mem::zeroed();
        if libc::sigaction(signo, &act, &mut old) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(old)
    }
}

/// Install the process-wide dispositions. Call once, before any scenario.
pub fn init_signals() -> Result<(), Error> {
    let on_alarm: extern "C" fn(c_int) = timeout::on_alarm;
    sigaction(libc::SIGALRM, on_alarm as libc::sighandler_t)
        .map_err(|e| Error::io("sigaction(SIGALRM)", e))?;
    sigaction(libc::SIGPIPE, libc::SIG_IGN).map_err(|e| Error::io("sigaction(SIGPIPE)", e))?;
    Ok(())
}

/// A handler installed for the lifetime of the guard.
pub struct SignalHandler {
    signo: c_int,
    previous: libc::sigaction,
}

impl SignalHandler {
    pub fn install(signo: c_int, handler: extern "C" fn(c_int)) -> Result<Self, Error> {
        let previous = sigaction(signo, handler as libc::sighandler_t)
            .map_err(|e| Error::io("sigaction", e))?;
        Ok(Self { signo, previous })
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        // SAFETY: `previous` was filled in by the kernel for this signal.
        let rc = unsafe { libc::sigaction(self.signo, &self.previous, ptr::null_mut()) };
        if rc != 0 {
            tracing::warn!(
                signo = self.signo,
                error = %io::Error::last_os_error(),
                "failed to restore signal disposition"
            );
        }
    }
}
