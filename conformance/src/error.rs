//! Error type shared by the harness, the transport driver and the scenarios.
//!
//! Every variant is fatal for the process running the scenario: the runner
//! reports it and exits with a non-zero status.

use std::fmt;
use std::io;

/// Errors raised while running the suite.
#[derive(Debug)]
pub enum Error {
    /// Malformed command line; reported before any scenario runs.
    Usage(String),

    /// The control channel desynchronized (unexpected token, premature close).
    ///
    /// This means the two sides disagree about the scenario being run, not
    /// that the transport under test misbehaved.
    Control(String),

    /// An observed transport result differs from the expected one.
    Assertion(String),

    /// The timeout guard fired while the named operation was blocked.
    Timeout(&'static str),

    /// An OS call failed in a way the scenario did not expect.
    Io {
        op: &'static str,
        source: io::Error,
    },
}

impl Error {
    /// Build an [`Error::Io`] from the calling thread's `errno`.
    pub fn last_os(op: &'static str) -> Self {
        Error::Io {
            op,
            source: io::Error::last_os_error(),
        }
    }

    pub fn io(op: &'static str, source: io::Error) -> Self {
        Error::Io { op, source }
    }

    pub fn assertion(msg: impl Into<String>) -> Self {
        Error::Assertion(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Usage(msg) => write!(f, "usage error: {}", msg),
            Error::Control(msg) => write!(f, "control channel: {}", msg),
            Error::Assertion(msg) => write!(f, "{}", msg),
            Error::Timeout(op) => write!(f, "{} timed out", op),
            Error::Io { op, source } => write!(f, "{}: {}", op, source),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Render an errno value the way `perror` would, e.g. `EPIPE (Broken pipe)`.
pub fn errno_name(errno: i32) -> String {
    let name = match errno {
        libc::EAGAIN => "EAGAIN",
        libc::EFAULT => "EFAULT",
        libc::EPIPE => "EPIPE",
        libc::EINTR => "EINTR",
        libc::EMSGSIZE => "EMSGSIZE",
        libc::ECONNRESET => "ECONNRESET",
        libc::ECONNREFUSED => "ECONNREFUSED",
        libc::ENOMEM => "ENOMEM",
        libc::ENODEV => "ENODEV",
        libc::EADDRNOTAVAIL => "EADDRNOTAVAIL",
        libc::EOPNOTSUPP => "EOPNOTSUPP",
        libc::ETIMEDOUT => "ETIMEDOUT",
        _ => return format!("errno {} ({})", errno, io::Error::from_raw_os_error(errno)),
    };
    format!("{} ({})", name, io::Error::from_raw_os_error(errno))
}
