//! AF_VSOCK transport conformance suite.
//!
//! Two copies of the `vsock-conformance` binary, one per side of a vsock
//! connection, walk the same ordered catalog of scenarios in lock-step. A
//! plain TCP control channel orders their steps; the scenarios themselves
//! only touch the transport under test.
//!
//! # Usage
//!
//! ```bash
//! # on the host (CID 2)
//! vsock-conformance --mode server --control-port 1234 --peer-cid 3
//! # in the guest (CID 3)
//! vsock-conformance --mode client --control-host 10.0.0.1 --control-port 1234 --peer-cid 2
//! ```
//!
//! Both sides print one line per scenario: `"<index> - <name>...ok"` or
//! `"...skipped"`. The first failure ends the process with exit status 1.
//!
//! # Layout
//!
//! - [`control`]: the line-based TCP control channel.
//! - [`transport`]: the socket driver and its expectation-checked helpers.
//! - [`harness`]: what each scenario procedure gets to work with.
//! - [`tests`]: the scenario catalog.
//! - [`runner`]: selection, the per-scenario barrier and reporting.

#![forbid(unsafe_op_in_unsafe_fn)]

pub mod control;
pub mod error;
pub mod harness;
pub mod hash;
pub mod mapping;
pub mod probe;
pub mod runner;
pub mod signal;
pub mod testcase;
pub mod tests;
pub mod timeout;
pub mod transport;

pub use error::Error;
pub use testcase::{Mode, TestCase, TestOpts};
