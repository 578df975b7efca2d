//! Scenario descriptors and run options.

use crate::error::Error;
use crate::harness::Harness;

/// Port used on the transport under test when none is given.
pub const DEFAULT_PEER_PORT: u32 = 1234;

/// Which half of each scenario this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    Client,
    Server,
}

/// Options shared by every scenario; read-only for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOpts {
    pub mode: Mode,
    /// CID of the other side.
    pub peer_cid: u32,
    /// Port the server listens on. Some scenarios also use `peer_port + 1`.
    pub peer_port: u32,
}

/// Outcome of one role's procedure. `Err` is fatal for the process.
pub type TestResult = Result<(), Error>;

/// One role's procedure.
pub type Procedure = fn(&mut Harness<'_>) -> TestResult;

/// A named scenario. Its identity is its index in the catalog.
#[derive(Clone, Copy)]
pub struct TestCase {
    pub name: &'static str,
    pub run_client: Procedure,
    /// Absent for single-sided scenarios that probe behaviour with no live
    /// peer.
    pub run_server: Option<Procedure>,
}

impl TestCase {
    /// The procedure this process runs for `mode`, if any.
    pub fn procedure(&self, mode: Mode) -> Option<Procedure> {
        match mode {
            Mode::Client => Some(self.run_client),
            Mode::Server => self.run_server,
        }
    }
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("has_server", &self.run_server.is_some())
            .finish_non_exhaustive()
    }
}
