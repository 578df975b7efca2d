//! Test selection, the per-scenario barrier, and reporting.

use std::io::{self, Write};

use facet::Facet;

use crate::control::ControlChannel;
use crate::error::Error;
use crate::harness::Harness;
use crate::testcase::{TestCase, TestOpts};

const NEXT: &str = "NEXT";
const SKIP: &str = "SKIP";

/// Which scenarios this process runs.
///
/// If any index was picked, only picked scenarios run; skipped indices are
/// then removed from whatever remains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    selected: Vec<bool>,
}

impl Plan {
    pub fn all(total: usize) -> Self {
        Self {
            selected: vec![true; total],
        }
    }

    pub fn new(total: usize, picks: &[usize], skips: &[usize]) -> Result<Self, Error> {
        for &index in picks.iter().chain(skips) {
            if index >= total {
                return Err(Error::Usage(format!(
                    "test index {} out of range (there are {} tests, use --list)",
                    index, total
                )));
            }
        }

        let mut selected = vec![picks.is_empty(); total];
        for &index in picks {
            selected[index] = true;
        }
        for &index in skips {
            selected[index] = false;
        }
        Ok(Self { selected })
    }

    pub fn runs(&self, index: usize) -> bool {
        self.selected.get(index).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.selected.iter().filter(|&&s| s).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run every scenario in `cases`, in order, in lock-step with the peer.
///
/// Progress goes to `out` as `"<index> - <name>..."` followed by `ok` or
/// `skipped`. The first failing procedure stops the run.
pub fn run_tests<W: Write>(
    cases: &[TestCase],
    plan: &Plan,
    opts: &TestOpts,
    control: &mut ControlChannel,
    out: &mut W,
) -> Result<(), Error> {
    for (index, case) in cases.iter().enumerate() {
        write!(out, "{} - {}...", index, case.name).map_err(report_err)?;
        out.flush().map_err(report_err)?;

        // Full barrier: whoever is faster waits for the peer to finish the
        // previous scenario, since scenarios reuse the same ports.
        let local_skip = !plan.runs(index);
        control.writeln(if local_skip { SKIP } else { NEXT })?;
        let peer = control.readln()?;
        let peer_skip = match peer.as_str() {
            SKIP => true,
            NEXT => false,
            other => {
                return Err(Error::Control(format!(
                    "expected {:?} or {:?} on control socket, got {:?}",
                    NEXT, SKIP, other
                )));
            }
        };

        if local_skip || peer_skip {
            writeln!(out, "skipped").map_err(report_err)?;
            continue;
        }

        tracing::debug!(index, name = case.name, mode = ?opts.mode, "running");
        if let Some(procedure) = case.procedure(opts.mode) {
            procedure(&mut Harness::new(opts, control))?;
        }

        writeln!(out, "ok").map_err(report_err)?;
    }

    writeln!(out, "All tests have been executed. Waiting other peer...").map_err(report_err)?;
    out.flush().map_err(report_err)?;

    // Closing barrier so neither side tears down the channel while the
    // other is still reading from it.
    control.writeln("DONE")?;
    control.expectln("DONE")?;
    Ok(())
}

fn report_err(e: io::Error) -> Error {
    Error::io("write report", e)
}

/// Output format of `--list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ListFormat {
    #[default]
    Text,
    Json,
}

/// One catalog entry in `--list --format json`.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct ListedCase {
    pub index: usize,
    pub name: String,
    /// `false` for single-sided scenarios.
    pub has_server: bool,
}

pub fn listed(cases: &[TestCase]) -> Vec<ListedCase> {
    cases
        .iter()
        .enumerate()
        .map(|(index, case)| ListedCase {
            index,
            name: case.name.to_string(),
            has_server: case.run_server.is_some(),
        })
        .collect()
}

pub fn list_tests<W: Write>(cases: &[TestCase], format: ListFormat, out: &mut W) -> Result<(), Error> {
    match format {
        ListFormat::Text => {
            writeln!(out, "ID\tTest name").map_err(report_err)?;
            for (index, case) in cases.iter().enumerate() {
                writeln!(out, "{}\t{}", index, case.name).map_err(report_err)?;
            }
        }
        ListFormat::Json => {
            let json = facet_json::to_string(&listed(cases)).map_err(|e| {
                Error::io("serialize test list", io::Error::other(format!("{:?}", e)))
            })?;
            writeln!(out, "{}", json).map_err(report_err)?;
        }
    }
    Ok(())
}
