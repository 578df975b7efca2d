//! vsock-conformance: client/server driver for the AF_VSOCK conformance
//! suite.
//!
//! # Usage
//!
//! ```bash
//! vsock-conformance --mode server --control-port 1234 --peer-cid 3
//! vsock-conformance --mode client --control-host 10.0.0.1 --control-port 1234 --peer-cid 2
//! vsock-conformance --list --format json
//! ```
//!
//! # Exit Codes
//!
//! - 0: every selected scenario passed (or `--list`/`--help`)
//! - 1: a scenario failed, or the command line was invalid

use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use vsock_conformance::control::ControlChannel;
use vsock_conformance::probe::Transports;
use vsock_conformance::runner::{ListFormat, Plan, list_tests, run_tests};
use vsock_conformance::signal::init_signals;
use vsock_conformance::testcase::DEFAULT_PEER_PORT;
use vsock_conformance::tests::TEST_CASES;
use vsock_conformance::transport::VMADDR_CID_ANY;
use vsock_conformance::{Error, Mode, TestOpts};

#[derive(Parser, Debug)]
#[command(name = "vsock-conformance")]
#[command(about = "Run transport tests over AF_VSOCK between a client and a server")]
#[command(after_help = "Run the server first, then the client; both sides \
    must select the same scenarios. A plain TCP connection to the control \
    host/port orders their steps.")]
struct Args {
    /// Server IP address to connect to (client mode) or bind to (server mode).
    #[arg(long)]
    control_host: Option<String>,

    /// Server port for the control channel.
    #[arg(long)]
    control_port: Option<u16>,

    /// Which side of the tests to run.
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// CID of the other side.
    #[arg(long)]
    peer_cid: Option<u32>,

    /// AF_VSOCK port used by the scenarios; some also use the next one.
    #[arg(long, default_value_t = DEFAULT_PEER_PORT)]
    peer_port: u32,

    /// List the available scenarios and exit.
    #[arg(long)]
    list: bool,

    /// Output format of --list.
    #[arg(long, value_enum, default_value_t = ListFormat::Text)]
    format: ListFormat,

    /// Run only this scenario index (repeatable).
    #[arg(long = "pick", value_name = "TEST_ID")]
    pick: Vec<usize>,

    /// Skip this scenario index (repeatable); applied after --pick.
    #[arg(long = "skip", value_name = "TEST_ID")]
    skip: Vec<usize>,
}

impl Args {
    fn test_opts(&self) -> Result<TestOpts, Error> {
        let mode = self
            .mode
            .ok_or_else(|| Error::Usage("missing --mode argument".to_string()))?;
        let peer_cid = self
            .peer_cid
            .ok_or_else(|| Error::Usage("missing --peer-cid argument".to_string()))?;
        if peer_cid == VMADDR_CID_ANY {
            return Err(Error::Usage(format!(
                "--peer-cid {} is the wildcard CID, not a peer",
                peer_cid
            )));
        }
        Ok(TestOpts {
            mode,
            peer_cid,
            peer_port: self.peer_port,
        })
    }

    /// Host and port of the control channel for `mode`.
    fn control_endpoint(&self, mode: Mode) -> Result<(String, u16), Error> {
        let port = self
            .control_port
            .ok_or_else(|| Error::Usage("missing --control-port argument".to_string()))?;
        let host = match (&self.control_host, mode) {
            (Some(host), _) => host.clone(),
            (None, Mode::Server) => "0.0.0.0".to_string(),
            (None, Mode::Client) => {
                return Err(Error::Usage(
                    "--control-host is required in client mode".to_string(),
                ));
            }
        };
        Ok((host, port))
    }
}

fn main() -> ExitCode {
    // Output goes to stderr without timestamps; the orchestrator adds them.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // The progress line is still open on stdout.
            let _ = writeln!(io::stdout());
            tracing::error!("{}", e);
            if let Error::Usage(_) = e {
                eprintln!("Try 'vsock-conformance --help' for more information.");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Error> {
    if args.list {
        return list_tests(TEST_CASES, args.format, &mut io::stdout().lock());
    }

    let opts = args.test_opts()?;
    let (host, port) = args.control_endpoint(opts.mode)?;
    let plan = Plan::new(TEST_CASES.len(), &args.pick, &args.skip)?;

    init_signals()?;

    match Transports::detect() {
        Ok(transports) => tracing::info!(transports = ?transports.names(), "vsock transports"),
        Err(e) => tracing::debug!(error = %e, "cannot probe vsock transports"),
    }
    tracing::info!(
        mode = ?opts.mode,
        peer_cid = opts.peer_cid,
        peer_port = opts.peer_port,
        selected = plan.len(),
        total = TEST_CASES.len(),
        "starting"
    );

    let mut control = ControlChannel::open(opts.mode, &host, port)?;
    run_tests(TEST_CASES, &plan, &opts, &mut control, &mut io::stdout().lock())
}
