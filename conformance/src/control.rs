//! Control channel between the client and server processes.
//!
//! A plain TCP connection carrying newline-terminated ASCII tokens. It only
//! orders the two sides' steps; it never carries data of the transport under
//! test. Any failure here is fatal: it means the harness itself is broken.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

use crate::error::Error;
use crate::testcase::Mode;
use crate::timeout::TIMEOUT;

/// Interval between connection attempts while the server is not up yet.
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

pub struct ControlChannel {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl ControlChannel {
    /// Open the channel for the given role: servers listen and accept one
    /// peer, clients connect.
    pub fn open(mode: Mode, host: &str, port: u16) -> Result<Self, Error> {
        match mode {
            Mode::Server => Self::listen(host, port),
            Mode::Client => Self::connect(host, port),
        }
    }

    /// Bind `host:port` and wait for exactly one client.
    pub fn listen(host: &str, port: u16) -> Result<Self, Error> {
        let listener =
            TcpListener::bind((host, port)).map_err(|e| Error::io("control bind", e))?;

        tracing::info!(host, port, "control socket listening");

        let (stream, peer) = listener
            .accept()
            .map_err(|e| Error::io("control accept", e))?;

        tracing::info!(%peer, "control socket connected");

        // The listener is dropped here; only one peer is ever served.
        Self::from_stream(stream)
    }

    /// Connect to the server's control socket, retrying while it refuses
    /// connections so that the two roles can start in either order.
    pub fn connect(host: &str, port: u16) -> Result<Self, Error> {
        let deadline = Instant::now() + Duration::from_secs(u64::from(TIMEOUT));

        loop {
            match TcpStream::connect((host, port)) {
                Ok(stream) => {
                    tracing::info!(host, port, "control socket connected");
                    return Self::from_stream(stream);
                }
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    if Instant::now() >= deadline {
                        return Err(Error::Timeout("control connect"));
                    }
                    std::thread::sleep(CONNECT_RETRY_INTERVAL);
                }
                Err(e) => return Err(Error::io("control connect", e)),
            }
        }
    }

    pub(crate) fn from_stream(stream: TcpStream) -> Result<Self, Error> {
        let timeout = Some(Duration::from_secs(u64::from(TIMEOUT)));
        stream
            .set_read_timeout(timeout)
            .and_then(|()| stream.set_write_timeout(timeout))
            .and_then(|()| stream.set_nodelay(true))
            .map_err(|e| Error::io("control setsockopt", e))?;

        let writer = stream
            .try_clone()
            .map_err(|e| Error::io("control dup", e))?;

        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Send one token. The token must not contain a newline.
    pub fn writeln(&mut self, line: &str) -> Result<(), Error> {
        debug_assert!(!line.contains('\n'));
        tracing::debug!(line, "control >");

        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        self.writer
            .write_all(&buf)
            .map_err(|e| map_io("control write", e))
    }

    /// Read one token, without the trailing newline.
    pub fn readln(&mut self) -> Result<String, Error> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .map_err(|e| map_io("control read", e))?;

        if n == 0 {
            return Err(Error::Control(
                "peer closed the control channel".to_string(),
            ));
        }
        if !line.ends_with('\n') {
            return Err(Error::Control(format!(
                "peer closed the control channel mid-line after {:?}",
                line
            )));
        }

        line.pop();
        tracing::debug!(line, "control <");
        Ok(line)
    }

    /// Read one token and require it to be exactly `expected`.
    pub fn expectln(&mut self, expected: &str) -> Result<(), Error> {
        let line = self.readln()?;
        if line != expected {
            return Err(Error::Control(format!(
                "expected {:?} on control socket, got {:?}",
                expected, line
            )));
        }
        Ok(())
    }

    pub fn writeulong(&mut self, value: u64) -> Result<(), Error> {
        self.writeln(&value.to_string())
    }

    pub fn readulong(&mut self) -> Result<u64, Error> {
        let line = self.readln()?;
        line.parse()
            .map_err(|_| Error::Control(format!("malformed number {:?} on control socket", line)))
    }
}

fn map_io(op: &'static str, e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Error::Timeout(op),
        _ => Error::io(op, e),
    }
}
