//! What a scenario procedure gets to work with: the run options, the control
//! channel, and connection helpers that pair up the two sides.

use std::io;

use crate::control::ControlChannel;
use crate::error::Error;
use crate::testcase::{Mode, TestOpts};
use crate::transport::{Socket, SocketType, VMADDR_CID_ANY, VsockAddr};

/// Token the server sends once its listener is up.
pub const LISTENING: &str = "LISTENING";

pub struct Harness<'a> {
    opts: &'a TestOpts,
    control: &'a mut ControlChannel,
}

impl<'a> Harness<'a> {
    pub fn new(opts: &'a TestOpts, control: &'a mut ControlChannel) -> Self {
        Self { opts, control }
    }

    pub fn opts(&self) -> &TestOpts {
        self.opts
    }

    pub fn mode(&self) -> Mode {
        self.opts.mode
    }

    pub fn peer_port(&self) -> u32 {
        self.opts.peer_port
    }

    /// The server's address as seen from the client, at `port`.
    pub fn peer_addr(&self, port: u32) -> VsockAddr {
        VsockAddr::new(self.opts.peer_cid, port)
    }

    pub fn control(&mut self) -> &mut ControlChannel {
        self.control
    }

    pub fn writeln(&mut self, line: &str) -> Result<(), Error> {
        self.control.writeln(line)
    }

    pub fn readln(&mut self) -> Result<String, Error> {
        self.control.readln()
    }

    pub fn expectln(&mut self, expected: &str) -> Result<(), Error> {
        self.control.expectln(expected)
    }

    pub fn writeulong(&mut self, value: u64) -> Result<(), Error> {
        self.control.writeulong(value)
    }

    pub fn readulong(&mut self) -> Result<u64, Error> {
        self.control.readulong()
    }

    /// Wait for the server's listener, then connect to it on the default port.
    pub fn connect(&mut self, ty: SocketType) -> Result<Socket, Error> {
        self.connect_port(ty, self.opts.peer_port)
    }

    pub fn connect_port(&mut self, ty: SocketType, port: u32) -> Result<Socket, Error> {
        self.control.expectln(LISTENING)?;
        Socket::connect(ty, self.peer_addr(port))
    }

    /// Connect without waiting for the server, handing the transport's answer
    /// back to the caller.
    pub fn try_connect(&mut self, ty: SocketType) -> Result<io::Result<Socket>, Error> {
        let socket = Socket::new(ty)?;
        let addr = self.peer_addr(self.opts.peer_port);
        Ok(socket.try_connect(addr)?.map(|()| socket))
    }

    /// Listen on the default port and tell the client.
    pub fn listen(&mut self, ty: SocketType) -> Result<Socket, Error> {
        self.listen_port(ty, self.opts.peer_port)
    }

    pub fn listen_port(&mut self, ty: SocketType, port: u32) -> Result<Socket, Error> {
        let listener = Socket::listen(ty, VsockAddr::new(VMADDR_CID_ANY, port))?;
        self.control.writeln(LISTENING)?;
        Ok(listener)
    }

    /// Accept one connection on the default port; the listener is closed
    /// before returning.
    pub fn accept(&mut self, ty: SocketType) -> Result<Socket, Error> {
        self.accept_port(ty, self.opts.peer_port)
    }

    pub fn accept_port(&mut self, ty: SocketType, port: u32) -> Result<Socket, Error> {
        let listener = self.listen_port(ty, port)?;
        listener.accept()
    }
}
