//! Driver for the transport under test: AF_VSOCK stream and seqpacket sockets.
//!
//! Two layers live here:
//!
//! - thin wrappers that issue exactly one syscall and return [`io::Result`],
//!   for scenarios that inspect the raw outcome themselves;
//! - checked helpers ([`Socket::send_buf`], [`Socket::recv_buf`], ...) that
//!   retry interrupted calls under a [`Timeout`] and compare the observed
//!   outcome with an [`Expect`]. A mismatch is an [`Error::Assertion`].
//!
//! A [`Socket`] owns its descriptor, so every endpoint is closed when the
//! scenario returns, whether it succeeded or not.

use std::fmt;
use std::io::{self, IoSlice};
use std::mem::{self, MaybeUninit};
use std::net::Shutdown;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;
use std::time::Duration;

use bitflags::bitflags;
use libc::{c_int, c_short, c_void, socklen_t};

use crate::error::{Error, errno_name};
use crate::timeout::{TIMEOUT, Timeout};

/// Wildcard CID for binding.
pub const VMADDR_CID_ANY: u32 = u32::MAX;
pub const VMADDR_CID_HYPERVISOR: u32 = 0;
/// The local loopback transport.
pub const VMADDR_CID_LOCAL: u32 = 1;
pub const VMADDR_CID_HOST: u32 = 2;
/// Wildcard port; binding to it autobinds.
pub const VMADDR_PORT_ANY: u32 = u32::MAX;

// <linux/vm_sockets.h>; option level is AF_VSOCK.
pub const SO_VM_SOCKETS_BUFFER_SIZE: c_int = 0;
pub const SO_VM_SOCKETS_BUFFER_MIN_SIZE: c_int = 1;
pub const SO_VM_SOCKETS_BUFFER_MAX_SIZE: c_int = 2;

const SOL_VSOCK: c_int = 287;
const VSOCK_RECVERR: c_int = 1;

/// `sock_extended_err::ee_origin` of a zerocopy completion.
pub const SO_EE_ORIGIN_ZEROCOPY: u8 = 5;

const LISTEN_BACKLOG: c_int = 1;

/// Socket class of the transport under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketType {
    Stream,
    SeqPacket,
}

impl SocketType {
    fn raw(self) -> c_int {
        match self {
            SocketType::Stream => libc::SOCK_STREAM,
            SocketType::SeqPacket => libc::SOCK_SEQPACKET,
        }
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketType::Stream => write!(f, "SOCK_STREAM"),
            SocketType::SeqPacket => write!(f, "SOCK_SEQPACKET"),
        }
    }
}

bitflags! {
    /// `send`/`recv` flags, and the `msg_flags` reported by `recvmsg`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MsgFlags: c_int {
        const PEEK = libc::MSG_PEEK;
        const DONTWAIT = libc::MSG_DONTWAIT;
        const TRUNC = libc::MSG_TRUNC;
        const EOR = libc::MSG_EOR;
        const NOSIGNAL = libc::MSG_NOSIGNAL;
        const ZEROCOPY = libc::MSG_ZEROCOPY;
        const ERRQUEUE = libc::MSG_ERRQUEUE;
    }
}

/// Expected outcome of a checked transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// The call succeeds and moves exactly this many bytes in total.
    Bytes(usize),
    /// The call fails with this errno.
    Errno(c_int),
}

impl fmt::Display for Expect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expect::Bytes(n) => write!(f, "{} bytes", n),
            Expect::Errno(errno) => write!(f, "{}", errno_name(*errno)),
        }
    }
}

/// Byte counters exposed through ioctls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    /// Bytes sent but not yet acknowledged by the peer (`SIOCOUTQ`).
    Unsent,
    /// Bytes queued for reading (`SIOCINQ`).
    Unread,
}

impl Pending {
    fn name(self) -> &'static str {
        match self {
            Pending::Unsent => "ioctl(SIOCOUTQ)",
            Pending::Unread => "ioctl(SIOCINQ)",
        }
    }
}

/// A vsock address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VsockAddr {
    pub cid: u32,
    pub port: u32,
}

impl VsockAddr {
    pub fn new(cid: u32, port: u32) -> Self {
        Self { cid, port }
    }

    fn to_raw(self) -> libc::sockaddr_vm {
        // SAFETY: sockaddr_vm is plain C data; zero is valid and required for
        // the reserved fields.
        let mut raw: libc::sockaddr_vm = unsafe { mem::zeroed() };
        raw.svm_family = libc::AF_VSOCK as libc::sa_family_t;
        raw.svm_cid = self.cid;
        raw.svm_port = self.port;
        raw
    }

    fn from_raw(raw: &libc::sockaddr_vm) -> Self {
        Self {
            cid: raw.svm_cid,
            port: raw.svm_port,
        }
    }
}

impl fmt::Display for VsockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.cid, self.port)
    }
}

/// A zerocopy completion read from a socket's error queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub errno: u32,
    pub origin: u8,
    pub code: u8,
    /// First and last `sendmsg` sequence numbers covered by the completion.
    pub range: (u32, u32),
}

fn cvt(ret: c_int) -> io::Result<c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn cvt_size(ret: isize) -> io::Result<usize> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

/// A socket on the transport under test.
#[derive(Debug)]
pub struct Socket {
    fd: OwnedFd,
    ty: SocketType,
}

impl Socket {
    pub fn new(ty: SocketType) -> Result<Self, Error> {
        Self::open(ty, 0).map_err(|e| Error::io("socket", e))
    }

    /// A socket whose `connect` returns as soon as the transport is assigned.
    pub fn new_nonblocking(ty: SocketType) -> Result<Self, Error> {
        Self::open(ty, libc::SOCK_NONBLOCK).map_err(|e| Error::io("socket", e))
    }

    fn open(ty: SocketType, extra: c_int) -> io::Result<Self> {
        // SAFETY: plain syscall; the returned descriptor is owned below.
        let fd = cvt(unsafe {
            libc::socket(libc::AF_VSOCK, ty.raw() | libc::SOCK_CLOEXEC | extra, 0)
        })?;
        // SAFETY: `fd` is a fresh descriptor nobody else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd, ty })
    }

    /// Wrap an already-open socket descriptor of the given class.
    pub fn from_fd(fd: OwnedFd, ty: SocketType) -> Self {
        Self { fd, ty }
    }

    /// A connected AF_UNIX pair of the given class, for exercising the driver
    /// without a vsock transport.
    #[cfg(test)]
    pub(crate) fn unix_pair(ty: SocketType) -> io::Result<(Self, Self)> {
        let mut fds = [0 as c_int; 2];
        // SAFETY: `fds` has room for the two descriptors.
        cvt(unsafe {
            libc::socketpair(
                libc::AF_UNIX,
                ty.raw() | libc::SOCK_CLOEXEC,
                0,
                fds.as_mut_ptr(),
            )
        })?;
        // SAFETY: both descriptors are fresh and owned from here on.
        let (a, b) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        Ok((Self::from_fd(a, ty), Self::from_fd(b, ty)))
    }

    pub fn ty(&self) -> SocketType {
        self.ty
    }

    fn raw(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    // ------------------------------------------------------------------
    // Connection management
    // ------------------------------------------------------------------

    /// A single `connect(2)` call.
    pub fn connect_once(&self, addr: VsockAddr) -> io::Result<()> {
        let raw = addr.to_raw();
        // SAFETY: `raw` is a valid sockaddr_vm for the duration of the call.
        cvt(unsafe {
            libc::connect(
                self.raw(),
                (&raw as *const libc::sockaddr_vm).cast(),
                mem::size_of::<libc::sockaddr_vm>() as socklen_t,
            )
        })
        .map(drop)
    }

    /// `connect(2)`, retried on `EINTR` until it completes or the timeout
    /// fires. The inner result is the transport's answer; the outer one
    /// reports a harness timeout.
    pub fn try_connect(&self, addr: VsockAddr) -> Result<io::Result<()>, Error> {
        let timeout = Timeout::begin(TIMEOUT);
        loop {
            let ret = self.connect_once(addr);
            timeout.check("connect")?;
            match ret {
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return Ok(other),
            }
        }
    }

    /// Open a socket and connect it; failure to connect is fatal.
    pub fn connect(ty: SocketType, addr: VsockAddr) -> Result<Self, Error> {
        let socket = Self::new(ty)?;
        socket
            .try_connect(addr)?
            .map_err(|e| Error::io("connect", e))?;
        tracing::debug!(%addr, %ty, "connected");
        Ok(socket)
    }

    pub fn bind(&self, addr: VsockAddr) -> io::Result<()> {
        let raw = addr.to_raw();
        // SAFETY: as in `connect_once`.
        cvt(unsafe {
            libc::bind(
                self.raw(),
                (&raw as *const libc::sockaddr_vm).cast(),
                mem::size_of::<libc::sockaddr_vm>() as socklen_t,
            )
        })
        .map(drop)
    }

    /// Open a socket bound to `addr`; failure to bind is fatal.
    pub fn bound(ty: SocketType, addr: VsockAddr) -> Result<Self, Error> {
        let socket = Self::new(ty)?;
        socket.bind(addr).map_err(|e| Error::io("bind", e))?;
        Ok(socket)
    }

    /// Open a socket bound to `addr`, handing bind failures back to the
    /// caller.
    pub fn try_bound(ty: SocketType, addr: VsockAddr) -> Result<io::Result<Self>, Error> {
        let socket = Self::new(ty)?;
        Ok(socket.bind(addr).map(|()| socket))
    }

    /// Open a listening socket on `addr`.
    pub fn listen(ty: SocketType, addr: VsockAddr) -> Result<Self, Error> {
        let socket = Self::bound(ty, addr)?;
        // SAFETY: plain syscall on an owned descriptor.
        cvt(unsafe { libc::listen(socket.raw(), LISTEN_BACKLOG) })
            .map_err(|e| Error::io("listen", e))?;
        tracing::debug!(%addr, %ty, "listening");
        Ok(socket)
    }

    /// A single `accept(2)` call.
    pub fn accept_once(&self) -> io::Result<(Self, VsockAddr)> {
        // SAFETY: zero is a valid sockaddr_vm.
        let mut raw: libc::sockaddr_vm = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_vm>() as socklen_t;
        // SAFETY: `raw` and `len` outlive the call and describe each other.
        let fd = cvt(unsafe {
            libc::accept4(
                self.raw(),
                (&mut raw as *mut libc::sockaddr_vm).cast(),
                &mut len,
                libc::SOCK_CLOEXEC,
            )
        })?;
        // SAFETY: fresh descriptor from accept4.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok((Self::from_fd(fd, self.ty), VsockAddr::from_raw(&raw)))
    }

    /// `accept(2)`, retried on `EINTR` under the timeout.
    pub fn accept(&self) -> Result<Self, Error> {
        let timeout = Timeout::begin(TIMEOUT);
        loop {
            match self.accept_once() {
                Ok((socket, peer)) => {
                    tracing::debug!(%peer, ty = %self.ty, "accepted");
                    return Ok(socket);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => timeout.check("accept")?,
                Err(e) => return Err(Error::io("accept", e)),
            }
        }
    }

    /// Bind to `(VMADDR_CID_ANY, bind_port)` and connect to `addr`.
    pub fn bind_connect(ty: SocketType, addr: VsockAddr, bind_port: u32) -> Result<Self, Error> {
        let socket = Self::bound(ty, VsockAddr::new(VMADDR_CID_ANY, bind_port))?;
        socket
            .try_connect(addr)?
            .map_err(|e| Error::io("connect", e))?;
        Ok(socket)
    }

    pub fn local_addr(&self) -> io::Result<VsockAddr> {
        // SAFETY: zero is a valid sockaddr_vm.
        let mut raw: libc::sockaddr_vm = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_vm>() as socklen_t;
        // SAFETY: `raw` and `len` describe each other.
        cvt(unsafe {
            libc::getsockname(
                self.raw(),
                (&mut raw as *mut libc::sockaddr_vm).cast(),
                &mut len,
            )
        })?;
        Ok(VsockAddr::from_raw(&raw))
    }

    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        let how = match how {
            Shutdown::Read => libc::SHUT_RD,
            Shutdown::Write => libc::SHUT_WR,
            Shutdown::Both => libc::SHUT_RDWR,
        };
        // SAFETY: plain syscall on an owned descriptor.
        cvt(unsafe { libc::shutdown(self.raw(), how) }).map(drop)
    }

    pub fn set_nonblocking(&self) -> io::Result<()> {
        // SAFETY: plain fcntl calls on an owned descriptor.
        unsafe {
            let flags = cvt(libc::fcntl(self.raw(), libc::F_GETFL, 0))?;
            cvt(libc::fcntl(self.raw(), libc::F_SETFL, flags | libc::O_NONBLOCK))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Single-shot I/O
    // ------------------------------------------------------------------

    pub fn send(&self, buf: &[u8], flags: MsgFlags) -> io::Result<usize> {
        // SAFETY: `buf` is valid for reads of its length.
        cvt_size(unsafe { libc::send(self.raw(), buf.as_ptr().cast(), buf.len(), flags.bits()) })
    }

    pub fn recv(&self, buf: &mut [u8], flags: MsgFlags) -> io::Result<usize> {
        // SAFETY: `buf` is valid for writes of its length.
        cvt_size(unsafe {
            libc::recv(self.raw(), buf.as_mut_ptr().cast(), buf.len(), flags.bits())
        })
    }

    /// `read(2)` into a caller-provided region.
    ///
    /// # Safety
    ///
    /// `ptr` must either be invalid as a user address (the kernel then
    /// reports `EFAULT`) or point to `len` bytes that no Rust reference
    /// currently aliases.
    pub unsafe fn read_raw(&self, ptr: *mut u8, len: usize) -> io::Result<usize> {
        // SAFETY: guaranteed by the caller.
        cvt_size(unsafe { libc::read(self.raw(), ptr.cast(), len) })
    }

    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: `buf` is an exclusive borrow of `buf.len()` bytes.
        unsafe { self.read_raw(buf.as_mut_ptr(), buf.len()) }
    }

    /// `recvmsg(2)` into one buffer, returning the length and `msg_flags`.
    pub fn recvmsg(&self, buf: &mut [u8], flags: MsgFlags) -> io::Result<(usize, MsgFlags)> {
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: buf.len(),
        };
        // SAFETY: zero is a valid msghdr.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;

        // SAFETY: `msg` points at `iov`, which points at `buf`; all outlive
        // the call.
        let n = cvt_size(unsafe { libc::recvmsg(self.raw(), &mut msg, flags.bits()) })?;
        Ok((n, MsgFlags::from_bits_retain(msg.msg_flags)))
    }

    /// `sendmsg(2)` with a gather list and optional ancillary data.
    pub fn sendmsg(
        &self,
        bufs: &[IoSlice<'_>],
        control: &[u8],
        flags: MsgFlags,
    ) -> io::Result<usize> {
        // SAFETY: zero is a valid msghdr.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        // IoSlice is guaranteed ABI-compatible with iovec.
        msg.msg_iov = bufs.as_ptr() as *mut libc::iovec;
        msg.msg_iovlen = bufs.len() as _;
        if !control.is_empty() {
            msg.msg_control = control.as_ptr() as *mut c_void;
            msg.msg_controllen = control.len() as _;
        }

        // SAFETY: every pointer in `msg` refers to borrowed data that outlives
        // the call; the kernel only reads through them.
        cvt_size(unsafe { libc::sendmsg(self.raw(), &msg, flags.bits()) })
    }

    /// Read one entry from the error queue.
    ///
    /// Returns `Ok(None)` when an entry was dequeued but it carries no
    /// extended error.
    pub fn recv_errqueue(&self) -> io::Result<Option<Completion>> {
        // u64 storage keeps the control buffer aligned for cmsghdr.
        let mut control = [0u64; 16];
        // SAFETY: zero is a valid msghdr.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_control = control.as_mut_ptr().cast();
        msg.msg_controllen = mem::size_of_val(&control) as _;

        // SAFETY: `msg` points at `control`, which outlives the call.
        cvt_size(unsafe { libc::recvmsg(self.raw(), &mut msg, libc::MSG_ERRQUEUE) })?;

        // SAFETY: the CMSG_* walkers stay within `msg_controllen`, which the
        // kernel updated to the bytes it wrote into `control`.
        unsafe {
            let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
            while !cmsg.is_null() {
                let hdr = &*cmsg;
                let vsock = hdr.cmsg_level == SOL_VSOCK && hdr.cmsg_type == VSOCK_RECVERR;
                let ip = hdr.cmsg_level == libc::SOL_IP && hdr.cmsg_type == libc::IP_RECVERR;
                if vsock || ip {
                    let err: libc::sock_extended_err =
                        ptr::read_unaligned(libc::CMSG_DATA(cmsg).cast());
                    return Ok(Some(Completion {
                        errno: err.ee_errno,
                        origin: err.ee_origin,
                        code: err.ee_code,
                        range: (err.ee_info, err.ee_data),
                    }));
                }
                cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
            }
        }
        Ok(None)
    }

    pub fn poll(&self, events: c_short, timeout_ms: c_int) -> io::Result<c_short> {
        let mut pfd = libc::pollfd {
            fd: self.raw(),
            events,
            revents: 0,
        };
        // SAFETY: one valid pollfd.
        cvt(unsafe { libc::poll(&mut pfd, 1, timeout_ms) })?;
        Ok(pfd.revents)
    }

    // ------------------------------------------------------------------
    // Checked transfers
    // ------------------------------------------------------------------

    /// Send all of `buf`, then compare the outcome with `expect`.
    pub fn send_buf(&self, buf: &[u8], flags: MsgFlags, expect: Expect) -> Result<(), Error> {
        let mut done = 0;
        let timeout = Timeout::begin(TIMEOUT);
        let last = loop {
            let ret = self.send(&buf[done..], flags);
            timeout.check("send")?;
            match ret {
                Ok(0) => break ret,
                Ok(n) => {
                    done += n;
                    if done >= buf.len() {
                        break ret;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => break ret,
            }
        };
        drop(timeout);

        check_transfer("send", done, last, expect)
    }

    /// Receive until `buf` is full (or EOF, or an error), then compare the
    /// outcome with `expect`.
    ///
    /// With `MSG_TRUNC` on a seqpacket socket a single call may report more
    /// bytes than `buf` holds; the total is compared as reported.
    pub fn recv_buf(&self, buf: &mut [u8], flags: MsgFlags, expect: Expect) -> Result<(), Error> {
        // SAFETY: `buf` is an exclusive borrow of `buf.len()` bytes.
        unsafe { self.recv_raw(buf.as_mut_ptr(), buf.len(), flags, expect) }
    }

    /// Receive into a null user buffer of `len` bytes.
    pub fn recv_unmapped(&self, len: usize, flags: MsgFlags, expect: Expect) -> Result<(), Error> {
        // SAFETY: null is never a valid user address; the kernel faults
        // without touching our memory.
        unsafe { self.recv_raw(ptr::null_mut(), len, flags, expect) }
    }

    /// # Safety
    ///
    /// Same contract as [`Socket::read_raw`].
    unsafe fn recv_raw(
        &self,
        ptr: *mut u8,
        len: usize,
        flags: MsgFlags,
        expect: Expect,
    ) -> Result<(), Error> {
        let mut done = 0;
        let timeout = Timeout::begin(TIMEOUT);
        let last = loop {
            // SAFETY: `done < len`, so the region stays inside the caller's.
            let ret = cvt_size(unsafe {
                libc::recv(
                    self.raw(),
                    ptr.wrapping_add(done).cast(),
                    len - done,
                    flags.bits(),
                )
            });
            timeout.check("recv")?;
            match ret {
                Ok(0) => break ret,
                Ok(n) => {
                    done += n;
                    if done >= len {
                        break ret;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => break ret,
            }
        };
        drop(timeout);

        check_transfer("recv", done, last, expect)
    }

    pub fn send_byte(&self, flags: MsgFlags, expect: Expect) -> Result<(), Error> {
        self.send_buf(&[0], flags, expect)
    }

    pub fn recv_byte(&self, flags: MsgFlags, expect: Expect) -> Result<(), Error> {
        let mut byte = [0u8];
        self.recv_buf(&mut byte, flags, expect)
    }

    // ------------------------------------------------------------------
    // Queue introspection
    // ------------------------------------------------------------------

    /// Read one of the pending-byte counters once.
    pub fn pending(&self, which: Pending) -> io::Result<c_int> {
        let mut value: c_int = 0;
        // SAFETY: both requests write a single int.
        let ret = unsafe {
            match which {
                Pending::Unsent => libc::ioctl(self.raw(), libc::TIOCOUTQ, &mut value),
                Pending::Unread => libc::ioctl(self.raw(), libc::FIONREAD, &mut value),
            }
        };
        cvt(ret)?;
        Ok(value)
    }

    /// Poll a pending-byte counter until it equals `expected`.
    ///
    /// Returns `Ok(false)` if the transport does not implement the counter.
    pub fn wait_pending(&self, which: Pending, expected: c_int) -> Result<bool, Error> {
        let timeout = Timeout::begin(TIMEOUT);
        loop {
            match self.pending(which) {
                Ok(actual) if actual == expected => return Ok(true),
                Ok(actual) => {
                    tracing::trace!(op = which.name(), actual, expected, "not settled yet");
                }
                Err(e) if e.raw_os_error() == Some(libc::EOPNOTSUPP) => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::io(which.name(), e)),
            }
            timeout.check(which.name())?;
            timeout.sleep(Duration::from_millis(1));
        }
    }

    /// Wait until every byte sent on this socket has left it.
    pub fn wait_sent(&self) -> Result<bool, Error> {
        self.wait_pending(Pending::Unsent, 0)
    }

    /// Block until the peer closes its side of the connection.
    pub fn wait_remote_close(&self) -> Result<(), Error> {
        let timeout = Timeout::begin(TIMEOUT);
        loop {
            match self.poll(libc::POLLRDHUP, -1) {
                Ok(revents) if revents & (libc::POLLRDHUP | libc::POLLHUP) != 0 => return Ok(()),
                Ok(revents) => {
                    return Err(Error::assertion(format!(
                        "unexpected poll events {:#x} while waiting for remote close",
                        revents
                    )));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    timeout.check("wait_remote_close")?
                }
                Err(e) => return Err(Error::io("poll", e)),
            }
        }
    }

    // ------------------------------------------------------------------
    // Socket options
    // ------------------------------------------------------------------

    fn setsockopt<T>(&self, level: c_int, name: c_int, value: &T) -> io::Result<()> {
        // SAFETY: `value` is valid for reads of size_of::<T>() bytes.
        cvt(unsafe {
            libc::setsockopt(
                self.raw(),
                level,
                name,
                (value as *const T).cast(),
                mem::size_of::<T>() as socklen_t,
            )
        })
        .map(drop)
    }

    /// Only instantiated with plain integer and C struct types.
    fn getsockopt<T: Copy>(&self, level: c_int, name: c_int) -> io::Result<T> {
        let mut value = MaybeUninit::<T>::zeroed();
        let mut len = mem::size_of::<T>() as socklen_t;
        // SAFETY: `value` has room for `len` bytes.
        cvt(unsafe {
            libc::getsockopt(self.raw(), level, name, value.as_mut_ptr().cast(), &mut len)
        })?;
        // SAFETY: zero-initialized plain data, possibly overwritten by the
        // kernel.
        Ok(unsafe { value.assume_init() })
    }

    pub fn get_ull(&self, level: c_int, name: c_int) -> io::Result<u64> {
        self.getsockopt(level, name)
    }

    /// Set a 64-bit option and read it back.
    pub fn set_ull_checked(
        &self,
        level: c_int,
        name: c_int,
        value: u64,
        what: &'static str,
    ) -> Result<(), Error> {
        self.setsockopt(level, name, &value)
            .map_err(|e| Error::io(what, e))?;
        let actual: u64 = self
            .getsockopt(level, name)
            .map_err(|e| Error::io(what, e))?;
        if actual != value {
            return Err(Error::assertion(format!(
                "{}: read back {} (expected {})",
                what, actual, value
            )));
        }
        Ok(())
    }

    /// Set an int option and read it back.
    pub fn set_int_checked(
        &self,
        level: c_int,
        name: c_int,
        value: c_int,
        what: &'static str,
    ) -> Result<(), Error> {
        self.setsockopt(level, name, &value)
            .map_err(|e| Error::io(what, e))?;
        let actual: c_int = self
            .getsockopt(level, name)
            .map_err(|e| Error::io(what, e))?;
        if actual != value {
            return Err(Error::assertion(format!(
                "{}: read back {} (expected {})",
                what, actual, value
            )));
        }
        Ok(())
    }

    /// Set a `timeval` option and read it back.
    pub fn set_timeval_checked(
        &self,
        level: c_int,
        name: c_int,
        value: Duration,
        what: &'static str,
    ) -> Result<(), Error> {
        let tv = libc::timeval {
            tv_sec: value.as_secs() as libc::time_t,
            tv_usec: value.subsec_micros() as libc::suseconds_t,
        };
        self.setsockopt(level, name, &tv)
            .map_err(|e| Error::io(what, e))?;
        let actual: libc::timeval = self
            .getsockopt(level, name)
            .map_err(|e| Error::io(what, e))?;
        if actual.tv_sec != tv.tv_sec || actual.tv_usec != tv.tv_usec {
            return Err(Error::assertion(format!(
                "{}: read back {}.{:06}s (expected {}.{:06}s)",
                what, actual.tv_sec, actual.tv_usec, tv.tv_sec, tv.tv_usec
            )));
        }
        Ok(())
    }

    /// Turn on `SO_LINGER` with the given timeout.
    pub fn set_linger(&self, seconds: c_int) -> Result<(), Error> {
        let linger = libc::linger {
            l_onoff: 1,
            l_linger: seconds,
        };
        self.setsockopt(libc::SOL_SOCKET, libc::SO_LINGER, &linger)
            .map_err(|e| Error::io("setsockopt(SO_LINGER)", e))
    }

    pub fn enable_zerocopy(&self) -> Result<(), Error> {
        self.set_int_checked(
            libc::SOL_SOCKET,
            libc::SO_ZEROCOPY,
            1,
            "setsockopt(SO_ZEROCOPY)",
        )
    }
}

impl AsFd for Socket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.raw()
    }
}

fn check_transfer(
    op: &'static str,
    done: usize,
    last: io::Result<usize>,
    expect: Expect,
) -> Result<(), Error> {
    match (expect, last) {
        (Expect::Errno(errno), Err(e)) if e.raw_os_error() == Some(errno) => Ok(()),
        (Expect::Errno(errno), Err(e)) => Err(Error::assertion(format!(
            "{}: expected {}, got {}",
            op,
            errno_name(errno),
            e
        ))),
        (Expect::Errno(errno), Ok(n)) => Err(Error::assertion(format!(
            "bogus {} return value {} (expected {})",
            op,
            n,
            errno_name(errno)
        ))),
        (Expect::Bytes(_), Err(e)) => Err(Error::io(op, e)),
        (Expect::Bytes(expected), Ok(last)) if done != expected => {
            let eof = if last == 0 { ", unexpected EOF" } else { "" };
            Err(Error::assertion(format!(
                "bogus {} byte count {} (expected {}){}",
                op, done, expected, eof
            )))
        }
        (Expect::Bytes(_), Ok(_)) => Ok(()),
    }
}

/// System page size.
pub fn page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}
