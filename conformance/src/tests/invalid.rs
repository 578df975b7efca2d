//! Receiving into user buffers the kernel cannot write to.

use crate::error::Error;
use crate::harness::Harness;
use crate::mapping::Mapping;
use crate::testcase::TestResult;
use crate::transport::{Expect, MsgFlags, Socket, SocketType, page_size};

const BUF_PATTERN_1: u8 = b'a';
const BUF_PATTERN_2: u8 = b'b';
const INV_BUF_TEST_DATA_LEN: usize = 512;

/// Each message spans the whole receive buffer, so the copy has to reach
/// the unmapped middle page.
const REC_BUFFER_PAGES: usize = 3;

fn send_rec_buffer_messages(socket: &Socket) -> TestResult {
    let len = REC_BUFFER_PAGES * page_size();
    socket.send_buf(&vec![BUF_PATTERN_1; len], MsgFlags::empty(), Expect::Bytes(len))?;
    socket.send_buf(&vec![BUF_PATTERN_2; len], MsgFlags::empty(), Expect::Bytes(len))
}

/// Read the first message into a buffer with a hole, then the second one
/// into a valid buffer.
fn recv_rec_buffer_messages(socket: &Socket) -> TestResult {
    let len = REC_BUFFER_PAGES * page_size();
    let mut broken = Mapping::anonymous(REC_BUFFER_PAGES)?;
    broken.punch_hole(1)?;
    let mut valid = vec![0u8; len];

    // SAFETY: the middle page is unmapped, so the kernel faults; nothing on
    // our side references the mapping.
    match unsafe { socket.read_raw(broken.as_mut_ptr(), broken.len()) } {
        Ok(n) => {
            return Err(Error::assertion(format!(
                "read(2) into a buffer with a hole must fail, got {}",
                n
            )));
        }
        Err(e) if e.raw_os_error() == Some(libc::EFAULT) => {}
        Err(e) => {
            return Err(Error::assertion(format!(
                "unexpected read(2) error into a broken buffer: {}",
                e
            )));
        }
    }

    // The first message is gone; the second one arrives intact.
    let n = socket
        .read(&mut valid)
        .map_err(|e| Error::io("read", e))?;
    if n != len {
        return Err(Error::assertion(format!(
            "invalid read(2) length into a valid buffer: {} (expected {})",
            n, len
        )));
    }
    if let Some(i) = valid.iter().position(|&b| b != BUF_PATTERN_2) {
        return Err(Error::assertion(format!(
            "invalid pattern at {}: expected {:#04x}, got {:#04x}",
            i, BUF_PATTERN_2, valid[i]
        )));
    }
    Ok(())
}

pub fn seqpacket_invalid_rec_buffer_client(h: &mut Harness<'_>) -> TestResult {
    let socket = h.connect(SocketType::SeqPacket)?;
    send_rec_buffer_messages(&socket)?;
    h.writeln("SENDDONE")
}

pub fn seqpacket_invalid_rec_buffer_server(h: &mut Harness<'_>) -> TestResult {
    let socket = h.accept(SocketType::SeqPacket)?;
    h.expectln("SENDDONE")?;
    recv_rec_buffer_messages(&socket)
}

fn inv_buf_client(h: &mut Harness<'_>, ty: SocketType) -> TestResult {
    let socket = h.connect(ty)?;
    h.expectln("SENDDONE")?;

    socket.recv_unmapped(INV_BUF_TEST_DATA_LEN, MsgFlags::empty(), Expect::Errno(libc::EFAULT))?;

    // A faulted stream read leaves the data queued; a faulted seqpacket read
    // drops the message.
    let expect = match ty {
        SocketType::Stream => Expect::Bytes(INV_BUF_TEST_DATA_LEN),
        SocketType::SeqPacket => Expect::Errno(libc::EAGAIN),
    };
    let mut data = [0u8; INV_BUF_TEST_DATA_LEN];
    socket.recv_buf(&mut data, MsgFlags::DONTWAIT, expect)?;

    h.writeln("DONE")
}

fn inv_buf_server(h: &mut Harness<'_>, ty: SocketType) -> TestResult {
    let socket = h.accept(ty)?;

    let data = [0u8; INV_BUF_TEST_DATA_LEN];
    socket.send_buf(&data, MsgFlags::empty(), Expect::Bytes(data.len()))?;

    h.writeln("SENDDONE")?;
    h.expectln("DONE")
}

pub fn stream_inv_buf_client(h: &mut Harness<'_>) -> TestResult {
    inv_buf_client(h, SocketType::Stream)
}

pub fn stream_inv_buf_server(h: &mut Harness<'_>) -> TestResult {
    inv_buf_server(h, SocketType::Stream)
}

pub fn seqpacket_inv_buf_client(h: &mut Harness<'_>) -> TestResult {
    inv_buf_client(h, SocketType::SeqPacket)
}

pub fn seqpacket_inv_buf_server(h: &mut Harness<'_>) -> TestResult {
    inv_buf_server(h, SocketType::SeqPacket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeout::serial;

    #[test]
    fn full_size_message_faults_then_next_arrives() {
        let _serial = serial();
        let (a, b) = Socket::unix_pair(SocketType::SeqPacket).unwrap();

        send_rec_buffer_messages(&a).unwrap();
        recv_rec_buffer_messages(&b).unwrap();
    }

    #[test]
    fn short_message_is_reported() {
        let _serial = serial();
        let (a, b) = Socket::unix_pair(SocketType::SeqPacket).unwrap();

        // A single page never reaches the hole.
        let page = page_size();
        a.send_buf(&vec![BUF_PATTERN_1; page], MsgFlags::empty(), Expect::Bytes(page))
            .unwrap();

        assert!(matches!(
            recv_rec_buffer_messages(&b),
            Err(Error::Assertion(_))
        ));
    }
}
