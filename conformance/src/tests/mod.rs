//! The scenario catalog.
//!
//! Scenarios are grouped by the behaviour they exercise. The catalog order
//! is part of the interface: `--pick` and `--skip` refer to positions in it,
//! and both sides of a run must agree on it, so new scenarios go at the end.

pub mod invalid;

use crate::testcase::{Procedure, TestCase};

const fn both(
    name: &'static str,
    run_client: Procedure,
    run_server: Procedure,
) -> TestCase {
    TestCase {
        name,
        run_client,
        run_server: Some(run_server),
    }
}

const fn client_only(name: &'static str, run_client: Procedure) -> TestCase {
    TestCase {
        name,
        run_client,
        run_server: None,
    }
}

pub static TEST_CASES: &[TestCase] = &[
    client_only(
        "SOCK_STREAM connection reset",
        lifecycle::stream_connection_reset,
    ),
    both(
        "SOCK_STREAM bind only",
        lifecycle::stream_bind_only_client,
        lifecycle::stream_bind_only_server,
    ),
    both(
        "SOCK_STREAM client close",
        lifecycle::stream_client_close_client,
        lifecycle::stream_client_close_server,
    ),
    both(
        "SOCK_STREAM server close",
        lifecycle::stream_server_close_client,
        lifecycle::stream_server_close_server,
    ),
    both(
        "SOCK_STREAM multiple connections",
        lifecycle::stream_multiconn_client,
        lifecycle::stream_multiconn_server,
    ),
    both(
        "SOCK_STREAM MSG_PEEK",
        peek::stream_msg_peek_client,
        peek::stream_msg_peek_server,
    ),
    both(
        "SOCK_SEQPACKET msg bounds",
        seqpacket::msg_bounds_client,
        seqpacket::msg_bounds_server,
    ),
    both(
        "SOCK_SEQPACKET MSG_TRUNC flag",
        seqpacket::msg_trunc_client,
        seqpacket::msg_trunc_server,
    ),
    both(
        "SOCK_SEQPACKET timeout",
        seqpacket::timeout_client,
        seqpacket::timeout_server,
    ),
    both(
        "SOCK_SEQPACKET invalid receive buffer",
        invalid::seqpacket_invalid_rec_buffer_client,
        invalid::seqpacket_invalid_rec_buffer_server,
    ),
    both(
        "SOCK_STREAM poll() + SO_RCVLOWAT",
        flow::stream_poll_rcvlowat_client,
        flow::stream_poll_rcvlowat_server,
    ),
    both(
        "SOCK_SEQPACKET big message",
        seqpacket::bigmsg_client,
        seqpacket::bigmsg_server,
    ),
    both(
        "SOCK_STREAM test invalid buffer",
        invalid::stream_inv_buf_client,
        invalid::stream_inv_buf_server,
    ),
    both(
        "SOCK_SEQPACKET test invalid buffer",
        invalid::seqpacket_inv_buf_client,
        invalid::seqpacket_inv_buf_server,
    ),
    both(
        "SOCK_STREAM virtio skb merge",
        flow::stream_virtio_skb_merge_client,
        flow::stream_virtio_skb_merge_server,
    ),
    both(
        "SOCK_SEQPACKET MSG_PEEK",
        peek::seqpacket_msg_peek_client,
        peek::seqpacket_msg_peek_server,
    ),
    both(
        "SOCK_STREAM SHUT_WR",
        lifecycle::stream_shutwr_client,
        lifecycle::stream_shutwr_server,
    ),
    both(
        "SOCK_STREAM SHUT_RD",
        lifecycle::stream_shutrd_client,
        lifecycle::stream_shutrd_server,
    ),
    both(
        "SOCK_STREAM MSG_ZEROCOPY",
        zerocopy::stream_msgzcopy_client,
        zerocopy::stream_msgzcopy_server,
    ),
    both(
        "SOCK_SEQPACKET MSG_ZEROCOPY",
        zerocopy::seqpacket_msgzcopy_client,
        zerocopy::seqpacket_msgzcopy_server,
    ),
    both(
        "SOCK_STREAM MSG_ZEROCOPY empty MSG_ERRQUEUE",
        zerocopy::stream_msgzcopy_empty_errq_client,
        zerocopy::stream_msgzcopy_empty_errq_server,
    ),
    both(
        "SOCK_STREAM double bind connect",
        lifecycle::double_bind_connect_client,
        lifecycle::double_bind_connect_server,
    ),
    both(
        "SOCK_STREAM virtio credit update + SO_RCVLOWAT",
        flow::stream_rcvlowat_cred_upd_client,
        flow::stream_rcvlowat_def_cred_upd_server,
    ),
    both(
        "SOCK_STREAM virtio credit update + low rx_bytes",
        flow::stream_rcvlowat_cred_upd_client,
        flow::stream_rcvlowat_low_rx_bytes_server,
    ),
    both(
        "SOCK_STREAM ioctl(SIOCOUTQ) 0 unsent bytes",
        flow::stream_unsent_bytes_client,
        flow::stream_unsent_bytes_server,
    ),
    both(
        "SOCK_SEQPACKET ioctl(SIOCOUTQ) 0 unsent bytes",
        flow::seqpacket_unsent_bytes_client,
        flow::seqpacket_unsent_bytes_server,
    ),
    both(
        "SOCK_STREAM leak accept queue",
        race::stream_leak_acceptq_client,
        race::stream_leak_acceptq_server,
    ),
    both(
        "SOCK_STREAM MSG_ZEROCOPY leak MSG_ERRQUEUE",
        zerocopy::stream_msgzcopy_leak_errq_client,
        zerocopy::stream_msgzcopy_leak_errq_server,
    ),
    both(
        "SOCK_STREAM MSG_ZEROCOPY leak completion skb",
        zerocopy::stream_msgzcopy_leak_zcskb_client,
        zerocopy::stream_msgzcopy_leak_zcskb_server,
    ),
    client_only(
        "SOCK_STREAM transport release use-after-free",
        race::stream_transport_uaf_client,
    ),
    both(
        "SOCK_STREAM retry failed connect()",
        lifecycle::stream_connect_retry_client,
        lifecycle::stream_connect_retry_server,
    ),
    both(
        "SOCK_STREAM SO_LINGER null-ptr-deref",
        race::stream_linger_client,
        race::stream_linger_server,
    ),
    both(
        "SOCK_STREAM SO_LINGER close() on unread",
        race::stream_nolinger_client,
        race::stream_nolinger_server,
    ),
    both(
        "SOCK_STREAM transport change null-ptr-deref",
        race::stream_transport_change_client,
        race::stream_transport_change_server,
    ),
    both(
        "SOCK_STREAM ioctl(SIOCINQ) functionality",
        flow::stream_unread_bytes_client,
        flow::stream_unread_bytes_server,
    ),
    both(
        "SOCK_SEQPACKET ioctl(SIOCINQ) functionality",
        flow::seqpacket_unread_bytes_client,
        flow::seqpacket_unread_bytes_server,
    ),
];

/// `(index, name)` of every scenario, in catalog order.
pub fn list_all() -> Vec<(usize, &'static str)> {
    TEST_CASES
        .iter()
        .enumerate()
        .map(|(index, case)| (index, case.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique() {
        let names: HashSet<&str> = TEST_CASES.iter().map(|c| c.name).collect();
        assert_eq!(names.len(), TEST_CASES.len());
    }

    #[test]
    fn catalog_order_is_stable() {
        let all = list_all();
        assert_eq!(all.len(), 36);
        assert_eq!(all[0], (0, "SOCK_STREAM connection reset"));
        assert_eq!(all[6].1, "SOCK_SEQPACKET msg bounds");
        assert_eq!(all[21].1, "SOCK_STREAM double bind connect");
        assert_eq!(all[35].1, "SOCK_SEQPACKET ioctl(SIOCINQ) functionality");
    }

    #[test]
    fn only_peerless_scenarios_lack_a_server() {
        let single: Vec<&str> = TEST_CASES
            .iter()
            .filter(|c| c.run_server.is_none())
            .map(|c| c.name)
            .collect();
        assert_eq!(
            single,
            vec![
                "SOCK_STREAM connection reset",
                "SOCK_STREAM transport release use-after-free",
            ]
        );
    }
}
