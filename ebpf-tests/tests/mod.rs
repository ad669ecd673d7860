//! eBPF XDP Packet Filter Test Suite
//!
//! Tests run in userspace using generated packet bytes to verify the
//! byte-level shape the parser in `xdp_scrub` expects. These are not a
//! substitute for loading the program into a kernel; they pin down the
//! wire format the rest of the pipeline's decisions depend on.

use packetscrub_ebpf_tests::packet_generator;

mod acl_tests;
mod fragment_tests;
mod icmp_tests;
mod tcp_state_tests;
mod udp_amplification_tests;

/// Mock XDP action constants, matching the real `xdp_action` enum.
pub mod xdp_action {
    pub const XDP_ABORTED: u32 = 0;
    pub const XDP_DROP: u32 = 1;
    pub const XDP_PASS: u32 = 2;
    pub const XDP_TX: u32 = 3;
    pub const XDP_REDIRECT: u32 = 4;
}

#[cfg(test)]
mod smoke {
    use super::packet_generator::*;
    use std::net::Ipv4Addr;

    #[test]
    fn generated_packets_have_sane_total_length() {
        let pkt = create_tcp_packet(
            Ipv4Addr::new(192, 0, 2, 10),
            Ipv4Addr::new(192, 0, 2, 20),
            12345,
            443,
            TCP_SYN,
            vec![],
        );
        assert_eq!(pkt.len(), ETH_HDR_LEN + IPV4_HDR_LEN + TCP_HDR_LEN);
    }
}
