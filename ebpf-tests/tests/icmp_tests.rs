//! ICMP-flood stage fixtures: the stage allows only echo request/reply,
//! destination-unreachable, and time-exceeded, and caps payload size.

use packetscrub_ebpf_tests::packet_generator::*;
use std::net::Ipv4Addr;

const ICMP_ECHO_REPLY: u8 = 0;
const ICMP_DEST_UNREACHABLE: u8 = 3;
const ICMP_ECHO_REQUEST: u8 = 8;
const ICMP_TIME_EXCEEDED: u8 = 11;
const ICMP_TIMESTAMP_REQUEST: u8 = 13; // not on the allow list

#[test]
fn allowed_icmp_types_round_trip_through_the_builder() {
    for icmp_type in [ICMP_ECHO_REPLY, ICMP_DEST_UNREACHABLE, ICMP_ECHO_REQUEST, ICMP_TIME_EXCEEDED] {
        let pkt = create_icmp_packet(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            icmp_type,
            vec![],
        );
        assert_eq!(pkt[ETH_HDR_LEN + IPV4_HDR_LEN], icmp_type);
        assert_eq!(pkt[ETH_HDR_LEN + 9], IPPROTO_ICMP);
    }
}

#[test]
fn disallowed_icmp_type_is_still_well_formed() {
    let pkt = create_icmp_packet(
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 2),
        ICMP_TIMESTAMP_REQUEST,
        vec![],
    );
    assert_eq!(pkt[ETH_HDR_LEN + IPV4_HDR_LEN], ICMP_TIMESTAMP_REQUEST);
}

#[test]
fn oversize_icmp_payload_exceeds_the_1024_byte_cap() {
    let oversized = vec![0u8; 1025];
    let pkt = create_icmp_packet(
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 2),
        ICMP_ECHO_REQUEST,
        oversized,
    );
    let icmp_len = pkt.len() - ETH_HDR_LEN - IPV4_HDR_LEN;
    assert!(icmp_len > 1024);
}
