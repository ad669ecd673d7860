//! Fragment-filter fixtures: `xdp_scrub`'s fragment stage drops any
//! packet with the MF flag set or a nonzero fragment offset.

use packetscrub_ebpf_tests::packet_generator::*;
use std::net::Ipv4Addr;

fn frag_word(pkt: &[u8]) -> u16 {
    u16::from_be_bytes([pkt[ETH_HDR_LEN + 6], pkt[ETH_HDR_LEN + 7]])
}

#[test]
fn more_fragments_flag_is_encoded_in_top_bit() {
    let tcp = TcpSegment::new().build();
    let ip = Ipv4Packet::new()
        .with_protocol(IPPROTO_TCP)
        .with_fragment(0x01, 0)
        .with_payload(tcp)
        .build();
    let pkt = EthernetFrame::new().with_payload(ip).build();

    // MF is bit 0x2000 of the 16-bit flags/offset word.
    assert_ne!(frag_word(&pkt) & 0x2000, 0);
}

#[test]
fn nonzero_fragment_offset_is_preserved() {
    let tcp = TcpSegment::new().build();
    let ip = Ipv4Packet::new()
        .with_protocol(IPPROTO_TCP)
        .with_fragment(0x00, 185)
        .with_payload(tcp)
        .build();
    let pkt = EthernetFrame::new().with_payload(ip).build();

    assert_eq!(frag_word(&pkt) & 0x1fff, 185);
}

#[test]
fn unfragmented_packet_has_zero_flags_and_offset() {
    let pkt = create_tcp_packet(
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 2),
        1111,
        80,
        TCP_SYN,
        vec![],
    );
    assert_eq!(frag_word(&pkt), 0);
}
