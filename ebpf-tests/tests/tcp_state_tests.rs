//! SYN/ACK-flood and conntrack-state fixtures.

use packetscrub_ebpf_tests::packet_generator::*;
use std::net::Ipv4Addr;

fn flags_of(segment: &[u8]) -> u8 {
    let doff_flags = u16::from_be_bytes([segment[12], segment[13]]);
    (doff_flags & 0x3f) as u8
}

#[test]
fn bare_syn_is_the_handshake_opener() {
    let syn = TcpSegment::new().with_flags(TCP_SYN).build();
    assert_eq!(flags_of(&syn), TCP_SYN);
}

#[test]
fn syn_ack_response_carries_both_flags() {
    let syn_ack = TcpSegment::new()
        .with_src_port(80)
        .with_dst_port(54321)
        .with_seq(2_000_000)
        .with_ack(1_000_001)
        .with_flags(TCP_SYN | TCP_ACK)
        .build();
    assert_eq!(flags_of(&syn_ack), TCP_SYN | TCP_ACK);
}

#[test]
fn bare_ack_with_no_conntrack_entry_is_what_the_ack_flood_stage_drops() {
    let ack = TcpSegment::new()
        .with_src_port(54321)
        .with_dst_port(80)
        .with_flags(TCP_ACK)
        .build();
    assert_eq!(flags_of(&ack), TCP_ACK);
}

#[test]
fn fin_and_rst_close_the_connection_in_either_direction() {
    let fin = TcpSegment::new().with_flags(TCP_FIN | TCP_ACK).build();
    let rst = TcpSegment::new().with_flags(TCP_RST).build();
    assert_eq!(flags_of(&fin), TCP_FIN | TCP_ACK);
    assert_eq!(flags_of(&rst), TCP_RST);
}

#[test]
fn many_syns_from_the_same_source_share_the_attacker_ip() {
    let src_ip = Ipv4Addr::new(198, 51, 100, 77);
    let dst_ip = Ipv4Addr::new(192, 0, 2, 1);

    let mut packets = Vec::new();
    for port in 1024..1124u16 {
        packets.push(create_tcp_packet(src_ip, dst_ip, port, 443, TCP_SYN, vec![]));
    }

    assert_eq!(packets.len(), 100);
    for pkt in &packets {
        let src_offset = ETH_HDR_LEN + 12;
        let src_bytes: [u8; 4] = pkt[src_offset..src_offset + 4].try_into().unwrap();
        assert_eq!(Ipv4Addr::from(src_bytes), src_ip);
    }
}
