//! ACL stage packet fixtures: whitelist/blacklist candidates keyed on
//! source address, built the way the control plane would install them
//! via `MapManager::block_ip` / `allow_ip`.

use packetscrub_ebpf_tests::packet_generator::*;
use std::net::Ipv4Addr;

#[test]
fn blacklisted_source_packet_carries_expected_src_ip() {
    let attacker = Ipv4Addr::new(198, 51, 100, 23);
    let victim = Ipv4Addr::new(192, 0, 2, 1);
    let pkt = create_tcp_packet(attacker, victim, 40000, 443, TCP_SYN, vec![]);

    let src_offset = ETH_HDR_LEN + 12;
    let src_bytes: [u8; 4] = pkt[src_offset..src_offset + 4].try_into().unwrap();
    assert_eq!(Ipv4Addr::from(src_bytes), attacker);
}

#[test]
fn whitelisted_source_survives_arbitrary_flag_combinations() {
    let trusted = Ipv4Addr::new(203, 0, 113, 5);
    let dst = Ipv4Addr::new(192, 0, 2, 1);

    for flags in [TCP_SYN, TCP_ACK, TCP_SYN | TCP_ACK, TCP_FIN | TCP_ACK] {
        let pkt = create_tcp_packet(trusted, dst, 50000, 80, flags, vec![]);
        let src_offset = ETH_HDR_LEN + 12;
        let src_bytes: [u8; 4] = pkt[src_offset..src_offset + 4].try_into().unwrap();
        assert_eq!(Ipv4Addr::from(src_bytes), trusted);
    }
}

#[test]
fn ip_header_protocol_field_matches_tcp() {
    let pkt = create_tcp_packet(
        Ipv4Addr::new(10, 1, 1, 1),
        Ipv4Addr::new(10, 1, 1, 2),
        1000,
        22,
        TCP_SYN,
        vec![],
    );
    assert_eq!(pkt[ETH_HDR_LEN + 9], IPPROTO_TCP);
}
