//! UDP-flood/amplification stage fixtures: DNS, NTP, SSDP, Memcached.

use packetscrub_ebpf_tests::packet_generator::*;
use std::net::Ipv4Addr;

const DNS_AMP_THRESHOLD: usize = 512;
const NTP_AMP_THRESHOLD: usize = 468;
const SSDP_AMP_THRESHOLD: usize = 256;

#[test]
fn dns_response_above_threshold_looks_like_amplification() {
    let payload = dns_amplification_response(DNS_AMP_THRESHOLD);
    let pkt = create_udp_packet(
        Ipv4Addr::new(8, 8, 8, 8),
        Ipv4Addr::new(192, 0, 2, 1),
        53,
        40000,
        payload.clone(),
    );
    let udp_payload_len = pkt.len() - ETH_HDR_LEN - IPV4_HDR_LEN - UDP_HDR_LEN;
    assert!(udp_payload_len >= DNS_AMP_THRESHOLD);
    assert_eq!(payload[2] & 0x80, 0x80, "QR bit marks this as a response");
}

#[test]
fn dns_query_is_small_and_not_a_response() {
    let query = dns_query("example.com");
    assert!(query.len() < DNS_AMP_THRESHOLD);
    assert_eq!(query[2] & 0x80, 0, "QR bit unset for queries");
}

#[test]
fn ntp_monlist_request_uses_mode_7() {
    let payload = ntp_monlist_request();
    assert_eq!(payload[0] & 0x07, 7);
}

#[test]
fn ntp_time_sync_uses_mode_3_or_4() {
    let client = ntp_mode_request(3);
    let server = ntp_mode_request(4);
    assert_eq!(client[0] & 0x07, 3);
    assert_eq!(server[0] & 0x07, 4);
    assert_eq!(client.len(), 48);
}

#[test]
fn ssdp_response_exceeding_threshold_looks_amplified() {
    let resp = ssdp_response(SSDP_AMP_THRESHOLD);
    assert!(resp.len() >= SSDP_AMP_THRESHOLD);
    assert!(resp.starts_with(b"HTTP/1.1"));
}

#[test]
fn ssdp_notify_is_the_reflected_multicast_message() {
    let notify = ssdp_notify();
    assert!(notify.starts_with(b"NOTIFY "));
}

#[test]
fn memcached_stats_targets_port_11211() {
    let payload = memcached_stats_request();
    let pkt = create_udp_packet(
        Ipv4Addr::new(10, 0, 0, 5),
        Ipv4Addr::new(192, 0, 2, 1),
        11211,
        40000,
        payload,
    );
    let src_port_offset = ETH_HDR_LEN + IPV4_HDR_LEN;
    let src_port = u16::from_be_bytes([pkt[src_port_offset], pkt[src_port_offset + 1]]);
    assert_eq!(src_port, 11211);
}
