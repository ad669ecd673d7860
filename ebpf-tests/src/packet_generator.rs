//! Byte-level packet builders for userspace testing of the XDP scrubber.
//!
//! Each builder produces a `Vec<u8>` laid out exactly as the wire format
//! the parser in `xdp_scrub` expects: Ethernet, then IPv4, then the
//! transport header, then payload. Nothing here touches a socket or a
//! NIC; it only builds bytes a test can hand to assertions about header
//! field offsets.

use std::net::Ipv4Addr;

pub const ETH_TYPE_IPV4: u16 = 0x0800;
pub const ETH_HDR_LEN: usize = 14;
pub const IPV4_HDR_LEN: usize = 20;
pub const TCP_HDR_LEN: usize = 20;
pub const UDP_HDR_LEN: usize = 8;
pub const ICMP_HDR_LEN: usize = 8;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

pub const TCP_FIN: u8 = 0x01;
pub const TCP_SYN: u8 = 0x02;
pub const TCP_RST: u8 = 0x04;
pub const TCP_PSH: u8 = 0x08;
pub const TCP_ACK: u8 = 0x10;
pub const TCP_URG: u8 = 0x20;
pub const TCP_ECE: u8 = 0x40;
pub const TCP_CWR: u8 = 0x80;

fn checksum16(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for c in &mut chunks {
        sum += u16::from_be_bytes([c[0], c[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Ethernet frame wrapping an already-built IPv4 payload.
pub struct EthernetFrame {
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    ethertype: u16,
    payload: Vec<u8>,
}

impl EthernetFrame {
    pub fn new() -> Self {
        Self {
            src_mac: [0x02, 0x00, 0x00, 0x00, 0x00, 0x01],
            dst_mac: [0x02, 0x00, 0x00, 0x00, 0x00, 0x02],
            ethertype: ETH_TYPE_IPV4,
            payload: Vec::new(),
        }
    }

    pub fn with_src_mac(mut self, mac: [u8; 6]) -> Self {
        self.src_mac = mac;
        self
    }

    pub fn with_dst_mac(mut self, mac: [u8; 6]) -> Self {
        self.dst_mac = mac;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ETH_HDR_LEN + self.payload.len());
        out.extend_from_slice(&self.dst_mac);
        out.extend_from_slice(&self.src_mac);
        out.extend_from_slice(&self.ethertype.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

impl Default for EthernetFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// IPv4 packet wrapping an already-built transport payload.
pub struct Ipv4Packet {
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    protocol: u8,
    ttl: u8,
    id: u16,
    flags_frag_offset: u16,
    payload: Vec<u8>,
}

impl Ipv4Packet {
    pub fn new() -> Self {
        Self {
            src_ip: Ipv4Addr::new(192, 0, 2, 1),
            dst_ip: Ipv4Addr::new(192, 0, 2, 100),
            protocol: IPPROTO_TCP,
            ttl: 64,
            id: 0x1234,
            flags_frag_offset: 0,
            payload: Vec::new(),
        }
    }

    pub fn with_src_ip(mut self, ip: Ipv4Addr) -> Self {
        self.src_ip = ip;
        self
    }

    pub fn with_dst_ip(mut self, ip: Ipv4Addr) -> Self {
        self.dst_ip = ip;
        self
    }

    pub fn with_protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    /// `flags` occupies the top 3 bits (bit 0x01 is MF), `frag_offset` the
    /// low 13 bits, matching the wire layout of the IPv4 flags/offset word.
    pub fn with_fragment(mut self, flags: u8, frag_offset: u16) -> Self {
        self.flags_frag_offset = ((flags as u16) << 13) | (frag_offset & 0x1fff);
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let total_len = IPV4_HDR_LEN + self.payload.len();
        let mut hdr = vec![0u8; IPV4_HDR_LEN];
        hdr[0] = 0x45; // version 4, IHL 5
        hdr[1] = 0x00; // DSCP/ECN
        hdr[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
        hdr[4..6].copy_from_slice(&self.id.to_be_bytes());
        hdr[6..8].copy_from_slice(&self.flags_frag_offset.to_be_bytes());
        hdr[8] = self.ttl;
        hdr[9] = self.protocol;
        hdr[10..12].copy_from_slice(&[0, 0]); // checksum placeholder
        hdr[12..16].copy_from_slice(&self.src_ip.octets());
        hdr[16..20].copy_from_slice(&self.dst_ip.octets());

        let csum = checksum16(&hdr);
        hdr[10..12].copy_from_slice(&csum.to_be_bytes());

        let mut out = Vec::with_capacity(total_len);
        out.extend_from_slice(&hdr);
        out.extend_from_slice(&self.payload);
        out
    }
}

impl Default for Ipv4Packet {
    fn default() -> Self {
        Self::new()
    }
}

/// TCP segment. `.build()` returns just the TCP header + payload bytes;
/// wrap in [`Ipv4Packet`] to get a full network-layer packet.
pub struct TcpSegment {
    src_port: u16,
    dst_port: u16,
    seq: u32,
    ack: u32,
    flags: u8,
    window: u16,
    payload: Vec<u8>,
}

impl TcpSegment {
    pub fn new() -> Self {
        Self {
            src_port: 54321,
            dst_port: 80,
            seq: 0,
            ack: 0,
            flags: TCP_SYN,
            window: 65535,
            payload: Vec::new(),
        }
    }

    pub fn with_src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn with_dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn with_seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    pub fn with_ack(mut self, ack: u32) -> Self {
        self.ack = ack;
        self
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_window(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn ack(mut self) -> Self {
        self.flags |= TCP_ACK;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let doff_flags: u16 = (5u16 << 12) | (self.flags as u16 & 0x01ff);
        let mut out = Vec::with_capacity(TCP_HDR_LEN + self.payload.len());
        out.extend_from_slice(&self.src_port.to_be_bytes());
        out.extend_from_slice(&self.dst_port.to_be_bytes());
        out.extend_from_slice(&self.seq.to_be_bytes());
        out.extend_from_slice(&self.ack.to_be_bytes());
        out.extend_from_slice(&doff_flags.to_be_bytes());
        out.extend_from_slice(&self.window.to_be_bytes());
        out.extend_from_slice(&[0, 0]); // checksum, unchecked by the parser
        out.extend_from_slice(&[0, 0]); // urgent pointer
        out.extend_from_slice(&self.payload);
        out
    }
}

impl Default for TcpSegment {
    fn default() -> Self {
        Self::new()
    }
}

pub struct UdpDatagram {
    src_port: u16,
    dst_port: u16,
    payload: Vec<u8>,
}

impl UdpDatagram {
    pub fn new() -> Self {
        Self {
            src_port: 54321,
            dst_port: 53,
            payload: Vec::new(),
        }
    }

    pub fn with_src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn with_dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let len = UDP_HDR_LEN + self.payload.len();
        let mut out = Vec::with_capacity(len);
        out.extend_from_slice(&self.src_port.to_be_bytes());
        out.extend_from_slice(&self.dst_port.to_be_bytes());
        out.extend_from_slice(&(len as u16).to_be_bytes());
        out.extend_from_slice(&[0, 0]); // checksum, optional for IPv4
        out.extend_from_slice(&self.payload);
        out
    }
}

impl Default for UdpDatagram {
    fn default() -> Self {
        Self::new()
    }
}

pub struct IcmpPacket {
    icmp_type: u8,
    code: u8,
    payload: Vec<u8>,
}

impl IcmpPacket {
    pub fn new() -> Self {
        Self {
            icmp_type: 8, // echo request
            code: 0,
            payload: Vec::new(),
        }
    }

    pub fn with_type(mut self, icmp_type: u8) -> Self {
        self.icmp_type = icmp_type;
        self
    }

    pub fn with_code(mut self, code: u8) -> Self {
        self.code = code;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ICMP_HDR_LEN + self.payload.len());
        out.push(self.icmp_type);
        out.push(self.code);
        out.extend_from_slice(&[0, 0]); // checksum placeholder
        out.extend_from_slice(&[0, 0, 0, 0]); // id/seq
        out.extend_from_slice(&self.payload);
        let csum = checksum16(&out);
        out[2..4].copy_from_slice(&csum.to_be_bytes());
        out
    }
}

impl Default for IcmpPacket {
    fn default() -> Self {
        Self::new()
    }
}

/// Assembles a full Ethernet+IPv4+TCP frame in one call, for tests that
/// don't need to inspect intermediate layers.
pub fn create_tcp_packet(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    flags: u8,
    payload: Vec<u8>,
) -> Vec<u8> {
    let tcp = TcpSegment::new()
        .with_src_port(src_port)
        .with_dst_port(dst_port)
        .with_flags(flags)
        .with_payload(payload)
        .build();
    let ip = Ipv4Packet::new()
        .with_src_ip(src_ip)
        .with_dst_ip(dst_ip)
        .with_protocol(IPPROTO_TCP)
        .with_payload(tcp)
        .build();
    EthernetFrame::new().with_payload(ip).build()
}

pub fn create_udp_packet(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: Vec<u8>,
) -> Vec<u8> {
    let udp = UdpDatagram::new()
        .with_src_port(src_port)
        .with_dst_port(dst_port)
        .with_payload(payload)
        .build();
    let ip = Ipv4Packet::new()
        .with_src_ip(src_ip)
        .with_dst_ip(dst_ip)
        .with_protocol(IPPROTO_UDP)
        .with_payload(udp)
        .build();
    EthernetFrame::new().with_payload(ip).build()
}

pub fn create_icmp_packet(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    icmp_type: u8,
    payload: Vec<u8>,
) -> Vec<u8> {
    let icmp = IcmpPacket::new().with_type(icmp_type).with_payload(payload).build();
    let ip = Ipv4Packet::new()
        .with_src_ip(src_ip)
        .with_dst_ip(dst_ip)
        .with_protocol(IPPROTO_ICMP)
        .with_payload(icmp)
        .build();
    EthernetFrame::new().with_payload(ip).build()
}

/// Minimal DNS response payload sized to trigger amplification checks:
/// a fixed 12-byte header followed by `answer_bytes` of padding standing
/// in for RR data. Real content doesn't matter to the size-based check.
pub fn dns_amplification_response(answer_bytes: usize) -> Vec<u8> {
    let mut payload = vec![0u8; 12];
    payload[2] = 0x81; // QR=1, opcode=0
    payload[3] = 0x80;
    payload[7] = 1; // ANCOUNT = 1
    payload.extend(std::iter::repeat(0xAA).take(answer_bytes));
    payload
}

pub fn dns_query(qname: &str) -> Vec<u8> {
    let mut payload = vec![0u8; 12];
    payload[5] = 1; // QDCOUNT = 1
    for label in qname.split('.') {
        payload.push(label.len() as u8);
        payload.extend_from_slice(label.as_bytes());
    }
    payload.push(0);
    payload.extend_from_slice(&[0, 1]); // QTYPE A
    payload.extend_from_slice(&[0, 1]); // QCLASS IN
    payload
}

/// NTP mode-7 (private/monlist) request, the classic amplification vector.
pub fn ntp_monlist_request() -> Vec<u8> {
    let mut payload = vec![0u8; 48];
    payload[0] = 0x17; // mode 7, version 2
    payload
}

pub fn ntp_mode_request(mode: u8) -> Vec<u8> {
    let mut payload = vec![0u8; 48];
    payload[0] = 0x20 | (mode & 0x07); // version 4, given mode
    payload
}

/// SSDP NOTIFY payload, as sent in reflected amplification floods.
pub fn ssdp_notify() -> Vec<u8> {
    b"NOTIFY * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\n\r\n".to_vec()
}

pub fn ssdp_response(extra_bytes: usize) -> Vec<u8> {
    let mut payload = b"HTTP/1.1 200 OK\r\n".to_vec();
    payload.extend(std::iter::repeat(b'X').take(extra_bytes));
    payload
}

/// Memcached "stats" request, always dropped on port 11211 regardless of
/// size per the UDP flood stage's hard deny.
pub fn memcached_stats_request() -> Vec<u8> {
    b"\x00\x00\x00\x00\x00\x01\x00\x00stats\r\n".to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcp_segment_encodes_flags_in_low_bits() {
        let seg = TcpSegment::new().with_flags(TCP_SYN | TCP_ACK).build();
        let doff_flags = u16::from_be_bytes([seg[12], seg[13]]);
        assert_eq!((doff_flags & 0x3f) as u8, TCP_SYN | TCP_ACK);
    }

    #[test]
    fn ipv4_packet_computes_valid_checksum() {
        let tcp = TcpSegment::new().build();
        let ip = Ipv4Packet::new().with_payload(tcp).build();
        assert_eq!(checksum16(&ip[0..IPV4_HDR_LEN]), 0);
    }

    #[test]
    fn create_tcp_packet_lays_out_ethertype_and_protocol() {
        let pkt = create_tcp_packet(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            1234,
            80,
            TCP_SYN,
            vec![],
        );
        assert_eq!(u16::from_be_bytes([pkt[12], pkt[13]]), ETH_TYPE_IPV4);
        assert_eq!(pkt[ETH_HDR_LEN + 9], IPPROTO_TCP);
    }

    #[test]
    fn fragment_flags_occupy_top_bits_of_word() {
        let ip = Ipv4Packet::new().with_fragment(0x01, 100).build();
        let word = u16::from_be_bytes([ip[6], ip[7]]);
        assert_eq!(word >> 13, 0x01);
        assert_eq!(word & 0x1fff, 100);
    }
}
