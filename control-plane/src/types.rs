//! Userspace mirrors of the data plane's map value types.
//!
//! These must stay byte-for-byte layout compatible with their `#[repr(C)]`
//! counterparts in `packetscrub-ebpf`. The control plane does not depend on
//! that crate directly (it is `no_std` and pulls in `aya-ebpf`, which this
//! binary has no business linking); instead the layouts are duplicated here,
//! the way a userspace loader duplicates kernel ABI structs. Keep these in
//! sync with `ebpf/src/lib.rs` by hand.

use serde::{Deserialize, Serialize};

pub mod verdict {
    pub const PASS: u8 = 0;
    pub const DROP: u8 = 1;
    pub const TRANSMIT: u8 = 2;
    pub const REDIRECT: u8 = 3;
    pub const BYPASS: u8 = 4;
}

pub mod attack_type {
    pub const NONE: u8 = 0;
    pub const ACL: u8 = 1;
    pub const THREAT_INTEL: u8 = 2;
    pub const GEOIP: u8 = 3;
    pub const REPUTATION: u8 = 4;
    pub const FRAGMENT: u8 = 5;
    pub const SIGNATURE: u8 = 6;
    pub const PAYLOAD: u8 = 7;
    pub const PROTOCOL_VIOLATION: u8 = 8;
    pub const SYN_FLOOD: u8 = 9;
    pub const ACK_FLOOD: u8 = 10;
    pub const UDP_AMPLIFICATION: u8 = 11;
    pub const ICMP_FLOOD: u8 = 12;
    pub const RATE_LIMIT: u8 = 13;
    pub const GLOBAL_RATE_LIMIT: u8 = 14;
    pub const PORT_SCAN: u8 = 15;
}

pub mod drop_reason {
    pub const NONE: u8 = 0;
    pub const ACL_BLACKLIST: u8 = 1;
    pub const THREAT_INTEL_CONFIDENCE: u8 = 2;
    pub const GEOIP_COUNTRY_POLICY: u8 = 3;
    pub const GEOIP_ESCALATION: u8 = 4;
    pub const REPUTATION_BLOCKED: u8 = 5;
    pub const FRAGMENT_DISALLOWED: u8 = 6;
    pub const SIGNATURE_MATCH: u8 = 7;
    pub const PAYLOAD_RULE: u8 = 8;
    pub const TCP_STATE_VIOLATION: u8 = 9;
    pub const DNS_VALIDATION: u8 = 10;
    pub const NTP_VALIDATION: u8 = 11;
    pub const SSDP_REFLECTION: u8 = 12;
    pub const MEMCACHED_REFLECTION: u8 = 13;
    pub const SYN_COOKIE_INVALID: u8 = 14;
    pub const ACK_NO_CONNTRACK: u8 = 15;
    pub const UDP_AMPLIFICATION_SIZE: u8 = 16;
    pub const ICMP_TYPE_OR_SIZE: u8 = 17;
    pub const SOURCE_RATE_LIMIT: u8 = 18;
    pub const GLOBAL_RATE_LIMIT: u8 = 19;
    pub const PARSE_ERROR: u8 = 20;
}

pub mod escalation {
    pub const LOW: u8 = 0;
    pub const MEDIUM: u8 = 1;
    pub const HIGH: u8 = 2;
    pub const CRITICAL: u8 = 3;
}

pub mod country_action {
    pub const PASS: u8 = 0;
    pub const DROP: u8 = 1;
    pub const RATE_LIMIT: u8 = 2;
    pub const MONITOR: u8 = 3;
}

pub mod reputation_flags {
    pub const BLOCKED: u8 = 0x01;
    pub const MANUAL_BLOCK: u8 = 0x02;
}

/// Mirrors `packetscrub_ebpf::port_protocol_flags`: bits stored per-port in
/// `PORT_PROTOCOL_MAP` letting the control plane register UDP ports for
/// reflector/amplification treatment beyond the hardcoded port constants.
pub mod port_protocol_flags {
    pub const AMP_SENSITIVE: u8 = 0x01;
    pub const REFLECTOR_BLOCK: u8 = 0x02;
}

pub mod limits {
    pub const MAX_VLAN_TAGS: u32 = 2;
    pub const MAX_SIGNATURES: u32 = 64;
    pub const SIGNATURE_CAPACITY: u32 = 256;
    pub const MAX_PAYLOAD_RULES: u32 = 8;
    pub const PAYLOAD_RULE_CAPACITY: u32 = 512;
    pub const MAX_PAYLOAD_PATTERN_BYTES: usize = 16;
    pub const MAX_REPUTATION_DECAY_TICKS: u64 = 60;
    pub const PORT_SCAN_DISTINCT_THRESHOLD: u32 = 20;
    pub const PORT_PROTOCOL_CAPACITY: u32 = 256;
}

pub mod config_id {
    pub const ENABLED: u32 = 0;
    pub const TCP_PPS_LIMIT: u32 = 1;
    pub const UDP_PPS_LIMIT: u32 = 2;
    pub const ICMP_PPS_LIMIT: u32 = 3;
    pub const GLOBAL_PPS_LIMIT: u32 = 4;
    pub const GLOBAL_BPS_LIMIT: u32 = 5;
    pub const SYN_COOKIE_ENABLE: u32 = 6;
    pub const CONNTRACK_ENABLE: u32 = 7;
    pub const LEARNED_BASELINE_PPS: u32 = 8;
    pub const ATTACK_THRESHOLD_MULTIPLIER_X100: u32 = 9;
    pub const GEOIP_ENABLE: u32 = 10;
    pub const REPUTATION_ENABLE: u32 = 11;
    pub const PROTO_VALIDATION_ENABLE: u32 = 12;
    pub const PAYLOAD_MATCH_ENABLE: u32 = 13;
    pub const THREAT_INTEL_ENABLE: u32 = 14;
    pub const TCP_STATE_ENABLE: u32 = 15;
    pub const ADAPTIVE_RATE_ENABLE: u32 = 16;
    pub const ESCALATION_LEVEL: u32 = 17;
    pub const REPUTATION_SCORE_THRESHOLD: u32 = 18;
    pub const DNS_VALIDATION_MODE: u32 = 19;
    pub const MAX: u32 = 20;
    pub const SLOT_COUNT: u32 = 64;
}

pub mod map_names {
    pub const CONFIG: &str = "CONFIG";
    pub const WHITELIST_V4: &str = "WHITELIST_V4";
    pub const BLACKLIST_V4: &str = "BLACKLIST_V4";
    pub const THREAT_INTEL_MAP: &str = "THREAT_INTEL_MAP";
    pub const GEOIP_MAP: &str = "GEOIP_MAP";
    pub const COUNTRY_POLICY: &str = "COUNTRY_POLICY";
    pub const RATE_LIMIT_MAP: &str = "RATE_LIMIT_MAP";
    pub const ADAPTIVE_OVERRIDE: &str = "ADAPTIVE_OVERRIDE";
    pub const GLOBAL_RATE_MAP: &str = "GLOBAL_RATE_MAP";
    pub const CONNTRACK_MAP: &str = "CONNTRACK_MAP";
    pub const REPUTATION_MAP: &str = "REPUTATION_MAP";
    pub const PORT_SCAN_MAP: &str = "PORT_SCAN_MAP";
    pub const SYN_COOKIE_MAP: &str = "SYN_COOKIE_MAP";
    pub const ATTACK_SIG_MAP: &str = "ATTACK_SIG_MAP";
    pub const ATTACK_SIG_COUNT: &str = "ATTACK_SIG_COUNT";
    pub const PAYLOAD_RULES: &str = "PAYLOAD_RULES";
    pub const PAYLOAD_RULE_COUNT: &str = "PAYLOAD_RULE_COUNT";
    pub const STATS_MAP: &str = "STATS_MAP";
    pub const EVENTS: &str = "EVENTS";
    pub const PORT_PROTOCOL_MAP: &str = "PORT_PROTOCOL_MAP";
}

/// Blacklist LPM value: a drop-reason code.
pub type BlacklistValue = u32;

/// Whitelist LPM value: presence flag, always 1.
pub type WhitelistValue = u32;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GeoipEntry {
    pub country: u16,
    pub action: u8,
    pub _pad: u8,
}

unsafe impl aya::Pod for GeoipEntry {}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ThreatIntelEntry {
    pub feed_source: u8,
    pub threat_type: u8,
    pub confidence: u8,
    pub action: u8,
    pub last_update: u32,
}

unsafe impl aya::Pod for ThreatIntelEntry {}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TokenBucket {
    pub tokens: u64,
    pub last_refill_ns: u64,
    pub refill_rate: u64,
    pub burst_size: u64,
    pub total_packets: u64,
    pub dropped_packets: u64,
}

unsafe impl aya::Pod for TokenBucket {}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ConntrackEntry {
    pub last_seen_ns: u64,
    pub fwd_packets: u32,
    pub fwd_bytes: u32,
    pub rev_packets: u32,
    pub rev_bytes: u32,
    pub expected_seq: u32,
    pub state: u8,
    pub flags: u8,
    pub window_scale: u8,
    pub violations: u8,
}

unsafe impl aya::Pod for ConntrackEntry {}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ReputationEntry {
    pub score: u32,
    pub total_packets: u64,
    pub dropped_packets: u64,
    pub violations: u32,
    pub first_seen_ns: u64,
    pub last_seen_ns: u64,
    pub last_decay_ns: u64,
    pub distinct_ports: u32,
    pub flags: u8,
    pub _pad: [u8; 3],
}

unsafe impl aya::Pod for ReputationEntry {}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PortScanEntry {
    pub window_start_ns: u64,
    pub distinct_ports: u32,
    pub _pad: u32,
    pub port_bitmap: u64,
}

unsafe impl aya::Pod for PortScanEntry {}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SynCookieContext {
    pub current_seed: u32,
    pub previous_seed: u32,
    pub last_rotation_ns: u64,
}

unsafe impl aya::Pod for SynCookieContext {}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SignatureRule {
    pub protocol: u8,
    pub tcp_flag_mask: u8,
    pub tcp_flag_match: u8,
    pub _pad0: u8,
    pub src_port_min: u16,
    pub src_port_max: u16,
    pub dst_port_min: u16,
    pub dst_port_max: u16,
    pub len_min: u16,
    pub len_max: u16,
    pub payload_hash: u32,
    pub has_payload_hash: u8,
    pub _pad1: [u8; 3],
}

unsafe impl aya::Pod for SignatureRule {}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PayloadRule {
    pub pattern: [u8; 16],
    pub mask: [u8; 16],
    pub pattern_len: u8,
    pub protocol: u8,
    pub action: u8,
    pub _pad0: u8,
    pub offset: u16,
    pub dst_port: u16,
    pub hit_count: u64,
}

unsafe impl aya::Pod for PayloadRule {}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub dropped_packets: u64,
    pub dropped_bytes: u64,
    pub acl_dropped: u64,
    pub threat_intel_dropped: u64,
    pub geoip_dropped: u64,
    pub reputation_dropped: u64,
    pub fragment_dropped: u64,
    pub signature_dropped: u64,
    pub payload_dropped: u64,
    pub proto_violation_dropped: u64,
    pub tcp_state_dropped: u64,
    pub dns_amp_dropped: u64,
    pub ntp_monlist_blocked: u64,
    pub ssdp_reflection_dropped: u64,
    pub memcached_dropped: u64,
    pub syn_cookies_issued: u64,
    pub syn_cookies_validated: u64,
    pub syn_cookies_failed: u64,
    pub ack_flood_dropped: u64,
    pub udp_amp_dropped: u64,
    pub icmp_dropped: u64,
    pub rate_limited: u64,
    pub global_rate_limited: u64,
    pub port_scan_detected: u64,
    pub conntrack_created: u64,
    pub conntrack_updated: u64,
}

unsafe impl aya::Pod for Stats {}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EventRecord {
    pub timestamp_ns: u64,
    pub src_ip: u32,
    pub dst_ip: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    pub attack_type: u8,
    pub action: u8,
    pub drop_reason: u8,
    pub pps: u64,
    pub bps: u64,
    pub reputation_score: u32,
    pub country: u16,
    pub escalation: u8,
    pub _pad: u8,
}

unsafe impl aya::Pod for EventRecord {}

/// Userspace-friendly aggregate view of [`Stats`], the fields the control
/// surface actually exposes over the wire (the rest stay internal
/// diagnostics, read back through `read_stats_detailed` if ever needed).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub dropped_packets: u64,
    pub dropped_bytes: u64,
    pub rate_limited: u64,
    pub global_rate_limited: u64,
    pub port_scan_detected: u64,
    pub syn_cookies_issued: u64,
}

impl From<Stats> for StatsSnapshot {
    fn from(s: Stats) -> Self {
        Self {
            rx_packets: s.rx_packets,
            rx_bytes: s.rx_bytes,
            tx_packets: s.tx_packets,
            tx_bytes: s.tx_bytes,
            dropped_packets: s.dropped_packets,
            dropped_bytes: s.dropped_bytes,
            rate_limited: s.rate_limited,
            global_rate_limited: s.global_rate_limited,
            port_scan_detected: s.port_scan_detected,
            syn_cookies_issued: s.syn_cookies_issued,
        }
    }
}

impl std::ops::Add for StatsSnapshot {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            rx_packets: self.rx_packets + rhs.rx_packets,
            rx_bytes: self.rx_bytes + rhs.rx_bytes,
            tx_packets: self.tx_packets + rhs.tx_packets,
            tx_bytes: self.tx_bytes + rhs.tx_bytes,
            dropped_packets: self.dropped_packets + rhs.dropped_packets,
            dropped_bytes: self.dropped_bytes + rhs.dropped_bytes,
            rate_limited: self.rate_limited + rhs.rate_limited,
            global_rate_limited: self.global_rate_limited + rhs.global_rate_limited,
            port_scan_detected: self.port_scan_detected + rhs.port_scan_detected,
            syn_cookies_issued: self.syn_cookies_issued + rhs.syn_cookies_issued,
        }
    }
}

/// A drained ring buffer event, with `src_ip`/`dst_ip` rendered as
/// `Ipv4Addr` for the control surface's JSON/logging output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrubEvent {
    pub timestamp_ns: u64,
    pub src_ip: std::net::Ipv4Addr,
    pub dst_ip: std::net::Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    pub attack_type: u8,
    pub action: u8,
    pub drop_reason: u8,
    pub pps: u64,
    pub bps: u64,
    pub reputation_score: u32,
    pub country: u16,
    pub escalation: u8,
}

impl From<EventRecord> for ScrubEvent {
    fn from(e: EventRecord) -> Self {
        Self {
            timestamp_ns: e.timestamp_ns,
            src_ip: std::net::Ipv4Addr::from(e.src_ip.to_be_bytes()),
            dst_ip: std::net::Ipv4Addr::from(e.dst_ip.to_be_bytes()),
            src_port: e.src_port,
            dst_port: e.dst_port,
            protocol: e.protocol,
            attack_type: e.attack_type,
            action: e.action,
            drop_reason: e.drop_reason,
            pps: e.pps,
            bps: e.bps,
            reputation_score: e.reputation_score,
            country: e.country,
            escalation: e.escalation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_snapshot_sums_fieldwise() {
        use pretty_assertions::assert_eq;

        let a = StatsSnapshot { rx_packets: 10, ..Default::default() };
        let b = StatsSnapshot { rx_packets: 5, dropped_packets: 2, ..Default::default() };
        let sum = a + b;
        let expected = StatsSnapshot { rx_packets: 15, dropped_packets: 2, ..Default::default() };
        assert_eq!(sum, expected);
    }

    #[test]
    fn event_record_converts_ip_to_network_order() {
        let rec = EventRecord {
            timestamp_ns: 0,
            src_ip: u32::from_be_bytes([10, 0, 0, 1]),
            dst_ip: 0,
            src_port: 0,
            dst_port: 0,
            protocol: 0,
            attack_type: 0,
            action: 0,
            drop_reason: 0,
            pps: 0,
            bps: 0,
            reputation_score: 0,
            country: 0,
            escalation: 0,
            _pad: 0,
        };
        let ev: ScrubEvent = rec.into();
        assert_eq!(ev.src_ip, std::net::Ipv4Addr::new(10, 0, 0, 1));
    }
}
