//! Packetscrub eBPF/XDP shared types
//!
//! This crate provides the single `xdp_scrub` program plus the type and
//! constant definitions needed to keep the data plane and the control plane
//! agreeing on map layouts. Everything here is `no_std` because it is built
//! for the `bpfel-unknown-none` target; userspace re-declares the same
//! layouts independently rather than depending on this crate directly.
//!
//! # Pipeline
//!
//! `xdp_scrub` runs every ingress frame through one ordered chain of stages:
//! parse -> ACL -> threat intel -> GeoIP -> reputation -> fragment check ->
//! signature match -> payload match -> protocol validation -> SYN-flood
//! mitigation -> ACK-flood filter -> UDP flood/amp filter -> ICMP flood
//! filter -> per-source rate limit -> global rate limit -> conntrack update
//! -> stats/event emission. Any stage may terminate the pipeline early with
//! a verdict; conntrack and stats updates still run on the surviving path.

#![no_std]

// ============================================================================
// Verdict / attack / drop-reason codes (ABI, see external interface docs)
// ============================================================================

pub mod verdict {
    pub const PASS: u8 = 0;
    pub const DROP: u8 = 1;
    pub const TRANSMIT: u8 = 2;
    pub const REDIRECT: u8 = 3;
    pub const BYPASS: u8 = 4;
}

/// Attack type codes carried in event records (0..15).
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

/// Drop reason codes (1..20).
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

/// Escalation levels maintained by the control plane.
pub mod escalation {
    pub const LOW: u8 = 0;
    pub const MEDIUM: u8 = 1;
    pub const HIGH: u8 = 2;
    pub const CRITICAL: u8 = 3;
}

/// Country policy action codes.
pub mod country_action {
    pub const PASS: u8 = 0;
    pub const DROP: u8 = 1;
    pub const RATE_LIMIT: u8 = 2;
    pub const MONITOR: u8 = 3;
}

/// Threat-intel action codes (distinct from country policy, per §3).
pub mod threat_action {
    pub const DROP: u8 = 0;
    pub const RATE_LIMIT: u8 = 1;
    pub const MONITOR: u8 = 2;
}

/// Payload/signature rule action codes.
pub mod rule_action {
    pub const DROP: u8 = 0;
    pub const RATE_LIMIT: u8 = 1;
    pub const MONITOR: u8 = 2;
}

/// TCP connection states tracked by conntrack (§3, §4.16).
pub mod tcp_state {
    pub const NEW: u8 = 0;
    pub const SYN_SENT: u8 = 1;
    pub const SYN_RECV: u8 = 2;
    pub const ESTABLISHED: u8 = 3;
    pub const FIN_WAIT: u8 = 4;
    pub const CLOSED: u8 = 5;
    pub const TIME_WAIT: u8 = 6;
    pub const RST: u8 = 7;
}

/// Conntrack entry flag bits.
pub mod conn_flags {
    pub const COOKIE_VERIFIED: u8 = 0x01;
    pub const WHITELISTED: u8 = 0x02;
    pub const SUSPECT: u8 = 0x04;
    pub const REPUTATION_OK: u8 = 0x08;
    pub const GEOIP_CHECKED: u8 = 0x10;
}

/// Reputation entry flag bits.
pub mod reputation_flags {
    pub const BLOCKED: u8 = 0x01;
    pub const MANUAL_BLOCK: u8 = 0x02;
}

/// Reserved configuration-scalar IDs (§3). Anything outside 0..=20 is ignored.
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

// ============================================================================
// Protocol constants
// ============================================================================

pub mod protocol {
    pub mod eth {
        pub const P_IP: u16 = 0x0800;
        pub const P_8021Q: u16 = 0x8100;
        pub const P_8021AD: u16 = 0x88A8;
    }

    pub mod ip {
        pub const PROTO_ICMP: u8 = 1;
        pub const PROTO_TCP: u8 = 6;
        pub const PROTO_UDP: u8 = 17;
    }

    pub mod ports {
        pub const DNS: u16 = 53;
        pub const NTP: u16 = 123;
        pub const SNMP: u16 = 161;
        pub const CLDAP: u16 = 389;
        pub const SSDP: u16 = 1900;
        pub const CHARGEN: u16 = 19;
        pub const MEMCACHED: u16 = 11211;
    }

    pub mod tcp {
        pub const FIN: u16 = 0x01;
        pub const SYN: u16 = 0x02;
        pub const RST: u16 = 0x04;
        pub const PSH: u16 = 0x08;
        pub const ACK: u16 = 0x10;
        pub const URG: u16 = 0x20;
        pub const ECE: u16 = 0x40;
        pub const CWR: u16 = 0x80;
    }

    pub mod icmp {
        pub const ECHO_REPLY: u8 = 0;
        pub const DEST_UNREACHABLE: u8 = 3;
        pub const ECHO_REQUEST: u8 = 8;
        pub const TIME_EXCEEDED: u8 = 11;
    }
}

// ============================================================================
// Bounded loop limits (§5, §9) — enforced both for the kernel verifier and
// for worst-case per-packet latency.
// ============================================================================

pub mod limits {
    pub const MAX_VLAN_TAGS: u32 = 2;
    pub const MAX_SIGNATURES: u32 = 64;
    pub const SIGNATURE_CAPACITY: u32 = 256;
    pub const MAX_PAYLOAD_RULES: u32 = 8;
    pub const PAYLOAD_RULE_CAPACITY: u32 = 512;
    pub const MAX_PAYLOAD_PATTERN_BYTES: usize = 16;
    pub const MAX_REPUTATION_DECAY_TICKS: u64 = 60;
    pub const MAX_CHECKSUM_HALFWORDS: u32 = 10;
    pub const PORT_SCAN_DISTINCT_THRESHOLD: u32 = 20;
    pub const PORT_PROTOCOL_CAPACITY: u32 = 256;
}

/// Bitflags stored per-port in `PORT_PROTOCOL_MAP` (§4.9, §4.12): lets the
/// control plane register UDP ports for reflector/amplification treatment
/// beyond the hardcoded DNS/NTP/SSDP/Memcached/CHARGEN/CLDAP/SNMP constants.
pub mod port_protocol_flags {
    /// Payload over 512 bytes on this port is an amplification response; drop it.
    pub const AMP_SENSITIVE: u8 = 0x01;
    /// Any inbound traffic to this port is an unconditional reflector-service drop.
    pub const REFLECTOR_BLOCK: u8 = 0x02;
}

// ============================================================================
// Map names (stable wire between data plane and control plane, §6)
// ============================================================================

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

// ============================================================================
// SipHash-2-4 (no_std), used for SYN cookie generation (§4.10)
// ============================================================================

/// Minimal SipHash-2-4 over a fixed 16-byte message, matching the cookie
/// input `(src IP, dst IP, src port host-order, dst port host-order)`.
#[inline(always)]
pub fn siphash24(k0: u64, k1: u64, m: u64) -> u64 {
    let mut v0: u64 = 0x736f6d6570736575 ^ k0;
    let mut v1: u64 = 0x646f72616e646f6d ^ k1;
    let mut v2: u64 = 0x6c7967656e657261 ^ k0;
    let mut v3: u64 = 0x7465646279746573 ^ k1;

    macro_rules! sipround {
        () => {
            v0 = v0.wrapping_add(v1);
            v1 = v1.rotate_left(13);
            v1 ^= v0;
            v0 = v0.rotate_left(32);
            v2 = v2.wrapping_add(v3);
            v3 = v3.rotate_left(16);
            v3 ^= v2;
            v0 = v0.wrapping_add(v3);
            v3 = v3.rotate_left(21);
            v3 ^= v0;
            v2 = v2.wrapping_add(v1);
            v1 = v1.rotate_left(17);
            v1 ^= v2;
            v2 = v2.rotate_left(32);
        };
    }

    v3 ^= m;
    sipround!();
    sipround!();
    v0 ^= m;

    // finalization: one message word, length byte folded into v2 as in the
    // reference algorithm's last block (8 bytes of real data, no padding
    // needed since our message is always exactly one 64-bit word).
    v2 ^= 0xff;
    sipround!();
    sipround!();
    sipround!();
    sipround!();

    v0 ^ v1 ^ v2 ^ v3
}

/// Encode the SYN-cookie input word: `(src_ip, dst_ip, src_port, dst_port)`
/// packed the way §4.10 implies (host-order ports, one combined 64-bit word
/// built from the lower-order halves of the addresses and full port pair).
#[inline(always)]
pub fn syn_cookie_message(src_ip: u32, dst_ip: u32, src_port: u16, dst_port: u16) -> u64 {
    let addr_mix = (src_ip as u64) ^ ((dst_ip as u64).rotate_left(16));
    let port_mix = ((src_port as u64) << 16) | dst_port as u64;
    addr_mix ^ (port_mix << 32) ^ port_mix
}

/// MSS table indexed by a 2-bit cookie field (§4.10).
pub const MSS_TABLE: [u16; 4] = [256, 536, 1220, 1460];

#[inline(always)]
pub fn mss_index(mss: u16) -> u32 {
    match mss {
        m if m >= 1460 => 3,
        m if m >= 1220 => 2,
        m if m >= 536 => 1,
        _ => 0,
    }
}

#[inline(always)]
pub fn mss_for_index(index: u32) -> u16 {
    MSS_TABLE[(index & 0x03) as usize]
}

/// Encode a SYN cookie from a SipHash output and an MSS index: low 2 bits
/// carry the MSS index, the remaining 30 bits carry `hash >> 2`.
#[inline(always)]
pub fn encode_cookie(hash: u64, mss_idx: u32) -> u32 {
    (((hash >> 2) as u32) << 2) | (mss_idx & 0x03)
}

#[inline(always)]
pub fn cookie_mss_index(cookie: u32) -> u32 {
    cookie & 0x03
}

// ============================================================================
// Symmetric 5-tuple hashing, used for conntrack/rate-limit map keys that
// want a single direction-independent bucket.
// ============================================================================

#[inline(always)]
pub fn hash_5tuple(src_ip: u32, dst_ip: u32, src_port: u16, dst_port: u16, proto: u8) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    hash ^= src_ip as u64;
    hash = hash.wrapping_mul(0x100000001b3);
    hash ^= dst_ip as u64;
    hash = hash.wrapping_mul(0x100000001b3);
    hash ^= ((src_port as u64) << 16) | dst_port as u64;
    hash = hash.wrapping_mul(0x100000001b3);
    hash ^= proto as u64;
    hash = hash.wrapping_mul(0x100000001b3);
    hash
}

// ============================================================================
// IPv4 checksum fold (§9: bounded to 10 halfwords)
// ============================================================================

/// One's-complement checksum fold over an IPv4 header's 10 halfwords. The
/// caller is expected to have zeroed the checksum field before summing.
#[inline(always)]
pub fn ipv4_checksum(halfwords: &[u16; 10]) -> u16 {
    let mut sum: u32 = 0;
    let mut i = 0;
    while i < crate::limits::MAX_CHECKSUM_HALFWORDS as usize {
        sum += halfwords[i] as u32;
        i += 1;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

// ============================================================================
// Repr(C) map value layouts — byte-exact with §3/§6.
// ============================================================================

/// Blacklist LPM value: drop-reason code.
pub type BlacklistValue = u32;

/// Whitelist LPM value: presence flag (always 1).
pub type WhitelistValue = u32;

/// GeoIP LPM value (4 bytes): country code (`byte0<<8 | byte1`), action, pad.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct GeoipEntry {
    pub country: u16,
    pub action: u8,
    pub _pad: u8,
}

/// Threat-intel LPM value (8 bytes).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ThreatIntelEntry {
    pub feed_source: u8,
    pub threat_type: u8,
    pub confidence: u8,
    pub action: u8,
    pub last_update: u32,
}

/// Per-CPU token-bucket rate limiter (48 bytes).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TokenBucket {
    pub tokens: u64,
    pub last_refill_ns: u64,
    pub refill_rate: u64,
    pub burst_size: u64,
    pub total_packets: u64,
    pub dropped_packets: u64,
}

/// Conntrack entry (36 bytes, per §3).
#[repr(C)]
#[derive(Clone, Copy)]
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

/// Reputation entry (48 bytes).
#[repr(C)]
#[derive(Clone, Copy)]
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

/// Port-scan tracker entry (24 bytes).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PortScanEntry {
    pub window_start_ns: u64,
    pub distinct_ports: u32,
    pub _pad: u32,
    pub port_bitmap: u64,
}

/// SYN-cookie context (singleton).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SynCookieContext {
    pub current_seed: u32,
    pub previous_seed: u32,
    pub last_rotation_ns: u64,
}

/// Attack signature record (24 bytes).
#[repr(C)]
#[derive(Clone, Copy)]
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

/// Payload match rule (48 bytes).
#[repr(C)]
#[derive(Clone, Copy)]
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

/// Per-CPU statistics block (~35 u64 counters).
#[repr(C)]
#[derive(Clone, Copy, Default)]
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

/// Event ring-buffer record (§6), `repr(C)` and byte-exact.
#[repr(C)]
#[derive(Clone, Copy)]
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
