//! XDP IPv4 scrubbing pipeline
//!
//! A single `#[xdp]` entry point runs every ingress frame through the
//! ordered mitigation chain: parse, ACL, threat intel, GeoIP, reputation,
//! fragment check, signature match, payload match, protocol validation,
//! SYN-flood mitigation, ACK-flood filter, UDP flood/amplification filter,
//! ICMP flood filter, per-source rate limit, global rate limit, conntrack
//! update, stats/event emission. Any stage may return early with a verdict;
//! conntrack and stats updates still run on the surviving path.

#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::xdp_action,
    macros::{map, xdp},
    maps::{lpm_trie::Key as LpmKey, Array, HashMap, LpmTrie, LruHashMap, PerCpuArray, RingBuf},
    programs::XdpContext,
};
use core::mem;

use packetscrub_ebpf::*;

// ============================================================================
// Network header structures
// ============================================================================

#[repr(C)]
struct EthHdr {
    h_dest: [u8; 6],
    h_source: [u8; 6],
    h_proto: u16,
}

#[repr(C)]
struct VlanHdr {
    tci: u16,
    proto: u16,
}

#[repr(C)]
struct Ipv4Hdr {
    version_ihl: u8,
    tos: u8,
    tot_len: u16,
    id: u16,
    frag_off: u16,
    ttl: u8,
    protocol: u8,
    check: u16,
    saddr: u32,
    daddr: u32,
}

#[repr(C)]
struct TcpHdr {
    source: u16,
    dest: u16,
    seq: u32,
    ack_seq: u32,
    doff_flags: u16,
    window: u16,
    check: u16,
    urg_ptr: u16,
}

#[repr(C)]
struct UdpHdr {
    source: u16,
    dest: u16,
    len: u16,
    check: u16,
}

#[repr(C)]
struct IcmpHdr {
    icmp_type: u8,
    code: u8,
    checksum: u16,
    rest: u32,
}

const IP_MF: u16 = 0x2000;
const IP_OFFMASK: u16 = 0x1fff;

// ============================================================================
// Packet context (§3) — stack-local, built once by the parser.
// ============================================================================

#[derive(Clone, Copy)]
struct PacketCtx {
    data: usize,
    data_end: usize,
    eth_offset: usize,
    ip_offset: usize,
    l4_offset: usize,
    l3_proto: u8,
    src_ip: u32,
    dst_ip: u32,
    ip_total_len: u16,
    ttl: u8,
    fragmented: bool,
    frag_offset_nonzero: bool,
    src_port: u16,
    dst_port: u16,
    tcp_flags: u16,
    tcp_seq: u32,
    tcp_ack: u32,
    l4_payload_offset: usize,
    l4_payload_len: u16,
    first4: u32,
    has_first4: bool,
    pkt_len: u16,
}

// ============================================================================
// Maps (§6) — names kept byte-identical to the control plane's expectations.
// ============================================================================

#[map]
static CONFIG: Array<u64> = Array::with_max_entries(config_id::SLOT_COUNT, 0);

#[map]
static WHITELIST_V4: LpmTrie<u32, WhitelistValue> = LpmTrie::with_max_entries(1_000_000, 0);

#[map]
static BLACKLIST_V4: LpmTrie<u32, BlacklistValue> = LpmTrie::with_max_entries(1_000_000, 0);

#[map]
static THREAT_INTEL_MAP: LpmTrie<u32, ThreatIntelEntry> = LpmTrie::with_max_entries(500_000, 0);

#[map]
static GEOIP_MAP: LpmTrie<u32, GeoipEntry> = LpmTrie::with_max_entries(1_000_000, 0);

#[map]
static COUNTRY_POLICY: HashMap<u16, u8> = HashMap::with_max_entries(300, 0);

#[map]
static RATE_LIMIT_MAP: LruHashMap<u32, TokenBucket> = LruHashMap::with_max_entries(2_000_000, 0);

#[map]
static ADAPTIVE_OVERRIDE: HashMap<u32, u64> = HashMap::with_max_entries(1_000_000, 0);

#[map]
static GLOBAL_RATE_MAP: PerCpuArray<TokenBucket> = PerCpuArray::with_max_entries(2, 0);

#[map]
static CONNTRACK_MAP: LruHashMap<u64, ConntrackEntry> = LruHashMap::with_max_entries(2_000_000, 0);

#[map]
static REPUTATION_MAP: LruHashMap<u32, ReputationEntry> = LruHashMap::with_max_entries(1_000_000, 0);

#[map]
static PORT_SCAN_MAP: LruHashMap<u32, PortScanEntry> = LruHashMap::with_max_entries(1_000_000, 0);

#[map]
static SYN_COOKIE_MAP: Array<SynCookieContext> = Array::with_max_entries(1, 0);

#[map]
static ATTACK_SIG_MAP: Array<SignatureRule> = Array::with_max_entries(limits::SIGNATURE_CAPACITY, 0);

#[map]
static ATTACK_SIG_COUNT: Array<u32> = Array::with_max_entries(1, 0);

#[map]
static PAYLOAD_RULES: Array<PayloadRule> = Array::with_max_entries(limits::PAYLOAD_RULE_CAPACITY, 0);

#[map]
static PAYLOAD_RULE_COUNT: Array<u32> = Array::with_max_entries(1, 0);

#[map]
static STATS_MAP: PerCpuArray<Stats> = PerCpuArray::with_max_entries(1, 0);

#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(16 * 1024 * 1024, 0);

/// Control-plane-registered UDP ports, keyed by port number, value a
/// `port_protocol_flags` bitmask. Extends C9/C12 beyond the hardcoded
/// DNS/NTP/SSDP/Memcached/CHARGEN/CLDAP/SNMP constants.
#[map]
static PORT_PROTOCOL_MAP: HashMap<u16, u8> = HashMap::with_max_entries(limits::PORT_PROTOCOL_CAPACITY, 0);

// SipHash fixed k1 constant (§4.10): arbitrary, stable within a build.
const SIPHASH_K1: u64 = 0x646f73656e697473;

// ============================================================================
// Entry point
// ============================================================================

#[xdp]
pub fn xdp_scrub(ctx: XdpContext) -> u32 {
    match try_xdp_scrub(ctx) {
        Ok(ret) => ret,
        Err(_) => xdp_action::XDP_PASS,
    }
}

#[inline(always)]
fn cfg(id: u32, default: u64) -> u64 {
    unsafe { CONFIG.get(id) }.copied().unwrap_or(default)
}

#[inline(always)]
fn now_ns() -> u64 {
    unsafe { aya_ebpf::helpers::bpf_ktime_get_ns() }
}

#[inline(always)]
fn try_xdp_scrub(ctx: XdpContext) -> Result<u32, ()> {
    if cfg(config_id::ENABLED, 1) == 0 {
        return Ok(xdp_action::XDP_PASS);
    }

    stats_rx(&ctx);

    let pkt = match parse_packet(&ctx) {
        Some(p) => p,
        None => {
            stats_drop(&ctx);
            emit_event(&pkt_zero(&ctx), attack_type::NONE, verdict::DROP, drop_reason::PARSE_ERROR, 0, 0);
            return Ok(xdp_action::XDP_DROP);
        }
    };

    if let Some(v) = stage_acl(&pkt) {
        return finish(&pkt, v);
    }
    if let Some(v) = stage_threat_intel(&pkt) {
        return finish(&pkt, v);
    }
    if let Some(v) = stage_geoip(&pkt) {
        return finish(&pkt, v);
    }
    if let Some(v) = stage_reputation(&pkt) {
        return finish(&pkt, v);
    }
    if let Some(v) = stage_fragment(&pkt) {
        return finish(&pkt, v);
    }
    if let Some(v) = stage_signature(&pkt) {
        return finish(&pkt, v);
    }
    if let Some(v) = stage_payload(&pkt) {
        return finish(&pkt, v);
    }
    if let Some(v) = stage_protocol_validator(&pkt) {
        return finish(&pkt, v);
    }
    if let Some(v) = stage_syn_flood(&ctx, &pkt) {
        return finish(&pkt, v);
    }
    if let Some(v) = stage_ack_flood(&pkt) {
        return finish(&pkt, v);
    }
    if let Some(v) = stage_udp_flood(&pkt) {
        return finish(&pkt, v);
    }
    if let Some(v) = stage_icmp_flood(&pkt) {
        return finish(&pkt, v);
    }
    if let Some(v) = stage_rate_limit(&pkt) {
        return finish(&pkt, v);
    }
    if let Some(v) = stage_global_rate_limit(&pkt) {
        return finish(&pkt, v);
    }

    stage_conntrack(&pkt);
    stats_tx(&ctx);
    Ok(xdp_action::XDP_PASS)
}

#[inline(always)]
fn finish(pkt: &PacketCtx, verdict_action: u32) -> Result<u32, ()> {
    if verdict_action == xdp_action::XDP_PASS || verdict_action == xdp_action::XDP_TX {
        stage_conntrack(pkt);
    }
    Ok(verdict_action)
}

fn pkt_zero(ctx: &XdpContext) -> PacketCtx {
    PacketCtx {
        data: ctx.data(),
        data_end: ctx.data_end(),
        eth_offset: 0,
        ip_offset: 0,
        l4_offset: 0,
        l3_proto: 0,
        src_ip: 0,
        dst_ip: 0,
        ip_total_len: 0,
        ttl: 0,
        fragmented: false,
        frag_offset_nonzero: false,
        src_port: 0,
        dst_port: 0,
        tcp_flags: 0,
        tcp_seq: 0,
        tcp_ack: 0,
        l4_payload_offset: 0,
        l4_payload_len: 0,
        first4: 0,
        has_first4: false,
        pkt_len: 0,
    }
}

// ============================================================================
// C1 — packet parser
// ============================================================================

#[inline(always)]
fn parse_packet(ctx: &XdpContext) -> Option<PacketCtx> {
    let data = ctx.data();
    let data_end = ctx.data_end();
    let pkt_len = data_end.saturating_sub(data) as u16;

    if data + mem::size_of::<EthHdr>() > data_end {
        return None;
    }
    let eth = unsafe { &*(data as *const EthHdr) };
    let mut proto = u16::from_be(eth.h_proto);
    let mut off = data + mem::size_of::<EthHdr>();

    let mut vlan_tags = 0u32;
    while (proto == protocol::eth::P_8021Q || proto == protocol::eth::P_8021AD)
        && vlan_tags < limits::MAX_VLAN_TAGS
    {
        if off + mem::size_of::<VlanHdr>() > data_end {
            return None;
        }
        let vlan = unsafe { &*(off as *const VlanHdr) };
        proto = u16::from_be(vlan.proto);
        off += mem::size_of::<VlanHdr>();
        vlan_tags += 1;
    }

    if proto != protocol::eth::P_IP {
        return None;
    }

    if off + mem::size_of::<Ipv4Hdr>() > data_end {
        return None;
    }
    let ip = unsafe { &*(off as *const Ipv4Hdr) };
    let ihl = (ip.version_ihl & 0x0f) as usize;
    if ihl < 5 {
        return None;
    }
    let ip_hdr_len = ihl * 4;
    if off + ip_hdr_len > data_end {
        return None;
    }

    let frag_off = u16::from_be(ip.frag_off);
    let fragmented = (frag_off & IP_MF) != 0 || (frag_off & IP_OFFMASK) != 0;
    let frag_offset_nonzero = (frag_off & IP_OFFMASK) != 0;

    let mut pkt = PacketCtx {
        data,
        data_end,
        eth_offset: data,
        ip_offset: off,
        l4_offset: 0,
        l3_proto: ip.protocol,
        src_ip: u32::from_be(ip.saddr),
        dst_ip: u32::from_be(ip.daddr),
        ip_total_len: u16::from_be(ip.tot_len),
        ttl: ip.ttl,
        fragmented,
        frag_offset_nonzero,
        src_port: 0,
        dst_port: 0,
        tcp_flags: 0,
        tcp_seq: 0,
        tcp_ack: 0,
        l4_payload_offset: 0,
        l4_payload_len: 0,
        first4: 0,
        has_first4: false,
        pkt_len,
    };

    let l4_off = off + ip_hdr_len;
    pkt.l4_offset = l4_off;

    if fragmented && frag_offset_nonzero {
        // non-first fragment: no L4 header to parse
        return Some(pkt);
    }

    let l4_total = (pkt.ip_total_len as usize).saturating_sub(ip_hdr_len);

    match ip.protocol {
        p if p == protocol::ip::PROTO_TCP => {
            if l4_off + mem::size_of::<TcpHdr>() > data_end {
                return None;
            }
            let tcp = unsafe { &*(l4_off as *const TcpHdr) };
            let doff_flags = u16::from_be(tcp.doff_flags);
            let data_offset = (doff_flags >> 12) & 0x0f;
            if data_offset < 5 {
                return None;
            }
            pkt.src_port = u16::from_be(tcp.source);
            pkt.dst_port = u16::from_be(tcp.dest);
            pkt.tcp_flags = doff_flags & 0x01ff;
            pkt.tcp_seq = u32::from_be(tcp.seq);
            pkt.tcp_ack = u32::from_be(tcp.ack_seq);
            let tcp_hdr_len = (data_offset as usize) * 4;
            pkt.l4_payload_offset = l4_off + tcp_hdr_len;
            pkt.l4_payload_len = l4_total.saturating_sub(tcp_hdr_len) as u16;
        }
        p if p == protocol::ip::PROTO_UDP => {
            if l4_off + mem::size_of::<UdpHdr>() > data_end {
                return None;
            }
            let udp = unsafe { &*(l4_off as *const UdpHdr) };
            pkt.src_port = u16::from_be(udp.source);
            pkt.dst_port = u16::from_be(udp.dest);
            pkt.l4_payload_offset = l4_off + mem::size_of::<UdpHdr>();
            pkt.l4_payload_len = l4_total.saturating_sub(mem::size_of::<UdpHdr>()) as u16;
        }
        p if p == protocol::ip::PROTO_ICMP => {
            if l4_off + mem::size_of::<IcmpHdr>() > data_end {
                return None;
            }
            let icmp = unsafe { &*(l4_off as *const IcmpHdr) };
            pkt.src_port = 0;
            pkt.dst_port = icmp.icmp_type as u16;
            pkt.l4_payload_offset = l4_off + mem::size_of::<IcmpHdr>();
            pkt.l4_payload_len = l4_total.saturating_sub(mem::size_of::<IcmpHdr>()) as u16;
        }
        _ => {
            pkt.l4_payload_offset = l4_off;
            pkt.l4_payload_len = l4_total as u16;
            return Some(pkt);
        }
    }

    if pkt.l4_payload_offset + 4 <= data_end {
        let p = pkt.l4_payload_offset;
        let b = unsafe { core::slice::from_raw_parts(p as *const u8, 4) };
        pkt.first4 = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
        pkt.has_first4 = true;
    }

    Some(pkt)
}

// ============================================================================
// C2 — ACL
// ============================================================================

#[inline(always)]
fn lpm_key(addr: u32) -> LpmKey<u32> {
    LpmKey::new(32, addr.to_be())
}

#[inline(always)]
fn stage_acl(pkt: &PacketCtx) -> Option<u32> {
    let lk = lpm_key(pkt.src_ip);
    if unsafe { WHITELIST_V4.get(&lk) }.is_some() {
        return Some(xdp_action::XDP_PASS);
    }
    if let Some(reason) = unsafe { BLACKLIST_V4.get(&lk) } {
        bump(|s| s.acl_dropped += 1);
        emit_event(pkt, attack_type::ACL, verdict::DROP, *reason as u8, 0, 0);
        return Some(xdp_action::XDP_DROP);
    }
    None
}

// ============================================================================
// C3 — threat intel
// ============================================================================

#[inline(always)]
fn escalation_level() -> u8 {
    cfg(config_id::ESCALATION_LEVEL, escalation::LOW as u64) as u8
}

#[inline(always)]
fn stage_threat_intel(pkt: &PacketCtx) -> Option<u32> {
    if cfg(config_id::THREAT_INTEL_ENABLE, 1) == 0 {
        return None;
    }
    let lk = lpm_key(pkt.src_ip);
    let entry = unsafe { THREAT_INTEL_MAP.get(&lk) }?;

    let (drop_thresh, rl_thresh) = match escalation_level() {
        e if e == escalation::CRITICAL => (30u8, 10u8),
        e if e == escalation::HIGH => (50u8, 30u8),
        _ => (80u8, 50u8),
    };

    if entry.action == threat_action::DROP && entry.confidence >= drop_thresh {
        bump(|s| s.threat_intel_dropped += 1);
        emit_event(pkt, attack_type::THREAT_INTEL, verdict::DROP, drop_reason::THREAT_INTEL_CONFIDENCE, 0, 0);
        return Some(xdp_action::XDP_DROP);
    }
    if entry.action == threat_action::RATE_LIMIT && entry.confidence >= rl_thresh {
        install_override_if_absent(pkt.src_ip, default_protocol_rate(pkt.l3_proto) / 4);
    } else if entry.action == threat_action::MONITOR {
        emit_event(pkt, attack_type::THREAT_INTEL, verdict::PASS, drop_reason::NONE, 0, 0);
    }
    None
}

// ============================================================================
// C4 — GeoIP
// ============================================================================

#[inline(always)]
fn stage_geoip(pkt: &PacketCtx) -> Option<u32> {
    if cfg(config_id::GEOIP_ENABLE, 1) == 0 {
        return None;
    }
    let lk = lpm_key(pkt.src_ip);
    let entry = match unsafe { GEOIP_MAP.get(&lk) } {
        Some(e) => e,
        None => {
            if escalation_level() == escalation::CRITICAL {
                bump(|s| s.geoip_dropped += 1);
                emit_event(pkt, attack_type::GEOIP, verdict::DROP, drop_reason::GEOIP_ESCALATION, 0, 0);
                return Some(xdp_action::XDP_DROP);
            }
            return None;
        }
    };

    let action = unsafe { COUNTRY_POLICY.get(&entry.country) }
        .copied()
        .unwrap_or_else(|| {
            if escalation_level() == escalation::CRITICAL {
                country_action::DROP
            } else {
                country_action::PASS
            }
        });

    match action {
        a if a == country_action::DROP => {
            bump(|s| s.geoip_dropped += 1);
            emit_event(pkt, attack_type::GEOIP, verdict::DROP, drop_reason::GEOIP_COUNTRY_POLICY, 0, 0);
            Some(xdp_action::XDP_DROP)
        }
        a if a == country_action::RATE_LIMIT => {
            install_override_if_absent(pkt.src_ip, (default_protocol_rate(pkt.l3_proto) / 2).max(1));
            None
        }
        a if a == country_action::MONITOR => {
            emit_event(pkt, attack_type::GEOIP, verdict::PASS, drop_reason::NONE, 0, 0);
            None
        }
        _ => None,
    }
}

// ============================================================================
// C5 — reputation
// ============================================================================

const REP_SYN_NO_ACK: u32 = 50;
const REP_RATE_EXCEEDED: u32 = 30;
const REP_PROTOCOL_ANOMALY: u32 = 40;
const REP_BAD_PAYLOAD: u32 = 60;
const REP_FRAGMENT: u32 = 20;
const REP_PORT_SCAN: u32 = 70;

#[inline(always)]
fn stage_reputation(pkt: &PacketCtx) -> Option<u32> {
    if cfg(config_id::REPUTATION_ENABLE, 1) == 0 {
        return None;
    }
    let threshold = cfg(config_id::REPUTATION_SCORE_THRESHOLD, 500) as u32;
    let now = now_ns();

    let mut entry = unsafe { REPUTATION_MAP.get(&pkt.src_ip) }.copied().unwrap_or(ReputationEntry {
        score: 0,
        total_packets: 0,
        dropped_packets: 0,
        violations: 0,
        first_seen_ns: now,
        last_seen_ns: now,
        last_decay_ns: now,
        distinct_ports: 0,
        flags: 0,
        _pad: [0; 3],
    });

    if entry.flags & reputation_flags::BLOCKED != 0 {
        entry.total_packets += 1;
        entry.dropped_packets += 1;
        entry.last_seen_ns = now;
        let _ = REPUTATION_MAP.insert(&pkt.src_ip, &entry, 0);
        bump(|s| s.reputation_dropped += 1);
        emit_event(pkt, attack_type::REPUTATION, verdict::DROP, drop_reason::REPUTATION_BLOCKED, 0, 0);
        return Some(xdp_action::XDP_DROP);
    }

    entry.total_packets += 1;
    entry.last_seen_ns = now;

    let elapsed = now.saturating_sub(entry.last_decay_ns);
    if elapsed > 1_000_000_000 {
        let ticks = (elapsed / 1_000_000_000).min(limits::MAX_REPUTATION_DECAY_TICKS);
        let decay = 5u32.saturating_mul(ticks as u32);
        entry.score = entry.score.saturating_sub(decay);
        entry.last_decay_ns = now;
    }

    port_scan_check(pkt, &mut entry, now);

    if entry.score >= threshold {
        entry.flags |= reputation_flags::BLOCKED;
        entry.dropped_packets += 1;
        let _ = REPUTATION_MAP.insert(&pkt.src_ip, &entry, 0);
        bump(|s| s.reputation_dropped += 1);
        emit_event(pkt, attack_type::REPUTATION, verdict::DROP, drop_reason::REPUTATION_BLOCKED, 0, 0);
        return Some(xdp_action::XDP_DROP);
    }

    let _ = REPUTATION_MAP.insert(&pkt.src_ip, &entry, 0);
    None
}

#[inline(always)]
fn port_scan_check(pkt: &PacketCtx, rep: &mut ReputationEntry, now: u64) {
    const WINDOW_NS: u64 = 10_000_000_000;

    let mut scan = unsafe { PORT_SCAN_MAP.get(&pkt.src_ip) }.copied().unwrap_or(PortScanEntry {
        window_start_ns: now,
        distinct_ports: 0,
        _pad: 0,
        port_bitmap: 0,
    });

    if now.saturating_sub(scan.window_start_ns) > WINDOW_NS {
        scan.window_start_ns = now;
        scan.distinct_ports = 0;
        scan.port_bitmap = 0;
    }

    let bit = (pkt.dst_port & 0x3f) as u64;
    let mask = 1u64 << bit;
    if scan.port_bitmap & mask == 0 {
        scan.port_bitmap |= mask;
        scan.distinct_ports += 1;
        if scan.distinct_ports > limits::PORT_SCAN_DISTINCT_THRESHOLD {
            rep.score = rep.score.saturating_add(REP_PORT_SCAN).min(1000);
            bump(|s| s.port_scan_detected += 1);
        }
    }
    rep.distinct_ports = scan.distinct_ports;

    let _ = PORT_SCAN_MAP.insert(&pkt.src_ip, &scan, 0);
}

/// Called by other stages to add a violation penalty to a source's score.
#[inline(always)]
fn penalize(src_ip: u32, weight: u32) {
    let now = now_ns();
    let mut entry = unsafe { REPUTATION_MAP.get(&src_ip) }.copied().unwrap_or(ReputationEntry {
        score: 0,
        total_packets: 0,
        dropped_packets: 0,
        violations: 0,
        first_seen_ns: now,
        last_seen_ns: now,
        last_decay_ns: now,
        distinct_ports: 0,
        flags: 0,
        _pad: [0; 3],
    });
    entry.score = entry.score.saturating_add(weight).min(1000);
    entry.violations += 1;
    let _ = REPUTATION_MAP.insert(&src_ip, &entry, 0);
}

// ============================================================================
// C6 — fragment filter
// ============================================================================

#[inline(always)]
fn stage_fragment(pkt: &PacketCtx) -> Option<u32> {
    if !pkt.fragmented {
        return None;
    }
    penalize(pkt.src_ip, REP_FRAGMENT);
    if !pkt.frag_offset_nonzero && pkt.ip_total_len < 68 {
        // Tiny first fragment: classic fragmentation-attack shape (real data
        // hidden past a too-short first fragment). Weight it twice.
        penalize(pkt.src_ip, REP_FRAGMENT);
    }
    bump(|s| s.fragment_dropped += 1);
    emit_event(pkt, attack_type::FRAGMENT, verdict::DROP, drop_reason::FRAGMENT_DISALLOWED, 0, 0);
    Some(xdp_action::XDP_DROP)
}

// ============================================================================
// C7 — signature match
// ============================================================================

#[inline(always)]
fn stage_signature(pkt: &PacketCtx) -> Option<u32> {
    let count = unsafe { ATTACK_SIG_COUNT.get(0) }.copied().unwrap_or(0).min(limits::MAX_SIGNATURES);

    let mut i = 0u32;
    while i < limits::MAX_SIGNATURES {
        if i >= count {
            break;
        }
        if let Some(rule) = unsafe { ATTACK_SIG_MAP.get(i) } {
            if signature_matches(pkt, rule) {
                bump(|s| s.signature_dropped += 1);
                emit_event(pkt, attack_type::SIGNATURE, verdict::DROP, drop_reason::SIGNATURE_MATCH, 0, 0);
                return Some(xdp_action::XDP_DROP);
            }
        }
        i += 1;
    }
    None
}

#[inline(always)]
fn signature_matches(pkt: &PacketCtx, rule: &SignatureRule) -> bool {
    if rule.protocol != 0 && rule.protocol != pkt.l3_proto {
        return false;
    }
    if rule.tcp_flag_mask != 0 {
        let flags = pkt.tcp_flags as u8;
        if (flags & rule.tcp_flag_mask) != rule.tcp_flag_match {
            return false;
        }
    }
    if !(rule.src_port_min == 0 && rule.src_port_max == 0) {
        if pkt.src_port < rule.src_port_min || pkt.src_port > rule.src_port_max {
            return false;
        }
    }
    if !(rule.dst_port_min == 0 && rule.dst_port_max == 0) {
        if pkt.dst_port < rule.dst_port_min || pkt.dst_port > rule.dst_port_max {
            return false;
        }
    }
    if !(rule.len_min == 0 && rule.len_max == 0) {
        if pkt.pkt_len < rule.len_min || pkt.pkt_len > rule.len_max {
            return false;
        }
    }
    if rule.has_payload_hash != 0 {
        if !pkt.has_first4 || pkt.first4 != rule.payload_hash {
            return false;
        }
    }
    true
}

// ============================================================================
// C8 — payload match
// ============================================================================

#[inline(always)]
fn stage_payload(pkt: &PacketCtx) -> Option<u32> {
    if cfg(config_id::PAYLOAD_MATCH_ENABLE, 1) == 0 || pkt.l4_payload_len == 0 {
        return None;
    }
    let count = unsafe { PAYLOAD_RULE_COUNT.get(0) }.copied().unwrap_or(0).min(limits::MAX_PAYLOAD_RULES);

    let mut i = 0u32;
    while i < limits::MAX_PAYLOAD_RULES {
        if i >= count {
            break;
        }
        if let Some(rule) = unsafe { PAYLOAD_RULES.get_ptr_mut(i) } {
            let rule = unsafe { &mut *rule };
            if payload_rule_matches(pkt, rule) {
                let hit_count = &rule.hit_count as *const u64 as *const core::sync::atomic::AtomicU64;
                unsafe { (*hit_count).fetch_add(1, core::sync::atomic::Ordering::Relaxed) };
                match rule.action {
                    a if a == rule_action::DROP => {
                        penalize(pkt.src_ip, REP_BAD_PAYLOAD);
                        bump(|s| s.payload_dropped += 1);
                        emit_event(pkt, attack_type::PAYLOAD, verdict::DROP, drop_reason::PAYLOAD_RULE, 0, 0);
                        return Some(xdp_action::XDP_DROP);
                    }
                    a if a == rule_action::RATE_LIMIT => {
                        install_override_if_absent(pkt.src_ip, default_protocol_rate(pkt.l3_proto) / 4);
                    }
                    _ => {
                        emit_event(pkt, attack_type::PAYLOAD, verdict::PASS, drop_reason::NONE, 0, 0);
                    }
                }
            }
        }
        i += 1;
    }
    None
}

#[inline(always)]
fn payload_rule_matches(pkt: &PacketCtx, rule: &PayloadRule) -> bool {
    if rule.protocol != 0 && rule.protocol != pkt.l3_proto {
        return false;
    }
    if rule.dst_port != 0 && rule.dst_port != pkt.dst_port {
        return false;
    }
    if rule.pattern_len == 0 || rule.pattern_len as usize > limits::MAX_PAYLOAD_PATTERN_BYTES {
        return false;
    }
    let start = pkt.l4_payload_offset + rule.offset as usize;
    let payload_end = (pkt.l4_payload_offset + pkt.l4_payload_len as usize).min(pkt.data_end);
    if start + rule.pattern_len as usize > payload_end {
        return false;
    }

    let bytes = unsafe { core::slice::from_raw_parts(start as *const u8, rule.pattern_len as usize) };
    let mut i = 0usize;
    while i < limits::MAX_PAYLOAD_PATTERN_BYTES {
        if i >= rule.pattern_len as usize {
            break;
        }
        if (bytes[i] & rule.mask[i]) != (rule.pattern[i] & rule.mask[i]) {
            return false;
        }
        i += 1;
    }
    true
}

// ============================================================================
// C9 — protocol validator
// ============================================================================

#[inline(always)]
fn stage_protocol_validator(pkt: &PacketCtx) -> Option<u32> {
    if cfg(config_id::PROTO_VALIDATION_ENABLE, 1) == 0 {
        return None;
    }

    if pkt.l3_proto == protocol::ip::PROTO_TCP {
        if cfg(config_id::TCP_STATE_ENABLE, 1) != 0 {
            if let Some(v) = validate_tcp_state(pkt) {
                return Some(v);
            }
        }
    } else if pkt.l3_proto == protocol::ip::PROTO_UDP {
        if let Some(v) = validate_udp(pkt) {
            return Some(v);
        }
    }

    None
}

#[inline(always)]
fn validate_tcp_state(pkt: &PacketCtx) -> Option<u32> {
    let key = forward_key(pkt);
    let entry = unsafe { CONNTRACK_MAP.get(&key) };

    let pure_syn = (pkt.tcp_flags & (protocol::tcp::SYN | protocol::tcp::ACK)) == protocol::tcp::SYN;
    let bare_rst = pkt.tcp_flags == protocol::tcp::RST;

    let entry = match entry {
        Some(e) => *e,
        None => {
            if pure_syn || bare_rst {
                return None;
            }
            bump(|s| s.tcp_state_dropped += 1);
            emit_event(pkt, attack_type::PROTOCOL_VIOLATION, verdict::DROP, drop_reason::TCP_STATE_VIOLATION, 0, 0);
            return Some(xdp_action::XDP_DROP);
        }
    };

    let violated = match entry.state {
        s if s == tcp_state::NEW => pkt.tcp_flags != protocol::tcp::SYN,
        s if s == tcp_state::SYN_SENT => {
            pkt.tcp_flags != (protocol::tcp::SYN | protocol::tcp::ACK) && pkt.tcp_flags != protocol::tcp::RST
        }
        s if s == tcp_state::SYN_RECV => {
            let is_rst = pkt.tcp_flags & protocol::tcp::RST != 0;
            let is_ack_only = pkt.tcp_flags == protocol::tcp::ACK;
            !is_rst && !is_ack_only
        }
        s if s == tcp_state::ESTABLISHED => {
            let bare_syn = (pkt.tcp_flags & (protocol::tcp::SYN | protocol::tcp::ACK)) == protocol::tcp::SYN;
            if bare_syn {
                true
            } else if entry.expected_seq != 0 {
                let dist = pkt.tcp_seq.wrapping_sub(entry.expected_seq);
                dist > (1u32 << 30) && (u32::MAX - dist) > (1u32 << 30)
            } else {
                false
            }
        }
        s if s == tcp_state::FIN_WAIT => pkt.tcp_flags & protocol::tcp::SYN != 0,
        s if s == tcp_state::CLOSED || s == tcp_state::TIME_WAIT => pkt.tcp_flags != protocol::tcp::RST,
        _ => false,
    };

    if violated {
        let threshold = if escalation_level() >= escalation::HIGH { 1 } else { 3 };
        let mut updated = entry;
        updated.violations = updated.violations.saturating_add(1);
        let _ = CONNTRACK_MAP.insert(&key, &updated, 0);
        if updated.violations as u32 > threshold {
            penalize(pkt.src_ip, REP_PROTOCOL_ANOMALY);
            bump(|s| s.tcp_state_dropped += 1);
            emit_event(pkt, attack_type::PROTOCOL_VIOLATION, verdict::DROP, drop_reason::TCP_STATE_VIOLATION, 0, 0);
            return Some(xdp_action::XDP_DROP);
        }
    }

    None
}

#[inline(always)]
fn validate_udp(pkt: &PacketCtx) -> Option<u32> {
    let mode = cfg(config_id::DNS_VALIDATION_MODE, 1);

    if pkt.dst_port == protocol::ports::DNS && mode >= 1 {
        if let Some(v) = validate_dns(pkt, mode) {
            return Some(v);
        }
    }
    if pkt.dst_port == protocol::ports::NTP {
        if let Some(v) = validate_ntp(pkt) {
            return Some(v);
        }
    }
    if pkt.dst_port == protocol::ports::SSDP {
        if let Some(v) = validate_ssdp(pkt) {
            return Some(v);
        }
    }
    if pkt.dst_port == protocol::ports::MEMCACHED {
        bump(|s| s.memcached_dropped += 1);
        emit_event(pkt, attack_type::PROTOCOL_VIOLATION, verdict::DROP, drop_reason::MEMCACHED_REFLECTION, 0, 0);
        return Some(xdp_action::XDP_DROP);
    }

    let registered = unsafe { PORT_PROTOCOL_MAP.get(&pkt.dst_port) }.copied().unwrap_or(0);
    if registered & port_protocol_flags::REFLECTOR_BLOCK != 0 {
        bump(|s| s.proto_violation_dropped += 1);
        emit_event(pkt, attack_type::PROTOCOL_VIOLATION, verdict::DROP, drop_reason::MEMCACHED_REFLECTION, 0, 0);
        return Some(xdp_action::XDP_DROP);
    }
    None
}

#[inline(always)]
fn validate_dns(pkt: &PacketCtx, mode: u64) -> Option<u32> {
    if pkt.l4_payload_len < 12 {
        return None;
    }
    let off = pkt.l4_payload_offset;
    if off + 12 > pkt.data_end {
        return None;
    }
    let b = unsafe { core::slice::from_raw_parts(off as *const u8, 12) };
    let flags = u16::from_be_bytes([b[2], b[3]]);
    let qr = (flags >> 15) & 0x1;
    let opcode = (flags >> 11) & 0x0f;
    let qdcount = u16::from_be_bytes([b[4], b[5]]);
    let ancount = u16::from_be_bytes([b[6], b[7]]);

    if qr == 1 && ancount > 10 {
        bump(|s| s.dns_amp_dropped += 1);
        emit_event(pkt, attack_type::PROTOCOL_VIOLATION, verdict::DROP, drop_reason::DNS_VALIDATION, 0, 0);
        return Some(xdp_action::XDP_DROP);
    }
    if mode >= 2 && qr == 0 {
        if qdcount != 1 || opcode != 0 || pkt.l4_payload_len > 512 {
            bump(|s| s.dns_amp_dropped += 1);
            emit_event(pkt, attack_type::PROTOCOL_VIOLATION, verdict::DROP, drop_reason::DNS_VALIDATION, 0, 0);
            return Some(xdp_action::XDP_DROP);
        }
    }
    None
}

#[inline(always)]
fn validate_ntp(pkt: &PacketCtx) -> Option<u32> {
    if pkt.l4_payload_len < 1 {
        return None;
    }
    let off = pkt.l4_payload_offset;
    if off + 1 > pkt.data_end {
        return None;
    }
    let b0 = unsafe { *(off as *const u8) };
    let mode = b0 & 0x07;

    if mode == 7 {
        bump(|s| s.ntp_monlist_blocked += 1);
        bump(|s| s.proto_violation_dropped += 1);
        emit_event(pkt, attack_type::PROTOCOL_VIOLATION, verdict::DROP, drop_reason::NTP_VALIDATION, 0, 0);
        return Some(xdp_action::XDP_DROP);
    }
    if mode == 6 {
        let fwd = unsafe { CONNTRACK_MAP.get(&forward_key(pkt)) }.is_some();
        let rev = unsafe { CONNTRACK_MAP.get(&reverse_key(pkt)) }.is_some();
        if !fwd && !rev {
            bump(|s| s.proto_violation_dropped += 1);
            emit_event(pkt, attack_type::PROTOCOL_VIOLATION, verdict::DROP, drop_reason::NTP_VALIDATION, 0, 0);
            return Some(xdp_action::XDP_DROP);
        }
    }
    if (mode == 3 || mode == 4) && pkt.l4_payload_len < 48 {
        bump(|s| s.proto_violation_dropped += 1);
        emit_event(pkt, attack_type::PROTOCOL_VIOLATION, verdict::DROP, drop_reason::NTP_VALIDATION, 0, 0);
        return Some(xdp_action::XDP_DROP);
    }
    None
}

#[inline(always)]
fn validate_ssdp(pkt: &PacketCtx) -> Option<u32> {
    if pkt.l4_payload_len < 6 {
        return None;
    }
    let off = pkt.l4_payload_offset;
    if off + 8 <= pkt.data_end {
        let b = unsafe { core::slice::from_raw_parts(off as *const u8, 8) };
        if &b[..8] == b"HTTP/1.1" {
            bump(|s| s.ssdp_reflection_dropped += 1);
            emit_event(pkt, attack_type::PROTOCOL_VIOLATION, verdict::DROP, drop_reason::SSDP_REFLECTION, 0, 0);
            return Some(xdp_action::XDP_DROP);
        }
    }
    if off + 7 <= pkt.data_end {
        let b = unsafe { core::slice::from_raw_parts(off as *const u8, 7) };
        if &b[..7] == b"NOTIFY " {
            bump(|s| s.ssdp_reflection_dropped += 1);
            emit_event(pkt, attack_type::PROTOCOL_VIOLATION, verdict::DROP, drop_reason::SSDP_REFLECTION, 0, 0);
            return Some(xdp_action::XDP_DROP);
        }
    }
    None
}

// ============================================================================
// C10 — SYN-flood mitigator (SYN cookies)
// ============================================================================

#[inline(always)]
fn stage_syn_flood(ctx: &XdpContext, pkt: &PacketCtx) -> Option<u32> {
    if cfg(config_id::SYN_COOKIE_ENABLE, 1) == 0 || pkt.l3_proto != protocol::ip::PROTO_TCP {
        return None;
    }

    let is_pure_syn = pkt.tcp_flags == protocol::tcp::SYN;
    let is_pure_ack = pkt.tcp_flags == protocol::tcp::ACK;

    if is_pure_syn {
        return Some(synthesize_syn_ack(ctx, pkt));
    }

    if is_pure_ack {
        let fwd = unsafe { CONNTRACK_MAP.get(&forward_key(pkt)) };
        if let Some(entry) = fwd {
            if entry.state >= tcp_state::ESTABLISHED {
                return None;
            }
        }

        let cookie = pkt.tcp_ack.wrapping_sub(1);
        let cookie_ctx = unsafe { SYN_COOKIE_MAP.get(0) }.copied().unwrap_or(SynCookieContext {
            current_seed: 0,
            previous_seed: 0,
            last_rotation_ns: 0,
        });

        if cookie_matches(pkt, cookie, cookie_ctx.current_seed) || cookie_matches(pkt, cookie, cookie_ctx.previous_seed) {
            let now = now_ns();
            let entry = ConntrackEntry {
                last_seen_ns: now,
                fwd_packets: 1,
                fwd_bytes: pkt.pkt_len as u32,
                rev_packets: 0,
                rev_bytes: 0,
                expected_seq: pkt.tcp_seq,
                state: tcp_state::ESTABLISHED,
                flags: conn_flags::COOKIE_VERIFIED,
                window_scale: 0,
                violations: 0,
            };
            let _ = CONNTRACK_MAP.insert(&forward_key(pkt), &entry, 0);
            bump(|s| s.syn_cookies_validated += 1);
            return None;
        }

        bump(|s| s.syn_cookies_failed += 1);
        bump(|s| s.ack_flood_dropped += 1);
        emit_event(pkt, attack_type::SYN_FLOOD, verdict::DROP, drop_reason::SYN_COOKIE_INVALID, 0, 0);
        return Some(xdp_action::XDP_DROP);
    }

    None
}

#[inline(always)]
fn cookie_matches(pkt: &PacketCtx, cookie: u32, seed: u32) -> bool {
    let mss_idx = cookie_mss_index(cookie);
    let k0 = (seed as u64) | ((seed as u64) << 32);
    let m = syn_cookie_message(pkt.src_ip, pkt.dst_ip, pkt.src_port, pkt.dst_port);
    let hash = siphash24(k0, SIPHASH_K1, m);
    encode_cookie(hash, mss_idx) == cookie
}

#[inline(always)]
fn synthesize_syn_ack(ctx: &XdpContext, pkt: &PacketCtx) -> u32 {
    let cookie_ctx = unsafe { SYN_COOKIE_MAP.get(0) }.copied().unwrap_or(SynCookieContext {
        current_seed: 0,
        previous_seed: 0,
        last_rotation_ns: 0,
    });

    let mss_idx = mss_index(1460);
    let k0 = (cookie_ctx.current_seed as u64) | ((cookie_ctx.current_seed as u64) << 32);
    let m = syn_cookie_message(pkt.src_ip, pkt.dst_ip, pkt.src_port, pkt.dst_port);
    let hash = siphash24(k0, SIPHASH_K1, m);
    let cookie = encode_cookie(hash, mss_idx);

    let data = ctx.data();
    let data_end = ctx.data_end();
    if pkt.eth_offset + mem::size_of::<EthHdr>() > data_end
        || pkt.ip_offset + mem::size_of::<Ipv4Hdr>() > data_end
        || pkt.l4_offset + mem::size_of::<TcpHdr>() > data_end
    {
        return xdp_action::XDP_PASS;
    }

    unsafe {
        let eth = &mut *(data as *mut EthHdr);
        let tmp = eth.h_dest;
        eth.h_dest = eth.h_source;
        eth.h_source = tmp;

        let ip = &mut *(pkt.ip_offset as *mut Ipv4Hdr);
        let tmp_addr = ip.saddr;
        ip.saddr = ip.daddr;
        ip.daddr = tmp_addr;
        ip.ttl = 64;
        ip.id = 0;
        ip.check = 0;

        let halfwords = ipv4_header_halfwords(ip);
        ip.check = ipv4_checksum(&halfwords).to_be();

        let tcp = &mut *(pkt.l4_offset as *mut TcpHdr);
        let tmp_port = tcp.source;
        tcp.source = tcp.dest;
        tcp.dest = tmp_port;
        tcp.ack_seq = pkt.tcp_seq.wrapping_add(1).to_be();
        tcp.seq = cookie.to_be();
        let doff = (5u16) << 12;
        tcp.doff_flags = (doff | protocol::tcp::SYN | protocol::tcp::ACK).to_be();
        tcp.window = 65535u16.to_be();
        tcp.check = 0;
    }

    bump(|s| s.syn_cookies_issued += 1);
    xdp_action::XDP_TX
}

#[inline(always)]
fn ipv4_header_halfwords(ip: &Ipv4Hdr) -> [u16; 10] {
    [
        u16::from_be_bytes([ip.version_ihl, ip.tos]),
        ip.tot_len,
        ip.id,
        ip.frag_off,
        u16::from_be_bytes([ip.ttl, ip.protocol]),
        ip.check,
        (ip.saddr >> 16) as u16,
        ip.saddr as u16,
        (ip.daddr >> 16) as u16,
        ip.daddr as u16,
    ]
}

// ============================================================================
// C11 — ACK-flood filter
// ============================================================================

#[inline(always)]
fn stage_ack_flood(pkt: &PacketCtx) -> Option<u32> {
    if cfg(config_id::CONNTRACK_ENABLE, 1) == 0 || pkt.l3_proto != protocol::ip::PROTO_TCP {
        return None;
    }
    if pkt.tcp_flags != protocol::tcp::ACK {
        return None;
    }

    let fwd = unsafe { CONNTRACK_MAP.get(&forward_key(pkt)) }.is_some();
    let rev = unsafe { CONNTRACK_MAP.get(&reverse_key(pkt)) }.is_some();

    if fwd || rev {
        return None;
    }

    penalize(pkt.src_ip, REP_SYN_NO_ACK);
    bump(|s| s.ack_flood_dropped += 1);
    emit_event(pkt, attack_type::ACK_FLOOD, verdict::DROP, drop_reason::ACK_NO_CONNTRACK, 0, 0);
    Some(xdp_action::XDP_DROP)
}

// ============================================================================
// C12 — UDP flood & amplification filter
// ============================================================================

#[inline(always)]
fn stage_udp_flood(pkt: &PacketCtx) -> Option<u32> {
    if pkt.l3_proto != protocol::ip::PROTO_UDP {
        return None;
    }

    let threshold = match pkt.src_port {
        p if p == protocol::ports::DNS => Some(512u16),
        p if p == protocol::ports::NTP => Some(468),
        p if p == protocol::ports::SSDP => Some(256),
        p if p == protocol::ports::MEMCACHED => Some(1400),
        p if p == protocol::ports::CHARGEN || p == protocol::ports::CLDAP || p == protocol::ports::SNMP => Some(256),
        _ => None,
    };

    if let Some(limit) = threshold {
        if pkt.l4_payload_len > limit {
            bump(|s| s.udp_amp_dropped += 1);
            emit_event(pkt, attack_type::UDP_AMPLIFICATION, verdict::DROP, drop_reason::UDP_AMPLIFICATION_SIZE, 0, 0);
            return Some(xdp_action::XDP_DROP);
        }
        return None;
    }

    let registered = unsafe { PORT_PROTOCOL_MAP.get(&pkt.src_port) }.copied().unwrap_or(0);
    if registered & port_protocol_flags::AMP_SENSITIVE != 0 && pkt.l4_payload_len > 512 {
        bump(|s| s.udp_amp_dropped += 1);
        emit_event(pkt, attack_type::UDP_AMPLIFICATION, verdict::DROP, drop_reason::UDP_AMPLIFICATION_SIZE, 0, 0);
        return Some(xdp_action::XDP_DROP);
    }

    None
}

// ============================================================================
// C13 — ICMP flood filter
// ============================================================================

#[inline(always)]
fn stage_icmp_flood(pkt: &PacketCtx) -> Option<u32> {
    if pkt.l3_proto != protocol::ip::PROTO_ICMP {
        return None;
    }
    let icmp_type = pkt.dst_port as u8;
    let allowed = icmp_type == protocol::icmp::ECHO_REPLY
        || icmp_type == protocol::icmp::DEST_UNREACHABLE
        || icmp_type == protocol::icmp::ECHO_REQUEST
        || icmp_type == protocol::icmp::TIME_EXCEEDED;

    let total_len = mem::size_of::<IcmpHdr>() as u16 + pkt.l4_payload_len;

    if !allowed || total_len > 1024 {
        bump(|s| s.icmp_dropped += 1);
        emit_event(pkt, attack_type::ICMP_FLOOD, verdict::DROP, drop_reason::ICMP_TYPE_OR_SIZE, 0, 0);
        return Some(xdp_action::XDP_DROP);
    }
    None
}

// ============================================================================
// C14 — per-source rate limiter
// ============================================================================

#[inline(always)]
fn default_protocol_rate(proto: u8) -> u64 {
    match proto {
        p if p == protocol::ip::PROTO_TCP => cfg(config_id::TCP_PPS_LIMIT, 0),
        p if p == protocol::ip::PROTO_UDP => cfg(config_id::UDP_PPS_LIMIT, 0),
        p if p == protocol::ip::PROTO_ICMP => cfg(config_id::ICMP_PPS_LIMIT, 0),
        _ => 0,
    }
}

#[inline(always)]
fn install_override_if_absent(src_ip: u32, rate: u64) {
    if unsafe { ADAPTIVE_OVERRIDE.get(&src_ip) }.is_none() {
        let _ = ADAPTIVE_OVERRIDE.insert(&src_ip, &rate.max(1), 0);
    }
}

#[inline(always)]
fn stage_rate_limit(pkt: &PacketCtx) -> Option<u32> {
    let rate = unsafe { ADAPTIVE_OVERRIDE.get(&pkt.src_ip) }
        .copied()
        .unwrap_or_else(|| default_protocol_rate(pkt.l3_proto));

    if rate == 0 {
        return None;
    }

    let now = now_ns();
    let burst = rate.saturating_mul(2);

    let mut bucket = unsafe { RATE_LIMIT_MAP.get(&pkt.src_ip) }.copied().unwrap_or(TokenBucket {
        tokens: burst,
        last_refill_ns: now,
        refill_rate: rate,
        burst_size: burst,
        total_packets: 0,
        dropped_packets: 0,
    });

    let elapsed = now.saturating_sub(bucket.last_refill_ns);
    let refill = (elapsed as u128 * rate as u128 / 1_000_000_000u128) as u64;
    bucket.tokens = bucket.tokens.saturating_add(refill).min(bucket.burst_size);
    bucket.last_refill_ns = now;
    bucket.total_packets += 1;

    if bucket.tokens >= 1 {
        bucket.tokens -= 1;
        let _ = RATE_LIMIT_MAP.insert(&pkt.src_ip, &bucket, 0);
        return None;
    }

    bucket.dropped_packets += 1;
    let _ = RATE_LIMIT_MAP.insert(&pkt.src_ip, &bucket, 0);
    penalize(pkt.src_ip, REP_RATE_EXCEEDED);
    bump(|s| s.rate_limited += 1);
    emit_event(pkt, attack_type::RATE_LIMIT, verdict::DROP, drop_reason::SOURCE_RATE_LIMIT, 0, 0);
    Some(xdp_action::XDP_DROP)
}

// ============================================================================
// C15 — global rate limiter
// ============================================================================

#[inline(always)]
fn stage_global_rate_limit(pkt: &PacketCtx) -> Option<u32> {
    let pps_limit = cfg(config_id::GLOBAL_PPS_LIMIT, 0);
    let bps_limit_bits = cfg(config_id::GLOBAL_BPS_LIMIT, 0);
    let bps_limit = bps_limit_bits / 8;

    let now = now_ns();

    if pps_limit != 0 {
        if !consume_global_bucket(0, pps_limit, 1, now) {
            bump(|s| s.global_rate_limited += 1);
            emit_event(pkt, attack_type::GLOBAL_RATE_LIMIT, verdict::DROP, drop_reason::GLOBAL_RATE_LIMIT, 0, 0);
            return Some(xdp_action::XDP_DROP);
        }
    }

    if bps_limit != 0 {
        if !consume_global_bucket(1, bps_limit, pkt.pkt_len as u64, now) {
            bump(|s| s.global_rate_limited += 1);
            emit_event(pkt, attack_type::GLOBAL_RATE_LIMIT, verdict::DROP, drop_reason::GLOBAL_RATE_LIMIT, 0, 0);
            return Some(xdp_action::XDP_DROP);
        }
    }

    None
}

#[inline(always)]
fn consume_global_bucket(index: u32, rate: u64, cost: u64, now: u64) -> bool {
    let Some(bucket_ptr) = (unsafe { GLOBAL_RATE_MAP.get_ptr_mut(index) }) else {
        return true;
    };
    let bucket = unsafe { &mut *bucket_ptr };

    if bucket.burst_size == 0 {
        bucket.burst_size = rate.saturating_mul(2);
        bucket.tokens = bucket.burst_size;
        bucket.last_refill_ns = now;
        bucket.refill_rate = rate;
    }

    let elapsed = now.saturating_sub(bucket.last_refill_ns);
    let refill = (elapsed as u128 * rate as u128 / 1_000_000_000u128) as u64;
    bucket.tokens = bucket.tokens.saturating_add(refill).min(bucket.burst_size);
    bucket.last_refill_ns = now;

    if bucket.tokens >= cost {
        bucket.tokens -= cost;
        true
    } else {
        false
    }
}

// ============================================================================
// C16 — conntrack updater
// ============================================================================

#[inline(always)]
fn forward_key(pkt: &PacketCtx) -> u64 {
    hash_5tuple(pkt.src_ip, pkt.dst_ip, pkt.src_port, pkt.dst_port, pkt.l3_proto)
}

#[inline(always)]
fn reverse_key(pkt: &PacketCtx) -> u64 {
    hash_5tuple(pkt.dst_ip, pkt.src_ip, pkt.dst_port, pkt.src_port, pkt.l3_proto)
}

#[inline(always)]
fn stage_conntrack(pkt: &PacketCtx) {
    if cfg(config_id::CONNTRACK_ENABLE, 1) == 0 {
        return;
    }

    let now = now_ns();
    let fkey = forward_key(pkt);

    if let Some(entry) = unsafe { CONNTRACK_MAP.get(&fkey) } {
        let mut e = *entry;
        e.last_seen_ns = now;
        e.fwd_packets = e.fwd_packets.saturating_add(1);
        e.fwd_bytes = e.fwd_bytes.saturating_add(pkt.pkt_len as u32);
        if pkt.l3_proto == protocol::ip::PROTO_TCP {
            tcp_state_transition(&mut e, pkt, false);
        }
        let _ = CONNTRACK_MAP.insert(&fkey, &e, 0);
        bump(|s| s.conntrack_updated += 1);
        return;
    }

    let rkey = reverse_key(pkt);
    if let Some(entry) = unsafe { CONNTRACK_MAP.get(&rkey) } {
        let mut e = *entry;
        e.last_seen_ns = now;
        e.rev_packets = e.rev_packets.saturating_add(1);
        e.rev_bytes = e.rev_bytes.saturating_add(pkt.pkt_len as u32);
        if pkt.l3_proto == protocol::ip::PROTO_TCP {
            tcp_state_transition(&mut e, pkt, true);
        } else if e.state == tcp_state::NEW {
            e.state = tcp_state::ESTABLISHED;
        }
        let _ = CONNTRACK_MAP.insert(&rkey, &e, 0);
        bump(|s| s.conntrack_updated += 1);
        return;
    }

    let entry = ConntrackEntry {
        last_seen_ns: now,
        fwd_packets: 1,
        fwd_bytes: pkt.pkt_len as u32,
        rev_packets: 0,
        rev_bytes: 0,
        expected_seq: pkt.tcp_seq.wrapping_add(1),
        state: if pkt.l3_proto == protocol::ip::PROTO_TCP && pkt.tcp_flags == protocol::tcp::SYN {
            tcp_state::SYN_SENT
        } else {
            tcp_state::NEW
        },
        flags: 0,
        window_scale: 0,
        violations: 0,
    };
    let _ = CONNTRACK_MAP.insert(&fkey, &entry, 0);
    bump(|s| s.conntrack_created += 1);
}

#[inline(always)]
fn tcp_state_transition(entry: &mut ConntrackEntry, pkt: &PacketCtx, reverse: bool) {
    match entry.state {
        s if s == tcp_state::NEW && !reverse && pkt.tcp_flags == protocol::tcp::SYN => {
            entry.state = tcp_state::SYN_SENT;
        }
        s if s == tcp_state::SYN_SENT && reverse && pkt.tcp_flags == (protocol::tcp::SYN | protocol::tcp::ACK) => {
            entry.state = tcp_state::SYN_RECV;
        }
        s if s == tcp_state::SYN_RECV && !reverse && pkt.tcp_flags & protocol::tcp::ACK != 0 => {
            entry.state = tcp_state::ESTABLISHED;
            entry.expected_seq = pkt.tcp_seq;
        }
        s if s == tcp_state::ESTABLISHED && pkt.tcp_flags & protocol::tcp::FIN != 0 => {
            entry.state = tcp_state::FIN_WAIT;
        }
        s if s == tcp_state::ESTABLISHED && pkt.tcp_flags & protocol::tcp::RST != 0 => {
            entry.state = tcp_state::CLOSED;
        }
        s if s == tcp_state::FIN_WAIT
            && ((reverse && pkt.tcp_flags & protocol::tcp::FIN != 0) || pkt.tcp_flags & protocol::tcp::RST != 0) =>
        {
            entry.state = tcp_state::CLOSED;
        }
        _ => {}
    }
}

// ============================================================================
// C17 — stats & event emitter
// ============================================================================

#[inline(always)]
fn bump(f: impl FnOnce(&mut Stats)) {
    if let Some(ptr) = unsafe { STATS_MAP.get_ptr_mut(0) } {
        let stats = unsafe { &mut *ptr };
        f(stats);
    }
}

#[inline(always)]
fn stats_rx(ctx: &XdpContext) {
    let len = (ctx.data_end() - ctx.data()) as u64;
    bump(|s| {
        s.rx_packets += 1;
        s.rx_bytes += len;
    });
}

#[inline(always)]
fn stats_tx(ctx: &XdpContext) {
    let len = (ctx.data_end() - ctx.data()) as u64;
    bump(|s| {
        s.tx_packets += 1;
        s.tx_bytes += len;
    });
}

#[inline(always)]
fn stats_drop(ctx: &XdpContext) {
    let len = (ctx.data_end() - ctx.data()) as u64;
    bump(|s| {
        s.dropped_packets += 1;
        s.dropped_bytes += len;
    });
}

#[inline(always)]
fn emit_event(pkt: &PacketCtx, attack: u8, action: u8, reason: u8, pps: u64, bps: u64) {
    if let Some(mut entry) = EVENTS.reserve::<EventRecord>(0) {
        let record = EventRecord {
            timestamp_ns: now_ns(),
            src_ip: pkt.src_ip.to_be(),
            dst_ip: pkt.dst_ip.to_be(),
            src_port: pkt.src_port.to_be(),
            dst_port: pkt.dst_port.to_be(),
            protocol: pkt.l3_proto,
            attack_type: attack,
            action,
            drop_reason: reason,
            pps,
            bps,
            reputation_score: 0,
            country: 0,
            escalation: escalation_level(),
            _pad: 0,
        };
        entry.write(record);
        entry.submit(0);
    }
}

// ============================================================================
// Panic handler
// ============================================================================

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
