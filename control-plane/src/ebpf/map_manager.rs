//! Map access: the control surface described by the pipeline's final stage.
//!
//! Every mutation here targets the maps declared by `xdp_scrub` (see
//! `packetscrub_ebpf::map_names`, mirrored in [`crate::types::map_names`]).
//! `MapManager` also keeps a small amount of userspace-side bookkeeping the
//! data plane itself has no use for: ACL TTLs (eBPF maps have no native
//! expiry), and read-through mirrors of a few small maps so a status query
//! doesn't need a syscall into the kernel map on every call.

use std::net::Ipv4Addr;

use aya::maps::lpm_trie::Key as LpmKey;
use aya::maps::{Array, HashMap as AyaHashMap, LpmTrie, LruHashMap, MapData, PerCpuArray, RingBuf};
use aya::Ebpf;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, ScrubError};
use crate::types::{
    self, map_names, BlacklistValue, GeoipEntry, PayloadRule, ScrubEvent, SignatureRule, Stats,
    StatsSnapshot, ThreatIntelEntry, WhitelistValue,
};

/// 0 means "never expires", matching the kernel-side convention used for
/// permanent ACL entries.
pub const PERMANENT: u64 = 0;

/// Bounds the ACL expiry shadow tables so an operator hammering block/allow
/// can't grow them without limit; the oldest entries simply lose their TTL
/// tracking and become permanent, matching the teacher's LRU-eviction
/// posture for unbounded client-keyed state.
pub const ACL_EXPIRY_CAPACITY: usize = 65_536;

/// (current_seed, previous_seed): mirrors `SynCookieContext` so a reader can
/// ask for the live seed pair without a map syscall.
pub type SynCookieSeedPair = (u32, u32);

/// Userspace-side state that outlives any single `MapManager` borrow.
/// Owned by `ControlPlane`, handed to `MapManager` by reference on each
/// call so the ACL TTL tables and the cache mirrors persist across calls
/// instead of being rebuilt empty every time.
pub struct MapManagerState {
    blacklist_expiry: LruCache<Ipv4Addr, u64>,
    whitelist_expiry: LruCache<Ipv4Addr, u64>,
    adaptive_override_cache: DashMap<u32, u64>,
    country_policy_cache: DashMap<u16, u8>,
    syn_cookie_seed: Mutex<SynCookieSeedPair>,
}

impl MapManagerState {
    pub fn new() -> Self {
        Self {
            blacklist_expiry: LruCache::new(
                std::num::NonZeroUsize::new(ACL_EXPIRY_CAPACITY).expect("capacity is nonzero"),
            ),
            whitelist_expiry: LruCache::new(
                std::num::NonZeroUsize::new(ACL_EXPIRY_CAPACITY).expect("capacity is nonzero"),
            ),
            adaptive_override_cache: DashMap::new(),
            country_policy_cache: DashMap::new(),
            syn_cookie_seed: Mutex::new((0, 0)),
        }
    }

    /// Last seed pair `rotate_syn_cookie_seed` wrote, without touching the
    /// kernel map.
    pub fn cached_syn_cookie_seed(&self) -> SynCookieSeedPair {
        *self.syn_cookie_seed.lock()
    }

    /// Last adaptive override pushed for `config_id`, without touching the
    /// kernel map.
    pub fn cached_adaptive_override(&self, config_id: u32) -> Option<u64> {
        self.adaptive_override_cache.get(&config_id).map(|v| *v)
    }

    /// Last policy pushed for `country_id`, without touching the kernel map.
    pub fn cached_country_policy(&self, country_id: u16) -> Option<u8> {
        self.country_policy_cache.get(&country_id).map(|v| *v)
    }
}

impl Default for MapManagerState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MapManager<'a> {
    ebpf: &'a mut Ebpf,
    state: &'a mut MapManagerState,
}

impl<'a> MapManager<'a> {
    pub fn new(ebpf: &'a mut Ebpf, state: &'a mut MapManagerState) -> Self {
        Self { ebpf, state }
    }

    fn lpm_key(addr: Ipv4Addr, prefix_len: u32) -> LpmKey<u32> {
        LpmKey::new(prefix_len, u32::from(addr).to_be())
    }

    pub fn block_ip(&mut self, ip: Ipv4Addr, prefix_len: u8, reason: u8, ttl_secs: u64, now: u64) -> Result<()> {
        let key = Self::lpm_key(ip, prefix_len as u32);
        let map = self
            .ebpf
            .map_mut(map_names::BLACKLIST_V4)
            .ok_or_else(|| ScrubError::MapNotFound(map_names::BLACKLIST_V4.to_string()))?;
        let mut trie: LpmTrie<&mut MapData, u32, BlacklistValue> =
            LpmTrie::try_from(map).map_err(|source| ScrubError::MapOperation {
                map: map_names::BLACKLIST_V4.to_string(),
                source,
            })?;
        trie.insert(&key, reason as BlacklistValue, 0)
            .map_err(|source| ScrubError::MapOperation {
                map: map_names::BLACKLIST_V4.to_string(),
                source,
            })?;
        let expiry = if ttl_secs == 0 { PERMANENT } else { now + ttl_secs };
        self.state.blacklist_expiry.put(ip, expiry);
        debug!(%ip, prefix_len, reason, expiry, "ip blacklisted");
        Ok(())
    }

    pub fn unblock_ip(&mut self, ip: Ipv4Addr, prefix_len: u8) -> Result<()> {
        let key = Self::lpm_key(ip, prefix_len as u32);
        let map = self
            .ebpf
            .map_mut(map_names::BLACKLIST_V4)
            .ok_or_else(|| ScrubError::MapNotFound(map_names::BLACKLIST_V4.to_string()))?;
        let mut trie: LpmTrie<&mut MapData, u32, BlacklistValue> =
            LpmTrie::try_from(map).map_err(|source| ScrubError::MapOperation {
                map: map_names::BLACKLIST_V4.to_string(),
                source,
            })?;
        trie.remove(&key).map_err(|source| ScrubError::MapOperation {
            map: map_names::BLACKLIST_V4.to_string(),
            source,
        })?;
        self.state.blacklist_expiry.pop(&ip);
        Ok(())
    }

    pub fn allow_ip(&mut self, ip: Ipv4Addr, prefix_len: u8, tag: u32, ttl_secs: u64, now: u64) -> Result<()> {
        let key = Self::lpm_key(ip, prefix_len as u32);
        let map = self
            .ebpf
            .map_mut(map_names::WHITELIST_V4)
            .ok_or_else(|| ScrubError::MapNotFound(map_names::WHITELIST_V4.to_string()))?;
        let mut trie: LpmTrie<&mut MapData, u32, WhitelistValue> =
            LpmTrie::try_from(map).map_err(|source| ScrubError::MapOperation {
                map: map_names::WHITELIST_V4.to_string(),
                source,
            })?;
        trie.insert(&key, tag, 0).map_err(|source| ScrubError::MapOperation {
            map: map_names::WHITELIST_V4.to_string(),
            source,
        })?;
        let expiry = if ttl_secs == 0 { PERMANENT } else { now + ttl_secs };
        self.state.whitelist_expiry.put(ip, expiry);
        Ok(())
    }

    pub fn disallow_ip(&mut self, ip: Ipv4Addr, prefix_len: u8) -> Result<()> {
        let key = Self::lpm_key(ip, prefix_len as u32);
        let map = self
            .ebpf
            .map_mut(map_names::WHITELIST_V4)
            .ok_or_else(|| ScrubError::MapNotFound(map_names::WHITELIST_V4.to_string()))?;
        let mut trie: LpmTrie<&mut MapData, u32, WhitelistValue> =
            LpmTrie::try_from(map).map_err(|source| ScrubError::MapOperation {
                map: map_names::WHITELIST_V4.to_string(),
                source,
            })?;
        trie.remove(&key).map_err(|source| ScrubError::MapOperation {
            map: map_names::WHITELIST_V4.to_string(),
            source,
        })?;
        self.state.whitelist_expiry.pop(&ip);
        Ok(())
    }

    /// Drops any ACL entries whose TTL has lapsed. Called periodically by
    /// the scheduler, not on every packet.
    pub fn cleanup_expired(&mut self, now: u64) -> Result<usize> {
        let expired_black: Vec<Ipv4Addr> = self
            .state
            .blacklist_expiry
            .iter()
            .filter(|(_, &exp)| exp != PERMANENT && exp <= now)
            .map(|(ip, _)| *ip)
            .collect();
        let expired_white: Vec<Ipv4Addr> = self
            .state
            .whitelist_expiry
            .iter()
            .filter(|(_, &exp)| exp != PERMANENT && exp <= now)
            .map(|(ip, _)| *ip)
            .collect();

        let count = expired_black.len() + expired_white.len();
        for ip in expired_black {
            self.unblock_ip(ip, 32)?;
        }
        for ip in expired_white {
            self.disallow_ip(ip, 32)?;
        }
        Ok(count)
    }

    pub fn set_threat_intel(&mut self, ip: Ipv4Addr, prefix_len: u8, entry: ThreatIntelEntry) -> Result<()> {
        let key = Self::lpm_key(ip, prefix_len as u32);
        let map = self
            .ebpf
            .map_mut(map_names::THREAT_INTEL_MAP)
            .ok_or_else(|| ScrubError::MapNotFound(map_names::THREAT_INTEL_MAP.to_string()))?;
        let mut trie: LpmTrie<&mut MapData, u32, ThreatIntelEntry> =
            LpmTrie::try_from(map).map_err(|source| ScrubError::MapOperation {
                map: map_names::THREAT_INTEL_MAP.to_string(),
                source,
            })?;
        trie.insert(&key, entry, 0).map_err(|source| ScrubError::MapOperation {
            map: map_names::THREAT_INTEL_MAP.to_string(),
            source,
        })
    }

    pub fn set_geoip_entry(&mut self, ip: Ipv4Addr, prefix_len: u8, entry: GeoipEntry) -> Result<()> {
        let key = Self::lpm_key(ip, prefix_len as u32);
        let map = self
            .ebpf
            .map_mut(map_names::GEOIP_MAP)
            .ok_or_else(|| ScrubError::MapNotFound(map_names::GEOIP_MAP.to_string()))?;
        let mut trie: LpmTrie<&mut MapData, u32, GeoipEntry> =
            LpmTrie::try_from(map).map_err(|source| ScrubError::MapOperation {
                map: map_names::GEOIP_MAP.to_string(),
                source,
            })?;
        trie.insert(&key, entry, 0).map_err(|source| ScrubError::MapOperation {
            map: map_names::GEOIP_MAP.to_string(),
            source,
        })
    }

    /// Pushes a country policy into the kernel map and the userspace mirror
    /// that [`MapManagerState::cached_country_policy`] reads from.
    pub fn set_country_policy(&mut self, country_id: u16, action: u8) -> Result<()> {
        let map = self
            .ebpf
            .map_mut(map_names::COUNTRY_POLICY)
            .ok_or_else(|| ScrubError::MapNotFound(map_names::COUNTRY_POLICY.to_string()))?;
        let mut hm: AyaHashMap<&mut MapData, u16, u8> =
            AyaHashMap::try_from(map).map_err(|source| ScrubError::MapOperation {
                map: map_names::COUNTRY_POLICY.to_string(),
                source,
            })?;
        hm.insert(country_id, action, 0).map_err(|source| ScrubError::MapOperation {
            map: map_names::COUNTRY_POLICY.to_string(),
            source,
        })?;
        self.state.country_policy_cache.insert(country_id, action);
        Ok(())
    }

    /// Registers (or updates) a UDP port's `port_protocol_flags` bitmask,
    /// letting the data plane apply reflector/amplification treatment to
    /// ports beyond the hardcoded DNS/NTP/SSDP/Memcached/CHARGEN/CLDAP/SNMP
    /// constants.
    pub fn register_port_protocol(&mut self, port: u16, flags: u8) -> Result<()> {
        let map = self
            .ebpf
            .map_mut(map_names::PORT_PROTOCOL_MAP)
            .ok_or_else(|| ScrubError::MapNotFound(map_names::PORT_PROTOCOL_MAP.to_string()))?;
        let mut hm: AyaHashMap<&mut MapData, u16, u8> =
            AyaHashMap::try_from(map).map_err(|source| ScrubError::MapOperation {
                map: map_names::PORT_PROTOCOL_MAP.to_string(),
                source,
            })?;
        hm.insert(port, flags, 0).map_err(|source| ScrubError::MapOperation {
            map: map_names::PORT_PROTOCOL_MAP.to_string(),
            source,
        })
    }

    /// Unregisters a previously-registered port.
    pub fn unregister_port_protocol(&mut self, port: u16) -> Result<()> {
        let map = self
            .ebpf
            .map_mut(map_names::PORT_PROTOCOL_MAP)
            .ok_or_else(|| ScrubError::MapNotFound(map_names::PORT_PROTOCOL_MAP.to_string()))?;
        let mut hm: AyaHashMap<&mut MapData, u16, u8> =
            AyaHashMap::try_from(map).map_err(|source| ScrubError::MapOperation {
                map: map_names::PORT_PROTOCOL_MAP.to_string(),
                source,
            })?;
        hm.remove(&port).map_err(|source| ScrubError::MapOperation {
            map: map_names::PORT_PROTOCOL_MAP.to_string(),
            source,
        })
    }

    pub fn set_config_scalar(&mut self, id: u32, value: u64) -> Result<()> {
        if id >= types::config_id::MAX {
            return Err(ScrubError::UnknownConfigId(id));
        }
        self.write_array(map_names::CONFIG, id, value)
    }

    pub fn apply_config(&mut self, pairs: &[(u32, u64)]) -> Result<()> {
        for &(id, value) in pairs {
            self.set_config_scalar(id, value)?;
        }
        Ok(())
    }

    /// Pushes an adaptive override into the kernel map and the userspace
    /// mirror that [`MapManagerState::cached_adaptive_override`] reads from.
    pub fn set_adaptive_override(&mut self, config_id: u32, value: u64) -> Result<()> {
        let map = self
            .ebpf
            .map_mut(map_names::ADAPTIVE_OVERRIDE)
            .ok_or_else(|| ScrubError::MapNotFound(map_names::ADAPTIVE_OVERRIDE.to_string()))?;
        let mut hm: AyaHashMap<&mut MapData, u32, u64> =
            AyaHashMap::try_from(map).map_err(|source| ScrubError::MapOperation {
                map: map_names::ADAPTIVE_OVERRIDE.to_string(),
                source,
            })?;
        hm.insert(config_id, value, 0).map_err(|source| ScrubError::MapOperation {
            map: map_names::ADAPTIVE_OVERRIDE.to_string(),
            source,
        })?;
        self.state.adaptive_override_cache.insert(config_id, value);
        Ok(())
    }

    /// Installs a signature rule at the first free slot, bumping
    /// `ATTACK_SIG_COUNT` if it grows the active set.
    pub fn install_signature_rule(&mut self, rule: SignatureRule) -> Result<usize> {
        let count = self.read_array_u32(map_names::ATTACK_SIG_COUNT)? as usize;
        if count >= types::limits::MAX_SIGNATURES as usize {
            return Err(ScrubError::SignatureTableFull(count));
        }
        self.write_array(map_names::ATTACK_SIG_MAP, count as u32, rule)?;
        self.write_array(map_names::ATTACK_SIG_COUNT, 0, (count + 1) as u32)?;
        Ok(count)
    }

    pub fn install_payload_rule(&mut self, rule: PayloadRule) -> Result<usize> {
        let count = self.read_array_u32(map_names::PAYLOAD_RULE_COUNT)? as usize;
        if count >= types::limits::MAX_PAYLOAD_RULES as usize {
            return Err(ScrubError::PayloadRuleTableFull(count));
        }
        self.write_array(map_names::PAYLOAD_RULES, count as u32, rule)?;
        self.write_array(map_names::PAYLOAD_RULE_COUNT, 0, (count + 1) as u32)?;
        Ok(count)
    }

    /// Clears a signature rule by swapping the last active rule into
    /// `index` and shrinking `ATTACK_SIG_COUNT`, so active rules always
    /// occupy a contiguous `0..count` prefix of the array.
    pub fn clear_signature_rule(&mut self, index: usize) -> Result<()> {
        let count = self.read_array_u32(map_names::ATTACK_SIG_COUNT)? as usize;
        if index >= count {
            return Err(ScrubError::SignatureIndexOutOfRange(index));
        }
        let last = count - 1;
        if index != last {
            let moved: SignatureRule = self.read_array(map_names::ATTACK_SIG_MAP, last as u32)?;
            self.write_array(map_names::ATTACK_SIG_MAP, index as u32, moved)?;
        }
        self.write_array(map_names::ATTACK_SIG_COUNT, 0, last as u32)
    }

    /// Clears a payload rule the same way `clear_signature_rule` does.
    pub fn clear_payload_rule(&mut self, index: usize) -> Result<()> {
        let count = self.read_array_u32(map_names::PAYLOAD_RULE_COUNT)? as usize;
        if index >= count {
            return Err(ScrubError::PayloadRuleIndexOutOfRange(index));
        }
        let last = count - 1;
        if index != last {
            let moved: PayloadRule = self.read_array(map_names::PAYLOAD_RULES, last as u32)?;
            self.write_array(map_names::PAYLOAD_RULES, index as u32, moved)?;
        }
        self.write_array(map_names::PAYLOAD_RULE_COUNT, 0, last as u32)
    }

    /// Flushes every tracked connection: collects keys first, then deletes
    /// them, since an `LruHashMap` iterator can't be mutated mid-walk.
    pub fn flush_conntrack(&mut self) -> Result<usize> {
        let map = self
            .ebpf
            .map_mut(map_names::CONNTRACK_MAP)
            .ok_or_else(|| ScrubError::MapNotFound(map_names::CONNTRACK_MAP.to_string()))?;
        let mut hm: LruHashMap<&mut MapData, u64, types::ConntrackEntry> =
            LruHashMap::try_from(map).map_err(|source| ScrubError::MapOperation {
                map: map_names::CONNTRACK_MAP.to_string(),
                source,
            })?;

        let keys: Vec<u64> = hm.keys().filter_map(|k| k.ok()).collect();
        let count = keys.len();
        for key in keys {
            let _ = hm.remove(&key);
        }
        Ok(count)
    }

    fn read_array_u32(&mut self, name: &str) -> Result<u32> {
        self.read_array(name, 0)
    }

    fn read_array<T: aya::Pod>(&mut self, name: &str, index: u32) -> Result<T> {
        let map = self
            .ebpf
            .map_mut(name)
            .ok_or_else(|| ScrubError::MapNotFound(name.to_string()))?;
        let arr: Array<&mut MapData, T> =
            Array::try_from(map).map_err(|source| ScrubError::MapOperation {
                map: name.to_string(),
                source,
            })?;
        arr.get(&index, 0).map_err(|source| ScrubError::MapOperation {
            map: name.to_string(),
            source,
        })
    }

    fn write_array<T: aya::Pod>(&mut self, name: &str, index: u32, value: T) -> Result<()> {
        let map = self
            .ebpf
            .map_mut(name)
            .ok_or_else(|| ScrubError::MapNotFound(name.to_string()))?;
        let mut arr: Array<&mut MapData, T> =
            Array::try_from(map).map_err(|source| ScrubError::MapOperation {
                map: name.to_string(),
                source,
            })?;
        arr.set(index, value, 0).map_err(|source| ScrubError::MapOperation {
            map: name.to_string(),
            source,
        })
    }

    /// Rotates the SYN cookie seed: the current seed becomes the previous
    /// one (so cookies issued just before rotation still validate), and
    /// `new_seed` becomes current. Updates the kernel map and the
    /// `parking_lot`-guarded cache together so the two never observably
    /// disagree.
    pub fn rotate_syn_cookie_seed(&mut self, new_seed: u32, now_ns: u64) -> Result<()> {
        let mut guard = self.state.syn_cookie_seed.lock();
        let (current_seed, _) = *guard;
        let rotated = types::SynCookieContext {
            current_seed: new_seed,
            previous_seed: current_seed,
            last_rotation_ns: now_ns,
        };
        self.write_array(map_names::SYN_COOKIE_MAP, 0, rotated)?;
        *guard = (new_seed, current_seed);
        Ok(())
    }

    /// Applies time decay to every tracked source's reputation score and
    /// clears the `BLOCKED` flag once a score has decayed back under
    /// `threshold / 2`. Sources the control plane has manually blocked
    /// (`MANUAL_BLOCK`) are never auto-unblocked by this sweep. Returns how
    /// many sources were unblocked this sweep.
    pub fn sweep_reputation(&mut self, now_ns: u64, decay_per_sec: u32, threshold: u32) -> Result<usize> {
        let map = self
            .ebpf
            .map_mut(map_names::REPUTATION_MAP)
            .ok_or_else(|| ScrubError::MapNotFound(map_names::REPUTATION_MAP.to_string()))?;
        let mut hm: LruHashMap<&mut MapData, u32, types::ReputationEntry> =
            LruHashMap::try_from(map).map_err(|source| ScrubError::MapOperation {
                map: map_names::REPUTATION_MAP.to_string(),
                source,
            })?;

        let keys: Vec<u32> = hm.keys().filter_map(|k| k.ok()).collect();
        let unblock_threshold = threshold / 2;

        let mut unblocked = 0;
        for key in keys {
            let mut entry = match hm.get(&key, 0) {
                Ok(e) => e,
                Err(_) => continue,
            };
            let elapsed_secs = now_ns.saturating_sub(entry.last_decay_ns) / 1_000_000_000;
            let decay = (elapsed_secs as u32).saturating_mul(decay_per_sec);
            entry.score = entry.score.saturating_sub(decay);
            entry.last_decay_ns = now_ns;
            let manually_blocked = entry.flags & types::reputation_flags::MANUAL_BLOCK != 0;
            if !manually_blocked
                && entry.score < unblock_threshold
                && entry.flags & types::reputation_flags::BLOCKED != 0
            {
                entry.flags &= !types::reputation_flags::BLOCKED;
                unblocked += 1;
            }
            let _ = hm.insert(key, entry, 0);
        }
        Ok(unblocked)
    }

    pub fn set_escalation_level(&mut self, level: u8) -> Result<()> {
        self.set_config_scalar(types::config_id::ESCALATION_LEVEL, level as u64)
    }

    /// Sums the per-CPU `Stats` slot into one snapshot.
    pub fn read_stats(&mut self) -> Result<StatsSnapshot> {
        let map = self
            .ebpf
            .map_mut(map_names::STATS_MAP)
            .ok_or_else(|| ScrubError::MapNotFound(map_names::STATS_MAP.to_string()))?;
        let arr: PerCpuArray<&mut MapData, Stats> =
            PerCpuArray::try_from(map).map_err(|source| ScrubError::MapOperation {
                map: map_names::STATS_MAP.to_string(),
                source,
            })?;
        let per_cpu = arr.get(&0, 0).map_err(|source| ScrubError::MapOperation {
            map: map_names::STATS_MAP.to_string(),
            source,
        })?;
        let total = per_cpu
            .iter()
            .map(|s| StatsSnapshot::from(*s))
            .fold(StatsSnapshot::default(), |acc, s| acc + s);
        Ok(total)
    }

    /// Drains all currently available events out of the ring buffer.
    /// Non-blocking: returns whatever is available right now.
    pub fn drain_events(&mut self) -> Result<Vec<ScrubEvent>> {
        let map = self
            .ebpf
            .map_mut(map_names::EVENTS)
            .ok_or_else(|| ScrubError::MapNotFound(map_names::EVENTS.to_string()))?;
        let mut ring: RingBuf<&mut MapData> =
            RingBuf::try_from(map).map_err(|source| ScrubError::MapOperation {
                map: map_names::EVENTS.to_string(),
                source,
            })?;

        let mut events = Vec::new();
        while let Some(item) = ring.next() {
            if item.len() < std::mem::size_of::<types::EventRecord>() {
                continue;
            }
            let record: types::EventRecord =
                unsafe { std::ptr::read_unaligned(item.as_ptr() as *const types::EventRecord) };
            events.push(record.into());
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lpm_key_uses_network_byte_order() {
        let key = MapManager::lpm_key(Ipv4Addr::new(10, 0, 0, 1), 24);
        assert_eq!(key.prefix_len, 24);
        let expected = u32::from(Ipv4Addr::new(10, 0, 0, 1)).to_be();
        assert_eq!(key.data, expected);
    }

    #[test]
    fn state_caches_start_empty() {
        let state = MapManagerState::new();
        assert_eq!(state.cached_syn_cookie_seed(), (0, 0));
        assert_eq!(state.cached_adaptive_override(1), None);
        assert_eq!(state.cached_country_policy(840), None);
    }
}
