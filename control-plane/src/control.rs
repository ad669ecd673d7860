//! Ties the loader and map manager together behind the operations a
//! deployment actually performs: attach, push config, manage the ACL,
//! pull stats, drain events, detach on shutdown.

use std::net::Ipv4Addr;

use tracing::info;

use crate::config::{EscalationLevel, ScrubConfig};
use crate::ebpf::{EbpfLoader, MapManager, MapManagerState, XdpMode};
use crate::error::Result;
use crate::types::{ScrubEvent, StatsSnapshot};

pub const XDP_PROGRAM_NAME: &str = "xdp_scrub";

pub struct ControlPlane {
    loader: EbpfLoader,
    config: ScrubConfig,
    map_state: MapManagerState,
}

impl ControlPlane {
    pub fn new(loader: EbpfLoader, config: ScrubConfig) -> Self {
        Self {
            loader,
            config,
            map_state: MapManagerState::new(),
        }
    }

    pub fn config(&self) -> &ScrubConfig {
        &self.config
    }

    fn maps(&mut self) -> MapManager<'_> {
        MapManager::new(self.loader.ebpf_mut(), &mut self.map_state)
    }

    /// Attaches `xdp_scrub` to the configured interface and pushes the
    /// current config into the `CONFIG` map, in that order: a config push
    /// before attach would write into a map the kernel hasn't loaded yet.
    pub fn start(&mut self) -> Result<()> {
        let mode: XdpMode = self.config.xdp_mode.parse()?;
        let interface = self.config.interface.clone();
        self.loader.attach_xdp(XDP_PROGRAM_NAME, &interface, mode)?;
        self.push_config()?;
        info!(interface, "control plane started");
        Ok(())
    }

    pub fn push_config(&mut self) -> Result<()> {
        let pairs = self.config.to_scalar_pairs();
        self.maps().apply_config(&pairs)
    }

    pub fn set_escalation_level(&mut self, level: EscalationLevel) -> Result<()> {
        self.config.escalation_level = level;
        self.maps().set_escalation_level(level.as_u8())
    }

    pub fn block_ip(&mut self, ip: Ipv4Addr, prefix_len: u8, reason: u8, ttl_secs: u64, now: u64) -> Result<()> {
        self.maps().block_ip(ip, prefix_len, reason, ttl_secs, now)
    }

    pub fn unblock_ip(&mut self, ip: Ipv4Addr, prefix_len: u8) -> Result<()> {
        self.maps().unblock_ip(ip, prefix_len)
    }

    pub fn allow_ip(&mut self, ip: Ipv4Addr, prefix_len: u8, tag: u32, ttl_secs: u64, now: u64) -> Result<()> {
        self.maps().allow_ip(ip, prefix_len, tag, ttl_secs, now)
    }

    pub fn disallow_ip(&mut self, ip: Ipv4Addr, prefix_len: u8) -> Result<()> {
        self.maps().disallow_ip(ip, prefix_len)
    }

    pub fn set_country_policy(&mut self, country_id: u16, action: u8) -> Result<()> {
        self.maps().set_country_policy(country_id, action)
    }

    pub fn set_tcp_rate_limit(&mut self, pps: u64) -> Result<()> {
        self.config.tcp_pps_limit = pps;
        self.maps()
            .set_config_scalar(crate::types::config_id::TCP_PPS_LIMIT, pps)
    }

    pub fn set_udp_rate_limit(&mut self, pps: u64) -> Result<()> {
        self.config.udp_pps_limit = pps;
        self.maps()
            .set_config_scalar(crate::types::config_id::UDP_PPS_LIMIT, pps)
    }

    pub fn set_icmp_rate_limit(&mut self, pps: u64) -> Result<()> {
        self.config.icmp_pps_limit = pps;
        self.maps()
            .set_config_scalar(crate::types::config_id::ICMP_PPS_LIMIT, pps)
    }

    pub fn set_adaptive_override(&mut self, config_id: u32, value: u64) -> Result<()> {
        self.maps().set_adaptive_override(config_id, value)
    }

    pub fn register_port_protocol(&mut self, port: u16, flags: u8) -> Result<()> {
        self.maps().register_port_protocol(port, flags)
    }

    pub fn unregister_port_protocol(&mut self, port: u16) -> Result<()> {
        self.maps().unregister_port_protocol(port)
    }

    pub fn install_signature_rule(
        &mut self,
        rule: crate::types::SignatureRule,
    ) -> Result<usize> {
        self.maps().install_signature_rule(rule)
    }

    pub fn install_payload_rule(&mut self, rule: crate::types::PayloadRule) -> Result<usize> {
        self.maps().install_payload_rule(rule)
    }

    pub fn clear_signature_rule(&mut self, index: usize) -> Result<()> {
        self.maps().clear_signature_rule(index)
    }

    pub fn clear_payload_rule(&mut self, index: usize) -> Result<()> {
        self.maps().clear_payload_rule(index)
    }

    pub fn flush_conntrack(&mut self) -> Result<usize> {
        self.maps().flush_conntrack()
    }

    pub fn stats(&mut self) -> Result<StatsSnapshot> {
        self.maps().read_stats()
    }

    pub fn drain_events(&mut self) -> Result<Vec<ScrubEvent>> {
        self.maps().drain_events()
    }

    pub fn cleanup_expired_acl_entries(&mut self, now: u64) -> Result<usize> {
        self.maps().cleanup_expired(now)
    }

    pub fn rotate_syn_cookie_seed(&mut self, new_seed: u32, now_ns: u64) -> Result<()> {
        self.maps().rotate_syn_cookie_seed(new_seed, now_ns)
    }

    pub fn sweep_reputation(&mut self, now_ns: u64, decay_per_sec: u32, threshold: u32) -> Result<usize> {
        self.maps().sweep_reputation(now_ns, decay_per_sec, threshold)
    }

    pub fn is_attached(&self) -> bool {
        self.loader.is_attached(&self.config.interface)
    }

    pub fn shutdown(&mut self) -> Result<()> {
        if self.is_attached() {
            let interface = self.config.interface.clone();
            self.loader.detach_xdp(&interface)?;
            info!(interface, "xdp program detached");
        }
        Ok(())
    }
}
