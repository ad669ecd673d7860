//! Control-plane configuration.
//!
//! `ScrubConfig` is the typed, validated configuration surface. Loading it
//! from a file/environment is out of scope here (see Non-goals); the
//! `from_builder` conversion exists so the shape is wired up the way the
//! rest of the fleet loads config, even though nothing calls it with a real
//! file path yet.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrubError};

/// One mitigation stage's enable flag plus any stage-specific knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrubConfig {
    pub enabled: bool,

    pub tcp_pps_limit: u64,
    pub udp_pps_limit: u64,
    pub icmp_pps_limit: u64,
    pub global_pps_limit: u64,
    pub global_bps_limit: u64,

    pub syn_cookie_enable: bool,
    pub conntrack_enable: bool,

    pub learned_baseline_pps: u64,
    pub attack_threshold_multiplier: f64,

    pub geoip_enable: bool,
    pub reputation_enable: bool,
    pub proto_validation_enable: bool,
    pub payload_match_enable: bool,
    pub threat_intel_enable: bool,
    pub tcp_state_enable: bool,
    pub adaptive_rate_enable: bool,

    pub escalation_level: EscalationLevel,
    pub reputation_score_threshold: u32,
    pub dns_validation_mode: DnsValidationMode,

    /// Interface to attach `xdp_scrub` to.
    pub interface: String,
    /// Preferred XDP attach mode, with automatic fallback on failure.
    pub xdp_mode: String,
    /// Path to the compiled `xdp_scrub` object, produced by building the
    /// `packetscrub-ebpf` crate for the `bpfel-unknown-none` target.
    pub bpf_object_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl EscalationLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            EscalationLevel::Low => 0,
            EscalationLevel::Medium => 1,
            EscalationLevel::High => 2,
            EscalationLevel::Critical => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DnsValidationMode {
    Off,
    AmplificationOnly,
    Strict,
}

impl DnsValidationMode {
    pub fn as_u64(self) -> u64 {
        match self {
            DnsValidationMode::Off => 0,
            DnsValidationMode::AmplificationOnly => 1,
            DnsValidationMode::Strict => 2,
        }
    }
}

impl Default for ScrubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tcp_pps_limit: 50_000,
            udp_pps_limit: 20_000,
            icmp_pps_limit: 2_000,
            global_pps_limit: 5_000_000,
            global_bps_limit: 10_000_000_000,
            syn_cookie_enable: true,
            conntrack_enable: true,
            learned_baseline_pps: 0,
            attack_threshold_multiplier: 3.0,
            geoip_enable: true,
            reputation_enable: true,
            proto_validation_enable: true,
            payload_match_enable: true,
            threat_intel_enable: true,
            tcp_state_enable: true,
            adaptive_rate_enable: true,
            escalation_level: EscalationLevel::Low,
            reputation_score_threshold: 500,
            dns_validation_mode: DnsValidationMode::AmplificationOnly,
            interface: "eth0".to_string(),
            xdp_mode: "driver".to_string(),
            bpf_object_path: "/usr/lib/packetscrub/xdp_scrub".to_string(),
        }
    }
}

impl ScrubConfig {
    /// Build a `ScrubConfig` from a pre-populated `config::Config`. Loading
    /// files/env vars into that builder is the caller's responsibility.
    pub fn from_builder(builder: config::Config) -> Result<Self> {
        builder
            .try_deserialize()
            .map_err(|e| ScrubError::InvalidConfig(e.to_string()))
    }

    /// Flatten into `(config_id, value)` pairs ready to write into the
    /// `CONFIG` map, using the same numbering as the data plane's
    /// `config_id` module.
    pub fn to_scalar_pairs(&self) -> Vec<(u32, u64)> {
        vec![
            (0, self.enabled as u64),
            (1, self.tcp_pps_limit),
            (2, self.udp_pps_limit),
            (3, self.icmp_pps_limit),
            (4, self.global_pps_limit),
            (5, self.global_bps_limit),
            (6, self.syn_cookie_enable as u64),
            (7, self.conntrack_enable as u64),
            (8, self.learned_baseline_pps),
            (9, (self.attack_threshold_multiplier * 100.0).round() as u64),
            (10, self.geoip_enable as u64),
            (11, self.reputation_enable as u64),
            (12, self.proto_validation_enable as u64),
            (13, self.payload_match_enable as u64),
            (14, self.threat_intel_enable as u64),
            (15, self.tcp_state_enable as u64),
            (16, self.adaptive_rate_enable as u64),
            (17, self.escalation_level.as_u8() as u64),
            (18, self.reputation_score_threshold as u64),
            (19, self.dns_validation_mode.as_u64()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_enables_all_stages() {
        let cfg = ScrubConfig::default();
        assert!(cfg.enabled);
        assert!(cfg.syn_cookie_enable);
        assert!(cfg.conntrack_enable);
        assert!(cfg.geoip_enable);
    }

    #[test]
    fn scalar_pairs_match_config_id_numbering() {
        let cfg = ScrubConfig::default();
        let pairs = cfg.to_scalar_pairs();
        assert_eq!(pairs.len(), 20);
        assert_eq!(pairs[0], (0, 1));
        assert_eq!(pairs[17].0, 17);
    }

    #[test]
    fn escalation_level_serializes_snake_case() {
        let json = serde_json::to_string(&EscalationLevel::High).unwrap();
        assert_eq!(json, "\"high\"");
    }
}
