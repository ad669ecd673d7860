//! Error types for the control plane.

use std::path::PathBuf;

/// Errors surfaced by eBPF loading, map access, configuration, and the
/// control surface. Boundary code (CLI bootstrap, signal handlers) is free
/// to wrap these in `anyhow::Error` instead of matching on variants.
#[derive(Debug, thiserror::Error)]
pub enum ScrubError {
    #[error("failed to load eBPF object from {path}: {source}")]
    EbpfLoad {
        path: PathBuf,
        #[source]
        source: aya::EbpfError,
    },

    #[error("eBPF program '{0}' not found in object")]
    ProgramNotFound(String),

    #[error("eBPF program '{0}' is not an XDP program")]
    WrongProgramType(String),

    #[error("failed to load XDP program '{name}': {source}")]
    ProgramLoad {
        name: String,
        #[source]
        source: aya::programs::ProgramError,
    },

    #[error("failed to attach XDP program to interface '{interface}': {source}")]
    Attach {
        interface: String,
        #[source]
        source: aya::programs::ProgramError,
    },

    #[error("no attached program found for interface '{0}'")]
    NotAttached(String),

    #[error("map '{0}' not found in loaded eBPF object")]
    MapNotFound(String),

    #[error("map '{name}' has unexpected type: {reason}")]
    MapType { name: String, reason: String },

    #[error("map operation on '{map}' failed: {source}")]
    MapOperation {
        map: String,
        #[source]
        source: aya::maps::MapError,
    },

    #[error("unknown config scalar id {0}")]
    UnknownConfigId(u32),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("signature table is full ({0} entries)")]
    SignatureTableFull(usize),

    #[error("payload rule table is full ({0} entries)")]
    PayloadRuleTableFull(usize),

    #[error("signature rule index {0} out of range")]
    SignatureIndexOutOfRange(usize),

    #[error("payload rule index {0} out of range")]
    PayloadRuleIndexOutOfRange(usize),
}

pub type Result<T> = std::result::Result<T, ScrubError>;
