//! Userspace control plane for the `xdp_scrub` packet scrubber.
//!
//! Loads and attaches the XDP program, pushes configuration into its maps,
//! manages the ACL/threat-intel/GeoIP tables, and runs the background
//! maintenance tasks (SYN cookie rotation, reputation decay, ACL expiry,
//! event draining) that keep the data plane's state current.

pub mod config;
pub mod control;
pub mod ebpf;
pub mod error;
pub mod scheduler;
pub mod types;

pub use config::ScrubConfig;
pub use control::ControlPlane;
pub use error::{Result, ScrubError};
