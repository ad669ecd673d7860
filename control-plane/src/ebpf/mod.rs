//! eBPF object loading, attachment, and map access.

pub mod loader;
pub mod map_manager;
#[cfg(test)]
mod tests;

pub use loader::{AttachedProgram, EbpfLoader, XdpMode};
pub use map_manager::{MapManager, MapManagerState};
