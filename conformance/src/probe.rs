//! Detection of the vsock transports loaded in the running kernel.
//!
//! Each transport registers a well-known kernel symbol; finding it in
//! `/proc/kallsyms` means the transport is available.

use std::fs;
use std::io;

use bitflags::bitflags;

const KALLSYMS_PATH: &str = "/proc/kallsyms";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Transports: u8 {
        const LOOPBACK = 1 << 0;
        const VIRTIO = 1 << 1;
        const VHOST = 1 << 2;
        const VMCI = 1 << 3;
        const HYPERV = 1 << 4;

        /// Guest-to-host transports.
        const G2H = Self::VIRTIO.bits() | Self::VMCI.bits() | Self::HYPERV.bits();
        /// Host-to-guest transports.
        const H2G = Self::VHOST.bits() | Self::VMCI.bits();
        const LOCAL = Self::LOOPBACK.bits();
    }
}

const SYMBOLS: &[(&str, Transports)] = &[
    ("loopback_transport", Transports::LOOPBACK),
    ("virtio_transport", Transports::VIRTIO),
    ("vhost_transport", Transports::VHOST),
    ("vmci_transport", Transports::VMCI),
    ("hvs_transport", Transports::HYPERV),
];

impl Transports {
    /// Scan the running kernel's symbol table.
    pub fn detect() -> io::Result<Self> {
        let kallsyms = fs::read_to_string(KALLSYMS_PATH)?;
        Ok(Self::parse(&kallsyms))
    }

    /// Parse `kallsyms`-formatted text: `<address> <type> <name> [module]`.
    pub fn parse(kallsyms: &str) -> Self {
        let mut found = Transports::empty();
        for line in kallsyms.lines() {
            let Some(name) = line.split_whitespace().nth(2) else {
                continue;
            };
            if let Some((_, transport)) = SYMBOLS.iter().find(|(sym, _)| *sym == name) {
                found |= *transport;
            }
        }
        found
    }

    pub fn names(self) -> Vec<&'static str> {
        SYMBOLS
            .iter()
            .filter(|(_, transport)| self.contains(*transport))
            .map(|(sym, _)| sym.trim_end_matches("_transport"))
            .collect()
    }
}
