//! Hardware generation and capability detection (`spec.md §3`, `§4.2`).
//!
//! Grounded on `hadron-drivers`'s `e1000e::probe` two-phase init (reset,
//! read MAC, read status) generalized to the EL3 family's two detection
//! phases: identification from a static `(vendor, device)` table, then
//! runtime refinement by probing the ASIC revision register.

use crate::error::CapabilityError;
use crate::hal::PciConfigIo;

/// Hardware family, ordered oldest to newest so `generation >=
/// Generation::BOOMERANG` style invariant checks are plain comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Generation {
    /// 3C509B — PIO only.
    El3Orig = 0,
    /// Vortex — PIO with a permanently-selected window 1.
    Vortex = 1,
    /// Boomerang — first bus-master DMA generation.
    Boomerang = 2,
    /// Cyclone — DMA plus power management.
    Cyclone = 3,
    /// Tornado — DMA plus Wake-on-LAN.
    Tornado = 4,
}

impl Generation {
    /// One step up the generation ladder, or `None` at `Tornado`.
    #[must_use]
    pub fn promote(self) -> Option<Self> {
        match self {
            Self::El3Orig => Some(Self::Vortex),
            Self::Vortex => Some(Self::Boomerang),
            Self::Boomerang => Some(Self::Cyclone),
            Self::Cyclone => Some(Self::Tornado),
            Self::Tornado => None,
        }
    }

    /// Number of steps between `self` and `other` on the generation
    /// ladder, used to detect "more than one generation step" mismatches
    /// (`spec.md §4.2`).
    #[must_use]
    pub fn steps_from(self, other: Self) -> i8 {
        self as i8 - other as i8
    }
}

bitflags::bitflags! {
    /// Capability bits derived from `Generation` plus runtime probing
    /// (`spec.md §3`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CapFlags: u32 {
        /// Bus-master DMA datapath available.
        const HAS_BUS_MASTER       = 1 << 0;
        /// Window 1 is permanently selected; the datapath never switches
        /// windows.
        const HAS_PERMANENT_WINDOW1 = 1 << 1;
        /// Hardware checksum offload.
        const HAS_HW_CHECKSUM     = 1 << 2;
        /// Wake-on-LAN support.
        const HAS_WOL             = 1 << 3;
        /// ACPI-style power management capability present.
        const HAS_POWER_MGMT      = 1 << 4;
        /// MII transceiver present.
        const HAS_MII             = 1 << 5;
        /// Device is on the PCI bus (vs. ISA).
        const HAS_PCI             = 1 << 6;
        /// 100BASE-TX capable.
        const HAS_100BASE         = 1 << 7;
        /// MSI capability present (PCI only).
        const HAS_MSI             = 1 << 8;
        /// FIFO is the larger 8 KiB size (vs. 2 KiB).
        const FIFO_8K             = 1 << 9;
    }
}

/// Full capability set for one device: the bitflags above plus the
/// non-flag fields `spec.md §3` calls out (`FIFO_SIZE`, `TX_THRESHOLD`,
/// `RX_COPYBREAK`) that don't fit a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySet {
    /// Bitflags (see [`CapFlags`]).
    pub flags: CapFlags,
    /// On-chip FIFO size in bytes (2048 or 8192).
    pub fifo_size: u16,
    /// TX threshold in bytes: start transmitting once this many bytes are
    /// in the FIFO.
    pub tx_threshold: u16,
    /// RX frames shorter than this are always copied out of the DMA
    /// buffer immediately, releasing it back to the ring.
    pub rx_copybreak: u16,
}

impl CapabilitySet {
    /// True if `flags` contains `flag`.
    #[must_use]
    pub fn has(&self, flag: CapFlags) -> bool {
        self.flags.contains(flag)
    }
}

/// One entry of the static `(vendor, device) -> (generation, base caps)`
/// database (`spec.md §2` component 2).
#[derive(Debug, Clone, Copy)]
pub struct CapabilityDbEntry {
    /// PCI vendor ID, or `0` for ISA entries identified by EEPROM tag.
    pub vendor: u16,
    /// PCI device ID, or an EEPROM product-ID tag for ISA entries.
    pub device: u16,
    /// The generation this `(vendor, device)` pair claims to be.
    pub generation: Generation,
    /// The base capability set before runtime refinement.
    pub base_caps: CapabilitySet,
}

const FIFO_2K: u16 = 2048;
const FIFO_8K_BYTES: u16 = 8192;

/// 3Com's PCI vendor ID (`spec.md §4.2`).
pub const VENDOR_3COM: u16 = 0x10B7;

/// The 3C509B's ISA EEPROM product-ID tag.
const ISA_TAG_3C509B: u16 = 0x6D50;

/// Static capability database, indexed by `(vendor, device)`.
pub const CAPABILITY_DB: &[CapabilityDbEntry] = &[
    CapabilityDbEntry {
        vendor: 0,
        device: ISA_TAG_3C509B,
        generation: Generation::El3Orig,
        base_caps: CapabilitySet {
            flags: CapFlags::empty(),
            fifo_size: FIFO_2K,
            tx_threshold: 256,
            rx_copybreak: 200,
        },
    },
    CapabilityDbEntry {
        vendor: VENDOR_3COM,
        device: 0x5900, // 3C590 Vortex
        generation: Generation::Vortex,
        base_caps: CapabilitySet {
            flags: CapFlags::HAS_PCI.union(CapFlags::HAS_PERMANENT_WINDOW1),
            fifo_size: FIFO_2K,
            tx_threshold: 256,
            rx_copybreak: 200,
        },
    },
    CapabilityDbEntry {
        vendor: VENDOR_3COM,
        device: 0x5920, // 3C592 Vortex 100baseT
        generation: Generation::Vortex,
        base_caps: CapabilitySet {
            flags: CapFlags::HAS_PCI
                .union(CapFlags::HAS_PERMANENT_WINDOW1)
                .union(CapFlags::HAS_100BASE),
            fifo_size: FIFO_2K,
            tx_threshold: 256,
            rx_copybreak: 200,
        },
    },
    CapabilityDbEntry {
        vendor: VENDOR_3COM,
        device: 0x5157, // 3C515-TX "Corkscrew" (ISA Boomerang datapath)
        generation: Generation::Boomerang,
        base_caps: CapabilitySet {
            flags: CapFlags::HAS_BUS_MASTER.union(CapFlags::HAS_100BASE),
            fifo_size: FIFO_8K_BYTES,
            tx_threshold: 256,
            rx_copybreak: 200,
        },
    },
    CapabilityDbEntry {
        vendor: VENDOR_3COM,
        device: 0x9000, // 3C900 Boomerang
        generation: Generation::Boomerang,
        base_caps: CapabilitySet {
            flags: CapFlags::HAS_PCI
                .union(CapFlags::HAS_BUS_MASTER)
                .union(CapFlags::HAS_PERMANENT_WINDOW1),
            fifo_size: FIFO_8K_BYTES,
            tx_threshold: 256,
            rx_copybreak: 200,
        },
    },
    CapabilityDbEntry {
        vendor: VENDOR_3COM,
        device: 0x9200, // 3C905B Cyclone
        generation: Generation::Cyclone,
        base_caps: CapabilitySet {
            flags: CapFlags::HAS_PCI
                .union(CapFlags::HAS_BUS_MASTER)
                .union(CapFlags::HAS_PERMANENT_WINDOW1)
                .union(CapFlags::HAS_HW_CHECKSUM)
                .union(CapFlags::HAS_100BASE)
                .union(CapFlags::HAS_MII),
            fifo_size: FIFO_8K_BYTES,
            tx_threshold: 256,
            rx_copybreak: 200,
        },
    },
    CapabilityDbEntry {
        vendor: VENDOR_3COM,
        device: 0x9201, // 3C905C Tornado
        generation: Generation::Tornado,
        base_caps: CapabilitySet {
            flags: CapFlags::HAS_PCI
                .union(CapFlags::HAS_BUS_MASTER)
                .union(CapFlags::HAS_PERMANENT_WINDOW1)
                .union(CapFlags::HAS_HW_CHECKSUM)
                .union(CapFlags::HAS_100BASE)
                .union(CapFlags::HAS_MII)
                .union(CapFlags::HAS_WOL),
            fifo_size: FIFO_8K_BYTES,
            tx_threshold: 256,
            rx_copybreak: 200,
        },
    },
];

/// Phase A: look up `(vendor, device)` in the static database
/// (`spec.md §4.2`).
pub fn identify(vendor: u16, device: u16) -> Result<CapabilityDbEntry, CapabilityError> {
    CAPABILITY_DB
        .iter()
        .copied()
        .find(|e| e.vendor == vendor && e.device == device)
        .ok_or(CapabilityError::NotFound)
}

/// Runtime-probed facts used by Phase B (`spec.md §4.2`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeResult {
    /// Generation implied by the ASIC-revision register, independent of
    /// what Phase A claimed.
    pub asic_generation: Option<Generation>,
    /// Media-options register indicated an MII transceiver.
    pub has_mii: bool,
    /// Media-options register indicated 100BASE-TX support.
    pub has_100base: bool,
    /// A PM capability was found while walking the PCI capability list.
    pub has_power_mgmt: bool,
    /// An MSI capability was found while walking the PCI capability list.
    pub has_msi: bool,
    /// The Wake-on-LAN bit was set (only checked for `Cyclone`+).
    pub has_wol: bool,
}

/// Phase B: refine the Phase A result using runtime probes
/// (`spec.md §4.2`).
///
/// Returns `Err(CapabilityError::Inconsistent)` if the ASIC-revision class
/// disagrees with the claimed generation by more than one step — this
/// guards against cloned or misidentified hardware, per `spec.md`.
pub fn refine(
    entry: CapabilityDbEntry,
    probe: ProbeResult,
) -> Result<(Generation, CapabilitySet), CapabilityError> {
    let mut generation = entry.generation;
    if let Some(asic_gen) = probe.asic_generation {
        let steps = asic_gen.steps_from(entry.generation);
        if steps.abs() > 1 {
            return Err(CapabilityError::Inconsistent);
        }
        if steps == 1 {
            // "newer than claimed" by exactly one step: promote.
            generation = entry
                .generation
                .promote()
                .unwrap_or(entry.generation);
        }
    }

    let mut flags = entry.base_caps.flags;
    if probe.has_mii {
        flags |= CapFlags::HAS_MII;
    }
    if probe.has_100base {
        flags |= CapFlags::HAS_100BASE;
    }
    if flags.contains(CapFlags::HAS_PCI) {
        if probe.has_power_mgmt {
            flags |= CapFlags::HAS_POWER_MGMT;
        }
        if probe.has_msi {
            flags |= CapFlags::HAS_MSI;
        }
    }
    if generation >= Generation::Cyclone && probe.has_wol {
        flags |= CapFlags::HAS_WOL;
    }

    debug_assert!(
        !flags.contains(CapFlags::HAS_BUS_MASTER) || generation >= Generation::Boomerang,
        "HAS_BUS_MASTER implies generation >= BOOMERANG"
    );
    debug_assert!(
        !flags.contains(CapFlags::HAS_PERMANENT_WINDOW1) || generation >= Generation::Vortex,
        "HAS_PERMANENT_WINDOW1 implies generation >= VORTEX"
    );

    Ok((
        generation,
        CapabilitySet {
            flags,
            ..entry.base_caps
        },
    ))
}

/// Walks the PCI capability-pointer linked list starting at `cap_ptr`,
/// setting `has_power_mgmt`/`has_msi` in `probe` (`spec.md §4.2` Phase B).
pub fn walk_pci_capabilities(
    io: &mut impl PciConfigIo,
    cap_ptr: u8,
    probe: &mut ProbeResult,
) {
    const CAP_ID_PM: u8 = 0x01;
    const CAP_ID_MSI: u8 = 0x05;
    const MAX_CAPS: usize = 16; // guards against a corrupt/cyclic list

    let mut ptr = cap_ptr & !0x3;
    for _ in 0..MAX_CAPS {
        if ptr == 0 {
            break;
        }
        let header = io.read_config_u16(ptr);
        let id = (header & 0xFF) as u8;
        let next = ((header >> 8) & 0xFF) as u8;
        match id {
            id if id == CAP_ID_PM => probe.has_power_mgmt = true,
            id if id == CAP_ID_MSI => probe.has_msi = true,
            _ => {}
        }
        ptr = next & !0x3;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_known_device() {
        let e = identify(VENDOR_3COM, 0x9201).unwrap();
        assert_eq!(e.generation, Generation::Tornado);
    }

    #[test]
    fn identify_unknown_device_not_found() {
        assert_eq!(identify(0xDEAD, 0xBEEF), Err(CapabilityError::NotFound));
    }

    #[test]
    fn refine_promotes_by_exactly_one_step() {
        // Boomerang claim, Cyclone-class ASIC revision: promote to Cyclone.
        let entry = identify(VENDOR_3COM, 0x9000).unwrap();
        let probe = ProbeResult {
            asic_generation: Some(Generation::Cyclone),
            ..Default::default()
        };
        let (gen, caps) = refine(entry, probe).unwrap();
        assert_eq!(gen, Generation::Cyclone);
        assert!(caps.has(CapFlags::HAS_BUS_MASTER));
    }

    #[test]
    fn refine_rejects_inconsistent_by_more_than_one_step() {
        // Tornado claim, Boomerang ASIC: >1 step away, must be rejected.
        let entry = identify(VENDOR_3COM, 0x9201).unwrap();
        let probe = ProbeResult {
            asic_generation: Some(Generation::Boomerang),
            ..Default::default()
        };
        assert_eq!(refine(entry, probe), Err(CapabilityError::Inconsistent));
    }

    #[test]
    fn bus_master_implies_boomerang_or_later() {
        let entry = identify(0, ISA_TAG_3C509B).unwrap();
        assert!(!entry.base_caps.has(CapFlags::HAS_BUS_MASTER));
        assert_eq!(entry.generation, Generation::El3Orig);
    }

    #[test]
    fn power_mgmt_only_promoted_for_pci_devices() {
        // ISA device: even if the probe somehow reports PM, it must not stick.
        let entry = identify(0, ISA_TAG_3C509B).unwrap();
        let probe = ProbeResult {
            has_power_mgmt: true,
            ..Default::default()
        };
        let (_, caps) = refine(entry, probe).unwrap();
        assert!(!caps.has(CapFlags::HAS_POWER_MGMT));
    }
}
