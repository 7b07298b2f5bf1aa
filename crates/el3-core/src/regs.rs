//! Windowed register layout and the `select_window` discipline
//! (`spec.md §4.1`, `§6.2`).
//!
//! The EL3 family multiplexes 8 register banks ("windows") onto the same
//! 16-byte I/O range; the command register and status register at offsets
//! 0x0E/0x0E are the only ones visible in every window. Callers never poke
//! `PortIo` directly with a raw offset outside this module — they go
//! through [`Window`]'s `select` and the per-window accessors, so the
//! window-cache invariant (`spec.md §4.1`, "never re-select an
//! already-selected window") is enforced once, here.

use crate::hal::PortIo;

/// Command register offset, common to every window.
pub const REG_COMMAND: u16 = 0x0E;
/// Status register offset, common to every window.
pub const REG_STATUS: u16 = 0x0E;

/// Command codes, shifted into the top 5 bits of the command word
/// (`spec.md §6.2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    GlobalReset = 0x00,
    SelectWindow = 0x01,
    StartCoax = 0x02,
    RxDisable = 0x03,
    RxEnable = 0x04,
    RxReset = 0x05,
    /// Stall/unstall the download or upload DMA engine; the direction and
    /// sense are carried in the argument, see [`stall_arg`] (`spec.md
    /// §6.2`).
    Stall = 0x06,
    TxDone = 0x07,
    RxDiscard = 0x08,
    TxEnable = 0x09,
    TxDisable = 0x0A,
    TxReset = 0x0B,
    RequestInterrupt = 0x0C,
    AckInterrupt = 0x0D,
    SetInterruptMask = 0x0E,
    SetReadZeroMask = 0x0F,
    SetRxFilter = 0x10,
    SetRxEarlyThresh = 0x11,
    SetTxAvailThresh = 0x12,
    SetTxStartThresh = 0x13,
    StatisticsEnable = 0x15,
    StatisticsDisable = 0x16,
    DmaStop = 0x18,
}

/// Arguments to `Command::Stall` (`spec.md §6.2`): which engine, which
/// direction.
pub mod stall_arg {
    pub const UP_STALL: u16 = 0;
    pub const UP_UNSTALL: u16 = 1;
    pub const DN_STALL: u16 = 2;
    pub const DN_UNSTALL: u16 = 3;
}

/// `SET_RX_FILTER` argument bits: which frames the adapter accepts.
/// Combined with bitwise OR; an empty set disables reception entirely.
pub mod rx_filter {
    pub const STATION: u16 = 1 << 0;
    pub const BROADCAST: u16 = 1 << 1;
    pub const ALL_MULTICAST: u16 = 1 << 2;
    pub const PROMISCUOUS: u16 = 1 << 3;
}

/// Builds a command-register word: 5-bit command code in the high bits,
/// an 11-bit argument in the low bits (`spec.md §6.2`).
#[must_use]
pub fn command_word(cmd: Command, arg: u16) -> u16 {
    ((cmd as u16) << 11) | (arg & 0x07FF)
}

bitflags::bitflags! {
    /// Status register bits, valid in every window (`spec.md §6.2`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u16 {
        const INTERRUPT_LATCH       = 1 << 0;
        const ADAPTER_FAILURE       = 1 << 1;
        const TX_COMPLETE           = 1 << 2;
        const TX_AVAILABLE          = 1 << 3;
        const RX_COMPLETE           = 1 << 4;
        const RX_EARLY              = 1 << 5;
        const INTERRUPT_REQUESTED   = 1 << 6;
        const UPDATE_STATS          = 1 << 7;
        const DN_COMPLETE           = 1 << 9;
        const UP_COMPLETE           = 1 << 10;
        const CMD_IN_PROGRESS       = 1 << 12;
    }
}

/// Window 1 ("operating set") register offsets: the FIFOs and the PIO
/// status registers (`spec.md §4.1`, §6.2).
pub mod window1 {
    pub const TX_FIFO: u16 = 0x00;
    pub const RX_FIFO: u16 = 0x00;
    pub const RX_STATUS: u16 = 0x08;
    pub const TX_STATUS: u16 = 0x0B;
    pub const TX_FREE: u16 = 0x0C;
}

/// Window 7 ("bus master control") register offsets: the DMA control and
/// descriptor list pointers (`spec.md §4.4`, §6.2).
pub mod window7 {
    pub const DMA_CTRL: u16 = 0x20;
    pub const DOWN_LIST_PTR: u16 = 0x24;
    pub const DOWN_POLL: u16 = 0x2D;
    pub const UP_PKT_STATUS: u16 = 0x30;
    pub const UP_LIST_PTR: u16 = 0x38;
}

/// Window 0 ("setup") register offsets: EEPROM access (`spec.md §4.3`).
pub mod window0 {
    pub const EEPROM_COMMAND: u16 = 0x0A;
    pub const EEPROM_DATA: u16 = 0x0C;
}

/// Window 6 ("statistics") register offsets: single-byte packet/error
/// counters latched until read, plus two 16-bit octet counters
/// (`spec.md §4.9`: "drain statistics window (select window 6, read
/// counters)"). Values are drained to clear the `UPDATE_STATS` condition;
/// interpreting/exposing them is statistics presentation, out of scope
/// here (`spec.md §1`).
pub mod window6 {
    pub const CARRIER_ERRORS: u16 = 0x00;
    pub const HEARTBEAT_ERRORS: u16 = 0x01;
    pub const TX_MULTIPLE_COLLISIONS: u16 = 0x02;
    pub const TX_SINGLE_COLLISIONS: u16 = 0x03;
    pub const TX_LATE_COLLISIONS: u16 = 0x04;
    pub const RX_OVERRUNS: u16 = 0x05;
    pub const FRAMES_XMITTED_OK: u16 = 0x06;
    pub const FRAMES_RCVD_OK: u16 = 0x07;
    pub const FRAMES_DEFERRED: u16 = 0x08;
    pub const BYTES_RCVD: u16 = 0x0A;
    pub const BYTES_XMITTED: u16 = 0x0C;
}

/// DMA_CTRL bits (`spec.md §4.4`, §6.2).
pub mod dma_ctrl {
    pub const DOWN_STALLED: u32 = 1 << 2;
    pub const UP_COMPLETE: u32 = 1 << 3;
    pub const DOWN_COMPLETE: u32 = 1 << 4;
    pub const UP_RX_EARLY: u32 = 1 << 5;
    pub const ARM_COUNTDOWN: u32 = 1 << 6;
    pub const DOWN_IN_PROGRESS: u32 = 1 << 7;
    pub const COUNTER_SPEED: u32 = 1 << 8;
    pub const UP_STALLED: u32 = 1 << 12;
}

/// Tracks which window is currently selected so redundant
/// `SELECT_WINDOW` commands are skipped (`spec.md §4.1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCache {
    current: Option<u8>,
}

impl WindowCache {
    /// A cache that assumes no window has been selected yet.
    #[must_use]
    pub const fn unknown() -> Self {
        Self { current: None }
    }

    /// Selects `window` on `io`, issuing `SELECT_WINDOW` only if `window`
    /// differs from the cached value.
    pub fn select(&mut self, io: &mut impl PortIo, window: u8) {
        debug_assert!(window < 8, "EL3 has 8 windows");
        if self.current == Some(window) {
            return;
        }
        io.out16(REG_COMMAND, command_word(Command::SelectWindow, window as u16));
        self.current = Some(window);
    }

    /// Forces the cache back to unknown, used after a reset that may have
    /// silently changed the hardware's selected window.
    pub fn invalidate(&mut self) {
        self.current = None;
    }

    /// The cached window, if any.
    #[must_use]
    pub fn current(&self) -> Option<u8> {
        self.current
    }
}

/// Reads the status register (valid in any window).
#[must_use]
pub fn read_status(io: &mut impl PortIo) -> Status {
    Status::from_bits_truncate(io.in16(REG_STATUS))
}

/// Issues a zero-argument command.
pub fn issue(io: &mut impl PortIo, cmd: Command) {
    io.out16(REG_COMMAND, command_word(cmd, 0));
}

/// Issues a command with an 11-bit argument.
pub fn issue_arg(io: &mut impl PortIo, cmd: Command, arg: u16) {
    io.out16(REG_COMMAND, command_word(cmd, arg));
}

/// Clears the `UPDATE_STATS` condition by reading every counter in
/// window 6 (`spec.md §4.9`). The values themselves aren't interpreted —
/// statistics presentation is out of scope (`spec.md §1`) — this only
/// drains the latched counters so they stop asserting the interrupt.
pub fn drain_statistics(io: &mut impl PortIo, window: &mut WindowCache) {
    window.select(io, 6);
    for offset in [
        window6::CARRIER_ERRORS,
        window6::HEARTBEAT_ERRORS,
        window6::TX_MULTIPLE_COLLISIONS,
        window6::TX_SINGLE_COLLISIONS,
        window6::TX_LATE_COLLISIONS,
        window6::RX_OVERRUNS,
        window6::FRAMES_XMITTED_OK,
        window6::FRAMES_RCVD_OK,
        window6::FRAMES_DEFERRED,
    ] {
        let _ = io.in8(offset);
    }
    let _ = io.in16(window6::BYTES_RCVD);
    let _ = io.in16(window6::BYTES_XMITTED);
}

/// The 16-byte legacy descriptor layout shared by TX ("download") and RX
/// ("upload") rings (`spec.md §4.4`, §6.2):
///
/// ```text
/// offset 0:  next_phys   (u32, physical address of next descriptor, 0 = end)
/// offset 4:  status      (u32, bit 31 DN_INDICATE/UP_ERROR, bit 16
///                         DN_COMPLETE, bit 15 UP_COMPLETE, bits 12:0 length)
/// offset 8:  frag_addr   (u32, physical address of the data fragment)
/// offset 12: frag_len    (u32, bit 31 = LAST fragment, bits 12:0 = length)
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub next_phys: u32,
    pub status: u32,
    pub frag_addr: u32,
    pub frag_len: u32,
}

impl Descriptor {
    /// A descriptor with every field zeroed (`next_phys = 0` means "end of
    /// ring" until a successor is linked).
    pub const EMPTY: Self = Self {
        next_phys: 0,
        status: 0,
        frag_addr: 0,
        frag_len: 0,
    };

    /// Serializes this descriptor to its 16-byte on-the-wire form.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.next_phys.to_le_bytes());
        out[4..8].copy_from_slice(&self.status.to_le_bytes());
        out[8..12].copy_from_slice(&self.frag_addr.to_le_bytes());
        out[12..16].copy_from_slice(&self.frag_len.to_le_bytes());
        out
    }

    /// Parses a descriptor from its 16-byte on-the-wire form.
    #[must_use]
    pub fn from_bytes(raw: [u8; 16]) -> Self {
        Self {
            next_phys: u32::from_le_bytes(raw[0..4].try_into().unwrap()),
            status: u32::from_le_bytes(raw[4..8].try_into().unwrap()),
            frag_addr: u32::from_le_bytes(raw[8..12].try_into().unwrap()),
            frag_len: u32::from_le_bytes(raw[12..16].try_into().unwrap()),
        }
    }
}

/// Descriptor `status`/`frag_len` bit constants (`spec.md §4.4`, §6.2).
/// Ownership of a slot is tracked entirely in software (see
/// [`crate::ring::DescriptorRing`]'s owner array) — the hardware status
/// word has no separate OWN bit, only the completion/error bits below.
pub mod desc_bits {
    /// Bit 31 of `status`. On a TX ("download") descriptor the host sets
    /// this to request a completion indication; on an RX ("upload")
    /// descriptor the adapter mirrors `UP_ERROR` back through the same
    /// bit. Same numeric bit, read on opposite sides of the ring.
    pub const DN_INDICATE: u32 = 1 << 31;
    pub const ERROR: u32 = 1 << 31;
    /// TX-only: the adapter finished transmitting this descriptor's data.
    pub const DN_COMPLETE: u32 = 1 << 16;
    /// RX-only: the adapter finished filling this descriptor's buffer.
    pub const UP_COMPLETE: u32 = 1 << 15;
    /// `frag_len` bit 31: this fragment is the last one in the frame.
    pub const LAST_FRAG: u32 = 1 << 31;
    pub const FRAG_LEN_MASK: u32 = 0x0000_1FFF;
    /// RX `status` low bits: received frame length.
    pub const RX_LENGTH_MASK: u32 = 0x0000_1FFF;
}
