//! Error taxonomy for the EtherLink III core.
//!
//! One small `Copy` enum per failure domain, each with a hand-written
//! `Display` impl. The crate is `no_std`, so these do not implement
//! `std::error::Error`; callers that need that bridge do it at the
//! workspace boundary (out of scope here, see `spec.md §1`).

use core::fmt;

/// Failures from [`crate::capability`] detection (`spec.md §4.2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityError {
    /// Identification (Phase A) did not match any known `(vendor, device)`.
    NotFound,
    /// Phase B's ASIC revision contradicted Phase A by more than one
    /// generation step.
    Inconsistent,
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("no known EtherLink III device at this address"),
            Self::Inconsistent => {
                f.write_str("ASIC revision is inconsistent with claimed generation")
            }
        }
    }
}

/// Failures from [`crate::eeprom`] (`spec.md §4.3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EepromError {
    /// The EEPROM busy bit never cleared within the per-generation timeout.
    Timeout,
    /// The two back-to-back MAC reads disagreed, or the MAC was invalid
    /// (all-zero, or the multicast bit was set).
    InvalidMac,
}

impl fmt::Display for EepromError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("EEPROM command timed out"),
            Self::InvalidMac => f.write_str("EEPROM returned an invalid MAC address"),
        }
    }
}

/// Failures from [`crate::dma`] allocation (`spec.md §4.4`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaAllocError {
    /// No candidate region satisfied the boundary/limit/alignment
    /// constraints.
    NoDmaMemory,
}

impl fmt::Display for DmaAllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDmaMemory => f.write_str("no DMA-safe memory region available"),
        }
    }
}

/// Failures from [`crate::bounce`] (`spec.md §4.5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BounceError {
    /// The bounce pool has no FREE buffer available.
    PoolExhausted,
}

impl fmt::Display for BounceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolExhausted => f.write_str("bounce buffer pool exhausted"),
        }
    }
}

/// Failures from the transmit path (`spec.md §4.6`, `§4.7`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxError {
    /// The frame length fell outside `[60, 1514]` after padding.
    InvalidLength,
    /// No free TX descriptor (DMA) or no FIFO room (PIO) after a reclaim
    /// attempt.
    Full,
    /// The adapter reported a transient TX error (jabber/underrun/
    /// max-collisions); the TX engine was reset and re-enabled.
    AdapterError,
    /// A bounded poll loop did not observe completion in time.
    Timeout,
    /// The bounce pool was exhausted while bouncing the frame.
    Bounce(BounceError),
    /// The device is not in a state that can accept sends.
    DeviceFailed,
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength => f.write_str("transmit frame length out of range"),
            Self::Full => f.write_str("transmit ring or FIFO full"),
            Self::AdapterError => f.write_str("adapter reported a transmit error"),
            Self::Timeout => f.write_str("transmit poll loop timed out"),
            Self::Bounce(e) => write!(f, "transmit bounce failed: {e}"),
            Self::DeviceFailed => f.write_str("device has failed"),
        }
    }
}

impl From<BounceError> for TxError {
    fn from(e: BounceError) -> Self {
        Self::Bounce(e)
    }
}

/// Failures observed while consuming receive completions
/// (`spec.md §4.6`, `§4.7`). Most RX error conditions are recovered
/// locally and only counted; this enum covers the ones a caller of
/// [`crate::ring::DescriptorRing::rx_consume`] or [`crate::pio::pio_rx_poll`]
/// needs to react to directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxError {
    /// The bounce pool was exhausted while bouncing an inbound frame.
    Bounce(BounceError),
    /// The device is not in a state that can receive.
    DeviceFailed,
}

impl fmt::Display for RxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounce(e) => write!(f, "receive bounce failed: {e}"),
            Self::DeviceFailed => f.write_str("device has failed"),
        }
    }
}

impl From<BounceError> for RxError {
    fn from(e: BounceError) -> Self {
        Self::Bounce(e)
    }
}

/// Failures from [`crate::coordinator::Coordinator::init`] (`spec.md §7`,
/// "Configuration errors").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// `io_base` was not 32-byte aligned, or `irq` was outside the ISA set
    /// / not a valid PCI line.
    InvalidConfig,
    /// Two routes named the same network/mask with different target NICs.
    ConflictingRoute,
    /// No adapter responded at the configured address.
    DeviceNotFound,
    /// Capability detection failed (`spec.md §4.2`).
    Capability(CapabilityError),
    /// The EEPROM never produced a usable MAC.
    Eeprom(EepromError),
    /// DMA memory could not be obtained and the generation cannot fall
    /// back to PIO.
    Dma(DmaAllocError),
    /// The coordinator table is full (`spec.md §4.8`, cap of 8 devices).
    TooManyDevices,
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig => f.write_str("invalid device configuration"),
            Self::ConflictingRoute => f.write_str("conflicting static route"),
            Self::DeviceNotFound => f.write_str("no adapter responded at the configured address"),
            Self::Capability(e) => write!(f, "capability detection failed: {e}"),
            Self::Eeprom(e) => write!(f, "EEPROM initialization failed: {e}"),
            Self::Dma(e) => write!(f, "DMA initialization failed: {e}"),
            Self::TooManyDevices => f.write_str("device table is full"),
        }
    }
}

impl From<CapabilityError> for InitError {
    fn from(e: CapabilityError) -> Self {
        Self::Capability(e)
    }
}

impl From<EepromError> for InitError {
    fn from(e: EepromError) -> Self {
        Self::Eeprom(e)
    }
}

impl From<DmaAllocError> for InitError {
    fn from(e: DmaAllocError) -> Self {
        Self::Dma(e)
    }
}

/// The outer result type handed to callers of the ISR pipeline
/// (`spec.md §4.9`, "Failure semantics").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsrError {
    /// The ring reported three consecutive stalls at the same head index
    /// (`DescriptorRing::observe_stall`); it was reset.
    RingResetFailed,
    /// The adapter latched `ADAPTER_FAIL`, or a `MASTER_ABORT`/
    /// `TARGET_ABORT` was observed; the device is now `FAILED`.
    Fatal,
}

impl fmt::Display for IsrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RingResetFailed => f.write_str("descriptor ring reset failed"),
            Self::Fatal => f.write_str("adapter reported a fatal error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_non_empty() {
        let errors: &[&dyn fmt::Display] = &[
            &CapabilityError::NotFound,
            &EepromError::Timeout,
            &DmaAllocError::NoDmaMemory,
            &BounceError::PoolExhausted,
            &TxError::InvalidLength,
            &RxError::DeviceFailed,
            &InitError::TooManyDevices,
            &IsrError::Fatal,
        ];
        for e in errors {
            assert!(!format!("{e}").is_empty());
        }
    }

    #[test]
    fn bounce_error_converts_into_tx_and_rx_error() {
        let tx: TxError = BounceError::PoolExhausted.into();
        assert_eq!(tx, TxError::Bounce(BounceError::PoolExhausted));
        let rx: RxError = BounceError::PoolExhausted.into();
        assert_eq!(rx, RxError::Bounce(BounceError::PoolExhausted));
    }
}
