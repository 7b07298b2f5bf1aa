//! Capability-driven core datapath for the 3Com EtherLink III adapter
//! family: register I/O, capability detection, EEPROM access, DMA and
//! bounce-buffer management, the PIO and bus-master datapaths, the
//! work-budgeted interrupt pipeline, and the multi-NIC coordinator that
//! ties them together.
//!
//! This crate has no runtime of its own — it is linked into a DOS
//! Packet Driver TSR (or, for testing, a host process) that supplies the
//! [`hal`] trait implementations and drives [`coordinator::Coordinator`]
//! from its own top-half/bottom-half ISR split.

#![cfg_attr(not(any(test, feature = "test-support")), no_std)]

pub mod bounce;
pub mod capability;
pub mod coordinator;
pub mod device;
pub mod dma;
pub mod dma_path;
pub mod eeprom;
pub mod error;
pub mod hal;
pub mod isr;
pub mod pio;
pub mod regs;
pub mod ring;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use capability::{CapFlags, CapabilitySet, Generation};
pub use coordinator::{Coordinator, DriverConfig};
pub use device::{Device, DeviceState};
pub use error::{InitError, RxError, TxError};
