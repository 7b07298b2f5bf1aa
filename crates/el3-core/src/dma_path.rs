//! Bus-master DMA datapath (`spec.md §4.7`): thin glue between
//! [`crate::ring`]'s descriptor bookkeeping and the window 7 DMA control
//! register, handling stall detection and the fatal abort conditions that
//! only this datapath can observe (PIO has no bus-master abort signal).

use crate::bounce::BouncePool;
use crate::error::{RxError, TxError};
use crate::hal::{DmaHal, PortIo};
use crate::regs::{dma_ctrl, stall_arg, window7, Command, WindowCache};
use crate::ring::DescriptorRing;

/// DMA_CTRL bits that indicate a non-recoverable bus error
/// (`spec.md §4.7`, "Failure semantics"). Cleared only by a full adapter
/// reset, which is outside this datapath's scope — the caller transitions
/// the device to `FAILED` instead.
const FATAL_ABORT_BITS: u32 = 1 << 14 | 1 << 15; // MASTER_ABORT | TARGET_ABORT

/// Transmits `frame` on a DMA-capable ring: enqueues the descriptor, kicks
/// `DOWN_POLL` if the engine was stalled, and reclaims any
/// already-completed descriptors opportunistically (`spec.md §4.7`).
pub fn dma_send<const N: usize>(
    io: &mut impl PortIo,
    window: &mut WindowCache,
    ring: &mut DescriptorRing<N>,
    hal: &mut impl DmaHal,
    bounce: &mut BouncePool,
    frame: &[u8],
    isa_limit: bool,
) -> Result<(), TxError> {
    window.select(io, 7);
    check_fatal_abort(io)?;

    ring.tx_reclaim(hal, bounce);
    ring.tx_enqueue(hal, bounce, frame, isa_limit)?;

    let ctrl = io.in32(window7::DMA_CTRL);
    if ctrl & dma_ctrl::DOWN_STALLED != 0 {
        crate::regs::issue_arg(io, Command::Stall, stall_arg::DN_UNSTALL);
    }
    Ok(())
}

/// Drains up to `budget` completed RX descriptors (`spec.md §4.7`,
/// §4.9). Unstalls the upload engine if it had stopped for lack of empty
/// descriptors.
pub fn dma_rx_poll<const N: usize>(
    io: &mut impl PortIo,
    window: &mut WindowCache,
    ring: &mut DescriptorRing<N>,
    hal: &mut impl DmaHal,
    bounce: &mut BouncePool,
    budget: u32,
    sink: impl FnMut(&[u8]) -> bool,
) -> Result<u32, RxError> {
    window.select(io, 7);
    if check_fatal_abort(io).is_err() {
        return Err(RxError::DeviceFailed);
    }

    let processed = ring.rx_consume(hal, bounce, budget, sink)?;

    let ctrl = io.in32(window7::DMA_CTRL);
    if ctrl & dma_ctrl::UP_STALLED != 0 {
        crate::regs::issue_arg(io, Command::Stall, stall_arg::UP_UNSTALL);
    }
    Ok(processed)
}

fn check_fatal_abort(io: &mut impl PortIo) -> Result<(), TxError> {
    let ctrl = io.in32(window7::DMA_CTRL);
    if ctrl & FATAL_ABORT_BITS != 0 {
        Err(TxError::DeviceFailed)
    } else {
        Ok(())
    }
}
