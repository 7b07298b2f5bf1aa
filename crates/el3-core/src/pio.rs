//! Programmed-I/O datapath (`spec.md §4.7`), used by every generation
//! that lacks bus-master DMA and as the fallback path on generations that
//! have it but were configured to not use it.

use crate::error::{RxError, TxError};
use crate::hal::PortIo;
use crate::regs::{window1, Command, Status, WindowCache};

/// Status register bits specific to window 1's RX_STATUS field
/// (`spec.md §6.2`).
mod rx_status_bits {
    /// The FIFO doesn't yet hold a complete frame; try again later.
    pub const RX_INCOMPLETE: u16 = 1 << 15;
    pub const RX_ERROR: u16 = 1 << 14;
    pub const RX_LENGTH_MASK: u16 = 0x07FF;
}

/// Status register bits specific to window 1's TX_STATUS field
/// (`spec.md §6.2`).
mod tx_status_bits {
    pub const TX_COMPLETE: u8 = 1 << 7;
    pub const JABBER: u8 = 1 << 5;
    pub const UNDERRUN: u8 = 1 << 4;
    pub const MAX_COLLISIONS: u8 = 1 << 3;
}

use crate::ring::{MAX_FRAME_LEN, MIN_CALLER_FRAME_LEN, MIN_FRAME_LEN};

/// Bounded poll iterations for a PIO transmit (`spec.md §4.7`, §5).
const TX_POLL_ITERATIONS: u32 = 4096;

/// Transmits `frame` through the FIFO a word at a time
/// (`spec.md §4.7`). Pads frames shorter than [`MIN_FRAME_LEN`] with
/// zeros, validates length, waits for FIFO room, writes the preamble
/// (total length, then zero), bursts the payload, then polls
/// `TX_STATUS` for completion with a bounded iteration count.
pub fn pio_send(io: &mut impl PortIo, window: &mut WindowCache, frame: &[u8]) -> Result<(), TxError> {
    if frame.len() < MIN_CALLER_FRAME_LEN || frame.len() > MAX_FRAME_LEN {
        return Err(TxError::InvalidLength);
    }
    window.select(io, 1);

    let free = io.in16(window1::TX_FREE);
    let padded_len = frame.len().max(MIN_FRAME_LEN);
    if (free as usize) < padded_len + 4 {
        return Err(TxError::Full);
    }

    io.out32(window1::TX_FIFO, padded_len as u32);

    let mut words = frame.chunks(2);
    for chunk in &mut words {
        let word = if chunk.len() == 2 {
            u16::from_le_bytes([chunk[0], chunk[1]])
        } else {
            chunk[0] as u16
        };
        io.out16(window1::TX_FIFO, word);
    }
    for _ in frame.len()..padded_len {
        io.out8(window1::TX_FIFO, 0);
    }

    for _ in 0..TX_POLL_ITERATIONS {
        let status = io.in8(window1::TX_STATUS);
        if status & tx_status_bits::TX_COMPLETE != 0 {
            if status
                & (tx_status_bits::MAX_COLLISIONS | tx_status_bits::UNDERRUN | tx_status_bits::JABBER)
                != 0
            {
                crate::regs::issue(io, Command::TxReset);
                crate::regs::issue(io, Command::TxEnable);
                return Err(TxError::AdapterError);
            }
            crate::regs::issue(io, Command::TxDone);
            return Ok(());
        }
    }
    Err(TxError::Timeout)
}

/// Drains up to `budget` received frames from the FIFO into `sink`
/// (`spec.md §4.7`, §4.9 work-budget discipline). Returns the number of
/// frames processed (including discarded error frames).
pub fn pio_rx_poll(
    io: &mut impl PortIo,
    window: &mut WindowCache,
    budget: u32,
    mut sink: impl FnMut(&[u8]) -> bool,
) -> Result<u32, RxError> {
    window.select(io, 1);
    let mut processed = 0u32;
    let mut scratch = [0u8; MAX_FRAME_LEN];

    while processed < budget {
        let status = read_status(io);
        if !status.contains(Status::RX_COMPLETE) {
            break;
        }
        let rx_status = io.in16(window1::RX_STATUS);

        if rx_status & rx_status_bits::RX_INCOMPLETE != 0 {
            break;
        }

        if rx_status & rx_status_bits::RX_ERROR != 0 {
            crate::regs::issue(io, Command::RxDiscard);
            processed += 1;
            continue;
        }

        let len = (rx_status & rx_status_bits::RX_LENGTH_MASK) as usize;
        if !(MIN_CALLER_FRAME_LEN..=MAX_FRAME_LEN).contains(&len) {
            crate::regs::issue(io, Command::RxDiscard);
            processed += 1;
            continue;
        }
        read_fifo_burst(io, &mut scratch[..len]);

        let keep_going = sink(&scratch[..len]);
        crate::regs::issue(io, Command::RxDiscard);
        processed += 1;
        if !keep_going {
            break;
        }
    }
    Ok(processed)
}

fn read_status(io: &mut impl PortIo) -> Status {
    crate::regs::read_status(io)
}

fn read_fifo_burst(io: &mut impl PortIo, out: &mut [u8]) {
    let mut i = 0;
    while i + 2 <= out.len() {
        let word = io.in16(window1::RX_FIFO);
        out[i..i + 2].copy_from_slice(&word.to_le_bytes());
        i += 2;
    }
    if i < out.len() {
        out[i] = io.in8(window1::RX_FIFO);
    }
}
