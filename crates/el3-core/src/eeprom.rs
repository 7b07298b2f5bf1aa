//! Serial EEPROM access and MAC address extraction (`spec.md §4.3`).
//!
//! Grounded on `hadron-drivers`'s `e1000e::eeprom_read`/`read_mac` pair:
//! window-select, issue a read command, poll a busy bit with a bounded
//! timeout, then read the data register. The EL3 family does this through
//! window 0 instead of a memory-mapped EERD register.

use crate::error::EepromError;
use crate::hal::{Clock, PortIo};
use crate::regs::{window0, WindowCache};

/// EEPROM_COMMAND opcode: read word at the low-order address bits.
const OPCODE_READ: u16 = 0b10 << 6;
/// EEPROM_COMMAND busy bit: set while a command is in flight.
const BUSY: u16 = 1 << 15;

/// EEPROM offsets holding the MAC address, big-endian words
/// (`spec.md §4.3`, §6.2).
const MAC_WORD_OFFSETS: [u16; 3] = [0x0A, 0x0B, 0x0C];

/// Per-generation EEPROM busy-poll timeout in clock ticks (`spec.md §4.3`:
/// "older parts are slower; the timeout must not be shared").
#[must_use]
pub fn busy_timeout_ticks(generation: crate::capability::Generation) -> u64 {
    use crate::capability::Generation::*;
    match generation {
        El3Orig => 1_620, // ~162us at the documented EEPROM clock
        Vortex => 1_620,
        Boomerang | Cyclone | Tornado => 200,
    }
}

/// Reads one 16-bit word from EEPROM `offset` (`spec.md §4.3`).
///
/// Selects window 0, issues the read opcode with `offset` as the
/// low-order address bits, polls `BUSY` with a bounded iteration count
/// derived from `timeout_ticks`, then reads the data register.
pub fn eeprom_read(
    io: &mut impl PortIo,
    window: &mut WindowCache,
    clock: &impl Clock,
    timeout_ticks: u64,
    offset: u16,
) -> Result<u16, EepromError> {
    window.select(io, 0);
    io.out16(window0::EEPROM_COMMAND, OPCODE_READ | (offset & 0x3F));

    let deadline = clock.ticks().saturating_add(timeout_ticks);
    loop {
        if io.in16(window0::EEPROM_COMMAND) & BUSY == 0 {
            break;
        }
        if clock.ticks() >= deadline {
            return Err(EepromError::Timeout);
        }
    }

    Ok(io.in16(window0::EEPROM_DATA))
}

/// Reads and validates the adapter's station MAC address
/// (`spec.md §4.3`): three big-endian words, read twice, both reads must
/// agree, and the result must be neither all-zero nor carry the multicast
/// bit in its first octet.
pub fn read_mac(
    io: &mut impl PortIo,
    window: &mut WindowCache,
    clock: &impl Clock,
    timeout_ticks: u64,
) -> Result<[u8; 6], EepromError> {
    let first = read_mac_words(io, window, clock, timeout_ticks)?;
    let second = read_mac_words(io, window, clock, timeout_ticks)?;
    if first != second {
        return Err(EepromError::InvalidMac);
    }

    let mut mac = [0u8; 6];
    for (i, word) in first.iter().enumerate() {
        mac[i * 2] = (word >> 8) as u8;
        mac[i * 2 + 1] = (word & 0xFF) as u8;
    }

    if mac == [0; 6] {
        return Err(EepromError::InvalidMac);
    }
    if mac[0] & 0x01 != 0 {
        return Err(EepromError::InvalidMac);
    }

    Ok(mac)
}

fn read_mac_words(
    io: &mut impl PortIo,
    window: &mut WindowCache,
    clock: &impl Clock,
    timeout_ticks: u64,
) -> Result<[u16; 3], EepromError> {
    let mut words = [0u16; 3];
    for (i, &offset) in MAC_WORD_OFFSETS.iter().enumerate() {
        words[i] = eeprom_read(io, window, clock, timeout_ticks, offset)?;
    }
    Ok(words)
}
