//! Bus-master DMA memory allocation (`spec.md §4.4`).
//!
//! The allocator has no notion of pages or a general-purpose heap; it
//! asks [`DmaHal`] for raw physical memory and validates the constraints
//! that bus-master descriptor rings depend on: the region must not cross
//! a 64 KiB boundary (the adapter's descriptor-walk hardware cannot
//! follow a carry across one), must fall under 16 MiB when the adapter is
//! an ISA bus-master, and must satisfy the caller's alignment.

use crate::error::DmaAllocError;
use crate::hal::DmaHal;

/// An ISA bus-master's addressable ceiling (`spec.md §4.4`).
const ISA_DMA_LIMIT: u64 = 16 * 1024 * 1024;
/// The boundary a single DMA region must never straddle.
const BOUNDARY: u64 = 64 * 1024;

/// A DMA-safe memory region: its physical address and size.
///
/// `alloc_base`/`alloc_len` remember the oversized span actually handed
/// back by [`DmaHal::alloc`] (before sliding to a boundary-safe window)
/// so [`free_dma`] releases the same span the allocator gave out, even
/// though callers only ever see the sliced-down `phys`/`len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRegion {
    pub phys: u64,
    pub len: usize,
    alloc_base: u64,
    alloc_len: usize,
}

/// Allocates `len` bytes satisfying the boundary/limit/alignment
/// constraints above (`spec.md §4.4`).
///
/// Implements the over-allocate-and-slide algorithm: ask [`DmaHal`] for
/// `len + BOUNDARY` bytes, then slide the usable window forward to the
/// next boundary-aligned address within that oversized allocation. This
/// guarantees a boundary-safe sub-region exists regardless of where the
/// underlying allocator happened to place the memory, at the cost of
/// wasting up to one boundary's worth of space per allocation.
pub fn alloc_dma(
    hal: &mut impl DmaHal,
    len: usize,
    align: usize,
) -> Result<DmaRegion, DmaAllocError> {
    debug_assert!(align.is_power_of_two());
    debug_assert!(len > 0);

    let oversized_len = len
        .checked_add(BOUNDARY as usize)
        .ok_or(DmaAllocError::NoDmaMemory)?;
    let base = hal
        .alloc(oversized_len, align.max(16))
        .ok_or(DmaAllocError::NoDmaMemory)?;

    let slid = next_boundary_aligned(base, align as u64);
    if slid + len as u64 > base + oversized_len as u64 {
        hal.free(base, oversized_len);
        return Err(DmaAllocError::NoDmaMemory);
    }
    if hal.isa_limit() && slid + len as u64 > ISA_DMA_LIMIT {
        hal.free(base, oversized_len);
        return Err(DmaAllocError::NoDmaMemory);
    }
    debug_assert!(
        region_is_boundary_safe(slid, len),
        "slid region must not cross a 64 KiB boundary"
    );

    Ok(DmaRegion {
        phys: slid,
        len,
        alloc_base: base,
        alloc_len: oversized_len,
    })
}

/// Releases a region obtained from [`alloc_dma`], freeing the original
/// oversized span rather than just the sliced-down window.
pub fn free_dma(hal: &mut impl DmaHal, region: DmaRegion) {
    hal.free(region.alloc_base, region.alloc_len);
}

fn next_boundary_aligned(addr: u64, align: u64) -> u64 {
    let boundary_aligned = (addr + BOUNDARY - 1) & !(BOUNDARY - 1);
    // boundary alignment is a superset of any alignment <= BOUNDARY we'd
    // be asked for, since BOUNDARY (64 KiB) is itself a power of two.
    debug_assert!(align <= BOUNDARY);
    boundary_aligned
}

fn region_is_boundary_safe(phys: u64, len: usize) -> bool {
    let end = phys + len as u64 - 1;
    phys / BOUNDARY == end / BOUNDARY
}
