//! Bounce buffer pool (`spec.md §4.5`).
//!
//! A fixed pool of DMA-safe buffers used whenever a caller-supplied
//! packet buffer doesn't itself satisfy the DMA constraints (it crosses a
//! 64 KiB boundary, or — for an ISA bus-master — sits above 16 MiB). Each
//! slot cycles through `FREE -> ALLOCATED -> IN_FLIGHT -> FREE`; the ring
//! engine in [`crate::ring`] is the only caller that advances a slot's
//! state.

use crate::dma::{alloc_dma, free_dma, DmaRegion};
use crate::error::BounceError;
use crate::hal::DmaHal;

/// Default pool size (`spec.md §4.5`): enough slots that a full ring of
/// in-flight descriptors can each hold one without exhausting the pool
/// under normal traffic.
pub const DEFAULT_POOL_SIZE: usize = 16;

/// Bounce buffer size: one full Ethernet frame (`spec.md §6.1`,
/// `MAX_FRAME_LEN`), rounded up to 1536 so the descriptor's `frag_len`
/// never straddles a DMA burst boundary right at the wire limit.
pub const BOUNCE_BUF_LEN: usize = 1536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Allocated,
    InFlight,
}

struct Slot {
    region: DmaRegion,
    state: SlotState,
}

/// Fixed-size pool of boundary-safe scratch buffers.
pub struct BouncePool {
    slots: heapless_vec::FixedVec<Slot, DEFAULT_POOL_SIZE>,
    copy_count: u64,
    exhausted_count: u64,
}

/// A tiny fixed-capacity vector, avoiding a dependency on `heapless` or
/// `alloc::Vec` for a pool whose size is known at construction and never
/// grows (`spec.md §4.5`: "the pool size is fixed at initialization").
mod heapless_vec {
    pub struct FixedVec<T, const N: usize> {
        items: [Option<T>; N],
        len: usize,
    }

    impl<T, const N: usize> FixedVec<T, N> {
        pub fn new() -> Self {
            Self {
                items: [(); N].map(|_| None),
                len: 0,
            }
        }

        pub fn push(&mut self, item: T) {
            assert!(self.len < N, "FixedVec capacity exceeded");
            self.items[self.len] = Some(item);
            self.len += 1;
        }

        pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
            self.items[..self.len].iter_mut().filter_map(|o| o.as_mut())
        }

        pub fn iter(&self) -> impl Iterator<Item = &T> {
            self.items[..self.len].iter().filter_map(|o| o.as_ref())
        }

        pub fn len(&self) -> usize {
            self.len
        }
    }
}

impl BouncePool {
    /// Allocates `count` DMA-safe buffers of [`BOUNCE_BUF_LEN`] bytes each
    /// up front (`spec.md §4.5`).
    pub fn new(hal: &mut impl DmaHal, count: usize) -> Result<Self, BounceError> {
        assert!(count <= DEFAULT_POOL_SIZE, "pool size exceeds fixed capacity");
        let mut slots = heapless_vec::FixedVec::new();
        for _ in 0..count {
            let region = alloc_dma(hal, BOUNCE_BUF_LEN, 16).map_err(|_| BounceError::PoolExhausted)?;
            slots.push(Slot {
                region,
                state: SlotState::Free,
            });
        }
        Ok(Self {
            slots,
            copy_count: 0,
            exhausted_count: 0,
        })
    }

    /// Copies `frame` into a FREE slot, marks it ALLOCATED, and returns its
    /// physical address (`spec.md §4.5`, transmit path).
    pub fn bounce_tx(&mut self, hal: &mut impl DmaHal, frame: &[u8]) -> Result<u64, BounceError> {
        debug_assert!(frame.len() <= BOUNCE_BUF_LEN);
        let slot = match self.slots.iter_mut().find(|s| s.state == SlotState::Free) {
            Some(slot) => slot,
            None => {
                self.exhausted_count += 1;
                return Err(BounceError::PoolExhausted);
            }
        };
        hal.write_phys(slot.region.phys, frame);
        slot.state = SlotState::Allocated;
        self.copy_count += 1;
        Ok(slot.region.phys)
    }

    /// Reserves a FREE slot for an inbound frame the adapter is about to
    /// DMA into, returning its physical address (`spec.md §4.5`, receive
    /// path). The slot moves to IN_FLIGHT until [`BouncePool::bounce_rx_finish`]
    /// copies the data out.
    pub fn bounce_rx_reserve(&mut self, hal: &mut impl DmaHal) -> Result<u64, BounceError> {
        let slot = match self.slots.iter_mut().find(|s| s.state == SlotState::Free) {
            Some(slot) => slot,
            None => {
                self.exhausted_count += 1;
                return Err(BounceError::PoolExhausted);
            }
        };
        slot.state = SlotState::InFlight;
        let _ = hal; // reserved for symmetry; no hardware action needed here
        Ok(slot.region.phys)
    }

    /// Copies `len` bytes out of the IN_FLIGHT slot at `phys` into `out`
    /// and returns the slot to FREE (`spec.md §4.5`).
    pub fn bounce_rx_finish(
        &mut self,
        hal: &mut impl DmaHal,
        phys: u64,
        len: usize,
        out: &mut [u8],
    ) -> Result<(), BounceError> {
        debug_assert!(len <= out.len());
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.region.phys == phys && s.state == SlotState::InFlight)
            .ok_or(BounceError::PoolExhausted)?;
        hal.read_phys(slot.region.phys, &mut out[..len]);
        slot.state = SlotState::Free;
        self.copy_count += 1;
        Ok(())
    }

    /// Releases a slot reserved by [`BouncePool::bounce_tx`] once the
    /// adapter confirms transmit completion (`spec.md §4.5`).
    pub fn release(&mut self, phys: u64) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.region.phys == phys) {
            slot.state = SlotState::Free;
        }
    }

    /// True if a physical address range needs bouncing: it crosses a
    /// 64 KiB boundary, or (for an ISA bus-master) sits at or above
    /// 16 MiB (`spec.md §4.4`, §4.5).
    #[must_use]
    pub fn needs_bounce(phys: u64, len: usize, isa_limit: bool) -> bool {
        const BOUNDARY: u64 = 64 * 1024;
        const ISA_LIMIT: u64 = 16 * 1024 * 1024;
        if len == 0 {
            return false;
        }
        let end = phys + len as u64 - 1;
        let crosses_boundary = phys / BOUNDARY != end / BOUNDARY;
        let above_isa_limit = isa_limit && end >= ISA_LIMIT;
        crosses_boundary || above_isa_limit
    }

    /// Total number of slots in the pool.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of bounce copies performed since construction.
    #[must_use]
    pub fn copy_count(&self) -> u64 {
        self.copy_count
    }

    /// Number of times a caller observed [`BounceError::PoolExhausted`].
    #[must_use]
    pub fn exhausted_count(&self) -> u64 {
        self.exhausted_count
    }

    /// Frees every slot's underlying DMA memory (`spec.md §4.10`,
    /// shutdown path).
    pub fn release_all(self, hal: &mut impl DmaHal) {
        for slot in self.slots.iter() {
            free_dma(hal, slot.region);
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeDma {
        next_addr: u64,
        mem: HashMap<u64, Vec<u8>>,
    }

    impl FakeDma {
        fn new() -> Self {
            Self {
                next_addr: 0,
                mem: HashMap::new(),
            }
        }
    }

    impl DmaHal for FakeDma {
        fn alloc(&mut self, len: usize, align: usize) -> Option<u64> {
            let align = align as u64;
            let addr = (self.next_addr + align - 1) & !(align - 1);
            self.next_addr = addr + len as u64;
            self.mem.insert(addr, vec![0u8; len]);
            Some(addr)
        }
        fn free(&mut self, phys: u64, _len: usize) {
            self.mem.remove(&phys);
        }
        fn read_phys(&mut self, phys: u64, buf: &mut [u8]) {
            if let Some(backing) = self.mem.get(&phys) {
                buf.copy_from_slice(&backing[..buf.len()]);
            }
        }
        fn write_phys(&mut self, phys: u64, buf: &[u8]) {
            if let Some(backing) = self.mem.get_mut(&phys) {
                backing[..buf.len()].copy_from_slice(buf);
            }
        }
        fn isa_limit(&self) -> bool {
            false
        }
    }

    #[test]
    fn bounce_tx_then_release_recycles_the_slot() {
        let mut hal = FakeDma::new();
        let mut pool = BouncePool::new(&mut hal, 2).unwrap();
        let phys = pool.bounce_tx(&mut hal, &[1, 2, 3]).unwrap();
        pool.release(phys);
        // Pool had 2 slots; after release both are free again.
        let p1 = pool.bounce_tx(&mut hal, &[4]).unwrap();
        let p2 = pool.bounce_tx(&mut hal, &[5]).unwrap();
        assert_ne!(p1, p2);
    }

    #[test]
    fn pool_exhaustion_is_reported_and_counted() {
        let mut hal = FakeDma::new();
        let mut pool = BouncePool::new(&mut hal, 1).unwrap();
        let _phys = pool.bounce_tx(&mut hal, &[1]).unwrap();
        let result = pool.bounce_tx(&mut hal, &[2]);
        assert_eq!(result, Err(BounceError::PoolExhausted));
        assert_eq!(pool.exhausted_count(), 1);
    }

    #[test]
    fn rx_reserve_then_finish_copies_data_and_frees_slot() {
        let mut hal = FakeDma::new();
        let mut pool = BouncePool::new(&mut hal, 1).unwrap();
        let phys = pool.bounce_rx_reserve(&mut hal).unwrap();
        hal.write_phys(phys, &[9, 9, 9]);
        let mut out = [0u8; 3];
        pool.bounce_rx_finish(&mut hal, phys, 3, &mut out).unwrap();
        assert_eq!(out, [9, 9, 9]);
        // Slot freed: a new reservation reuses the same address.
        let phys2 = pool.bounce_rx_reserve(&mut hal).unwrap();
        assert_eq!(phys, phys2);
    }

    #[test]
    fn needs_bounce_detects_boundary_crossing() {
        assert!(BouncePool::needs_bounce(0xFFF0, 32, false));
        assert!(!BouncePool::needs_bounce(0x1000, 32, false));
    }

    #[test]
    fn needs_bounce_detects_isa_limit() {
        assert!(BouncePool::needs_bounce(16 * 1024 * 1024 - 4, 32, true));
        assert!(!BouncePool::needs_bounce(16 * 1024 * 1024 - 4, 32, false));
    }
}
