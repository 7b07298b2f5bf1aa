//! DMA ring-full and bounce-on-boundary scenarios (`spec.md §8`,
//! scenarios 2 and 3).

use el3_core::bounce::BouncePool;
use el3_core::dma::alloc_dma;
use el3_core::error::TxError;
use el3_core::ring::{DescriptorRing, MAX_FRAME_LEN};
use el3_core::testing::MockBus;

#[test]
fn ring_reports_full_once_every_slot_is_adapter_owned() {
    let mut bus = MockBus::new();
    let mut bufs = [0u64; 4];
    for b in bufs.iter_mut() {
        *b = alloc_dma(&mut bus, MAX_FRAME_LEN, 16).unwrap().phys;
    }
    let mut ring = DescriptorRing::<4>::new(&mut bus, bufs).unwrap();
    let mut bounce = BouncePool::new(&mut bus, 2).unwrap();

    for _ in 0..4 {
        ring.tx_enqueue(&mut bus, &mut bounce, &[1, 2, 3], false).unwrap();
    }
    let result = ring.tx_enqueue(&mut bus, &mut bounce, &[4, 5, 6], false);
    assert_eq!(result, Err(TxError::Full));
}

#[test]
fn frame_needing_a_boundary_crossing_buffer_is_bounced() {
    // A buffer address deliberately placed one byte before a 64 KiB
    // boundary: any frame landing there would straddle the boundary and
    // must be bounced instead of DMAed directly.
    let straddling_phys: u64 = 0x1_0000 - 8;
    assert!(BouncePool::needs_bounce(straddling_phys, 64, false));

    let mut bus = MockBus::new();
    let mut bounce = BouncePool::new(&mut bus, 2).unwrap();
    let frame = [7u8; 64];
    let phys = bounce.bounce_tx(&mut bus, &frame).unwrap();
    assert_ne!(phys, straddling_phys);
    assert_eq!(bounce.copy_count(), 1);
}
