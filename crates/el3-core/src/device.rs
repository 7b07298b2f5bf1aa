//! Per-adapter state and the capability-selected operation vtable
//! (`spec.md §4.10`, §3 `Device`).

use crate::bounce::BouncePool;
use crate::capability::{CapFlags, CapabilitySet, Generation};
use crate::error::{InitError, IsrError, RxError, TxError};
use crate::hal::PortIo;
use crate::isr::{run_bottom_half, DrainSource, InterruptMitigation, IsrOutcome};
use crate::regs::{Command, WindowCache};
use crate::ring::DescriptorRing;

/// TX/RX ring depth for DMA-capable generations (`spec.md §4.4`).
pub const RING_DEPTH: usize = 16;

/// Lifecycle states a [`Device`] moves through (`spec.md §3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Uninit,
    Detected,
    Initialized,
    Active,
    Stalled,
    Failed,
}

/// Which datapath a device dispatches through, chosen once after
/// detection and never switched at runtime (`spec.md §4.10`).
pub enum Datapath {
    Pio,
    Dma {
        tx_ring: DescriptorRing<RING_DEPTH>,
        rx_ring: DescriptorRing<RING_DEPTH>,
        bounce: BouncePool,
    },
}

/// Per-device traffic counters, reported through
/// [`crate::coordinator::Coordinator::get_stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub tx_frames: u64,
    pub tx_errors: u64,
    pub rx_frames: u64,
    pub rx_errors: u64,
    pub rx_discards: u64,
    pub link_flaps: u32,
}

/// One physical adapter (`spec.md §3`).
pub struct Device {
    pub io_base: u16,
    pub irq: u8,
    pub generation: Generation,
    pub caps: CapabilitySet,
    pub mac_address: [u8; 6],
    pub window: WindowCache,
    pub state: DeviceState,
    pub link_up: bool,
    pub link_speed_mbps: u16,
    pub full_duplex: bool,
    pub stats: Stats,
    pub mitigation: InterruptMitigation,
    pub datapath: Datapath,
}

impl Device {
    /// Constructs a device record in the `Detected` state, before any
    /// datapath resources have been allocated (`spec.md §4.2` output).
    pub fn new_detected(
        io_base: u16,
        irq: u8,
        generation: Generation,
        caps: CapabilitySet,
        mac_address: [u8; 6],
    ) -> Self {
        Self {
            io_base,
            irq,
            generation,
            caps,
            mac_address,
            window: WindowCache::unknown(),
            state: DeviceState::Detected,
            link_up: false,
            link_speed_mbps: 10,
            full_duplex: false,
            stats: Stats::default(),
            mitigation: InterruptMitigation::default(),
            datapath: Datapath::Pio,
        }
    }

    /// Selects PIO or DMA once, based on capability and configuration
    /// (`spec.md §4.10`: "selected once per generation after detection").
    pub fn select_datapath(
        &mut self,
        hal: &mut impl crate::hal::DmaHal,
        use_bus_master: bool,
        ring_buffers_tx: [u64; RING_DEPTH],
        ring_buffers_rx: [u64; RING_DEPTH],
    ) -> Result<(), InitError> {
        if use_bus_master && self.caps.has(CapFlags::HAS_BUS_MASTER) {
            let tx_ring = DescriptorRing::new(hal, ring_buffers_tx)?;
            let rx_ring = DescriptorRing::new(hal, ring_buffers_rx)?;
            let bounce = BouncePool::new(hal, crate::bounce::DEFAULT_POOL_SIZE)
                .map_err(|_| InitError::Dma(crate::error::DmaAllocError::NoDmaMemory))?;
            self.datapath = Datapath::Dma {
                tx_ring,
                rx_ring,
                bounce,
            };
        } else {
            self.datapath = Datapath::Pio;
        }
        self.state = DeviceState::Initialized;
        Ok(())
    }

    /// True if this device's ISR/send/receive operations should go
    /// through the DMA datapath.
    #[must_use]
    pub fn is_dma(&self) -> bool {
        matches!(self.datapath, Datapath::Dma { .. })
    }

    /// Records a successful transmit.
    pub fn note_tx_ok(&mut self) {
        self.stats.tx_frames += 1;
    }

    /// Records a transmit failure and, for a fatal one, moves the device
    /// to `Failed` (`spec.md §4.9`, "Failure semantics").
    pub fn note_tx_err(&mut self, err: TxError) {
        self.stats.tx_errors += 1;
        if matches!(err, TxError::DeviceFailed) {
            self.state = DeviceState::Failed;
        }
    }

    /// Records a successful receive.
    pub fn note_rx_ok(&mut self) {
        self.stats.rx_frames += 1;
    }

    /// Records a receive failure and, for a fatal one, moves the device
    /// to `Failed`.
    pub fn note_rx_err(&mut self, err: RxError) {
        self.stats.rx_errors += 1;
        if matches!(err, RxError::DeviceFailed) {
            self.state = DeviceState::Failed;
        }
    }

    /// True if the device can currently accept sends/receives.
    #[must_use]
    pub fn is_operational(&self) -> bool {
        matches!(self.state, DeviceState::Active | DeviceState::Initialized)
    }

    /// Transmits `frame` through whichever datapath is active
    /// (`spec.md §4.10`), recording the outcome in [`Stats`].
    pub fn send(
        &mut self,
        io: &mut impl PortIo,
        hal: &mut impl crate::hal::DmaHal,
        frame: &[u8],
    ) -> Result<(), TxError> {
        let result = match &mut self.datapath {
            Datapath::Pio => crate::pio::pio_send(io, &mut self.window, frame),
            Datapath::Dma { tx_ring, bounce, .. } => {
                let isa_limit = hal.isa_limit();
                crate::dma_path::dma_send(io, &mut self.window, tx_ring, hal, bounce, frame, isa_limit)
            }
        };
        match result {
            Ok(()) => self.note_tx_ok(),
            Err(err) => self.note_tx_err(err),
        }
        result
    }

    /// Sets the RX address filter (`spec.md §6.2`, `SET_RX_FILTER`).
    /// Window-independent: the command register is visible from every
    /// window, so no `select` is needed first.
    pub fn set_filter(&mut self, io: &mut impl PortIo, filter_bits: u16) {
        crate::regs::issue_arg(io, Command::SetRxFilter, filter_bits);
    }

    /// Quiesces the adapter for detach (`spec.md §4.10`): disables RX and
    /// TX and drops the device back to `Uninit`. Datapath resources
    /// (rings, bounce buffers) are left in place for the caller to free
    /// through the `DmaHal` that allocated them.
    pub fn shutdown(&mut self, io: &mut impl PortIo) {
        crate::regs::issue(io, Command::RxDisable);
        crate::regs::issue(io, Command::TxDisable);
        self.state = DeviceState::Uninit;
    }

    /// Runs one bottom-half pass for this device, dispatching through
    /// whichever datapath [`Device::select_datapath`] picked
    /// (`spec.md §4.9`, §4.10). Every frame handed to `rx_sink` is also
    /// counted in [`Stats::rx_frames`].
    pub fn run_isr(
        &mut self,
        io: &mut impl PortIo,
        hal: &mut impl crate::hal::DmaHal,
        mut rx_sink: impl FnMut(&[u8]),
    ) -> Result<IsrOutcome, IsrError> {
        let mut rx_count = 0u64;
        let outcome = {
            let mut source = DatapathDrain {
                datapath: &mut self.datapath,
                window: &mut self.window,
                hal,
            };
            run_bottom_half(io, &mut self.mitigation, &mut source, |frame| {
                rx_count += 1;
                rx_sink(frame);
            })?
        };
        self.stats.rx_frames += rx_count;
        if matches!(outcome, IsrOutcome::EmergencyBreak { .. }) {
            self.state = DeviceState::Stalled;
        }
        Ok(outcome)
    }
}

/// Adapts [`Datapath`] to [`DrainSource`] so [`Device::run_isr`] can
/// dispatch through `isr::run_bottom_half` without that module needing
/// to know about PIO vs. DMA. `io` is not cached here — it arrives fresh
/// with each `drain_rx`/`drain_tx` call, since `run_bottom_half` also
/// needs its own mutable access to the same port range between calls.
struct DatapathDrain<'a, H> {
    datapath: &'a mut Datapath,
    window: &'a mut WindowCache,
    hal: &'a mut H,
}

impl<'a, H: crate::hal::DmaHal> DrainSource for DatapathDrain<'a, H> {
    fn drain_rx(
        &mut self,
        io: &mut dyn PortIo,
        budget: u32,
        sink: &mut dyn FnMut(&[u8]),
    ) -> Result<u32, IsrError> {
        let result = match self.datapath {
            Datapath::Pio => crate::pio::pio_rx_poll(io, self.window, budget, |f| {
                sink(f);
                true
            })
            .map_err(|_| RxError::Bounce(crate::error::BounceError::PoolExhausted)),
            Datapath::Dma { rx_ring, bounce, .. } => crate::dma_path::dma_rx_poll(
                io,
                self.window,
                rx_ring,
                self.hal,
                bounce,
                budget,
                |f| {
                    sink(f);
                    true
                },
            ),
        };
        match result {
            Ok(n) => Ok(n),
            Err(RxError::DeviceFailed) => Err(IsrError::Fatal),
            Err(_) => Ok(0),
        }
    }

    fn drain_tx(&mut self, _io: &mut dyn PortIo, budget: u32) -> Result<u32, IsrError> {
        match self.datapath {
            Datapath::Pio => Ok(0),
            Datapath::Dma { tx_ring, bounce, .. } => {
                Ok(tx_ring.tx_reclaim(self.hal, bounce).min(budget as usize) as u32)
            }
        }
    }

    fn drain_stats(&mut self, io: &mut dyn PortIo) {
        crate::regs::drain_statistics(io, self.window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilitySet;

    fn base_caps(flags: CapFlags) -> CapabilitySet {
        CapabilitySet {
            flags,
            fifo_size: 2048,
            tx_threshold: 256,
            rx_copybreak: 200,
        }
    }

    #[test]
    fn pio_only_device_stays_on_pio_even_if_busmaster_requested() {
        let mut dev = Device::new_detected(0x300, 10, Generation::El3Orig, base_caps(CapFlags::empty()), [0; 6]);
        struct NoDma;
        impl crate::hal::DmaHal for NoDma {
            fn alloc(&mut self, _: usize, _: usize) -> Option<u64> {
                None
            }
            fn free(&mut self, _: u64, _: usize) {}
            fn read_phys(&mut self, _: u64, _: &mut [u8]) {}
            fn write_phys(&mut self, _: u64, _: &[u8]) {}
            fn isa_limit(&self) -> bool {
                true
            }
        }
        let mut hal = NoDma;
        dev.select_datapath(&mut hal, true, [0; RING_DEPTH], [0; RING_DEPTH]).unwrap();
        assert!(!dev.is_dma());
        assert_eq!(dev.state, DeviceState::Initialized);
    }

    #[test]
    fn tx_device_failed_error_transitions_state() {
        let mut dev = Device::new_detected(0x300, 10, Generation::El3Orig, base_caps(CapFlags::empty()), [0; 6]);
        dev.state = DeviceState::Active;
        dev.note_tx_err(TxError::DeviceFailed);
        assert_eq!(dev.state, DeviceState::Failed);
        assert_eq!(dev.stats.tx_errors, 1);
    }

    #[test]
    fn transient_tx_error_does_not_fail_device() {
        let mut dev = Device::new_detected(0x300, 10, Generation::El3Orig, base_caps(CapFlags::empty()), [0; 6]);
        dev.state = DeviceState::Active;
        dev.note_tx_err(TxError::AdapterError);
        assert_eq!(dev.state, DeviceState::Active);
    }

    #[test]
    fn run_isr_over_pio_drains_a_pending_rx_frame() {
        use crate::regs::{window1, Status};
        use crate::testing::MockBus;

        let mut bus = MockBus::new();
        let mut dev = Device::new_detected(0x300, 10, Generation::El3Orig, base_caps(CapFlags::empty()), [0; 6]);
        dev.state = DeviceState::Active;

        {
            let mut st = bus.state();
            let status_bytes = Status::UP_COMPLETE.bits().to_le_bytes();
            st.windows[0][0x0E] = status_bytes[0];
            st.windows[0][0x0F] = status_bytes[1];
            st.windows[1][0x0E] = status_bytes[0];
            st.windows[1][0x0F] = status_bytes[1];
            let rx_status = 64u16.to_le_bytes();
            st.windows[1][(window1::RX_STATUS & 0x0F) as usize] = rx_status[0];
            st.windows[1][(window1::RX_STATUS & 0x0F) as usize + 1] = rx_status[1];
        }

        struct NoDma;
        impl crate::hal::DmaHal for NoDma {
            fn alloc(&mut self, _: usize, _: usize) -> Option<u64> {
                None
            }
            fn free(&mut self, _: u64, _: usize) {}
            fn read_phys(&mut self, _: u64, _: &mut [u8]) {}
            fn write_phys(&mut self, _: u64, _: &[u8]) {}
            fn isa_limit(&self) -> bool {
                true
            }
        }
        let mut hal = NoDma;

        let mut received = Vec::new();
        let outcome = dev
            .run_isr(&mut bus, &mut hal, |frame| received.push(frame.to_vec()))
            .unwrap();

        assert!(!received.is_empty());
        assert!(matches!(
            outcome,
            IsrOutcome::Drained { .. } | IsrOutcome::BudgetExhausted { .. }
        ));
        assert_ne!(dev.state, DeviceState::Stalled);
    }

    #[test]
    fn run_isr_over_dma_reclaims_a_completed_tx_descriptor() {
        use crate::bounce::BouncePool;
        use crate::dma::alloc_dma;
        use crate::regs::{desc_bits, Descriptor, Status};
        use crate::ring::{DescriptorRing, MAX_FRAME_LEN};
        use crate::testing::MockBus;

        let mut bus = MockBus::new();
        let mut tx_bufs = [0u64; RING_DEPTH];
        let mut rx_bufs = [0u64; RING_DEPTH];
        for b in tx_bufs.iter_mut() {
            *b = alloc_dma(&mut bus, MAX_FRAME_LEN, 16).unwrap().phys;
        }
        for b in rx_bufs.iter_mut() {
            *b = alloc_dma(&mut bus, MAX_FRAME_LEN, 16).unwrap().phys;
        }

        let mut dev = Device::new_detected(
            0x300,
            10,
            Generation::Boomerang,
            base_caps(CapFlags::HAS_BUS_MASTER),
            [0; 6],
        );
        dev.state = DeviceState::Active;
        dev.select_datapath(&mut bus, true, tx_bufs, rx_bufs).unwrap();
        assert!(dev.is_dma());

        if let Datapath::Dma { tx_ring, bounce, .. } = &mut dev.datapath {
            tx_ring.tx_enqueue(&mut bus, bounce, &[1, 2, 3, 4, 5], false).unwrap();
            assert_eq!(tx_ring.free_count(), RING_DEPTH - 1);

            let mut raw = [0u8; 16];
            bus.read_phys(tx_ring.base_phys(), &mut raw);
            let mut desc = Descriptor::from_bytes(raw);
            desc.status |= desc_bits::DN_COMPLETE;
            bus.write_phys(tx_ring.base_phys(), &desc.to_bytes());
        } else {
            panic!("expected a DMA datapath");
        }

        {
            let mut st = bus.state();
            let status_bytes = Status::DN_COMPLETE.bits().to_le_bytes();
            st.windows[0][0x0E] = status_bytes[0];
            st.windows[0][0x0F] = status_bytes[1];
        }

        let mut hal = bus.clone();
        let outcome = dev.run_isr(&mut bus, &mut hal, |_| {}).unwrap();
        assert!(matches!(
            outcome,
            IsrOutcome::Drained { events } | IsrOutcome::BudgetExhausted { events } if events >= 1
        ));

        if let Datapath::Dma { tx_ring, .. } = &dev.datapath {
            assert_eq!(tx_ring.free_count(), RING_DEPTH);
        } else {
            panic!("expected a DMA datapath");
        }
    }
}
