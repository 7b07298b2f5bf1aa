//! Multi-NIC coordinator (`spec.md §4.8`): a bounded table of devices
//! with stable indices, static routing, and failover on adapter failure.

use crate::device::{Device, DeviceState};
use crate::error::{InitError, TxError};
use crate::hal::{DmaHal, PortIo};

/// Hard cap on simultaneously managed adapters (`spec.md §4.8`).
pub const MAX_DEVICES: usize = 8;

/// Link speed selection (`spec.md §6.3`, `DriverConfig`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeedConfig {
    #[default]
    Auto,
    Mbps10,
    Mbps100,
}

/// Bus-master enable policy (`spec.md §6.3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusMasterConfig {
    Off,
    On,
    #[default]
    Auto,
}

/// A static route: frames whose destination falls in `(network, mask)`
/// go out `nic_id` first, falling back to the next route on failure
/// (`spec.md §4.8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub network: [u8; 4],
    pub mask: [u8; 4],
    pub nic_id: usize,
}

/// Per-device configuration override, indexed by detection order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceOverride {
    pub io_base: Option<u16>,
    pub irq: Option<u8>,
    pub speed: SpeedConfig,
    pub bus_master: BusMasterConfig,
}

/// Driver-wide configuration (`spec.md §6.3`).
#[derive(Debug, Clone, Default)]
pub struct DriverConfig {
    pub overrides: heapless_array::FixedArray<DeviceOverride, MAX_DEVICES>,
    pub routes: heapless_array::FixedArray<Route, MAX_DEVICES>,
}

/// A tiny fixed-capacity array, used the same way as
/// `bounce::heapless_vec` for configuration data whose size is bounded by
/// [`MAX_DEVICES`] and known up front.
pub mod heapless_array {
    #[derive(Debug, Clone)]
    pub struct FixedArray<T, const N: usize> {
        items: [Option<T>; N],
        len: usize,
    }

    impl<T, const N: usize> Default for FixedArray<T, N> {
        fn default() -> Self {
            Self {
                items: [(); N].map(|_| None),
                len: 0,
            }
        }
    }

    impl<T, const N: usize> FixedArray<T, N> {
        pub fn push(&mut self, item: T) -> bool {
            if self.len >= N {
                return false;
            }
            self.items[self.len] = Some(item);
            self.len += 1;
            true
        }

        pub fn iter(&self) -> impl Iterator<Item = &T> {
            self.items[..self.len].iter().filter_map(|o| o.as_ref())
        }

        pub fn get(&self, index: usize) -> Option<&T> {
            self.items.get(index).and_then(|o| o.as_ref())
        }

        pub fn len(&self) -> usize {
            self.len
        }
    }
}

impl DriverConfig {
    /// Validates the configuration (`spec.md §7`, "Configuration errors"):
    /// every route must name a NIC index within [`MAX_DEVICES`], and no
    /// two routes may claim the same `(network, mask)` with different
    /// targets.
    pub fn validate(&self) -> Result<(), InitError> {
        for (i, a) in self.routes.iter().enumerate() {
            if a.nic_id >= MAX_DEVICES {
                return Err(InitError::InvalidConfig);
            }
            for b in self.routes.iter().skip(i + 1) {
                if a.network == b.network && a.mask == b.mask && a.nic_id != b.nic_id {
                    return Err(InitError::ConflictingRoute);
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// Never held a device; free to register into.
    Empty,
    Present,
    /// Held a device that was removed; permanently retired (`spec.md
    /// §4.8`: indices are never reused).
    Removed,
}

/// Bounded, stable-index table of managed adapters (`spec.md §4.8`).
pub struct Coordinator {
    devices: [Option<Device>; MAX_DEVICES],
    slot_state: [SlotState; MAX_DEVICES],
    routes: heapless_array::FixedArray<Route, MAX_DEVICES>,
}

impl Coordinator {
    /// An empty coordinator table.
    pub fn new(config: &DriverConfig) -> Result<Self, InitError> {
        config.validate()?;
        Ok(Self {
            devices: [(); MAX_DEVICES].map(|_| None),
            slot_state: [SlotState::Empty; MAX_DEVICES],
            routes: config.routes.clone(),
        })
    }

    /// Registers `device` at the next free index, returning its stable
    /// index. Indices are never reused within a table's lifetime once a
    /// slot has held a device and is later removed (`spec.md §4.8`).
    pub fn register(&mut self, device: Device) -> Result<usize, InitError> {
        for i in 0..MAX_DEVICES {
            if self.slot_state[i] == SlotState::Empty {
                self.devices[i] = Some(device);
                self.slot_state[i] = SlotState::Present;
                return Ok(i);
            }
        }
        Err(InitError::TooManyDevices)
    }

    /// Removes the device at `index`; the slot is marked `Removed` and
    /// never reused even though `devices[index]` becomes available again
    /// at the storage level (`spec.md §4.8`: "stable indices").
    pub fn remove(&mut self, index: usize) {
        if index < MAX_DEVICES {
            self.devices[index] = None;
            self.slot_state[index] = SlotState::Removed;
        }
    }

    /// Looks up a device by stable index.
    pub fn get(&self, index: usize) -> Option<&Device> {
        self.devices.get(index).and_then(|d| d.as_ref())
    }

    /// Looks up a device by stable index, mutably.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Device> {
        self.devices.get_mut(index).and_then(|d| d.as_mut())
    }

    /// Finds the index of the device whose MAC address matches `mac`.
    #[must_use]
    pub fn find_by_mac(&self, mac: [u8; 6]) -> Option<usize> {
        self.devices
            .iter()
            .position(|d| d.as_ref().is_some_and(|d| d.mac_address == mac))
    }

    /// Finds the index of the device whose `io_base` matches.
    #[must_use]
    pub fn find_by_io_base(&self, io_base: u16) -> Option<usize> {
        self.devices
            .iter()
            .position(|d| d.as_ref().is_some_and(|d| d.io_base == io_base))
    }

    /// Resolves the destination NIC index for `dest_ip`, walking static
    /// routes in order and skipping any whose target NIC is `Failed`
    /// (`spec.md §4.8`, failover).
    #[must_use]
    pub fn route(&self, dest_ip: [u8; 4]) -> Option<usize> {
        self.routes
            .iter()
            .filter(|r| {
                (0..4).all(|i| dest_ip[i] & r.mask[i] == r.network[i] & r.mask[i])
            })
            .find_map(|r| {
                let dev = self.devices.get(r.nic_id)?.as_ref()?;
                if dev.state != DeviceState::Failed {
                    Some(r.nic_id)
                } else {
                    self.first_healthy_other_than(r.nic_id)
                }
            })
            .or_else(|| self.first_healthy_other_than(usize::MAX))
    }

    fn first_healthy_other_than(&self, exclude: usize) -> Option<usize> {
        self.devices.iter().enumerate().find_map(|(i, d)| {
            if i == exclude {
                return None;
            }
            d.as_ref()
                .filter(|d| d.state != DeviceState::Failed)
                .map(|_| i)
        })
    }

    /// Number of slots currently holding a device.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.devices.iter().filter(|d| d.is_some()).count()
    }

    /// Resolves `dest_ip` to a NIC through [`Coordinator::route`] and
    /// sends `frame` on it (`spec.md §4.8`, failover). `io` addresses
    /// whichever NIC `route` resolves to; callers with more than one
    /// live `PortIo` range select theirs before calling.
    pub fn send_routed(
        &mut self,
        io: &mut impl PortIo,
        hal: &mut impl DmaHal,
        dest_ip: [u8; 4],
        frame: &[u8],
    ) -> Result<(), TxError> {
        let nic_id = self.route(dest_ip).ok_or(TxError::DeviceFailed)?;
        let dev = self.get_mut(nic_id).ok_or(TxError::DeviceFailed)?;
        dev.send(io, hal, frame)
    }
}
