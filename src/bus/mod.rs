//! The shared I2C bus: the collaborator trait, the arbiter that serializes
//! access to it, and the available backends.

use std::sync::{Mutex, PoisonError};

use crate::{Error, Result};

pub mod fake;
pub mod linux;

pub use fake::FakeBus;
pub use linux::RppalBus;

/// Byte-level access to the physical bus.
pub trait I2cBus: Send {
    /// Point the device at `addr` to `offset` for the next read.
    fn select_register(&mut self, addr: u8, offset: u8) -> Result<()>;
    /// Fill `buf` from the device at `addr`.
    fn read_bytes(&mut self, addr: u8, buf: &mut [u8]) -> Result<()>;
    fn write_bytes(&mut self, addr: u8, bytes: &[u8]) -> Result<()>;
}

/// Mutual exclusion around the bus shared by the sensor shield and the display.
///
/// The guard is dropped on every exit path of `with_bus`, including early
/// returns and panics inside `op`.
pub struct BusArbiter<B> {
    bus: Mutex<B>,
}

impl<B: I2cBus> BusArbiter<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus: Mutex::new(bus),
        }
    }

    pub fn with_bus<T>(&self, op: impl FnOnce(&mut B) -> T) -> T {
        let mut bus = self.bus.lock().unwrap_or_else(PoisonError::into_inner);
        op(&mut bus)
    }
}

/// Stand-in when no hardware is attached; every transaction fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedBus;

impl I2cBus for DetachedBus {
    fn select_register(&mut self, _addr: u8, _offset: u8) -> Result<()> {
        Err(detached())
    }

    fn read_bytes(&mut self, _addr: u8, _buf: &mut [u8]) -> Result<()> {
        Err(detached())
    }

    fn write_bytes(&mut self, _addr: u8, _bytes: &[u8]) -> Result<()> {
        Err(detached())
    }
}

fn detached() -> Error {
    Error::Bus("no hardware bus attached".into())
}
