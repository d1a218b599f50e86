use std::collections::HashMap;

use super::I2cBus;
use crate::{Error, Result};

/// In-memory bus used by tests and hosted runs: reads serve register contents
/// set up front, writes are recorded.
#[derive(Debug, Default)]
pub struct FakeBus {
    registers: HashMap<(u8, u8), Vec<u8>>,
    selected: HashMap<u8, u8>,
    writes: Vec<(u8, Vec<u8>)>,
    failing: bool,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_register(&mut self, addr: u8, offset: u8, bytes: &[u8]) {
        self.registers.insert((addr, offset), bytes.to_vec());
    }

    /// Make every following transaction fail until reset.
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    pub fn writes(&self) -> &[(u8, Vec<u8>)] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    fn check(&self) -> Result<()> {
        if self.failing {
            Err(Error::Bus("simulated bus failure".into()))
        } else {
            Ok(())
        }
    }
}

impl I2cBus for FakeBus {
    fn select_register(&mut self, addr: u8, offset: u8) -> Result<()> {
        self.check()?;
        self.selected.insert(addr, offset);
        Ok(())
    }

    fn read_bytes(&mut self, addr: u8, buf: &mut [u8]) -> Result<()> {
        self.check()?;
        let offset = self.selected.get(&addr).copied().unwrap_or(0);
        let data = self.registers.get(&(addr, offset)).ok_or_else(|| {
            Error::Bus(format!("no device at 0x{addr:02x} register 0x{offset:02x}"))
        })?;
        if data.len() < buf.len() {
            return Err(Error::Bus(format!(
                "short read from 0x{addr:02x}: wanted {} bytes, have {}",
                buf.len(),
                data.len()
            )));
        }
        buf.copy_from_slice(&data[..buf.len()]);
        Ok(())
    }

    fn write_bytes(&mut self, addr: u8, bytes: &[u8]) -> Result<()> {
        self.check()?;
        self.writes.push((addr, bytes.to_vec()));
        Ok(())
    }
}
