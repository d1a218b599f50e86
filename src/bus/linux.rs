use super::I2cBus;
use crate::{Error, Result};

#[cfg(target_os = "linux")]
fn map_i2c_err(err: rppal::i2c::Error) -> Error {
    Error::Bus(err.to_string())
}

/// Linux implementation using rppal's I2C.
#[cfg(target_os = "linux")]
pub struct RppalBus {
    inner: rppal::i2c::I2c,
    slave: Option<u8>,
}

#[cfg(target_os = "linux")]
impl RppalBus {
    /// Open a specific bus by number (e.g., bus 1 => /dev/i2c-1).
    pub fn open(bus: u8) -> Result<Self> {
        let inner = rppal::i2c::I2c::with_bus(bus).map_err(map_i2c_err)?;
        Ok(Self { inner, slave: None })
    }

    fn address(&mut self, addr: u8) -> Result<()> {
        if self.slave != Some(addr) {
            self.inner
                .set_slave_address(addr.into())
                .map_err(map_i2c_err)?;
            self.slave = Some(addr);
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl I2cBus for RppalBus {
    fn select_register(&mut self, addr: u8, offset: u8) -> Result<()> {
        self.write_bytes(addr, &[offset])
    }

    fn read_bytes(&mut self, addr: u8, buf: &mut [u8]) -> Result<()> {
        self.address(addr)?;
        let read = self.inner.read(buf).map_err(map_i2c_err)?;
        if read != buf.len() {
            return Err(Error::Bus(format!(
                "short read from 0x{addr:02x}: {read} of {} bytes",
                buf.len()
            )));
        }
        Ok(())
    }

    fn write_bytes(&mut self, addr: u8, bytes: &[u8]) -> Result<()> {
        self.address(addr)?;
        let written = self.inner.write(bytes).map_err(map_i2c_err)?;
        if written != bytes.len() {
            return Err(Error::Bus(format!(
                "short write to 0x{addr:02x}: {written} of {} bytes",
                bytes.len()
            )));
        }
        Ok(())
    }
}

/// Non-Linux stub to satisfy builds on dev hosts; returns errors at runtime.
#[cfg(not(target_os = "linux"))]
pub struct RppalBus;

#[cfg(not(target_os = "linux"))]
impl RppalBus {
    pub fn open(_bus: u8) -> Result<Self> {
        Err(Error::InvalidArgs(
            "RppalBus is only available on Linux targets".into(),
        ))
    }
}

#[cfg(not(target_os = "linux"))]
impl I2cBus for RppalBus {
    fn select_register(&mut self, _addr: u8, _offset: u8) -> Result<()> {
        Err(Error::Bus("RppalBus is only available on Linux targets".into()))
    }

    fn read_bytes(&mut self, _addr: u8, _buf: &mut [u8]) -> Result<()> {
        Err(Error::Bus("RppalBus is only available on Linux targets".into()))
    }

    fn write_bytes(&mut self, _addr: u8, _bytes: &[u8]) -> Result<()> {
        Err(Error::Bus("RppalBus is only available on Linux targets".into()))
    }
}
