//! Sensor poller: weather readings from the shield into the local record.

use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::Duration;

use super::timer::run_every;
use crate::{
    bus::{BusArbiter, I2cBus},
    directory::FieldValue,
    state::NodeState,
    Result, MY_THING,
};

/// Shield co-processor address on the shared bus.
pub const SHIELD_ADDR: u8 = 0x42;
/// Register holding the capacitive button mask (1 byte).
pub const TOUCH_OFFSET: u8 = 0x06;
/// First register of the weather block (3 little-endian f32).
pub const WEATHER_DATA_OFFSET: u8 = 0x07;
pub const WEATHER_DATA_LEN: usize = 12;
pub const DEFAULT_SENSOR_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WeatherReading {
    pub temp: f32,
    pub humidity: f32,
    pub light: f32,
}

impl WeatherReading {
    pub fn from_le_bytes(raw: &[u8; WEATHER_DATA_LEN]) -> Self {
        let word = |i: usize| f32::from_le_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);
        Self {
            temp: word(0),
            humidity: word(4),
            light: word(8),
        }
    }

    /// Bitwise equality, so a stuck NaN still counts as unchanged.
    pub fn same_as(&self, other: &Self) -> bool {
        self.temp.to_bits() == other.temp.to_bits()
            && self.humidity.to_bits() == other.humidity.to_bits()
            && self.light.to_bits() == other.light.to_bits()
    }

    pub fn to_le_bytes(self) -> [u8; WEATHER_DATA_LEN] {
        let mut raw = [0u8; WEATHER_DATA_LEN];
        raw[0..4].copy_from_slice(&self.temp.to_le_bytes());
        raw[4..8].copy_from_slice(&self.humidity.to_le_bytes());
        raw[8..12].copy_from_slice(&self.light.to_le_bytes());
        raw
    }
}

/// Select the weather block and read it, in one bus transaction.
pub fn read_weather<B: I2cBus>(arbiter: &BusArbiter<B>, addr: u8) -> Result<WeatherReading> {
    arbiter.with_bus(|bus| {
        bus.select_register(addr, WEATHER_DATA_OFFSET)?;
        let mut raw = [0u8; WEATHER_DATA_LEN];
        bus.read_bytes(addr, &mut raw)?;
        Ok(WeatherReading::from_le_bytes(&raw))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Changed,
    Unchanged,
    /// Bus failed; nothing was written this cycle.
    Skipped,
}

pub struct SensorPoller<B> {
    arbiter: Arc<BusArbiter<B>>,
    state: NodeState,
    addr: u8,
    previous: WeatherReading,
    failing: bool,
}

impl<B: I2cBus + 'static> SensorPoller<B> {
    pub fn new(arbiter: Arc<BusArbiter<B>>, state: NodeState, addr: u8) -> Self {
        Self {
            arbiter,
            state,
            addr,
            previous: WeatherReading::default(),
            failing: false,
        }
    }

    /// One poll. Values are compared bit for bit against the previous poll; any
    /// difference writes all three fields and raises the refresh signal.
    pub fn poll_once(&mut self) -> PollOutcome {
        let reading = match read_weather(&self.arbiter, self.addr) {
            Ok(reading) => reading,
            Err(err) => {
                if !self.failing {
                    log::warn!("weather read failed, skipping until it recovers: {err}");
                    self.failing = true;
                }
                return PollOutcome::Skipped;
            }
        };
        if self.failing {
            log::info!("weather read recovered");
            self.failing = false;
        }
        if reading.same_as(&self.previous) {
            return PollOutcome::Unchanged;
        }
        self.previous = reading;
        let directory = &self.state.directory;
        for value in [
            FieldValue::Temperature(reading.temp),
            FieldValue::Humidity(reading.humidity),
            FieldValue::Light(reading.light),
        ] {
            if let Err(err) = directory.write_field(MY_THING, value) {
                log::warn!("local record write failed: {err}");
            }
        }
        self.state.refresh.signal();
        PollOutcome::Changed
    }

    pub fn spawn(
        mut self,
        period: Duration,
        running: Arc<AtomicBool>,
    ) -> Result<thread::JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("sensor-poller".into())
            .spawn(move || {
                run_every(period, &running, || {
                    self.poll_once();
                });
            })?;
        Ok(handle)
    }
}
