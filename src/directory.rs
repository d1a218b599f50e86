//! Per-device records shared by every task.
//!
//! Each field is stored in its own atomic cell. Writers touch one field at a
//! time and readers take a field-by-field snapshot, so a reader racing a
//! writer can see a new temperature next to an old humidity. No consumer
//! needs more than that.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crossbeam::atomic::AtomicCell;

use crate::{Error, Result, MAX_THING, MY_THING, THING_COUNT};

pub const DEFAULT_IP: &str = "0.0.0.0";
/// Longest dotted-quad kept for a record.
pub const IP_MAX_LEN: usize = 15;
/// Step used by the "+10" touch button.
pub const SKIP_STEP: u8 = 10;

/// Fixed-capacity dotted-quad text so it can live in an `AtomicCell`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpText {
    bytes: [u8; IP_MAX_LEN],
    len: u8,
}

impl IpText {
    /// Keeps at most `IP_MAX_LEN` bytes, cut back to a char boundary.
    pub fn new(raw: &str) -> Self {
        let mut end = raw.len().min(IP_MAX_LEN);
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        let mut bytes = [0u8; IP_MAX_LEN];
        bytes[..end].copy_from_slice(&raw.as_bytes()[..end]);
        Self {
            bytes,
            len: end as u8,
        }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or(DEFAULT_IP)
    }
}

impl Default for IpText {
    fn default() -> Self {
        Self::new(DEFAULT_IP)
    }
}

/// Point-in-time copy of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct ThingRecord {
    pub thing_number: u8,
    pub ip_str: String,
    pub alert: bool,
    pub temp: f32,
    pub humidity: f32,
    pub light: f32,
}

impl ThingRecord {
    pub fn name(&self) -> String {
        thing_name(self.thing_number)
    }

    /// One-line summary used by the console listing and update echo.
    pub fn summary_line(&self) -> String {
        format!(
            "\tThing: {}\tIP: {:>15}\tAlert: {}\tTemperature: {:4.1}\tHumidity: {:4.1}\tLight: {:5.0}",
            self.name(),
            self.ip_str,
            u8::from(self.alert),
            self.temp,
            self.humidity,
            self.light
        )
    }
}

pub fn thing_name(thing_number: u8) -> String {
    format!("Thing_{thing_number:02}")
}

/// A single-field write.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Ip(String),
    Alert(bool),
    Temperature(f32),
    Humidity(f32),
    Light(f32),
}

struct ThingSlot {
    thing_number: u8,
    ip: AtomicCell<IpText>,
    alert: AtomicBool,
    temp: AtomicCell<f32>,
    humidity: AtomicCell<f32>,
    light: AtomicCell<f32>,
}

impl ThingSlot {
    fn new(thing_number: u8) -> Self {
        Self {
            thing_number,
            ip: AtomicCell::new(IpText::default()),
            alert: AtomicBool::new(false),
            temp: AtomicCell::new(0.0),
            humidity: AtomicCell::new(0.0),
            light: AtomicCell::new(0.0),
        }
    }

    fn snapshot(&self) -> ThingRecord {
        ThingRecord {
            thing_number: self.thing_number,
            ip_str: self.ip.load().as_str().to_string(),
            alert: self.alert.load(Ordering::Relaxed),
            temp: self.temp.load(),
            humidity: self.humidity.load(),
            light: self.light.load(),
        }
    }
}

/// The table of `MAX_THING + 1` records. Records are never added or removed.
pub struct ThingDirectory {
    slots: Vec<ThingSlot>,
}

impl Default for ThingDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl ThingDirectory {
    pub fn new() -> Self {
        Self {
            slots: (0..=MAX_THING).map(ThingSlot::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn read(&self, index: u8) -> Option<ThingRecord> {
        self.slots.get(index as usize).map(ThingSlot::snapshot)
    }

    /// Snapshot of the local record; index `MY_THING` always exists.
    pub fn mine(&self) -> ThingRecord {
        self.slots[MY_THING as usize].snapshot()
    }

    pub fn snapshot_all(&self) -> Vec<ThingRecord> {
        self.slots.iter().map(ThingSlot::snapshot).collect()
    }

    pub fn write_field(&self, index: u8, value: FieldValue) -> Result<()> {
        let slot = self.slot(index)?;
        match value {
            FieldValue::Ip(ip) => slot.ip.store(IpText::new(&ip)),
            FieldValue::Alert(on) => slot.alert.store(on, Ordering::Relaxed),
            FieldValue::Temperature(v) => slot.temp.store(v),
            FieldValue::Humidity(v) => slot.humidity.store(v),
            FieldValue::Light(v) => slot.light.store(v),
        }
        Ok(())
    }

    /// Flip the alert flag and return the new value.
    pub fn toggle_alert(&self, index: u8) -> Result<bool> {
        let slot = self.slot(index)?;
        Ok(!slot.alert.fetch_xor(true, Ordering::Relaxed))
    }

    fn slot(&self, index: u8) -> Result<&ThingSlot> {
        self.slots.get(index as usize).ok_or_else(|| {
            Error::InvalidArgs(format!("thing {index} outside 0..={MAX_THING}"))
        })
    }
}

/// The record index currently shown on the display.
#[derive(Debug, Default)]
pub struct SelectedThing {
    index: AtomicU8,
}

impl SelectedThing {
    pub fn new() -> Self {
        Self {
            index: AtomicU8::new(MY_THING),
        }
    }

    pub fn get(&self) -> u8 {
        self.index.load(Ordering::Relaxed)
    }

    pub fn set(&self, index: u8) -> u8 {
        let index = index % THING_COUNT as u8;
        self.index.store(index, Ordering::Relaxed);
        index
    }

    pub fn show_mine(&self) -> u8 {
        self.set(MY_THING)
    }

    pub fn previous(&self) -> u8 {
        self.update(wrap_previous)
    }

    pub fn next(&self) -> u8 {
        self.update(wrap_next)
    }

    pub fn skip_ten(&self) -> u8 {
        self.update(wrap_skip_ten)
    }

    fn update(&self, step: fn(u8) -> u8) -> u8 {
        let prev = self
            .index
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |i| Some(step(i)))
            .unwrap_or_else(|i| i);
        step(prev)
    }
}

pub fn wrap_previous(index: u8) -> u8 {
    if index == 0 {
        MAX_THING
    } else {
        index - 1
    }
}

pub fn wrap_next(index: u8) -> u8 {
    if index >= MAX_THING {
        0
    } else {
        index + 1
    }
}

pub fn wrap_skip_ten(index: u8) -> u8 {
    let sum = index.saturating_add(SKIP_STEP);
    if sum > MAX_THING {
        sum - (MAX_THING + 1)
    } else {
        sum
    }
}
